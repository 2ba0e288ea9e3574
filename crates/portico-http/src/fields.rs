//! Ordered header-field lists.
//!
//! Header sets travel through the proxy as ordered `(name, value)` pairs
//! rather than a multimap: pseudo-header ordering rules and the coalescing
//! behavior below are positional, and emission order must match arrival
//! order.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Append `value` under `name`, splitting at NUL separators.
///
/// Header decoders deliver repeated fields of the same name as one value
/// with NUL between the originals; each piece becomes its own field here.
pub fn split_append_field(fields: &mut Vec<HeaderField>, name: &str, value: &str) {
    for piece in value.split('\0') {
        fields.push(HeaderField::new(name, piece));
    }
}

/// Lowercase names and trim optional whitespace around values.
pub fn normalize_fields(fields: &mut [HeaderField]) {
    for field in fields.iter_mut() {
        if field.name.bytes().any(|b| b.is_ascii_uppercase()) {
            field.name = field.name.to_ascii_lowercase();
        }
        let trimmed = field.value.trim_matches([' ', '\t']);
        if trimmed.len() != field.value.len() {
            field.value = trimmed.to_string();
        }
    }
}

/// Join duplicate fields of the same name with `", "`, keeping first-arrival
/// order. `set-cookie` is exempt: its values are not list-valued.
pub fn coalesce_fields(fields: Vec<HeaderField>) -> Vec<HeaderField> {
    let mut out: Vec<HeaderField> = Vec::with_capacity(fields.len());
    for field in fields {
        if field.name != "set-cookie" {
            if let Some(existing) = out.iter_mut().find(|f| f.name == field.name) {
                existing.value.push_str(", ");
                existing.value.push_str(&field.value);
                continue;
            }
        }
        out.push(field);
    }
    out
}

/// First field with the given name.
pub fn get_field<'a>(fields: &'a [HeaderField], name: &str) -> Option<&'a HeaderField> {
    fields.iter().find(|f| f.name == name)
}

/// The field with the given name, provided it occurs exactly once.
pub fn get_unique_field<'a>(fields: &'a [HeaderField], name: &str) -> Option<&'a HeaderField> {
    let mut matches = fields.iter().filter(|f| f.name == name);
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first)
}

/// True when the value is empty or carries linear whitespace, which
/// disqualifies it as a `content-length`.
pub fn value_is_lws(value: &str) -> bool {
    value.is_empty() || value.bytes().any(|b| b == b' ' || b == b'\t')
}
