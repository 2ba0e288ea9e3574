/// Rewrite an origin `Location` value so redirects keep pointing at this
/// proxy: when the URI names the origin-facing authority, substitute the
/// client-facing scheme and authority. Anything else passes through
/// untouched (`None`).
pub fn rewrite_location(
    value: &str,
    origin_authority: &str,
    frontend_scheme: &str,
    frontend_authority: &str,
) -> Option<String> {
    if origin_authority.is_empty() || frontend_authority.is_empty() {
        return None;
    }
    let rest = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"))?;
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    if !authority_matches(authority, origin_authority) {
        return None;
    }
    Some(format!("{frontend_scheme}://{frontend_authority}{tail}"))
}

/// Compare authorities, letting a default port on either side match its
/// bare-host form.
fn authority_matches(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    strip_default_port(a) == strip_default_port(b)
}

fn strip_default_port(authority: &str) -> &str {
    authority
        .strip_suffix(":80")
        .or_else(|| authority.strip_suffix(":443"))
        .unwrap_or(authority)
}
