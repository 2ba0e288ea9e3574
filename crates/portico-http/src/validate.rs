use crate::fields::{get_field, get_unique_field, value_is_lws, HeaderField};

/// Request pseudo-headers this proxy understands. `:protocol` is the
/// extended-CONNECT marker and only participates in upgrade detection.
const KNOWN_REQUEST_PSEUDO: &[&str] = &[":method", ":scheme", ":path", ":authority", ":protocol"];

/// Singleton pseudo-headers: a second occurrence poisons the request.
const UNIQUE_PSEUDO: &[&str] = &[":method", ":scheme", ":path", ":authority"];

/// Connection-oriented fields that must not cross an HTTP/2 hop.
const CONNECTION_FIELDS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// Canonical request line recovered from pseudo-headers. Fields the request
/// did not carry are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestLine {
    pub method: String,
    pub scheme: String,
    pub authority: String,
    pub path: String,
}

impl RequestLine {
    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }
}

fn token_byte(b: u8) -> bool {
    matches!(b,
        b'a'..=b'z' | b'0'..=b'9'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*'
        | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

/// Byte grammar for a single field. Invalid fields are dropped by the
/// caller, never fatal to the stream.
pub fn valid_field(name: &str, value: &str) -> bool {
    let bare = name.strip_prefix(':').unwrap_or(name);
    if bare.is_empty() || !bare.bytes().all(token_byte) {
        return false;
    }
    !value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0'))
}

/// Structural rules over a complete request header set: pseudo-headers
/// precede regular fields, are known, singletons occur once, and no
/// connection-oriented field slips through (`te: trailers` excepted).
pub fn check_request_fields(fields: &[HeaderField]) -> bool {
    let mut saw_regular = false;
    for field in fields {
        if field.name.starts_with(':') {
            if saw_regular {
                return false;
            }
            if !KNOWN_REQUEST_PSEUDO.contains(&field.name.as_str()) {
                return false;
            }
        } else {
            saw_regular = true;
            if CONNECTION_FIELDS.contains(&field.name.as_str()) {
                return false;
            }
            if field.name == "te" && field.value != "trailers" {
                return false;
            }
        }
    }
    for name in UNIQUE_PSEUDO {
        let count = fields.iter().filter(|f| f.name == *name).count();
        if count > 1 {
            return false;
        }
    }
    true
}

/// Drop fields that must not be relayed back over the HTTP/2 hop.
pub fn strip_connection_fields(fields: Vec<HeaderField>) -> Vec<HeaderField> {
    fields
        .into_iter()
        .filter(|f| !CONNECTION_FIELDS.contains(&f.name.as_str()) && f.name != "te")
        .collect()
}

/// Accept or reject a request header set once the block is complete.
///
/// `None` means the stream must be reset with PROTOCOL_ERROR. CONNECT takes
/// only `:authority`; anything else needs method, scheme, path, and either
/// `:authority` or `host` (`:authority` unconditionally in proxy mode). A
/// request that will carry a body must announce a usable `content-length`.
pub fn accept_request(
    fields: &[HeaderField],
    end_stream: bool,
    proxy_mode: bool,
) -> Option<RequestLine> {
    if !check_request_fields(fields) {
        return None;
    }

    let method = get_unique_field(fields, ":method");
    let scheme = get_unique_field(fields, ":scheme");
    let authority = get_unique_field(fields, ":authority");
    let path = get_unique_field(fields, ":path");
    let host = get_unique_field(fields, "host");

    let nonempty = |f: Option<&HeaderField>| f.is_some_and(|f| !f.value.is_empty());
    let is_connect = method.is_some_and(|f| f.value == "CONNECT");
    let having_authority = nonempty(authority);

    if is_connect {
        if scheme.is_some() || path.is_some() || !having_authority {
            return None;
        }
    } else {
        let having_host = nonempty(host);
        if !nonempty(method)
            || !nonempty(scheme)
            || !nonempty(path)
            || (proxy_mode && !having_authority)
            || (!proxy_mode && !having_authority && !having_host)
        {
            return None;
        }
    }

    if !is_connect && !end_stream {
        let content_length = get_field(fields, "content-length");
        if !content_length.is_some_and(|f| !value_is_lws(&f.value)) {
            return None;
        }
    }

    let text = |f: Option<&HeaderField>| f.map(|f| f.value.clone()).unwrap_or_default();
    Some(RequestLine {
        method: text(method),
        scheme: text(scheme),
        authority: text(authority),
        path: text(path),
    })
}

/// CONNECT and extended-CONNECT streams become opaque tunnels.
pub fn is_upgrade_request(line: &RequestLine, fields: &[HeaderField]) -> bool {
    line.is_connect() || get_field(fields, ":protocol").is_some()
}

#[cfg(test)]
mod tests {
    use super::{
        accept_request, check_request_fields, is_upgrade_request, strip_connection_fields,
        valid_field,
    };
    use crate::fields::HeaderField;

    fn field(name: &str, value: &str) -> HeaderField {
        HeaderField::new(name, value)
    }

    fn get_request() -> Vec<HeaderField> {
        vec![
            field(":method", "GET"),
            field(":scheme", "https"),
            field(":authority", "a.example"),
            field(":path", "/"),
        ]
    }

    #[test]
    fn field_grammar() {
        assert!(valid_field("x-trace-id", "abc"));
        assert!(valid_field(":authority", "a.example"));
        assert!(!valid_field("X-Upper", "abc"));
        assert!(!valid_field("bad header", "abc"));
        assert!(!valid_field("", "abc"));
        assert!(!valid_field("x", "a\r\nb"));
        assert!(!valid_field("x", "a\0b"));
    }

    #[test]
    fn accepts_plain_get() {
        let line = accept_request(&get_request(), true, false).expect("must accept");
        assert_eq!(line.method, "GET");
        assert_eq!(line.authority, "a.example");
        assert!(!line.is_connect());
    }

    #[test]
    fn host_substitutes_for_authority_outside_proxy_mode() {
        let fields = vec![
            field(":method", "GET"),
            field(":scheme", "https"),
            field(":path", "/"),
            field("host", "a.example"),
        ];
        assert!(accept_request(&fields, true, false).is_some());
        assert!(accept_request(&fields, true, true).is_none());
    }

    #[test]
    fn rejects_pseudo_after_regular_field() {
        let fields = vec![
            field(":method", "GET"),
            field("x-id", "1"),
            field(":scheme", "https"),
        ];
        assert!(!check_request_fields(&fields));
    }

    #[test]
    fn rejects_unknown_pseudo_and_duplicates() {
        let mut fields = get_request();
        fields.insert(0, field(":status", "200"));
        assert!(!check_request_fields(&fields));

        let mut fields = get_request();
        fields.push(field(":path", "/other"));
        assert!(!check_request_fields(&fields));
    }

    #[test]
    fn rejects_connection_fields_but_keeps_te_trailers() {
        let mut fields = get_request();
        fields.push(field("te", "trailers"));
        assert!(check_request_fields(&fields));

        fields.push(field("connection", "close"));
        assert!(!check_request_fields(&fields));

        let mut fields = get_request();
        fields.push(field("te", "gzip"));
        assert!(!check_request_fields(&fields));
    }

    #[test]
    fn connect_takes_only_authority() {
        let fields = vec![field(":method", "CONNECT"), field(":authority", "a:443")];
        let line = accept_request(&fields, false, false).expect("must accept");
        assert!(line.is_connect());
        assert!(line.scheme.is_empty() && line.path.is_empty());

        let fields = vec![
            field(":method", "CONNECT"),
            field(":scheme", "https"),
            field(":authority", "a:443"),
        ];
        assert!(accept_request(&fields, false, false).is_none());

        let fields = vec![field(":method", "CONNECT")];
        assert!(accept_request(&fields, false, false).is_none());
    }

    #[test]
    fn bodied_request_needs_content_length() {
        let fields = get_request();
        assert!(accept_request(&fields, false, false).is_none());

        let mut fields = get_request();
        fields.push(field("content-length", "10"));
        assert!(accept_request(&fields, false, false).is_some());

        let mut fields = get_request();
        fields.push(field("content-length", ""));
        assert!(accept_request(&fields, false, false).is_none());
    }

    #[test]
    fn extended_connect_counts_as_upgrade() {
        let mut fields = get_request();
        fields.insert(0, field(":protocol", "websocket"));
        let line = accept_request(&fields, false, false);
        // :protocol alone does not satisfy the bodied-request rule.
        assert!(line.is_none());

        fields.push(field("content-length", "0"));
        let line = accept_request(&fields, false, false).expect("must accept");
        assert!(is_upgrade_request(&line, &fields));
    }

    #[test]
    fn strip_removes_connection_fields_and_te() {
        let stripped = strip_connection_fields(vec![
            field("content-type", "text/plain"),
            field("transfer-encoding", "chunked"),
            field("te", "trailers"),
            field("upgrade", "h2c"),
        ]);
        assert_eq!(stripped, vec![field("content-type", "text/plain")]);
    }
}
