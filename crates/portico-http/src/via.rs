/// Via token for one hop, e.g. `1.1 portico`.
pub fn via_token(major: u8, minor: u8, server_name: &str) -> String {
    if major >= 2 {
        format!("{major} {server_name}")
    } else {
        format!("{major}.{minor} {server_name}")
    }
}

/// Append this proxy's token to whatever Via value the origin supplied.
/// Our own token goes last, matching hop order.
pub fn splice_via(existing: Option<&str>, major: u8, minor: u8, server_name: &str) -> String {
    let token = via_token(major, minor, server_name);
    match existing {
        Some(value) if !value.is_empty() => format!("{value}, {token}"),
        _ => token,
    }
}

#[cfg(test)]
mod tests {
    use super::{splice_via, via_token};

    #[test]
    fn token_elides_minor_for_major_two() {
        assert_eq!(via_token(1, 1, "portico"), "1.1 portico");
        assert_eq!(via_token(2, 0, "portico"), "2 portico");
    }

    #[test]
    fn own_token_goes_last() {
        assert_eq!(
            splice_via(Some("1.0 edge"), 1, 1, "portico"),
            "1.0 edge, 1.1 portico"
        );
        assert_eq!(splice_via(None, 1, 1, "portico"), "1.1 portico");
    }
}
