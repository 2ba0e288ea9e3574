use http::StatusCode;

/// Compact HTML body for a synthesized error response.
pub fn error_html(status: StatusCode, server_name: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    let code = status.as_u16();
    format!(
        "<!DOCTYPE html><html><head><title>{code} {reason}</title></head>\
         <body><h1>{code} {reason}</h1><hr><address>{server_name}</address></body></html>"
    )
}
