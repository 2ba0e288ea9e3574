mod error_page;
mod fields;
mod location;
mod validate;
mod via;

pub use error_page::error_html;
pub use fields::{
    coalesce_fields, get_field, get_unique_field, normalize_fields, split_append_field,
    value_is_lws, HeaderField,
};
pub use location::rewrite_location;
pub use validate::{
    accept_request, check_request_fields, is_upgrade_request, strip_connection_fields,
    valid_field, RequestLine,
};
pub use via::{splice_via, via_token};
