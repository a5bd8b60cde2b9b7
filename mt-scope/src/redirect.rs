use crate::options::TenancyOptions;
use crate::request::RequestInfo;

/// Where a request for an unknown or inactive tenant is sent.
///
/// Absolute URIs are used as configured; anything else is a path on the
/// primary domain, reached with the request's scheme.
pub fn redirect_target(options: &TenancyOptions, request: &RequestInfo) -> String {
    let uri = options.redirect_inactive.trim();

    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }

    let path = if uri.starts_with('/') {
        uri.to_string()
    } else {
        format!("/{uri}")
    };

    format!("{}://{}{}", request.scheme(), options.primary_domain, path)
}
