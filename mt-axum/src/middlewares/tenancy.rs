//! Tenancy middleware.
//!
//! Resolves the request's [`TenantContext`] once, before any handler runs,
//! and stores it in the request extensions where the [`crate::Tenancy`]
//! extractor picks it up.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use mt_core::TenantContext;
use mt_scope::{RequestInfo, TenantResolver};
use serde_json::Value;
use tracing::debug;

/// Session contents of the request, for the session strategy.
///
/// Inserted into the request extensions by whatever session layer runs
/// ahead of [`tenancy`].
#[derive(Debug, Clone, Default)]
pub struct SessionData(pub Value);

/// Host (without port), scheme and session of a request.
pub fn request_info(request: &Request) -> RequestInfo {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default();
    let server_name = host.split(':').next().unwrap_or_default().to_string();

    let scheme = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| request.uri().scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());

    let session = request
        .extensions()
        .get::<SessionData>()
        .map(|s| s.0.clone())
        .unwrap_or(Value::Null);

    RequestInfo::new(server_name.clone())
        .with_env("SERVER_NAME", server_name)
        .with_env("REQUEST_SCHEME", scheme)
        .with_session(session)
}

/// Middleware function for tenancy.
///
/// This can be used with `axum::middleware::from_fn_with_state`.
pub async fn tenancy(State(resolver): State<TenantResolver>, mut request: Request, next: Next) -> Response {
    let info = request_info(&request);
    let ctx: TenantContext = resolver.for_request(&info);

    debug!(
        server_name = %info.server_name,
        qualifier = ctx.qualifier(),
        context = %ctx.context(),
        "request tenancy"
    );

    request.extensions_mut().insert(ctx);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn host_port_is_dropped() {
        let request = Request::builder()
            .uri("/posts")
            .header("host", "acme.app.test:8080")
            .body(Body::empty())
            .unwrap();

        let info = request_info(&request);
        assert_eq!(info.server_name, "acme.app.test");
        assert_eq!(info.scheme(), "http");
    }

    #[test]
    fn forwarded_proto_sets_the_scheme() {
        let request = Request::builder()
            .uri("/posts")
            .header("host", "acme.app.test")
            .header("x-forwarded-proto", "https, http")
            .body(Body::empty())
            .unwrap();

        assert_eq!(request_info(&request).scheme(), "https");
    }

    #[test]
    fn session_comes_from_extensions() {
        let mut request = Request::builder()
            .uri("http://app.test/posts")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(SessionData(serde_json::json!({"tenant": "acme"})));

        let info = request_info(&request);
        assert_eq!(info.server_name, "app.test");
        assert_eq!(info.session["tenant"], "acme");
    }
}
