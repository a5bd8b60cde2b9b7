//! Tenant context extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use mt_core::{MtError, TenantContext};

use crate::MtAxumError;

/// The request's [`TenantContext`], as set up by the tenancy middleware.
///
/// Rejects with a 500 when the middleware is not installed on the route.
#[derive(Debug, Clone)]
pub struct Tenancy(pub TenantContext);

impl Tenancy {
    pub fn into_context(self) -> TenantContext {
        self.0
    }
}

impl<S> FromRequestParts<S> for Tenancy
where
    S: Send + Sync,
{
    type Rejection = MtAxumError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .map(Tenancy)
            .ok_or_else(|| MtError::configuration("tenancy middleware is not installed").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode, response::IntoResponse};

    #[tokio::test]
    async fn missing_context_is_a_server_error() {
        let (mut parts, _) = Request::builder().uri("/").body(Body::empty()).unwrap().into_parts();
        let rejection = Tenancy::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(rejection.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn context_is_taken_from_extensions() {
        let (mut parts, _) = Request::builder().uri("/").body(Body::empty()).unwrap().into_parts();
        parts.extensions.insert(TenantContext::global());

        let Tenancy(ctx) = Tenancy::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(ctx.is_primary());
    }
}
