use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mt_core::{InactiveTenant, MtError};
use tracing::{debug, error};

#[derive(Debug)]
pub struct MtAxumError(pub anyhow::Error);

impl From<anyhow::Error> for MtAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<MtError> for MtAxumError {
    fn from(e: MtError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for MtAxumError {
    fn into_response(self) -> Response {
        // The request's tenant does not exist (any more): leave for the primary site.
        if let Some(inactive) = InactiveTenant::from_anyhow(&self.0) {
            debug!(qualifier = %inactive.qualifier, location = %inactive.location, "redirecting inactive tenant");
            return (StatusCode::FOUND, [(header::LOCATION, inactive.location.clone())]).into_response();
        }

        // If it's an MtError (even if wrapped by anyhow contexts), preserve Feathers-ish fields
        if let Some(mt) = MtError::from_anyhow(&self.0) {
            let safe = mt.sanitize_for_client();
            let status = StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!(error = %self.0, "request failed");
            }
            return (status, Json(safe.to_json())).into_response();
        }

        // Fallback: wrap anything else as a GeneralError
        error!(error = %self.0, "request failed");
        let safe = MtError::general_error(self.0.to_string()).sanitize_for_client();
        let status = StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}
