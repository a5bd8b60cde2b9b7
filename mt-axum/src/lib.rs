//! mt-axum: Axum adapter for tenant-scoped mt-core services.
//!
//! Builds a tenancy context for every request from its `Host` header (or
//! session), exposes services as REST routes, and maps errors to responses:
//! an inactive tenant becomes a `302` to the configured location, an
//! `MtError` its status with a JSON body.

pub mod app;
pub mod extract;
pub mod middlewares;
pub mod params;
pub mod rest;
pub mod state;
mod error;
pub use error::MtAxumError;
pub use extract::Tenancy;
pub use middlewares::SessionData;
pub use state::MtAxumState;

pub use app::{axum, AxumApp};
