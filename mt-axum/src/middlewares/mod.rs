pub mod tenancy;

pub use tenancy::{request_info, tenancy, SessionData};
