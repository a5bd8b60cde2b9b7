//! mt-core: framework-agnostic core for tenant-scoped data access.
//!
//! Services persist records, before-hooks run ahead of every service call,
//! and each request carries a [`TenantContext`] that says whether it runs on
//! the primary site or inside a tenant, and which tenant that is.

pub mod app;
pub mod config;
pub mod entity;
pub mod errors;
pub mod hooks;
pub mod memory;
pub mod query;
pub mod registry;
pub mod service;
pub mod tenant;

pub use app::{MtApp, ServiceHandle};
pub use config::{MtConfig, MtConfigSnapshot};
pub use entity::Entity;
pub use errors::{is_kind, ErrorKind, MtError, MtResult};
pub use hooks::{BeforeHook, Decision, HookContext, Outcome, ServiceHooks};
pub use memory::MemoryService;
pub use query::{Condition, Query, ServiceParams};
pub use registry::MtServiceRegistry;
pub use service::{MtService, ServiceMethodKind};
pub use tenant::{
    Context, InactiveTenant, ResolutionCache, TenantContext, TenantIdentity, TenantLookup, DEFAULT_SHARED_CAPACITY,
};
