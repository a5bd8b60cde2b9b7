//! mt-scope: tenant resolution and row-level scope policies.
//!
//! A [`TenantResolver`] turns each request into a [`mt_core::TenantContext`]
//! (qualifier, primary/tenant classification, inactive-tenant redirect and
//! a lazily filled identity cache). [`ScopePolicy`] hooks, installed per
//! collection with [`install_policies`], then filter reads, stamp and check
//! ownership on writes, and refuse or fail operations that cross tenants.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mt_core::{MemoryService, MtApp, ServiceParams};
//! use mt_scope::{install_policies, PolicyConfig, RequestInfo, ScopeKind, TenancyOptions, TenantResolver};
//! use serde_json::Value;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let app: MtApp<Value, ServiceParams> = MtApp::new();
//! app.register_service("accounts", Arc::new(MemoryService::new()));
//! app.register_service("posts", Arc::new(MemoryService::new()));
//!
//! let options = TenancyOptions::builder()
//!     .primary_domain("app.test")
//!     .policy("accounts", PolicyConfig::new(ScopeKind::TenantOnly))
//!     .policy("posts", PolicyConfig::new(ScopeKind::Mixed))
//!     .build_validated()?;
//!
//! install_policies(&app, &options);
//! let resolver = TenantResolver::for_app(&app, options)?;
//!
//! let ctx = resolver.for_request(&RequestInfo::new("acme.app.test"));
//! let posts = app.service("posts")?.find(ctx, ServiceParams::default()).await?;
//! # let _ = posts;
//! # Ok(())
//! # }
//! ```

pub mod install;
pub mod options;
pub mod policy;
pub mod redirect;
pub mod request;
pub mod resolver;
pub mod strategy;

pub use install::install_policies;
pub use options::{
    CachePolicy, OptionsError, PolicyConfig, ScopeDefaults, Strategy, TenancyOptions, TenancyOptionsBuilder,
    TenantModel, CONFIG_PREFIX,
};
pub use policy::{ScopeKind, ScopeParams, ScopePolicy};
pub use redirect::redirect_target;
pub use request::RequestInfo;
pub use resolver::{ServiceTenantLookup, TenantResolver};
pub use strategy::{source_for, DomainQualifier, QualifierSource, SessionQualifier};
