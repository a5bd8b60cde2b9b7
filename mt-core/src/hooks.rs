use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::MtConfigSnapshot;
use crate::service::ServiceMethodKind;
use crate::tenant::TenantContext;

/// What a before-hook wants to happen to the operation.
///
/// `Refuse` is the quiet "not permitted" answer for routine denials; a hook
/// that detects an unauthorized operation returns an error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Refuse,
}

/// Result of a write or delete that went through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R> {
    Completed(R),
    /// A before-hook refused the operation; the service was not called.
    Refused,
}

impl<R> Outcome<R> {
    pub fn is_refused(&self) -> bool {
        matches!(self, Outcome::Refused)
    }

    pub fn into_option(self) -> Option<R> {
        match self {
            Outcome::Completed(r) => Some(r),
            Outcome::Refused => None,
        }
    }
}

/// Context passed to hooks.
///
/// R = record type
/// P = params type (filters, query options, etc.)
#[derive(Debug)]
pub struct HookContext<R, P> {
    pub tenant: TenantContext,
    pub service_name: String,
    pub method: ServiceMethodKind,
    pub id: Option<String>,
    pub params: P,
    /// Incoming record (create/update/patch). Hooks may rewrite it.
    pub data: Option<R>,
    /// Stored row targeted by update/patch/remove, loaded before the hooks run.
    pub existing: Option<R>,
    pub config: MtConfigSnapshot,
}

impl<R, P> HookContext<R, P> {
    pub fn new(
        tenant: TenantContext,
        service_name: impl Into<String>,
        method: ServiceMethodKind,
        params: P,
        config: MtConfigSnapshot,
    ) -> Self {
        Self {
            tenant,
            service_name: service_name.into(),
            method,
            id: None,
            params,
            data: None,
            existing: None,
            config,
        }
    }
}

/// Runs before the service is called.
///
/// A hook can rewrite `ctx.params` (filters) or `ctx.data` (stamping),
/// refuse the operation, or fail it with an error.
#[async_trait]
pub trait BeforeHook<R, P>: Send + Sync
where
    R: Send + 'static,
    P: Send + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<Decision>;
}

/// Before-hooks registered for the whole app or for one service.
pub struct ServiceHooks<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    pub before_all: Vec<Arc<dyn BeforeHook<R, P>>>,
    pub before_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn BeforeHook<R, P>>>>,
}

impl<R, P> ServiceHooks<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            before_all: Vec::new(),
            before_by_method: HashMap::new(),
        }
    }

    /// Run `hook` before every method.
    pub fn before_all(&mut self, hook: Arc<dyn BeforeHook<R, P>>) -> &mut Self {
        self.before_all.push(hook);
        self
    }

    /// Run `hook` before one method.
    pub fn before(&mut self, method: ServiceMethodKind, hook: Arc<dyn BeforeHook<R, P>>) -> &mut Self {
        self.before_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before_all.is_empty() && self.before_by_method.values().all(Vec::is_empty)
    }
}

impl<R, P> Default for ServiceHooks<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// "all" hooks first, then the method-specific ones.
pub(crate) fn collect_method_hooks<R, P>(
    all: &[Arc<dyn BeforeHook<R, P>>],
    by_method: &HashMap<ServiceMethodKind, Vec<Arc<dyn BeforeHook<R, P>>>>,
    method: &ServiceMethodKind,
) -> Vec<Arc<dyn BeforeHook<R, P>>>
where
    R: Send + 'static,
    P: Send + 'static,
{
    let mut out: Vec<_> = all.to_vec();
    if let Some(v) = by_method.get(method) {
        out.extend(v.iter().cloned());
    }
    out
}
