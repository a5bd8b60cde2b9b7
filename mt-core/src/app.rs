use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::debug;

use crate::errors::MtError;
use crate::hooks::{collect_method_hooks, BeforeHook, Decision, HookContext, Outcome};
use crate::{MtConfig, MtConfigSnapshot, MtService, MtServiceRegistry, ServiceHooks, ServiceMethodKind, TenantContext};

struct MtAppInner<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    registry: RwLock<MtServiceRegistry<R, P>>,
    global_hooks: RwLock<ServiceHooks<R, P>>,
    service_hooks: RwLock<HashMap<String, ServiceHooks<R, P>>>,
    config: RwLock<MtConfig>,
}

/// MtApp is the central application container.
///
/// Holds:
/// - service registry
/// - app hooks
/// - per-service hooks
/// - config
///
/// Every call made through [`ServiceHandle`] runs the before-hooks first,
/// which is where tenant scope policies plug in.
pub struct MtApp<R, P = ()>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    inner: Arc<MtAppInner<R, P>>,
}

impl<R, P> Default for MtApp<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, P> Clone for MtApp<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, P> MtApp<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MtAppInner {
                registry: RwLock::new(MtServiceRegistry::new()),
                global_hooks: RwLock::new(ServiceHooks::new()),
                service_hooks: RwLock::new(HashMap::new()),
                config: RwLock::new(MtConfig::new()),
            }),
        }
    }

    pub fn register_service<S>(&self, name: S, service: Arc<dyn MtService<R, P>>)
    where
        S: Into<String>,
    {
        self.inner.registry.write().register(name, service);
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.inner.registry.read().contains(name)
    }

    /// Feathers: `app.hooks({ ... })`
    pub fn hooks<F>(&self, f: F)
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        let mut g = self.inner.global_hooks.write();
        f(&mut g);
    }

    /// Feathers: `app.service("x").hooks({ ... })`, usable before the
    /// service itself is registered.
    pub fn service_hooks<F>(&self, service_name: &str, f: F)
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        let mut map = self.inner.service_hooks.write();
        let hooks = map.entry(service_name.to_string()).or_default();
        f(hooks);
    }

    /// Feathers: `app.service("name")`
    pub fn service(&self, name: &str) -> Result<ServiceHandle<R, P>> {
        let svc = self
            .inner
            .registry
            .read()
            .get(name)
            .ok_or_else(|| MtError::not_found(format!("Service not found: {name}")).into_anyhow())?
            .clone();

        Ok(ServiceHandle {
            app: self.clone(),
            name: name.to_string(),
            service: svc,
        })
    }

    /// Feathers: `app.set(key, value)`
    pub fn set<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.inner.config.write().set(key, value);
    }

    /// Feathers: `app.get(key)`
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.config.read().get(key).map(|v| v.to_string())
    }

    pub fn config_snapshot(&self) -> MtConfigSnapshot {
        self.inner.config.read().snapshot()
    }
}

pub struct ServiceHandle<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    app: MtApp<R, P>,
    name: String,
    service: Arc<dyn MtService<R, P>>,
}

impl<R, P> ServiceHandle<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub fn hooks<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        self.app.service_hooks(&self.name, f);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw service, bypassing every hook.
    pub fn inner(&self) -> &Arc<dyn MtService<R, P>> {
        &self.service
    }
}

// ──────────────────────────────────────────────────────────────
// Pipeline
// ──────────────────────────────────────────────────────────────

impl<R, P> ServiceHandle<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    /// Global hooks first, then the service's own, in registration order.
    fn collect_hooks_for_method(&self, method: &ServiceMethodKind) -> Vec<Arc<dyn BeforeHook<R, P>>> {
        let g = self.app.inner.global_hooks.read();
        let map = self.app.inner.service_hooks.read();

        let mut before = collect_method_hooks(&g.before_all, &g.before_by_method, method);
        if let Some(h) = map.get(&self.name) {
            before.extend(collect_method_hooks(&h.before_all, &h.before_by_method, method));
        }
        before
    }

    fn context(&self, tenant: TenantContext, method: ServiceMethodKind, params: P) -> HookContext<R, P> {
        HookContext::new(tenant, self.name.clone(), method, params, self.app.config_snapshot())
    }

    /// Runs the before-hooks. The first refusal or error stops the chain.
    async fn run_before(&self, ctx: &mut HookContext<R, P>) -> Result<Decision> {
        let hooks = self.collect_hooks_for_method(&ctx.method);

        debug!(
            service = %self.name,
            method = ctx.method.as_str(),
            qualifier = ctx.tenant.qualifier(),
            hooks = hooks.len(),
            "running before hooks"
        );

        for h in &hooks {
            if h.run(ctx).await? == Decision::Refuse {
                debug!(service = %self.name, method = ctx.method.as_str(), "operation refused");
                return Ok(Decision::Refuse);
            }
        }
        Ok(Decision::Proceed)
    }

    /// Loads the row an update/patch/remove targets, straight from the service.
    async fn load_existing(&self, ctx: &mut HookContext<R, P>, id: &str) -> Result<()> {
        let existing = self
            .service
            .get(&ctx.tenant, id, ctx.params.clone())
            .await?;
        ctx.id = Some(id.to_string());
        ctx.existing = Some(existing);
        Ok(())
    }

    fn take_data(ctx: &mut HookContext<R, P>) -> Result<R> {
        ctx.data.take().ok_or_else(|| {
            MtError::general_error(format!("{}() requires data", ctx.method.as_str())).into_anyhow()
        })
    }

    // ──────────────────────────────────────────────────────────────
    // Methods wired through the pipeline
    // ──────────────────────────────────────────────────────────────

    /// A refused read yields no rows.
    pub async fn find(&self, tenant: TenantContext, params: P) -> Result<Vec<R>> {
        let mut ctx = self.context(tenant, ServiceMethodKind::Find, params);

        if self.run_before(&mut ctx).await? == Decision::Refuse {
            return Ok(vec![]);
        }

        self.service.find(&ctx.tenant, ctx.params).await
    }

    pub async fn get(&self, tenant: TenantContext, id: &str, params: P) -> Result<R> {
        let mut ctx = self.context(tenant, ServiceMethodKind::Get, params);
        ctx.id = Some(id.to_string());

        if self.run_before(&mut ctx).await? == Decision::Refuse {
            return Err(MtError::not_found(format!("No record found for id '{id}'")).into_anyhow());
        }

        self.service.get(&ctx.tenant, id, ctx.params).await
    }

    pub async fn create(&self, tenant: TenantContext, data: R, params: P) -> Result<Outcome<R>> {
        let mut ctx = self.context(tenant, ServiceMethodKind::Create, params);
        ctx.data = Some(data);

        if self.run_before(&mut ctx).await? == Decision::Refuse {
            return Ok(Outcome::Refused);
        }

        let data = Self::take_data(&mut ctx)?;
        let created = self.service.create(&ctx.tenant, data, ctx.params).await?;
        Ok(Outcome::Completed(created))
    }

    pub async fn update(&self, tenant: TenantContext, id: &str, data: R, params: P) -> Result<Outcome<R>> {
        let mut ctx = self.context(tenant, ServiceMethodKind::Update, params);
        self.load_existing(&mut ctx, id).await?;
        ctx.data = Some(data);

        if self.run_before(&mut ctx).await? == Decision::Refuse {
            return Ok(Outcome::Refused);
        }

        let data = Self::take_data(&mut ctx)?;
        let updated = self.service.update(&ctx.tenant, id, data, ctx.params).await?;
        Ok(Outcome::Completed(updated))
    }

    pub async fn patch(&self, tenant: TenantContext, id: &str, data: R, params: P) -> Result<Outcome<R>> {
        let mut ctx = self.context(tenant, ServiceMethodKind::Patch, params);
        self.load_existing(&mut ctx, id).await?;
        ctx.data = Some(data);

        if self.run_before(&mut ctx).await? == Decision::Refuse {
            return Ok(Outcome::Refused);
        }

        let data = Self::take_data(&mut ctx)?;
        let patched = self.service.patch(&ctx.tenant, id, data, ctx.params).await?;
        Ok(Outcome::Completed(patched))
    }

    pub async fn remove(&self, tenant: TenantContext, id: &str, params: P) -> Result<Outcome<R>> {
        let mut ctx = self.context(tenant, ServiceMethodKind::Remove, params);
        self.load_existing(&mut ctx, id).await?;

        if self.run_before(&mut ctx).await? == Decision::Refuse {
            return Ok(Outcome::Refused);
        }

        let removed = self.service.remove(&ctx.tenant, id, ctx.params).await?;
        Ok(Outcome::Completed(removed))
    }
}
