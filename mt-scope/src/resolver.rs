//! Tenant resolution: request → qualifier → per-request [`TenantContext`].

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use mt_core::{
    Entity, MtApp, MtError, MtResult, Query, ResolutionCache, TenantContext, TenantIdentity,
    TenantLookup,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::options::{CachePolicy, OptionsError, TenancyOptions, TenantModel};
use crate::policy::ScopeParams;
use crate::redirect::redirect_target;
use crate::request::RequestInfo;
use crate::strategy::{source_for, QualifierSource};

/// Builds the tenancy context of each request.
///
/// Holds no per-request state. The only cache it owns is the shared one,
/// and only when the options ask for it.
#[derive(Clone)]
pub struct TenantResolver {
    options: Arc<TenancyOptions>,
    source: Arc<dyn QualifierSource>,
    lookup: Arc<dyn TenantLookup>,
    shared_cache: Option<Arc<ResolutionCache>>,
}

impl TenantResolver {
    pub fn new(options: TenancyOptions, lookup: Arc<dyn TenantLookup>) -> Result<Self, OptionsError> {
        options.validate()?;

        let source = source_for(&options.strategy, &options.primary_domain);
        let shared_cache = match options.cache {
            CachePolicy::Request => None,
            CachePolicy::Shared { ttl, capacity } => Some(Arc::new(ResolutionCache::shared(ttl, capacity))),
        };

        Ok(Self {
            options: Arc::new(options),
            source,
            lookup,
            shared_cache,
        })
    }

    /// Resolver whose lookups go to `options.model.service` on `app`.
    pub fn for_app<R, P>(app: &MtApp<R, P>, options: TenancyOptions) -> Result<Self, OptionsError>
    where
        R: Entity + Serialize + 'static,
        P: ScopeParams,
    {
        let lookup = Arc::new(ServiceTenantLookup::new(app.clone(), &options.model));
        Self::new(options, lookup)
    }

    /// Replace the configured strategy.
    pub fn with_source(mut self, source: Arc<dyn QualifierSource>) -> Self {
        self.source = source;
        self
    }

    pub fn options(&self) -> &TenancyOptions {
        &self.options
    }

    pub fn shared_cache(&self) -> Option<&Arc<ResolutionCache>> {
        self.shared_cache.as_ref()
    }

    pub fn qualifier(&self, request: &RequestInfo) -> String {
        self.source.qualifier(request)
    }

    /// Empty, or one of the primary subdomains.
    pub fn is_primary_qualifier(&self, qualifier: &str) -> bool {
        qualifier.is_empty() || self.options.primary_subdomains.iter().any(|s| s == qualifier)
    }

    /// Context for one request. The qualifier is computed here, once.
    pub fn for_request(&self, request: &RequestInfo) -> TenantContext {
        let qualifier = self.qualifier(request);
        let location = redirect_target(&self.options, request);

        debug!(
            server_name = %request.server_name,
            qualifier = %qualifier,
            primary = self.is_primary_qualifier(&qualifier),
            "tenant context created"
        );

        let ctx = TenantContext::new(qualifier, Arc::clone(&self.lookup))
            .with_primary_aliases(&self.options.primary_subdomains)
            .with_inactive_redirect(location);

        match &self.shared_cache {
            Some(cache) => ctx.with_cache(Arc::clone(cache)),
            None => ctx,
        }
    }
}

impl std::fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantResolver")
            .field("options", &self.options)
            .field("shared_cache", &self.shared_cache)
            .finish()
    }
}

/// Looks tenants up in a service of the app.
///
/// Calls go through the hook pipeline with unscoped params, so a scope
/// policy on the tenant collection lets them through.
pub struct ServiceTenantLookup<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    app: MtApp<R, P>,
    service: String,
    field: String,
    identity_field: String,
    conditions: Map<String, Value>,
    _params: PhantomData<fn() -> P>,
}

impl<R, P> ServiceTenantLookup<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub fn new(app: MtApp<R, P>, model: &TenantModel) -> Self {
        Self {
            app,
            service: model.service.clone(),
            field: model.field.clone(),
            identity_field: model.identity_field.clone(),
            conditions: model.conditions.clone(),
            _params: PhantomData,
        }
    }

    fn query(&self, qualifier: &str) -> Query {
        let mut query = Query::new().and_eq(self.field.clone(), qualifier);
        for (field, value) in &self.conditions {
            query = query.and_eq(field.clone(), value.clone());
        }
        query
    }
}

#[async_trait]
impl<R, P> TenantLookup for ServiceTenantLookup<R, P>
where
    R: Entity + Serialize + 'static,
    P: ScopeParams,
{
    #[instrument(skip(self), fields(service = %self.service))]
    async fn lookup(&self, qualifier: &str) -> MtResult<Option<TenantIdentity>> {
        let rows = self
            .app
            .service(&self.service)?
            .find(TenantContext::global(), P::unscoped(self.query(qualifier)))
            .await?;

        let Some(row) = rows.into_iter().next() else {
            debug!("no tenant record matched");
            return Ok(None);
        };

        let id = row
            .field(&self.identity_field)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                MtError::configuration(format!(
                    "tenant record in '{}' has no '{}' field",
                    self.service, self.identity_field
                ))
                .into_anyhow()
            })?;

        let record = serde_json::to_value(&row).map_err(|e| {
            MtError::configuration(format!("tenant record in '{}' is not serializable", self.service))
                .with_source(e.into())
                .into_anyhow()
        })?;

        debug!(id = %id, "tenant resolved");
        Ok(Some(TenantIdentity {
            qualifier: qualifier.to_string(),
            id,
            record,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mt_core::{Context, InactiveTenant, MemoryService, ServiceParams};
    use serde_json::json;

    fn app() -> (MtApp<Value, ServiceParams>, Arc<MemoryService>) {
        let app = MtApp::new();
        let accounts = Arc::new(MemoryService::with_rows(vec![
            json!({"id": 7, "domain": "acme", "is_active": true}),
            json!({"id": 8, "domain": "sleepy", "is_active": false}),
            json!({"id": 9, "domain": "broken", "uuid": null}),
        ]));
        app.register_service("accounts", accounts.clone());
        (app, accounts)
    }

    fn options() -> TenancyOptions {
        let mut model = TenantModel::default();
        model.conditions.insert("is_active".to_string(), json!(true));
        TenancyOptions::builder()
            .primary_domain("app.test")
            .primary_subdomains(["www", "admin"])
            .redirect_inactive("/inactive")
            .model(model)
            .build()
    }

    #[test]
    fn invalid_options_are_rejected() {
        let (app, _) = app();
        let err = TenantResolver::for_app(&app, TenancyOptions::default()).unwrap_err();
        assert_eq!(err, OptionsError::MissingPrimaryDomain);
    }

    #[test]
    fn context_is_global_for_primary_aliases() {
        let (app, _) = app();
        let resolver = TenantResolver::for_app(&app, options()).unwrap();

        for host in ["app.test", "www.app.test", "admin.app.test", "elsewhere.test"] {
            let ctx = resolver.for_request(&RequestInfo::new(host));
            assert_eq!(ctx.context(), Context::Global, "{host}");
        }
        let ctx = resolver.for_request(&RequestInfo::new("acme.app.test"));
        assert_eq!(ctx.context(), Context::Tenant);
        assert_eq!(ctx.qualifier(), "acme");
    }

    #[tokio::test]
    async fn lookup_applies_model_conditions() {
        let (app, _) = app();
        let resolver = TenantResolver::for_app(&app, options()).unwrap();

        let acme = resolver
            .for_request(&RequestInfo::new("acme.app.test"))
            .tenant()
            .await
            .unwrap();
        assert_eq!(acme.id, json!(7));
        assert_eq!(acme.record["domain"], json!("acme"));

        let err = resolver
            .for_request(&RequestInfo::new("sleepy.app.test"))
            .tenant()
            .await
            .unwrap_err();
        assert_eq!(
            InactiveTenant::from_anyhow(&err).map(|i| i.location.as_str()),
            Some("http://app.test/inactive")
        );
    }

    #[tokio::test]
    async fn missing_identity_field_is_a_configuration_error() {
        let (app, _) = app();
        let mut opts = options();
        opts.model.conditions.clear();
        opts.model.identity_field = "uuid".to_string();
        let resolver = TenantResolver::for_app(&app, opts).unwrap();

        let err = resolver
            .for_request(&RequestInfo::new("broken.app.test"))
            .tenant()
            .await
            .unwrap_err();
        assert!(mt_core::is_kind(&err, mt_core::ErrorKind::Configuration));
    }

    #[tokio::test]
    async fn request_caches_are_not_shared_between_requests() {
        let (app, accounts) = app();
        let resolver = TenantResolver::for_app(&app, options()).unwrap();
        let request = RequestInfo::new("acme.app.test");

        resolver.for_request(&request).tenant().await.unwrap();
        resolver.for_request(&request).tenant().await.unwrap();

        assert!(resolver.shared_cache().is_none());
        assert_eq!(accounts.find_calls(), 2);
    }

    #[tokio::test]
    async fn shared_cache_spans_requests() {
        let (app, accounts) = app();
        let mut opts = options();
        opts.cache = CachePolicy::shared(std::time::Duration::from_secs(60));
        let resolver = TenantResolver::for_app(&app, opts).unwrap();
        let request = RequestInfo::new("acme.app.test");

        resolver.for_request(&request).tenant().await.unwrap();
        resolver.for_request(&request).tenant().await.unwrap();
        resolver
            .for_request(&RequestInfo::new("sleepy.app.test"))
            .tenant()
            .await
            .unwrap_err();

        assert_eq!(accounts.find_calls(), 2);
        let cache = resolver.shared_cache().unwrap();
        cache.run_pending_tasks().await;
        assert_eq!(cache.len(), 2);
    }
}
