//! Core multi-tenant types.
//!
//! A [`TenantContext`] is created once per inbound request (by the resolver
//! in `mt-scope`) and handed to every service call and hook of that request.
//! It owns the request's qualifier, its primary/tenant classification and the
//! cache through which the tenant identity is resolved lazily.
//!
//! Nothing here is process-global: two requests never share a context, and
//! the only cache that may outlive a request is one explicitly configured as
//! shared, keyed by qualifier.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::errors::{MtError, MtResult};

/// Whether a request runs on the primary site or inside a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    Global,
    Tenant,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Global => "global",
            Context::Tenant => "tenant",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved tenant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantIdentity {
    /// Qualifier the tenant was resolved from.
    pub qualifier: String,
    /// Value rows reference in their ownership field.
    pub id: Value,
    /// The full record as stored.
    pub record: Value,
}

/// The request's qualifier matched no tenant record.
///
/// This is not a failure of the caller. It ends the request: everything
/// that sees it propagates it, and the request boundary answers with a
/// redirect to `location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactiveTenant {
    pub qualifier: String,
    pub location: String,
}

impl InactiveTenant {
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&InactiveTenant> {
        err.chain().find_map(|e| e.downcast_ref::<InactiveTenant>())
    }
}

impl fmt::Display for InactiveTenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tenant '{}' is inactive, redirecting to {}",
            self.qualifier, self.location
        )
    }
}

impl std::error::Error for InactiveTenant {}

/// Looks up a tenant record by qualifier.
///
/// Implementations must not go through scope enforcement, or resolving the
/// tenant would recurse into the policies that need it.
#[async_trait]
pub trait TenantLookup: Send + Sync {
    async fn lookup(&self, qualifier: &str) -> MtResult<Option<TenantIdentity>>;
}

type Slot = Arc<OnceCell<Option<TenantIdentity>>>;

/// Shared caches hold at most this many qualifiers unless told otherwise.
pub const DEFAULT_SHARED_CAPACITY: u64 = 10_000;

enum Backend {
    /// Lives and dies with one request, so it only ever sees that
    /// request's qualifier.
    Request(Mutex<HashMap<String, Slot>>),
    Shared(moka::future::Cache<String, Option<TenantIdentity>>),
}

/// Qualifier → resolved identity (or "not found").
///
/// Each qualifier is looked up at most once per entry lifetime, even when
/// several callers ask concurrently. A shared cache is bounded: entries
/// expire after its ttl and the least used are evicted beyond its capacity.
pub struct ResolutionCache {
    backend: Backend,
    ttl: Option<Duration>,
}

impl ResolutionCache {
    /// A cache meant to be dropped together with its request.
    pub fn request_scoped() -> Self {
        Self {
            backend: Backend::Request(Mutex::new(HashMap::new())),
            ttl: None,
        }
    }

    /// A process-wide cache whose entries expire after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::shared(ttl, DEFAULT_SHARED_CAPACITY)
    }

    /// A process-wide cache holding at most `capacity` qualifiers.
    pub fn shared(ttl: Duration, capacity: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self {
            backend: Backend::Shared(cache),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Cached value for `qualifier`, calling `lookup` on a miss.
    ///
    /// A failed lookup is not cached.
    pub async fn get_or_lookup(
        &self,
        qualifier: &str,
        lookup: &dyn TenantLookup,
    ) -> MtResult<Option<TenantIdentity>> {
        let resolve = async {
            debug!(qualifier, "resolving tenant identity");
            lookup.lookup(qualifier).await
        };

        match &self.backend {
            Backend::Request(slots) => {
                let slot = Arc::clone(slots.lock().entry(qualifier.to_string()).or_default());
                Ok(slot.get_or_try_init(|| resolve).await?.clone())
            }
            Backend::Shared(cache) => cache
                .try_get_with_by_ref(qualifier, resolve)
                .await
                .map_err(|shared| {
                    Arc::try_unwrap(shared).unwrap_or_else(|shared| anyhow::Error::new(SharedLookupFailure(shared)))
                }),
        }
    }

    /// Number of cached qualifiers. For a shared cache this lags behind
    /// until [`ResolutionCache::run_pending_tasks`] has run.
    pub fn len(&self) -> u64 {
        match &self.backend {
            Backend::Request(slots) => slots.lock().len() as u64,
            Backend::Shared(cache) => cache.entry_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply pending expirations and evictions of a shared cache.
    pub async fn run_pending_tasks(&self) {
        if let Backend::Shared(cache) = &self.backend {
            cache.run_pending_tasks().await;
        }
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::request_scoped()
    }
}

impl fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("shared", &matches!(self.backend, Backend::Shared(_)))
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// A lookup failure observed by every caller waiting on the same qualifier.
#[derive(Debug)]
struct SharedLookupFailure(Arc<anyhow::Error>);

impl fmt::Display for SharedLookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedLookupFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &(dyn std::error::Error + Send + Sync + 'static) = (*self.0).as_ref();
        Some(inner)
    }
}

/// Tenancy state of one request.
///
/// Cloning is cheap and clones share the same cache, so every hook and
/// service call of a request sees the same resolution.
#[derive(Clone)]
pub struct TenantContext {
    qualifier: Arc<str>,
    primary: bool,
    inactive_redirect: Arc<str>,
    lookup: Option<Arc<dyn TenantLookup>>,
    cache: Arc<ResolutionCache>,
}

impl TenantContext {
    /// Context for `qualifier`, resolved through `lookup` with a fresh
    /// request-scoped cache. An empty qualifier is the primary site.
    pub fn new<S: Into<String>>(qualifier: S, lookup: Arc<dyn TenantLookup>) -> Self {
        let qualifier: String = qualifier.into();
        Self {
            primary: qualifier.is_empty(),
            qualifier: qualifier.into(),
            inactive_redirect: Arc::from("/"),
            lookup: Some(lookup),
            cache: Arc::new(ResolutionCache::request_scoped()),
        }
    }

    /// Context for work that runs outside any tenant (jobs, admin tasks).
    pub fn global() -> Self {
        Self {
            qualifier: Arc::from(""),
            primary: true,
            inactive_redirect: Arc::from("/"),
            lookup: None,
            cache: Arc::new(ResolutionCache::request_scoped()),
        }
    }

    /// Treat these qualifiers as aliases of the primary site.
    pub fn with_primary_aliases(mut self, aliases: &[String]) -> Self {
        self.primary =
            self.qualifier.is_empty() || aliases.iter().any(|a| a.as_str() == &*self.qualifier);
        self
    }

    /// Use a cache shared beyond this request.
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Where to send the request when the qualifier matches no tenant.
    pub fn with_inactive_redirect(mut self, location: impl Into<String>) -> Self {
        self.inactive_redirect = Arc::from(location.into());
        self
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// True on the primary site: empty qualifier or a primary alias.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn context(&self) -> Context {
        if self.primary {
            Context::Global
        } else {
            Context::Tenant
        }
    }

    pub fn is_tenant(&self) -> bool {
        self.context() == Context::Tenant
    }

    pub fn inactive_redirect(&self) -> &str {
        &self.inactive_redirect
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// The tenant this request belongs to.
    ///
    /// # Errors
    ///
    /// - `Configuration` when called on the primary site.
    /// - [`InactiveTenant`] when no record matches the qualifier; the caller
    ///   must let it reach the request boundary.
    /// - whatever the lookup itself fails with.
    pub async fn tenant(&self) -> MtResult<TenantIdentity> {
        if self.primary {
            return Err(MtError::configuration(
                "tenant() cannot be called from primary domain context",
            )
            .into_anyhow());
        }

        let lookup = self.lookup.as_ref().ok_or_else(|| {
            MtError::configuration("no tenant lookup attached to this request").into_anyhow()
        })?;

        match self.cache.get_or_lookup(&self.qualifier, lookup.as_ref()).await? {
            Some(identity) => Ok(identity),
            None => {
                warn!(
                    qualifier = %self.qualifier,
                    location = %self.inactive_redirect,
                    "no active tenant for qualifier"
                );
                Err(anyhow::Error::new(InactiveTenant {
                    qualifier: self.qualifier.to_string(),
                    location: self.inactive_redirect.to_string(),
                }))
            }
        }
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantContext")
            .field("qualifier", &self.qualifier)
            .field("primary", &self.primary)
            .field("inactive_redirect", &self.inactive_redirect)
            .field("cache", &self.cache)
            .finish()
    }
}
