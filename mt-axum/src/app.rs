use std::sync::Arc;

use axum::handler::Handler;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use mt_core::{MtApp, MtService};
use mt_scope::TenantResolver;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middlewares::tenancy;
use crate::params::FromRestQuery;
use crate::rest;
use crate::MtAxumState;

/// An [`MtApp`] served over HTTP.
///
/// Every route runs behind the tenancy middleware, so handlers and services
/// always see the request's tenant context.
pub struct AxumApp<R, P = ()>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub app: MtApp<R, P>,
    pub resolver: TenantResolver,
    router: Router<()>,
}

impl<R, P> Clone for AxumApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
            resolver: self.resolver.clone(),
            router: self.router.clone(),
        }
    }
}

impl<R, P> AxumApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    pub fn new(app: MtApp<R, P>, resolver: TenantResolver) -> Self {
        Self {
            app,
            resolver,
            router: Router::new(),
        }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    pub fn use_get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        let router = Router::new().route("/", get(handler));
        self.use_router(path, router)
    }

    /// Register `service` on the app under `path` (without the leading `/`)
    /// and mount its REST routes there.
    pub fn use_service(mut self, path: &str, service: Arc<dyn MtService<R, P>>) -> Self
    where
        R: Serialize + DeserializeOwned,
        P: FromRestQuery,
    {
        let name = path.trim_start_matches('/');
        self.app.register_service(name, service);

        let service_name = Arc::new(name.to_string());
        let router = rest::service_router(service_name, MtAxumState::new(self.app.clone()));

        self.router = self.router.nest(path, router);
        self
    }

    /// The finished router: every route wrapped in request tracing and
    /// tenancy resolution.
    pub fn into_router(self) -> Router<()> {
        self.router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(self.resolver, tenancy)),
        )
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.into_router()).await?;
        Ok(())
    }
}

pub fn axum<R, P>(app: MtApp<R, P>, resolver: TenantResolver) -> AxumApp<R, P>
where
    R: Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    AxumApp::new(app, resolver)
}
