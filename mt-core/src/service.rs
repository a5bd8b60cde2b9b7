use async_trait::async_trait;

use crate::errors::{MtError, MtResult};
use crate::tenant::TenantContext;

/// Standard service methods, similar to Feathers:
/// find, get, create, update, patch, remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceMethodKind {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl ServiceMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMethodKind::Find => "find",
            ServiceMethodKind::Get => "get",
            ServiceMethodKind::Create => "create",
            ServiceMethodKind::Update => "update",
            ServiceMethodKind::Patch => "patch",
            ServiceMethodKind::Remove => "remove",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, ServiceMethodKind::Find | ServiceMethodKind::Get)
    }
}

/// The persistence collaborator.
///
/// - `find`   → list/query many (honouring the filter in `params`)
/// - `get`    → fetch one by id (also honouring the filter)
/// - `create` → insert one
/// - `update` → full replace
/// - `patch`  → partial update
/// - `remove` → delete one
///
/// All methods have default implementations that return
/// "Method not implemented", so a service can override only
/// what it actually supports.
///
/// Services never enforce tenancy themselves: the pipeline in
/// [`crate::app`] runs the scope hooks before calling them.
#[async_trait]
pub trait MtService<R, P = ()>: Send + Sync
where
    R: Send + 'static,
    P: Send + 'static,
{
    async fn find(&self, _ctx: &TenantContext, _params: P) -> MtResult<Vec<R>> {
        Err(MtError::method_not_allowed("Method not implemented: find").into_anyhow())
    }

    async fn get(&self, _ctx: &TenantContext, _id: &str, _params: P) -> MtResult<R> {
        Err(MtError::method_not_allowed("Method not implemented: get").into_anyhow())
    }

    async fn create(&self, _ctx: &TenantContext, _data: R, _params: P) -> MtResult<R> {
        Err(MtError::method_not_allowed("Method not implemented: create").into_anyhow())
    }

    async fn update(&self, _ctx: &TenantContext, _id: &str, _data: R, _params: P) -> MtResult<R> {
        Err(MtError::method_not_allowed("Method not implemented: update").into_anyhow())
    }

    async fn patch(&self, _ctx: &TenantContext, _id: &str, _data: R, _params: P) -> MtResult<R> {
        Err(MtError::method_not_allowed("Method not implemented: patch").into_anyhow())
    }

    async fn remove(&self, _ctx: &TenantContext, _id: &str, _params: P) -> MtResult<R> {
        Err(MtError::method_not_allowed("Method not implemented: remove").into_anyhow())
    }
}
