//! Row-level scope policies.
//!
//! A [`ScopePolicy`] is a before-hook installed on one collection. It reads
//! the request's context and tenant from [`HookContext::tenant`] and then,
//! depending on its [`ScopeKind`], narrows reads, stamps ownership on new
//! rows, refuses writes or fails them with a `DataScopeViolation`.
//!
//! | kind         | tenant reads            | tenant writes              | global context |
//! |--------------|-------------------------|----------------------------|----------------|
//! | `GlobalOnly` | unfiltered              | refused                    | allowed        |
//! | `TenantOnly` | own rows                | own rows, stamped          | violation      |
//! | `Mixed`      | own rows + global rows  | own rows, stamped          | allowed        |
//! | `Unscoped`   | unfiltered              | stamped when owner unset   | allowed        |

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use mt_core::{
    BeforeHook, Condition, Decision, Entity, HookContext, MtError, Query, ServiceMethodKind, ServiceParams,
    TenantIdentity,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::options::{OptionsError, PolicyConfig, TenancyOptions};

/// Params a scope policy can inspect and narrow.
pub trait ScopeParams: Send + Clone + 'static {
    /// True for internal calls that must bypass every policy.
    fn skip_scope(&self) -> bool;

    fn query_mut(&mut self) -> &mut Query;

    /// Params for an internal, unscoped call.
    fn unscoped(query: Query) -> Self;
}

impl ScopeParams for ServiceParams {
    fn skip_scope(&self) -> bool {
        self.skip_scope
    }

    fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    fn unscoped(query: Query) -> Self {
        ServiceParams::unscoped(query)
    }
}

/// How a collection relates to tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Shared reference data, writable only from the primary site.
    GlobalOnly,
    /// Every row belongs to exactly one tenant; no access from the primary site.
    TenantOnly,
    /// Tenant rows plus global rows marked with the sentinel owner.
    Mixed,
    /// Not isolated; new rows still record the tenant that created them.
    Unscoped,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::GlobalOnly => "global_only",
            ScopeKind::TenantOnly => "tenant_only",
            ScopeKind::Mixed => "mixed",
            ScopeKind::Unscoped => "unscoped",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global_only" | "global" => Ok(ScopeKind::GlobalOnly),
            "tenant_only" | "tenant" => Ok(ScopeKind::TenantOnly),
            "mixed" => Ok(ScopeKind::Mixed),
            "unscoped" | "none" => Ok(ScopeKind::Unscoped),
            other => Err(OptionsError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Scope enforcement for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopePolicy {
    kind: ScopeKind,
    foreign_key_field: String,
    global_value: Value,
    /// Set when the collection holds the tenant records themselves.
    identity_field: Option<String>,
}

impl ScopePolicy {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            foreign_key_field: "account_id".to_string(),
            global_value: Value::from(0),
            identity_field: None,
        }
    }

    pub fn global_only() -> Self {
        Self::new(ScopeKind::GlobalOnly)
    }

    pub fn tenant_only() -> Self {
        Self::new(ScopeKind::TenantOnly)
    }

    pub fn mixed() -> Self {
        Self::new(ScopeKind::Mixed)
    }

    pub fn unscoped() -> Self {
        Self::new(ScopeKind::Unscoped)
    }

    /// Policy for `service` as configured, with `options.scope` as defaults.
    /// The tenant model's own collection is owned through its identity field.
    pub fn for_collection(service: &str, config: &PolicyConfig, options: &TenancyOptions) -> Self {
        let mut policy = Self::new(config.kind)
            .foreign_key_field(
                config
                    .foreign_key_field
                    .clone()
                    .unwrap_or_else(|| options.scope.foreign_key_field.clone()),
            )
            .global_value(
                config
                    .global_value
                    .clone()
                    .unwrap_or_else(|| options.scope.global_value.clone()),
            );
        if service == options.model.service {
            policy = policy.identity_collection(options.model.identity_field.clone());
        }
        policy
    }

    pub fn foreign_key_field(mut self, field: impl Into<String>) -> Self {
        self.foreign_key_field = field.into();
        self
    }

    pub fn global_value(mut self, value: impl Into<Value>) -> Self {
        self.global_value = value.into();
        self
    }

    /// Mark the collection as the tenant records, owned via `identity_field`.
    pub fn identity_collection(mut self, identity_field: impl Into<String>) -> Self {
        self.identity_field = Some(identity_field.into());
        self
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Field that names a row's owner.
    pub fn owner_field(&self) -> &str {
        self.identity_field.as_deref().unwrap_or(&self.foreign_key_field)
    }

    fn is_identity_collection(&self) -> bool {
        self.identity_field.is_some()
    }

    fn narrow<P: ScopeParams>(&self, params: &mut P, tenant: &TenantIdentity) {
        let query = params.query_mut();
        match self.kind {
            ScopeKind::TenantOnly => query.push(Condition::eq(self.owner_field(), tenant.id.clone())),
            ScopeKind::Mixed => query.push(Condition::is_in(
                self.owner_field(),
                vec![self.global_value.clone(), tenant.id.clone()],
            )),
            ScopeKind::GlobalOnly | ScopeKind::Unscoped => {}
        }
    }

    fn stamp<R: Entity>(&self, data: &mut Option<R>, tenant: &TenantIdentity) {
        if let Some(row) = data.as_mut() {
            row.set_field(&self.foreign_key_field, tenant.id.clone());
        }
    }

    /// Fails unless `row` is owned by `tenant`.
    fn ensure_owner<R, P>(&self, ctx: &HookContext<R, P>, row: Option<&R>, tenant: &TenantIdentity) -> Result<()>
    where
        R: Entity,
    {
        let owner = row.and_then(|r| r.field(self.owner_field()));
        if owner.is_some_and(|o| same_value(o, &tenant.id)) {
            return Ok(());
        }
        Err(self.violation(ctx, row, tenant))
    }

    /// Fails when an incoming row names an owner other than `tenant`.
    fn ensure_incoming_owner<R, P>(&self, ctx: &HookContext<R, P>, tenant: &TenantIdentity) -> Result<()>
    where
        R: Entity,
    {
        let incoming = ctx
            .data
            .as_ref()
            .and_then(|d| d.field(self.owner_field()))
            .filter(|v| !v.is_null());
        match incoming {
            Some(owner) if !same_value(owner, &tenant.id) => Err(self.violation(ctx, ctx.existing.as_ref(), tenant)),
            _ => Ok(()),
        }
    }

    fn violation<R, P>(&self, ctx: &HookContext<R, P>, row: Option<&R>, tenant: &TenantIdentity) -> anyhow::Error
    where
        R: Entity,
    {
        let row_id = row_id(ctx, row);
        warn!(
            service = %ctx.service_name,
            method = ctx.method.as_str(),
            tenant = %display(&tenant.id),
            row = %row_id,
            "data scope violation"
        );
        MtError::data_scope_violation(format!(
            "Tenant->id:{} does not own {}->id:{}",
            display(&tenant.id),
            ctx.service_name,
            row_id
        ))
        .into_anyhow()
    }

    fn accessed_globally<R, P>(&self, ctx: &HookContext<R, P>) -> anyhow::Error {
        warn!(
            service = %ctx.service_name,
            method = ctx.method.as_str(),
            "tenant scoped collection accessed globally"
        );
        MtError::data_scope_violation("Tenant Scoped accessed globally").into_anyhow()
    }

    fn run_global_only<R, P>(&self, ctx: &HookContext<R, P>) -> Decision {
        if ctx.tenant.is_tenant() && !ctx.method.is_read() {
            debug!(
                service = %ctx.service_name,
                method = ctx.method.as_str(),
                "global collection is read-only for tenants"
            );
            return Decision::Refuse;
        }
        Decision::Proceed
    }

    async fn run_tenant_only<R, P>(&self, ctx: &mut HookContext<R, P>) -> Result<Decision>
    where
        R: Entity + 'static,
        P: ScopeParams,
    {
        if !ctx.tenant.is_tenant() {
            return Err(self.accessed_globally(ctx));
        }
        let tenant = ctx.tenant.tenant().await?;

        match ctx.method {
            ServiceMethodKind::Find | ServiceMethodKind::Get => self.narrow(&mut ctx.params, &tenant),
            ServiceMethodKind::Create => {
                if !self.is_identity_collection() {
                    self.stamp(&mut ctx.data, &tenant);
                }
            }
            ServiceMethodKind::Update | ServiceMethodKind::Patch => {
                self.ensure_owner(ctx, ctx.existing.as_ref(), &tenant)?;
                self.ensure_incoming_owner(ctx, &tenant)?;
                if ctx.method == ServiceMethodKind::Update && !self.is_identity_collection() {
                    self.stamp(&mut ctx.data, &tenant);
                }
            }
            ServiceMethodKind::Remove => self.ensure_owner(ctx, ctx.existing.as_ref(), &tenant)?,
        }
        Ok(Decision::Proceed)
    }

    async fn run_mixed<R, P>(&self, ctx: &mut HookContext<R, P>) -> Result<Decision>
    where
        R: Entity + 'static,
        P: ScopeParams,
    {
        if !ctx.tenant.is_tenant() {
            return Ok(Decision::Proceed);
        }
        let tenant = ctx.tenant.tenant().await?;

        match ctx.method {
            ServiceMethodKind::Find | ServiceMethodKind::Get => self.narrow(&mut ctx.params, &tenant),
            ServiceMethodKind::Create => self.stamp(&mut ctx.data, &tenant),
            ServiceMethodKind::Update | ServiceMethodKind::Patch => {
                if self.is_global_row(ctx.existing.as_ref()) {
                    let row_id = row_id(ctx, ctx.existing.as_ref());
                    warn!(service = %ctx.service_name, row = %row_id, "tenant tried to update a global record");
                    return Err(MtError::data_scope_violation(format!(
                        "Tenant->id:{} cannot update global record {}->id:{}",
                        display(&tenant.id),
                        ctx.service_name,
                        row_id
                    ))
                    .into_anyhow());
                }
                self.ensure_owner(ctx, ctx.existing.as_ref(), &tenant)?;
                self.ensure_incoming_owner(ctx, &tenant)?;
                if ctx.method == ServiceMethodKind::Update {
                    self.stamp(&mut ctx.data, &tenant);
                }
            }
            ServiceMethodKind::Remove => {
                if self.is_global_row(ctx.existing.as_ref()) {
                    debug!(service = %ctx.service_name, "tenant cannot delete a global record");
                    return Ok(Decision::Refuse);
                }
                self.ensure_owner(ctx, ctx.existing.as_ref(), &tenant)?;
            }
        }
        Ok(Decision::Proceed)
    }

    async fn run_unscoped<R, P>(&self, ctx: &mut HookContext<R, P>) -> Result<Decision>
    where
        R: Entity + 'static,
        P: ScopeParams,
    {
        if ctx.method != ServiceMethodKind::Create || !ctx.tenant.is_tenant() {
            return Ok(Decision::Proceed);
        }
        let unset = ctx
            .data
            .as_ref()
            .is_some_and(|d| d.is_unset(&self.foreign_key_field));
        if unset {
            let tenant = ctx.tenant.tenant().await?;
            self.stamp(&mut ctx.data, &tenant);
        }
        Ok(Decision::Proceed)
    }

    fn is_global_row<R: Entity>(&self, row: Option<&R>) -> bool {
        row.and_then(|r| r.field(self.owner_field()))
            .is_some_and(|owner| same_value(owner, &self.global_value))
    }
}

#[async_trait]
impl<R, P> BeforeHook<R, P> for ScopePolicy
where
    R: Entity + 'static,
    P: ScopeParams,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<Decision> {
        if ctx.params.skip_scope() {
            return Ok(Decision::Proceed);
        }

        match self.kind {
            ScopeKind::GlobalOnly => Ok(self.run_global_only(ctx)),
            ScopeKind::TenantOnly => self.run_tenant_only(ctx).await,
            ScopeKind::Mixed => self.run_mixed(ctx).await,
            ScopeKind::Unscoped => self.run_unscoped(ctx).await,
        }
    }
}

/// Owner comparison; must agree with [`Condition::matches`] so a row a tenant
/// cannot read is never one it can change.
fn same_value(a: &Value, b: &Value) -> bool {
    a == b
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_id<R: Entity, P>(ctx: &HookContext<R, P>, row: Option<&R>) -> String {
    row.and_then(|r| r.id())
        .map(|id| display(&id))
        .or_else(|| ctx.id.clone())
        .unwrap_or_else(|| "new".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mt_core::{is_kind, ErrorKind, MtConfigSnapshot, MtResult, TenantContext, TenantLookup};
    use serde_json::json;
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct Acme;

    #[async_trait]
    impl TenantLookup for Acme {
        async fn lookup(&self, qualifier: &str) -> MtResult<Option<TenantIdentity>> {
            Ok((qualifier == "acme").then(|| TenantIdentity {
                qualifier: qualifier.to_string(),
                id: json!(7),
                record: json!({"id": 7, "domain": "acme"}),
            }))
        }
    }

    fn tenant() -> TenantContext {
        TenantContext::new("acme", Arc::new(Acme))
    }

    fn ctx(tenant: TenantContext, method: ServiceMethodKind) -> HookContext<Value, ServiceParams> {
        HookContext::new(tenant, "posts", method, ServiceParams::default(), MtConfigSnapshot::default())
    }

    async fn run(policy: &ScopePolicy, ctx: &mut HookContext<Value, ServiceParams>) -> Result<Decision> {
        BeforeHook::<Value, ServiceParams>::run(policy, ctx).await
    }

    #[test]
    fn kind_parses_aliases() {
        assert_eq!("Tenant".parse::<ScopeKind>().unwrap(), ScopeKind::TenantOnly);
        assert_eq!("none".parse::<ScopeKind>().unwrap(), ScopeKind::Unscoped);
        assert!("whatever".parse::<ScopeKind>().is_err());
    }

    #[test]
    fn owners_compare_like_the_read_filter() {
        assert!(same_value(&json!(7), &json!(7)));
        assert!(!same_value(&json!(7), &json!("7")));
        assert!(!same_value(&json!(0), &json!(null)));
        assert_eq!(
            same_value(&json!("7"), &json!(7)),
            Condition::eq("account_id", json!(7)).matches(&json!({"account_id": "7"}))
        );
    }

    #[tokio::test]
    async fn tenant_only_filters_the_identity_collection_on_its_identity_field() {
        let policy = ScopePolicy::tenant_only().identity_collection("id");
        let mut c = ctx(tenant(), ServiceMethodKind::Find);

        run(&policy, &mut c).await.unwrap();
        assert_eq!(c.params.query, Query::new().and_eq("id", 7));
    }

    #[tokio::test]
    async fn tenant_only_update_checks_incoming_owner() {
        let policy = ScopePolicy::tenant_only();
        let mut c = ctx(tenant(), ServiceMethodKind::Patch);
        c.id = Some("3".to_string());
        c.existing = Some(json!({"id": 3, "account_id": 7}));
        c.data = Some(json!({"account_id": 8}));

        let err = run(&policy, &mut c).await.unwrap_err();
        let mt = MtError::from_anyhow(&err).unwrap();
        assert_eq!(mt.kind, ErrorKind::DataScopeViolation);
        assert_eq!(mt.message, "Tenant->id:7 does not own posts->id:3");
    }

    #[tokio::test]
    async fn update_keeps_the_owner_on_replaced_rows() {
        let policy = ScopePolicy::mixed();
        let mut c = ctx(tenant(), ServiceMethodKind::Update);
        c.existing = Some(json!({"id": 3, "account_id": 7}));
        c.data = Some(json!({"title": "new"}));

        assert_eq!(run(&policy, &mut c).await.unwrap(), Decision::Proceed);
        assert_eq!(c.data, Some(json!({"title": "new", "account_id": 7})));
    }

    #[tokio::test]
    async fn mixed_update_of_global_row_is_a_violation() {
        let policy = ScopePolicy::mixed();
        let mut c = ctx(tenant(), ServiceMethodKind::Patch);
        c.existing = Some(json!({"id": 1, "account_id": 0}));
        c.data = Some(json!({"title": "mine now"}));

        let err = run(&policy, &mut c).await.unwrap_err();
        assert!(is_kind(&err, ErrorKind::DataScopeViolation));
    }

    #[tokio::test]
    #[traced_test]
    async fn violations_are_logged() {
        let policy = ScopePolicy::mixed();
        let mut c = ctx(tenant(), ServiceMethodKind::Remove);
        c.id = Some("4".to_string());
        c.existing = Some(json!({"id": 4, "account_id": 8}));

        assert!(run(&policy, &mut c).await.is_err());
        assert!(logs_contain("data scope violation"));
    }

    #[tokio::test]
    async fn global_only_refuses_tenant_writes_only() {
        let policy = ScopePolicy::global_only();

        for method in [ServiceMethodKind::Create, ServiceMethodKind::Patch, ServiceMethodKind::Remove] {
            let mut c = ctx(tenant(), method);
            assert_eq!(run(&policy, &mut c).await.unwrap(), Decision::Refuse);

            let mut c = ctx(TenantContext::global(), method);
            assert_eq!(run(&policy, &mut c).await.unwrap(), Decision::Proceed);
        }

        let mut c = ctx(tenant(), ServiceMethodKind::Find);
        assert_eq!(run(&policy, &mut c).await.unwrap(), Decision::Proceed);
        assert!(c.params.query.is_empty());
    }

    #[tokio::test]
    async fn skip_scope_bypasses_every_policy() {
        for policy in [
            ScopePolicy::tenant_only(),
            ScopePolicy::mixed(),
            ScopePolicy::global_only(),
            ScopePolicy::unscoped(),
        ] {
            let mut c = HookContext::new(
                TenantContext::global(),
                "posts",
                ServiceMethodKind::Find,
                ServiceParams::unscoped(Query::new()),
                MtConfigSnapshot::default(),
            );
            assert_eq!(run(&policy, &mut c).await.unwrap(), Decision::Proceed);
            assert!(c.params.query.is_empty());
        }
    }

    #[test]
    fn for_collection_merges_defaults() {
        let options = TenancyOptions::builder()
            .primary_domain("app.test")
            .build();

        let posts = ScopePolicy::for_collection(
            "posts",
            &PolicyConfig::new(ScopeKind::Mixed).global_value(-1),
            &options,
        );
        assert_eq!(posts.owner_field(), "account_id");
        assert_eq!(posts.global_value, json!(-1));

        let accounts = ScopePolicy::for_collection("accounts", &PolicyConfig::new(ScopeKind::TenantOnly), &options);
        assert_eq!(accounts.owner_field(), "id");
    }
}
