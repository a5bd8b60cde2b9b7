use std::sync::Arc;

use mt_core::{Entity, MtApp};
use tracing::debug;

use crate::options::TenancyOptions;
use crate::policy::{ScopeParams, ScopePolicy};

/// Register the configured scope policy of every collection as a before-hook
/// on that service. Services may be registered before or after this call.
pub fn install_policies<R, P>(app: &MtApp<R, P>, options: &TenancyOptions)
where
    R: Entity + 'static,
    P: ScopeParams,
{
    for (service, config) in &options.policies {
        let policy = ScopePolicy::for_collection(service, config, options);
        debug!(
            service = %service,
            kind = %policy.kind(),
            owner_field = policy.owner_field(),
            "installing scope policy"
        );
        app.service_hooks(service, |hooks| {
            hooks.before_all(Arc::new(policy));
        });
    }
}
