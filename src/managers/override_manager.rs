use std::sync::Arc;

use serde_json::json;

use crate::error::{ClientError, Result};
use crate::permissions::{OverrideTarget, Permissions};
use crate::requests::route::channels;
use crate::requests::{Action, SharedRequester};
use crate::state::SharedRegistry;

/// Remote management of channel permission overrides.
///
/// The cache is not touched here; the change comes back through the next snapshot.
pub struct OverrideManager {
    registry: SharedRegistry,
    requester: SharedRequester,
    self_id: u64,
}

impl OverrideManager {
    pub fn new(registry: SharedRegistry, requester: SharedRequester, self_id: u64) -> Self {
        Self {
            registry,
            requester,
            self_id,
        }
    }

    fn route_params(&self, channel_id: u64, target_id: u64) -> Result<[String; 2]> {
        if self.registry.channel(channel_id).is_none() {
            return Err(ClientError::UnknownEntity {
                kind: "channel",
                id: channel_id,
            });
        }
        Ok([channel_id.to_string(), target_id.to_string()])
    }

    fn guarded<T: Send + 'static>(&self, action: Action<T>, channel_id: u64) -> Action<T> {
        action
            .require_access(self.self_id, channel_id)
            .require_permission(self.self_id, channel_id, Permissions::MANAGE_ROLES)
    }

    pub fn delete_override(&self, channel_id: u64, target_id: u64) -> Result<Action<()>> {
        let [channel, target] = self.route_params(channel_id, target_id)?;
        let route = channels::DELETE_PERM_OVERRIDE
            .compile(&[("channel_id", channel.as_str()), ("override_id", target.as_str())])?;
        let action = self.requester.action(route, |_| Ok(()));
        Ok(self.guarded(action, channel_id))
    }

    /// Create or replace the override for `target_id`
    pub fn upsert_override(
        &self,
        channel_id: u64,
        target_id: u64,
        target: OverrideTarget,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<Action<()>> {
        if allow.intersects(deny) {
            return Err(ClientError::invalid_parameter(
                "allow",
                format!("{:?} both allowed and denied", allow & deny),
            ));
        }

        let [channel, target_param] = self.route_params(channel_id, target_id)?;
        let route = channels::MODIFY_PERM_OVERRIDE
            .compile(&[("channel_id", channel.as_str()), ("override_id", target_param.as_str())])?;
        let action = self.requester.action(route, |_| Ok(())).body(json!({
            "type": target.code(),
            "allow": allow.bits().to_string(),
            "deny": deny.bits().to_string(),
        }));
        Ok(self.guarded(action, channel_id))
    }
}

/// Shared override manager type
pub type SharedOverrideManager = Arc<OverrideManager>;

pub fn create_shared_override_manager(
    registry: SharedRegistry,
    requester: SharedRequester,
    self_id: u64,
) -> SharedOverrideManager {
    Arc::new(OverrideManager::new(registry, requester, self_id))
}
