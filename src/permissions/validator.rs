use std::sync::Arc;

use tracing::debug;

use super::resolver::{has_all, resolve};
use super::types::{Permissions, FULL_MASK};
use crate::entities::{GuildChannel, PermissionContainer};
use crate::error::{ClientError, Result, ValidationError};
use crate::state::{SharedRegistry, Snapshot};

/// Local fail-fast permission checks against cached state.
///
/// Passing here does not guarantee the remote side agrees (the cache may be
/// behind), but failing here always prevents the request from being sent.
#[derive(Clone)]
pub struct AccessValidator {
    registry: SharedRegistry,
}

impl AccessValidator {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Guild-wide permissions of a member: @everyone plus every assigned role
    pub fn base_permissions(&self, actor: u64, guild_id: u64) -> Result<u64> {
        let snapshot = self.registry.snapshot();
        base_permissions(&snapshot, actor, guild_id)
    }

    /// Effective permissions of `actor` in `channel_id`
    pub fn effective_permissions(&self, actor: u64, channel_id: u64) -> Result<u64> {
        let snapshot = self.registry.snapshot();
        let channel = channel_in(&snapshot, channel_id)?;
        effective_permissions(&snapshot, actor, &channel)
    }

    pub fn check_permission(&self, actor: u64, channel_id: u64, permission: Permissions) -> Result<()> {
        let effective = self.effective_permissions(actor, channel_id)?;
        if has_all(effective, permission) {
            return Ok(());
        }
        debug!(
            "Actor {} lacks {:?} in channel {}",
            actor, permission, channel_id
        );
        Err(ValidationError::InsufficientPermission {
            channel_id,
            required: permission,
        }
        .into())
    }

    /// Can `actor` see the channel at all, and for audio channels also connect to it
    pub fn check_access(&self, actor: u64, channel_id: u64) -> Result<()> {
        let snapshot = self.registry.snapshot();
        let channel = channel_in(&snapshot, channel_id)?;
        let effective = effective_permissions(&snapshot, actor, &channel)?;

        let mut required = vec![Permissions::VIEW_CHANNEL];
        if channel.is_audio() {
            required.push(Permissions::CONNECT);
        }

        for permission in required {
            if !has_all(effective, permission) {
                debug!(
                    "Actor {} has no access to channel {} (missing {:?})",
                    actor, channel_id, permission
                );
                return Err(ValidationError::MissingAccess {
                    channel_id,
                    permission,
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn check_guild_permission(&self, actor: u64, guild_id: u64, permission: Permissions) -> Result<()> {
        let base = self.base_permissions(actor, guild_id)?;
        if has_all(base, permission) || has_all(base, Permissions::ADMINISTRATOR) {
            return Ok(());
        }
        Err(ValidationError::InsufficientGuildPermission {
            guild_id,
            required: permission,
        }
        .into())
    }
}

fn channel_in(snapshot: &Snapshot, channel_id: u64) -> Result<Arc<GuildChannel>> {
    snapshot
        .channel(channel_id)
        .cloned()
        .ok_or(ClientError::UnknownEntity {
            kind: "channel",
            id: channel_id,
        })
}

fn base_permissions(snapshot: &Snapshot, actor: u64, guild_id: u64) -> Result<u64> {
    let guild = snapshot.guild(guild_id).ok_or(ClientError::UnknownEntity {
        kind: "guild",
        id: guild_id,
    })?;
    if guild.owner_id == actor {
        return Ok(FULL_MASK);
    }

    let member = snapshot
        .member(guild_id, actor)
        .ok_or(ClientError::UnknownEntity {
            kind: "member",
            id: actor,
        })?;

    let everyone = snapshot
        .role(guild.everyone_role_id())
        .map(|r| r.permissions)
        .unwrap_or(0);

    Ok(member
        .role_ids
        .iter()
        .filter_map(|id| snapshot.role(*id))
        .fold(everyone, |acc, role| acc | role.permissions))
}

fn effective_permissions(snapshot: &Snapshot, actor: u64, channel: &GuildChannel) -> Result<u64> {
    let guild_id = channel.guild_id();
    let base = base_permissions(snapshot, actor, guild_id)?;
    let member_roles = snapshot
        .member(guild_id, actor)
        .map(|m| m.role_ids.clone())
        .unwrap_or_default();

    let overrides = channel.overrides();
    let role_overrides = overrides
        .role_overrides()
        .filter(|o| o.target_id() == guild_id || member_roles.contains(&o.target_id()));

    Ok(resolve(base, role_overrides, overrides.member_override(actor)))
}
