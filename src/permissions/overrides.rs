use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::Permissions;
use crate::entities::{Guild, GuildChannel, Member, PermissionContainer, Role};
use crate::error::{ClientError, Result};
use crate::state::EntityRef;

/// Who an override applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverrideTarget {
    Role,
    Member,
}

impl OverrideTarget {
    /// Wire code used by the remote API (0 = role, 1 = member)
    pub fn code(&self) -> u8 {
        match self {
            OverrideTarget::Role => 0,
            OverrideTarget::Member => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(OverrideTarget::Role),
            1 => Ok(OverrideTarget::Member),
            other => Err(ClientError::invalid_parameter(
                "type",
                format!("unknown override type {}", other),
            )),
        }
    }
}

/// Resolved holder of an override
#[derive(Debug, Clone)]
pub enum PermissionHolder {
    Role(Arc<Role>),
    Member(Arc<Member>),
}

/// Per-target allow/deny masks attached to a channel.
///
/// A bit is never both allowed and denied: the constructor resolves overlap in
/// favour of deny and the setters are last-writer-wins.
#[derive(Clone)]
pub struct PermissionOverride {
    target_id: u64,
    target: OverrideTarget,
    allow: u64,
    deny: u64,
    channel: EntityRef<GuildChannel>,
}

impl PermissionOverride {
    pub fn new(
        target_id: u64,
        target: OverrideTarget,
        allow: u64,
        deny: u64,
        channel: EntityRef<GuildChannel>,
    ) -> Self {
        let overlap = allow & deny;
        if overlap != 0 {
            warn!(
                "Override for {} in channel {} allows and denies {:?}, keeping deny",
                target_id,
                channel.id(),
                Permissions::from_bits_retain(overlap)
            );
        }
        Self {
            target_id,
            target,
            allow: allow & !deny,
            deny,
            channel,
        }
    }

    pub fn target_id(&self) -> u64 {
        self.target_id
    }

    pub fn target(&self) -> OverrideTarget {
        self.target
    }

    pub fn is_role_override(&self) -> bool {
        self.target == OverrideTarget::Role
    }

    pub fn is_member_override(&self) -> bool {
        self.target == OverrideTarget::Member
    }

    pub fn allowed_raw(&self) -> u64 {
        self.allow
    }

    pub fn denied_raw(&self) -> u64 {
        self.deny
    }

    /// Bits neither allowed nor denied, inherited from the level above
    pub fn inherit_raw(&self) -> u64 {
        !(self.allow | self.deny)
    }

    pub fn allowed(&self) -> Permissions {
        Permissions::from_bits_truncate(self.allow)
    }

    pub fn denied(&self) -> Permissions {
        Permissions::from_bits_truncate(self.deny)
    }

    pub fn inherited(&self) -> Permissions {
        Permissions::from_bits_truncate(self.inherit_raw())
    }

    pub fn channel_id(&self) -> u64 {
        self.channel.id()
    }

    pub fn channel_ref(&self) -> &EntityRef<GuildChannel> {
        &self.channel
    }

    /// Owning channel, re-resolved from the registry with `held` as stale fallback
    pub fn channel(&self, held: &Arc<GuildChannel>) -> Result<Arc<GuildChannel>> {
        self.channel.resolve_or_stale(held)
    }

    /// Guild of the (re-resolved) owning channel
    pub fn guild(&self, held: &Arc<GuildChannel>) -> Result<Arc<Guild>> {
        let channel = self.channel(held)?;
        let guild_id = channel.guild_id();
        let registry = self.channel.registry().ok_or(ClientError::UnknownEntity {
            kind: "guild",
            id: guild_id,
        })?;
        registry.guild(guild_id).ok_or(ClientError::UnknownEntity {
            kind: "guild",
            id: guild_id,
        })
    }

    /// Role or member this override targets, if still cached
    pub fn permission_holder(&self, held: &Arc<GuildChannel>) -> Option<PermissionHolder> {
        let channel = self.channel(held).ok()?;
        let registry = self.channel.registry()?;
        match self.target {
            OverrideTarget::Role => registry.role(self.target_id).map(PermissionHolder::Role),
            OverrideTarget::Member => registry
                .member(channel.guild_id(), self.target_id)
                .map(PermissionHolder::Member),
        }
    }

    /// Replace the allowed bits; newly allowed bits are removed from deny
    pub fn set_allow(&mut self, allow: u64) -> &mut Self {
        self.allow = allow;
        self.deny &= !allow;
        self
    }

    /// Replace the denied bits; newly denied bits are removed from allow
    pub fn set_deny(&mut self, deny: u64) -> &mut Self {
        self.deny = deny;
        self.allow &= !deny;
        self
    }

    pub fn set_channel(&mut self, channel: EntityRef<GuildChannel>) -> &mut Self {
        self.channel = channel;
        self
    }

    pub(crate) fn channel_ref_mut(&mut self) -> &mut EntityRef<GuildChannel> {
        &mut self.channel
    }
}

impl PartialEq for PermissionOverride {
    fn eq(&self, other: &Self) -> bool {
        self.target_id == other.target_id && self.channel.id() == other.channel.id()
    }
}

impl Eq for PermissionOverride {}

impl Hash for PermissionOverride {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target_id.hash(state);
        self.channel.id().hash(state);
    }
}

impl fmt::Debug for PermissionOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionOverride")
            .field("target_id", &self.target_id)
            .field("target", &self.target)
            .field("allow", &self.allowed())
            .field("deny", &self.denied())
            .field("channel_id", &self.channel.id())
            .finish()
    }
}

impl fmt::Display for PermissionOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_member_override() { "M" } else { "R" };
        write!(
            f,
            "PermOver:({})({} | {})",
            kind,
            self.channel.id(),
            self.target_id
        )
    }
}

/// Overrides of a single channel, keyed by target id
#[derive(Debug, Clone, Default)]
pub struct PermissionOverrideStore {
    overrides: HashMap<u64, PermissionOverride>,
}

impl PermissionOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target_id: u64) -> Option<&PermissionOverride> {
        self.overrides.get(&target_id)
    }

    pub fn get_mut(&mut self, target_id: u64) -> Option<&mut PermissionOverride> {
        self.overrides.get_mut(&target_id)
    }

    /// Insert or replace the override for its target
    pub fn put(&mut self, permission_override: PermissionOverride) -> Option<PermissionOverride> {
        self.overrides
            .insert(permission_override.target_id(), permission_override)
    }

    pub fn remove(&mut self, target_id: u64) -> Option<PermissionOverride> {
        self.overrides.remove(&target_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionOverride> {
        self.overrides.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PermissionOverride> {
        self.overrides.values_mut()
    }

    pub fn role_overrides(&self) -> impl Iterator<Item = &PermissionOverride> {
        self.iter().filter(|o| o.is_role_override())
    }

    pub fn member_overrides(&self) -> impl Iterator<Item = &PermissionOverride> {
        self.iter().filter(|o| o.is_member_override())
    }

    /// Member override for `user_id`, ignoring a role override that happens to share the id
    pub fn member_override(&self, user_id: u64) -> Option<&PermissionOverride> {
        self.get(user_id).filter(|o| o.is_member_override())
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
