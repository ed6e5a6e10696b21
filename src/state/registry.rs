//! Process-wide entity cache with generation semantics.
//!
//! Writers build the next snapshot from a copy of the current one and swap it in
//! under the write lock, so readers always hold a complete, consistent snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use dashmap::DashSet;
use parking_lot::RwLock;
use tracing::debug;

use super::refs::{EntityRef, Resolvable};
use crate::entities::{Guild, GuildChannel, Member, PermissionContainer, Role};
use crate::error::{ClientError, Result};
use crate::permissions::{OverrideTarget, PermissionOverride};

/// One generation of cached state
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    guilds: HashMap<u64, Arc<Guild>>,
    roles: HashMap<u64, Arc<Role>>,
    channels: HashMap<u64, Arc<GuildChannel>>,
    members: HashMap<(u64, u64), Arc<Member>>,
}

impl Snapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn guild(&self, id: u64) -> Option<&Arc<Guild>> {
        self.guilds.get(&id)
    }

    pub fn role(&self, id: u64) -> Option<&Arc<Role>> {
        self.roles.get(&id)
    }

    pub fn channel(&self, id: u64) -> Option<&Arc<GuildChannel>> {
        self.channels.get(&id)
    }

    pub fn member(&self, guild_id: u64, user_id: u64) -> Option<&Arc<Member>> {
        self.members.get(&(guild_id, user_id))
    }

    pub fn channels(&self) -> impl Iterator<Item = &Arc<GuildChannel>> {
        self.channels.values()
    }

    pub fn guild_roles(&self, guild_id: u64) -> impl Iterator<Item = &Arc<Role>> {
        self.roles.values().filter(move |r| r.guild_id == guild_id)
    }

    pub fn put_guild(&mut self, guild: Guild) {
        self.guilds.insert(guild.id, Arc::new(guild));
    }

    pub fn put_role(&mut self, role: Role) {
        self.roles.insert(role.id, Arc::new(role));
    }

    pub fn put_member(&mut self, member: Member) {
        self.members
            .insert((member.guild_id, member.user_id), Arc::new(member));
    }

    pub fn put_channel(&mut self, channel: GuildChannel) {
        self.channels.insert(channel.id(), Arc::new(channel));
    }

    pub fn remove_channel(&mut self, id: u64) -> Option<Arc<GuildChannel>> {
        self.channels.remove(&id)
    }

    pub fn remove_member(&mut self, guild_id: u64, user_id: u64) -> Option<Arc<Member>> {
        self.members.remove(&(guild_id, user_id))
    }

    /// Drop everything cached for a guild
    pub fn clear_guild(&mut self, guild_id: u64) {
        self.guilds.remove(&guild_id);
        self.roles.retain(|_, r| r.guild_id != guild_id);
        self.channels.retain(|_, c| c.guild_id() != guild_id);
        self.members.retain(|(gid, _), _| *gid != guild_id);
    }

    /// Copy-on-write access to a cached channel
    pub fn channel_mut(&mut self, id: u64) -> Option<&mut GuildChannel> {
        self.channels.get_mut(&id).map(Arc::make_mut)
    }

    pub fn member_mut(&mut self, guild_id: u64, user_id: u64) -> Option<&mut Member> {
        self.members.get_mut(&(guild_id, user_id)).map(Arc::make_mut)
    }
}

pub struct EntityRegistry {
    current: RwLock<Arc<Snapshot>>,
    /// Every (kind, id) that has appeared in any generation. Never pruned.
    seen: DashSet<(&'static str, u64)>,
    self_ref: Weak<EntityRegistry>,
}

/// Shared registry type
pub type SharedRegistry = Arc<EntityRegistry>;

pub fn create_shared_registry() -> SharedRegistry {
    Arc::new_cyclic(|weak| EntityRegistry {
        current: RwLock::new(Arc::new(Snapshot::default())),
        seen: DashSet::new(),
        self_ref: weak.clone(),
    })
}

impl EntityRegistry {
    /// Consistent view of the latest generation
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Apply a batch of writes as one new generation
    pub fn apply<R>(&self, update: impl FnOnce(&mut Snapshot) -> R) -> R {
        let mut current = self.current.write();
        let mut next = Snapshot::clone(&current);
        let out = update(&mut next);
        next.generation = current.generation + 1;
        self.record_seen(&next);
        debug!("Registry advanced to generation {}", next.generation);
        *current = Arc::new(next);
        out
    }

    fn record_seen(&self, snapshot: &Snapshot) {
        for id in snapshot.guilds.keys() {
            self.seen.insert((Guild::KIND, *id));
        }
        for id in snapshot.roles.keys() {
            self.seen.insert((Role::KIND, *id));
        }
        for id in snapshot.channels.keys() {
            self.seen.insert((GuildChannel::KIND, *id));
        }
    }

    /// Whether `id` has ever been cached as an `E`, even if since removed
    pub fn is_known<E: Resolvable>(&self, id: u64) -> bool {
        self.seen.contains(&(E::KIND, id))
    }

    pub fn entity_ref<E: Resolvable>(&self, id: u64) -> EntityRef<E> {
        EntityRef::from_weak(id, self.self_ref.clone())
    }

    pub fn channel_ref(&self, id: u64) -> EntityRef<GuildChannel> {
        self.entity_ref(id)
    }

    pub fn guild(&self, id: u64) -> Option<Arc<Guild>> {
        self.snapshot().guild(id).cloned()
    }

    pub fn role(&self, id: u64) -> Option<Arc<Role>> {
        self.snapshot().role(id).cloned()
    }

    pub fn channel(&self, id: u64) -> Option<Arc<GuildChannel>> {
        self.snapshot().channel(id).cloned()
    }

    pub fn member(&self, guild_id: u64, user_id: u64) -> Option<Arc<Member>> {
        self.snapshot().member(guild_id, user_id).cloned()
    }

    /// Replace (or insert) a channel. Overrides are re-bound to this registry.
    pub fn replace_channel(&self, mut channel: GuildChannel) {
        for o in channel.overrides_mut().iter_mut() {
            o.channel_ref_mut().rebind(self.self_ref.clone());
        }
        self.apply(|snapshot| snapshot.put_channel(channel));
    }

    pub fn remove_channel(&self, id: u64) -> Option<Arc<GuildChannel>> {
        self.apply(|snapshot| snapshot.remove_channel(id))
    }

    /// Insert or replace an override on a cached channel
    pub fn put_override(
        &self,
        channel_id: u64,
        target_id: u64,
        target: OverrideTarget,
        allow: u64,
        deny: u64,
    ) -> Result<()> {
        let channel_ref = self.channel_ref(channel_id);
        self.apply(|snapshot| -> Result<()> {
            let channel = snapshot
                .channel_mut(channel_id)
                .ok_or(ClientError::UnknownEntity {
                    kind: GuildChannel::KIND,
                    id: channel_id,
                })?;
            channel
                .overrides_mut()
                .put(PermissionOverride::new(target_id, target, allow, deny, channel_ref));
            Ok(())
        })
    }

    pub fn set_override_allow(&self, channel_id: u64, target_id: u64, allow: u64) -> Result<()> {
        self.update_override(channel_id, target_id, |o| {
            o.set_allow(allow);
        })
    }

    pub fn set_override_deny(&self, channel_id: u64, target_id: u64, deny: u64) -> Result<()> {
        self.update_override(channel_id, target_id, |o| {
            o.set_deny(deny);
        })
    }

    pub fn remove_override(&self, channel_id: u64, target_id: u64) -> Option<PermissionOverride> {
        self.apply(|snapshot| {
            snapshot
                .channel_mut(channel_id)
                .and_then(|c| c.overrides_mut().remove(target_id))
        })
    }

    fn update_override(
        &self,
        channel_id: u64,
        target_id: u64,
        update: impl FnOnce(&mut PermissionOverride),
    ) -> Result<()> {
        self.apply(|snapshot| -> Result<()> {
            let channel = snapshot
                .channel_mut(channel_id)
                .ok_or(ClientError::UnknownEntity {
                    kind: GuildChannel::KIND,
                    id: channel_id,
                })?;
            let o = channel
                .overrides_mut()
                .get_mut(target_id)
                .ok_or_else(|| {
                    ClientError::invalid_parameter(
                        "target_id",
                        format!("no override for {} in channel {}", target_id, channel_id),
                    )
                })?;
            update(o);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permissions;
    use crate::testing::*;

    #[test]
    fn test_generation_advances_per_write() {
        let registry = fixture_registry();
        let before = registry.generation();
        let held = registry.snapshot();

        registry.remove_channel(TEXT_CHANNEL_ID);

        assert_eq!(registry.generation(), before + 1);
        // the old snapshot is untouched
        assert!(held.channel(TEXT_CHANNEL_ID).is_some());
        assert!(registry.channel(TEXT_CHANNEL_ID).is_none());
        assert!(registry.is_known::<GuildChannel>(TEXT_CHANNEL_ID));
    }

    #[test]
    fn test_override_setters() {
        let registry = fixture_registry();
        registry
            .put_override(
                TEXT_CHANNEL_ID,
                SELF_USER_ID,
                OverrideTarget::Member,
                0,
                Permissions::SEND_MESSAGES.bits(),
            )
            .unwrap();
        registry
            .set_override_allow(TEXT_CHANNEL_ID, SELF_USER_ID, Permissions::SEND_MESSAGES.bits())
            .unwrap();

        let channel = registry.channel(TEXT_CHANNEL_ID).unwrap();
        let o = channel.overrides().get(SELF_USER_ID).unwrap();
        assert_eq!(o.allowed(), Permissions::SEND_MESSAGES);
        assert!(o.denied().is_empty());

        // re-resolving through the override reaches the same channel
        let resolved = o.channel(&channel).unwrap();
        assert_eq!(resolved.id(), TEXT_CHANNEL_ID);
    }

    #[test]
    fn test_setter_on_missing_override() {
        let registry = fixture_registry();
        assert!(registry.set_override_deny(TEXT_CHANNEL_ID, 31337, 1).is_err());
        assert!(registry.set_override_deny(31337, 1, 1).is_err());
    }

    #[test]
    fn test_override_survives_channel_replacement() {
        let registry = fixture_registry();
        registry
            .put_override(NEWS_CHANNEL_ID, GUILD_ID, OverrideTarget::Role, 0, Permissions::SEND_MESSAGES.bits())
            .unwrap();
        let held = registry.channel(NEWS_CHANNEL_ID).unwrap();
        let o = held.overrides().get(GUILD_ID).unwrap().clone();

        let mut renamed = (*held).clone();
        renamed.core_mut().name = "renamed".to_string();
        registry.replace_channel(renamed);
        assert_eq!(o.channel(&held).unwrap().name(), "renamed");

        registry.remove_channel(NEWS_CHANNEL_ID);
        assert_eq!(o.channel(&held).unwrap().name(), "announcements");
    }
}
