//! Weak, id-based references into the entity registry.
//!
//! A reference never owns the entity it points to. Every read goes back to the
//! registry's latest snapshot, so a holder always sees the newest version of an
//! entity even after a snapshot replaced the object it originally received.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use super::registry::{EntityRegistry, Snapshot};
use crate::entities::{Guild, GuildChannel, Role};
use crate::error::{ClientError, Result};

/// Entity kinds that can be looked up by id in a snapshot
pub trait Resolvable: Send + Sync + 'static {
    const KIND: &'static str;

    fn lookup(snapshot: &Snapshot, id: u64) -> Option<Arc<Self>>;
}

impl Resolvable for Guild {
    const KIND: &'static str = "guild";

    fn lookup(snapshot: &Snapshot, id: u64) -> Option<Arc<Self>> {
        snapshot.guild(id).cloned()
    }
}

impl Resolvable for GuildChannel {
    const KIND: &'static str = "channel";

    fn lookup(snapshot: &Snapshot, id: u64) -> Option<Arc<Self>> {
        snapshot.channel(id).cloned()
    }
}

impl Resolvable for Role {
    const KIND: &'static str = "role";

    fn lookup(snapshot: &Snapshot, id: u64) -> Option<Arc<Self>> {
        snapshot.role(id).cloned()
    }
}

/// Lookup contract used to re-resolve held references at read time
pub trait EntityRefResolver {
    /// Latest version of the entity, if the current snapshot has it
    fn resolve<E: Resolvable>(&self, id: u64) -> Option<Arc<E>>;

    /// Latest version of the entity, or `stale` when it is gone from the current
    /// snapshot. Fails only for ids that were never known.
    fn resolve_or_stale<E: Resolvable>(&self, id: u64, stale: &Arc<E>) -> Result<Arc<E>>;
}

impl EntityRefResolver for EntityRegistry {
    fn resolve<E: Resolvable>(&self, id: u64) -> Option<Arc<E>> {
        E::lookup(&self.snapshot(), id)
    }

    fn resolve_or_stale<E: Resolvable>(&self, id: u64, stale: &Arc<E>) -> Result<Arc<E>> {
        if let Some(current) = self.resolve::<E>(id) {
            return Ok(current);
        }
        if self.is_known::<E>(id) {
            Ok(Arc::clone(stale))
        } else {
            Err(ClientError::UnknownEntity { kind: E::KIND, id })
        }
    }
}

/// Non-owning reference: an id plus a weak handle on the registry
pub struct EntityRef<E> {
    id: u64,
    registry: Weak<EntityRegistry>,
    _kind: PhantomData<fn() -> E>,
}

impl<E: Resolvable> EntityRef<E> {
    pub fn new(id: u64, registry: &Arc<EntityRegistry>) -> Self {
        Self::from_weak(id, Arc::downgrade(registry))
    }

    pub(crate) fn from_weak(id: u64, registry: Weak<EntityRegistry>) -> Self {
        Self {
            id,
            registry,
            _kind: PhantomData,
        }
    }

    /// A reference that is not attached to any registry (resolves to nothing)
    pub fn detached(id: u64) -> Self {
        Self::from_weak(id, Weak::new())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resolve(&self) -> Option<Arc<E>> {
        self.registry.upgrade()?.resolve::<E>(self.id)
    }

    /// Re-resolve through the registry, falling back to `stale`.
    /// A dropped registry cannot tell whether the id was known, so the fallback wins.
    pub fn resolve_or_stale(&self, stale: &Arc<E>) -> Result<Arc<E>> {
        match self.registry.upgrade() {
            Some(registry) => registry.resolve_or_stale(self.id, stale),
            None => Ok(Arc::clone(stale)),
        }
    }

    pub(crate) fn registry(&self) -> Option<Arc<EntityRegistry>> {
        self.registry.upgrade()
    }

    pub(crate) fn rebind(&mut self, registry: Weak<EntityRegistry>) {
        self.registry = registry;
    }
}

impl<E> Clone for EntityRef<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            registry: self.registry.clone(),
            _kind: PhantomData,
        }
    }
}

impl<E> PartialEq for EntityRef<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for EntityRef<E> {}

impl<E> fmt::Debug for EntityRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("id", &self.id)
            .field("attached", &(self.registry.strong_count() > 0))
            .finish()
    }
}
