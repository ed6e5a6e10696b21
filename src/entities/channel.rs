//! Guild channel kinds.
//!
//! Channels are a closed set of variants. Shared state lives in [`ChannelCore`] and
//! behaviour is composed from capability traits: every channel is a
//! [`PermissionContainer`], text-like channels are [`Messageable`] and voice-like
//! channels are [`AudioCapable`].

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionOverrideStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Text,
    News,
    Voice,
    Stage,
    Category,
}

impl ChannelKind {
    /// Channel type code used on the wire
    pub fn code(&self) -> u8 {
        match self {
            ChannelKind::Text => 0,
            ChannelKind::Voice => 2,
            ChannelKind::Category => 4,
            ChannelKind::News => 5,
            ChannelKind::Stage => 13,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ChannelKind::Text),
            2 => Some(ChannelKind::Voice),
            4 => Some(ChannelKind::Category),
            5 => Some(ChannelKind::News),
            13 => Some(ChannelKind::Stage),
            _ => None,
        }
    }
}

/// State every guild channel has
#[derive(Debug, Clone)]
pub struct ChannelCore {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub position: i32,
    pub parent_id: Option<u64>,
    pub overrides: PermissionOverrideStore,
}

impl ChannelCore {
    pub fn new(id: u64, guild_id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            name: name.into(),
            position: 0,
            parent_id: None,
            overrides: PermissionOverrideStore::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextChannel {
    pub core: ChannelCore,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub slowmode_secs: u32,
}

#[derive(Debug, Clone)]
pub struct NewsChannel {
    pub core: ChannelCore,
    pub topic: Option<String>,
    pub nsfw: bool,
}

/// Voice and stage channels
#[derive(Debug, Clone)]
pub struct AudioChannel {
    pub core: ChannelCore,
    pub bitrate: u32,
    pub user_limit: u32,
    pub region: Option<String>,
    /// User ids currently connected
    pub connected: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct CategoryChannel {
    pub core: ChannelCore,
}

/// Channels that carry permission overrides (all guild channels)
pub trait PermissionContainer {
    fn core(&self) -> &ChannelCore;

    fn id(&self) -> u64 {
        self.core().id
    }

    fn guild_id(&self) -> u64 {
        self.core().guild_id
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn overrides(&self) -> &PermissionOverrideStore {
        &self.core().overrides
    }
}

/// Channels messages can be sent to
pub trait Messageable: PermissionContainer {
    fn topic(&self) -> Option<&str>;

    fn is_nsfw(&self) -> bool;
}

/// Channels members connect to with audio
pub trait AudioCapable: PermissionContainer {
    fn bitrate(&self) -> u32;

    fn user_limit(&self) -> u32;

    fn region(&self) -> Option<&str>;

    fn connected_members(&self) -> &[u64];
}

impl PermissionContainer for TextChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl Messageable for TextChannel {
    fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    fn is_nsfw(&self) -> bool {
        self.nsfw
    }
}

impl PermissionContainer for NewsChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl Messageable for NewsChannel {
    fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    fn is_nsfw(&self) -> bool {
        self.nsfw
    }
}

impl PermissionContainer for AudioChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl AudioCapable for AudioChannel {
    fn bitrate(&self) -> u32 {
        self.bitrate
    }

    fn user_limit(&self) -> u32 {
        self.user_limit
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn connected_members(&self) -> &[u64] {
        &self.connected
    }
}

impl PermissionContainer for CategoryChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

#[derive(Debug, Clone)]
pub enum GuildChannel {
    Text(TextChannel),
    News(NewsChannel),
    Voice(AudioChannel),
    Stage(AudioChannel),
    Category(CategoryChannel),
}

impl GuildChannel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            GuildChannel::Text(_) => ChannelKind::Text,
            GuildChannel::News(_) => ChannelKind::News,
            GuildChannel::Voice(_) => ChannelKind::Voice,
            GuildChannel::Stage(_) => ChannelKind::Stage,
            GuildChannel::Category(_) => ChannelKind::Category,
        }
    }

    pub fn core_mut(&mut self) -> &mut ChannelCore {
        match self {
            GuildChannel::Text(c) => &mut c.core,
            GuildChannel::News(c) => &mut c.core,
            GuildChannel::Voice(c) | GuildChannel::Stage(c) => &mut c.core,
            GuildChannel::Category(c) => &mut c.core,
        }
    }

    pub fn overrides_mut(&mut self) -> &mut PermissionOverrideStore {
        &mut self.core_mut().overrides
    }

    pub fn as_messageable(&self) -> Option<&dyn Messageable> {
        match self {
            GuildChannel::Text(c) => Some(c),
            GuildChannel::News(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioChannel> {
        match self {
            GuildChannel::Voice(c) | GuildChannel::Stage(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_news(&self) -> Option<&NewsChannel> {
        match self {
            GuildChannel::News(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.as_audio().is_some()
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.core().parent_id
    }
}

impl PermissionContainer for GuildChannel {
    fn core(&self) -> &ChannelCore {
        match self {
            GuildChannel::Text(c) => &c.core,
            GuildChannel::News(c) => &c.core,
            GuildChannel::Voice(c) | GuildChannel::Stage(c) => &c.core,
            GuildChannel::Category(c) => &c.core,
        }
    }
}
