// src/permissions/types.rs
use bitflags::bitflags;
use tracing::warn;

use crate::error::{ClientError, Result};

/// Mask returned for administrators, every bit set
pub const FULL_MASK: u64 = u64::MAX;

bitflags! {
    /// Channel and guild permission bits as laid out by the remote API
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permissions: u64 {
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS = 1 << 1;
        const BAN_MEMBERS = 1 << 2;
        const ADMINISTRATOR = 1 << 3;
        const MANAGE_CHANNELS = 1 << 4;
        const MANAGE_GUILD = 1 << 5;
        const ADD_REACTIONS = 1 << 6;
        const VIEW_AUDIT_LOG = 1 << 7;
        const PRIORITY_SPEAKER = 1 << 8;
        const STREAM = 1 << 9;
        const VIEW_CHANNEL = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        const SEND_TTS_MESSAGES = 1 << 12;
        const MANAGE_MESSAGES = 1 << 13;
        const EMBED_LINKS = 1 << 14;
        const ATTACH_FILES = 1 << 15;
        const READ_MESSAGE_HISTORY = 1 << 16;
        const MENTION_EVERYONE = 1 << 17;
        const USE_EXTERNAL_EMOJIS = 1 << 18;
        const VIEW_GUILD_INSIGHTS = 1 << 19;
        const CONNECT = 1 << 20;
        const SPEAK = 1 << 21;
        const MUTE_MEMBERS = 1 << 22;
        const DEAFEN_MEMBERS = 1 << 23;
        const MOVE_MEMBERS = 1 << 24;
        const USE_VAD = 1 << 25;
        const CHANGE_NICKNAME = 1 << 26;
        const MANAGE_NICKNAMES = 1 << 27;
        /// Also grants managing channel permission overrides
        const MANAGE_ROLES = 1 << 28;
        const MANAGE_WEBHOOKS = 1 << 29;
        const MANAGE_GUILD_EXPRESSIONS = 1 << 30;
        const USE_APPLICATION_COMMANDS = 1 << 31;
        const REQUEST_TO_SPEAK = 1 << 32;
        const MANAGE_EVENTS = 1 << 33;
        const MANAGE_THREADS = 1 << 34;
        const CREATE_PUBLIC_THREADS = 1 << 35;
        const CREATE_PRIVATE_THREADS = 1 << 36;
        const USE_EXTERNAL_STICKERS = 1 << 37;
        const SEND_MESSAGES_IN_THREADS = 1 << 38;
        const USE_EMBEDDED_ACTIVITIES = 1 << 39;
        const MODERATE_MEMBERS = 1 << 40;
        const VIEW_CREATOR_MONETIZATION_ANALYTICS = 1 << 41;
        const USE_SOUNDBOARD = 1 << 42;
        const SEND_VOICE_MESSAGES = 1 << 46;
    }
}

impl Permissions {
    /// Parse permission names (e.g. ["VIEW_CHANNEL", "send_messages"]) into flags.
    /// Unknown names are skipped with a warning.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut perms = Permissions::empty();
        for name in names {
            match Permissions::from_name(&name.as_ref().to_uppercase()) {
                Some(flag) => perms |= flag,
                None => warn!("Unknown permission name '{}'", name.as_ref()),
            }
        }
        perms
    }

    /// Names of every known flag set in this value
    pub fn names(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

/// Parse a raw permission string as sent by the remote API (decimal u64)
pub fn parse_raw(name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        ClientError::invalid_parameter(name, format!("'{}' is not a permission bitmask", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names() {
        let perms = Permissions::from_names(&["VIEW_CHANNEL", "send_messages", "NOT_A_PERMISSION"]);
        assert_eq!(perms, Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES);
        assert_eq!(perms.names(), vec!["VIEW_CHANNEL", "SEND_MESSAGES"]);
    }

    #[test]
    fn test_parse_raw() {
        assert_eq!(parse_raw("allow", "1024").unwrap(), Permissions::VIEW_CHANNEL.bits());
        assert!(parse_raw("allow", "view").is_err());
    }
}
