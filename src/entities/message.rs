use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message flag set once a news message was published to followers
pub const FLAG_CROSSPOSTED: u64 = 1 << 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub flags: u64,
}

impl Message {
    pub fn is_crossposted(&self) -> bool {
        self.flags & FLAG_CROSSPOSTED != 0
    }
}

/// Webhook created when following a news channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReference {
    pub webhook_id: u64,
    pub channel_id: u64,
}

/// Application command as registered remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: u64,
    pub application_id: u64,
    pub guild_id: Option<u64>,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub name_localizations: HashMap<String, String>,
    #[serde(default)]
    pub description_localizations: HashMap<String, String>,
    pub default_member_permissions: Option<u64>,
    pub guild_only: bool,
}
