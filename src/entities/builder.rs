//! Turns response payloads into domain entities.
//!
//! Ids arrive as decimal strings; anything missing or malformed becomes a
//! `Deserialization` error rather than a panic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::channel::{
    AudioChannel, CategoryChannel, ChannelCore, ChannelKind, GuildChannel, NewsChannel,
    PermissionContainer, TextChannel,
};
use super::message::{Command, Message, WebhookReference};
use crate::error::{ClientError, Result};
use crate::permissions::{parse_raw, OverrideTarget, PermissionOverride};
use crate::state::SharedRegistry;

#[derive(Debug, Deserialize)]
struct RawAuthor {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: RawAuthor,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    flags: u64,
}

#[derive(Debug, Deserialize)]
struct RawFollowedChannel {
    channel_id: String,
    webhook_id: String,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    id: String,
    application_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    name_localizations: Option<HashMap<String, String>>,
    #[serde(default)]
    description_localizations: Option<HashMap<String, String>>,
    #[serde(default)]
    default_member_permissions: Option<String>,
    #[serde(default)]
    dm_permission: Option<bool>,
}

/// Raw override as found in channel payloads and snapshots
#[derive(Debug, Clone, Deserialize)]
pub struct RawOverride {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub allow: String,
    #[serde(default)]
    pub deny: String,
}

/// Raw guild channel as found in responses and snapshots
#[derive(Debug, Clone, Deserialize)]
pub struct RawChannel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub rate_limit_per_user: u32,
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default)]
    pub user_limit: u32,
    #[serde(default)]
    pub rtc_region: Option<String>,
    #[serde(default)]
    pub permission_overwrites: Vec<RawOverride>,
}

/// Builds entities from payloads, binding channel references to the registry
#[derive(Clone)]
pub struct EntityBuilder {
    registry: SharedRegistry,
}

impl EntityBuilder {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Message whose channel is already known to the caller
    pub fn create_message_with_channel<C: PermissionContainer + ?Sized>(
        &self,
        json: Value,
        channel: &C,
    ) -> Result<Message> {
        let raw: RawMessage = serde_json::from_value(json)?;
        let channel_id = snowflake("channel_id", &raw.channel_id)?;
        if channel_id != channel.id() {
            return Err(ClientError::Deserialization {
                message: format!(
                    "message {} belongs to channel {}, expected {}",
                    raw.id,
                    channel_id,
                    channel.id()
                ),
            });
        }

        Ok(Message {
            id: snowflake("id", &raw.id)?,
            channel_id,
            guild_id: match raw.guild_id {
                Some(id) => Some(snowflake("guild_id", &id)?),
                None => Some(channel.guild_id()),
            },
            author_id: snowflake("author.id", &raw.author.id)?,
            content: raw.content,
            timestamp: raw.timestamp,
            flags: raw.flags,
        })
    }

    pub fn create_webhook_reference(&self, json: Value) -> Result<WebhookReference> {
        let raw: RawFollowedChannel = serde_json::from_value(json)?;
        Ok(WebhookReference {
            webhook_id: snowflake("webhook_id", &raw.webhook_id)?,
            channel_id: snowflake("channel_id", &raw.channel_id)?,
        })
    }

    pub fn create_command(&self, json: Value) -> Result<Command> {
        let raw: RawCommand = serde_json::from_value(json)?;
        let default_member_permissions = match raw.default_member_permissions {
            Some(bits) => Some(parse_raw("default_member_permissions", &bits).map_err(as_deserialization)?),
            None => None,
        };
        let guild_id = match raw.guild_id {
            Some(id) => Some(snowflake("guild_id", &id)?),
            None => None,
        };

        Ok(Command {
            id: snowflake("id", &raw.id)?,
            application_id: snowflake("application_id", &raw.application_id)?,
            guild_only: guild_id.is_some() || raw.dm_permission == Some(false),
            guild_id,
            name: raw.name,
            description: raw.description,
            name_localizations: raw.name_localizations.unwrap_or_default(),
            description_localizations: raw.description_localizations.unwrap_or_default(),
            default_member_permissions,
        })
    }

    /// Guild channel from a response payload
    pub fn create_guild_channel(&self, json: Value, guild_id: u64) -> Result<GuildChannel> {
        let raw: RawChannel = serde_json::from_value(json)?;
        self.channel_from_raw(raw, guild_id)
    }

    pub fn channel_from_raw(&self, raw: RawChannel, guild_id: u64) -> Result<GuildChannel> {
        let id = snowflake("id", &raw.id)?;
        let guild_id = match raw.guild_id.as_deref() {
            Some(gid) => snowflake("guild_id", gid)?,
            None => guild_id,
        };

        let mut core = ChannelCore::new(id, guild_id, raw.name);
        core.position = raw.position;
        core.parent_id = match raw.parent_id.as_deref() {
            Some(pid) => Some(snowflake("parent_id", pid)?),
            None => None,
        };
        for raw_override in &raw.permission_overwrites {
            core.overrides.put(self.override_from_raw(raw_override, id)?);
        }

        let kind = ChannelKind::from_code(raw.kind).ok_or_else(|| ClientError::Deserialization {
            message: format!("unsupported channel type {}", raw.kind),
        })?;

        Ok(match kind {
            ChannelKind::Text => GuildChannel::Text(TextChannel {
                core,
                topic: raw.topic,
                nsfw: raw.nsfw,
                slowmode_secs: raw.rate_limit_per_user,
            }),
            ChannelKind::News => GuildChannel::News(NewsChannel {
                core,
                topic: raw.topic,
                nsfw: raw.nsfw,
            }),
            ChannelKind::Voice | ChannelKind::Stage => {
                let audio = AudioChannel {
                    core,
                    bitrate: raw.bitrate,
                    user_limit: raw.user_limit,
                    region: raw.rtc_region,
                    connected: Vec::new(),
                };
                if kind == ChannelKind::Voice {
                    GuildChannel::Voice(audio)
                } else {
                    GuildChannel::Stage(audio)
                }
            }
            ChannelKind::Category => GuildChannel::Category(CategoryChannel { core }),
        })
    }

    pub fn override_from_raw(&self, raw: &RawOverride, channel_id: u64) -> Result<PermissionOverride> {
        let target = OverrideTarget::from_code(raw.kind).map_err(as_deserialization)?;
        let allow = if raw.allow.is_empty() { 0 } else { parse_raw("allow", &raw.allow).map_err(as_deserialization)? };
        let deny = if raw.deny.is_empty() { 0 } else { parse_raw("deny", &raw.deny).map_err(as_deserialization)? };
        Ok(PermissionOverride::new(
            snowflake("id", &raw.id)?,
            target,
            allow,
            deny,
            self.registry.channel_ref(channel_id),
        ))
    }
}

fn snowflake(field: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| ClientError::Deserialization {
        message: format!("field '{}' is not a snowflake: '{}'", field, value),
    })
}

fn as_deserialization(err: ClientError) -> ClientError {
    ClientError::Deserialization {
        message: err.to_string(),
    }
}
