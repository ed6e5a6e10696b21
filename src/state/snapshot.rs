//! Serde model of a state snapshot and its application to the registry.
//!
//! The state synchronizer (gateway consumer) feeds whole-guild snapshots through
//! [`EntityRegistry::apply_payload`]; files on disk use the same format so the CLI
//! can work offline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::registry::{EntityRegistry, Snapshot};
use crate::entities::{EntityBuilder, Guild, GuildChannel, Member, RawChannel, Role};
use crate::error::{ClientError, Result};
use crate::permissions::parse_raw;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotPayload {
    #[serde(default)]
    pub guilds: Vec<GuildPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildPayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub roles: Vec<RolePayload>,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
    #[serde(default)]
    pub channels: Vec<RawChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolePayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub permissions: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub managed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberPayload {
    pub user: UserPayload,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub nick: Option<String>,
}

impl SnapshotPayload {
    /// Load a snapshot from a JSON file
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::StateLoad {
                path: path.to_string(),
                source: e,
            })?;

        serde_json::from_str(&content).map_err(|e| ClientError::ConfigParse {
            path: path.to_string(),
            source: e,
        })
    }
}

/// Fully parsed guild, ready to be swapped into a snapshot
struct ParsedGuild {
    guild: Guild,
    roles: Vec<Role>,
    members: Vec<Member>,
    channels: Vec<GuildChannel>,
}

impl EntityRegistry {
    /// Apply a snapshot as a single generation.
    ///
    /// Everything is parsed before the registry is touched, so a malformed payload
    /// leaves the cache unchanged. Each guild in the payload replaces that guild's
    /// cached roles, members and channels.
    pub fn apply_payload(self: &Arc<Self>, payload: SnapshotPayload) -> Result<()> {
        let builder = EntityBuilder::new(Arc::clone(self));
        let parsed = payload
            .guilds
            .into_iter()
            .map(|g| parse_guild(&builder, g))
            .collect::<Result<Vec<_>>>()?;

        self.apply(|snapshot| {
            for guild in parsed {
                replace_guild(snapshot, guild);
            }
        });
        info!("Applied snapshot, registry at generation {}", self.generation());
        Ok(())
    }
}

fn parse_guild(builder: &EntityBuilder, payload: GuildPayload) -> Result<ParsedGuild> {
    let guild_id = id("guild.id", &payload.id)?;
    let guild = Guild {
        id: guild_id,
        name: payload.name,
        owner_id: id("guild.owner_id", &payload.owner_id)?,
    };

    let roles = payload
        .roles
        .into_iter()
        .map(|r| -> Result<Role> {
            Ok(Role {
                id: id("role.id", &r.id)?,
                guild_id,
                name: r.name,
                permissions: parse_raw("role.permissions", &r.permissions)?,
                position: r.position,
                managed: r.managed,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let members = payload
        .members
        .into_iter()
        .map(|m| -> Result<Member> {
            Ok(Member {
                user_id: id("member.user.id", &m.user.id)?,
                guild_id,
                role_ids: m
                    .roles
                    .iter()
                    .map(|r| id("member.roles", r))
                    .collect::<Result<Vec<_>>>()?,
                nickname: m.nick,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut channels = Vec::with_capacity(payload.channels.len());
    for raw in payload.channels {
        match builder.channel_from_raw(raw, guild_id) {
            Ok(channel) => channels.push(channel),
            // threads, forums and DMs are not cached
            Err(ClientError::Deserialization { message }) if message.starts_with("unsupported channel type") => {
                warn!("Skipping channel in guild {}: {}", guild_id, message);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(ParsedGuild {
        guild,
        roles,
        members,
        channels,
    })
}

fn replace_guild(snapshot: &mut Snapshot, parsed: ParsedGuild) {
    let guild_id = parsed.guild.id;
    snapshot.clear_guild(guild_id);
    snapshot.put_guild(parsed.guild);
    for role in parsed.roles {
        snapshot.put_role(role);
    }
    for member in parsed.members {
        snapshot.put_member(member);
    }
    for channel in parsed.channels {
        snapshot.put_channel(channel);
    }
}

fn id(field: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| ClientError::invalid_parameter(field, format!("'{}' is not a snowflake", value)))
}
