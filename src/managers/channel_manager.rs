use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::entities::{
    AudioCapable, EntityBuilder, GuildChannel, Member, Message, PermissionContainer, WebhookReference,
};
use crate::error::{ClientError, Result};
use crate::permissions::Permissions;
use crate::requests::route::{channels, guilds};
use crate::requests::{check_snowflake, Action, SharedRequester};
use crate::state::{EntityRef, SharedRegistry};

const MAX_MESSAGE_LENGTH: usize = 2000;

/// Channel operations, validated against the cache before anything is sent
pub struct ChannelManager {
    registry: SharedRegistry,
    requester: SharedRequester,
    builder: EntityBuilder,
    self_id: u64,
}

impl ChannelManager {
    pub fn new(registry: SharedRegistry, requester: SharedRequester, self_id: u64) -> Self {
        Self {
            builder: EntityBuilder::new(registry.clone()),
            registry,
            requester,
            self_id,
        }
    }

    fn channel(&self, channel_id: u64) -> Result<Arc<GuildChannel>> {
        self.registry
            .channel(channel_id)
            .ok_or(ClientError::UnknownEntity {
                kind: "channel",
                id: channel_id,
            })
    }

    fn news_channel(&self, channel_id: u64) -> Result<Arc<GuildChannel>> {
        let channel = self.channel(channel_id)?;
        if channel.as_news().is_none() {
            return Err(ClientError::invalid_parameter(
                "channel_id",
                format!("channel {} is not a news channel", channel_id),
            ));
        }
        Ok(channel)
    }

    /// Publish a message of a news channel to every following channel
    pub fn crosspost_message_by_id(&self, channel_id: u64, message_id: &str) -> Result<Action<Message>> {
        let message_id = check_snowflake("message_id", message_id)?;
        let channel = self.news_channel(channel_id)?;
        let route = channels::CROSSPOST_MESSAGE.compile(&[
            ("channel_id", channel_id.to_string().as_str()),
            ("message_id", message_id.to_string().as_str()),
        ])?;

        debug!("Crossposting message {} in {}", message_id, channel.name());
        let builder = self.builder.clone();
        let channel_ref: EntityRef<GuildChannel> = self.registry.channel_ref(channel_id);
        Ok(self
            .requester
            .action(route, move |json| {
                let current = channel_ref.resolve_or_stale(&channel)?;
                builder.create_message_with_channel(json, &*current)
            })
            .require_access(self.self_id, channel_id))
    }

    /// Crosspost a message that is already cached
    pub fn crosspost_message(&self, message: &Message) -> Result<Action<Message>> {
        if message.is_crossposted() {
            return Err(ClientError::invalid_parameter(
                "message_id",
                format!("message {} was already crossposted", message.id),
            ));
        }
        self.crosspost_message_by_id(message.channel_id, message.id.to_string().as_str())
    }

    /// Follow a news channel into `target_channel_id` by creating a webhook there
    pub fn follow(&self, news_channel_id: u64, target_channel_id: u64) -> Result<Action<WebhookReference>> {
        self.news_channel(news_channel_id)?;
        let target = self.channel(target_channel_id)?;
        if target.as_messageable().is_none() {
            return Err(ClientError::invalid_parameter(
                "target_channel_id",
                format!("channel {} cannot receive messages", target_channel_id),
            ));
        }

        let route = channels::FOLLOW_NEWS_CHANNEL.compile(&[("channel_id", news_channel_id.to_string().as_str())])?;
        let builder = self.builder.clone();
        Ok(self
            .requester
            .action(route, move |json| builder.create_webhook_reference(json))
            .body(json!({ "webhook_channel_id": target_channel_id.to_string() }))
            .require_access(self.self_id, target_channel_id)
            .require_permission(self.self_id, target_channel_id, Permissions::MANAGE_WEBHOOKS))
    }

    pub fn send_message(&self, channel_id: u64, content: &str) -> Result<Action<Message>> {
        let channel = self.channel(channel_id)?;
        if channel.as_messageable().is_none() {
            return Err(ClientError::invalid_parameter(
                "channel_id",
                format!("channel {} cannot receive messages", channel_id),
            ));
        }
        let length = content.chars().count();
        if content.trim().is_empty() || length > MAX_MESSAGE_LENGTH {
            return Err(ClientError::invalid_parameter(
                "content",
                format!("must be 1 to {} characters, got {}", MAX_MESSAGE_LENGTH, length),
            ));
        }

        let route = channels::CREATE_MESSAGE.compile(&[("channel_id", channel_id.to_string().as_str())])?;
        let builder = self.builder.clone();
        Ok(self
            .requester
            .action(route, move |json| builder.create_message_with_channel(json, &*channel))
            .body(json!({ "content": content }))
            .require_access(self.self_id, channel_id)
            .require_permission(self.self_id, channel_id, Permissions::SEND_MESSAGES))
    }

    /// Create a copy of a voice or stage channel in `guild_id`.
    ///
    /// Parent and overrides are only carried over within the same guild.
    pub fn create_copy(&self, channel_id: u64, guild_id: u64) -> Result<Action<GuildChannel>> {
        let channel = self.channel(channel_id)?;
        let audio = channel.as_audio().ok_or_else(|| {
            ClientError::invalid_parameter(
                "channel_id",
                format!("channel {} is not a voice channel", channel_id),
            )
        })?;

        let mut body = json!({
            "name": channel.name(),
            "type": channel.kind().code(),
            "bitrate": audio.bitrate(),
            "user_limit": audio.user_limit(),
        });
        if guild_id == channel.guild_id() {
            let overwrites: Vec<Value> = channel
                .overrides()
                .iter()
                .map(|o| {
                    json!({
                        "id": o.target_id().to_string(),
                        "type": o.target().code(),
                        "allow": o.allowed_raw().to_string(),
                        "deny": o.denied_raw().to_string(),
                    })
                })
                .collect();
            body["permission_overwrites"] = Value::Array(overwrites);
            if let Some(parent_id) = channel.parent_id() {
                body["parent_id"] = json!(parent_id.to_string());
            }
        }

        let route = guilds::CREATE_CHANNEL.compile(&[("guild_id", guild_id.to_string().as_str())])?;
        let builder = self.builder.clone();
        Ok(self
            .requester
            .action(route, move |json| builder.create_guild_channel(json, guild_id))
            .body(body)
            .require_guild_permission(self.self_id, guild_id, Permissions::MANAGE_CHANNELS))
    }

    /// Cached members connected to an audio channel
    pub fn connected_members(&self, channel_id: u64) -> Result<Vec<Arc<Member>>> {
        let channel = self.channel(channel_id)?;
        let audio = channel.as_audio().ok_or_else(|| {
            ClientError::invalid_parameter(
                "channel_id",
                format!("channel {} is not a voice channel", channel_id),
            )
        })?;
        Ok(audio
            .connected_members()
            .iter()
            .filter_map(|user_id| self.registry.member(channel.guild_id(), *user_id))
            .collect())
    }
}

/// Shared channel manager type
pub type SharedChannelManager = Arc<ChannelManager>;

pub fn create_shared_channel_manager(
    registry: SharedRegistry,
    requester: SharedRequester,
    self_id: u64,
) -> SharedChannelManager {
    Arc::new(ChannelManager::new(registry, requester, self_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::permissions::OverrideTarget;
    use crate::requests::{Method, Response};
    use crate::testing::*;

    fn manager() -> (SharedChannelManager, Arc<MockTransport>, SharedRegistry) {
        let registry = fixture_registry();
        let (requester, transport) = mock_requester(registry.clone());
        let manager = create_shared_channel_manager(registry.clone(), requester, SELF_USER_ID);
        (manager, transport, registry)
    }

    #[tokio::test]
    async fn test_crosspost_without_view_sends_nothing() {
        let (manager, transport, registry) = manager();
        put_override(
            &registry,
            NEWS_CHANNEL_ID,
            SELF_USER_ID,
            OverrideTarget::Member,
            Permissions::empty(),
            Permissions::VIEW_CHANNEL,
        );

        let err = manager
            .crosspost_message_by_id(NEWS_CHANNEL_ID, "123456789")
            .unwrap()
            .complete()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::MissingAccess { permission, .. })
                if permission == Permissions::VIEW_CHANNEL
        ));
        assert!(err.is_local());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_crosspost_sends_one_request() {
        let (manager, transport, _registry) = manager();
        transport.push_response(Response::ok(message_json(NEWS_CHANNEL_ID, 123456789)));

        let message = manager
            .crosspost_message_by_id(NEWS_CHANNEL_ID, "123456789")
            .unwrap()
            .complete()
            .await
            .unwrap();

        assert_eq!(transport.call_count(), 1);
        let request = transport.last_request().unwrap();
        assert_request(
            &request,
            Method::Post,
            &format!("/channels/{}/messages/123456789/crosspost", NEWS_CHANNEL_ID),
        );
        assert!(request.body.is_none());
        assert_eq!(message.id, 123456789);
        assert_eq!(message.channel_id, NEWS_CHANNEL_ID);
        assert!(message.is_crossposted());
    }

    #[tokio::test]
    async fn test_crosspost_survives_channel_removal() {
        let (manager, transport, registry) = manager();
        transport.push_response(Response::ok(message_json(NEWS_CHANNEL_ID, 5)));
        let pending = manager.crosspost_message_by_id(NEWS_CHANNEL_ID, "5").unwrap().submit().unwrap();

        // the channel disappears between dispatch and materialization
        registry.remove_channel(NEWS_CHANNEL_ID);
        let message = pending.await.unwrap();
        assert_eq!(message.guild_id, Some(GUILD_ID));
    }

    #[test]
    fn test_crosspost_rejects_bad_ids() {
        let (manager, transport, _registry) = manager();
        assert!(matches!(
            manager.crosspost_message_by_id(NEWS_CHANNEL_ID, "12ab"),
            Err(ClientError::InvalidParameter { .. })
        ));
        assert!(matches!(
            manager.crosspost_message_by_id(TEXT_CHANNEL_ID, "1"),
            Err(ClientError::InvalidParameter { .. })
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_requires_manage_webhooks() {
        let (manager, transport, registry) = manager();
        let err = manager
            .follow(NEWS_CHANNEL_ID, TEXT_CHANNEL_ID)
            .unwrap()
            .complete()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::InsufficientPermission { required, .. })
                if required == Permissions::MANAGE_WEBHOOKS
        ));
        assert_eq!(transport.call_count(), 0);

        assign_role(&registry, SELF_USER_ID, MOD_ROLE_ID);
        transport.push_response(Response::ok(serde_json::json!({
            "channel_id": NEWS_CHANNEL_ID.to_string(),
            "webhook_id": "555"
        })));
        let webhook = manager
            .follow(NEWS_CHANNEL_ID, TEXT_CHANNEL_ID)
            .unwrap()
            .complete()
            .await
            .unwrap();
        assert_eq!(webhook.webhook_id, 555);

        let request = transport.last_request().unwrap();
        assert_request(&request, Method::Post, &format!("/channels/{}/followers", NEWS_CHANNEL_ID));
        assert_eq!(
            request.body.unwrap()["webhook_channel_id"],
            TEXT_CHANNEL_ID.to_string()
        );
    }

    #[tokio::test]
    async fn test_send_message() {
        let (manager, transport, registry) = manager();
        transport.push_response(Response::ok(message_json(TEXT_CHANNEL_ID, 9)));
        let message = manager.send_message(TEXT_CHANNEL_ID, "hello").unwrap().complete().await.unwrap();
        assert_eq!(message.channel_id, TEXT_CHANNEL_ID);

        assert!(manager.send_message(TEXT_CHANNEL_ID, "  ").is_err());
        assert!(manager.send_message(VOICE_CHANNEL_ID, "hello").is_err());

        put_override(
            &registry,
            TEXT_CHANNEL_ID,
            GUILD_ID,
            OverrideTarget::Role,
            Permissions::empty(),
            Permissions::SEND_MESSAGES,
        );
        let err = manager.send_message(TEXT_CHANNEL_ID, "hello").unwrap().complete().await.unwrap_err();
        assert!(err.is_local());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_create_copy_carries_overrides_in_same_guild() {
        let (manager, transport, registry) = manager();
        put_override(
            &registry,
            VOICE_CHANNEL_ID,
            GUILD_ID,
            OverrideTarget::Role,
            Permissions::empty(),
            Permissions::SPEAK,
        );
        assert!(manager
            .create_copy(VOICE_CHANNEL_ID, GUILD_ID)
            .unwrap()
            .complete()
            .await
            .unwrap_err()
            .is_local());

        assign_role(&registry, SELF_USER_ID, MOD_ROLE_ID);
        transport.push_response(Response::ok(serde_json::json!({
            "id": "9001",
            "type": 2,
            "guild_id": GUILD_ID.to_string(),
            "name": "lounge",
            "bitrate": 64000,
            "user_limit": 10
        })));
        let copy = manager.create_copy(VOICE_CHANNEL_ID, GUILD_ID).unwrap().complete().await.unwrap();
        assert_eq!(copy.id(), 9001);

        let body = transport.last_request().unwrap().body.unwrap();
        assert_eq!(body["bitrate"], 64000);
        assert_eq!(body["parent_id"], CATEGORY_ID.to_string());
        assert_eq!(body["permission_overwrites"][0]["deny"], Permissions::SPEAK.bits().to_string());
    }

    #[test]
    fn test_connected_members() {
        let (manager, _transport, _registry) = manager();
        let members = manager.connected_members(VOICE_CHANNEL_ID).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, OWNER_USER_ID);
        assert!(manager.connected_members(TEXT_CHANNEL_ID).is_err());
    }
}
