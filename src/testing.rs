//! Test fixtures: a scripted transport and a small cached guild.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::ClientConfig;
use crate::entities::{
    AudioChannel, CategoryChannel, ChannelCore, Guild, GuildChannel, Member, NewsChannel, Role,
    TextChannel,
};
use crate::error::Result;
use crate::permissions::{AccessValidator, OverrideTarget, Permissions};
use crate::requests::{create_shared_requester, Method, Request, Response, SharedRequester, Transport};
use crate::state::{create_shared_registry, SharedRegistry};

pub const GUILD_ID: u64 = 81384788765712384;
pub const MOD_ROLE_ID: u64 = 81384788765712390;
pub const SELF_USER_ID: u64 = 80351110224678912;
pub const OWNER_USER_ID: u64 = 80351110224678913;
pub const APPLICATION_ID: u64 = 80351110224678999;
pub const CATEGORY_ID: u64 = 41771983423143936;
pub const NEWS_CHANNEL_ID: u64 = 41771983423143937;
pub const TEXT_CHANNEL_ID: u64 = 41771983423143938;
pub const VOICE_CHANNEL_ID: u64 = 41771983423143939;

/// Records every request in dispatch order and replays scripted responses
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<Request>>,
    responses: Mutex<VecDeque<Response>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response; unscripted calls get `200 {}`
    pub fn push_response(&self, response: Response) {
        self.responses.lock().push_back(response);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.route.path().to_string())
            .collect()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().last().cloned()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &Request) -> Result<Response> {
        self.requests.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Response::ok(json!({})));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}

pub fn mock_requester(registry: SharedRegistry) -> (SharedRequester, Arc<MockTransport>) {
    mock_requester_with_retries(registry, 3)
}

pub fn mock_requester_with_retries(
    registry: SharedRegistry,
    max_rate_limit_retries: u32,
) -> (SharedRequester, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let config = ClientConfig {
        max_rate_limit_retries,
        global_backoff_ms: 10,
        ..ClientConfig::default()
    };
    let requester = create_shared_requester(
        transport.clone(),
        AccessValidator::new(registry),
        &config,
    );
    (requester, transport)
}

fn text(id: u64, name: &str) -> ChannelCore {
    let mut core = ChannelCore::new(id, GUILD_ID, name);
    core.parent_id = Some(CATEGORY_ID);
    core
}

/// A guild where @everyone may view, send and connect, a moderator role
/// that nobody holds yet, and one channel of each kind
pub fn fixture_registry() -> SharedRegistry {
    let registry = create_shared_registry();
    registry.apply(|snapshot| {
        snapshot.put_guild(Guild {
            id: GUILD_ID,
            name: "Fixture Guild".to_string(),
            owner_id: OWNER_USER_ID,
        });
        snapshot.put_role(Role {
            id: GUILD_ID,
            guild_id: GUILD_ID,
            name: "@everyone".to_string(),
            permissions: (Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::CONNECT)
                .bits(),
            position: 0,
            managed: false,
        });
        snapshot.put_role(Role {
            id: MOD_ROLE_ID,
            guild_id: GUILD_ID,
            name: "Moderator".to_string(),
            permissions: (Permissions::MANAGE_ROLES
                | Permissions::MANAGE_WEBHOOKS
                | Permissions::MANAGE_CHANNELS)
                .bits(),
            position: 1,
            managed: false,
        });
        for user_id in [SELF_USER_ID, OWNER_USER_ID] {
            snapshot.put_member(Member {
                user_id,
                guild_id: GUILD_ID,
                role_ids: Vec::new(),
                nickname: None,
            });
        }

        snapshot.put_channel(GuildChannel::Category(CategoryChannel {
            core: ChannelCore::new(CATEGORY_ID, GUILD_ID, "general"),
        }));
        snapshot.put_channel(GuildChannel::News(NewsChannel {
            core: text(NEWS_CHANNEL_ID, "announcements"),
            topic: Some("Release notes".to_string()),
            nsfw: false,
        }));
        snapshot.put_channel(GuildChannel::Text(TextChannel {
            core: text(TEXT_CHANNEL_ID, "chat"),
            topic: None,
            nsfw: false,
            slowmode_secs: 0,
        }));
        snapshot.put_channel(GuildChannel::Voice(AudioChannel {
            core: text(VOICE_CHANNEL_ID, "lounge"),
            bitrate: 64000,
            user_limit: 10,
            region: None,
            connected: vec![OWNER_USER_ID],
        }));
    });
    registry
}

pub fn put_override(
    registry: &SharedRegistry,
    channel_id: u64,
    target_id: u64,
    target: OverrideTarget,
    allow: Permissions,
    deny: Permissions,
) {
    registry
        .put_override(channel_id, target_id, target, allow.bits(), deny.bits())
        .expect("fixture channel exists");
}

pub fn assign_role(registry: &SharedRegistry, user_id: u64, role_id: u64) {
    registry.apply(|snapshot| {
        if let Some(member) = snapshot.member_mut(GUILD_ID, user_id) {
            member.role_ids.push(role_id);
        }
    });
}

/// Message payload as returned by the crosspost endpoint
pub fn message_json(channel_id: u64, message_id: u64) -> Value {
    json!({
        "id": message_id.to_string(),
        "channel_id": channel_id.to_string(),
        "author": { "id": OWNER_USER_ID.to_string() },
        "content": "v1.2 is out",
        "timestamp": "2024-03-01T12:00:00+00:00",
        "flags": 1
    })
}

pub fn assert_request(request: &Request, method: Method, path: &str) {
    assert_eq!(request.route.method(), method);
    assert_eq!(request.route.path(), path);
}
