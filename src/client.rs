use std::sync::Arc;

use base64::Engine;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::managers::{
    create_shared_channel_manager, create_shared_command_manager, create_shared_override_manager,
    SharedChannelManager, SharedCommandManager, SharedOverrideManager,
};
use crate::permissions::AccessValidator;
use crate::requests::{create_shared_requester, HttpTransport, SharedRequester, Transport};
use crate::state::{create_shared_registry, SharedRegistry};

/// Everything needed to act as one bot user: cache, request pipeline and managers
pub struct Client {
    registry: SharedRegistry,
    requester: SharedRequester,
    self_id: u64,
    channels: SharedChannelManager,
    overrides: SharedOverrideManager,
    commands: SharedCommandManager,
}

impl Client {
    /// Client talking to the remote API over HTTPS
    pub fn new(token: &str, config: &ClientConfig) -> Result<Self> {
        let self_id = self_id_from_token(token)?;
        let transport = Arc::new(HttpTransport::new(token, config)?);
        info!("Client for bot user {} using {}", self_id, config.api_base_url);
        Ok(Self::with_transport(transport, create_shared_registry(), self_id, self_id, config))
    }

    /// Client over any transport. Bot applications share their id with the bot user.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        registry: SharedRegistry,
        self_id: u64,
        application_id: u64,
        config: &ClientConfig,
    ) -> Self {
        let requester = create_shared_requester(
            transport,
            AccessValidator::new(registry.clone()),
            config,
        );
        Self {
            channels: create_shared_channel_manager(registry.clone(), requester.clone(), self_id),
            overrides: create_shared_override_manager(registry.clone(), requester.clone(), self_id),
            commands: create_shared_command_manager(registry.clone(), requester.clone(), application_id),
            registry,
            requester,
            self_id,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn requester(&self) -> &SharedRequester {
        &self.requester
    }

    pub fn validator(&self) -> &AccessValidator {
        self.requester.validator()
    }

    pub fn self_id(&self) -> u64 {
        self.self_id
    }

    pub fn channels(&self) -> &SharedChannelManager {
        &self.channels
    }

    pub fn overrides(&self) -> &SharedOverrideManager {
        &self.overrides
    }

    pub fn commands(&self) -> &SharedCommandManager {
        &self.commands
    }
}

/// The first token segment is the bot user id, base64 encoded
pub fn self_id_from_token(token: &str) -> Result<u64> {
    let invalid = || ClientError::invalid_parameter("token", "first segment is not an encoded user id");
    let segment = token.split('.').next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

    let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(segment)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(segment))
        .map_err(|_| invalid())?;
    let id = String::from_utf8(decoded).map_err(|_| invalid())?;
    id.parse().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::Response;
    use crate::testing::*;

    #[test]
    fn test_self_id_from_token() {
        // "80351110224678912" without padding
        let token = "ODAzNTExMTAyMjQ2Nzg5MTI.GhYfrE.signature";
        assert_eq!(self_id_from_token(token).unwrap(), 80351110224678912);
        assert!(self_id_from_token("not-base64!.x.y").is_err());
        assert!(self_id_from_token("").is_err());
    }

    #[tokio::test]
    async fn test_client_wires_managers() {
        let transport = MockTransport::new();
        let client = Client::with_transport(
            transport.clone(),
            fixture_registry(),
            SELF_USER_ID,
            APPLICATION_ID,
            &ClientConfig::default(),
        );
        transport.push_response(Response::ok(message_json(NEWS_CHANNEL_ID, 1)));

        let message = client
            .channels()
            .crosspost_message_by_id(NEWS_CHANNEL_ID, "1")
            .unwrap()
            .complete()
            .await
            .unwrap();
        assert_eq!(message.id, 1);
        assert!(client.validator().check_access(client.self_id(), NEWS_CHANNEL_ID).is_ok());
    }
}
