use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::action::Action;
use super::ratelimit::RateLimiter;
use super::route::CompiledRoute;
use super::transport::Transport;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::permissions::AccessValidator;

/// Entry point for building actions: owns the limiter and the local validator
pub struct Requester {
    limiter: RateLimiter,
    validator: AccessValidator,
    default_timeout: Option<Duration>,
}

/// Shared requester type
pub type SharedRequester = Arc<Requester>;

pub fn create_shared_requester(
    transport: Arc<dyn Transport>,
    validator: AccessValidator,
    config: &ClientConfig,
) -> SharedRequester {
    Arc::new(Requester {
        limiter: RateLimiter::new(
            transport,
            config.max_rate_limit_retries,
            config.global_backoff(),
        ),
        validator,
        default_timeout: config.request_timeout(),
    })
}

impl Requester {
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn validator(&self) -> &AccessValidator {
        &self.validator
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Start building an action on `route`
    pub fn action<T: Send + 'static>(
        self: &Arc<Self>,
        route: CompiledRoute,
        materialize: impl FnOnce(Value) -> Result<T> + Send + 'static,
    ) -> Action<T> {
        Action::new(Arc::clone(self), route, materialize)
    }
}
