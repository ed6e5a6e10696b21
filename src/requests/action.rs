//! Deferred actions: an immutable request description that is validated, queued
//! into its rate-limit bucket and completed exactly once.

use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, trace};
use uuid::Uuid;

use super::pipeline::SharedRequester;
use super::ratelimit::QueuedRequest;
use super::route::CompiledRoute;
use super::transport::Request;
use crate::error::{ClientError, Result, ValidationError};
use crate::logging::REQUESTS_TARGET;
use crate::permissions::Permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    Created,
    Validating,
    Queued,
    InFlight,
    Completed,
    Failed,
    Cancelled,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Completed | ActionState::Failed | ActionState::Cancelled
        )
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionState::Created => "created",
            ActionState::Validating => "validating",
            ActionState::Queued => "queued",
            ActionState::InFlight => "in-flight",
            ActionState::Completed => "completed",
            ActionState::Failed => "failed",
            ActionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Shared lifecycle handle of one action, observed by the caller and the bucket worker
#[derive(Debug)]
pub struct ActionTicket {
    id: Uuid,
    state: Mutex<ActionState>,
}

impl ActionTicket {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: Mutex::new(ActionState::Created),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ActionState {
        *self.state.lock()
    }

    fn advance(&self, next: ActionState) {
        let mut state = self.state.lock();
        trace!("[{}] {} -> {}", self.id, *state, next);
        *state = next;
    }

    pub(crate) fn begin_validation(&self) {
        self.advance(ActionState::Validating);
    }

    pub(crate) fn mark_queued(&self) {
        self.advance(ActionState::Queued);
    }

    /// Cancel the action. Only possible until dispatch begins.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ActionState::Created | ActionState::Validating | ActionState::Queued => {
                debug!("[{}] cancelled while {}", self.id, *state);
                *state = ActionState::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Move to in-flight. Returns false when the action was cancelled first.
    pub(crate) fn begin_dispatch(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ActionState::Queued | ActionState::InFlight => {
                *state = ActionState::InFlight;
                true
            }
            _ => false,
        }
    }

    /// Deadline passed before dispatch: cancelled, then failed
    pub(crate) fn expire(&self) {
        self.advance(ActionState::Cancelled);
        self.advance(ActionState::Failed);
    }

    /// The caller stopped waiting. Ends in `Failed` whatever the dispatch stage;
    /// returns true when the call was already in flight.
    pub(crate) fn time_out(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        let in_flight = *state == ActionState::InFlight;
        trace!("[{}] {} -> {} (timed out)", self.id, *state, ActionState::Failed);
        *state = ActionState::Failed;
        in_flight
    }

    pub(crate) fn finish(&self, succeeded: bool) {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return;
        }
        *state = if succeeded {
            ActionState::Completed
        } else {
            ActionState::Failed
        };
    }
}

type CustomCheck = Box<dyn FnOnce() -> std::result::Result<(), ValidationError> + Send>;
type Materializer<T> = Box<dyn FnOnce(Value) -> Result<T> + Send>;

enum Check {
    Custom(CustomCheck),
    Access {
        actor: u64,
        channel_id: u64,
    },
    Permission {
        actor: u64,
        channel_id: u64,
        permission: Permissions,
    },
    GuildPermission {
        actor: u64,
        guild_id: u64,
        permission: Permissions,
    },
}

/// Builder for one remote call producing a `T`
pub struct Action<T> {
    requester: SharedRequester,
    route: CompiledRoute,
    body: Option<Value>,
    reason: Option<String>,
    checks: Vec<Check>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    materialize: Materializer<T>,
    ticket: Arc<ActionTicket>,
}

impl<T: Send + 'static> Action<T> {
    pub fn new(
        requester: SharedRequester,
        route: CompiledRoute,
        materialize: impl FnOnce(Value) -> Result<T> + Send + 'static,
    ) -> Self {
        let timeout = requester.default_timeout();
        Self {
            requester,
            route,
            body: None,
            reason: None,
            checks: Vec::new(),
            deadline: None,
            timeout,
            materialize: Box::new(materialize),
            ticket: ActionTicket::new(),
        }
    }

    pub fn route(&self) -> &CompiledRoute {
        &self.route
    }

    pub fn state(&self) -> ActionState {
        self.ticket.state()
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Audit log reason sent along with the request
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Append a check. Checks run in registration order.
    pub fn add_check(
        mut self,
        check: impl FnOnce() -> std::result::Result<(), ValidationError> + Send + 'static,
    ) -> Self {
        self.checks.push(Check::Custom(Box::new(check)));
        self
    }

    /// Replace every custom check with `check`. Access checks are kept.
    pub fn set_check(
        mut self,
        check: impl FnOnce() -> std::result::Result<(), ValidationError> + Send + 'static,
    ) -> Self {
        self.checks.retain(|c| !matches!(c, Check::Custom(_)));
        self.add_check(check)
    }

    pub fn require_access(mut self, actor: u64, channel_id: u64) -> Self {
        self.checks.push(Check::Access { actor, channel_id });
        self
    }

    pub fn require_permission(mut self, actor: u64, channel_id: u64, permission: Permissions) -> Self {
        self.checks.push(Check::Permission {
            actor,
            channel_id,
            permission,
        });
        self
    }

    pub fn require_guild_permission(mut self, actor: u64, guild_id: u64, permission: Permissions) -> Self {
        self.checks.push(Check::GuildPermission {
            actor,
            guild_id,
            permission,
        });
        self
    }

    /// Fail with a timeout if dispatch would happen after `deadline`
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// How long [`PendingAction::wait`] waits for the response
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate(checks: Vec<Check>, requester: &SharedRequester) -> Result<()> {
        let validator = requester.validator();
        for check in checks {
            match check {
                Check::Custom(check) => check()?,
                Check::Access { actor, channel_id } => validator.check_access(actor, channel_id)?,
                Check::Permission {
                    actor,
                    channel_id,
                    permission,
                } => validator.check_permission(actor, channel_id, permission)?,
                Check::GuildPermission {
                    actor,
                    guild_id,
                    permission,
                } => validator.check_guild_permission(actor, guild_id, permission)?,
            }
        }
        Ok(())
    }

    /// Validate and enqueue. Runs on the caller and never suspends.
    ///
    /// Local failures are returned here and nothing is sent.
    pub fn submit(self) -> Result<PendingAction<T>> {
        let Action {
            requester,
            route,
            body,
            reason,
            checks,
            deadline,
            timeout,
            materialize,
            ticket,
        } = self;

        ticket.begin_validation();
        if let Err(err) = Self::validate(checks, &requester) {
            debug!("[{}] {} rejected locally: {}", ticket.id(), route, err);
            ticket.finish(false);
            return Err(err);
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                ticket.expire();
                return Err(ClientError::Timeout {
                    message: format!("deadline passed before {} was queued", route),
                });
            }
        }

        let (responder, rx) = oneshot::channel();
        let request = Request {
            id: ticket.id(),
            route,
            body,
            reason,
        };
        ticket.mark_queued();
        if let Err(err) = requester.limiter().enqueue(QueuedRequest {
            request,
            deadline,
            ticket: Arc::clone(&ticket),
            responder,
        }) {
            ticket.finish(false);
            return Err(err);
        }

        Ok(PendingAction {
            rx,
            ticket,
            timeout,
            materialize,
        })
    }

    /// Submit and wait for the materialized result
    pub async fn complete(self) -> Result<T> {
        self.submit()?.wait().await
    }

    /// Submit and hand the result to `on_success`. Failures are logged.
    pub fn queue(self, on_success: impl FnOnce(T) + Send + 'static) -> Result<Arc<ActionTicket>> {
        let route = self.route.to_string();
        self.queue_with(on_success, move |err| {
            error!(target: REQUESTS_TARGET, "Unhandled failure of {}: {}", route, err);
        })
    }

    /// Submit and route the outcome to exactly one of the two handlers.
    ///
    /// Local failures are returned directly and neither handler runs.
    pub fn queue_with(
        self,
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(ClientError) + Send + 'static,
    ) -> Result<Arc<ActionTicket>> {
        let pending = self.submit()?;
        let ticket = Arc::clone(&pending.ticket);
        tokio::spawn(async move {
            match pending.wait().await {
                Ok(value) => on_success(value),
                Err(err) => on_failure(err),
            }
        });
        Ok(ticket)
    }
}

/// A queued action awaiting its response
pub struct PendingAction<T> {
    rx: oneshot::Receiver<Result<Value>>,
    ticket: Arc<ActionTicket>,
    timeout: Option<Duration>,
    materialize: Materializer<T>,
}

impl<T: Send + 'static> PendingAction<T> {
    pub fn id(&self) -> Uuid {
        self.ticket.id()
    }

    pub fn state(&self) -> ActionState {
        self.ticket.state()
    }

    pub fn ticket(&self) -> Arc<ActionTicket> {
        Arc::clone(&self.ticket)
    }

    /// Cancel if not yet dispatched
    pub fn cancel(&self) -> bool {
        self.ticket.cancel()
    }

    pub async fn wait(self) -> Result<T> {
        let PendingAction {
            rx,
            ticket,
            timeout,
            materialize,
        } = self;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    if ticket.time_out() {
                        debug!("[{}] timed out in flight, the call may still apply remotely", ticket.id());
                    }
                    return Err(ClientError::Timeout {
                        message: format!("no response within {:?}", limit),
                    });
                }
            },
            None => rx.await,
        };

        let value = received.map_err(|_| ClientError::Transport {
            message: "request was dropped by its dispatcher".to_string(),
        })??;
        materialize(value)
    }
}

impl<T: Send + 'static> IntoFuture for PendingAction<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}
