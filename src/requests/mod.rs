pub mod action;
pub mod pipeline;
pub mod ratelimit;
pub mod route;
pub mod transport;

pub use action::{Action, ActionState, ActionTicket, PendingAction};
pub use pipeline::{create_shared_requester, Requester, SharedRequester};
pub use ratelimit::{GlobalLimit, QueuedRequest, RateLimiter};
pub use route::{check_snowflake, CompiledRoute, Method, Route};
pub use transport::{HttpTransport, RateLimitInfo, Request, Response, Transport};
