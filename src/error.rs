use std::time::Duration;

use thiserror::Error;

use crate::permissions::Permissions;

/// Local fail-fast errors raised before any request is scheduled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing access to channel {channel_id} (requires {permission:?})")]
    MissingAccess {
        channel_id: u64,
        permission: Permissions,
    },

    #[error("Insufficient permission in channel {channel_id}: missing {required:?}")]
    InsufficientPermission {
        channel_id: u64,
        required: Permissions,
    },

    #[error("Insufficient permission in guild {guild_id}: missing {required:?}")]
    InsufficientGuildPermission { guild_id: u64, required: Permissions },

    #[error("Check failed: {message}")]
    CheckFailed { message: String },
}

/// Errors reported by the remote side after a request was dispatched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Unknown remote entity: {message}")]
    NotFound { message: String },

    #[error("Remote permission check failed: {message}")]
    PermissionDenied { message: String },

    #[error("Conflicting remote state: {message}")]
    Conflict { message: String },

    #[error("Rate limited (global={global}), retry after {retry_after:?}")]
    RateLimited { retry_after: Duration, global: bool },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

#[derive(Error, Debug)]
pub enum ClientError {
    // Local errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    // Remote errors
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("Failed to build entity from response: {message}")]
    Deserialization { message: String },

    #[error("Action was cancelled before dispatch")]
    Cancelled,

    #[error("Transport failure: {message}")]
    Transport { message: String },

    // Cache errors
    #[error("Unknown {kind}: {id}")]
    UnknownEntity { kind: &'static str, id: u64 },

    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True when the error was raised locally and nothing reached the network
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::Validation(_) | ClientError::InvalidParameter { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Remote(RemoteError::RateLimited { .. }) | ClientError::Transport { .. }
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout {
                message: err.to_string(),
            }
        } else {
            ClientError::Transport {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Deserialization {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_classification() {
        let missing = ClientError::from(ValidationError::MissingAccess {
            channel_id: 1,
            permission: Permissions::VIEW_CHANNEL,
        });
        assert!(missing.is_local());
        assert!(ClientError::invalid_parameter("channel_id", "not a snowflake").is_local());

        let remote = ClientError::from(RemoteError::NotFound {
            message: "Unknown Message".to_string(),
        });
        assert!(!remote.is_local());
        assert!(!remote.is_retryable());
    }

    #[test]
    fn test_rate_limited_is_retryable() {
        let err = ClientError::from(RemoteError::RateLimited {
            retry_after: Duration::from_millis(250),
            global: false,
        });
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Rate limited"));
    }
}
