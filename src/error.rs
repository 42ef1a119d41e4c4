//! # Orchestration Error Types
//!
//! Programming errors raised synchronously to the caller. None of these is
//! ever placed on the wire: task-level failures travel as
//! [`ActionStatus`](crate::messaging::ActionStatus) values instead.

use crate::messaging::MessagingError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchError {
    #[error("source of tasks is required")]
    MissingSource,

    #[error("action name argument is required")]
    MissingActionName,

    #[error("rpc is not enabled on this client")]
    RpcDisabled,

    #[error("Invalid action name '{name}': {reason}")]
    InvalidActionName { name: String, reason: String },

    #[error("Action '{name}' is already registered")]
    DuplicateAction { name: String },

    #[error("Action '{name}' is not registered")]
    ActionNotRegistered { name: String },

    #[error("Action '{name}' is a callback; callbacks cannot register callbacks")]
    NestedCallback { name: String },

    #[error("Callback {callback} was not found on action '{root}'")]
    CallbackNotFound { root: String, callback: String },

    #[error("Invalid retry policy: {reason}")]
    InvalidRetryPolicy { reason: String },

    #[error("Protocol version mismatch: expected {expected}, found {found}")]
    ProtocolVersionMismatch { expected: String, found: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
}

impl OrchError {
    pub fn invalid_action_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidActionName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_retry_policy(reason: impl Into<String>) -> Self {
        Self::InvalidRetryPolicy {
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for OrchError {
    fn from(err: config::ConfigError) -> Self {
        OrchError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchError>;
