//! # Protocol Constants
//!
//! Wire-level constants shared by workers and clients: the protocol version,
//! the well-known status codes the engine synthesizes, queue naming
//! conventions and lifecycle event names.

/// Protocol version stamped on every task. Workers refuse tasks carrying a
/// different version.
pub const PROTOCOL_VERSION: &str = "1.1";

/// Separator between a root action name and its callback's local name
/// (`root#callback`).
pub const CALLBACK_SEPARATOR: char = '#';

/// Suffix of the per-client results queue (`<clientId>.results`).
pub const RESULTS_QUEUE_SUFFIX: &str = ".results";

/// Key under which the RPC correlation id travels in the collector frame's vars.
pub const CORRELATION_ID_VAR: &str = "correlationId";

/// Default RPC timeout in milliseconds.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;

/// Retry ceiling used when an action has no policy for an error code.
pub const DEFAULT_RETRY_MAX_COUNT: u32 = 1;

/// Status codes synthesized by the engine and the client.
pub mod status_codes {
    /// The tail entry names an action this worker does not know.
    pub const ACTION_NOT_FOUND: &str = "ACTION_NOT_FOUND";
    /// A failure reported without an explicit code.
    pub const UNHANDLED_EXCEPTION: &str = "UNHANDLED_EXCEPTION";
    /// No reply arrived for an RPC within its timeout.
    pub const RPC_TIMEOUT: &str = "RPC_TIMEOUT";
    /// The client disconnected while the RPC was pending.
    pub const RPC_CANCELLED: &str = "RPC_CANCELLED";
    /// Conventional success code for `success(..)`.
    pub const SUCCESS: &str = "SUCCESS";
}

/// Names of worker-local and source lifecycle events, used as log markers.
pub mod events {
    pub const SOURCE_CONNECTED: &str = "source.connected";
    pub const SOURCE_DISCONNECTED: &str = "source.disconnected";
    pub const SOURCE_QUEUE_ISSUED: &str = "source.queue_issued";
    pub const SOURCE_QUEUE_LISTENING: &str = "source.queue_listening";
    pub const SOURCE_ENQUEUED: &str = "source.enqueued";
    pub const SOURCE_ERROR: &str = "source.error";

    pub const ACTION_COMPLETED: &str = "worker.action_completed";
    pub const TASK_REJECTED: &str = "worker.task_rejected";
    pub const HANDLER_ERROR: &str = "worker.handler_error";
}

/// Builds the wire name of a callback: `root#local`.
pub fn callback_action_name(root: &str, local: &str) -> String {
    format!("{root}{CALLBACK_SEPARATOR}{local}")
}

/// Builds the results queue name for a client id.
pub fn results_queue_name(client_id: &str) -> String {
    format!("{client_id}{RESULTS_QUEUE_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_action_name() {
        assert_eq!(
            callback_action_name("reverse_format_string", "reverse_completed"),
            "reverse_format_string#reverse_completed"
        );
    }

    #[test]
    fn test_results_queue_name() {
        assert_eq!(results_queue_name("client-1"), "client-1.results");
    }
}
