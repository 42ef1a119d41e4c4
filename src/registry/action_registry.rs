//! # Action Registry
//!
//! Name-indexed handler records with root/callback tagging and per-action retry
//! policies.

use crate::constants::{callback_action_name, CALLBACK_SEPARATOR, DEFAULT_RETRY_MAX_COUNT};
use crate::error::{OrchError, Result};
use crate::worker::handler::ActionHandler;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Maximum attempts for one error code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub code: String,
    pub max_count: u32,
}

impl RetryPolicy {
    /// Policy applied to codes without a configured entry: fail on the first retry
    pub fn default_for(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            max_count: DEFAULT_RETRY_MAX_COUNT,
        }
    }
}

/// Root or callback tagging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Root {
        /// local callback name -> wire action name
        callbacks: HashMap<String, String>,
    },
    Callback {
        root: String,
        local_name: String,
    },
}

/// Worker-local record for one dispatchable action
pub struct ActionMetadata {
    name: String,
    kind: ActionKind,
    handler: Arc<dyn ActionHandler>,
    retry_policies: HashMap<String, RetryPolicy>,
}

impl std::fmt::Debug for ActionMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMetadata")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("retry_policies", &self.retry_policies)
            .finish_non_exhaustive()
    }
}

impl ActionMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, ActionKind::Root { .. })
    }

    pub fn is_callback(&self) -> bool {
        matches!(self.kind, ActionKind::Callback { .. })
    }

    /// Name of the owning root (the action itself for roots)
    pub fn root_name(&self) -> &str {
        match &self.kind {
            ActionKind::Root { .. } => &self.name,
            ActionKind::Callback { root, .. } => root,
        }
    }

    pub fn handler(&self) -> Arc<dyn ActionHandler> {
        Arc::clone(&self.handler)
    }

    /// Configured policy for `code`, or the single-attempt default
    pub fn retry_policy(&self, code: &str) -> RetryPolicy {
        self.retry_policies
            .get(code)
            .cloned()
            .unwrap_or_else(|| RetryPolicy::default_for(code))
    }
}

/// Flat registry of roots and callbacks, ordered by name
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionMetadata>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root action
    pub fn register_root(
        &mut self,
        name: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<&ActionMetadata> {
        validate_name(name)?;
        if self.actions.contains_key(name) {
            return Err(OrchError::DuplicateAction {
                name: name.to_string(),
            });
        }

        debug!(action = %name, "📚 Registered root action");
        let metadata = ActionMetadata {
            name: name.to_string(),
            kind: ActionKind::Root {
                callbacks: HashMap::new(),
            },
            handler,
            retry_policies: HashMap::new(),
        };
        Ok(self.actions.entry(name.to_string()).or_insert(metadata))
    }

    /// Register `local_name` as a callback of `root`, dispatchable as
    /// `root#local_name`
    pub fn register_callback(
        &mut self,
        root: &str,
        local_name: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<&ActionMetadata> {
        validate_name(local_name)?;
        let wire_name = callback_action_name(root, local_name);
        if self.actions.contains_key(&wire_name) {
            return Err(OrchError::DuplicateAction { name: wire_name });
        }

        let parent = self
            .actions
            .get_mut(root)
            .ok_or_else(|| OrchError::ActionNotRegistered {
                name: root.to_string(),
            })?;
        match &mut parent.kind {
            ActionKind::Root { callbacks } => {
                callbacks.insert(local_name.to_string(), wire_name.clone());
            }
            ActionKind::Callback { .. } => {
                return Err(OrchError::NestedCallback {
                    name: root.to_string(),
                });
            }
        }

        debug!(action = %wire_name, root = %root, "📚 Registered callback");
        let metadata = ActionMetadata {
            name: wire_name.clone(),
            kind: ActionKind::Callback {
                root: root.to_string(),
                local_name: local_name.to_string(),
            },
            handler,
            retry_policies: HashMap::new(),
        };
        Ok(self.actions.entry(wire_name).or_insert(metadata))
    }

    /// Set the retry ceiling for `code` on `action`
    pub fn set_retry_policy(&mut self, action: &str, code: &str, max_count: u32) -> Result<()> {
        if code.is_empty() {
            return Err(OrchError::invalid_retry_policy("error code is required"));
        }
        if max_count == 0 {
            return Err(OrchError::invalid_retry_policy(format!(
                "max count for '{code}' must be at least 1"
            )));
        }

        let metadata = self
            .actions
            .get_mut(action)
            .ok_or_else(|| OrchError::ActionNotRegistered {
                name: action.to_string(),
            })?;
        metadata.retry_policies.insert(
            code.to_string(),
            RetryPolicy {
                code: code.to_string(),
                max_count,
            },
        );
        Ok(())
    }

    /// Retry policy for `code` on `action`; the default when either is unknown
    pub fn retry_policy(&self, action: &str, code: &str) -> RetryPolicy {
        self.actions
            .get(action)
            .map(|metadata| metadata.retry_policy(code))
            .unwrap_or_else(|| RetryPolicy::default_for(code))
    }

    /// Wire name of callback `local_name` on the root owning `action`
    pub fn resolve_callback(&self, action: &str, local_name: &str) -> Result<String> {
        let not_found = || OrchError::CallbackNotFound {
            root: action.to_string(),
            callback: local_name.to_string(),
        };

        let metadata = self.actions.get(action).ok_or_else(not_found)?;
        let root = self.actions.get(metadata.root_name()).ok_or_else(not_found)?;
        match &root.kind {
            ActionKind::Root { callbacks } => callbacks.get(local_name).cloned().ok_or_else(not_found),
            ActionKind::Callback { .. } => Err(not_found()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ActionMetadata> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Every dispatchable action, roots and callbacks, in name order
    pub fn action_names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(OrchError::MissingActionName);
    }
    if name.contains(CALLBACK_SEPARATOR) {
        return Err(OrchError::invalid_action_name(
            name,
            format!("'{CALLBACK_SEPARATOR}' is reserved for callback names"),
        ));
    }
    Ok(())
}

/// Builder returned by [`Worker::register`](crate::worker::Worker::register)
/// for attaching callbacks and retry policies to a root action.
///
/// ```rust
/// use orch_core::worker::{Worker, WorkerContext};
/// use orch_core::OrchConfig;
///
/// # fn main() -> orch_core::Result<()> {
/// let mut worker = Worker::new(OrchConfig::default());
/// worker
///     .register("generate_message", |ctx: WorkerContext| async move {
///         ctx.defer("format_string", serde_json::json!({"format": "Hello %s"}), "formatted").await
///     })?
///     .callback("formatted", |ctx: WorkerContext| async move {
///         let result = ctx.result().cloned().unwrap_or_default();
///         ctx.complete(result).await
///     })?
///     .retry("SERVICE_UNAVAILABLE", 3)?
///     .callback_retry("formatted", "SERVICE_UNAVAILABLE", 2)?;
/// # Ok(())
/// # }
/// ```
pub struct RootRegistration<'a> {
    registry: &'a mut ActionRegistry,
    root: String,
}

impl<'a> RootRegistration<'a> {
    pub(crate) fn new(registry: &'a mut ActionRegistry, root: String) -> Self {
        Self { registry, root }
    }

    pub fn name(&self) -> &str {
        &self.root
    }

    /// Register a callback of this root
    pub fn callback<H: ActionHandler>(&mut self, local_name: &str, handler: H) -> Result<&mut Self> {
        self.registry
            .register_callback(&self.root, local_name, Arc::new(handler))?;
        Ok(self)
    }

    /// Set the retry ceiling for `code` on this root
    pub fn retry(&mut self, code: &str, max_count: u32) -> Result<&mut Self> {
        self.registry.set_retry_policy(&self.root, code, max_count)?;
        Ok(self)
    }

    /// Set the retry ceiling for `code` on callback `local_name` of this root.
    /// Callbacks keep their own policies; the root's do not apply to them.
    pub fn callback_retry(&mut self, local_name: &str, code: &str, max_count: u32) -> Result<&mut Self> {
        let callback = self.registry.resolve_callback(&self.root, local_name)?;
        self.registry.set_retry_policy(&callback, code, max_count)?;
        Ok(self)
    }
}
