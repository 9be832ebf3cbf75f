//! Action Registry
//!
//! Maps action module names (e.g. "sum") to the async functions that run them. This
//! is the injected "run this action, return a result" capability; the worker decides
//! whether a module may run before looking it up here.

use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::graph::types::Action;

/// Type alias for a thread-safe, asynchronous action: payload in, result out.
pub type ActionFn =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

pub struct ActionRegistry {
    actions: DashMap<String, ActionFn>,
}

impl ActionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `action` under `module`, replacing any previous registration.
    pub fn register<F, Fut>(&self, module: &str, action: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let action_fn: ActionFn = Arc::new(move |payload: Value| {
            Box::pin(action(payload)) as Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        });

        self.actions.insert(module.to_string(), action_fn);

        tracing::info!("Registered action module: {}", module);
    }

    /// Runs the action's module on its (already substituted) payload.
    pub async fn execute(&self, action: &Action) -> Result<Value> {
        // Clone the handle so no map guard is held across the await
        let action_fn = self
            .actions
            .get(&action.module)
            .map(|entry| entry.value().clone());

        match action_fn {
            Some(action_fn) => {
                tracing::debug!("Executing action module '{}'", action.module);
                action_fn(action.payload.clone()).await
            }
            None => Err(anyhow::anyhow!("Unknown action module: {}", action.module)),
        }
    }

    /// Registered module names, sorted.
    pub fn list_actions(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .actions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        modules.sort();
        modules
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self {
            actions: DashMap::new(),
        }
    }
}
