use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::Order;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Replaces the built-in approval flow when any hook is registered.
    OrderApproval,
    /// Runs after an order turns ACTIVE and before its jobs are created.
    PreOrderExecution,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderApproval => "order_approval",
            Self::PreOrderExecution => "pre_order_execution",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("hook `{hook}` failed: {message}")]
pub struct HookFailure {
    pub hook: String,
    pub message: String,
}

#[async_trait]
pub trait HookRunner: Send + Sync {
    async fn has_hooks(&self, point: HookPoint) -> bool;

    /// Runs every hook registered at `point`, stopping at the first failure.
    async fn run(&self, point: HookPoint, order: &Order) -> Result<(), HookFailure>;
}

type HookFn = Arc<dyn Fn(&Order) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
struct RegisteredHook {
    name: String,
    action: HookFn,
}

/// In-process hook registry.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<HookPoint, Vec<RegisteredHook>>,
}

impl HookRegistry {
    pub fn register<F>(&mut self, point: HookPoint, name: impl Into<String>, action: F)
    where
        F: Fn(&Order) -> Result<(), String> + Send + Sync + 'static,
    {
        self.hooks
            .entry(point)
            .or_default()
            .push(RegisteredHook { name: name.into(), action: Arc::new(action) });
    }

    pub fn with_hook<F>(mut self, point: HookPoint, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Order) -> Result<(), String> + Send + Sync + 'static,
    {
        self.register(point, name, action);
        self
    }
}

#[async_trait]
impl HookRunner for HookRegistry {
    async fn has_hooks(&self, point: HookPoint) -> bool {
        self.hooks.get(&point).is_some_and(|hooks| !hooks.is_empty())
    }

    async fn run(&self, point: HookPoint, order: &Order) -> Result<(), HookFailure> {
        for hook in self.hooks.get(&point).into_iter().flatten() {
            (hook.action)(order)
                .map_err(|message| HookFailure { hook: hook.name.clone(), message })?;
        }
        Ok(())
    }
}
