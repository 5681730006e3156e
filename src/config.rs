//! Runtime configuration

use serde::{Deserialize, Serialize};

/// Configuration for a [`ScriptRuntime`](crate::ScriptRuntime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads in the host task pool (bridged operations, timer
    /// sleeps). The engine itself always runs on its own dedicated thread.
    pub host_threads: usize,
    /// Microtask drain budget per engine job. The drain always runs to
    /// completion; crossing the budget is reported as a warning since it
    /// usually means a reaction is enqueueing microtasks in a loop.
    pub microtask_budget: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host_threads: 2,
            microtask_budget: 10_000,
        }
    }
}
