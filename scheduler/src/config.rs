//! Tuning configuration for the scheduler's tick loop and per-node executors.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Configuration for the scheduler's background tick loop and executors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConf {
    /// Interval, in milliseconds, between automatic dispatch/process ticks.
    #[serde(default = "SchedulerConf::default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Executor configuration, applied uniformly to every registered node.
    #[serde(default)]
    pub executor: ExecutorConf,
}

impl Default for SchedulerConf {
    fn default() -> Self {
        SchedulerConf {
            tick_interval_ms: SchedulerConf::default_tick_interval_ms(),
            executor: Default::default(),
        }
    }
}

impl SchedulerConf {
    fn default_tick_interval_ms() -> u64 {
        200
    }

    /// The tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Per-node executor tuning: concurrency and RPC timeouts.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConf {
    /// Maximum number of actions a single node's executor runs concurrently.
    #[serde(default = "ExecutorConf::default_concurrent_actions")]
    pub concurrent_actions: usize,

    /// Upper bound, in milliseconds, added to "now" to derive an action's own deadline
    /// when it is shorter than the task's deadline.
    #[serde(default = "ExecutorConf::default_action_timeout_ms")]
    pub action_timeout_ms: u64,
}

impl Default for ExecutorConf {
    fn default() -> Self {
        ExecutorConf {
            concurrent_actions: ExecutorConf::default_concurrent_actions(),
            action_timeout_ms: ExecutorConf::default_action_timeout_ms(),
        }
    }
}

impl ExecutorConf {
    fn default_concurrent_actions() -> usize {
        let parallel = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);
        parallel * 2
    }

    fn default_action_timeout_ms() -> u64 {
        30_000
    }

    /// The action timeout as a [`Duration`].
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}
