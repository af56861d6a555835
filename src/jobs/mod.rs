// src/jobs/mod.rs
//! Ingestion jobs: the closed set of task identifiers, the runnable
//! contract the scheduler drives, and the registry binding one to the other.

pub mod handlers;
pub mod scheduler;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PulseError, PulseResult};

pub use handlers::{BlockStatsJob, ValidatorStatsJob};
pub use scheduler::{interval_key, resolve_interval, start_task, Scheduler, TaskSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    BlockStats,
    Validator,
}

impl TaskId {
    pub const ALL: [TaskId; 2] = [TaskId::BlockStats, TaskId::Validator];

    /// Name used in config keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskId::BlockStats => "blockStats",
            TaskId::Validator => "validator",
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PulseError::UnknownTask(s.to_string()))
    }
}

/// One scheduled unit of work. Failures are handled inside `execute`;
/// the scheduler only sees completion.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self);
}

/// Task id -> handler, built once at startup and handed to the scheduler.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<TaskId, Arc<dyn Job>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: TaskId, job: Arc<dyn Job>) -> &mut Self {
        if self.handlers.insert(id, job).is_some() {
            tracing::warn!(target: "ingest", task = %id, "handler replaced");
        }
        self
    }

    pub fn register_named(&mut self, name: &str, job: Arc<dyn Job>) -> PulseResult<&mut Self> {
        let id = name.parse::<TaskId>()?;
        Ok(self.register(id, job))
    }

    pub fn resolve(&self, id: TaskId) -> PulseResult<Arc<dyn Job>> {
        self.handlers
            .get(&id)
            .cloned()
            .ok_or_else(|| PulseError::UnknownTask(id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
