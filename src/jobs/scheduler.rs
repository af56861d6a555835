// src/jobs/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{Job, TaskId, TaskRegistry};
use crate::config::ConfigSource;
use crate::error::{PulseError, PulseResult};

/// `timer` + `validator` -> `timer.validatorIntervalSeconds`
pub fn interval_key(namespace: &str, id: TaskId) -> String {
    format!("{namespace}.{}IntervalSeconds", id.as_str())
}

/// Interval for `id`, in whole seconds. Missing, unparsable or zero values
/// are `InvalidInterval`.
pub fn resolve_interval(
    id: TaskId,
    namespace: &str,
    cfg: &dyn ConfigSource,
) -> PulseResult<Duration> {
    let key = interval_key(namespace, id);
    match cfg.get_u64(&key) {
        Some(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(PulseError::InvalidInterval { key }),
    }
}

/// A task ready to run: immutable once built.
#[derive(Clone)]
pub struct TaskSpec {
    id: TaskId,
    interval: Duration,
    job: Arc<dyn Job>,
}

impl TaskSpec {
    pub fn new(id: TaskId, interval: Duration, job: Arc<dyn Job>) -> PulseResult<Self> {
        if interval.is_zero() {
            return Err(PulseError::InvalidInterval {
                key: id.as_str().to_string(),
            });
        }
        Ok(Self { id, interval, job })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Start one independent timer loop for `spec`.
///
/// The first tick fires one interval after start. Each tick awaits the job
/// to completion before the next can fire, so a task never overlaps itself;
/// ticks missed during a slow run are not replayed.
pub fn start_task(spec: TaskSpec) -> JoinHandle<()> {
    tokio::spawn(async move {
        let TaskSpec { id, interval, job } = spec;
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(target: "ingest", task = %id, interval_secs = interval.as_secs(), "task started");
        loop {
            ticker.tick().await;
            counter!("ingest_ticks_total", "task" => id.as_str()).increment(1);
            job.execute().await;
        }
    })
}

/// Owns the task list for the life of the process.
#[derive(Debug, Default)]
pub struct Scheduler {
    specs: Vec<TaskSpec>,
}

impl Scheduler {
    pub fn new(specs: Vec<TaskSpec>) -> Self {
        Self { specs }
    }

    /// Build specs for `tasks` from the registry and config. A task whose
    /// handler or interval cannot be resolved is left out and its error
    /// returned; the others are still scheduled.
    pub fn from_registry(
        registry: &TaskRegistry,
        tasks: &[TaskId],
        namespace: &str,
        cfg: &dyn ConfigSource,
    ) -> (Self, Vec<(TaskId, PulseError)>) {
        let mut specs = Vec::with_capacity(tasks.len());
        let mut rejected = Vec::new();

        for &id in tasks {
            let built = registry.resolve(id).and_then(|job| {
                let interval = resolve_interval(id, namespace, cfg)?;
                TaskSpec::new(id, interval, job)
            });
            match built {
                Ok(spec) => specs.push(spec),
                Err(e) => {
                    tracing::error!(target: "ingest", task = %id, error = %e, "task not scheduled");
                    rejected.push((id, e));
                }
            }
        }

        (Self { specs }, rejected)
    }

    pub fn specs(&self) -> &[TaskSpec] {
        &self.specs
    }

    pub fn start(self) -> Vec<(TaskId, JoinHandle<()>)> {
        self.specs
            .into_iter()
            .map(|spec| (spec.id, start_task(spec)))
            .collect()
    }
}
