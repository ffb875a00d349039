//! Declarative task scheduling.
//!
//! [`CronScheduler`] owns the registration surface: it validates a list of
//! task registrations, reconciles them with the persisted task list under a
//! transaction, and runs the polling loop. Registrations are declarative
//! and override what is persisted: tasks absent from the newest list are
//! deleted, surviving tasks keep their lifecycle timestamps.

mod core;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::constants::scheduling;
use crate::cron::{frequency, CronExpression};
use crate::errors::SchedulerError;
use crate::scheduler::core::{LoopTask, SchedulerLoop};
use crate::store::{TaskRecord, TaskStore};
use crate::time::{Clock, Sleeper, SystemClock, TokioSleeper};

/// The future returned by one task invocation.
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A user-supplied task body. Invoked once per run; an `Err` marks the run
/// failed and schedules a retry.
pub type TaskCallback = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// One task registration: name, schedule, body, and retry backoff.
#[derive(Clone)]
pub struct TaskRegistration {
    pub name: String,
    pub cron_expression: String,
    pub retry_delay: chrono::Duration,
    pub callback: TaskCallback,
}

impl TaskRegistration {
    pub fn new(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        retry_delay: chrono::Duration,
        callback: TaskCallback,
    ) -> Self {
        Self {
            name: name.into(),
            cron_expression: cron_expression.into(),
            retry_delay,
            callback,
        }
    }

    /// A registration with the default retry delay.
    pub fn with_default_retry(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        callback: TaskCallback,
    ) -> Self {
        let retry_delay =
            chrono::Duration::milliseconds(scheduling::DEFAULT_RETRY_DELAY.as_millis() as i64);
        Self::new(name, cron_expression, retry_delay, callback)
    }
}

/// Scheduler tuning knobs, all defaulted.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Cadence of the polling loop. Clamped below to one millisecond.
    pub poll_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: scheduling::DEFAULT_POLL_INTERVAL,
        }
    }
}

struct RunningLoop {
    identifier: String,
    shutdown: watch::Sender<bool>,
    cycles: watch::Receiver<u64>,
    handle: JoinHandle<()>,
}

/// Persistent cron scheduler.
///
/// Collaborators (store, clock, sleeper) are injected so tests can drive
/// time and observe state without touching process-wide globals.
pub struct CronScheduler {
    store: Arc<TaskStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    options: SchedulerOptions,
    running: Mutex<Option<RunningLoop>>,
}

impl CronScheduler {
    pub fn new(
        store: Arc<TaskStore>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        options: SchedulerOptions,
    ) -> Self {
        let mut options = options;
        if options.poll_interval < scheduling::MIN_POLL_INTERVAL {
            options.poll_interval = scheduling::MIN_POLL_INTERVAL;
        }
        Self {
            store,
            clock,
            sleeper,
            options,
            running: Mutex::new(None),
        }
    }

    /// A scheduler over the production clock and sleeper.
    pub fn with_defaults(store: Arc<TaskStore>) -> Self {
        Self::new(
            store,
            Arc::new(SystemClock),
            Arc::new(TokioSleeper),
            SchedulerOptions::default(),
        )
    }

    /// Validate `registrations`, reconcile them with persisted state, and
    /// start (or restart) the polling loop under a fresh instance
    /// identifier.
    ///
    /// Fails atomically: no state is written and any running loop is left
    /// untouched when validation rejects the list.
    pub async fn initialize(
        &self,
        registrations: Vec<TaskRegistration>,
    ) -> Result<(), SchedulerError> {
        let now = self.clock.now();

        for (index, registration) in registrations.iter().enumerate() {
            if registration.name.is_empty() {
                return Err(SchedulerError::InvalidRegistration {
                    index,
                    reason: "Task name must be a non-empty string".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for registration in &registrations {
            if !seen.insert(registration.name.as_str()) {
                return Err(SchedulerError::DuplicateTask {
                    task_name: registration.name.clone(),
                });
            }
        }

        let mut expressions = Vec::with_capacity(registrations.len());
        for registration in &registrations {
            let expression = CronExpression::parse(&registration.cron_expression)?;
            frequency::validate_frequency(&expression, self.options.poll_interval, now)?;
            expressions.push(Arc::new(expression));
        }

        // Validation passed; a previous loop (if any) must not race the
        // state rewrite below.
        self.stop().await;

        self.sync_persisted_state(&registrations)
            .await
            .map_err(|e| SchedulerError::Store {
                reason: format!("{:#}", e),
            })?;

        let identifier = Uuid::new_v4().to_string();
        let tasks: Vec<LoopTask> = registrations
            .into_iter()
            .zip(expressions)
            .map(|(registration, expression)| LoopTask {
                name: registration.name,
                expression,
                callback: registration.callback,
                retry_delay: registration.retry_delay,
            })
            .collect();
        let task_count = tasks.len();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (cycle_tx, cycle_rx) = watch::channel(0u64);

        let scheduler_loop = SchedulerLoop {
            identifier: identifier.clone(),
            tasks,
            store: self.store.clone(),
            clock: self.clock.clone(),
            poll_interval: self.options.poll_interval,
        };
        let handle = tokio::spawn(scheduler_loop.run(self.sleeper.clone(), shutdown_rx, cycle_tx));

        *self.running.lock().await = Some(RunningLoop {
            identifier: identifier.clone(),
            shutdown: shutdown_tx,
            cycles: cycle_rx,
            handle,
        });

        info!(
            "Scheduler {} initialized with {} tasks (poll interval {:?})",
            identifier, task_count, self.options.poll_interval
        );
        Ok(())
    }

    /// Rewrite the persisted list to mirror `registrations`: new names get
    /// empty lifecycle state, surviving names keep theirs (with refreshed
    /// expression and retry delay), omitted names are deleted.
    async fn sync_persisted_state(
        &self,
        registrations: &[TaskRegistration],
    ) -> anyhow::Result<()> {
        let mut tx = self.store.begin().await?;
        let existing = TaskStore::load_tasks(&mut tx).await?;

        let registered: HashSet<&str> = registrations
            .iter()
            .map(|registration| registration.name.as_str())
            .collect();
        for record in &existing {
            if !registered.contains(record.name.as_str()) {
                info!("Dropping persisted task '{}': no longer registered", record.name);
            }
        }

        let next_state: Vec<TaskRecord> = registrations
            .iter()
            .map(|registration| {
                match existing.iter().find(|record| record.name == registration.name) {
                    Some(record) => {
                        let mut record = record.clone();
                        record.cron_expression = registration.cron_expression.clone();
                        record.retry_delay_ms = registration.retry_delay.num_milliseconds();
                        record
                    }
                    None => TaskRecord::new(
                        &registration.name,
                        &registration.cron_expression,
                        registration.retry_delay,
                    ),
                }
            })
            .collect();

        TaskStore::replace_tasks(&mut tx, &next_state).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Signal the loop to exit after its current tick and await it.
    /// Persistent state is left untouched.
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            if let Err(e) = running.handle.await {
                error!("Scheduler loop join failed: {}", e);
            }
            info!("Scheduler {} stopped", running.identifier);
        }
    }

    /// Identifier of the running instance, if any.
    pub async fn identifier(&self) -> Option<String> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| running.identifier.clone())
    }

    /// Poll cycles completed by the running instance (0 when stopped).
    pub async fn completed_cycles(&self) -> u64 {
        match self.running.lock().await.as_ref() {
            Some(running) => *running.cycles.borrow(),
            None => 0,
        }
    }

    /// Wait until at least `target` poll cycles have completed.
    ///
    /// Returns immediately when the scheduler is not running; also unblocks
    /// if the loop exits while waiting.
    pub async fn wait_for_cycle(&self, target: u64) {
        let cycles = {
            self.running
                .lock()
                .await
                .as_ref()
                .map(|running| running.cycles.clone())
        };
        if let Some(mut cycles) = cycles {
            let _ = cycles.wait_for(|completed| *completed >= target).await;
        }
    }
}
