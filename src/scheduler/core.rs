//! Polling loop and per-tick execution policy.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cron::CronExpression;
use crate::scheduler::TaskCallback;
use crate::store::{TaskRecord, TaskStore};
use crate::time::{Clock, Sleeper};

/// One registered task as held by the running loop.
pub(crate) struct LoopTask {
    pub name: String,
    pub expression: Arc<CronExpression>,
    pub callback: TaskCallback,
    pub retry_delay: chrono::Duration,
}

/// Why a task was selected to run this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DueReason {
    /// A previous scheduler instance died mid-attempt
    Interrupted,
    /// A scheduled firing was missed; carries the firing time
    Cron(DateTime<Local>),
    /// A pending retry came due; carries the retry deadline
    Retry(DateTime<Local>),
}

pub(crate) struct SchedulerLoop {
    pub identifier: String,
    pub tasks: Vec<LoopTask>,
    pub store: Arc<TaskStore>,
    pub clock: Arc<dyn Clock>,
    pub poll_interval: Duration,
}

impl SchedulerLoop {
    pub(crate) async fn run(
        self,
        sleeper: Arc<dyn Sleeper>,
        mut shutdown: watch::Receiver<bool>,
        cycle_tx: watch::Sender<u64>,
    ) {
        info!(
            identifier = %self.identifier,
            tasks = self.tasks.len(),
            "Scheduler loop started"
        );

        let mut cycles: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_tick().await {
                error!(
                    "Scheduler tick failed: {:#}. State unchanged; retrying next tick",
                    e
                );
            }

            cycles += 1;
            let _ = cycle_tx.send(cycles);

            tokio::select! {
                _ = sleeper.sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        debug!(identifier = %self.identifier, "Scheduler loop exited");
    }

    /// One poll cycle: select due tasks under a transaction, then run them
    /// one at a time in registration order.
    async fn run_tick(&self) -> Result<()> {
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let records = TaskStore::load_tasks(&mut tx).await?;
        let mut by_name: HashMap<String, TaskRecord> = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();

        let mut selected: Vec<&LoopTask> = Vec::new();
        for task in &self.tasks {
            let Some(record) = by_name.get_mut(&task.name) else {
                warn!("No persisted state for task '{}'; skipping", task.name);
                continue;
            };

            match self.evaluate(task, record, now)? {
                Some(DueReason::Interrupted) => {
                    // The orphan marker was cleared in memory; persist that
                    // together with the rest of this tick's selection.
                    TaskStore::update_task(&mut tx, record).await?;
                    selected.push(task);
                }
                Some(reason) => {
                    debug!("Task '{}' due: {:?}", task.name, reason);
                    selected.push(task);
                }
                None => {}
            }
        }
        tx.commit().await?;

        for task in selected {
            self.execute(task).await?;
        }
        Ok(())
    }

    /// Decide whether `task` must run this tick.
    ///
    /// Mutates `record` only for orphan recovery (the caller persists it).
    fn evaluate(
        &self,
        task: &LoopTask,
        record: &mut TaskRecord,
        now: DateTime<Local>,
    ) -> Result<Option<DueReason>> {
        if record.last_attempt_time.is_some() {
            match record.scheduler_identifier.as_deref() {
                Some(owner) if owner != self.identifier => {
                    warn!(
                        task = %record.name,
                        previous_scheduler = %owner,
                        current_scheduler = %self.identifier,
                        "Task was interrupted during shutdown and will be restarted"
                    );
                    record.last_attempt_time = None;
                    record.scheduler_identifier = None;
                    record.pending_retry_until = None;
                    return Ok(Some(DueReason::Interrupted));
                }
                // Started by this instance and not yet recorded: still running.
                Some(_) => return Ok(None),
                // Record predates owner tracking; apply normal policy.
                None => {}
            }
        }

        let last_fire = task.expression.prev_fire(&now)?;

        // At most one catch-up per tick: only the most recent firing counts.
        let cron_due_at = match (record.last_success_time, record.last_failure_time) {
            (Some(success), _) => (last_fire > success).then_some(last_fire),
            (None, None) => Some(last_fire),
            // Never succeeded but failed before: only a firing newer than the
            // failure competes with the pending retry.
            (None, Some(failure)) => (last_fire > failure).then_some(last_fire),
        };
        let retry_due_at = record.pending_retry_until.filter(|until| *until <= now);

        Ok(match (cron_due_at, retry_due_at) {
            (Some(cron), Some(retry)) => Some(if retry <= cron {
                DueReason::Retry(retry)
            } else {
                DueReason::Cron(cron)
            }),
            (Some(cron), None) => Some(DueReason::Cron(cron)),
            (None, Some(retry)) => Some(DueReason::Retry(retry)),
            (None, None) => None,
        })
    }

    /// Run one task: commit the attempt marker, invoke the callback outside
    /// any transaction, then commit the outcome. A crash between the two
    /// commits leaves the marker for the next instance's orphan recovery.
    async fn execute(&self, task: &LoopTask) -> Result<()> {
        let started = self.clock.now();

        let mut tx = self.store.begin().await?;
        let Some(mut record) = find_task(&mut tx, &task.name).await? else {
            warn!("Task '{}' vanished from the store before execution", task.name);
            return Ok(());
        };
        record.last_attempt_time = Some(started);
        record.scheduler_identifier = Some(self.identifier.clone());
        TaskStore::update_task(&mut tx, &record).await?;
        tx.commit().await?;

        info!("Executing task '{}'", task.name);
        let outcome = (task.callback)().await;
        let finished = self.clock.now();

        let mut tx = self.store.begin().await?;
        let Some(mut record) = find_task(&mut tx, &task.name).await? else {
            warn!("Task '{}' vanished from the store during execution", task.name);
            return Ok(());
        };

        match outcome {
            Ok(()) => {
                record.last_success_time = Some(finished);
                record.last_attempt_time = None;
                record.scheduler_identifier = None;
                record.pending_retry_until = None;
                TaskStore::update_task(&mut tx, &record).await?;
                tx.commit().await?;
                info!("Task '{}' completed", task.name);
            }
            Err(e) => {
                let retry_at = finished + task.retry_delay;
                record.last_failure_time = Some(finished);
                record.pending_retry_until = Some(retry_at);
                record.last_attempt_time = None;
                record.scheduler_identifier = None;
                TaskStore::update_task(&mut tx, &record).await?;
                tx.commit().await?;
                error!(
                    "Task '{}' failed: {:#}. Will retry no earlier than {}",
                    task.name, e, retry_at
                );
            }
        }
        Ok(())
    }
}

async fn find_task(
    tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
    name: &str,
) -> Result<Option<TaskRecord>> {
    Ok(TaskStore::load_tasks(tx)
        .await?
        .into_iter()
        .find(|record| record.name == name))
}
