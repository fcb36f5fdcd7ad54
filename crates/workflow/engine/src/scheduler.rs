//! Scheduler: starts due runs from templates with an armed schedule
//!
//! A single periodic tick walks every schedulable template and starts
//! a run where the schedule matches "now". Two guards keep the tick
//! idempotent within a firing window:
//!
//! - a template with a run still running or paused is suppressed
//!   (at-most-one-active-run-per-template; a gate left open for days
//!   holds that template's schedule),
//! - `last_run_at` within the current matching hour suppresses a
//!   second fire even after the first run finished.

use crate::state_machine::RunStateMachine;
use crate::store::Store;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use workflow_types::{RunId, ScheduleType, TriggeredBy, WorkflowResult, WorkflowTemplate};

/// Scheduler configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
        }
    }
}

fn default_tick_interval() -> u64 {
    60
}

/// Periodically evaluates template schedules and starts due runs
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn Store>,
    state_machine: Arc<RunStateMachine>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn Store>,
        state_machine: Arc<RunStateMachine>,
    ) -> Self {
        Self {
            config,
            store,
            state_machine,
            running: AtomicBool::new(false),
        }
    }

    /// Evaluate every schedulable template against `now` and start the
    /// due ones. Returns the ids of the runs that were started.
    ///
    /// One template failing never stops the sweep over the rest.
    pub async fn tick(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<RunId>> {
        let templates = self.store.list_schedulable_templates().await?;
        let mut started = Vec::new();

        for template in templates {
            match self.evaluate_template(template, now).await {
                Ok(Some(run_id)) => started.push(run_id),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to evaluate scheduled template");
                }
            }
        }

        Ok(started)
    }

    /// Run the tick loop until [`stop`](Self::stop) is called
    pub async fn run_loop(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            tick_interval_secs = self.config.tick_interval_secs,
            "Scheduler started"
        );

        let mut ticker = interval(Duration::from_secs(self.config.tick_interval_secs));
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.tick(Utc::now()).await {
                tracing::error!(error = %e, "Scheduler tick failed");
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Stop the tick loop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn evaluate_template(
        &self,
        mut template: WorkflowTemplate,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Option<RunId>> {
        let Some(schedule) = template.schedule.clone() else {
            return Ok(None);
        };
        if !schedule.matches(now) {
            return Ok(None);
        }
        if already_fired_this_window(&template, now) {
            return Ok(None);
        }
        if self.store.has_active_run(&template.id).await? {
            tracing::debug!(
                template_id = %template.id,
                "Scheduled trigger suppressed, a run is still in flight"
            );
            return Ok(None);
        }

        let run = self
            .state_machine
            .start_run(&template, TriggeredBy::Scheduler)
            .await?;

        template.last_run_at = Some(now);
        if schedule.schedule_type == ScheduleType::Once {
            template.deactivate_schedule();
            tracing::info!(
                template_id = %template.id,
                "One-shot schedule fired and was disarmed"
            );
        }
        template.updated_at = now;
        self.store.upsert_template(template).await?;

        Ok(Some(run.id))
    }
}

/// Whether `last_run_at` already falls in the hour window `now` is in
fn already_fired_this_window(template: &WorkflowTemplate, now: DateTime<Utc>) -> bool {
    match template.last_run_at {
        Some(last) => {
            last.date_naive() == now.date_naive() && last.hour() == now.hour()
        }
        None => false,
    }
}
