//! Workflow runs: executing instances of a template
//!
//! A WorkflowRun carries its own deep copy of the template's steps
//! (the snapshot), taken at start time. The snapshot never changes for
//! the run's lifetime, even if the template is edited mid-run.
//!
//! The mutators here only adjust record fields. All transition policy
//! (which state may follow which, when a step may advance) belongs to
//! the engine's run state machine, which exclusively owns `status` and
//! `current_step_index` transitions.

use crate::{AccountId, StepDef, StepId, TemplateId, WorkflowTemplate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow run
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a human user
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who started a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggeredBy {
    Scheduler,
    User { id: UserId },
}

impl TriggeredBy {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User {
            id: UserId::new(id),
        }
    }
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduler => write!(f, "scheduler"),
            Self::User { id } => write!(f, "user:{}", id),
        }
    }
}

// ── Workflow Run ─────────────────────────────────────────────────────

/// One execution instance of a workflow template
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique identifier
    pub id: RunId,
    /// The template this run was started from
    pub template_id: TemplateId,
    /// The account this run belongs to
    pub account_id: AccountId,
    /// Deep copy of the template's steps at start time; immutable for
    /// the run's lifetime
    pub steps_snapshot: Vec<StepDef>,
    /// Current lifecycle state
    pub status: RunStatus,
    /// Index into `steps_snapshot`; equals `steps_snapshot.len()`
    /// exactly when the run completed
    pub current_step_index: usize,
    /// Per-step progress, keyed by stable step id from the snapshot
    pub step_results: HashMap<StepId, StepResult>,
    /// Who started this run
    pub triggered_by: TriggeredBy,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run was last updated
    pub updated_at: DateTime<Utc>,
    /// When the run reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal failure detail, for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optimistic-concurrency token; bumped by the store on every
    /// successful save
    #[serde(default)]
    pub version: u64,
}

impl WorkflowRun {
    /// Create a new run from a template, snapshotting its steps.
    /// Every step starts with a pending result.
    pub fn new(template: &WorkflowTemplate, triggered_by: TriggeredBy) -> Self {
        let now = Utc::now();
        let step_results = template
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepResult::pending()))
            .collect();
        Self {
            id: RunId::generate(),
            template_id: template.id.clone(),
            account_id: template.account_id.clone(),
            steps_snapshot: template.steps.clone(),
            status: RunStatus::Running,
            current_step_index: 0,
            step_results,
            triggered_by,
            started_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
            version: 0,
        }
    }

    // ── Query methods ────────────────────────────────────────────────

    /// Check if the run reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the run is still in flight (running or paused)
    pub fn is_active(&self) -> bool {
        matches!(self.status, RunStatus::Running | RunStatus::Paused)
    }

    /// The step at the current index, if any
    pub fn current_step(&self) -> Option<&StepDef> {
        self.steps_snapshot.get(self.current_step_index)
    }

    /// Progress for a step, by stable id
    pub fn result_for(&self, step_id: &StepId) -> Option<&StepResult> {
        self.step_results.get(step_id)
    }

    /// Accumulated outputs of every completed step before
    /// `upto_index`, in snapshot order. This is the input context for
    /// the step at `upto_index`: downstream steps read everything
    /// upstream, not just the immediate predecessor.
    pub fn context_through(&self, upto_index: usize) -> StepContext {
        let mut context = StepContext::empty();
        for step in self.steps_snapshot.iter().take(upto_index) {
            if let Some(result) = self.step_results.get(&step.id) {
                if result.status == StepStatus::Completed {
                    if let Some(output) = &result.output {
                        context.push(step.id.clone(), step.title.clone(), output.clone());
                    }
                }
            }
        }
        context
    }

    // ── Step-level mutators ──────────────────────────────────────────

    pub fn mark_step_running(&mut self, step_id: &StepId) {
        if let Some(result) = self.step_results.get_mut(step_id) {
            result.status = StepStatus::Running;
        }
        self.updated_at = Utc::now();
    }

    pub fn mark_step_waiting_gate(&mut self, step_id: &StepId) {
        if let Some(result) = self.step_results.get_mut(step_id) {
            result.status = StepStatus::WaitingGate;
        }
        self.updated_at = Utc::now();
    }

    pub fn complete_step(&mut self, step_id: &StepId, output: Value) {
        let now = Utc::now();
        if let Some(result) = self.step_results.get_mut(step_id) {
            result.status = StepStatus::Completed;
            result.output = Some(output);
            result.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    pub fn fail_step(&mut self, step_id: &StepId, error: impl Into<String>) {
        let now = Utc::now();
        if let Some(result) = self.step_results.get_mut(step_id) {
            result.status = StepStatus::Failed;
            result.error = Some(error.into());
            result.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    pub fn record_gate_response(&mut self, step_id: &StepId, response: GateResponse) {
        if let Some(result) = self.step_results.get_mut(step_id) {
            result.gate_response = Some(response);
        }
        self.updated_at = Utc::now();
    }

    // ── Run-level mutators ───────────────────────────────────────────

    /// Move to the next step
    pub fn advance(&mut self) {
        self.current_step_index += 1;
        self.updated_at = Utc::now();
    }

    /// Mark the run completed; the index parks one past the snapshot
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = RunStatus::Completed;
        self.current_step_index = self.steps_snapshot.len();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the run failed; the index stays at the failed step
    pub fn fail(&mut self, reason: impl Into<String>) {
        let now = Utc::now();
        self.status = RunStatus::Failed;
        self.error = Some(reason.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Mark the run cancelled
    pub fn cancel(&mut self) {
        let now = Utc::now();
        self.status = RunStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Suspend at an open gate
    pub fn pause(&mut self) {
        self.status = RunStatus::Paused;
        self.updated_at = Utc::now();
    }

    /// Return from a resolved gate to active execution
    pub fn resume(&mut self) {
        self.status = RunStatus::Running;
        self.updated_at = Utc::now();
    }
}

/// The lifecycle state of a workflow run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Actively executing steps
    Running,
    /// Suspended at an open human gate
    Paused,
    /// All steps completed
    Completed,
    /// A step failed or a gate was rejected; not resumable
    Failed,
    /// Cancelled by a user; not resumable
    Cancelled,
}

impl RunStatus {
    /// Check if this is a terminal state; no transition leaves it
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ── Step Result ──────────────────────────────────────────────────────

/// Progress of one step within a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    /// Structured payload produced by the step; input context for
    /// later steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// The human response, for gate steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_response: Option<GateResponse>,
    /// Failure detail, if the step failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            output: None,
            gate_response: None,
            error: None,
            completed_at: None,
        }
    }
}

/// Status of one step within a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet dispatched
    #[default]
    Pending,
    /// Dispatched to its handler
    Running,
    /// Suspended at an open gate, awaiting a human response
    WaitingGate,
    Completed,
    Failed,
}

// ── Gate Response ────────────────────────────────────────────────────

/// A human's answer to a gate step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateResponse {
    pub action: GateAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    pub responded_by: UserId,
    pub responded_at: DateTime<Utc>,
}

impl GateResponse {
    pub fn approve(responded_by: UserId) -> Self {
        Self {
            action: GateAction::Approve,
            selected_options: Vec::new(),
            input_text: None,
            responded_by,
            responded_at: Utc::now(),
        }
    }

    pub fn reject(responded_by: UserId) -> Self {
        Self {
            action: GateAction::Reject,
            selected_options: Vec::new(),
            input_text: None,
            responded_by,
            responded_at: Utc::now(),
        }
    }

    pub fn select(options: Vec<String>, responded_by: UserId) -> Self {
        Self {
            action: GateAction::Select,
            selected_options: options,
            input_text: None,
            responded_by,
            responded_at: Utc::now(),
        }
    }

    pub fn input(text: impl Into<String>, responded_by: UserId) -> Self {
        Self {
            action: GateAction::Input,
            selected_options: Vec::new(),
            input_text: Some(text.into()),
            responded_by,
            responded_at: Utc::now(),
        }
    }

    /// The response as a step output payload, readable by downstream
    /// steps
    pub fn to_output(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// What the human did at a gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Approve,
    Reject,
    Select,
    Input,
}

// ── Step Context ─────────────────────────────────────────────────────

/// Accumulated upstream outputs handed to a step handler
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepContext {
    entries: Vec<ContextEntry>,
}

/// One upstream step's contribution to the context
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextEntry {
    pub step_id: StepId,
    pub title: String,
    pub output: Value,
}

impl StepContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step_id: StepId, title: String, output: Value) {
        self.entries.push(ContextEntry {
            step_id,
            title,
            output,
        });
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Output of a specific upstream step, by stable id
    pub fn output_of(&self, step_id: &StepId) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| &e.step_id == step_id)
            .map(|e| &e.output)
    }

    /// The whole context as one JSON payload (what an agent prompt is
    /// built from)
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Null)
    }
}
