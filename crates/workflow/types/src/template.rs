//! Workflow templates: reusable, user-authored step sequences
//!
//! A WorkflowTemplate is the static side of a workflow: an ordered
//! list of typed steps plus an optional recurrence schedule. Insertion
//! order is execution order. Templates are edited between runs only;
//! a running instance executes against its own snapshot.

use crate::{Schedule, WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Identifiers ──────────────────────────────────────────────────────

/// Unique identifier for a workflow template
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
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

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The account a template (and its runs) belongs to
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a step, stable within its template
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for an autonomous agent
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for an agent skill
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillId(pub String);

impl SkillId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SkillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Workflow Template ────────────────────────────────────────────────

/// A reusable workflow definition: ordered steps plus an optional schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Unique identifier
    pub id: TemplateId,
    /// The account this template belongs to
    pub account_id: AccountId,
    /// Human-readable name
    pub name: String,
    /// Description of what this workflow accomplishes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Display icon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Ordered steps; insertion order is execution order
    pub steps: Vec<StepDef>,
    /// Optional recurrence schedule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Whether the schedule is currently armed
    pub is_schedule_active: bool,
    /// When the last run was started (scheduled or manual)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    /// When this template was created
    pub created_at: DateTime<Utc>,
    /// When this template was last updated
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; deleted templates are hidden, never removed
    /// while runs still reference them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WorkflowTemplate {
    /// Create a new empty template
    pub fn new(account_id: AccountId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TemplateId::generate(),
            account_id,
            name: name.into(),
            description: None,
            icon: None,
            steps: Vec::new(),
            schedule: None,
            is_schedule_active: false,
            last_run_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Attach a schedule and arm it
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self.is_schedule_active = true;
        self
    }

    /// Append a step. Step ids must be unique within the template.
    pub fn add_step(&mut self, step: StepDef) -> WorkflowResult<()> {
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        self.steps.push(step);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Get a step by its stable id
    pub fn step(&self, id: &StepId) -> Option<&StepDef> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Total number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Check whether this template has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// A template can be run only if it is live and has at least one step
    pub fn is_runnable(&self) -> bool {
        !self.is_deleted() && !self.steps.is_empty()
    }

    /// Soft-delete this template. Disarms the schedule as well.
    pub fn soft_delete(&mut self) {
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.is_schedule_active = false;
        self.updated_at = now;
    }

    /// Disarm the schedule without removing it (used after a `once`
    /// schedule fires)
    pub fn deactivate_schedule(&mut self) {
        self.is_schedule_active = false;
        self.updated_at = Utc::now();
    }

    /// Validate the template for structural correctness
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::ValidationError(
                "template name must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(&step.id) {
                return Err(WorkflowError::ValidationError(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
            if let StepKind::HumanGate { gate_options, .. } = &step.kind {
                if gate_options.iter().any(|o| o.trim().is_empty()) {
                    return Err(WorkflowError::ValidationError(format!(
                        "step '{}' has an empty gate option",
                        step.id
                    )));
                }
            }
        }

        if let Some(schedule) = &self.schedule {
            schedule.validate()?;
        }

        Ok(())
    }
}

// ── Step Definition ──────────────────────────────────────────────────

/// One typed step in a workflow template
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    /// Identifier, stable within the template
    pub id: StepId,
    /// Human-readable title
    pub title: String,
    /// Description of what this step does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The step's type and type-specific configuration
    #[serde(flatten)]
    pub kind: StepKind,
}

impl StepDef {
    /// Create an agent task step (agent auto-assigned unless pinned)
    pub fn agent_task(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: StepId::new(id),
            title: title.into(),
            description: None,
            kind: StepKind::AgentTask {
                agent_id: None,
                skill_id: None,
                prompt: None,
            },
        }
    }

    /// Create a human gate step
    pub fn human_gate(
        id: impl Into<String>,
        title: impl Into<String>,
        gate_type: GateType,
    ) -> Self {
        Self {
            id: StepId::new(id),
            title: title.into(),
            description: None,
            kind: StepKind::HumanGate {
                gate_type,
                gate_prompt: None,
                gate_options: Vec::new(),
            },
        }
    }

    /// Create a document output step
    pub fn document_output(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: StepId::new(id),
            title: title.into(),
            description: None,
            kind: StepKind::DocumentOutput {
                document_title: None,
            },
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Pin the executing agent (agent task steps only)
    pub fn with_agent(mut self, agent: AgentId) -> Self {
        if let StepKind::AgentTask { agent_id, .. } = &mut self.kind {
            *agent_id = Some(agent);
        }
        self
    }

    /// Require a skill of the executing agent (agent task steps only)
    pub fn with_skill(mut self, skill: SkillId) -> Self {
        if let StepKind::AgentTask { skill_id, .. } = &mut self.kind {
            *skill_id = Some(skill);
        }
        self
    }

    /// Set the agent prompt (agent task steps only)
    pub fn with_prompt(mut self, text: impl Into<String>) -> Self {
        if let StepKind::AgentTask { prompt, .. } = &mut self.kind {
            *prompt = Some(text.into());
        }
        self
    }

    /// Set the question shown to the human (gate steps only)
    pub fn with_gate_prompt(mut self, text: impl Into<String>) -> Self {
        if let StepKind::HumanGate { gate_prompt, .. } = &mut self.kind {
            *gate_prompt = Some(text.into());
        }
        self
    }

    /// Set the choices for a select gate (gate steps only)
    pub fn with_gate_options(mut self, options: Vec<String>) -> Self {
        if let StepKind::HumanGate { gate_options, .. } = &mut self.kind {
            *gate_options = options;
        }
        self
    }

    /// Set the produced document's title (document steps only)
    pub fn with_document_title(mut self, title: impl Into<String>) -> Self {
        if let StepKind::DocumentOutput { document_title } = &mut self.kind {
            *document_title = Some(title.into());
        }
        self
    }

    /// Check if this step suspends the run until a human responds
    pub fn is_gate(&self) -> bool {
        matches!(self.kind, StepKind::HumanGate { .. })
    }

    /// Gate configuration, if this step is a gate
    pub fn gate_config(&self) -> Option<(GateType, &[String])> {
        match &self.kind {
            StepKind::HumanGate {
                gate_type,
                gate_options,
                ..
            } => Some((*gate_type, gate_options.as_slice())),
            _ => None,
        }
    }
}

/// The type-specific payload of a step. A closed sum: the engine
/// dispatches exhaustively on this, one handler per variant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Delegated to an autonomous agent via the task executor
    AgentTask {
        /// Explicit agent; absent means auto-assign
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        /// Skill the executing agent must have
        #[serde(skip_serializing_if = "Option::is_none")]
        skill_id: Option<SkillId>,
        /// Prompt handed to the executor; defaults to the step title
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    /// Suspends the run until a human approves, selects, or types
    HumanGate {
        gate_type: GateType,
        #[serde(skip_serializing_if = "Option::is_none")]
        gate_prompt: Option<String>,
        /// Choices for a `select` gate; empty means the selection is
        /// sourced from upstream output
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        gate_options: Vec<String>,
    },
    /// Synthesizes a document from the accumulated step outputs
    DocumentOutput {
        /// Title of the produced document; defaults to the step title
        #[serde(skip_serializing_if = "Option::is_none")]
        document_title: Option<String>,
    },
}

/// What kind of answer a human gate expects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateType {
    /// Yes/no decision
    Approve,
    /// Pick one or more options
    Select,
    /// Free-text input
    Input,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schedule;

    fn make_template() -> WorkflowTemplate {
        let mut template = WorkflowTemplate::new(AccountId::new("acct-1"), "Weekly Digest")
            .with_description("Research and publish the weekly digest");
        template
            .add_step(
                StepDef::agent_task("research", "Research topics")
                    .with_prompt("Find three topics worth covering this week"),
            )
            .unwrap();
        template
            .add_step(
                StepDef::human_gate("pick", "Pick topics", GateType::Select)
                    .with_gate_options(vec!["AI".into(), "Rust".into()]),
            )
            .unwrap();
        template
            .add_step(StepDef::document_output("draft", "Draft digest"))
            .unwrap();
        template
    }

    #[test]
    fn test_create_template() {
        let template = make_template();
        assert_eq!(template.name, "Weekly Digest");
        assert_eq!(template.step_count(), 3);
        assert!(!template.is_deleted());
        assert!(template.is_runnable());
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_duplicate_step_id_rejected() {
        let mut template = make_template();
        let result = template.add_step(StepDef::agent_task("research", "Again"));
        assert!(matches!(result, Err(WorkflowError::ValidationError(_))));
        assert_eq!(template.step_count(), 3);
    }

    #[test]
    fn test_empty_template_not_runnable() {
        let template = WorkflowTemplate::new(AccountId::new("acct-1"), "Empty");
        assert!(!template.is_runnable());
        // Storable, just not runnable
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_soft_delete_disarms_schedule() {
        let mut template = WorkflowTemplate::new(AccountId::new("acct-1"), "Scheduled")
            .with_schedule(Schedule::daily(9));
        assert!(template.is_schedule_active);

        template.soft_delete();
        assert!(template.is_deleted());
        assert!(!template.is_schedule_active);
        assert!(!template.is_runnable());
    }

    #[test]
    fn test_step_lookup_by_id() {
        let template = make_template();
        let step = template.step(&StepId::new("pick")).unwrap();
        assert!(step.is_gate());
        let (gate_type, options) = step.gate_config().unwrap();
        assert_eq!(gate_type, GateType::Select);
        assert_eq!(options, ["AI", "Rust"]);

        assert!(template.step(&StepId::new("missing")).is_none());
    }

    #[test]
    fn test_builders_ignore_wrong_kind() {
        let step = StepDef::document_output("doc", "Report").with_prompt("not an agent step");
        assert!(matches!(
            step.kind,
            StepKind::DocumentOutput {
                document_title: None
            }
        ));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let template = WorkflowTemplate::new(AccountId::new("acct-1"), "   ");
        assert!(matches!(
            template.validate(),
            Err(WorkflowError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_gate_option() {
        let mut template = WorkflowTemplate::new(AccountId::new("acct-1"), "Gated");
        template
            .add_step(
                StepDef::human_gate("gate", "Choose", GateType::Select)
                    .with_gate_options(vec!["ok".into(), "  ".into()]),
            )
            .unwrap();
        assert!(matches!(
            template.validate(),
            Err(WorkflowError::ValidationError(_))
        ));
    }

    #[test]
    fn test_step_kind_wire_format() {
        let step = StepDef::agent_task("research", "Research").with_prompt("dig in");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "agent_task");
        assert_eq!(json["prompt"], "dig in");
        // Absent optionals stay off the wire
        assert!(json.get("agent_id").is_none());

        let back: StepDef = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }
}
