//! Step handlers: one per step type, dispatched exhaustively
//!
//! Each step type implements the [`StepHandler`] contract and reports
//! a [`StepOutcome`]. Handlers decide, they never mutate run state:
//! applying an outcome (marking results, advancing, pausing, failing)
//! is the run state machine's job.

use crate::executor::{AgentDirectory, TaskExecutor};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use workflow_types::{StepContext, StepDef, StepKind, WorkflowError, WorkflowRun};

/// What a step handler reports back to the state machine
#[derive(Debug)]
pub enum StepOutcome {
    /// The step finished synchronously with this output
    Completed(Value),
    /// The step suspends the run until a human responds
    WaitingGate,
    /// The step failed; terminal for the run
    Failed(WorkflowError),
}

/// The contract every step type implements
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, step: &StepDef, context: &StepContext, run: &WorkflowRun)
        -> StepOutcome;
}

// ── Agent Task ───────────────────────────────────────────────────────

/// Resolves the executing agent and delegates to the task executor
pub struct AgentTaskHandler {
    directory: Arc<dyn AgentDirectory>,
    executor: Arc<dyn TaskExecutor>,
}

impl AgentTaskHandler {
    pub fn new(directory: Arc<dyn AgentDirectory>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            directory,
            executor,
        }
    }
}

#[async_trait]
impl StepHandler for AgentTaskHandler {
    async fn execute(
        &self,
        step: &StepDef,
        context: &StepContext,
        run: &WorkflowRun,
    ) -> StepOutcome {
        let StepKind::AgentTask {
            agent_id,
            skill_id,
            prompt,
        } = &step.kind
        else {
            return StepOutcome::Failed(WorkflowError::ValidationError(format!(
                "step '{}' is not an agent task",
                step.id
            )));
        };

        let agents = match self.directory.list_agents(&run.account_id).await {
            Ok(agents) => agents,
            Err(e) => return StepOutcome::Failed(e),
        };

        // An explicitly pinned agent must itself be eligible; it is
        // never silently substituted. Otherwise take the first
        // eligible agent on the roster.
        let resolved = match agent_id {
            Some(wanted) => agents
                .iter()
                .find(|a| &a.id == wanted && a.is_eligible(skill_id.as_ref())),
            None => agents.iter().find(|a| a.is_eligible(skill_id.as_ref())),
        };
        let Some(agent) = resolved else {
            return StepOutcome::Failed(WorkflowError::NoEligibleAgent(step.id.clone()));
        };

        let prompt = prompt.as_deref().unwrap_or(step.title.as_str());
        tracing::debug!(
            run_id = %run.id,
            step_id = %step.id,
            agent_id = %agent.id,
            "Dispatching agent task"
        );

        match self
            .executor
            .run(&agent.id, skill_id.as_ref(), prompt, context)
            .await
        {
            Ok(output) => StepOutcome::Completed(output),
            Err(error) => StepOutcome::Failed(WorkflowError::StepExecutionFailed(error)),
        }
    }
}

// ── Human Gate ───────────────────────────────────────────────────────

/// Always suspends on first dispatch; a gate never completes itself
pub struct HumanGateHandler;

#[async_trait]
impl StepHandler for HumanGateHandler {
    async fn execute(
        &self,
        step: &StepDef,
        _context: &StepContext,
        _run: &WorkflowRun,
    ) -> StepOutcome {
        if !step.is_gate() {
            return StepOutcome::Failed(WorkflowError::ValidationError(format!(
                "step '{}' is not a human gate",
                step.id
            )));
        }
        StepOutcome::WaitingGate
    }
}

// ── Document Output ──────────────────────────────────────────────────

/// Synthesizes a document artifact from the accumulated context.
/// Persistence of the artifact is an external collaborator's concern.
pub struct DocumentOutputHandler;

#[async_trait]
impl StepHandler for DocumentOutputHandler {
    async fn execute(
        &self,
        step: &StepDef,
        context: &StepContext,
        run: &WorkflowRun,
    ) -> StepOutcome {
        let StepKind::DocumentOutput { document_title } = &step.kind else {
            return StepOutcome::Failed(WorkflowError::ValidationError(format!(
                "step '{}' is not a document output",
                step.id
            )));
        };

        let title = document_title
            .clone()
            .unwrap_or_else(|| step.title.clone());
        tracing::debug!(run_id = %run.id, step_id = %step.id, title = %title, "Synthesizing document");

        StepOutcome::Completed(json!({
            "document": {
                "title": title,
                "sections": context.to_json(),
            }
        }))
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Maps each step type to its handler. Dispatch is an exhaustive match
/// over the closed [`StepKind`] sum, so adding a step type will not
/// compile until it gets a handler.
pub struct HandlerRegistry {
    agent_task: Arc<dyn StepHandler>,
    human_gate: Arc<dyn StepHandler>,
    document_output: Arc<dyn StepHandler>,
}

impl HandlerRegistry {
    pub fn new(directory: Arc<dyn AgentDirectory>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            agent_task: Arc::new(AgentTaskHandler::new(directory, executor)),
            human_gate: Arc::new(HumanGateHandler),
            document_output: Arc::new(DocumentOutputHandler),
        }
    }

    /// Route a step to its handler
    pub async fn dispatch(
        &self,
        step: &StepDef,
        context: &StepContext,
        run: &WorkflowRun,
    ) -> StepOutcome {
        let handler = match &step.kind {
            StepKind::AgentTask { .. } => &self.agent_task,
            StepKind::HumanGate { .. } => &self.human_gate,
            StepKind::DocumentOutput { .. } => &self.document_output,
        };
        handler.execute(step, context, run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{AgentProfile, AgentStatus, StaticAgentDirectory};
    use workflow_types::{
        AccountId, AgentId, GateType, SkillId, StepId, TriggeredBy, WorkflowTemplate,
    };

    struct StubExecutor {
        result: Result<Value, String>,
    }

    #[async_trait]
    impl TaskExecutor for StubExecutor {
        async fn run(
            &self,
            agent_id: &AgentId,
            _skill_id: Option<&SkillId>,
            prompt: &str,
            _context: &StepContext,
        ) -> Result<Value, String> {
            self.result
                .clone()
                .map(|v| json!({ "agent": agent_id.to_string(), "prompt": prompt, "value": v }))
        }
    }

    fn make_run(steps: Vec<StepDef>) -> WorkflowRun {
        let mut template = WorkflowTemplate::new(AccountId::new("acct-1"), "T");
        for step in steps {
            template.add_step(step).unwrap();
        }
        WorkflowRun::new(&template, TriggeredBy::Scheduler)
    }

    fn registry_with(
        agents: Vec<AgentProfile>,
        result: Result<Value, String>,
    ) -> HandlerRegistry {
        HandlerRegistry::new(
            Arc::new(StaticAgentDirectory::new(agents)),
            Arc::new(StubExecutor { result }),
        )
    }

    #[tokio::test]
    async fn test_agent_task_auto_assigns_first_eligible() {
        let agents = vec![
            AgentProfile::new(AgentId::new("paused"), "Paused").with_status(AgentStatus::Paused),
            AgentProfile::new(AgentId::new("worker"), "Worker"),
        ];
        let registry = registry_with(agents, Ok(json!("done")));
        let step = StepDef::agent_task("work", "Do work");
        let run = make_run(vec![step.clone()]);

        let outcome = registry.dispatch(&step, &StepContext::empty(), &run).await;
        match outcome {
            StepOutcome::Completed(output) => {
                assert_eq!(output["agent"], "worker");
                // No prompt configured: falls back to the step title
                assert_eq!(output["prompt"], "Do work");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_agent_task_pinned_agent_must_be_eligible() {
        let agents = vec![
            AgentProfile::new(AgentId::new("pinned"), "Pinned").with_status(AgentStatus::Failing),
            AgentProfile::new(AgentId::new("other"), "Other"),
        ];
        let registry = registry_with(agents, Ok(json!("done")));
        let step = StepDef::agent_task("work", "Do work").with_agent(AgentId::new("pinned"));
        let run = make_run(vec![step.clone()]);

        let outcome = registry.dispatch(&step, &StepContext::empty(), &run).await;
        assert!(matches!(
            outcome,
            StepOutcome::Failed(WorkflowError::NoEligibleAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_agent_task_requires_skill() {
        let agents = vec![
            AgentProfile::new(AgentId::new("generalist"), "Generalist"),
            AgentProfile::new(AgentId::new("writer"), "Writer")
                .with_skill(SkillId::new("writing")),
        ];
        let registry = registry_with(agents, Ok(json!("done")));
        let step =
            StepDef::agent_task("draft", "Draft").with_skill(SkillId::new("writing"));
        let run = make_run(vec![step.clone()]);

        let outcome = registry.dispatch(&step, &StepContext::empty(), &run).await;
        match outcome {
            StepOutcome::Completed(output) => assert_eq!(output["agent"], "writer"),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_agent_task_no_agents_fails() {
        let registry = registry_with(vec![], Ok(json!("done")));
        let step = StepDef::agent_task("work", "Do work");
        let run = make_run(vec![step.clone()]);

        let outcome = registry.dispatch(&step, &StepContext::empty(), &run).await;
        assert!(matches!(
            outcome,
            StepOutcome::Failed(WorkflowError::NoEligibleAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_agent_task_maps_executor_error() {
        let agents = vec![AgentProfile::new(AgentId::new("worker"), "Worker")];
        let registry = registry_with(agents, Err("model timed out".into()));
        let step = StepDef::agent_task("work", "Do work");
        let run = make_run(vec![step.clone()]);

        let outcome = registry.dispatch(&step, &StepContext::empty(), &run).await;
        match outcome {
            StepOutcome::Failed(WorkflowError::StepExecutionFailed(msg)) => {
                assert_eq!(msg, "model timed out");
            }
            other => panic!("expected execution failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_human_gate_always_waits() {
        let registry = registry_with(vec![], Ok(json!("unused")));
        let step = StepDef::human_gate("approve", "Approve", GateType::Approve);
        let run = make_run(vec![step.clone()]);

        let outcome = registry.dispatch(&step, &StepContext::empty(), &run).await;
        assert!(matches!(outcome, StepOutcome::WaitingGate));
    }

    #[tokio::test]
    async fn test_document_output_uses_configured_title() {
        let registry = registry_with(vec![], Ok(json!("unused")));
        let step = StepDef::document_output("publish", "Publish")
            .with_document_title("Weekly Digest #12");
        let run = make_run(vec![step.clone()]);

        let mut context = StepContext::empty();
        context.push(StepId::new("research"), "Research".into(), json!("notes"));

        let outcome = registry.dispatch(&step, &context, &run).await;
        match outcome {
            StepOutcome::Completed(output) => {
                assert_eq!(output["document"]["title"], "Weekly Digest #12");
                assert_eq!(output["document"]["sections"][0]["output"], "notes");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_document_output_derives_title_from_step() {
        let registry = registry_with(vec![], Ok(json!("unused")));
        let step = StepDef::document_output("publish", "Publish digest");
        let run = make_run(vec![step.clone()]);

        let outcome = registry
            .dispatch(&step, &StepContext::empty(), &run)
            .await;
        match outcome {
            StepOutcome::Completed(output) => {
                assert_eq!(output["document"]["title"], "Publish digest");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }
}
