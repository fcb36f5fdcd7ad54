//! External collaborators: agent execution, the agent directory, and
//! notification delivery
//!
//! The engine never invokes a model or delivers a notification itself.
//! It resolves which agent should act, then delegates through these
//! traits. From the engine's point of view [`TaskExecutor::run`] is a
//! blocking call that either returns output or an error; wall-clock
//! supervision of a stuck executor is the collaborator's concern.

use async_trait::async_trait;
use serde_json::Value;
use workflow_types::{
    AccountId, AgentId, SkillId, StepContext, StepDef, WorkflowResult, WorkflowRun,
};

/// Executes one agent step on behalf of the engine
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run an agent against a prompt and the accumulated upstream
    /// context. `Ok` carries the step's structured output; `Err`
    /// carries the executor's error message.
    async fn run(
        &self,
        agent_id: &AgentId,
        skill_id: Option<&SkillId>,
        prompt: &str,
        context: &StepContext,
    ) -> Result<Value, String>;
}

/// Read-side view of the account's agents, for step assignment
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// List the agents visible to an account
    async fn list_agents(&self, account_id: &AccountId) -> WorkflowResult<Vec<AgentProfile>>;
}

/// One agent as the engine sees it
#[derive(Clone, Debug)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub skills: Vec<SkillId>,
}

impl AgentProfile {
    pub fn new(id: AgentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: AgentStatus::Active,
            skills: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_skill(mut self, skill: SkillId) -> Self {
        self.skills.push(skill);
        self
    }

    /// Check whether this agent can take a step requiring `skill`
    pub fn is_eligible(&self, skill: Option<&SkillId>) -> bool {
        if self.status != AgentStatus::Active {
            return false;
        }
        match skill {
            Some(required) => self.skills.iter().any(|s| s == required),
            None => true,
        }
    }
}

/// Operational state of an agent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentStatus {
    Active,
    Paused,
    Failing,
}

/// A fixed agent roster for development and testing
#[derive(Clone, Debug, Default)]
pub struct StaticAgentDirectory {
    agents: Vec<AgentProfile>,
}

impl StaticAgentDirectory {
    pub fn new(agents: Vec<AgentProfile>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn list_agents(&self, _account_id: &AccountId) -> WorkflowResult<Vec<AgentProfile>> {
        Ok(self.agents.clone())
    }
}

/// Receives engine notifications. Best-effort: a sink failure is
/// logged by the caller and must never block the state transition
/// that triggered it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// A gate step opened and awaits a human response
    async fn on_gate_opened(&self, run: &WorkflowRun, step: &StepDef) -> WorkflowResult<()>;
}

/// Sink that drops every notification
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn on_gate_opened(&self, _run: &WorkflowRun, _step: &StepDef) -> WorkflowResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_requires_active_status() {
        let paused = AgentProfile::new(AgentId::new("a-1"), "Paused")
            .with_status(AgentStatus::Paused);
        assert!(!paused.is_eligible(None));

        let failing = AgentProfile::new(AgentId::new("a-2"), "Failing")
            .with_status(AgentStatus::Failing);
        assert!(!failing.is_eligible(None));

        let active = AgentProfile::new(AgentId::new("a-3"), "Active");
        assert!(active.is_eligible(None));
    }

    #[test]
    fn test_eligibility_checks_skill() {
        let agent = AgentProfile::new(AgentId::new("a-1"), "Writer")
            .with_skill(SkillId::new("writing"));

        assert!(agent.is_eligible(Some(&SkillId::new("writing"))));
        assert!(!agent.is_eligible(Some(&SkillId::new("research"))));
        assert!(agent.is_eligible(None));
    }

    #[tokio::test]
    async fn test_static_directory_lists_roster() {
        let directory = StaticAgentDirectory::new(vec![
            AgentProfile::new(AgentId::new("a-1"), "One"),
            AgentProfile::new(AgentId::new("a-2"), "Two"),
        ]);
        let agents = directory
            .list_agents(&AccountId::new("acct-1"))
            .await
            .unwrap();
        assert_eq!(agents.len(), 2);
    }
}
