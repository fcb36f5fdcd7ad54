//! Workflow Run Engine for Flowdeck
//!
//! The engine turns a static workflow template into a running,
//! resumable, multi-step process instance. It coordinates
//! autonomous-agent steps, human-approval gates, and
//! document-producing steps, carries output forward between steps, and
//! supports pause/resume/cancel.
//!
//! # Key Principle
//!
//! **The engine coordinates, it never does the work itself.** Agent
//! execution happens behind the [`TaskExecutor`] collaborator;
//! persistence behind the [`Store`] traits; notification delivery
//! behind the [`NotificationSink`]. Each engine call is a short-lived
//! unit of work against durable run state: a suspended run is a row,
//! not a blocked task, so a process restart resumes any paused run
//! from persisted state alone.
//!
//! # Architecture
//!
//! The [`WorkflowEngine`] facade composes specialized components:
//!
//! - [`HandlerRegistry`]: One step handler per step type, dispatched
//!   exhaustively over the closed [`workflow_types::StepKind`] sum
//! - [`RunStateMachine`]: Owns every status and step-index
//!   transition of a run
//! - [`GateResolver`]: Validates human gate responses and feeds them
//!   back into the state machine
//! - [`Scheduler`]: Periodically starts due runs from templates with
//!   an armed schedule
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! use workflow_engine::{MemoryStore, NoopNotifier, StaticAgentDirectory, WorkflowEngine};
//! use workflow_engine::{AgentProfile, TaskExecutor, TemplateStore};
//! use workflow_types::*;
//!
//! struct EchoExecutor;
//!
//! #[async_trait::async_trait]
//! impl TaskExecutor for EchoExecutor {
//!     async fn run(
//!         &self,
//!         _agent_id: &AgentId,
//!         _skill_id: Option<&SkillId>,
//!         prompt: &str,
//!         _context: &StepContext,
//!     ) -> Result<serde_json::Value, String> {
//!         Ok(serde_json::json!({ "echo": prompt }))
//!     }
//! }
//!
//! # async fn demo() -> WorkflowResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let directory = Arc::new(StaticAgentDirectory::new(vec![AgentProfile::new(
//!     AgentId::new("agent-1"),
//!     "Researcher",
//! )]));
//! let engine = WorkflowEngine::new(
//!     store.clone(),
//!     Arc::new(EchoExecutor),
//!     directory,
//!     Arc::new(NoopNotifier),
//! );
//!
//! let mut template = WorkflowTemplate::new(AccountId::new("acct-1"), "Digest");
//! template.add_step(StepDef::agent_task("research", "Research"))?;
//! store.upsert_template(template.clone()).await?;
//!
//! let run_id = engine
//!     .start_run(&template.id, TriggeredBy::user("u-1"))
//!     .await?;
//! let run = engine.get_run(&run_id).await?;
//! assert_eq!(run.status, RunStatus::Completed);
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

pub mod engine;
pub mod executor;
pub mod gate_resolver;
pub mod handlers;
pub mod scheduler;
pub mod state_machine;
pub mod store;

// Re-export main types
pub use engine::WorkflowEngine;
pub use executor::{
    AgentDirectory, AgentProfile, AgentStatus, NoopNotifier, NotificationSink,
    StaticAgentDirectory, TaskExecutor,
};
pub use gate_resolver::GateResolver;
pub use handlers::{HandlerRegistry, StepHandler, StepOutcome};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use state_machine::RunStateMachine;
pub use store::{MemoryStore, RunStore, Store, TemplateStore};
