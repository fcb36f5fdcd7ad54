//! Storage traits and the in-memory implementation
//!
//! The engine treats persistence as an external collaborator behind
//! these traits. Run writes are optimistic: a state-changing save must
//! supply the version it last read and fails with
//! `ConcurrentModification` if the stored version no longer matches.
//! That check is what makes a duplicate gate submission racing a
//! cancel safe: at most one of them lands.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use workflow_types::{
    AccountId, RunId, ScheduleType, TemplateId, WorkflowError, WorkflowResult, WorkflowRun,
    WorkflowTemplate,
};

/// Storage for workflow templates
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Get a template by ID (soft-deleted templates are still returned;
    /// callers decide whether they count)
    async fn get_template(&self, id: &TemplateId) -> WorkflowResult<Option<WorkflowTemplate>>;

    /// List live templates for an account
    async fn list_templates(&self, account_id: &AccountId) -> WorkflowResult<Vec<WorkflowTemplate>>;

    /// Create or update a template
    async fn upsert_template(&self, template: WorkflowTemplate) -> WorkflowResult<()>;

    /// Soft-delete a template; returns false if it did not exist
    async fn soft_delete_template(&self, id: &TemplateId) -> WorkflowResult<bool>;

    /// List every live template with an armed, non-`none` schedule,
    /// the scheduler's work list
    async fn list_schedulable_templates(&self) -> WorkflowResult<Vec<WorkflowTemplate>>;
}

/// Storage for workflow runs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Get a run by ID
    async fn get_run(&self, id: &RunId) -> WorkflowResult<Option<WorkflowRun>>;

    /// Insert a new run; returns its initial version
    async fn insert_run(&self, run: &WorkflowRun) -> WorkflowResult<u64>;

    /// Save a run, enforcing the optimistic version check. Returns the
    /// new version on success; `ConcurrentModification` if the stored
    /// version differs from `expected_version`.
    async fn save_run(&self, run: &WorkflowRun, expected_version: u64) -> WorkflowResult<u64>;

    /// List runs that are running or paused for an account
    async fn list_active_runs(&self, account_id: &AccountId) -> WorkflowResult<Vec<WorkflowRun>>;

    /// List all runs of a template, newest first
    async fn list_runs_for_template(
        &self,
        template_id: &TemplateId,
    ) -> WorkflowResult<Vec<WorkflowRun>>;

    /// Check whether a template has a run in flight (running or
    /// paused), the at-most-one-active-run policy's question
    async fn has_active_run(&self, template_id: &TemplateId) -> WorkflowResult<bool>;
}

/// Combined storage trait, what the engine is constructed with
pub trait Store: TemplateStore + RunStore {}

/// In-memory storage for development and testing
#[derive(Debug, Default)]
pub struct MemoryStore {
    templates: RwLock<HashMap<TemplateId, WorkflowTemplate>>,
    runs: RwLock<HashMap<RunId, WorkflowRun>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn get_template(&self, id: &TemplateId) -> WorkflowResult<Option<WorkflowTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates.get(id).cloned())
    }

    async fn list_templates(
        &self,
        account_id: &AccountId,
    ) -> WorkflowResult<Vec<WorkflowTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates
            .values()
            .filter(|t| &t.account_id == account_id && !t.is_deleted())
            .cloned()
            .collect())
    }

    async fn upsert_template(&self, template: WorkflowTemplate) -> WorkflowResult<()> {
        let mut templates = self.templates.write().await;
        templates.insert(template.id.clone(), template);
        Ok(())
    }

    async fn soft_delete_template(&self, id: &TemplateId) -> WorkflowResult<bool> {
        let mut templates = self.templates.write().await;
        match templates.get_mut(id) {
            Some(template) => {
                template.soft_delete();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_schedulable_templates(&self) -> WorkflowResult<Vec<WorkflowTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates
            .values()
            .filter(|t| {
                !t.is_deleted()
                    && t.is_schedule_active
                    && t.schedule
                        .as_ref()
                        .is_some_and(|s| s.schedule_type != ScheduleType::None)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn get_run(&self, id: &RunId) -> WorkflowResult<Option<WorkflowRun>> {
        let runs = self.runs.read().await;
        Ok(runs.get(id).cloned())
    }

    async fn insert_run(&self, run: &WorkflowRun) -> WorkflowResult<u64> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(WorkflowError::RunAlreadyExists(run.id.clone()));
        }
        let mut stored = run.clone();
        stored.version = 1;
        runs.insert(stored.id.clone(), stored);
        Ok(1)
    }

    async fn save_run(&self, run: &WorkflowRun, expected_version: u64) -> WorkflowResult<u64> {
        let mut runs = self.runs.write().await;
        let current = runs
            .get(&run.id)
            .ok_or_else(|| WorkflowError::RunNotFound(run.id.clone()))?;
        if current.version != expected_version {
            return Err(WorkflowError::ConcurrentModification {
                run_id: run.id.clone(),
                expected: expected_version,
                found: current.version,
            });
        }
        let mut stored = run.clone();
        stored.version = expected_version + 1;
        let version = stored.version;
        runs.insert(stored.id.clone(), stored);
        Ok(version)
    }

    async fn list_active_runs(&self, account_id: &AccountId) -> WorkflowResult<Vec<WorkflowRun>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|r| &r.account_id == account_id && r.is_active())
            .cloned()
            .collect())
    }

    async fn list_runs_for_template(
        &self,
        template_id: &TemplateId,
    ) -> WorkflowResult<Vec<WorkflowRun>> {
        let runs = self.runs.read().await;
        let mut matching: Vec<WorkflowRun> = runs
            .values()
            .filter(|r| &r.template_id == template_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matching)
    }

    async fn has_active_run(&self, template_id: &TemplateId) -> WorkflowResult<bool> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .any(|r| &r.template_id == template_id && r.is_active()))
    }
}

impl Store for MemoryStore {}
