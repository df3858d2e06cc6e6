//! In-memory pipeline repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::pipeline::{
    domain::{
        Issue, IssueId, Pipeline, PipelineId, PipelineStatus, Task, TaskCheckRun, TaskCheckRunId,
        TaskCheckRunStatus, TaskId, TaskStatus,
    },
    ports::{
        PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult, TaskCheckRunFind,
    },
};

/// Thread-safe in-memory pipeline repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineRepository {
    state: Arc<RwLock<InMemoryPipelineState>>,
}

#[derive(Debug, Default)]
struct InMemoryPipelineState {
    pipelines: HashMap<PipelineId, Pipeline>,
    issues: HashMap<IssueId, Issue>,
    pipeline_issue: HashMap<PipelineId, IssueId>,
    task_index: HashMap<TaskId, TaskLocation>,
    check_runs: Vec<TaskCheckRun>,
    next_task_ordinal: u64,
    unavailable: HashSet<PipelineId>,
}

#[derive(Debug, Clone, Copy)]
struct TaskLocation {
    pipeline_id: PipelineId,
    ordinal: u64,
}

impl InMemoryPipelineState {
    fn task_mut(&mut self, task_id: TaskId) -> Option<&mut Task> {
        let location = self.task_index.get(&task_id)?;
        self.pipelines
            .get_mut(&location.pipeline_id)?
            .stages_mut()
            .iter_mut()
            .flat_map(|stage| stage.tasks_mut().iter_mut())
            .find(|task| task.id() == task_id)
    }

    fn ensure_available(&self, pipeline_id: PipelineId) -> PipelineRepositoryResult<()> {
        if self.unavailable.contains(&pipeline_id) {
            return Err(PipelineRepositoryError::persistence(std::io::Error::other(
                format!("pipeline {pipeline_id} is unavailable"),
            )));
        }
        Ok(())
    }
}

impl InMemoryPipelineRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes issue and task lookups for `pipeline_id` fail with a
    /// persistence error. Listings are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::Persistence`] when the state lock
    /// is poisoned.
    pub fn set_unavailable(&self, pipeline_id: PipelineId) -> PipelineRepositoryResult<()> {
        self.write()?.unavailable.insert(pipeline_id);
        Ok(())
    }

    fn read(&self) -> PipelineRepositoryResult<RwLockReadGuard<'_, InMemoryPipelineState>> {
        self.state.read().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> PipelineRepositoryResult<RwLockWriteGuard<'_, InMemoryPipelineState>> {
        self.state.write().map_err(|err| {
            PipelineRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn create_issue(
        &self,
        issue: &Issue,
        pipeline: &Pipeline,
    ) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        if state.pipelines.contains_key(&pipeline.id()) {
            return Err(PipelineRepositoryError::DuplicatePipeline(pipeline.id()));
        }

        for task in pipeline.tasks() {
            state.next_task_ordinal += 1;
            let location = TaskLocation {
                pipeline_id: pipeline.id(),
                ordinal: state.next_task_ordinal,
            };
            state.task_index.insert(task.id(), location);
        }
        state.pipeline_issue.insert(pipeline.id(), issue.id());
        state.issues.insert(issue.id(), issue.clone());
        state.pipelines.insert(pipeline.id(), pipeline.clone());
        Ok(())
    }

    async fn find_issue(&self, id: IssueId) -> PipelineRepositoryResult<Option<Issue>> {
        Ok(self.read()?.issues.get(&id).cloned())
    }

    async fn find_issue_by_pipeline(
        &self,
        pipeline_id: PipelineId,
    ) -> PipelineRepositoryResult<Option<Issue>> {
        let state = self.read()?;
        state.ensure_available(pipeline_id)?;
        Ok(state
            .pipeline_issue
            .get(&pipeline_id)
            .and_then(|issue_id| state.issues.get(issue_id))
            .cloned())
    }

    async fn update_issue(&self, issue: &Issue) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        let stored = state
            .issues
            .get_mut(&issue.id())
            .ok_or(PipelineRepositoryError::IssueNotFound(issue.id()))?;
        *stored = issue.clone();
        Ok(())
    }

    async fn find_pipeline(&self, id: PipelineId) -> PipelineRepositoryResult<Option<Pipeline>> {
        Ok(self.read()?.pipelines.get(&id).cloned())
    }

    async fn list_pipelines(
        &self,
        status: PipelineStatus,
    ) -> PipelineRepositoryResult<Vec<Pipeline>> {
        let state = self.read()?;
        let mut pipelines: Vec<Pipeline> = state
            .pipelines
            .values()
            .filter(|pipeline| pipeline.status() == status)
            .cloned()
            .collect();
        pipelines.sort_by_key(Pipeline::created_at);
        Ok(pipelines)
    }

    async fn update_pipeline_status(
        &self,
        id: PipelineId,
        status: PipelineStatus,
        updated_at: DateTime<Utc>,
    ) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        let stored = state
            .pipelines
            .get_mut(&id)
            .ok_or(PipelineRepositoryError::PipelineNotFound(id))?;
        stored.set_status(status, updated_at);
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> PipelineRepositoryResult<Option<Task>> {
        let state = self.read()?;
        if let Some(location) = state.task_index.get(&id) {
            state.ensure_available(location.pipeline_id)?;
        }
        Ok(state
            .task_index
            .get(&id)
            .and_then(|location| state.pipelines.get(&location.pipeline_id))
            .and_then(|pipeline| pipeline.task(id))
            .cloned())
    }

    async fn list_tasks(&self, status: TaskStatus) -> PipelineRepositoryResult<Vec<Task>> {
        let state = self.read()?;
        let mut tasks: Vec<(u64, Task)> = state
            .pipelines
            .values()
            .flat_map(Pipeline::tasks)
            .filter(|task| task.status() == status)
            .map(|task| {
                let ordinal = state
                    .task_index
                    .get(&task.id())
                    .map_or(u64::MAX, |location| location.ordinal);
                (ordinal, task.clone())
            })
            .collect();
        tasks.sort_by_key(|(ordinal, _)| *ordinal);
        Ok(tasks.into_iter().map(|(_, task)| task).collect())
    }

    async fn compare_and_swap_task(
        &self,
        task: &Task,
        expected: TaskStatus,
    ) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        let stored = state
            .task_mut(task.id())
            .ok_or(PipelineRepositoryError::TaskNotFound(task.id()))?;
        if stored.status() != expected {
            return Err(PipelineRepositoryError::StatusConflict {
                task_id: task.id(),
                expected,
                actual: stored.status(),
            });
        }
        *stored = task.clone();
        Ok(())
    }

    async fn create_task_check_runs(&self, runs: &[TaskCheckRun]) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        state.check_runs.extend_from_slice(runs);
        Ok(())
    }

    async fn find_task_check_run(
        &self,
        id: TaskCheckRunId,
    ) -> PipelineRepositoryResult<Option<TaskCheckRun>> {
        Ok(self
            .read()?
            .check_runs
            .iter()
            .find(|run| run.id() == id)
            .cloned())
    }

    async fn list_task_check_runs(
        &self,
        find: &TaskCheckRunFind,
    ) -> PipelineRepositoryResult<Vec<TaskCheckRun>> {
        Ok(self
            .read()?
            .check_runs
            .iter()
            .filter(|run| find.matches(run))
            .cloned()
            .collect())
    }

    async fn finish_task_check_run(&self, run: &TaskCheckRun) -> PipelineRepositoryResult<()> {
        let mut state = self.write()?;
        let stored = state
            .check_runs
            .iter_mut()
            .find(|stored| stored.id() == run.id())
            .ok_or(PipelineRepositoryError::TaskCheckRunNotFound(run.id()))?;
        if stored.status() != TaskCheckRunStatus::Running {
            return Err(PipelineRepositoryError::CheckRunSettled(run.id()));
        }
        *stored = run.clone();
        Ok(())
    }
}
