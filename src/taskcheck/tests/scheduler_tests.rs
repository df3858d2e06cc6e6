//! Tests for check run dispatch, isolation and admission.

use crate::admission::AdmissionController;
use crate::engine::Engine;
use crate::error::ErrorCode;
use crate::pipeline::{
    adapters::memory::{InMemoryActivityLog, InMemoryPipelineRepository},
    domain::{
        ActorId, DatabaseId, InstanceId, MigrationPayload, NewStage, NewTask, Task,
        TaskCheckResult, TaskCheckRun, TaskCheckRunStatus, TaskCheckType, TaskId, TaskPayload,
        TaskTarget, TaskType,
    },
    ports::{PipelineRepository, TaskCheckRunFind},
    services::{CreateIssueRequest, PipelineStatusService},
};
use crate::registry::RegistryBuilder;
use crate::taskcheck::ports::{CheckExecutorResult, MockTaskCheckExecutor, TaskCheckExecutor};
use crate::taskcheck::{TaskCheckExecutorRegistry, TaskCheckScheduler};
use async_trait::async_trait;
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

struct Panicking;

#[async_trait]
impl TaskCheckExecutor for Panicking {
    async fn run(&self, _run: &TaskCheckRun, _task: &Task) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        panic!("check exploded");
    }
}

struct Passing;

#[async_trait]
impl TaskCheckExecutor for Passing {
    async fn run(&self, _run: &TaskCheckRun, _task: &Task) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        Ok(vec![TaskCheckResult::success("OK", "")])
    }
}

/// Blocks until released and counts how many calls were made.
struct Gated {
    release: Semaphore,
    calls: AtomicUsize,
}

impl Gated {
    fn new() -> Self {
        Self {
            release: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskCheckExecutor for Gated {
    async fn run(&self, _run: &TaskCheckRun, _task: &Task) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release
            .acquire()
            .await
            .expect("semaphore stays open")
            .forget();
        Ok(vec![TaskCheckResult::success("OK", "")])
    }
}

fn registry(
    connect: Arc<dyn TaskCheckExecutor>,
    schema: Arc<dyn TaskCheckExecutor>,
) -> TaskCheckExecutorRegistry {
    RegistryBuilder::<TaskCheckType, dyn TaskCheckExecutor>::new("test checks")
        .register(TaskCheckType::DatabaseConnect, connect)
        .register(TaskCheckType::MigrationSchema, schema)
        .build()
        .expect("registry should build")
}

struct Harness {
    repository: Arc<InMemoryPipelineRepository>,
    service: PipelineStatusService<InMemoryPipelineRepository, InMemoryActivityLog, DefaultClock>,
    instance: InstanceId,
}

impl Harness {
    fn new() -> Self {
        let repository = Arc::new(InMemoryPipelineRepository::new());
        let service = PipelineStatusService::new(
            Arc::clone(&repository),
            Arc::new(InMemoryActivityLog::new()),
            Arc::new(DefaultClock),
        );
        Self {
            repository,
            service,
            instance: InstanceId::new(),
        }
    }

    fn scheduler(
        &self,
        executors: TaskCheckExecutorRegistry,
        max_per_instance: usize,
    ) -> TaskCheckScheduler<InMemoryPipelineRepository, DefaultClock> {
        TaskCheckScheduler::new(
            Arc::clone(&self.repository),
            executors,
            AdmissionController::new(max_per_instance),
            Arc::new(DefaultClock),
        )
    }

    /// Creates an issue with one SQLite schema update; its connect and
    /// schema checks start `RUNNING`.
    async fn seed_task(&self) -> TaskId {
        let task = NewTask {
            name: "add order notes".to_owned(),
            task_type: TaskType::SchemaUpdate,
            target: TaskTarget::new(self.instance, DatabaseId::new(), Engine::Sqlite, "shop"),
            payload: TaskPayload::Migration(MigrationPayload::new(
                "ALTER TABLE orders ADD COLUMN note TEXT",
                "0002",
            )),
            earliest_allowed_at: None,
        };
        let issue = self
            .service
            .create_issue(
                CreateIssueRequest::new("add order notes", ActorId::new())
                    .with_stage(NewStage::new("prod").with_task(task)),
            )
            .await
            .expect("issue should be created");
        self.repository
            .find_pipeline(issue.pipeline_id())
            .await
            .expect("lookup should succeed")
            .expect("pipeline should exist")
            .tasks()
            .next()
            .expect("pipeline has a task")
            .id()
    }

    async fn run_of(&self, task_id: TaskId, check_type: TaskCheckType) -> TaskCheckRun {
        let find = TaskCheckRunFind {
            check_type: Some(check_type),
            ..TaskCheckRunFind::for_task(task_id)
        };
        self.repository
            .list_task_check_runs(&find)
            .await
            .expect("runs should list")
            .pop()
            .expect("run should exist")
    }
}

async fn join_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        worker.await.expect("worker should not escape a panic");
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn panicking_executor_fails_only_its_run() {
    let harness = Harness::new();
    let first = harness.seed_task().await;
    let scheduler = harness.scheduler(registry(Arc::new(Panicking), Arc::new(Passing)), 10);

    join_all(scheduler.tick().await.expect("tick should succeed")).await;

    let connect = harness.run_of(first, TaskCheckType::DatabaseConnect).await;
    assert_eq!(connect.status(), TaskCheckRunStatus::Failed);
    assert_eq!(connect.code(), ErrorCode::Internal);
    let finding = connect.results().first().expect("failure result");
    assert!(finding.content.contains("executor panicked: check exploded"));

    let schema = harness.run_of(first, TaskCheckType::MigrationSchema).await;
    assert_eq!(schema.status(), TaskCheckRunStatus::Done);

    let second = harness.seed_task().await;
    join_all(scheduler.tick().await.expect("tick should succeed")).await;
    assert_eq!(
        harness.run_of(second, TaskCheckType::MigrationSchema).await.status(),
        TaskCheckRunStatus::Done
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn run_is_executed_at_most_once_at_a_time() {
    let harness = Harness::new();
    let task_id = harness.seed_task().await;
    let gated = Arc::new(Gated::new());
    let scheduler = harness.scheduler(registry(Arc::clone(&gated) as _, Arc::clone(&gated) as _), 10);

    let first_wave = scheduler.tick().await.expect("tick should succeed");
    assert_eq!(first_wave.len(), 2);
    let connect = harness.run_of(task_id, TaskCheckType::DatabaseConnect).await;
    assert!(scheduler.is_executing(connect.id()));

    let second_wave = scheduler.tick().await.expect("tick should succeed");
    assert!(second_wave.is_empty());

    gated.release.add_permits(2);
    join_all(first_wave).await;
    assert_eq!(gated.calls.load(Ordering::SeqCst), 2);
    assert!(!scheduler.is_executing(connect.id()));
    assert!(scheduler.tick().await.expect("tick should succeed").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn instance_capacity_defers_extra_runs() {
    let harness = Harness::new();
    let task_id = harness.seed_task().await;
    let gated = Arc::new(Gated::new());
    let scheduler = harness.scheduler(registry(Arc::clone(&gated) as _, Arc::clone(&gated) as _), 1);

    let first_wave = scheduler.tick().await.expect("tick should succeed");
    assert_eq!(first_wave.len(), 1);
    assert!(scheduler.tick().await.expect("tick should succeed").is_empty());

    gated.release.add_permits(1);
    join_all(first_wave).await;

    let second_wave = scheduler.tick().await.expect("tick should succeed");
    assert_eq!(second_wave.len(), 1);
    gated.release.add_permits(1);
    join_all(second_wave).await;

    for check_type in [TaskCheckType::DatabaseConnect, TaskCheckType::MigrationSchema] {
        assert_eq!(
            harness.run_of(task_id, check_type).await.status(),
            TaskCheckRunStatus::Done
        );
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unregistered_check_type_fails_as_not_implemented() {
    let harness = Harness::new();
    let task_id = harness.seed_task().await;
    let executors = RegistryBuilder::<TaskCheckType, dyn TaskCheckExecutor>::new("partial")
        .register(TaskCheckType::MigrationSchema, Arc::new(Passing))
        .build()
        .expect("registry should build");
    let scheduler = harness.scheduler(executors, 10);

    join_all(scheduler.tick().await.expect("tick should succeed")).await;

    let connect = harness.run_of(task_id, TaskCheckType::DatabaseConnect).await;
    assert_eq!(connect.status(), TaskCheckRunStatus::Failed);
    assert_eq!(connect.code(), ErrorCode::NotImplemented);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreadable_task_defers_only_its_runs() {
    let harness = Harness::new();
    let broken = harness.seed_task().await;
    let healthy = harness.seed_task().await;
    let pipeline_id = harness
        .repository
        .find_task(broken)
        .await
        .expect("lookup should succeed")
        .expect("task should exist")
        .pipeline_id();
    harness
        .repository
        .set_unavailable(pipeline_id)
        .expect("state should be writable");
    let mut connect = MockTaskCheckExecutor::new();
    connect
        .expect_run()
        .withf(move |_, task| task.id() == healthy)
        .times(1)
        .returning(|_, _| Ok(vec![TaskCheckResult::success("OK", "")]));
    let scheduler = harness.scheduler(registry(Arc::new(connect), Arc::new(Passing)), 10);

    let workers = scheduler.tick().await.expect("tick should succeed");

    assert_eq!(workers.len(), 2);
    join_all(workers).await;
    for check_type in [TaskCheckType::DatabaseConnect, TaskCheckType::MigrationSchema] {
        assert_eq!(
            harness.run_of(broken, check_type).await.status(),
            TaskCheckRunStatus::Running
        );
        assert_eq!(
            harness.run_of(healthy, check_type).await.status(),
            TaskCheckRunStatus::Done
        );
    }
}
