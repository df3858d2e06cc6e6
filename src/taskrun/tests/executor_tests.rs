//! Tests for the built-in task executors.

use crate::engine::Engine;
use crate::error::ErrorCode;
use crate::ledger::adapters::memory::InMemoryDriverProvider;
use crate::ledger::domain::{MigrationHistory, MigrationHistoryFind, MigrationType, Namespace};
use crate::ledger::ports::{
    ConnectionTarget, Driver, DriverError, DriverProvider, DriverResult, MockDriver,
};
use crate::pipeline::domain::{
    ActorId, DatabaseCreatePayload, DatabaseId, InstanceId, IssueId, MigrationPayload, NewTask,
    PipelineId, StageId, Task, TaskPayload, TaskTarget, TaskType,
};
use crate::taskcheck::ports::{CollaboratorError, GhostRunner, MockGhostRunner};
use crate::taskrun::builtin_task_registry;
use crate::taskrun::executors::{
    DatabaseCreateExecutor, GhostMigrationExecutor, MigrationExecutor,
};
use crate::taskrun::ports::{TaskExecutor, TaskExecutorError, TaskRunContext};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;

struct Setup {
    drivers: InMemoryDriverProvider<DefaultClock>,
    instance: InstanceId,
    context: TaskRunContext,
}

#[fixture]
fn setup() -> Setup {
    Setup {
        drivers: InMemoryDriverProvider::new(Arc::new(DefaultClock)),
        instance: InstanceId::new(),
        context: TaskRunContext {
            issue_id: Some(IssueId::new()),
            creator: ActorId::new(),
        },
    }
}

impl Setup {
    fn task(&self, task_type: TaskType, statement: &str, version: &str) -> Task {
        let new_task = NewTask {
            name: "shop change".to_owned(),
            task_type,
            target: TaskTarget::new(self.instance, DatabaseId::new(), Engine::Postgres, "shop"),
            payload: TaskPayload::Migration(MigrationPayload::new(statement, version)),
            earliest_allowed_at: None,
        };
        Task::new(PipelineId::new(), StageId::new(), new_task, &DefaultClock)
            .expect("task should be valid")
    }

    fn provider(&self) -> Arc<dyn DriverProvider> {
        Arc::new(self.drivers.clone())
    }

    fn migrations(&self) -> MigrationExecutor<DefaultClock> {
        MigrationExecutor::new(self.provider(), Arc::new(DefaultClock))
    }

    async fn history(&self) -> Vec<MigrationHistory> {
        let target = ConnectionTarget::database(self.instance.to_string(), Engine::Postgres, "shop");
        self.drivers
            .driver(&target)
            .expect("driver should open")
            .find_migration_history_list(&MigrationHistoryFind::for_namespace(
                Namespace::new("shop").expect("namespace is valid"),
            ))
            .await
            .expect("history should list")
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn baseline_then_update_records_two_rows(setup: Setup) {
    let executor = setup.migrations();
    let baseline = setup.task(TaskType::SchemaBaseline, "", "0001");
    let update = setup.task(
        TaskType::SchemaUpdate,
        "ALTER TABLE orders ADD COLUMN note TEXT",
        "0002",
    );

    let established = executor
        .run(&baseline, &setup.context)
        .await
        .expect("baseline should apply");
    let applied = executor
        .run(&update, &setup.context)
        .await
        .expect("update should apply");

    assert_eq!(
        established.detail,
        "Established baseline version 0001 for database \"shop\"."
    );
    assert_eq!(applied.detail, "Applied migration version 0002 to database \"shop\".");
    let sequences: Vec<u64> = setup.history().await.iter().map(|row| row.sequence).collect();
    assert_eq!(sequences, vec![2, 1]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ledger_rejections_keep_their_code(setup: Setup) {
    let executor = setup.migrations();
    let update = setup.task(TaskType::SchemaUpdate, "ALTER TABLE orders ADD note TEXT", "0002");

    let err = executor
        .run(&update, &setup.context)
        .await
        .expect_err("an update needs a baseline");

    assert_eq!(err.code(), ErrorCode::NoBaseline);
    assert_eq!(err.to_string(), "shop has not created migration baseline yet");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn data_update_without_statement_is_invalid(setup: Setup) {
    let task = setup.task(TaskType::DataUpdate, "   ", "0003");

    let err = setup
        .migrations()
        .run(&task, &setup.context)
        .await
        .expect_err("a blank statement is rejected");

    assert!(matches!(err, TaskExecutorError::EmptyStatement(TaskType::DataUpdate)));
    assert_eq!(err.code(), ErrorCode::Invalid);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_version_is_generated_from_the_clock(setup: Setup) {
    let baseline = setup.task(TaskType::SchemaBaseline, "", "");

    let result = setup
        .migrations()
        .run(&baseline, &setup.context)
        .await
        .expect("baseline should apply");

    let version = result.version.expect("a version is recorded");
    assert_eq!(version.len(), 14);
    assert!(NaiveDateTime::parse_from_str(&version, "%Y%m%d%H%M%S").is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn database_create_runs_statement_and_records_baseline(setup: Setup) {
    let new_task = NewTask {
        name: "create shop".to_owned(),
        task_type: TaskType::DatabaseCreate,
        target: TaskTarget::new_database(setup.instance, Engine::Postgres, "shop"),
        payload: TaskPayload::DatabaseCreate(DatabaseCreatePayload {
            statement: "CREATE DATABASE shop".to_owned(),
            schema_version: Some("0001".to_owned()),
        }),
        earliest_allowed_at: None,
    };
    let task = Task::new(PipelineId::new(), StageId::new(), new_task, &DefaultClock)
        .expect("task should be valid");

    let result = DatabaseCreateExecutor::new(setup.provider(), Arc::new(DefaultClock))
        .run(&task, &setup.context)
        .await
        .expect("database should be created");

    assert_eq!(result.detail, "Created database \"shop\"");
    let instance_statements = setup
        .drivers
        .driver(&ConnectionTarget::instance(setup.instance.to_string(), Engine::Postgres))
        .expect("driver should open")
        .executed_statements()
        .expect("statements should list");
    assert_eq!(instance_statements, vec!["CREATE DATABASE shop".to_owned()]);
    let history = setup.history().await;
    let [baseline] = history.as_slice() else {
        panic!("expected one history row, got {history:?}");
    };
    assert_eq!(baseline.migration_type, MigrationType::Baseline);
    assert_eq!(baseline.issue_id, setup.context.issue_id.map(|id| id.to_string()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ghost_migration_never_starts_for_an_applied_version(setup: Setup) {
    let executor = setup.migrations();
    executor
        .run(&setup.task(TaskType::SchemaBaseline, "", "0001"), &setup.context)
        .await
        .expect("baseline should apply");
    executor
        .run(
            &setup.task(TaskType::SchemaUpdate, "ALTER TABLE t ADD c INT", "0002"),
            &setup.context,
        )
        .await
        .expect("update should apply");

    let mut ghost = MockGhostRunner::new();
    ghost.expect_migrate().never();
    let ghost_task = setup.task(TaskType::SchemaUpdateGhost, "ALTER TABLE t ADD d INT", "0002");

    let err = GhostMigrationExecutor::new(setup.provider(), Arc::new(ghost), Arc::new(DefaultClock))
        .run(&ghost_task, &setup.context)
        .await
        .expect_err("the version is taken");

    assert_eq!(err.code(), ErrorCode::AlreadyApplied);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ghost_migration_records_history_after_gh_ost(setup: Setup) {
    setup
        .migrations()
        .run(&setup.task(TaskType::SchemaBaseline, "", "0001"), &setup.context)
        .await
        .expect("baseline should apply");
    let mut ghost = MockGhostRunner::new();
    ghost.expect_migrate().times(1).returning(|_, _| Ok(()));
    let ghost_task = setup.task(TaskType::SchemaUpdateGhost, "ALTER TABLE t ADD d INT", "0002");

    let result = GhostMigrationExecutor::new(setup.provider(), Arc::new(ghost), Arc::new(DefaultClock))
        .run(&ghost_task, &setup.context)
        .await
        .expect("gh-ost migration should succeed");

    assert_eq!(result.version.as_deref(), Some("0002"));
    assert_eq!(setup.history().await.len(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ghost_failure_records_nothing(setup: Setup) {
    setup
        .migrations()
        .run(&setup.task(TaskType::SchemaBaseline, "", "0001"), &setup.context)
        .await
        .expect("baseline should apply");
    let mut ghost = MockGhostRunner::new();
    ghost
        .expect_migrate()
        .returning(|_, _| Err(CollaboratorError::message("gh-ost", "cut-over timed out")));
    let ghost_task = setup.task(TaskType::SchemaUpdateGhost, "ALTER TABLE t ADD d INT", "0002");

    let err = GhostMigrationExecutor::new(setup.provider(), Arc::new(ghost), Arc::new(DefaultClock))
        .run(&ghost_task, &setup.context)
        .await
        .expect_err("gh-ost failure fails the task");

    assert_eq!(err.code(), ErrorCode::Internal);
    assert_eq!(setup.history().await.len(), 1);
}

/// Hands out one mocked driver for every target.
struct MockedProvider(Arc<MockDriver>);

#[async_trait]
impl DriverProvider for MockedProvider {
    async fn open(&self, _target: &ConnectionTarget) -> DriverResult<Arc<dyn Driver>> {
        Ok(Arc::clone(&self.0) as Arc<dyn Driver>)
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn driver_failures_are_internal(setup: Setup) {
    let mut driver = MockDriver::new();
    driver.expect_execute_migration().times(1).returning(|_, _| {
        Err(DriverError::Connection {
            target: "postgres/db1/shop".to_owned(),
            reason: "connection reset".to_owned(),
        })
    });
    let executor = MigrationExecutor::new(
        Arc::new(MockedProvider(Arc::new(driver))),
        Arc::new(DefaultClock),
    );
    let task = setup.task(TaskType::DataUpdate, "UPDATE t SET c = 1", "0004");

    let err = executor
        .run(&task, &setup.context)
        .await
        .expect_err("driver failure fails the task");

    assert_eq!(err.code(), ErrorCode::Internal);
    assert!(err.to_string().contains("connection reset"));
}

#[rstest]
fn builtin_registry_covers_every_task_type(setup: Setup) {
    let ghost: Arc<dyn GhostRunner> = Arc::new(MockGhostRunner::new());
    let registry = builtin_task_registry(&setup.provider(), &ghost, &Arc::new(DefaultClock))
        .expect("registry should build");

    assert_eq!(registry.len(), TaskType::ALL.len());
}
