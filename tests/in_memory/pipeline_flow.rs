//! An issue driven from creation to settlement by both schedulers, using the
//! built-in executor registries against in-memory adapters.

use async_trait::async_trait;
use gropius::config::{OrchestratorConfig, SchedulerConfig};
use gropius::engine::Engine;
use gropius::error::ErrorCode;
use gropius::ledger::{
    adapters::memory::InMemoryDriverProvider,
    domain::{MigrationHistoryFind, MigrationInfo, MigrationType, MigrationVersion, Namespace},
    ports::{ConnectionTarget, Driver, DriverProvider},
};
use gropius::pipeline::{
    adapters::memory::{InMemoryActivityLog, InMemoryPipelineRepository},
    domain::{
        Actor, ActorId, ActorRole, ApprovalPolicy, DatabaseCreatePayload, DatabaseId, InstanceId,
        IssueId, IssueStatus, MigrationPayload, NewStage, NewTask, Task, TaskCheckStatus,
        TaskCheckType, TaskPayload, TaskStatus, TaskTarget, TaskType,
    },
    ports::{PipelineRepository, TaskCheckRunFind},
    services::CreateIssueRequest,
};
use gropius::orchestrator::Orchestrator;
use gropius::taskcheck::{
    CheckCollaborators,
    ports::{Advice, CollaboratorError, GhostRunner, RowEstimator, SqlAdvisor},
};
use mockable::DefaultClock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(10);

/// Stands in for tools `SQLite` never consults.
struct NotConfigured;

#[async_trait]
impl SqlAdvisor for NotConfigured {
    async fn check(&self, _engine: Engine, _statement: &str) -> Result<Vec<Advice>, CollaboratorError> {
        Err(CollaboratorError::message("advisor", "not configured"))
    }
}

#[async_trait]
impl GhostRunner for NotConfigured {
    async fn dry_run(
        &self,
        _target: &ConnectionTarget,
        _statement: &str,
    ) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::message("gh-ost", "not configured"))
    }

    async fn migrate(
        &self,
        _target: &ConnectionTarget,
        _statement: &str,
    ) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::message("gh-ost", "not configured"))
    }
}

#[async_trait]
impl RowEstimator for NotConfigured {
    async fn estimate(
        &self,
        _target: &ConnectionTarget,
        _statement: &str,
    ) -> Result<u64, CollaboratorError> {
        Err(CollaboratorError::message("estimator", "not configured"))
    }
}

struct Deployment {
    repository: Arc<InMemoryPipelineRepository>,
    activity: Arc<InMemoryActivityLog>,
    orchestrator: Arc<Orchestrator<InMemoryPipelineRepository, InMemoryActivityLog, DefaultClock>>,
    drivers: Arc<InMemoryDriverProvider<DefaultClock>>,
    instance: InstanceId,
    shutdown: CancellationToken,
}

impl Deployment {
    /// Fast ticks, two connections per instance and no SQL review or row
    /// estimation.
    fn new() -> eyre::Result<Self> {
        let config = SchedulerConfig::default()
            .with_intervals(TICK)
            .with_max_instance_connections(2);
        let not_configured = Arc::new(NotConfigured);
        Self::with_config(&config, Arc::clone(&not_configured) as _, not_configured)
    }

    fn with_config(
        config: &SchedulerConfig,
        advisor: Arc<dyn SqlAdvisor>,
        estimator: Arc<dyn RowEstimator>,
    ) -> eyre::Result<Self> {
        let repository = Arc::new(InMemoryPipelineRepository::new());
        let activity = Arc::new(InMemoryActivityLog::new());
        let clock = Arc::new(DefaultClock);
        let drivers = Arc::new(InMemoryDriverProvider::new(Arc::clone(&clock)));
        let collaborators = CheckCollaborators {
            drivers: Arc::clone(&drivers) as Arc<dyn DriverProvider>,
            advisor,
            ghost: Arc::new(NotConfigured),
            estimator,
        };
        let orchestrator = Orchestrator::with_config(
            config,
            Arc::clone(&repository),
            Arc::clone(&activity),
            clock,
            &collaborators,
        )?;
        Ok(Self {
            repository,
            activity,
            orchestrator: Arc::new(orchestrator),
            drivers,
            instance: InstanceId::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Starts both schedulers in the background.
    fn start(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let token = self.shutdown.clone();
        tokio::spawn(async move { orchestrator.run(token).await });
    }

    fn target(&self, database: &str) -> TaskTarget {
        TaskTarget::new(self.instance, DatabaseId::new(), Engine::Sqlite, database)
    }

    fn shop_connection(&self) -> ConnectionTarget {
        ConnectionTarget::database(self.instance.to_string(), Engine::Sqlite, "shop")
    }

    async fn launch(&self, stages: Vec<NewStage>) -> eyre::Result<IssueId> {
        let request = stages.into_iter().fold(
            CreateIssueRequest::new("create shop", ActorId::new()),
            CreateIssueRequest::with_stage,
        );
        let service = self.orchestrator.service();
        let issue = service.create_issue(request).await?;
        service
            .approve_issue(issue.id(), Actor::new(ActorId::new(), ActorRole::Dba))
            .await?;
        Ok(issue.id())
    }

    async fn tasks(&self, issue_id: IssueId) -> eyre::Result<Vec<Task>> {
        let issue = self
            .repository
            .find_issue(issue_id)
            .await?
            .ok_or_else(|| eyre::eyre!("issue {issue_id} disappeared"))?;
        let pipeline = self
            .repository
            .find_pipeline(issue.pipeline_id())
            .await?
            .ok_or_else(|| eyre::eyre!("pipeline of {issue_id} disappeared"))?;
        Ok(pipeline.tasks().cloned().collect())
    }

    /// Polls until `done` holds for the issue's tasks.
    async fn wait_for(
        &self,
        issue_id: IssueId,
        done: impl Fn(&[Task]) -> bool,
    ) -> eyre::Result<Vec<Task>> {
        let waited = tokio::time::timeout(DEADLINE, async {
            loop {
                let tasks = self.tasks(issue_id).await?;
                if done(&tasks) {
                    return Ok::<_, eyre::Report>(tasks);
                }
                tokio::time::sleep(TICK).await;
            }
        })
        .await;
        waited.map_err(|_| eyre::eyre!("issue {issue_id} did not settle in time"))?
    }
}

impl Drop for Deployment {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn create_shop(deployment: &Deployment) -> NewStage {
    NewStage::new("create")
        .with_approval_policy(ApprovalPolicy::Automatic)
        .with_task(NewTask {
            name: "create shop".to_owned(),
            task_type: TaskType::DatabaseCreate,
            target: TaskTarget::new_database(deployment.instance, Engine::Sqlite, "shop"),
            payload: TaskPayload::DatabaseCreate(DatabaseCreatePayload {
                statement: "CREATE DATABASE shop".to_owned(),
                schema_version: Some("0001".to_owned()),
            }),
            earliest_allowed_at: None,
        })
}

fn add_orders(deployment: &Deployment) -> NewStage {
    NewStage::new("migrate")
        .with_approval_policy(ApprovalPolicy::Automatic)
        .with_task(NewTask {
            name: "add orders".to_owned(),
            task_type: TaskType::SchemaUpdate,
            target: deployment.target("shop"),
            payload: TaskPayload::Migration(MigrationPayload::new(
                "CREATE TABLE orders (id INTEGER PRIMARY KEY)",
                "0002",
            )),
            earliest_allowed_at: None,
        })
}

#[tokio::test(flavor = "multi_thread")]
async fn issue_runs_every_stage_and_records_the_ledger() -> eyre::Result<()> {
    let deployment = Deployment::new()?;
    deployment.start();

    let issue_id = deployment
        .launch(vec![create_shop(&deployment), add_orders(&deployment)])
        .await?;
    let tasks = deployment
        .wait_for(issue_id, |tasks| {
            tasks.iter().all(|task| task.status() == TaskStatus::Done)
        })
        .await?;

    eyre::ensure!(tasks.len() == 2, "expected two tasks, found {}", tasks.len());
    let versions: Vec<Option<&str>> = tasks
        .iter()
        .map(|task| task.result().and_then(|result| result.version.as_deref()))
        .collect();
    eyre::ensure!(
        versions == vec![Some("0001"), Some("0002")],
        "recorded versions were {versions:?}"
    );

    let shop = deployment.drivers.driver(&deployment.shop_connection())?;
    let history = shop
        .find_migration_history_list(&MigrationHistoryFind::for_namespace(Namespace::new("shop")?))
        .await?;
    let sequences: Vec<u64> = history.iter().map(|row| row.sequence).collect();
    eyre::ensure!(sequences == vec![2, 1], "history sequences were {sequences:?}");
    eyre::ensure!(
        history.iter().all(|row| row.issue_id.as_deref() == Some(issue_id.to_string().as_str())),
        "every history row links back to the issue"
    );

    let settled = tokio::time::timeout(DEADLINE, async {
        loop {
            let issue = deployment.repository.find_issue(issue_id).await?;
            if issue.is_some_and(|issue| issue.status() == IssueStatus::Done) {
                return Ok::<_, eyre::Report>(());
            }
            tokio::time::sleep(TICK).await;
        }
    })
    .await;
    settled.map_err(|_| eyre::eyre!("issue was not marked done"))??;

    let transitions: Vec<(TaskStatus, TaskStatus)> = deployment
        .activity
        .entries()?
        .into_iter()
        .filter(|entry| tasks.first().is_some_and(|task| task.id() == entry.task_id))
        .map(|entry| (entry.from, entry.to))
        .collect();
    eyre::ensure!(
        transitions
            == vec![
                (TaskStatus::PendingApproval, TaskStatus::Pending),
                (TaskStatus::Pending, TaskStatus::Running),
                (TaskStatus::Running, TaskStatus::Done),
            ],
        "create task moved through {transitions:?}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_statement_fails_its_task_and_holds_the_pipeline() -> eyre::Result<()> {
    let deployment = Deployment::new()?;
    deployment
        .drivers
        .driver(&deployment.shop_connection())?
        .fail_statements_containing("orders")?;
    deployment.start();

    let issue_id = deployment
        .launch(vec![create_shop(&deployment), add_orders(&deployment)])
        .await?;
    let tasks = deployment
        .wait_for(issue_id, |tasks| {
            tasks
                .iter()
                .any(|task| task.status() == TaskStatus::Failed)
        })
        .await?;

    let failed = tasks
        .iter()
        .find(|task| task.status() == TaskStatus::Failed)
        .ok_or_else(|| eyre::eyre!("no failed task"))?;
    eyre::ensure!(failed.task_type() == TaskType::SchemaUpdate, "the update fails");
    eyre::ensure!(failed.code() == ErrorCode::Internal, "code was {}", failed.code());
    eyre::ensure!(
        failed
            .comment()
            .is_some_and(|comment| comment.contains("statement rejected")),
        "comment was {:?}",
        failed.comment()
    );

    let issue = deployment
        .repository
        .find_issue(issue_id)
        .await?
        .ok_or_else(|| eyre::eyre!("issue disappeared"))?;
    eyre::ensure!(issue.status() == IssueStatus::Open, "a failed task keeps the issue open");

    let shop = deployment.drivers.driver(&deployment.shop_connection())?;
    let history = shop
        .find_migration_history_list(&MigrationHistoryFind::for_namespace(Namespace::new("shop")?))
        .await?;
    eyre::ensure!(history.len() == 1, "only the baseline is recorded");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn baseline_onboards_an_existing_database() -> eyre::Result<()> {
    let deployment = Deployment::new()?;
    let shop = deployment.drivers.driver(&deployment.shop_connection())?;
    eyre::ensure!(shop.needs_setup_migration().await?, "shop starts without history");
    deployment.start();

    let baseline = NewStage::new("baseline")
        .with_approval_policy(ApprovalPolicy::Automatic)
        .with_task(NewTask {
            name: "baseline shop".to_owned(),
            task_type: TaskType::SchemaBaseline,
            target: deployment.target("shop"),
            payload: TaskPayload::Migration(MigrationPayload::new("", "0001")),
            earliest_allowed_at: None,
        });
    let issue_id = deployment
        .launch(vec![baseline, add_orders(&deployment)])
        .await?;
    let tasks = deployment
        .wait_for(issue_id, |tasks| {
            tasks.iter().all(|task| task.status() == TaskStatus::Done)
        })
        .await?;

    eyre::ensure!(tasks.len() == 2, "expected two tasks, found {}", tasks.len());
    eyre::ensure!(!shop.needs_setup_migration().await?, "baseline created the history table");
    let history = shop
        .find_migration_history_list(&MigrationHistoryFind::for_namespace(Namespace::new("shop")?))
        .await?;
    let sequences: Vec<u64> = history.iter().map(|row| row.sequence).collect();
    eyre::ensure!(sequences == vec![2, 1], "history sequences were {sequences:?}");
    let versions: Vec<Option<&str>> = tasks
        .iter()
        .map(|task| task.result().and_then(|result| result.version.as_deref()))
        .collect();
    eyre::ensure!(
        versions == vec![Some("0001"), Some("0002")],
        "recorded versions were {versions:?}"
    );
    Ok(())
}

/// Reviews nothing and estimates a fixed row count.
struct FixedEstimate(u64);

#[async_trait]
impl SqlAdvisor for FixedEstimate {
    async fn check(&self, _engine: Engine, _statement: &str) -> Result<Vec<Advice>, CollaboratorError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl RowEstimator for FixedEstimate {
    async fn estimate(
        &self,
        _target: &ConnectionTarget,
        _statement: &str,
    ) -> Result<u64, CollaboratorError> {
        Ok(self.0)
    }
}

/// Starts a deployment whose estimator reports 50 rows for every change,
/// with a baselined Postgres `shop`, and launches one data change on it.
async fn launch_backfill(config: &SchedulerConfig) -> eyre::Result<(Deployment, IssueId)> {
    let estimate = Arc::new(FixedEstimate(50));
    let deployment = Deployment::with_config(config, Arc::clone(&estimate) as _, estimate)?;
    let shop = deployment.drivers.driver(&ConnectionTarget::database(
        deployment.instance.to_string(),
        Engine::Postgres,
        "shop",
    ))?;
    shop.execute_migration(
        &MigrationInfo::new("shop", MigrationVersion::plain("0001")?, MigrationType::Baseline)?,
        "",
    )
    .await?;
    deployment.start();

    let backfill = NewStage::new("backfill")
        .with_approval_policy(ApprovalPolicy::Automatic)
        .with_task(NewTask {
            name: "backfill notes".to_owned(),
            task_type: TaskType::DataUpdate,
            target: TaskTarget::new(deployment.instance, DatabaseId::new(), Engine::Postgres, "shop"),
            payload: TaskPayload::Migration(MigrationPayload::new(
                "UPDATE orders SET note = ''",
                "0002",
            )),
            earliest_allowed_at: None,
        });
    let issue_id = deployment.launch(vec![backfill]).await?;
    Ok((deployment, issue_id))
}

#[tokio::test(flavor = "multi_thread")]
async fn loaded_configuration_drives_admission_and_check_gating() -> eyre::Result<()> {
    let config = OrchestratorConfig::from_toml_str(
        r#"
        [scheduler]
        task_interval_ms = 10
        check_interval_ms = 10
        max_instance_connections = 1
        run_threshold = "success"
        auto_approve_threshold = "warn"
        affected_rows_warn_above = 10
        "#,
    )?;
    let (deployment, issue_id) = launch_backfill(&config.scheduler).await?;
    eyre::ensure!(
        deployment.orchestrator.instance_slots().capacity() == 1,
        "connection cap comes from the file"
    );

    let tasks = deployment
        .wait_for(issue_id, |tasks| {
            tasks.iter().all(|task| task.status() == TaskStatus::Pending)
        })
        .await?;
    let [task] = tasks.as_slice() else {
        eyre::bail!("expected one task, found {}", tasks.len());
    };
    let report = deployment
        .repository
        .list_task_check_runs(&TaskCheckRunFind {
            check_type: Some(TaskCheckType::AffectedRowsReport),
            ..TaskCheckRunFind::for_task(task.id())
        })
        .await?;
    let finding = report
        .first()
        .and_then(|run| run.results().first())
        .ok_or_else(|| eyre::eyre!("affected rows were not reported"))?;
    eyre::ensure!(finding.status == TaskCheckStatus::Warn, "finding was {finding:?}");
    eyre::ensure!(
        finding.content == "50 rows affected, more than 10",
        "finding was {finding:?}"
    );

    tokio::time::sleep(TICK * 20).await;
    let held = deployment.tasks(issue_id).await?;
    eyre::ensure!(
        held.iter().all(|task| task.status() == TaskStatus::Pending),
        "a warning must not pass the run threshold: {held:?}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn default_limits_let_the_same_change_run() -> eyre::Result<()> {
    let config = SchedulerConfig::default().with_intervals(TICK);
    let (deployment, issue_id) = launch_backfill(&config).await?;

    let tasks = deployment
        .wait_for(issue_id, |tasks| {
            tasks.iter().all(|task| task.status() == TaskStatus::Done)
        })
        .await?;

    eyre::ensure!(
        tasks
            .iter()
            .all(|task| task.result().and_then(|result| result.version.as_deref()) == Some("0002")),
        "the backfill is recorded as 0002: {tasks:?}"
    );
    Ok(())
}
