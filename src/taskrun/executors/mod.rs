//! Built-in task executors.

mod database_create;
mod ghost;
mod migration;

pub use database_create::DatabaseCreateExecutor;
pub use ghost::{GhostMigrationExecutor, precheck_ledger};
pub use migration::MigrationExecutor;

use crate::ledger::domain::{LedgerDomainError, MigrationInfo, MigrationVersion};
use crate::pipeline::domain::Task;
use crate::taskrun::ports::TaskRunContext;
use mockable::Clock;

/// Format of versions generated for tasks that carry none.
pub const GENERATED_VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Builds the ledger metadata for `task`.
///
/// A missing or blank schema version is replaced by the current UTC time.
pub(crate) fn migration_info(
    task: &Task,
    context: &TaskRunContext,
    clock: &impl Clock,
) -> Result<MigrationInfo, LedgerDomainError> {
    let version = task
        .payload()
        .schema_version()
        .filter(|version| !version.trim().is_empty())
        .map_or_else(
            || clock.utc().format(GENERATED_VERSION_FORMAT).to_string(),
            ToOwned::to_owned,
        );
    let target = task.target();
    let info = MigrationInfo::new(
        target.database_name.clone(),
        MigrationVersion::plain(version)?,
        task.task_type().migration_type(),
    )?
    .with_creator(context.creator.to_string());

    let with_issue = context
        .issue_id
        .into_iter()
        .fold(info, |acc, issue_id| acc.with_issue_id(issue_id.to_string()));
    Ok(target
        .environment
        .iter()
        .fold(with_issue, |acc, environment| acc.with_environment(environment.clone())))
}
