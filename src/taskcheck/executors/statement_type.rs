//! Keyword-level statement classification.

use crate::pipeline::domain::{Task, TaskCheckResult, TaskCheckRun, TaskType};
use crate::taskcheck::ports::{CheckExecutorResult, TaskCheckExecutor};
use async_trait::async_trait;

const DDL_KEYWORDS: [&str; 6] = ["CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME", "COMMENT"];
const DML_KEYWORDS: [&str; 5] = ["INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE"];
const DESTRUCTIVE_KEYWORDS: [&str; 2] = ["DROP", "TRUNCATE"];

/// Broad class of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Schema definition.
    Ddl,
    /// Data manipulation.
    Dml,
    /// Anything else, e.g. `SET` or `SELECT`.
    Other,
}

/// A statement with its leading keyword and the table it names, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedStatement {
    /// Statement class.
    pub kind: StatementKind,
    /// Leading keyword, upper-cased.
    pub keyword: String,
    /// Table named after a `TABLE` keyword.
    pub resource: Option<String>,
    /// Statement text without comments.
    pub text: String,
}

/// Splits a script on `;` and classifies each statement by its first
/// keyword. Line comments are ignored.
#[must_use]
pub fn classify_statements(sql: &str) -> Vec<ClassifiedStatement> {
    let stripped = sql
        .lines()
        .map(|line| line.split_once("--").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(|statement| {
            let keyword = statement
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();
            let kind = if DDL_KEYWORDS.contains(&keyword.as_str()) {
                StatementKind::Ddl
            } else if DML_KEYWORDS.contains(&keyword.as_str()) {
                StatementKind::Dml
            } else {
                StatementKind::Other
            };
            ClassifiedStatement {
                kind,
                resource: table_name(statement),
                keyword,
                text: statement.to_owned(),
            }
        })
        .collect()
}

fn table_name(statement: &str) -> Option<String> {
    let mut tokens = statement
        .split_whitespace()
        .skip_while(|token| !token.eq_ignore_ascii_case("TABLE"))
        .skip(1)
        .skip_while(|token| {
            ["IF", "NOT", "EXISTS"]
                .iter()
                .any(|word| token.eq_ignore_ascii_case(word))
        });
    tokens.next().map(|token| {
        token
            .split('(')
            .next()
            .unwrap_or(token)
            .trim_matches(|c| c == '`' || c == '"')
            .to_owned()
    })
}

/// Rejects DDL in data changes and DML in schema changes; warns on
/// destructive DDL.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatementTypeExecutor;

impl StatementTypeExecutor {
    /// Creates the executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskCheckExecutor for StatementTypeExecutor {
    async fn run(
        &self,
        _run: &TaskCheckRun,
        task: &Task,
    ) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        if !task.target().engine.capabilities().statement_type_check {
            return Ok(Vec::new());
        }

        let statements = classify_statements(task.payload().statement());
        let resources: Vec<String> = statements
            .iter()
            .filter_map(|statement| statement.resource.clone())
            .collect();
        let data_change = task.task_type() == TaskType::DataUpdate;

        let mut results = Vec::new();
        for statement in &statements {
            match statement.kind {
                StatementKind::Ddl if data_change => results.push(TaskCheckResult::error(
                    "Data change can only run DML",
                    format!("\"{}\" is not DML", statement.text),
                )),
                StatementKind::Dml if !data_change => results.push(TaskCheckResult::error(
                    "Alter schema can only run DDL",
                    format!("\"{}\" is not DDL", statement.text),
                )),
                StatementKind::Ddl
                    if DESTRUCTIVE_KEYWORDS.contains(&statement.keyword.as_str()) =>
                {
                    results.push(TaskCheckResult::warn(
                        "Destructive statement",
                        format!("\"{}\" drops data", statement.text),
                    ));
                }
                StatementKind::Ddl | StatementKind::Dml | StatementKind::Other => {}
            }
        }

        if results.is_empty() {
            let keywords: Vec<&str> = statements
                .iter()
                .map(|statement| statement.keyword.as_str())
                .collect();
            results.push(TaskCheckResult::success("OK", keywords.join(", ")));
        }
        Ok(results
            .into_iter()
            .map(|result| result.with_changed_resources(resources.clone()))
            .collect())
    }
}
