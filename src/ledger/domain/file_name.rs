//! Migration metadata derived from file names.
//!
//! Files follow `{version}__{database}[__baseline][__description].sql`.

use super::{LedgerDomainError, MigrationInfo, MigrationType, MigrationVersion};

const SEPARATOR: &str = "__";
const BASELINE_MARKER: &str = "baseline";

/// Parses migration metadata out of a file path.
///
/// Leading directories and a trailing `.sql` extension are ignored. The third
/// part selects a baseline when it is the literal `baseline`; the remaining
/// parts become the description, with underscores read as spaces and the
/// first letter capitalised.
///
/// # Errors
///
/// Returns [`LedgerDomainError::InvalidFileName`] when fewer than two parts
/// are present or either required part is empty.
pub fn parse_migration_file_name(path: &str) -> Result<MigrationInfo, LedgerDomainError> {
    let invalid = |reason| LedgerDomainError::InvalidFileName {
        name: path.to_owned(),
        reason,
    };

    let file_name = path.rsplit('/').next().unwrap_or(path);
    let stem = file_name.strip_suffix(".sql").unwrap_or(file_name);
    let parts: Vec<&str> = stem.split(SEPARATOR).collect();
    let [version, database, rest @ ..] = parts.as_slice() else {
        return Err(invalid("expected at least version and database parts"));
    };
    if version.trim().is_empty() {
        return Err(invalid("version part is empty"));
    }
    if database.trim().is_empty() {
        return Err(invalid("database part is empty"));
    }

    let (migration_type, description_parts) = match rest {
        [first, tail @ ..] if *first == BASELINE_MARKER => (MigrationType::Baseline, tail),
        _ => (MigrationType::Migrate, rest),
    };

    let info = MigrationInfo::new(*database, MigrationVersion::plain(*version)?, migration_type)?;
    Ok(info.with_description(capitalize(&description_parts.join(" ").replace('_', " "))))
}

fn capitalize(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
