//! Ledger header schema: canonical column names and the migrations that
//! bring older header shapes up to date.
//!
//! Loading runs [`migrate_headers`] before anything looks at column names, so
//! the rest of the ledger code only ever sees the current shape.

use crate::error::OrganizerError;

pub const TIMESTAMP: &str = "timestamp";
pub const ACQUISITION_LINE: &str = "acquisition_line";
pub const VISIT_ID: &str = "visit_id";
pub const EXAM_ID: &str = "exam_id";

pub const CANONICAL_COLUMNS: [&str; 4] = [TIMESTAMP, ACQUISITION_LINE, VISIT_ID, EXAM_ID];

/// A header rename applied when `canonical` is absent and `legacy` is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMigration {
    pub legacy: &'static str,
    pub canonical: &'static str,
}

pub const HEADER_MIGRATIONS: &[HeaderMigration] = &[HeaderMigration {
    legacy: "quisition_li",
    canonical: ACQUISITION_LINE,
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSchema {
    /// Header carries at least one name listed in [`HEADER_MIGRATIONS`].
    Legacy,
    Current,
}

pub fn detect_schema(headers: &[String]) -> LedgerSchema {
    if pending_migrations(headers).next().is_some() {
        LedgerSchema::Legacy
    } else {
        LedgerSchema::Current
    }
}

/// Renames legacy headers in place and returns the migrations applied.
pub fn migrate_headers(headers: &mut [String]) -> Vec<HeaderMigration> {
    let applied = pending_migrations(headers).collect::<Vec<_>>();
    for migration in &applied {
        if let Some(header) = headers.iter_mut().find(|h| h.as_str() == migration.legacy) {
            *header = migration.canonical.to_string();
        }
    }
    applied
}

fn pending_migrations(headers: &[String]) -> impl Iterator<Item = HeaderMigration> + '_ {
    HEADER_MIGRATIONS.iter().copied().filter(move |migration| {
        let has = |name: &str| headers.iter().any(|h| h == name);
        !has(migration.canonical) && has(migration.legacy)
    })
}

/// Positions of the known columns within a (migrated) header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    pub timestamp: Option<usize>,
    pub acquisition_line: usize,
    pub visit_id: usize,
    pub exam_id: usize,
}

impl ColumnIndex {
    pub fn resolve(headers: &[String]) -> Result<Self, OrganizerError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                OrganizerError::Ledger(format!(
                    "missing column {name:?} (found: {})",
                    headers.join(", ")
                ))
            })
        };
        Ok(Self {
            timestamp: find(TIMESTAMP),
            acquisition_line: require(ACQUISITION_LINE)?,
            visit_id: require(VISIT_ID)?,
            exam_id: require(EXAM_ID)?,
        })
    }
}

pub fn canonical_headers() -> Vec<String> {
    CANONICAL_COLUMNS.iter().map(|name| name.to_string()).collect()
}
