use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{AcquisitionLine, Category, ExamId, VisitId};
use crate::error::OrganizerError;
use crate::layout::{CopySummary, PathBuilder};
use crate::ledger::{MetadataLedger, OrganizedEntry, RecordOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: EventLevel,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn info(message: String, elapsed: Option<Duration>) -> Self {
        Self {
            level: EventLevel::Info,
            message,
            elapsed,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            level: EventLevel::Error,
            message,
            elapsed: None,
        }
    }
}

/// Destination for the human-readable lines the organizer emits.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);

    fn info(&self, message: String) {
        self.event(ProgressEvent::info(message, None));
    }

    fn error(&self, message: String) {
        self.event(ProgressEvent::error(message));
    }
}

/// Forwards events to `tracing`; the binary decides where they end up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match (event.level, event.elapsed) {
            (EventLevel::Info, Some(elapsed)) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            (EventLevel::Info, None) => tracing::info!("{}", event.message),
            (EventLevel::Error, _) => tracing::error!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone)]
pub struct OrganizeOptions {
    /// Record a ledger row even when no source directory was copied.
    pub record_without_source: bool,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            record_without_source: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrganizeRequest {
    pub category: Category,
    pub acquisition_line: AcquisitionLine,
    pub visit_id: VisitId,
    pub exam_id: ExamId,
    pub source: Option<Utf8PathBuf>,
}

impl OrganizeRequest {
    /// A blank `source` counts as no source.
    pub fn parse(
        category: &str,
        acquisition_line: &str,
        visit_id: &str,
        exam_id: &str,
        source: Option<&str>,
    ) -> Result<Self, OrganizerError> {
        Ok(Self {
            category: category.parse()?,
            acquisition_line: acquisition_line.parse()?,
            visit_id: visit_id.parse()?,
            exam_id: exam_id.parse()?,
            source: source
                .filter(|source| !source.trim().is_empty())
                .map(Utf8PathBuf::from),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizeReport {
    pub leaf_path: String,
    pub copy: Option<CopySummary>,
    pub ledger_path: String,
    pub ledger: Option<RecordOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerListResult {
    pub ledger_path: String,
    pub entries: Vec<OrganizedEntry>,
}

/// Runs directory construction, content replacement and ledger recording in
/// sequence. Any failure aborts the remaining steps; nothing is undone.
#[derive(Clone)]
pub struct App {
    layout: PathBuilder,
    ledger: MetadataLedger,
    options: OrganizeOptions,
    sink: Arc<dyn ProgressSink>,
}

impl App {
    pub fn new(
        layout: PathBuilder,
        ledger: MetadataLedger,
        options: OrganizeOptions,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            layout,
            ledger,
            options,
            sink,
        }
    }

    pub fn from_config(config: &ResolvedConfig, sink: Arc<dyn ProgressSink>) -> Self {
        sink.info(format!(
            "Initializing organizer with base path: {}",
            config.base_path
        ));
        let layout = PathBuilder::new(config.base_path.clone(), sink.clone());
        let ledger = MetadataLedger::new(config.ledger_path(), sink.clone());
        let options = OrganizeOptions {
            record_without_source: config.record_without_source,
        };
        Self::new(layout, ledger, options, sink)
    }

    pub fn ledger(&self) -> &MetadataLedger {
        &self.ledger
    }

    pub fn organize(&self, request: &OrganizeRequest) -> Result<OrganizeReport, OrganizerError> {
        self.log_request(request);
        let report = self.organize_inner(request).inspect_err(|err| {
            self.sink.error(format!("Error creating directory structure: {err}"));
        })?;
        self.sink.info("Directory structure creation completed successfully".to_string());
        Ok(report)
    }

    /// Boolean form of [`organize`](Self::organize); the error is only logged.
    pub fn organize_ok(&self, request: &OrganizeRequest) -> bool {
        self.organize(request).is_ok()
    }

    pub fn list(&self) -> Result<LedgerListResult, OrganizerError> {
        let entries = self.ledger.entries()?;
        Ok(LedgerListResult {
            ledger_path: self.ledger.path().to_string(),
            entries,
        })
    }

    fn organize_inner(&self, request: &OrganizeRequest) -> Result<OrganizeReport, OrganizerError> {
        let leaf = self.layout.ensure_path(
            &request.category,
            &request.acquisition_line,
            &request.visit_id,
            request.exam_id,
        )?;

        let copy = match &request.source {
            Some(source) => Some(self.layout.replace_contents(&leaf, source)?),
            None => None,
        };

        let ledger = if copy.is_some() || self.options.record_without_source {
            Some(self.ledger.record_entry(
                &request.acquisition_line,
                &request.visit_id,
                request.exam_id,
            )?)
        } else {
            self.sink.info("No source supplied; metadata ledger left unchanged".to_string());
            None
        };

        Ok(OrganizeReport {
            leaf_path: leaf.to_string(),
            copy,
            ledger_path: self.ledger.path().to_string(),
            ledger,
        })
    }

    fn log_request(&self, request: &OrganizeRequest) {
        self.sink.info("Starting directory structure creation with parameters:".to_string());
        self.sink.info(format!("  - Folder name: {}", request.category));
        self.sink.info(format!("  - Acquisition line: {}", request.acquisition_line));
        self.sink.info(format!("  - Visit ID: {}", request.visit_id));
        self.sink.info(format!("  - Exam ID: {}", request.exam_id));
        if let Some(source) = &request.source {
            self.sink.info(format!("  - Source path: {source}"));
        }
    }
}
