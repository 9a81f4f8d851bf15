use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDateTime};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;

use crate::app::ProgressSink;
use crate::domain::{AcquisitionLine, ExamId, VisitId};
use crate::error::OrganizerError;
use crate::fs_util;
use crate::schema::{self, ColumnIndex, LedgerSchema};

pub const DEFAULT_LEDGER_FILE: &str = "metadata.csv";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identity of a ledger row. Timestamps are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntryKey {
    pub acquisition_line: String,
    pub visit_id: String,
    pub exam_id: i64,
}

impl EntryKey {
    pub fn new(line: &AcquisitionLine, visit: &VisitId, exam: ExamId) -> Self {
        Self {
            acquisition_line: line.as_str().to_string(),
            visit_id: visit.as_str().to_string(),
            exam_id: i64::from(exam.get()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizedEntry {
    pub timestamp: String,
    pub acquisition_line: String,
    pub visit_id: String,
    pub exam_id: i64,
}

impl OrganizedEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            acquisition_line: self.acquisition_line.clone(),
            visit_id: self.visit_id.clone(),
            exam_id: self.exam_id,
        }
    }
}

impl PartialEq for OrganizedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.acquisition_line == other.acquisition_line
            && self.visit_id == other.visit_id
            && self.exam_id == other.exam_id
    }
}

impl Eq for OrganizedEntry {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Appended,
    AlreadyRecorded,
}

/// In-memory copy of the ledger file. Unknown columns ride along untouched.
#[derive(Debug, Clone)]
pub struct LedgerTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: ColumnIndex,
    schema: LedgerSchema,
}

impl LedgerTable {
    pub fn empty() -> Self {
        let headers = schema::canonical_headers();
        let columns = ColumnIndex {
            timestamp: Some(0),
            acquisition_line: 1,
            visit_id: 2,
            exam_id: 3,
        };
        Self {
            headers,
            rows: Vec::new(),
            columns,
            schema: LedgerSchema::Current,
        }
    }

    pub fn from_csv(content: &[u8]) -> Result<Self, OrganizerError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let mut headers = reader
            .headers()
            .map_err(|err| OrganizerError::Ledger(format!("read header: {err}")))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let detected = schema::detect_schema(&headers);
        schema::migrate_headers(&mut headers);

        let mut columns = ColumnIndex::resolve(&headers)?;
        if columns.timestamp.is_none() {
            columns.timestamp = Some(headers.len());
            headers.push(schema::TIMESTAMP.to_string());
        }

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|err| {
                OrganizerError::Ledger(format!("parse row {}: {err}", index + 2))
            })?;
            let mut row = record.iter().map(str::to_string).collect::<Vec<_>>();
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
            rows.push(row);
        }

        Ok(Self {
            headers,
            rows,
            columns,
            schema: detected,
        })
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, OrganizerError> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|err| OrganizerError::Ledger(format!("write header: {err}")))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|err| OrganizerError::Ledger(format!("write row: {err}")))?;
        }
        writer
            .into_inner()
            .map_err(|err| OrganizerError::Ledger(format!("flush ledger: {err}")))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn schema(&self) -> LedgerSchema {
        self.schema
    }

    /// Rows with key fields trimmed and `exam_id` read as an integer.
    pub fn entries(&self) -> Result<Vec<OrganizedEntry>, OrganizerError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| self.normalize_row(index, row))
            .collect()
    }

    pub fn contains(&self, key: &EntryKey) -> Result<bool, OrganizerError> {
        for (index, row) in self.rows.iter().enumerate() {
            if self.normalize_row(index, row)?.key() == *key {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn push(&mut self, entry: &OrganizedEntry) {
        let mut row = vec![String::new(); self.headers.len()];
        if let Some(timestamp) = self.columns.timestamp {
            row[timestamp] = entry.timestamp.clone();
        }
        row[self.columns.acquisition_line] = entry.acquisition_line.clone();
        row[self.columns.visit_id] = entry.visit_id.clone();
        row[self.columns.exam_id] = entry.exam_id.to_string();
        self.rows.push(row);
    }

    fn normalize_row(&self, index: usize, row: &[String]) -> Result<OrganizedEntry, OrganizerError> {
        let cell = |column: usize| row.get(column).map(|value| value.trim()).unwrap_or("");
        let raw_exam = cell(self.columns.exam_id);
        let exam_id = parse_exam_cell(raw_exam).ok_or_else(|| {
            OrganizerError::Ledger(format!(
                "row {}: exam_id {raw_exam:?} is not an integer",
                index + 2
            ))
        })?;
        Ok(OrganizedEntry {
            timestamp: self
                .columns
                .timestamp
                .map(|column| cell(column).to_string())
                .unwrap_or_default(),
            acquisition_line: cell(self.columns.acquisition_line).to_string(),
            visit_id: cell(self.columns.visit_id).to_string(),
            exam_id,
        })
    }
}

// Spreadsheet tools like to write whole numbers as `3.0`.
fn parse_exam_cell(value: &str) -> Option<i64> {
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed);
    }
    let float = value.parse::<f64>().ok()?;
    let in_range = float.is_finite()
        && float.fract() == 0.0
        && float >= i64::MIN as f64
        && float <= i64::MAX as f64;
    in_range.then_some(float as i64)
}

/// Append-only CSV record of organized entries, de-duplicated by [`EntryKey`].
#[derive(Clone)]
pub struct MetadataLedger {
    path: Utf8PathBuf,
    sink: Arc<dyn ProgressSink>,
}

impl MetadataLedger {
    pub fn new(path: impl Into<Utf8PathBuf>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            path: path.into(),
            sink,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Loads the ledger, or `None` if the file does not exist yet.
    pub fn load(&self) -> Result<Option<LedgerTable>, OrganizerError> {
        if !self.path.as_std_path().exists() {
            return Ok(None);
        }
        let content = std::fs::read(self.path.as_std_path())
            .map_err(|err| OrganizerError::Ledger(format!("read {}: {err}", self.path)))?;
        LedgerTable::from_csv(&content).map(Some)
    }

    pub fn save(&self, table: &LedgerTable) -> Result<(), OrganizerError> {
        let content = table.to_csv()?;
        fs_util::write_bytes_atomic(self.path.as_std_path(), &content)
            .map_err(|err| OrganizerError::Ledger(err.to_string()))
    }

    pub fn entries(&self) -> Result<Vec<OrganizedEntry>, OrganizerError> {
        match self.load()? {
            Some(table) => table.entries(),
            None => Ok(Vec::new()),
        }
    }

    pub fn record_entry(
        &self,
        line: &AcquisitionLine,
        visit: &VisitId,
        exam: ExamId,
    ) -> Result<RecordOutcome, OrganizerError> {
        self.record_entry_at(line, visit, exam, Local::now().naive_local())
    }

    /// Like [`record_entry`](Self::record_entry) with an explicit timestamp.
    pub fn record_entry_at(
        &self,
        line: &AcquisitionLine,
        visit: &VisitId,
        exam: ExamId,
        recorded_at: NaiveDateTime,
    ) -> Result<RecordOutcome, OrganizerError> {
        let key = EntryKey::new(line, visit, exam);
        let entry = OrganizedEntry {
            timestamp: recorded_at.format(TIMESTAMP_FORMAT).to_string(),
            acquisition_line: key.acquisition_line.clone(),
            visit_id: key.visit_id.clone(),
            exam_id: key.exam_id,
        };
        self.upsert(&key, &entry).map_err(|err| {
            self.sink.error(format!("Error updating metadata ledger {}: {err}", self.path));
            match err {
                OrganizerError::Ledger(message) => OrganizerError::Ledger(message),
                other => OrganizerError::Ledger(other.to_string()),
            }
        })
    }

    fn upsert(&self, key: &EntryKey, entry: &OrganizedEntry) -> Result<RecordOutcome, OrganizerError> {
        let mut table = match self.load()? {
            Some(table) => table,
            None => {
                let mut table = LedgerTable::empty();
                table.push(entry);
                self.save(&table)?;
                self.sink.info(format!("Created metadata ledger with first entry: {}", self.path));
                return Ok(RecordOutcome::Appended);
            }
        };

        if table.contains(key)? {
            if table.schema() == LedgerSchema::Legacy {
                self.save(&table)?;
                self.sink.info(format!("Migrated legacy ledger header: {}", self.path));
            }
            self.sink.info(format!(
                "Entry already exists in metadata ledger for acquisition_line={}, visit_id={}, exam_id={}",
                key.acquisition_line, key.visit_id, key.exam_id
            ));
            return Ok(RecordOutcome::AlreadyRecorded);
        }

        table.push(entry);
        self.save(&table)?;
        self.sink.info(format!("Added new entry to metadata ledger: {}", self.path));
        Ok(RecordOutcome::Appended)
    }
}
