use std::fs;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{AcquisitionLine, Category, ExamId, VisitId};
use crate::error::{OrganizerError, SourceDefect};
use crate::fs_util::{self, EntryKind, fs_error};

/// Directory levels below the base root, outermost first.
const LEVELS: [&str; 4] = ["category", "acquisition line", "visit", "exam"];

/// Top-level work done by [`PathBuilder::replace_contents`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopySummary {
    pub removed: usize,
    pub files: usize,
    pub directories: usize,
    pub skipped: Vec<String>,
}

/// Builds `base/category/line/visit/exam` trees and fills the exam directory.
#[derive(Clone)]
pub struct PathBuilder {
    base_root: Utf8PathBuf,
    sink: Arc<dyn ProgressSink>,
}

impl PathBuilder {
    pub fn new(base_root: impl Into<Utf8PathBuf>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            base_root: base_root.into(),
            sink,
        }
    }

    /// Path of the exam directory, without touching the filesystem.
    pub fn leaf_path(
        &self,
        category: &Category,
        line: &AcquisitionLine,
        visit: &VisitId,
        exam: ExamId,
    ) -> Utf8PathBuf {
        self.base_root
            .join(category.as_str())
            .join(line.as_str())
            .join(visit.as_str())
            .join(exam.to_string())
    }

    /// Creates each of the four levels that is missing and returns the leaf.
    ///
    /// Existing directories are left alone, so repeated calls are no-ops.
    pub fn ensure_path(
        &self,
        category: &Category,
        line: &AcquisitionLine,
        visit: &VisitId,
        exam: ExamId,
    ) -> Result<Utf8PathBuf, OrganizerError> {
        let leaf = self.leaf_path(category, line, visit, exam);
        let levels: Vec<&Utf8Path> = leaf.ancestors().take(LEVELS.len()).collect();
        for (level, dir) in LEVELS.iter().zip(levels.into_iter().rev()) {
            self.ensure_dir(level, dir)?;
        }
        Ok(leaf)
    }

    /// Makes `leaf` mirror the top level of `source`.
    ///
    /// The source is validated first; `leaf` is only cleared once it is known
    /// to be an existing directory. Nothing is rolled back on a later failure.
    pub fn replace_contents(
        &self,
        leaf: &Utf8Path,
        source: &Utf8Path,
    ) -> Result<CopySummary, OrganizerError> {
        self.sink.info(format!("Checking source path: {source}"));
        check_source(source).inspect_err(|err| self.sink.error(err.to_string()))?;

        let started = Instant::now();
        let mut summary = CopySummary::default();

        self.sink.info(format!("Clearing existing contents in: {leaf}"));
        summary.removed = fs_util::clear_dir(leaf.as_std_path())?;
        self.sink.info("Existing contents cleared".to_string());

        self.sink.info(format!("Copying contents from {source} to {leaf}"));
        for child in fs_util::list_children(source.as_std_path())? {
            let Some(name) = child.file_name() else {
                continue;
            };
            let display_name = name.to_string_lossy().into_owned();
            let target = leaf.as_std_path().join(name);
            match fs_util::entry_kind(&child) {
                EntryKind::File => {
                    fs_util::copy_file_preserving_times(&child, &target)?;
                    summary.files += 1;
                    self.sink.info(format!("Copied file: {display_name}"));
                }
                EntryKind::Directory => {
                    let nested = fs_util::copy_dir_recursive(&child, &target)?;
                    for path in nested {
                        let skipped = format!("{display_name}/{}", path.display());
                        self.sink.info(format!(
                            "Skipped entry that is not a file or directory: {skipped}"
                        ));
                        summary.skipped.push(skipped);
                    }
                    summary.directories += 1;
                    self.sink.info(format!("Copied directory: {display_name}"));
                }
                EntryKind::Other => {
                    self.sink.info(format!(
                        "Skipped entry that is not a file or directory: {display_name}"
                    ));
                    summary.skipped.push(display_name);
                }
            }
        }

        self.sink.event(ProgressEvent::info(
            format!(
                "Copied {} file(s) and {} directory(ies) into {leaf}",
                summary.files, summary.directories
            ),
            Some(started.elapsed()),
        ));
        self.report_contents(leaf)?;
        Ok(summary)
    }

    fn ensure_dir(&self, level: &str, dir: &Utf8Path) -> Result<(), OrganizerError> {
        if dir.as_std_path().is_dir() {
            self.sink.info(format!("{} directory already exists: {dir}", capitalize(level)));
            return Ok(());
        }
        fs::create_dir_all(dir.as_std_path())
            .map_err(fs_error("create directory", dir.as_std_path()))?;
        self.sink.info(format!("Created {level} directory: {dir}"));
        Ok(())
    }

    fn report_contents(&self, leaf: &Utf8Path) -> Result<(), OrganizerError> {
        self.sink.info("Verifying copied contents:".to_string());
        for child in fs_util::list_children(leaf.as_std_path())? {
            let kind = match fs_util::entry_kind(&child) {
                EntryKind::Directory => "directory",
                _ => "file",
            };
            let name = child
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.sink.info(format!("  - {name} ({kind})"));
        }
        Ok(())
    }
}

fn check_source(source: &Utf8Path) -> Result<(), OrganizerError> {
    let defect = if !source.as_std_path().exists() {
        SourceDefect::Missing
    } else if !source.as_std_path().is_dir() {
        SourceDefect::NotDirectory
    } else {
        return Ok(());
    };
    Err(OrganizerError::InvalidSource {
        path: source.to_path_buf(),
        defect,
    })
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
