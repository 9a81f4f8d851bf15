use std::collections::BTreeSet;
use std::fs;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use acquisition_organizer::app::{EventLevel, NullSink, ProgressEvent, ProgressSink};
use acquisition_organizer::domain::{AcquisitionLine, Category, ExamId, VisitId};
use acquisition_organizer::error::{OrganizerError, SourceDefect};
use acquisition_organizer::layout::PathBuilder;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Ids {
    category: Category,
    line: AcquisitionLine,
    visit: VisitId,
    exam: ExamId,
}

fn ids() -> Ids {
    Ids {
        category: "raw".parse().unwrap(),
        line: "bowl".parse().unwrap(),
        visit: "182823488".parse().unwrap(),
        exam: ExamId::new(3),
    }
}

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn top_level_names(dir: &Utf8Path) -> BTreeSet<String> {
    fs::read_dir(dir.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn ensure_path_creates_four_levels() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path()).join("data");
    let builder = PathBuilder::new(base.clone(), Arc::new(NullSink));
    let ids = ids();

    let leaf = builder
        .ensure_path(&ids.category, &ids.line, &ids.visit, ids.exam)
        .unwrap();

    assert_eq!(leaf, base.join("raw/bowl/182823488/3"));
    assert!(leaf.as_std_path().is_dir());
}

#[test]
fn ensure_path_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    let sink = Arc::new(RecordingSink::default());
    let builder = PathBuilder::new(base.clone(), sink.clone());
    let ids = ids();

    let first = builder
        .ensure_path(&ids.category, &ids.line, &ids.visit, ids.exam)
        .unwrap();
    fs::write(first.join("keep.txt").as_std_path(), b"keep").unwrap();
    let second = builder
        .ensure_path(&ids.category, &ids.line, &ids.visit, ids.exam)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(top_level_names(&second), BTreeSet::from(["keep.txt".to_string()]));

    let messages = sink.messages();
    assert!(messages.iter().any(|m| m.starts_with("Created exam directory")));
    assert!(messages
        .iter()
        .any(|m| m.starts_with("Exam directory already exists")));
}

#[test]
fn ensure_path_creates_levels_outermost_first() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path()).join("data");
    let sink = Arc::new(RecordingSink::default());
    let builder = PathBuilder::new(base.clone(), sink.clone());
    let ids = ids();

    let leaf = builder
        .ensure_path(&ids.category, &ids.line, &ids.visit, ids.exam)
        .unwrap();

    assert_eq!(
        leaf,
        builder.leaf_path(&ids.category, &ids.line, &ids.visit, ids.exam)
    );
    assert_eq!(
        sink.messages(),
        vec![
            format!("Created category directory: {base}/raw"),
            format!("Created acquisition line directory: {base}/raw/bowl"),
            format!("Created visit directory: {base}/raw/bowl/182823488"),
            format!("Created exam directory: {base}/raw/bowl/182823488/3"),
        ]
    );
}

#[test]
fn ensure_path_fails_when_a_level_is_a_file() {
    let temp = tempfile::tempdir().unwrap();
    let base = utf8(temp.path());
    fs::write(base.join("raw").as_std_path(), b"not a dir").unwrap();
    let builder = PathBuilder::new(base, Arc::new(NullSink));
    let ids = ids();

    let err = builder
        .ensure_path(&ids.category, &ids.line, &ids.visit, ids.exam)
        .unwrap_err();
    assert_matches!(err, OrganizerError::Filesystem(_));
}

#[test]
fn replace_contents_mirrors_source() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = root.join("source");
    fs::create_dir_all(source.join("b").as_std_path()).unwrap();
    fs::write(source.join("a.txt").as_std_path(), b"a").unwrap();
    fs::write(source.join("b/inner.txt").as_std_path(), b"inner").unwrap();

    let builder = PathBuilder::new(root.join("data"), Arc::new(NullSink));
    let ids = ids();
    let leaf = builder
        .ensure_path(&ids.category, &ids.line, &ids.visit, ids.exam)
        .unwrap();
    fs::write(leaf.join("stale.txt").as_std_path(), b"old").unwrap();
    fs::create_dir_all(leaf.join("b/old").as_std_path()).unwrap();

    let summary = builder.replace_contents(&leaf, &source).unwrap();

    assert_eq!(summary.removed, 2);
    assert_eq!(summary.files, 1);
    assert_eq!(summary.directories, 1);
    assert_eq!(top_level_names(&leaf), top_level_names(&source));
    assert!(!leaf.join("b/old").as_std_path().exists());
    assert_eq!(
        fs::read(leaf.join("b/inner.txt").as_std_path()).unwrap(),
        b"inner"
    );
}

#[test]
fn replace_contents_with_empty_source_clears_leaf() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = root.join("empty");
    fs::create_dir_all(source.as_std_path()).unwrap();
    let leaf = root.join("leaf");
    fs::create_dir_all(leaf.join("old").as_std_path()).unwrap();
    fs::write(leaf.join("old.txt").as_std_path(), b"old").unwrap();

    let builder = PathBuilder::new(root.clone(), Arc::new(NullSink));
    builder.replace_contents(&leaf, &source).unwrap();

    assert!(top_level_names(&leaf).is_empty());
}

#[test]
fn missing_source_leaves_leaf_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let leaf = root.join("leaf");
    fs::create_dir_all(leaf.as_std_path()).unwrap();
    fs::write(leaf.join("keep.txt").as_std_path(), b"keep").unwrap();
    let sink = Arc::new(RecordingSink::default());
    let builder = PathBuilder::new(root.clone(), sink.clone());

    let err = builder
        .replace_contents(&leaf, &root.join("does/not/exist"))
        .unwrap_err();

    assert_matches!(
        err,
        OrganizerError::InvalidSource {
            defect: SourceDefect::Missing,
            ..
        }
    );
    assert_eq!(top_level_names(&leaf), BTreeSet::from(["keep.txt".to_string()]));
    let events = sink.events.lock().unwrap();
    assert!(events.iter().any(|event| event.level == EventLevel::Error));
}

#[test]
fn file_source_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = root.join("file.txt");
    fs::write(source.as_std_path(), b"x").unwrap();
    let leaf = root.join("leaf");
    fs::create_dir_all(leaf.as_std_path()).unwrap();
    let builder = PathBuilder::new(root.clone(), Arc::new(NullSink));

    let err = builder.replace_contents(&leaf, &source).unwrap_err();
    assert_matches!(
        err,
        OrganizerError::InvalidSource {
            defect: SourceDefect::NotDirectory,
            ..
        }
    );
}

#[cfg(unix)]
#[test]
fn dangling_symlink_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let source = root.join("source");
    fs::create_dir_all(source.as_std_path()).unwrap();
    fs::write(source.join("a.txt").as_std_path(), b"a").unwrap();
    std::os::unix::fs::symlink(
        root.join("nowhere").as_std_path(),
        source.join("broken").as_std_path(),
    )
    .unwrap();
    let leaf = root.join("leaf");
    fs::create_dir_all(leaf.as_std_path()).unwrap();
    let builder = PathBuilder::new(root.clone(), Arc::new(NullSink));

    let summary = builder.replace_contents(&leaf, &source).unwrap();

    assert_eq!(summary.skipped, vec!["broken".to_string()]);
    assert_eq!(top_level_names(&leaf), BTreeSet::from(["a.txt".to_string()]));
}
