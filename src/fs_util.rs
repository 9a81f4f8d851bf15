use std::fs::{self, File, FileTimes};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;

use crate::error::OrganizerError;

/// What a directory entry resolves to once symlinks are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Neither a regular file nor a directory, e.g. a dangling symlink.
    Other,
}

pub fn entry_kind(path: &Path) -> EntryKind {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => EntryKind::Directory,
        Ok(meta) if meta.is_file() => EntryKind::File,
        _ => EntryKind::Other,
    }
}

/// Direct children of `dir`, sorted by file name.
pub fn list_children(dir: &Path) -> Result<Vec<PathBuf>, OrganizerError> {
    let entries = fs::read_dir(dir).map_err(fs_error("read directory", dir))?;
    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(fs_error("read directory", dir))?;
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}

/// Removes every direct child of `dir`, leaving `dir` itself in place.
///
/// Symlinks are unlinked rather than followed, so a link to a directory
/// never takes the target's contents with it.
pub fn clear_dir(dir: &Path) -> Result<usize, OrganizerError> {
    let children = list_children(dir)?;
    for child in &children {
        let meta = fs::symlink_metadata(child).map_err(fs_error("inspect", child))?;
        if meta.is_dir() {
            fs::remove_dir_all(child).map_err(fs_error("remove directory", child))?;
        } else {
            fs::remove_file(child).map_err(fs_error("remove file", child))?;
        }
    }
    Ok(children.len())
}

/// Copies one file, carrying over permissions and access/modification times.
pub fn copy_file_preserving_times(source: &Path, dest: &Path) -> Result<(), OrganizerError> {
    let meta = fs::metadata(source).map_err(fs_error("inspect", source))?;
    let mut reader = File::open(source).map_err(fs_error("open", source))?;
    let mut writer = File::create(dest).map_err(fs_error("create", dest))?;
    io::copy(&mut reader, &mut writer).map_err(fs_error("copy into", dest))?;

    let mut times = FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    writer
        .set_times(times)
        .map_err(fs_error("set times on", dest))?;
    drop(writer);

    fs::set_permissions(dest, meta.permissions()).map_err(fs_error("set permissions on", dest))?;
    Ok(())
}

/// Recursively copies `source` to `dest`, creating `dest` if needed.
///
/// Returns the paths (relative to `source`) that were skipped because they
/// resolved to neither a file nor a directory.
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<Vec<PathBuf>, OrganizerError> {
    fs::create_dir_all(dest).map_err(fs_error("create directory", dest))?;
    let mut skipped = Vec::new();
    let mut directories = vec![(source.to_path_buf(), dest.to_path_buf())];
    for entry in walk_dir(source)? {
        let relative = entry
            .strip_prefix(source)
            .map_err(|err| OrganizerError::Filesystem(format!("{}: {err}", entry.display())))?;
        let target = dest.join(relative);
        match entry_kind(&entry) {
            EntryKind::Directory => {
                fs::create_dir_all(&target).map_err(fs_error("create directory", &target))?;
                directories.push((entry.clone(), target));
            }
            EntryKind::File => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(fs_error("create directory", parent))?;
                }
                copy_file_preserving_times(&entry, &target)?;
            }
            EntryKind::Other => skipped.push(relative.to_path_buf()),
        }
    }
    // Deepest first; filling a directory resets its modification time.
    for (from, to) in directories.iter().rev() {
        copy_dir_modified(from, to)?;
    }
    Ok(skipped)
}

#[cfg(unix)]
fn copy_dir_modified(source: &Path, dest: &Path) -> Result<(), OrganizerError> {
    let meta = fs::metadata(source).map_err(fs_error("inspect", source))?;
    let Ok(modified) = meta.modified() else {
        return Ok(());
    };
    File::open(dest)
        .and_then(|dir| dir.set_times(FileTimes::new().set_modified(modified)))
        .map_err(fs_error("set times on", dest))
}

// Directories cannot be opened as plain files here.
#[cfg(not(unix))]
fn copy_dir_modified(_source: &Path, _dest: &Path) -> Result<(), OrganizerError> {
    Ok(())
}

/// Replaces `path` with `content` through a temp file in the same directory.
///
/// An existing file keeps its permissions. A new file gets the same mode a
/// plain create would, i.e. 0o666 less the umask.
pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), OrganizerError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(fs_error("create directory", parent))?;
    let mut builder = Builder::new();
    builder.prefix(".acq-org-write");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut temp = builder
        .tempfile_in(parent)
        .map_err(fs_error("create temp file in", parent))?;
    temp.write_all(content)
        .map_err(fs_error("write temp file for", path))?;
    if let Ok(existing) = fs::metadata(path) {
        temp.as_file()
            .set_permissions(existing.permissions())
            .map_err(fs_error("set permissions for", path))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(fs_error("sync temp file for", path))?;
    temp.persist(path)
        .map_err(|err| OrganizerError::Filesystem(format!("persist {}: {err}", path.display())))?;
    Ok(())
}

// Parents are yielded before their children.
fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, OrganizerError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        for child in list_children(&path)? {
            if entry_kind(&child) == EntryKind::Directory {
                stack.push(child.clone());
            }
            items.push(child);
        }
    }
    Ok(items)
}

pub(crate) fn fs_error<'a>(
    action: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> OrganizerError + 'a {
    move |err| OrganizerError::Filesystem(format!("{action} {}: {err}", path.display()))
}
