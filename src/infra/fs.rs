//! Filepath: src/infra/fs.rs
//! Disk-backed content source and atomic commit of computed changes.
//!
//! Patch paths are relative to a root directory; absolute paths and
//! `..` components are rejected. Commits re-check each file's content
//! ID before touching anything, then write through same-directory
//! temp files.

use std::{
    fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::core::apply::{ContentSource, FileChange, content_id};

/// Reads files below `root`
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a patch path onto the root, refusing escapes
    pub fn resolve(&self, rel: &str) -> io::Result<PathBuf> {
        let rel_path = Path::new(rel);
        let escapes = rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if rel.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path `{rel}` must be relative and stay inside the root"),
            ));
        }
        Ok(self.root.join(rel_path))
    }
}

impl ContentSource for FsSource {
    fn load(&self, path: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.resolve(path)?) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// What a commit did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Persist `changes` below the source root.
///
/// Every expected content ID is verified first; if any file changed
/// since it was read, nothing is written.
pub fn commit(source: &FsSource, changes: &[FileChange]) -> Result<CommitSummary> {
    let mut planned = Vec::with_capacity(changes.len());
    for change in changes {
        let path = source
            .resolve(change.path())
            .with_context(|| format!("invalid patch path {}", change.path()))?;
        let expected = match change {
            FileChange::Write { expected, .. } | FileChange::Remove { expected, .. } => expected,
        };
        let current = match fs::read_to_string(&path) {
            Ok(s) => Some(content_id(&s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        if &current != expected {
            bail!("{} changed on disk since the patch was computed", path.display());
        }
        planned.push((path, change));
    }

    let mut summary = CommitSummary::default();
    for (path, change) in planned {
        match change {
            FileChange::Write { content, .. } => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                write_atomic(&path, content.as_bytes()).with_context(|| format!("Failed to write {}", path.display()))?;
                debug!(path = %path.display(), "written");
                summary.written.push(path);
            }
            FileChange::Remove { .. } => {
                fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
                debug!(path = %path.display(), "removed");
                summary.removed.push(path);
            }
        }
    }

    info!(written = summary.written.len(), removed = summary.removed.len(), "changes committed");
    Ok(summary)
}

/// Write via a same-directory temp file and rename over the target
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Preserve original permissions
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = tempfile::NamedTempFile::new_in(dir).context("create temp file")?;
    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    tmp.persist(path).map_err(|e| e.error).context("rename temp file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reports_missing_files_as_absent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.txt"), "hi\n")?;
        let src = FsSource::new(dir.path());
        assert_eq!(src.load("a.txt")?, Some("hi\n".to_string()));
        assert_eq!(src.load("b.txt")?, None);
        assert!(src.load("../escape.txt").is_err());
        assert!(src.load("/etc/passwd").is_err());
        Ok(())
    }

    #[test]
    fn commit_writes_and_removes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("old.txt"), "old\n")?;
        let src = FsSource::new(dir.path());

        let changes = vec![
            FileChange::Remove {
                path: "old.txt".into(),
                expected: Some(content_id("old\n")),
            },
            FileChange::Write {
                path: "nested/new.txt".into(),
                content: "new\n".into(),
                expected: None,
            },
        ];
        let summary = commit(&src, &changes)?;
        assert_eq!(summary.written.len(), 1);
        assert!(!dir.path().join("old.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("nested/new.txt"))?, "new\n");
        Ok(())
    }

    #[test]
    fn stale_expectations_abort_the_whole_commit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.txt"), "edited elsewhere\n")?;
        let src = FsSource::new(dir.path());

        let changes = vec![
            FileChange::Write {
                path: "b.txt".into(),
                content: "b\n".into(),
                expected: None,
            },
            FileChange::Write {
                path: "a.txt".into(),
                content: "mine\n".into(),
                expected: Some(content_id("original\n")),
            },
        ];
        assert!(commit(&src, &changes).is_err());
        assert!(!dir.path().join("b.txt").exists());
        Ok(())
    }
}
