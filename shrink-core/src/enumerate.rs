use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::domain::FileTask;
use crate::error::{ErrorKind, Result, ShrinkError};

/// A directory entry that could not be listed or stat'd.
#[derive(Clone, Debug)]
pub struct EnumerationError {
    pub path: Option<PathBuf>,
    pub detail: String,
}

impl EnumerationError {
    pub const KIND: ErrorKind = ErrorKind::EnumerationError;
}

#[derive(Clone, Debug)]
pub enum Discovered {
    Task(FileTask),
    /// A regular file that does not match the target extensions.
    Other(FileTask),
    Error(EnumerationError),
}

#[derive(Clone, Debug, Default)]
pub struct Enumeration {
    pub tasks: Vec<FileTask>,
    pub others: Vec<FileTask>,
    pub errors: Vec<EnumerationError>,
}

/// Walks the source tree and mirrors every path onto the output root.
/// `scan` orders tasks lexicographically by relative path.
#[derive(Clone, Debug)]
pub struct FileEnumerator {
    source_root: PathBuf,
    output_root: PathBuf,
    extensions: Vec<String>,
}

impl FileEnumerator {
    pub fn new(source_root: &Path, output_root: &Path, extensions: &[String]) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }

    fn is_output_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && entry.depth() > 0 && entry.path() == self.output_root
    }

    fn task_for(&self, path: &Path) -> Option<FileTask> {
        let rel = path.strip_prefix(&self.source_root).ok()?;
        let relative_path = rel_key(rel)?;
        Some(FileTask {
            relative_path,
            source: path.to_path_buf(),
            output: self.output_root.join(rel),
        })
    }

    /// Lazy walk, name-sorted within each directory. Re-running it over an
    /// unchanged tree yields the same order.
    pub fn iter(&self) -> impl Iterator<Item = Discovered> + '_ {
        WalkDir::new(&self.source_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| !self.is_output_dir(e))
            .filter_map(move |entry| match entry {
                Err(e) => {
                    let err = EnumerationError {
                        path: e.path().map(Path::to_path_buf),
                        detail: e.to_string(),
                    };
                    warn!(path = ?err.path, error = %err.detail, kind = %EnumerationError::KIND, "skipping unreadable entry");
                    Some(Discovered::Error(err))
                }
                Ok(e) if e.file_type().is_file() => {
                    let path = e.path();
                    match self.task_for(path) {
                        Some(t) if self.matches(path) => Some(Discovered::Task(t)),
                        Some(t) => Some(Discovered::Other(t)),
                        None => Some(Discovered::Error(EnumerationError {
                            path: Some(path.to_path_buf()),
                            detail: "path is not valid UTF-8 or escapes the source root"
                                .to_string(),
                        })),
                    }
                }
                // directories and symlinks are not work items
                Ok(_) => None,
            })
    }

    /// Drain the walk once so the driver has a stable total.
    pub fn scan(&self) -> Result<Enumeration> {
        if !self.source_root.is_dir() {
            return Err(ShrinkError::SourceRoot(self.source_root.clone()));
        }
        let mut out = Enumeration::default();
        for d in self.iter() {
            match d {
                Discovered::Task(t) => out.tasks.push(t),
                Discovered::Other(t) => out.others.push(t),
                Discovered::Error(e) => out.errors.push(e),
            }
        }
        out.tasks.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        out.others.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        debug!(
            tasks = out.tasks.len(),
            others = out.others.len(),
            errors = out.errors.len(),
            "enumeration complete"
        );
        Ok(out)
    }
}

fn rel_key(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
