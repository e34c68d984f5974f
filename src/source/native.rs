use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::task;
use walkdir::WalkDir;

use super::{RemoteEntry, SourceError};

/// Local directory tree served as an account. File ids are absolute paths.
#[derive(Clone)]
pub struct NativeDrive {
    excludes: Arc<GlobSet>,
}

impl Default for NativeDrive {
    fn default() -> Self {
        Self { excludes: Arc::new(GlobSet::empty()) }
    }
}

impl NativeDrive {
    pub fn new(patterns: &[String]) -> Result<Self, globset::Error> {
        Ok(Self { excludes: Arc::new(build_globset(patterns)?) })
    }

    /// Immediate children of `folder_id`, which must lie under `root`.
    ///
    /// Dotfiles and excluded paths are skipped.
    pub async fn list_children(&self, root: &str, folder_id: &str) -> Result<Vec<RemoteEntry>, SourceError> {
        let folder = contained_path(root, folder_id)?;
        let excludes = self.excludes.clone();
        task::spawn_blocking(move || read_folder(&folder, &excludes))
            .await
            .map_err(|e| SourceError::Unavailable(format!("directory listing task failed: {}", e)))?
    }

    /// Local path of a file under `root`.
    pub fn local_path(&self, root: &str, file_id: &str) -> Result<PathBuf, SourceError> {
        let path = contained_path(root, file_id)?;
        if matches_excludes(&path, &self.excludes) || !path.is_file() {
            return Err(SourceError::NotFound(file_id.to_string()));
        }
        Ok(path)
    }
}

fn read_folder(folder: &Path, excludes: &GlobSet) -> Result<Vec<RemoteEntry>, SourceError> {
    if !folder.is_dir() {
        return Err(SourceError::NotFound(folder.to_string_lossy().into_owned()));
    }

    let mut out = Vec::new();
    let walker = WalkDir::new(folder).min_depth(1).max_depth(1).follow_links(false);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                if e.depth() == 0 {
                    return Err(SourceError::Unavailable(e.to_string()));
                }
                tracing::debug!("skipping unreadable entry in {}: {}", folder.display(), e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || matches_excludes(entry.path(), excludes) {
            continue;
        }
        let md = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !md.is_dir() && !md.is_file() {
            continue;
        }
        out.push(RemoteEntry {
            id: entry.path().to_string_lossy().into_owned(),
            name,
            is_folder: md.is_dir(),
            size: if md.is_file() { md.len() } else { 0 },
            modified_at: md.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    Ok(out)
}

/// Resolves `id` and refuses anything that escapes `root`.
fn contained_path(root: &str, id: &str) -> Result<PathBuf, SourceError> {
    let path = PathBuf::from(id);
    let escapes = path.components().any(|c| matches!(c, Component::ParentDir));
    if escapes || !path.starts_with(Path::new(root)) {
        return Err(SourceError::NotFound(id.to_string()));
    }
    Ok(path)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        b.add(Glob::new(&p.trim().replace('\\', "/"))?);
    }
    b.build()
}

fn matches_excludes(path: &Path, set: &GlobSet) -> bool {
    if set.is_empty() {
        return false;
    }
    set.is_match(path.to_string_lossy().replace('\\', "/"))
}
