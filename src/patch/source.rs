// ABOUTME: In-memory snapshot of an application repository.
// ABOUTME: Loaded with walkdir, skipping VCS and dependency directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::error::PatchError;

/// Directories never shipped or rewritten.
pub const SKIP_DIRS: &[&str] = &[".git", "node_modules", "venv", ".venv", "__pycache__"];

/// Files keyed by path relative to the repository root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTree {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl SourceTree {
    pub fn load(root: &Path) -> Result<Self, PatchError> {
        let mut files = BTreeMap::new();

        let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name)))
        });

        for entry in walker {
            let entry = entry.map_err(|e| PatchError::Load {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| PatchError::Load {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                })?
                .to_path_buf();
            let content = std::fs::read(entry.path()).map_err(|e| PatchError::Load {
                path: entry.path().to_path_buf(),
                reason: e.to_string(),
            })?;
            files.insert(relative, content);
        }

        tracing::debug!("loaded {} files from {}", files.len(), root.display());
        Ok(Self { files })
    }

    pub fn from_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<Vec<u8>>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(p, c)| (p.into(), c.into()))
                .collect(),
        }
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    /// UTF-8 content, or `None` for missing or binary files.
    pub fn text(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.get(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_path(), c.as_slice()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every file under `dir`, creating parents.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        for (path, content) in &self.files {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, content)?;
        }
        Ok(())
    }
}
