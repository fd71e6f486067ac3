//! # Cache Module
//!
//! Every file the engine writes is named `<prefix>_<token>.<ext>`. That
//! namespace belongs to the engine alone, which is what makes it safe to
//! delete collisions on export and to prune the directory on request.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::OutputConfig;

/// Process-wide sequence so two names minted in the same millisecond differ
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Mints unique artifact paths under the reserved prefix
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    prefix: String,
}

impl ArtifactNamer {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Fresh `<prefix>_<millis>_<seq>.<extension>` inside `dir`
    pub fn next_path(&self, dir: &Path, extension: &str) -> PathBuf {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let token = format!("{}_{}", Utc::now().timestamp_millis(), seq);
        dir.join(format!("{}_{}.{}", self.prefix, token, extension))
    }
}

/// Finds and prunes artifacts written by the engine
#[derive(Debug, Clone)]
pub struct CacheManager {
    prefix: String,
    extensions: Vec<String>,
}

impl CacheManager {
    pub fn new<S: Into<String>>(prefix: S, extensions: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(
            output.prefix.clone(),
            &[output.video_extension.as_str(), output.image_extension.as_str()],
        )
    }

    /// Whether `path` names a file in the engine's namespace
    pub fn is_artifact(&self, path: &Path) -> bool {
        let name_matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(self.prefix.as_str()))
            .map(|rest| rest.starts_with('_'))
            .unwrap_or(false);

        let extension_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
            .unwrap_or(false);

        name_matches && extension_matches
    }

    /// Artifacts directly inside `dir`; unreadable directories yield nothing
    pub fn artifacts(&self, dir: &Path) -> Vec<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping cache directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| self.is_artifact(path))
            .collect();

        found.sort();
        found
    }

    /// Delete every artifact in `directories`.
    ///
    /// Best-effort: individual failures are logged and skipped. Returns the
    /// number of files removed.
    pub fn clear<P: AsRef<Path>>(&self, directories: &[P]) -> usize {
        let mut removed = 0;

        for dir in directories {
            for path in self.artifacts(dir.as_ref()) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Could not remove cached file {}: {}", path.display(), e),
                }
            }
        }

        info!("Cleared {} cached artifacts", removed);
        removed
    }
}
