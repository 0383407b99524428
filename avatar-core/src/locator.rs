//! Result location: which file on disk is the output of a run.

use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateStrategy {
    /// The tool was told exactly where to write.
    Exact(PathBuf),
    /// The tool picks its own name inside `dir`; take the newest match.
    /// Equal timestamps are ordered by file name, greatest first.
    MostRecentByModificationTime { dir: PathBuf, pattern: String },
}

impl LocateStrategy {
    pub fn most_recent(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        LocateStrategy::MostRecentByModificationTime {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocateStrategy::Exact(_) => "exact",
            LocateStrategy::MostRecentByModificationTime { .. } => "most-recent",
        }
    }
}

pub fn locate(strategy: &LocateStrategy) -> Option<PathBuf> {
    match strategy {
        LocateStrategy::Exact(path) => path.is_file().then(|| path.clone()),
        LocateStrategy::MostRecentByModificationTime { dir, pattern } => most_recent(dir, pattern),
    }
}

fn most_recent(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let pattern = match Pattern::new(pattern) {
        Ok(p) => p,
        Err(e) => {
            warn!(pattern, error = %e, "invalid output glob");
            return None;
        }
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "output directory not readable");
            return None;
        }
    };

    let mut candidates: Vec<(SystemTime, String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !pattern.matches(&name) {
                return None;
            }
            let modified = meta.modified().ok()?;
            Some((modified, name, entry.path()))
        })
        .collect();

    // Newest first; ties by name, greatest first, so the listing order never matters.
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    candidates.into_iter().next().map(|(_, _, path)| path)
}
