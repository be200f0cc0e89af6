//! Input file watching for `bb-cli watch`.
//!
//! The parent directory of every input file is watched rather than the file
//! itself: editors replace files by renaming, and a list that does not exist
//! yet must still be noticed once it is created. Bursts are not collapsed
//! here, the update trigger already does that.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
struct WatchedFile {
    dir: PathBuf,
    name: OsString,
}

/// Files whose changes matter, keyed by directory and file name.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    files: Vec<WatchedFile>,
}

impl WatchSet {
    pub fn new(paths: &[PathBuf]) -> Self {
        let mut files = Vec::new();
        for path in paths {
            let Some(name) = path.file_name() else {
                log::warn!("Not watching '{}': no file name", path.display());
                continue;
            };
            let file = WatchedFile {
                dir: normalize_dir(path.parent()),
                name: name.to_os_string(),
            };
            if !files.contains(&file) {
                files.push(file);
            }
        }
        Self { files }
    }

    /// Directories to register, without duplicates, in input order.
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for file in &self.files {
            if !dirs.contains(&file.dir) {
                dirs.push(file.dir.clone());
            }
        }
        dirs
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// True when `event` touches one of the watched files. Reads are ignored.
    pub fn is_relevant(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.iter().any(|path| self.contains(path))
    }

    fn contains(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let dir = normalize_dir(path.parent());
        self.files.iter().any(|file| file.name.as_os_str() == name && file.dir == dir)
    }
}

fn normalize_dir(dir: Option<&Path>) -> PathBuf {
    let dir = match dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// A running watcher that reports changes to a [`WatchSet`].
pub struct InputWatcher {
    _watcher: RecommendedWatcher,
    changes: mpsc::Receiver<()>,
}

impl InputWatcher {
    pub fn start(paths: &[PathBuf]) -> Result<Self, String> {
        let set = WatchSet::new(paths);
        let dirs = set.directories();
        log::info!("Watching {} files in {} directories", set.file_count(), dirs.len());

        // One slot: a queued change already covers every later one.
        let (tx, changes) = mpsc::channel(1);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if set.is_relevant(&event) => {
                log::debug!("Input changed: {:?} {:?}", event.kind, event.paths);
                let _ = tx.try_send(());
            }
            Ok(_) => {}
            Err(e) => log::warn!("File watcher error: {}", e),
        })
        .map_err(|e| format!("Failed to create file watcher: {}", e))?;

        for dir in &dirs {
            if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                log::warn!("Not watching '{}': {}", dir.display(), e);
            }
        }

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// Waits for the next change. `None` once the watcher has shut down.
    pub async fn changed(&mut self) -> Option<()> {
        self.changes.recv().await
    }
}
