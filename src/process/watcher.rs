use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::{launcher, Manager};

/// Minimum spacing between two watcher-triggered restarts.
const DEBOUNCE: Duration = Duration::from_secs(1);
/// Settle delay before firing, so the write that triggered us finishes.
const SETTLE: Duration = Duration::from_millis(100);

/// Always ignored, on top of the record's own patterns.
pub const DEFAULT_IGNORE: [&str; 12] = [
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    ".DS_Store",
    ".gopm2",
    "*.log",
    "*.tmp",
    "*.temp",
    "*.swp",
    "*.swo",
    "*~",
];

/// Combined ignore matcher. A path is ignored when its basename matches
/// any glob, or when any pattern appears as a substring of the full
/// path (so bare directory names like `node_modules` prune whole
/// subtrees).
pub struct IgnoreSet {
    globs: GlobSet,
    patterns: Vec<String>,
}

impl IgnoreSet {
    pub fn new(user_patterns: &[String]) -> Self {
        let mut patterns: Vec<String> = DEFAULT_IGNORE.iter().map(|p| p.to_string()).collect();
        patterns.extend(user_patterns.iter().cloned());

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => log::warn!("invalid watch ignore pattern '{pattern}': {err}"),
            }
        }
        let globs = builder.build().unwrap_or_else(|_| GlobSet::empty());

        Self { globs, patterns }
    }

    pub fn matches(&self, path: &Path) -> bool {
        if let Some(basename) = path.file_name() {
            if self.globs.is_match(Path::new(basename)) {
                return true;
            }
        }

        let full = path.to_string_lossy();
        self.patterns.iter().any(|p| full.contains(p.as_str()))
    }
}

/// Spawn a file watcher for one record. Returns the stop sender; a
/// try_send on it (or dropping all senders) ends the task. Restarts
/// run in a fresh task so no record lock is held across them.
pub fn spawn(
    manager: Arc<Manager>,
    id: usize,
    name: String,
    cwd: PathBuf,
    log_file: PathBuf,
    ignore_patterns: Vec<String>,
) -> mpsc::Sender<()> {
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        let ignore = IgnoreSet::new(&ignore_patterns);
        let (event_tx, mut event_rx) = mpsc::channel::<PathBuf>(64);

        let mut watcher =
            match notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                if let Ok(event) = result {
                    if event.kind.is_modify() || event.kind.is_create() {
                        for path in event.paths {
                            let _ = event_tx.blocking_send(path);
                        }
                    }
                }
            }) {
                Ok(watcher) => watcher,
                Err(err) => {
                    log::warn!("failed to create file watcher for '{name}': {err}");
                    return;
                }
            };

        if let Err(err) = add_directories(&mut watcher, &cwd, &ignore) {
            log::warn!("failed to watch {} for '{name}': {err}", cwd.display());
            return;
        }
        log::info!("watching {} for '{name}'", cwd.display());

        let mut last_fired: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    log::debug!("file watcher for '{name}' stopped");
                    return;
                }

                event = event_rx.recv() => {
                    let Some(path) = event else { return };

                    if ignore.matches(&path) {
                        continue;
                    }
                    if let Some(last) = last_fired {
                        if last.elapsed() < DEBOUNCE {
                            continue;
                        }
                    }
                    last_fired = Some(Instant::now());

                    tokio::time::sleep(SETTLE).await;
                    launcher::append_event(
                        &log_file,
                        &format!("file change detected: {}, restarting", path.display()),
                    );
                    log::info!("file change for '{name}': {}", path.display());

                    let manager = manager.clone();
                    tokio::spawn(async move {
                        if let Err(err) = manager.restart_if_online(id).await {
                            log::warn!("watch restart failed for process {id}: {err}");
                        }
                    });
                }
            }
        }
    });

    stop_tx
}

/// Walk the tree, adding each non-ignored directory to the watcher.
/// Ignored directories are pruned entirely.
fn add_directories(
    watcher: &mut RecommendedWatcher,
    dir: &Path,
    ignore: &IgnoreSet,
) -> notify::Result<()> {
    if ignore.matches(dir) {
        return Ok(());
    }

    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let _ = add_directories(watcher, &path, ignore);
            }
        }
    }

    Ok(())
}
