pub mod dump;
pub mod launcher;
pub mod registry;
pub mod stats;
pub mod supervisor;
pub mod watcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::config::{AppSpec, DEFAULT_MAX_RESTARTS, DEFAULT_MIN_UPTIME};
use crate::error::{Error, Result};
use crate::globals::Paths;
use crate::helpers;
use registry::{Registry, SharedRecord};

/// Grace window between SIGTERM and SIGKILL during a stop.
pub const STOP_GRACE: Duration = Duration::from_secs(5);
/// Pause between stop and start on an explicit restart, so port-bound
/// children release their sockets before the replacement binds.
pub const RESTART_PAUSE: Duration = Duration::from_millis(500);
/// Delay before relaunching previously-live records after a daemon restart.
pub const RECOVERY_DELAY: Duration = Duration::from_secs(2);
/// Log files larger than this are renamed aside on the periodic timer.
pub const LOG_ROTATE_SIZE: u64 = 10 * 1024 * 1024;

pub type Env = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stopped,
    Online,
    Stopping,
    Errored,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Stopped => "stopped",
            Status::Online => "online",
            Status::Stopping => "stopping",
            Status::Errored => "errored",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    Fork,
    Cluster,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecMode::Fork => f.write_str("fork"),
            ExecMode::Cluster => f.write_str("cluster"),
        }
    }
}

/// Live handles attached to a record while it is supervised. Never
/// serialized; reconstructed on daemon restart.
#[derive(Default)]
pub struct Handles {
    /// Flips to true when the supervisor task observes the child exit.
    pub exit_rx: Option<watch::Receiver<bool>>,
    /// One-shot stop signal for the file watcher; try_send, drop if full.
    pub watcher_tx: Option<tokio::sync::mpsc::Sender<()>>,
    /// Parent-side copies of the child's log files, closed on stop.
    pub stdout_log: Option<fs::File>,
    pub stderr_log: Option<fs::File>,
}

impl fmt::Debug for Handles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handles")
            .field("exit_rx", &self.exit_rx.is_some())
            .field("watcher_tx", &self.watcher_tx.is_some())
            .finish()
    }
}

/// The unit of supervision: spec fields plus runtime state. Persistent
/// fields round-trip through the snapshot; handles are skipped.
#[derive(Debug, Serialize, Deserialize)]
pub struct Process {
    pub id: usize,
    pub name: String,
    pub script: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: PathBuf,
    #[serde(default)]
    pub env: Env,
    pub exec_mode: ExecMode,
    pub instances: usize,
    pub status: Status,
    pub pid: i64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    pub restarts: u64,
    pub log_file: PathBuf,
    pub error_log_file: PathBuf,
    #[serde(default)]
    pub watch: bool,
    #[serde(default)]
    pub watch_ignore: Vec<String>,
    pub max_restarts: u64,
    #[serde(with = "crate::helpers::duration")]
    pub min_uptime: Duration,
    #[serde(skip)]
    pub handles: Handles,
}

/// One row of `list` output; also the LIST response payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessItem {
    pub id: usize,
    pub name: String,
    pub status: Status,
    pub pid: i64,
    pub restarts: u64,
    pub watch: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub cpu_pct: f64,
    pub rss_bytes: u64,
    pub uptime_secs: u64,
}

/// Full record view for `describe`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessDetail {
    pub id: usize,
    pub name: String,
    pub script: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Env,
    pub exec_mode: ExecMode,
    pub instances: usize,
    pub status: Status,
    pub pid: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub restarts: u64,
    pub max_restarts: u64,
    pub min_uptime: String,
    pub watch: bool,
    pub watch_ignore: Vec<String>,
    pub log_file: PathBuf,
    pub error_log_file: PathBuf,
    pub cpu_pct: f64,
    pub rss_bytes: u64,
    pub uptime_secs: u64,
}

/// The daemon-side process manager: registry, lifecycle operations and
/// snapshot persistence. One instance per daemon, shared by the control
/// channel handlers and every supervision task.
pub struct Manager {
    paths: Paths,
    registry: RwLock<Registry>,
    // Handle to ourselves for the tasks we spawn.
    me: Weak<Manager>,
}

impl Manager {
    pub fn new(paths: Paths) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            paths,
            registry: RwLock::new(Registry::new()),
            me: me.clone(),
        })
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    fn arc(&self) -> Arc<Manager> {
        // &self can only come from a live Arc.
        self.me.upgrade().expect("manager dropped")
    }

    /// Create and launch records for one app spec. Cluster mode with
    /// N > 1 expands into N sibling records (`name-0` .. `name-(N-1)`),
    /// each carrying `INSTANCE_ID` in its environment.
    pub async fn start_app(&self, spec: AppSpec) -> Result<Vec<(usize, String)>> {
        if spec.name.is_empty() {
            return Err(Error::ConfigInvalid("name must not be empty".to_string()));
        }
        if spec.script.is_empty() {
            return Err(Error::ConfigInvalid("script must not be empty".to_string()));
        }

        let exec_mode = match spec.exec_mode.as_str() {
            "" | "fork" => ExecMode::Fork,
            "cluster" => ExecMode::Cluster,
            other => {
                return Err(Error::ConfigInvalid(format!(
                    "unsupported exec_mode: {other}"
                )))
            }
        };

        let min_uptime = match &spec.min_uptime {
            Some(raw) => helpers::duration::parse(raw).map_err(Error::ConfigInvalid)?,
            None => helpers::duration::parse(DEFAULT_MIN_UPTIME).unwrap(),
        };

        let cwd = match &spec.cwd {
            Some(cwd) if cwd.is_absolute() => cwd.clone(),
            Some(cwd) => std::env::current_dir()?.join(cwd),
            None => std::env::current_dir()?,
        };

        // Only cluster mode fans out; fork always spawns one child.
        let cluster = exec_mode == ExecMode::Cluster;
        let instances = if cluster { spec.instances.max(1) } else { 1 };
        let max_restarts = match spec.max_restarts {
            0 => DEFAULT_MAX_RESTARTS,
            n => n,
        };

        let mut started = Vec::new();
        let mut registry = self.registry.write().await;

        for index in 0..instances {
            let name = if cluster && instances > 1 {
                format!("{}-{index}", spec.name)
            } else {
                spec.name.clone()
            };

            if registry.name_in_use(&name).await {
                self.save_registry(&registry).await;
                return Err(Error::NameConflict(name));
            }

            let mut env = spec.env.clone();
            if cluster {
                env.insert("INSTANCE_ID".to_string(), index.to_string());
            }

            let log_file = spec
                .log_file
                .clone()
                .unwrap_or_else(|| self.paths.default_log(&name));
            let error_log_file = spec
                .error_log_file
                .clone()
                .unwrap_or_else(|| self.paths.default_error_log(&name));

            let record = registry.insert(|id| Process {
                id,
                name: name.clone(),
                script: spec.script.clone(),
                args: spec.args.clone(),
                cwd: cwd.clone(),
                env,
                exec_mode,
                instances: 1,
                status: Status::Stopped,
                pid: 0,
                start_time: None,
                restarts: 0,
                log_file,
                error_log_file,
                watch: spec.watch,
                watch_ignore: spec.watch_ignore.clone(),
                max_restarts,
                min_uptime,
                handles: Handles::default(),
            });

            match self.start_record(&record).await {
                Ok(()) => {
                    let id = record.lock().await.id;
                    started.push((id, name));
                }
                Err(err) => {
                    // The record stays in the registry as Errored so the
                    // user can inspect it with `describe`.
                    self.save_registry(&registry).await;
                    return Err(err);
                }
            }
        }

        self.save_registry(&registry).await;
        Ok(started)
    }

    pub async fn stop(&self, target: &str) -> Result<String> {
        let registry = self.registry.write().await;
        let record = registry
            .lookup(target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        let name = self.stop_record(&record).await?;
        self.save_registry(&registry).await;
        Ok(format!("stopped '{name}'"))
    }

    pub async fn restart(&self, target: &str) -> Result<String> {
        let registry = self.registry.write().await;
        let record = registry
            .lookup(target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        let was_online = record.lock().await.status == Status::Online;
        if was_online {
            self.stop_record(&record).await?;
            tokio::time::sleep(RESTART_PAUSE).await;
        }

        if let Err(err) = self.start_record(&record).await {
            self.save_registry(&registry).await;
            return Err(err);
        }

        let name = {
            let mut process = record.lock().await;
            process.restarts += 1;
            process.name.clone()
        };

        self.save_registry(&registry).await;
        Ok(format!("restarted '{name}'"))
    }

    /// Watcher-triggered restart: a no-op unless the record is Online,
    /// so a stop racing a file event does not revive the child.
    pub async fn restart_if_online(&self, id: usize) -> Result<()> {
        let registry = self.registry.write().await;
        let Some(record) = registry.get(id) else {
            return Ok(());
        };

        if record.lock().await.status != Status::Online {
            return Ok(());
        }

        self.stop_record(&record).await?;
        tokio::time::sleep(RESTART_PAUSE).await;
        self.start_record(&record).await?;
        record.lock().await.restarts += 1;

        self.save_registry(&registry).await;
        Ok(())
    }

    pub async fn delete(&self, target: &str) -> Result<String> {
        let mut registry = self.registry.write().await;
        let record = registry
            .lookup(target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        let (id, name, online) = {
            let process = record.lock().await;
            (
                process.id,
                process.name.clone(),
                process.status == Status::Online,
            )
        };

        if online {
            self.stop_record(&record).await?;
        }

        registry.remove(id);
        let _ = fs::remove_file(self.paths.pid_file(&name));
        self.save_registry(&registry).await;
        Ok(format!("deleted '{name}'"))
    }

    /// Summaries for every record. Stats are sampled after all locks
    /// are released.
    pub async fn list(&self) -> Vec<ProcessItem> {
        let mut items = Vec::new();
        {
            let registry = self.registry.read().await;
            for (_, record) in registry.records() {
                let process = record.lock().await;
                items.push(ProcessItem {
                    id: process.id,
                    name: process.name.clone(),
                    status: process.status,
                    pid: process.pid,
                    restarts: process.restarts,
                    watch: process.watch,
                    start_time: process.start_time,
                    cpu_pct: 0.0,
                    rss_bytes: 0,
                    uptime_secs: 0,
                });
            }
        }

        for item in &mut items {
            if item.status == Status::Online && item.pid > 0 {
                let sample = stats::sample(item.pid);
                item.cpu_pct = sample.cpu_pct;
                item.rss_bytes = sample.rss_bytes;
                item.uptime_secs = item
                    .start_time
                    .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
                    .unwrap_or(0);
            }
        }

        items
    }

    pub async fn describe(&self, target: &str) -> Result<ProcessDetail> {
        let mut detail = {
            let registry = self.registry.read().await;
            let record = registry
                .lookup(target)
                .await
                .ok_or_else(|| Error::NotFound(target.to_string()))?;
            let process = record.lock().await;
            ProcessDetail {
                id: process.id,
                name: process.name.clone(),
                script: process.script.clone(),
                args: process.args.clone(),
                cwd: process.cwd.clone(),
                env: process.env.clone(),
                exec_mode: process.exec_mode,
                instances: process.instances,
                status: process.status,
                pid: process.pid,
                start_time: process.start_time,
                restarts: process.restarts,
                max_restarts: process.max_restarts,
                min_uptime: helpers::duration::format(process.min_uptime),
                watch: process.watch,
                watch_ignore: process.watch_ignore.clone(),
                log_file: process.log_file.clone(),
                error_log_file: process.error_log_file.clone(),
                cpu_pct: 0.0,
                rss_bytes: 0,
                uptime_secs: 0,
            }
        };

        if detail.status == Status::Online && detail.pid > 0 {
            let sample = stats::sample(detail.pid);
            detail.cpu_pct = sample.cpu_pct;
            detail.rss_bytes = sample.rss_bytes;
            detail.uptime_secs = detail
                .start_time
                .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
                .unwrap_or(0);
        }

        Ok(detail)
    }

    pub async fn watch_enable(&self, target: &str) -> Result<String> {
        let registry = self.registry.write().await;
        let record = registry
            .lookup(target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        {
            let mut process = record.lock().await;
            if process.watch {
                return Err(Error::InvalidState {
                    name: process.name.clone(),
                    status: "already watched".to_string(),
                    action: "enable watch".to_string(),
                });
            }
            process.watch = true;
            if process.status == Status::Online {
                let stop_tx = watcher::spawn(
                    self.arc(),
                    process.id,
                    process.name.clone(),
                    process.cwd.clone(),
                    process.log_file.clone(),
                    process.watch_ignore.clone(),
                );
                process.handles.watcher_tx = Some(stop_tx);
            }
        }

        let name = record.lock().await.name.clone();
        self.save_registry(&registry).await;
        Ok(format!("enabled watch for '{name}'"))
    }

    pub async fn watch_disable(&self, target: &str) -> Result<String> {
        let registry = self.registry.write().await;
        let record = registry
            .lookup(target)
            .await
            .ok_or_else(|| Error::NotFound(target.to_string()))?;

        let name = {
            let mut process = record.lock().await;
            if !process.watch {
                return Err(Error::InvalidState {
                    name: process.name.clone(),
                    status: "not watched".to_string(),
                    action: "disable watch".to_string(),
                });
            }
            process.watch = false;
            if let Some(stop_tx) = process.handles.watcher_tx.take() {
                let _ = stop_tx.try_send(());
            }
            process.name.clone()
        };

        self.save_registry(&registry).await;
        Ok(format!("disabled watch for '{name}'"))
    }

    /// Truncate log files for one record, or for every record.
    pub async fn flush(&self, target: Option<&str>) -> Result<String> {
        let registry = self.registry.read().await;

        let records: Vec<SharedRecord> = match target {
            Some(target) => vec![registry
                .lookup(target)
                .await
                .ok_or_else(|| Error::NotFound(target.to_string()))?],
            None => registry.records().map(|(_, r)| r.clone()).collect(),
        };

        let mut flushed = 0;
        for record in records {
            let (log_file, error_log_file) = {
                let process = record.lock().await;
                (process.log_file.clone(), process.error_log_file.clone())
            };
            for path in [log_file, error_log_file] {
                if path.exists() {
                    fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .open(&path)?;
                }
            }
            flushed += 1;
        }

        Ok(format!("flushed logs for {flushed} process(es)"))
    }

    /// Start every record that is not currently Online. Failures are
    /// logged and skipped so one broken record cannot block the rest.
    pub async fn resurrect(&self) -> Result<usize> {
        let registry = self.registry.write().await;
        let records: Vec<SharedRecord> = registry.records().map(|(_, r)| r.clone()).collect();

        let mut count = 0;
        for record in records {
            let online = record.lock().await.status == Status::Online;
            if online {
                continue;
            }
            match self.start_record(&record).await {
                Ok(()) => count += 1,
                Err(err) => {
                    let name = record.lock().await.name.clone();
                    log::warn!("resurrect failed for '{name}': {err}");
                }
            }
        }

        self.save_registry(&registry).await;
        Ok(count)
    }

    /// Records as app specs, for `config export`.
    pub async fn export(&self) -> Vec<AppSpec> {
        let registry = self.registry.read().await;
        let mut apps = Vec::new();
        for (_, record) in registry.records() {
            let process = record.lock().await;
            apps.push(AppSpec {
                name: process.name.clone(),
                script: process.script.clone(),
                args: process.args.clone(),
                cwd: Some(process.cwd.clone()),
                env: process.env.clone(),
                instances: process.instances,
                exec_mode: process.exec_mode.to_string(),
                watch: process.watch,
                watch_ignore: process.watch_ignore.clone(),
                log_file: Some(process.log_file.clone()),
                error_log_file: Some(process.error_log_file.clone()),
                max_restarts: process.max_restarts,
                min_uptime: Some(helpers::duration::format(process.min_uptime)),
            });
        }
        apps
    }

    /// Write the snapshot now.
    pub async fn save(&self) {
        let registry = self.registry.read().await;
        self.save_registry(&registry).await;
    }

    async fn save_registry(&self, registry: &Registry) {
        dump::write(&self.paths, registry).await;
    }

    /// Load the snapshot at daemon bootstrap. Records whose persisted
    /// pid is still alive are reattached as Online and supervised by
    /// pid polling; dead ones become Stopped, and previously-live ones
    /// are relaunched after a short delay.
    pub async fn load(&self) {
        let snapshot = dump::read(&self.paths);
        let mut relaunch = Vec::new();

        {
            let mut registry = self.registry.write().await;
            for (id, mut process) in snapshot {
                process.handles = Handles::default();

                if process.pid > 0 && stats::pid_alive(process.pid) {
                    process.status = Status::Online;
                    let pid = process.pid;
                    let record = registry.restore(id, process);

                    let mut guard = record.lock().await;
                    let (exit_tx, exit_rx) = watch::channel(false);
                    guard.handles.exit_rx = Some(exit_rx);
                    supervisor::spawn(
                        self.arc(),
                        record.clone(),
                        supervisor::Wait::Pid(pid),
                        exit_tx,
                    );
                    if guard.watch {
                        let stop_tx = watcher::spawn(
                            self.arc(),
                            guard.id,
                            guard.name.clone(),
                            guard.cwd.clone(),
                            guard.log_file.clone(),
                            guard.watch_ignore.clone(),
                        );
                        guard.handles.watcher_tx = Some(stop_tx);
                    }
                    log::info!("reattached '{}' (pid={pid})", guard.name);
                } else {
                    process.pid = 0;
                    let was_live = process.start_time.is_some();
                    process.status = Status::Stopped;
                    registry.restore(id, process);
                    if was_live {
                        relaunch.push(id);
                    }
                }
            }
            self.save_registry(&registry).await;
        }

        for id in relaunch {
            let manager = self.arc();
            tokio::spawn(async move {
                tokio::time::sleep(RECOVERY_DELAY).await;
                if let Err(err) = manager.resurrect_record(id).await {
                    log::warn!("recovery relaunch failed for process {id}: {err}");
                }
            });
        }
    }

    async fn resurrect_record(&self, id: usize) -> Result<()> {
        let registry = self.registry.write().await;
        let Some(record) = registry.get(id) else {
            return Ok(());
        };

        if record.lock().await.status != Status::Stopped {
            return Ok(());
        }

        let result = self.start_record(&record).await;
        self.save_registry(&registry).await;
        result
    }

    /// Graceful shutdown: stop every Online record, then snapshot.
    pub async fn shutdown(&self) {
        let registry = self.registry.write().await;
        for (_, record) in registry.records() {
            let online = record.lock().await.status == Status::Online;
            if online {
                if let Err(err) = self.stop_record(record).await {
                    log::warn!("shutdown stop failed: {err}");
                }
            }
        }
        self.save_registry(&registry).await;
    }

    /// Size-triggered log rotation, run on the periodic timer. Files
    /// over the threshold are renamed aside with a timestamp suffix and
    /// recreated empty; a live child keeps its open handle until the
    /// next relaunch reopens the fresh path.
    pub async fn rotate_logs(&self) {
        let mut files = Vec::new();
        {
            let registry = self.registry.read().await;
            for (_, record) in registry.records() {
                let process = record.lock().await;
                files.push(process.log_file.clone());
                files.push(process.error_log_file.clone());
            }
        }

        for path in files {
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            if meta.len() < LOG_ROTATE_SIZE {
                continue;
            }

            let rotated = PathBuf::from(format!(
                "{}.{}",
                path.display(),
                Utc::now().format("%Y%m%d%H%M%S")
            ));
            if let Err(err) = fs::rename(&path, &rotated) {
                log::warn!("log rotation failed for {}: {err}", path.display());
                continue;
            }
            if let Err(err) = fs::File::create(&path) {
                let _ = fs::rename(&rotated, &path);
                log::warn!("log rotation failed for {}: {err}", path.display());
            } else {
                log::info!("rotated {} -> {}", path.display(), rotated.display());
            }
        }
    }

    /// Launch a record's child and attach a fresh supervisor task (and
    /// file watcher, when enabled). Caller holds the registry writer
    /// lock. On failure the record is parked as Errored and remains in
    /// the registry for inspection.
    async fn start_record(&self, record: &SharedRecord) -> Result<()> {
        let mut process = record.lock().await;
        if process.status == Status::Online {
            return Err(Error::InvalidState {
                name: process.name.clone(),
                status: process.status.to_string(),
                action: "start".to_string(),
            });
        }

        match launcher::spawn_child(&mut process, &self.paths) {
            Ok(spawned) => {
                process.pid = spawned.pid;
                process.status = Status::Online;
                process.start_time = Some(Utc::now());

                let (exit_tx, exit_rx) = watch::channel(false);
                process.handles.exit_rx = Some(exit_rx);
                supervisor::spawn(
                    self.arc(),
                    record.clone(),
                    supervisor::Wait::Child(spawned.child),
                    exit_tx,
                );

                if process.watch && process.handles.watcher_tx.is_none() {
                    let stop_tx = watcher::spawn(
                        self.arc(),
                        process.id,
                        process.name.clone(),
                        process.cwd.clone(),
                        process.log_file.clone(),
                        process.watch_ignore.clone(),
                    );
                    process.handles.watcher_tx = Some(stop_tx);
                }

                log::info!("started '{}' (pid={})", process.name, process.pid);
                Ok(())
            }
            Err(err) => {
                process.status = Status::Errored;
                process.pid = 0;
                log::error!("failed to start '{}': {err}", process.name);
                Err(err)
            }
        }
    }

    /// The stop protocol: mark Stopping, stop the watcher, SIGTERM the
    /// child, wait up to the grace window for the supervisor to observe
    /// the exit, force-kill on timeout (and wait again, unbounded, to
    /// reap), then close handles and mark Stopped.
    async fn stop_record(&self, record: &SharedRecord) -> Result<String> {
        let (name, pid, mut exit_rx) = {
            let mut process = record.lock().await;
            if process.status != Status::Online {
                return Err(Error::InvalidState {
                    name: process.name.clone(),
                    status: process.status.to_string(),
                    action: "stop".to_string(),
                });
            }
            process.status = Status::Stopping;
            if let Some(stop_tx) = process.handles.watcher_tx.take() {
                let _ = stop_tx.try_send(());
            }
            (
                process.name.clone(),
                process.pid,
                process.handles.exit_rx.clone(),
            )
        };

        signal_pid(pid, nix::sys::signal::Signal::SIGTERM);

        let observed = match exit_rx.as_mut() {
            Some(rx) => matches!(
                tokio::time::timeout(STOP_GRACE, rx.wait_for(|seen| *seen)).await,
                Ok(Ok(_))
            ),
            None => true,
        };

        if !observed {
            log::warn!("'{name}' did not exit within {STOP_GRACE:?}, force killing");
            signal_pid(pid, nix::sys::signal::Signal::SIGKILL);
            if let Some(rx) = exit_rx.as_mut() {
                let _ = rx.wait_for(|seen| *seen).await;
            }
        }

        let mut process = record.lock().await;
        process.handles.stdout_log = None;
        process.handles.stderr_log = None;
        process.handles.exit_rx = None;
        process.pid = 0;
        process.status = Status::Stopped;

        if let Err(err) = fs::remove_file(self.paths.pid_file(&process.name)) {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::debug!("failed to remove pid file for '{}': {err}", process.name);
            }
        }

        log::info!("stopped '{name}'");
        Ok(name)
    }
}

/// Send a signal to a pid, ignoring already-gone processes.
pub fn signal_pid(pid: i64, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid <= 0 {
        return;
    }
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(_) => {}
        Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => log::warn!("failed to signal pid {pid}: {err}"),
    }
}
