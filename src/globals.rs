use global_placeholders::init;
use macros_rs::crashln;
use std::fs;
use std::path::PathBuf;

use crate::helpers;

/// Filesystem layout of a data directory.
///
/// Everything the daemon persists lives under one base directory
/// (default `~/.gopm2`): the registry snapshot, the daemon lock and log,
/// per-process log files, advisory pid files and the control socket.
#[derive(Clone, Debug)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new(base: PathBuf) -> Result<Self, std::io::Error> {
        fs::create_dir_all(&base)?;
        fs::create_dir_all(base.join("logs"))?;
        fs::create_dir_all(base.join("pids"))?;
        Ok(Self { base })
    }

    pub fn default_base() -> PathBuf {
        match home::home_dir() {
            Some(home) => home.join(".gopm2"),
            None => PathBuf::from(".gopm2"),
        }
    }

    pub fn base(&self) -> &PathBuf {
        &self.base
    }

    pub fn snapshot(&self) -> PathBuf {
        self.base.join("processes.json")
    }

    pub fn snapshot_tmp(&self) -> PathBuf {
        self.base.join("processes.json.tmp")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.base.join("daemon.lock")
    }

    pub fn socket(&self) -> PathBuf {
        self.base.join("gopm2.sock")
    }

    pub fn daemon_log(&self) -> PathBuf {
        self.base.join("daemon.log")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    pub fn default_log(&self, name: &str) -> PathBuf {
        self.log_dir().join(format!("{name}.log"))
    }

    pub fn default_error_log(&self, name: &str) -> PathBuf {
        self.log_dir().join(format!("{name}-error.log"))
    }

    pub fn pid_file(&self, name: &str) -> PathBuf {
        self.base.join("pids").join(format!("{name}.pid"))
    }
}

/// Register the `gopm2.*` placeholders used by the CLI and daemon.
/// Called once at startup, before any command runs.
pub fn init() {
    let paths = match Paths::new(Paths::default_base()) {
        Ok(paths) => paths,
        Err(err) => crashln!("{} Failed to create ~/.gopm2: {err}", *helpers::FAIL),
    };

    init!("gopm2.base", paths.base().display().to_string());
    init!("gopm2.dump", paths.snapshot().display().to_string());
    init!("gopm2.lock", paths.lock_file().display().to_string());
    init!("gopm2.socket", paths.socket().display().to_string());
    init!("gopm2.daemon.log", paths.daemon_log().display().to_string());
    init!("gopm2.logs", paths.log_dir().display().to_string());
}
