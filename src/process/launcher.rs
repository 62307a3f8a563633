use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

use super::Process;
use crate::error::{Error, Result};
use crate::globals::Paths;

pub struct Spawned {
    pub child: Child,
    pub pid: i64,
}

/// Interpreter resolution by script suffix. Everything unrecognized is
/// executed directly.
pub fn build_command(script: &str, args: &[String]) -> (String, Vec<String>) {
    let suffix = Path::new(script)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    match suffix {
        "js" | "ts" => {
            let mut argv = vec![script.to_string()];
            argv.extend(args.iter().cloned());
            ("node".to_string(), argv)
        }
        "py" => {
            let mut argv = vec![script.to_string()];
            argv.extend(args.iter().cloned());
            ("python".to_string(), argv)
        }
        "go" => {
            let mut argv = vec!["run".to_string(), script.to_string()];
            argv.extend(args.iter().cloned());
            ("go".to_string(), argv)
        }
        _ => (script.to_string(), args.to_vec()),
    }
}

fn open_log(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)
}

/// Spawn the record's child: open the log files in append mode, resolve
/// the interpreter, merge the record env over the daemon env and wire
/// stdio. The caller holds the record lock and owns the state update.
pub fn spawn_child(process: &mut Process, paths: &Paths) -> Result<Spawned> {
    let spawn_failed = |reason: String| Error::SpawnFailed {
        name: process.name.clone(),
        reason,
    };

    let stdout_log =
        open_log(&process.log_file).map_err(|err| spawn_failed(format!("log file: {err}")))?;
    let stderr_log = open_log(&process.error_log_file)
        .map_err(|err| spawn_failed(format!("error log file: {err}")))?;

    let (program, argv) = build_command(&process.script, &process.args);

    let mut command = Command::new(&program);
    command
        .args(&argv)
        .current_dir(&process.cwd)
        .envs(&process.env)
        .stdin(Stdio::null())
        .stdout(Stdio::from(
            stdout_log
                .try_clone()
                .map_err(|err| spawn_failed(format!("log file: {err}")))?,
        ))
        .stderr(Stdio::from(
            stderr_log
                .try_clone()
                .map_err(|err| spawn_failed(format!("error log file: {err}")))?,
        ));

    let child = command
        .spawn()
        .map_err(|err| spawn_failed(format!("{program}: {err}")))?;

    let pid = child.id().map(|id| id as i64).unwrap_or(0);

    // Advisory pid file, loss is not an error.
    let pid_file = paths.pid_file(&process.name);
    if let Err(err) = fs::write(&pid_file, pid.to_string()) {
        log::warn!("failed to write pid file {}: {err}", pid_file.display());
    }

    process.handles.stdout_log = Some(stdout_log);
    process.handles.stderr_log = Some(stderr_log);

    Ok(Spawned { child, pid })
}

/// Append a timestamped supervisor line to a process log file.
pub fn append_event(path: &Path, message: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(
            file,
            "[{}] {message}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_scripts() {
        let (program, argv) = build_command("server.js", &["--port".into(), "80".into()]);
        assert_eq!(program, "node");
        assert_eq!(argv, vec!["server.js", "--port", "80"]);

        let (program, _) = build_command("app.ts", &[]);
        assert_eq!(program, "node");
    }

    #[test]
    fn test_python_scripts() {
        let (program, argv) = build_command("worker.py", &["-u".into()]);
        assert_eq!(program, "python");
        assert_eq!(argv, vec!["worker.py", "-u"]);
    }

    #[test]
    fn test_go_scripts() {
        let (program, argv) = build_command("main.go", &["serve".into()]);
        assert_eq!(program, "go");
        assert_eq!(argv, vec!["run", "main.go", "serve"]);
    }

    #[test]
    fn test_plain_executables() {
        let (program, argv) = build_command("/bin/sleep", &["60".into()]);
        assert_eq!(program, "/bin/sleep");
        assert_eq!(argv, vec!["60"]);

        let (program, argv) = build_command("./server", &[]);
        assert_eq!(program, "./server");
        assert!(argv.is_empty());
    }
}
