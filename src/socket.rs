//! Control channel between the CLI and the daemon.
//!
//! JSON-lines over a unix socket at `~/.gopm2/gopm2.sock`: each request
//! is one serialized [`SocketRequest`] line and gets exactly one
//! [`SocketResponse`] line back. Trust is local filesystem permission,
//! so the socket is created mode 0600. The server side runs inside the
//! daemon's runtime; the client side is plain blocking I/O since CLI
//! invocations are short-lived.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader as TokioBufReader};
use tokio::net::UnixListener;

use crate::config::AppSpec;
use crate::process::{Manager, ProcessDetail, ProcessItem};

/// Client-side request timeout.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 50;
/// Cap on a single request line.
const MAX_REQUEST_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub enum SocketRequest {
    /// Create and launch record(s) for one app spec.
    Start(AppSpec),
    /// Stop a process by name or id.
    Stop(String),
    /// Restart a process by name or id.
    Restart(String),
    /// Stop if needed, then remove a process by name or id.
    Delete(String),
    /// Summaries of every record.
    List,
    /// Full record detail by name or id.
    Describe(String),
    /// Enable the file watcher for a record.
    WatchEnable(String),
    /// Disable the file watcher for a record.
    WatchDisable(String),
    /// Truncate log files for one record, or all of them.
    Flush(Option<String>),
    /// Write the registry snapshot now.
    Save,
    /// Start every record that is not Online.
    Resurrect,
    /// All records as app specs, for config export.
    Export,
    /// Liveness probe.
    Ping,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum SocketResponse {
    Success(String),
    Error(String),
    List(Vec<ProcessItem>),
    Detail(Box<ProcessDetail>),
    Specs(Vec<AppSpec>),
    Pong,
}

/// Accept loop for the daemon. Each connection is handled in its own
/// task; lifecycle operations serialize on the registry lock inside
/// the manager.
pub async fn serve(listener: UnixListener, manager: Arc<Manager>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let manager = manager.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, manager).await {
                        log::debug!("socket client error: {err}");
                    }
                });
            }
            Err(err) => {
                log::error!("socket accept failed: {err}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_client(stream: tokio::net::UnixStream, manager: Arc<Manager>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = TokioBufReader::new(read_half).take(MAX_REQUEST_SIZE);

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let request: SocketRequest = serde_json::from_str(&line)?;
    let response = dispatch(request, &manager).await;

    let mut encoded = serde_json::to_string(&response)?;
    encoded.push('\n');
    write_half.write_all(encoded.as_bytes()).await?;
    write_half.flush().await?;
    Ok(())
}

async fn dispatch(request: SocketRequest, manager: &Arc<Manager>) -> SocketResponse {
    match request {
        SocketRequest::Start(spec) => match manager.start_app(spec).await {
            Ok(started) => {
                let summary = started
                    .iter()
                    .map(|(id, name)| format!("started '{name}' (id={id})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                SocketResponse::Success(summary)
            }
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::Stop(target) => match manager.stop(&target).await {
            Ok(message) => SocketResponse::Success(message),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::Restart(target) => match manager.restart(&target).await {
            Ok(message) => SocketResponse::Success(message),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::Delete(target) => match manager.delete(&target).await {
            Ok(message) => SocketResponse::Success(message),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::List => SocketResponse::List(manager.list().await),
        SocketRequest::Describe(target) => match manager.describe(&target).await {
            Ok(detail) => SocketResponse::Detail(Box::new(detail)),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::WatchEnable(target) => match manager.watch_enable(&target).await {
            Ok(message) => SocketResponse::Success(message),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::WatchDisable(target) => match manager.watch_disable(&target).await {
            Ok(message) => SocketResponse::Success(message),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::Flush(target) => match manager.flush(target.as_deref()).await {
            Ok(message) => SocketResponse::Success(message),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::Save => {
            manager.save().await;
            SocketResponse::Success("saved process list".to_string())
        }
        SocketRequest::Resurrect => match manager.resurrect().await {
            Ok(count) => SocketResponse::Success(format!("resurrected {count} process(es)")),
            Err(err) => SocketResponse::Error(err.to_string()),
        },
        SocketRequest::Export => SocketResponse::Specs(manager.export().await),
        SocketRequest::Ping => SocketResponse::Pong,
    }
}

/// Send one request to the daemon, with a short retry ladder for
/// transient connect failures (daemon still binding its socket).
pub fn send_request(socket_path: &Path, request: &SocketRequest) -> Result<SocketResponse> {
    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        match send_request_once(socket_path, request) {
            Ok(response) => return Ok(response),
            Err(err) => {
                last_error = Some(err);
                if attempt < MAX_RETRIES - 1 {
                    let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
                    std::thread::sleep(Duration::from_millis(backoff));
                }
            }
        }
    }

    Err(last_error.unwrap())
}

fn send_request_once(socket_path: &Path, request: &SocketRequest) -> Result<SocketResponse> {
    let mut stream = UnixStream::connect(socket_path).map_err(|err| {
        anyhow!("failed to connect to daemon socket: {err}. Is the daemon running?")
    })?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    let mut encoded = serde_json::to_string(request)?;
    encoded.push('\n');
    stream.write_all(encoded.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    Ok(serde_json::from_str(&line)?)
}

/// Probe the daemon over the socket.
pub fn is_daemon_running(socket_path: &Path) -> bool {
    matches!(
        send_request_once(socket_path, &SocketRequest::Ping),
        Ok(SocketResponse::Pong)
    )
}
