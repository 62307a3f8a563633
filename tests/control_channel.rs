//! Control-channel round trips: one JSON-line request, exactly one
//! response, over the daemon's unix socket.

mod common;

use common::*;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixListener;

use gopm2::process::Status;
use gopm2::socket::{self, SocketRequest, SocketResponse};

const TEST_TIMEOUT: Duration = Duration::from_secs(30);

async fn send(socket_path: &PathBuf, request: SocketRequest) -> SocketResponse {
    let socket_path = socket_path.clone();
    tokio::task::spawn_blocking(move || socket::send_request(&socket_path, &request))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn full_session_over_socket() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        let manager = gopm2::process::Manager::new(paths.clone());

        let listener = UnixListener::bind(paths.socket()).unwrap();
        tokio::spawn(socket::serve(listener, manager.clone()));
        let sock = paths.socket();

        assert!(matches!(
            send(&sock, SocketRequest::Ping).await,
            SocketResponse::Pong
        ));

        // START returns the spec-mandated success line content.
        match send(&sock, SocketRequest::Start(sleep_spec("web", "60"))).await {
            SocketResponse::Success(message) => {
                assert_eq!(message, "started 'web' (id=1)");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        // LIST is a JSON array of summaries.
        match send(&sock, SocketRequest::List).await {
            SocketResponse::List(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].name, "web");
                assert_eq!(items[0].status, Status::Online);
                assert!(items[0].pid > 0);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        match send(&sock, SocketRequest::Describe("web".to_string())).await {
            SocketResponse::Detail(detail) => {
                assert_eq!(detail.id, 1);
                assert_eq!(detail.script, "/bin/sleep");
                assert_eq!(detail.min_uptime, "1s");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        match send(&sock, SocketRequest::Export).await {
            SocketResponse::Specs(specs) => {
                assert_eq!(specs.len(), 1);
                assert_eq!(specs[0].name, "web");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        assert!(matches!(
            send(&sock, SocketRequest::Save).await,
            SocketResponse::Success(_)
        ));

        assert!(matches!(
            send(&sock, SocketRequest::Stop("web".to_string())).await,
            SocketResponse::Success(_)
        ));

        // Errors come back as one ERROR line's worth of message.
        match send(&sock, SocketRequest::Stop("web".to_string())).await {
            SocketResponse::Error(message) => {
                assert!(message.contains("cannot stop"), "got: {message}");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        match send(&sock, SocketRequest::Stop("ghost".to_string())).await {
            SocketResponse::Error(message) => {
                assert!(message.contains("not found"), "got: {message}");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        assert!(matches!(
            send(&sock, SocketRequest::Delete("web".to_string())).await,
            SocketResponse::Success(_)
        ));
        match send(&sock, SocketRequest::List).await {
            SocketResponse::List(items) => assert!(items.is_empty()),
            other => panic!("unexpected response: {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test(flavor = "multi_thread")]
async fn is_daemon_running_probe() {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);

        let missing = paths.socket();
        let probe =
            tokio::task::spawn_blocking(move || socket::is_daemon_running(&missing)).await;
        assert!(!probe.unwrap());

        let manager = gopm2::process::Manager::new(paths.clone());
        let listener = UnixListener::bind(paths.socket()).unwrap();
        tokio::spawn(socket::serve(listener, manager));

        let sock = paths.socket();
        let probe = tokio::task::spawn_blocking(move || socket::is_daemon_running(&sock)).await;
        assert!(probe.unwrap());
    })
    .await
    .expect("test timed out");
}
