//! Unix domain socket server for IPC
//!
//! Provides request-response control of the daemon and push notifications
//! of state events to subscribed clients.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::control::Controller;
use crate::events::StateEvent;

use super::protocol::{read_frame, write_frame, FrameError, Notification, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    controller: Controller,
    event_tx: broadcast::Sender<StateEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(
        socket_path: &Path,
        controller: Controller,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            controller,
            event_tx,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let controller = self.controller.clone();
                    let event_tx = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, controller, event_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Disconnect clients and remove the socket file
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Serve one connection until it closes or subscribes
async fn handle_client(
    mut stream: UnixStream,
    controller: Controller,
    event_tx: broadcast::Sender<StateEvent>,
) -> Result<()> {
    loop {
        let body = match read_frame(&mut stream).await {
            Ok(body) => body,
            Err(FrameError::Closed) => {
                debug!("client disconnected");
                return Ok(());
            }
            Err(FrameError::TooLarge(len)) => {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let request: Request = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                debug!(?e, "malformed request");
                let response = Response::Error {
                    code: "bad_request".to_string(),
                    message: e.to_string(),
                };
                write_frame(&mut stream, &response).await?;
                continue;
            }
        };
        debug!(?request, "received request");

        if request == Request::Subscribe {
            // Subscribe before confirming so no event after the ack is missed
            let events = event_tx.subscribe();
            write_frame(&mut stream, &Response::Subscribed).await?;
            debug!("client subscribed to notifications");
            return push_events(stream, events).await;
        }

        let response = process_request(request, &controller);
        write_frame(&mut stream, &response).await?;
    }
}

/// Answer a request-response message
fn process_request(request: Request, controller: &Controller) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::GetStatus => Response::Status(controller.status()),
        Request::Start => {
            controller.start();
            Response::Ack
        }
        Request::Stop => {
            controller.stop();
            Response::Ack
        }
        Request::Toggle => Response::Toggled {
            outcome: controller.toggle(),
        },
        Request::Abort => Response::Aborted {
            cancelled_task: controller.abort(),
        },
        Request::Subscribe => Response::Subscribed,
    }
}

/// Forward state events until the client or the daemon goes away
async fn push_events(
    mut stream: UnixStream,
    mut events: broadcast::Receiver<StateEvent>,
) -> Result<()> {
    loop {
        let notification = match events.recv().await {
            Ok(event) => Notification::Event { event },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscriber lagged");
                Notification::Lagged { skipped }
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };

        if let Err(e) = write_frame(&mut stream, &notification).await {
            debug!(?e, "subscriber disconnected");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::{Mode, ToggleOutcome};
    use crate::testing::create_controller;

    async fn request(stream: &mut UnixStream, request: &Request) -> Response {
        write_frame(stream, request).await.unwrap();
        let body = read_frame(stream).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn start_server(dir: &Path) -> (PathBuf, broadcast::Sender<StateEvent>) {
        let socket = dir.join("daemon.sock");
        let (event_tx, _) = broadcast::channel(16);
        let server = Server::new(&socket, create_controller(), event_tx.clone()).unwrap();
        tokio::spawn(async move { server.run().await });
        (socket, event_tx)
    }

    #[tokio::test]
    async fn test_request_response() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, _events) = start_server(dir.path());
        let mut stream = UnixStream::connect(&socket).await.unwrap();

        assert_eq!(request(&mut stream, &Request::Ping).await, Response::Pong);

        match request(&mut stream, &Request::GetStatus).await {
            Response::Status(status) => assert_eq!(status.mode, Mode::Inactive),
            other => panic!("unexpected response: {other:?}"),
        }

        assert_eq!(
            request(&mut stream, &Request::Toggle).await,
            Response::Toggled {
                outcome: ToggleOutcome::Started
            }
        );
        assert_eq!(
            request(&mut stream, &Request::Abort).await,
            Response::Aborted {
                cancelled_task: false
            }
        );
        assert_eq!(
            request(&mut stream, &Request::Toggle).await,
            Response::Toggled {
                outcome: ToggleOutcome::Rejected
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, _events) = start_server(dir.path());
        let mut stream = UnixStream::connect(&socket).await.unwrap();

        write_frame(&mut stream, &serde_json::json!({"type": "dance"}))
            .await
            .unwrap();
        let body = read_frame(&mut stream).await.unwrap();
        let response: Response = serde_json::from_slice(&body).unwrap();
        assert!(matches!(response, Response::Error { .. }));

        assert_eq!(request(&mut stream, &Request::Ping).await, Response::Pong);
    }

    #[tokio::test]
    async fn test_subscribe_pushes_events() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, event_tx) = start_server(dir.path());
        let mut stream = UnixStream::connect(&socket).await.unwrap();

        assert_eq!(
            request(&mut stream, &Request::Subscribe).await,
            Response::Subscribed
        );
        event_tx.send(StateEvent::TaskStarted { task_id: 7 }).unwrap();

        let body = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"]["task_id"], 7);
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("daemon.sock");
        let (event_tx, _) = broadcast::channel(16);
        let server = Server::new(&socket, create_controller(), event_tx).unwrap();

        assert!(socket.exists());
        server.shutdown().await;
        assert!(!socket.exists());
    }
}
