//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::control::DaemonStatus;
use crate::events::StateEvent;
use crate::state::ToggleOutcome;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Raise the start signal
    Start,

    /// Raise the stop signal
    Stop,

    /// Start or stop depending on the current mode
    Toggle,

    /// Abort the task in flight
    Abort,

    /// Ping to check connectivity
    Ping,

    /// Turn this connection into a stream of notifications
    Subscribe,
}

/// Responses from the daemon to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Start or stop signal raised
    Ack,

    /// Result of a toggle request
    Toggled { outcome: ToggleOutcome },

    /// Abort raised; `cancelled_task` is false when nothing was in flight
    Aborted { cancelled_task: bool },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// State event occurred
    Event { event: StateEvent },

    /// Some events were dropped because the client fell behind
    Lagged { skipped: u64 },
}

/// Frame errors
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection closed")]
    Closed,

    #[error("message of {0} bytes exceeds the limit")]
    TooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read one length-prefixed message body
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Send a length-prefixed JSON message
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_MESSAGE_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }

    writer.write_all(&(body.len() as u32).to_le_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Mode;

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_string(&Request::GetStatus).unwrap();
        assert_eq!(json, r#"{"type":"get_status"}"#);

        let req: Request = serde_json::from_str(r#"{"type":"toggle"}"#).unwrap();
        assert_eq!(req, Request::Toggle);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus {
            version: "0.1.0".to_string(),
            mode: Mode::Processing,
            queue_len: 0,
            tasks: Vec::new(),
            active_conversation: Some("session-1".to_string()),
            conversations: vec!["session-1".to_string()],
            abort_in_flight: false,
            uptime_secs: 3,
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["mode"], "processing");

        let json = serde_json::to_value(Response::Toggled {
            outcome: ToggleOutcome::Rejected,
        })
        .unwrap();
        assert_eq!(json["outcome"], "rejected");
    }

    #[test]
    fn test_notification_wraps_event() {
        let json = serde_json::to_value(Notification::Event {
            event: StateEvent::AbortRaised,
        })
        .unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"]["type"], "abort_raised");
    }

    #[tokio::test]
    async fn test_frame_roundtrip_and_eof() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &Request::Ping).await.unwrap();
        drop(client);

        let body = read_frame(&mut server).await.unwrap();
        let req: Request = serde_json::from_slice(&body).unwrap();
        assert_eq!(req, Request::Ping);
        assert!(matches!(read_frame(&mut server).await, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = (MAX_MESSAGE_LEN as u32 + 1).to_le_bytes();
        client.write_all(&len).await.unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(FrameError::TooLarge(_))
        ));
    }
}
