//! Socket transport abstraction
//!
//! The connection manager only sees `SocketEvent`s. `WsTransport` produces
//! them from a real WebSocket; tests drive a fake one by hand.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use nexus_core::{FeedError, FeedResult};

/// Upper bound on the close handshake. The stream is dropped either way.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle event of one socket
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// One text frame
    Message(String),
    /// Transport error. Always followed by `Closed { clean: false }`.
    Error(String),
    /// The socket is gone. `clean` means the close handshake completed.
    Closed { clean: bool, reason: Option<String> },
}

/// Opens sockets to a URL
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    type Socket: Socket;

    async fn connect(&self, url: &str) -> FeedResult<Self::Socket>;
}

/// One open socket
#[async_trait::async_trait]
pub trait Socket: Send + 'static {
    /// Next event. Not called again after `Closed` was returned.
    async fn next_event(&mut self) -> SocketEvent;

    /// Intentional close. No `Closed` event is reported for it.
    async fn close(&mut self);
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait::async_trait]
impl Transport for WsTransport {
    type Socket = WsSocket;

    async fn connect(&self, url: &str) -> FeedResult<WsSocket> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        Ok(WsSocket {
            stream,
            errored: false,
        })
    }
}

pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    errored: bool,
}

#[async_trait::async_trait]
impl Socket for WsSocket {
    async fn next_event(&mut self) -> SocketEvent {
        if self.errored {
            return SocketEvent::Closed {
                clean: false,
                reason: None,
            };
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return SocketEvent::Message(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return SocketEvent::Message(text),
                    Err(_) => debug!("Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        self.errored = true;
                        return SocketEvent::Error(e.to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                    return SocketEvent::Closed {
                        clean: true,
                        reason,
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.errored = true;
                    return SocketEvent::Error(e.to_string());
                }
                None => {
                    return SocketEvent::Closed {
                        clean: false,
                        reason: None,
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        close_within(CLOSE_TIMEOUT, self.stream.close(None)).await;
    }
}

/// Await a close handshake for at most `limit`. Returns true when the peer
/// completed it.
pub(crate) async fn close_within<F, E>(limit: Duration, close: F) -> bool
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(limit, close).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("WebSocket close failed: {}", e);
            false
        }
        Err(_) => {
            warn!("WebSocket close timed out after {:?}, dropping socket", limit);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_on_silent_peer() {
        let started = Instant::now();
        let closed = close_within(CLOSE_TIMEOUT, std::future::pending::<Result<(), String>>()).await;

        assert!(!closed);
        assert!(started.elapsed() >= CLOSE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_close_reports_handshake_outcome() {
        assert!(close_within(CLOSE_TIMEOUT, async { Ok::<(), String>(()) }).await);
        assert!(!close_within(CLOSE_TIMEOUT, async { Err::<(), _>("reset by peer") }).await);
    }
}
