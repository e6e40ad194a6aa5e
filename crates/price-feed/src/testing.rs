//! Programmable in-memory transport for tests

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

use nexus_core::{FeedError, FeedResult};

use crate::transport::{Socket, SocketEvent, Transport};

#[derive(Debug, Default)]
struct FakeState {
    urls: Vec<String>,
    sockets: Vec<mpsc::UnboundedSender<SocketEvent>>,
    fail_next: usize,
    closes: usize,
}

/// Transport whose sockets are driven from the test.
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// connection manager.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect attempts fail
    pub fn fail_next(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// Connect attempts so far, failed ones included
    pub fn connects(&self) -> usize {
        self.state.lock().urls.len()
    }

    pub fn last_url(&self) -> Option<String> {
        self.state.lock().urls.last().cloned()
    }

    /// Intentional closes issued by the manager
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    /// Deliver an event on the most recently opened socket
    pub fn emit(&self, event: SocketEvent) {
        let state = self.state.lock();
        if let Some(socket) = state.sockets.last() {
            let _ = socket.send(event);
        }
    }

    pub fn emit_text(&self, text: &str) {
        self.emit(SocketEvent::Message(text.to_string()));
    }

    pub fn close_unclean(&self) {
        self.emit(SocketEvent::Closed {
            clean: false,
            reason: None,
        });
    }

    pub fn close_clean(&self) {
        self.emit(SocketEvent::Closed {
            clean: true,
            reason: Some("normal closure".to_string()),
        });
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    type Socket = FakeSocket;

    async fn connect(&self, url: &str) -> FeedResult<FakeSocket> {
        let mut state = self.state.lock();
        state.urls.push(url.to_string());

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(FeedError::ConnectionFailed("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.sockets.push(tx);
        Ok(FakeSocket {
            events: rx,
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeSocket {
    events: mpsc::UnboundedReceiver<SocketEvent>,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait::async_trait]
impl Socket for FakeSocket {
    async fn next_event(&mut self) -> SocketEvent {
        self.events.recv().await.unwrap_or(SocketEvent::Closed {
            clean: false,
            reason: None,
        })
    }

    async fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}
