//! Local HTTP responder for client tests
//!
//! Serves canned `(status, body)` responses in order, one per connection,
//! and records each request line. The last response repeats once the queue
//! runs dry.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct TestServer {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(responses: &[(u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let mut queue: VecDeque<(u16, String)> = responses
            .iter()
            .map(|(status, body)| (*status, body.to_string()))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                let mut last = (200, "{}".to_string());
                while let Ok((stream, _)) = listener.accept().await {
                    if let Some(next) = queue.pop_front() {
                        last = next;
                    }
                    respond(stream, &requests, last.0, &last.1).await;
                }
            })
        };

        Self {
            url,
            requests,
            task,
        }
    }

    /// Base URL, no trailing slash
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request lines seen so far, e.g. `GET /news?q=x HTTP/1.1`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Recorded before replying, so a client that saw the reply sees the request
async fn respond(
    mut stream: TcpStream,
    requests: &Mutex<Vec<String>>,
    status: u16,
    body: &str,
) -> Option<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }
    if let Some(line) = String::from_utf8_lossy(&head).lines().next() {
        requests.lock().push(line.to_string());
    }

    let reason = match status {
        200 => "OK",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await.ok()?;
    stream.shutdown().await.ok()
}
