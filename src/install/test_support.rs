//! Fakes shared by the install tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::process::{CommandRunner, CommandSpec, ProcessError};

/// Records every command and answers from a script; succeeds once the script runs out.
#[derive(Default)]
pub struct FakeRunner {
    results: Mutex<VecDeque<Result<(), ProcessError>>>,
    calls: Mutex<Vec<CommandSpec>>,
    block_until_cancelled: bool,
    started: Notify,
}

impl FakeRunner {
    pub fn with_results(results: Vec<Result<(), ProcessError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    /// Every call hangs until its cancellation token fires.
    pub fn blocking() -> Self {
        Self {
            block_until_cancelled: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Resolves once a call has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<(), ProcessError> {
        self.calls.lock().unwrap().push(spec.clone());
        self.started.notify_one();

        if self.block_until_cancelled {
            cancel.cancelled().await;
            return Err(ProcessError::Cancelled {
                program: spec.program.clone(),
            });
        }

        self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Serve one canned HTTP response on a local port and return its URL.
///
/// Without `content_length` the body is delimited by closing the connection.
pub async fn serve_once(status: &str, body: Vec<u8>, content_length: bool) -> String {
    let length = content_length.then_some(body.len());
    serve(status, length, body, false).await
}

/// Promise `promised` bytes but send only `body`.
///
/// The connection is closed right after `body`, or held open when `stall` is set.
pub async fn serve_truncated(promised: usize, body: Vec<u8>, stall: bool) -> String {
    serve("200 OK", Some(promised), body, stall).await
}

async fn serve(status: &str, content_length: Option<usize>, body: Vec<u8>, stall: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let status = status.to_string();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let mut head = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
        if let Some(length) = content_length {
            head.push_str(&format!("Content-Length: {length}\r\n"));
        }
        head.push_str("\r\n");

        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.flush().await;
        if stall {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}/download")
}

/// HTTP client that ignores proxy settings, for talking to [`serve_once`].
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
