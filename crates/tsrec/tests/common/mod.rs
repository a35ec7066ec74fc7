//! Minimal in-process HTTP/1.1 server for capture tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the server sends back for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Complete response with `Content-Length`.
    Body { status: u16, body: Vec<u8> },
    /// Close-delimited body written in chunks. With `hold_open` the socket stays
    /// open after the last chunk instead of being closed.
    Stream { chunks: Vec<Vec<u8>>, hold_open: bool },
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Reply::Body {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Body {
            status,
            body: Vec::new(),
        }
    }
}

type Handler = Arc<dyn Fn(usize) -> Reply + Send + Sync>;

#[derive(Default)]
pub struct Routes {
    handlers: HashMap<String, Handler>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `path`; the handler gets the 0-based index of the request to this path.
    pub fn route(
        mut self,
        path: &str,
        handler: impl Fn(usize) -> Reply + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(path.to_string(), Arc::new(handler));
        self
    }

    pub fn fixed(self, path: &str, reply: Reply) -> Self {
        self.route(path, move |_| reply.clone())
    }
}

pub struct TestServer {
    addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Routes) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, requests) = mpsc::unbounded_channel();
        let routes = Arc::new(routes);
        let counters: Arc<HashMap<String, AtomicUsize>> = Arc::new(
            routes
                .handlers
                .keys()
                .map(|path| (path.clone(), AtomicUsize::new(0)))
                .collect(),
        );

        let task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                let counters = counters.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    serve(socket, &routes, &counters, &tx).await;
                });
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self, path: &str) -> url::Url {
        url::Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    /// Wait for the next request path, failing the test after `timeout`.
    pub async fn next_request(&mut self, timeout: Duration) -> String {
        tokio::time::timeout(timeout, self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("server stopped")
    }

    /// Paths requested so far that have not been consumed by `next_request`.
    pub fn drain_requests(&mut self) -> Vec<String> {
        let mut paths = Vec::new();
        while let Ok(path) = self.requests.try_recv() {
            paths.push(path);
        }
        paths
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Address with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn serve(
    mut socket: TcpStream,
    routes: &Routes,
    counters: &HashMap<String, AtomicUsize>,
    tx: &mpsc::UnboundedSender<String>,
) {
    let Some(path) = read_request_path(&mut socket).await else {
        return;
    };
    let _ = tx.send(path.clone());

    let reply = match (routes.handlers.get(&path), counters.get(&path)) {
        (Some(handler), Some(counter)) => handler(counter.fetch_add(1, Ordering::SeqCst)),
        _ => Reply::status(404),
    };

    match reply {
        Reply::Body { status, body } => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reason(status),
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
        Reply::Stream { chunks, hold_open } => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: video/mp2t\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for chunk in chunks {
                if socket.write_all(&chunk).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            if hold_open {
                // Keep the connection until the client goes away.
                let mut buf = [0u8; 64];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            } else {
                let _ = socket.shutdown().await;
            }
        }
    }
}

async fn read_request_path(socket: &mut TcpStream) -> Option<String> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let target = head.lines().next()?.split_whitespace().nth(1)?;
    let path = target.split('?').next().unwrap_or(target);
    Some(path.to_string())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
