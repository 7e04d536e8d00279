//! Shared harness for coordinator specs

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use similar_asserts::assert_eq;
pub use std::time::Duration;
pub use turnstile::{ClientError, LockClient};
pub use turnstile_core::ResourceRegistry;

/// How long to wait for a line that should arrive
const EXPECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a peer must stay quiet to count as silent
const SILENCE: Duration = Duration::from_millis(200);

/// An in-process coordinator bound to an ephemeral local port
pub struct Coordinator {
    addr: SocketAddr,
    registry: Arc<ResourceRegistry>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Coordinator {
    pub async fn start() -> Self {
        Self::with_idle_timeout(turnstile_daemon::lifecycle::DEFAULT_IDLE_TIMEOUT).await
    }

    pub async fn with_idle_timeout(idle_timeout: Duration) -> Self {
        let config = turnstile_daemon::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            idle_timeout,
            ..turnstile_daemon::Config::default()
        };
        let coordinator = turnstile_daemon::startup(&config).await.unwrap();
        let addr = coordinator.local_addr();
        let registry = coordinator.registry();
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(coordinator.serve(async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            registry,
            stop: Some(stop),
            task,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn client(&self) -> LockClient {
        LockClient::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub async fn connect(&self) -> Peer {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let addr = stream.local_addr().unwrap().ip().to_string();
        let (reader, writer) = stream.into_split();
        Peer {
            addr,
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Raw `status` listing
    pub async fn status(&self) -> Vec<String> {
        let mut observer = self.connect().await;
        observer.send("status").await;
        observer.read_to_close().await
    }

    /// Number of connections queued on `resource`, holder included
    pub fn queue_len(&self, resource: &str) -> usize {
        self.registry
            .get(resource)
            .map_or(0, |queue| queue.guard().len())
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(EXPECT_TIMEOUT, &mut self.task)
            .await
            .expect("coordinator did not stop")
            .unwrap();
    }
}

/// One raw protocol connection
pub struct Peer {
    addr: String,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    /// Peer IP as the coordinator reports it
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn send(&mut self, line: &str) {
        self.send_raw(&format!("{}\n", line)).await;
    }

    pub async fn send_raw(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
    }

    pub async fn expect(&mut self, expected: &str) {
        let line = tokio::time::timeout(EXPECT_TIMEOUT, self.lines.next_line())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {:?}", expected))
            .unwrap();
        assert_eq!(line.as_deref(), Some(expected));
    }

    pub async fn expect_closed(&mut self) {
        let line = tokio::time::timeout(EXPECT_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for close")
            .unwrap_or(None);
        assert_eq!(line, None);
    }

    /// Nothing arrives for a while
    pub async fn expect_silent(&mut self) {
        if let Ok(line) = tokio::time::timeout(SILENCE, self.lines.next_line()).await {
            panic!("expected silence, got {:?}", line);
        }
    }

    pub async fn read_to_close(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let next = tokio::time::timeout(EXPECT_TIMEOUT, self.lines.next_line())
                .await
                .expect("timed out reading");
            match next {
                Ok(Some(line)) => lines.push(line),
                _ => return lines,
            }
        }
    }

    /// Drop the connection without a word
    pub fn disconnect(self) {}
}

/// Poll until `check` holds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + EXPECT_TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition never became true"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
