//! Line-delimited TCP transport for the session manager.
//!
//! Every accepted connection becomes a session with id `conn_<n>`. Each
//! non-empty line a client sends is one message body; every message the
//! session manager posts back is written as one line.
//!
//! Messages from one connection are handled strictly one after another, so a
//! session's machine is never driven by two pulls at once. Machines run on
//! the blocking pool since a program may compute for as long as it likes.

use intcode_vm::error::{self as vm_error, Error, Result};
use intcode_vm::{ConnectionSink, FileStore, MemoryStore, SessionManager, StateStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Sent when handling a message failed for reasons other than the request
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";

/// Configuration for `intcode serve`
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Address to listen on
    pub bind_addr: String,
    /// Directory for suspended sessions; in-memory when unset
    pub state_dir: Option<PathBuf>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7878".to_string(),
            state_dir: None,
        }
    }
}

/// Open connections and their outbound queues
#[derive(Default)]
pub struct ConnectionRegistry {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl ConnectionRegistry {
    fn register(&self, connection_id: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .map_err(|_| Error::unexpected("connection registry poisoned"))?
            .insert(connection_id.to_string(), tx);
        Ok(rx)
    }

    fn unregister(&self, connection_id: &str) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.remove(connection_id);
        }
    }
}

impl ConnectionSink for ConnectionRegistry {
    fn post(&self, connection_id: &str, message: &str) -> Result<()> {
        let senders = self
            .senders
            .lock()
            .map_err(|_| Error::unexpected("connection registry poisoned"))?;
        let tx = senders
            .get(connection_id)
            .ok_or_else(|| vm_error::connection_closed(connection_id))?;
        tx.send(message.to_string())
            .map_err(|_| vm_error::connection_closed(connection_id))
    }
}

pub struct Server {
    manager: Arc<SessionManager>,
    registry: Arc<ConnectionRegistry>,
    next_id: AtomicU64,
}

impl Server {
    /// Build a server with the store selected by `config`
    pub fn new(config: &ServeConfig) -> Result<Self> {
        let store: Arc<dyn StateStore> = match &config.state_dir {
            Some(dir) => Arc::new(FileStore::new(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(store))
    }

    pub fn with_store(store: Arc<dyn StateStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::default());
        let manager = Arc::new(SessionManager::new(store, registry.clone()));
        Self {
            manager,
            registry,
            next_id: AtomicU64::new(1),
        }
    }

    /// Accept connections until the listener fails
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        log::info!(
            "listening on {} ({} state store)",
            listener.local_addr()?,
            self.manager.backend_name()
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    log::warn!("connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> Result<()> {
        let connection_id = format!("conn_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut outbound = self.registry.register(&connection_id)?;
        let (reader, mut writer) = stream.into_split();

        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                writer.write_all(message.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(())
        });

        let result = self.read_messages(&connection_id, reader).await;

        if let Err(e) = self.manager.on_disconnect(&connection_id) {
            log::warn!("failed to clean up {}: {}", connection_id, e);
        }
        self.registry.unregister(&connection_id);
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::debug!("writer for {} stopped: {}", connection_id, e),
            Err(e) => log::warn!("writer for {} panicked: {}", connection_id, e),
        }

        result
    }

    async fn read_messages(
        &self,
        connection_id: &str,
        reader: tokio::net::tcp::OwnedReadHalf,
    ) -> Result<()> {
        self.manager.on_connect(connection_id)?;
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let manager = self.manager.clone();
            let id = connection_id.to_string();
            let handled = tokio::task::spawn_blocking(move || manager.on_message(&id, &line)).await;

            let failure = match handled {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => Error::unexpected(format!("message handler panicked: {}", e))
                    .with_operation("server::read_messages"),
            };
            log::error!("{}: {}", connection_id, failure.with_context("connection_id", connection_id));
            if self.registry.post(connection_id, INTERNAL_ERROR_MESSAGE).is_err() {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intcode_vm::session::{COMPLETED_MESSAGE, INPUT_REQUIRED_MESSAGE, USAGE_MESSAGE};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    async fn start(server: Server) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::new(server).serve(listener));
        addr
    }

    async fn connect(addr: std::net::SocketAddr) -> (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        (BufReader::new(reader).lines(), writer)
    }

    async fn send(writer: &mut OwnedWriteHalf, body: &str) {
        writer.write_all(body.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
    }

    async fn recv(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> String {
        lines.next_line().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_run_program_over_tcp() {
        let addr = start(Server::new(&ServeConfig::default()).unwrap()).await;
        let (mut lines, mut writer) = connect(addr).await;

        send(&mut writer, r#"{"program": [3,0,4,0,99], "input": [42]}"#).await;
        assert_eq!(recv(&mut lines).await, "42");
        assert_eq!(recv(&mut lines).await, COMPLETED_MESSAGE);
    }

    #[tokio::test]
    async fn test_usage_for_garbage() {
        let addr = start(Server::new(&ServeConfig::default()).unwrap()).await;
        let (mut lines, mut writer) = connect(addr).await;

        send(&mut writer, "hello").await;
        assert_eq!(recv(&mut lines).await, USAGE_MESSAGE);
    }

    #[tokio::test]
    async fn test_additional_input_over_tcp() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ServeConfig {
            state_dir: Some(temp_dir.path().to_path_buf()),
            ..ServeConfig::default()
        };
        let addr = start(Server::new(&config).unwrap()).await;
        let (mut lines, mut writer) = connect(addr).await;

        send(&mut writer, r#"{"program": [3,0,3,0,4,0,99], "input": [42]}"#).await;
        assert_eq!(recv(&mut lines).await, INPUT_REQUIRED_MESSAGE);

        send(&mut writer, r#"{"action": "additional_input", "input": [43]}"#).await;
        assert_eq!(recv(&mut lines).await, "43");
        assert_eq!(recv(&mut lines).await, COMPLETED_MESSAGE);
    }

    #[tokio::test]
    async fn test_sessions_per_connection() {
        let addr = start(Server::with_store(Arc::new(MemoryStore::new()))).await;
        let (mut lines_a, mut writer_a) = connect(addr).await;
        let (mut lines_b, mut writer_b) = connect(addr).await;

        send(&mut writer_a, r#"{"program": [3,0,4,0,99], "input": []}"#).await;
        assert_eq!(recv(&mut lines_a).await, INPUT_REQUIRED_MESSAGE);

        // b has no suspended program of its own
        send(&mut writer_b, r#"{"action": "additional_input", "input": [1]}"#).await;
        assert_eq!(recv(&mut lines_b).await, USAGE_MESSAGE);

        send(&mut writer_a, r#"{"action": "additional_input", "input": [9]}"#).await;
        assert_eq!(recv(&mut lines_a).await, "9");
    }

    #[test]
    fn test_registry_rejects_unknown_connection() {
        let registry = ConnectionRegistry::default();
        let err = registry.post("conn_404", "hi").unwrap_err();
        assert_eq!(err.kind(), intcode_vm::ErrorKind::ConnectionClosed);

        let mut rx = registry.register("conn_1").unwrap();
        registry.post("conn_1", "hi").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hi");

        registry.unregister("conn_1");
        assert!(registry.post("conn_1", "hi").is_err());
    }
}
