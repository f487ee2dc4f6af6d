//! TCP listener
//!
//! Accepts connections and runs one association per connection on its own
//! task, over HDLC or the wrapper as configured.

use crate::association::Association;
use crate::config::{ServerConfig, SessionKind};
use crate::directory::ObjectDirectory;
use dlms_core::{DlmsError, DlmsResult};
use dlms_session::{HdlcConnection, SessionLayer, WrapperSession};
use dlms_transport::TcpTransport;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Server listener for accepting client connections
///
/// # Usage Example
/// ```rust,no_run
/// use dlms_server::{ObjectDirectory, ServerConfig, ServerListener};
/// use std::sync::Arc;
///
/// # async fn run() -> dlms_core::DlmsResult<()> {
/// let directory = Arc::new(ObjectDirectory::new());
/// let listener = ServerListener::bind("0.0.0.0:4059".parse().unwrap(), directory, ServerConfig::default()).await?;
/// let (_stop, shutdown) = tokio::sync::watch::channel(false);
/// listener.run(shutdown).await
/// # }
/// ```
pub struct ServerListener {
    listener: TcpListener,
    directory: Arc<ObjectDirectory>,
    config: Arc<ServerConfig>,
    next_connection_id: AtomicU64,
}

impl ServerListener {
    /// Bind to `address`.
    ///
    /// # Errors
    /// `Connection` when the address cannot be bound.
    pub async fn bind(
        address: SocketAddr,
        directory: Arc<ObjectDirectory>,
        config: ServerConfig,
    ) -> DlmsResult<Self> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            DlmsError::Connection(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", address, e),
            ))
        })?;
        Ok(Self {
            listener,
            directory,
            config: Arc::new(config),
            next_connection_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> DlmsResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Running associations watch the same signal and end with their next read.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DlmsResult<()> {
        log::info!("DLMS server listening on {}", self.local_addr()?);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("DLMS server stopped accepting connections");
                        return Ok(());
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_association(stream, peer, shutdown.clone()),
                    Err(e) => log::error!("Error accepting connection: {}", e),
                },
            }
        }
    }

    fn spawn_association(&self, stream: TcpStream, peer: SocketAddr, shutdown: watch::Receiver<bool>) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        log::info!("Connection {}: accepted from {}", connection_id, peer);
        let directory = Arc::clone(&self.directory);
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            let session = match open_session(stream, &config) {
                Ok(session) => session,
                Err(e) => {
                    log::error!("Connection {}: transport setup failed: {}", connection_id, e);
                    return;
                }
            };
            // Faults are logged by the association itself.
            let _ = Association::new(session, directory, config, connection_id)
                .with_shutdown(shutdown)
                .run()
                .await;
        });
    }
}

fn open_session(stream: TcpStream, config: &ServerConfig) -> DlmsResult<Box<dyn SessionLayer>> {
    let transport = TcpTransport::from_connected_stream(stream, Some(config.inactivity_timeout()))?;
    Ok(match config.session {
        SessionKind::Hdlc => Box::new(HdlcConnection::new_server(transport, config.hdlc)),
        SessionKind::Wrapper => Box::new(WrapperSession::new_server(transport)),
    })
}
