//! TCP server for handling echo connections.
//!
//! Binds the listening socket, accepts connections, and spawns one echo task
//! per connection. Handlers share no state with each other or with the
//! accept loop.

use crate::config::{AcceptErrorPolicy, Config};
use crate::echo::echo;
use crate::listener;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Server instance
pub struct Server {
    config: Config,
    listener: TcpListener,
    connection_limit: Option<Arc<Semaphore>>,
}

impl Server {
    /// Bind the listening socket.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let listener = listener::bind(config.listen, config.backlog)
            .map_err(|e| ServerError::Bind(config.listen, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(config.listen, e))?;
        info!(address = %local_addr, "Server listening");

        let connection_limit = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));

        Ok(Server {
            config,
            listener,
            connection_limit,
        })
    }

    /// Address the server is actually bound to, for tests binding port 0
    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until an accept error stops the loop.
    ///
    /// Only returns when `accept_errors` is `exit` and accepting fails.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            // Wait for a connection slot. The semaphore is never closed.
            let permit = match &self.connection_limit {
                Some(limit) => Arc::clone(limit).acquire_owned().await.ok(),
                None => None,
            };

            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "New connection");
                    let buffer_size = self.config.buffer_size;
                    tokio::spawn(handle_connection(stream, peer, buffer_size, permit));
                }
                Err(e) => match self.config.accept_errors {
                    AcceptErrorPolicy::Exit => return Err(ServerError::Accept(e)),
                    AcceptErrorPolicy::Continue => {
                        warn!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }
    }
}

/// Handle a single client connection.
///
/// Errors stay inside this task; the connection is closed when the stream
/// is dropped.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    buffer_size: usize,
    permit: Option<OwnedSemaphorePermit>,
) {
    match echo(&mut stream, buffer_size).await {
        Ok(bytes) => debug!(%peer, bytes, "Connection closed"),
        Err(e) => debug!(%peer, error = %e, "Connection error"),
    }
    drop(permit);
}

/// Fatal server errors
#[derive(Debug)]
pub enum ServerError {
    Bind(SocketAddr, io::Error),
    Accept(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(addr, e) => write!(f, "Failed to bind to {addr}: {e}"),
            ServerError::Accept(e) => write!(f, "Failed to accept connection: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind(_, e) | ServerError::Accept(e) => Some(e),
        }
    }
}
