//! NNTP client implementation with optional TLS

mod auth;
mod connection;
mod io;
mod posting;
mod state;

use connection::NntpStream;

use crate::config::ServerConfig;
use state::ConnectionState;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::debug;

/// Async NNTP client for posting articles
///
/// # Example
///
/// ```no_run
/// use ypost::{NntpClient, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> ypost::Result<()> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
/// let mut client = NntpClient::connect(Arc::new(config)).await?;
/// client.authenticate().await?;
/// client.join_group("alt.binaries.test").await?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct NntpClient {
    /// Buffered stream (plain TCP or TLS)
    stream: BufReader<NntpStream>,
    /// Connection state
    state: ConnectionState,
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Currently selected newsgroup
    current_group: Option<String>,
    /// Whether this connection is broken and must be discarded
    is_broken: bool,
}

impl NntpClient {
    /// Check if this connection is broken and should be discarded
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Mark this connection as broken
    pub(super) fn mark_broken(&mut self) {
        self.is_broken = true;
    }

    /// Get the currently selected newsgroup, if any
    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_deref()
    }

    /// Check if the client is currently authenticated
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, ConnectionState::Authenticated)
    }
}

impl Drop for NntpClient {
    fn drop(&mut self) {
        debug!(host = %self.config.host, "NntpClient dropped");
    }
}
