//! Bounded NNTP connection pooling built on bb8
//!
//! Each server gets its own pool capped at `max_connections`. Leased clients
//! are exclusive to one caller; broken clients (timeouts, protocol garbage,
//! failed POST past acceptance) are detected on return and replaced on the
//! next acquire. Closing the pool QUITs idle clients and makes further
//! acquires fail with [`PostError::PoolClosed`].

use crate::client::NntpClient;
use crate::config::ServerConfig;
use crate::error::{PostError, Result};
use bb8::{Pool, PooledConnection};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How long an acquire may wait for a free or fresh connection
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);

/// Idle connections are retired after this long
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection manager for the bb8 pool
pub struct NntpConnectionManager {
    config: Arc<ServerConfig>,
}

impl NntpConnectionManager {
    /// Create a new connection manager
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait::async_trait]
impl bb8::ManageConnection for NntpConnectionManager {
    type Connection = NntpClient;
    type Error = PostError;

    async fn connect(&self) -> Result<Self::Connection> {
        let mut client = NntpClient::connect(self.config.clone()).await?;
        client.authenticate().await?;
        Ok(client)
    }

    async fn is_valid(&self, _conn: &mut Self::Connection) -> Result<()> {
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}

/// Bounded pool of authenticated NNTP clients for one server
///
/// # Example
///
/// ```no_run
/// use ypost::{NntpPool, ServerConfig};
///
/// # async fn example() -> ypost::Result<()> {
/// let config = ServerConfig::tls("news.example.com", "user", "pass");
/// let pool = NntpPool::new(config).await?;
///
/// let mut client = pool.acquire().await?;
/// client.join_group("alt.binaries.test").await?;
/// drop(client); // released back to the idle set
///
/// pool.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NntpPool {
    pool: Pool<NntpConnectionManager>,
    closed: Arc<AtomicBool>,
    max_size: u32,
}

impl NntpPool {
    /// Create a pool for `config`, capped at `config.max_connections`
    ///
    /// Connections are created lazily on first acquire.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let max_size = config.max_connections.max(1);
        debug!(
            "Creating NNTP connection pool for {}:{} (max size: {})",
            config.host, config.port, max_size
        );

        let manager = NntpConnectionManager::new(config);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .build_unchecked(manager);

        Ok(Self {
            pool,
            closed: Arc::new(AtomicBool::new(false)),
            max_size,
        })
    }

    /// Lease an authenticated client
    ///
    /// Hands out an idle client when one exists, creates a new one while the
    /// pool is below capacity, and otherwise waits for a release. At most
    /// one caller holds a given client at a time.
    ///
    /// # Errors
    ///
    /// - [`PostError::PoolClosed`] - [`close`](Self::close) was called
    /// - [`PostError::Timeout`] - no client became available in time
    /// - connection/authentication errors from creating a fresh client
    pub async fn acquire(&self) -> Result<PooledConnection<'_, NntpConnectionManager>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PostError::PoolClosed);
        }

        match self.pool.get().await {
            Ok(conn) => Ok(conn),
            Err(bb8::RunError::User(e)) => Err(e),
            Err(bb8::RunError::TimedOut) => Err(PostError::Timeout),
        }
    }

    /// Number of leased plus idle connections (never above the cap)
    pub fn connections(&self) -> u32 {
        self.pool.state().connections
    }

    /// Number of idle connections available
    pub fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }

    /// Close the pool: QUIT idle clients, fail subsequent acquires
    ///
    /// Idle clients are collected (held simultaneously so none is QUIT
    /// twice and none is re-leased) and shut down best-effort. Clients still
    /// leased by a caller are dropped when returned, since `quit` marks them
    /// broken.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let idle = self.pool.state().idle_connections;
        let mut held = Vec::with_capacity(idle as usize);
        for _ in 0..idle.min(self.max_size) {
            // Short deadline: with the closed flag set nobody competes for
            // these, so an idle client is either immediate or gone
            match tokio::time::timeout(Duration::from_millis(250), self.pool.get_owned()).await {
                Ok(Ok(conn)) => held.push(conn),
                _ => break,
            }
        }

        debug!("Closing {} idle NNTP connections", held.len());
        for conn in &mut held {
            let _ = conn.quit().await;
        }
        // Dropping the held leases returns them broken; bb8 discards them
    }

    /// Whether the pool was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
