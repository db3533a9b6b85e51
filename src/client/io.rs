//! Low-level I/O operations for the NNTP line protocol
//!
//! Command transmission, buffered article writes with an explicit flush at
//! the end of the article, and single-line response parsing under a
//! deadline.

use super::NntpClient;
use crate::commands;
use crate::error::{PostError, Result};
use crate::response::NntpResponse;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::trace;

/// Deadline for any single-line response
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

impl NntpClient {
    /// Send a command and flush immediately
    pub(super) async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!("Sending command: {}", command.trim_end());
        self.stream.get_mut().write_all(command.as_bytes()).await?;
        self.stream.get_mut().flush().await?;
        Ok(())
    }

    /// Queue raw bytes without flushing (article body transmission)
    pub(super) async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.get_mut().write_all(bytes).await?;
        Ok(())
    }

    /// Flush everything queued with [`write_raw`](Self::write_raw)
    pub(super) async fn flush(&mut self) -> Result<()> {
        self.stream.get_mut().flush().await?;
        Ok(())
    }

    /// Read a single-line response
    ///
    /// A deadline miss marks the connection broken and surfaces
    /// [`PostError::Timeout`]; the socket is abandoned when the client is
    /// dropped by the pool.
    pub(super) async fn read_response(&mut self) -> Result<NntpResponse> {
        use tokio::io::AsyncBufReadExt;

        let read_future = async {
            let mut line_bytes = Vec::with_capacity(512);
            self.stream.read_until(b'\n', &mut line_bytes).await?;

            if line_bytes.is_empty() {
                return Err(PostError::ConnectionClosed);
            }

            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end();
            trace!("Received: {}", line);

            commands::parse_single_response(line)
        };

        let result = timeout(RESPONSE_TIMEOUT, read_future)
            .await
            .map_err(|_| PostError::Timeout);

        match result {
            Ok(inner) => {
                if matches!(inner, Err(PostError::InvalidResponse(_))) {
                    self.mark_broken();
                }
                inner
            }
            Err(e) => {
                self.mark_broken();
                Err(e)
            }
        }
    }
}
