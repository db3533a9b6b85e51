//! Group selection, POST transactions and connection teardown

use super::state::ConnectionState;
use super::NntpClient;
use crate::commands;
use crate::error::{PostError, Result};
use crate::response::codes;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Process-wide strictly increasing nanosecond clock for Message-IDs.
///
/// Seeded from the wall clock on first use, then incremented per article so
/// every Message-ID minted by this process is unique even when articles are
/// posted in the same nanosecond across connections.
static MESSAGE_ID_CLOCK: OnceLock<AtomicU64> = OnceLock::new();

fn next_message_id(host: &str) -> String {
    let clock = MESSAGE_ID_CLOCK.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        AtomicU64::new(nanos)
    });
    let nanos = clock.fetch_add(1, Ordering::Relaxed);
    let secs = nanos / 1_000_000_000;
    format!("<{}.{}@{}>", nanos, secs, host)
}

impl NntpClient {
    /// Select a newsgroup (RFC 3977 Section 6.1.1)
    ///
    /// No-op when `group` is already selected on this connection, so the
    /// upload workers can call it per job without extra round-trips.
    ///
    /// # Errors
    ///
    /// - [`PostError::GroupError`] - server answered anything but 211
    pub async fn join_group(&mut self, group: &str) -> Result<()> {
        if self.current_group.as_deref() == Some(group) {
            return Ok(());
        }

        debug!("Selecting newsgroup: {}", group);

        let cmd = commands::group(group);
        self.send_command(&cmd).await?;
        let response = self.read_response().await?;

        if response.code != codes::GROUP_SELECTED {
            return Err(PostError::GroupError(format!(
                "{}: {} {}",
                group, response.code, response.message
            )));
        }

        self.current_group = Some(group.to_string());
        Ok(())
    }

    /// Post an article (RFC 3977 Section 6.3.1)
    ///
    /// Runs one complete POST transaction:
    ///
    /// 1. `POST`, expect 340
    /// 2. headers (`From`, `Subject`, `Newsgroups`, `Message-ID`, `Date`,
    ///    `Content-Type`, extras), blank line, dot-stuffed body, lone `.`
    /// 3. expect 240
    ///
    /// Headers named in `extra_headers` override the defaults in place;
    /// unnamed extras are appended after `Content-Type`. The body is written
    /// through the send buffer and flushed once per article.
    ///
    /// Returns the minted Message-ID including angle brackets.
    ///
    /// # Errors
    ///
    /// - [`PostError::PostRejected`] - POST refused (not 340) or article
    ///   refused (not 240)
    /// - [`PostError::Timeout`] - server did not respond in time; a timeout
    ///   past the 340 acceptance leaves the transaction irrecoverable and the
    ///   connection is discarded
    pub async fn post_article(
        &mut self,
        group: &str,
        subject: &str,
        from: &str,
        body: &[u8],
        extra_headers: &BTreeMap<String, String>,
    ) -> Result<String> {
        self.send_command(commands::post()).await?;
        let response = self.read_response().await?;

        if response.code != codes::SEND_ARTICLE {
            return Err(PostError::PostRejected(format!(
                "{} {}",
                response.code, response.message
            )));
        }

        self.state = ConnectionState::PostInFlight;

        let message_id = next_message_id(&self.config.host);
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S %z").to_string();

        let article = build_article(
            from,
            subject,
            group,
            &message_id,
            &date,
            body,
            extra_headers,
        );

        // Past this point a failure cannot be rolled back; mark the
        // connection broken on any error so the pool replaces it.
        let outcome = async {
            self.write_raw(&article).await?;
            self.flush().await?;
            self.read_response().await
        }
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                self.mark_broken();
                return Err(e);
            }
        };

        if response.code != codes::ARTICLE_POSTED {
            self.mark_broken();
            return Err(PostError::PostRejected(format!(
                "{} {}",
                response.code, response.message
            )));
        }

        self.state = ConnectionState::Authenticated;
        debug!(message_id = %message_id, "Article posted");
        Ok(message_id)
    }

    /// Close the connection gracefully (RFC 3977 Section 5.4)
    ///
    /// Best-effort: protocol errors during QUIT are ignored. The client is
    /// unusable afterwards and will be discarded by the pool.
    pub async fn quit(&mut self) -> Result<()> {
        debug!("Closing NNTP connection");

        let _ = self.send_command(commands::quit()).await;
        let _ = self.read_response().await;

        self.state = ConnectionState::Closed;
        self.mark_broken();
        Ok(())
    }
}

/// Serialize headers + blank line + dot-stuffed body + terminator
fn build_article(
    from: &str,
    subject: &str,
    group: &str,
    message_id: &str,
    date: &str,
    body: &[u8],
    extra_headers: &BTreeMap<String, String>,
) -> Vec<u8> {
    let defaults: [(&str, &str); 6] = [
        ("From", from),
        ("Subject", subject),
        ("Newsgroups", group),
        ("Message-ID", message_id),
        ("Date", date),
        ("Content-Type", "text/plain; charset=UTF-8"),
    ];

    let mut article = Vec::with_capacity(body.len() + body.len() / 64 + 512);

    for (name, default) in defaults {
        let value = extra_headers.get(name).map(String::as_str).unwrap_or(default);
        article.extend_from_slice(name.as_bytes());
        article.extend_from_slice(b": ");
        article.extend_from_slice(value.as_bytes());
        article.extend_from_slice(b"\r\n");
    }
    for (name, value) in extra_headers {
        if defaults.iter().any(|(n, _)| *n == name.as_str()) {
            continue;
        }
        article.extend_from_slice(name.as_bytes());
        article.extend_from_slice(b": ");
        article.extend_from_slice(value.as_bytes());
        article.extend_from_slice(b"\r\n");
    }

    article.extend_from_slice(b"\r\n");

    let mut lines: Vec<&[u8]> = body.split(|&b| b == b'\n').collect();
    // A body ending in a newline yields a phantom empty final line
    if lines.last() == Some(&&b""[..]) {
        lines.pop();
    }
    for line in lines {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            article.push(b'.');
        }
        article.extend_from_slice(line);
        article.extend_from_slice(b"\r\n");
    }

    article.extend_from_slice(b".\r\n");
    article
}
