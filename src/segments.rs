//! Posted segment records

use chrono::{DateTime, Utc};

/// Record of one successfully posted article
///
/// Produced by an upload worker on the server's 240 response and consumed by
/// the NZB assembler; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Message-ID without angle brackets, as referenced from the NZB
    pub message_id: String,
    /// 1-based chunk ordinal within the logical file
    pub number: u32,
    /// Total chunks of the logical file
    pub total: u32,
    /// Name of the logical file this segment belongs to
    pub file_name: String,
    /// Subject line as sent
    pub subject: String,
    /// When the server accepted the article
    pub posted_at: DateTime<Utc>,
    /// Raw (unencoded) payload length in bytes
    pub bytes: u64,
}
