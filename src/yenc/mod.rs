//! yEnc binary encoding/decoding for Usenet articles
//!
//! Implements the single-part and multi-part header variants with CRC32
//! framing. Encoding adds 42 (mod 256) to every byte and escapes NUL, TAB,
//! LF, CR and `=`; encoded lines are CR LF terminated and exactly
//! `line_length` bytes wide except the final one.

mod decode;
mod encode;
mod types;

pub use decode::decode;
pub use encode::encode;
pub use types::{YencDecoded, YencEnd, YencHeader};
