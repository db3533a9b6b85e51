#![doc = include_str!("../README.md")]

mod client;
/// NNTP command builders and response parsers
pub mod commands;
/// Configuration loading, validation and environment overrides
pub mod config;
/// Upload engine: chunk planning and parallel posting
pub mod engine;
mod error;
/// NZB index generation
pub mod nzb;
/// Orchestration of one complete posting run
pub mod orchestrator;
/// PAR2 recovery set generation
pub mod par2;
/// Output paths and file name handling
pub mod paths;
mod pool;
/// Console progress reporting
pub mod progress;
mod response;
/// Posted segment records
pub mod segments;
/// SFV checksum file generation
pub mod sfv;
/// File splitting into on-disk parts
pub mod splitter;
/// Subject line templating
pub mod subject;
/// yEnc binary encoding/decoding for Usenet articles
pub mod yenc;

pub use client::NntpClient;
pub use config::{Config, ServerConfig};
pub use engine::{upload_parts, NullProgress, ProgressSink};
pub use error::{PostError, Result};
pub use nzb::NzbGenerator;
pub use orchestrator::Orchestrator;
pub use par2::{Par2Generator, RecoverySet};
pub use pool::{NntpConnectionManager, NntpPool};
pub use response::{codes, NntpResponse};
pub use segments::Segment;
pub use sfv::SfvGenerator;
pub use splitter::{FilePart, Splitter};
pub use yenc::{decode as yenc_decode, encode as yenc_encode, YencDecoded, YencEnd, YencHeader};
