//! Configuration loading and validation
//!
//! Configuration comes from a YAML file (searched in the working directory,
//! `$HOME/.ypost/` and `/etc/ypost/`), can be overridden by `USENET_`-prefixed
//! environment variables (dot replaced by underscore), and is finally
//! overridden by command-line flags. The legacy single-server shape
//! (`nntp.server`, `nntp.port`, ...) is accepted and folded into
//! `nntp.servers[0]`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{PostError, Result};

/// Default maximum part size (750 KiB)
pub const DEFAULT_MAX_PART_SIZE: u64 = 750 * 1024;

/// Default yEnc line length
pub const DEFAULT_LINE_LENGTH: usize = 128;

/// Default subject template
pub const DEFAULT_SUBJECT_TEMPLATE: &str =
    "[{{.Index}}/{{.Total}}] - {{.Filename}} - ({{.Size}}) yEnc ({{.ChunkIndex}}/{{.TotalChunks}})";

/// NNTP server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname (e.g., "news.example.com")
    pub host: String,

    /// Server port (typically 119 for plain, 563 for TLS)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication (empty disables AUTHINFO)
    #[serde(default)]
    pub username: String,

    /// Password for authentication
    #[serde(default)]
    pub password: String,

    /// Use TLS/SSL encryption
    #[serde(default)]
    pub ssl: bool,

    /// Maximum concurrent connections (also the upload worker count)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(
        host: impl Into<String>,
        port: u16,
        ssl: bool,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ssl,
            max_connections: default_max_connections(),
        }
    }

    /// Plain connection on the standard port (119)
    pub fn plain(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 119, false, username, password)
    }

    /// TLS connection on the standard secure port (563)
    pub fn tls(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 563, true, username, password)
    }
}

fn default_port() -> u16 {
    119
}

fn default_max_connections() -> u32 {
    4
}

/// `nntp` configuration section
///
/// Accepts the modern `servers` list as well as the legacy flat keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NntpConfig {
    /// Configured servers, tried in order
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    // Legacy single-server keys, folded into servers[0] by normalize()
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<u32>,
}

/// `posting` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingConfig {
    /// Newsgroup(s) to post to; multiple groups comma-separated
    #[serde(default)]
    pub group: String,

    /// Display name for the From header
    #[serde(default = "default_poster_name")]
    pub poster_name: String,

    /// Email address for the From header
    #[serde(default = "default_poster_email")]
    pub poster_email: String,

    /// Preferred value for the NZB poster attribute; falls back to poster_email
    #[serde(default)]
    pub from: String,

    /// Subject template ({{.Index}}, {{.Total}}, {{.Filename}}, {{.Size}},
    /// {{.ChunkIndex}}, {{.TotalChunks}})
    #[serde(default = "default_subject_template")]
    pub subject_template: String,

    /// yEnc line length
    #[serde(default = "default_line_length")]
    pub max_line_length: usize,

    /// Maximum on-disk part size in bytes
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,

    /// Maximum article payload size in bytes; 0 means "same as max_part_size"
    #[serde(default)]
    pub max_article_size: u64,

    /// Extra headers added to every article
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            group: String::new(),
            poster_name: default_poster_name(),
            poster_email: default_poster_email(),
            from: String::new(),
            subject_template: default_subject_template(),
            max_line_length: default_line_length(),
            max_part_size: default_max_part_size(),
            max_article_size: 0,
            custom_headers: BTreeMap::new(),
        }
    }
}

impl PostingConfig {
    /// Article size actually used for chunking
    pub fn effective_article_size(&self) -> u64 {
        if self.max_article_size == 0 {
            self.max_part_size
        } else {
            self.max_article_size
        }
    }

    /// NZB poster attribute: `from` if set, otherwise `poster_email`
    pub fn nzb_poster(&self) -> &str {
        if self.from.is_empty() {
            &self.poster_email
        } else {
            &self.from
        }
    }

    /// From header value sent on the wire
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.poster_name, self.poster_email)
    }
}

fn default_poster_name() -> String {
    "Usenet Poster".to_string()
}

fn default_poster_email() -> String {
    "poster@example.com".to_string()
}

fn default_subject_template() -> String {
    DEFAULT_SUBJECT_TEMPLATE.to_string()
}

fn default_line_length() -> usize {
    DEFAULT_LINE_LENGTH
}

fn default_max_part_size() -> u64 {
    DEFAULT_MAX_PART_SIZE
}

/// `output` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Base directory for timestamped working directories
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory the finished NZB (and moved PAR2/SFV files) land in
    #[serde(default = "default_nzb_dir")]
    pub nzb_dir: PathBuf,

    /// Directory for log files (empty disables the file writer)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            nzb_dir: default_nzb_dir(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_nzb_dir() -> PathBuf {
    PathBuf::from("./output/nzb")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./output/logs")
}

/// `features` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Generate and post PAR2 recovery volumes
    #[serde(default = "default_true")]
    pub create_par2: bool,

    /// Generate and post an SFV checksum file
    #[serde(default = "default_true")]
    pub create_sfv: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            create_par2: true,
            create_sfv: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `par2` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Par2Config {
    /// Redundancy percentage (1-100)
    #[serde(default = "default_redundancy")]
    pub redundancy: u32,
}

impl Default for Par2Config {
    fn default() -> Self {
        Self {
            redundancy: default_redundancy(),
        }
    }
}

fn default_redundancy() -> u32 {
    10
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nntp: NntpConfig,
    #[serde(default)]
    pub posting: PostingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub par2: Par2Config,
}

impl Config {
    /// Load configuration from `path` (or the default search locations),
    /// apply `USENET_` environment overrides and normalize the legacy shape.
    ///
    /// A missing file is not an error; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(path) {
            Some(found) => {
                let contents = std::fs::read_to_string(&found)?;
                serde_yaml::from_str(&contents).map_err(|e| {
                    PostError::InvalidConfig(format!("{}: {}", found.display(), e))
                })?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    fn locate(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = path {
            return Some(p.to_path_buf());
        }

        let local = PathBuf::from("config.yaml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = std::env::var_os("HOME") {
            let home_config = Path::new(&home).join(".ypost").join("config.yaml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        let system = PathBuf::from("/etc/ypost/config.yaml");
        if system.exists() {
            return Some(system);
        }

        None
    }

    /// Fold legacy `nntp.server` keys into `nntp.servers[0]`
    pub fn normalize(&mut self) {
        if self.nntp.servers.is_empty() {
            if let Some(host) = self.nntp.server.take() {
                self.nntp.servers.push(ServerConfig {
                    host,
                    port: self.nntp.port.unwrap_or_else(default_port),
                    username: self.nntp.username.take().unwrap_or_default(),
                    password: self.nntp.password.take().unwrap_or_default(),
                    ssl: self.nntp.ssl.unwrap_or(false),
                    max_connections: self
                        .nntp
                        .connections
                        .unwrap_or_else(default_max_connections),
                });
            }
        }
        self.nntp.server = None;
        self.nntp.port = None;
        self.nntp.username = None;
        self.nntp.password = None;
        self.nntp.ssl = None;
        self.nntp.connections = None;

        for server in &mut self.nntp.servers {
            if server.max_connections == 0 || server.max_connections > 50 {
                server.max_connections = default_max_connections();
            }
        }
    }

    /// Apply `USENET_`-prefixed environment variables
    ///
    /// Key mapping follows dot-to-underscore substitution, e.g.
    /// `USENET_POSTING_GROUP` overrides `posting.group`. The flat
    /// `USENET_NNTP_*` variables target `servers[0]`.
    pub fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        if let Some(host) = var("USENET_NNTP_SERVER") {
            if self.nntp.servers.is_empty() {
                self.nntp.servers.push(ServerConfig::plain(host, "", ""));
            } else {
                self.nntp.servers[0].host = host;
            }
        }
        if let Some(server) = self.nntp.servers.first_mut() {
            if let Some(port) = var("USENET_NNTP_PORT").and_then(|v| v.parse().ok()) {
                server.port = port;
            }
            if let Some(user) = var("USENET_NNTP_USERNAME") {
                server.username = user;
            }
            if let Some(pass) = var("USENET_NNTP_PASSWORD") {
                server.password = pass;
            }
            if let Some(ssl) = var("USENET_NNTP_SSL").and_then(|v| v.parse().ok()) {
                server.ssl = ssl;
            }
            if let Some(conns) = var("USENET_NNTP_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
                server.max_connections = conns;
            }
        }

        if let Some(group) = var("USENET_POSTING_GROUP") {
            self.posting.group = group;
        }
        if let Some(name) = var("USENET_POSTING_POSTER_NAME") {
            self.posting.poster_name = name;
        }
        if let Some(email) = var("USENET_POSTING_POSTER_EMAIL") {
            self.posting.poster_email = email;
        }
        if let Some(from) = var("USENET_POSTING_FROM") {
            self.posting.from = from;
        }
        if let Some(template) = var("USENET_POSTING_SUBJECT_TEMPLATE") {
            self.posting.subject_template = template;
        }
        if let Some(len) = var("USENET_POSTING_MAX_LINE_LENGTH").and_then(|v| v.parse().ok()) {
            self.posting.max_line_length = len;
        }
        if let Some(size) = var("USENET_POSTING_MAX_PART_SIZE").and_then(|v| v.parse().ok()) {
            self.posting.max_part_size = size;
        }
        if let Some(size) = var("USENET_POSTING_MAX_ARTICLE_SIZE").and_then(|v| v.parse().ok()) {
            self.posting.max_article_size = size;
        }

        if let Some(dir) = var("USENET_OUTPUT_OUTPUT_DIR") {
            self.output.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("USENET_OUTPUT_NZB_DIR") {
            self.output.nzb_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("USENET_OUTPUT_LOG_DIR") {
            self.output.log_dir = PathBuf::from(dir);
        }

        if let Some(par2) = var("USENET_FEATURES_CREATE_PAR2").and_then(|v| v.parse().ok()) {
            self.features.create_par2 = par2;
        }
        if let Some(sfv) = var("USENET_FEATURES_CREATE_SFV").and_then(|v| v.parse().ok()) {
            self.features.create_sfv = sfv;
        }
        if let Some(redundancy) = var("USENET_PAR2_REDUNDANCY").and_then(|v| v.parse().ok()) {
            self.par2.redundancy = redundancy;
        }
    }

    /// Validate the configuration before posting
    pub fn validate(&self) -> Result<()> {
        if self.nntp.servers.is_empty() {
            return Err(PostError::InvalidConfig(
                "at least one NNTP server must be configured".to_string(),
            ));
        }

        for (i, server) in self.nntp.servers.iter().enumerate() {
            if server.host.is_empty() {
                return Err(PostError::InvalidConfig(format!(
                    "server {}: host is required",
                    i + 1
                )));
            }
            if server.port == 0 {
                return Err(PostError::InvalidConfig(format!(
                    "server {}: invalid port",
                    i + 1
                )));
            }
        }

        if self.posting.group.is_empty() {
            return Err(PostError::InvalidConfig(
                "posting group is required".to_string(),
            ));
        }
        if self.posting.max_part_size == 0 {
            return Err(PostError::InvalidConfig(
                "max part size must be positive".to_string(),
            ));
        }
        if self.posting.max_line_length == 0 {
            return Err(PostError::InvalidConfig(
                "max line length must be positive".to_string(),
            ));
        }
        if self.par2.redundancy == 0 || self.par2.redundancy > 100 {
            return Err(PostError::InvalidRedundancy(self.par2.redundancy));
        }

        Ok(())
    }

    /// Produce a commented sample configuration
    pub fn sample() -> Self {
        let mut config = Self::default();
        config.nntp.servers = vec![
            ServerConfig {
                host: "news.example.com".to_string(),
                port: 119,
                username: "your_username".to_string(),
                password: "your_password".to_string(),
                ssl: false,
                max_connections: 4,
            },
            ServerConfig {
                host: "ssl.news.example.com".to_string(),
                port: 563,
                username: "your_username".to_string(),
                password: "your_password".to_string(),
                ssl: true,
                max_connections: 8,
            },
        ];
        config.posting.group = "alt.binaries.test".to_string();
        config.posting.poster_name = "Your Name".to_string();
        config.posting.poster_email = "your.email@example.com".to_string();
        config
            .posting
            .custom_headers
            .insert("X-Usenet-Tool".to_string(), "ypost".to_string());
        config
    }

    /// Write a sample configuration file to `path`
    pub fn write_sample(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let yaml = serde_yaml::to_string(&Self::sample())
            .map_err(|e| PostError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}
