//! Connection management for the NNTP client
//!
//! Handles TCP/TLS connection establishment, socket tuning and server
//! greeting validation. TLS uses rustls with the Mozilla root store and
//! SNI taken from the configured hostname.

use crate::config::ServerConfig;
use crate::error::{PostError, Result};
use crate::response::codes;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::state::ConnectionState;
use super::NntpClient;

/// TCP connection timeout in seconds
const TCP_CONNECT_TIMEOUT_SECS: u64 = 120;

/// TLS handshake timeout in seconds
const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 60;

/// BufReader capacity for response reads (64KB)
const BUFREADER_CAPACITY: usize = 64 * 1024;

/// Send buffer size requested from the OS (1MB); posting is upload-heavy
const SEND_BUFFER_SIZE: usize = 1024 * 1024;

/// Socket stream, optionally wrapped in TLS
pub(crate) enum NntpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for NntpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NntpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            NntpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NntpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            NntpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            NntpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NntpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            NntpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NntpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            NntpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

impl NntpClient {
    /// Connect to the NNTP server described by `config`
    ///
    /// Establishes the TCP connection (wrapping it in TLS when `config.ssl`
    /// is set) and consumes the greeting. Does not authenticate; call
    /// [`authenticate`](Self::authenticate) afterwards.
    ///
    /// # Errors
    ///
    /// - [`PostError::Io`] - TCP connection fails
    /// - [`PostError::Tls`] - TLS handshake fails
    /// - [`PostError::Timeout`] - connect or handshake deadline exceeded
    /// - [`PostError::ConnectFailed`] - greeting is anything but 200
    pub async fn connect(config: Arc<ServerConfig>) -> Result<Self> {
        debug!("Connecting to NNTP server {}:{}", config.host, config.port);

        let addr = format!("{}:{}", config.host, config.port);

        use std::net::ToSocketAddrs;
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| {
                PostError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Failed to resolve address: {}", e),
                ))
            })?
            .next()
            .ok_or_else(|| {
                PostError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "No address resolved",
                ))
            })?;

        use socket2::{Domain, Protocol, Socket, Type};
        let domain = if socket_addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(PostError::Io)?;

        // Low latency for the request/response half of the protocol
        socket.set_nodelay(true).map_err(PostError::Io)?;

        // Posting pushes large articles upstream; a bigger send buffer lets
        // the OS keep the pipe full on high-latency links
        if let Err(e) = socket.set_send_buffer_size(SEND_BUFFER_SIZE) {
            warn!(
                "Failed to set send buffer size to {} bytes: {}",
                SEND_BUFFER_SIZE, e
            );
        }

        // socket2 connect is blocking, so run it on the blocking pool.
        // Non-blocking mode is set only after the connect succeeds.
        let socket_addr_for_connect = socket_addr;
        let tcp_stream = timeout(
            Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS),
            tokio::task::spawn_blocking(move || -> std::io::Result<std::net::TcpStream> {
                socket.connect(&socket_addr_for_connect.into())?;
                socket.set_nonblocking(true)?;
                Ok(socket.into())
            }),
        )
        .await
        .map_err(|_| PostError::Timeout)?
        .map_err(|e| PostError::Io(std::io::Error::other(format!("Task join error: {}", e))))?
        .map_err(PostError::Io)?;

        let tcp_stream = TcpStream::from_std(tcp_stream).map_err(PostError::Io)?;

        let stream = if config.ssl {
            use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
            let _ = CryptoProvider::install_default(ring::default_provider());

            let mut root_store = RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let tls_config = ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let connector = TlsConnector::from(Arc::new(tls_config));
            let server_name = ServerName::try_from(config.host.as_str())
                .map_err(|e| PostError::Tls(format!("Invalid domain: {}", e)))?
                .to_owned();

            let tls_stream = timeout(
                Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS),
                connector.connect(server_name, tcp_stream),
            )
            .await
            .map_err(|_| PostError::Timeout)?
            .map_err(|e| PostError::Tls(format!("TLS handshake failed: {}", e)))?;

            NntpStream::Tls(Box::new(tls_stream))
        } else {
            NntpStream::Plain(tcp_stream)
        };

        let mut client = Self {
            stream: BufReader::with_capacity(BUFREADER_CAPACITY, stream),
            state: ConnectionState::Connected,
            config,
            current_group: None,
            is_broken: false,
        };

        let greeting = client.read_response().await?;
        debug!("Server greeting: {} {}", greeting.code, greeting.message);

        if greeting.code != codes::READY_POSTING_ALLOWED {
            return Err(PostError::ConnectFailed(format!(
                "{} {}",
                greeting.code, greeting.message
            )));
        }

        Ok(client)
    }
}
