#![allow(dead_code)]
//! In-process mock NNTP server for integration tests
//!
//! Speaks just enough of the posting subset: greeting, AUTHINFO USER/PASS,
//! GROUP, POST (with dot-stuffed article capture) and QUIT. Captures every
//! received article and tracks concurrent connection counts.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

/// One captured POST transaction
#[derive(Debug, Clone)]
pub struct ReceivedArticle {
    /// Header name -> value
    pub headers: HashMap<String, String>,
    /// Body lines exactly as on the wire (dot-stuffed, no CRLF)
    pub raw_body: Vec<Vec<u8>>,
    /// Body lines with dot-stuffing removed
    pub body: Vec<Vec<u8>>,
}

impl ReceivedArticle {
    /// Unstuffed body rejoined with CRLF (the yEnc block as posted)
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in &self.body {
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Default)]
pub struct ServerState {
    pub articles: Mutex<Vec<ReceivedArticle>>,
    pub groups_joined: Mutex<Vec<String>>,
    current_connections: AtomicUsize,
    peak_connections: AtomicUsize,
    pub reject_posts: AtomicBool,
    pub reject_auth: AtomicBool,
}

/// Mock server bound to an ephemeral localhost port
pub struct MockNntpServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

impl MockNntpServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(ServerState::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let now = state.current_connections.fetch_add(1, Ordering::SeqCst) + 1;
                    state.peak_connections.fetch_max(now, Ordering::SeqCst);
                    let _ = handle_connection(socket, &state).await;
                    state.current_connections.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        Self { addr, state }
    }

    pub fn articles(&self) -> Vec<ReceivedArticle> {
        self.state.articles.lock().expect("articles lock").clone()
    }

    pub fn article_count(&self) -> usize {
        self.state.articles.lock().expect("articles lock").len()
    }

    pub fn groups_joined(&self) -> Vec<String> {
        self.state.groups_joined.lock().expect("groups lock").clone()
    }

    pub fn peak_connections(&self) -> usize {
        self.state.peak_connections.load(Ordering::SeqCst)
    }
}

async fn handle_connection(socket: TcpStream, state: &ServerState) -> std::io::Result<()> {
    let (read_half, mut writer) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    writer.write_all(b"200 mock server ready\r\n").await?;

    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        let command = String::from_utf8_lossy(&line).trim_end().to_string();
        let upper = command.to_uppercase();

        if upper.starts_with("AUTHINFO USER") {
            writer.write_all(b"381 password required\r\n").await?;
        } else if upper.starts_with("AUTHINFO PASS") {
            if state.reject_auth.load(Ordering::SeqCst) {
                writer.write_all(b"481 authentication rejected\r\n").await?;
            } else {
                writer.write_all(b"281 authentication accepted\r\n").await?;
            }
        } else if let Some(group) = command.strip_prefix("GROUP ") {
            state
                .groups_joined
                .lock()
                .expect("groups lock")
                .push(group.to_string());
            writer.write_all(b"211 0 1 1 group selected\r\n").await?;
        } else if upper == "POST" {
            if state.reject_posts.load(Ordering::SeqCst) {
                writer.write_all(b"440 posting not permitted\r\n").await?;
                continue;
            }
            writer.write_all(b"340 send article\r\n").await?;
            let article = read_article(&mut reader).await?;
            state.articles.lock().expect("articles lock").push(article);
            writer.write_all(b"240 article received\r\n").await?;
        } else if upper == "QUIT" {
            writer.write_all(b"205 closing connection\r\n").await?;
            return Ok(());
        } else {
            writer.write_all(b"500 unknown command\r\n").await?;
        }
    }
}

/// Consume headers, blank line and dot-stuffed body up to the lone `.`
async fn read_article(reader: &mut BufReader<OwnedReadHalf>) -> std::io::Result<ReceivedArticle> {
    let mut headers = HashMap::new();
    let mut raw_body = Vec::new();
    let mut body = Vec::new();
    let mut in_headers = true;

    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-article",
            ));
        }

        let content = strip_crlf(&line);

        if in_headers {
            if content.is_empty() {
                in_headers = false;
                continue;
            }
            let text = String::from_utf8_lossy(content);
            if let Some((name, value)) = text.split_once(": ") {
                headers.insert(name.to_string(), value.to_string());
            }
            continue;
        }

        if content == b"." {
            break;
        }

        raw_body.push(content.to_vec());
        let unstuffed = if content.starts_with(b"..") {
            content[1..].to_vec()
        } else {
            content.to_vec()
        };
        body.push(unstuffed);
    }

    Ok(ReceivedArticle {
        headers,
        raw_body,
        body,
    })
}

fn strip_crlf(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
