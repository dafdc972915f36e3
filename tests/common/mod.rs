//! Shared helpers for integration tests: throwaway document roots and a
//! minimal raw TCP client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use docserve::config::Config;
use docserve::server::{Admission, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub const INDEX_BODY: &[u8] = b"<html><body>index</body></html>";
pub const NOT_FOUND_BODY: &[u8] = b"<html><body>missing</body></html>";
pub const SECRET_BODY: &[u8] = b"outside the root";

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A directory under the system temp dir, removed on drop.
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "docserve-{}-{}-{}",
            label,
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Layout:
///
/// ```text
/// <tmp>/client/index.html
/// <tmp>/client/docs/index.html
/// <tmp>/notFoundHTML/notFound.html
/// <tmp>/secret.txt
/// ```
pub struct Fixture {
    pub dir: TempDir,
    pub config: Config,
}

pub fn fixture(label: &str) -> Fixture {
    let dir = TempDir::new(label);
    dir.write("client/index.html", INDEX_BODY);
    dir.write("client/docs/index.html", b"docs index");
    dir.write("notFoundHTML/notFound.html", NOT_FOUND_BODY);
    dir.write("secret.txt", SECRET_BODY);

    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1:0".to_string();
    config.server.read_timeout_ms = 30_000;
    config.server.shutdown_grace_ms = 100;
    config.static_files.root = dir.path().join("client");
    config.static_files.not_found_root = dir.path().join("notFoundHTML");

    Fixture { dir, config }
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub admission: Admission,
    pub handle: JoinHandle<()>,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start(config: &Config) -> RunningServer {
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let admission = server.admission();

    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    RunningServer {
        addr,
        admission,
        handle,
    }
}

/// Sends raw request bytes and reads until the server closes.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    read_all(&mut stream).await
}

pub async fn get(addr: SocketAddr, path: &str) -> Vec<u8> {
    send_raw(addr, format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path).as_bytes()).await
}

pub async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap();
    buf
}

pub struct Parsed {
    pub status_line: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Splits a response into status line, content type and body.
pub fn parse_response(raw: &[u8]) -> Parsed {
    let head_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = std::str::from_utf8(&raw[..head_end]).unwrap();
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap().to_string();
    let content_type = lines
        .find_map(|l| l.strip_prefix("Content-type: "))
        .expect("missing Content-type header")
        .to_string();

    let body = raw[head_end + 4..]
        .strip_suffix(b"\r\n")
        .expect("missing trailing line terminator")
        .to_vec();

    Parsed {
        status_line,
        content_type,
        body,
    }
}

/// Polls until `check` holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
