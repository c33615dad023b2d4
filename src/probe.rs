//! Single-port probe: TCP connect, banner capture and TLS inspection.
//!
//! A probe never fails. Refused, filtered and unreachable all come back as a
//! closed [`ProbeResult`]; a port that answers but refuses TLS is simply open
//! with empty TLS fields.

use crate::types::ProbeResult;
use openssl::error::ErrorStack;
use openssl::ssl::{Ssl, SslContext, SslMethod, SslVerifyMode, SslVersion};
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_openssl::SslStream;
use tracing::{debug, trace, warn};

/// Upper bound on bytes inspected for a banner.
pub const BANNER_CAP: usize = 1024;

/// Banners without a `Server:` line are cut to this many characters.
pub const BANNER_MAX_CHARS: usize = 200;

/// Ports that get a `HEAD` request before reading, unless overridden with
/// [`Prober::with_http_ports`].
pub const DEFAULT_HTTP_PORTS: [u16; 3] = [80, 8080, 8000];

/// Client cipher list: everything the library still knows, security level 0
/// so short RSA keys, SHA-1 signatures and TLS 1.0/1.1 stay negotiable.
const TLS_CIPHERS: &str = "ALL:@SECLEVEL=0";

/// Negotiated TLS parameters of an open port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    pub version: String,
    pub cipher: String,
}

/// Probes ports with a fixed deadline. Cheap to share behind an `Arc`.
#[derive(Clone)]
pub struct Prober {
    timeout: Duration,
    http_ports: Arc<[u16]>,
    tls: Option<SslContext>,
}

impl Prober {
    pub fn new(timeout: Duration) -> Self {
        let tls = match tls_context() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!(error = %e, "TLS client setup failed, TLS inspection disabled");
                None
            }
        };
        Self {
            timeout,
            http_ports: Arc::from(DEFAULT_HTTP_PORTS.as_slice()),
            tls,
        }
    }

    /// Replace the set of ports that receive a `HEAD` request.
    pub fn with_http_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.http_ports = ports.into_iter().collect();
        self
    }

    /// Probe one address:port. Always yields a result.
    pub async fn probe(&self, ip: IpAddr, port: u16) -> ProbeResult {
        let addr = SocketAddr::new(ip, port);
        let mut stream = match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                trace!(%addr, error = %e, "connect failed");
                return ProbeResult::closed(port);
            }
            Err(_) => {
                trace!(%addr, "connect timed out");
                return ProbeResult::closed(port);
            }
        };

        let banner = self.grab_banner(&mut stream, ip, port).await;
        drop(stream);

        let tls = self.inspect_tls(addr).await;
        debug!(%addr, banner = banner.is_some(), tls = tls.is_some(), "port open");

        let (tls_version, tls_cipher) = match tls {
            Some(info) => (Some(info.version), Some(info.cipher)),
            None => (None, None),
        };
        ProbeResult {
            port,
            open: true,
            banner,
            tls_version,
            tls_cipher,
        }
    }

    /// Read a banner from an already connected stream.
    ///
    /// Cleartext HTTP ports are nudged with a `HEAD` request first. The
    /// response is peeked; only HTTP-looking data is then consumed line by
    /// line up to the end of the header block. Everything shares one
    /// deadline and one byte budget.
    async fn grab_banner(&self, stream: &mut TcpStream, ip: IpAddr, port: u16) -> Option<String> {
        let deadline = Instant::now() + self.timeout;

        if self.http_ports.contains(&port) {
            let request = format!("HEAD / HTTP/1.0\r\nHost: {}\r\n\r\n", host_header(ip));
            if let Ok(Err(e)) = time::timeout_at(deadline, stream.write_all(request.as_bytes())).await {
                trace!(%ip, port, error = %e, "HEAD probe write failed");
            }
        }

        let mut buf = vec![0u8; BANNER_CAP];
        let n = match time::timeout_at(deadline, stream.peek(&mut buf)).await {
            Ok(Ok(n)) => n,
            _ => 0,
        };
        if n == 0 {
            return None;
        }
        buf.truncate(n);

        if looks_like_http(&buf) {
            let head = read_header_block(stream, deadline).await;
            if head.len() > buf.len() {
                return extract_banner(&head);
            }
        }
        extract_banner(&buf)
    }

    /// Fresh connection, TLS handshake without certificate validation.
    ///
    /// Neither the chain nor the handshake signature is checked, so
    /// self-signed, expired and short-key certificates all still report.
    pub async fn inspect_tls(&self, addr: SocketAddr) -> Option<TlsInfo> {
        let ctx = self.tls.as_ref()?;
        let tls = match time::timeout(self.timeout, tls_handshake(ctx, addr)).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                trace!(%addr, error = %e, "TLS handshake failed");
                return None;
            }
            Err(_) => {
                trace!(%addr, "TLS handshake timed out");
                return None;
            }
        };

        let ssl = tls.ssl();
        let cipher = ssl.current_cipher()?;
        Some(TlsInfo {
            version: tls_version_label(ssl.version_str()),
            cipher: cipher.standard_name().unwrap_or(cipher.name()).to_string(),
        })
    }
}

async fn tls_handshake(ctx: &SslContext, addr: SocketAddr) -> anyhow::Result<SslStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let ssl = Ssl::new(ctx)?;
    let mut stream = SslStream::new(ssl, tcp)?;
    Pin::new(&mut stream).connect().await?;
    Ok(stream)
}

/// Convenience wrapper for a one-off probe.
pub async fn probe_port(ip: IpAddr, port: u16, timeout: Duration) -> ProbeResult {
    Prober::new(timeout).probe(ip, port).await
}

async fn read_header_block(stream: &mut TcpStream, deadline: Instant) -> Vec<u8> {
    let mut reader = BufReader::new(stream).take(BANNER_CAP as u64);
    let mut head = Vec::with_capacity(BANNER_CAP);
    loop {
        let start = head.len();
        match time::timeout_at(deadline, reader.read_until(b'\n', &mut head)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(_)) => {
                let line = &head[start..];
                if line == b"\r\n" || line == b"\n" {
                    break;
                }
            }
        }
    }
    head
}

fn looks_like_http(data: &[u8]) -> bool {
    data.len() >= 5 && data[..5].eq_ignore_ascii_case(b"HTTP/")
}

fn host_header(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

/// Pick the banner out of raw bytes: the `Server:` header line when there is
/// one, otherwise the first [`BANNER_MAX_CHARS`] characters. Returns `None`
/// when nothing printable is left after normalization.
pub fn extract_banner(data: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(data);
    let raw: String = match server_header_line(&text) {
        Some(line) => line.to_string(),
        None => text.chars().take(BANNER_MAX_CHARS).collect(),
    };
    let banner = normalize_banner(&raw);
    (!banner.is_empty()).then_some(banner)
}

fn server_header_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim_start).find(|line| {
        line.get(..7)
            .is_some_and(|name| name.eq_ignore_ascii_case("server:"))
    })
}

/// Drop carriage returns, fold newlines into single spaces, trim the ends.
pub fn normalize_banner(raw: &str) -> String {
    raw.replace('\r', "")
        .split('\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable protocol label from OpenSSL's version name, e.g.
/// `TLSv1.2` becomes `TLS 1.2`. Names outside the TLS/SSL families pass
/// through unchanged.
pub fn tls_version_label(name: &str) -> String {
    match name {
        "TLSv1" => "TLS 1.0".into(),
        "SSLv3" => "SSL 3.0".into(),
        other => match other.strip_prefix("TLSv") {
            Some(num) => format!("TLS {num}"),
            None => other.to_string(),
        },
    }
}

fn tls_context() -> Result<SslContext, ErrorStack> {
    let mut builder = SslContext::builder(SslMethod::tls_client())?;
    builder.set_verify(SslVerifyMode::NONE);
    builder.set_cipher_list(TLS_CIPHERS)?;
    builder.set_min_proto_version(Some(SslVersion::TLS1))?;
    builder.set_max_proto_version(None)?;
    Ok(builder.build())
}
