use netrecon::probe::{probe_port, Prober};
use netrecon::types::ProbeResult;
use openssl::pkey::PKey;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslVersion};
use openssl::x509::X509;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_openssl::SslStream;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const EC_CERT: &[u8] = include_bytes!("fixtures/cert.pem");
const EC_KEY: &[u8] = include_bytes!("fixtures/key.pem");
const RSA1024_CERT: &[u8] = include_bytes!("fixtures/rsa1024_cert.pem");
const RSA1024_KEY: &[u8] = include_bytes!("fixtures/rsa1024_key.pem");
const RSA2048_CERT: &[u8] = include_bytes!("fixtures/rsa2048_cert.pem");
const RSA2048_KEY: &[u8] = include_bytes!("fixtures/rsa2048_key.pem");

/// Serve `payload` to every connection, then hold it open for a while.
async fn spawn_writer(payload: &'static [u8]) -> u16 {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = sock.write_all(payload).await;
                tokio::time::sleep(Duration::from_secs(3)).await;
            });
        }
    });
    port
}

/// Read from `sock` until a blank line ends the request, EOF, or one second
/// of silence.
async fn read_request(sock: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        match tokio::time::timeout(Duration::from_secs(1), sock.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.ends_with(b"\r\n\r\n") {
                    break;
                }
            }
            _ => break,
        }
    }
    buf
}

/// Stay silent on the first connection until a full request arrives, answer
/// it with `reply`, and hand back what the client sent. Later connections are
/// dropped on accept.
async fn spawn_responder(reply: &'static [u8]) -> (u16, oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut sock, _)) = listener.accept().await else {
            return;
        };
        let request = read_request(&mut sock).await;
        if request.ends_with(b"\r\n\r\n") {
            let _ = sock.write_all(reply).await;
        }
        let _ = tx.send(request);
        while let Ok((other, _)) = listener.accept().await {
            drop(other);
        }
    });
    (port, rx)
}

fn server_context(cert: &[u8], key: &[u8], tune: impl FnOnce(&mut SslContextBuilder)) -> SslContext {
    let mut builder = SslContext::builder(SslMethod::tls_server()).unwrap();
    builder.set_cipher_list("ALL:@SECLEVEL=0").unwrap();
    tune(&mut builder);
    builder.set_certificate(&X509::from_pem(cert).unwrap()).unwrap();
    builder
        .set_private_key(&PKey::private_key_from_pem(key).unwrap())
        .unwrap();
    builder.build()
}

async fn spawn_tls(ctx: SslContext) -> u16 {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let ssl = Ssl::new(&ctx).unwrap();
                let mut stream = SslStream::new(ssl, sock).unwrap();
                if Pin::new(&mut stream).accept().await.is_ok() {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            });
        }
    });
    port
}

#[tokio::test]
async fn nothing_listening_is_closed_within_timeout() {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let timeout = Duration::from_millis(500);
    let start = Instant::now();
    let res = probe_port(LOCALHOST, port, timeout).await;
    assert!(start.elapsed() < timeout + Duration::from_millis(250));
    assert_eq!(res, ProbeResult::closed(port));
}

#[tokio::test]
async fn greeting_banner_is_captured_passively() {
    let port = spawn_writer(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let res = probe_port(LOCALHOST, port, Duration::from_millis(500)).await;
    assert!(res.open);
    assert_eq!(res.banner.as_deref(), Some("SSH-2.0-OpenSSH_9.6"));
    assert_eq!(res.tls_version, None);
    assert_eq!(res.tls_cipher, None);
}

#[tokio::test]
async fn http_response_yields_server_header() {
    let port = spawn_writer(
        b"HTTP/1.1 200 OK\r\nDate: Mon, 19 Oct 2026 10:00:00 GMT\r\nServer: test-httpd/1.0\r\nContent-Length: 0\r\n\r\n",
    )
    .await;
    let res = probe_port(LOCALHOST, port, Duration::from_millis(500)).await;
    assert!(res.open);
    assert_eq!(res.banner.as_deref(), Some("Server: test-httpd/1.0"));
}

#[tokio::test]
async fn silent_service_is_open_with_empty_fields() {
    let port = spawn_writer(b"").await;
    let res = probe_port(LOCALHOST, port, Duration::from_millis(200)).await;
    assert!(res.open);
    assert_eq!(res.banner, None);
    assert_eq!(res.tls_version, None);
}

#[tokio::test]
async fn http_port_gets_head_request_and_reports_server_header() {
    let (port, request) = spawn_responder(
        b"HTTP/1.0 200 OK\r\nDate: Mon, 19 Oct 2026 10:00:00 GMT\r\nServer: lab-httpd/2.4\r\n\r\n",
    )
    .await;
    let prober = Prober::new(Duration::from_millis(500)).with_http_ports([port]);
    let res = prober.probe(LOCALHOST, port).await;

    assert_eq!(request.await.unwrap(), b"HEAD / HTTP/1.0\r\nHost: 127.0.0.1\r\n\r\n");
    assert!(res.open);
    assert_eq!(res.banner.as_deref(), Some("Server: lab-httpd/2.4"));
}

#[tokio::test]
async fn other_ports_are_read_passively() {
    let (port, request) = spawn_responder(b"HTTP/1.0 200 OK\r\nServer: lab-httpd/2.4\r\n\r\n").await;
    let prober = Prober::new(Duration::from_millis(200));
    let res = prober.probe(LOCALHOST, port).await;

    assert!(request.await.unwrap().is_empty());
    assert!(res.open);
    assert_eq!(res.banner, None);
}

#[tokio::test]
async fn tls_endpoint_reports_version_and_cipher() {
    let port = spawn_tls(server_context(EC_CERT, EC_KEY, |_| {})).await;
    let prober = Prober::new(Duration::from_millis(500));
    let res = prober.probe(LOCALHOST, port).await;
    assert!(res.open);
    assert_eq!(res.tls_version.as_deref(), Some("TLS 1.3"));
    let cipher = res.tls_cipher.unwrap();
    assert!(cipher.starts_with("TLS_"), "{cipher}");
}

#[tokio::test]
async fn short_rsa_key_still_reports_tls() {
    let ctx = server_context(RSA1024_CERT, RSA1024_KEY, |b| {
        b.set_max_proto_version(Some(SslVersion::TLS1_2)).unwrap();
        b.set_cipher_list("ECDHE-RSA-AES128-GCM-SHA256:@SECLEVEL=0").unwrap();
    });
    let port = spawn_tls(ctx).await;
    let prober = Prober::new(Duration::from_millis(1000));
    let info = prober.inspect_tls((LOCALHOST, port).into()).await.unwrap();
    assert_eq!(info.version, "TLS 1.2");
    assert_eq!(info.cipher, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256");
}

#[tokio::test]
async fn cbc_only_server_reports_tls() {
    let ctx = server_context(RSA2048_CERT, RSA2048_KEY, |b| {
        b.set_max_proto_version(Some(SslVersion::TLS1_2)).unwrap();
        b.set_cipher_list("ECDHE-RSA-AES128-SHA:@SECLEVEL=0").unwrap();
    });
    let port = spawn_tls(ctx).await;
    let prober = Prober::new(Duration::from_millis(1000));
    let info = prober.inspect_tls((LOCALHOST, port).into()).await.unwrap();
    assert_eq!(info.version, "TLS 1.2");
    assert_eq!(info.cipher, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA");
}

#[tokio::test]
async fn tls10_only_server_reports_old_version() {
    let ctx = server_context(RSA2048_CERT, RSA2048_KEY, |b| {
        b.set_min_proto_version(Some(SslVersion::TLS1)).unwrap();
        b.set_max_proto_version(Some(SslVersion::TLS1)).unwrap();
        b.set_cipher_list("ECDHE-RSA-AES128-SHA:@SECLEVEL=0").unwrap();
    });
    let port = spawn_tls(ctx).await;
    let prober = Prober::new(Duration::from_millis(1000));
    let info = prober.inspect_tls((LOCALHOST, port).into()).await.unwrap();
    assert_eq!(info.version, "TLS 1.0");
    assert_eq!(info.cipher, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA");
}

#[tokio::test]
async fn plaintext_endpoint_has_no_tls() {
    let port = spawn_writer(b"220 ftp ready\r\n").await;
    let prober = Prober::new(Duration::from_millis(500));
    let addr: SocketAddr = (LOCALHOST, port).into();
    assert_eq!(prober.inspect_tls(addr).await, None);
}
