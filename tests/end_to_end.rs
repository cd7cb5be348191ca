//! Drives a real server over TCP with hand-written HTTP requests.

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};

use pathserve::config::Defaults;
use pathserve::dispatch::Dispatcher;
use pathserve::endpoints;
use pathserve::router::RouteTable;
use pathserve::server::Server;

async fn start(defaults: Defaults) -> SocketAddr {
    let mut routes = RouteTable::with_default_paths();
    let assets = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets");
    endpoints::register_all(&mut routes, &assets).unwrap();

    let server = Server::bind("127.0.0.1:0", Dispatcher::new(routes, defaults))
        .await
        .unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run());
    addr
}

async fn example_server() -> SocketAddr {
    start(endpoints::defaults().unwrap()).await
}

/// Sends raw bytes, half-closes, and collects everything until the server closes.
async fn roundtrip(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

async fn roundtrip_text(addr: SocketAddr, request: &str) -> String {
    String::from_utf8(roundtrip(addr, request.as_bytes()).await).unwrap()
}

/// Splits a response into its head, ending with the last header's CRLF, and its body.
fn split(response: &str) -> (&str, &str) {
    let end = response.find("\r\n\r\n").unwrap();
    (&response[..end + 2], &response[end + 4..])
}

#[tokio::test]
async fn get_example01() {
    let addr = example_server().await;
    let out = roundtrip_text(addr, "GET /example01 HTTP/1.1\r\nHost: t\r\n\r\n").await;
    let (head, body) = split(&out);

    let mut lines = head.lines();
    assert_eq!(lines.next(), Some("HTTP/1.1 200 OK"));
    assert!(lines.next().unwrap().starts_with("Server: pathserve-examples/"));
    assert!(lines.next().unwrap().starts_with("Date: "));
    assert!(head.contains("X-Example-Default-Header: pathserve\r\n"));
    assert!(head.contains("Connection: close\r\n"));
    assert!(head.contains("Content-Type: text/plain\r\n"));
    assert!(head.contains("Content-Length: 12"));
    assert_eq!(body, "Hello world!");
}

#[tokio::test]
async fn head_has_headers_but_no_body() {
    let addr = example_server().await;
    let out = roundtrip_text(addr, "HEAD /example01 HTTP/1.1\r\n\r\n").await;
    let (head, body) = split(&out);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Length: 12"));
    assert_eq!(body, "");
}

#[tokio::test]
async fn options_lists_every_method_for_root() {
    let addr = example_server().await;
    let out = roundtrip_text(addr, "OPTIONS / HTTP/1.1\r\n\r\n").await;
    let (head, body) = split(&out);
    assert!(head.starts_with("HTTP/1.1 204 No Content\r\n"));
    assert!(head.contains("Allow: CONNECT, DELETE, GET, PATCH, POST, PUT\r\n"));
    assert!(!head.contains("Content-Length"));
    assert_eq!(body, "");
}

#[tokio::test]
async fn disabled_head_and_options_are_405() {
    let addr = example_server().await;
    for method in ["HEAD", "OPTIONS"] {
        let out = roundtrip_text(addr, &format!("{method} /example06 HTTP/1.1\r\n\r\n")).await;
        assert!(out.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{method}");
    }
}

#[tokio::test]
async fn unknown_path_and_wrong_method() {
    let addr = example_server().await;
    let out = roundtrip_text(addr, "GET /nope HTTP/1.1\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(out.ends_with("\r\n\r\n"));

    let out = roundtrip_text(addr, "DELETE /example01 HTTP/1.1\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
}

#[tokio::test]
async fn empty_responses_end_with_the_connection() {
    let addr = start(Defaults::new()).await;
    for request in ["GET /nope HTTP/1.1\r\n\r\n", "GET / HTTP/1.1\r\n\r\n"] {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut out = Vec::new();
        timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
            .await
            .expect("server kept the connection open")
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("\r\n\r\n"), "{request}");
        assert!(!text.contains("Content-Length"));
    }
}

#[tokio::test]
async fn echo_content_length_body() {
    let addr = example_server().await;
    let mut request = b"PUT /example2 HTTP/1.1\r\nContent-Length: 6\r\n\r\n".to_vec();
    request.extend_from_slice(b"\x00\x01\x02\xfe\xff\n");
    let out = roundtrip(addr, &request).await;
    assert!(out.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(out.ends_with(b"\r\n\r\n\x00\x01\x02\xfe\xff\n"));
}

#[tokio::test]
async fn echo_chunked_gzip_body() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"compressed payload").unwrap();
    let gz = encoder.finish().unwrap();

    let mut request =
        b"POST /example02 HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Encoding: gzip\r\n\r\n".to_vec();
    let (first, second) = gz.split_at(gz.len() / 2);
    for chunk in [first, second] {
        request.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        request.extend_from_slice(chunk);
        request.extend_from_slice(b"\r\n");
    }
    request.extend_from_slice(b"0\r\n\r\n");

    let out = roundtrip(example_server().await, &request).await;
    let text = String::from_utf8(out).unwrap();
    let (head, body) = split(&text);
    assert!(head.contains("Content-Type: application/octet-stream\r\n"));
    assert!(head.contains("Content-Length: 18\r\n"));
    assert_eq!(body, "compressed payload");
}

#[tokio::test]
async fn request_info_sees_client() {
    let addr = example_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let local = stream.local_addr().unwrap();
    stream
        .write_all(b"GET /example03?example=q%20v HTTP/1.1\r\nX-EXAMPLE: from-test\r\n\r\n")
        .await
        .unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    let (head, body) = split(&text);
    assert!(head.starts_with("HTTP/1.1 202 Accepted\r\n"));
    let info: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(info["tls"], false);
    assert_eq!(info["client_ip_addr"], "127.0.0.1");
    assert_eq!(info["client_port"], local.port());
    assert_eq!(info["path"], "/example03?example=q%20v");
    assert_eq!(info["custom_header"], "from-test");
    assert_eq!(info["custom_query_param"], "q v");
}

#[tokio::test]
async fn template_endpoints() {
    let addr = example_server().await;

    let out = roundtrip(addr, b"GET /example04 HTTP/1.1\r\n\r\n").await;
    let logo = std::fs::read(Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/logo.png")).unwrap();
    assert!(out.ends_with(&logo));

    let out = roundtrip_text(addr, "GET /example05 HTTP/1.1\r\n\r\n").await;
    let (head, body) = split(&out);
    assert!(head.contains("Content-Type: application/json\r\n"));
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    assert!(value["timestamp"].is_i64());
    assert_eq!(value["name"], "pathserve");
}

#[tokio::test]
async fn keep_alive_serves_several_requests() {
    let addr = start(Defaults::new().without_banner()).await;
    let out = roundtrip_text(
        addr,
        "GET /example01 HTTP/1.1\r\n\r\nPOST /example02 HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiGET / HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(out.matches("HTTP/1.1 200 OK\r\n").count(), 3);
    assert!(out.contains("Hello world!"));
    assert!(out.contains("\r\n\r\nhi"));
    assert!(!out.contains("Server:"));
}

#[tokio::test]
async fn malformed_request_gets_400() {
    let addr = example_server().await;
    let out = roundtrip_text(addr, "GARBAGE\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}
