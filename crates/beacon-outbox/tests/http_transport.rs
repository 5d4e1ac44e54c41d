//! HttpTransport against a local HTTP responder.

use beacon_core::EventPayload;
use beacon_outbox::{HttpTransport, SendOptions, Transport, TransportError};
use flate2::read::GzDecoder;
use std::io::Read;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

/// One captured HTTP request.
struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serve a single request with the given status and body.
async fn respond_once(status: u16, body: &'static str) -> (Url, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        let length: usize = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);

        while raw.len() < header_end + length {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
        }
        let body_bytes = raw[header_end..header_end + length].to_vec();

        let response = format!(
            "HTTP/1.1 {status} Status\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        let _ = tx.send(Captured {
            request_line,
            headers,
            body: body_bytes,
        });
    });

    (Url::parse(&format!("http://{addr}/batch/")).unwrap(), rx)
}

fn batch() -> Vec<EventPayload> {
    vec![
        EventPayload::builder("signed_up", "user-1").build(),
        EventPayload::builder("clicked", "user-1").build(),
    ]
}

#[tokio::test]
async fn compressed_send_is_gzipped_json() {
    let (endpoint, captured) = respond_once(200, "{}").await;
    let transport = HttpTransport::with_endpoint(endpoint, "phc_test").unwrap();
    let events = batch();

    let delivered = transport
        .send(&events, SendOptions { compression: true })
        .await
        .unwrap();
    assert!(delivered);

    let request = captured.await.unwrap();
    assert_eq!(request.request_line, "POST /batch/ HTTP/1.1");
    assert_eq!(request.header("authorization"), Some("Bearer phc_test"));
    assert_eq!(request.header("content-encoding"), Some("gzip"));
    assert_eq!(request.header("content-type"), Some("text/plain"));

    let mut json = Vec::new();
    GzDecoder::new(&request.body[..]).read_to_end(&mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["events"].as_array().unwrap().len(), 2);
    assert_eq!(value["events"][0]["event"], "signed_up");
    assert_eq!(value["events"][1]["event_id"], events[1].event_id());
    assert!(value["sent_at"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn uncompressed_send_is_plain_json() {
    let (endpoint, captured) = respond_once(202, "").await;
    let transport = HttpTransport::with_endpoint(endpoint, "phc_test").unwrap();

    let delivered = transport
        .send(&batch(), SendOptions { compression: false })
        .await
        .unwrap();
    assert!(delivered);

    let request = captured.await.unwrap();
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("content-encoding"), None);
    let value: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(value["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn quota_response_is_terminal() {
    let (endpoint, _captured) = respond_once(429, r#"{"quota_exhausted":true}"#).await;
    let transport = HttpTransport::with_endpoint(endpoint, "phc_test").unwrap();

    let result = transport.send(&batch(), SendOptions::default()).await;
    assert_eq!(result, Err(TransportError::QuotaExhausted));
}

#[tokio::test]
async fn server_error_is_retryable() {
    let (endpoint, _captured) = respond_once(503, "unavailable").await;
    let transport = HttpTransport::with_endpoint(endpoint, "phc_test").unwrap();

    let error = transport
        .send(&batch(), SendOptions::default())
        .await
        .unwrap_err();
    assert!(error.is_retryable());
}

#[tokio::test]
async fn client_error_carries_status_and_body() {
    let (endpoint, _captured) = respond_once(400, "missing api key").await;
    let transport = HttpTransport::with_endpoint(endpoint, "phc_test").unwrap();

    let result = transport.send(&batch(), SendOptions::default()).await;
    assert_eq!(
        result,
        Err(TransportError::NonRetryable {
            status: 400,
            body: "missing api key".to_string()
        })
    );
}

#[tokio::test]
async fn connection_refused_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = Url::parse(&format!("http://{addr}/batch/")).unwrap();
    let transport = HttpTransport::with_endpoint(endpoint, "phc_test").unwrap();

    let error = transport
        .send(&batch(), SendOptions::default())
        .await
        .unwrap_err();
    assert!(error.is_retryable());
}

#[tokio::test]
async fn unload_send_arrives_uncompressed() {
    let (endpoint, captured) = respond_once(200, "{}").await;
    let transport = HttpTransport::with_endpoint(endpoint, "phc_test").unwrap();

    transport.send_unload(batch());

    let request = tokio::time::timeout(std::time::Duration::from_secs(10), captured)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("content-encoding"), None);
    let value: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(value["events"].as_array().unwrap().len(), 2);
}
