//! Retry-policy tests against a scripted local HTTP server.
//!
//! The server is a bare `TcpListener` that answers each connection with
//! the next canned response and then closes the socket, so every request
//! the client makes is observable as one accepted connection.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use keirin_api::{ApiError, WinticketClient, WinticketConfig};

fn http_response(status: u16, reason: &str, extra_headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in extra_headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!(
        "Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    response
}

/// Serve the canned responses in order, one per connection. Returns the
/// base URL and a channel that reports how many requests were served.
async fn scripted_server(responses: Vec<String>) -> (String, mpsc::UnboundedReceiver<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (served, response) in responses.into_iter().enumerate() {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            let _ = tx.send(served + 1);
        }
    });

    (base_url, rx)
}

fn client_for(base_url: &str) -> WinticketClient {
    WinticketClient::new(WinticketConfig {
        base_url: base_url.to_string(),
        request_interval: 0.0,
        retry_count: 3,
        retry_backoff_base: 0.0,
        jitter: 0.0,
    })
    .unwrap()
}

fn last_served(rx: &mut mpsc::UnboundedReceiver<usize>) -> usize {
    let mut count = 0;
    while let Ok(served) = rx.try_recv() {
        count = served;
    }
    count
}

#[tokio::test]
async fn recovers_after_server_errors() {
    let ok_body = r#"{"month":{"regions":[],"venues":[],"cups":[]}}"#;
    let (base_url, mut rx) = scripted_server(vec![
        http_response(500, "Internal Server Error", &[], "{}"),
        http_response(502, "Bad Gateway", &[], "{}"),
        http_response(200, "OK", &[], ok_body),
    ])
    .await;

    let client = client_for(&base_url);
    let response = client.get_monthly_cups("20240101").await.unwrap();
    assert!(response.month.is_some());
    assert_eq!(last_served(&mut rx), 3);
}

#[tokio::test]
async fn gives_up_after_retry_budget_on_persistent_5xx() {
    let (base_url, mut rx) = scripted_server(vec![
        http_response(500, "Internal Server Error", &[], "{}"),
        http_response(500, "Internal Server Error", &[], "{}"),
        http_response(500, "Internal Server Error", &[], "{}"),
    ])
    .await;

    let client = client_for(&base_url);
    let err = client.get_monthly_cups("20240101").await.unwrap_err();
    assert!(matches!(err, ApiError::RetriesExhausted { .. }));
    assert_eq!(last_served(&mut rx), 3);
}

#[tokio::test]
async fn non_retryable_4xx_fails_on_first_attempt() {
    let (base_url, mut rx) = scripted_server(vec![
        http_response(404, "Not Found", &[], "{}"),
        http_response(200, "OK", &[], "{}"),
    ])
    .await;

    let client = client_for(&base_url);
    let err = client.get_monthly_cups("20240101").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));
    assert_eq!(last_served(&mut rx), 1);
}

#[tokio::test]
async fn honors_retry_after_on_429() {
    let ok_body = r#"{"month":{"regions":[],"venues":[],"cups":[]}}"#;
    let (base_url, mut rx) = scripted_server(vec![
        http_response(429, "Too Many Requests", &[("Retry-After", "0")], "{}"),
        http_response(200, "OK", &[], ok_body),
    ])
    .await;

    let client = client_for(&base_url);
    let response = client.get_monthly_cups("20240101").await.unwrap();
    assert!(response.month.is_some());
    assert_eq!(last_served(&mut rx), 2);
}

#[tokio::test]
async fn invalid_json_on_success_is_a_decode_error() {
    let (base_url, mut rx) = scripted_server(vec![http_response(
        200,
        "OK",
        &[],
        "<html>not json</html>",
    )])
    .await;

    let client = client_for(&base_url);
    let err = client.get_monthly_cups("20240101").await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
    assert_eq!(last_served(&mut rx), 1);
}
