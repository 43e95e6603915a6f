//! OpenAI-compatible gateway against a one-shot HTTP server on 127.0.0.1.
//!
//! Covers the wire format and status classification without any real
//! provider.

use receipt2json::{
    DocumentType, ExtractError, ExtractionAgent, GatewayOptions, ImageInput, OpenAiCompatibleGateway, ProviderError,
    SchemaVersion, VisionModel, VisionRequest,
};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ── One-shot server ──────────────────────────────────────────────────────────

/// Accept one connection, capture the request, answer with a canned response.
async fn serve_once(status_line: &'static str, extra_headers: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let request = read_request(&mut sock).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        );
        sock.write_all(response.as_bytes()).await.unwrap();
        let _ = sock.shutdown().await;
        request
    });
    (format!("http://{addr}/v1"), handle)
}

async fn read_request(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn completion(content: &str) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1200, "completion_tokens": 80}
    })
    .to_string()
}

fn receipt_json() -> String {
    json!({
        "document_type": "receipt",
        "receipt_data": {
            "merchant_name": "Cafe Luna",
            "currency": "USD",
            "date": "2024-01-15",
            "time": "09:41",
            "line_items": [
                {"description": "Coffee", "quantity": 2, "unit_price": 3.5, "total_price": 7.0}
            ],
            "subtotal": 7.0,
            "tax": null,
            "total": 7.0,
            "payment_method": "card",
            "receipt_number": "0042"
        },
        "invoice_data": null,
        "ocr_quality": "medium",
        "reasoning_commentary": null
    })
    .to_string()
}

fn image() -> ImageInput {
    ImageInput::new("r.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg")
}

async fn call(base: &str) -> Result<receipt2json::RawModelOutput, ProviderError> {
    let gateway = OpenAiCompatibleGateway::configure(base, "sk-test", "vision-model").unwrap();
    let img = image();
    gateway
        .complete_with_image(VisionRequest {
            system_instruction: Some("policy"),
            image: &img,
            schema: SchemaVersion::Current.output_schema(),
        })
        .await
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_shape_and_successful_extraction() {
    let (base, server) = serve_once("200 OK", "", completion(&receipt_json())).await;
    let gateway = OpenAiCompatibleGateway::configure(&base, "sk-test", "vision-model").unwrap();
    let agent = ExtractionAgent::new(Arc::new(gateway));

    let result = agent.extract(&image()).await.unwrap();
    assert_eq!(result.document_type(), DocumentType::Receipt);
    assert_eq!(result.receipt_data().unwrap().receipt_number.as_deref(), Some("0042"));

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(request.starts_with("POST /v1/chat/completions "), "got: {request}");
    assert!(lower.contains("authorization: bearer sk-test"));
    assert!(request.contains("\"json_schema\""));
    assert!(request.contains("\"ocr_response\""));
    assert!(request.contains("data:image/jpeg;base64,/9j/4A=="));
    assert!(request.contains("\"detail\":\"high\""));
    assert!(request.contains("\"model\":\"vision-model\""));
}

#[tokio::test]
async fn test_token_usage_is_reported() {
    let (base, _server) = serve_once("200 OK", "", completion(&receipt_json())).await;
    let out = call(&base).await.unwrap();
    assert_eq!(out.input_tokens, 1200);
    assert_eq!(out.output_tokens, 80);
}

#[tokio::test]
async fn test_fenced_content_is_cleaned() {
    let fenced = format!("```json\n{}\n```", receipt_json());
    let (base, _server) = serve_once("200 OK", "", completion(&fenced)).await;
    let out = call(&base).await.unwrap();
    assert_eq!(out.value["document_type"], "receipt");
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let body = json!({"error": {"message": "Incorrect API key provided"}}).to_string();
    let (base, _server) = serve_once("401 Unauthorized", "", body).await;
    let err = call(&base).await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth { status: 401, .. }), "got {err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let (base, _server) = serve_once("429 Too Many Requests", "Retry-After: 7\r\n", "{}".into()).await;
    let err = call(&base).await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::RateLimited {
            retry_after_secs: Some(7)
        }
    );
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let (base, _server) = serve_once("503 Service Unavailable", "", "upstream overloaded".into()).await;
    let err = call(&base).await.unwrap_err();
    assert!(matches!(err, ProviderError::Http { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_bad_request_is_not_retryable() {
    let (base, _server) = serve_once("400 Bad Request", "", "{\"error\":\"bad schema\"}".into()).await;
    let err = call(&base).await.unwrap_err();
    assert!(matches!(err, ProviderError::Http { status: 400, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_empty_content_is_empty_response() {
    let (base, _server) = serve_once("200 OK", "", completion("")).await;
    assert_eq!(call(&base).await.unwrap_err(), ProviderError::EmptyResponse);
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = call(&format!("http://{addr}/v1")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Network { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut sock).await;
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    });

    let gateway = OpenAiCompatibleGateway::with_options(
        &format!("http://{addr}/v1"),
        "sk-test",
        "vision-model",
        GatewayOptions {
            timeout_secs: 1,
            ..GatewayOptions::default()
        },
    )
    .unwrap();
    let err = ExtractionAgent::new(Arc::new(gateway))
        .extract(&image())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExtractError::Provider(ProviderError::Timeout { .. })),
        "got {err:?}"
    );
}
