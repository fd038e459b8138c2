use cdp_batch::upload::{ApiSettings, BatchClient};
use cdp_batch_core::payload::CompressedPayload;
use cdp_batch_core::uploader::{BatchError, BatchHandle, BatchUploader, PresignedLocation, UploadTarget};
use serde_json::json;
use wiremock::{
    matchers::{basic_auth, body_bytes, body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn settings(endpoint: &str) -> ApiSettings {
    ApiSettings {
        endpoint: Some(endpoint.to_string()),
        client_key: Some("client-key".to_string()),
        api_token: Some("api-token".to_string()),
    }
}

fn payload() -> CompressedPayload {
    CompressedPayload::from_text(
        r#"{"id":"1","email":"a@x.com","sub_news":"true","pointOfSale":"POS1","mode":"upsert"}"#,
    )
    .unwrap()
}

fn location(href: String) -> PresignedLocation {
    PresignedLocation {
        reference: "ref-1".to_string(),
        location: UploadTarget { href },
    }
}

#[tokio::test]
async fn presign_puts_checksum_and_size_with_basic_auth() {
    let server = MockServer::start().await;
    let handle = BatchHandle::generate();
    let payload = payload();

    Mock::given(method("PUT"))
        .and(path(format!("/v2/batches/{}", handle.id())))
        .and(basic_auth("client-key", "api-token"))
        .and(header("accept", "application/json"))
        .and(body_json(json!({
            "checksum": payload.info().checksum,
            "size": payload.info().size,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "batch-ref",
            "location": { "href": "https://uploads.example.com/b?sig=1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BatchClient::new(settings(&server.uri())).unwrap();
    let location = client.presign(&handle, payload.info()).await.unwrap();

    assert_eq!(location.reference, "batch-ref");
    assert_eq!(location.upload_url(), "https://uploads.example.com/b?sig=1");
}

#[tokio::test]
async fn presign_server_error_keeps_status_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("x-request-id", "req-77")
                .set_body_string("internal failure"),
        )
        .mount(&server)
        .await;

    let client = BatchClient::new(settings(&server.uri())).unwrap();
    let err = client
        .presign(&BatchHandle::generate(), payload().info())
        .await
        .unwrap_err();

    match err {
        BatchError::Presign {
            status,
            body,
            headers,
            ..
        } => {
            assert_eq!(status, Some(500));
            assert_eq!(body.as_deref(), Some("internal failure"));
            assert!(headers
                .iter()
                .any(|(name, value)| name == "x-request-id" && value == "req-77"));
        }
        other => panic!("expected presign error, got {other:?}"),
    }
}

#[tokio::test]
async fn presign_response_without_location_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ref": "r" })))
        .mount(&server)
        .await;

    let client = BatchClient::new(settings(&server.uri())).unwrap();
    let err = client
        .presign(&BatchHandle::generate(), payload().info())
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Presign { status: Some(200), .. }));
}

#[tokio::test]
async fn presign_without_endpoint_sends_nothing() {
    let client = BatchClient::new(ApiSettings {
        endpoint: None,
        client_key: Some("k".into()),
        api_token: Some("t".into()),
    })
    .unwrap();
    let err = client
        .presign(&BatchHandle::generate(), payload().info())
        .await
        .unwrap_err();
    match err {
        BatchError::Presign {
            message, status, ..
        } => {
            assert!(message.contains("API_ENDPOINT"));
            assert_eq!(status, None);
        }
        other => panic!("expected presign error, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_sends_exact_bytes_with_integrity_headers() {
    let server = MockServer::start().await;
    let payload = payload();

    Mock::given(method("PUT"))
        .and(path("/upload"))
        .and(header("accept", "application/json"))
        .and(header("x-amz-server-side-encryption", "AES256"))
        .and(header("content-md5", payload.content_md5().as_str()))
        .and(body_bytes(payload.bytes().to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = BatchClient::new(settings(&server.uri())).unwrap();
    let receipt = client
        .upload(&location(format!("{}/upload", server.uri())), &payload)
        .await
        .unwrap();
    assert_eq!(receipt.status, 200);

    // The checksum announced at presign describes the same bytes the server received.
    let received = server.received_requests().await.unwrap();
    assert_eq!(
        format!("{:x}", md5::compute(&received[0].body)),
        payload.info().checksum
    );
}

#[tokio::test]
async fn upload_status_is_recorded_not_enforced() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
        .mount(&server)
        .await;

    let client = BatchClient::new(settings(&server.uri())).unwrap();
    let receipt = client
        .upload(&location(format!("{}/upload", server.uri())), &payload())
        .await
        .expect("a response is a completed upload");
    assert_eq!(receipt.status, 403);
    assert_eq!(receipt.body, "SignatureDoesNotMatch");
}

#[tokio::test]
async fn upload_transport_error_is_an_upload_error() {
    // Bind then drop a listener so the port refuses connections.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = BatchClient::new(settings("http://unused.invalid")).unwrap();
    let err = client
        .upload(&location(format!("http://{addr}/upload")), &payload())
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Upload { .. }));
}

/// Serves one response whose body is shorter than its Content-Length, then hangs up.
fn truncated_body_server() -> std::net::SocketAddr {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
            .unwrap();
    });
    addr
}

#[tokio::test]
async fn unreadable_upload_body_still_records_status() {
    let addr = truncated_body_server();

    let client = BatchClient::new(settings("http://unused.invalid")).unwrap();
    let receipt = client
        .upload(&location(format!("http://{addr}/upload")), &payload())
        .await
        .expect("status line was received");
    assert_eq!(receipt.status, 200);
    assert_eq!(receipt.body, "");
}
