use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::Engine;

use sightline::describe::EXTRACT_TEXT_PROMPT;
use sightline::{DescribeClient, DescribeConfig, Description, Frame, SurveyError};

struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is json")
    }
}

/// Serve exactly one canned response and hand back what the client sent.
fn serve_once(status: u16, response: &'static str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let endpoint = format!(
        "http://{}/v1beta/models/test:generateContent",
        listener.local_addr().unwrap()
    );
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        let length: usize = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .map(|(_, value)| value.parse().unwrap())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).unwrap();

        write!(
            stream,
            "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            response.len(),
            response
        )
        .unwrap();
        stream.flush().unwrap();

        CapturedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body,
        }
    });
    (endpoint, handle)
}

fn client(endpoint: String) -> DescribeClient {
    DescribeClient::new(DescribeConfig {
        endpoint,
        api_key: "test-key".to_string(),
        timeout: Duration::from_secs(5),
    })
}

#[test]
fn sends_image_and_instruction_and_reads_text() {
    let (endpoint, server) = serve_once(
        200,
        r#"{"candidates":[{"content":{"parts":[{"text":"  BLUE DOOR BAKERY \n"}],"role":"model"}}]}"#,
    );
    let jpeg = b"\xff\xd8\xff\xe0fake-jpeg\xff\xd9";

    let description = client(endpoint)
        .describe_jpeg(jpeg, EXTRACT_TEXT_PROMPT)
        .expect("describe");
    assert_eq!(description, Description::Text("BLUE DOOR BAKERY".to_string()));

    let request = server.join().unwrap();
    assert!(request
        .request_line
        .starts_with("POST /v1beta/models/test:generateContent"));
    assert_eq!(request.header("x-goog-api-key"), Some("test-key"));
    assert!(request
        .header("content-type")
        .is_some_and(|value| value.starts_with("application/json")));

    let body = request.json();
    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], EXTRACT_TEXT_PROMPT);
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
    let encoded = parts[1]["inline_data"]["data"].as_str().unwrap();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    assert_eq!(decoded, jpeg);
}

#[test]
fn error_status_becomes_error_text() {
    let (endpoint, server) = serve_once(403, r#"{"error":{"message":"API key not valid"}}"#);

    let description = client(endpoint)
        .describe_jpeg(b"jpeg", "describe")
        .expect("status errors are not Err");
    assert!(description.is_failed());
    assert_eq!(
        description.into_text(),
        r#"Error: 403, {"error":{"message":"API key not valid"}}"#
    );
    server.join().unwrap();
}

#[test]
fn response_without_candidates_is_a_remote_error() {
    let (endpoint, server) = serve_once(200, r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);

    let err = client(endpoint)
        .describe_jpeg(b"jpeg", "describe")
        .err()
        .expect("no text must fail");
    assert!(matches!(err, SurveyError::RemoteCall(_)));
    server.join().unwrap();
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("http://{}/generate", addr))
        .describe_jpeg(b"jpeg", "describe")
        .err()
        .expect("connect must fail");
    assert!(matches!(err, SurveyError::RemoteCall(_)));
}

#[test]
fn describes_decoded_frames_and_files() {
    let (endpoint, server) = serve_once(
        200,
        r#"{"candidates":[{"content":{"parts":[{"text":"a grey square"}]}}]}"#,
    );
    let frame = Frame::filled(16, 16, [128, 128, 128]);
    let description = client(endpoint).describe_frame(&frame, "describe").unwrap();
    assert_eq!(description.into_text(), "a grey square");

    let request = server.join().unwrap();
    let body = request.json();
    let encoded = body["contents"][0]["parts"][1]["inline_data"]["data"]
        .as_str()
        .unwrap();
    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    assert_eq!(&jpeg[..2], &[0xff, 0xd8]);

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("frame_000015.jpg");
    let err = client("http://127.0.0.1:9/unused".to_string())
        .describe_file(&missing, "describe")
        .err()
        .expect("missing file must fail");
    assert!(matches!(err, SurveyError::ImageInput(_)), "got {:?}", err);
    assert!(err.to_string().contains("frame_000015.jpg"));
}
