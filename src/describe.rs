//! Remote image description through a generative-AI `generateContent` endpoint.
//!
//! Each call sends one JPEG (base64, inline) plus an instruction and returns
//! the first candidate's text. HTTP error statuses are reported as an
//! [`Description::Failed`] value rather than an `Err`, so a batch of frames
//! keeps going; only transport failures (DNS, connect, timeout) are errors.

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

use crate::config::DescribeConfig;
use crate::error::SurveyError;
use crate::frame::Frame;

/// Pull storefront signage text out of a frame.
pub const EXTRACT_TEXT_PROMPT: &str = "Identify and extract all text visible in this image. \
Return only the extracted text, without any additional commentary. \
Don't give repetitions and don't give something which might not be relevant to shop name";

/// Short free-form scene description.
pub const DESCRIBE_PROMPT: &str = "Describe what is visible in this image in one or two sentences. \
Mention any security cameras, doors or entrances.";

const JPEG_QUALITY: u8 = 95;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Result of one describe call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Description {
    Text(String),
    /// The API answered with a non-success status.
    Failed { status: u16, body: String },
}

impl Description {
    /// Text to record for this frame; failures become `Error: {status}, {body}`.
    pub fn into_text(self) -> String {
        match self {
            Description::Text(text) => text,
            failed @ Description::Failed { .. } => failed.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Description::Failed { .. })
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Description::Text(text) => f.write_str(text),
            Description::Failed { status, body } => write!(f, "Error: {}, {}", status, body),
        }
    }
}

pub struct DescribeClient {
    agent: ureq::Agent,
    config: DescribeConfig,
}

impl DescribeClient {
    pub fn new(config: DescribeConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { agent, config }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Describe a JPEG file on disk.
    pub fn describe_file(&self, path: &Path, instruction: &str) -> crate::Result<Description> {
        let jpeg = fs::read(path)
            .map_err(|e| SurveyError::ImageInput(format!("{}: {}", path.display(), e)))?;
        log::debug!("describing {} ({} bytes)", path.display(), jpeg.len());
        self.describe_jpeg(&jpeg, instruction)
    }

    /// Encode a decoded frame as JPEG and describe it.
    pub fn describe_frame(&self, frame: &Frame, instruction: &str) -> crate::Result<Description> {
        let image = frame
            .to_rgb_image()
            .map_err(|e| SurveyError::ImageInput(format!("frame encode: {:#}", e)))?;
        let mut jpeg = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode_image(&image)
            .map_err(|e| SurveyError::ImageInput(format!("frame encode: {}", e)))?;
        self.describe_jpeg(jpeg.get_ref(), instruction)
    }

    /// Send already encoded JPEG bytes.
    pub fn describe_jpeg(&self, jpeg: &[u8], instruction: &str) -> crate::Result<Description> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [
                    RequestPart::Text { text: instruction },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: base64::engine::general_purpose::STANDARD.encode(jpeg),
                        },
                    },
                ],
            }],
        };

        let response = self
            .agent
            .post(&self.config.endpoint)
            .set("x-goog-api-key", &self.config.api_key)
            .send_json(&body);

        match response {
            Ok(resp) if resp.status() == 200 => {
                let parsed: GenerateResponse = resp
                    .into_json()
                    .map_err(|e| SurveyError::RemoteCall(format!("unreadable response: {}", e)))?;
                first_text(parsed).map(Description::Text)
            }
            Ok(resp) => Ok(failed(resp.status(), resp)),
            Err(ureq::Error::Status(status, resp)) => {
                log::warn!("describe request rejected with status {}", status);
                Ok(failed(status, resp))
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(SurveyError::RemoteCall(transport.to_string()))
            }
        }
    }
}

fn failed(status: u16, resp: ureq::Response) -> Description {
    let body = resp.into_string().unwrap_or_default();
    Description::Failed { status, body }
}

fn first_text(response: GenerateResponse) -> crate::Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .and_then(|part| part.text)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| SurveyError::RemoteCall("response contained no text candidate".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = GenerateRequest {
            contents: [Content {
                parts: [
                    RequestPart::Text { text: "read it" },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: base64::engine::general_purpose::STANDARD.encode(b"abc"),
                        },
                    },
                ],
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "contents": [{
                    "parts": [
                        {"text": "read it"},
                        {"inline_data": {"mime_type": "image/jpeg", "data": "YWJj"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn first_text_is_trimmed() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  CAFE ROMA\n"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(first_text(parsed).unwrap(), "CAFE ROMA");
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(first_text(parsed), Err(SurveyError::RemoteCall(_))));
    }

    #[test]
    fn failure_renders_as_error_text() {
        let failed = Description::Failed {
            status: 429,
            body: "quota".to_string(),
        };
        assert!(failed.is_failed());
        assert_eq!(failed.into_text(), "Error: 429, quota");
    }
}
