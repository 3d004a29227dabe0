//! Google Cloud Vision text detection client
//!
//! Calls `images:annotate` with a single TEXT_DETECTION feature and reads
//! the full-text annotation of the first (and only) result.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ExtractionError, TextExtractor};

const DEFAULT_BASE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Text extractor backed by the Cloud Vision annotate endpoint
pub struct VisionExtractor {
    client: Client,
    api_key: String,
    base_url: String,
}

impl VisionExtractor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateEntry>,
}

#[derive(Serialize)]
struct AnnotateEntry {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    /// Base64-encoded image bytes
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    r#type: &'static str,
    max_results: u32,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<RpcStatus>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    text: String,
}

#[derive(Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Pull the detected text out of an annotate response
fn text_from_response(response: AnnotateResponse) -> Result<String, ExtractionError> {
    let result = response
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| ExtractionError::Malformed("empty responses array".to_string()))?;

    if let Some(status) = result.error {
        return Err(ExtractionError::Service {
            status: status.code as u16,
            message: status.message,
        });
    }

    match result.full_text_annotation {
        Some(annotation) if !annotation.text.is_empty() => Ok(annotation.text),
        _ => Err(ExtractionError::NoText),
    }
}

#[async_trait]
impl TextExtractor for VisionExtractor {
    async fn extract_text(&self, image: &[u8]) -> Result<String, ExtractionError> {
        let body = AnnotateRequest {
            requests: vec![AnnotateEntry {
                image: ImageContent {
                    content: BASE64.encode(image),
                },
                features: vec![Feature {
                    r#type: "TEXT_DETECTION",
                    max_results: 1,
                }],
            }],
        };

        debug!(bytes = image.len(), "sending annotate request");

        let resp = self
            .client
            .post(&self.base_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::Service { status, message });
        }

        let response: AnnotateResponse = resp.json().await?;
        text_from_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<String, ExtractionError> {
        let response: AnnotateResponse = serde_json::from_str(json).unwrap();
        text_from_response(response)
    }

    #[test]
    fn test_full_text_annotation_extracted() {
        let json = r#"{
            "responses": [
                {
                    "textAnnotations": [{"description": "Hello"}],
                    "fullTextAnnotation": {"text": "Hello world\n"}
                }
            ]
        }"#;
        assert_eq!(parse(json).unwrap(), "Hello world\n");
    }

    #[test]
    fn test_missing_annotation_is_no_text() {
        let json = r#"{"responses": [{}]}"#;
        assert!(matches!(parse(json), Err(ExtractionError::NoText)));
    }

    #[test]
    fn test_empty_responses_is_malformed() {
        let json = r#"{"responses": []}"#;
        assert!(matches!(parse(json), Err(ExtractionError::Malformed(_))));
    }

    #[test]
    fn test_per_image_error_surfaces() {
        let json = r#"{
            "responses": [
                {"error": {"code": 3, "message": "Bad image data."}}
            ]
        }"#;
        match parse(json) {
            Err(ExtractionError::Service { status, message }) => {
                assert_eq!(status, 3);
                assert_eq!(message, "Bad image data.");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) refuses connections on any sane host.
        let extractor =
            VisionExtractor::new("key").with_base_url("http://127.0.0.1:9/images:annotate");
        let result = extractor.extract_text(b"bytes").await;
        assert!(matches!(result, Err(ExtractionError::Transport(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let body = AnnotateRequest {
            requests: vec![AnnotateEntry {
                image: ImageContent {
                    content: BASE64.encode(b"bytes"),
                },
                features: vec![Feature {
                    r#type: "TEXT_DETECTION",
                    max_results: 1,
                }],
            }],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("TEXT_DETECTION"));
        assert!(json.contains("maxResults"));
        assert!(json.contains(&BASE64.encode(b"bytes")));
    }
}
