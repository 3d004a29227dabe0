//! Text extractor trait and error taxonomy

use async_trait::async_trait;

/// Errors that can occur during text extraction
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("detection service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("no text detected in image")]
    NoText,

    #[error("malformed detection response: {0}")]
    Malformed(String),
}

/// Extracts text from encoded image bytes.
///
/// One request, one response. Retry policy is the caller's concern and
/// the session machine deliberately has none.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, image: &[u8]) -> Result<String, ExtractionError>;
}
