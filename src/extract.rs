//! Hand-off point to text extraction.
//!
//! Parsing HTML, PDF and friends is someone else's job. This module only
//! defines the contract a consumer implements, plus a plain-text extractor.

use thiserror::Error;

/// Errors a [`TextExtractor`] may return.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Turns a fetched payload into plain text.
///
/// Receives the body and `Content-Type` exactly as fetched.
pub trait TextExtractor {
    fn extract(&self, body: &[u8], content_type: Option<&str>) -> Result<String, ExtractError>;
}

/// Extractor for `text/plain` (and untyped) payloads.
///
/// Decodes UTF-8 and falls back to Latin-1 when the bytes are not valid UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl TextExtractor for PlainText {
    fn extract(&self, body: &[u8], content_type: Option<&str>) -> Result<String, ExtractError> {
        if let Some(content_type) = content_type {
            let mime = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if mime != "text/plain" {
                return Err(ExtractError::UnsupportedContentType(mime));
            }
        }

        match std::str::from_utf8(body) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => {
                tracing::debug!("body is not valid UTF-8, decoding as Latin-1");
                Ok(body.iter().map(|&b| char::from(b)).collect())
            }
        }
    }
}
