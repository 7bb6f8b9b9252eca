//! OCR provider abstraction.
//!
//! The service talks to one provider at a time through [`OcrProvider`]; the
//! trait keeps the pipeline independent of the concrete HTTP client.

pub mod mistral;

use crate::error::ProviderError;

/// Per-page OCR output (always 1-indexed).
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub page_num: u32,
    pub markdown: String,
}

/// Unified OCR result returned by every provider.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub markdown: String,
    pub pages: Vec<OcrPage>,
    pub total_pages: u32,
    pub provider_name: String,
}

/// A document handed to the provider.
pub struct OcrInput<'a> {
    pub filename: &'a str,
    pub data: &'a [u8],
}

#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, input: OcrInput<'_>) -> Result<OcrResult, ProviderError>;
}
