//! Mistral OCR provider (uses Mistral's Files and OCR APIs).
//!
//! A document goes through three calls: upload to the Files API, request a
//! short-lived signed URL, run OCR on that URL. The uploaded file is deleted
//! afterwards whatever the outcome.

use super::{OcrInput, OcrPage, OcrProvider, OcrResult};
use crate::config::{Config, Secret};
use crate::error::ProviderError;
use crate::markdown::replace_images_in_markdown;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PROVIDER: &str = "mistral_ocr";
const OCR_MODEL: &str = "mistral-ocr-latest";
/// Lifetime of the signed URL, in hours.
const SIGNED_URL_EXPIRY: u32 = 1;

pub struct MistralOcrProvider {
    api_key: Secret,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl MistralOcrProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Secret,
        timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            &config.mistral_api_base,
            config.mistral_api_key.clone(),
            config.ocr_timeout,
        )
    }

    fn secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: DocumentSource,
    include_image_base64: bool,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "document_url")]
    Url { document_url: String },
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<MistralPage>,
}

#[derive(Deserialize)]
struct MistralPage {
    index: u32,
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    images: Vec<MistralImage>,
}

#[derive(Deserialize)]
struct MistralImage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    image_base64: Option<String>,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    url: String,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn process(&self, input: OcrInput<'_>) -> Result<OcrResult, ProviderError> {
        let file_id = self.upload_file(input.filename, input.data).await?;

        let result = self.ocr_uploaded(&file_id).await;

        if let Err(e) = self.delete_file(&file_id).await {
            error!("Failed to delete Mistral file {}: {}", file_id, e);
        } else {
            info!("Cleaned up Mistral file ID: {}", file_id);
        }

        result
    }
}

impl MistralOcrProvider {
    /// Upload raw bytes to Mistral Files API, return the file_id.
    async fn upload_file(&self, filename: &str, data: &[u8]) -> Result<String, ProviderError> {
        use reqwest::multipart::{Form, Part};

        info!(
            "MistralOcrProvider: uploading {} ({} bytes) to Files API",
            filename,
            data.len()
        );

        let part = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.secs(), e))?;

        let form = Form::new().part("file", part).text("purpose", "ocr");

        let resp = self
            .client
            .post(format!("{}/v1/files", self.base_url))
            .bearer_auth(self.api_key.expose())
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.secs(), e))?;

        let upload: FileUploadResponse = self.parse(resp).await?;
        info!("MistralOcrProvider: uploaded file_id={}", upload.id);
        Ok(upload.id)
    }

    async fn ocr_uploaded(&self, file_id: &str) -> Result<OcrResult, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/v1/files/{}/url", self.base_url, file_id))
            .query(&[("expiry", SIGNED_URL_EXPIRY)])
            .bearer_auth(self.api_key.expose())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.secs(), e))?;
        let signed: SignedUrlResponse = self.parse(resp).await?;

        let body = OcrRequest {
            model: OCR_MODEL,
            document: DocumentSource::Url {
                document_url: signed.url,
            },
            include_image_base64: false,
        };

        info!("MistralOcrProvider: calling OCR API for file_id={}", file_id);

        let resp = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(self.api_key.expose())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.secs(), e))?;
        let ocr: OcrResponse = self.parse(resp).await?;

        if ocr.pages.is_empty() {
            warn!("OCR response contains no pages");
        }

        Ok(combine_pages(ocr))
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ProviderError> {
        let resp = self
            .client
            .delete(format!("{}/v1/files/{}", self.base_url, file_id))
            .bearer_auth(self.api_key.expose())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.secs(), e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::status(PROVIDER, status.as_u16(), &text));
        }
        Ok(())
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::status(PROVIDER, status.as_u16(), &text));
        }

        let raw_text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.secs(), e))?;
        debug!(
            "MistralOcrProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );
        serde_json::from_str(&raw_text).map_err(|e| ProviderError::Malformed {
            provider: PROVIDER,
            detail: e.to_string(),
        })
    }
}

/// Join per-page markdown with a blank line, inlining any returned images.
fn combine_pages(ocr: OcrResponse) -> OcrResult {
    let total_pages = ocr.pages.len() as u32;

    let pages: Vec<OcrPage> = ocr
        .pages
        .into_iter()
        .map(|p| {
            let images: Vec<(String, String)> = p
                .images
                .into_iter()
                .filter_map(|img| img.image_base64.map(|b64| (img.id, b64)))
                .collect();
            OcrPage {
                page_num: p.index + 1, // Normalize 0-indexed → 1-indexed
                markdown: replace_images_in_markdown(&p.markdown, &images),
            }
        })
        .collect();

    let markdown = pages
        .iter()
        .map(|p| p.markdown.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    OcrResult {
        markdown,
        pages,
        total_pages,
        provider_name: PROVIDER.to_string(),
    }
}
