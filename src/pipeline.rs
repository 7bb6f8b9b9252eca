//! OCR → prompt → chat completion pipeline.
//!
//! Strictly sequential: the completion call only starts once OCR has
//! succeeded, nothing is retried, and the first failure ends the request.

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::dump::ExtractDump;
use crate::error::{ApiError, Stage};
use crate::markdown::{fix_markdown_urls, format_file_size};
use crate::ocr::mistral::MistralOcrProvider;
use crate::ocr::{OcrInput, OcrProvider};
use crate::prompt::PromptTemplate;
use crate::upload::PdfUpload;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Returned when the model produced an empty answer.
pub const EMPTY_INSIGHTS_TEXT: &str = "Could not generate insights for the provided document.";

/// Markdown extracted from one document.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub markdown: String,
    pub total_pages: u32,
}

pub struct InsightPipeline {
    ocr: Arc<dyn OcrProvider>,
    completion: CompletionClient,
    prompt: PromptTemplate,
    dump: Option<ExtractDump>,
}

impl InsightPipeline {
    pub fn new(
        ocr: Arc<dyn OcrProvider>,
        completion: CompletionClient,
        prompt: PromptTemplate,
        dump: Option<ExtractDump>,
    ) -> Self {
        Self {
            ocr,
            completion,
            prompt,
            dump,
        }
    }

    /// Wire the Mistral OCR provider and the configured completion endpoint.
    pub fn from_config(config: &Config, client: reqwest::Client) -> std::io::Result<Self> {
        let dump = if config.save_extracted_content {
            Some(ExtractDump::new(&config.output_dir)?)
        } else {
            None
        };
        Ok(Self::new(
            Arc::new(MistralOcrProvider::from_config(client.clone(), config)),
            CompletionClient::from_config(client, config),
            config.prompt.clone(),
            dump,
        ))
    }

    /// Run OCR only.
    pub async fn extract_text(&self, upload: &PdfUpload) -> Result<ExtractedText, ApiError> {
        info!(
            "Starting OCR for {} ({}) with {}",
            upload.filename,
            format_file_size(upload.size() as u64),
            self.ocr.name()
        );

        let result = self
            .ocr
            .process(OcrInput {
                filename: &upload.filename,
                data: &upload.data,
            })
            .await
            .map_err(|e| {
                error!("OCR processing failed: {}", e);
                e.into_api_error(Stage::Ocr, upload.inspection.encrypted)
            })?;

        info!(
            "OCR completed for {}: {} pages, {} chars",
            upload.filename,
            result.total_pages,
            result.markdown.len()
        );

        if let Some(dump) = &self.dump {
            // A failed debug dump must not fail the request.
            if let Err(e) = dump.save(&result.markdown, &upload.filename).await {
                warn!("Failed to save extracted content: {}", e);
            }
        }

        Ok(ExtractedText {
            markdown: result.markdown,
            total_pages: result.total_pages,
        })
    }

    /// Run OCR, then generate the insight report from its output.
    pub async fn generate_insights(&self, upload: &PdfUpload) -> Result<String, ApiError> {
        let extracted = self.extract_text(upload).await?;
        self.complete(&extracted.markdown, upload.inspection.encrypted)
            .await
    }

    async fn complete(&self, document: &str, encrypted: bool) -> Result<String, ApiError> {
        if document.trim().is_empty() {
            warn!("Empty content provided for insights generation");
        }
        info!(
            "Generating insights using model {} (prompt '{}')",
            self.completion.model(),
            self.prompt.key()
        );

        let insights = self
            .completion
            .chat(self.prompt.messages(document))
            .await
            .map_err(|e| {
                error!("Failed to generate insights: {}", e);
                e.into_api_error(Stage::Completion, encrypted)
            })?;

        if insights.trim().is_empty() {
            warn!("AI model returned empty insights");
            return Ok(EMPTY_INSIGHTS_TEXT.to_string());
        }

        info!("Successfully generated AI insights ({} chars)", insights.len());
        Ok(fix_markdown_urls(&insights))
    }
}
