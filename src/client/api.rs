//! HTTP client for the InsightGUIDE API.

use crate::client::upload::{LoadedPdf, PDF_MIME};
use crate::config::Secret;
use crate::error::{ErrorBody, ErrorKind};
use crate::schema::{ExtractResponse, HealthResponse, ProcessResponse};
use crate::upload::FIELD_NAME;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PROCESS_PATH: &str = "/api/process-pdf/";
pub const EXTRACT_PATH: &str = "/api/extract-text/";
pub const HEALTH_PATH: &str = "/health";

/// OCR and completion budgets combined, plus slack for the upload.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(330);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error status. `code` is the kind the
    /// server sent; `inferred` is guessed from the status when it sent none.
    #[error("{message}")]
    Api {
        code: Option<ErrorKind>,
        inferred: Option<ErrorKind>,
        status: u16,
        message: String,
    },

    #[error("File is too large ({size} bytes, limit {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response from {url}: {detail}")]
    Decode { url: String, detail: String },
}

impl ClientError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { code, inferred, .. } => (*code).or(*inferred),
            Self::TooLarge { .. } => Some(ErrorKind::FileTooLarge),
            Self::Transport { source, .. } if source.is_timeout() => Some(ErrorKind::ProviderTimeout),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    /// Text for the dismissible alert.
    pub fn user_message(&self) -> String {
        match self {
            // Conforming server: the code decides.
            Self::Api {
                code: Some(code), ..
            } => code.user_message().to_string(),
            Self::Api { message, .. } => message.clone(),
            Self::TooLarge { .. } => ErrorKind::FileTooLarge.user_message().to_string(),
            Self::Transport { source, .. } if source.is_timeout() => {
                ErrorKind::ProviderTimeout.user_message().to_string()
            }
            Self::Transport { .. } => {
                "Could not reach the server. Please check your connection and try again.".to_string()
            }
            Self::Decode { .. } => ErrorKind::Internal.user_message().to_string(),
        }
    }

    /// Build from a non-2xx response body.
    ///
    /// Prefers the structured `code`. Without one, the kind is inferred from
    /// the status alone and the server's `detail`, `message` or `error` text
    /// is kept for the alert.
    fn from_response(status: u16, body: &str) -> Self {
        if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
            return Self::Api {
                code: Some(err.code),
                inferred: None,
                status,
                message: err.detail,
            };
        }

        let text = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                ["detail", "message", "error"]
                    .iter()
                    .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            });

        let inferred = kind_for_status(status);
        let message = match (text, inferred) {
            (Some(text), _) => text,
            (None, Some(kind)) => kind.user_message().to_string(),
            (None, None) => format!("Request failed with HTTP {}", status),
        };
        Self::Api {
            code: None,
            inferred,
            status,
            message,
        }
    }
}

fn kind_for_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::Unauthorized),
        413 => Some(ErrorKind::FileTooLarge),
        502 => Some(ErrorKind::ProviderUnavailable),
        503 => Some(ErrorKind::ProviderRateLimited),
        504 => Some(ErrorKind::ProviderTimeout),
        500 => Some(ErrorKind::Internal),
        _ => None,
    }
}

/// How `process_pdf` asks for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    Markdown,
}

impl ReportFormat {
    fn accept(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Markdown => "text/markdown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsightClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Secret)>,
    max_file_size: Option<usize>,
    format: ReportFormat,
    timeout: Duration,
}

impl InsightClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
            max_file_size: None,
            format: ReportFormat::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Secret) -> Self {
        self.credentials = Some((username.into(), password));
        self
    }

    /// Reject larger files locally instead of uploading them.
    pub fn with_max_file_size(mut self, max: usize) -> Self {
        self.max_file_size = Some(max);
        self
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    /// Deadline for each request, upload included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.timeout(self.timeout);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password.expose())),
            None => builder,
        }
    }

    fn upload_form(&self, pdf: &LoadedPdf, url: &str) -> Result<Form, ClientError> {
        if let Some(max) = self.max_file_size {
            if pdf.size() > max {
                warn!("Not uploading {}: {} bytes exceeds {}", pdf.name, pdf.size(), max);
                return Err(ClientError::TooLarge {
                    size: pdf.size(),
                    max,
                });
            }
        }
        let part = Part::bytes(pdf.bytes.clone())
            .file_name(pdf.name.clone())
            .mime_str(PDF_MIME)
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;
        Ok(Form::new().part(FIELD_NAME, part))
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ClientError::from_response(status.as_u16(), &body);
        warn!("{} returned {}: {}", url, status, err);
        Err(err)
    }

    /// Upload `pdf` and return the insight report markdown.
    pub async fn process_pdf(&self, pdf: &LoadedPdf) -> Result<String, ClientError> {
        let url = self.url(PROCESS_PATH);
        let form = self.upload_form(pdf, &url)?;
        info!("Requesting insights for {} ({} bytes)", pdf.name, pdf.size());

        let builder = self
            .http
            .post(&url)
            .header(ACCEPT, self.format.accept())
            .multipart(form);
        let response = self.send(builder, &url).await?;

        let is_markdown = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/markdown"));
        let body = response.text().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })?;

        let insights = if is_markdown {
            body
        } else {
            serde_json::from_str::<ProcessResponse>(&body)
                .map_err(|e| ClientError::Decode {
                    url: url.clone(),
                    detail: e.to_string(),
                })?
                .insights
        };
        debug!("Received {} chars of insights", insights.len());
        Ok(insights)
    }

    /// Upload `pdf` and return the OCR markdown only.
    pub async fn extract_text(&self, pdf: &LoadedPdf) -> Result<String, ClientError> {
        let url = self.url(EXTRACT_PATH);
        let form = self.upload_form(pdf, &url)?;
        let builder = self.http.post(&url).multipart(form);
        let response = self.send(builder, &url).await?;
        let body: ExtractResponse = decode_json(response, &url).await?;
        Ok(body.extracted_content)
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = self.url(HEALTH_PATH);
        let builder = self.http.get(&url);
        let response = self.send(builder, &url).await?;
        decode_json(response, &url).await
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    url: &str,
) -> Result<T, ClientError> {
    response.json::<T>().await.map_err(|e| ClientError::Decode {
        url: url.to_string(),
        detail: e.to_string(),
    })
}
