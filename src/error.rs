//! Error taxonomy shared by the API service and the client.
//!
//! Every failure the service reports carries a closed [`ErrorKind`] serialized
//! as a stable `code`. Clients switch on the code; the free-text `detail` is
//! for humans and logs only.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Realm advertised in the basic-auth challenge.
pub const AUTH_REALM: &str = "Secure Area";

/// Stable error codes returned in the `code` field of every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingFile,
    InvalidFileType,
    InvalidFilename,
    FileTooLarge,
    InvalidPdf,
    MalformedUpload,
    DocumentUnreadable,
    DocumentProtected,
    ContextLengthExceeded,
    ProviderTimeout,
    ProviderRateLimited,
    ProviderUnavailable,
    OcrFailed,
    CompletionFailed,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::MissingFile
            | Self::InvalidFileType
            | Self::InvalidFilename
            | Self::InvalidPdf
            | Self::MalformedUpload => StatusCode::BAD_REQUEST,
            Self::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DocumentUnreadable | Self::DocumentProtected | Self::ContextLengthExceeded => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::ProviderRateLimited => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderUnavailable | Self::OcrFailed | Self::CompletionFailed => {
                StatusCode::BAD_GATEWAY
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Coarse error family, kept for clients that group errors by type.
    pub fn error_type(self) -> &'static str {
        match self {
            Self::MissingFile
            | Self::InvalidFileType
            | Self::InvalidFilename
            | Self::FileTooLarge
            | Self::InvalidPdf
            | Self::MalformedUpload => "ValidationError",
            Self::DocumentUnreadable | Self::DocumentProtected | Self::OcrFailed => {
                "OCRProcessingError"
            }
            Self::ContextLengthExceeded | Self::CompletionFailed => "AIInsightsError",
            Self::ProviderTimeout | Self::ProviderRateLimited | Self::ProviderUnavailable => {
                "ProviderError"
            }
            Self::Unauthorized => "AuthenticationError",
            Self::Internal => "InternalServerError",
        }
    }

    /// Message shown to the end user in the dismissible alert.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::MissingFile => "Please select a PDF file to upload.",
            Self::InvalidFileType => "Invalid file type. Please upload a PDF file.",
            Self::InvalidFilename => "Invalid filename. Please ensure the file has a .pdf extension.",
            Self::FileTooLarge => "The file is too large. Please upload a smaller PDF.",
            Self::InvalidPdf => "The file does not appear to be a valid PDF.",
            Self::MalformedUpload => "The upload could not be read. Please try again.",
            Self::DocumentUnreadable => {
                "The PDF could not be read. It may be corrupted or contain no extractable content."
            }
            Self::DocumentProtected => {
                "The PDF appears to be password-protected. Please remove the protection and try again."
            }
            Self::ContextLengthExceeded => {
                "The document is too long to analyze. Please try a shorter paper."
            }
            Self::ProviderTimeout => {
                "The analysis took too long and timed out. Please try again with a smaller file."
            }
            Self::ProviderRateLimited => {
                "The analysis service is busy right now. Please wait a moment and try again."
            }
            Self::ProviderUnavailable => {
                "The analysis service is currently unavailable. Please try again later."
            }
            Self::OcrFailed => "Text extraction failed. Please try again.",
            Self::CompletionFailed => "Generating insights failed. Please try again.",
            Self::Unauthorized => "Authentication is required.",
            Self::Internal => "An unexpected error occurred. Please try again.",
        }
    }
}

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_type: String,
    pub code: ErrorKind,
}

/// A request-terminating error with its client-facing kind.
#[derive(Debug, Error)]
#[error("{detail}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized, ErrorKind::Unauthorized.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        if status.is_server_error() {
            tracing::error!("{:?}: {}", self.kind, self.detail);
        } else if self.kind == ErrorKind::Unauthorized {
            tracing::info!("Authentication failed: {}", self.detail);
        } else {
            tracing::warn!("Client error {:?}: {}", self.kind, self.detail);
        }

        // Internal details stay in the log.
        let detail = if self.kind == ErrorKind::Internal {
            ErrorKind::Internal.user_message().to_string()
        } else {
            self.detail
        };

        let body = ErrorBody {
            detail,
            error_type: self.kind.error_type().to_string(),
            code: self.kind,
        };

        let mut response = (status, Json(body)).into_response();
        if self.kind == ErrorKind::Unauthorized {
            if let Ok(challenge) =
                HeaderValue::from_str(&format!("Basic realm=\"{}\"", AUTH_REALM))
            {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, challenge);
            }
        }
        response
    }
}

/// Which outbound call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ocr,
    Completion,
}

/// Failure of a call to an external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request timed out after {secs}s")]
    Timeout { provider: &'static str, secs: u64 },

    #[error("{provider} API error ({status}): {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned a malformed response: {detail}")]
    Malformed {
        provider: &'static str,
        detail: String,
    },

    #[error("failed to reach {provider}: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

const MAX_ERROR_BODY: usize = 500;

impl ProviderError {
    /// Classify a reqwest failure for `provider` under a deadline of `secs`.
    pub fn from_reqwest(provider: &'static str, secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { provider, secs }
        } else if err.is_decode() {
            Self::Malformed {
                provider,
                detail: err.to_string(),
            }
        } else {
            Self::Transport {
                provider,
                source: err,
            }
        }
    }

    pub fn status(provider: &'static str, status: u16, body: &str) -> Self {
        let body = if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        } else {
            body.to_string()
        };
        Self::Status {
            provider,
            status,
            body,
        }
    }

    /// Translate into a client-facing error. `encrypted` reports whether the
    /// uploaded PDF declared an encryption dictionary.
    pub fn into_api_error(self, stage: Stage, encrypted: bool) -> ApiError {
        let fallback = match stage {
            Stage::Ocr => ErrorKind::OcrFailed,
            Stage::Completion => ErrorKind::CompletionFailed,
        };

        let kind = match &self {
            Self::Timeout { .. } => ErrorKind::ProviderTimeout,
            Self::Transport { .. } => ErrorKind::ProviderUnavailable,
            Self::Malformed { .. } => fallback,
            Self::Status { status, body, .. } => match (*status, stage) {
                (429, _) => ErrorKind::ProviderRateLimited,
                (401 | 403, _) => ErrorKind::ProviderUnavailable,
                (s, _) if s >= 500 => ErrorKind::ProviderUnavailable,
                (400 | 413 | 422, Stage::Ocr) if encrypted => ErrorKind::DocumentProtected,
                (400 | 413 | 422, Stage::Ocr) => ErrorKind::DocumentUnreadable,
                (400 | 413 | 422, Stage::Completion) if is_context_length_error(body) => {
                    ErrorKind::ContextLengthExceeded
                }
                _ => fallback,
            },
        };

        let prefix = match stage {
            Stage::Ocr => "Failed to process PDF with OCR",
            Stage::Completion => "Failed to generate insights",
        };
        ApiError::new(kind, format!("{}: {}", prefix, self))
    }
}

/// Detect a "prompt exceeds the model's context window" rejection.
///
/// OpenAI-compatible servers report `{"error": {"code": "context_length_exceeded"}}`;
/// servers that only send a message are matched on the message text.
pub fn is_context_length_error(body: &str) -> bool {
    #[derive(Deserialize)]
    struct Envelope {
        error: Option<Inner>,
    }
    #[derive(Deserialize)]
    struct Inner {
        code: Option<serde_json::Value>,
        #[serde(rename = "type")]
        kind: Option<String>,
        message: Option<String>,
    }

    let message = match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope { error: Some(inner) }) => {
            let code_matches = inner
                .code
                .as_ref()
                .and_then(|c| c.as_str())
                .map(|c| c == "context_length_exceeded")
                .unwrap_or(false);
            let type_matches = inner.kind.as_deref() == Some("context_length_exceeded");
            if code_matches || type_matches {
                return true;
            }
            inner.message.unwrap_or_default()
        }
        _ => body.to_string(),
    };

    let message = message.to_lowercase();
    message.contains("context length")
        || message.contains("context_length")
        || message.contains("maximum context")
        || message.contains("context window")
}
