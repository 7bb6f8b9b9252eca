//! Multipart PDF upload handling for the API endpoints.

use crate::error::{ApiError, ErrorKind};
use crate::markdown::format_file_size;
use crate::pdf::{self, PdfInspection};
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use tracing::{debug, warn};

/// Multipart field carrying the document.
pub const FIELD_NAME: &str = "pdf_file";

pub const PDF_MIME_TYPES: [&str; 2] = ["application/pdf", "application/x-pdf"];

/// A validated PDF upload.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub filename: String,
    pub data: Vec<u8>,
    pub inspection: PdfInspection,
}

impl PdfUpload {
    /// Validate a received file. Checks run in order: MIME type, file name,
    /// size, PDF signature.
    pub fn from_parts(
        filename: Option<&str>,
        content_type: Option<&str>,
        data: Vec<u8>,
        max_size: usize,
    ) -> Result<Self, ApiError> {
        let filename = validate(filename, content_type, &data, max_size)?;
        let inspection = pdf::inspect(&data);
        Ok(Self::inspected(filename, data, inspection))
    }

    /// [`from_parts`](Self::from_parts) for async callers. The lopdf parse
    /// runs on the blocking pool.
    pub async fn from_parts_off_thread(
        filename: Option<&str>,
        content_type: Option<&str>,
        data: Vec<u8>,
        max_size: usize,
    ) -> Result<Self, ApiError> {
        let filename = validate(filename, content_type, &data, max_size)?;
        let (data, inspection) = tokio::task::spawn_blocking(move || {
            let inspection = pdf::inspect(&data);
            (data, inspection)
        })
        .await
        .map_err(|e| ApiError::internal(format!("PDF inspection task failed: {}", e)))?;
        Ok(Self::inspected(filename, data, inspection))
    }

    fn inspected(filename: String, data: Vec<u8>, inspection: PdfInspection) -> Self {
        debug!(
            "Inspected {}: pages={:?} encrypted={}",
            filename, inspection.page_count, inspection.encrypted
        );
        Self {
            filename,
            data,
            inspection,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Read the `pdf_file` field from a multipart body.
///
/// The body is streamed so oversized files are refused as soon as they cross
/// the ceiling instead of being buffered whole.
pub async fn read_pdf_upload(
    multipart: &mut Multipart,
    max_size: usize,
) -> Result<PdfUpload, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FIELD_NAME) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        // Reject on metadata before reading any bytes.
        check_content_type(content_type.as_deref())?;
        check_filename(filename.as_deref())?;

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            check_size(data.len() + chunk.len(), max_size)?;
            data.extend_from_slice(&chunk);
        }

        return PdfUpload::from_parts_off_thread(
            filename.as_deref(),
            content_type.as_deref(),
            data,
            max_size,
        )
        .await;
    }

    Err(ApiError::new(
        ErrorKind::MissingFile,
        format!("No file uploaded. Send the PDF in the '{}' field.", FIELD_NAME),
    ))
}

fn validate(
    filename: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
    max_size: usize,
) -> Result<String, ApiError> {
    check_content_type(content_type)?;
    let filename = check_filename(filename)?;
    check_size(data.len(), max_size)?;

    if !pdf::has_pdf_signature(data) {
        warn!("File does not appear to be a valid PDF: {}", filename);
        return Err(ApiError::new(
            ErrorKind::InvalidPdf,
            "File does not appear to be a valid PDF",
        ));
    }
    Ok(filename)
}

fn check_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if PDF_MIME_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        warn!("Invalid file type uploaded: {:?}", content_type);
        Err(ApiError::new(
            ErrorKind::InvalidFileType,
            "Invalid file type. Please upload a PDF file.",
        ))
    }
}

fn check_filename(filename: Option<&str>) -> Result<String, ApiError> {
    match filename {
        Some(name) if name.to_lowercase().ends_with(".pdf") => Ok(name.to_string()),
        other => {
            warn!("Invalid filename: {:?}", other);
            Err(ApiError::new(
                ErrorKind::InvalidFilename,
                "Invalid filename. Please ensure the file has a .pdf extension.",
            ))
        }
    }
}

fn check_size(size: usize, max_size: usize) -> Result<(), ApiError> {
    if size <= max_size {
        return Ok(());
    }
    warn!("File too large: {} bytes so far", size);
    Err(too_large(max_size))
}

fn too_large(max_size: usize) -> ApiError {
    ApiError::new(
        ErrorKind::FileTooLarge,
        format!(
            "File too large. Maximum size: {}",
            format_file_size(max_size as u64)
        ),
    )
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(ErrorKind::FileTooLarge, "File too large.")
    } else {
        ApiError::new(
            ErrorKind::MalformedUpload,
            format!("Failed to read uploaded file: {}", err.body_text()),
        )
    }
}
