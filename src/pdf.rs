//! Lightweight PDF inspection with lopdf.

use lopdf::Document;
use tracing::debug;

/// Every PDF file starts with this signature.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// What we could learn about a PDF without sending it anywhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PdfInspection {
    /// `None` when lopdf could not parse the document.
    pub page_count: Option<u32>,
    pub encrypted: bool,
}

pub fn has_pdf_signature(data: &[u8]) -> bool {
    data.starts_with(PDF_SIGNATURE)
}

/// Parse the document to count pages and detect encryption.
///
/// Never fails: documents lopdf cannot read are still handed to the OCR
/// provider, which may cope with them.
pub fn inspect(data: &[u8]) -> PdfInspection {
    match Document::load_mem(data) {
        Ok(doc) => PdfInspection {
            page_count: Some(doc.get_pages().len() as u32),
            encrypted: doc.is_encrypted() || declares_encryption(data),
        },
        Err(e) => {
            debug!("lopdf could not parse document: {}", e);
            PdfInspection {
                page_count: None,
                encrypted: declares_encryption(data),
            }
        }
    }
}

/// Scan the raw bytes for a trailer `/Encrypt` entry.
fn declares_encryption(data: &[u8]) -> bool {
    const NEEDLE: &[u8] = b"/Encrypt";
    data.windows(NEEDLE.len()).any(|w| w == NEEDLE)
}
