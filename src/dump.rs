//! Debug dumps of OCR output.
//!
//! With `SAVE_EXTRACTED_CONTENT` enabled, every extracted document is written
//! to `<OUTPUT_DIR>/extracted_<name>_<timestamp>.md` for inspection.

use crate::markdown::{pdf_stem, safe_filename};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ExtractDump {
    dir: PathBuf,
}

impl ExtractDump {
    /// Create the output directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, content: &str, original_filename: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.join(dump_filename(original_filename, Local::now()));
        let content = if content.is_empty() {
            warn!("Empty content provided for saving");
            "No content extracted from document."
        } else {
            content
        };

        tokio::fs::write(&path, content).await?;
        info!("Saved extracted content to: {}", path.display());
        Ok(path)
    }
}

fn dump_filename(original_filename: &str, at: DateTime<Local>) -> String {
    format!(
        "extracted_{}_{}.md",
        safe_filename(pdf_stem(original_filename)),
        at.format("%Y%m%d_%H%M%S")
    )
}
