//! Bundled example papers with precomputed reports.
//!
//! Layout under the catalog root:
//!
//! ```text
//! papers.json          [{"id": ..., "title": ..., "filename": ...}, ...]
//! MD/<filename>.md     precomputed insight report
//! PDF/<filename>.pdf   the paper itself
//! ```
//!
//! The root is either a local directory or an HTTP base URL (the server's
//! static mount at `/data/preload`).

use crate::client::upload::LoadedPdf;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CATALOG_FILE: &str = "papers.json";

#[derive(Debug, Error)]
pub enum PreloadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate paper id '{0}' in catalog")]
    DuplicateId(String),

    #[error("unknown paper id '{0}'")]
    UnknownId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadedPaper {
    pub id: String,
    pub title: String,
    /// Base name shared by the MD and PDF files, without extension.
    pub filename: String,
}

impl PreloadedPaper {
    pub fn report_path(&self) -> String {
        format!("MD/{}.md", self.filename)
    }

    pub fn pdf_path(&self) -> String {
        format!("PDF/{}.pdf", self.filename)
    }

    pub fn pdf_name(&self) -> String {
        format!("{}.pdf", self.filename)
    }
}

/// A fully fetched example: paper metadata, PDF bytes and report markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadedExample {
    pub paper: PreloadedPaper,
    pub pdf: LoadedPdf,
    pub report: String,
}

#[derive(Debug, Clone)]
pub enum PreloadSource {
    Dir(PathBuf),
    Http {
        client: reqwest::Client,
        base_url: String,
    },
}

impl PreloadSource {
    pub fn http(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self::Http {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn read(&self, relative: &str) -> Result<Vec<u8>, PreloadError> {
        match self {
            Self::Dir(root) => {
                let path = root.join(relative);
                tokio::fs::read(&path).await.map_err(|source| PreloadError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
            Self::Http { client, base_url } => {
                let url = format!("{}/{}", base_url, relative);
                let http_error = |source| PreloadError::Http {
                    url: url.clone(),
                    source,
                };
                let response = client.get(&url).send().await.map_err(http_error)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(PreloadError::Status {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }
                let bytes = response.bytes().await.map_err(http_error)?;
                Ok(bytes.to_vec())
            }
        }
    }

    async fn exists(&self, relative: &str) -> bool {
        match self {
            Self::Dir(root) => tokio::fs::metadata(root.join(relative))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Self::Http { client, base_url } => {
                let url = format!("{}/{}", base_url, relative);
                match client.head(&url).send().await {
                    Ok(response) => response.status().is_success(),
                    Err(e) => {
                        debug!("HEAD {} failed: {}", url, e);
                        false
                    }
                }
            }
        }
    }
}

/// A paper whose files are missing from the catalog root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFile {
    pub paper_id: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct PreloadCatalog {
    source: PreloadSource,
    papers: Vec<PreloadedPaper>,
}

impl PreloadCatalog {
    pub async fn load(source: PreloadSource) -> Result<Self, PreloadError> {
        let raw = source.read(CATALOG_FILE).await?;
        let papers: Vec<PreloadedPaper> = serde_json::from_slice(&raw)?;

        let mut seen = HashSet::new();
        for paper in &papers {
            if !seen.insert(paper.id.as_str()) {
                return Err(PreloadError::DuplicateId(paper.id.clone()));
            }
        }

        info!("Loaded {} preloaded papers", papers.len());
        Ok(Self { source, papers })
    }

    pub async fn from_dir(root: impl AsRef<Path>) -> Result<Self, PreloadError> {
        Self::load(PreloadSource::Dir(root.as_ref().to_path_buf())).await
    }

    pub fn papers(&self) -> &[PreloadedPaper] {
        &self.papers
    }

    pub fn find(&self, id: &str) -> Option<&PreloadedPaper> {
        self.papers.iter().find(|p| p.id == id)
    }

    /// Fetch an example's PDF and report. Fetching the same id again yields
    /// the same content.
    pub async fn fetch(&self, id: &str) -> Result<PreloadedExample, PreloadError> {
        let paper = self
            .find(id)
            .cloned()
            .ok_or_else(|| PreloadError::UnknownId(id.to_string()))?;

        let report_bytes = self.source.read(&paper.report_path()).await?;
        let pdf_bytes = self.source.read(&paper.pdf_path()).await?;
        let report = String::from_utf8_lossy(&report_bytes).into_owned();

        debug!(
            "Fetched example {} ({} byte PDF, {} byte report)",
            paper.id,
            pdf_bytes.len(),
            report.len()
        );
        Ok(PreloadedExample {
            pdf: LoadedPdf::new(paper.pdf_name(), pdf_bytes),
            paper,
            report,
        })
    }

    /// List every MD or PDF file the catalog names but the root lacks.
    pub async fn verify(&self) -> Vec<MissingFile> {
        let mut missing = Vec::new();
        for paper in &self.papers {
            for path in [paper.report_path(), paper.pdf_path()] {
                if !self.source.exists(&path).await {
                    warn!("Preloaded paper {} is missing {}", paper.id, path);
                    missing.push(MissingFile {
                        paper_id: paper.id.clone(),
                        path,
                    });
                }
            }
        }
        missing
    }
}
