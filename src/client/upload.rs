//! Document selection: file picker, drag-and-drop, remote URL or a bundled
//! example. Exactly one source can be loaded at a time.

use crate::client::preload::PreloadedExample;
use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::markdown::{pdf_stem, safe_filename};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info};

pub const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid file type ({mime}). Please upload a PDF file.")]
    InvalidType { mime: String },

    #[error("File is too large ({size} bytes). Maximum size: {max} bytes.")]
    TooLarge { size: usize, max: usize },

    #[error("Please drop a single PDF file ({count} files were dropped).")]
    MultipleFiles { count: usize },

    #[error("No file was provided.")]
    NoFile,

    #[error("Clear the loaded document before switching input mode.")]
    ModeLocked,

    #[error("Switch to {expected:?} mode first (current mode is {current:?}).")]
    WrongMode {
        expected: UploadMode,
        current: UploadMode,
    },

    #[error("Failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("URL must start with http:// or https://")]
    InvalidUrl,

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{url} did not return a PDF (content type: {content_type})")]
    NotPdfResponse { url: String, content_type: String },
}

/// Metadata of a file offered by the picker or a drop, before reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub mime: String,
    pub size: usize,
}

/// A PDF accepted for preview and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPdf {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LoadedPdf {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// `data:` URL used by the preview pane.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", PDF_MIME, BASE64.encode(&self.bytes))
    }
}

/// Check a single file's type and size. Never touches the network.
pub fn validate_candidate(file: &CandidateFile, max_bytes: usize) -> Result<(), UploadError> {
    let essence = file.mime.split(';').next().unwrap_or("").trim();
    if !essence.eq_ignore_ascii_case(PDF_MIME) {
        return Err(UploadError::InvalidType {
            mime: file.mime.clone(),
        });
    }
    if file.size > max_bytes {
        return Err(UploadError::TooLarge {
            size: file.size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// A drop must carry exactly one acceptable file.
pub fn validate_drop(files: &[CandidateFile], max_bytes: usize) -> Result<&CandidateFile, UploadError> {
    match files {
        [] => Err(UploadError::NoFile),
        [file] => {
            validate_candidate(file, max_bytes)?;
            Ok(file)
        }
        _ => Err(UploadError::MultipleFiles { count: files.len() }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    #[default]
    File,
    Url,
    Preload,
}

/// Where the current document came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadSource {
    #[default]
    None,
    LocalFile(LoadedPdf),
    RemoteUrl { url: String, pdf: LoadedPdf },
    PreloadedExample(PreloadedExample),
}

impl UploadSource {
    pub fn pdf(&self) -> Option<&LoadedPdf> {
        match self {
            Self::None => None,
            Self::LocalFile(pdf) | Self::RemoteUrl { pdf, .. } => Some(pdf),
            Self::PreloadedExample(example) => Some(&example.pdf),
        }
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Precomputed report, only present for bundled examples.
    pub fn preloaded_report(&self) -> Option<&str> {
        match self {
            Self::PreloadedExample(example) => Some(&example.report),
            _ => None,
        }
    }
}

/// Input-mode selection plus the loaded source.
#[derive(Debug, Clone)]
pub struct UploadState {
    mode: UploadMode,
    source: UploadSource,
    max_bytes: usize,
}

impl Default for UploadState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl UploadState {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            mode: UploadMode::default(),
            source: UploadSource::None,
            max_bytes,
        }
    }

    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    pub fn source(&self) -> &UploadSource {
        &self.source
    }

    /// Change input mode. Refused while a document is loaded.
    pub fn set_mode(&mut self, mode: UploadMode) -> Result<(), UploadError> {
        if mode == self.mode {
            return Ok(());
        }
        if self.source.is_loaded() {
            return Err(UploadError::ModeLocked);
        }
        self.mode = mode;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.source = UploadSource::None;
    }

    fn require_mode(&self, expected: UploadMode) -> Result<(), UploadError> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(UploadError::WrongMode {
                expected,
                current: self.mode,
            })
        }
    }

    /// Accept a file from the picker. `read` is only called once the file
    /// passed validation.
    pub fn accept_file<F>(&mut self, file: &CandidateFile, read: F) -> Result<&LoadedPdf, UploadError>
    where
        F: FnOnce() -> std::io::Result<Vec<u8>>,
    {
        self.require_mode(UploadMode::File)?;
        validate_candidate(file, self.max_bytes)?;
        let bytes = read().map_err(|source| UploadError::Read {
            name: file.name.clone(),
            source,
        })?;
        // The reported size may be stale; trust the bytes.
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }
        info!("Loaded local file {} ({} bytes)", file.name, bytes.len());
        self.source = UploadSource::LocalFile(LoadedPdf::new(&file.name, bytes));
        self.loaded()
    }

    /// Accept a drag-and-drop of one or more files.
    pub fn accept_drop<F>(&mut self, files: &[CandidateFile], read: F) -> Result<&LoadedPdf, UploadError>
    where
        F: FnOnce(&CandidateFile) -> std::io::Result<Vec<u8>>,
    {
        self.require_mode(UploadMode::File)?;
        let file = validate_drop(files, self.max_bytes)?.clone();
        self.accept_file(&file, || read(&file))
    }

    /// Fetch a PDF from `url` and load it.
    pub async fn load_url(
        &mut self,
        client: &reqwest::Client,
        url: &str,
    ) -> Result<&LoadedPdf, UploadError> {
        self.require_mode(UploadMode::Url)?;
        let pdf = fetch_pdf(client, url, self.max_bytes).await?;
        self.source = UploadSource::RemoteUrl {
            url: url.to_string(),
            pdf,
        };
        self.loaded()
    }

    /// Load a bundled example.
    pub fn load_example(&mut self, example: PreloadedExample) -> Result<(), UploadError> {
        self.require_mode(UploadMode::Preload)?;
        info!("Loaded example {}", example.paper.id);
        self.source = UploadSource::PreloadedExample(example);
        Ok(())
    }

    fn loaded(&self) -> Result<&LoadedPdf, UploadError> {
        self.source.pdf().ok_or(UploadError::NoFile)
    }
}

/// Download `url` as a PDF of at most `max_bytes`.
pub async fn fetch_pdf(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<LoadedPdf, UploadError> {
    let url = url.trim();
    let parsed = Url::parse(url).map_err(|_| UploadError::InvalidUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UploadError::InvalidUrl);
    }

    let fetch_error = |source| UploadError::Fetch {
        url: url.to_string(),
        source,
    };

    let mut response = client.get(parsed.clone()).send().await.map_err(fetch_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(UploadError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    validate_candidate(
        &CandidateFile {
            name: String::new(),
            mime: content_type.clone(),
            size: 0,
        },
        max_bytes,
    )
    .map_err(|_| UploadError::NotPdfResponse {
        url: url.to_string(),
        content_type,
    })?;

    if let Some(length) = response.content_length() {
        if length > max_bytes as u64 {
            return Err(UploadError::TooLarge {
                size: usize::try_from(length).unwrap_or(usize::MAX),
                max: max_bytes,
            });
        }
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len() + chunk.len(),
                max: max_bytes,
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    let name = file_name_from_url(&parsed);
    debug!("Fetched {} ({} bytes) from {}", name, bytes.len(), url);
    Ok(LoadedPdf::new(name, bytes))
}

/// Upload name for a fetched document: the decoded last path segment,
/// always ending in `.pdf`. Falls back to `document.pdf`.
fn file_name_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        });

    let Some(segment) = segment else {
        return "document.pdf".to_string();
    };
    let name = safe_filename(&segment);
    if pdf_stem(&name).len() == name.len() {
        format!("{}.pdf", name)
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::tests::sample_pdf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidate(name: &str, mime: &str, size: usize) -> CandidateFile {
        CandidateFile {
            name: name.to_string(),
            mime: mime.to_string(),
            size,
        }
    }

    #[test]
    fn test_non_pdf_rejected_before_reading() {
        let mut state = UploadState::new(1024);
        let err = state
            .accept_file(&candidate("a.png", "image/png", 10), || {
                panic!("file must not be read")
            })
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidType { .. }));
        assert!(!state.source().is_loaded());
    }

    #[test]
    fn test_oversize_rejected_before_reading() {
        let mut state = UploadState::new(1024);
        let err = state
            .accept_file(&candidate("a.pdf", PDF_MIME, 1025), || {
                panic!("file must not be read")
            })
            .unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { size: 1025, max: 1024 }));
    }

    #[test]
    fn test_drop_rules() {
        let mut state = UploadState::new(1024);
        let files = vec![candidate("a.pdf", PDF_MIME, 10), candidate("b.pdf", PDF_MIME, 10)];
        assert!(matches!(
            state.accept_drop(&files, |_| Ok(Vec::new())).unwrap_err(),
            UploadError::MultipleFiles { count: 2 }
        ));
        assert!(matches!(
            state.accept_drop(&[], |_| Ok(Vec::new())).unwrap_err(),
            UploadError::NoFile
        ));

        let pdf = state
            .accept_drop(&files[..1], |f| {
                assert_eq!(f.name, "a.pdf");
                Ok(b"%PDF-1.4".to_vec())
            })
            .unwrap();
        assert_eq!(pdf.name, "a.pdf");
    }

    #[test]
    fn test_mode_locked_until_cleared() {
        let mut state = UploadState::new(1024);
        state
            .accept_file(&candidate("a.pdf", PDF_MIME, 8), || Ok(b"%PDF-1.4".to_vec()))
            .unwrap();

        for mode in [UploadMode::Url, UploadMode::Preload] {
            assert!(matches!(state.set_mode(mode), Err(UploadError::ModeLocked)));
        }
        assert_eq!(state.mode(), UploadMode::File);

        state.clear();
        state.set_mode(UploadMode::Url).unwrap();
        assert_eq!(state.mode(), UploadMode::Url);
    }

    #[test]
    fn test_wrong_mode() {
        let mut state = UploadState::new(1024);
        state.set_mode(UploadMode::Preload).unwrap();
        assert!(matches!(
            state.accept_file(&candidate("a.pdf", PDF_MIME, 8), || Ok(Vec::new())),
            Err(UploadError::WrongMode { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_example() {
        let dir = crate::client::preload::tests::catalog_dir();
        let catalog = crate::client::PreloadCatalog::from_dir(dir.path()).await.unwrap();
        let example = catalog.fetch("attention").await.unwrap();

        let mut state = UploadState::default();
        assert!(matches!(
            state.load_example(example.clone()),
            Err(UploadError::WrongMode { expected: UploadMode::Preload, .. })
        ));

        state.set_mode(UploadMode::Preload).unwrap();
        state.load_example(example).unwrap();
        assert_eq!(state.source().preloaded_report(), Some("# Attention report"));
        assert_eq!(state.source().pdf().unwrap().name, "attention.pdf");
    }

    #[test]
    fn test_data_url() {
        let pdf = LoadedPdf::new("a.pdf", b"%PDF".to_vec());
        assert_eq!(pdf.data_url(), "data:application/pdf;base64,JVBERg==");
    }

    fn name_for(url: &str) -> String {
        file_name_from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(name_for("https://arxiv.org/pdf/1706.03762v7.pdf?x=1"), "1706.03762v7.pdf");
        assert_eq!(name_for("https://arxiv.org/pdf/1706.03762"), "1706.03762.pdf");
        assert_eq!(name_for("https://arxiv.org/abs/1706.03762/"), "1706.03762.pdf");
        assert_eq!(name_for("https://example.org/papers/My%20Paper.PDF#page=2"), "My Paper.PDF");
        assert_eq!(name_for("https://example.org/a%2Fb.pdf"), "a_b.pdf");
        assert_eq!(name_for("https://example.org/"), "document.pdf");
        assert_eq!(name_for("https://example.org"), "document.pdf");
    }

    #[tokio::test]
    async fn test_extensionless_url_passes_server_validation() {
        let data = sample_pdf(1);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/1706.03762"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", PDF_MIME)
                    .set_body_bytes(data.clone()),
            )
            .mount(&server)
            .await;

        let mut state = UploadState::new(1 << 20);
        state.set_mode(UploadMode::Url).unwrap();
        let url = format!("{}/pdf/1706.03762", server.uri());
        let pdf = state.load_url(&reqwest::Client::new(), &url).await.unwrap();
        assert_eq!(pdf.name, "1706.03762.pdf");

        let upload = crate::upload::PdfUpload::from_parts(
            Some(&pdf.name),
            Some(PDF_MIME),
            pdf.bytes.clone(),
            1 << 20,
        )
        .unwrap();
        assert_eq!(upload.filename, "1706.03762.pdf");
    }

    #[tokio::test]
    async fn test_url_load_matches_local_upload() {
        let data = sample_pdf(2);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/papers/paper.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", PDF_MIME)
                    .set_body_bytes(data.clone()),
            )
            .mount(&server)
            .await;

        let mut remote = UploadState::new(1 << 20);
        remote.set_mode(UploadMode::Url).unwrap();
        let url = format!("{}/papers/paper.pdf", server.uri());
        remote.load_url(&reqwest::Client::new(), &url).await.unwrap();

        let mut local = UploadState::new(1 << 20);
        local
            .accept_file(&candidate("paper.pdf", PDF_MIME, data.len()), || Ok(data.clone()))
            .unwrap();

        assert_eq!(remote.source().pdf(), local.source().pdf());
        assert_eq!(
            remote.source().pdf().unwrap().data_url(),
            local.source().pdf().unwrap().data_url()
        );
    }

    #[tokio::test]
    async fn test_url_load_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html></html>", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/big.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", PDF_MIME)
                    .set_body_bytes(vec![0u8; 2048]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let base = server.uri();
        let fetch = |p: &str| {
            let client = client.clone();
            let url = format!("{}{}", base, p);
            async move { fetch_pdf(&client, &url, 1024).await }
        };

        assert!(matches!(fetch("/page.html").await, Err(UploadError::NotPdfResponse { .. })));
        assert!(matches!(fetch("/big.pdf").await, Err(UploadError::TooLarge { .. })));
        assert!(matches!(
            fetch("/missing.pdf").await,
            Err(UploadError::HttpStatus { status: 404, .. })
        ));
        for bad in ["ftp://example.org/a.pdf", "not a url"] {
            assert!(matches!(fetch_pdf(&client, bad, 1024).await, Err(UploadError::InvalidUrl)));
        }
    }
}
