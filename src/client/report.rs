//! Report pane: processing indicator, rendered report and error alert.

use crate::client::api::ClientError;
use crate::client::preload::PreloadedExample;
use crate::error::ErrorKind;
use crate::markdown::report_filename;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Report shown by the test-content loader.
pub const TEST_CONTENT: &str = "# Test Report\n\n\
## Summary\n\n\
This is placeholder content for exercising the report pane without calling the API.\n\n\
- Visit [the project page](example.org/insightguide) for details.\n\
- Inline math such as $E = mc^2$ should render.\n";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no report to save")]
    NothingToSave,

    #[error("test content is only available in testing mode")]
    TestingDisabled,

    #[error("a document is already being processed")]
    Busy,

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TextSize {
    Small,
    #[default]
    Normal,
    Large,
    ExtraLarge,
}

impl TextSize {
    const STEPS: [TextSize; 4] = [Self::Small, Self::Normal, Self::Large, Self::ExtraLarge];

    fn index(self) -> usize {
        self as usize
    }

    pub fn larger(self) -> Self {
        Self::STEPS[(self.index() + 1).min(Self::STEPS.len() - 1)]
    }

    pub fn smaller(self) -> Self {
        Self::STEPS[self.index().saturating_sub(1)]
    }

    /// Base font size in CSS pixels.
    pub fn px(self) -> u8 {
        match self {
            Self::Small => 14,
            Self::Normal => 16,
            Self::Large => 18,
            Self::ExtraLarge => 20,
        }
    }
}

/// Which report controls are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportControls {
    pub text_size: bool,
    pub save: bool,
    pub test_loader: bool,
}

/// A rendered report and its display settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportView {
    markdown: String,
    source_name: String,
    text_size: TextSize,
}

impl ReportView {
    /// `source_name` is the PDF the report was generated from.
    pub fn new(markdown: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            source_name: source_name.into(),
            text_size: TextSize::default(),
        }
    }

    pub fn markdown(&self) -> &str {
        &self.markdown
    }

    pub fn text_size(&self) -> TextSize {
        self.text_size
    }

    pub fn increase_text_size(&mut self) -> TextSize {
        self.text_size = self.text_size.larger();
        self.text_size
    }

    pub fn decrease_text_size(&mut self) -> TextSize {
        self.text_size = self.text_size.smaller();
        self.text_size
    }

    /// Download name, `<pdf-stem>_insights.md`.
    pub fn file_name(&self) -> String {
        report_filename(&self.source_name)
    }

    /// Write the report into `dir` under [`file_name`](Self::file_name).
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &self.markdown)
            .await
            .map_err(|source| ReportError::Io {
                path: path.clone(),
                source,
            })?;
        info!("Saved report to {}", path.display());
        Ok(path)
    }
}

/// A dismissible error alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl From<&ClientError> for Alert {
    fn from(err: &ClientError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReportState {
    #[default]
    Empty,
    Processing { filename: String },
    Ready(ReportView),
    Failed(Alert),
}

#[derive(Debug, Clone, Default)]
pub struct ReportPane {
    state: ReportState,
    testing_mode: bool,
}

impl ReportPane {
    pub fn new(testing_mode: bool) -> Self {
        Self {
            state: ReportState::Empty,
            testing_mode,
        }
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    pub fn report(&self) -> Option<&ReportView> {
        match &self.state {
            ReportState::Ready(view) => Some(view),
            _ => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, ReportState::Processing { .. })
    }

    pub fn controls(&self) -> ReportControls {
        let ready = self.report().is_some();
        ReportControls {
            text_size: ready,
            save: ready,
            test_loader: self.testing_mode && !self.is_processing(),
        }
    }

    /// Enter the processing state. Only one request runs at a time.
    pub fn start(&mut self, filename: impl Into<String>) -> Result<(), ReportError> {
        if self.is_processing() {
            return Err(ReportError::Busy);
        }
        self.state = ReportState::Processing {
            filename: filename.into(),
        };
        Ok(())
    }

    /// Record the outcome of the request started by [`start`](Self::start).
    pub fn finish(&mut self, result: Result<String, ClientError>) -> &ReportState {
        let filename = match &self.state {
            ReportState::Processing { filename } => filename.clone(),
            _ => String::new(),
        };
        self.state = match result {
            Ok(markdown) => ReportState::Ready(ReportView::new(markdown, filename)),
            Err(err) => {
                warn!("Processing {} failed: {}", filename, err);
                ReportState::Failed(Alert::from(&err))
            }
        };
        &self.state
    }

    /// Show a bundled example's precomputed report.
    pub fn show_example(&mut self, example: &PreloadedExample) {
        self.state = ReportState::Ready(ReportView::new(
            example.report.clone(),
            example.pdf.name.clone(),
        ));
    }

    pub fn load_test_content(&mut self) -> Result<(), ReportError> {
        if !self.testing_mode {
            return Err(ReportError::TestingDisabled);
        }
        if self.is_processing() {
            return Err(ReportError::Busy);
        }
        self.state = ReportState::Ready(ReportView::new(TEST_CONTENT, "test.pdf"));
        Ok(())
    }

    /// Close the alert, leaving the pane empty.
    pub fn dismiss(&mut self) {
        if matches!(self.state, ReportState::Failed(_)) {
            self.state = ReportState::Empty;
        }
    }

    pub fn clear(&mut self) {
        self.state = ReportState::Empty;
    }

    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        self.report()
            .ok_or(ReportError::NothingToSave)?
            .save_to(dir)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::preload::tests::catalog_dir;
    use crate::client::preload::PreloadCatalog;
    use tempfile::TempDir;

    #[test]
    fn test_ready_report_enables_controls() {
        for testing in [false, true] {
            let mut pane = ReportPane::new(testing);
            assert_eq!(pane.controls(), ReportControls { test_loader: testing, ..Default::default() });

            pane.start("paper.pdf").unwrap();
            assert!(matches!(pane.start("other.pdf"), Err(ReportError::Busy)));
            assert!(!pane.controls().test_loader);

            pane.finish(Ok("X".to_string()));
            assert_eq!(pane.report().unwrap().markdown(), "X");
            assert_eq!(
                pane.controls(),
                ReportControls {
                    text_size: true,
                    save: true,
                    test_loader: testing,
                }
            );
        }
    }

    #[test]
    fn test_failure_shows_alert_until_dismissed() {
        let mut pane = ReportPane::new(false);
        pane.start("paper.pdf").unwrap();
        let err = ClientError::Api {
            code: Some(ErrorKind::DocumentProtected),
            inferred: None,
            status: 422,
            message: "encrypted".to_string(),
        };
        match pane.finish(Err(err)) {
            ReportState::Failed(alert) => {
                assert_eq!(alert.kind, Some(ErrorKind::DocumentProtected));
                assert_eq!(alert.message, ErrorKind::DocumentProtected.user_message());
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert!(!pane.controls().save);

        pane.dismiss();
        assert_eq!(pane.state(), &ReportState::Empty);
    }

    #[test]
    fn test_text_size_steps() {
        let mut view = ReportView::new("x", "a.pdf");
        assert_eq!(view.increase_text_size(), TextSize::Large);
        assert_eq!(view.increase_text_size(), TextSize::ExtraLarge);
        assert_eq!(view.increase_text_size(), TextSize::ExtraLarge);
        for _ in 0..5 {
            view.decrease_text_size();
        }
        assert_eq!(view.text_size(), TextSize::Small);
        assert_eq!(view.text_size().px(), 14);
    }

    #[test]
    fn test_test_loader_requires_testing_mode() {
        let mut pane = ReportPane::new(false);
        assert!(matches!(pane.load_test_content(), Err(ReportError::TestingDisabled)));

        let mut pane = ReportPane::new(true);
        pane.load_test_content().unwrap();
        assert_eq!(pane.report().unwrap().markdown(), TEST_CONTENT);
    }

    #[tokio::test]
    async fn test_save_uses_pdf_stem() {
        let dir = TempDir::new().unwrap();
        let mut pane = ReportPane::new(false);
        assert!(matches!(pane.save_to(dir.path()).await, Err(ReportError::NothingToSave)));

        pane.start("Attention Is All You Need.PDF").unwrap();
        pane.finish(Ok("# Report".to_string()));
        let path = pane.save_to(dir.path()).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "Attention Is All You Need_insights.md"
        );
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Report");
    }

    #[tokio::test]
    async fn test_same_example_twice_is_identical() {
        let dir = catalog_dir();
        let catalog = PreloadCatalog::from_dir(dir.path()).await.unwrap();
        let mut pane = ReportPane::new(false);

        pane.show_example(&catalog.fetch("attention").await.unwrap());
        let first = pane.report().cloned();
        pane.show_example(&catalog.fetch("attention").await.unwrap());

        assert_eq!(pane.report().cloned(), first);
        assert_eq!(pane.report().unwrap().file_name(), "attention_insights.md");
    }
}
