//! Client-side state and API access.
//!
//! Everything the web client tracks between user actions: which document is
//! loaded and from where, how the PDF preview is positioned, and what the
//! report pane shows. All of it lives for one session only.

pub mod api;
pub mod preload;
pub mod report;
pub mod upload;
pub mod viewer;

pub use api::{ClientError, InsightClient};
pub use preload::{PreloadCatalog, PreloadedExample, PreloadedPaper};
pub use report::{ReportPane, ReportView};
pub use upload::{LoadedPdf, UploadMode, UploadSource, UploadState};
pub use viewer::PdfViewer;
