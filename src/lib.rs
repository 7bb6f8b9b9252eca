//! InsightGUIDE - AI reading guides for research papers.
//!
//! The API service forwards uploaded PDFs to an OCR provider, feeds the
//! extracted markdown to a chat-completion model and returns the model's
//! report. The [`client`] module holds the web client's state logic and an
//! HTTP client for the API.

pub mod auth;
pub mod client;
pub mod completion;
pub mod config;
pub mod dump;
pub mod error;
pub mod markdown;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod server;
pub mod upload;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
