//! System prompt templates.
//!
//! Prompts live in a YAML file keyed by name:
//!
//! ```yaml
//! prompts:
//!   paper-assistant-prompt:
//!     description: Reading guide for research papers
//!     content: |
//!       You are a research assistant...
//! ```
//!
//! A template may embed the document with the `{{document}}` placeholder.
//! Without it, the template becomes the system message and the document is
//! sent as the user message.

use crate::completion::Message;
use figment::providers::{Format, Yaml};
use figment::Figment;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const DOCUMENT_PLACEHOLDER: &str = "{{document}}";

/// Substituted for OCR output that contains no text.
pub const EMPTY_DOCUMENT_TEXT: &str =
    "The document appears to be empty or no text could be extracted.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("system prompt file {0:?} not found")]
    NotFound(PathBuf),

    #[error("error parsing prompt file {source_name}: {source}")]
    Parse {
        source_name: String,
        #[source]
        source: Box<figment::Error>,
    },

    #[error("prompt key '{key}' not found in {source_name}. Available keys: {available:?}")]
    UnknownKey {
        key: String,
        source_name: String,
        available: Vec<String>,
    },

    #[error("empty content for prompt key '{key}' in {source_name}")]
    EmptyContent { key: String, source_name: String },
}

#[derive(Debug, Deserialize)]
struct PromptFile {
    prompts: BTreeMap<String, PromptEntry>,
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    key: String,
    content: String,
}

impl PromptTemplate {
    /// Load the prompt stored under `key` in the YAML file at `path`.
    pub fn load(path: &Path, key: &str) -> Result<Self, PromptError> {
        if !path.exists() {
            return Err(PromptError::NotFound(path.to_path_buf()));
        }
        let source_name = path.display().to_string();
        let template = Self::extract(Figment::from(Yaml::file(path)), key, &source_name)?;
        info!("Loaded system prompt '{}' from {}", key, source_name);
        Ok(template)
    }

    /// Load from YAML text already in memory.
    pub fn from_yaml_str(yaml: &str, key: &str) -> Result<Self, PromptError> {
        Self::extract(Figment::from(Yaml::string(yaml)), key, "<inline>")
    }

    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
        }
    }

    fn extract(figment: Figment, key: &str, source_name: &str) -> Result<Self, PromptError> {
        let file: PromptFile = figment.extract().map_err(|e| PromptError::Parse {
            source_name: source_name.to_string(),
            source: Box::new(e),
        })?;

        let entry = file.prompts.get(key).ok_or_else(|| PromptError::UnknownKey {
            key: key.to_string(),
            source_name: source_name.to_string(),
            available: file.prompts.keys().cloned().collect(),
        })?;

        if entry.content.trim().is_empty() {
            return Err(PromptError::EmptyContent {
                key: key.to_string(),
                source_name: source_name.to_string(),
            });
        }

        Ok(Self::new(key, entry.content.clone()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn has_placeholder(&self) -> bool {
        self.content.contains(DOCUMENT_PLACEHOLDER)
    }

    /// Build the chat messages for one document.
    pub fn messages(&self, document: &str) -> Vec<Message> {
        let document = if document.trim().is_empty() {
            EMPTY_DOCUMENT_TEXT
        } else {
            document
        };

        if self.has_placeholder() {
            // Only the first occurrence is substituted so text inside the
            // document can never be re-expanded.
            vec![Message::user(
                self.content.replacen(DOCUMENT_PLACEHOLDER, document, 1),
            )]
        } else {
            vec![Message::system(self.content.clone()), Message::user(document)]
        }
    }
}
