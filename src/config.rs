//! Service configuration.
//!
//! Built once at process start from the environment (plus `.env`, loaded by
//! `main`) and shared read-only through `AppState`. Handlers never read the
//! environment themselves.

use crate::prompt::{PromptError, PromptTemplate};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;
pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to load system prompt: {0}")]
    Prompt(#[from] PromptError),
}

/// A credential that must never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Level named by `LOG_LEVEL`, read ahead of the full configuration so
    /// tracing is up before any config warning is logged. Unknown values
    /// fall back to `Info`; [`Config::from_lookup`] reports them.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        get("LOG_LEVEL")
            .and_then(|v| Self::parse(&v))
            .unwrap_or(Self::Info)
    }

    /// Filter for the server's own crates.
    pub fn directives(self) -> String {
        let level = self.as_filter();
        format!("insight_guide={level},tower_http={level}")
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

/// Credentials guarding the whole service behind a basic-auth challenge.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mistral_api_key: Secret,
    pub mistral_api_base: String,
    pub openai_api_key: Secret,
    pub openai_api_host: String,
    pub model: String,
    pub frontend_url: String,
    pub system_prompt_file: PathBuf,
    pub system_prompt_key: String,
    pub prompt: PromptTemplate,
    pub max_file_size: usize,
    pub save_extracted_content: bool,
    pub output_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_level: LogLevel,
    pub basic_auth: Option<BasicAuth>,
    pub static_dir: Option<PathBuf>,
    pub ocr_timeout: Duration,
    pub completion_timeout: Duration,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let mistral_api_key = Secret::new(required("MISTRAL_API_KEY")?);
        let openai_api_key = Secret::new(required("OPENAI_API_KEY")?);
        let model = required("MODEL")?;

        let mistral_api_base = get("MISTRAL_API_BASE")
            .unwrap_or_else(|| "https://api.mistral.ai".to_string());
        let mistral_api_base = require_http("MISTRAL_API_BASE", mistral_api_base)?;

        let openai_api_host = get("OPENAI_API_HOST")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let openai_api_host = require_http("OPENAI_API_HOST", openai_api_host)?;

        let frontend_url =
            get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:9002".to_string());
        let frontend_url = require_http("FRONTEND_URL", frontend_url)?;

        let system_prompt_file = PathBuf::from(
            get("SYSTEM_PROMPT_FILE").unwrap_or_else(|| "system_prompts.yaml".to_string()),
        );
        let system_prompt_key =
            get("SYSTEM_PROMPT_KEY").unwrap_or_else(|| "paper-assistant-prompt".to_string());

        let max_file_size = parse_int(
            "MAX_FILE_SIZE",
            get("MAX_FILE_SIZE").as_deref(),
            DEFAULT_MAX_FILE_SIZE as u64,
        );
        if max_file_size == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_FILE_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }
        let max_file_size = usize::try_from(max_file_size).map_err(|_| ConfigError::Invalid {
            key: "MAX_FILE_SIZE",
            reason: "does not fit in memory on this platform".to_string(),
        })?;

        let port = parse_int("PORT", get("PORT").as_deref(), 8000);
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ConfigError::Invalid {
                key: "PORT",
                reason: format!("{} is outside 1..=65535", port),
            })?;

        let log_level = match get("LOG_LEVEL") {
            None => LogLevel::Info,
            Some(v) => LogLevel::parse(&v).ok_or_else(|| ConfigError::Invalid {
                key: "LOG_LEVEL",
                reason: format!(
                    "'{}' is not one of DEBUG, INFO, WARNING, ERROR, CRITICAL",
                    v
                ),
            })?,
        };

        let basic_auth = match (get("BASIC_AUTH_USER"), get("BASIC_AUTH_PASSWORD")) {
            (Some(username), Some(password)) => Some(BasicAuth {
                username,
                password: Secret::new(password),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "BASIC_AUTH_USER",
                    reason: "BASIC_AUTH_USER and BASIC_AUTH_PASSWORD must be set together"
                        .to_string(),
                })
            }
        };

        let ocr_timeout = parse_timeout("OCR_TIMEOUT", get("OCR_TIMEOUT"), DEFAULT_OCR_TIMEOUT)?;
        let completion_timeout = parse_timeout(
            "COMPLETION_TIMEOUT",
            get("COMPLETION_TIMEOUT"),
            DEFAULT_COMPLETION_TIMEOUT,
        )?;

        let prompt = PromptTemplate::load(&system_prompt_file, &system_prompt_key)?;

        Ok(Self {
            mistral_api_key,
            mistral_api_base,
            openai_api_key,
            openai_api_host,
            model,
            frontend_url,
            system_prompt_file,
            system_prompt_key,
            prompt,
            max_file_size,
            save_extracted_content: get("SAVE_EXTRACTED_CONTENT")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false),
            output_dir: PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| "outputs".to_string())),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_level,
            basic_auth,
            static_dir: get("STATIC_DIR").map(PathBuf::from),
            ocr_timeout,
            completion_timeout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn require_http(key: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("'{}' must start with http:// or https://", value),
        })
    }
}

/// Integer values may carry a trailing `# comment` (common in `.env` files).
/// Unparseable values fall back to the default with a warning.
fn parse_int(key: &str, value: Option<&str>, default: u64) -> u64 {
    let Some(raw) = value else {
        return default;
    };
    let clean = raw.split('#').next().unwrap_or("").trim();
    if clean.is_empty() {
        return default;
    }
    match clean.parse::<u64>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Invalid integer value '{}' for {}, using default {}", raw, key, default);
            default
        }
    }
}

/// Bare numbers are seconds; anything else goes through humantime ("90s", "3m").
fn parse_timeout(
    key: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let raw = raw.trim();
    let parsed = match raw.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(raw).map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?,
    };
    if parsed.is_zero() {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}
