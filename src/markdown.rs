//! Markdown and filename helpers.

use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::debug;

fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"))
}

fn domain_regex() -> &'static Regex {
    static DOMAIN: OnceLock<Regex> = OnceLock::new();
    DOMAIN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9.-]*\.[a-zA-Z]{2,}").expect("valid domain regex")
    })
}

/// Give bare-domain link targets an `https://` scheme.
///
/// `[site](example.org/page)` would otherwise resolve relative to the page
/// displaying the report.
pub fn fix_markdown_urls(markdown: &str) -> String {
    link_regex()
        .replace_all(markdown, |caps: &Captures| {
            let text = &caps[1];
            let url = &caps[2];

            let has_scheme = ["http://", "https://", "ftp://", "mailto:", "#", "/"]
                .iter()
                .any(|p| url.starts_with(p));
            if has_scheme || !domain_regex().is_match(url) {
                return caps[0].to_string();
            }

            debug!("Fixed URL: {} -> https://{}", url, url);
            format!("[{}](https://{})", text, url)
        })
        .into_owned()
}

/// Inline OCR image references (`![id](id)`) as data URIs.
pub fn replace_images_in_markdown(markdown: &str, images: &[(String, String)]) -> String {
    let mut out = markdown.to_string();
    for (id, base64) in images {
        if id.is_empty() || base64.is_empty() {
            continue;
        }
        let data_uri = if base64.starts_with("data:") {
            base64.clone()
        } else {
            format!("data:image/png;base64,{}", base64)
        };
        out = out.replace(&format!("![{id}]({id})"), &format!("![{id}]({data_uri})"));
    }
    out
}

/// Make `name` safe to use as a file name on every platform.
pub fn safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    let trimmed: String = cleaned
        .trim_matches(|c| c == '.' || c == ' ')
        .chars()
        .take(255)
        .collect();
    if trimmed.is_empty() {
        "unnamed_file".to_string()
    } else {
        trimmed
    }
}

/// File name without a trailing `.pdf` (any case).
pub fn pdf_stem(filename: &str) -> &str {
    let len = filename.len();
    if len >= 4 && filename.is_char_boundary(len - 4) && filename[len - 4..].eq_ignore_ascii_case(".pdf") {
        &filename[..len - 4]
    } else {
        filename
    }
}

/// Download name for the report generated from `pdf_filename`.
pub fn report_filename(pdf_filename: &str) -> String {
    format!("{}_insights.md", safe_filename(pdf_stem(pdf_filename)))
}

pub fn format_file_size(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} TB", value)
}
