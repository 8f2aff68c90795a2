//! Text extraction from uploaded files.
//!
//! Extraction is a boundary: richer formats (PDF, Word) plug in by
//! implementing [`TextExtractor`]. The built-in extractor handles plain
//! text, markdown and HTML.

use crate::types::UploadedFile;
use kbase_core::{AppError, AppResult};
use std::path::Path;

/// Turns an uploaded file into raw text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, file: &UploadedFile) -> AppResult<String>;
}

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Unsupported,
}

impl ContentType {
    /// Detect content type from the MIME type, then the file extension.
    pub fn detect(file_name: &str, mime_type: Option<&str>) -> Self {
        match mime_type.map(|m| m.split(';').next().unwrap_or(m).trim().to_lowercase()) {
            Some(m) if m == "text/markdown" || m == "text/x-markdown" => return Self::Markdown,
            Some(m) if m == "text/html" => return Self::Html,
            Some(m) if m == "text/plain" => return Self::PlainText,
            _ => {}
        }

        match Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") | Some("csv") | Some("log") => Self::PlainText,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Extractor for plain text, markdown and HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTextExtractor;

impl TextExtractor for BasicTextExtractor {
    fn extract(&self, file: &UploadedFile) -> AppResult<String> {
        let content_type = ContentType::detect(&file.file_name, file.mime_type.as_deref());
        if content_type == ContentType::Unsupported {
            return Err(AppError::Processing(format!(
                "Unsupported file type: {}",
                file.file_name
            )));
        }

        let raw = std::str::from_utf8(&file.bytes).map_err(|_| {
            AppError::Processing(format!("{} is not valid UTF-8 text", file.file_name))
        })?;

        if raw.contains('\0') {
            return Err(AppError::Processing(format!(
                "{} looks like a binary file",
                file.file_name
            )));
        }

        let text = match content_type {
            ContentType::Markdown => clean_markdown(raw),
            ContentType::Html => clean_html(raw),
            _ => raw.trim().to_string(),
        };

        tracing::debug!(
            "Extracted {} chars from {} ({})",
            text.chars().count(),
            file.file_name,
            content_type.as_str()
        );

        Ok(text)
    }
}

/// Strip markdown formatting, keeping the prose.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        let cleaned = trimmed.replace("**", "").replace("__", "").replace('`', "");
        let cleaned = cleaned.trim_start_matches("- ").trim_start_matches("* ");

        if !cleaned.is_empty() {
            result.push_str(cleaned);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Strip HTML tags, scripts and styles, collapsing whitespace.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;

            let rest: String = text[i..].chars().take(9).collect::<String>().to_lowercase();
            if rest.starts_with("<script") {
                in_script = true;
            } else if rest.starts_with("</script") {
                in_script = false;
            } else if rest.starts_with("<style") {
                in_style = true;
            } else if rest.starts_with("</style") {
                in_style = false;
            }
        } else if ch == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
