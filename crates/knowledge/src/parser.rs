//! Source file parsing and text extraction.

use docqa_core::{AppError, AppResult};
use serde_json::json;
use std::path::Path;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Text,
    Markdown,
    Html,
}

impl FileType {
    /// Parse a file type name or extension (`"txt"`, `"md"`, `"html"`, ...).
    pub fn parse(name: &str) -> AppResult<Self> {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            "html" | "htm" => Ok(Self::Html),
            "pdf" | "docx" => Err(AppError::InvalidInput(format!(
                "Unsupported file type '{}': only txt, md and html can be extracted",
                name
            ))),
            other => Err(AppError::InvalidInput(format!("Unknown file type '{}'", other))),
        }
    }

    /// Detect file type from file extension.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| AppError::InvalidInput(format!("{:?} has no file extension", path)))?;
        Self::parse(extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
            Self::Html => "html",
        }
    }
}

/// Extracted text plus format-specific metadata.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub metadata: serde_json::Value,
}

/// Extract plain text from raw file bytes.
///
/// `metadata` always carries `fileName`; HTML adds `htmlTitle` and `headings`.
pub fn extract_text(bytes: &[u8], file_type: FileType, file_name: &str) -> AppResult<ExtractedText> {
    let raw = std::str::from_utf8(bytes).map_err(|e| {
        AppError::InvalidInput(format!("{} is not valid UTF-8 text: {}", file_name, e))
    })?;

    if raw.contains('\0') {
        tracing::warn!("Skipping likely binary file: {}", file_name);
        return Err(AppError::InvalidInput(format!(
            "{} looks like a binary file",
            file_name
        )));
    }

    let extracted = match file_type {
        FileType::Text => ExtractedText {
            text: raw.to_string(),
            metadata: json!({ "fileName": file_name }),
        },
        FileType::Markdown => ExtractedText {
            text: clean_markdown(raw),
            metadata: json!({ "fileName": file_name }),
        },
        FileType::Html => {
            let title = html_element_text(raw, "title").into_iter().next().unwrap_or_default();
            let headings: Vec<String> = ["h1", "h2", "h3"]
                .iter()
                .flat_map(|tag| html_element_text(raw, tag))
                .collect();
            ExtractedText {
                text: clean_html(raw),
                metadata: json!({
                    "fileName": file_name,
                    "htmlTitle": title,
                    "headings": headings,
                }),
            }
        }
    };

    tracing::debug!(
        "Extracted {} chars from {} ({})",
        extracted.text.chars().count(),
        file_name,
        file_type.as_str()
    );
    Ok(extracted)
}

/// Clean markdown by removing excess formatting.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        // Horizontal rules and code fences carry no content
        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Strip tags, dropping `<head>`, `<script>` and `<style>` content.
fn clean_html(html: &str) -> String {
    // ASCII lowering keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;

    for (i, ch) in html.char_indices() {
        if let Some(closing) = skip_until {
            if lower[i..].starts_with(closing) {
                skip_until = None;
                in_tag = true;
            }
            continue;
        }

        if ch == '<' {
            in_tag = true;
            let rest = &lower[i..];
            skip_until = if rest.starts_with("<script") {
                Some("</script")
            } else if rest.starts_with("<style") {
                Some("</style")
            } else if rest.starts_with("<head") && !rest.starts_with("<header") {
                Some("</head>")
            } else {
                None
            };
        } else if ch == '>' {
            if in_tag {
                result.push(' ');
            }
            in_tag = false;
        } else if !in_tag {
            result.push(ch);
        }
    }

    decode_entities(&result)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text content of every `<tag ...>...</tag>` element.
fn html_element_text(html: &str, tag: &str) -> Vec<String> {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = lower[cursor..].find(&open) {
        let start = cursor + offset;
        let after_name = start + open.len();

        // `<h1` must not match `<h10` or `<header`
        let boundary = lower[after_name..].chars().next();
        if !matches!(boundary, Some('>') | Some(' ') | Some('\t') | Some('\n') | Some('/')) {
            cursor = after_name;
            continue;
        }

        let Some(content_start) = lower[after_name..].find('>').map(|p| after_name + p + 1) else {
            break;
        };
        let Some(content_end) = lower[content_start..].find(&close).map(|p| content_start + p) else {
            break;
        };

        let text = clean_html(&html[content_start..content_end]);
        if !text.is_empty() {
            found.push(text);
        }
        cursor = content_end + close.len();
    }

    found
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
