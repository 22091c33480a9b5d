//! # Content format conversion
//!
//! Stateless conversions between plain text, HTML, Markdown, JSON and the
//! universal block tree, plus the metadata heuristics attached to parse
//! results.
//!
//! - **Plain text**: blank-line-separated paragraphs
//! - **HTML**: a regex extractor for `<p>`, `<h1>`-`<h6>` and `<li>` (not a
//!   conformant HTML parser) and an escaping renderer
//! - **Markdown**: read through pulldown-cmark's event stream, written by hand
//! - **JSON**: serde, gated by [`validate_structured_content`]

mod html;
mod markdown;
mod metadata;

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

pub use html::{html_to_structured, structured_to_html};
pub use markdown::{markdown_to_structured, structured_to_markdown};
pub use metadata::{
    analyze_structured, analyze_text, extract_images, extract_links, strip_html_tags,
};

use crate::adapters::base;
use crate::types::{
    BlockType, ContentBlock, ContentInput, ContentParseResult, StructuredContent,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Invalid structured content: {0}")]
    InvalidStructure(String),
}

/// Plain text and metadata for either kind of input. Text input also gets a
/// paragraph-per-blank-line structured form.
pub fn parse_content(input: ContentInput<'_>) -> ContentParseResult {
    match input {
        ContentInput::Text(text) => ContentParseResult {
            plain_text: text.to_string(),
            structured_content: Some(text_to_structured(text)),
            metadata: analyze_text(text),
        },
        ContentInput::Structured(content) => ContentParseResult {
            plain_text: base::extract_plain_text(content),
            structured_content: Some(content.clone()),
            metadata: analyze_structured(content),
        },
    }
}

fn blank_line_regex() -> &'static Regex {
    static BLANK_LINE: OnceLock<Regex> = OnceLock::new();
    BLANK_LINE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("Invalid blank line regex"))
}

/// One paragraph block per blank-line-delimited chunk of `text`.
pub fn text_to_structured(text: &str) -> StructuredContent {
    let normalized = text.replace("\r\n", "\n");
    StructuredContent::new(
        blank_line_regex()
            .split(&normalized)
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(ContentBlock::paragraph)
            .collect(),
    )
}

/// Text blocks separated by blank lines; the inverse of [`text_to_structured`].
pub fn structured_to_text(content: &StructuredContent) -> String {
    base::text_blocks(content)
        .iter()
        .map(|block| block.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Whether `value` has the shape of a structured document: a `doc` object
/// whose blocks each carry a string id, a known type and string content,
/// with valid children if any. Never fails; malformed input is `false`.
pub fn validate_structured_content(value: &Value) -> bool {
    let Some(doc) = value.as_object() else {
        return false;
    };
    if doc.get("type").and_then(Value::as_str) != Some("doc") {
        return false;
    }
    match doc.get("content").and_then(Value::as_array) {
        Some(blocks) => blocks.iter().all(validate_block),
        None => false,
    }
}

fn validate_block(value: &Value) -> bool {
    let Some(block) = value.as_object() else {
        return false;
    };
    let id_ok = block.get("id").and_then(Value::as_str).is_some();
    let type_ok = block
        .get("type")
        .and_then(Value::as_str)
        .and_then(BlockType::parse)
        .is_some();
    let content_ok = block.get("content").is_some_and(Value::is_string);
    let attributes_ok = block
        .get("attributes")
        .is_none_or(|attrs| attrs.is_object() || attrs.is_null());
    let children_ok = match block.get("children") {
        None | Some(Value::Null) => true,
        Some(Value::Array(children)) => children.iter().all(validate_block),
        Some(_) => false,
    };
    id_ok && type_ok && content_ok && attributes_ok && children_ok
}

/// Parse and validate a JSON document.
pub fn from_json(json: &str) -> Result<StructuredContent, ConversionError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ConversionError::InvalidJson(e.to_string()))?;
    if !validate_structured_content(&value) {
        return Err(ConversionError::InvalidStructure(
            "expected {\"type\": \"doc\", \"content\": [blocks]} with id, type and content on every block"
                .to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| ConversionError::InvalidStructure(e.to_string()))
}

pub fn to_json(content: &StructuredContent) -> Result<String, ConversionError> {
    serde_json::to_string_pretty(content).map_err(|e| ConversionError::InvalidJson(e.to_string()))
}
