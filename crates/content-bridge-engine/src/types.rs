//! Shared contracts exchanged between adapters, the selection manager and the
//! AI subsystem.
//!
//! All offsets are character offsets (Unicode scalar values) into the plain-text
//! projection of the adapter that produced them. They are never interchangeable
//! across adapters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form block attributes (heading level, link href, image src, ...).
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Text surrounding a selection, bounded by a radius.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionContext {
    pub before: String,
    pub after: String,
}

/// Plain-text projection of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextSelection {
    pub text: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SelectionContext>,
}

impl TextSelection {
    /// A collapsed selection (caret) at `at`.
    pub fn caret(at: usize) -> Self {
        Self {
            text: String::new(),
            start: at,
            end: at,
            context: None,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Equality on the range and text only, ignoring the context window.
    pub fn same_range(&self, other: &TextSelection) -> bool {
        self.start == other.start && self.end == other.end && self.text == other.text
    }
}

/// A single replacement produced by the AI subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
    pub start: usize,
    pub end: usize,
    pub new_text: String,
    /// Informational only; never consulted when applying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub preserve_formatting: bool,
}

impl TextChange {
    pub fn new(start: usize, end: usize, new_text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            new_text: new_text.into(),
            reasoning: None,
            preserve_formatting: false,
        }
    }

    /// Pure insertion at `at`.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at, at, text)
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Length delta this change introduces, in characters.
    pub fn delta(&self) -> isize {
        self.new_text.chars().count() as isize - (self.end as isize - self.start as isize)
    }
}

/// Kind of a [`ContentBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Paragraph,
    Heading,
    List,
    Code,
    Quote,
    Link,
    Image,
}

impl BlockType {
    pub const ALL: [BlockType; 7] = [
        BlockType::Paragraph,
        BlockType::Heading,
        BlockType::List,
        BlockType::Code,
        BlockType::Quote,
        BlockType::Link,
        BlockType::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::List => "list",
            BlockType::Code => "code",
            BlockType::Quote => "quote",
            BlockType::Link => "link",
            BlockType::Image => "image",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the universal block tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ContentBlock>>,
}

impl ContentBlock {
    /// Create a block with a freshly generated id.
    pub fn new(block_type: BlockType, content: impl Into<String>) -> Self {
        Self::with_id(generate_block_id(), block_type, content)
    }

    pub fn with_id(id: impl Into<String>, block_type: BlockType, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            block_type,
            content: content.into(),
            attributes: None,
            children: None,
        }
    }

    pub fn paragraph(content: impl Into<String>) -> Self {
        Self::new(BlockType::Paragraph, content)
    }

    pub fn heading(level: u8, content: impl Into<String>) -> Self {
        Self::new(BlockType::Heading, content).with_attribute("level", level)
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes
            .get_or_insert_with(Attributes::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ContentBlock>) -> Self {
        self.children = Some(children);
        self
    }

    /// Look up a string attribute.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.as_ref()?.get(key)?.as_str()
    }

    /// Look up a numeric attribute.
    pub fn attribute_u64(&self, key: &str) -> Option<u64> {
        self.attributes.as_ref()?.get(key)?.as_u64()
    }

    pub fn children(&self) -> &[ContentBlock] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Heading level clamped to 1..=6, defaulting to 1.
    pub fn heading_level(&self) -> u8 {
        self.attribute_u64("level").unwrap_or(1).clamp(1, 6) as u8
    }

    /// A `list` block that is an item: it has a `listStyle` or text of its
    /// own. A textless `list` block without a style is a container whose
    /// children are the items.
    pub fn is_list_item(&self) -> bool {
        self.block_type == BlockType::List
            && (self.attribute_str("listStyle").is_some() || !self.content.is_empty())
    }

    /// Numbered via `listStyle`, or marked `ordered` (the container form).
    pub fn is_ordered_list(&self) -> bool {
        self.attribute_str("listStyle") == Some("numbered")
            || self
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get("ordered"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
    }

    /// The children of a list container as styled items. Children without a
    /// `listStyle` take the container's ordering.
    pub fn list_items(&self) -> Vec<ContentBlock> {
        let style = if self.is_ordered_list() { "numbered" } else { "bullet" };
        self.children()
            .iter()
            .map(|child| {
                let mut item = child.clone();
                item.block_type = BlockType::List;
                if item.attribute_str("listStyle").is_none() {
                    item = item.with_attribute("listStyle", style);
                }
                item
            })
            .collect()
    }
}

/// Generate a document-unique block id.
pub fn generate_block_id() -> String {
    format!("block-{}", uuid::Uuid::new_v4().simple())
}

/// Universal block-tree document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredContent {
    #[serde(rename = "type")]
    pub doc_type: DocType,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// The only document type tag, serialized as `"doc"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    #[default]
    Doc,
}

impl StructuredContent {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            doc_type: DocType::Doc,
            content,
            version: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Depth-first iterator over every block in the tree.
    pub fn walk(&self) -> impl Iterator<Item = &ContentBlock> {
        let mut stack: Vec<&ContentBlock> = self.content.iter().rev().collect();
        std::iter::from_fn(move || {
            let block = stack.pop()?;
            stack.extend(block.children().iter().rev());
            Some(block)
        })
    }
}

impl Default for StructuredContent {
    fn default() -> Self {
        Self::empty()
    }
}

/// Backend variant an adapter is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorType {
    Textarea,
    Tiptap,
    Novel,
}

impl EditorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditorType::Textarea => "textarea",
            EditorType::Tiptap => "tiptap",
            EditorType::Novel => "novel",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "textarea" | "plain" => Some(EditorType::Textarea),
            "tiptap" | "prosemirror" => Some(EditorType::Tiptap),
            "novel" | "blocknote" => Some(EditorType::Novel),
            _ => None,
        }
    }
}

impl std::fmt::Display for EditorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content formats an adapter can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Text,
    Html,
    Markdown,
    Json,
}

/// Static feature flags declared per adapter type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorCapabilities {
    pub supports_rich_text: bool,
    pub supports_structured_content: bool,
    pub supports_undo: bool,
    pub supports_selection: bool,
    pub supports_formatting: bool,
    pub supported_formats: &'static [ContentFormat],
}

/// Derived snapshot of an adapter, recomputed on every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    pub content: String,
    pub selection: Option<TextSelection>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub is_dirty: bool,
}

/// Input accepted by content setters and the parser.
#[derive(Debug, Clone, Copy)]
pub enum ContentInput<'a> {
    Text(&'a str),
    Structured(&'a StructuredContent),
}

impl<'a> From<&'a str> for ContentInput<'a> {
    fn from(text: &'a str) -> Self {
        ContentInput::Text(text)
    }
}

impl<'a> From<&'a String> for ContentInput<'a> {
    fn from(text: &'a String) -> Self {
        ContentInput::Text(text.as_str())
    }
}

impl<'a> From<&'a StructuredContent> for ContentInput<'a> {
    fn from(content: &'a StructuredContent) -> Self {
        ContentInput::Structured(content)
    }
}

/// Heuristic metadata attached to parse results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    pub word_count: usize,
    pub char_count: usize,
    pub estimated_tokens: usize,
    pub has_links: bool,
    pub has_images: bool,
    pub has_formatting: bool,
    pub block_types: Vec<BlockType>,
}

/// Result of [`crate::parser::parse_content`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentParseResult {
    pub plain_text: String,
    pub structured_content: Option<StructuredContent>,
    pub metadata: ContentMetadata,
}

/// Aggregate counts over an adapter's plain text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ContentStats {
    pub characters: usize,
    pub words: usize,
    pub tokens: usize,
    pub lines: usize,
    pub paragraphs: usize,
}

/// A hyperlink found in text or in the block tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub href: String,
    pub text: String,
}

/// An image found in text or in the block tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_change_deserializes_from_camel_case() {
        let json = r#"{"start":1,"end":4,"newText":"abc","reasoning":"tighten"}"#;
        let change: TextChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.new_text, "abc");
        assert_eq!(change.reasoning.as_deref(), Some("tighten"));
        assert!(!change.preserve_formatting);
    }

    #[test]
    fn structured_content_uses_doc_tag() {
        let doc = StructuredContent::new(vec![ContentBlock::with_id(
            "a",
            BlockType::Paragraph,
            "Hi",
        )]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "doc");
        assert_eq!(json["content"][0]["type"], "paragraph");
    }

    #[test]
    fn walk_is_depth_first() {
        let doc = StructuredContent::new(vec![
            ContentBlock::with_id("a", BlockType::List, "").with_children(vec![
                ContentBlock::with_id("a1", BlockType::Paragraph, "one"),
                ContentBlock::with_id("a2", BlockType::Paragraph, "two"),
            ]),
            ContentBlock::with_id("b", BlockType::Paragraph, "tail"),
        ]);
        let ids: Vec<_> = doc.walk().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a1", "a2", "b"]);
    }

    #[test]
    fn heading_level_is_clamped() {
        let block = ContentBlock::heading(9, "Title");
        assert_eq!(block.heading_level(), 6);
    }
}
