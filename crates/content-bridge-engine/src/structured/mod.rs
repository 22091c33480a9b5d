//! # Structured content handler
//!
//! A stateful, editable copy of one [`StructuredContent`] document. Blocks
//! live in a flat arena keyed by [`NodeKey`]; children are key lists and an id
//! index resolves block ids, so edits never clone the whole tree.
//!
//! Plain-text offsets follow [`crate::adapters::base::extract_plain_text`]:
//! one line per text block, depth first, joined by `\n`.

mod arena;

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

pub use arena::NodeKey;

use crate::adapters::base::{self, char_len};
use crate::parser;
use crate::types::{
    Attributes, BlockType, ContentBlock, ImageRef, LinkRef, StructuredContent, TextChange,
    generate_block_id,
};
use arena::{BlockArena, Node};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuredError {
    #[error("Block not found: {0}")]
    UnknownBlock(String),
    #[error("Change range {start}..{end} is outside content bounds (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("Cannot move block {0} into its own subtree")]
    CyclicMove(String),
}

/// Fields to overwrite on an existing block. The id is never touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockPatch {
    pub block_type: Option<BlockType>,
    pub content: Option<String>,
    /// Replaces the attribute map wholesale.
    pub attributes: Option<Attributes>,
}

impl BlockPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStatistics {
    /// Every block in the tree, nested ones included.
    pub block_count: usize,
    pub block_types: BTreeMap<BlockType, usize>,
    pub word_count: usize,
    pub character_count: usize,
    pub link_count: usize,
    pub image_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Character span of one text block in the plain-text projection.
#[derive(Debug, Clone, Copy)]
struct Span {
    key: NodeKey,
    start: usize,
    len: usize,
}

fn spans_len(spans: &[Span]) -> usize {
    spans.last().map(|s| s.start + s.len).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct StructuredContentHandler {
    arena: BlockArena,
    version: Option<String>,
}

impl StructuredContentHandler {
    /// Takes a private copy of `content`.
    pub fn new(content: &StructuredContent) -> Self {
        Self {
            arena: BlockArena::from_blocks(&content.content),
            version: content.version.clone(),
        }
    }

    fn contributes_text(node: &Node) -> bool {
        node.block_type != BlockType::Image
            && (!node.content.is_empty() || node.children.as_ref().is_none_or(Vec::is_empty))
    }

    fn spans(&self) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut offset = 0;
        for key in self.arena.preorder() {
            let Some(node) = self.arena.get(key) else {
                continue;
            };
            if !Self::contributes_text(node) {
                continue;
            }
            let len = char_len(&node.content);
            spans.push(Span {
                key,
                start: offset,
                len,
            });
            offset += len + 1;
        }
        spans
    }

    /// Apply plain-text changes, highest `start` first.
    ///
    /// Each change is spliced into every text block its range touches, one
    /// block at a time. A change spanning several blocks removes the covered
    /// text from each of them and puts its replacement text into the first;
    /// the blocks themselves are never merged and separators are untouched.
    ///
    /// Every change is checked against the starting text before any block is
    /// touched, so a rejected batch leaves the tree as it was. Returns the
    /// number of block edits made.
    pub fn apply_text_changes(&mut self, changes: &[TextChange]) -> Result<usize, StructuredError> {
        let initial_len = spans_len(&self.spans());
        if let Some(bad) = changes
            .iter()
            .find(|change| change.start > change.end || change.end > initial_len)
        {
            return Err(StructuredError::OutOfBounds {
                start: bad.start,
                end: bad.end,
                len: initial_len,
            });
        }

        let mut edits = 0;
        for change in base::sort_changes_descending(changes) {
            let spans = self.spans();
            // Overlapping changes can reach past text an earlier one removed.
            let len = spans_len(&spans);
            let end = change.end.min(len);
            let start = change.start.min(end);

            let touched: Vec<Span> = spans
                .into_iter()
                .filter(|span| start.max(span.start) <= end.min(span.start + span.len))
                .collect();
            if touched.len() > 1 {
                log::debug!(
                    "change {}..{} spans {} blocks, applying per block",
                    change.start,
                    change.end,
                    touched.len()
                );
            }

            for (position, span) in touched.iter().enumerate() {
                let local_start = start.max(span.start) - span.start;
                let local_end = end.min(span.start + span.len) - span.start;
                let insert = if position == 0 { change.new_text.as_str() } else { "" };
                if let Some(node) = self.arena.get_mut(span.key) {
                    node.content = base::splice_chars(&node.content, local_start, local_end, insert);
                    edits += 1;
                }
            }
        }
        Ok(edits)
    }

    /// Insert `block` (with its subtree) under `parent_id`, or at the top
    /// level, at `index` (appending when `None` or past the end). A block
    /// without an id gets one. Returns the id.
    pub fn insert_block(
        &mut self,
        mut block: ContentBlock,
        parent_id: Option<&str>,
        index: Option<usize>,
    ) -> Result<String, StructuredError> {
        let parent = parent_id.map(|id| self.require(id)).transpose()?;
        if block.id.is_empty() {
            block.id = generate_block_id();
        }
        let key = self.arena.alloc_tree(&block, parent);
        self.arena.link(key, parent, index);
        log::debug!("inserted block {}", block.id);
        Ok(block.id)
    }

    /// Overwrite fields of the block `id`. Its id and children stay.
    pub fn update_block(&mut self, id: &str, patch: BlockPatch) -> Result<(), StructuredError> {
        let key = self.require(id)?;
        let node = self
            .arena
            .get_mut(key)
            .ok_or_else(|| StructuredError::UnknownBlock(id.to_string()))?;
        if let Some(block_type) = patch.block_type {
            node.block_type = block_type;
        }
        if let Some(content) = patch.content {
            node.content = content;
        }
        if let Some(attributes) = patch.attributes {
            node.attributes = Some(attributes);
        }
        Ok(())
    }

    /// Remove the block `id` and its subtree, returning them.
    pub fn delete_block(&mut self, id: &str) -> Result<ContentBlock, StructuredError> {
        let key = self.require(id)?;
        let removed = self
            .arena
            .materialize(key)
            .ok_or_else(|| StructuredError::UnknownBlock(id.to_string()))?;
        self.arena.unlink(key);
        self.arena.free_tree(key);
        self.arena.settle_index();
        Ok(removed)
    }

    /// Move the block `id` under `new_parent_id` (top level when `None`) at
    /// `index`.
    pub fn move_block(
        &mut self,
        id: &str,
        new_parent_id: Option<&str>,
        index: Option<usize>,
    ) -> Result<(), StructuredError> {
        let key = self.require(id)?;
        let parent = new_parent_id.map(|id| self.require(id)).transpose()?;
        if let Some(parent) = parent
            && self.arena.is_within(parent, key)
        {
            return Err(StructuredError::CyclicMove(id.to_string()));
        }
        self.arena.unlink(key);
        self.arena.link(key, parent, index);
        Ok(())
    }

    pub fn get_block(&self, id: &str) -> Option<ContentBlock> {
        self.arena.materialize(self.arena.key_of(id)?)
    }

    fn require(&self, id: &str) -> Result<NodeKey, StructuredError> {
        self.arena
            .key_of(id)
            .ok_or_else(|| StructuredError::UnknownBlock(id.to_string()))
    }

    fn find(&self, predicate: impl Fn(&Node) -> bool) -> Vec<ContentBlock> {
        self.arena
            .preorder()
            .into_iter()
            .filter(|key| self.arena.get(*key).is_some_and(&predicate))
            .filter_map(|key| self.arena.materialize(key))
            .collect()
    }

    pub fn find_blocks_by_type(&self, block_type: BlockType) -> Vec<ContentBlock> {
        self.find(|node| node.block_type == block_type)
    }

    /// Blocks whose own content contains `query`, ignoring case.
    pub fn find_blocks_by_text(&self, query: &str) -> Vec<ContentBlock> {
        let query = query.to_lowercase();
        self.find(|node| node.content.to_lowercase().contains(&query))
    }

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.arena
            .preorder()
            .into_iter()
            .filter_map(|key| self.arena.get(key))
    }

    /// Link blocks, `href` attributes and links written inline in block text.
    pub fn extract_links(&self) -> Vec<LinkRef> {
        let mut links = Vec::new();
        for node in self.nodes() {
            let href = node
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get("href"))
                .and_then(serde_json::Value::as_str);
            if let Some(href) = href {
                links.push(LinkRef {
                    href: href.to_string(),
                    text: node.content.clone(),
                });
            }
            links.extend(parser::extract_links(&node.content));
        }
        links
    }

    /// Image blocks and images written inline in block text.
    pub fn extract_images(&self) -> Vec<ImageRef> {
        let mut images = Vec::new();
        for node in self.nodes() {
            let attr = |name: &str| {
                node.attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get(name))
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            };
            if node.block_type == BlockType::Image
                && let Some(src) = attr("src")
            {
                images.push(ImageRef {
                    src,
                    alt: attr("alt").unwrap_or_default(),
                });
            }
            images.extend(parser::extract_images(&node.content));
        }
        images
    }

    /// The current document as an owned tree.
    pub fn to_structured(&self) -> StructuredContent {
        let mut content = StructuredContent::new(
            self.arena
                .roots
                .iter()
                .filter_map(|key| self.arena.materialize(*key))
                .collect(),
        );
        content.version = self.version.clone();
        content
    }

    pub fn to_html(&self) -> String {
        parser::structured_to_html(&self.to_structured())
    }

    pub fn to_markdown(&self) -> String {
        parser::structured_to_markdown(&self.to_structured())
    }

    pub fn to_plain_text(&self) -> String {
        self.spans()
            .iter()
            .filter_map(|span| self.arena.get(span.key))
            .map(|node| node.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn get_statistics(&self) -> ContentStatistics {
        let mut block_types = BTreeMap::new();
        for node in self.nodes() {
            *block_types.entry(node.block_type).or_insert(0) += 1;
        }
        let text = self.to_plain_text();
        ContentStatistics {
            block_count: self.arena.len(),
            block_types,
            word_count: base::count_words(&text),
            character_count: char_len(&text),
            link_count: self.extract_links().len(),
            image_count: self.extract_images().len(),
        }
    }

    /// Structural problems as errors, suspicious content as warnings.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for node in self.nodes() {
            let label = if node.id.is_empty() { "<no id>" } else { node.id.as_str() };
            if node.id.is_empty() {
                errors.push(format!("{} block has an empty id", node.block_type));
            } else if !seen.insert(node.id.as_str()) {
                warnings.push(format!("Duplicate block id {}", node.id));
            }

            let attr = |name: &str| node.attributes.as_ref().and_then(|attrs| attrs.get(name));
            match node.block_type {
                BlockType::Heading => {
                    if let Some(level) = attr("level")
                        && !level.as_u64().is_some_and(|l| (1..=6).contains(&l))
                    {
                        errors.push(format!("Heading {label} has invalid level {level}"));
                    }
                }
                BlockType::Link => {
                    if attr("href").and_then(serde_json::Value::as_str).is_none() {
                        errors.push(format!("Link {label} has no href"));
                    }
                }
                BlockType::Image => {
                    if attr("src").and_then(serde_json::Value::as_str).is_none() {
                        errors.push(format!("Image {label} has no src"));
                    }
                }
                BlockType::List => {
                    if node.content.is_empty() && node.children.as_ref().is_none_or(Vec::is_empty) {
                        warnings.push(format!("List {label} has neither content nor items"));
                    }
                }
                BlockType::Paragraph | BlockType::Quote | BlockType::Code => {
                    if node.content.trim().is_empty() && node.children.as_ref().is_none_or(Vec::is_empty) {
                        warnings.push(format!("{} {label} is empty", node.block_type));
                    }
                }
            }
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> StructuredContent {
        StructuredContent::new(vec![
            ContentBlock::with_id("h", BlockType::Heading, "Title").with_attribute("level", 1),
            ContentBlock::with_id("p", BlockType::Paragraph, "Hello world"),
            ContentBlock::with_id("l", BlockType::List, "").with_children(vec![
                ContentBlock::with_id("i1", BlockType::List, "one"),
                ContentBlock::with_id("i2", BlockType::List, "two"),
            ]),
        ])
    }

    #[test]
    fn copies_input_and_projects_it_back() {
        let source = sample();
        let mut handler = StructuredContentHandler::new(&source);
        handler
            .update_block("p", BlockPatch::content("changed"))
            .unwrap();
        assert_eq!(source.content[1].content, "Hello world");
        assert_eq!(handler.to_plain_text(), "Title\nchanged\none\ntwo");
        assert_eq!(
            handler.to_plain_text(),
            base::extract_plain_text(&handler.to_structured())
        );
    }

    #[test]
    fn text_changes_land_in_their_blocks() {
        let mut handler = StructuredContentHandler::new(&sample());
        // "Title\nHello world\none\ntwo": "world" is 12..17, "two" is 22..25.
        let edits = handler
            .apply_text_changes(&[
                TextChange::new(12, 17, "there"),
                TextChange::new(22, 25, "three"),
            ])
            .unwrap();
        assert_eq!(edits, 2);
        assert_eq!(handler.to_plain_text(), "Title\nHello there\none\nthree");
    }

    #[test]
    fn multi_block_change_is_applied_per_block() {
        let mut handler = StructuredContentHandler::new(&sample());
        // "le\nHel" crosses the heading/paragraph boundary.
        handler
            .apply_text_changes(&[TextChange::new(3, 9, "X")])
            .unwrap();
        assert_eq!(handler.get_block("h").unwrap().content, "TitX");
        assert_eq!(handler.get_block("p").unwrap().content, "lo world");
    }

    #[test]
    fn out_of_range_change_is_rejected() {
        let mut handler = StructuredContentHandler::new(&sample());
        let err = handler
            .apply_text_changes(&[TextChange::new(20, 99, "")])
            .unwrap_err();
        assert_eq!(
            err,
            StructuredError::OutOfBounds {
                start: 20,
                end: 99,
                len: 25
            }
        );
    }

    #[test]
    fn rejected_batch_leaves_text_untouched() {
        let mut handler = StructuredContentHandler::new(&StructuredContent::new(vec![
            ContentBlock::with_id("p", BlockType::Paragraph, "hello world"),
        ]));
        let err = handler
            .apply_text_changes(&[TextChange::new(6, 11, "there"), TextChange::new(0, 99, "x")])
            .unwrap_err();
        assert_eq!(
            err,
            StructuredError::OutOfBounds {
                start: 0,
                end: 99,
                len: 11
            }
        );
        assert_eq!(handler.to_plain_text(), "hello world");
    }

    #[test]
    fn overlapping_changes_stay_within_the_text() {
        let mut handler = StructuredContentHandler::new(&StructuredContent::new(vec![
            ContentBlock::with_id("p", BlockType::Paragraph, "hello world"),
        ]));
        handler
            .apply_text_changes(&[TextChange::new(4, 11, ""), TextChange::new(0, 8, "J")])
            .unwrap();
        assert_eq!(handler.to_plain_text(), "J");
    }

    #[test]
    fn block_crud_adjusts_block_count() {
        let mut handler = StructuredContentHandler::new(&sample());
        let before = handler.get_statistics().block_count;
        assert_eq!(before, 5);

        let id = handler
            .insert_block(ContentBlock::paragraph("new"), None, Some(1))
            .unwrap();
        assert_eq!(handler.get_statistics().block_count, before + 1);
        assert_eq!(handler.to_structured().content[1].id, id);

        handler
            .update_block(
                &id,
                BlockPatch {
                    block_type: Some(BlockType::Quote),
                    content: Some("quoted".to_string()),
                    attributes: None,
                },
            )
            .unwrap();
        let updated = handler.get_block(&id).unwrap();
        assert_eq!(updated.id, id);
        assert_eq!(updated.block_type, BlockType::Quote);

        let removed = handler.delete_block("l").unwrap();
        assert_eq!(removed.children().len(), 2);
        assert_eq!(handler.get_statistics().block_count, before + 1 - 3);
        assert!(handler.get_block("i1").is_none());
        assert_eq!(
            handler.delete_block("l").unwrap_err(),
            StructuredError::UnknownBlock("l".to_string())
        );
    }

    #[test]
    fn insert_under_parent_and_move() {
        let mut handler = StructuredContentHandler::new(&sample());
        handler
            .insert_block(
                ContentBlock::with_id("i3", BlockType::List, "three"),
                Some("l"),
                None,
            )
            .unwrap();
        assert_eq!(handler.get_block("l").unwrap().children().len(), 3);

        handler.move_block("i3", None, Some(0)).unwrap();
        let top: Vec<_> = handler
            .to_structured()
            .content
            .iter()
            .map(|b| b.id.clone())
            .collect();
        assert_eq!(top, vec!["i3", "h", "p", "l"]);

        assert_eq!(
            handler.move_block("l", Some("i1"), None).unwrap_err(),
            StructuredError::CyclicMove("l".to_string())
        );
    }

    #[test]
    fn earlier_duplicate_id_takes_over_lookups() {
        let mut handler = StructuredContentHandler::new(&sample());
        handler
            .insert_block(
                ContentBlock::with_id("p", BlockType::Paragraph, "copy"),
                None,
                None,
            )
            .unwrap();
        assert_eq!(handler.get_block("p").unwrap().content, "Hello world");

        handler
            .insert_block(
                ContentBlock::with_id("p", BlockType::Paragraph, "first"),
                None,
                Some(0),
            )
            .unwrap();
        assert_eq!(handler.get_block("p").unwrap().content, "first");

        handler.move_block("p", None, None).unwrap();
        assert_eq!(handler.get_block("p").unwrap().content, "Hello world");
    }

    #[test]
    fn searches_and_extraction() {
        let doc = StructuredContent::new(vec![
            ContentBlock::with_id("a", BlockType::Paragraph, "See [docs](https://docs.rs) now"),
            ContentBlock::with_id("b", BlockType::Link, "Home").with_attribute("href", "/"),
            ContentBlock::with_id("c", BlockType::Image, "")
                .with_attribute("src", "pic.png")
                .with_attribute("alt", "pic"),
        ]);
        let handler = StructuredContentHandler::new(&doc);

        assert_eq!(handler.find_blocks_by_text("DOCS").len(), 1);
        assert_eq!(handler.find_blocks_by_type(BlockType::Link)[0].id, "b");

        let hrefs: Vec<_> = handler.extract_links().into_iter().map(|l| l.href).collect();
        assert_eq!(hrefs, vec!["https://docs.rs", "/"]);
        assert_eq!(handler.extract_images()[0].src, "pic.png");

        let stats = handler.get_statistics();
        assert_eq!(stats.link_count, 2);
        assert_eq!(stats.image_count, 1);
        assert_eq!(stats.block_types.get(&BlockType::Paragraph), Some(&1));
    }

    #[test]
    fn validation_reports_instead_of_failing() {
        let doc: StructuredContent = serde_json::from_value(json!({
            "type": "doc",
            "content": [
                {"id": "a", "type": "heading", "content": "T", "attributes": {"level": 9}},
                {"id": "a", "type": "link", "content": "x"},
                {"id": "b", "type": "paragraph", "content": "  "}
            ]
        }))
        .unwrap();
        let report = StructuredContentHandler::new(&doc).validate();
        assert!(!report.is_valid);
        assert_eq!(
            report.errors,
            vec!["Heading a has invalid level 9", "Link a has no href"]
        );
        assert_eq!(report.warnings, vec!["Duplicate block id a", "paragraph b is empty"]);

        assert!(StructuredContentHandler::new(&sample()).validate().is_valid);
    }

    #[test]
    fn projections_render_current_state() {
        let mut handler = StructuredContentHandler::new(&StructuredContent::new(vec![
            ContentBlock::with_id("h", BlockType::Heading, "Notes").with_attribute("level", 2),
        ]));
        handler
            .insert_block(ContentBlock::paragraph("a & b"), None, None)
            .unwrap();
        assert_eq!(handler.to_html(), "<h2>Notes</h2>\n<p>a &amp; b</p>");
        assert_eq!(handler.to_markdown(), "## Notes\n\na & b");
    }
}
