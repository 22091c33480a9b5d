//! Markdown in both directions.
//!
//! Reading walks pulldown-cmark's event stream. Nested lists arrive inside
//! their parent item, between the item's own text and its `End(Item)`:
//!
//! ```markdown
//! - Parent
//!   - Child
//! ```
//!
//! produces `Start(List) Start(Item) Text("Parent") Start(List) Start(Item)
//! Text("Child") End(Item) End(List) End(Item) End(List)`, so a child list's
//! items become the `children` of the enclosing item block.
//!
//! Writing is hand-rolled: one chunk per block, blank lines between chunks,
//! single newlines between consecutive list items.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

use crate::types::{BlockType, ContentBlock, StructuredContent};

/// Open element, pushed on `Start` and popped on the matching `End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Paragraph,
    Heading(u8),
    List,
    Item,
    CodeBlock,
    BlockQuote,
    Link,
    Image,
    Emphasis,
    Strong,
    Other,
}

/// Containers that collect finished blocks.
#[derive(Debug)]
enum Frame {
    Quote {
        blocks: Vec<ContentBlock>,
    },
    List {
        ordered: bool,
    },
    Item {
        ordered: bool,
        text: String,
        checked: Option<bool>,
        children: Vec<ContentBlock>,
    },
}

/// Inline text of the paragraph or heading being read, plus enough about its
/// links and images to tell when one of them is the whole paragraph.
///
/// `text` keeps links, images and emphasis as Markdown source so mixed
/// paragraphs do not lose their URLs.
#[derive(Debug, Default)]
struct Inline {
    text: String,
    link: Option<(String, String)>,
    links: usize,
    image: Option<(String, String)>,
    images: usize,
    loose_text: bool,
}

impl Inline {
    fn into_block(self) -> Option<ContentBlock> {
        let text = self.text.trim();
        if self.images == 0
            && self.links == 1
            && !self.loose_text
            && let Some((href, label)) = self.link
        {
            return Some(ContentBlock::new(BlockType::Link, label.trim()).with_attribute("href", href));
        }
        if self.links == 0
            && self.images == 1
            && !self.loose_text
            && let Some((src, alt)) = self.image
        {
            return Some(
                ContentBlock::new(BlockType::Image, "")
                    .with_attribute("src", src)
                    .with_attribute("alt", alt),
            );
        }
        (!text.is_empty()).then(|| ContentBlock::paragraph(text))
    }
}

struct MarkdownReader {
    blocks: Vec<ContentBlock>,
    open: Vec<Open>,
    frames: Vec<Frame>,
    inline: Inline,
    code: Option<(Option<String>, String)>,
}

impl MarkdownReader {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            open: Vec::new(),
            frames: Vec::new(),
            inline: Inline::default(),
            code: None,
        }
    }

    fn inside(&self, wanted: Open) -> bool {
        self.open.contains(&wanted)
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => {
                if let Some(open) = self.open.pop() {
                    self.end(open);
                }
            }
            Event::Text(text) => self.push_text(&text),
            Event::Code(code) => {
                let code_text = format!("`{code}`");
                self.push_text(&code_text);
            }
            Event::SoftBreak => {
                if let Some((_, code)) = self.code.as_mut() {
                    code.push('\n');
                } else {
                    self.inline.text.push(' ');
                }
            }
            Event::HardBreak => self.inline.text.push('\n'),
            Event::TaskListMarker(checked) => {
                if let Some(Frame::Item { checked: slot, .. }) = self.frames.last_mut() {
                    *slot = Some(checked);
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                log::debug!("skipping raw HTML in markdown: {}", html.trim());
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag) {
        let open = match tag {
            Tag::Paragraph => {
                self.inline = Inline::default();
                Open::Paragraph
            }
            Tag::Heading { level, .. } => {
                self.inline = Inline::default();
                Open::Heading(level as u8)
            }
            Tag::List(first_number) => {
                // Text of a tight item ends where its nested list begins.
                self.take_item_text();
                self.frames.push(Frame::List {
                    ordered: first_number.is_some(),
                });
                Open::List
            }
            Tag::Item => {
                let ordered = matches!(self.frames.last(), Some(Frame::List { ordered: true }));
                self.inline = Inline::default();
                self.frames.push(Frame::Item {
                    ordered,
                    text: String::new(),
                    checked: None,
                    children: Vec::new(),
                });
                Open::Item
            }
            Tag::CodeBlock(kind) => {
                self.take_item_text();
                let language = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                    _ => None,
                };
                self.code = Some((language, String::new()));
                Open::CodeBlock
            }
            Tag::BlockQuote(_) => {
                self.frames.push(Frame::Quote { blocks: Vec::new() });
                Open::BlockQuote
            }
            Tag::Link { dest_url, .. } => {
                self.push_source("[");
                self.inline.links += 1;
                self.inline.link = Some((dest_url.to_string(), String::new()));
                Open::Link
            }
            Tag::Image { dest_url, .. } => {
                self.inline.images += 1;
                self.inline.image = Some((dest_url.to_string(), String::new()));
                Open::Image
            }
            Tag::Emphasis => {
                self.push_source("*");
                Open::Emphasis
            }
            Tag::Strong => {
                self.push_source("**");
                Open::Strong
            }
            _ => Open::Other,
        };
        self.open.push(open);
    }

    fn end(&mut self, open: Open) {
        match open {
            Open::Paragraph => {
                let inline = std::mem::take(&mut self.inline);
                // Loose list items wrap their text in a paragraph.
                if let Some(Frame::Item { text, .. }) = self.frames.last_mut()
                    && text.is_empty()
                    && inline.links == 0
                    && inline.images == 0
                {
                    *text = inline.text.trim().to_string();
                    return;
                }
                if let Some(block) = inline.into_block() {
                    self.push_block(block);
                }
            }
            Open::Heading(level) => {
                let inline = std::mem::take(&mut self.inline);
                let text = inline.text.trim();
                if !text.is_empty() {
                    self.push_block(ContentBlock::heading(level, text));
                }
            }
            Open::List => {
                self.frames.pop();
            }
            Open::Item => {
                self.take_item_text();
                if let Some(Frame::Item {
                    ordered,
                    text,
                    checked,
                    children,
                }) = self.frames.pop()
                {
                    let style = match (checked, ordered) {
                        (Some(_), _) => "check",
                        (None, true) => "numbered",
                        (None, false) => "bullet",
                    };
                    let mut item = ContentBlock::new(BlockType::List, text).with_attribute("listStyle", style);
                    if let Some(checked) = checked {
                        item = item.with_attribute("checked", checked);
                    }
                    if !children.is_empty() {
                        item = item.with_children(children);
                    }
                    self.push_block(item);
                }
            }
            Open::CodeBlock => {
                if let Some((language, code)) = self.code.take() {
                    let mut block = ContentBlock::new(BlockType::Code, code.trim_end_matches('\n'));
                    if let Some(language) = language {
                        block = block.with_attribute("language", language);
                    }
                    self.push_block(block);
                }
            }
            Open::BlockQuote => {
                if let Some(Frame::Quote { blocks }) = self.frames.pop() {
                    let (paragraphs, rest): (Vec<_>, Vec<_>) = blocks
                        .into_iter()
                        .partition(|block| block.block_type == BlockType::Paragraph);
                    let text = paragraphs
                        .iter()
                        .map(|block| block.content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    let mut quote = ContentBlock::new(BlockType::Quote, text);
                    if !rest.is_empty() {
                        quote = quote.with_children(rest);
                    }
                    self.push_block(quote);
                }
            }
            Open::Link => {
                if let Some((href, _)) = self.inline.link.clone() {
                    self.push_source(&format!("]({href})"));
                }
            }
            Open::Image => {
                // Alt text was diverted while the image was open.
                if let Some((src, alt)) = self.inline.image.clone() {
                    self.push_source(&format!("![{alt}]({src})"));
                }
            }
            Open::Emphasis => self.push_source("*"),
            Open::Strong => self.push_source("**"),
            Open::Other => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, code)) = self.code.as_mut() {
            code.push_str(text);
            return;
        }
        if self.inside(Open::Image) {
            if let Some((_, alt)) = self.inline.image.as_mut() {
                alt.push_str(text);
            }
            return;
        }
        self.inline.text.push_str(text);
        if self.inside(Open::Link) {
            if let Some((_, label)) = self.inline.link.as_mut() {
                label.push_str(text);
            }
        } else if !text.trim().is_empty() {
            self.inline.loose_text = true;
        }
    }

    /// Markdown syntax around inline text. Dropped inside image alt text and
    /// code blocks.
    fn push_source(&mut self, source: &str) {
        if self.code.is_none() && !self.inside(Open::Image) {
            self.inline.text.push_str(source);
        }
    }

    /// Move pending tight-item text into the innermost item.
    fn take_item_text(&mut self) {
        if let Some(Frame::Item { text, .. }) = self.frames.last_mut() {
            let pending = std::mem::take(&mut self.inline.text);
            let pending = pending.trim();
            if !pending.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(pending);
            }
            self.inline = Inline::default();
        }
    }

    fn push_block(&mut self, block: ContentBlock) {
        match self.frames.last_mut() {
            Some(Frame::Quote { blocks }) => blocks.push(block),
            Some(Frame::Item { children, .. }) => children.push(block),
            Some(Frame::List { .. }) | None => {
                // Items of a nested list belong to the enclosing item.
                let parent_item = self
                    .frames
                    .iter_mut()
                    .rev()
                    .skip(1)
                    .find_map(|frame| match frame {
                        Frame::Item { children, .. } => Some(children),
                        Frame::Quote { blocks } => Some(blocks),
                        Frame::List { .. } => None,
                    });
                match parent_item {
                    Some(children) => children.push(block),
                    None => self.blocks.push(block),
                }
            }
        }
    }

    fn finalize(self) -> StructuredContent {
        StructuredContent::new(self.blocks)
    }
}

/// Read CommonMark (with task lists) into blocks. List items become `list`
/// blocks carrying a `listStyle` attribute; nested lists become children.
pub fn markdown_to_structured(markdown: &str) -> StructuredContent {
    let mut reader = MarkdownReader::new();
    for event in Parser::new_ext(markdown, Options::ENABLE_TASKLISTS) {
        reader.process_event(event);
    }
    reader.finalize()
}

pub fn structured_to_markdown(content: &StructuredContent) -> String {
    render_blocks(&content.content)
}

fn is_item(block: &ContentBlock) -> bool {
    block.is_list_item()
}

fn render_blocks(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    let mut number = 0;
    let mut previous_item = false;
    for block in blocks {
        let item = is_item(block);
        number = if item { number + 1 } else { 0 };
        let chunk = if item {
            render_item(block, number)
        } else {
            render_block(block)
        };
        if chunk.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str(if item && previous_item { "\n" } else { "\n\n" });
        }
        out.push_str(&chunk);
        previous_item = item;
    }
    out
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_item(block: &ContentBlock, number: usize) -> String {
    let checked = block
        .attributes
        .as_ref()
        .and_then(|attrs| attrs.get("checked"))
        .and_then(serde_json::Value::as_bool);
    let numbered = block.is_ordered_list();

    let (marker, width) = match (block.attribute_str("listStyle"), checked) {
        (Some("check"), _) | (_, Some(_)) => {
            let mark = if checked.unwrap_or(false) { "x" } else { " " };
            (format!("- [{mark}] "), 2)
        }
        _ if numbered => {
            let marker = format!("{number}. ");
            let width = marker.len();
            (marker, width)
        }
        _ => ("- ".to_string(), 2),
    };

    let mut out = format!("{marker}{}", block.content);
    if !block.children().is_empty() {
        let nested = render_blocks(block.children());
        let tight = block.children().iter().all(is_item);
        out.push_str(if tight { "\n" } else { "\n\n" });
        out.push_str(&indent(&nested, width));
    }
    out
}

fn render_block(block: &ContentBlock) -> String {
    let body = match block.block_type {
        BlockType::Paragraph => block.content.clone(),
        BlockType::Heading => format!("{} {}", "#".repeat(block.heading_level() as usize), block.content),
        BlockType::Code => format!(
            "```{}\n{}\n```",
            block.attribute_str("language").unwrap_or_default(),
            block.content
        ),
        BlockType::Quote => {
            let mut inner = block.content.clone();
            if !block.children().is_empty() {
                if !inner.is_empty() {
                    inner.push_str("\n\n");
                }
                inner.push_str(&render_blocks(block.children()));
            }
            return inner
                .lines()
                .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
                .collect::<Vec<_>>()
                .join("\n");
        }
        BlockType::Link => format!(
            "[{}]({})",
            block.content,
            block.attribute_str("href").unwrap_or_default()
        ),
        BlockType::Image => format!(
            "![{}]({})",
            block.attribute_str("alt").unwrap_or_default(),
            block.attribute_str("src").unwrap_or_default()
        ),
        // A list container renders as its items.
        BlockType::List => return render_blocks(&block.list_items()),
    };

    if block.children().is_empty() {
        body
    } else {
        format!("{body}\n\n{}", render_blocks(block.children()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outline(blocks: &[ContentBlock]) -> Vec<(BlockType, String, usize)> {
        blocks
            .iter()
            .map(|b| (b.block_type, b.content.clone(), b.children().len()))
            .collect()
    }

    #[test]
    fn reads_common_blocks() {
        let doc = markdown_to_structured(
            "# Title\n\nSome *soft*\nwrapped text.\n\n```rust\nfn main() {}\n```\n\n> quoted\n> words\n",
        );
        assert_eq!(
            outline(&doc.content),
            vec![
                (BlockType::Heading, "Title".to_string(), 0),
                (BlockType::Paragraph, "Some *soft* wrapped text.".to_string(), 0),
                (BlockType::Code, "fn main() {}".to_string(), 0),
                (BlockType::Quote, "quoted words".to_string(), 0),
            ]
        );
        assert_eq!(doc.content[0].heading_level(), 1);
        assert_eq!(doc.content[2].attribute_str("language"), Some("rust"));
    }

    #[test]
    fn nested_list_items_become_children() {
        let doc = markdown_to_structured("- Parent\n  - Child\n- Sibling\n\n1. first\n2. second\n");
        assert_eq!(
            outline(&doc.content),
            vec![
                (BlockType::List, "Parent".to_string(), 1),
                (BlockType::List, "Sibling".to_string(), 0),
                (BlockType::List, "first".to_string(), 0),
                (BlockType::List, "second".to_string(), 0),
            ]
        );
        assert_eq!(doc.content[0].children()[0].content, "Child");
        assert_eq!(doc.content[0].attribute_str("listStyle"), Some("bullet"));
        assert_eq!(doc.content[2].attribute_str("listStyle"), Some("numbered"));
    }

    #[test]
    fn ordered_container_writes_numbered_items() {
        let doc = StructuredContent::new(vec![
            ContentBlock::new(BlockType::List, "")
                .with_attribute("ordered", true)
                .with_children(vec![ContentBlock::paragraph("one"), ContentBlock::paragraph("two")]),
        ]);
        assert_eq!(structured_to_markdown(&doc), "1. one\n2. two");
    }

    #[test]
    fn task_items_keep_their_state() {
        let doc = markdown_to_structured("- [x] done\n- [ ] todo\n");
        assert_eq!(doc.content[0].attribute_str("listStyle"), Some("check"));
        assert_eq!(
            doc.content[0].attributes.as_ref().and_then(|a| a.get("checked")),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(doc.content[1].content, "todo");
    }

    #[test]
    fn sole_link_and_image_paragraphs() {
        let doc = markdown_to_structured(
            "[Docs](https://docs.rs)\n\n![logo](logo.png)\n\nSee [Docs](https://docs.rs) and **bold** here",
        );
        assert_eq!(doc.content[0].block_type, BlockType::Link);
        assert_eq!(doc.content[0].content, "Docs");
        assert_eq!(doc.content[0].attribute_str("href"), Some("https://docs.rs"));
        assert_eq!(doc.content[1].block_type, BlockType::Image);
        assert_eq!(doc.content[1].attribute_str("alt"), Some("logo"));
        assert_eq!(doc.content[2].block_type, BlockType::Paragraph);
        assert_eq!(
            doc.content[2].content,
            "See [Docs](https://docs.rs) and **bold** here"
        );
    }

    #[test]
    fn inline_markup_survives_in_mixed_paragraphs() {
        let markdown = "Read _this_ and ![chart](c.png) via [the guide](https://g.io).";
        let doc = markdown_to_structured(markdown);
        assert_eq!(doc.content.len(), 1);
        assert_eq!(
            doc.content[0].content,
            "Read *this* and ![chart](c.png) via [the guide](https://g.io)."
        );
        assert_eq!(
            crate::parser::extract_links(&doc.content[0].content),
            vec![crate::types::LinkRef {
                href: "https://g.io".to_string(),
                text: "the guide".to_string(),
            }]
        );
        let again = markdown_to_structured(&structured_to_markdown(&doc));
        assert_eq!(again.content[0].content, doc.content[0].content);
    }

    #[test]
    fn writes_markdown() {
        let doc = StructuredContent::new(vec![
            ContentBlock::heading(2, "Plan"),
            ContentBlock::paragraph("Intro text."),
            ContentBlock::new(BlockType::List, "one")
                .with_attribute("listStyle", "numbered")
                .with_children(vec![ContentBlock::new(BlockType::List, "nested")]),
            ContentBlock::new(BlockType::List, "two").with_attribute("listStyle", "numbered"),
            ContentBlock::new(BlockType::Quote, "careful"),
            ContentBlock::new(BlockType::Code, "let x = 1;").with_attribute("language", "rust"),
            ContentBlock::new(BlockType::Link, "site").with_attribute("href", "https://a.io"),
        ]);
        insta::assert_snapshot!(structured_to_markdown(&doc), @r"
        ## Plan

        Intro text.

        1. one
           - nested
        2. two

        > careful

        ```rust
        let x = 1;
        ```

        [site](https://a.io)
        ");
    }

    #[test]
    fn written_lists_read_back_with_the_same_shape() {
        let source = markdown_to_structured("- a\n  - b\n  - c\n- d\n");
        let again = markdown_to_structured(&structured_to_markdown(&source));
        assert_eq!(outline(&again.content), outline(&source.content));
        assert_eq!(outline(again.content[0].children()), outline(source.content[0].children()));
    }
}
