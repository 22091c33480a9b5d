use std::fmt::Write;
use std::sync::OnceLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;

use super::metadata::{strip_html_tags, tag_attribute};
use crate::types::{BlockType, ContentBlock, StructuredContent};

fn block_element_regex() -> &'static Regex {
    static BLOCK_ELEMENT: OnceLock<Regex> = OnceLock::new();
    BLOCK_ELEMENT.get_or_init(|| {
        Regex::new(
            r"(?is)<p\b[^>]*>(?P<p>.*?)</p\s*>|<h(?P<level>[1-6])\b[^>]*>(?P<h>.*?)</h[1-6]\s*>|<li\b[^>]*>(?P<li>.*?)</li\s*>",
        )
        .expect("Invalid block element regex")
    })
}

fn sole_anchor_regex() -> &'static Regex {
    static SOLE_ANCHOR: OnceLock<Regex> = OnceLock::new();
    SOLE_ANCHOR.get_or_init(|| {
        Regex::new(r"(?is)^\s*(<a\b[^>]*>)(.*?)</a\s*>\s*$").expect("Invalid anchor regex")
    })
}

fn sole_img_regex() -> &'static Regex {
    static SOLE_IMG: OnceLock<Regex> = OnceLock::new();
    SOLE_IMG.get_or_init(|| Regex::new(r"(?is)^\s*(<img\b[^>]*>)\s*$").expect("Invalid img regex"))
}

/// Extract `<p>`, `<h1>`-`<h6>` and `<li>` elements. Anything else is ignored;
/// input without any of them becomes a single paragraph of its text.
///
/// A paragraph holding only a link or only an image becomes a link or image
/// block.
pub fn html_to_structured(html: &str) -> StructuredContent {
    let mut blocks = Vec::new();
    for caps in block_element_regex().captures_iter(html) {
        if let Some(inner) = caps.name("p") {
            blocks.push(paragraph_block(inner.as_str()));
        } else if let (Some(level), Some(inner)) = (caps.name("level"), caps.name("h")) {
            let level: u8 = level.as_str().parse().unwrap_or(1);
            blocks.push(ContentBlock::heading(level, strip_html_tags(inner.as_str()).trim()));
        } else if let Some(inner) = caps.name("li") {
            blocks.push(ContentBlock::new(
                BlockType::List,
                strip_html_tags(inner.as_str()).trim(),
            ));
        }
    }

    if blocks.is_empty() {
        let text = strip_html_tags(html);
        let text = text.trim();
        if !text.is_empty() {
            log::debug!("no block elements in HTML input, keeping it as one paragraph");
            blocks.push(ContentBlock::paragraph(text));
        }
    }
    StructuredContent::new(blocks)
}

fn paragraph_block(inner: &str) -> ContentBlock {
    if let Some(caps) = sole_anchor_regex().captures(inner)
        && let Some(href) = tag_attribute(&caps[1], "href")
    {
        return ContentBlock::new(BlockType::Link, strip_html_tags(&caps[2]).trim())
            .with_attribute("href", html_escape::decode_html_entities(href).into_owned());
    }
    if let Some(caps) = sole_img_regex().captures(inner)
        && let Some(src) = tag_attribute(&caps[1], "src")
    {
        return ContentBlock::new(BlockType::Image, "")
            .with_attribute("src", src)
            .with_attribute("alt", tag_attribute(&caps[1], "alt").unwrap_or_default());
    }
    ContentBlock::paragraph(strip_html_tags(inner).trim())
}

/// Render blocks to HTML. All text and attribute values are escaped; runs of
/// list items share one `<ul>`/`<ol>`.
pub fn structured_to_html(content: &StructuredContent) -> String {
    let mut out = String::new();
    render_blocks(&content.content, &mut out);
    out.trim_end().to_string()
}

fn render_blocks(blocks: &[ContentBlock], out: &mut String) {
    let mut index = 0;
    while index < blocks.len() {
        let block = &blocks[index];
        if block.is_list_item() {
            let ordered = block.is_ordered_list();
            let tag = if ordered { "ol" } else { "ul" };
            out.push_str(&format!("<{tag}>\n"));
            while index < blocks.len()
                && blocks[index].is_list_item()
                && blocks[index].is_ordered_list() == ordered
            {
                render_list_item(&blocks[index], out);
                index += 1;
            }
            out.push_str(&format!("</{tag}>\n"));
            continue;
        }
        render_block(block, out);
        index += 1;
    }
}

fn render_list_item(block: &ContentBlock, out: &mut String) {
    out.push_str("<li>");
    out.push_str(&encode_text(&block.content));
    if !block.children().is_empty() {
        out.push('\n');
        render_blocks(block.children(), out);
    }
    out.push_str("</li>\n");
}

fn render_block(block: &ContentBlock, out: &mut String) {
    let text = encode_text(&block.content);
    // Writing into a String cannot fail.
    let _ = match block.block_type {
        BlockType::Paragraph => writeln!(out, "<p>{text}</p>"),
        BlockType::Heading => {
            let level = block.heading_level();
            writeln!(out, "<h{level}>{text}</h{level}>")
        }
        BlockType::Code => match block.attribute_str("language") {
            Some(language) => writeln!(
                out,
                "<pre><code class=\"language-{}\">{text}</code></pre>",
                encode_double_quoted_attribute(language)
            ),
            None => writeln!(out, "<pre><code>{text}</code></pre>"),
        },
        BlockType::Quote => {
            let _ = write!(out, "<blockquote>");
            if !block.content.is_empty() {
                let _ = write!(out, "<p>{text}</p>");
            }
            if !block.children().is_empty() {
                out.push('\n');
                render_blocks(block.children(), out);
            }
            writeln!(out, "</blockquote>")
        }
        BlockType::Link => {
            let href = block.attribute_str("href").unwrap_or_default();
            writeln!(
                out,
                "<p><a href=\"{}\">{text}</a></p>",
                encode_double_quoted_attribute(href)
            )
        }
        BlockType::Image => writeln!(
            out,
            "<img src=\"{}\" alt=\"{}\">",
            encode_double_quoted_attribute(block.attribute_str("src").unwrap_or_default()),
            encode_double_quoted_attribute(block.attribute_str("alt").unwrap_or_default())
        ),
        BlockType::List => {
            // A list container: its children are the items.
            render_blocks(&block.list_items(), out);
            Ok(())
        }
    };
    if block.block_type != BlockType::Quote
        && block.block_type != BlockType::List
        && !block.children().is_empty()
    {
        render_blocks(block.children(), out);
    }
}
