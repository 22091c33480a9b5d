use std::sync::OnceLock;

use regex::Regex;

use crate::adapters::base::{self, char_len};
use crate::types::{BlockType, ContentMetadata, ImageRef, LinkRef, StructuredContent};

fn markdown_link_regex() -> &'static Regex {
    static MARKDOWN_LINK: OnceLock<Regex> = OnceLock::new();
    MARKDOWN_LINK.get_or_init(|| {
        Regex::new(r#"(!?)\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#)
            .expect("Invalid markdown link regex")
    })
}

fn html_anchor_regex() -> &'static Regex {
    static HTML_ANCHOR: OnceLock<Regex> = OnceLock::new();
    HTML_ANCHOR.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#)
            .expect("Invalid anchor regex")
    })
}

fn html_img_regex() -> &'static Regex {
    static HTML_IMG: OnceLock<Regex> = OnceLock::new();
    HTML_IMG.get_or_init(|| Regex::new(r"(?is)<img\b[^>]*>").expect("Invalid img regex"))
}

fn html_attr_regex() -> &'static Regex {
    static HTML_ATTR: OnceLock<Regex> = OnceLock::new();
    HTML_ATTR.get_or_init(|| {
        Regex::new(r#"(?i)\b([a-z-]+)\s*=\s*["']([^"']*)["']"#).expect("Invalid attribute regex")
    })
}

fn bare_url_regex() -> &'static Regex {
    static BARE_URL: OnceLock<Regex> = OnceLock::new();
    BARE_URL.get_or_init(|| Regex::new(r"https?://[^\s<>()\[\]]+").expect("Invalid URL regex"))
}

fn formatting_regex() -> &'static Regex {
    static FORMATTING: OnceLock<Regex> = OnceLock::new();
    FORMATTING.get_or_init(|| {
        Regex::new(
            r"\*\*[^*\n]+\*\*|__[^_\n]+__|\*[^*\s][^*\n]*\*|\b_[^_\n]+_\b|`[^`\n]+`|(?i)<(?:strong|em|b|i|code)\b",
        )
        .expect("Invalid formatting regex")
    })
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"))
}

/// `name="value"` pairs of one HTML tag.
pub(crate) fn tag_attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    html_attr_regex()
        .captures_iter(tag)
        .find(|caps| caps[1].eq_ignore_ascii_case(name))
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

/// Remove tags and decode entities.
pub fn strip_html_tags(html: &str) -> String {
    let stripped = tag_regex().replace_all(html, "");
    html_escape::decode_html_entities(&stripped).into_owned()
}

/// Markdown `[text](href)` and HTML `<a href>` links, in text order.
/// Markdown images are not links.
pub fn extract_links(text: &str) -> Vec<LinkRef> {
    let mut found: Vec<(usize, LinkRef)> = markdown_link_regex()
        .captures_iter(text)
        .filter(|caps| caps[1].is_empty())
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                LinkRef {
                    text: caps[2].to_string(),
                    href: caps[3].to_string(),
                },
            ))
        })
        .collect();

    found.extend(html_anchor_regex().captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some((
            whole.start(),
            LinkRef {
                href: caps[1].to_string(),
                text: strip_html_tags(&caps[2]),
            },
        ))
    }));

    found.sort_by_key(|(position, _)| *position);
    found.into_iter().map(|(_, link)| link).collect()
}

/// Markdown `![alt](src)` and HTML `<img>` images, in text order.
pub fn extract_images(text: &str) -> Vec<ImageRef> {
    let mut found: Vec<(usize, ImageRef)> = markdown_link_regex()
        .captures_iter(text)
        .filter(|caps| &caps[1] == "!")
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                ImageRef {
                    alt: caps[2].to_string(),
                    src: caps[3].to_string(),
                },
            ))
        })
        .collect();

    found.extend(html_img_regex().find_iter(text).filter_map(|tag| {
        let src = tag_attribute(tag.as_str(), "src")?;
        Some((
            tag.start(),
            ImageRef {
                src: src.to_string(),
                alt: tag_attribute(tag.as_str(), "alt").unwrap_or_default().to_string(),
            },
        ))
    }));

    found.sort_by_key(|(position, _)| *position);
    found.into_iter().map(|(_, image)| image).collect()
}

/// Regex heuristics over plain (possibly Markdown or HTML flavoured) text.
pub fn analyze_text(text: &str) -> ContentMetadata {
    let has_links = !extract_links(text).is_empty() || bare_url_regex().is_match(text);
    ContentMetadata {
        word_count: base::count_words(text),
        char_count: char_len(text),
        estimated_tokens: base::estimate_tokens(text),
        has_links,
        has_images: !extract_images(text).is_empty(),
        has_formatting: formatting_regex().is_match(text),
        block_types: if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![BlockType::Paragraph]
        },
    }
}

/// Block-type inspection over a document.
pub fn analyze_structured(content: &StructuredContent) -> ContentMetadata {
    let text = base::extract_plain_text(content);
    let mut block_types = Vec::new();
    for block in content.walk() {
        if !block_types.contains(&block.block_type) {
            block_types.push(block.block_type);
        }
    }
    let has = |wanted: &[BlockType]| block_types.iter().any(|t| wanted.contains(t));

    ContentMetadata {
        word_count: base::count_words(&text),
        char_count: char_len(&text),
        estimated_tokens: base::estimate_tokens(&text),
        has_links: has(&[BlockType::Link])
            || content.walk().any(|block| block.attribute_str("href").is_some()),
        has_images: has(&[BlockType::Image]),
        has_formatting: has(&[BlockType::Heading, BlockType::Code, BlockType::Quote, BlockType::List])
            || formatting_regex().is_match(&text),
        block_types,
    }
}
