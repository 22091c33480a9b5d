//! # Rich-text preservation
//!
//! Heuristics that keep links and emphasis alive when a model rewrites
//! Markdown-flavoured text and hands back plain prose.
//!
//! Realignment is approximate. An element is put back around its exact text
//! when that text still occurs in the rewrite; otherwise around the first
//! longer word of it that does (see [`find_similar_text`]), with a warning.
//! Nothing here fails: problems come back as warnings and errors next to the
//! best-effort text.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::adapters::base::{self, char_len, char_offset};

/// Characters of context kept on each side of an approximate match.
pub const SIMILARITY_WINDOW: usize = 20;

/// Words up to this many characters are too common to anchor on.
const MIN_ANCHOR_WORD_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RichTextKind {
    Link,
    Image,
    Bold,
    Italic,
    Code,
}

impl RichTextKind {
    fn is_formatting(self) -> bool {
        matches!(self, RichTextKind::Bold | RichTextKind::Italic | RichTextKind::Code)
    }
}

impl std::fmt::Display for RichTextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RichTextKind::Link => "link",
            RichTextKind::Image => "image",
            RichTextKind::Bold => "bold",
            RichTextKind::Italic => "italic",
            RichTextKind::Code => "code",
        })
    }
}

/// One Markdown span found in text. Offsets are characters into the text it
/// was extracted from and cover the whole markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RichTextElement {
    pub kind: RichTextKind,
    /// Visible text: link label, image alt, or the emphasized words.
    pub text: String,
    /// Link or image target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The markup as written.
    pub raw: String,
    pub start: usize,
    pub end: usize,
}

impl RichTextElement {
    /// Markup before and after the visible text.
    fn delimiters(&self) -> (&str, &str) {
        match self.raw.find(self.text.as_str()) {
            Some(at) if !self.text.is_empty() => (&self.raw[..at], &self.raw[at + self.text.len()..]),
            _ => ("", ""),
        }
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }
}

/// Where an element's text was found again in rewritten text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarMatch {
    pub start: usize,
    pub end: usize,
    /// `false` when only one word of the text was found.
    pub exact: bool,
    /// Up to [`SIMILARITY_WINDOW`] characters around an approximate match.
    pub window: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedResponse {
    pub processed_text: String,
    pub preserved_elements: Vec<RichTextElement>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| {
        Regex::new(r#"(!?)\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#).expect("Invalid link regex")
    })
}

fn bold_regex() -> &'static Regex {
    static BOLD: OnceLock<Regex> = OnceLock::new();
    BOLD.get_or_init(|| Regex::new(r"\*\*([^*\n]+)\*\*|__([^_\n]+)__").expect("Invalid bold regex"))
}

fn italic_regex() -> &'static Regex {
    static ITALIC: OnceLock<Regex> = OnceLock::new();
    ITALIC.get_or_init(|| {
        Regex::new(r"\*([^*\s][^*\n]*)\*|\b_([^_\n]+)_\b").expect("Invalid italic regex")
    })
}

fn code_regex() -> &'static Regex {
    static CODE: OnceLock<Regex> = OnceLock::new();
    CODE.get_or_init(|| Regex::new(r"`([^`\n]+)`").expect("Invalid code regex"))
}

/// Links, images, bold, italic and inline code spans, ordered by position.
/// Where spans overlap, the one starting first (then the longer one) wins.
pub fn extract_rich_text_elements(text: &str) -> Vec<RichTextElement> {
    let element = |kind, whole: regex::Match, inner: &str, url: Option<&str>| RichTextElement {
        kind,
        text: inner.to_string(),
        url: url.map(str::to_string),
        raw: whole.as_str().to_string(),
        start: char_offset(text, whole.start()),
        end: char_offset(text, whole.end()),
    };

    let mut found = Vec::new();
    for caps in link_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let kind = if &caps[1] == "!" {
            RichTextKind::Image
        } else {
            RichTextKind::Link
        };
        found.push(element(kind, whole, &caps[2], Some(&caps[3])));
    }
    for (kind, regex) in [
        (RichTextKind::Bold, bold_regex()),
        (RichTextKind::Italic, italic_regex()),
        (RichTextKind::Code, code_regex()),
    ] {
        for caps in regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(inner) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            found.push(element(kind, whole, inner.as_str(), None));
        }
    }

    found.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut kept: Vec<RichTextElement> = Vec::with_capacity(found.len());
    for candidate in found {
        if kept.iter().any(|k| k.overlaps(candidate.start, candidate.end)) {
            continue;
        }
        kept.push(candidate);
    }
    kept
}

/// Locate `needle` in `haystack`: exactly when possible, else by the first
/// word of `needle` longer than three characters.
pub fn find_similar_text(needle: &str, haystack: &str) -> Option<SimilarMatch> {
    if let Some((start, end)) = base::find_chars(haystack, needle, 0) {
        return Some(SimilarMatch {
            start,
            end,
            exact: true,
            window: needle.to_string(),
        });
    }

    let len = char_len(haystack);
    needle
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| char_len(word) > MIN_ANCHOR_WORD_LEN)
        .find_map(|word| {
            let (start, end) = base::find_chars(haystack, word, 0)?;
            let from = start.saturating_sub(SIMILARITY_WINDOW);
            let to = (end + SIMILARITY_WINDOW).min(len);
            Some(SimilarMatch {
                start,
                end,
                exact: false,
                window: base::slice_chars(haystack, from, to).to_string(),
            })
        })
}

/// A planned wrap of `start..end` in the rewritten text.
struct Wrap {
    start: usize,
    end: usize,
    before: String,
    after: String,
}

/// Put each of `elements` back into `text` around its visible text.
/// Returns the new text and any warnings.
fn reinject(text: &str, elements: &[&RichTextElement]) -> (String, Vec<String>) {
    let existing = extract_rich_text_elements(text);
    let mut warnings = Vec::new();
    let mut wraps: Vec<Wrap> = Vec::new();

    for element in elements {
        let Some(found) = find_similar_text(&element.text, text) else {
            warnings.push(format!(
                "Could not place {} \"{}\" in the rewritten text",
                element.kind, element.text
            ));
            continue;
        };
        let taken = existing.iter().any(|e| e.overlaps(found.start, found.end))
            || wraps
                .iter()
                .any(|w| found.start < w.end && w.start < found.end);
        if taken {
            warnings.push(format!(
                "{} \"{}\" overlaps other markup and was not restored",
                element.kind, element.text
            ));
            continue;
        }
        if !found.exact {
            warnings.push(format!(
                "{} \"{}\" restored approximately near \"{}\"",
                element.kind, element.text, found.window
            ));
        }

        let (before, after) = match element.kind {
            RichTextKind::Link => (
                "[".to_string(),
                format!("]({})", element.url.as_deref().unwrap_or_default()),
            ),
            _ => {
                let (before, after) = element.delimiters();
                (before.to_string(), after.to_string())
            }
        };
        wraps.push(Wrap {
            start: found.start,
            end: found.end,
            before,
            after,
        });
    }

    wraps.sort_by(|a, b| b.start.cmp(&a.start));
    let mut out = text.to_string();
    for wrap in wraps {
        let inner = base::slice_chars(&out, wrap.start, wrap.end).to_string();
        let replacement = format!("{}{inner}{}", wrap.before, wrap.after);
        out = base::splice_chars(&out, wrap.start, wrap.end, &replacement);
    }
    (out, warnings)
}

/// Re-link the anchor text of every link in `original` whose target no
/// longer appears in `rewritten`.
pub fn preserve_links_in_text(original: &str, rewritten: &str) -> (String, Vec<String>) {
    let kept_urls: Vec<String> = extract_rich_text_elements(rewritten)
        .into_iter()
        .filter(|e| e.kind == RichTextKind::Link)
        .filter_map(|e| e.url)
        .collect();
    let originals = extract_rich_text_elements(original);
    let missing: Vec<&RichTextElement> = originals
        .iter()
        .filter(|e| e.kind == RichTextKind::Link)
        .filter(|e| e.url.as_ref().is_none_or(|url| !kept_urls.contains(url)))
        .collect();
    reinject(rewritten, &missing)
}

/// [`preserve_links_in_text`] plus a warning for every link the response
/// introduced that `original` did not have.
pub fn handle_links_in_ai_response(original: &str, response: &str) -> (String, Vec<String>) {
    let original_urls: Vec<String> = extract_rich_text_elements(original)
        .into_iter()
        .filter(|e| e.kind == RichTextKind::Link)
        .filter_map(|e| e.url)
        .collect();
    let (text, mut warnings) = preserve_links_in_text(original, response);
    for added in extract_rich_text_elements(response)
        .into_iter()
        .filter(|e| e.kind == RichTextKind::Link)
    {
        if let Some(url) = added.url
            && !original_urls.contains(&url)
        {
            warnings.push(format!("Response added a link to {url}"));
        }
    }
    (text, warnings)
}

/// Re-apply bold, italic and code markup from `original` that `rewritten`
/// lost, wherever the emphasized words survived verbatim or nearly so.
pub fn preserve_formatting(original: &str, rewritten: &str) -> (String, Vec<String>) {
    let present: Vec<String> = extract_rich_text_elements(rewritten)
        .into_iter()
        .map(|e| e.raw)
        .collect();
    let originals = extract_rich_text_elements(original);
    let missing: Vec<&RichTextElement> = originals
        .iter()
        .filter(|e| e.kind.is_formatting() && !present.contains(&e.raw))
        .collect();
    reinject(rewritten, &missing)
}

/// Restore links (and, when asked, emphasis) from `original` into an AI
/// rewrite of it. Images the response dropped are reported as errors; they
/// have no anchor text to realign on.
pub fn process_ai_response(original: &str, response: &str, keep_formatting: bool) -> ProcessedResponse {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let (mut text, link_warnings) = handle_links_in_ai_response(original, response);
    warnings.extend(link_warnings);

    if keep_formatting {
        let (formatted, format_warnings) = preserve_formatting(original, &text);
        text = formatted;
        warnings.extend(format_warnings);
    }

    let originals = extract_rich_text_elements(original);
    let processed = extract_rich_text_elements(&text);
    for image in originals.iter().filter(|e| e.kind == RichTextKind::Image) {
        if !processed.iter().any(|e| e.kind == RichTextKind::Image && e.url == image.url) {
            errors.push(format!(
                "Image {} was dropped by the response",
                image.url.as_deref().unwrap_or_default()
            ));
        }
    }

    let preserved_elements: Vec<RichTextElement> = processed
        .into_iter()
        .filter(|e| {
            originals
                .iter()
                .any(|o| o.kind == e.kind && o.text == e.text && o.url == e.url)
        })
        .collect();
    warnings.extend(validate_rich_text_elements(&text, &preserved_elements));

    if !errors.is_empty() {
        log::warn!("AI response processing reported {} errors", errors.len());
    }
    ProcessedResponse {
        processed_text: text,
        preserved_elements,
        warnings,
        errors,
    }
}

/// Check that each element's markup is still where it claims to be in
/// `text`. Mismatches come back as warnings.
pub fn validate_rich_text_elements(text: &str, elements: &[RichTextElement]) -> Vec<String> {
    let len = char_len(text);
    elements
        .iter()
        .filter_map(|element| {
            if element.end > len || element.start > element.end {
                return Some(format!(
                    "{} \"{}\" at {}..{} is outside the text (length {len})",
                    element.kind, element.text, element.start, element.end
                ));
            }
            let actual = base::slice_chars(text, element.start, element.end);
            (actual != element.raw).then(|| {
                format!(
                    "{} \"{}\" expected at {}..{} but found \"{actual}\"",
                    element.kind, element.text, element.start, element.end
                )
            })
        })
        .collect()
}
