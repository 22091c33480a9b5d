use content_bridge_engine::parser::{markdown_to_structured, structured_to_html, structured_to_markdown};
use content_bridge_engine::{BlockType, ImageRef, LinkRef, StructuredContent, StructuredContentHandler};
use pretty_assertions::assert_eq;

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!(
        "{}/tests/fixtures/{name}",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap()
}

/// Block shape without the generated ids.
fn outline(doc: &StructuredContent) -> Vec<(BlockType, String)> {
    doc.content
        .iter()
        .map(|block| (block.block_type, block.content.clone()))
        .collect()
}

#[test]
fn markdown_fixture_maps_to_blocks() {
    let doc = markdown_to_structured(&fixture("release_notes.md"));

    assert_eq!(
        outline(&doc),
        vec![
            (BlockType::Heading, "Release notes".to_string()),
            (BlockType::Paragraph, "Version 2 ships **faster** sync.".to_string()),
            (BlockType::Link, "Full changelog".to_string()),
            (BlockType::List, "fixed crash on save".to_string()),
            (BlockType::List, "added export".to_string()),
            (BlockType::Quote, "Remember to back up first.".to_string()),
            (BlockType::Code, "fn main() {}".to_string()),
            (BlockType::Image, String::new()),
        ]
    );
    assert_eq!(doc.content[6].attribute_str("language"), Some("rust"));
}

#[test]
fn handler_reports_links_images_and_text() {
    let handler = StructuredContentHandler::new(&markdown_to_structured(&fixture(
        "release_notes.md",
    )));

    assert_eq!(
        handler.extract_links(),
        vec![LinkRef {
            href: "https://example.com/changelog".to_string(),
            text: "Full changelog".to_string(),
        }]
    );
    assert_eq!(
        handler.extract_images(),
        vec![ImageRef {
            src: "https://example.com/diagram.png".to_string(),
            alt: "sync diagram".to_string(),
        }]
    );
    assert_eq!(
        handler.to_plain_text(),
        "Release notes\nVersion 2 ships **faster** sync.\nFull changelog\nfixed crash on save\nadded export\nRemember to back up first.\nfn main() {}"
    );

    let stats = handler.get_statistics();
    assert_eq!(stats.block_count, 8);
    assert_eq!(stats.link_count, 1);
    assert_eq!(stats.image_count, 1);
    assert_eq!(stats.block_types.get(&BlockType::List), Some(&2));
    assert!(handler.validate().is_valid);
}

#[test]
fn markdown_output_reads_back_to_the_same_blocks() {
    let first = markdown_to_structured(&fixture("release_notes.md"));
    let second = markdown_to_structured(&structured_to_markdown(&first));
    assert_eq!(outline(&second), outline(&first));
}

#[test]
fn html_output_keeps_structure() {
    let html = structured_to_html(&markdown_to_structured(&fixture("release_notes.md")));

    assert!(html.starts_with("<h1>Release notes</h1>\n"));
    assert!(html.contains("<p><a href=\"https://example.com/changelog\">Full changelog</a></p>"));
    assert!(html.contains("<ul>\n<li>fixed crash on save</li>\n<li>added export</li>\n</ul>"));
    assert!(html.contains("<pre><code class=\"language-rust\">fn main() {}</code></pre>"));
    assert!(html.ends_with("<img src=\"https://example.com/diagram.png\" alt=\"sync diagram\">"));
}
