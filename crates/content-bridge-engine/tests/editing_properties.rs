use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use content_bridge_engine::adapters::TextareaAdapter;
use content_bridge_engine::factory::create_adapter;
use content_bridge_engine::parser::{extract_links, text_to_structured, validate_structured_content};
use content_bridge_engine::surfaces::{NovelDocument, NovelEditor, TextareaSurface, TiptapEditor};
use content_bridge_engine::{
    AdapterOptions, BlockPatch, BlockType, ContentBlock, EditorAdapter, EditorHandle, LinkRef,
    SelectionManager, StructuredContent, StructuredContentHandler, TextChange,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn textarea_adapter(text: &str) -> Box<dyn EditorAdapter> {
    Box::new(TextareaAdapter::new(
        Rc::new(RefCell::new(TextareaSurface::new(text))),
        &AdapterOptions::default(),
    ))
}

fn handle_for(kind: &str, text: &str) -> EditorHandle {
    match kind {
        "textarea" => EditorHandle::textarea(TextareaSurface::new(text)),
        "tiptap" => EditorHandle::tiptap(TiptapEditor::from_text(text)),
        "novel" => EditorHandle::novel(NovelEditor::new(NovelDocument::from_text(text))),
        other => panic!("unknown editor kind {other}"),
    }
}

#[rstest]
#[case("")]
#[case("plain")]
#[case("two\nlines")]
#[case("ünïcødé ✓ text")]
#[case("trailing newline\n")]
fn textarea_content_round_trips_exactly(#[case] text: &str) {
    let mut adapter = textarea_adapter("previous");
    adapter.set_content(text.into()).unwrap();
    assert_eq!(adapter.get_text_content().unwrap(), text);
}

#[rstest]
fn batched_changes_ignore_call_site_order(#[values("textarea", "tiptap", "novel")] kind: &str) {
    let source = "alpha beta\ngamma delta";
    let changes = [
        TextChange::new(0, 5, "ALPHA"),
        TextChange::new(11, 16, "GAMMA"),
        TextChange::new(17, 22, "DELTA"),
    ];
    let orders: [[usize; 3]; 3] = [[0, 1, 2], [2, 1, 0], [1, 0, 2]];

    for order in orders {
        let mut adapter = create_adapter(handle_for(kind, source), &AdapterOptions::default());
        let batch: Vec<TextChange> = order.iter().map(|&i| changes[i].clone()).collect();
        adapter.apply_changes(&batch).unwrap();
        assert_eq!(
            adapter.get_text_content().unwrap(),
            "ALPHA beta\nGAMMA DELTA",
            "{kind} with order {order:?}"
        );
    }
}

#[test]
fn blank_line_paragraphs_flatten_to_lines() {
    let doc = text_to_structured("Hello\n\nWorld");
    assert_eq!(
        content_bridge_engine::adapters::base::extract_plain_text(&doc),
        "Hello\nWorld"
    );
}

#[test]
fn block_operations_move_the_count_by_one() {
    let mut handler = StructuredContentHandler::new(&text_to_structured("one\n\ntwo"));
    let count = |h: &StructuredContentHandler| h.get_statistics().block_count;
    assert_eq!(count(&handler), 2);

    let id = handler
        .insert_block(ContentBlock::heading(1, "Top"), None, Some(0))
        .unwrap();
    assert_eq!(count(&handler), 3);

    handler
        .update_block(&id, BlockPatch::content("Renamed"))
        .unwrap();
    assert_eq!(handler.get_block(&id).unwrap().id, id);

    handler.delete_block(&id).unwrap();
    assert_eq!(count(&handler), 2);
}

#[rstest]
#[case(json!({"type": "doc", "content": []}), true)]
#[case(json!({"type": "doc", "content": [{"type": "paragraph", "content": "x"}]}), false)]
#[case(json!({"type": "doc", "content": [{"id": "a", "content": "x"}]}), false)]
fn structured_shape_validation(#[case] value: serde_json::Value, #[case] valid: bool) {
    assert_eq!(validate_structured_content(&value), valid);
}

#[test]
fn markdown_link_is_extracted() {
    assert_eq!(
        extract_links("Check [Google](https://google.com)"),
        vec![LinkRef {
            href: "https://google.com".to_string(),
            text: "Google".to_string()
        }]
    );
}

#[test]
fn replace_all_through_the_manager() {
    let mut manager = SelectionManager::new();
    manager
        .register_adapter("editor", textarea_adapter("Hello, world! Hello, world!"))
        .unwrap();
    assert_eq!(manager.replace_text("world", "universe", true).unwrap(), 2);
    assert_eq!(
        manager.get_content().unwrap(),
        "Hello, universe! Hello, universe!"
    );
}

#[test]
fn background_adapters_stay_silent() {
    let mut manager = SelectionManager::new();
    let front = EditorHandle::tiptap(TiptapEditor::from_text("front text"));
    let back = EditorHandle::novel(NovelEditor::new(NovelDocument::from_text("back text")));
    manager
        .register_adapter("front", create_adapter(front, &AdapterOptions::default()))
        .unwrap();
    manager
        .register_adapter("back", create_adapter(back, &AdapterOptions::default()))
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = manager.on_selection_change(move |s| sink.borrow_mut().push(s.text.clone()));

    manager.set_selection(0, 5).unwrap();
    assert_eq!(*seen.borrow(), vec!["front"]);

    manager.set_active_adapter("back").unwrap();
    manager.set_selection(5, 9).unwrap();
    assert_eq!(*seen.borrow(), vec!["front", "text"]);

    // Polling the now-background tiptap adapter forwards nothing.
    manager.poll(Instant::now() + Duration::from_secs(1));
    assert_eq!(*seen.borrow(), vec!["front", "text"]);
}

#[test]
fn every_backend_projects_the_same_plain_text() {
    let doc = StructuredContent::new(vec![
        ContentBlock::heading(1, "Title"),
        ContentBlock::paragraph("Body text"),
        ContentBlock::new(BlockType::List, "").with_children(vec![
            ContentBlock::new(BlockType::List, "first"),
            ContentBlock::new(BlockType::List, "second"),
        ]),
        ContentBlock::new(BlockType::Code, "let x = 1;").with_attribute("language", "rust"),
    ]);
    let expected = "Title\nBody text\nfirst\nsecond\nlet x = 1;";

    for kind in ["textarea", "tiptap", "novel"] {
        let mut adapter = create_adapter(handle_for(kind, ""), &AdapterOptions::default());
        adapter.set_content((&doc).into()).unwrap();
        assert_eq!(adapter.get_text_content().unwrap(), expected, "{kind}");
    }
}
