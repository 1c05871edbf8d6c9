// Editing scenarios
// Typing, deleting, formatting and undo through the public document API

use std::rc::Rc;

use richdoc::draw_context::FixedMetrics;
use richdoc::error::DocumentError;
use richdoc::richtext::document::{SELECTION_SEARCH, SELECTION_STANDARD};
use richdoc::richtext::format::changes;
use richdoc::richtext::{Cursor, Document, Format, TextFormat, TextPos};

fn document(text: &str) -> Document {
    let mut doc = Document::new(Rc::new(FixedMetrics::default()));
    doc.set_plain_text(text);
    doc.set_width(300);
    doc.format_all();
    doc
}

#[test]
fn test_typing_session_with_undo_and_redo() {
    let mut doc = document("");
    let mut c = Cursor::new(&doc);
    doc.insert_text(&mut c, "Hello");
    doc.insert_text(&mut c, "\n");
    doc.insert_text(&mut c, "world");
    assert_eq!(doc.plain_text(), "Hello \nworld \n");
    assert_eq!((c.parag(), c.index()), (doc.last_parag(), 5));

    c.goto_doc_start(&doc);
    assert!(doc.delete_char(&mut c));
    assert_eq!(doc.plain_text(), "ello \nworld \n");

    let expected = ["Hello \nworld \n", "Hello \n \n", "Hello \n", " \n"];
    for text in expected {
        assert!(doc.undo(&mut c));
        assert_eq!(doc.plain_text(), text);
    }
    assert!(!doc.can_undo());
    assert!(!doc.undo(&mut c));

    for text in expected.iter().rev().skip(1) {
        assert!(doc.redo(&mut c));
        assert_eq!(doc.plain_text(), *text);
    }
    assert!(doc.redo(&mut c));
    assert_eq!(doc.plain_text(), "ello \nworld \n");
    assert!(!doc.can_redo());
}

#[test]
fn test_new_edit_drops_redo() {
    let mut doc = document("ab");
    let mut c = Cursor::at(doc.first_parag(), 2);
    doc.insert_text(&mut c, "c");
    assert!(doc.undo(&mut c));
    assert!(doc.can_redo());
    doc.insert_text(&mut c, "x");
    assert!(!doc.can_redo());
    assert_eq!(doc.plain_text(), "abx \n");
}

#[test]
fn test_undo_depth_limits_history() {
    let mut doc = document("");
    doc.set_undo_depth(2);
    let mut c = Cursor::new(&doc);
    for s in ["a", "b", "c"] {
        doc.insert_text(&mut c, s);
    }
    assert!(doc.undo(&mut c));
    assert!(doc.undo(&mut c));
    assert!(!doc.undo(&mut c));
    assert_eq!(doc.plain_text(), "a \n");
}

#[test]
fn test_find_and_replace() {
    let mut doc = document("Hello world");
    let mut c = Cursor::new(&doc);
    assert!(doc.find("WORLD", false, true, true, &mut c));
    assert_eq!(doc.selected_text(SELECTION_SEARCH), "world");
    assert!(doc.remove_selected_text(SELECTION_SEARCH, &mut c));
    doc.insert_text(&mut c, "there");
    assert_eq!(doc.plain_text(), "Hello there \n");
    assert!(doc.undo(&mut c));
    assert!(doc.undo(&mut c));
    assert_eq!(doc.plain_text(), "Hello world \n");
}

#[test]
fn test_bold_selection_shows_up_in_exports() {
    let mut doc = document("Hello world");
    let first = doc.first_parag();
    doc.set_selection(SELECTION_STANDARD, TextPos::new(first, 0), TextPos::new(first, 5));
    assert!(doc.set_format(SELECTION_STANDARD, &Format::default().with_bold(true), changes::BOLD));
    assert_eq!(doc.rich_text(), "<p><b>Hello</b> world</p>");
    assert_eq!(doc.to_markdown(), "**Hello** world");
}

#[test]
fn test_typing_inside_a_table_cell() {
    let mut doc = Document::new(Rc::new(FixedMetrics::default()));
    doc.set_rich_text("<table><tr><td>a</td><td>b</td></tr></table>after");
    doc.set_width(300);
    doc.format_all();
    let first = doc.first_parag();

    let mut c = Cursor::at(first, 0);
    assert!(c.process_nesting(&doc, false));
    assert_eq!(c.depth(), 1);
    doc.insert_text(&mut c, "X");
    assert_eq!(c.index(), 1);

    let cell_text = |doc: &Document, cell: usize| {
        doc.table_at(first, 0)
            .and_then(|t| t.cell(cell))
            .map(|c| c.document().plain_text())
            .unwrap_or_default()
    };
    assert_eq!(cell_text(&doc, 0), "Xa \n");
    assert_eq!(cell_text(&doc, 1), "b \n");
    assert_eq!(doc.text_of(1).as_deref(), Some("after "));

    assert!(doc.undo(&mut c));
    assert_eq!(cell_text(&doc, 0), "a \n");
    assert_eq!(c.depth(), 1);
}

#[test]
fn test_undo_inside_a_table_cell_shrinks_the_table() {
    let mut doc = Document::new(Rc::new(FixedMetrics::default()));
    doc.set_rich_text("<table><tr><td>a</td></tr></table>after");
    doc.set_width(300);
    doc.format_all();
    let first = doc.first_parag();
    let table_height = |doc: &Document| doc.table_at(first, 0).map(|t| t.height()).unwrap_or(0);
    let (short_table, short_doc) = (table_height(&doc), doc.height());

    let mut c = Cursor::at(first, 0);
    assert!(c.process_nesting(&doc, false));
    doc.insert_text(&mut c, "x\ny\nz\nw");
    doc.format_all();
    let (tall_table, tall_doc) = (table_height(&doc), doc.height());
    assert!(tall_table > short_table);

    assert!(doc.undo(&mut c));
    doc.format_all();
    assert_eq!(table_height(&doc), short_table);
    assert_eq!(doc.height(), short_doc);

    assert!(doc.redo(&mut c));
    doc.format_all();
    assert_eq!(table_height(&doc), tall_table);
    assert_eq!(doc.height(), tall_doc);
}

#[test]
fn test_save_and_load_rich_text() {
    let path = std::env::temp_dir().join(format!("richdoc-editing-{}.html", std::process::id()));
    let mut doc = document("");
    doc.set_text_format(TextFormat::RichText);
    doc.set_rich_text("<p>one <b>two</b></p>");
    doc.save(&path).unwrap();

    let mut loaded = Document::new(Rc::new(FixedMetrics::default()));
    loaded.set_text_format(TextFormat::RichText);
    loaded.load(&path).unwrap();
    assert_eq!(loaded.plain_text(), "one two \n");
    assert_eq!(loaded.rich_text(), doc.rich_text());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_load_missing_file_fails() {
    let mut doc = document("keep");
    let result = doc.load(std::path::Path::new("/nonexistent/richdoc/file.txt"));
    assert!(matches!(result, Err(DocumentError::Io { .. })));
    assert_eq!(doc.plain_text(), "keep \n");
}
