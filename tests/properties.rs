// Property tests for text storage, editing and layout

use std::rc::Rc;

use proptest::prelude::*;
use richdoc::draw_context::FixedMetrics;
use richdoc::richtext::document::SELECTION_STANDARD;
use richdoc::richtext::{Cursor, Document, TextPos};

fn document(text: &str) -> Document {
    let mut doc = Document::new(Rc::new(FixedMetrics::default()));
    doc.set_plain_text(text);
    doc
}

fn lines() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z ]{0,12}", 1..6).prop_map(|lines| lines.join("\n"))
}

/// Every paragraph starts where the one above it ends
fn assert_stacked(doc: &Document) -> Result<(), TestCaseError> {
    let mut bottom = 0;
    for (_, parag) in doc.iter() {
        prop_assert_eq!(parag.rect().y, bottom);
        bottom = parag.rect().bottom();
    }
    prop_assert_eq!(doc.height(), bottom);
    Ok(())
}

// Property: plain text comes back line by line with the sentinel space
proptest! {
    #[test]
    fn prop_plain_text_round_trip(text in lines()) {
        let doc = document(&text);
        let expected: String = text.split('\n').map(|line| format!("{line} \n")).collect();
        prop_assert_eq!(doc.plain_text(), expected);
        prop_assert_eq!(doc.paragraph_count(), text.split('\n').count());
    }
}

// Property: joining right after a split restores the text
proptest! {
    #[test]
    fn prop_split_then_join_is_identity(text in "[a-z ]{0,20}", at in 0usize..=20) {
        let mut doc = document(&text);
        let before = doc.plain_text();
        let first = doc.first_parag();
        let at = at.min(text.chars().count());

        let second = doc.split_parag(first, at, true);
        prop_assert_eq!(doc.paragraph_count(), 2);
        let prev = doc.parag(second).and_then(|p| p.prev());
        prop_assert!(prev.is_some());
        prop_assert!(doc.join(prev.unwrap()));
        prop_assert_eq!(doc.plain_text(), before);
    }
}

// Property: undo reverts an insertion and redo brings it back
proptest! {
    #[test]
    fn prop_undo_redo_insert(text in lines(), insert in "[a-z\n]{1,8}", parag in 0usize..6, index in 0usize..13) {
        let mut doc = document(&text);
        doc.set_width(200);
        let original = doc.plain_text();

        let number = parag.min(doc.paragraph_count() - 1);
        let id = doc.parag_by_number(number).unwrap();
        let index = index.min(doc.parag(id).unwrap().length() - 1);
        let mut c = Cursor::at(id, index);
        doc.insert_text(&mut c, &insert);
        let edited = doc.plain_text();
        prop_assert_ne!(&edited, &original);

        prop_assert!(doc.undo(&mut c));
        prop_assert_eq!(doc.plain_text(), original);
        prop_assert!(doc.redo(&mut c));
        prop_assert_eq!(doc.plain_text(), edited);
    }
}

#[derive(Debug, Clone)]
enum Edit {
    Insert { parag: usize, index: usize, text: String },
    DeleteChar { parag: usize, index: usize },
    RemoveSelection { parag: usize, index: usize, len: usize },
}

fn edits() -> impl Strategy<Value = Vec<Edit>> {
    let edit = prop_oneof![
        (0usize..8, 0usize..14, "[a-z\n]{1,6}").prop_map(|(parag, index, text)| Edit::Insert { parag, index, text }),
        (0usize..8, 0usize..14).prop_map(|(parag, index)| Edit::DeleteChar { parag, index }),
        (0usize..8, 0usize..14, 1usize..20).prop_map(|(parag, index, len)| Edit::RemoveSelection { parag, index, len }),
    ];
    prop::collection::vec(edit, 1..8)
}

/// Position in paragraph `parag`, clamped to the document
fn clamp(doc: &Document, parag: usize, index: usize) -> TextPos {
    let number = parag.min(doc.paragraph_count() - 1);
    let id = doc.parag_by_number(number).unwrap();
    let index = index.min(doc.parag(id).unwrap().length() - 1);
    TextPos::new(id, index)
}

/// Apply `edit`, returning whether it was recorded in the history
fn apply(doc: &mut Document, edit: &Edit) -> bool {
    match edit {
        Edit::Insert { parag, index, text } => {
            let pos = clamp(doc, *parag, *index);
            let mut c = Cursor::at(pos.parag, pos.index);
            doc.insert_text(&mut c, text);
            true
        }
        Edit::DeleteChar { parag, index } => {
            let pos = clamp(doc, *parag, *index);
            let mut c = Cursor::at(pos.parag, pos.index);
            doc.delete_char(&mut c)
        }
        Edit::RemoveSelection { parag, index, len } => {
            let start = clamp(doc, *parag, *index);
            let end = doc.advance(start, *len);
            if end == start {
                return false;
            }
            doc.set_selection(SELECTION_STANDARD, start, end);
            let mut c = Cursor::at(start.parag, start.index);
            doc.remove_selected_text(SELECTION_STANDARD, &mut c)
        }
    }
}

// Property: undoing every edit of a mixed session restores the text and
// redoing all of them brings the edited text back
proptest! {
    #[test]
    fn prop_undo_redo_edit_sequence(text in lines(), script in edits()) {
        let mut doc = document(&text);
        doc.set_width(200);
        let original = doc.plain_text();

        let recorded = script.iter().filter(|edit| apply(&mut doc, edit)).count();
        let edited = doc.plain_text();

        let mut c = Cursor::new(&doc);
        for _ in 0..recorded {
            prop_assert!(doc.undo(&mut c));
        }
        prop_assert!(!doc.can_undo());
        prop_assert_eq!(doc.plain_text(), original);

        for _ in 0..recorded {
            prop_assert!(doc.redo(&mut c));
        }
        prop_assert!(!doc.can_redo());
        prop_assert_eq!(doc.plain_text(), edited);
    }
}

// Property: undo and redo inside a table cell keep the outer layout in step
// with the cell contents
proptest! {
    #[test]
    fn prop_undo_redo_in_table_cell(inserts in prop::collection::vec("[a-z\n]{1,6}", 1..5)) {
        let mut doc = Document::new(Rc::new(FixedMetrics::default()));
        doc.set_rich_text("<table><tr><td>a</td><td>b</td></tr></table>after");
        doc.set_width(200);
        doc.format_all();
        let original = doc.height();

        let mut c = Cursor::at(doc.first_parag(), 0);
        prop_assert!(c.process_nesting(&doc, false));
        for text in &inserts {
            doc.insert_text(&mut c, text);
        }
        doc.format_all();
        let edited = doc.height();

        for _ in 0..inserts.len() {
            prop_assert!(doc.undo(&mut c));
        }
        doc.format_all();
        prop_assert_eq!(doc.height(), original);

        for _ in 0..inserts.len() {
            prop_assert!(doc.redo(&mut c));
        }
        doc.format_all();
        prop_assert_eq!(doc.height(), edited);
    }
}

// Property: word wrapping keeps every visible character inside the width
proptest! {
    #[test]
    fn prop_words_fit_width(words in prop::collection::vec("[a-z]{1,5}", 1..25), width in 48i32..240) {
        let mut doc = document(&words.join(" "));
        doc.set_width(width);
        doc.format_all();
        let first = doc.first_parag();
        let parag = doc.parag(first).unwrap();
        for cell in parag.string().chars() {
            if cell.c != ' ' {
                prop_assert!(cell.x + 8 <= width, "{:?} at {} overflows {}", cell.c, cell.x, width);
            }
        }
        let letters: usize = words.iter().map(|w| w.len()).sum();
        prop_assert!(parag.lines() <= letters);
    }
}

// Property: re-laying out one edited paragraph keeps the document stacked
// and matches a layout from scratch
proptest! {
    #[test]
    fn prop_incremental_layout_matches_full(text in lines(), extra in "[a-z ]{1,40}", parag in 0usize..6) {
        let mut doc = document(&text);
        doc.set_width(80);
        doc.format_all();
        assert_stacked(&doc)?;

        let number = parag.min(doc.paragraph_count() - 1);
        let id = doc.parag_by_number(number).unwrap();
        let format = doc.default_format();
        doc.parag_mut(id).unwrap().insert(0, &extra, &format);
        doc.format_parag(id, true);
        doc.format_all();
        assert_stacked(&doc)?;
        prop_assert!(doc.iter().all(|(_, p)| p.is_full_width()));

        let rebuilt: Vec<String> = doc
            .iter()
            .map(|(_, p)| {
                let mut text = p.text();
                text.pop();
                text
            })
            .collect();
        let mut fresh = document(&rebuilt.join("\n"));
        fresh.set_width(80);
        fresh.format_all();
        prop_assert_eq!(fresh.height(), doc.height());
    }
}
