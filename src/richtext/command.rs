// Command history
// Bounded undo/redo stack of reversible edits. Commands address text by
// paragraph number so they stay valid while paragraphs are split and joined.

use super::cursor::Cursor;
use super::document::{Document, TextPos};
use super::format::Format;
use super::text_string::TextChar;

pub const DEFAULT_UNDO_DEPTH: usize = 100;

/// One level of nesting: the table at `index` of paragraph `parag`, cell `cell`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestStep {
    pub parag: usize,
    pub index: usize,
    pub cell: usize,
}

/// A position in a (possibly nested) document, by paragraph number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPos {
    pub path: Vec<NestStep>,
    pub parag: usize,
    pub index: usize,
}

/// Text that is either in the document (`len` cells from `pos`) or held by
/// the command (`cells`). Paragraph breaks are stored as `'\n'` cells.
#[derive(Debug)]
pub struct TextCommand {
    pos: DocPos,
    len: usize,
    cells: Vec<TextChar>,
}

#[derive(Debug)]
pub enum Command {
    InsertText(TextCommand),
    DeleteText(TextCommand),
    FormatChange {
        start: DocPos,
        end: DocPos,
        format: Format,
        mask: u32,
    },
}

impl TextCommand {
    fn locate<'a>(&self, root: &'a mut Document) -> Option<(&'a mut Document, TextPos)> {
        let doc = root.nested_by_path_mut(&self.pos.path)?;
        let parag = doc.parag_by_number(self.pos.parag)?;
        Some((doc, TextPos::new(parag, self.pos.index)))
    }

    /// Take the text out of the document; the cursor ends up where it was
    fn remove(&mut self, root: &mut Document) -> Option<Cursor> {
        let Some((doc, start)) = self.locate(root) else {
            log::warn!("Command: cannot locate {:?}", self.pos);
            return None;
        };
        let end = doc.advance(start, self.len);
        self.cells = doc.remove_range(start, end);
        root.invalidate_path(&self.pos.path);
        Cursor::from_doc_pos(root, &self.pos)
    }

    /// Put the held text back; the cursor ends up after it
    fn restore(&mut self, root: &mut Document) -> Option<Cursor> {
        let Some((doc, start)) = self.locate(root) else {
            log::warn!("Command: cannot locate {:?}", self.pos);
            return None;
        };
        let end = doc.insert_cells_at(start, std::mem::take(&mut self.cells));
        let end = DocPos {
            path: self.pos.path.clone(),
            parag: doc.parag(end.parag)?.number(),
            index: end.index,
        };
        root.invalidate_path(&self.pos.path);
        Cursor::from_doc_pos(root, &end)
    }
}

impl Command {
    /// Text of length `len` that was just inserted at `pos`
    pub fn insert(pos: DocPos, len: usize) -> Self {
        Command::InsertText(TextCommand {
            pos,
            len,
            cells: Vec::new(),
        })
    }

    /// Cells that were just removed from `pos`
    pub fn delete(pos: DocPos, cells: Vec<TextChar>) -> Self {
        Command::DeleteText(TextCommand {
            pos,
            len: cells.len(),
            cells,
        })
    }

    pub fn format_change(start: DocPos, end: DocPos, format: Format, mask: u32) -> Self {
        Command::FormatChange {
            start,
            end,
            format,
            mask,
        }
    }

    /// Apply the command (again)
    pub fn execute(&mut self, root: &mut Document) -> Option<Cursor> {
        match self {
            Command::InsertText(text) => text.restore(root),
            Command::DeleteText(text) => text.remove(root),
            Command::FormatChange {
                start,
                end,
                format,
                mask,
            } => {
                let doc = root.nested_by_path_mut(&start.path)?;
                let from = TextPos::new(doc.parag_by_number(start.parag)?, start.index);
                let to = TextPos::new(doc.parag_by_number(end.parag)?, end.index);
                doc.apply_format(from, to, format, *mask);
                root.invalidate_path(&start.path);
                Cursor::from_doc_pos(root, end)
            }
        }
    }

    /// Revert the command. Format changes cannot be reverted.
    pub fn unexecute(&mut self, root: &mut Document) -> Option<Cursor> {
        match self {
            Command::InsertText(text) => text.remove(root),
            Command::DeleteText(text) => text.restore(root),
            Command::FormatChange { .. } => {
                log::debug!("Command: format changes are not undoable");
                None
            }
        }
    }
}

#[derive(Debug)]
pub struct CommandHistory {
    history: Vec<Command>,
    /// Last applied command; `None` before the first one
    current: Option<usize>,
    steps: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        CommandHistory::new(DEFAULT_UNDO_DEPTH)
    }
}

impl CommandHistory {
    pub fn new(steps: usize) -> Self {
        CommandHistory {
            history: Vec::new(),
            current: None,
            steps: steps.max(1),
        }
    }

    /// Record an already applied command.
    /// Anything that was undone before is dropped.
    pub fn add_command(&mut self, cmd: Command) {
        match self.current {
            Some(idx) => self.history.truncate(idx + 1),
            None => self.history.clear(),
        }

        self.history.push(cmd);

        if self.history.len() > self.steps {
            self.history.remove(0);
        }

        self.current = Some(self.history.len() - 1);
    }

    /// Revert the current command and step back
    pub fn undo(&mut self, root: &mut Document) -> Option<Cursor> {
        let idx = self.current?;
        self.current = idx.checked_sub(1);
        self.history.get_mut(idx)?.unexecute(root)
    }

    /// Step forward and apply that command again
    pub fn redo(&mut self, root: &mut Document) -> Option<Cursor> {
        let next = self.current.map_or(0, |idx| idx + 1);
        let cmd = self.history.get_mut(next)?;
        self.current = Some(next);
        cmd.execute(root)
    }

    pub fn is_undo_available(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_redo_available(&self) -> bool {
        self.current.map_or(0, |idx| idx + 1) < self.history.len()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn set_steps(&mut self, steps: usize) {
        self.steps = steps.max(1);
        while self.history.len() > self.steps {
            self.history.remove(0);
            self.current = self.current.and_then(|idx| idx.checked_sub(1));
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw_context::FixedMetrics;
    use std::rc::Rc;

    fn doc(text: &str) -> Document {
        let mut doc = Document::new(Rc::new(FixedMetrics::default()));
        doc.set_plain_text(text);
        doc
    }

    fn pos(parag: usize, index: usize) -> DocPos {
        DocPos {
            path: Vec::new(),
            parag,
            index,
        }
    }

    #[test]
    fn test_undo_redo_insert() {
        let mut d = doc("hello");
        let first = d.first_parag();
        let f = d.default_format();
        d.parag_mut(first).unwrap().insert(5, "!!", &f);
        let mut history = CommandHistory::default();
        history.add_command(Command::insert(pos(0, 5), 2));

        let c = history.undo(&mut d).unwrap();
        assert_eq!(d.plain_text(), "hello \n");
        assert_eq!(c.index(), 5);
        assert!(!history.is_undo_available());
        assert!(history.is_redo_available());

        let c = history.redo(&mut d).unwrap();
        assert_eq!(d.plain_text(), "hello!! \n");
        assert_eq!(c.index(), 7);
    }

    #[test]
    fn test_undo_delete_across_paragraphs() {
        let mut d = doc("ab\ncd");
        let start = TextPos::new(d.first_parag(), 1);
        let end = TextPos::new(d.last_parag(), 1);
        let cells = d.remove_range(start, end);
        assert_eq!(d.plain_text(), "ad \n");
        let mut history = CommandHistory::default();
        history.add_command(Command::delete(pos(0, 1), cells));

        history.undo(&mut d);
        assert_eq!(d.plain_text(), "ab \ncd \n");
        history.redo(&mut d);
        assert_eq!(d.plain_text(), "ad \n");
    }

    #[test]
    fn test_new_command_drops_redo_tail() {
        let mut d = doc("");
        let mut history = CommandHistory::default();
        let first = d.first_parag();
        let f = d.default_format();
        for (i, s) in ["a", "b", "c"].iter().enumerate() {
            d.parag_mut(first).unwrap().insert(i, s, &f);
            history.add_command(Command::insert(pos(0, i), 1));
        }
        history.undo(&mut d);
        history.undo(&mut d);
        assert_eq!(d.plain_text(), "a \n");
        d.parag_mut(first).unwrap().insert(1, "x", &f);
        history.add_command(Command::insert(pos(0, 1), 1));
        assert_eq!(history.len(), 2);
        assert!(!history.is_redo_available());
    }

    #[test]
    fn test_bounded_size() {
        let mut d = doc("");
        let mut history = CommandHistory::new(3);
        let first = d.first_parag();
        let f = d.default_format();
        for i in 0..5 {
            d.parag_mut(first).unwrap().insert(i, "z", &f);
            history.add_command(Command::insert(pos(0, i), 1));
        }
        assert_eq!(history.len(), 3);
        while history.is_undo_available() {
            history.undo(&mut d);
        }
        assert_eq!(d.plain_text(), "zz \n");
    }

    #[test]
    fn test_format_change_undo_is_a_no_op() {
        let mut d = doc("abc");
        let mut history = CommandHistory::default();
        let mut cmd = Command::format_change(pos(0, 0), pos(0, 2), Format::default().with_bold(true), crate::richtext::format::changes::BOLD);
        cmd.execute(&mut d);
        history.add_command(cmd);
        assert!(history.undo(&mut d).is_none());
        let first = d.first_parag();
        assert!(d.parag(first).unwrap().at(0).unwrap().format().font().bold);
        assert!(history.is_redo_available());
    }
}
