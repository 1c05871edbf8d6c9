// Cursor
// A position in a document tree. Inside a table cell the cursor keeps a
// stack of frames naming the table and cell it descended through, plus the
// offset of the cell's document in root coordinates.

use unicode_segmentation::UnicodeSegmentation;

use super::command::{DocPos, NestStep};
use super::document::{Document, SELECTION_PAREN_MATCH, SELECTION_PAREN_MISMATCH, TextPos};
use super::paragraph::{ParagId, Paragraph};
use super::table::Table;
use super::text_string::{LINE_SEPARATOR, TextChar};

/// The table at `index` of paragraph `parag`, cell `cell`. `ox`/`oy` are
/// the offsets the cursor had before entering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestFrame {
    pub parag: ParagId,
    pub index: usize,
    pub cell: usize,
    pub ox: i32,
    pub oy: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    parag: ParagId,
    index: usize,
    frames: Vec<NestFrame>,
    ox: i32,
    oy: i32,
    /// Column remembered across vertical moves
    tmp_index: Option<usize>,
}

fn matching(c: char) -> char {
    match c {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        ')' => '(',
        ']' => '[',
        '}' => '{',
        other => other,
    }
}

fn is_word(segment: &str) -> bool {
    segment.chars().any(char::is_alphanumeric)
}

/// Character indices where words start, sentinel excluded
fn word_starts(parag: &Paragraph) -> Vec<usize> {
    let text = parag.string().to_string_range(0, parag.length() - 1);
    let mut chars = 0;
    let mut last_byte = 0;
    let mut starts = Vec::new();
    for (byte, segment) in text.split_word_bound_indices() {
        chars += text[last_byte..byte].chars().count();
        last_byte = byte;
        if is_word(segment) {
            starts.push(chars);
        }
    }
    starts
}

fn cell_width(doc: &Document, cell: &TextChar) -> i32 {
    match cell.custom_item() {
        Some(item) if item.is_floating() => 0,
        Some(item) => item.width,
        None => cell.format().width(doc.metrics(), cell.c),
    }
}

impl Cursor {
    /// At the start of the document
    pub fn new(doc: &Document) -> Self {
        Cursor::at(doc.first_parag(), 0)
    }

    /// At (`parag`, `index`) of the root document
    pub fn at(parag: ParagId, index: usize) -> Self {
        Cursor {
            parag,
            index,
            frames: Vec::new(),
            ox: 0,
            oy: 0,
            tmp_index: None,
        }
    }

    pub fn parag(&self) -> ParagId {
        self.parag
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frames(&self) -> &[NestFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Offset of the current document in root coordinates
    pub fn offset(&self) -> (i32, i32) {
        (self.ox, self.oy)
    }

    pub fn text_pos(&self) -> TextPos {
        TextPos::new(self.parag, self.index)
    }

    /// Move within the current document
    pub fn set_position(&mut self, parag: ParagId, index: usize) {
        self.parag = parag;
        self.index = index;
        self.tmp_index = None;
    }

    pub fn document<'a>(&self, root: &'a Document) -> Option<&'a Document> {
        root.nested(&self.frames)
    }

    pub fn document_mut<'a>(&self, root: &'a mut Document) -> Option<&'a mut Document> {
        root.nested_mut(&self.frames)
    }

    fn current<'a>(&self, root: &'a Document) -> Option<&'a Paragraph> {
        self.document(root)?.parag(self.parag)
    }

    pub fn is_valid(&self, root: &Document) -> bool {
        self.current(root).is_some_and(|p| self.index < p.length())
    }

    pub fn at_parag_start(&self) -> bool {
        self.index == 0
    }

    pub fn at_parag_end(&self, root: &Document) -> bool {
        self.current(root).is_some_and(|p| self.index + 1 >= p.length())
    }

    // Nesting

    /// Descend into `cell` of the table at `index` of the current paragraph
    pub fn push(&mut self, root: &Document, index: usize, cell: usize, at_end: bool) -> bool {
        let Some(doc) = self.document(root) else {
            return false;
        };
        let Some(cell_doc) = doc
            .table_at(self.parag, index)
            .and_then(|t| t.cell(cell))
            .map(|c| c.document())
        else {
            return false;
        };
        let (cx, cy) = doc.cell_origin(self.parag, index, cell).unwrap_or((0, 0));
        self.frames.push(NestFrame {
            parag: self.parag,
            index,
            cell,
            ox: self.ox,
            oy: self.oy,
        });
        self.ox += cx;
        self.oy += cy;
        if at_end {
            self.parag = cell_doc.last_parag();
            self.index = cell_doc.parag(self.parag).map(|p| p.length() - 1).unwrap_or(0);
        } else {
            self.parag = cell_doc.first_parag();
            self.index = 0;
        }
        true
    }

    /// Leave the innermost table; the cursor ends up on the table itself
    pub fn pop(&mut self) -> bool {
        let Some(frame) = self.frames.pop() else {
            return false;
        };
        self.parag = frame.parag;
        self.index = frame.index;
        self.ox = frame.ox;
        self.oy = frame.oy;
        true
    }

    /// If the cursor is on a table, enter its first (or last) cell
    pub fn process_nesting(&mut self, root: &Document, at_end: bool) -> bool {
        let Some(cell) = self
            .document(root)
            .and_then(|d| d.table_at(self.parag, self.index))
            .and_then(|t| t.enter(at_end))
        else {
            return false;
        };
        self.push(root, self.index, cell, at_end)
    }

    /// Switch to the cell of the innermost table that `target` picks
    fn move_to_cell(
        &mut self,
        root: &Document,
        target: impl FnOnce(&Table, usize) -> Option<usize>,
        at_end: bool,
    ) -> bool {
        let Some(frame) = self.frames.last().cloned() else {
            return false;
        };
        let Some(next) = root
            .nested(&self.frames[..self.frames.len() - 1])
            .and_then(|d| d.table_at(frame.parag, frame.index))
            .and_then(|t| target(t, frame.cell))
        else {
            return false;
        };
        self.pop();
        self.push(root, frame.index, next, at_end)
    }

    // Character and word moves

    pub fn goto_left(&mut self, root: &Document) {
        self.tmp_index = None;
        let Some(doc) = self.document(root) else {
            return;
        };
        let Some(parag) = doc.parag(self.parag) else {
            return;
        };
        if self.index > 0 {
            self.index -= 1;
            self.process_nesting(root, true);
        } else if let Some(prev) = parag.prev() {
            self.parag = prev;
            self.index = doc.parag(prev).map(|p| p.length() - 1).unwrap_or(0);
        } else if !self.frames.is_empty() && !self.move_to_cell(root, Table::prev, true) {
            self.pop();
        }
    }

    pub fn goto_right(&mut self, root: &Document) {
        self.tmp_index = None;
        if self.process_nesting(root, false) {
            return;
        }
        let Some(parag) = self.current(root) else {
            return;
        };
        if self.index + 1 < parag.length() {
            self.index += 1;
        } else if let Some(next) = parag.next() {
            self.parag = next;
            self.index = 0;
        } else if !self.frames.is_empty() && !self.move_to_cell(root, Table::next, false) {
            self.pop();
            self.index += 1;
        }
    }

    /// Start of the next word, or the next paragraph from the end of one
    pub fn goto_word_right(&mut self, root: &Document) {
        self.tmp_index = None;
        let Some(parag) = self.current(root) else {
            return;
        };
        let last = parag.length() - 1;
        if self.index >= last {
            if let Some(next) = parag.next() {
                self.parag = next;
                self.index = 0;
            }
            return;
        }
        self.index = word_starts(parag)
            .into_iter()
            .find(|start| *start > self.index)
            .unwrap_or(last);
    }

    /// Start of the current or previous word
    pub fn goto_word_left(&mut self, root: &Document) {
        self.tmp_index = None;
        let Some(doc) = self.document(root) else {
            return;
        };
        let Some(parag) = doc.parag(self.parag) else {
            return;
        };
        if self.index == 0 {
            if let Some(prev) = parag.prev() {
                self.parag = prev;
                self.index = doc.parag(prev).map(|p| p.length() - 1).unwrap_or(0);
            }
            return;
        }
        self.index = word_starts(parag)
            .into_iter()
            .rev()
            .find(|start| *start < self.index)
            .unwrap_or(0);
    }

    /// Start of the current document
    pub fn goto_doc_start(&mut self, root: &Document) {
        self.tmp_index = None;
        if let Some(doc) = self.document(root) {
            self.parag = doc.first_parag();
            self.index = 0;
        }
    }

    /// End of the current document
    pub fn goto_doc_end(&mut self, root: &Document) {
        self.tmp_index = None;
        if let Some(doc) = self.document(root) {
            self.parag = doc.last_parag();
            self.index = doc.parag(self.parag).map(|p| p.length() - 1).unwrap_or(0);
        }
    }

    // Moves that need layout

    pub fn goto_line_start(&mut self, root: &mut Document) {
        self.tmp_index = None;
        let Some(doc) = root.nested_mut(&self.frames) else {
            return;
        };
        if let Some((_, start)) = doc.line_of_char(self.parag, self.index) {
            self.index = start;
        }
    }

    pub fn goto_line_end(&mut self, root: &mut Document) {
        self.tmp_index = None;
        let Some(doc) = root.nested_mut(&self.frames) else {
            return;
        };
        let Some((line, _)) = doc.line_of_char(self.parag, self.index) else {
            return;
        };
        if let Some(end) = doc.parag(self.parag).and_then(|p| p.line_end_of_line(line)) {
            self.index = end - 1;
        }
    }

    /// One line up, keeping the widest column seen since the last
    /// horizontal move
    pub fn goto_up(&mut self, root: &mut Document) {
        let Some(doc) = root.nested_mut(&self.frames) else {
            return;
        };
        doc.ensure_formatted(self.parag);
        let Some(parag) = doc.parag(self.parag) else {
            return;
        };
        let Some((line, line_start)) = parag.line_of_char(self.index) else {
            return;
        };
        let col = self.tmp_index.unwrap_or(0).max(self.index - line_start);
        self.tmp_index = Some(col);

        if line > 0 {
            if let Some((prev_start, _)) = parag.line_start_of_line(line - 1) {
                self.index = (prev_start + col).min(line_start - 1);
            }
            return;
        }
        if let Some(prev) = parag.prev() {
            let Some(above) = doc.parag(prev) else {
                return;
            };
            let last_line = above.lines().saturating_sub(1);
            let start = above.line_start_of_line(last_line).map(|(s, _)| s).unwrap_or(0);
            self.parag = prev;
            self.index = (start + col).min(above.length() - 1);
            return;
        }
        if self.frames.is_empty() {
            return;
        }
        if !self.move_to_cell(root, Table::up, true) {
            self.pop();
            self.goto_up(root);
        }
    }

    pub fn goto_down(&mut self, root: &mut Document) {
        let Some(doc) = root.nested_mut(&self.frames) else {
            return;
        };
        doc.ensure_formatted(self.parag);
        let Some(parag) = doc.parag(self.parag) else {
            return;
        };
        let Some((line, line_start)) = parag.line_of_char(self.index) else {
            return;
        };
        let col = self.tmp_index.unwrap_or(0).max(self.index - line_start);
        self.tmp_index = Some(col);

        if line + 1 < parag.lines() {
            if let (Some((next_start, _)), Some(end)) =
                (parag.line_start_of_line(line + 1), parag.line_end_of_line(line + 1))
            {
                self.index = (next_start + col).min(end - 1);
            }
            return;
        }
        if let Some(next) = parag.next() {
            doc.ensure_formatted(next);
            let Some(below) = doc.parag(next) else {
                return;
            };
            let end = below.line_end_of_line(0).unwrap_or(below.length());
            self.parag = next;
            self.index = col.min(end - 1);
            return;
        }
        if self.frames.is_empty() {
            return;
        }
        if !self.move_to_cell(root, Table::down, false) {
            self.pop();
            self.goto_down(root);
        }
    }

    /// First paragraph at least `visible_height` above the current one
    pub fn goto_page_up(&mut self, root: &mut Document, visible_height: i32) {
        self.tmp_index = None;
        let Some(doc) = root.nested_mut(&self.frames) else {
            return;
        };
        doc.format_all();
        let Some(y) = doc.parag(self.parag).map(|p| p.rect().y) else {
            return;
        };
        let target = y - visible_height;
        let mut id = self.parag;
        while let Some(prev) = doc.parag(id).and_then(|p| p.prev()) {
            if doc.parag(prev).is_none_or(|p| p.rect().y < target) {
                break;
            }
            id = prev;
        }
        self.parag = id;
        self.index = 0;
    }

    /// Last paragraph starting within `visible_height` below the current one
    pub fn goto_page_down(&mut self, root: &mut Document, visible_height: i32) {
        self.tmp_index = None;
        let Some(doc) = root.nested_mut(&self.frames) else {
            return;
        };
        doc.format_all();
        let Some(y) = doc.parag(self.parag).map(|p| p.rect().y) else {
            return;
        };
        let target = y + visible_height;
        let mut id = self.parag;
        while let Some(next) = doc.parag(id).and_then(|p| p.next()) {
            if doc.parag(next).is_none_or(|p| p.rect().y > target) {
                break;
            }
            id = next;
        }
        self.parag = id;
        self.index = 0;
    }

    // Editing. Each edit lays the touched paragraph out again.

    fn insert_run(&mut self, doc: &mut Document, text: &str) {
        let Some(parag) = doc.parag_mut(self.parag) else {
            return;
        };
        let before = if self.index > 0 { self.index - 1 } else { 0 };
        let Some(format) = parag.at(before).map(|c| c.format().clone()) else {
            return;
        };
        parag.insert(self.index, text, &format);
        self.index = (self.index + text.chars().count()).min(parag.length() - 1);
    }

    /// Insert text at the cursor and move past it. With `check_newline`,
    /// `'\n'` splits the paragraph; otherwise it becomes a line break.
    pub fn insert(&mut self, root: &mut Document, text: &str, check_newline: bool) {
        self.tmp_index = None;
        let frames = self.frames.clone();
        let Some(doc) = root.nested_mut(&frames) else {
            log::warn!("Cursor::insert: cursor is not inside the document");
            return;
        };
        if check_newline {
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    self.parag = doc.split_parag(self.parag, self.index, true);
                    self.index = 0;
                }
                self.insert_run(doc, line);
            }
        } else {
            let text = text.replace('\n', &LINE_SEPARATOR.to_string());
            self.insert_run(doc, &text);
        }
        doc.format_edited(self.parag);
        root.invalidate_nesting(&frames);
    }

    /// Delete the character after the cursor. Returns true if that joined
    /// two paragraphs.
    pub fn remove(&mut self, root: &mut Document) -> bool {
        self.tmp_index = None;
        let frames = self.frames.clone();
        let Some(doc) = root.nested_mut(&frames) else {
            return false;
        };
        let Some(len) = doc.parag(self.parag).map(|p| p.length()) else {
            return false;
        };
        let joined = if self.index + 1 < len {
            doc.remove_cells(self.parag, self.index, 1);
            false
        } else if doc.join(self.parag) {
            true
        } else {
            return false;
        };
        doc.format_edited(self.parag);
        root.invalidate_nesting(&frames);
        joined
    }

    /// Delete to the end of the line; at the end of a paragraph join the
    /// next one
    pub fn kill(&mut self, root: &mut Document) {
        if self.at_parag_end(root) {
            self.remove(root);
            return;
        }
        let frames = self.frames.clone();
        let Some(doc) = root.nested_mut(&frames) else {
            return;
        };
        let end = doc
            .line_of_char(self.parag, self.index)
            .and_then(|(line, _)| doc.parag(self.parag)?.line_end_of_line(line))
            .unwrap_or(usize::MAX);
        doc.remove_cells(self.parag, self.index, end.saturating_sub(self.index));
        doc.format_edited(self.parag);
        root.invalidate_nesting(&frames);
    }

    /// Split the paragraph at the cursor and move to the start of the
    /// second half. With `indent` the new paragraph copies the leading
    /// whitespace of the one before it.
    pub fn split_and_insert_empty_parag(&mut self, root: &mut Document, indent: bool, renumber: bool) -> bool {
        self.tmp_index = None;
        let frames = self.frames.clone();
        let Some(doc) = root.nested_mut(&frames) else {
            return false;
        };
        if doc.parag(self.parag).is_none() {
            return false;
        }
        self.parag = doc.split_parag(self.parag, self.index, renumber);
        self.index = 0;
        if indent {
            let leading: String = doc
                .parag(self.parag)
                .and_then(|p| p.prev())
                .and_then(|prev| doc.parag(prev))
                .map(|p| {
                    p.string()
                        .chars()
                        .iter()
                        .take(p.length() - 1)
                        .map(|c| c.c)
                        .take_while(|c| *c == ' ' || *c == '\t')
                        .collect()
                })
                .unwrap_or_default();
            if !leading.is_empty() {
                self.insert_run(doc, &leading);
            }
        }
        doc.format_edited(self.parag);
        root.invalidate_nesting(&frames);
        true
    }

    // Brackets

    /// Mark the bracket pair around the cursor: an opening bracket at the
    /// cursor or a closing one just before it. Returns true if the other
    /// bracket was found, matching or not.
    pub fn check_parens(&mut self, root: &mut Document) -> bool {
        let frames = self.frames.clone();
        let Some(doc) = root.nested_mut(&frames) else {
            return false;
        };
        doc.remove_selection(SELECTION_PAREN_MATCH);
        doc.remove_selection(SELECTION_PAREN_MISMATCH);
        let Some(parag) = doc.parag(self.parag) else {
            return false;
        };
        let here = parag.at(self.index).map(|c| c.c);
        let before = self
            .index
            .checked_sub(1)
            .and_then(|i| parag.at(i))
            .map(|c| c.c);
        match (here, before) {
            (Some(c @ ('(' | '[' | '{')), _) => self.check_open_paren(doc, c),
            (_, Some(c @ (')' | ']' | '}'))) => self.check_closed_paren(doc, c),
            _ => false,
        }
    }

    fn check_open_paren(&self, doc: &mut Document, open: char) -> bool {
        let mut depth = 0;
        let mut cur = Some(self.parag);
        while let Some(id) = cur {
            let Some(parag) = doc.parag_mut(id) else {
                return false;
            };
            let parens = parag.paren_list().to_vec();
            for paren in parens.iter().filter(|p| id != self.parag || p.pos > self.index) {
                if paren.open {
                    depth += 1;
                } else if depth > 0 {
                    depth -= 1;
                } else {
                    let sid = if matching(open) == paren.c {
                        SELECTION_PAREN_MATCH
                    } else {
                        SELECTION_PAREN_MISMATCH
                    };
                    doc.set_selection(sid, self.text_pos(), TextPos::new(id, paren.pos + 1));
                    return true;
                }
            }
            cur = doc.parag(id).and_then(|p| p.next());
        }
        false
    }

    fn check_closed_paren(&self, doc: &mut Document, close: char) -> bool {
        let close_pos = self.index - 1;
        let mut depth = 0;
        let mut cur = Some(self.parag);
        while let Some(id) = cur {
            let Some(parag) = doc.parag_mut(id) else {
                return false;
            };
            let parens = parag.paren_list().to_vec();
            for paren in parens.iter().rev().filter(|p| id != self.parag || p.pos < close_pos) {
                if !paren.open {
                    depth += 1;
                } else if depth > 0 {
                    depth -= 1;
                } else {
                    let sid = if matching(close) == paren.c {
                        SELECTION_PAREN_MATCH
                    } else {
                        SELECTION_PAREN_MISMATCH
                    };
                    doc.set_selection(sid, TextPos::new(id, paren.pos), self.text_pos());
                    return true;
                }
            }
            cur = doc.parag(id).and_then(|p| p.prev());
        }
        false
    }

    // Geometry

    /// Put the cursor at the character nearest to (`x`, `y`) in root
    /// coordinates, descending into tables under the point
    pub fn place(&mut self, root: &mut Document, x: i32, y: i32) {
        root.format_all();
        let root: &Document = root;
        self.frames.clear();
        self.ox = 0;
        self.oy = 0;
        self.tmp_index = None;
        loop {
            let Some(doc) = self.document(root) else {
                return;
            };
            let (lx, ly) = (x - self.ox, y - self.oy);
            let id = doc.parag_at_y(ly);
            let Some(parag) = doc.parag(id) else {
                return;
            };
            let py = ly - parag.rect().y;
            let lines = parag.lines();
            let mut line = 0;
            for i in 0..lines {
                line = i;
                if parag
                    .line_start_of_line(i)
                    .is_some_and(|(_, ls)| py < ls.y + ls.h)
                {
                    break;
                }
            }
            let start = parag.line_start_of_line(line).map(|(s, _)| s).unwrap_or(0);
            let end = parag.line_end_of_line(line).unwrap_or(parag.length());
            let px = lx - parag.rect().x;

            let mut best = start;
            let mut best_dist = i32::MAX;
            let mut table = None;
            for i in start..end {
                let Some(cell) = parag.at(i) else {
                    break;
                };
                if let Some(item) = cell.custom_item() {
                    if item.is_floating() {
                        continue;
                    }
                    if item.is_nested()
                        && let Some((ix, iy)) = doc.item_origin(id, i)
                        && lx >= ix
                        && lx < ix + item.width
                        && ly >= iy
                        && ly < iy + item.height
                    {
                        table = Some((i, lx - ix, ly - iy));
                        break;
                    }
                }
                let w = cell_width(doc, cell);
                let edge = if cell.right_to_left { cell.x + w } else { cell.x };
                let dist = (px - edge).abs();
                if dist < best_dist {
                    best = i;
                    best_dist = dist;
                }
            }

            self.parag = id;
            match table {
                Some((index, tx, ty)) => {
                    let Some(cell) = doc.table_at(id, index).and_then(|t| t.enter_at(tx, ty)) else {
                        self.index = index;
                        return;
                    };
                    if !self.push(root, index, cell, false) {
                        self.index = index;
                        return;
                    }
                }
                None => {
                    self.index = best;
                    return;
                }
            }
        }
    }

    /// (x, y, height) of the cursor bar in root coordinates, from the
    /// current layout
    pub fn geometry(&self, root: &Document) -> Option<(i32, i32, i32)> {
        let doc = self.document(root)?;
        let parag = doc.parag(self.parag)?;
        let (_, line) = parag.line_start_of_char(self.index)?;
        let cell = parag.at(self.index)?;
        let x = if cell.right_to_left {
            cell.x + cell_width(doc, cell)
        } else {
            cell.x
        };
        Some((
            self.ox + parag.rect().x + x,
            self.oy + parag.rect().y + line.y,
            line.h,
        ))
    }

    pub fn x(&self, root: &Document) -> i32 {
        self.geometry(root).map(|(x, _, _)| x).unwrap_or(0)
    }

    pub fn y(&self, root: &Document) -> i32 {
        self.geometry(root).map(|(_, y, _)| y).unwrap_or(0)
    }

    // Positions by paragraph number

    pub fn doc_pos(&self, root: &Document) -> Option<DocPos> {
        let mut path = Vec::with_capacity(self.frames.len());
        let mut doc = root;
        for frame in &self.frames {
            path.push(NestStep {
                parag: doc.parag(frame.parag)?.number(),
                index: frame.index,
                cell: frame.cell,
            });
            doc = doc.table_at(frame.parag, frame.index)?.cell(frame.cell)?.document();
        }
        Some(DocPos {
            path,
            parag: doc.parag(self.parag)?.number(),
            index: self.index,
        })
    }

    pub fn from_doc_pos(root: &Document, pos: &DocPos) -> Option<Cursor> {
        let mut cursor = Cursor::new(root);
        for step in &pos.path {
            cursor.parag = cursor.document(root)?.parag_by_number(step.parag)?;
            if !cursor.push(root, step.index, step.cell, false) {
                return None;
            }
        }
        let doc = cursor.document(root)?;
        cursor.parag = doc.parag_by_number(pos.parag)?;
        let len = doc.parag(cursor.parag)?.length();
        cursor.index = pos.index.min(len - 1);
        Some(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw_context::FixedMetrics;
    use crate::richtext::custom_item::{CustomItem, Placement};
    use std::rc::Rc;

    fn doc(text: &str, width: i32) -> Document {
        let mut doc = Document::new(Rc::new(FixedMetrics::default()));
        doc.set_plain_text(text);
        doc.set_width(width);
        doc.do_layout();
        doc
    }

    /// "a", a 2x2 table, "b"
    fn doc_with_table() -> Document {
        let mut root = doc("ab", 300);
        let mut table = Table::new();
        for (row, text) in [(0, "a"), (0, "b"), (1, "c"), (1, "d")] {
            let mut cell = root.new_nested();
            cell.set_plain_text(text);
            table.add_cell(cell, row, 1, 1);
        }
        let id = root.alloc_item_id();
        let first = root.first_parag();
        root.insert_custom_item(first, 1, CustomItem::table(id, table, Placement::Inline));
        root.do_layout();
        root
    }

    #[test]
    fn test_left_right_cross_paragraphs() {
        let d = doc("ab\ncd", 100);
        let mut c = Cursor::at(d.first_parag(), 2);
        c.goto_right(&d);
        assert_eq!((c.parag(), c.index()), (d.last_parag(), 0));
        c.goto_left(&d);
        assert_eq!((c.parag(), c.index()), (d.first_parag(), 2));
        c.goto_doc_start(&d);
        assert_eq!(c.index(), 0);
        c.goto_left(&d);
        assert_eq!((c.parag(), c.index()), (d.first_parag(), 0));
        c.goto_doc_end(&d);
        assert_eq!((c.parag(), c.index()), (d.last_parag(), 2));
        assert!(c.at_parag_end(&d));
    }

    #[test]
    fn test_word_moves() {
        let d = doc("hello world foo\nnext", 400);
        let mut c = Cursor::new(&d);
        c.goto_word_right(&d);
        assert_eq!(c.index(), 6);
        c.goto_word_right(&d);
        assert_eq!(c.index(), 12);
        c.goto_word_right(&d);
        assert_eq!(c.index(), 15);
        c.goto_word_right(&d);
        assert_eq!((c.parag(), c.index()), (d.last_parag(), 0));
        c.goto_word_left(&d);
        assert_eq!((c.parag(), c.index()), (d.first_parag(), 15));
        c.goto_word_left(&d);
        assert_eq!(c.index(), 12);
        c.goto_word_left(&d);
        assert_eq!(c.index(), 6);
    }

    #[test]
    fn test_vertical_moves_remember_column() {
        let mut d = doc("abcdef\nab\nabcdef", 400);
        let mut c = Cursor::at(d.first_parag(), 5);
        c.goto_down(&mut d);
        assert_eq!(c.index(), 2);
        c.goto_down(&mut d);
        assert_eq!((c.parag(), c.index()), (d.last_parag(), 5));
        c.goto_up(&mut d);
        c.goto_up(&mut d);
        assert_eq!((c.parag(), c.index()), (d.first_parag(), 5));
        c.goto_up(&mut d);
        assert_eq!(c.index(), 5);
    }

    #[test]
    fn test_line_start_and_end_on_wrapped_paragraph() {
        let mut d = doc("aaaa bbbb", 48);
        let first = d.first_parag();
        assert_eq!(d.lines(first), 2);
        let mut c = Cursor::at(first, 7);
        c.goto_line_start(&mut d);
        assert_eq!(c.index(), 5);
        c.goto_line_end(&mut d);
        assert_eq!(c.index(), 9);
        let mut c = Cursor::at(first, 2);
        c.goto_line_end(&mut d);
        assert_eq!(c.index(), 4);
        c.goto_down(&mut d);
        assert_eq!(c.index(), 9);
    }

    #[test]
    fn test_page_moves() {
        let mut d = doc("a\nb\nc\nd\ne", 100);
        let mut c = Cursor::new(&d);
        c.goto_page_down(&mut d, 30);
        assert_eq!(d.parag(c.parag()).unwrap().number(), 2);
        c.goto_page_up(&mut d, 15);
        assert_eq!(d.parag(c.parag()).unwrap().number(), 1);
    }

    #[test]
    fn test_entering_and_leaving_tables() {
        let mut d = doc_with_table();
        let first = d.first_parag();
        let mut c = Cursor::at(first, 1);
        c.goto_right(&d);
        assert_eq!(c.depth(), 1);
        assert_eq!(c.frames()[0].cell, 0);
        c.goto_right(&d);
        assert_eq!(c.index(), 1);
        c.goto_right(&d);
        assert_eq!((c.frames()[0].cell, c.index()), (1, 0));

        let pos = c.doc_pos(&d).unwrap();
        assert_eq!(pos.path, vec![NestStep { parag: 0, index: 1, cell: 1 }]);
        assert_eq!(Cursor::from_doc_pos(&d, &pos).unwrap().frames()[0].cell, 1);

        c.goto_down(&mut d);
        assert_eq!(c.frames()[0].cell, 3);
        c.goto_down(&mut d);
        assert_eq!(c.depth(), 0);
        assert_eq!((c.parag(), c.index()), (first, 2));

        let mut c = Cursor::at(first, 1);
        c.goto_right(&d);
        c.goto_left(&d);
        assert_eq!((c.depth(), c.index()), (0, 1));
        c.goto_right(&d);
        c.goto_doc_end(&d);
        for _ in 0..6 {
            c.goto_right(&d);
            assert_eq!(c.depth(), 1);
        }
        c.goto_right(&d);
        assert_eq!((c.depth(), c.index()), (0, 2));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut d = doc("ac", 100);
        let mut c = Cursor::at(d.first_parag(), 1);
        c.insert(&mut d, "b", true);
        assert_eq!(c.index(), 2);
        assert_eq!(d.plain_text(), "abc \n");
        c.insert(&mut d, "\n", true);
        assert_eq!(d.plain_text(), "ab \nc \n");
        assert_eq!((c.parag(), c.index()), (d.last_parag(), 0));
        assert!(d.parag(d.last_parag()).unwrap().is_valid());

        let mut c = Cursor::at(d.first_parag(), 2);
        assert!(c.remove(&mut d));
        assert_eq!(d.plain_text(), "abc \n");
        c.set_position(d.first_parag(), 3);
        assert!(!c.remove(&mut d));
        c.set_position(d.first_parag(), 0);
        assert!(!c.remove(&mut d));
        assert_eq!(d.plain_text(), "bc \n");
    }

    #[test]
    fn test_insert_without_newline_check_makes_line_break() {
        let mut d = doc("", 100);
        let mut c = Cursor::new(&d);
        c.insert(&mut d, "a\nb", false);
        assert_eq!(d.paragraph_count(), 1);
        assert_eq!(d.plain_text(), "a\nb \n");
    }

    #[test]
    fn test_kill_and_split_with_indent() {
        let mut d = doc("  abc def", 400);
        let first = d.first_parag();
        let mut c = Cursor::at(first, 5);
        assert!(c.split_and_insert_empty_parag(&mut d, true, true));
        assert_eq!(d.plain_text(), "  abc \n   def \n");
        assert_eq!(c.index(), 2);
        c.kill(&mut d);
        assert_eq!(d.plain_text(), "  abc \n   \n");
        c.set_position(first, 5);
        c.kill(&mut d);
        assert_eq!(d.plain_text(), "  abc   \n");
    }

    #[test]
    fn test_check_parens() {
        let mut d = doc("(ab)", 100);
        let first = d.first_parag();
        let mut c = Cursor::at(first, 0);
        assert!(c.check_parens(&mut d));
        let sel = *d.selection(SELECTION_PAREN_MATCH).unwrap();
        assert_eq!((sel.start.index, sel.end.index), (0, 4));

        c.set_position(first, 4);
        assert!(c.check_parens(&mut d));
        assert!(d.selection(SELECTION_PAREN_MATCH).is_some());

        let mut d = doc("(a]", 100);
        let mut c = Cursor::new(&d);
        assert!(c.check_parens(&mut d));
        assert!(d.selection(SELECTION_PAREN_MISMATCH).is_some());
        assert!(d.selection(SELECTION_PAREN_MATCH).is_none());
        c.set_position(d.first_parag(), 1);
        assert!(!c.check_parens(&mut d));
    }

    #[test]
    fn test_place_and_geometry() {
        let mut d = doc("abc\ndef", 100);
        let mut c = Cursor::new(&d);
        c.place(&mut d, 17, 20);
        assert_eq!((c.parag(), c.index()), (d.last_parag(), 2));
        assert_eq!(c.geometry(&d), Some((16, 15, 15)));
        c.place(&mut d, 500, 5);
        assert_eq!((c.parag(), c.index()), (d.first_parag(), 3));
    }

    #[test]
    fn test_place_descends_into_table() {
        let mut d = doc_with_table();
        let first = d.first_parag();
        let (tx, ty) = d.item_origin(first, 1).unwrap();
        let mut c = Cursor::new(&d);
        c.place(&mut d, tx + 4, ty + 4);
        assert_eq!(c.depth(), 1);
        assert_eq!(c.frames()[0].cell, 0);
        let (x, y, _) = c.geometry(&d).unwrap();
        assert!(x >= tx && y >= ty);
    }
}
