// Paragraph
// One block of text: owns its character buffer, caches its line starts and
// tracks which part of it needs to be laid out again.

use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

use crate::draw_context::Rect;

use super::bidi::{BidiContext, BidiStatus};
use super::custom_item::{CustomItem, ItemId};
use super::format::FormatRef;
use super::style_sheet::{Alignment, ListStyle, StyleStack};
use super::text_string::{TextChar, TextString};

/// Stable handle of a paragraph inside its document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParagId {
    slot: u32,
    generation: u32,
}

/// Cached geometry of one visual line
#[derive(Debug, Clone, PartialEq)]
pub struct LineStart {
    /// Offset from the paragraph's top
    pub y: i32,
    pub h: i32,
    pub baseline: i32,
    /// Width actually used by the line's characters
    pub w: i32,
    pub context: Option<BidiContext>,
    pub status: BidiStatus,
}

impl LineStart {
    pub fn new(y: i32, baseline: i32, h: i32) -> Self {
        LineStart {
            y,
            h,
            baseline,
            w: 0,
            context: None,
            status: BidiStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    Clean,
    /// Lowest character index that needs formatting again
    Dirty(usize),
}

/// Bracket position used for paren matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paren {
    pub open: bool,
    pub c: char,
    pub pos: usize,
}

#[derive(Debug)]
pub struct Paragraph {
    pub(crate) string: TextString,
    pub(crate) prev: Option<ParagId>,
    pub(crate) next: Option<ParagId>,
    number: usize,
    line_starts: BTreeMap<usize, LineStart>,
    state: LayoutState,
    pub(crate) rect: Rect,
    style: StyleStack,
    alignment: Alignment,
    list_value: Option<i32>,
    pub(crate) floating: Vec<ItemId>,
    full_width: bool,
    need_highlight: bool,
    end_state: i32,
    changed: bool,
    no_wrap: bool,
    parens: Option<Vec<Paren>>,
    pub(crate) extra_margin_left: i32,
    pub(crate) extra_margin_right: i32,
    pub(crate) extra_margin_top: i32,
    pub(crate) extra_margin_bottom: i32,
}

impl Paragraph {
    /// New paragraph holding only the sentinel space
    pub fn new(default_format: &FormatRef) -> Self {
        let mut string = TextString::new();
        string.insert(0, " ", default_format);
        Paragraph {
            string,
            prev: None,
            next: None,
            number: 0,
            line_starts: BTreeMap::new(),
            state: LayoutState::Dirty(0),
            rect: Rect::default(),
            style: StyleStack::new(),
            alignment: Alignment::Auto,
            list_value: None,
            floating: Vec::new(),
            full_width: true,
            need_highlight: true,
            end_state: -1,
            changed: true,
            no_wrap: false,
            parens: None,
            extra_margin_left: 0,
            extra_margin_right: 0,
            extra_margin_top: 0,
            extra_margin_bottom: 0,
        }
    }

    pub fn string(&self) -> &TextString {
        &self.string
    }

    pub fn length(&self) -> usize {
        self.string.length()
    }

    pub fn at(&self, index: usize) -> Option<&TextChar> {
        self.string.at(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut TextChar> {
        self.string.at_mut(index)
    }

    /// Text including the trailing sentinel space
    pub fn text(&self) -> String {
        self.string.to_string()
    }

    pub fn prev(&self) -> Option<ParagId> {
        self.prev
    }

    pub fn next(&self) -> Option<ParagId> {
        self.next
    }

    /// 0-based position in the document
    pub fn number(&self) -> usize {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: usize) {
        self.number = number;
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == LayoutState::Clean
    }

    pub fn is_full_width(&self) -> bool {
        self.full_width
    }

    pub(crate) fn set_full_width(&mut self, full_width: bool) {
        self.full_width = full_width;
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Mark the paragraph dirty from `from` onward. The dirty region only
    /// ever widens until the next format.
    pub fn invalidate(&mut self, from: usize) {
        self.state = match self.state {
            LayoutState::Dirty(current) if current <= from => LayoutState::Dirty(current),
            _ => LayoutState::Dirty(from),
        };
        self.parens = None;
        if !self.floating.is_empty() {
            for cell in self.string.chars_mut() {
                if let Some(item) = cell.custom_item_mut()
                    && item.is_floating()
                {
                    item.xpos = -1;
                    item.ypos = -1;
                }
            }
        }
    }

    pub(crate) fn mark_clean(&mut self) {
        self.state = LayoutState::Clean;
        self.changed = true;
    }

    pub(crate) fn move_by(&mut self, dy: i32) {
        self.rect.y += dy;
    }

    pub fn line_starts(&self) -> &BTreeMap<usize, LineStart> {
        &self.line_starts
    }

    pub(crate) fn set_line_starts(&mut self, line_starts: BTreeMap<usize, LineStart>) {
        self.line_starts = line_starts;
    }

    pub fn style(&self) -> &StyleStack {
        &self.style
    }

    pub fn set_style(&mut self, style: StyleStack) {
        self.style = style;
        self.invalidate(0);
    }

    pub fn alignment(&self) -> Alignment {
        if self.alignment == Alignment::Auto {
            self.style.alignment()
        } else {
            self.alignment
        }
    }

    /// The paragraph's own alignment, `Auto` if it defers to its style
    pub fn alignment_setting(&self) -> Alignment {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.alignment = alignment;
        self.invalidate(0);
    }

    pub fn list_value(&self) -> Option<i32> {
        self.list_value
    }

    pub fn set_list_value(&mut self, value: Option<i32>) {
        self.list_value = value;
    }

    pub fn is_list_item(&self) -> bool {
        self.style
            .top()
            .is_some_and(|item| item.is_list() || item.name == "li")
            && self.style.list_depth() > 0
    }

    pub fn list_style(&self) -> Option<ListStyle> {
        self.style.list_style()
    }

    pub fn list_depth(&self) -> usize {
        self.style.list_depth()
    }

    pub fn no_wrap(&self) -> bool {
        self.no_wrap
    }

    pub fn set_no_wrap(&mut self, no_wrap: bool) {
        self.no_wrap = no_wrap;
        self.invalidate(0);
    }

    pub fn needs_highlight(&self) -> bool {
        self.need_highlight
    }

    pub(crate) fn set_need_highlight(&mut self, need: bool) {
        self.need_highlight = need;
    }

    pub fn end_state(&self) -> i32 {
        self.end_state
    }

    pub(crate) fn set_end_state(&mut self, state: i32) {
        self.end_state = state;
    }

    pub fn left_margin(&self) -> i32 {
        self.style.margin_left() + self.extra_margin_left
    }

    pub fn right_margin(&self) -> i32 {
        self.style.margin_right() + self.extra_margin_right
    }

    pub fn top_margin(&self, spacing: i32) -> i32 {
        self.style.margin_top().max(spacing) + self.extra_margin_top
    }

    pub fn bottom_margin(&self, spacing: i32) -> i32 {
        self.style.margin_bottom().max(spacing) + self.extra_margin_bottom
    }

    /// Text plus the invalidation bookkeeping every mutation needs
    pub fn insert(&mut self, index: usize, text: &str, format: &FormatRef) {
        let index = index.min(self.length().saturating_sub(1));
        self.string.insert(index, text, format);
        self.invalidate(index.saturating_sub(1));
        self.need_highlight = true;
    }

    pub fn insert_cell(&mut self, index: usize, cell: TextChar) {
        let index = index.min(self.length().saturating_sub(1));
        self.remember_floating(std::slice::from_ref(&cell));
        self.string.insert_char(index, cell);
        self.invalidate(index.saturating_sub(1));
        self.need_highlight = true;
    }

    pub fn insert_cells(&mut self, index: usize, cells: Vec<TextChar>) {
        let index = index.min(self.length().saturating_sub(1));
        self.remember_floating(&cells);
        self.string.insert_cells(index, cells);
        self.invalidate(index.saturating_sub(1));
        self.need_highlight = true;
    }

    /// Remove cells; the sentinel is never removed. Custom items of the
    /// removed cells travel with the returned cells.
    pub fn remove(&mut self, index: usize, len: usize) -> Vec<TextChar> {
        let last = self.length().saturating_sub(1);
        if index >= last {
            return Vec::new();
        }
        let len = len.min(last - index);
        let removed = self.string.remove(index, len);
        self.forget_floating(&removed);
        self.invalidate(index.saturating_sub(1));
        self.need_highlight = true;
        removed
    }

    /// Drop everything from `index` on and re-append the sentinel
    pub fn truncate(&mut self, index: usize) -> Vec<TextChar> {
        if index + 1 >= self.length() {
            return Vec::new();
        }
        let sentinel_format = self
            .string
            .at(self.length().saturating_sub(1))
            .map(|c| c.format().clone());
        let mut removed = self.string.truncate(index);
        if removed.last().is_some_and(|c| c.c == ' ' && !c.is_custom()) {
            removed.pop();
        }
        self.forget_floating(&removed);
        if let Some(format) = sentinel_format {
            self.string.insert(self.length(), " ", &format);
        }
        self.invalidate(index.saturating_sub(1));
        self.need_highlight = true;
        removed
    }

    fn remember_floating(&mut self, cells: &[TextChar]) {
        for cell in cells {
            if let Some(item) = cell.custom_item()
                && item.is_floating()
                && !self.floating.contains(&item.id())
            {
                self.floating.push(item.id());
            }
        }
    }

    pub(crate) fn forget_floating(&mut self, removed: &[TextChar]) {
        for cell in removed {
            if let Some(item) = cell.custom_item() {
                self.floating.retain(|id| *id != item.id());
            }
        }
    }

    pub fn set_format(&mut self, index: usize, len: usize, format: &FormatRef) {
        let end = (index + len).min(self.length());
        for i in index..end {
            self.string.set_format(i, format);
        }
        self.invalidate(index.saturating_sub(1));
    }

    /// Floating items anchored in this paragraph
    pub fn floating_items(&self) -> &[ItemId] {
        &self.floating
    }

    pub fn custom_items(&self) -> impl Iterator<Item = (usize, &CustomItem)> {
        self.string
            .chars()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.custom_item().map(|item| (i, item)))
    }

    /// Brackets in this paragraph, computed on demand and cached until the
    /// next mutation
    pub fn paren_list(&mut self) -> &[Paren] {
        let string = &self.string;
        self.parens.get_or_insert_with(|| {
            string
                .chars()
                .iter()
                .enumerate()
                .filter_map(|(pos, cell)| match cell.c {
                    '(' | '[' | '{' => Some(Paren {
                        open: true,
                        c: cell.c,
                        pos,
                    }),
                    ')' | ']' | '}' => Some(Paren {
                        open: false,
                        c: cell.c,
                        pos,
                    }),
                    _ => None,
                })
                .collect()
        })
    }

    // Line queries over the cached map; the caller formats first

    pub fn lines(&self) -> usize {
        self.line_starts.len()
    }

    /// Line containing `index`: (line number, index of its first character)
    pub fn line_of_char(&self, index: usize) -> Option<(usize, usize)> {
        self.line_starts
            .range(..=index)
            .next_back()
            .map(|(start, _)| (self.line_starts.range(..*start).count(), *start))
    }

    pub fn line_start_of_char(&self, index: usize) -> Option<(usize, &LineStart)> {
        self.line_starts
            .range(..=index)
            .next_back()
            .map(|(start, ls)| (*start, ls))
    }

    pub fn line_start_of_line(&self, line: usize) -> Option<(usize, &LineStart)> {
        self.line_starts
            .iter()
            .nth(line)
            .map(|(start, ls)| (*start, ls))
    }

    /// One past the last character index of `line`
    pub fn line_end_of_line(&self, line: usize) -> Option<usize> {
        self.line_start_of_line(line)?;
        Some(
            self.line_start_of_line(line + 1)
                .map(|(start, _)| start)
                .unwrap_or(self.length()),
        )
    }
}

struct Slot {
    generation: u32,
    parag: Option<Paragraph>,
}

/// Generational arena of paragraphs. Freed slots bump their generation, so
/// a stale `ParagId` no longer resolves.
#[derive(Default)]
pub struct ParagraphArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ParagraphArena {
    pub fn new() -> Self {
        ParagraphArena::default()
    }

    pub fn insert(&mut self, parag: Paragraph) -> ParagId {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.parag = Some(parag);
            return ParagId {
                slot,
                generation: entry.generation,
            };
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            parag: Some(parag),
        });
        ParagId {
            slot,
            generation: 0,
        }
    }

    pub fn remove(&mut self, id: ParagId) -> Option<Paragraph> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let parag = entry.parag.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.slot);
        Some(parag)
    }

    pub fn get(&self, id: ParagId) -> Option<&Paragraph> {
        let entry = self.slots.get(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.parag.as_ref()
    }

    pub fn get_mut(&mut self, id: ParagId) -> Option<&mut Paragraph> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.parag.as_mut()
    }

    pub fn contains(&self, id: ParagId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for (i, entry) in self.slots.iter_mut().enumerate() {
            if entry.parag.take().is_some() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(i as u32);
            }
        }
    }
}

/// Lookup by handle for ids taken from the linked list, which are always live.
///
/// # Panics
///
/// Panics if `id` is stale (its paragraph was removed). Use
/// [`ParagraphArena::get`] for handles that may have gone stale.
impl Index<ParagId> for ParagraphArena {
    type Output = Paragraph;

    fn index(&self, id: ParagId) -> &Paragraph {
        match self.get(id) {
            Some(p) => p,
            None => panic!("stale paragraph handle {id:?}"),
        }
    }
}

/// # Panics
///
/// Panics if `id` is stale. Use [`ParagraphArena::get_mut`] otherwise.
impl IndexMut<ParagId> for ParagraphArena {
    fn index_mut(&mut self, id: ParagId) -> &mut Paragraph {
        match self.get_mut(id) {
            Some(p) => p,
            None => panic!("stale paragraph handle {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::format::Format;
    use std::rc::Rc;

    fn parag(text: &str) -> Paragraph {
        let f = Rc::new(Format::default());
        let mut p = Paragraph::new(&f);
        p.insert(0, text, &f);
        p
    }

    #[test]
    fn test_new_paragraph_has_sentinel() {
        let p = parag("");
        assert_eq!(p.length(), 1);
        assert_eq!(p.text(), " ");
        assert_eq!(p.state(), LayoutState::Dirty(0));
    }

    #[test]
    fn test_invalidate_only_widens() {
        let mut p = parag("hello");
        p.mark_clean();
        assert!(p.is_valid());
        p.invalidate(3);
        p.invalidate(4);
        assert_eq!(p.state(), LayoutState::Dirty(3));
        p.invalidate(1);
        assert_eq!(p.state(), LayoutState::Dirty(1));
    }

    #[test]
    fn test_remove_keeps_sentinel() {
        let mut p = parag("abc");
        let removed = p.remove(1, 100);
        assert_eq!(removed.len(), 2);
        assert_eq!(p.text(), "a ");
        assert!(p.remove(1, 1).is_empty());
    }

    #[test]
    fn test_truncate_reappends_sentinel() {
        let mut p = parag("hello world");
        let tail = p.truncate(5);
        assert_eq!(p.text(), "hello ");
        assert_eq!(tail.iter().map(|c| c.c).collect::<String>(), " world");
    }

    #[test]
    fn test_truncate_at_or_past_end_keeps_one_sentinel() {
        let mut p = parag("abc");
        assert!(p.truncate(3).is_empty());
        assert!(p.truncate(10).is_empty());
        assert_eq!(p.length(), 4);
        assert_eq!(p.text(), "abc ");
    }

    #[test]
    #[should_panic(expected = "stale paragraph handle")]
    fn test_index_with_stale_handle_panics() {
        let mut arena = ParagraphArena::new();
        let id = arena.insert(parag("gone"));
        arena.remove(id);
        let _ = &arena[id];
    }

    #[test]
    fn test_paren_list() {
        let mut p = parag("f(a[1]) }");
        let parens: Vec<(bool, char, usize)> =
            p.paren_list().iter().map(|x| (x.open, x.c, x.pos)).collect();
        assert_eq!(
            parens,
            vec![
                (true, '(', 1),
                (true, '[', 3),
                (false, ']', 5),
                (false, ')', 6),
                (false, '}', 8)
            ]
        );
    }

    #[test]
    fn test_arena_generations() {
        let f = Rc::new(Format::default());
        let mut arena = ParagraphArena::new();
        let a = arena.insert(Paragraph::new(&f));
        assert!(arena.contains(a));
        assert!(arena.remove(a).is_some());
        assert!(!arena.contains(a));
        let b = arena.insert(Paragraph::new(&f));
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_line_queries() {
        let mut p = parag("abcdef");
        let mut starts = BTreeMap::new();
        starts.insert(0, LineStart::new(0, 11, 15));
        starts.insert(4, LineStart::new(15, 11, 15));
        p.set_line_starts(starts);
        assert_eq!(p.lines(), 2);
        assert_eq!(p.line_of_char(5), Some((1, 4)));
        assert_eq!(p.line_of_char(2), Some((0, 0)));
        assert_eq!(p.line_start_of_line(1).map(|(s, _)| s), Some(4));
        assert_eq!(p.line_end_of_line(0), Some(4));
        assert_eq!(p.line_end_of_line(1), Some(7));
        assert_eq!(p.line_end_of_line(2), None);
    }
}
