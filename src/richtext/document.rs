// Document
// Owns the paragraph list, the shared format collection, the flow of
// floating items, named selections and the undo history. Layout is lazy:
// paragraphs are formatted top to bottom when something needs geometry.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use regex::RegexBuilder;

use crate::config::EngineConfig;
use crate::draw_context::{Color, DrawContext, FontMetrics, Palette, Rect};
use crate::error::DocumentError;

use super::bidi;
use super::command::{Command, CommandHistory, DocPos, NestStep};
use super::cursor::{Cursor, NestFrame};
use super::custom_item::{CustomItem, ItemId, Placement};
use super::flow::Flow;
use super::format::{Font, Format, FormatCollection, FormatRef, VerticalAlignment};
use super::formatter::{BreakMode, Formatter, LayoutEnv};
use super::highlighter::{STATE_NORMAL, SyntaxHighlighter};
use super::markdown_converter;
use super::markup_parser;
use super::markup_writer;
use super::paragraph::{LineStart, ParagId, Paragraph, ParagraphArena};
use super::style_sheet::{Alignment, ListStyle, StyleSheet, StyleStack};
use super::table::Table;
use super::text_string::{LINE_SEPARATOR, OBJECT_REPLACEMENT, TextChar};

/// The user's text selection
pub const SELECTION_STANDARD: i32 = 0;
pub const SELECTION_PAREN_MISMATCH: i32 = 1;
pub const SELECTION_PAREN_MATCH: i32 = 2;
pub const SELECTION_SEARCH: i32 = 3;
/// Scratch selection used while deleting
pub const SELECTION_TEMP: i32 = 32000;

const TAB_SPACES: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    PlainText,
    RichText,
    /// Rich text if the input starts with a tag
    #[default]
    AutoText,
}

/// A character position inside one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPos {
    pub parag: ParagId,
    pub index: usize,
}

impl TextPos {
    pub fn new(parag: ParagId, index: usize) -> Self {
        TextPos { parag, index }
    }
}

/// Start is never after end; `swapped` records that the selection was
/// made backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: TextPos,
    pub end: TextPos,
    pub swapped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStats {
    pub paragraphs: usize,
    pub height: i32,
    pub minimum_width: i32,
    pub widest_line: i32,
    pub formats: usize,
}

pub struct Document {
    parags: ParagraphArena,
    first: ParagId,
    last: ParagId,
    formats: Rc<RefCell<FormatCollection>>,
    metrics: Rc<dyn FontMetrics>,
    style_sheet: Rc<StyleSheet>,
    highlighter: Option<Rc<dyn SyntaxHighlighter>>,
    formatter: Formatter,
    flow: Flow,
    selections: BTreeMap<i32, Selection>,
    selection_anchors: HashMap<i32, Cursor>,
    selection_colors: HashMap<i32, Color>,
    history: CommandHistory,
    text_format: TextFormat,
    width: i32,
    min_width: i32,
    widest_line: i32,
    tab_stop_width: i32,
    paragraph_spacing: i32,
    untabify: bool,
    link_color: Color,
    underline_links: bool,
    image_size: i32,
    fallback_line_height: i32,
    completions: BTreeSet<String>,
    next_item_id: ItemId,
    nested: bool,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("paragraphs", &self.parags.len())
            .field("width", &self.width)
            .field("selections", &self.selections)
            .field("nested", &self.nested)
            .finish_non_exhaustive()
    }
}

fn expand_leading_tabs(line: &str) -> Cow<'_, str> {
    let tabs = line.chars().take_while(|c| *c == '\t').count();
    if tabs == 0 {
        return Cow::Borrowed(line);
    }
    Cow::Owned(format!("{}{}", TAB_SPACES.repeat(tabs), &line[tabs..]))
}

fn collapse_leading_spaces(line: &str) -> String {
    let spaces = line.chars().take_while(|c| *c == ' ').count();
    let tabs = spaces / TAB_SPACES.len();
    if tabs == 0 {
        return line.to_string();
    }
    format!("{}{}", "\t".repeat(tabs), &line[tabs * TAB_SPACES.len()..])
}

/// Byte offset → character index
fn char_index(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// Byte offset of character `index`, or the end of `text`
fn byte_index(text: &str, index: usize) -> usize {
    text.char_indices().nth(index).map(|(b, _)| b).unwrap_or(text.len())
}

impl Document {
    pub fn new(metrics: Rc<dyn FontMetrics>) -> Self {
        Document::with_config(metrics, &EngineConfig::default())
    }

    pub fn with_config(metrics: Rc<dyn FontMetrics>, config: &EngineConfig) -> Self {
        let font = Font::new(config.default_family.clone(), config.default_point_size);
        let formats = FormatCollection::new(Format::new(font, Some(config.default_color)));
        let default_format = formats.default_format();
        let mut parags = ParagraphArena::new();
        let first = parags.insert(Paragraph::new(&default_format));
        let mut flow = Flow::new();
        flow.set_page_size(config.page_size);
        Document {
            parags,
            first,
            last: first,
            formats: Rc::new(RefCell::new(formats)),
            metrics,
            style_sheet: Rc::new(StyleSheet::default()),
            highlighter: None,
            formatter: Formatter::new(config.break_mode.into()),
            flow,
            selections: BTreeMap::new(),
            selection_anchors: HashMap::new(),
            selection_colors: config
                .selection_colors
                .iter()
                .map(|sc| (sc.id, sc.color))
                .collect(),
            history: CommandHistory::new(config.undo_depth),
            text_format: TextFormat::AutoText,
            width: 0,
            min_width: 0,
            widest_line: 0,
            tab_stop_width: config.tab_stop_width,
            paragraph_spacing: config.paragraph_spacing,
            untabify: config.untabify,
            link_color: config.link_color,
            underline_links: config.underline_links,
            image_size: config.image_size,
            fallback_line_height: config.fallback_line_height,
            completions: BTreeSet::new(),
            next_item_id: 1,
            nested: false,
        }
    }

    /// Empty document for a table cell: shares formats, metrics and style
    /// sheet with `self`, has its own paragraphs and flow
    pub fn new_nested(&self) -> Document {
        let default_format = self.default_format();
        let mut parags = ParagraphArena::new();
        let first = parags.insert(Paragraph::new(&default_format));
        Document {
            parags,
            first,
            last: first,
            formats: self.formats.clone(),
            metrics: self.metrics.clone(),
            style_sheet: self.style_sheet.clone(),
            highlighter: None,
            formatter: self.formatter,
            flow: Flow::new(),
            selections: BTreeMap::new(),
            selection_anchors: HashMap::new(),
            selection_colors: self.selection_colors.clone(),
            history: CommandHistory::new(1),
            text_format: TextFormat::RichText,
            width: 0,
            min_width: 0,
            widest_line: 0,
            tab_stop_width: self.tab_stop_width,
            paragraph_spacing: self.paragraph_spacing,
            untabify: false,
            link_color: self.link_color,
            underline_links: self.underline_links,
            image_size: self.image_size,
            fallback_line_height: self.fallback_line_height,
            completions: BTreeSet::new(),
            next_item_id: 1,
            nested: true,
        }
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    // Shared state

    pub fn formats(&self) -> Rc<RefCell<FormatCollection>> {
        self.formats.clone()
    }

    pub fn default_format(&self) -> FormatRef {
        self.formats.borrow().default_format()
    }

    pub fn metrics(&self) -> &dyn FontMetrics {
        self.metrics.as_ref()
    }

    pub fn style_sheet(&self) -> &Rc<StyleSheet> {
        &self.style_sheet
    }

    pub fn set_style_sheet(&mut self, sheet: StyleSheet) {
        self.style_sheet = Rc::new(sheet);
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn set_highlighter(&mut self, highlighter: Option<Rc<dyn SyntaxHighlighter>>) {
        self.highlighter = highlighter;
        for id in self.parag_ids() {
            let parag = &mut self.parags[id];
            parag.set_need_highlight(true);
            parag.invalidate(0);
        }
    }

    pub fn text_format(&self) -> TextFormat {
        self.text_format
    }

    pub fn set_text_format(&mut self, format: TextFormat) {
        self.text_format = format;
    }

    pub fn image_size(&self) -> i32 {
        self.image_size
    }

    pub fn link_color(&self) -> Color {
        self.link_color
    }

    pub fn underline_links(&self) -> bool {
        self.underline_links
    }

    pub fn set_untabify(&mut self, untabify: bool) {
        self.untabify = untabify;
    }

    pub fn break_mode(&self) -> BreakMode {
        self.formatter.mode()
    }

    pub fn set_break_mode(&mut self, mode: BreakMode) {
        self.formatter.set_mode(mode);
        self.invalidate_all();
    }

    pub fn set_tab_stop_width(&mut self, width: i32) {
        self.tab_stop_width = width;
        self.invalidate_all();
    }

    pub fn set_paragraph_spacing(&mut self, spacing: i32) {
        self.paragraph_spacing = spacing;
        self.invalidate_all();
    }

    pub fn set_page_size(&mut self, page_size: i32) {
        self.flow.set_page_size(page_size);
        self.invalidate_all();
    }

    pub fn set_undo_depth(&mut self, depth: usize) {
        self.history.set_steps(depth);
    }

    pub fn alloc_item_id(&mut self) -> ItemId {
        let id = self.next_item_id;
        self.next_item_id += 1;
        id
    }

    // Paragraph list

    pub fn first_parag(&self) -> ParagId {
        self.first
    }

    pub fn last_parag(&self) -> ParagId {
        self.last
    }

    pub fn parag(&self, id: ParagId) -> Option<&Paragraph> {
        self.parags.get(id)
    }

    pub fn parag_mut(&mut self, id: ParagId) -> Option<&mut Paragraph> {
        self.parags.get_mut(id)
    }

    pub fn paragraph_count(&self) -> usize {
        self.parags.len()
    }

    /// Paragraphs in document order
    pub fn iter(&self) -> impl Iterator<Item = (ParagId, &Paragraph)> + '_ {
        std::iter::successors(self.parags.get(self.first).map(|p| (self.first, p)), move |(_, p)| {
            p.next.and_then(|n| self.parags.get(n).map(|q| (n, q)))
        })
    }

    pub fn parag_ids(&self) -> Vec<ParagId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn parag_by_number(&self, number: usize) -> Option<ParagId> {
        self.iter().nth(number).map(|(id, _)| id)
    }

    /// Paragraph whose laid out rectangle contains `y`, or the last one
    pub fn parag_at_y(&self, y: i32) -> ParagId {
        self.iter()
            .find(|(_, p)| y < p.rect.bottom())
            .map(|(id, _)| id)
            .unwrap_or(self.last)
    }

    fn link_after(&mut self, after: ParagId, mut parag: Paragraph) -> ParagId {
        let next = self.parags.get(after).and_then(|p| p.next);
        parag.prev = Some(after);
        parag.next = next;
        let id = self.parags.insert(parag);
        self.parags[after].next = Some(id);
        match next {
            Some(n) => self.parags[n].prev = Some(id),
            None => self.last = id,
        }
        id
    }

    fn link_before(&mut self, before: ParagId, mut parag: Paragraph) -> ParagId {
        let prev = self.parags.get(before).and_then(|p| p.prev);
        parag.prev = prev;
        parag.next = Some(before);
        let id = self.parags.insert(parag);
        self.parags[before].prev = Some(id);
        match prev {
            Some(p) => self.parags[p].next = Some(id),
            None => self.first = id,
        }
        id
    }

    fn unlink(&mut self, id: ParagId) -> Option<Paragraph> {
        let parag = self.parags.remove(id)?;
        match parag.prev {
            Some(p) => self.parags[p].next = parag.next,
            None => {
                if let Some(n) = parag.next {
                    self.first = n;
                }
            }
        }
        match parag.next {
            Some(n) => self.parags[n].prev = parag.prev,
            None => {
                if let Some(p) = parag.prev {
                    self.last = p;
                }
            }
        }
        Some(parag)
    }

    /// Empty paragraph after `after` with the same style and alignment
    pub(crate) fn append_parag(&mut self, after: ParagId) -> ParagId {
        let mut parag = Paragraph::new(&self.default_format());
        if let Some(template) = self.parags.get(after) {
            parag.set_style(template.style().clone());
            parag.set_alignment(template.alignment_setting());
        }
        let id = self.link_after(after, parag);
        let number = self.parags[after].number() + 1;
        self.parags[id].set_number(number);
        id
    }

    fn renumber(&mut self) {
        let mut number = 0;
        let mut cur = Some(self.first);
        while let Some(id) = cur {
            let parag = &mut self.parags[id];
            parag.set_number(number);
            number += 1;
            cur = parag.next;
        }
    }

    /// Remove every paragraph and start over with a single empty one
    pub fn clear(&mut self) {
        self.parags.clear();
        let first = self.parags.insert(Paragraph::new(&self.default_format()));
        self.first = first;
        self.last = first;
        self.selections.clear();
        self.selection_anchors.clear();
        self.history.clear();
        self.flow.clear();
        self.min_width = 0;
        self.widest_line = 0;
    }

    // Text in and out

    pub fn set_text(&mut self, text: &str, format: TextFormat) {
        let rich = match format {
            TextFormat::PlainText => false,
            TextFormat::RichText => true,
            TextFormat::AutoText => {
                let trimmed = text.trim_start();
                trimmed.starts_with('<') && trimmed.contains('>')
            }
        };
        if rich {
            self.set_rich_text(text);
        } else {
            self.set_plain_text(text);
        }
    }

    /// One paragraph per input line
    pub fn set_plain_text(&mut self, text: &str) {
        self.clear();
        let format = self.default_format();
        let mut current = self.first;
        for (i, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if i > 0 {
                current = self.append_parag(current);
            }
            let line = if self.untabify {
                expand_leading_tabs(line)
            } else {
                Cow::Borrowed(line)
            };
            self.parags[current].insert(0, &line, &format);
        }
    }

    /// Every paragraph including its sentinel space, each followed by `\n`
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for (_, parag) in self.iter() {
            let mut line = String::with_capacity(parag.length());
            for cell in parag.string().chars() {
                match cell.c {
                    OBJECT_REPLACEMENT if cell.is_custom() => {}
                    LINE_SEPARATOR => line.push('\n'),
                    c => line.push(c),
                }
            }
            if self.untabify {
                line = collapse_leading_spaces(&line);
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    pub fn set_rich_text(&mut self, markup: &str) {
        self.clear();
        markup_parser::parse(self, markup);
        self.renumber();
    }

    pub fn rich_text(&self) -> String {
        markup_writer::write(self)
    }

    pub fn set_markdown(&mut self, markdown: &str) {
        let markup = markdown_converter::markdown_to_markup(markdown);
        self.set_rich_text(&markup);
    }

    pub fn to_markdown(&self) -> String {
        markdown_converter::document_to_markdown(self)
    }

    /// Plain or rich, depending on the document's text format
    pub fn text(&self) -> String {
        match self.text_format {
            TextFormat::RichText => self.rich_text(),
            _ => self.plain_text(),
        }
    }

    /// Text of paragraph `number`, sentinel included
    pub fn text_of(&self, number: usize) -> Option<String> {
        self.iter().nth(number).map(|(_, p)| p.text())
    }

    pub fn load(&mut self, path: &Path) -> Result<(), DocumentError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                self.set_text(&contents, self.text_format);
                Ok(())
            }
            Err(err) => {
                log::warn!("Document::load: cannot read {}: {}", path.display(), err);
                Err(DocumentError::io(path, err))
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        fs::write(path, self.text()).map_err(|err| {
            log::warn!("Document::save: cannot write {}: {}", path.display(), err);
            DocumentError::io(path, err)
        })
    }

    // Layout

    pub fn width(&self) -> i32 {
        self.width.max(self.min_width)
    }

    pub fn set_width(&mut self, width: i32) {
        if width == self.width {
            return;
        }
        self.width = width;
        self.flow.set_width(width);
        self.invalidate_all();
    }

    /// Narrowest width the content can be laid out at
    pub fn minimum_width(&self) -> i32 {
        self.min_width
    }

    pub fn widest_line(&self) -> i32 {
        self.widest_line
    }

    /// Bottom of the last paragraph or of the lowest floating item
    pub fn height(&self) -> i32 {
        let text = self.parags.get(self.last).map(|p| p.rect.bottom()).unwrap_or(0);
        let floats = self
            .flow
            .records()
            .filter(|r| r.is_positioned())
            .map(|r| r.ypos + r.height)
            .max()
            .unwrap_or(0);
        text.max(floats)
    }

    pub fn invalidate_all(&mut self) {
        for id in self.parag_ids() {
            self.parags[id].invalidate(0);
        }
    }

    /// Throw all layout away and format every paragraph
    pub fn do_layout(&mut self) {
        self.min_width = 0;
        self.widest_line = 0;
        self.flow.set_width(self.width);
        self.flow.clear();
        self.invalidate_all();
        self.format_all();
    }

    /// Format whatever is out of date
    pub fn format_all(&mut self) {
        let mut cur = Some(self.first);
        while let Some(id) = cur {
            self.settle(id);
            cur = self.parags.get(id).and_then(|p| p.next);
        }
    }

    /// Make sure every paragraph up to and including `id` is laid out
    pub fn ensure_formatted(&mut self, id: ParagId) {
        let mut cur = Some(self.first);
        while let Some(current) = cur {
            self.settle(current);
            if current == id {
                return;
            }
            cur = self.parags.get(current).and_then(|p| p.next);
        }
    }

    /// Bring one paragraph up to date, moving it below its predecessor.
    /// A clean paragraph that only moved keeps its lines if it is full width.
    fn settle(&mut self, id: ParagId) {
        let y = self
            .parags
            .get(id)
            .and_then(|p| p.prev)
            .and_then(|prev| self.parags.get(prev))
            .map(|p| p.rect.bottom())
            .unwrap_or(0);
        let Some(parag) = self.parags.get_mut(id) else {
            return;
        };
        if parag.is_valid() && parag.rect.y != y {
            if parag.is_full_width() {
                let dy = y - parag.rect.y;
                parag.move_by(dy);
            } else {
                parag.invalidate(0);
            }
        }
        if !parag.is_valid() {
            self.format_parag(id, false);
        }
    }

    /// Lay one paragraph out. With `do_move`, later paragraphs are shifted by
    /// the change in height; from the first one that is not full width on,
    /// they are also invalidated.
    pub fn format_parag(&mut self, id: ParagId, do_move: bool) {
        let Some(parag) = self.parags.get(id) else {
            log::warn!("Document::format_parag: stale paragraph {id:?}");
            return;
        };
        if parag.is_valid() {
            return;
        }
        let prev = parag.prev;

        self.highlight(id);

        let y = prev
            .and_then(|p| self.parags.get(p))
            .map(|p| p.rect.bottom())
            .unwrap_or(0);
        let width = self.width;
        {
            let parag = &mut self.parags[id];
            parag.rect.x = 0;
            parag.rect.y = y;
            parag.rect.w = width;
        }
        self.place_floating_items(id);

        let metrics = self.metrics.clone();
        let mut env = LayoutEnv {
            metrics: metrics.as_ref(),
            flow: &mut self.flow,
            width,
            tab_stop: self.tab_stop_width,
            paragraph_spacing: self.paragraph_spacing,
            min_width: 0,
            widest_line: 0,
        };
        let parag = &mut self.parags[id];
        let h = self.formatter.format(&mut env, parag);
        parag.rect.h = h;
        parag.mark_clean();
        let (min_width, widest_line) = (env.min_width, env.widest_line);
        self.min_width = self.min_width.max(min_width);
        self.widest_line = self.widest_line.max(widest_line);
        log::debug!("Document::format_parag: {id:?} at y={y} h={h}");

        if do_move {
            self.cascade(id);
        }
    }

    /// Lay out an edited paragraph after everything above it and push the
    /// paragraphs below out of the way
    pub(crate) fn format_edited(&mut self, id: ParagId) {
        if let Some(prev) = self.parags.get(id).and_then(|p| p.prev) {
            self.ensure_formatted(prev);
        }
        self.format_parag(id, true);
    }

    fn cascade(&mut self, id: ParagId) {
        let bottom = self.parags[id].rect.bottom();
        let Some(next) = self.parags[id].next else {
            return;
        };
        let dy = bottom - self.parags[next].rect.y;
        if dy == 0 {
            return;
        }
        let mut make_invalid = false;
        let mut cur = Some(next);
        while let Some(n) = cur {
            let parag = &mut self.parags[n];
            if !parag.is_full_width() {
                make_invalid = true;
            }
            if make_invalid {
                parag.invalidate(0);
            }
            parag.move_by(dy);
            cur = parag.next;
        }
    }

    fn highlight(&mut self, id: ParagId) {
        let Some(highlighter) = self.highlighter.clone() else {
            return;
        };
        let parag = &self.parags[id];
        if !parag.needs_highlight() {
            return;
        }
        let start_state = parag
            .prev
            .map(|p| self.parags[p].end_state())
            .unwrap_or(STATE_NORMAL);
        let old_end = parag.end_state();
        let next = parag.next;
        let end = {
            let mut formats = self.formats.borrow_mut();
            let parag = &mut self.parags[id];
            let end = highlighter.process(&mut formats, parag, start_state);
            parag.set_end_state(end);
            parag.set_need_highlight(false);
            end
        };
        if end != old_end
            && let Some(next) = next
        {
            let parag = &mut self.parags[next];
            parag.set_need_highlight(true);
            parag.invalidate(0);
        }
    }

    /// Position the paragraph's floating items at its top edge, left ones
    /// from the left border and right ones from the right border
    fn place_floating_items(&mut self, id: ParagId) {
        let width = self.width;
        let parag = &mut self.parags[id];
        if parag.floating.is_empty() {
            return;
        }
        let y = parag.rect.y;
        let mut left = 0;
        let mut right = width;
        for cell in parag.string.chars_mut() {
            let Some(item) = cell.custom_item_mut() else {
                continue;
            };
            if !item.is_floating() {
                continue;
            }
            item.resize(width);
            item.ypos = y;
            match item.placement() {
                Placement::Left => {
                    item.xpos = left;
                    left += item.width;
                }
                Placement::Right => {
                    right -= item.width;
                    item.xpos = right.max(0);
                }
                Placement::Inline => {}
            }
            self.flow.register_floating_item(item);
            self.flow.update_height(item);
        }
    }

    // Line queries. Each formats lazily first.

    pub fn line_height_of_char(&mut self, id: ParagId, index: usize) -> i32 {
        self.ensure_formatted(id);
        match self.parags.get(id).and_then(|p| p.line_start_of_char(index)) {
            Some((_, line)) => line.h,
            None => {
                log::warn!("Document::line_height_of_char: {index} not found in {id:?}");
                self.fallback_line_height
            }
        }
    }

    /// (line number, index of the line's first character)
    pub fn line_of_char(&mut self, id: ParagId, index: usize) -> Option<(usize, usize)> {
        self.ensure_formatted(id);
        let found = self.parags.get(id).and_then(|p| p.line_of_char(index));
        if found.is_none() {
            log::warn!("Document::line_of_char: {index} not found in {id:?}");
        }
        found
    }

    pub fn lines(&mut self, id: ParagId) -> usize {
        self.ensure_formatted(id);
        self.parags.get(id).map(|p| p.lines()).unwrap_or(0)
    }

    pub fn line_start_of_line(&mut self, id: ParagId, line: usize) -> Option<(usize, LineStart)> {
        self.ensure_formatted(id);
        self.parags
            .get(id)
            .and_then(|p| p.line_start_of_line(line))
            .map(|(start, ls)| (start, ls.clone()))
    }

    // Custom items and nesting

    pub fn insert_custom_item(&mut self, id: ParagId, index: usize, item: CustomItem) {
        let Some(parag) = self.parags.get_mut(id) else {
            log::warn!("Document::insert_custom_item: stale paragraph {id:?}");
            return;
        };
        let format = parag
            .at(index.min(parag.length() - 1))
            .map(|c| c.format().clone())
            .unwrap_or_else(|| self.formats.borrow().default_format());
        parag.insert_cell(index, TextChar::with_item(Box::new(item), format));
    }

    pub fn table_at(&self, id: ParagId, index: usize) -> Option<&Table> {
        self.parags.get(id)?.at(index)?.custom_item()?.as_table()
    }

    pub fn table_at_mut(&mut self, id: ParagId, index: usize) -> Option<&mut Table> {
        self.parags
            .get_mut(id)?
            .at_mut(index)?
            .custom_item_mut()?
            .as_table_mut()
    }

    /// Top left corner of the item at (`id`, `index`) in document coordinates
    pub fn item_origin(&self, id: ParagId, index: usize) -> Option<(i32, i32)> {
        let parag = self.parags.get(id)?;
        let cell = parag.at(index)?;
        let item = cell.custom_item()?;
        if item.is_floating() {
            return item.is_positioned().then_some((item.xpos, item.ypos));
        }
        let (_, line) = parag.line_start_of_char(index)?;
        Some((
            parag.rect.x + cell.x,
            parag.rect.y + line.y + line.baseline - item.ascent(),
        ))
    }

    /// Origin of a table cell's document in this document's coordinates
    pub fn cell_origin(&self, id: ParagId, index: usize, cell: usize) -> Option<(i32, i32)> {
        let (x, y) = self.item_origin(id, index)?;
        let table = self.table_at(id, index)?;
        let r = table.cell(cell)?.rect();
        Some((x + r.x + table.cellpadding, y + r.y + table.cellpadding))
    }

    /// Document reached by following the cursor frames down from `self`
    pub fn nested(&self, frames: &[NestFrame]) -> Option<&Document> {
        let mut doc = self;
        for frame in frames {
            doc = doc.table_at(frame.parag, frame.index)?.cell(frame.cell)?.document();
        }
        Some(doc)
    }

    pub fn nested_mut(&mut self, frames: &[NestFrame]) -> Option<&mut Document> {
        let mut doc = self;
        for frame in frames {
            doc = doc
                .table_at_mut(frame.parag, frame.index)?
                .cell_mut(frame.cell)?
                .document_mut();
        }
        Some(doc)
    }

    pub fn nested_by_path(&self, path: &[NestStep]) -> Option<&Document> {
        let mut doc = self;
        for step in path {
            let id = doc.parag_by_number(step.parag)?;
            doc = doc.table_at(id, step.index)?.cell(step.cell)?.document();
        }
        Some(doc)
    }

    pub fn nested_by_path_mut(&mut self, path: &[NestStep]) -> Option<&mut Document> {
        let mut doc = self;
        for step in path {
            let id = doc.parag_by_number(step.parag)?;
            doc = doc.table_at_mut(id, step.index)?.cell_mut(step.cell)?.document_mut();
        }
        Some(doc)
    }

    /// Edits inside a table cell change the table's size: invalidate every
    /// paragraph holding one of the tables on the way down
    pub(crate) fn invalidate_nesting(&mut self, frames: &[NestFrame]) {
        let mut doc = self;
        for frame in frames {
            let Some(parag) = doc.parags.get_mut(frame.parag) else {
                return;
            };
            parag.invalidate(0);
            let Some(cell_doc) = parag
                .at_mut(frame.index)
                .and_then(|c| c.custom_item_mut())
                .and_then(|i| i.as_table_mut())
                .and_then(|t| t.cell_mut(frame.cell))
                .map(|c| c.document_mut())
            else {
                return;
            };
            doc = cell_doc;
        }
    }

    /// Same as `invalidate_nesting`, for a path of paragraph numbers
    pub(crate) fn invalidate_path(&mut self, path: &[NestStep]) {
        let mut doc = self;
        for step in path {
            let Some(id) = doc.parag_by_number(step.parag) else {
                return;
            };
            let Some(parag) = doc.parags.get_mut(id) else {
                return;
            };
            parag.invalidate(0);
            let Some(cell_doc) = parag
                .at_mut(step.index)
                .and_then(|c| c.custom_item_mut())
                .and_then(|i| i.as_table_mut())
                .and_then(|t| t.cell_mut(step.cell))
                .map(|c| c.document_mut())
            else {
                return;
            };
            doc = cell_doc;
        }
    }

    fn for_each_nested_mut(&mut self, f: &mut dyn FnMut(&mut Document)) {
        for id in self.parag_ids() {
            let parag = &mut self.parags[id];
            for cell in parag.string.chars_mut() {
                let Some(table) = cell.custom_item_mut().and_then(|i| i.as_table_mut()) else {
                    continue;
                };
                for i in 0..table.cells().len() {
                    if let Some(cell) = table.cell_mut(i) {
                        let doc = cell.document_mut();
                        f(doc);
                        doc.for_each_nested_mut(f);
                    }
                }
            }
        }
    }

    // Structural edits

    /// Remove cells from one paragraph; floating items among them leave the
    /// flow. The removed cells (and the items they own) go to the caller.
    pub fn remove_cells(&mut self, id: ParagId, index: usize, len: usize) -> Vec<TextChar> {
        let Some(parag) = self.parags.get_mut(id) else {
            log::warn!("Document::remove_cells: stale paragraph {id:?}");
            return Vec::new();
        };
        let removed = parag.remove(index, len);
        for cell in &removed {
            if let Some(item) = cell.custom_item()
                && item.is_floating()
            {
                self.flow.unregister_floating_item(item.id());
            }
        }
        removed
    }

    /// Position `n` characters after `pos`; a paragraph break counts as one
    pub fn advance(&self, pos: TextPos, n: usize) -> TextPos {
        let mut pos = pos;
        let mut n = n;
        loop {
            let Some(parag) = self.parags.get(pos.parag) else {
                return pos;
            };
            let last = parag.length() - 1;
            let avail = last.saturating_sub(pos.index);
            if n <= avail {
                return TextPos::new(pos.parag, pos.index + n);
            }
            n -= avail;
            match parag.next {
                Some(next) => {
                    n -= 1;
                    pos = TextPos::new(next, 0);
                }
                None => return TextPos::new(pos.parag, last),
            }
        }
    }

    /// Remove everything between two positions. Paragraph breaks inside the
    /// range come back as `'\n'` cells.
    pub fn remove_range(&mut self, start: TextPos, end: TextPos) -> Vec<TextChar> {
        if start.parag == end.parag {
            let len = end.index.saturating_sub(start.index);
            return self.remove_cells(start.parag, start.index, len);
        }
        let mut cells = self.remove_cells(start.parag, start.index, usize::MAX);
        loop {
            let Some(next) = self.parags.get(start.parag).and_then(|p| p.next) else {
                break;
            };
            let marker_format = {
                let parag = &self.parags[start.parag];
                parag.at(parag.length() - 1).map(|c| c.format().clone())
            };
            if let Some(format) = marker_format {
                cells.push(TextChar::new('\n', format));
            }
            if next == end.parag {
                cells.extend(self.remove_cells(next, 0, end.index));
                self.join(start.parag);
                break;
            }
            cells.extend(self.remove_cells(next, 0, usize::MAX));
            self.join(start.parag);
        }
        cells
    }

    /// Insert cells at `pos`; `'\n'` cells become paragraph breaks. Returns
    /// the position after the inserted text.
    pub fn insert_cells_at(&mut self, pos: TextPos, cells: Vec<TextChar>) -> TextPos {
        let mut cur = pos;
        let mut run = Vec::new();
        for cell in cells {
            if cell.c == '\n' && !cell.is_custom() {
                cur = self.flush_run(cur, std::mem::take(&mut run));
                let next = self.split_parag(cur.parag, cur.index, true);
                cur = TextPos::new(next, 0);
            } else {
                run.push(cell);
            }
        }
        self.flush_run(cur, run)
    }

    fn flush_run(&mut self, pos: TextPos, run: Vec<TextChar>) -> TextPos {
        if run.is_empty() {
            return pos;
        }
        let n = run.len();
        match self.parags.get_mut(pos.parag) {
            Some(parag) => {
                let index = pos.index.min(parag.length() - 1);
                parag.insert_cells(index, run);
                TextPos::new(pos.parag, index + n)
            }
            None => {
                log::warn!("Document::insert_cells_at: stale paragraph {:?}", pos.parag);
                pos
            }
        }
    }

    /// Split paragraph `id` at `index` and return the paragraph holding the
    /// second half. At the start an empty paragraph goes before `id`; at
    /// the end an empty one goes after it.
    pub fn split_parag(&mut self, id: ParagId, index: usize, renumber: bool) -> ParagId {
        let Some(parag) = self.parags.get(id) else {
            log::warn!("Document::split_parag: stale paragraph {id:?}");
            return id;
        };
        let len = parag.length();
        let sentinel_format = parag
            .at(len - 1)
            .map(|c| c.format().clone())
            .unwrap_or_else(|| self.formats.borrow().default_format());
        let mut fresh = Paragraph::new(&sentinel_format);
        fresh.set_style(parag.style().clone());
        fresh.set_alignment(parag.alignment_setting());
        fresh.set_list_value(parag.list_value());

        let result = if index == 0 {
            self.link_before(id, fresh);
            id
        } else if index >= len - 1 {
            self.link_after(id, fresh)
        } else {
            let tail = self.parags[id].truncate(index);
            fresh.insert_cells(0, tail);
            self.link_after(id, fresh)
        };
        if renumber {
            self.renumber();
        }
        result
    }

    /// Append the next paragraph to `id`. Returns false at the last paragraph.
    pub fn join(&mut self, id: ParagId) -> bool {
        let Some(next) = self.parags.get(id).and_then(|p| p.next) else {
            return false;
        };
        let Some(mut removed) = self.unlink(next) else {
            return false;
        };
        let cells = removed.string.truncate(0);
        let parag = &mut self.parags[id];
        let sentinel = parag.length() - 1;
        parag.string.remove(sentinel, 1);
        let end = parag.string.length();
        parag.string.insert_cells(end, cells);
        parag.floating.append(&mut removed.floating);
        parag.set_need_highlight(true);
        parag.invalidate(0);

        self.renumber();
        let mut cur = self.parags[id].next;
        while let Some(n) = cur {
            let parag = &mut self.parags[n];
            parag.invalidate(0);
            cur = parag.next;
        }
        true
    }

    /// Merge `format` (attributes in `mask`) into every character between
    /// two positions
    pub fn apply_format(&mut self, start: TextPos, end: TextPos, format: &Format, mask: u32) {
        let formats = self.formats.clone();
        let mut formats = formats.borrow_mut();
        let mut cur = Some(start.parag);
        while let Some(id) = cur {
            let Some(parag) = self.parags.get_mut(id) else {
                break;
            };
            let from = if id == start.parag { start.index } else { 0 };
            let to = if id == end.parag {
                end.index
            } else {
                parag.length()
            };
            for i in from..to.min(parag.length()) {
                let Some(old) = parag.at(i).map(|c| c.format().clone()) else {
                    break;
                };
                let merged = formats.merge(&old, format, mask);
                parag.set_format(i, 1, &merged);
            }
            if id == end.parag {
                break;
            }
            cur = parag.next;
        }
    }

    pub fn set_alignment(&mut self, id: ParagId, alignment: Alignment) {
        if let Some(parag) = self.parags.get_mut(id) {
            parag.set_alignment(alignment);
        }
    }

    fn invalidate_from(&mut self, id: ParagId) {
        let mut cur = Some(id);
        while let Some(n) = cur {
            let parag = &mut self.parags[n];
            parag.invalidate(0);
            cur = parag.next;
        }
    }

    fn list_item(&self, style: ListStyle) -> Option<Rc<super::style_sheet::StyleSheetItem>> {
        let name = if style.is_ordered() { "ol" } else { "ul" };
        let base = self.style_sheet.item(name)?;
        if base.list_style == Some(style) {
            return Some(base);
        }
        let mut item = (*base).clone();
        item.list_style = Some(style);
        Some(Rc::new(item))
    }

    fn without_li(stack: &StyleStack) -> StyleStack {
        match stack.top() {
            Some(item) if item.name == "li" => stack.pop(),
            _ => stack.clone(),
        }
    }

    /// Turn the paragraph into a list item of `style`, or (with `None`) take
    /// it out of every list
    pub fn set_list(&mut self, id: ParagId, style: Option<ListStyle>) {
        let Some(parag) = self.parags.get(id) else {
            return;
        };
        let mut stack = parag.style().clone();
        match style {
            Some(style) => {
                let Some(list) = self.list_item(style) else {
                    return;
                };
                if stack.list_depth() > 0 {
                    stack = stack.pop_list();
                }
                stack = stack.push(list);
                if let Some(li) = self.style_sheet.item("li") {
                    stack = stack.push(li);
                }
            }
            None => {
                while stack.list_depth() > 0 {
                    stack = stack.pop_list();
                }
            }
        }
        self.parags[id].set_style(stack);
        self.invalidate_from(id);
    }

    /// Nest the list item one level deeper
    pub fn inc_depth(&mut self, id: ParagId) {
        let Some(parag) = self.parags.get(id) else {
            return;
        };
        let Some(style) = parag.list_style() else {
            log::warn!("Document::inc_depth: paragraph is not a list item");
            return;
        };
        let Some(list) = self.list_item(style) else {
            return;
        };
        let mut stack = Self::without_li(parag.style()).push(list);
        if let Some(li) = self.style_sheet.item("li") {
            stack = stack.push(li);
        }
        self.parags[id].set_style(stack);
        self.invalidate_from(id);
    }

    pub fn dec_depth(&mut self, id: ParagId) {
        let Some(parag) = self.parags.get(id) else {
            return;
        };
        if parag.list_depth() == 0 {
            return;
        }
        let mut stack = parag.style().pop_list();
        if stack.list_depth() > 0
            && let Some(li) = self.style_sheet.item("li")
        {
            stack = stack.push(li);
        }
        self.parags[id].set_style(stack);
        self.invalidate_from(id);
    }

    /// Ordinal of a list item among its siblings, 1-based
    pub fn list_number(&self, id: ParagId) -> i32 {
        let Some(parag) = self.parags.get(id) else {
            return 1;
        };
        if let Some(value) = parag.list_value() {
            return value;
        }
        let depth = parag.list_depth();
        let mut n = 1;
        let mut cur = parag.prev;
        while let Some(p) = cur.and_then(|id| self.parags.get(id)) {
            let d = p.list_depth();
            if d < depth || d == 0 || (d == depth && p.list_style() != parag.list_style()) {
                break;
            }
            if d == depth && p.is_list_item() {
                if let Some(value) = p.list_value() {
                    return value + n;
                }
                n += 1;
            }
            cur = p.prev;
        }
        n
    }

    // Selections

    fn pos_key(&self, pos: TextPos) -> (usize, usize) {
        let number = self.parags.get(pos.parag).map(|p| p.number()).unwrap_or(usize::MAX);
        (number, pos.index)
    }

    /// Store a selection in this document, normalizing its direction
    pub fn set_selection(&mut self, id: i32, a: TextPos, b: TextPos) {
        let swapped = self.pos_key(a) > self.pos_key(b);
        let (start, end) = if swapped { (b, a) } else { (a, b) };
        self.selections.insert(id, Selection { start, end, swapped });
    }

    pub fn selection(&self, id: i32) -> Option<&Selection> {
        self.selections.get(&id)
    }

    /// Register a new selection id highlighted with `color`
    pub fn add_selection(&mut self, color: Color) -> i32 {
        let id = (SELECTION_SEARCH + 1..SELECTION_TEMP)
            .find(|id| !self.selection_colors.contains_key(id))
            .unwrap_or(SELECTION_TEMP - 1);
        self.selection_colors.insert(id, color);
        id
    }

    pub fn set_selection_color(&mut self, id: i32, color: Color) {
        self.selection_colors.insert(id, color);
    }

    /// Start selection `id` at the cursor; a previous selection with the
    /// same id goes away
    pub fn set_selection_start(&mut self, id: i32, cursor: &Cursor) {
        self.remove_selection(id);
        self.selection_anchors.insert(id, cursor.clone());
    }

    /// Extend selection `id` from its start to the cursor. When both ends sit
    /// at different nesting depths the selection is lifted to the innermost
    /// document containing both, covering whole tables.
    pub fn set_selection_end(&mut self, id: i32, cursor: &Cursor) -> bool {
        let Some(anchor) = self.selection_anchors.get(&id).cloned() else {
            log::warn!("Document::set_selection_end: selection {id} was never started");
            return false;
        };
        let common = anchor
            .frames()
            .iter()
            .zip(cursor.frames())
            .take_while(|(a, b)| a.parag == b.parag && a.index == b.index && a.cell == b.cell)
            .count();
        let lift = |c: &Cursor| match c.frames().get(common) {
            Some(frame) => (TextPos::new(frame.parag, frame.index), true),
            None => (TextPos::new(c.parag(), c.index()), false),
        };
        let (mut a, a_deep) = lift(&anchor);
        let (mut b, b_deep) = lift(cursor);

        self.remove_selection(id);
        let Some(doc) = self.nested_mut(&anchor.frames()[..common]) else {
            return false;
        };
        let (ka, kb) = (doc.pos_key(a), doc.pos_key(b));
        if ka == kb && a_deep && b_deep {
            b.index += 1;
        } else if ka > kb && a_deep {
            a.index += 1;
        } else if kb > ka && b_deep {
            b.index += 1;
        }
        doc.set_selection(id, a, b);
        true
    }

    /// Drop selection `id` here and in every nested document
    pub fn remove_selection(&mut self, id: i32) -> bool {
        let mut removed = self.selections.remove(&id).is_some();
        self.for_each_nested_mut(&mut |doc| {
            removed |= doc.selections.remove(&id).is_some();
        });
        removed
    }

    pub fn has_selection(&self, id: i32) -> bool {
        self.selection_path(id).is_some()
    }

    /// Nesting path of the document that holds selection `id`
    pub fn selection_path(&self, id: i32) -> Option<Vec<NestStep>> {
        if self.selections.contains_key(&id) {
            return Some(Vec::new());
        }
        for (_, parag) in self.iter() {
            for (index, item) in parag.custom_items() {
                let Some(table) = item.as_table() else {
                    continue;
                };
                for (cell, c) in table.cells().iter().enumerate() {
                    if let Some(mut path) = c.document().selection_path(id) {
                        path.insert(
                            0,
                            NestStep {
                                parag: parag.number(),
                                index,
                                cell,
                            },
                        );
                        return Some(path);
                    }
                }
            }
        }
        None
    }

    fn text_between(&self, start: TextPos, end: TextPos) -> String {
        let mut out = String::new();
        let mut cur = Some(start.parag);
        while let Some(id) = cur {
            let Some(parag) = self.parags.get(id) else {
                break;
            };
            let from = if id == start.parag { start.index } else { 0 };
            let to = if id == end.parag {
                end.index
            } else {
                parag.length() - 1
            };
            for cell in parag.string().chars().iter().take(to).skip(from) {
                match cell.c {
                    OBJECT_REPLACEMENT if cell.is_custom() => {}
                    LINE_SEPARATOR => out.push('\n'),
                    c => out.push(c),
                }
            }
            if id == end.parag {
                break;
            }
            out.push('\n');
            cur = parag.next;
        }
        out
    }

    pub fn selected_text(&self, id: i32) -> String {
        let Some(path) = self.selection_path(id) else {
            return String::new();
        };
        let Some(doc) = self.nested_by_path(&path) else {
            return String::new();
        };
        match doc.selections.get(&id) {
            Some(sel) => doc.text_between(sel.start, sel.end),
            None => String::new(),
        }
    }

    pub fn select_all(&mut self, id: i32) {
        let last = self.last;
        let end = self.parags.get(last).map(|p| p.length() - 1).unwrap_or(0);
        self.set_selection(id, TextPos::new(self.first, 0), TextPos::new(last, end));
    }

    /// Cursor at the start of selection `id`
    pub fn selection_start_cursor(&self, id: i32) -> Option<Cursor> {
        let path = self.selection_path(id)?;
        let doc = self.nested_by_path(&path)?;
        let sel = doc.selections.get(&id)?;
        let pos = DocPos {
            path,
            parag: doc.parag(sel.start.parag)?.number(),
            index: sel.start.index,
        };
        Cursor::from_doc_pos(self, &pos)
    }

    /// Delete the text of selection `id` as one undoable command and put the
    /// cursor where it was
    pub fn remove_selected_text(&mut self, id: i32, cursor: &mut Cursor) -> bool {
        let Some(path) = self.selection_path(id) else {
            return false;
        };
        let Some(doc) = self.nested_by_path_mut(&path) else {
            return false;
        };
        let Some(sel) = doc.selections.remove(&id) else {
            return false;
        };
        let Some(number) = doc.parag(sel.start.parag).map(|p| p.number()) else {
            return false;
        };
        let cells = doc.remove_range(sel.start, sel.end);
        doc.format_parag(sel.start.parag, true);
        let pos = DocPos {
            path,
            parag: number,
            index: sel.start.index,
        };
        if let Some(c) = Cursor::from_doc_pos(self, &pos) {
            self.invalidate_nesting(c.frames());
            *cursor = c;
        }
        self.history.add_command(Command::delete(pos, cells));
        true
    }

    // Recorded edits

    /// Insert `text` at the cursor as one undoable command
    pub fn insert_text(&mut self, cursor: &mut Cursor, text: &str) {
        let text = text.replace("\r\n", "\n");
        let Some(pos) = cursor.doc_pos(self) else {
            log::warn!("Document::insert_text: cursor is not valid");
            return;
        };
        cursor.insert(self, &text, true);
        self.history
            .add_command(Command::insert(pos, text.chars().count()));
    }

    /// Delete the character after the cursor (joining paragraphs at the end
    /// of one) as one undoable command
    pub fn delete_char(&mut self, cursor: &mut Cursor) -> bool {
        let Some(pos) = cursor.doc_pos(self) else {
            return false;
        };
        let frames = cursor.frames().to_vec();
        let Some(doc) = self.nested_mut(&frames) else {
            return false;
        };
        let start = TextPos::new(cursor.parag(), cursor.index());
        let end = doc.advance(start, 1);
        if end == start {
            return false;
        }
        let cells = doc.remove_range(start, end);
        doc.format_parag(start.parag, true);
        self.invalidate_nesting(&frames);
        self.history.add_command(Command::delete(pos, cells));
        true
    }

    /// Merge `format` into the text of selection `id`. Recorded for redo;
    /// undo leaves the formats as they are.
    pub fn set_format(&mut self, id: i32, format: &Format, mask: u32) -> bool {
        let Some(path) = self.selection_path(id) else {
            return false;
        };
        let Some(doc) = self.nested_by_path_mut(&path) else {
            return false;
        };
        let Some(sel) = doc.selections.get(&id).copied() else {
            return false;
        };
        let (Some(start), Some(end)) = (
            doc.parag(sel.start.parag).map(|p| p.number()),
            doc.parag(sel.end.parag).map(|p| p.number()),
        ) else {
            return false;
        };
        doc.apply_format(sel.start, sel.end, format, mask);
        let start = DocPos {
            path: path.clone(),
            parag: start,
            index: sel.start.index,
        };
        let end = DocPos {
            path,
            parag: end,
            index: sel.end.index,
        };
        self.history
            .add_command(Command::format_change(start, end, format.clone(), mask));
        true
    }

    pub fn undo(&mut self, cursor: &mut Cursor) -> bool {
        if !self.history.is_undo_available() {
            return false;
        }
        let mut history = std::mem::take(&mut self.history);
        let result = history.undo(self);
        self.history = history;
        if let Some(c) = result {
            *cursor = c;
        }
        true
    }

    pub fn redo(&mut self, cursor: &mut Cursor) -> bool {
        if !self.history.is_redo_available() {
            return false;
        }
        let mut history = std::mem::take(&mut self.history);
        let result = history.redo(self);
        self.history = history;
        if let Some(c) = result {
            *cursor = c;
        }
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.is_undo_available()
    }

    pub fn can_redo(&self) -> bool {
        self.history.is_redo_available()
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    // Find

    /// Search for `expr` from the cursor. On success the match becomes the
    /// search selection and the cursor moves past it (before it when
    /// searching backwards).
    pub fn find(
        &mut self,
        expr: &str,
        case_sensitive: bool,
        whole_word: bool,
        forward: bool,
        cursor: &mut Cursor,
    ) -> bool {
        let mut pattern = regex::escape(expr);
        if whole_word {
            pattern = format!(r"\b{pattern}\b");
        }
        let re = match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(re) => re,
            Err(err) => {
                log::warn!("Document::find: bad expression {expr:?}: {err}");
                return false;
            }
        };
        let frames = cursor.frames().to_vec();
        let Some(doc) = self.nested_mut(&frames) else {
            return false;
        };

        let mut cur = Some(cursor.parag());
        let mut first = true;
        while let Some(id) = cur {
            let Some(parag) = doc.parags.get(id) else {
                return false;
            };
            let text = parag.string().to_string_range(0, parag.length() - 1);
            let found = if forward {
                let from = if first { byte_index(&text, cursor.index()) } else { 0 };
                re.find_at(&text, from)
                    .map(|m| (char_index(&text, m.start()), char_index(&text, m.end())))
            } else {
                let limit = if first { cursor.index() } else { usize::MAX };
                re.find_iter(&text)
                    .map(|m| (char_index(&text, m.start()), char_index(&text, m.end())))
                    .filter(|(_, end)| *end <= limit)
                    .filter(|(start, _)| !first || *start < cursor.index())
                    .last()
            };
            if let Some((start, end)) = found {
                doc.set_selection(SELECTION_SEARCH, TextPos::new(id, start), TextPos::new(id, end));
                cursor.set_position(id, if forward { end } else { start });
                return true;
            }
            cur = if forward { parag.next } else { parag.prev };
            first = false;
        }
        false
    }

    // Completion

    pub fn add_completion_entry(&mut self, word: &str) {
        self.completions.insert(word.to_string());
    }

    /// Known words starting with `prefix`, sorted
    pub fn completions(&self, prefix: &str) -> Vec<String> {
        self.completions
            .range(prefix.to_string()..)
            .take_while(|w| w.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> DocumentStats {
        DocumentStats {
            paragraphs: self.paragraph_count(),
            height: self.height(),
            minimum_width: self.min_width,
            widest_line: self.widest_line,
            formats: self.formats.borrow().size(),
        }
    }

    // Painting

    /// Format what is out of date, then paint everything intersecting `clip`
    pub fn draw(&mut self, p: &mut dyn DrawContext, clip: Rect, palette: &Palette) {
        self.format_all();
        self.paint(p, clip, palette);
    }

    /// Paint with the layout as it is. An empty `clip` paints everything.
    pub fn paint(&self, p: &mut dyn DrawContext, clip: Rect, palette: &Palette) {
        for (id, parag) in self.iter() {
            let r = parag.rect;
            if !clip.is_empty() {
                if r.y >= clip.bottom() {
                    break;
                }
                if r.bottom() <= clip.y {
                    continue;
                }
            }
            self.paint_parag(p, id, parag, clip, palette);
        }
        self.paint_floating_items(p, clip, palette);
    }

    fn paint_floating_items(&self, p: &mut dyn DrawContext, clip: Rect, palette: &Palette) {
        let visible = self.flow.visible_items(clip);
        if visible.is_empty() {
            return;
        }
        for (_, parag) in self.iter() {
            if parag.floating_items().is_empty() {
                continue;
            }
            for (_, item) in parag.custom_items() {
                if item.is_floating() && item.is_positioned() && visible.contains(&item.id()) {
                    item.draw(p, item.xpos, item.ypos, clip, palette);
                }
            }
        }
    }

    /// Selected character ranges of one paragraph, ordered by selection id
    fn selection_ranges(&self, parag: &Paragraph) -> Vec<(i32, usize, usize)> {
        let n = parag.number();
        let len = parag.length();
        self.selections
            .iter()
            .filter_map(|(id, sel)| {
                let (sn, si) = self.pos_key(sel.start);
                let (en, ei) = self.pos_key(sel.end);
                if n < sn || n > en {
                    return None;
                }
                let from = if n == sn { si } else { 0 };
                let to = if n == en { ei } else { len };
                (from < to).then_some((*id, from, to))
            })
            .collect()
    }

    fn selection_color(&self, id: i32, palette: &Palette) -> Color {
        if id == SELECTION_STANDARD {
            return palette.highlight;
        }
        self.selection_colors
            .get(&id)
            .copied()
            .unwrap_or(palette.highlight)
    }

    fn cell_width(&self, cell: &TextChar) -> i32 {
        match cell.custom_item() {
            Some(item) if item.is_floating() => 0,
            Some(item) => item.width,
            None => cell.format().width(self.metrics.as_ref(), cell.c),
        }
    }

    fn paint_parag(
        &self,
        p: &mut dyn DrawContext,
        id: ParagId,
        parag: &Paragraph,
        clip: Rect,
        palette: &Palette,
    ) {
        let rect = parag.rect;
        let ranges = self.selection_ranges(parag);
        let selection_at = |i: usize| {
            ranges
                .iter()
                .find(|(_, from, to)| i >= *from && i < *to)
                .map(|(sid, _, _)| *sid)
        };
        let chars = parag.string().chars();
        let len = chars.len();
        let mut i = 0;
        while i < len {
            let cell = &chars[i];
            let Some((_, line)) = parag.line_start_of_char(i) else {
                i += 1;
                continue;
            };
            let line_y = rect.y + line.y;
            let line_rect = Rect::new(rect.x, line_y, rect.w.max(self.width), line.h);
            if !clip.is_empty() && !line_rect.intersects(&clip) {
                i += 1;
                continue;
            }

            if let Some(item) = cell.custom_item() {
                if !item.is_floating() {
                    let top = line_y + line.baseline - item.ascent();
                    item.draw(p, rect.x + cell.x, top, clip, palette);
                    if let Some(sid) = selection_at(i) {
                        p.set_color(self.selection_color(sid, palette));
                        p.draw_rect_filled(rect.x + cell.x, line_y, item.width, 2);
                    }
                }
                i += 1;
                continue;
            }

            if cell.c == '\t' || cell.c == LINE_SEPARATOR || i == len - 1 {
                if let Some(sid) = selection_at(i) {
                    let w = self.cell_width(cell).max(1);
                    p.set_color(self.selection_color(sid, palette));
                    p.draw_rect_filled(rect.x + cell.x, line_y, w, line.h);
                }
                i += 1;
                continue;
            }

            // Batch a run of characters sharing format, direction and
            // selection that sit next to each other
            let format = cell.format();
            let rtl = cell.right_to_left;
            let sel = selection_at(i);
            let mut left = cell.x;
            let mut right = cell.x + self.cell_width(cell);
            let mut j = i + 1;
            while j < len - 1 {
                let next = &chars[j];
                if next.is_custom()
                    || next.line_start
                    || next.c == '\t'
                    || next.c == LINE_SEPARATOR
                    || next.right_to_left != rtl
                    || !Rc::ptr_eq(next.format(), format)
                    || selection_at(j) != sel
                {
                    break;
                }
                let w = self.cell_width(next);
                if rtl {
                    if next.x + w != left {
                        break;
                    }
                    left = next.x;
                } else {
                    if next.x != right {
                        break;
                    }
                    right = next.x + w;
                }
                j += 1;
            }

            let text: String = if rtl {
                chars[i..j].iter().rev().map(|c| bidi::mirrored_char(c.c)).collect()
            } else {
                chars[i..j].iter().map(|c| c.c).collect()
            };
            self.paint_run(p, &text, format, rect.x + left, right - left, line_y, line, sel, palette);
            i = j;
        }

        if parag.is_list_item() {
            self.paint_list_label(p, id, parag, palette);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_run(
        &self,
        p: &mut dyn DrawContext,
        text: &str,
        format: &FormatRef,
        x: i32,
        w: i32,
        line_y: i32,
        line: &LineStart,
        selection: Option<i32>,
        palette: &Palette,
    ) {
        if let Some(sid) = selection {
            p.set_color(self.selection_color(sid, palette));
            p.draw_rect_filled(x, line_y, w, line.h);
        }
        let mut baseline = line_y + line.baseline;
        let ascent = format.ascent(self.metrics.as_ref());
        match format.vertical_alignment() {
            VerticalAlignment::SubScript => baseline += ascent / 3,
            VerticalAlignment::SuperScript => baseline -= ascent / 3,
            VerticalAlignment::Normal => {}
        }
        let color = if selection == Some(SELECTION_STANDARD) {
            palette.highlighted_text
        } else if format.is_anchor() && !format.anchor_href().is_empty() {
            self.link_color
        } else {
            format.color().unwrap_or(palette.text)
        };
        let font = format.effective_font();
        p.set_font(&font);
        p.set_color(color);
        p.draw_text(text, x, baseline);
        let link = format.is_anchor() && !format.anchor_href().is_empty() && self.underline_links;
        if font.underline || link {
            p.draw_line(x, baseline + 1, x + w - 1, baseline + 1);
        }
        if format.is_misspelled() {
            p.set_color(0xFF0000FF);
            p.draw_line(x, baseline + 2, x + w - 1, baseline + 2);
        }
    }

    fn paint_list_label(&self, p: &mut dyn DrawContext, id: ParagId, parag: &Paragraph, palette: &Palette) {
        let Some((_, line)) = parag.line_start_of_line(0) else {
            return;
        };
        let Some(format) = parag.at(0).map(|c| c.format().clone()) else {
            return;
        };
        let style = parag.list_style().unwrap_or_default();
        let rect = parag.rect;
        let right = rect.x + parag.left_margin() - 6;
        let baseline = rect.y + line.y + line.baseline;
        p.set_color(format.color().unwrap_or(palette.text));
        if style.is_ordered() {
            let label = style.label(self.list_number(id));
            let font = format.effective_font();
            let w = self.metrics.text_width(&font, &label);
            p.set_font(&font);
            p.draw_text(&label, right - w, baseline);
        } else {
            let size = (line.baseline / 3).max(3);
            let x = right - size;
            let y = baseline - line.baseline / 2 - size / 2;
            match style {
                ListStyle::Circle => {
                    p.draw_line(x, y, x + size - 1, y);
                    p.draw_line(x, y + size - 1, x + size - 1, y + size - 1);
                    p.draw_line(x, y, x, y + size - 1);
                    p.draw_line(x + size - 1, y, x + size - 1, y + size - 1);
                }
                _ => p.draw_rect_filled(x, y, size, size),
            }
        }
    }

    /// Vertical bar at the cursor position
    pub fn draw_cursor(&self, p: &mut dyn DrawContext, cursor: &Cursor, palette: &Palette) {
        let Some((x, y, h)) = cursor.geometry(self) else {
            return;
        };
        p.set_color(palette.text);
        p.draw_line(x, y, x, y + h - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw_context::FixedMetrics;
    use crate::richtext::format::changes;

    fn doc(text: &str) -> Document {
        let mut doc = Document::new(Rc::new(FixedMetrics::default()));
        doc.set_plain_text(text);
        doc
    }

    fn texts(doc: &Document) -> Vec<String> {
        doc.iter().map(|(_, p)| p.text()).collect()
    }

    #[test]
    fn test_plain_text_paragraphs() {
        let d = doc("abc\ndef");
        assert_eq!(d.paragraph_count(), 2);
        assert_eq!(d.text_of(0).as_deref(), Some("abc "));
        assert_eq!(d.text_of(1).as_deref(), Some("def "));
        assert_eq!(d.parag(d.first_parag()).unwrap().length(), 4);
        assert_eq!(d.plain_text(), "abc \ndef \n");
        assert_eq!(d.parag(d.last_parag()).unwrap().number(), 1);
    }

    #[test]
    fn test_untabify() {
        let mut d = Document::new(Rc::new(FixedMetrics::default()));
        d.set_untabify(true);
        d.set_plain_text("\tx\n\t\ty");
        assert_eq!(d.text_of(0).as_deref(), Some("    x "));
        assert_eq!(d.plain_text(), "\tx \n\t\ty \n");
    }

    #[test]
    fn test_layout_stacks_paragraphs() {
        let mut d = doc("abc\ndef");
        d.set_width(100);
        d.do_layout();
        let second = d.last_parag();
        assert_eq!(d.parag(second).unwrap().rect().y, 15);
        assert_eq!(d.height(), 30);
        assert_eq!(d.widest_line(), 24);
        assert_eq!(d.parag_at_y(20), second);
    }

    #[test]
    fn test_cascade_moves_full_width_paragraphs_only() {
        let mut d = doc("a\nb\nc");
        d.set_width(100);
        d.do_layout();
        let ids = d.parag_ids();
        let f = d.default_format();
        d.parag_mut(ids[0]).unwrap().insert(1, " long long long long", &f);
        d.format_parag(ids[0], true);
        assert_eq!(d.parag(ids[0]).unwrap().rect().h, 30);
        let second = d.parag(ids[1]).unwrap();
        assert!(second.is_valid());
        assert_eq!(second.rect().y, 30);
        assert_eq!(d.parag(ids[2]).unwrap().rect().y, 45);
    }

    #[test]
    fn test_cascade_invalidates_from_first_non_full_width() {
        let mut d = doc("a\nb\nc");
        d.set_width(100);
        let ids = d.parag_ids();
        let id = d.alloc_item_id();
        d.insert_custom_item(ids[1], 0, CustomItem::image(id, "x.png", 20, 10, Placement::Left));
        d.do_layout();
        assert!(!d.parag(ids[1]).unwrap().is_full_width());
        assert!(d.parag(ids[2]).unwrap().is_full_width());

        let f = d.default_format();
        d.parag_mut(ids[0]).unwrap().insert(1, " long long long long", &f);
        d.format_parag(ids[0], true);
        assert!(!d.parag(ids[1]).unwrap().is_valid());
        assert!(!d.parag(ids[2]).unwrap().is_valid());
    }

    #[test]
    fn test_removing_floating_image_unregisters_it() {
        let mut d = doc("abcdef");
        d.set_width(200);
        let first = d.first_parag();
        let id = d.alloc_item_id();
        d.insert_custom_item(first, 2, CustomItem::image(id, "x.png", 20, 20, Placement::Left));
        d.do_layout();
        assert!(d.flow().is_registered(id));
        let removed = d.remove_cells(first, 0, 3);
        assert_eq!(removed.len(), 3);
        assert!(removed.iter().any(|c| c.is_custom()));
        drop(removed);
        assert!(!d.flow().is_registered(id));
        assert!(d.parag(first).unwrap().floating_items().is_empty());
        assert_eq!(d.plain_text(), "cdef \n");
    }

    #[test]
    fn test_split_and_join() {
        let mut d = doc("abcd");
        let first = d.first_parag();
        let second = d.split_parag(first, 2, true);
        assert_eq!(texts(&d), vec!["ab ", "cd "]);
        assert_eq!(d.parag(second).unwrap().number(), 1);
        assert!(d.join(first));
        assert_eq!(texts(&d), vec!["abcd "]);
        assert!(!d.join(first));
    }

    #[test]
    fn test_split_at_edges() {
        let mut d = doc("ab");
        let first = d.first_parag();
        assert_eq!(d.split_parag(first, 0, true), first);
        assert_eq!(texts(&d), vec![" ", "ab "]);
        let after = d.split_parag(first, 2, true);
        assert_ne!(after, first);
        assert_eq!(texts(&d), vec![" ", "ab ", " "]);
    }

    #[test]
    fn test_remove_and_reinsert_range() {
        let mut d = doc("one\ntwo\nthree");
        let start = TextPos::new(d.first_parag(), 1);
        let end = TextPos::new(d.last_parag(), 2);
        let cells = d.remove_range(start, end);
        let removed: String = cells.iter().map(|c| c.c).collect();
        assert_eq!(removed, "ne\ntwo\nth");
        assert_eq!(d.plain_text(), "oree \n");
        let after = d.insert_cells_at(TextPos::new(d.first_parag(), 1), cells);
        assert_eq!(d.plain_text(), "one \ntwo \nthree \n");
        assert_eq!(after.index, 2);
        assert_eq!(d.parag(after.parag).unwrap().number(), 2);
    }

    #[test]
    fn test_apply_format_across_paragraphs() {
        let mut d = doc("ab\ncd");
        let start = TextPos::new(d.first_parag(), 1);
        let end = TextPos::new(d.last_parag(), 1);
        d.apply_format(start, end, &Format::default().with_bold(true), changes::BOLD);
        let bold = |d: &Document, id: ParagId, i: usize| d.parag(id).unwrap().at(i).unwrap().format().font().bold;
        assert!(!bold(&d, d.first_parag(), 0));
        assert!(bold(&d, d.first_parag(), 1));
        assert!(bold(&d, d.last_parag(), 0));
        assert!(!bold(&d, d.last_parag(), 1));
    }

    #[test]
    fn test_lists() {
        let mut d = doc("a\nb");
        let ids = d.parag_ids();
        d.set_list(ids[0], Some(ListStyle::Decimal));
        d.set_list(ids[1], Some(ListStyle::Decimal));
        let p = d.parag(ids[0]).unwrap();
        assert!(p.is_list_item());
        assert_eq!(p.list_style(), Some(ListStyle::Decimal));
        assert_eq!(p.left_margin(), 40);
        assert_eq!(d.list_number(ids[1]), 2);

        d.inc_depth(ids[1]);
        assert_eq!(d.parag(ids[1]).unwrap().list_depth(), 2);
        assert_eq!(d.list_number(ids[1]), 1);
        d.dec_depth(ids[1]);
        assert_eq!(d.parag(ids[1]).unwrap().list_depth(), 1);
        d.set_list(ids[1], None);
        assert!(!d.parag(ids[1]).unwrap().is_list_item());
    }

    #[test]
    fn test_find() {
        let mut d = doc("hello world\nworld again");
        let mut c = Cursor::new(&d);
        assert!(d.find("world", true, false, true, &mut c));
        assert_eq!((c.parag(), c.index()), (d.first_parag(), 11));
        assert_eq!(d.selected_text(SELECTION_SEARCH), "world");
        assert!(d.find("WORLD", false, false, true, &mut c));
        assert_eq!((c.parag(), c.index()), (d.last_parag(), 5));
        assert!(!d.find("world", true, false, true, &mut c));
        assert!(d.find("world", true, false, false, &mut c));
        assert_eq!(c.index(), 0);
        let mut c = Cursor::new(&d);
        assert!(!d.find("wor", true, true, true, &mut c));
    }

    #[test]
    fn test_selections() {
        let mut d = doc("hello\nworld");
        let a = Cursor::at(d.first_parag(), 3);
        let b = Cursor::at(d.last_parag(), 2);
        d.set_selection_start(SELECTION_STANDARD, &b);
        assert!(d.set_selection_end(SELECTION_STANDARD, &a));
        let sel = d.selection(SELECTION_STANDARD).unwrap();
        assert!(sel.swapped);
        assert_eq!(sel.start, TextPos::new(d.first_parag(), 3));
        assert_eq!(d.selected_text(SELECTION_STANDARD), "lo\nwo");

        let mut c = Cursor::new(&d);
        assert!(d.remove_selected_text(SELECTION_STANDARD, &mut c));
        assert_eq!(d.plain_text(), "helrld \n");
        assert_eq!(c.index(), 3);
        assert!(!d.has_selection(SELECTION_STANDARD));
        assert!(d.undo(&mut c));
        assert_eq!(d.plain_text(), "hello \nworld \n");
    }

    #[test]
    fn test_recorded_edits_undo_redo() {
        let mut d = doc("ab");
        let mut c = Cursor::at(d.first_parag(), 1);
        d.insert_text(&mut c, "X\nY");
        assert_eq!(d.plain_text(), "aX \nYb \n");
        assert_eq!(c.index(), 1);
        assert_eq!(c.parag(), d.last_parag());

        assert!(d.undo(&mut c));
        assert_eq!(d.plain_text(), "ab \n");
        assert_eq!((c.parag(), c.index()), (d.first_parag(), 1));
        assert!(d.redo(&mut c));
        assert_eq!(d.plain_text(), "aX \nYb \n");
        assert!(!d.can_redo());

        let mut c = Cursor::at(d.first_parag(), 2);
        assert!(d.delete_char(&mut c));
        assert_eq!(d.plain_text(), "aXYb \n");
        assert!(d.undo(&mut c));
        assert_eq!(d.plain_text(), "aX \nYb \n");
    }

    #[test]
    fn test_format_change_is_not_undone() {
        let mut d = doc("abc");
        d.select_all(SELECTION_STANDARD);
        assert!(d.set_format(SELECTION_STANDARD, &Format::default().with_italic(true), changes::ITALIC));
        let mut c = Cursor::new(&d);
        assert!(d.undo(&mut c));
        let first = d.first_parag();
        assert!(d.parag(first).unwrap().at(0).unwrap().format().font().italic);
    }

    #[test]
    fn test_completions() {
        let mut d = doc("");
        for w in ["help", "hello", "world"] {
            d.add_completion_entry(w);
        }
        assert_eq!(d.completions("hel"), vec!["hello", "help"]);
        assert!(d.completions("x").is_empty());
    }

    #[test]
    fn test_line_height_fallback() {
        let mut d = doc("abc");
        d.set_width(100);
        let first = d.first_parag();
        assert_eq!(d.line_height_of_char(first, 1), 15);
        assert_eq!(d.lines(first), 1);
        assert_eq!(d.line_of_char(first, 2), Some((0, 0)));
    }

    #[test]
    fn test_set_text_auto_detects_markup() {
        let mut d = doc("");
        d.set_text("<p>hi</p>", TextFormat::AutoText);
        assert_eq!(d.plain_text(), "hi \n");
        d.set_text("<not markup", TextFormat::AutoText);
        assert_eq!(d.plain_text(), "<not markup \n");
    }
}
