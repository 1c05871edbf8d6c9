// Text String
// Character buffer of a single paragraph. Each cell carries its format,
// layout results and, for embedded objects, the owned custom item.

use unicode_bidi::{BidiClass, bidi_class};

use super::bidi::Direction;
use super::custom_item::CustomItem;
use super::format::FormatRef;

/// Character stored in cells that hold a custom item
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';
/// Forced line break inside a paragraph (`<br>`)
pub const LINE_SEPARATOR: char = '\u{2028}';

/// One character cell
#[derive(Debug)]
pub struct TextChar {
    pub c: char,
    format: FormatRef,
    /// Set by the formatter on the first cell of every visual line
    pub line_start: bool,
    /// X offset relative to the paragraph's left edge, computed by layout
    pub x: i32,
    pub right_to_left: bool,
    custom: Option<Box<CustomItem>>,
}

impl TextChar {
    pub fn new(c: char, format: FormatRef) -> Self {
        TextChar {
            c,
            format,
            line_start: false,
            x: 0,
            right_to_left: false,
            custom: None,
        }
    }

    pub fn with_item(item: Box<CustomItem>, format: FormatRef) -> Self {
        TextChar {
            custom: Some(item),
            ..TextChar::new(OBJECT_REPLACEMENT, format)
        }
    }

    pub fn format(&self) -> &FormatRef {
        &self.format
    }

    pub fn set_format(&mut self, format: FormatRef) {
        self.format = format;
    }

    pub fn is_custom(&self) -> bool {
        self.custom.is_some()
    }

    pub fn custom_item(&self) -> Option<&CustomItem> {
        self.custom.as_deref()
    }

    pub fn custom_item_mut(&mut self) -> Option<&mut CustomItem> {
        self.custom.as_deref_mut()
    }

    pub fn set_custom_item(&mut self, item: Box<CustomItem>) {
        self.c = OBJECT_REPLACEMENT;
        self.custom = Some(item);
    }

    pub fn take_custom_item(&mut self) -> Option<Box<CustomItem>> {
        self.custom.take()
    }

    /// A copy of the character and its format; custom items are not copied
    pub fn plain_copy(&self) -> TextChar {
        TextChar::new(self.c, self.format.clone())
    }
}

/// Paragraph character buffer. Never empty once owned by a paragraph:
/// the last cell is the sentinel space.
#[derive(Debug, Default)]
pub struct TextString {
    data: Vec<TextChar>,
    bidi: bool,
    direction: Direction,
}

impl TextString {
    pub fn new() -> Self {
        TextString::default()
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&TextChar> {
        self.data.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut TextChar> {
        self.data.get_mut(index)
    }

    pub fn chars(&self) -> &[TextChar] {
        &self.data
    }

    pub fn chars_mut(&mut self) -> &mut [TextChar] {
        &mut self.data
    }

    pub fn is_bidi(&self) -> bool {
        self.bidi
    }

    pub fn is_right_to_left(&self) -> bool {
        self.direction == Direction::Rtl
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Splice `text` into the buffer, tagging every character with `format`
    pub fn insert(&mut self, index: usize, text: &str, format: &FormatRef) {
        let index = index.min(self.data.len());
        let cells: Vec<TextChar> = text
            .chars()
            .map(|c| TextChar::new(c, format.clone()))
            .collect();
        self.data.splice(index..index, cells);
        self.check_bidi();
    }

    /// Insert a prebuilt cell (possibly carrying a custom item)
    pub fn insert_char(&mut self, index: usize, cell: TextChar) {
        let index = index.min(self.data.len());
        self.data.insert(index, cell);
        self.check_bidi();
    }

    /// Insert prebuilt cells at `index`
    pub fn insert_cells(&mut self, index: usize, cells: Vec<TextChar>) {
        let index = index.min(self.data.len());
        self.data.splice(index..index, cells);
        self.check_bidi();
    }

    /// Remove `len` cells starting at `index` and hand them back to the caller,
    /// which is responsible for any custom items they carry
    pub fn remove(&mut self, index: usize, len: usize) -> Vec<TextChar> {
        if index >= self.data.len() {
            return Vec::new();
        }
        let end = (index + len).min(self.data.len());
        let removed: Vec<TextChar> = self.data.drain(index..end).collect();
        self.check_bidi();
        removed
    }

    /// Drop everything from `index` onward
    pub fn truncate(&mut self, index: usize) -> Vec<TextChar> {
        if index >= self.data.len() {
            return Vec::new();
        }
        let removed = self.data.split_off(index);
        self.check_bidi();
        removed
    }

    pub fn set_format(&mut self, index: usize, format: &FormatRef) {
        if let Some(cell) = self.data.get_mut(index) {
            cell.set_format(format.clone());
        }
    }

    /// Re-scan the buffer for characters needing bidirectional analysis and
    /// determine the base direction
    pub fn check_bidi(&mut self) {
        self.bidi = self.data.iter().any(|cell| needs_bidi(cell.c));
        self.direction = self.basic_direction();
    }

    /// First strong directional character wins; left-to-right if none
    pub fn basic_direction(&self) -> Direction {
        for cell in &self.data {
            match bidi_class(cell.c) {
                BidiClass::L => return Direction::Ltr,
                BidiClass::R | BidiClass::AL => return Direction::Rtl,
                _ => {}
            }
        }
        Direction::Ltr
    }

    pub fn to_string_range(&self, start: usize, len: usize) -> String {
        self.data
            .iter()
            .skip(start)
            .take(len)
            .map(|cell| cell.c)
            .collect()
    }
}

impl std::fmt::Display for TextString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for cell in &self.data {
            write!(f, "{}", cell.c)?;
        }
        Ok(())
    }
}

/// Rough script heuristic: Hebrew/Arabic/Syriac/Thaana rows, presentation
/// forms, and explicit embedding controls
pub fn needs_bidi(c: char) -> bool {
    let row = (c as u32) >> 8;
    (0x05..=0x08).contains(&row) || (0xFB..=0xFF).contains(&row) || ('\u{202A}'..='\u{202E}').contains(&c)
}
