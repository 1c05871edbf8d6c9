// Character formats and the format collection
// Runs of identically formatted characters share one interned Format

use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;

use crate::draw_context::{Color, FontMetrics};

/// Font descriptor (family, size and style flags)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Font {
    pub family: String,
    pub point_size: i32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl Default for Font {
    fn default() -> Self {
        Font {
            family: "helvetica".to_string(),
            point_size: 12,
            bold: false,
            italic: false,
            underline: false,
        }
    }
}

impl Font {
    pub fn new(family: impl Into<String>, point_size: i32) -> Self {
        Font {
            family: family.into(),
            point_size,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerticalAlignment {
    #[default]
    Normal,
    SubScript,
    SuperScript,
}

/// Attribute bits accepted by `FormatCollection::merge`
pub mod changes {
    pub const BOLD: u32 = 1;
    pub const ITALIC: u32 = 2;
    pub const UNDERLINE: u32 = 4;
    pub const FAMILY: u32 = 8;
    pub const SIZE: u32 = 16;
    pub const COLOR: u32 = 32;
    pub const MISSPELLED: u32 = 64;
    pub const VALIGN: u32 = 128;
    pub const FONT: u32 = BOLD | ITALIC | UNDERLINE | FAMILY | SIZE;
    pub const FORMAT: u32 = FONT | COLOR | MISSPELLED | VALIGN;
}

/// An attribute bundle. Immutable once shared through a `FormatRef`.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    font: Font,
    color: Option<Color>,
    anchor_href: String,
    anchor_name: String,
    misspelled: bool,
    logical_size: i32,
    valign: VerticalAlignment,
    key: String,
}

pub type FormatRef = Rc<Format>;

impl Default for Format {
    fn default() -> Self {
        Format::new(Font::default(), None)
    }
}

impl Format {
    pub fn new(font: Font, color: Option<Color>) -> Self {
        let mut f = Format {
            font,
            color,
            anchor_href: String::new(),
            anchor_name: String::new(),
            misspelled: false,
            logical_size: 3,
            valign: VerticalAlignment::Normal,
            key: String::new(),
        };
        f.update_key();
        f
    }

    fn update_key(&mut self) {
        let mut key = String::with_capacity(48);
        let _ = write!(
            key,
            "{}/{}/{}{}{}/{}/{}/{}/{:?}",
            self.font.family,
            self.font.point_size,
            u8::from(self.font.bold),
            u8::from(self.font.italic),
            u8::from(self.font.underline),
            self.color.map(|c| format!("{c:08x}")).unwrap_or_default(),
            u8::from(self.misspelled),
            self.logical_size,
            self.valign,
        );
        if self.is_anchor() {
            let _ = write!(key, "/a:{}#{}", self.anchor_href, self.anchor_name);
        }
        self.key = key;
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn font(&self) -> &Font {
        &self.font
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn anchor_href(&self) -> &str {
        &self.anchor_href
    }

    pub fn anchor_name(&self) -> &str {
        &self.anchor_name
    }

    pub fn is_anchor(&self) -> bool {
        !self.anchor_href.is_empty() || !self.anchor_name.is_empty()
    }

    pub fn is_misspelled(&self) -> bool {
        self.misspelled
    }

    pub fn logical_size(&self) -> i32 {
        self.logical_size
    }

    pub fn vertical_alignment(&self) -> VerticalAlignment {
        self.valign
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.font.bold = bold;
        self.update_key();
        self
    }

    pub fn with_italic(mut self, italic: bool) -> Self {
        self.font.italic = italic;
        self.update_key();
        self
    }

    pub fn with_underline(mut self, underline: bool) -> Self {
        self.font.underline = underline;
        self.update_key();
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.font.family = family.into();
        self.update_key();
        self
    }

    pub fn with_point_size(mut self, size: i32) -> Self {
        self.font.point_size = size;
        self.update_key();
        self
    }

    pub fn with_color(mut self, color: Option<Color>) -> Self {
        self.color = color;
        self.update_key();
        self
    }

    pub fn with_misspelled(mut self, misspelled: bool) -> Self {
        self.misspelled = misspelled;
        self.update_key();
        self
    }

    pub fn with_vertical_alignment(mut self, valign: VerticalAlignment) -> Self {
        self.valign = valign;
        self.update_key();
        self
    }

    /// Map an HTML logical size (1-7) to a point size relative to `base`
    pub fn with_logical_size(mut self, size: i32, base: i32) -> Self {
        const SCALE: [i32; 7] = [60, 80, 100, 120, 150, 200, 240];
        let size = size.clamp(1, 7);
        self.logical_size = size;
        self.font.point_size = (base * SCALE[(size - 1) as usize] + 50) / 100;
        self.update_key();
        self
    }

    pub fn with_anchor(mut self, href: impl Into<String>, name: impl Into<String>) -> Self {
        self.anchor_href = href.into();
        self.anchor_name = name.into();
        self.update_key();
        self
    }

    /// Overwrite the attributes named in `mask` with the ones from `other`
    pub fn copy_attributes(&mut self, other: &Format, mask: u32) {
        if mask & changes::BOLD != 0 {
            self.font.bold = other.font.bold;
        }
        if mask & changes::ITALIC != 0 {
            self.font.italic = other.font.italic;
        }
        if mask & changes::UNDERLINE != 0 {
            self.font.underline = other.font.underline;
        }
        if mask & changes::FAMILY != 0 {
            self.font.family = other.font.family.clone();
        }
        if mask & changes::SIZE != 0 {
            self.font.point_size = other.font.point_size;
            self.logical_size = other.logical_size;
        }
        if mask & changes::COLOR != 0 {
            self.color = other.color;
        }
        if mask & changes::MISSPELLED != 0 {
            self.misspelled = other.misspelled;
        }
        if mask & changes::VALIGN != 0 {
            self.valign = other.valign;
        }
        self.update_key();
    }

    /// Font actually used for measuring; sub/superscript glyphs are smaller
    pub fn effective_font(&self) -> Font {
        match self.valign {
            VerticalAlignment::Normal => self.font.clone(),
            _ => Font {
                point_size: (self.font.point_size * 2 / 3).max(1),
                ..self.font.clone()
            },
        }
    }

    pub fn width(&self, metrics: &dyn FontMetrics, c: char) -> i32 {
        metrics.char_width(&self.effective_font(), c)
    }

    pub fn ascent(&self, metrics: &dyn FontMetrics) -> i32 {
        metrics.ascent(&self.font)
    }

    pub fn descent(&self, metrics: &dyn FontMetrics) -> i32 {
        metrics.descent(&self.font)
    }

    pub fn height(&self, metrics: &dyn FontMetrics) -> i32 {
        metrics.height(&self.font)
    }
}

/// Interns formats by key and hands out shared references.
///
/// Three shortcuts avoid the table lookup: a candidate that already is the
/// canonical instance, a candidate equal to the last returned format, and
/// repeated identical merges. Anchors are never shared.
#[derive(Debug)]
pub struct FormatCollection {
    default_format: FormatRef,
    table: HashMap<String, FormatRef>,
    last_format: Option<FormatRef>,
    merge_cache: Option<MergeCache>,
    font_cache: Option<(Font, Option<Color>, FormatRef)>,
}

#[derive(Debug)]
struct MergeCache {
    old_key: String,
    new_key: String,
    mask: u32,
    result: FormatRef,
}

impl Default for FormatCollection {
    fn default() -> Self {
        Self::new(Format::default())
    }
}

impl FormatCollection {
    pub fn new(default_format: Format) -> Self {
        let default_format = Rc::new(default_format);
        let mut table = HashMap::new();
        table.insert(default_format.key().to_string(), default_format.clone());
        FormatCollection {
            default_format,
            table,
            last_format: None,
            merge_cache: None,
            font_cache: None,
        }
    }

    pub fn default_format(&self) -> FormatRef {
        self.default_format.clone()
    }

    /// Replace the default format; formats already handed out are untouched
    pub fn set_default_format(&mut self, format: Format) {
        let format = self.format_from(format);
        self.default_format = format;
    }

    /// Number of distinct interned formats
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// Canonical shared instance equal in key to `candidate`
    pub fn format(&mut self, candidate: &FormatRef) -> FormatRef {
        if candidate.is_anchor() {
            return Rc::new((**candidate).clone());
        }
        if let Some(existing) = self.table.get(candidate.key())
            && Rc::ptr_eq(existing, candidate)
        {
            return candidate.clone();
        }
        if let Some(last) = &self.last_format
            && last.key() == candidate.key()
        {
            return last.clone();
        }
        let result = self.intern((**candidate).clone());
        self.last_format = Some(result.clone());
        result
    }

    /// Same as `format` for an owned, not yet shared, attribute bundle
    pub fn format_from(&mut self, candidate: Format) -> FormatRef {
        if candidate.is_anchor() {
            return Rc::new(candidate);
        }
        if let Some(last) = &self.last_format
            && last.key() == candidate.key()
        {
            return last.clone();
        }
        let result = self.intern(candidate);
        self.last_format = Some(result.clone());
        result
    }

    /// `old` with the attributes named in `mask` taken from `new`
    pub fn merge(&mut self, old: &FormatRef, new: &Format, mask: u32) -> FormatRef {
        if let Some(cache) = &self.merge_cache
            && cache.mask == mask
            && cache.old_key == old.key()
            && cache.new_key == new.key()
        {
            return cache.result.clone();
        }

        let mut merged = (**old).clone();
        merged.copy_attributes(new, mask);
        if merged.is_anchor() {
            return Rc::new(merged);
        }
        let result = self.intern(merged);
        self.merge_cache = Some(MergeCache {
            old_key: old.key().to_string(),
            new_key: new.key().to_string(),
            mask,
            result: result.clone(),
        });
        result
    }

    /// Convenience path for a plain font/color combination
    pub fn font_format(&mut self, font: &Font, color: Option<Color>) -> FormatRef {
        if let Some((f, c, result)) = &self.font_cache
            && f == font
            && *c == color
        {
            return result.clone();
        }
        let result = self.intern(Format::new(font.clone(), color));
        self.font_cache = Some((font.clone(), color, result.clone()));
        result
    }

    fn intern(&mut self, candidate: Format) -> FormatRef {
        if let Some(existing) = self.table.get(candidate.key()) {
            return existing.clone();
        }
        let key = candidate.key().to_string();
        let shared = Rc::new(candidate);
        self.table.insert(key, shared.clone());
        shared
    }

    /// Drop `format` from the table and from every cache slot referencing it
    pub fn remove(&mut self, format: &FormatRef) {
        if Rc::ptr_eq(format, &self.default_format) {
            log::warn!("FormatCollection::remove: refusing to remove the default format");
            return;
        }
        if self
            .last_format
            .as_ref()
            .is_some_and(|f| Rc::ptr_eq(f, format))
        {
            self.last_format = None;
        }
        if self
            .merge_cache
            .as_ref()
            .is_some_and(|c| Rc::ptr_eq(&c.result, format))
        {
            self.merge_cache = None;
        }
        if self
            .font_cache
            .as_ref()
            .is_some_and(|(_, _, f)| Rc::ptr_eq(f, format))
        {
            self.font_cache = None;
        }
        if let Some(existing) = self.table.get(format.key())
            && Rc::ptr_eq(existing, format)
        {
            self.table.remove(format.key());
        }
    }

    /// References to `format` other than the canonical table entry
    /// (character cells, commands and cache slots)
    pub fn ref_count(&self, format: &FormatRef) -> usize {
        let canonical = self
            .table
            .get(format.key())
            .is_some_and(|f| Rc::ptr_eq(f, format));
        Rc::strong_count(format) - usize::from(canonical)
    }

    fn cache_refs(&self, format: &FormatRef) -> usize {
        let mut n = 0;
        if self
            .last_format
            .as_ref()
            .is_some_and(|f| Rc::ptr_eq(f, format))
        {
            n += 1;
        }
        if self
            .merge_cache
            .as_ref()
            .is_some_and(|c| Rc::ptr_eq(&c.result, format))
        {
            n += 1;
        }
        if self
            .font_cache
            .as_ref()
            .is_some_and(|(_, _, f)| Rc::ptr_eq(f, format))
        {
            n += 1;
        }
        if Rc::ptr_eq(format, &self.default_format) {
            n += 1;
        }
        n
    }

    /// Release every format only referenced by the collection itself
    pub fn collect_garbage(&mut self) -> usize {
        let unused: Vec<FormatRef> = self
            .table
            .values()
            .filter(|f| Rc::strong_count(f) == 1 + self.cache_refs(f))
            .filter(|f| !Rc::ptr_eq(f, &self.default_format))
            .cloned()
            .collect();
        for f in &unused {
            self.remove(f);
        }
        unused.len()
    }
}
