// Drawing backend traits - abstracts over the host's painter and font metrics
// The text engine only talks to these; FLTK and SVG implementations live elsewhere

use crate::richtext::format::Font;

/// RGBA color packed as 0xRRGGBBAA
pub type Color = u32;

/// An axis-aligned rectangle in document coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Rect { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.w, self.h)
    }
}

/// Per-character measurements supplied by the host
pub trait FontMetrics {
    fn char_width(&self, font: &Font, c: char) -> i32;
    fn ascent(&self, font: &Font) -> i32;
    fn descent(&self, font: &Font) -> i32;

    fn height(&self, font: &Font) -> i32 {
        self.ascent(font) + self.descent(font) + 1
    }

    fn line_spacing(&self, font: &Font) -> i32 {
        self.height(font)
    }

    fn text_width(&self, font: &Font, text: &str) -> i32 {
        text.chars().map(|c| self.char_width(font, c)).sum()
    }
}

/// Painter capability. Text is drawn with `y` at the baseline.
pub trait DrawContext: FontMetrics {
    fn set_font(&mut self, font: &Font);
    fn set_color(&mut self, color: Color);
    fn draw_text(&mut self, text: &str, x: i32, y: i32);
    fn draw_rect_filled(&mut self, x: i32, y: i32, w: i32, h: i32);
    fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32);
    fn draw_image(&mut self, source: &str, x: i32, y: i32, w: i32, h: i32);
    fn push_clip(&mut self, rect: Rect);
    fn pop_clip(&mut self);
    fn translate(&mut self, dx: i32, dy: i32);
}

/// Colors used while painting (the "color group")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub text: Color,
    pub base: Color,
    pub highlight: Color,
    pub highlighted_text: Color,
    pub link: Color,
    pub mid: Color,
    pub dark: Color,
    pub light: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            text: 0x000000FF,
            base: 0xFFFFFFFF,
            highlight: 0xB4D5FEFF, // Light blue selection color
            highlighted_text: 0x000000FF,
            link: 0x0000EEFF,
            mid: 0xA0A0A0FF,
            dark: 0x808080FF,
            light: 0xF0F0F0FF,
        }
    }
}

/// Deterministic metrics where every glyph has the same advance.
/// Used by the CLI and by tests; scales with the font's point size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMetrics {
    /// Advance of one character at the reference size
    pub advance: i32,
    pub ascent: i32,
    pub descent: i32,
    /// Point size at which the numbers above apply
    pub reference_size: i32,
}

impl FixedMetrics {
    pub fn new(advance: i32, ascent: i32, descent: i32) -> Self {
        FixedMetrics {
            advance,
            ascent,
            descent,
            reference_size: 12,
        }
    }

    fn scale(&self, value: i32, font: &Font) -> i32 {
        if self.reference_size <= 0 || font.point_size == self.reference_size {
            return value;
        }
        (value * font.point_size + self.reference_size / 2) / self.reference_size
    }
}

impl Default for FixedMetrics {
    fn default() -> Self {
        FixedMetrics::new(8, 11, 3)
    }
}

impl FontMetrics for FixedMetrics {
    fn char_width(&self, font: &Font, c: char) -> i32 {
        if is_zero_width(c) {
            return 0;
        }
        self.scale(self.advance, font)
    }

    fn ascent(&self, font: &Font) -> i32 {
        self.scale(self.ascent, font)
    }

    fn descent(&self, font: &Font) -> i32 {
        self.scale(self.descent, font)
    }
}

/// Formatting characters that never take horizontal space
pub fn is_zero_width(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{FEFF}'
    )
}

pub fn color_average(c1: Color, c2: Color, weight: f32) -> Color {
    let r1 = ((c1 >> 24) & 0xFF) as f32;
    let g1 = ((c1 >> 16) & 0xFF) as f32;
    let b1 = ((c1 >> 8) & 0xFF) as f32;

    let r2 = ((c2 >> 24) & 0xFF) as f32;
    let g2 = ((c2 >> 16) & 0xFF) as f32;
    let b2 = ((c2 >> 8) & 0xFF) as f32;

    let r = (r1 * (1.0 - weight) + r2 * weight) as u32;
    let g = (g1 * (1.0 - weight) + g2 * weight) as u32;
    let b = (b1 * (1.0 - weight) + b2 * weight) as u32;

    (r << 24) | (g << 16) | (b << 8) | 0xFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(&Rect::new(5, 5, 10, 10)));
        assert!(!a.intersects(&Rect::new(10, 0, 5, 5)));
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 9));
    }

    #[test]
    fn test_fixed_metrics_scale_with_size() {
        let m = FixedMetrics::default();
        let mut font = Font::default();
        font.point_size = 24;
        assert_eq!(m.char_width(&font, 'a'), 16);
        assert_eq!(m.char_width(&font, '\u{202B}'), 0);
        font.point_size = 12;
        assert_eq!(m.height(&font), 15);
    }

    #[test]
    fn test_color_average() {
        assert_eq!(color_average(0x000000FF, 0xFFFFFFFF, 0.0), 0x000000FF);
        assert_eq!(color_average(0x000000FF, 0xFFFFFFFF, 1.0), 0xFFFFFFFF);
    }
}
