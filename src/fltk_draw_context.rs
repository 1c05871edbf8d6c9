// FLTK painter
// DrawContext and FontMetrics on top of fltk::draw

use std::collections::HashMap;

use fltk::{draw as fltk_draw, enums, image::SharedImage, prelude::ImageExt};

use crate::draw_context::{Color, DrawContext, FontMetrics, Rect};
use crate::richtext::format::Font;

/// Paints into the current FLTK drawing surface. FLTK has no text
/// transform, so translations are applied to coordinates here.
pub struct FltkDrawContext {
    dx: i32,
    dy: i32,
    font: Option<Font>,
    images: HashMap<String, Option<SharedImage>>,
}

impl Default for FltkDrawContext {
    fn default() -> Self {
        FltkDrawContext::new()
    }
}

impl FltkDrawContext {
    pub fn new() -> Self {
        FltkDrawContext {
            dx: 0,
            dy: 0,
            font: None,
            images: HashMap::new(),
        }
    }

    /// Start painting a widget whose top left corner is at (`x`, `y`)
    pub fn with_origin(x: i32, y: i32) -> Self {
        let mut ctx = FltkDrawContext::new();
        ctx.dx = x;
        ctx.dy = y;
        ctx
    }
}

fn fltk_font(font: &Font) -> enums::Font {
    use enums::Font as F;
    let family = font.family.to_ascii_lowercase();
    let (regular, bold, italic, bold_italic) = match family.as_str() {
        "courier" | "monospace" | "fixed" => (F::Courier, F::CourierBold, F::CourierItalic, F::CourierBoldItalic),
        "times" | "serif" => (F::Times, F::TimesBold, F::TimesItalic, F::TimesBoldItalic),
        _ => (F::Helvetica, F::HelveticaBold, F::HelveticaItalic, F::HelveticaBoldItalic),
    };
    match (font.bold, font.italic) {
        (false, false) => regular,
        (true, false) => bold,
        (false, true) => italic,
        (true, true) => bold_italic,
    }
}

fn select(font: &Font) {
    fltk_draw::set_font(fltk_font(font), font.point_size.max(1));
}

impl FontMetrics for FltkDrawContext {
    fn char_width(&self, font: &Font, c: char) -> i32 {
        select(font);
        let mut buf = [0u8; 4];
        fltk_draw::width(c.encode_utf8(&mut buf)).round() as i32
    }

    fn ascent(&self, font: &Font) -> i32 {
        select(font);
        fltk_draw::height() - fltk_draw::descent()
    }

    fn descent(&self, font: &Font) -> i32 {
        select(font);
        fltk_draw::descent()
    }

    fn height(&self, font: &Font) -> i32 {
        select(font);
        fltk_draw::height()
    }

    fn text_width(&self, font: &Font, text: &str) -> i32 {
        select(font);
        fltk_draw::width(text).round() as i32
    }
}

impl DrawContext for FltkDrawContext {
    fn set_font(&mut self, font: &Font) {
        select(font);
        self.font = Some(font.clone());
    }

    fn set_color(&mut self, color: Color) {
        let r = ((color >> 24) & 0xFF) as u8;
        let g = ((color >> 16) & 0xFF) as u8;
        let b = ((color >> 8) & 0xFF) as u8;
        fltk_draw::set_draw_color(enums::Color::from_rgb(r, g, b));
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32) {
        // measuring may have switched the global font
        if let Some(font) = &self.font {
            select(font);
        }
        fltk_draw::draw_text(text, x + self.dx, y + self.dy);
    }

    fn draw_rect_filled(&mut self, x: i32, y: i32, w: i32, h: i32) {
        fltk_draw::draw_rectf(x + self.dx, y + self.dy, w, h);
    }

    fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        fltk_draw::draw_line(x1 + self.dx, y1 + self.dy, x2 + self.dx, y2 + self.dy);
    }

    fn draw_image(&mut self, source: &str, x: i32, y: i32, w: i32, h: i32) {
        let (x, y) = (x + self.dx, y + self.dy);
        let image = self.images.entry(source.to_string()).or_insert_with(|| {
            SharedImage::load(source)
                .map_err(|err| log::warn!("FltkDrawContext: cannot load image {source}: {err}"))
                .ok()
        });
        match image {
            Some(image) => image.draw(x, y, w, h),
            None => {
                fltk_draw::draw_rect(x, y, w, h);
                fltk_draw::draw_line(x, y, x + w - 1, y + h - 1);
                fltk_draw::draw_line(x, y + h - 1, x + w - 1, y);
            }
        }
    }

    fn push_clip(&mut self, rect: Rect) {
        fltk_draw::push_clip(rect.x + self.dx, rect.y + self.dy, rect.w, rect.h);
    }

    fn pop_clip(&mut self) {
        fltk_draw::pop_clip();
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.dx += dx;
        self.dy += dy;
    }
}
