// SVG-based DrawContext implementation for testing and visualization
// Generates SVG output from document painting, with fixed-advance metrics

use richdoc::draw_context::{Color, DrawContext, FixedMetrics, FontMetrics, Rect};
use richdoc::richtext::Font;
use std::fmt::Write;

/// SVG-based drawing context that generates SVG markup
pub struct SvgDrawContext {
    svg_content: String,
    metrics: FixedMetrics,
    current_color: Color,
    current_font: Font,
    clip_stack: Vec<Rect>,
    dx: i32,
    dy: i32,
}

impl SvgDrawContext {
    /// Create a new SVG drawing context
    pub fn new(width: i32, height: i32) -> Self {
        let mut ctx = SvgDrawContext {
            svg_content: String::new(),
            metrics: FixedMetrics::default(),
            current_color: 0x000000FF,
            current_font: Font::new("helvetica", 12),
            clip_stack: Vec::new(),
            dx: 0,
            dy: 0,
        };

        // Start SVG document
        writeln!(
            &mut ctx.svg_content,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
            width, height, width, height
        )
        .unwrap();

        // White background
        writeln!(
            &mut ctx.svg_content,
            r##"  <rect width="{}" height="{}" fill="#ffffff"/>"##,
            width, height
        )
        .unwrap();

        ctx
    }

    /// The metrics the context measures with
    pub fn metrics(&self) -> FixedMetrics {
        self.metrics
    }

    /// Get the generated SVG content
    pub fn finish(mut self) -> String {
        writeln!(&mut self.svg_content, "</svg>").unwrap();
        self.svg_content
    }

    /// Convert RGBA color to SVG color string
    pub fn color_to_svg(&self, color: Color) -> String {
        let r = (color >> 24) & 0xFF;
        let g = (color >> 16) & 0xFF;
        let b = (color >> 8) & 0xFF;
        let a = color & 0xFF;

        if a == 0xFF {
            format!("#{:02x}{:02x}{:02x}", r, g, b)
        } else {
            format!("rgba({}, {}, {}, {:.2})", r, g, b, a as f32 / 255.0)
        }
    }

    fn font_family(&self) -> &str {
        match self.current_font.family.as_str() {
            "courier" => "Courier, 'Courier New', monospace",
            "times" => "Times, serif",
            _ => "Helvetica, Arial, sans-serif",
        }
    }

    fn clip_attr(&self) -> String {
        match self.clip_stack.last() {
            Some(r) => format!(r#" clip-path="url(#clip-{}-{}-{}-{})""#, r.x, r.y, r.w, r.h),
            None => String::new(),
        }
    }

    /// Escape XML text
    fn escape_xml(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }
}

impl FontMetrics for SvgDrawContext {
    fn char_width(&self, font: &Font, c: char) -> i32 {
        self.metrics.char_width(font, c)
    }

    fn ascent(&self, font: &Font) -> i32 {
        self.metrics.ascent(font)
    }

    fn descent(&self, font: &Font) -> i32 {
        self.metrics.descent(font)
    }
}

impl DrawContext for SvgDrawContext {
    fn set_font(&mut self, font: &Font) {
        self.current_font = font.clone();
    }

    fn set_color(&mut self, color: Color) {
        self.current_color = color;
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32) {
        if text.is_empty() {
            return;
        }

        let color = self.color_to_svg(self.current_color);
        let weight = if self.current_font.bold { "bold" } else { "normal" };
        let style = if self.current_font.italic { "italic" } else { "normal" };
        let font_family = self.font_family().to_owned();
        let clip_attr = self.clip_attr();

        writeln!(
            &mut self.svg_content,
            r#"  <text x="{}" y="{}" fill="{}" font-family="{}" font-size="{}" font-weight="{}" font-style="{}"{}>{}</text>"#,
            x + self.dx,
            y + self.dy,
            color,
            font_family,
            self.current_font.point_size,
            weight,
            style,
            clip_attr,
            Self::escape_xml(text)
        )
        .unwrap();
    }

    fn draw_rect_filled(&mut self, x: i32, y: i32, w: i32, h: i32) {
        let color = self.color_to_svg(self.current_color);
        let clip_attr = self.clip_attr();
        writeln!(
            &mut self.svg_content,
            r#"  <rect x="{}" y="{}" width="{}" height="{}" fill="{}"{}/>"#,
            x + self.dx,
            y + self.dy,
            w,
            h,
            color,
            clip_attr
        )
        .unwrap();
    }

    fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        let color = self.color_to_svg(self.current_color);
        writeln!(
            &mut self.svg_content,
            r#"  <line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            x1 + self.dx,
            y1 + self.dy,
            x2 + self.dx,
            y2 + self.dy,
            color
        )
        .unwrap();
    }

    fn draw_image(&mut self, source: &str, x: i32, y: i32, w: i32, h: i32) {
        writeln!(
            &mut self.svg_content,
            r#"  <image href="{}" x="{}" y="{}" width="{}" height="{}"/>"#,
            Self::escape_xml(source),
            x + self.dx,
            y + self.dy,
            w,
            h
        )
        .unwrap();
    }

    fn push_clip(&mut self, rect: Rect) {
        let rect = rect.translated(self.dx, self.dy);
        let clip_id = format!("clip-{}-{}-{}-{}", rect.x, rect.y, rect.w, rect.h);

        // Only add the clip definition if it doesn't exist yet
        if !self.svg_content.contains(&clip_id) {
            writeln!(
                &mut self.svg_content,
                r#"  <defs>
    <clipPath id="{}">
      <rect x="{}" y="{}" width="{}" height="{}"/>
    </clipPath>
  </defs>"#,
                clip_id, rect.x, rect.y, rect.w, rect.h
            )
            .unwrap();
        }

        self.clip_stack.push(rect);
    }

    fn pop_clip(&mut self) {
        self.clip_stack.pop();
    }

    fn translate(&mut self, dx: i32, dy: i32) {
        self.dx += dx;
        self.dy += dy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svg_context_creation() {
        let ctx = SvgDrawContext::new(400, 300);
        let svg = ctx.finish();
        assert!(svg.contains(r#"width="400""#));
        assert!(svg.contains(r#"height="300""#));
    }

    #[test]
    fn test_color_conversion() {
        let ctx = SvgDrawContext::new(100, 100);
        assert_eq!(ctx.color_to_svg(0xFF0000FF), String::from("#ff0000"));
        assert_eq!(ctx.color_to_svg(0x00FF00FF), String::from("#00ff00"));
        assert_eq!(ctx.color_to_svg(0x0000FFFF), String::from("#0000ff"));
    }

    #[test]
    fn test_draw_text() {
        let mut ctx = SvgDrawContext::new(200, 100);
        ctx.set_color(0x000000FF);
        ctx.set_font(&Font::new("courier", 14));
        ctx.draw_text("Hello World", 10, 20);
        let svg = ctx.finish();
        assert!(svg.contains("Hello World"));
        assert!(svg.contains(r#"x="10""#));
        assert!(svg.contains(r#"y="20""#));
        assert!(svg.contains("monospace"));
    }

    #[test]
    fn test_translate() {
        let mut ctx = SvgDrawContext::new(200, 100);
        ctx.translate(5, 7);
        ctx.draw_rect_filled(10, 20, 50, 30);
        ctx.translate(-5, -7);
        ctx.draw_rect_filled(1, 2, 3, 4);
        let svg = ctx.finish();
        assert!(svg.contains(r#"<rect x="15" y="27" width="50" height="30""#));
        assert!(svg.contains(r#"<rect x="1" y="2" width="3" height="4""#));
    }

    #[test]
    fn test_xml_escaping() {
        let mut ctx = SvgDrawContext::new(200, 100);
        ctx.draw_text("<test> & \"quote\"", 0, 10);
        let svg = ctx.finish();
        assert!(svg.contains("&lt;test&gt; &amp; &quot;quote&quot;"));
    }
}
