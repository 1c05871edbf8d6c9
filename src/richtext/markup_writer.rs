// Markup writer
// Serializes a document to the markup subset the parser reads back.

use std::rc::Rc;

use super::document::Document;
use super::format::{Format, VerticalAlignment};
use super::markup_parser::apply_item;
use super::paragraph::Paragraph;
use super::style_sheet::StyleSheetItem;
use super::text_string::{LINE_SEPARATOR, OBJECT_REPLACEMENT, TextChar};

/// Block layout of one paragraph: the enclosing containers and the
/// element holding the text
struct Shape {
    containers: Vec<Rc<StyleSheetItem>>,
    leaf: Option<Rc<StyleSheetItem>>,
}

fn is_transparent(item: &StyleSheetItem) -> bool {
    matches!(item.name.as_str(), "qt" | "html" | "body")
}

fn shape(parag: &Paragraph) -> Shape {
    let mut containers: Vec<_> = parag
        .style()
        .to_vec()
        .into_iter()
        .filter(|item| !is_transparent(item))
        .collect();
    let leaf = match containers.last() {
        Some(top) if top.is_list() => None,
        Some(_) => containers.pop(),
        None => None,
    };
    Shape { containers, leaf }
}

fn is_pre(shape: &Shape) -> bool {
    shape.leaf.as_ref().is_some_and(|l| l.name == "pre")
}

/// Number of leading containers two shapes share
fn shared(a: &Shape, b: &Shape) -> usize {
    a.containers
        .iter()
        .zip(&b.containers)
        .take_while(|(x, y)| **x == **y)
        .count()
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    escape(value).replace('"', "&quot;")
}

fn color_attr(color: u32) -> String {
    format!("#{:06x}", color >> 8)
}

struct Writer<'d> {
    doc: &'d Document,
    default: Format,
    base_size: i32,
    out: String,
}

impl<'d> Writer<'d> {
    fn open_container(&mut self, item: &StyleSheetItem) {
        self.out.push('<');
        self.out.push_str(&item.name);
        if let Some(style) = item.list_style {
            let sheet_style = self.doc.style_sheet().item(&item.name).and_then(|i| i.list_style);
            if sheet_style != Some(style) {
                self.out.push_str(&format!(" type=\"{}\"", style.type_attr()));
            }
        }
        self.out.push('>');
    }

    fn open_leaf(&mut self, name: &str, parag: &Paragraph) {
        self.out.push('<');
        self.out.push_str(name);
        if let Some(align) = parag.alignment_setting().as_attr() {
            self.out.push_str(&format!(" align=\"{align}\""));
        }
        if name == "li"
            && let Some(value) = parag.list_value()
        {
            self.out.push_str(&format!(" value=\"{value}\""));
        }
        self.out.push('>');
    }

    /// Format every character of the paragraph starts from
    fn base_format(&self, parag: &Paragraph) -> Format {
        parag
            .style()
            .to_vec()
            .iter()
            .fold(self.default.clone(), |f, item| apply_item(f, item, self.base_size))
    }

    /// Opening markup for `f` on top of `base`, plus the matching end tags
    fn run_tags(&self, f: &Format, base: &Format) -> (String, Vec<&'static str>) {
        let mut open = String::new();
        let mut close = Vec::new();

        if f.is_anchor() {
            open.push_str("<a");
            if !f.anchor_href().is_empty() {
                open.push_str(&format!(" href=\"{}\"", escape_attr(f.anchor_href())));
            }
            if !f.anchor_name().is_empty() {
                open.push_str(&format!(" name=\"{}\"", escape_attr(f.anchor_name())));
            }
            open.push('>');
            close.push("</a>");
        }

        let (font, base_font) = (f.font(), base.font());
        let mut attrs = String::new();
        let mut style = Vec::new();
        if font.family != base_font.family {
            attrs.push_str(&format!(" face=\"{}\"", escape_attr(&font.family)));
        }
        if let Some(color) = f.color()
            && f.color() != base.color()
        {
            attrs.push_str(&format!(" color=\"{}\"", color_attr(color)));
        }
        if font.point_size != base_font.point_size {
            let logical = Format::default()
                .with_logical_size(f.logical_size(), self.base_size)
                .font()
                .point_size;
            if logical == font.point_size {
                attrs.push_str(&format!(" size=\"{}\"", f.logical_size()));
            } else {
                style.push(format!("font-size:{}pt", font.point_size));
            }
        }
        if !font.bold && base_font.bold {
            style.push("font-weight:normal".to_string());
        }
        if !font.italic && base_font.italic {
            style.push("font-style:normal".to_string());
        }
        if !font.underline && base_font.underline {
            style.push("text-decoration:none".to_string());
        }
        if !style.is_empty() {
            attrs.push_str(&format!(" style=\"{}\"", style.join(";")));
        }
        if !attrs.is_empty() {
            open.push_str(&format!("<font{attrs}>"));
            close.push("</font>");
        }

        for (on, tag, end) in [
            (font.bold && !base_font.bold, "<b>", "</b>"),
            (font.italic && !base_font.italic, "<i>", "</i>"),
            (font.underline && !base_font.underline, "<u>", "</u>"),
        ] {
            if on {
                open.push_str(tag);
                close.push(end);
            }
        }
        match f.vertical_alignment() {
            VerticalAlignment::SubScript => {
                open.push_str("<sub>");
                close.push("</sub>");
            }
            VerticalAlignment::SuperScript => {
                open.push_str("<sup>");
                close.push("</sup>");
            }
            VerticalAlignment::Normal => {}
        }
        close.reverse();
        (open, close)
    }

    fn write_cell(&mut self, cell: &TextChar) {
        if let Some(item) = cell.custom_item() {
            self.out.push_str(&item.rich_text());
            return;
        }
        match cell.c {
            LINE_SEPARATOR => self.out.push_str("<br>"),
            OBJECT_REPLACEMENT => {}
            '&' => self.out.push_str("&amp;"),
            '<' => self.out.push_str("&lt;"),
            '>' => self.out.push_str("&gt;"),
            '\u{a0}' => self.out.push_str("&nbsp;"),
            c => self.out.push(c),
        }
    }

    /// Inline content of a paragraph, sentinel excluded
    fn write_content(&mut self, parag: &Paragraph) {
        let base = self.base_format(parag);
        let cells = parag.string().chars();
        let cells = &cells[..cells.len().saturating_sub(1)];
        for run in cells.chunk_by(|a, b| a.format().key() == b.format().key()) {
            let (open, close) = self.run_tags(run[0].format(), &base);
            self.out.push_str(&open);
            for cell in run {
                self.write_cell(cell);
            }
            for end in close {
                self.out.push_str(end);
            }
        }
    }

    fn write(mut self) -> String {
        let doc = self.doc;
        let parags: Vec<&Paragraph> = doc.iter().map(|(_, p)| p).collect();
        let shapes: Vec<Shape> = parags.iter().map(|p| shape(p)).collect();
        let empty = Shape {
            containers: Vec::new(),
            leaf: None,
        };

        for (i, (parag, shape)) in parags.iter().zip(&shapes).enumerate() {
            let prev = if i == 0 { &empty } else { &shapes[i - 1] };
            let next = shapes.get(i + 1).unwrap_or(&empty);
            let keep_prev = shared(prev, shape);
            let keep_next = shared(shape, next);
            let same_pre = |other: &Shape, keep: usize| {
                keep == shape.containers.len()
                    && keep == other.containers.len()
                    && is_pre(shape)
                    && is_pre(other)
            };
            let continues_pre = i > 0 && same_pre(prev, keep_prev);
            let pre_goes_on = i + 1 < shapes.len() && same_pre(next, keep_next);

            if i > 0 {
                self.out.push('\n');
            }
            for item in &shape.containers[keep_prev..] {
                self.open_container(item);
            }
            let leaf = match &shape.leaf {
                Some(leaf) => leaf.name.clone(),
                None if shape.containers.is_empty() => "p".to_string(),
                None => String::new(),
            };
            if !leaf.is_empty() && !continues_pre {
                self.open_leaf(&leaf, parag);
                if leaf == "pre" {
                    self.out.push('\n');
                }
            }
            self.write_content(parag);
            if !leaf.is_empty() && !pre_goes_on {
                self.out.push_str(&format!("</{leaf}>"));
            }
            for item in shape.containers[keep_next..].iter().rev() {
                self.out.push_str(&format!("</{}>", item.name));
            }
        }
        self.out
    }
}

/// Markup for the whole document; paragraphs are separated by newlines
pub fn write(doc: &Document) -> String {
    let default = (*doc.default_format()).clone();
    let base_size = default.font().point_size;
    Writer {
        doc,
        default,
        base_size,
        out: String::new(),
    }
    .write()
}
