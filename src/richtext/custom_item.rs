// Custom items
// Non-text content anchored at a character cell: images, horizontal rules
// and tables. The cell owns the item; the flow only tracks its geometry.

use crate::draw_context::{DrawContext, Palette, Rect};

use super::table::Table;

pub type ItemId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Inline,
    Left,
    Right,
}

impl Placement {
    pub fn from_align_attr(value: &str) -> Placement {
        match value.to_ascii_lowercase().as_str() {
            "left" => Placement::Left,
            "right" => Placement::Right,
            _ => Placement::Inline,
        }
    }

    pub fn is_floating(self) -> bool {
        self != Placement::Inline
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub source: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HorizontalLine {
    pub shade: bool,
}

#[derive(Debug)]
pub enum ItemKind {
    Image(Image),
    HorizontalLine(HorizontalLine),
    Table(Box<Table>),
}

#[derive(Debug)]
pub struct CustomItem {
    id: ItemId,
    /// Document position once placed; -1 means "not yet positioned"
    pub xpos: i32,
    pub ypos: i32,
    pub width: i32,
    pub height: i32,
    placement: Placement,
    kind: ItemKind,
}

impl CustomItem {
    pub fn new(id: ItemId, kind: ItemKind, placement: Placement) -> Self {
        CustomItem {
            id,
            xpos: -1,
            ypos: -1,
            width: 0,
            height: 0,
            placement,
            kind,
        }
    }

    pub fn image(id: ItemId, source: &str, width: i32, height: i32, placement: Placement) -> Self {
        let mut item = CustomItem::new(
            id,
            ItemKind::Image(Image {
                source: source.to_string(),
                alt: String::new(),
            }),
            placement,
        );
        item.width = width;
        item.height = height;
        item
    }

    pub fn horizontal_line(id: ItemId) -> Self {
        let mut item = CustomItem::new(
            id,
            ItemKind::HorizontalLine(HorizontalLine { shade: true }),
            Placement::Inline,
        );
        item.height = 8;
        item
    }

    pub fn table(id: ItemId, table: Table, placement: Placement) -> Self {
        CustomItem::new(id, ItemKind::Table(Box::new(table)), placement)
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn set_id(&mut self, id: ItemId) {
        self.id = id;
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ItemKind {
        &mut self.kind
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn is_floating(&self) -> bool {
        self.placement.is_floating()
    }

    /// Only tables can be entered by the cursor
    pub fn is_nested(&self) -> bool {
        matches!(self.kind, ItemKind::Table(_))
    }

    /// Items that force a line break before and after themselves
    pub fn own_line(&self) -> bool {
        match &self.kind {
            ItemKind::HorizontalLine(_) => true,
            ItemKind::Table(_) => !self.is_floating(),
            ItemKind::Image(_) => false,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match &self.kind {
            ItemKind::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match &mut self.kind {
            ItemKind::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Inline items sit on the baseline
    pub fn ascent(&self) -> i32 {
        self.height
    }

    pub fn is_positioned(&self) -> bool {
        self.xpos != -1 && self.ypos != -1
    }

    /// Narrowest width the item can be laid out at
    pub fn minimum_width(&self) -> i32 {
        match &self.kind {
            ItemKind::Table(table) => table.minimum_width(),
            ItemKind::HorizontalLine(_) => 0,
            ItemKind::Image(_) => self.width,
        }
    }

    /// Fit the item into `available` pixels of line width
    pub fn resize(&mut self, available: i32) {
        match &mut self.kind {
            ItemKind::HorizontalLine(_) => {
                self.width = available.max(0);
            }
            ItemKind::Table(table) => {
                table.resize(available);
                self.width = table.width();
                self.height = table.height();
            }
            ItemKind::Image(_) => {}
        }
    }

    pub fn draw(&self, p: &mut dyn DrawContext, x: i32, y: i32, clip: Rect, palette: &Palette) {
        let bounds = Rect::new(x, y, self.width, self.height);
        if !clip.is_empty() && !bounds.intersects(&clip) {
            return;
        }
        match &self.kind {
            ItemKind::Image(image) => {
                p.draw_image(&image.source, x, y, self.width, self.height);
            }
            ItemKind::HorizontalLine(line) => {
                let mid = y + self.height / 2;
                if line.shade {
                    p.set_color(palette.dark);
                    p.draw_line(x, mid - 1, x + self.width, mid - 1);
                    p.set_color(palette.light);
                    p.draw_line(x, mid, x + self.width, mid);
                } else {
                    p.set_color(palette.text);
                    p.draw_line(x, mid, x + self.width, mid);
                }
            }
            ItemKind::Table(table) => table.draw(p, x, y, clip, palette),
        }
    }

    /// Markup for this item
    pub fn rich_text(&self) -> String {
        let align = match self.placement {
            Placement::Inline => "",
            Placement::Left => " align=\"left\"",
            Placement::Right => " align=\"right\"",
        };
        match &self.kind {
            ItemKind::Image(image) => {
                let alt = if image.alt.is_empty() {
                    String::new()
                } else {
                    format!(" alt=\"{}\"", image.alt.replace('"', "&quot;"))
                };
                format!(
                    "<img src=\"{}\"{} width=\"{}\" height=\"{}\"{}>",
                    image.source, alt, self.width, self.height, align
                )
            }
            ItemKind::HorizontalLine(_) => "<hr>".to_string(),
            ItemKind::Table(table) => table.rich_text(align),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_flags() {
        let img = CustomItem::image(1, "a.png", 10, 20, Placement::Right);
        assert!(img.is_floating());
        assert!(!img.is_nested());
        assert!(!img.own_line());
        assert!(!img.is_positioned());

        let hr = CustomItem::horizontal_line(2);
        assert!(hr.own_line());
        assert_eq!(hr.height, 8);
    }

    #[test]
    fn test_horizontal_line_takes_available_width() {
        let mut hr = CustomItem::horizontal_line(1);
        hr.resize(300);
        assert_eq!(hr.width, 300);
    }

    #[test]
    fn test_image_markup() {
        let img = CustomItem::image(1, "logo.png", 16, 8, Placement::Left);
        assert_eq!(
            img.rich_text(),
            "<img src=\"logo.png\" width=\"16\" height=\"8\" align=\"left\">"
        );
    }
}
