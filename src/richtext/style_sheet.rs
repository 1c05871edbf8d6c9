// Style sheet
// Tag-level styling for the markup subset and the persistent per-paragraph
// stack of block items (lists, headings, quotes)

use std::collections::HashMap;
use std::rc::Rc;

use crate::draw_context::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Left for left-to-right paragraphs, right for right-to-left ones
    #[default]
    Auto,
    Left,
    Right,
    Center,
    Justify,
}

impl Alignment {
    pub fn from_attr(value: &str) -> Option<Alignment> {
        match value.to_ascii_lowercase().as_str() {
            "left" => Some(Alignment::Left),
            "right" => Some(Alignment::Right),
            "center" => Some(Alignment::Center),
            "justify" => Some(Alignment::Justify),
            _ => None,
        }
    }

    pub fn as_attr(self) -> Option<&'static str> {
        match self {
            Alignment::Auto => None,
            Alignment::Left => Some("left"),
            Alignment::Right => Some("right"),
            Alignment::Center => Some("center"),
            Alignment::Justify => Some("justify"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Block,
    Inline,
    ListItem,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListStyle {
    #[default]
    Disc,
    Circle,
    Square,
    Decimal,
    LowerAlpha,
    UpperAlpha,
}

impl ListStyle {
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            ListStyle::Decimal | ListStyle::LowerAlpha | ListStyle::UpperAlpha
        )
    }

    pub fn from_type_attr(value: &str) -> ListStyle {
        match value {
            "1" => ListStyle::Decimal,
            "a" => ListStyle::LowerAlpha,
            "A" => ListStyle::UpperAlpha,
            "circle" => ListStyle::Circle,
            "square" => ListStyle::Square,
            _ => ListStyle::Disc,
        }
    }

    pub fn type_attr(self) -> &'static str {
        match self {
            ListStyle::Disc => "disc",
            ListStyle::Circle => "circle",
            ListStyle::Square => "square",
            ListStyle::Decimal => "1",
            ListStyle::LowerAlpha => "a",
            ListStyle::UpperAlpha => "A",
        }
    }

    /// Text of the label for item number `n` (1-based); empty for bullets
    pub fn label(self, n: i32) -> String {
        match self {
            ListStyle::Decimal => format!("{n}."),
            ListStyle::LowerAlpha | ListStyle::UpperAlpha => {
                let base = if self == ListStyle::LowerAlpha { b'a' } else { b'A' };
                let offset = ((n - 1).max(0) % 26) as u8;
                format!("{}.", (base + offset) as char)
            }
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhiteSpaceMode {
    #[default]
    Normal,
    Pre,
    NoWrap,
}

/// Styling attached to one tag name
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheetItem {
    pub name: String,
    pub display: DisplayMode,
    pub list_style: Option<ListStyle>,
    pub white_space: WhiteSpaceMode,
    pub margin_left: i32,
    pub margin_right: i32,
    pub margin_top: i32,
    pub margin_bottom: i32,
    pub margin_first_line: i32,
    pub alignment: Alignment,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub family: Option<String>,
    pub logical_size: Option<i32>,
    pub color: Option<Color>,
    /// `<p>` inside `<p>` closes the first one
    pub self_nesting: bool,
}

impl StyleSheetItem {
    pub fn new(name: &str, display: DisplayMode) -> Self {
        StyleSheetItem {
            name: name.to_string(),
            display,
            list_style: None,
            white_space: WhiteSpaceMode::Normal,
            margin_left: 0,
            margin_right: 0,
            margin_top: 0,
            margin_bottom: 0,
            margin_first_line: 0,
            alignment: Alignment::Auto,
            bold: None,
            italic: None,
            underline: None,
            family: None,
            logical_size: None,
            color: None,
            self_nesting: true,
        }
    }

    pub fn is_list(&self) -> bool {
        self.list_style.is_some()
    }

    pub fn is_block(&self) -> bool {
        self.display != DisplayMode::Inline
    }
}

/// The tag → item table
#[derive(Debug, Clone)]
pub struct StyleSheet {
    items: HashMap<String, Rc<StyleSheetItem>>,
}

impl Default for StyleSheet {
    fn default() -> Self {
        let mut sheet = StyleSheet {
            items: HashMap::new(),
        };
        sheet.init_defaults();
        sheet
    }
}

impl StyleSheet {
    fn init_defaults(&mut self) {
        use DisplayMode::*;

        for name in ["qt", "html", "body", "div"] {
            self.insert(StyleSheetItem::new(name, Block));
        }

        let mut p = StyleSheetItem::new("p", Block);
        p.self_nesting = false;
        p.margin_top = 4;
        p.margin_bottom = 4;
        self.insert(p);

        let mut center = StyleSheetItem::new("center", Block);
        center.alignment = Alignment::Center;
        self.insert(center);

        for (level, size) in [(1, 6), (2, 5), (3, 4), (4, 3), (5, 2), (6, 1)] {
            let mut h = StyleSheetItem::new(&format!("h{level}"), Block);
            h.bold = Some(true);
            h.logical_size = Some(size);
            h.self_nesting = false;
            h.margin_top = 8;
            h.margin_bottom = 4;
            self.insert(h);
        }

        let mut pre = StyleSheetItem::new("pre", Block);
        pre.white_space = WhiteSpaceMode::Pre;
        pre.family = Some("courier".to_string());
        self.insert(pre);

        let mut nobr = StyleSheetItem::new("nobr", Inline);
        nobr.white_space = WhiteSpaceMode::NoWrap;
        self.insert(nobr);

        let mut quote = StyleSheetItem::new("blockquote", Block);
        quote.margin_left = 40;
        quote.margin_right = 40;
        self.insert(quote);

        let mut ul = StyleSheetItem::new("ul", Block);
        ul.list_style = Some(ListStyle::Disc);
        ul.margin_left = 40;
        self.insert(ul);

        let mut ol = StyleSheetItem::new("ol", Block);
        ol.list_style = Some(ListStyle::Decimal);
        ol.margin_left = 40;
        self.insert(ol);

        let mut li = StyleSheetItem::new("li", ListItem);
        li.self_nesting = false;
        self.insert(li);

        for name in ["b", "strong"] {
            let mut item = StyleSheetItem::new(name, Inline);
            item.bold = Some(true);
            self.insert(item);
        }
        for name in ["i", "em", "cite", "var"] {
            let mut item = StyleSheetItem::new(name, Inline);
            item.italic = Some(true);
            self.insert(item);
        }
        let mut u = StyleSheetItem::new("u", Inline);
        u.underline = Some(true);
        self.insert(u);
        for name in ["code", "tt", "kbd", "samp"] {
            let mut item = StyleSheetItem::new(name, Inline);
            item.family = Some("courier".to_string());
            self.insert(item);
        }
        let mut big = StyleSheetItem::new("big", Inline);
        big.logical_size = Some(4);
        self.insert(big);
        let mut small = StyleSheetItem::new("small", Inline);
        small.logical_size = Some(2);
        self.insert(small);
        for name in ["a", "font", "span", "sub", "sup", "img", "br", "hr", "del", "s", "strike"] {
            self.insert(StyleSheetItem::new(name, Inline));
        }
        for name in ["table", "tr", "td", "th"] {
            self.insert(StyleSheetItem::new(name, Block));
        }
        let mut head = StyleSheetItem::new("head", DisplayMode::None);
        head.self_nesting = false;
        self.insert(head);
        self.insert(StyleSheetItem::new("title", DisplayMode::None));
    }

    pub fn insert(&mut self, item: StyleSheetItem) {
        self.items.insert(item.name.clone(), Rc::new(item));
    }

    pub fn item(&self, name: &str) -> Option<Rc<StyleSheetItem>> {
        self.items.get(name).cloned()
    }
}

#[derive(Debug, PartialEq)]
struct StyleNode {
    item: Rc<StyleSheetItem>,
    parent: Option<Rc<StyleNode>>,
}

/// Persistent stack of block-level style items, innermost last.
/// Pushing or popping never copies the shared tail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleStack(Option<Rc<StyleNode>>);

impl StyleStack {
    pub fn new() -> Self {
        StyleStack(None)
    }

    pub fn push(&self, item: Rc<StyleSheetItem>) -> StyleStack {
        StyleStack(Some(Rc::new(StyleNode {
            item,
            parent: self.0.clone(),
        })))
    }

    pub fn pop(&self) -> StyleStack {
        StyleStack(self.0.as_ref().and_then(|node| node.parent.clone()))
    }

    pub fn top(&self) -> Option<&Rc<StyleSheetItem>> {
        self.0.as_ref().map(|node| &node.item)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// Items from innermost to outermost
    pub fn iter(&self) -> impl Iterator<Item = &Rc<StyleSheetItem>> {
        let mut node = self.0.as_deref();
        std::iter::from_fn(move || {
            let current = node?;
            node = current.parent.as_deref();
            Some(&current.item)
        })
    }

    /// Items from outermost to innermost
    pub fn to_vec(&self) -> Vec<Rc<StyleSheetItem>> {
        let mut items: Vec<_> = self.iter().cloned().collect();
        items.reverse();
        items
    }

    pub fn list_depth(&self) -> usize {
        self.iter().filter(|item| item.is_list()).count()
    }

    /// Innermost list style, if any
    pub fn list_style(&self) -> Option<ListStyle> {
        self.iter().find_map(|item| item.list_style)
    }

    /// Remove the innermost list item and everything inside it
    pub fn pop_list(&self) -> StyleStack {
        let items = self.to_vec();
        match items.iter().rposition(|item| item.is_list()) {
            Some(pos) => StyleStack::from_items(&items[..pos]),
            None => self.clone(),
        }
    }

    pub fn from_items(items: &[Rc<StyleSheetItem>]) -> StyleStack {
        items
            .iter()
            .fold(StyleStack::new(), |stack, item| stack.push(item.clone()))
    }

    pub fn margin_left(&self) -> i32 {
        self.iter().map(|item| item.margin_left).sum()
    }

    pub fn margin_right(&self) -> i32 {
        self.iter().map(|item| item.margin_right).sum()
    }

    pub fn margin_top(&self) -> i32 {
        self.top().map(|item| item.margin_top).unwrap_or(0)
    }

    pub fn margin_bottom(&self) -> i32 {
        self.top().map(|item| item.margin_bottom).unwrap_or(0)
    }

    pub fn white_space(&self) -> WhiteSpaceMode {
        self.iter()
            .map(|item| item.white_space)
            .find(|mode| *mode != WhiteSpaceMode::Normal)
            .unwrap_or_default()
    }

    pub fn alignment(&self) -> Alignment {
        self.iter()
            .map(|item| item.alignment)
            .find(|a| *a != Alignment::Auto)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sheet_has_lists() {
        let sheet = StyleSheet::default();
        assert_eq!(sheet.item("ul").unwrap().list_style, Some(ListStyle::Disc));
        assert_eq!(sheet.item("ol").unwrap().list_style, Some(ListStyle::Decimal));
        assert!(sheet.item("blink").is_none());
    }

    #[test]
    fn test_stack_shares_tail() {
        let sheet = StyleSheet::default();
        let base = StyleStack::new().push(sheet.item("ul").unwrap());
        let nested = base.push(sheet.item("ol").unwrap());
        assert_eq!(nested.depth(), 2);
        assert_eq!(nested.list_depth(), 2);
        assert_eq!(nested.list_style(), Some(ListStyle::Decimal));
        assert_eq!(nested.pop(), base);
        assert_eq!(nested.margin_left(), 80);
    }

    #[test]
    fn test_pop_list_drops_inner_items() {
        let sheet = StyleSheet::default();
        let stack = StyleStack::new()
            .push(sheet.item("blockquote").unwrap())
            .push(sheet.item("ul").unwrap())
            .push(sheet.item("li").unwrap());
        let popped = stack.pop_list();
        assert_eq!(popped.depth(), 1);
        assert_eq!(popped.top().unwrap().name, "blockquote");
    }

    #[test]
    fn test_list_labels() {
        assert_eq!(ListStyle::Decimal.label(3), "3.");
        assert_eq!(ListStyle::LowerAlpha.label(2), "b.");
        assert_eq!(ListStyle::UpperAlpha.label(27), "A.");
        assert_eq!(ListStyle::Disc.label(1), "");
    }
}
