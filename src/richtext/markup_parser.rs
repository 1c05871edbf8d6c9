// Markup parser
// Reads the HTML subset the engine writes (and a bit more) into a
// document. Bad markup never fails: stray closing tags are dropped, open
// ones are closed, and both are logged.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use crate::draw_context::Color;

use super::custom_item::{CustomItem, ItemKind, Placement};
use super::document::Document;
use super::format::{Format, FormatCollection, FormatRef, VerticalAlignment};
use super::paragraph::ParagId;
use super::style_sheet::{Alignment, DisplayMode, ListStyle, StyleSheet, StyleSheetItem, StyleStack, WhiteSpaceMode};
use super::table::Table;
use super::text_string::{LINE_SEPARATOR, TextChar};

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("attribute pattern")
});

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    End(String),
    Comment,
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

/// Index of the `>` closing the tag that starts `s`, skipping quoted values
fn tag_end(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

fn parse_tag(inner: &str) -> Token<'static> {
    if inner.starts_with('!') || inner.starts_with('?') {
        return Token::Comment;
    }
    if let Some(rest) = inner.strip_prefix('/') {
        let name: String = rest
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        return Token::End(name.to_ascii_lowercase());
    }
    let name_len = inner
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(inner.len());
    let name = inner[..name_len].to_ascii_lowercase();
    let rest = &inner[name_len..];
    let attrs = ATTR_RE
        .captures_iter(rest)
        .map(|cap| {
            let key = cap[1].to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (key, value)
        })
        .collect();
    Token::Start {
        name,
        attrs,
        self_closing: inner.trim_end().ends_with('/'),
    }
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Scanner { src, pos: 0 }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        let rest = &self.src[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if rest.starts_with("<!--") {
            let end = rest.find("-->").map(|e| e + 3).unwrap_or(rest.len());
            self.pos += end;
            return Some(Token::Comment);
        }
        if rest.starts_with('<') {
            let tagish = rest[1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
            if tagish {
                return match tag_end(rest) {
                    Some(end) => {
                        self.pos += end + 1;
                        Some(parse_tag(&rest[1..end]))
                    }
                    None => {
                        log::warn!("markup: unterminated tag at byte {}", self.pos);
                        self.pos = self.src.len();
                        Some(Token::Text(rest))
                    }
                };
            }
            let end = rest[1..].find('<').map(|i| i + 1).unwrap_or(rest.len());
            self.pos += end;
            return Some(Token::Text(&rest[..end]));
        }
        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        Some(Token::Text(&rest[..end]))
    }
}

/// Replace character references; unknown ones stay as written
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..].find(';').filter(|semi| *semi <= 10).and_then(|semi| {
            let name = &rest[1..semi + 1];
            let c = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => name.strip_prefix('#').and_then(|num| {
                    match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    }
                    .and_then(char::from_u32)
                }),
            };
            c.map(|c| (c, semi + 2))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `#rrggbb`, `#rgb` or one of a few color names
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        let rgb = match hex.len() {
            6 => u32::from_str_radix(hex, 16).ok()?,
            3 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                let (r, g, b) = ((v >> 8) & 0xF, (v >> 4) & 0xF, v & 0xF);
                (r * 0x11) << 16 | (g * 0x11) << 8 | b * 0x11
            }
            _ => return None,
        };
        return Some(rgb << 8 | 0xFF);
    }
    let rgb = match value.to_ascii_lowercase().as_str() {
        "black" => 0x000000,
        "white" => 0xFFFFFF,
        "red" => 0xFF0000,
        "green" => 0x008000,
        "blue" => 0x0000FF,
        "yellow" => 0xFFFF00,
        "gray" | "grey" => 0x808080,
        "navy" => 0x000080,
        "maroon" => 0x800000,
        "purple" => 0x800080,
        "teal" => 0x008080,
        "silver" => 0xC0C0C0,
        _ => return None,
    };
    Some(rgb << 8 | 0xFF)
}

/// Format attributes a style sheet item imposes
pub(crate) fn apply_item(mut f: Format, item: &StyleSheetItem, base_size: i32) -> Format {
    if let Some(bold) = item.bold {
        f = f.with_bold(bold);
    }
    if let Some(italic) = item.italic {
        f = f.with_italic(italic);
    }
    if let Some(underline) = item.underline {
        f = f.with_underline(underline);
    }
    if let Some(family) = &item.family {
        f = f.with_family(family.clone());
    }
    if let Some(size) = item.logical_size {
        f = f.with_logical_size(size, base_size);
    }
    if let Some(color) = item.color {
        f = f.with_color(Some(color));
    }
    f
}

/// The subset of inline CSS the writer produces
fn apply_style_attr(mut f: Format, style: &str) -> Format {
    for decl in style.split(';') {
        let Some((key, value)) = decl.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "font-size" => {
                if let Ok(pt) = value.trim_end_matches("pt").trim().parse::<i32>() {
                    f = f.with_point_size(pt);
                }
            }
            "color" => {
                if let Some(c) = parse_color(value) {
                    f = f.with_color(Some(c));
                }
            }
            "font-family" => f = f.with_family(value.trim_matches(|c| c == '\'' || c == '"')),
            "font-weight" => f = f.with_bold(value == "bold" || value.parse::<i32>().is_ok_and(|w| w >= 600)),
            "font-style" => f = f.with_italic(value == "italic"),
            "text-decoration" => f = f.with_underline(value.contains("underline")),
            other => log::debug!("markup: ignoring style property {other}"),
        }
    }
    f
}

fn attr<'t>(attrs: &'t [(String, String)], key: &str) -> Option<&'t str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn is_collapsible(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c')
}

struct Open {
    name: String,
    block: bool,
    alignment: Alignment,
    /// Paragraphs created before the tag opened
    created_at: usize,
}

struct Builder<'d> {
    doc: &'d mut Document,
    formats: Rc<RefCell<FormatCollection>>,
    sheet: Rc<StyleSheet>,
    base_size: i32,
    parag: ParagId,
    /// The document's initial paragraph has not been used yet
    fresh: bool,
    need_new_parag: bool,
    open: Vec<Open>,
    format_stack: Vec<FormatRef>,
    block_stack: StyleStack,
    /// Collapsed whitespace waiting for the next word, in its own format
    pending_space: Option<FormatRef>,
    pending_list_value: Option<i32>,
    pre_start: bool,
    nobr_depth: usize,
    created: usize,
}

impl<'d> Builder<'d> {
    fn new(doc: &'d mut Document) -> Self {
        let default_format = doc.default_format();
        Builder {
            formats: doc.formats(),
            sheet: doc.style_sheet().clone(),
            base_size: default_format.font().point_size,
            parag: doc.first_parag(),
            doc,
            fresh: true,
            need_new_parag: true,
            open: Vec::new(),
            format_stack: vec![default_format],
            block_stack: StyleStack::new(),
            pending_space: None,
            pending_list_value: None,
            pre_start: false,
            nobr_depth: 0,
            created: 0,
        }
    }

    fn current_format(&self) -> FormatRef {
        match self.format_stack.last() {
            Some(f) => f.clone(),
            None => self.doc.default_format(),
        }
    }

    fn intern(&self, format: Format) -> FormatRef {
        self.formats.borrow_mut().format_from(format)
    }

    fn alignment(&self) -> Alignment {
        self.open
            .iter()
            .rev()
            .filter(|o| o.block)
            .map(|o| o.alignment)
            .find(|a| *a != Alignment::Auto)
            .unwrap_or(Alignment::Auto)
    }

    fn ensure_parag(&mut self) {
        if !self.need_new_parag {
            return;
        }
        self.need_new_parag = false;
        self.pending_space = None;
        let id = if self.fresh {
            self.fresh = false;
            self.parag
        } else {
            self.doc.append_parag(self.parag)
        };
        self.parag = id;
        self.created += 1;
        let style = self.block_stack.clone();
        let alignment = self.alignment();
        let list_value = self.pending_list_value.take();
        let no_wrap = self.nobr_depth > 0;
        if let Some(parag) = self.doc.parag_mut(id) {
            parag.set_style(style);
            parag.set_alignment(alignment);
            parag.set_list_value(list_value);
            if no_wrap {
                parag.set_no_wrap(true);
            }
        }
    }

    fn has_content(&self) -> bool {
        !self.need_new_parag && self.doc.parag(self.parag).is_some_and(|p| p.length() > 1)
    }

    /// Whether collapsed whitespace here would show up as a space
    fn can_space(&self) -> bool {
        if self.need_new_parag {
            return false;
        }
        let Some(parag) = self.doc.parag(self.parag) else {
            return false;
        };
        let len = parag.length();
        len > 1 && parag.at(len - 2).is_some_and(|c| c.c != LINE_SEPARATOR)
    }

    fn emit(&mut self, text: &str, format: &FormatRef) {
        if text.is_empty() {
            return;
        }
        self.ensure_parag();
        if let Some(parag) = self.doc.parag_mut(self.parag) {
            let end = parag.length() - 1;
            parag.insert(end, text, format);
        }
    }

    fn emit_cell(&mut self, cell: TextChar) {
        self.ensure_parag();
        if let Some(parag) = self.doc.parag_mut(self.parag) {
            let end = parag.length() - 1;
            parag.insert_cell(end, cell);
        }
    }

    fn add_text(&mut self, text: &str) {
        let text = decode_entities(text);
        let format = self.current_format();
        if self.block_stack.white_space() == WhiteSpaceMode::Pre {
            let mut text = text.as_str();
            if self.pre_start {
                text = text
                    .strip_prefix("\r\n")
                    .or_else(|| text.strip_prefix('\n'))
                    .unwrap_or(text);
                self.pre_start = false;
            }
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    self.ensure_parag();
                    self.need_new_parag = true;
                    self.ensure_parag();
                }
                self.emit(line.trim_end_matches('\r'), &format);
            }
            return;
        }

        let mut run = String::new();
        for c in text.chars() {
            if is_collapsible(c) {
                if !run.is_empty() {
                    self.emit(&run, &format);
                    run.clear();
                }
                if self.can_space() && self.pending_space.is_none() {
                    self.pending_space = Some(format.clone());
                }
                continue;
            }
            if let Some(space_format) = self.pending_space.take() {
                if !run.is_empty() {
                    self.emit(&run, &format);
                    run.clear();
                }
                self.emit(" ", &space_format);
            }
            run.push(c);
        }
        self.emit(&run, &format);
    }

    fn line_break(&mut self) {
        self.pending_space = None;
        let format = self.current_format();
        self.emit(&LINE_SEPARATOR.to_string(), &format);
    }

    fn insert_item(&mut self, item: CustomItem) {
        self.pending_space = None;
        let own_line = item.own_line();
        if own_line {
            self.need_new_parag |= self.has_content();
        }
        let cell = TextChar::with_item(Box::new(item), self.current_format());
        self.emit_cell(cell);
        if own_line {
            self.need_new_parag = true;
        }
    }

    fn image(&mut self, attrs: &[(String, String)]) {
        let source = attr(attrs, "src").unwrap_or_default();
        let size = self.doc.image_size();
        let width = attr(attrs, "width").and_then(|v| v.parse().ok()).unwrap_or(size);
        let height = attr(attrs, "height").and_then(|v| v.parse().ok()).unwrap_or(size);
        let placement = attr(attrs, "align").map(Placement::from_align_attr).unwrap_or(Placement::Inline);
        let id = self.doc.alloc_item_id();
        let mut item = CustomItem::image(id, source, width, height, placement);
        if let Some(alt) = attr(attrs, "alt")
            && let ItemKind::Image(image) = item.kind_mut()
        {
            image.alt = alt.to_string();
        }
        self.insert_item(item);
    }

    /// Innermost open block
    fn open_block_top(&self) -> Option<usize> {
        self.open.iter().rposition(|o| o.block)
    }

    fn open_block(&mut self, item: Rc<StyleSheetItem>, attrs: &[(String, String)]) {
        if let Some(pos) = self.open_block_top() {
            let top = &self.open[pos].name;
            let implicit = top == "p" || (!item.self_nesting && *top == item.name);
            if implicit {
                self.close_from(pos, false);
            }
        }

        let mut item = item;
        if item.is_list()
            && let Some(kind) = attr(attrs, "type")
        {
            let style = ListStyle::from_type_attr(kind);
            if item.list_style != Some(style) {
                let mut custom = (*item).clone();
                custom.list_style = Some(style);
                item = Rc::new(custom);
            }
        }
        if item.name == "ol" {
            self.pending_list_value = attr(attrs, "start").and_then(|v| v.parse().ok());
        }
        if item.name == "li"
            && let Some(value) = attr(attrs, "value").and_then(|v| v.parse().ok())
        {
            self.pending_list_value = Some(value);
        }

        let mut format = apply_item((*self.current_format()).clone(), &item, self.base_size);
        if let Some(style) = attr(attrs, "style") {
            format = apply_style_attr(format, style);
        }
        let format = self.intern(format);
        self.format_stack.push(format);
        self.open.push(Open {
            name: item.name.clone(),
            block: true,
            alignment: attr(attrs, "align").and_then(Alignment::from_attr).unwrap_or(Alignment::Auto),
            created_at: self.created,
        });
        if item.white_space == WhiteSpaceMode::Pre {
            self.pre_start = true;
        }
        self.block_stack = self.block_stack.push(item);
        self.need_new_parag = true;
        self.pending_space = None;
    }

    fn open_inline(&mut self, item: Rc<StyleSheetItem>, attrs: &[(String, String)]) {
        let mut f = apply_item((*self.current_format()).clone(), &item, self.base_size);
        match item.name.as_str() {
            "a" => {
                let href = attr(attrs, "href").unwrap_or_default();
                let name = attr(attrs, "name").unwrap_or_default();
                f = f.with_anchor(href, name);
            }
            "font" => {
                if let Some(color) = attr(attrs, "color").and_then(parse_color) {
                    f = f.with_color(Some(color));
                }
                if let Some(face) = attr(attrs, "face") {
                    f = f.with_family(face);
                }
                if let Some(size) = attr(attrs, "size") {
                    let current = f.logical_size();
                    let size = match size.as_bytes().first() {
                        Some(b'+') => size[1..].parse::<i32>().ok().map(|n| current + n),
                        Some(b'-') => size[1..].parse::<i32>().ok().map(|n| current - n),
                        _ => size.parse().ok(),
                    };
                    if let Some(size) = size {
                        f = f.with_logical_size(size, self.base_size);
                    }
                }
            }
            "sub" => f = f.with_vertical_alignment(VerticalAlignment::SubScript),
            "sup" => f = f.with_vertical_alignment(VerticalAlignment::SuperScript),
            "nobr" => self.nobr_depth += 1,
            _ => {}
        }
        if let Some(style) = attr(attrs, "style") {
            f = apply_style_attr(f, style);
        }
        let f = self.intern(f);
        self.format_stack.push(f);
        self.open.push(Open {
            name: item.name.clone(),
            block: false,
            alignment: Alignment::Auto,
            created_at: self.created,
        });
    }

    fn pop_open(&mut self) {
        // an empty block still makes an (empty) paragraph
        if self.open.last().is_some_and(|o| o.block && o.created_at == self.created) {
            self.need_new_parag = true;
            self.ensure_parag();
        }
        let Some(open) = self.open.pop() else {
            return;
        };
        self.format_stack.pop();
        if open.block {
            self.block_stack = self.block_stack.pop();
            self.need_new_parag = true;
            self.pending_space = None;
        } else if open.name == "nobr" {
            self.nobr_depth = self.nobr_depth.saturating_sub(1);
        }
    }

    /// Close every open tag from `pos` up
    fn close_from(&mut self, pos: usize, warn: bool) {
        if warn {
            for open in self.open[pos + 1..].iter().rev() {
                if !matches!(open.name.as_str(), "p" | "li") {
                    log::warn!("markup: closing unterminated <{}>", open.name);
                }
            }
        }
        while self.open.len() > pos {
            self.pop_open();
        }
    }

    /// Inline end tags only match inside the innermost block
    fn close_tag(&mut self, name: &str) {
        let block = self.sheet.item(name).is_some_and(|item| item.is_block());
        let floor = match self.open_block_top() {
            Some(top) if !block => top + 1,
            _ => 0,
        };
        match self.open[floor..].iter().rposition(|o| o.name == name) {
            Some(pos) => self.close_from(floor + pos, true),
            None => log::warn!("markup: ignoring unmatched </{name}>"),
        }
    }

    /// Skip everything up to the matching end tag
    fn skip_element(&mut self, scanner: &mut Scanner<'_>, name: &str) {
        let mut depth = 1;
        while let Some(token) = scanner.next_token() {
            match token {
                Token::Start { name: n, self_closing: false, .. } if n == name => depth += 1,
                Token::End(n) if n == name => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
        log::warn!("markup: <{name}> never closed");
    }

    fn parse_table(&mut self, scanner: &mut Scanner<'_>, attrs: &[(String, String)]) -> Table {
        let mut table = Table::new();
        let number = |key: &str| attr(attrs, key).and_then(|v| v.trim().parse::<i32>().ok());
        if let Some(border) = number("border") {
            table.border = border;
        }
        if let Some(spacing) = number("cellspacing") {
            table.cellspacing = spacing;
        }
        if let Some(padding) = number("cellpadding") {
            table.cellpadding = padding;
        }
        if let Some(width) = attr(attrs, "width") {
            match width.trim().strip_suffix('%') {
                Some(percent) => table.set_percent_width(percent.trim().parse().ok()),
                None => table.set_fixed_width(width.trim().parse().ok()),
            }
        }

        let mut row: Option<usize> = None;
        let mut next_row = 0;
        loop {
            let Some(token) = scanner.next_token() else {
                log::warn!("markup: <table> never closed");
                break;
            };
            match token {
                Token::Start { name, .. } if name == "tr" => {
                    row = Some(next_row);
                    next_row += 1;
                }
                Token::End(name) if name == "tr" => row = None,
                Token::Start { name, attrs: cell_attrs, .. } if name == "td" || name == "th" => {
                    let r = match row {
                        Some(r) => r,
                        None => {
                            log::warn!("markup: <{name}> outside <tr>");
                            next_row += 1;
                            row = Some(next_row - 1);
                            next_row - 1
                        }
                    };
                    let header = name == "th";
                    let mut cell_doc = self.doc.new_nested();
                    {
                        let mut builder = Builder::new(&mut cell_doc);
                        if header && let Some(bold) = builder.sheet.item("b") {
                            builder.open_inline(bold, &[]);
                        }
                        builder.run(scanner, true);
                        builder.finish(false);
                    }
                    let span = |key: &str| attr(&cell_attrs, key).and_then(|v| v.trim().parse::<usize>().ok()).unwrap_or(1);
                    let index = table.add_cell(cell_doc, r, span("rowspan"), span("colspan"));
                    if let Some(cell) = table.cell_mut(index) {
                        cell.header = header;
                        cell.background = attr(&cell_attrs, "bgcolor").and_then(parse_color);
                    }
                }
                Token::End(name) if name == "table" => break,
                Token::Text(text) if text.chars().all(is_collapsible) => {}
                other => log::debug!("markup: ignoring {other:?} inside <table>"),
            }
        }
        table
    }

    /// Consume tokens. Inside a table cell, stop at the cell's end or at
    /// the start of the next cell or row.
    fn run(&mut self, scanner: &mut Scanner<'_>, in_cell: bool) {
        loop {
            let saved = scanner.pos;
            let Some(token) = scanner.next_token() else {
                return;
            };
            match token {
                Token::Comment => {}
                Token::Text(text) => self.add_text(text),
                Token::End(name) => match name.as_str() {
                    "td" | "th" if in_cell => return,
                    "tr" | "table" if in_cell => {
                        scanner.pos = saved;
                        return;
                    }
                    "br" | "qt" | "html" | "body" | "img" | "hr" => {}
                    _ => self.close_tag(&name),
                },
                Token::Start {
                    name,
                    attrs,
                    self_closing,
                } => {
                    if in_cell && matches!(name.as_str(), "td" | "th" | "tr") {
                        scanner.pos = saved;
                        return;
                    }
                    match name.as_str() {
                        "br" => self.line_break(),
                        "hr" => {
                            let id = self.doc.alloc_item_id();
                            self.insert_item(CustomItem::horizontal_line(id));
                        }
                        "img" => self.image(&attrs),
                        "table" => {
                            let placement = attr(&attrs, "align")
                                .map(Placement::from_align_attr)
                                .unwrap_or(Placement::Inline);
                            let table = self.parse_table(scanner, &attrs);
                            let id = self.doc.alloc_item_id();
                            self.insert_item(CustomItem::table(id, table, placement));
                        }
                        "qt" | "html" | "body" => {}
                        "tr" | "td" | "th" => log::warn!("markup: <{name}> outside <table>"),
                        _ => match self.sheet.item(&name) {
                            Some(item) if item.display == DisplayMode::None => {
                                if !self_closing {
                                    self.skip_element(scanner, &name);
                                }
                            }
                            Some(item) if item.is_block() => {
                                self.open_block(item, &attrs);
                                if self_closing {
                                    self.close_tag(&name);
                                }
                            }
                            Some(item) => {
                                self.open_inline(item, &attrs);
                                if self_closing {
                                    self.close_tag(&name);
                                }
                            }
                            None => log::warn!("markup: unknown tag <{name}>"),
                        },
                    }
                }
            }
        }
    }

    fn finish(&mut self, warn: bool) {
        if !self.open.is_empty() {
            if warn {
                for open in self.open.iter().rev() {
                    if !matches!(open.name.as_str(), "p" | "li") {
                        log::warn!("markup: closing unterminated <{}> at end of input", open.name);
                    }
                }
            }
            while !self.open.is_empty() {
                self.pop_open();
            }
        }
    }
}

/// Append the content of `markup` to `doc`, which is expected to be empty
pub fn parse(doc: &mut Document, markup: &str) {
    let mut scanner = Scanner::new(markup);
    let mut builder = Builder::new(doc);
    builder.run(&mut scanner, false);
    builder.finish(true);
}
