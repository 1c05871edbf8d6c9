// Markdown Converter
// Converts between Markdown text and documents. Markdown goes in through
// HTML and the markup parser; documents come out as CommonMark.

use pulldown_cmark::{Options, Parser, html};

use super::custom_item::ItemKind;
use super::document::Document;
use super::format::Format;
use super::markup_parser::apply_item;
use super::paragraph::Paragraph;
use super::table::Table;
use super::text_string::{LINE_SEPARATOR, TextChar};

/// Render markdown to markup the engine understands
pub fn markdown_to_markup(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(markdown, options);
    let mut markup = String::new();
    html::push_html(&mut markup, parser);
    // code blocks end with a newline that would become an empty line
    markup.replace("\n</code></pre>", "</code></pre>")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Text,
    ListItem,
    Code,
}

/// Convert a document to markdown text
pub fn document_to_markdown(doc: &Document) -> String {
    let default = (*doc.default_format()).clone();
    let base_size = default.font().point_size;
    let mut output = String::new();
    let mut prev: Option<Block> = None;
    // outermost list of the previous paragraph
    let mut prev_list = None;

    for (id, parag) in doc.iter() {
        let top = parag.style().top().map(|item| item.name.as_str()).unwrap_or("");
        let block = if top == "pre" {
            Block::Code
        } else if parag.is_list_item() {
            Block::ListItem
        } else {
            Block::Text
        };
        let base = parag
            .style()
            .to_vec()
            .iter()
            .fold(default.clone(), |f, item| apply_item(f, item, base_size));

        let content = if block == Block::Code {
            parag.string().to_string_range(0, parag.length() - 1)
        } else {
            inline_to_markdown(parag, &base)
        };
        if block == Block::Text && content.trim().is_empty() {
            continue;
        }

        let list = parag.style().to_vec().into_iter().find(|item| item.is_list());
        let same_list = list.is_some() && list == prev_list;
        match (prev, block) {
            (None, _) => {}
            (Some(Block::Code), Block::Code) => output.push('\n'),
            (Some(Block::ListItem), Block::ListItem) if same_list => output.push('\n'),
            (Some(Block::Code), _) => output.push_str("\n```\n\n"),
            _ => output.push_str("\n\n"),
        }
        if block == Block::Code {
            if prev != Some(Block::Code) {
                output.push_str("```\n");
            }
            output.push_str(&content);
            prev = Some(block);
            prev_list = list;
            continue;
        }

        let quotes = parag.style().iter().filter(|item| item.name == "blockquote").count();
        output.push_str(&"> ".repeat(quotes));
        if let Some(level) = top.strip_prefix('h').and_then(|l| l.parse::<usize>().ok()) {
            output.push_str(&"#".repeat(level.clamp(1, 6)));
            output.push(' ');
        }
        if block == Block::ListItem {
            output.push_str(&"  ".repeat(parag.list_depth().saturating_sub(1)));
            match parag.list_style() {
                Some(style) if style.is_ordered() => {
                    output.push_str(&format!("{}. ", doc.list_number(id)))
                }
                _ => output.push_str("- "),
            }
        }
        output.push_str(&content);
        prev = Some(block);
        prev_list = list;
    }
    if prev == Some(Block::Code) {
        output.push_str("\n```");
    }
    output
}

fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Put `marker` around `text`, keeping surrounding spaces outside
fn wrap(text: &str, marker: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return text.to_string();
    }
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];
    format!("{lead}{marker}{trimmed}{marker}{trail}")
}

fn item_to_markdown(cell: &TextChar) -> Option<String> {
    let item = cell.custom_item()?;
    Some(match item.kind() {
        ItemKind::Image(image) => format!("![{}]({})", image.alt, image.source),
        ItemKind::HorizontalLine(_) => "---".to_string(),
        ItemKind::Table(table) => table_to_markdown(table),
    })
}

fn table_to_markdown(table: &Table) -> String {
    let mut grid = vec![vec![String::new(); table.cols()]; table.rows()];
    for cell in table.cells() {
        let text: Vec<String> = cell
            .document()
            .iter()
            .map(|(_, p)| p.text().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(slot) = grid.get_mut(cell.row()).and_then(|row| row.get_mut(cell.col())) {
            *slot = text.join(" ").replace('|', "\\|");
        }
    }
    let mut lines = Vec::new();
    for (i, row) in grid.iter().enumerate() {
        lines.push(format!("| {} |", row.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}", " --- |".repeat(row.len())));
        }
    }
    lines.join("\n")
}

fn inline_to_markdown(parag: &Paragraph, base: &Format) -> String {
    let cells = parag.string().chars();
    let cells = &cells[..cells.len().saturating_sub(1)];
    let mut output = String::new();

    for run in cells.chunk_by(|a, b| a.format().key() == b.format().key()) {
        let format = run[0].format();
        let code = format.font().family != base.font().family && format.font().family == "courier";
        let mut text = String::new();
        for cell in run {
            if let Some(item) = item_to_markdown(cell) {
                text.push_str(&item);
            } else if cell.c == LINE_SEPARATOR {
                text.push_str("  \n");
            } else if !cell.is_custom() {
                if code {
                    text.push(cell.c);
                } else {
                    text.push_str(&escape_markdown(&cell.c.to_string()));
                }
            }
        }

        if code {
            text = wrap(&text, "`");
        } else {
            let font = format.font();
            if font.italic && !base.font().italic {
                text = wrap(&text, "*");
            }
            if font.bold && !base.font().bold {
                text = wrap(&text, "**");
            }
        }
        if !format.anchor_href().is_empty() {
            text = format!("[{}]({})", text, format.anchor_href());
        }
        output.push_str(&text);
    }
    output
}
