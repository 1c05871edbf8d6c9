// Rich text engine
// Documents of formatted paragraphs, their layout, editing and markup.

pub mod bidi;
pub mod command;
pub mod cursor;
pub mod custom_item;
pub mod document;
pub mod flow;
pub mod format;
pub mod formatter;
pub mod highlighter;
pub mod markdown_converter;
pub mod markup_parser;
pub mod markup_writer;
pub mod paragraph;
pub mod style_sheet;
pub mod table;
pub mod text_string;

pub use cursor::Cursor;
pub use document::{Document, TextFormat, TextPos};
pub use format::{Font, Format, FormatRef};
