// Syntax highlighting hook
// Runs before a paragraph is laid out and recolors its characters. The
// returned end state is handed to the next paragraph, so constructs that
// span paragraphs (block comments) continue there.

use regex::Regex;

use super::format::{Format, FormatCollection, FormatRef, changes};
use super::paragraph::Paragraph;

/// State of a paragraph that does not continue any construct
pub const STATE_NORMAL: i32 = -1;
const STATE_IN_BLOCK: i32 = 1;

pub trait SyntaxHighlighter {
    /// Apply formats to `parag`; `start_state` is the end state of the
    /// previous paragraph. Returns this paragraph's end state.
    fn process(&self, formats: &mut FormatCollection, parag: &mut Paragraph, start_state: i32) -> i32;
}

/// Highlighter driven by a list of (pattern, format) rules plus an
/// optional block rule whose start and end may lie in different paragraphs
pub struct RegexHighlighter {
    rules: Vec<(Regex, Format)>,
    block: Option<(Regex, Regex, Format)>,
    mask: u32,
}

impl RegexHighlighter {
    pub fn new() -> Self {
        RegexHighlighter {
            rules: Vec::new(),
            block: None,
            mask: changes::COLOR | changes::BOLD | changes::ITALIC,
        }
    }

    /// Returns `None` (and logs) if the pattern does not compile
    pub fn with_rule(mut self, pattern: &str, format: Format) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(re) => {
                self.rules.push((re, format));
                Some(self)
            }
            Err(err) => {
                log::warn!("RegexHighlighter: bad pattern {pattern:?}: {err}");
                None
            }
        }
    }

    pub fn with_block(mut self, start: &str, end: &str, format: Format) -> Option<Self> {
        match (Regex::new(start), Regex::new(end)) {
            (Ok(s), Ok(e)) => {
                self.block = Some((s, e, format));
                Some(self)
            }
            (Err(err), _) | (_, Err(err)) => {
                log::warn!("RegexHighlighter: bad block pattern: {err}");
                None
            }
        }
    }

    /// Which attributes the rules may override
    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }
}

impl Default for RegexHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offset → character index
fn char_index(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

fn apply(
    formats: &mut FormatCollection,
    parag: &mut Paragraph,
    start: usize,
    end: usize,
    format: &Format,
    mask: u32,
) {
    for i in start..end {
        let Some(cell) = parag.at(i) else { break };
        if cell.is_custom() {
            continue;
        }
        let merged = formats.merge(cell.format(), format, mask);
        parag.set_format(i, 1, &merged);
    }
}

impl SyntaxHighlighter for RegexHighlighter {
    fn process(&self, formats: &mut FormatCollection, parag: &mut Paragraph, start_state: i32) -> i32 {
        // without the sentinel
        let len = parag.length();
        let text = parag.string().to_string_range(0, len.saturating_sub(1));
        let plain: FormatRef = formats.default_format();
        apply(formats, parag, 0, len, &plain, self.mask);

        for (re, format) in &self.rules {
            for m in re.find_iter(&text) {
                let start = char_index(&text, m.start());
                let end = char_index(&text, m.end());
                apply(formats, parag, start, end, format, self.mask);
            }
        }

        let Some((open, close, format)) = &self.block else {
            return STATE_NORMAL;
        };
        let mut state = start_state;
        let mut pos = 0;
        loop {
            if state == STATE_IN_BLOCK {
                match close.find_at(&text, pos) {
                    Some(m) => {
                        apply(formats, parag, char_index(&text, pos), char_index(&text, m.end()), format, self.mask);
                        pos = m.end();
                        state = STATE_NORMAL;
                    }
                    None => {
                        apply(formats, parag, char_index(&text, pos), len, format, self.mask);
                        return STATE_IN_BLOCK;
                    }
                }
            } else {
                match open.find_at(&text, pos) {
                    Some(m) => {
                        pos = m.start();
                        state = STATE_IN_BLOCK;
                        // an empty opener never advances
                        if m.end() == m.start() {
                            return STATE_NORMAL;
                        }
                        apply(formats, parag, char_index(&text, pos), char_index(&text, m.end()), format, self.mask);
                        pos = m.end();
                    }
                    None => return STATE_NORMAL,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    const RED: u32 = 0xFF0000FF;
    const GRAY: u32 = 0x808080FF;

    fn parag(formats: &FormatCollection, text: &str) -> Paragraph {
        let f = formats.default_format();
        let mut p = Paragraph::new(&f);
        p.insert(0, text, &f);
        p
    }

    fn highlighter() -> RegexHighlighter {
        RegexHighlighter::new()
            .with_rule(r"\bfn\b", Format::default().with_color(Some(RED)))
            .and_then(|h| h.with_block(r"/\*", r"\*/", Format::default().with_color(Some(GRAY))))
            .unwrap()
    }

    #[test]
    fn test_rule_colors_matches() {
        let mut formats = FormatCollection::default();
        let mut p = parag(&formats, "fn main");
        let state = highlighter().process(&mut formats, &mut p, STATE_NORMAL);
        assert_eq!(state, STATE_NORMAL);
        assert_eq!(p.at(0).unwrap().format().color(), Some(RED));
        assert_eq!(p.at(1).unwrap().format().color(), Some(RED));
        assert_eq!(p.at(3).unwrap().format().color(), None);
        assert!(Rc::ptr_eq(p.at(0).unwrap().format(), p.at(1).unwrap().format()));
    }

    #[test]
    fn test_block_spans_paragraphs() {
        let mut formats = FormatCollection::default();
        let h = highlighter();
        let mut first = parag(&formats, "a /* b");
        let mut second = parag(&formats, "c */ d");
        let state = h.process(&mut formats, &mut first, STATE_NORMAL);
        assert_eq!(state, STATE_IN_BLOCK);
        assert_eq!(first.at(0).unwrap().format().color(), None);
        assert_eq!(first.at(5).unwrap().format().color(), Some(GRAY));

        let state = h.process(&mut formats, &mut second, state);
        assert_eq!(state, STATE_NORMAL);
        assert_eq!(second.at(0).unwrap().format().color(), Some(GRAY));
        assert_eq!(second.at(3).unwrap().format().color(), Some(GRAY));
        assert_eq!(second.at(5).unwrap().format().color(), None);
    }
}
