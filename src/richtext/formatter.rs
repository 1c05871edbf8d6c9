// Formatter
// Breaks a paragraph into lines and assigns every character its x offset.
// Two strategies: break at word boundaries, or at whatever character
// overflows. Right-to-left content is positioned in visual order.

use std::collections::BTreeMap;

use crate::draw_context::FontMetrics;

use super::bidi::{self, BidiContext, BidiStatus, Direction};
use super::flow::Flow;
use super::paragraph::{LineStart, Paragraph};
use super::style_sheet::{Alignment, WhiteSpaceMode};
use super::text_string::{LINE_SEPARATOR, TextChar, TextString};

/// Space kept between a floating item and the text flowing around it
const FLOAT_SPACING: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakMode {
    /// Break at the last whitespace before the overflow
    #[default]
    Words,
    /// Break at the overflowing character
    Anywhere,
}

/// What a paragraph is laid out against. The two trailing fields collect
/// results for the document.
pub struct LayoutEnv<'a> {
    pub metrics: &'a dyn FontMetrics,
    pub flow: &'a mut Flow,
    pub width: i32,
    pub tab_stop: i32,
    pub paragraph_spacing: i32,
    /// Narrowest width the paragraph can be laid out at
    pub min_width: i32,
    /// Widest line produced, margins included
    pub widest_line: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter {
    mode: BreakMode,
}

fn is_break_char(c: char) -> bool {
    c.is_whitespace() && c != LINE_SEPARATOR && c != '\u{00A0}'
}

/// Advance of a cell placed `x` pixels into its line
fn cell_width(metrics: &dyn FontMetrics, cell: &TextChar, x: i32, tab_stop: i32) -> i32 {
    if let Some(item) = cell.custom_item() {
        return if item.is_floating() { 0 } else { item.width };
    }
    match cell.c {
        '\t' if tab_stop > 0 => tab_stop - x.rem_euclid(tab_stop),
        '\t' => cell.format().width(metrics, ' '),
        LINE_SEPARATOR => 0,
        c => cell.format().width(metrics, c),
    }
}

/// Ascent and descent of a line
fn line_metrics(metrics: &dyn FontMetrics, cells: &[TextChar]) -> (i32, i32) {
    let mut ascent = 0;
    let mut descent = 0;
    for cell in cells {
        match cell.custom_item() {
            Some(item) if item.is_floating() => {}
            Some(item) => ascent = ascent.max(item.ascent()),
            None => {
                let format = cell.format();
                let a = format.ascent(metrics);
                ascent = ascent.max(a);
                descent = descent.max(format.height(metrics) - a);
            }
        }
    }
    if ascent == 0
        && descent == 0
        && let Some(cell) = cells.first()
    {
        let format = cell.format();
        ascent = format.ascent(metrics);
        descent = format.height(metrics) - ascent;
    }
    (ascent, descent)
}

impl Formatter {
    pub fn new(mode: BreakMode) -> Self {
        Formatter { mode }
    }

    pub fn mode(&self) -> BreakMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BreakMode) {
        self.mode = mode;
    }

    /// Lay the paragraph out from scratch and return its height including
    /// its vertical margins. The paragraph's `rect` must already hold its
    /// position; floating items must already be placed in the flow.
    pub fn format(&self, env: &mut LayoutEnv<'_>, parag: &mut Paragraph) -> i32 {
        let len = parag.length();
        if len == 0 {
            return 0;
        }
        let left = parag.left_margin();
        let right = parag.right_margin();
        let top = parag.top_margin(env.paragraph_spacing);
        let bottom = parag.bottom_margin(env.paragraph_spacing);
        let wrap = !parag.no_wrap() && parag.style().white_space() == WhiteSpaceMode::Normal;
        let base = parag.string.direction();
        let alignment = match parag.alignment() {
            Alignment::Auto if base == Direction::Rtl => Alignment::Right,
            Alignment::Auto => Alignment::Left,
            other => other,
        };
        let parag_y = parag.rect.y;
        let mut full_width = parag.floating.is_empty();

        let mut lines = BTreeMap::new();
        let mut context = BidiContext::new(base);
        let mut status = BidiStatus::default();
        let mut y = top;
        let mut start = 0;
        let mut widest_used = 0;

        while start < len {
            let guess = {
                let (a, d) = line_metrics(env.metrics, &parag.string.chars()[start..start + 1]);
                a + d
            };
            let l = env.flow.adjust_lmargin(parag_y + y, guess, left, FLOAT_SPACING);
            let r = env.flow.adjust_rmargin(parag_y + y, guess, right, FLOAT_SPACING);
            if l != left || r != right {
                full_width = false;
            }
            let avail = (env.width - l - r).max(0);

            let end = self.break_line(env.metrics, &mut parag.string, start, avail, wrap, env.tab_stop);
            let (ascent, descent) = line_metrics(env.metrics, &parag.string.chars()[start..end]);
            let h = ascent + descent;
            y = env.flow.adjust_flow(parag_y + y, avail, h, true) - parag_y;

            let forced = end < len
                && parag.string.at(end - 1).is_some_and(|c| c.c == LINE_SEPARATOR || c.custom_item().is_some_and(|i| i.own_line()));
            let last = end >= len || forced;

            let mut line = LineStart::new(y, ascent, h);
            line.context = Some(context.clone());
            line.status = status;

            let (used, next_context, next_status) = self.format_line(
                env.metrics,
                &mut parag.string,
                start,
                end,
                l,
                avail,
                alignment,
                last,
                (context, status),
                env.tab_stop,
            );
            context = next_context;
            status = next_status;
            line.w = used;
            widest_used = widest_used.max(used);
            env.widest_line = env.widest_line.max(l + used + r);

            for (i, cell) in parag.string.chars_mut()[start..end].iter_mut().enumerate() {
                cell.line_start = i == 0;
            }
            lines.insert(start, line);
            y += h;
            start = end;
        }

        let min = if wrap {
            self.minimum_width(env.metrics, &parag.string)
        } else {
            widest_used
        };
        env.min_width = env.min_width.max(min + left + right);

        parag.set_line_starts(lines);
        parag.set_full_width(full_width);
        y + bottom
    }

    /// Index one past the last character of the line starting at `start`
    fn break_line(
        &self,
        metrics: &dyn FontMetrics,
        string: &mut TextString,
        start: usize,
        avail: i32,
        wrap: bool,
        tab_stop: i32,
    ) -> usize {
        let len = string.length();
        let mut x = 0;
        let mut last_break = None;
        let mut overflow = false;
        for i in start..len {
            let cell = &mut string.chars_mut()[i];
            if let Some(item) = cell.custom_item_mut()
                && item.own_line()
            {
                if i > start {
                    return i;
                }
                item.resize(avail);
                // keep the sentinel on the item's line
                return if i + 2 == len { len } else { i + 1 };
            }
            let c = cell.c;
            if c == LINE_SEPARATOR {
                return i + 1;
            }
            let w = cell_width(metrics, cell, x, tab_stop);
            let space = is_break_char(c);
            if wrap && i > start && x + w > avail {
                if space {
                    return i + 1;
                }
                match self.mode {
                    BreakMode::Anywhere => return i,
                    BreakMode::Words => match last_break {
                        Some(b) => return b + 1,
                        None => overflow = true,
                    },
                }
            }
            if overflow && space {
                return i + 1;
            }
            x += w;
            if space {
                last_break = Some(i);
            }
        }
        len
    }

    /// Position the characters `start..end` of one line.
    ///
    /// `remaining` space is distributed according to `alignment`; for
    /// justified lines it goes to the whitespace between words, except on
    /// the last line. Bidi paragraphs are positioned in visual order.
    /// Returns the used width and the bidi state for the next line.
    #[allow(clippy::too_many_arguments)]
    pub fn format_line(
        &self,
        metrics: &dyn FontMetrics,
        string: &mut TextString,
        start: usize,
        end: usize,
        left: i32,
        avail: i32,
        alignment: Alignment,
        last: bool,
        state: (BidiContext, BidiStatus),
        tab_stop: i32,
    ) -> (i32, BidiContext, BidiStatus) {
        let (context, status) = state;
        let mut widths = Vec::with_capacity(end - start);
        let mut x = 0;
        for cell in &string.chars()[start..end] {
            let w = cell_width(metrics, cell, x, tab_stop);
            widths.push(w);
            x += w;
        }
        let mut content_end = end;
        while content_end > start && is_break_char(string.chars()[content_end - 1].c) {
            content_end -= 1;
        }
        let used: i32 = widths[..content_end - start].iter().sum();
        let trailing: i32 = widths[content_end - start..].iter().sum();
        let remaining = (avail - used).max(0);

        let base = string.direction();
        let (order, levels, context, status) = if string.is_bidi() {
            let text: Vec<char> = string.chars()[start..end].iter().map(|c| c.c).collect();
            let resolution = bidi::resolve_levels(&text, &context, status, base);
            (
                bidi::visual_order(&resolution.levels),
                resolution.levels,
                resolution.context,
                resolution.status,
            )
        } else {
            ((0..end - start).collect(), vec![0; end - start], context, status)
        };

        let spaces = string.chars()[start..content_end]
            .iter()
            .filter(|c| is_break_char(c.c))
            .count() as i32;
        let justify = alignment == Alignment::Justify && !last && spaces > 0;
        let mut offset = match alignment {
            Alignment::Right => remaining,
            Alignment::Center => remaining / 2,
            _ => 0,
        };
        if string.is_bidi() && base == Direction::Rtl {
            // trailing whitespace ends up on the visual left
            offset -= trailing;
        }

        let mut x = left + offset;
        let mut extra_left = if justify { remaining % spaces } else { 0 };
        for k in order {
            let cell = &mut string.chars_mut()[start + k];
            cell.x = x;
            cell.right_to_left = levels[k] & 1 == 1;
            x += widths[k];
            if justify && start + k < content_end && is_break_char(cell.c) {
                x += remaining / spaces;
                if extra_left > 0 {
                    x += 1;
                    extra_left -= 1;
                }
            }
        }
        (used, context, status)
    }

    /// Widest unbreakable piece of the paragraph
    fn minimum_width(&self, metrics: &dyn FontMetrics, string: &TextString) -> i32 {
        let mut best = 0;
        let mut run = 0;
        for cell in string.chars() {
            if let Some(item) = cell.custom_item() {
                best = best.max(item.minimum_width());
                run = 0;
                continue;
            }
            if is_break_char(cell.c) || cell.c == LINE_SEPARATOR {
                run = 0;
                continue;
            }
            let w = cell.format().width(metrics, cell.c);
            match self.mode {
                BreakMode::Words => {
                    run += w;
                    best = best.max(run);
                }
                BreakMode::Anywhere => best = best.max(w),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw_context::FixedMetrics;
    use crate::richtext::format::Format;
    use std::rc::Rc;

    fn parag(text: &str) -> Paragraph {
        let f = Rc::new(Format::default());
        let mut p = Paragraph::new(&f);
        p.insert(0, text, &f);
        p
    }

    fn layout(formatter: Formatter, p: &mut Paragraph, width: i32) -> (i32, i32) {
        let metrics = FixedMetrics::default();
        let mut flow = Flow::new();
        flow.set_width(width);
        let mut env = LayoutEnv {
            metrics: &metrics,
            flow: &mut flow,
            width,
            tab_stop: 80,
            paragraph_spacing: 0,
            min_width: 0,
            widest_line: 0,
        };
        let h = formatter.format(&mut env, p);
        (h, env.min_width)
    }

    fn line_texts(p: &Paragraph) -> Vec<String> {
        let starts: Vec<usize> = p.line_starts().keys().copied().collect();
        starts
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let end = starts.get(i + 1).copied().unwrap_or(p.length());
                p.string().to_string_range(s, end - s)
            })
            .collect()
    }

    #[test]
    fn test_break_words() {
        // 8px per char: 10 chars per 80px line
        let mut p = parag("hello world again");
        let (h, min) = layout(Formatter::new(BreakMode::Words), &mut p, 80);
        assert_eq!(line_texts(&p), vec!["hello ", "world ", "again "]);
        assert_eq!(h, 45);
        assert_eq!(min, 40);
        assert_eq!(p.line_starts()[&6].y, 15);
    }

    #[test]
    fn test_break_anywhere() {
        let mut p = parag("abcdefghijkl");
        layout(Formatter::new(BreakMode::Anywhere), &mut p, 40);
        assert_eq!(line_texts(&p), vec!["abcde", "fghij", "kl "]);
    }

    #[test]
    fn test_long_word_gets_own_line() {
        let mut p = parag("a abcdefghijklmn b");
        layout(Formatter::new(BreakMode::Words), &mut p, 40);
        assert_eq!(line_texts(&p), vec!["a ", "abcdefghijklmn ", "b "]);
    }

    #[test]
    fn test_forced_break() {
        let mut p = parag("ab\u{2028}cd");
        layout(Formatter::default(), &mut p, 400);
        assert_eq!(p.lines(), 2);
        assert_eq!(p.string().at(3).map(|c| c.x), Some(0));
    }

    #[test]
    fn test_alignment() {
        let mut p = parag("ab");
        p.set_alignment(Alignment::Right);
        layout(Formatter::default(), &mut p, 100);
        assert_eq!(p.string().at(0).map(|c| c.x), Some(84));

        p.set_alignment(Alignment::Center);
        layout(Formatter::default(), &mut p, 100);
        assert_eq!(p.string().at(0).map(|c| c.x), Some(42));
    }

    #[test]
    fn test_justify_spreads_spaces() {
        let mut p = parag("aa bb cc dd");
        p.set_alignment(Alignment::Justify);
        layout(Formatter::default(), &mut p, 72);
        // first line "aa bb cc " holds 8 used chars (64px) with 8px to spare
        assert_eq!(line_texts(&p)[0], "aa bb cc ");
        assert_eq!(p.string().at(3).map(|c| c.x), Some(28));
        assert_eq!(p.string().at(6).map(|c| c.x), Some(56));
        // the last line is not justified
        assert_eq!(p.string().at(10).map(|c| c.x), Some(8));
    }

    #[test]
    fn test_tab_stops() {
        let mut p = parag("a\tb");
        layout(Formatter::default(), &mut p, 400);
        assert_eq!(p.string().at(2).map(|c| c.x), Some(80));
    }

    #[test]
    fn test_rtl_paragraph_is_right_aligned_and_reversed() {
        let mut p = parag("\u{05D0}\u{05D1}");
        layout(Formatter::default(), &mut p, 100);
        let xs: Vec<i32> = p.string().chars().iter().map(|c| c.x).collect();
        assert!(xs[0] > xs[1]);
        assert!(p.string().at(0).is_some_and(|c| c.right_to_left));
        assert_eq!(xs[0], 100 - 8);
    }

    #[test]
    fn test_no_wrap_for_pre() {
        let mut p = parag("hello world again");
        p.set_no_wrap(true);
        let (_, min) = layout(Formatter::default(), &mut p, 40);
        assert_eq!(p.lines(), 1);
        assert_eq!(min, 17 * 8);
    }
}
