// Bidirectional reordering
// Resolves embedding levels for one visual line and computes the visual order.
// Explicit embeddings carry over from line to line through `BidiContext`.

use std::rc::Rc;

use unicode_bidi::{BidiClass, bidi_class};

/// Deepest embedding level; pushes beyond it are ignored
pub const MAX_LEVEL: u8 = 61;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

impl Direction {
    pub fn level(self) -> u8 {
        match self {
            Direction::Ltr => 0,
            Direction::Rtl => 1,
        }
    }

    fn of_level(level: u8) -> Direction {
        if level & 1 == 0 { Direction::Ltr } else { Direction::Rtl }
    }
}

#[derive(Debug, PartialEq)]
struct ContextData {
    level: u8,
    dir: Direction,
    overridden: bool,
    parent: Option<BidiContext>,
}

/// Directional embedding state. Cheap to clone; lines keep a snapshot of the
/// context they start in.
#[derive(Debug, Clone, PartialEq)]
pub struct BidiContext(Rc<ContextData>);

impl BidiContext {
    /// Base context of a paragraph with the given direction
    pub fn new(dir: Direction) -> Self {
        BidiContext(Rc::new(ContextData {
            level: dir.level(),
            dir,
            overridden: false,
            parent: None,
        }))
    }

    pub fn level(&self) -> u8 {
        self.0.level
    }

    pub fn dir(&self) -> Direction {
        self.0.dir
    }

    pub fn is_override(&self) -> bool {
        self.0.overridden
    }

    pub fn parent(&self) -> Option<&BidiContext> {
        self.0.parent.as_ref()
    }

    /// Nested embedding, or `None` when it would exceed `MAX_LEVEL`
    pub fn push(&self, rtl: bool, overridden: bool) -> Option<BidiContext> {
        let level = if rtl {
            (self.level() + 1) | 1
        } else {
            (self.level() + 2) & !1
        };
        if level > MAX_LEVEL {
            return None;
        }
        Some(BidiContext(Rc::new(ContextData {
            level,
            dir: if rtl { Direction::Rtl } else { Direction::Ltr },
            overridden,
            parent: Some(self.clone()),
        })))
    }

    pub fn pop(&self) -> BidiContext {
        self.parent().cloned().unwrap_or_else(|| self.clone())
    }
}

/// Resolution state carried from the end of one line to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BidiStatus {
    /// Last strong type seen (L, R or AL)
    pub last_strong: Option<BidiClass>,
    /// Embeddings ignored because of the depth limit, still awaiting their PDF
    pub overflow: u32,
}

/// Output of `resolve_levels`
#[derive(Debug, Clone)]
pub struct Resolution {
    pub levels: Vec<u8>,
    pub context: BidiContext,
    pub status: BidiStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    L,
    R,
    /// European/Arabic number that keeps its own class
    Num,
    Neutral,
}

fn is_neutral(t: BidiClass) -> bool {
    matches!(
        t,
        BidiClass::WS
            | BidiClass::ON
            | BidiClass::S
            | BidiClass::B
            | BidiClass::LRI
            | BidiClass::RLI
            | BidiClass::FSI
            | BidiClass::PDI
    )
}

fn is_number(t: BidiClass) -> bool {
    matches!(t, BidiClass::EN | BidiClass::AN)
}

/// Resolve embedding levels for the characters of one line.
///
/// `start` is the embedding context at the start of the line, `status` the
/// state left behind by the previous line, `base` the paragraph direction.
pub fn resolve_levels(
    text: &[char],
    start: &BidiContext,
    status: BidiStatus,
    base: Direction,
) -> Resolution {
    let n = text.len();
    let mut types: Vec<BidiClass> = text.iter().map(|&c| bidi_class(c)).collect();
    let mut levels = vec![start.level(); n];
    let mut ctx = start.clone();
    let mut overflow = status.overflow;

    // Explicit embeddings and overrides
    for i in 0..n {
        match types[i] {
            t @ (BidiClass::RLE | BidiClass::LRE | BidiClass::RLO | BidiClass::LRO) => {
                let rtl = matches!(t, BidiClass::RLE | BidiClass::RLO);
                let overridden = matches!(t, BidiClass::RLO | BidiClass::LRO);
                if overflow > 0 {
                    overflow += 1;
                } else {
                    match ctx.push(rtl, overridden) {
                        Some(next) => ctx = next,
                        None => overflow += 1,
                    }
                }
                levels[i] = ctx.level();
                types[i] = BidiClass::BN;
            }
            BidiClass::PDF => {
                levels[i] = ctx.level();
                if overflow > 0 {
                    overflow -= 1;
                } else {
                    ctx = ctx.pop();
                }
                types[i] = BidiClass::BN;
            }
            _ => {
                levels[i] = ctx.level();
                if ctx.is_override() {
                    types[i] = match ctx.dir() {
                        Direction::Ltr => BidiClass::L,
                        Direction::Rtl => BidiClass::R,
                    };
                }
            }
        }
    }

    let mut last_strong = status.last_strong;
    let mut resolved = vec![Resolved::Neutral; n];
    let base_level = base.level();

    // Level runs
    let mut run_start = 0;
    while run_start < n {
        let level = levels[run_start];
        let mut run_end = run_start + 1;
        while run_end < n && levels[run_end] == level {
            run_end += 1;
        }
        let prev_level = if run_start == 0 {
            start.level().max(base_level)
        } else {
            levels[run_start - 1]
        };
        let next_level = if run_end == n {
            ctx.level().max(base_level)
        } else {
            levels[run_end]
        };
        let sor = Direction::of_level(level.max(prev_level));
        let eor = Direction::of_level(level.max(next_level));
        let first_run = run_start == 0;
        resolve_run(
            &mut types[run_start..run_end],
            &mut resolved[run_start..run_end],
            level,
            sor,
            eor,
            if first_run { last_strong } else { None },
        );
        for t in &types[run_start..run_end] {
            if matches!(t, BidiClass::L | BidiClass::R | BidiClass::AL) {
                last_strong = Some(*t);
            }
        }
        run_start = run_end;
    }

    // Implicit levels
    for i in 0..n {
        let level = levels[i];
        levels[i] = match (level & 1 == 0, resolved[i]) {
            (true, Resolved::R) => level + 1,
            (true, Resolved::Num) => level + 2,
            (false, Resolved::L) | (false, Resolved::Num) => level + 1,
            _ => level,
        };
    }

    // Trailing whitespace and separators go back to the paragraph level
    for i in (0..n).rev() {
        let c = text[i];
        if matches!(bidi_class(c), BidiClass::WS | BidiClass::BN) || is_explicit(c) {
            levels[i] = base_level;
        } else {
            break;
        }
    }
    for i in 0..n {
        if matches!(bidi_class(text[i]), BidiClass::S | BidiClass::B) {
            levels[i] = base_level;
        }
    }

    Resolution {
        levels,
        context: ctx,
        status: BidiStatus {
            last_strong,
            overflow,
        },
    }
}

fn is_explicit(c: char) -> bool {
    ('\u{202A}'..='\u{202E}').contains(&c)
}

fn resolve_run(
    types: &mut [BidiClass],
    resolved: &mut [Resolved],
    level: u8,
    sor: Direction,
    eor: Direction,
    carried_strong: Option<BidiClass>,
) {
    let n = types.len();
    let sor_class = match sor {
        Direction::Ltr => BidiClass::L,
        Direction::Rtl => BidiClass::R,
    };

    // W1: non-spacing marks take the type of what precedes them
    let mut prev = sor_class;
    for t in types.iter_mut() {
        if *t == BidiClass::NSM {
            *t = prev;
        } else if *t != BidiClass::BN {
            prev = *t;
        }
    }

    // W2 / W3
    let mut strong = carried_strong.unwrap_or(sor_class);
    for t in types.iter_mut() {
        match *t {
            BidiClass::L | BidiClass::R | BidiClass::AL => strong = *t,
            BidiClass::EN if strong == BidiClass::AL => *t = BidiClass::AN,
            _ => {}
        }
    }
    for t in types.iter_mut() {
        if *t == BidiClass::AL {
            *t = BidiClass::R;
        }
    }

    // W4: a single separator between two numbers of the same kind
    for i in 1..n.saturating_sub(1) {
        let (before, after) = (types[i - 1], types[i + 1]);
        match types[i] {
            BidiClass::ES if before == BidiClass::EN && after == BidiClass::EN => {
                types[i] = BidiClass::EN
            }
            BidiClass::CS if before == after && is_number(before) => types[i] = before,
            _ => {}
        }
    }

    // W5: terminators next to European numbers
    let mut i = 0;
    while i < n {
        if types[i] == BidiClass::ET {
            let start = i;
            while i < n && types[i] == BidiClass::ET {
                i += 1;
            }
            let touches_en = (start > 0 && types[start - 1] == BidiClass::EN)
                || (i < n && types[i] == BidiClass::EN);
            if touches_en {
                for t in &mut types[start..i] {
                    *t = BidiClass::EN;
                }
            }
        } else {
            i += 1;
        }
    }

    // W6: leftover separators and terminators are neutral
    for t in types.iter_mut() {
        if matches!(*t, BidiClass::ES | BidiClass::ET | BidiClass::CS) {
            *t = BidiClass::ON;
        }
    }

    for (r, t) in resolved.iter_mut().zip(types.iter()) {
        *r = match t {
            BidiClass::L => Resolved::L,
            BidiClass::R | BidiClass::AL => Resolved::R,
            BidiClass::EN | BidiClass::AN => Resolved::Num,
            _ => Resolved::Neutral,
        };
    }

    // Number runs: bounded by neutrals on both sides they follow the
    // embedding direction; otherwise a preceding strong L makes them L
    let embedding = Direction::of_level(level);
    let mut i = 0;
    while i < n {
        if !is_number(types[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && (is_number(types[i]) || types[i] == BidiClass::BN) {
            i += 1;
        }
        let before = types[..start].iter().rev().find(|t| **t != BidiClass::BN);
        let after = types[i..].iter().find(|t| **t != BidiClass::BN);
        let neutral_before = before.is_none_or(|t| is_neutral(*t));
        let neutral_after = after.is_none_or(|t| is_neutral(*t));

        let to_l = if neutral_before && neutral_after {
            embedding == Direction::Ltr
        } else {
            let last = types[..start]
                .iter()
                .rev()
                .find(|t| matches!(t, BidiClass::L | BidiClass::R))
                .copied()
                .or(carried_strong.map(|c| if c == BidiClass::AL { BidiClass::R } else { c }))
                .unwrap_or(sor_class);
            last == BidiClass::L
        };
        if to_l {
            for r in &mut resolved[start..i] {
                if *r == Resolved::Num {
                    *r = Resolved::L;
                }
            }
        }
    }

    // N1 / N2: neutrals between equal strong directions take that direction,
    // otherwise the embedding direction
    let strong_of = |r: Resolved| match r {
        Resolved::L => Some(Direction::Ltr),
        Resolved::R | Resolved::Num => Some(Direction::Rtl),
        Resolved::Neutral => None,
    };
    let mut i = 0;
    while i < n {
        if resolved[i] != Resolved::Neutral {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && resolved[i] == Resolved::Neutral {
            i += 1;
        }
        let before = if start == 0 {
            sor
        } else {
            strong_of(resolved[start - 1]).unwrap_or(sor)
        };
        let after = if i == n {
            eor
        } else {
            strong_of(resolved[i]).unwrap_or(eor)
        };
        let dir = if before == after { before } else { embedding };
        let value = match dir {
            Direction::Ltr => Resolved::L,
            Direction::Rtl => Resolved::R,
        };
        for r in &mut resolved[start..i] {
            *r = value;
        }
    }
}

/// Logical indices in visual (left to right) order.
///
/// Reverses every maximal span at or above each level, from the highest
/// level down to the lowest odd one.
pub fn visual_order(levels: &[u8]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    let mut max_level = 0;
    let mut lowest_odd_level = u8::MAX;
    for &level in levels {
        max_level = max_level.max(level);
        if level & 1 != 0 {
            lowest_odd_level = lowest_odd_level.min(level);
        }
    }
    if lowest_odd_level == u8::MAX {
        return order;
    }

    let mut current: Vec<u8> = levels.to_vec();
    for level in (lowest_odd_level..=max_level).rev() {
        let mut i = 0;
        while i < current.len() {
            if current[i] >= level {
                let mut end = i + 1;
                while end < current.len() && current[end] >= level {
                    end += 1;
                }
                order[i..end].reverse();
                current[i..end].reverse();
                i = end;
            }
            i += 1;
        }
    }
    order
}

/// Glyph shown for `c` inside a right-to-left run
pub fn mirrored_char(c: char) -> char {
    match c {
        '(' => ')',
        ')' => '(',
        '[' => ']',
        ']' => '[',
        '{' => '}',
        '}' => '{',
        '<' => '>',
        '>' => '<',
        '«' => '»',
        '»' => '«',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels_of(text: &str, base: Direction) -> Vec<u8> {
        let chars: Vec<char> = text.chars().collect();
        resolve_levels(&chars, &BidiContext::new(base), BidiStatus::default(), base).levels
    }

    fn visual(text: &str, base: Direction) -> String {
        let chars: Vec<char> = text.chars().collect();
        let levels = levels_of(text, base);
        visual_order(&levels).into_iter().map(|i| chars[i]).collect()
    }

    #[test]
    fn test_pure_ltr_is_identity() {
        assert_eq!(levels_of("hello world", Direction::Ltr), vec![0; 11]);
        assert_eq!(visual("hello world", Direction::Ltr), "hello world");
    }

    #[test]
    fn test_rtl_run_is_reversed() {
        // alef bet gimel inside latin text
        let text = "ab \u{05D0}\u{05D1}\u{05D2} cd";
        assert_eq!(visual(text, Direction::Ltr), "ab \u{05D2}\u{05D1}\u{05D0} cd");
    }

    #[test]
    fn test_number_between_neutrals_takes_embedding_direction() {
        // latin, number, arabic with a right-to-left paragraph
        let text = "abc 123 \u{0627}\u{0628}\u{062C}";
        let levels = levels_of(text, Direction::Rtl);
        assert_eq!(levels, vec![2, 2, 2, 1, 2, 2, 2, 1, 1, 1, 1]);
        assert_eq!(
            visual(text, Direction::Rtl),
            "\u{062C}\u{0628}\u{0627} 123 abc"
        );
    }

    #[test]
    fn test_number_after_latin_becomes_latin() {
        let text = "abc123 \u{05D0}";
        let levels = levels_of(text, Direction::Rtl);
        assert_eq!(&levels[..6], &[2, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_arabic_number_after_arabic_letter() {
        let text = "\u{0627}12";
        let levels = levels_of(text, Direction::Ltr);
        assert_eq!(levels, vec![1, 2, 2]);
        assert_eq!(visual(text, Direction::Ltr), "12\u{0627}");
    }

    #[test]
    fn test_explicit_embedding() {
        // RLE ... PDF around latin text in a latin paragraph
        let text = "a\u{202B}bc\u{202C}d";
        let levels = levels_of(text, Direction::Ltr);
        assert_eq!(levels[2], 2);
        assert_eq!(levels[3], 2);
        assert_eq!(levels[0], 0);
        assert_eq!(levels[5], 0);
    }

    #[test]
    fn test_override_forces_direction() {
        let text = "\u{202E}abc\u{202C}";
        assert_eq!(visual(text, Direction::Ltr).replace(['\u{202E}', '\u{202C}'], ""), "cba");
    }

    #[test]
    fn test_embedding_depth_is_capped() {
        let text: String = std::iter::repeat_n('\u{202A}', 70).chain("x".chars()).collect();
        let chars: Vec<char> = text.chars().collect();
        let res = resolve_levels(
            &chars,
            &BidiContext::new(Direction::Ltr),
            BidiStatus::default(),
            Direction::Ltr,
        );
        assert!(res.levels.iter().all(|l| *l <= MAX_LEVEL + 1));
        assert_eq!(res.context.level(), 60);
        assert!(res.status.overflow > 0);
    }

    #[test]
    fn test_context_carries_across_lines() {
        let first: Vec<char> = "a\u{202B}b".chars().collect();
        let res = resolve_levels(
            &first,
            &BidiContext::new(Direction::Ltr),
            BidiStatus::default(),
            Direction::Ltr,
        );
        assert_eq!(res.context.level(), 1);
        let second: Vec<char> = "c\u{202C}d".chars().collect();
        let res2 = resolve_levels(&second, &res.context, res.status, Direction::Ltr);
        assert_eq!(res2.context.level(), 0);
        assert_eq!(res2.levels[0], 2);
    }

    #[test]
    fn test_visual_order_nested_levels() {
        assert_eq!(visual_order(&[0, 1, 1, 2, 2, 1, 0]), vec![0, 5, 3, 4, 2, 1, 6]);
    }

    #[test]
    fn test_mirroring() {
        assert_eq!(mirrored_char('('), ')');
        assert_eq!(mirrored_char('a'), 'a');
    }
}
