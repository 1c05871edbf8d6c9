// Table
// Grid of cells, each holding its own nested document. Column widths come
// from a two-pass layout: natural widths first, then the settled grid.

use crate::draw_context::{Color, DrawContext, Palette, Rect};

use super::document::Document;

/// Width cells are laid out at when measuring their natural width
const UNCONSTRAINED: i32 = 1_000_000;

#[derive(Debug)]
pub struct TableCell {
    document: Document,
    row: usize,
    col: usize,
    rowspan: usize,
    colspan: usize,
    /// Position and size relative to the table's top left corner
    rect: Rect,
    min_width: i32,
    natural_width: i32,
    pub background: Option<Color>,
    pub header: bool,
}

impl TableCell {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn rowspan(&self) -> usize {
        self.rowspan
    }

    pub fn colspan(&self) -> usize {
        self.colspan
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    fn covers_col(&self, col: usize) -> bool {
        col >= self.col && col < self.col + self.colspan
    }
}

#[derive(Debug)]
pub struct Table {
    cells: Vec<TableCell>,
    rows: usize,
    cols: usize,
    pub border: i32,
    pub cellspacing: i32,
    pub cellpadding: i32,
    fixed_width: Option<i32>,
    percent_width: Option<i32>,
    width: i32,
    height: i32,
    min_width: i32,
    col_widths: Vec<i32>,
    row_heights: Vec<i32>,
}

impl Default for Table {
    fn default() -> Self {
        Table {
            cells: Vec::new(),
            rows: 0,
            cols: 0,
            border: 0,
            cellspacing: 2,
            cellpadding: 1,
            fixed_width: None,
            percent_width: None,
            width: 0,
            height: 0,
            min_width: 0,
            col_widths: Vec::new(),
            row_heights: Vec::new(),
        }
    }
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// Requested width in pixels
    pub fn set_fixed_width(&mut self, width: Option<i32>) {
        self.fixed_width = width;
        self.percent_width = None;
    }

    /// Requested width as a percentage of the available width
    pub fn set_percent_width(&mut self, percent: Option<i32>) {
        self.percent_width = percent.map(|p| p.clamp(1, 100));
        self.fixed_width = None;
    }

    /// Place a cell in the first free column of `row`, skipping columns
    /// taken by row-spanning cells above. Returns the cell index.
    pub fn add_cell(
        &mut self,
        document: Document,
        row: usize,
        rowspan: usize,
        colspan: usize,
    ) -> usize {
        let rowspan = rowspan.max(1);
        let colspan = colspan.max(1);
        let mut col = 0;
        while self.is_occupied(row, col, colspan) {
            col += 1;
        }
        self.cells.push(TableCell {
            document,
            row,
            col,
            rowspan,
            colspan,
            rect: Rect::default(),
            min_width: 0,
            natural_width: 0,
            background: None,
            header: false,
        });
        self.rows = self.rows.max(row + rowspan);
        self.cols = self.cols.max(col + colspan);
        self.cells.len() - 1
    }

    fn is_occupied(&self, row: usize, col: usize, colspan: usize) -> bool {
        self.cells.iter().any(|c| {
            row >= c.row
                && row < c.row + c.rowspan
                && col < c.col + c.colspan
                && c.col < col + colspan
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cells(&self) -> &[TableCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&TableCell> {
        self.cells.get(index)
    }

    pub fn cell_mut(&mut self, index: usize) -> Option<&mut TableCell> {
        self.cells.get_mut(index)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Narrowest width found by the last `resize`
    pub fn minimum_width(&self) -> i32 {
        self.min_width
    }

    pub fn column_widths(&self) -> &[i32] {
        &self.col_widths
    }

    fn overhead(&self) -> i32 {
        2 * self.border + self.cellspacing * (self.cols as i32 + 1)
    }

    /// Lay the grid out within `available` pixels
    pub fn resize(&mut self, available: i32) {
        if self.cells.is_empty() {
            self.width = 2 * self.border;
            self.height = 2 * self.border;
            self.min_width = self.width;
            return;
        }
        let pad2 = 2 * self.cellpadding;

        // First pass: every cell unconstrained
        for cell in &mut self.cells {
            cell.document.set_width(UNCONSTRAINED);
            cell.document.do_layout();
            cell.natural_width = cell.document.widest_line() + pad2;
            cell.min_width = cell.document.minimum_width() + pad2;
        }

        let mut col_min = vec![0; self.cols];
        let mut col_nat = vec![0; self.cols];
        for cell in self.cells.iter().filter(|c| c.colspan == 1) {
            col_min[cell.col] = col_min[cell.col].max(cell.min_width);
            col_nat[cell.col] = col_nat[cell.col].max(cell.natural_width);
        }
        for cell in self.cells.iter().filter(|c| c.colspan > 1) {
            let span = cell.col..cell.col + cell.colspan;
            let gaps = self.cellspacing * (cell.colspan as i32 - 1);
            spread(&mut col_min[span.clone()], cell.min_width - gaps);
            spread(&mut col_nat[span], cell.natural_width - gaps);
        }
        for (nat, min) in col_nat.iter_mut().zip(&col_min) {
            *nat = (*nat).max(*min);
        }

        let overhead = self.overhead();
        let sum_min: i32 = col_min.iter().sum();
        let sum_nat: i32 = col_nat.iter().sum();
        let stretch = self.fixed_width.is_some() || self.percent_width.is_some();
        let target = match (self.fixed_width, self.percent_width) {
            (Some(w), _) => w,
            (None, Some(p)) => available * p / 100,
            _ => available.min(sum_nat + overhead),
        };
        let inner = target.max(sum_min + overhead) - overhead;

        self.col_widths = if inner >= sum_nat {
            let mut widths = col_nat.clone();
            if stretch {
                spread(&mut widths, inner);
            }
            widths
        } else {
            let room = inner - sum_min;
            let wanted = sum_nat - sum_min;
            let mut widths: Vec<i32> = col_min
                .iter()
                .zip(&col_nat)
                .map(|(min, nat)| min + (nat - min) * room / wanted)
                .collect();
            let used: i32 = widths.iter().sum();
            if let Some(last) = widths.last_mut() {
                *last += inner - used;
            }
            widths
        };

        // Second pass: lay each cell out at its settled width
        let mut cell_heights = Vec::with_capacity(self.cells.len());
        for cell in &mut self.cells {
            let w = self.col_widths[cell.col..cell.col + cell.colspan]
                .iter()
                .sum::<i32>()
                + self.cellspacing * (cell.colspan as i32 - 1);
            cell.document.set_width((w - pad2).max(1));
            cell.document.do_layout();
            cell.rect.w = w;
            cell_heights.push(cell.document.height() + pad2);
        }

        self.row_heights = vec![0; self.rows];
        for (cell, h) in self.cells.iter().zip(&cell_heights) {
            if cell.rowspan == 1 {
                self.row_heights[cell.row] = self.row_heights[cell.row].max(*h);
            }
        }
        for (cell, h) in self.cells.iter().zip(&cell_heights) {
            if cell.rowspan > 1 {
                let span = cell.row..cell.row + cell.rowspan;
                let have = self.row_heights[span.clone()].iter().sum::<i32>()
                    + self.cellspacing * (cell.rowspan as i32 - 1);
                if *h > have {
                    self.row_heights[span.end - 1] += h - have;
                }
            }
        }

        let col_x = offsets(&self.col_widths, self.border + self.cellspacing, self.cellspacing);
        let row_y = offsets(&self.row_heights, self.border + self.cellspacing, self.cellspacing);
        for cell in &mut self.cells {
            cell.rect.x = col_x[cell.col];
            cell.rect.y = row_y[cell.row];
            cell.rect.h = self.row_heights[cell.row..cell.row + cell.rowspan]
                .iter()
                .sum::<i32>()
                + self.cellspacing * (cell.rowspan as i32 - 1);
        }

        self.width = overhead + self.col_widths.iter().sum::<i32>();
        self.height = 2 * self.border
            + self.cellspacing * (self.rows as i32 + 1)
            + self.row_heights.iter().sum::<i32>();
        self.min_width = sum_min + overhead;
    }

    pub fn draw(&self, p: &mut dyn DrawContext, x: i32, y: i32, clip: Rect, palette: &Palette) {
        if self.border > 0 {
            p.set_color(palette.dark);
            outline(p, Rect::new(x, y, self.width, self.height));
        }
        for cell in &self.cells {
            let r = cell.rect.translated(x, y);
            if !clip.is_empty() && !r.intersects(&clip) {
                continue;
            }
            if let Some(bg) = cell.background {
                p.set_color(bg);
                p.draw_rect_filled(r.x, r.y, r.w, r.h);
            }
            if self.border > 0 {
                p.set_color(palette.mid);
                outline(p, r);
            }
            let dx = r.x + self.cellpadding;
            let dy = r.y + self.cellpadding;
            let cell_clip = if clip.is_empty() {
                clip
            } else {
                clip.translated(-dx, -dy)
            };
            p.translate(dx, dy);
            cell.document.paint(p, cell_clip, palette);
            p.translate(-dx, -dy);
        }
    }

    /// Markup for the table; `align` is an attribute string such as
    /// ` align="left"` or empty
    pub fn rich_text(&self, align: &str) -> String {
        let mut out = format!(
            "<table border=\"{}\" cellspacing=\"{}\" cellpadding=\"{}\"",
            self.border, self.cellspacing, self.cellpadding
        );
        if let Some(w) = self.fixed_width {
            out.push_str(&format!(" width=\"{w}\""));
        } else if let Some(p) = self.percent_width {
            out.push_str(&format!(" width=\"{p}%\""));
        }
        out.push_str(align);
        out.push_str(">\n");
        for row in 0..self.rows {
            out.push_str("<tr>");
            for cell in self.cells.iter().filter(|c| c.row == row) {
                let tag = if cell.header { "th" } else { "td" };
                out.push('<');
                out.push_str(tag);
                if cell.colspan > 1 {
                    out.push_str(&format!(" colspan=\"{}\"", cell.colspan));
                }
                if cell.rowspan > 1 {
                    out.push_str(&format!(" rowspan=\"{}\"", cell.rowspan));
                }
                if let Some(bg) = cell.background {
                    out.push_str(&format!(" bgcolor=\"#{:06x}\"", bg >> 8));
                }
                out.push('>');
                out.push_str(&cell.document.rich_text());
                out.push_str(&format!("</{tag}>"));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>");
        out
    }

    // Cell navigation. Cells are stored in row-major order.

    /// Cell the cursor lands in when entering from the left (or the right
    /// when `at_end`)
    pub fn enter(&self, at_end: bool) -> Option<usize> {
        if self.cells.is_empty() {
            None
        } else if at_end {
            Some(self.cells.len() - 1)
        } else {
            Some(0)
        }
    }

    /// Cell under the point (table coordinates), or the nearest one
    pub fn enter_at(&self, x: i32, y: i32) -> Option<usize> {
        if let Some(i) = self.cells.iter().position(|c| c.rect.contains(x, y)) {
            return Some(i);
        }
        self.cells
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| {
                let dx = distance(x, c.rect.x, c.rect.right());
                let dy = distance(y, c.rect.y, c.rect.bottom());
                dy * 4 + dx
            })
            .map(|(i, _)| i)
    }

    pub fn next(&self, cell: usize) -> Option<usize> {
        (cell + 1 < self.cells.len()).then_some(cell + 1)
    }

    pub fn prev(&self, cell: usize) -> Option<usize> {
        cell.checked_sub(1).filter(|_| cell < self.cells.len())
    }

    /// Cell directly below; `None` from the last row
    pub fn down(&self, cell: usize) -> Option<usize> {
        let current = self.cells.get(cell)?;
        let row = current.row + current.rowspan;
        self.cells
            .iter()
            .position(|c| c.row == row && c.covers_col(current.col))
    }

    /// Cell directly above; `None` from the first row
    pub fn up(&self, cell: usize) -> Option<usize> {
        let current = self.cells.get(cell)?;
        self.cells
            .iter()
            .position(|c| c.row + c.rowspan == current.row && c.covers_col(current.col))
    }
}

/// Raise the columns of a span so they add up to at least `total`
fn spread(cols: &mut [i32], total: i32) {
    let have: i32 = cols.iter().sum();
    if total <= have || cols.is_empty() {
        return;
    }
    let extra = total - have;
    let n = cols.len() as i32;
    for (i, w) in cols.iter_mut().enumerate() {
        *w += extra / n + if (i as i32) < extra % n { 1 } else { 0 };
    }
}

/// Distance of `v` from the half-open range `[start, end)`
fn distance(v: i32, start: i32, end: i32) -> i32 {
    if v < start {
        start - v
    } else if v >= end {
        v - end + 1
    } else {
        0
    }
}

fn offsets(sizes: &[i32], start: i32, spacing: i32) -> Vec<i32> {
    let mut pos = start;
    sizes
        .iter()
        .map(|size| {
            let here = pos;
            pos += size + spacing;
            here
        })
        .collect()
}

fn outline(p: &mut dyn DrawContext, r: Rect) {
    let (right, bottom) = (r.right() - 1, r.bottom() - 1);
    p.draw_line(r.x, r.y, right, r.y);
    p.draw_line(r.x, bottom, right, bottom);
    p.draw_line(r.x, r.y, r.x, bottom);
    p.draw_line(right, r.y, right, bottom);
}
