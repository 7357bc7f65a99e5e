//! Terminal grid: page lines plus scrollback history.
//!
//! The grid stores [`Line`]s. Logical addressing spans
//! `[-history_count, page_lines)`: negative offsets index scrollback (−1 is
//! the newest history line), non-negative offsets index the visible page.
//! Scrolling up within a full-page margin migrates evicted lines into the
//! history ring (primary screen only — the alternate grid is built with
//! history disabled); resize optionally reflows soft-wrapped lines.

use std::collections::VecDeque;

use crate::cell::{Cell, SgrAttrs};
use crate::geometry::{CellLocation, Margin, PageSize};
use crate::line::{Line, LineFlags};

/// Scrollback retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLimit {
    /// Keep everything.
    Unbounded,
    /// No scrollback at all (alternate screen, status line).
    None,
    /// Keep at most this many lines.
    Bounded(u32),
}

impl Default for HistoryLimit {
    fn default() -> Self {
        HistoryLimit::Bounded(1000)
    }
}

impl HistoryLimit {
    fn cap(&self) -> Option<usize> {
        match self {
            HistoryLimit::Unbounded => None,
            HistoryLimit::None => Some(0),
            HistoryLimit::Bounded(n) => Some(*n as usize),
        }
    }
}

/// One logical line: a maximal chain of `WRAPPED`-linked grid lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Offset of the first physical line of the chain.
    pub top: i64,
    /// Offset of the last physical line of the chain.
    pub bottom: i64,
    /// Concatenated text of the chain.
    pub text: String,
}

/// Page + scrollback cell storage.
#[derive(Debug, Clone)]
pub struct Grid {
    page: Vec<Line>,
    history: VecDeque<Line>,
    size: PageSize,
    max_history: HistoryLimit,
    reflow_on_resize: bool,
}

impl Grid {
    pub fn new(size: PageSize, max_history: HistoryLimit, reflow_on_resize: bool) -> Self {
        let page = (0..size.lines).map(|_| Line::blank(size.columns)).collect();
        Self {
            page,
            history: VecDeque::new(),
            size,
            max_history,
            reflow_on_resize,
        }
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    pub fn max_history(&self) -> HistoryLimit {
        self.max_history
    }

    pub fn set_max_history(&mut self, limit: HistoryLimit) {
        self.max_history = limit;
        self.evict_history();
    }

    /// Whether reflow applies on column resize.
    pub fn reflows(&self) -> bool {
        self.reflow_on_resize
    }

    // ── Line access ─────────────────────────────────────────────────

    /// Line at a logical offset in `[-history_count, lines)`.
    pub fn line_at(&self, offset: i64) -> Option<&Line> {
        if offset >= 0 {
            self.page.get(offset as usize)
        } else {
            let back = (-offset) as usize;
            if back > self.history.len() {
                return None;
            }
            self.history.get(self.history.len() - back)
        }
    }

    /// Mutable line at a logical offset.
    pub fn line_at_mut(&mut self, offset: i64) -> Option<&mut Line> {
        if offset >= 0 {
            self.page.get_mut(offset as usize)
        } else {
            let back = (-offset) as usize;
            if back > self.history.len() {
                return None;
            }
            let idx = self.history.len() - back;
            self.history.get_mut(idx)
        }
    }

    /// Visible page line.
    pub fn page_line(&self, line: u16) -> Option<&Line> {
        self.page.get(usize::from(line))
    }

    pub fn page_line_mut(&mut self, line: u16) -> Option<&mut Line> {
        self.page.get_mut(usize::from(line))
    }

    /// Cell value at a page position.
    pub fn cell(&self, pos: CellLocation) -> Option<Cell> {
        self.page_line(pos.line)?.cell(pos.column)
    }

    /// Mutable cell at a page position (inflates the line).
    pub fn cell_mut(&mut self, pos: CellLocation) -> Option<&mut Cell> {
        self.page_line_mut(pos.line)?.cell_mut(pos.column)
    }

    /// Plain text of one page line.
    pub fn line_text(&self, line: u16) -> String {
        self.page_line(line).map(Line::text).unwrap_or_default()
    }

    // ── Scrolling ───────────────────────────────────────────────────

    /// Remove `n` lines at the margin top; insert `n` fresh lines (filled
    /// with `attrs`) above the margin bottom. Evicted lines migrate into
    /// history iff the margin is the full page and history is enabled.
    pub fn scroll_up(&mut self, n: u16, attrs: SgrAttrs, margin: Margin) {
        let margin = margin.clamped(self.size);
        let n = n.min(margin.vertical_extent());
        if n == 0 {
            return;
        }
        if margin.is_full_page(self.size) {
            for _ in 0..n {
                let evicted = self.page.remove(0);
                if self.max_history.cap() != Some(0) {
                    self.history.push_back(evicted);
                }
                self.page.push(Line::filled(self.size.columns, attrs));
            }
            self.evict_history();
            return;
        }
        if margin.is_full_width(self.size) {
            // Vertical-only margin: rotate whole lines.
            let top = usize::from(margin.top);
            let bottom = usize::from(margin.bottom);
            for _ in 0..n {
                self.page.remove(top);
                self.page
                    .insert(bottom, Line::filled(self.size.columns, attrs));
            }
            return;
        }
        // Left/right margins active: move cell runs within the rectangle.
        let width = usize::from(margin.horizontal_extent());
        for line in margin.top..=margin.bottom {
            let src_line = line + n;
            let run: Vec<Cell> = if src_line <= margin.bottom {
                self.collect_run(src_line, margin.left, width)
            } else {
                vec![Cell::with_attrs(' ', 1, attrs); width]
            };
            self.write_run(line, margin.left, &run);
        }
    }

    /// Mirror of [`scroll_up`]: insert `n` fresh lines at the margin top,
    /// dropping lines that fall off the margin bottom.
    pub fn scroll_down(&mut self, n: u16, attrs: SgrAttrs, margin: Margin) {
        let margin = margin.clamped(self.size);
        let n = n.min(margin.vertical_extent());
        if n == 0 {
            return;
        }
        if margin.is_full_width(self.size) {
            let top = usize::from(margin.top);
            let bottom = usize::from(margin.bottom);
            for _ in 0..n {
                self.page.remove(bottom);
                self.page.insert(top, Line::filled(self.size.columns, attrs));
            }
            return;
        }
        let width = usize::from(margin.horizontal_extent());
        for line in (margin.top..=margin.bottom).rev() {
            let run: Vec<Cell> = if line >= margin.top + n {
                self.collect_run(line - n, margin.left, width)
            } else {
                vec![Cell::with_attrs(' ', 1, attrs); width]
            };
            self.write_run(line, margin.left, &run);
        }
    }

    /// DECDC-style horizontal rotation: shift the margin rectangle left by
    /// `n` columns, filling the vacated right edge.
    pub fn scroll_left(&mut self, n: u16, attrs: SgrAttrs, margin: Margin) {
        let margin = margin.clamped(self.size);
        let n = usize::from(n.min(margin.horizontal_extent()));
        if n == 0 {
            return;
        }
        let width = usize::from(margin.horizontal_extent());
        for line in margin.top..=margin.bottom {
            let mut run = self.collect_run(line, margin.left, width);
            run.rotate_left(n);
            for cell in &mut run[width - n..] {
                *cell = Cell::with_attrs(' ', 1, attrs);
            }
            self.write_run(line, margin.left, &run);
        }
    }

    /// Mirror of [`scroll_left`].
    pub fn scroll_right(&mut self, n: u16, attrs: SgrAttrs, margin: Margin) {
        let margin = margin.clamped(self.size);
        let n = usize::from(n.min(margin.horizontal_extent()));
        if n == 0 {
            return;
        }
        let width = usize::from(margin.horizontal_extent());
        for line in margin.top..=margin.bottom {
            let mut run = self.collect_run(line, margin.left, width);
            run.rotate_right(n);
            for cell in &mut run[..n] {
                *cell = Cell::with_attrs(' ', 1, attrs);
            }
            self.write_run(line, margin.left, &run);
        }
    }

    fn collect_run(&self, line: u16, left: u16, width: usize) -> Vec<Cell> {
        let mut run = Vec::with_capacity(width);
        for col in left..left + width as u16 {
            run.push(
                self.page_line(line)
                    .and_then(|l| l.cell(col))
                    .unwrap_or_default(),
            );
        }
        run
    }

    fn write_run(&mut self, line: u16, left: u16, run: &[Cell]) {
        if let Some(l) = self.page_line_mut(line) {
            let cells = l.inflate();
            for (i, cell) in run.iter().enumerate() {
                let col = usize::from(left) + i;
                if col < cells.len() {
                    cells[col] = cell.clone();
                }
            }
        }
    }

    fn evict_history(&mut self) {
        if let Some(cap) = self.max_history.cap() {
            while self.history.len() > cap {
                self.history.pop_front();
            }
        }
    }

    /// Drop all scrollback (`CSI 3 J`, RIS).
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Reset every page line to blank default.
    pub fn clear_page(&mut self) {
        for line in &mut self.page {
            line.reset(SgrAttrs::default());
        }
    }

    // ── Resize ──────────────────────────────────────────────────────

    /// Resize the page, returning the translated cursor and wrap-pending
    /// state.
    ///
    /// Column changes reflow soft-wrapped content when this grid was built
    /// with reflow enabled; otherwise lines truncate/extend in place. Height
    /// changes exchange lines with history so content above the cursor is
    /// preserved.
    pub fn resize(
        &mut self,
        new_size: PageSize,
        cursor: CellLocation,
        wrap_pending: bool,
    ) -> (CellLocation, bool) {
        if new_size == self.size {
            return (cursor, wrap_pending);
        }
        let mut cursor = cursor;
        let mut wrap_pending = wrap_pending;

        if new_size.columns != self.size.columns {
            if self.reflow_on_resize {
                cursor = self.reflow_columns(new_size.columns, cursor);
                wrap_pending = false;
            } else {
                for line in self.page.iter_mut().chain(self.history.iter_mut()) {
                    line.set_columns(new_size.columns);
                }
                cursor.column = cursor.column.min(new_size.columns.saturating_sub(1));
            }
            self.size.columns = new_size.columns;
        }

        if new_size.lines != self.size.lines {
            cursor = self.resize_lines(new_size.lines, cursor);
            self.size.lines = new_size.lines;
        }

        cursor.line = cursor.line.min(new_size.lines.saturating_sub(1));
        cursor.column = cursor.column.min(new_size.columns.saturating_sub(1));
        (cursor, wrap_pending)
    }

    fn resize_lines(&mut self, new_lines: u16, mut cursor: CellLocation) -> CellLocation {
        let old_lines = self.size.lines;
        if new_lines < old_lines {
            // Prefer dropping blank lines below the cursor; push the rest
            // into history from the top.
            let mut excess = usize::from(old_lines - new_lines);
            while excess > 0 {
                let below_cursor = self.page.len() > usize::from(cursor.line) + 1;
                let last_blank = self.page.last().is_some_and(Line::is_blank);
                if below_cursor && last_blank {
                    self.page.pop();
                } else {
                    let evicted = self.page.remove(0);
                    if self.max_history.cap() != Some(0) {
                        self.history.push_back(evicted);
                    }
                    cursor.line = cursor.line.saturating_sub(1);
                }
                excess -= 1;
            }
            self.evict_history();
        } else {
            let mut needed = usize::from(new_lines - old_lines);
            // Pull lines back out of history first.
            while needed > 0 {
                match self.history.pop_back() {
                    Some(mut line) => {
                        line.set_columns(self.size.columns);
                        self.page.insert(0, line);
                        cursor.line = cursor.line.saturating_add(1);
                    }
                    None => break,
                }
                needed -= 1;
            }
            for _ in 0..needed {
                self.page.push(Line::blank(self.size.columns));
            }
        }
        cursor
    }

    /// Re-split every wrappable logical line at the new column count.
    ///
    /// Trailing blanks beyond the last non-blank cell of a logical line are
    /// dropped; the `MARKED` flag stays on the first segment; every segment
    /// except the last carries `WRAPPED`.
    fn reflow_columns(&mut self, new_columns: u16, cursor: CellLocation) -> CellLocation {
        let cursor_abs = self.history.len() as i64 + i64::from(cursor.line);
        let mut cursor_tracker: Option<(usize, usize)> = None; // (logical idx, cell offset)

        // Gather all lines (history then page) into logical chains.
        let all: Vec<Line> = self
            .history
            .drain(..)
            .chain(self.page.drain(..))
            .collect();

        let mut logical: Vec<(Vec<Cell>, LineFlags)> = Vec::new();
        for (idx, line) in all.iter().enumerate() {
            let continues = line.is_wrapped()
                && line.flags.contains(LineFlags::WRAPPABLE)
                && !logical.is_empty();
            if !continues {
                logical.push((Vec::new(), line.flags & LineFlags::MARKED));
            }
            if idx as i64 == cursor_abs {
                let offset = logical.last().map(|(c, _)| c.len()).unwrap_or(0)
                    + usize::from(cursor.column);
                cursor_tracker = Some((logical.len() - 1, offset));
            }
            let chain = logical.last_mut().unwrap_or_else(|| unreachable!());
            chain.0.extend(line.to_cells());
        }

        // Trim trailing blanks per logical line.
        for (cells, _) in &mut logical {
            while cells.last().is_some_and(|c| {
                c.is_blank() && c.attrs() == SgrAttrs::default()
            }) {
                cells.pop();
            }
        }

        // Re-split at the new width.
        let mut new_lines: Vec<Line> = Vec::new();
        let mut new_cursor_abs: Option<(usize, u16)> = None;
        for (logical_idx, (cells, marked)) in logical.into_iter().enumerate() {
            let mut segments: Vec<Vec<Cell>> = Vec::new();
            if cells.is_empty() {
                segments.push(Vec::new());
            } else {
                let mut start = 0usize;
                while start < cells.len() {
                    let mut end = (start + usize::from(new_columns)).min(cells.len());
                    // Never split a wide pair across the boundary.
                    if end < cells.len() && cells[end].is_wide_continuation() {
                        end -= 1;
                    }
                    if end == start {
                        end = start + 1;
                    }
                    segments.push(cells[start..end].to_vec());
                    start = end;
                }
            }
            let last = segments.len() - 1;
            for (i, segment) in segments.into_iter().enumerate() {
                if let Some((tracked_idx, offset)) = cursor_tracker {
                    if tracked_idx == logical_idx && new_cursor_abs.is_none() {
                        let line_start = i * usize::from(new_columns);
                        let line_end = line_start + usize::from(new_columns);
                        if (line_start..line_end).contains(&offset) || i == last {
                            let col = offset.saturating_sub(line_start).min(
                                usize::from(new_columns.saturating_sub(1)),
                            );
                            new_cursor_abs = Some((new_lines.len(), col as u16));
                        }
                    }
                }
                let mut flags = LineFlags::WRAPPABLE;
                if i > 0 {
                    flags |= LineFlags::WRAPPED;
                }
                if i == 0 {
                    flags |= marked;
                }
                new_lines.push(Line::from_cells(new_columns, segment, flags));
            }
        }

        // Rebuild page + history: the last `size.lines` lines form the page.
        // Trailing blank lines (below the cursor) never force content into
        // history.
        let page_lines = usize::from(self.size.lines);
        let cursor_line_abs = new_cursor_abs.map(|(abs, _)| abs).unwrap_or(0);
        while new_lines.len() > page_lines
            && new_lines.last().is_some_and(Line::is_blank)
            && new_lines.len() - 1 > cursor_line_abs
        {
            new_lines.pop();
        }
        let split = new_lines.len().saturating_sub(page_lines);
        let mut iter = new_lines.into_iter();
        for _ in 0..split {
            self.history.push_back(iter.next().unwrap_or_else(|| unreachable!()));
        }
        self.page = iter.collect();
        while self.page.len() < page_lines {
            self.page.push(Line::blank(new_columns));
        }
        self.evict_history();

        let new_cursor = match new_cursor_abs {
            Some((abs, col)) => {
                let line = abs.saturating_sub(self.history.len()) as u16;
                CellLocation::new(line.min(self.size.lines.saturating_sub(1)), col)
            }
            None => CellLocation::new(
                cursor.line.min(self.size.lines.saturating_sub(1)),
                cursor.column.min(new_columns.saturating_sub(1)),
            ),
        };
        new_cursor
    }

    // ── Logical-line iteration ──────────────────────────────────────

    /// Logical lines from `offset` downward (search, capture).
    pub fn logical_lines_from(&self, offset: i64) -> LogicalLineIter<'_> {
        LogicalLineIter {
            grid: self,
            next: self.logical_start(offset),
            reverse: false,
        }
    }

    /// Logical lines from `offset` upward.
    pub fn logical_lines_reverse_from(&self, offset: i64) -> LogicalLineIter<'_> {
        LogicalLineIter {
            grid: self,
            next: self.logical_start(offset),
            reverse: true,
        }
    }

    /// Lowest offset addressable (`-history_count`).
    pub fn top_offset(&self) -> i64 {
        -(self.history.len() as i64)
    }

    /// First line of the logical chain containing `offset`.
    fn logical_start(&self, mut offset: i64) -> Option<i64> {
        self.line_at(offset)?;
        while let Some(line) = self.line_at(offset) {
            if !line.is_wrapped() || self.line_at(offset - 1).is_none() {
                break;
            }
            offset -= 1;
        }
        Some(offset)
    }

    fn logical_at(&self, top: i64) -> Option<LogicalLine> {
        let first = self.line_at(top)?;
        let mut text = first.text();
        let mut bottom = top;
        while let Some(next) = self.line_at(bottom + 1) {
            if !next.is_wrapped() {
                break;
            }
            bottom += 1;
            text.push_str(&next.text());
        }
        Some(LogicalLine { top, bottom, text })
    }
}

/// Lazy iterator over logical lines.
pub struct LogicalLineIter<'a> {
    grid: &'a Grid,
    next: Option<i64>,
    reverse: bool,
}

impl Iterator for LogicalLineIter<'_> {
    type Item = LogicalLine;

    fn next(&mut self) -> Option<Self::Item> {
        let top = self.next?;
        let logical = self.grid.logical_at(top)?;
        self.next = if self.reverse {
            let prev = logical.top - 1;
            self.grid.logical_start(prev)
        } else {
            let after = logical.bottom + 1;
            self.grid.line_at(after).map(|_| after)
        };
        Some(logical)
    }
}
