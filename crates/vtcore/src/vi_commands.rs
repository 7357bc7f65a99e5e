//! Concrete vi-mode semantics: motions, selection, yank, and search over the
//! screen's combined buffer (scrollback + page).
//!
//! [`ViCommands`] holds the vi cursor (which is independent of the VT
//! cursor), the active selection, the yank register, and the search state.
//! The terminal wires it to the [`ViInputHandler`] through [`ViContext`],
//! which borrows the screen read-only: vi mode never mutates grid content.
//!
//! [`ViInputHandler`]: crate::vi_mode::ViInputHandler

use crate::geometry::PageSize;
use crate::screen::Screen;
use crate::settings::Settings;
use crate::vi_mode::{
    CharSearch, ObjectScope, TextObject, ViExecutor, ViMode, ViMotion, ViScroll,
};
use crate::viewport::Viewport;

/// A position in the combined buffer: line offset may reach into history
/// (negative), column is a page column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferPos {
    pub line: i64,
    pub column: u16,
}

impl BufferPos {
    pub const fn new(line: i64, column: u16) -> Self {
        Self { line, column }
    }
}

/// Selection shape, driven by the visual mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Cells,
    Lines,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: SelectionKind,
    pub anchor: BufferPos,
    pub head: BufferPos,
}

impl Selection {
    fn ordered(&self) -> (BufferPos, BufferPos) {
        if self.anchor <= self.head {
            (self.anchor, self.head)
        } else {
            (self.head, self.anchor)
        }
    }
}

/// Persistent vi-mode state.
#[derive(Debug, Default)]
pub struct ViCommands {
    pub cursor: BufferPos,
    pub selection: Option<Selection>,
    yank_register: String,
    search_pattern: String,
    mode: ViMode,
}

impl Default for BufferPos {
    fn default() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl ViCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest yanked text.
    pub fn yank_register(&self) -> &str {
        &self.yank_register
    }

    pub fn search_pattern(&self) -> &str {
        &self.search_pattern
    }

    /// Sync the vi cursor onto the VT cursor when entering normal mode.
    pub fn sync_to_screen_cursor(&mut self, screen: &Screen) {
        let pos = screen.cursor().position;
        self.cursor = BufferPos::new(i64::from(pos.line), pos.column);
        self.selection = None;
    }
}

/// Borrowed execution context handed to the input handler per key.
pub struct ViContext<'a> {
    pub commands: &'a mut ViCommands,
    pub screen: &'a Screen,
    pub viewport: &'a mut Viewport,
    pub settings: &'a Settings,
    /// Set when a yank produced text the host should receive.
    pub yanked: Option<String>,
    /// `p`/`P` happened: the terminal re-injects the register as a paste.
    pub paste_requested: Option<(u32, bool)>,
    /// `mm` happened: the terminal toggles the mark on the cursor line.
    pub mark_toggle_requested: bool,
}

impl<'a> ViContext<'a> {
    pub fn new(
        commands: &'a mut ViCommands,
        screen: &'a Screen,
        viewport: &'a mut Viewport,
        settings: &'a Settings,
    ) -> Self {
        Self {
            commands,
            screen,
            viewport,
            settings,
            yanked: None,
            paste_requested: None,
            mark_toggle_requested: false,
        }
    }

    fn page(&self) -> PageSize {
        self.screen.page_size()
    }

    fn top_offset(&self) -> i64 {
        self.screen.grid().top_offset()
    }

    fn line_text(&self, line: i64) -> String {
        self.screen
            .grid()
            .line_at(line)
            .map(|l| l.text())
            .unwrap_or_default()
    }

    fn line_chars(&self, line: i64) -> Vec<char> {
        // Column-indexed characters, including interior blanks.
        let Some(grid_line) = self.screen.grid().line_at(line) else {
            return Vec::new();
        };
        let columns = self.page().columns;
        (0..columns)
            .map(|c| grid_line.cell(c).map(|cell| cell.content()).unwrap_or(' '))
            .collect()
    }

    fn clamp(&self, pos: BufferPos) -> BufferPos {
        let page = self.page();
        let line = pos.line.clamp(self.top_offset(), i64::from(page.lines) - 1);
        let column = pos.column.min(page.columns.saturating_sub(1));
        BufferPos::new(line, column)
    }

    fn move_cursor_to(&mut self, pos: BufferPos) {
        let pos = self.clamp(pos);
        self.commands.cursor = pos;
        if let Some(selection) = &mut self.commands.selection {
            selection.head = pos;
        }
        let page_lines = self.page().lines;
        let grid = self.screen.grid();
        self.viewport.make_visible(pos.line, page_lines, grid);
    }

    fn is_word_char(&self, ch: char) -> bool {
        !ch.is_whitespace() && !self.settings.is_word_delimiter(ch)
    }

    fn char_at(&self, pos: BufferPos) -> char {
        self.line_chars(pos.line)
            .get(usize::from(pos.column))
            .copied()
            .unwrap_or(' ')
    }

    /// Step one column forward, flowing across line ends.
    fn step_forward(&self, pos: BufferPos) -> Option<BufferPos> {
        let page = self.page();
        if pos.column + 1 < page.columns {
            Some(BufferPos::new(pos.line, pos.column + 1))
        } else if pos.line + 1 < i64::from(page.lines) {
            Some(BufferPos::new(pos.line + 1, 0))
        } else {
            None
        }
    }

    fn step_backward(&self, pos: BufferPos) -> Option<BufferPos> {
        if pos.column > 0 {
            Some(BufferPos::new(pos.line, pos.column - 1))
        } else if pos.line > self.top_offset() {
            Some(BufferPos::new(
                pos.line - 1,
                self.page().columns.saturating_sub(1),
            ))
        } else {
            None
        }
    }

    // ── Word motions ────────────────────────────────────────────────

    fn word_forward(&self, mut pos: BufferPos, big: bool) -> BufferPos {
        let in_word = |ctx: &Self, p: BufferPos| {
            let ch = ctx.char_at(p);
            if big {
                !ch.is_whitespace()
            } else {
                ctx.is_word_char(ch)
            }
        };
        // Leave the current word, then skip blanks to the next start.
        while in_word(self, pos) {
            match self.step_forward(pos) {
                Some(next) => pos = next,
                None => return pos,
            }
        }
        while !in_word(self, pos) {
            match self.step_forward(pos) {
                Some(next) => pos = next,
                None => return pos,
            }
        }
        pos
    }

    fn word_backward(&self, mut pos: BufferPos, big: bool) -> BufferPos {
        let in_word = |ctx: &Self, p: BufferPos| {
            let ch = ctx.char_at(p);
            if big {
                !ch.is_whitespace()
            } else {
                ctx.is_word_char(ch)
            }
        };
        match self.step_backward(pos) {
            Some(prev) => pos = prev,
            None => return pos,
        }
        while !in_word(self, pos) {
            match self.step_backward(pos) {
                Some(prev) => pos = prev,
                None => return pos,
            }
        }
        // Walk to the word start.
        while let Some(prev) = self.step_backward(pos) {
            if in_word(self, prev) {
                pos = prev;
            } else {
                break;
            }
        }
        pos
    }

    fn word_end_forward(&self, mut pos: BufferPos, big: bool) -> BufferPos {
        let in_word = |ctx: &Self, p: BufferPos| {
            let ch = ctx.char_at(p);
            if big {
                !ch.is_whitespace()
            } else {
                ctx.is_word_char(ch)
            }
        };
        match self.step_forward(pos) {
            Some(next) => pos = next,
            None => return pos,
        }
        while !in_word(self, pos) {
            match self.step_forward(pos) {
                Some(next) => pos = next,
                None => return pos,
            }
        }
        while let Some(next) = self.step_forward(pos) {
            if in_word(self, next) {
                pos = next;
            } else {
                break;
            }
        }
        pos
    }

    fn word_range_at(&self, pos: BufferPos, big: bool) -> (BufferPos, BufferPos) {
        let in_word = |ctx: &Self, p: BufferPos| {
            let ch = ctx.char_at(p);
            if big {
                !ch.is_whitespace()
            } else {
                ctx.is_word_char(ch)
            }
        };
        let mut start = pos;
        while let Some(prev) = self.step_backward(start) {
            if prev.line == start.line && in_word(self, prev) {
                start = prev;
            } else {
                break;
            }
        }
        let mut end = pos;
        while let Some(next) = self.step_forward(end) {
            if next.line == end.line && in_word(self, next) {
                end = next;
            } else {
                break;
            }
        }
        (start, end)
    }

    // ── Paragraphs / sections / pairs ───────────────────────────────

    fn paragraph_forward(&self, from: i64) -> i64 {
        let page_lines = i64::from(self.page().lines);
        let mut line = from + 1;
        while line < page_lines {
            if self.line_text(line).is_empty() && !self.line_text(line - 1).is_empty() {
                return line;
            }
            line += 1;
        }
        page_lines - 1
    }

    fn paragraph_backward(&self, from: i64) -> i64 {
        let top = self.top_offset();
        let mut line = from - 1;
        while line > top {
            if self.line_text(line).is_empty() && !self.line_text(line + 1).is_empty() {
                return line;
            }
            line -= 1;
        }
        top
    }

    /// `%`: jump to the matching bracket under or after the cursor.
    fn matching_pair(&self, pos: BufferPos) -> Option<BufferPos> {
        const PAIRS: [(char, char); 4] = [('(', ')'), ('[', ']'), ('{', '}'), ('<', '>')];
        // Find a bracket at or after the cursor on this line.
        let chars = self.line_chars(pos.line);
        let (column, open, close, forward) = (usize::from(pos.column)..chars.len())
            .find_map(|c| {
                let ch = chars[c];
                PAIRS
                    .iter()
                    .find_map(|&(open, close)| {
                        if ch == open {
                            Some((c, open, close, true))
                        } else if ch == close {
                            Some((c, open, close, false))
                        } else {
                            None
                        }
                    })
            })?;
        let mut depth = 0i32;
        let mut pos = BufferPos::new(pos.line, column as u16);
        loop {
            let ch = self.char_at(pos);
            if ch == open {
                depth += if forward { 1 } else { -1 };
            } else if ch == close {
                depth += if forward { -1 } else { 1 };
            }
            if depth == 0 && (ch == open || ch == close) {
                return Some(pos);
            }
            pos = if forward {
                self.step_forward(pos)?
            } else {
                self.step_backward(pos)?
            };
        }
    }

    /// `[[`-family: previous/next line whose column 0 is `{` or `}`.
    fn section_line(&self, from: i64, forward: bool, target: char) -> i64 {
        let page_lines = i64::from(self.page().lines);
        let top = self.top_offset();
        let mut line = from;
        loop {
            line += if forward { 1 } else { -1 };
            if line >= page_lines {
                return page_lines - 1;
            }
            if line < top {
                return top;
            }
            if self.line_chars(line).first() == Some(&target) {
                return line;
            }
        }
    }

    fn marked_line(&self, from: i64, forward: bool) -> Option<i64> {
        let page_lines = i64::from(self.page().lines);
        let top = self.top_offset();
        let mut line = from;
        loop {
            line += if forward { 1 } else { -1 };
            if line >= page_lines || line < top {
                return None;
            }
            if self
                .screen
                .grid()
                .line_at(line)
                .is_some_and(|l| l.is_marked())
            {
                return Some(line);
            }
        }
    }

    // ── Extraction ──────────────────────────────────────────────────

    fn text_between(&self, start: BufferPos, end: BufferPos) -> String {
        let mut out = String::new();
        if start.line == end.line {
            let chars = self.line_chars(start.line);
            for c in start.column..=end.column {
                if let Some(ch) = chars.get(usize::from(c)) {
                    out.push(*ch);
                }
            }
            return out.trim_end().to_string();
        }
        for line in start.line..=end.line {
            let text = self.line_text(line);
            if line == start.line {
                let skip: String = text.chars().skip(usize::from(start.column)).collect();
                out.push_str(&skip);
            } else if line == end.line {
                let take: String = text.chars().take(usize::from(end.column) + 1).collect();
                out.push('\n');
                out.push_str(&take);
            } else {
                out.push('\n');
                out.push_str(&text);
            }
        }
        out
    }

    fn yank_range(&mut self, start: BufferPos, end: BufferPos) {
        let text = self.text_between(start, end);
        self.commands.yank_register = text.clone();
        self.yanked = Some(text);
    }

    // ── Search ──────────────────────────────────────────────────────

    fn find_match(&self, from: BufferPos, forward: bool) -> Option<BufferPos> {
        let pattern = &self.commands.search_pattern;
        if pattern.is_empty() {
            return None;
        }
        let page_lines = i64::from(self.page().lines);
        let top = self.top_offset();
        let mut line = from.line;
        let mut first = true;
        while (top..page_lines).contains(&line) {
            let text = self.line_text(line);
            let hit = if forward {
                let start = if first {
                    usize::from(from.column) + 1
                } else {
                    0
                };
                text.char_indices()
                    .map(|(i, _)| i)
                    .filter(|&i| char_index(&text, i) >= start)
                    .find(|&i| text[i..].starts_with(pattern.as_str()))
            } else {
                let limit = if first {
                    usize::from(from.column)
                } else {
                    usize::MAX
                };
                text.char_indices()
                    .map(|(i, _)| i)
                    .filter(|&i| char_index(&text, i) < limit)
                    .filter(|&i| text[i..].starts_with(pattern.as_str()))
                    .next_back()
            };
            if let Some(byte_index) = hit {
                return Some(BufferPos::new(line, char_index(&text, byte_index) as u16));
            }
            line += if forward { 1 } else { -1 };
            first = false;
        }
        None
    }
}

/// Byte index → character column.
fn char_index(text: &str, byte_index: usize) -> usize {
    text[..byte_index].chars().count()
}

impl ViExecutor for ViContext<'_> {
    fn mode_changed(&mut self, mode: ViMode) {
        let previous = self.commands.mode;
        self.commands.mode = mode;
        match mode {
            ViMode::Normal if previous == ViMode::Insert => {
                self.commands.sync_to_screen_cursor(self.screen);
            }
            ViMode::Normal | ViMode::Insert => {
                self.commands.selection = None;
                if mode == ViMode::Insert {
                    self.viewport.scroll_to_bottom();
                }
            }
            ViMode::Visual | ViMode::VisualLine | ViMode::VisualBlock => {
                let kind = match mode {
                    ViMode::VisualLine => SelectionKind::Lines,
                    ViMode::VisualBlock => SelectionKind::Block,
                    _ => SelectionKind::Cells,
                };
                let anchor = self.commands.cursor;
                self.commands.selection = Some(Selection {
                    kind,
                    anchor,
                    head: anchor,
                });
            }
        }
    }

    fn move_cursor(&mut self, motion: ViMotion, count: u32) {
        let count = count.max(1);
        let page = self.page();
        let mut pos = self.commands.cursor;
        for _ in 0..count {
            pos = match motion {
                ViMotion::Up => BufferPos::new(pos.line - 1, pos.column),
                ViMotion::Down => BufferPos::new(pos.line + 1, pos.column),
                ViMotion::Left => BufferPos::new(pos.line, pos.column.saturating_sub(1)),
                ViMotion::Right => BufferPos::new(pos.line, pos.column + 1),
                ViMotion::LineBegin => BufferPos::new(pos.line, 0),
                ViMotion::FirstNonBlank => {
                    let chars = self.line_chars(pos.line);
                    let column = chars
                        .iter()
                        .position(|c| !c.is_whitespace())
                        .unwrap_or(0) as u16;
                    BufferPos::new(pos.line, column)
                }
                ViMotion::LineEnd => {
                    let used = self
                        .screen
                        .grid()
                        .line_at(pos.line)
                        .map(|l| l.used_columns())
                        .unwrap_or(0);
                    BufferPos::new(pos.line, used.saturating_sub(1))
                }
                ViMotion::ScreenColumn => pos, // count is the column for `|`
                ViMotion::PageTop => {
                    BufferPos::new(-(self.viewport.scroll_offset() as i64), pos.column)
                }
                ViMotion::PageMiddle => BufferPos::new(
                    -(self.viewport.scroll_offset() as i64) + i64::from(page.lines / 2),
                    pos.column,
                ),
                ViMotion::PageBottom => BufferPos::new(
                    -(self.viewport.scroll_offset() as i64) + i64::from(page.lines) - 1,
                    pos.column,
                ),
                ViMotion::FileBegin => BufferPos::new(self.top_offset(), 0),
                ViMotion::FileEnd => BufferPos::new(i64::from(page.lines) - 1, 0),
                ViMotion::WordForward => self.word_forward(pos, false),
                ViMotion::WordBackward => self.word_backward(pos, false),
                ViMotion::WordEndForward => self.word_end_forward(pos, false),
                ViMotion::BigWordForward => self.word_forward(pos, true),
                ViMotion::BigWordBackward => self.word_backward(pos, true),
                ViMotion::BigWordEndForward => self.word_end_forward(pos, true),
                ViMotion::ParagraphForward => BufferPos::new(self.paragraph_forward(pos.line), 0),
                ViMotion::ParagraphBackward => {
                    BufferPos::new(self.paragraph_backward(pos.line), 0)
                }
                ViMotion::ParenthesisMatch => self.matching_pair(pos).unwrap_or(pos),
                ViMotion::SectionForward => {
                    BufferPos::new(self.section_line(pos.line, true, '{'), 0)
                }
                ViMotion::SectionBackward => {
                    BufferPos::new(self.section_line(pos.line, false, '{'), 0)
                }
                ViMotion::SectionEndForward => {
                    BufferPos::new(self.section_line(pos.line, true, '}'), 0)
                }
                ViMotion::SectionEndBackward => {
                    BufferPos::new(self.section_line(pos.line, false, '}'), 0)
                }
                ViMotion::LineMarkUp => match self.marked_line(pos.line, false) {
                    Some(line) => BufferPos::new(line, 0),
                    None => pos,
                },
                ViMotion::LineMarkDown => match self.marked_line(pos.line, true) {
                    Some(line) => BufferPos::new(line, 0),
                    None => pos,
                },
            };
        }
        if motion == ViMotion::ScreenColumn {
            pos = BufferPos::new(pos.line, (count - 1).min(u32::from(page.columns - 1)) as u16);
        }
        self.move_cursor_to(pos);
    }

    fn move_to_char(&mut self, search: CharSearch, ch: char, count: u32) {
        let mut pos = self.commands.cursor;
        let chars = self.line_chars(pos.line);
        for _ in 0..count.max(1) {
            let found = match search {
                CharSearch::ToCharRight | CharSearch::TillCharRight => (usize::from(pos.column)
                    + 1..chars.len())
                    .find(|&c| chars[c] == ch),
                CharSearch::ToCharLeft | CharSearch::TillCharLeft => {
                    (0..usize::from(pos.column)).rev().find(|&c| chars[c] == ch)
                }
            };
            let Some(column) = found else { return };
            pos = BufferPos::new(pos.line, column as u16);
        }
        let column = match search {
            CharSearch::ToCharRight | CharSearch::ToCharLeft => pos.column,
            CharSearch::TillCharRight => pos.column.saturating_sub(1),
            CharSearch::TillCharLeft => pos.column + 1,
        };
        self.move_cursor_to(BufferPos::new(pos.line, column));
    }

    fn scroll_viewport(&mut self, scroll: ViScroll, count: u32) {
        let page_lines = usize::from(self.page().lines);
        let count = count.max(1) as usize;
        let grid = self.screen.grid();
        match scroll {
            ViScroll::PageUp => {
                self.viewport.scroll_up(page_lines * count, grid);
            }
            ViScroll::PageDown => {
                self.viewport.scroll_down(page_lines * count);
            }
            ViScroll::HalfPageUp => {
                self.viewport.scroll_up(page_lines / 2 * count, grid);
            }
            ViScroll::HalfPageDown => {
                self.viewport.scroll_down(page_lines / 2 * count);
            }
            ViScroll::LineUpWithCursor => {
                self.viewport.scroll_up(count, grid);
                let pos = self.commands.cursor;
                self.commands.cursor = self.clamp(BufferPos::new(pos.line - count as i64, pos.column));
            }
            ViScroll::LineDownWithCursor => {
                self.viewport.scroll_down(count);
                let pos = self.commands.cursor;
                self.commands.cursor = self.clamp(BufferPos::new(pos.line + count as i64, pos.column));
            }
        }
    }

    fn yank_selection(&mut self) {
        let Some(selection) = self.commands.selection.take() else {
            return;
        };
        let (start, end) = selection.ordered();
        match selection.kind {
            SelectionKind::Cells => self.yank_range(start, end),
            SelectionKind::Lines => {
                let mut out = String::new();
                for line in start.line..=end.line {
                    if line > start.line {
                        out.push('\n');
                    }
                    out.push_str(&self.line_text(line));
                }
                self.commands.yank_register = out.clone();
                self.yanked = Some(out);
            }
            SelectionKind::Block => {
                let (left, right) = if start.column <= end.column {
                    (start.column, end.column)
                } else {
                    (end.column, start.column)
                };
                let mut out = String::new();
                for line in start.line..=end.line {
                    if line > start.line {
                        out.push('\n');
                    }
                    let chars = self.line_chars(line);
                    let slice: String = (left..=right)
                        .filter_map(|c| chars.get(usize::from(c)))
                        .collect();
                    out.push_str(slice.trim_end());
                }
                self.commands.yank_register = out.clone();
                self.yanked = Some(out);
            }
        }
    }

    fn yank_line(&mut self, count: u32) {
        let start = self.commands.cursor.line;
        let end = (start + i64::from(count.max(1)) - 1).min(i64::from(self.page().lines) - 1);
        let mut out = String::new();
        for line in start..=end {
            if line > start {
                out.push('\n');
            }
            out.push_str(&self.line_text(line));
        }
        self.commands.yank_register = out.clone();
        self.yanked = Some(out);
    }

    fn yank_motion(&mut self, motion: ViMotion, count: u32) {
        let origin = self.commands.cursor;
        self.move_cursor(motion, count);
        let target = self.commands.cursor;
        let (start, end) = if origin <= target {
            // Forward word motions yank up to, not including, the landing
            // position.
            let end = self.step_backward(target).unwrap_or(target);
            (origin, end)
        } else {
            (target, self.step_backward(origin).unwrap_or(origin))
        };
        self.yank_range(start, end.max(start));
        self.commands.cursor = origin;
    }

    fn yank_to_char(&mut self, search: CharSearch, ch: char, count: u32) {
        let origin = self.commands.cursor;
        self.move_to_char(search, ch, count);
        let target = self.commands.cursor;
        if target == origin {
            return;
        }
        let (start, end) = if origin <= target {
            (origin, target)
        } else {
            (target, origin)
        };
        self.yank_range(start, end);
        self.commands.cursor = origin;
    }

    fn yank_object(&mut self, scope: ObjectScope, object: TextObject) {
        let pos = self.commands.cursor;
        match object {
            TextObject::Word | TextObject::BigWord => {
                let big = object == TextObject::BigWord;
                let (start, mut end) = self.word_range_at(pos, big);
                if scope == ObjectScope::Around {
                    // Swallow trailing blanks.
                    while end.column + 1 < self.page().columns
                        && usize::from(end.column + 1) < self.line_text(end.line).chars().count()
                        && self.char_at(BufferPos::new(end.line, end.column + 1)) == ' '
                    {
                        end.column += 1;
                    }
                }
                self.yank_range(start, end);
            }
            TextObject::Paragraph => {
                let start = self.paragraph_backward(pos.line);
                let end = self.paragraph_forward(pos.line);
                let mut out = String::new();
                for line in start..=end {
                    if line > start {
                        out.push('\n');
                    }
                    out.push_str(&self.line_text(line));
                }
                self.commands.yank_register = out.clone();
                self.yanked = Some(out);
            }
            TextObject::LineMark => {
                let start = self
                    .marked_line(pos.line + 1, false)
                    .unwrap_or(self.top_offset());
                let end = self
                    .marked_line(pos.line - 1, true)
                    .unwrap_or(i64::from(self.page().lines) - 1);
                let mut out = String::new();
                for line in start..=end {
                    if line > start {
                        out.push('\n');
                    }
                    out.push_str(&self.line_text(line));
                }
                self.commands.yank_register = out.clone();
                self.yanked = Some(out);
            }
            _ => {
                let (open, close) = match object {
                    TextObject::RoundBrackets => ('(', ')'),
                    TextObject::SquareBrackets => ('[', ']'),
                    TextObject::CurlyBrackets => ('{', '}'),
                    TextObject::AngleBrackets => ('<', '>'),
                    TextObject::DoubleQuotes => ('"', '"'),
                    TextObject::SingleQuotes => ('\'', '\''),
                    TextObject::BackQuotes => ('`', '`'),
                    _ => return,
                };
                let chars = self.line_chars(pos.line);
                let column = usize::from(pos.column);
                let open_at = (0..=column.min(chars.len().saturating_sub(1)))
                    .rev()
                    .find(|&c| chars[c] == open);
                let close_at =
                    (column..chars.len()).find(|&c| chars[c] == close && Some(c) != open_at);
                let (Some(open_at), Some(close_at)) = (open_at, close_at) else {
                    return;
                };
                let (start, end) = match scope {
                    ObjectScope::Inner => {
                        if open_at + 1 > close_at.saturating_sub(1) {
                            return;
                        }
                        (open_at + 1, close_at - 1)
                    }
                    ObjectScope::Around => (open_at, close_at),
                };
                self.yank_range(
                    BufferPos::new(pos.line, start as u16),
                    BufferPos::new(pos.line, end as u16),
                );
            }
        }
    }

    fn paste(&mut self, count: u32, before: bool) {
        // Paste re-enters the terminal as input; the terminal layer turns
        // the register into a paste event.
        self.paste_requested = Some((count.max(1), before));
    }

    fn toggle_line_mark(&mut self) {
        // Marking mutates line flags; handled by the terminal layer, which
        // owns a mutable screen.
        self.mark_toggle_requested = true;
    }

    fn search_start(&mut self) {
        self.commands.search_pattern.clear();
    }

    fn search_cancel(&mut self) {
        self.commands.search_pattern.clear();
    }

    fn search_done(&mut self) {
        let pattern = self.commands.search_pattern.clone();
        if !pattern.is_empty() {
            self.jump_to_next_match(1);
        }
    }

    fn update_search_term(&mut self, term: &str) {
        self.commands.search_pattern = term.to_string();
    }

    fn jump_to_next_match(&mut self, count: u32) {
        for _ in 0..count.max(1) {
            let Some(hit) = self.find_match(self.commands.cursor, true) else {
                return;
            };
            self.move_cursor_to(hit);
        }
    }

    fn jump_to_previous_match(&mut self, count: u32) {
        for _ in 0..count.max(1) {
            let Some(hit) = self.find_match(self.commands.cursor, false) else {
                return;
            };
            self.move_cursor_to(hit);
        }
    }

    fn search_current_word(&mut self, forward: bool) {
        let (start, end) = self.word_range_at(self.commands.cursor, false);
        let word = self.text_between(start, end);
        if word.trim().is_empty() {
            return;
        }
        self.commands.search_pattern = word.trim().to_string();
        if forward {
            self.jump_to_next_match(1);
        } else {
            self.jump_to_previous_match(1);
        }
    }
}
