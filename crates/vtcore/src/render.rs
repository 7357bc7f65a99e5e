//! Render snapshots: what the renderer thread actually reads.
//!
//! The terminal fills a back buffer by walking the active grid, then swaps it
//! with the front buffer under the reader lock. The renderer only ever locks
//! the front buffer; the writer is the sole swapper. Trivially-representable
//! lines travel as one [`RenderLine`] (text slice + uniform attributes);
//! everything else becomes per-cell [`RenderCell`]s with group markers so the
//! renderer can batch equal-attribute runs.

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::cell::{Cell, CellFlags, Color};
use crate::color::{ColorPalette, RgbColor};
use crate::geometry::{CellLocation, PageSize};
use crate::image::ImageFragment;
use crate::screen::Screen;
use crate::settings::{CursorShape, StatusDisplayPosition, StatusDisplayType};

/// Palette-resolved colors plus the style flags the renderer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderAttrs {
    pub fg: RgbColor,
    pub bg: RgbColor,
    pub underline: RgbColor,
    pub flags: CellFlags,
}

/// One cell of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCell {
    pub position: CellLocation,
    /// Primary scalar plus combining marks.
    pub codepoints: String,
    pub attrs: RenderAttrs,
    pub width: u8,
    /// First cell of an equal-attribute run.
    pub group_start: bool,
    /// Last cell of an equal-attribute run.
    pub group_end: bool,
    pub fragment: Option<ImageFragment>,
}

/// A whole line that renders from one text slice with uniform attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderLine {
    pub line: u16,
    pub text: String,
    pub used_columns: u16,
    /// Attributes for the text and the trailing fill.
    pub attrs: RenderAttrs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCursor {
    pub position: CellLocation,
    pub shape: CursorShape,
    /// Width of the cell under the cursor (2 over a wide head).
    pub width: u8,
}

/// One complete frame.
#[derive(Debug, Clone, Default)]
pub struct RenderSnapshot {
    pub size: PageSize,
    pub cells: Vec<RenderCell>,
    pub lines: Vec<RenderLine>,
    pub cursor: Option<RenderCursor>,
    pub frame_id: u64,
}

impl RenderSnapshot {
    fn clear(&mut self) {
        self.cells.clear();
        self.lines.clear();
        self.cursor = None;
    }
}

/// Writer-side state over the buffer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderBufferState {
    /// Idle; nothing new to show.
    #[default]
    WaitingForRefresh,
    /// Content changed; the back buffer must be rebuilt, then swapped.
    RefreshBuffersAndTrySwap,
    /// Back buffer is ready; waiting for the reader lock to swap.
    TrySwapBuffers,
}

/// The double buffer. The terminal owns it; the renderer holds a clone of
/// [`front`](RenderDoubleBuffer::front_handle) and locks it to read.
#[derive(Debug)]
pub struct RenderDoubleBuffer {
    front: Arc<Mutex<RenderSnapshot>>,
    back: RenderSnapshot,
    state: RenderBufferState,
    next_frame_id: u64,
}

impl Default for RenderDoubleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDoubleBuffer {
    pub fn new() -> Self {
        Self {
            front: Arc::new(Mutex::new(RenderSnapshot::default())),
            back: RenderSnapshot::default(),
            state: RenderBufferState::WaitingForRefresh,
            next_frame_id: 1,
        }
    }

    pub fn state(&self) -> RenderBufferState {
        self.state
    }

    /// Handle for the renderer thread.
    pub fn front_handle(&self) -> RenderFrontBuffer {
        RenderFrontBuffer {
            front: Arc::clone(&self.front),
        }
    }

    /// Mark the content dirty; the next [`refresh`](Self::refresh) rebuilds.
    pub fn schedule_refresh(&mut self) {
        self.state = RenderBufferState::RefreshBuffersAndTrySwap;
    }

    /// Rebuild the back buffer (when dirty) and try a non-blocking swap.
    ///
    /// Returns `true` when a new frame became visible to the reader.
    pub fn refresh(&mut self, screen: &Screen, cursor_visible_phase: bool) -> bool {
        match self.state {
            RenderBufferState::WaitingForRefresh => false,
            RenderBufferState::RefreshBuffersAndTrySwap => {
                self.back.clear();
                build_snapshot(screen, cursor_visible_phase, &mut self.back);
                self.back.frame_id = self.next_frame_id;
                self.state = RenderBufferState::TrySwapBuffers;
                self.try_swap()
            }
            RenderBufferState::TrySwapBuffers => self.try_swap(),
        }
    }

    fn try_swap(&mut self) -> bool {
        match self.front.try_lock() {
            Ok(mut front) => {
                std::mem::swap(&mut *front, &mut self.back);
                self.next_frame_id += 1;
                self.state = RenderBufferState::WaitingForRefresh;
                true
            }
            Err(TryLockError::WouldBlock) => false,
            Err(TryLockError::Poisoned(poisoned)) => {
                // A panicked reader cannot corrupt the snapshot (it only
                // reads); recover the lock and swap anyway.
                let mut front = poisoned.into_inner();
                std::mem::swap(&mut *front, &mut self.back);
                self.next_frame_id += 1;
                self.state = RenderBufferState::WaitingForRefresh;
                true
            }
        }
    }
}

/// Reader handle to the front buffer.
#[derive(Debug, Clone)]
pub struct RenderFrontBuffer {
    front: Arc<Mutex<RenderSnapshot>>,
}

impl RenderFrontBuffer {
    /// Lock and read the current frame. The writer cannot swap while the
    /// guard is held.
    pub fn read(&self) -> MutexGuard<'_, RenderSnapshot> {
        self.front
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Resolve a semantic color against the palette.
fn resolve(color: Color, palette: &ColorPalette, default: RgbColor) -> RgbColor {
    match color {
        Color::Default => default,
        Color::Indexed(i) => palette.indexed(i),
        Color::Bright(i) => palette.indexed(i.min(7) + 8),
        Color::Rgb(r, g, b) => RgbColor::new(r, g, b),
    }
}

fn resolve_attrs(cell: &Cell, palette: &ColorPalette) -> RenderAttrs {
    let mut fg = resolve(cell.fg, palette, palette.default_foreground);
    let mut bg = resolve(cell.bg, palette, palette.default_background);
    if cell.flags.contains(CellFlags::INVERSE) {
        std::mem::swap(&mut fg, &mut bg);
    }
    let underline = resolve(cell.underline, palette, fg);
    RenderAttrs {
        fg,
        bg,
        underline,
        flags: cell.flags & !(CellFlags::WIDE_CHAR | CellFlags::WIDE_CONTINUATION),
    }
}

/// Walk the screen into `out`.
fn build_snapshot(screen: &Screen, cursor_visible_phase: bool, out: &mut RenderSnapshot) {
    let palette = screen.palette();
    let page = screen.page_size();
    let status_height = match screen.status_type() {
        StatusDisplayType::None => 0,
        _ => 1,
    };
    let status_on_top = status_height > 0
        && screen.settings().status_display_position == StatusDisplayPosition::Top;
    let main_offset = if status_on_top { 1 } else { 0 };
    out.size = PageSize::new(page.lines + status_height, page.columns);

    for line_index in 0..page.lines {
        let Some(line) = screen.grid().page_line(line_index) else {
            continue;
        };
        let render_line = line_index + main_offset;
        emit_line(line, render_line, palette, out);
    }

    if status_height > 0 {
        let status_line = if status_on_top { 0 } else { page.lines };
        if let Some(line) = screen.status_grid().page_line(0) {
            emit_line(line, status_line, palette, out);
        }
    }

    // The cursor renders only on the main display, when enabled and in its
    // visible blink phase.
    let blink_gate = !screen.cursor_blinking() || cursor_visible_phase;
    if screen.modes().cursor_visible() && blink_gate {
        let pos = screen.cursor().position;
        let width = screen
            .grid()
            .cell(pos)
            .map(|c| c.width().max(1))
            .unwrap_or(1);
        out.cursor = Some(RenderCursor {
            position: CellLocation::new(pos.line + main_offset, pos.column),
            shape: screen.cursor_shape(),
            width,
        });
    }
}

fn emit_line(
    line: &crate::line::Line,
    render_line: u16,
    palette: &ColorPalette,
    out: &mut RenderSnapshot,
) {
    if let Some((text, attrs, _hyperlink)) = line.trivial_view() {
        let fill = Cell::with_attrs(' ', 1, attrs);
        out.lines.push(RenderLine {
            line: render_line,
            text: String::from_utf8_lossy(text).into_owned(),
            used_columns: text.len() as u16,
            attrs: resolve_attrs(&fill, palette),
        });
        return;
    }
    let Some(cells) = line.cells() else { return };

    let start_index = out.cells.len();
    let mut previous_attrs: Option<RenderAttrs> = None;
    for (column, cell) in cells.iter().enumerate() {
        if cell.is_wide_continuation() {
            continue;
        }
        let attrs = resolve_attrs(cell, palette);
        let group_start = previous_attrs != Some(attrs);
        if group_start {
            if let Some(last) = out.cells.last_mut() {
                if last.position.line == render_line {
                    last.group_end = true;
                }
            }
        }
        out.cells.push(RenderCell {
            position: CellLocation::new(render_line, column as u16),
            codepoints: cell.codepoints().collect(),
            attrs,
            width: cell.width().max(1),
            group_start,
            group_end: false,
            fragment: cell.fragment().copied(),
        });
        previous_attrs = Some(attrs);
    }
    if out.cells.len() > start_index {
        if let Some(last) = out.cells.last_mut() {
            last.group_end = true;
        }
    }
}
