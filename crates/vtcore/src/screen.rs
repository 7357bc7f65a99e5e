//! The screen: every VT operation, applied to grid + cursor + modes.
//!
//! A [`Screen`] owns the primary and alternate page buffers, the optional
//! status-line buffer, the mode set, tab stops, margins, the color palette,
//! hyperlink registry, and image pool. The sequencer feeds it four kinds of
//! work: C0 executes, printable text, completed sequences (looked up in the
//! function table), and DCS payload streams. Replies accumulate in an
//! outbound buffer; host-visible side effects (bell, title, clipboard,
//! notifications) accumulate as [`ScreenEvent`]s for the terminal to forward.

use unicode_segmentation::UnicodeSegmentation;

use tracing::{debug, info, warn};

use crate::buffer::BufferFragment;
use crate::cell::{Cell, CellFlags, HyperlinkRegistry, SgrAttrs};
use crate::color::{ColorPalette, ColorStack, DynamicColor, RgbColor};
use crate::cursor::{Charset, Cursor, SaveStack, SavedCursor, TabStops};
use crate::functions::Function;
use crate::geometry::{CellLocation, Margin, PageSize, PixelSize};
use crate::grid::{Grid, HistoryLimit};
use crate::image::{Image, ImageFragment, ImageHandle, ImagePool, ImageSize};
use crate::modes::{AnsiMode, DecMode, Modes};
use crate::sequence::Sequence;
use crate::settings::{CursorShape, Settings, StatusDisplayType, VtType};
use crate::sixel::SixelDecoder;

/// Which page buffer is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenType {
    Primary,
    Alternate,
}

/// Which display DECSASD routed output to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveDisplay {
    Main,
    StatusLine,
}

/// Outcome of applying one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceResult {
    Ok,
    /// Recognized function, unusable parameters; defaults were applied or
    /// the operation was dropped.
    Invalid,
    /// Function not in the table.
    Unsupported,
}

/// Host-visible side effects, drained by the terminal after each batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenEvent {
    Bell,
    SetWindowTitle(String),
    CopyToClipboard(Vec<u8>),
    Notify { title: String, body: String },
    BufferChanged(ScreenType),
    DiscardImage(ImageHandle),
    CursorStyleChanged,
    ColorPaletteUpdated,
    /// DECCOLM or XTWINOPS asked for a different geometry.
    ResizeRequest(PageSize),
    /// RIS ran; orchestrator-side state (input modes, execution mode,
    /// viewport) must reset too.
    HardReset,
    /// OSC 314 asked for screen content; permission-gated, so the terminal
    /// decides before [`Screen::capture_buffer`] produces the reply.
    RequestCaptureBuffer { lines: u16, logical: bool },
}

/// One page buffer with its cursor state.
#[derive(Debug)]
struct DisplayBuffer {
    grid: Grid,
    cursor: Cursor,
    saved: SaveStack,
    /// The single SCOSC/SCORC slot (separate from the DECSC stack).
    sco_saved: Option<SavedCursor>,
}

impl DisplayBuffer {
    fn new(size: PageSize, history: HistoryLimit, reflow: bool) -> Self {
        Self {
            grid: Grid::new(size, history, reflow),
            cursor: Cursor::default(),
            saved: SaveStack::default(),
            sco_saved: None,
        }
    }
}

/// Active DCS sub-parser.
#[derive(Debug)]
enum DcsHook {
    Sixel,
    Rqss(Vec<u8>),
    Tcap(Vec<u8>),
    /// Recognized introducer, unsupported content: swallow the payload.
    Ignore,
}

/// The VT screen model.
pub struct Screen {
    settings: Settings,
    modes: Modes,
    margin: Margin,
    tabs: TabStops,
    palette: ColorPalette,
    color_stack: ColorStack,
    hyperlinks: HyperlinkRegistry,
    images: ImagePool,
    sixel: SixelDecoder,
    dcs_hook: Option<DcsHook>,

    primary: DisplayBuffer,
    alternate: DisplayBuffer,
    status: DisplayBuffer,
    active_screen: ScreenType,
    active_display: ActiveDisplay,
    status_type: StatusDisplayType,

    replies: Vec<u8>,
    events: Vec<ScreenEvent>,

    /// Last graphic character written (REP and combining-mark joins).
    last_graphic: Option<char>,
    /// Cell most recently written to, for combining-mark attachment.
    last_written: Option<CellLocation>,

    window_title: String,
    title_stack: Vec<String>,
    application_keypad: bool,
    cursor_shape: CursorShape,
    cursor_blinking: bool,
    pixel_size: PixelSize,
    cell_pixel_size: PixelSize,
}

impl Screen {
    pub fn new(settings: Settings) -> Self {
        let settings = settings.normalized();
        let size = settings.page_size;
        let status_size = PageSize::new(1, size.columns);
        let sixel = SixelDecoder::new(settings.max_image_size, settings.max_image_register_count);
        Self {
            primary: DisplayBuffer::new(
                size,
                settings.max_history_line_count,
                settings.primary_screen_allow_reflow_on_resize,
            ),
            alternate: DisplayBuffer::new(size, HistoryLimit::None, false),
            status: DisplayBuffer::new(status_size, HistoryLimit::None, false),
            active_screen: ScreenType::Primary,
            active_display: ActiveDisplay::Main,
            status_type: settings.status_display_type,
            modes: Modes::new(),
            margin: Margin::full(size),
            tabs: TabStops::new(size.columns),
            palette: ColorPalette::new(),
            color_stack: ColorStack::default(),
            hyperlinks: HyperlinkRegistry::new(),
            images: ImagePool::new(),
            sixel,
            dcs_hook: None,
            replies: Vec::new(),
            events: Vec::new(),
            last_graphic: None,
            last_written: None,
            window_title: String::new(),
            title_stack: Vec::new(),
            application_keypad: false,
            cursor_shape: settings.cursor_shape,
            cursor_blinking: settings.cursor_display == crate::settings::CursorDisplay::Blink,
            pixel_size: PixelSize::default(),
            cell_pixel_size: PixelSize {
                width: 8,
                height: 16,
            },
            settings,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    pub fn margin(&self) -> Margin {
        self.margin
    }

    pub fn page_size(&self) -> PageSize {
        self.settings.page_size
    }

    pub fn active_screen(&self) -> ScreenType {
        self.active_screen
    }

    pub fn active_display(&self) -> ActiveDisplay {
        self.active_display
    }

    pub fn status_type(&self) -> StatusDisplayType {
        self.status_type
    }

    pub fn cursor(&self) -> &Cursor {
        &self.buffer().cursor
    }

    pub fn grid(&self) -> &Grid {
        &self.buffer().grid
    }

    /// Mutable grid access for the orchestrator (line-flag toggles only;
    /// content mutation stays inside the screen).
    pub(crate) fn grid_mut(&mut self) -> &mut Grid {
        &mut self.main_buffer_mut().grid
    }

    pub fn status_grid(&self) -> &Grid {
        &self.status.grid
    }

    pub fn palette(&self) -> &ColorPalette {
        &self.palette
    }

    pub fn hyperlinks(&self) -> &HyperlinkRegistry {
        &self.hyperlinks
    }

    pub fn images(&self) -> &ImagePool {
        &self.images
    }

    pub fn cursor_shape(&self) -> CursorShape {
        self.cursor_shape
    }

    pub fn cursor_blinking(&self) -> bool {
        self.cursor_blinking
    }

    pub fn window_title(&self) -> &str {
        &self.window_title
    }

    /// DECKPAM/DECKPNM state, consumed by the input generator.
    pub fn application_keypad(&self) -> bool {
        self.application_keypad
    }

    /// Update the pixel geometry (from the host on resize).
    pub fn set_pixel_geometry(&mut self, window: PixelSize, cell: PixelSize) {
        self.pixel_size = window;
        if cell.width > 0 && cell.height > 0 {
            self.cell_pixel_size = cell;
        }
    }

    /// Text of a page line on the active main screen (tests, capture).
    pub fn line_text(&self, line: u16) -> String {
        self.main_buffer().grid.line_text(line)
    }

    fn buffer(&self) -> &DisplayBuffer {
        match self.active_display {
            ActiveDisplay::Main => self.main_buffer(),
            ActiveDisplay::StatusLine => &self.status,
        }
    }

    fn buffer_mut(&mut self) -> &mut DisplayBuffer {
        match self.active_display {
            ActiveDisplay::Main => match self.active_screen {
                ScreenType::Primary => &mut self.primary,
                ScreenType::Alternate => &mut self.alternate,
            },
            ActiveDisplay::StatusLine => &mut self.status,
        }
    }

    fn main_buffer(&self) -> &DisplayBuffer {
        match self.active_screen {
            ScreenType::Primary => &self.primary,
            ScreenType::Alternate => &self.alternate,
        }
    }

    fn main_buffer_mut(&mut self) -> &mut DisplayBuffer {
        match self.active_screen {
            ScreenType::Primary => &mut self.primary,
            ScreenType::Alternate => &mut self.alternate,
        }
    }

    /// The margin the active display scrolls within.
    fn active_margin(&self) -> Margin {
        match self.active_display {
            ActiveDisplay::Main => self.margin,
            ActiveDisplay::StatusLine => Margin::full(self.status.grid.size()),
        }
    }

    fn active_size(&self) -> PageSize {
        match self.active_display {
            ActiveDisplay::Main => self.settings.page_size,
            ActiveDisplay::StatusLine => self.status.grid.size(),
        }
    }

    // ── Reply / event plumbing ──────────────────────────────────────

    /// Queue reply bytes for the PTY.
    pub fn reply(&mut self, bytes: &[u8]) {
        self.replies.extend_from_slice(bytes);
    }

    fn reply_str(&mut self, text: &str) {
        self.reply(text.as_bytes());
    }

    /// Drain queued replies.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    pub fn has_replies(&self) -> bool {
        !self.replies.is_empty()
    }

    /// Drain queued host events.
    pub fn take_events(&mut self) -> Vec<ScreenEvent> {
        std::mem::take(&mut self.events)
    }

    // ── C0 controls ─────────────────────────────────────────────────

    pub fn execute_control(&mut self, byte: u8) {
        match byte {
            0x05 => {} // ENQ: the answerback string is empty
            0x07 => self.events.push(ScreenEvent::Bell),
            0x08 => self.backspace(),
            0x09 => self.horizontal_tab(),
            0x0A => self.linefeed(),
            // VT and FF act as plain index.
            0x0B | 0x0C => self.index(),
            0x0D => self.carriage_return(),
            0x0E => self.buffer_mut().cursor.charsets.shift = 1, // SO = LS1
            0x0F => self.buffer_mut().cursor.charsets.shift = 0, // SI = LS0
            0x1A => self.print(char::REPLACEMENT_CHARACTER),    // SUB
            _ => {}
        }
    }

    fn backspace(&mut self) {
        let margin = self.active_margin();
        let cursor = &mut self.buffer_mut().cursor;
        if cursor.wrap_pending {
            cursor.wrap_pending = false;
            return;
        }
        let floor = if cursor.position.column > margin.left {
            margin.left
        } else {
            0
        };
        cursor.position.column = cursor.position.column.saturating_sub(1).max(floor);
    }

    fn horizontal_tab(&mut self) {
        let size = self.active_size();
        let column = self.buffer().cursor.position.column;
        let next = self.tabs.next(column, size.columns);
        let cursor = &mut self.buffer_mut().cursor;
        cursor.position.column = next;
        cursor.wrap_pending = false;
    }

    fn carriage_return(&mut self) {
        let margin = self.active_margin();
        let cursor = &mut self.buffer_mut().cursor;
        cursor.position.column = if cursor.position.column >= margin.left {
            margin.left
        } else {
            0
        };
        cursor.wrap_pending = false;
        self.last_written = None;
    }

    fn linefeed(&mut self) {
        if self.modes.ansi(AnsiMode::AutomaticNewline) {
            self.carriage_return();
        }
        self.index();
    }

    /// IND: move down one line, scrolling when on the bottom margin.
    fn index(&mut self) {
        let margin = self.active_margin();
        let size = self.active_size();
        let line = self.buffer().cursor.position.line;
        if line == margin.bottom {
            let attrs = fill_attrs(self.buffer().cursor.attrs);
            self.scroll_up_active(1, attrs);
        } else if line + 1 < size.lines {
            self.buffer_mut().cursor.position.line += 1;
        }
        self.buffer_mut().cursor.wrap_pending = false;
        self.last_written = None;
    }

    /// RI: move up one line, scrolling down when on the top margin.
    fn reverse_index(&mut self) {
        let margin = self.active_margin();
        let line = self.buffer().cursor.position.line;
        if line == margin.top {
            let attrs = fill_attrs(self.buffer().cursor.attrs);
            self.buffer_mut().grid.scroll_down(1, attrs, margin);
        } else if line > 0 {
            self.buffer_mut().cursor.position.line -= 1;
        }
        self.buffer_mut().cursor.wrap_pending = false;
    }

    fn scroll_up_active(&mut self, n: u16, attrs: SgrAttrs) {
        let margin = self.active_margin();
        self.buffer_mut().grid.scroll_up(n, attrs, margin);
    }

    // ── Printing ────────────────────────────────────────────────────

    /// Hot path: a run of printable ASCII, zero-copy when the line permits.
    pub fn print_run(&mut self, fragment: BufferFragment) {
        if fragment.is_empty() {
            return;
        }
        // The trivial path requires plain USASCII interpretation and
        // replace-mode writes into the main display.
        let eligible = self.active_display == ActiveDisplay::Main
            && self.buffer().cursor.charsets.is_usascii()
            && !self.modes.insert_mode()
            && self.margin.is_full_width(self.settings.page_size);
        if !eligible {
            for &b in fragment.bytes() {
                self.print(b as char);
            }
            return;
        }

        let mut remaining = fragment;
        loop {
            if self.buffer().cursor.wrap_pending {
                if self.modes.auto_wrap() {
                    self.wrap();
                } else {
                    self.buffer_mut().cursor.wrap_pending = false;
                }
            }
            let margin = self.active_margin();
            let cursor_pos = self.buffer().cursor.position;
            let room = usize::from(margin.right + 1 - cursor_pos.column);
            let take = remaining.len().min(room);
            let (head, tail) = split_fragment(remaining, take);

            let attrs = self.buffer().cursor.attrs;
            let hyperlink = self.buffer().cursor.hyperlink;
            let appended = {
                let line = match self.buffer_mut().grid.page_line_mut(cursor_pos.line) {
                    Some(line) => line,
                    None => return,
                };
                line.used_columns() == cursor_pos.column
                    && line.try_append_trivial(head.clone(), attrs, hyperlink, margin.right + 1)
            };
            if appended {
                let len = head.len() as u16;
                self.advance_after_write(cursor_pos, len, margin);
                if let Some(&last) = head.bytes().last() {
                    self.last_graphic = Some(last as char);
                    self.last_written =
                        Some(CellLocation::new(cursor_pos.line, cursor_pos.column + len - 1));
                }
            } else {
                for &b in head.bytes() {
                    self.print(b as char);
                }
            }
            match tail {
                Some(rest) => remaining = rest,
                None => break,
            }
        }
    }

    /// Print one scalar through charset translation, wrapping and width
    /// handling.
    pub fn print(&mut self, ch: char) {
        let ch = self.buffer_mut().cursor.charsets.translate_next(ch);
        let width = Cell::display_width(ch);

        if width == 0 {
            self.attach_combining_mark(ch);
            return;
        }
        self.last_graphic = Some(ch);

        if self.buffer().cursor.wrap_pending {
            if self.modes.auto_wrap() {
                self.wrap();
            } else {
                self.buffer_mut().cursor.wrap_pending = false;
            }
        }

        let margin = self.active_margin();
        let mut pos = self.buffer().cursor.position;

        // A wide character that no longer fits wraps early (or stalls).
        if width == 2 && pos.column + 1 > margin.right {
            if self.modes.auto_wrap() {
                self.wrap();
                pos = self.buffer().cursor.position;
            } else {
                return;
            }
        }

        if self.modes.insert_mode() {
            self.insert_blank_cells(pos, u16::from(width));
        }

        let attrs = self.buffer().cursor.attrs;
        let hyperlink = self.buffer().cursor.hyperlink;
        self.write_cell_at(pos, ch, width, attrs, hyperlink);
        self.last_written = Some(pos);
        self.advance_after_write(pos, u16::from(width), margin);
    }

    fn advance_after_write(&mut self, pos: CellLocation, width: u16, margin: Margin) {
        let next = pos.column + width;
        let cursor = &mut self.buffer_mut().cursor;
        if next > margin.right {
            cursor.position.column = margin.right;
            cursor.wrap_pending = true;
        } else {
            cursor.position.column = next;
            cursor.wrap_pending = false;
        }
    }

    /// Auto-wrap: CR + IND, flagging the continuation line.
    fn wrap(&mut self) {
        let left = self.active_margin().left;
        {
            let cursor = &mut self.buffer_mut().cursor;
            cursor.position.column = left;
            cursor.wrap_pending = false;
        }
        self.index();
        let line = self.buffer().cursor.position.line;
        if let Some(line) = self.buffer_mut().grid.page_line_mut(line) {
            line.set_wrapped(true);
        }
    }

    /// Zero-width scalar: join it to the preceding cell when the grapheme
    /// segmenter agrees they form one cluster.
    fn attach_combining_mark(&mut self, mark: char) {
        let Some(pos) = self.last_written else {
            return;
        };
        let Some(prev) = self.last_graphic else {
            return;
        };
        let mut probe = String::with_capacity(8);
        probe.push(prev);
        probe.push(mark);
        if probe.graphemes(true).count() != 1 {
            return;
        }
        if let Some(cell) = self.buffer_mut().grid.cell_mut(pos) {
            cell.push_combining(mark);
        }
    }

    fn write_cell_at(
        &mut self,
        pos: CellLocation,
        ch: char,
        width: u8,
        attrs: SgrAttrs,
        hyperlink: u16,
    ) {
        self.release_fragment_at(pos);
        let columns = self.active_size().columns;
        let Some(line) = self.page_line_mut_active(pos.line) else {
            return;
        };
        let cells = line.inflate();
        let col = usize::from(pos.column);
        if col >= cells.len() {
            return;
        }
        // Clear the head of a wide pair we are overwriting the tail of.
        if cells[col].is_wide_continuation() && col > 0 && cells[col - 1].is_wide() {
            cells[col - 1].erase(attrs.bg);
        }
        // Clear the orphaned continuation if we overwrite a wide head.
        if cells[col].is_wide() && col + 1 < cells.len() {
            cells[col + 1].erase(attrs.bg);
        }
        if width == 2 && pos.column + 1 < columns {
            let (lead, cont) = Cell::wide(ch, attrs);
            cells[col] = lead;
            cells[col].hyperlink = hyperlink;
            cells[col + 1] = cont;
        } else {
            cells[col].write(ch, width.max(1), attrs, hyperlink);
        }
    }

    fn insert_blank_cells(&mut self, pos: CellLocation, count: u16) {
        let margin = self.active_margin();
        if !margin.contains_line(pos.line) && self.active_display == ActiveDisplay::Main {
            return;
        }
        let bg = self.buffer().cursor.attrs.bg;
        let right = margin.right;
        let Some(line) = self.page_line_mut_active(pos.line) else {
            return;
        };
        let cells = line.inflate();
        let left = usize::from(pos.column);
        let end = usize::from(right) + 1;
        if left >= end || left >= cells.len() {
            return;
        }
        let n = usize::from(count).min(end - left);
        cells[left..end].rotate_right(n);
        for cell in &mut cells[left..left + n] {
            cell.erase(bg);
        }
    }

    fn page_line_mut_active(&mut self, line: u16) -> Option<&mut crate::line::Line> {
        self.buffer_mut().grid.page_line_mut(line)
    }

    fn release_fragment_at(&mut self, pos: CellLocation) {
        let discarded = {
            let Some(cell) = self.buffer_mut().grid.cell_mut(pos) else {
                return;
            };
            match cell.take_fragment() {
                Some(fragment) => fragment.handle,
                None => return,
            }
        };
        if self.images.release(discarded) {
            self.events.push(ScreenEvent::DiscardImage(discarded));
        }
    }

    // ── Sequence application ────────────────────────────────────────

    /// Apply a completed non-OSC sequence.
    pub fn apply(&mut self, seq: &Sequence) -> SequenceResult {
        let Some(function) = Function::select(seq) else {
            info!(final_byte = seq.final_byte as char as u32, "unsupported sequence");
            return SequenceResult::Unsupported;
        };
        debug!(?function, "dispatch");
        self.apply_function(function, seq)
    }

    fn apply_function(&mut self, function: Function, seq: &Sequence) -> SequenceResult {
        use Function::*;
        match function {
            // ── ESC level ───────────────────────────────────────────
            DECSC => self.save_cursor(),
            DECRC => self.restore_cursor(),
            IND => self.index(),
            NEL => {
                self.carriage_return();
                self.index();
            }
            RI => self.reverse_index(),
            HTS => {
                let column = self.buffer().cursor.position.column;
                self.tabs.set(column);
            }
            SS2 => self.buffer_mut().cursor.charsets.single_shift = Some(2),
            SS3 => self.buffer_mut().cursor.charsets.single_shift = Some(3),
            RIS => self.hard_reset(),
            DECKPAM => self.application_keypad = true,
            DECKPNM => self.application_keypad = false,
            DECBI => self.back_index(),
            DECFI => self.forward_index(),
            DECALN => self.screen_alignment(),
            SCS { slot } => {
                let charset = Charset::from_designator(seq.final_byte);
                self.buffer_mut().cursor.charsets.slots[usize::from(slot) & 3] = charset;
            }

            // ── Cursor motion ───────────────────────────────────────
            CUU => self.move_up(seq.param_or(0, 1).max(1) as u16),
            CUD => self.move_down(seq.param_or(0, 1).max(1) as u16),
            CUF => self.move_right(seq.param_or(0, 1).max(1) as u16),
            CUB => self.move_left(seq.param_or(0, 1).max(1) as u16),
            CNL => {
                self.move_down(seq.param_or(0, 1).max(1) as u16);
                self.carriage_return();
            }
            CPL => {
                self.move_up(seq.param_or(0, 1).max(1) as u16);
                self.carriage_return();
            }
            CHA => self.move_to_column(seq.param_or(0, 1).max(1) as u16 - 1),
            HPA => self.move_to_column(seq.param_or(0, 1).max(1) as u16 - 1),
            HPR => self.move_right(seq.param_or(0, 1).max(1) as u16),
            VPA => self.move_to_line(seq.param_or(0, 1).max(1) as u16 - 1),
            VPR => self.move_down(seq.param_or(0, 1).max(1) as u16),
            CUP | HVP => {
                let line = seq.param_or(0, 1).max(1) as u16 - 1;
                let column = seq.param_or(1, 1).max(1) as u16 - 1;
                self.move_to(line, column);
            }
            CHT => {
                for _ in 0..seq.param_or(0, 1).max(1) {
                    self.horizontal_tab();
                }
            }
            CBT => {
                let n = seq.param_or(0, 1).max(1);
                for _ in 0..n {
                    let column = self.buffer().cursor.position.column;
                    let prev = self.tabs.previous(column);
                    self.buffer_mut().cursor.position.column = prev;
                }
                self.buffer_mut().cursor.wrap_pending = false;
            }

            // ── Erase ───────────────────────────────────────────────
            ED => return self.erase_in_display(seq.param_or(0, 0), false),
            DECSED => return self.erase_in_display(seq.param_or(0, 0), true),
            EL => return self.erase_in_line(seq.param_or(0, 0), false),
            DECSEL => return self.erase_in_line(seq.param_or(0, 0), true),
            ECH => self.erase_chars(seq.param_or(0, 1).max(1) as u16),

            // ── Edit ────────────────────────────────────────────────
            ICH => {
                let pos = self.buffer().cursor.position;
                self.insert_blank_cells(pos, seq.param_or(0, 1).max(1) as u16);
            }
            DCH => self.delete_chars(seq.param_or(0, 1).max(1) as u16),
            IL => self.insert_lines(seq.param_or(0, 1).max(1) as u16),
            DL => self.delete_lines(seq.param_or(0, 1).max(1) as u16),
            SU => {
                let attrs = fill_attrs(self.buffer().cursor.attrs);
                self.scroll_up_active(seq.param_or(0, 1).max(1) as u16, attrs);
            }
            SD => {
                let attrs = fill_attrs(self.buffer().cursor.attrs);
                let margin = self.active_margin();
                self.buffer_mut()
                    .grid
                    .scroll_down(seq.param_or(0, 1).max(1) as u16, attrs, margin);
            }
            REP => {
                if let Some(ch) = self.last_graphic {
                    for _ in 0..seq.param_or(0, 1).max(1).min(u32::from(u16::MAX)) {
                        self.print(ch);
                    }
                }
            }
            DECIC => {
                let attrs = fill_attrs(self.buffer().cursor.attrs);
                let rect = self.margin_from_cursor_column();
                self.buffer_mut()
                    .grid
                    .scroll_right(seq.param_or(0, 1).max(1) as u16, attrs, rect);
            }
            DECDC => {
                let attrs = fill_attrs(self.buffer().cursor.attrs);
                let rect = self.margin_from_cursor_column();
                self.buffer_mut()
                    .grid
                    .scroll_left(seq.param_or(0, 1).max(1) as u16, attrs, rect);
            }

            // ── Rectangles ──────────────────────────────────────────
            DECCRA => return self.copy_rect(seq),
            DECCARA => return self.change_rect_attrs(seq),
            DECERA => return self.erase_rect(seq, false),
            DECSERA => return self.erase_rect(seq, true),
            DECFRA => return self.fill_rect(seq),

            // ── Modes ───────────────────────────────────────────────
            SM => {
                for param in collect_params(seq) {
                    self.set_ansi_mode(param, true);
                }
            }
            RM => {
                for param in collect_params(seq) {
                    self.set_ansi_mode(param, false);
                }
            }
            DECSM => {
                for param in collect_params(seq) {
                    self.set_dec_mode(param, true);
                }
            }
            DECRM => {
                for param in collect_params(seq) {
                    self.set_dec_mode(param, false);
                }
            }
            DECRQM => {
                let mode = seq.param_or(0, 0) as u16;
                let status = self.modes.dec_status(mode) as u8;
                self.reply_str(&format!("\x1b[?{mode};{status}$y"));
            }
            DECRQM_ANSI => {
                let mode = seq.param_or(0, 0) as u16;
                let status = self.modes.ansi_status(mode) as u8;
                self.reply_str(&format!("\x1b[{mode};{status}$y"));
            }
            XTSAVE => {
                for param in collect_params(seq) {
                    self.modes.save_dec(param);
                }
            }
            XTRESTORE => {
                for param in collect_params(seq) {
                    if let Some(value) = self.modes.restore_dec(param) {
                        self.set_dec_mode(param, value);
                    }
                }
            }

            // ── SGR / cursor state ──────────────────────────────────
            SGR => self.buffer_mut().cursor.attrs.apply_sgr(&seq.params),
            SCOSC => {
                let origin = self.modes.origin_mode();
                let buffer = self.buffer_mut();
                buffer.sco_saved = Some(SavedCursor::capture(&buffer.cursor, origin));
            }
            SCORC => {
                if let Some(saved) = self.buffer_mut().sco_saved.take() {
                    let origin = {
                        let buffer = self.buffer_mut();
                        let origin = saved.restore(&mut buffer.cursor);
                        buffer.sco_saved = Some(saved);
                        origin
                    };
                    self.modes.set_dec(DecMode::Origin, origin);
                    self.clamp_cursor();
                }
            }
            DECSCUSR => return self.set_cursor_style(seq.param_or(0, 0)),
            DECSSDT => return self.set_status_display_type(seq.param_or(0, 0)),
            DECSASD => return self.select_active_display(seq.param_or(0, 0)),
            DECSCA => {
                let protect = seq.param_or(0, 0) == 1;
                let cursor = &mut self.buffer_mut().cursor;
                cursor
                    .attrs
                    .flags
                    .set(CellFlags::CHARACTER_PROTECTED, protect);
            }
            DECSTR => self.soft_reset(),
            DECSCL => {
                // Conformance level: accepted, geometry-independent.
                let level = seq.param_or(0, 65);
                if !(61..=65).contains(&level) {
                    return SequenceResult::Invalid;
                }
            }

            // ── Margins ─────────────────────────────────────────────
            DECSTBM => return self.set_top_bottom_margin(seq),
            DECSLRM => return self.set_left_right_margin(seq),

            // ── Tabs ────────────────────────────────────────────────
            TBC => match seq.param_or(0, 0) {
                0 => {
                    let column = self.buffer().cursor.position.column;
                    self.tabs.clear(column);
                }
                3 => self.tabs.clear_all(),
                _ => return SequenceResult::Invalid,
            },

            // ── Reports ─────────────────────────────────────────────
            DA1 => self.primary_device_attributes(),
            DA2 => {
                let id = self.settings.terminal_id.id();
                self.reply_str(&format!("\x1b[>{id};10;0c"));
            }
            DA3 => self.reply_str("\x1bP!|00000000\x1b\\"),
            DSR => return self.device_status_report(seq.param_or(0, 0), false),
            DECDSR => return self.device_status_report(seq.param_or(0, 0), true),
            XTWINOPS => return self.window_ops(seq),
            XTSMGRAPHICS => return self.graphics_query(seq),
            XTVERSION => {
                let version = env!("CARGO_PKG_VERSION");
                self.reply_str(&format!("\x1bP>|vtcore {version}\x1b\\"));
            }
            XTPUSHCOLORS => {
                self.color_stack.push(&self.palette);
            }
            XTPOPCOLORS => {
                if let Some(palette) = self.color_stack.pop() {
                    self.palette = palette;
                    self.events.push(ScreenEvent::ColorPaletteUpdated);
                }
            }
            XTREPORTCOLORS => {
                let depth = self.color_stack.depth();
                self.reply_str(&format!("\x1b[?{depth};{}#Q", ColorStack::reported_limit()));
            }

            // ── DCS entry points (payload comes later) ──────────────
            SIXEL | DECRQSS | XTGETTCAP => {
                // Reached only via hook(); nothing to do on lookup.
            }
        }
        SequenceResult::Ok
    }

    // ── Cursor motion helpers ───────────────────────────────────────

    fn move_up(&mut self, n: u16) {
        let margin = self.active_margin();
        let cursor = &mut self.buffer_mut().cursor;
        let floor = if cursor.position.line >= margin.top {
            margin.top
        } else {
            0
        };
        cursor.position.line = cursor.position.line.saturating_sub(n).max(floor);
        cursor.wrap_pending = false;
        self.last_written = None;
    }

    fn move_down(&mut self, n: u16) {
        let margin = self.active_margin();
        let size = self.active_size();
        let cursor = &mut self.buffer_mut().cursor;
        let ceiling = if cursor.position.line <= margin.bottom {
            margin.bottom
        } else {
            size.lines.saturating_sub(1)
        };
        cursor.position.line = cursor.position.line.saturating_add(n).min(ceiling);
        cursor.wrap_pending = false;
        self.last_written = None;
    }

    fn move_right(&mut self, n: u16) {
        let margin = self.active_margin();
        let size = self.active_size();
        let cursor = &mut self.buffer_mut().cursor;
        let ceiling = if cursor.position.column <= margin.right {
            margin.right
        } else {
            size.columns.saturating_sub(1)
        };
        cursor.position.column = cursor.position.column.saturating_add(n).min(ceiling);
        cursor.wrap_pending = false;
        self.last_written = None;
    }

    fn move_left(&mut self, n: u16) {
        let margin = self.active_margin();
        let cursor = &mut self.buffer_mut().cursor;
        let floor = if cursor.position.column >= margin.left {
            margin.left
        } else {
            0
        };
        cursor.position.column = cursor.position.column.saturating_sub(n).max(floor);
        cursor.wrap_pending = false;
        self.last_written = None;
    }

    /// CUP target, honoring origin mode.
    fn move_to(&mut self, line: u16, column: u16) {
        let size = self.active_size();
        let margin = self.active_margin();
        let (line, column) = if self.modes.origin_mode() {
            (
                (margin.top + line).min(margin.bottom),
                (margin.left + column).min(margin.right),
            )
        } else {
            (line, column)
        };
        self.buffer_mut().cursor.move_to(line, column, size);
        self.last_written = None;
    }

    fn move_to_column(&mut self, column: u16) {
        let line = self.buffer().cursor.position.line;
        let column = if self.modes.origin_mode() {
            self.margin.left + column
        } else {
            column
        };
        let size = self.active_size();
        self.buffer_mut().cursor.move_to(line, column, size);
    }

    fn move_to_line(&mut self, line: u16) {
        let column = self.buffer().cursor.position.column;
        let line = if self.modes.origin_mode() {
            self.margin.top + line
        } else {
            line
        };
        let size = self.active_size();
        self.buffer_mut().cursor.move_to(line, column, size);
    }

    fn clamp_cursor(&mut self) {
        let size = self.active_size();
        self.buffer_mut().cursor.clamp(size);
    }

    fn back_index(&mut self) {
        let margin = self.active_margin();
        let column = self.buffer().cursor.position.column;
        if column == margin.left {
            let attrs = fill_attrs(self.buffer().cursor.attrs);
            self.buffer_mut().grid.scroll_right(1, attrs, margin);
        } else {
            self.move_left(1);
        }
    }

    fn forward_index(&mut self) {
        let margin = self.active_margin();
        let column = self.buffer().cursor.position.column;
        if column == margin.right {
            let attrs = fill_attrs(self.buffer().cursor.attrs);
            self.buffer_mut().grid.scroll_left(1, attrs, margin);
        } else {
            self.move_right(1);
        }
    }

    fn screen_alignment(&mut self) {
        let size = self.active_size();
        self.margin = Margin::full(size);
        for line in 0..size.lines {
            if let Some(line) = self.page_line_mut_active(line) {
                let cells = line.inflate();
                for cell in cells.iter_mut() {
                    cell.write('E', 1, SgrAttrs::default(), 0);
                }
            }
        }
        self.buffer_mut().cursor.move_to(0, 0, size);
    }

    fn margin_from_cursor_column(&self) -> Margin {
        let margin = self.active_margin();
        Margin {
            left: self.buffer().cursor.position.column.max(margin.left),
            ..margin
        }
    }

    // ── Save / restore ──────────────────────────────────────────────

    fn save_cursor(&mut self) {
        let origin = self.modes.origin_mode();
        let buffer = self.buffer_mut();
        let saved = SavedCursor::capture(&buffer.cursor, origin);
        buffer.saved.push(saved);
    }

    fn restore_cursor(&mut self) {
        let saved = self.buffer_mut().saved.pop().unwrap_or_default();
        let origin = saved.restore(&mut self.buffer_mut().cursor);
        self.modes.set_dec(DecMode::Origin, origin);
        self.clamp_cursor();
    }

    // ── Erase ───────────────────────────────────────────────────────

    fn erase_in_display(&mut self, mode: u32, selective: bool) -> SequenceResult {
        let size = self.active_size();
        let pos = self.buffer().cursor.position;
        let bg = self.buffer().cursor.attrs.bg;
        match mode {
            0 => {
                self.erase_line_span(pos.line, pos.column, size.columns, bg, selective);
                for line in pos.line + 1..size.lines {
                    self.erase_line_span(line, 0, size.columns, bg, selective);
                }
            }
            1 => {
                for line in 0..pos.line {
                    self.erase_line_span(line, 0, size.columns, bg, selective);
                }
                self.erase_line_span(pos.line, 0, pos.column + 1, bg, selective);
            }
            2 => {
                for line in 0..size.lines {
                    self.erase_line_span(line, 0, size.columns, bg, selective);
                }
            }
            3 => {
                self.main_buffer_mut().grid.clear_history();
            }
            _ => return SequenceResult::Invalid,
        }
        SequenceResult::Ok
    }

    fn erase_in_line(&mut self, mode: u32, selective: bool) -> SequenceResult {
        let size = self.active_size();
        let pos = self.buffer().cursor.position;
        let bg = self.buffer().cursor.attrs.bg;
        match mode {
            0 => self.erase_line_span(pos.line, pos.column, size.columns, bg, selective),
            1 => self.erase_line_span(pos.line, 0, pos.column + 1, bg, selective),
            2 => self.erase_line_span(pos.line, 0, size.columns, bg, selective),
            _ => return SequenceResult::Invalid,
        }
        SequenceResult::Ok
    }

    fn erase_chars(&mut self, count: u16) {
        let size = self.active_size();
        let pos = self.buffer().cursor.position;
        let bg = self.buffer().cursor.attrs.bg;
        let end = pos.column.saturating_add(count).min(size.columns);
        self.erase_line_span(pos.line, pos.column, end, bg, false);
    }

    /// Erase `[from, to)` on one line with wide-pair fixups; `selective`
    /// skips protected cells.
    fn erase_line_span(
        &mut self,
        line_index: u16,
        from: u16,
        to: u16,
        bg: crate::cell::Color,
        selective: bool,
    ) {
        // Whole unprotected trivial lines reset cheaply.
        let columns = self.active_size().columns;
        let mut discarded: Vec<ImageHandle> = Vec::new();
        {
            let Some(line) = self.page_line_mut_active(line_index) else {
                return;
            };
            if from == 0 && to >= columns && !selective {
                if line.is_trivial() {
                    line.reset(SgrAttrs {
                        bg,
                        ..SgrAttrs::default()
                    });
                    return;
                }
            }
            let cells = line.inflate();
            let from = usize::from(from).min(cells.len());
            let to = usize::from(to).min(cells.len());

            // Orphan fixups at the span edges.
            if from > 0 && from < cells.len() && cells[from].is_wide_continuation() {
                cells[from - 1].erase(bg);
            }
            if to < cells.len() && cells[to].is_wide_continuation() {
                cells[to].erase(bg);
            }

            for cell in &mut cells[from..to] {
                if selective && cell.is_protected() {
                    continue;
                }
                if let Some(fragment) = cell.take_fragment() {
                    discarded.push(fragment.handle);
                }
                cell.erase(bg);
            }
        }
        for handle in discarded {
            if self.images.release(handle) {
                self.events.push(ScreenEvent::DiscardImage(handle));
            }
        }
    }

    fn delete_chars(&mut self, count: u16) {
        let margin = self.active_margin();
        let pos = self.buffer().cursor.position;
        if pos.column < margin.left || pos.column > margin.right {
            return;
        }
        let bg = self.buffer().cursor.attrs.bg;
        let Some(line) = self.page_line_mut_active(pos.line) else {
            return;
        };
        let cells = line.inflate();
        let left = usize::from(pos.column);
        let end = usize::from(margin.right) + 1;
        if left >= end || left >= cells.len() {
            return;
        }
        let n = usize::from(count).min(end - left);
        cells[left..end].rotate_left(n);
        for cell in &mut cells[end - n..end] {
            cell.erase(bg);
        }
    }

    fn insert_lines(&mut self, count: u16) {
        let margin = self.active_margin();
        let pos = self.buffer().cursor.position;
        if !margin.contains_line(pos.line) {
            return;
        }
        let attrs = fill_attrs(self.buffer().cursor.attrs);
        let rect = Margin {
            top: pos.line,
            ..margin
        };
        self.buffer_mut().grid.scroll_down(count, attrs, rect);
        let left = margin.left;
        let cursor = &mut self.buffer_mut().cursor;
        cursor.position.column = left;
        cursor.wrap_pending = false;
    }

    fn delete_lines(&mut self, count: u16) {
        let margin = self.active_margin();
        let pos = self.buffer().cursor.position;
        if !margin.contains_line(pos.line) {
            return;
        }
        let attrs = fill_attrs(self.buffer().cursor.attrs);
        let rect = Margin {
            top: pos.line,
            ..margin
        };
        self.buffer_mut().grid.scroll_up(count, attrs, rect);
        let left = margin.left;
        let cursor = &mut self.buffer_mut().cursor;
        cursor.position.column = left;
        cursor.wrap_pending = false;
    }

    // ── Rectangles ──────────────────────────────────────────────────

    /// Decode the `Pt;Pl;Pb;Pr` prefix of a rectangle operation, 1-based and
    /// origin-adjusted, clamped to the page.
    fn decode_rect(&self, seq: &Sequence, first: usize) -> Option<Margin> {
        let size = self.active_size();
        let origin = if self.modes.origin_mode() {
            (self.margin.top, self.margin.left)
        } else {
            (0, 0)
        };
        let top = seq.param_or(first, 1).max(1) as u16 - 1 + origin.0;
        let left = seq.param_or(first + 1, 1).max(1) as u16 - 1 + origin.1;
        let bottom = match seq.params.param(first + 2) {
            Some(p) if p >= 1 => p as u16 - 1 + origin.0,
            _ => size.lines - 1,
        };
        let right = match seq.params.param(first + 3) {
            Some(p) if p >= 1 => p as u16 - 1 + origin.1,
            _ => size.columns - 1,
        };
        if top > bottom || left > right {
            return None;
        }
        Some(
            Margin {
                top,
                bottom,
                left,
                right,
            }
            .clamped(size),
        )
    }

    fn copy_rect(&mut self, seq: &Sequence) -> SequenceResult {
        let Some(src) = self.decode_rect(seq, 0) else {
            return SequenceResult::Invalid;
        };
        // Pps;Ptd;Pld;Ppd — pages are always 1 here.
        let origin = if self.modes.origin_mode() {
            (self.margin.top, self.margin.left)
        } else {
            (0, 0)
        };
        let dst_top = seq.param_or(5, 1).max(1) as u16 - 1 + origin.0;
        let dst_left = seq.param_or(6, 1).max(1) as u16 - 1 + origin.1;
        let size = self.active_size();
        if dst_top >= size.lines || dst_left >= size.columns {
            return SequenceResult::Invalid;
        }

        let height = src.vertical_extent();
        let width = src.horizontal_extent();
        // Choose iteration direction per axis so an overlapping move reads
        // each source cell before overwriting it.
        let down = dst_top > src.top;
        let rightward = dst_left > src.left;

        let lines: Vec<u16> = if down {
            (0..height).rev().collect()
        } else {
            (0..height).collect()
        };
        let cols: Vec<u16> = if rightward {
            (0..width).rev().collect()
        } else {
            (0..width).collect()
        };
        for dl in lines {
            for dc in cols.iter().copied() {
                let from = CellLocation::new(src.top + dl, src.left + dc);
                let to = CellLocation::new(dst_top + dl, dst_left + dc);
                if to.line >= size.lines || to.column >= size.columns {
                    continue;
                }
                let cell = self
                    .buffer()
                    .grid
                    .cell(from)
                    .unwrap_or_default();
                if let Some(target) = self.buffer_mut().grid.cell_mut(to) {
                    *target = cell;
                }
            }
        }
        SequenceResult::Ok
    }

    fn change_rect_attrs(&mut self, seq: &Sequence) -> SequenceResult {
        let Some(rect) = self.decode_rect(seq, 0) else {
            return SequenceResult::Invalid;
        };
        // Remaining parameters are SGR values; rebuild a parameter list.
        let mut sgr = crate::sequence::Params::default();
        let mut any = false;
        for (i, param) in seq.params.iter().enumerate() {
            if i < 4 {
                continue;
            }
            if any {
                sgr.next_param();
            }
            if let Some(value) = param.value() {
                for digit in value.to_string().bytes() {
                    sgr.push_digit(digit);
                }
            }
            any = true;
        }
        for line in rect.top..=rect.bottom {
            for column in rect.left..=rect.right {
                let pos = CellLocation::new(line, column);
                if let Some(cell) = self.buffer_mut().grid.cell_mut(pos) {
                    let mut attrs = cell.attrs();
                    attrs.apply_sgr(&sgr);
                    let hyperlink = cell.hyperlink;
                    let content = cell.content();
                    let width = cell.width();
                    let wide_flags =
                        cell.flags & (CellFlags::WIDE_CHAR | CellFlags::WIDE_CONTINUATION);
                    cell.write(content, width.max(1), attrs, hyperlink);
                    cell.flags |= wide_flags;
                }
            }
        }
        SequenceResult::Ok
    }

    fn erase_rect(&mut self, seq: &Sequence, selective: bool) -> SequenceResult {
        let Some(rect) = self.decode_rect(seq, 0) else {
            return SequenceResult::Invalid;
        };
        let bg = self.buffer().cursor.attrs.bg;
        for line in rect.top..=rect.bottom {
            self.erase_line_span(line, rect.left, rect.right + 1, bg, selective);
        }
        SequenceResult::Ok
    }

    fn fill_rect(&mut self, seq: &Sequence) -> SequenceResult {
        let ch = seq.param_or(0, 0);
        let valid = (32..=126).contains(&ch) || (160..=255).contains(&ch);
        if !valid {
            return SequenceResult::Invalid;
        }
        let Some(ch) = char::from_u32(ch) else {
            return SequenceResult::Invalid;
        };
        let Some(rect) = self.decode_rect(seq, 1) else {
            return SequenceResult::Invalid;
        };
        let attrs = self.buffer().cursor.attrs;
        for line in rect.top..=rect.bottom {
            for column in rect.left..=rect.right {
                let pos = CellLocation::new(line, column);
                self.release_fragment_at(pos);
                if let Some(cell) = self.buffer_mut().grid.cell_mut(pos) {
                    cell.write(ch, 1, attrs, 0);
                }
            }
        }
        SequenceResult::Ok
    }

    // ── Margins ─────────────────────────────────────────────────────

    fn set_top_bottom_margin(&mut self, seq: &Sequence) -> SequenceResult {
        let size = self.active_size();
        let top = seq.param_or(0, 1).max(1) as u16 - 1;
        let bottom = match seq.params.param(1) {
            Some(p) if p >= 1 => (p as u16 - 1).min(size.lines - 1),
            _ => size.lines - 1,
        };
        if top >= bottom {
            return SequenceResult::Invalid;
        }
        self.margin.top = top;
        self.margin.bottom = bottom;
        self.move_to(0, 0);
        SequenceResult::Ok
    }

    fn set_left_right_margin(&mut self, seq: &Sequence) -> SequenceResult {
        if !self.modes.left_right_margin() {
            return SequenceResult::Invalid;
        }
        let size = self.active_size();
        let left = seq.param_or(0, 1).max(1) as u16 - 1;
        let right = match seq.params.param(1) {
            Some(p) if p >= 1 => (p as u16 - 1).min(size.columns - 1),
            _ => size.columns - 1,
        };
        if left >= right {
            return SequenceResult::Invalid;
        }
        self.margin.left = left;
        self.margin.right = right;
        self.move_to(0, 0);
        SequenceResult::Ok
    }

    // ── Modes ───────────────────────────────────────────────────────

    fn set_ansi_mode(&mut self, mode: u16, enable: bool) {
        match AnsiMode::from_number(mode) {
            Some(m) => self.modes.set_ansi(m, enable),
            None => info!(mode, "unsupported ANSI mode"),
        }
    }

    /// DECSET/DECRST with side effects.
    pub fn set_dec_mode(&mut self, mode: u16, enable: bool) {
        let Some(dec_mode) = DecMode::from_number(mode) else {
            info!(mode, "unsupported DEC mode");
            return;
        };
        match dec_mode {
            DecMode::Origin => {
                self.modes.set_dec(dec_mode, enable);
                self.move_to(0, 0);
            }
            DecMode::Columns132 => {
                if self.modes.dec(DecMode::AllowColumns80to132) {
                    self.modes.set_dec(dec_mode, enable);
                    let columns = if enable { 132 } else { 80 };
                    let lines = self.settings.page_size.lines;
                    self.events
                        .push(ScreenEvent::ResizeRequest(PageSize::new(lines, columns)));
                    let _ = self.erase_in_display(2, false);
                    self.margin = Margin::full(self.settings.page_size);
                    self.move_to(0, 0);
                }
            }
            DecMode::UseAlternateScreen => {
                self.modes.set_dec(dec_mode, enable);
                self.switch_screen(enable, false, false);
            }
            DecMode::UseAlternateScreenClear => {
                if enable {
                    self.modes.set_dec(dec_mode, true);
                    self.switch_screen(true, false, false);
                } else {
                    // Leaving under 1047 clears the alternate page; the mode
                    // bit must still be set while switching for that check.
                    self.switch_screen(false, false, false);
                    self.modes.set_dec(dec_mode, false);
                }
            }
            DecMode::SaveCursorAndAlternateScreen => {
                if enable {
                    self.save_cursor();
                    self.switch_screen(true, true, false);
                } else {
                    self.switch_screen(false, false, true);
                }
                self.modes.set_dec(dec_mode, enable);
            }
            DecMode::SaveCursor => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            DecMode::VisibleCursor | DecMode::BlinkingCursor => {
                self.modes.set_dec(dec_mode, enable);
                self.events.push(ScreenEvent::CursorStyleChanged);
            }
            _ => self.modes.set_dec(dec_mode, enable),
        }
    }

    /// Swap the main buffer; `clear_alt` wipes the alternate page, and
    /// `restore_cursor` reinstates the DECSC state on the way back.
    fn switch_screen(&mut self, to_alternate: bool, clear_alt: bool, restore: bool) {
        let target = if to_alternate {
            ScreenType::Alternate
        } else {
            ScreenType::Primary
        };
        let mode_1047 = self.modes.dec(DecMode::UseAlternateScreenClear);
        if self.active_screen != target {
            // Leaving the alternate screen under mode 1047 clears it.
            if self.active_screen == ScreenType::Alternate && !to_alternate && mode_1047 {
                self.alternate.grid.clear_page();
            }
            self.active_screen = target;
            self.events.push(ScreenEvent::BufferChanged(target));
        }
        self.modes.set_dec(
            DecMode::UseAlternateScreen,
            to_alternate,
        );
        if clear_alt && to_alternate {
            self.alternate.grid.clear_page();
            self.alternate.cursor = Cursor::default();
        }
        if restore {
            self.restore_cursor();
        }
        self.margin = Margin::full(self.settings.page_size);
    }

    // ── Resets ──────────────────────────────────────────────────────

    /// RIS.
    pub fn hard_reset(&mut self) {
        let settings = self.settings.clone();
        let replies = std::mem::take(&mut self.replies);
        let mut events = std::mem::take(&mut self.events);
        events.push(ScreenEvent::HardReset);
        *self = Screen::new(settings);
        self.replies = replies;
        self.events = events;
    }

    /// DECSTR: reset modes, SGR, margins, charsets; keep content, cursor
    /// position, and scrollback.
    pub fn soft_reset(&mut self) {
        self.modes.reset();
        self.margin = Margin::full(self.settings.page_size);
        let buffer = self.buffer_mut();
        buffer.cursor.attrs = SgrAttrs::default();
        buffer.cursor.wrap_pending = false;
        buffer.cursor.charsets = Default::default();
        buffer.saved.clear();
        buffer.sco_saved = None;
        self.cursor_shape = self.settings.cursor_shape;
    }

    // ── Reports ─────────────────────────────────────────────────────

    fn primary_device_attributes(&mut self) {
        let reply = match self.settings.terminal_id {
            VtType::VT100 => "\x1b[?1;2c".to_string(),
            id => {
                let level = match id {
                    VtType::VT220 | VtType::VT240 => 62,
                    VtType::VT320 | VtType::VT330 | VtType::VT340 => 63,
                    VtType::VT420 => 64,
                    _ => 65,
                };
                // 1: 132 columns, 2: printer, 4: sixel, 6: selective erase,
                // 9: NRC, 15: technical charset, 18: windowing, 21: horizontal
                // scrolling, 22: ANSI color, 28: rectangular editing,
                // 314: capture buffer.
                format!("\x1b[?{level};1;2;4;6;9;15;18;21;22;28;314c")
            }
        };
        self.reply_str(&reply);
    }

    fn device_status_report(&mut self, kind: u32, extended: bool) -> SequenceResult {
        match kind {
            5 => self.reply_str("\x1b[0n"),
            6 => {
                let pos = self.buffer().cursor.position;
                let (line, column) = if self.modes.origin_mode() {
                    (
                        pos.line - self.margin.top + 1,
                        pos.column - self.margin.left + 1,
                    )
                } else {
                    (pos.line + 1, pos.column + 1)
                };
                if extended {
                    self.reply_str(&format!("\x1b[?{line};{column};1R"));
                } else {
                    self.reply_str(&format!("\x1b[{line};{column}R"));
                }
            }
            _ => return SequenceResult::Invalid,
        }
        SequenceResult::Ok
    }

    fn set_cursor_style(&mut self, style: u32) -> SequenceResult {
        let (shape, blinking) = match style {
            0 | 1 => (CursorShape::Block, true),
            2 => (CursorShape::Block, false),
            3 => (CursorShape::Underscore, true),
            4 => (CursorShape::Underscore, false),
            5 => (CursorShape::Bar, true),
            6 => (CursorShape::Bar, false),
            _ => return SequenceResult::Invalid,
        };
        self.cursor_shape = shape;
        self.cursor_blinking = blinking;
        self.events.push(ScreenEvent::CursorStyleChanged);
        SequenceResult::Ok
    }

    fn window_ops(&mut self, seq: &Sequence) -> SequenceResult {
        match seq.param_or(0, 0) {
            4 => {
                // Resize window to pixels: host decides.
                let height = seq.param_or(1, 0);
                let width = seq.param_or(2, 0);
                if height > 0 && width > 0 && self.cell_pixel_size.height > 0 {
                    let lines = (height / self.cell_pixel_size.height) as u16;
                    let columns = (width / self.cell_pixel_size.width) as u16;
                    if lines > 0 && columns > 0 {
                        self.events
                            .push(ScreenEvent::ResizeRequest(PageSize::new(lines, columns)));
                    }
                }
            }
            8 => {
                let lines = seq.param_or(1, 0) as u16;
                let columns = seq.param_or(2, 0) as u16;
                if lines > 0 && columns > 0 {
                    self.events
                        .push(ScreenEvent::ResizeRequest(PageSize::new(lines, columns)));
                }
            }
            11 => self.reply_str("\x1b[1t"),
            13 => self.reply_str("\x1b[3;0;0t"),
            14 => {
                let reply = format!(
                    "\x1b[4;{};{}t",
                    self.pixel_size.height, self.pixel_size.width
                );
                self.reply_str(&reply);
            }
            16 => {
                let reply = format!(
                    "\x1b[6;{};{}t",
                    self.cell_pixel_size.height, self.cell_pixel_size.width
                );
                self.reply_str(&reply);
            }
            18 | 19 => {
                let size = self.settings.page_size;
                let reply = format!("\x1b[8;{};{}t", size.lines, size.columns);
                self.reply_str(&reply);
            }
            22 => {
                self.title_stack.push(self.window_title.clone());
                if self.title_stack.len() > 10 {
                    self.title_stack.remove(0);
                }
            }
            23 => {
                if let Some(title) = self.title_stack.pop() {
                    self.window_title = title.clone();
                    self.events.push(ScreenEvent::SetWindowTitle(title));
                }
            }
            _ => return SequenceResult::Unsupported,
        }
        SequenceResult::Ok
    }

    /// XTSMGRAPHICS: color registers and sixel geometry.
    fn graphics_query(&mut self, seq: &Sequence) -> SequenceResult {
        let item = seq.param_or(0, 0);
        let action = seq.param_or(1, 0);
        match (item, action) {
            // Color registers: read / reset / set / read-max.
            (1, 1) => {
                let value = self.settings.max_image_register_count;
                self.reply_str(&format!("\x1b[?1;0;{value}S"));
            }
            (1, 2) => {
                let value = Settings::default().max_image_register_count;
                self.settings.max_image_register_count = value;
                self.reply_str(&format!("\x1b[?1;0;{value}S"));
            }
            (1, 3) => {
                let requested = seq.param_or(2, 0);
                let limit = Settings::default().max_image_register_count.max(256);
                let granted = requested.clamp(16, limit);
                self.settings.max_image_register_count = granted;
                self.reply_str(&format!("\x1b[?1;0;{granted}S"));
            }
            (1, 4) => {
                self.reply_str("\x1b[?1;0;65536S");
            }
            // Sixel geometry: read / read-max; set clamps into the ceiling.
            (2, 1) => {
                let size = self.settings.max_image_size;
                self.reply_str(&format!("\x1b[?2;0;{};{}S", size.width, size.height));
            }
            (2, 2) | (2, 4) => {
                let size = Settings::default().max_image_size;
                self.reply_str(&format!("\x1b[?2;0;{};{}S", size.width, size.height));
            }
            (2, 3) => {
                let width = seq.param_or(2, 0);
                let height = seq.param_or(3, 0);
                let ceiling = Settings::default().max_image_size;
                if width == 0 || height == 0 {
                    self.reply_str("\x1b[?2;2S");
                    return SequenceResult::Invalid;
                }
                let size = ImageSize::new(width.min(ceiling.width), height.min(ceiling.height));
                self.settings.max_image_size = size;
                self.reply_str(&format!("\x1b[?2;0;{};{}S", size.width, size.height));
            }
            (item, _) => {
                // Unknown item: error status 1, no side effects.
                self.reply_str(&format!("\x1b[?{item};1S"));
                return SequenceResult::Invalid;
            }
        }
        SequenceResult::Ok
    }

    // ── OSC ─────────────────────────────────────────────────────────

    /// Dispatch an OSC payload (`code ; text`).
    pub fn apply_osc(&mut self, payload: &[u8]) -> SequenceResult {
        let text = String::from_utf8_lossy(payload);
        let (code, rest) = match text.split_once(';') {
            Some((code, rest)) => (code, rest),
            None => (text.as_ref(), ""),
        };
        let Ok(code) = code.parse::<u16>() else {
            return SequenceResult::Invalid;
        };
        match code {
            0 | 1 | 2 => {
                self.window_title = rest.to_string();
                self.events
                    .push(ScreenEvent::SetWindowTitle(rest.to_string()));
            }
            4 => return self.osc_palette(rest),
            8 => return self.osc_hyperlink(rest),
            10 | 11 | 12 | 17 | 19 => return self.osc_dynamic_color(code, rest),
            52 => return self.osc_clipboard(rest),
            104 => {
                let index = rest.trim();
                if index.is_empty() {
                    self.palette.reset_indexed(None);
                } else if let Ok(index) = index.parse::<u8>() {
                    self.palette.reset_indexed(Some(index));
                } else {
                    return SequenceResult::Invalid;
                }
                self.events.push(ScreenEvent::ColorPaletteUpdated);
            }
            110 | 111 | 112 | 117 | 119 => {
                if let Some(which) = DynamicColor::from_osc_code(code - 100) {
                    self.palette.reset_dynamic(which);
                    self.events.push(ScreenEvent::ColorPaletteUpdated);
                }
            }
            314 => return self.osc_capture_buffer(rest),
            777 => return self.osc_notify(rest),
            _ => {
                info!(code, "unsupported OSC");
                return SequenceResult::Unsupported;
            }
        }
        SequenceResult::Ok
    }

    fn osc_palette(&mut self, rest: &str) -> SequenceResult {
        // OSC 4 carries `index;spec` pairs.
        let mut parts = rest.split(';');
        let mut ok = true;
        loop {
            let Some(index) = parts.next() else { break };
            let Some(spec) = parts.next() else {
                ok = false;
                break;
            };
            let Ok(index) = index.trim().parse::<u8>() else {
                ok = false;
                continue;
            };
            if spec == "?" {
                let color = self.palette.indexed(index);
                let reply = format!("\x1b]4;{index};{}\x1b\\", color.to_x11_spec());
                self.reply_str(&reply);
            } else if let Some(color) = RgbColor::parse(spec) {
                self.palette.set_indexed(index, color);
                self.events.push(ScreenEvent::ColorPaletteUpdated);
            } else {
                ok = false;
            }
        }
        if ok {
            SequenceResult::Ok
        } else {
            SequenceResult::Invalid
        }
    }

    fn osc_dynamic_color(&mut self, code: u16, rest: &str) -> SequenceResult {
        let Some(which) = DynamicColor::from_osc_code(code) else {
            return SequenceResult::Invalid;
        };
        if rest == "?" {
            let color = self.palette.dynamic(which);
            let reply = format!("\x1b]{code};{}\x1b\\", color.to_x11_spec());
            self.reply_str(&reply);
            return SequenceResult::Ok;
        }
        match RgbColor::parse(rest) {
            Some(color) => {
                self.palette.set_dynamic(which, color);
                self.events.push(ScreenEvent::ColorPaletteUpdated);
                SequenceResult::Ok
            }
            None => SequenceResult::Invalid,
        }
    }

    fn osc_hyperlink(&mut self, rest: &str) -> SequenceResult {
        // OSC 8 ; params ; URI — params may carry `id=...`.
        let Some((params, uri)) = rest.split_once(';') else {
            return SequenceResult::Invalid;
        };
        if uri.is_empty() {
            self.buffer_mut().cursor.hyperlink = 0;
            return SequenceResult::Ok;
        }
        let user_id = params
            .split(':')
            .find_map(|p| p.strip_prefix("id="))
            .filter(|id| !id.is_empty());
        let id = self.hyperlinks.acquire(user_id, uri);
        self.buffer_mut().cursor.hyperlink = id;
        SequenceResult::Ok
    }

    fn osc_clipboard(&mut self, rest: &str) -> SequenceResult {
        // OSC 52 ; c ; <base64>
        let Some((_selection, data)) = rest.split_once(';') else {
            return SequenceResult::Invalid;
        };
        if data == "?" {
            // Clipboard reads are a permission problem; deny silently.
            return SequenceResult::Ok;
        }
        match decode_base64(data.as_bytes()) {
            Some(bytes) => {
                self.events.push(ScreenEvent::CopyToClipboard(bytes));
                SequenceResult::Ok
            }
            None => SequenceResult::Invalid,
        }
    }

    fn osc_notify(&mut self, rest: &str) -> SequenceResult {
        // OSC 777 ; notify ; title ; body
        let mut parts = rest.splitn(3, ';');
        if parts.next() != Some("notify") {
            return SequenceResult::Unsupported;
        }
        let title = parts.next().unwrap_or_default().to_string();
        let body = parts.next().unwrap_or_default().to_string();
        self.events.push(ScreenEvent::Notify { title, body });
        SequenceResult::Ok
    }

    /// OSC 314: request screen content. The actual reply waits on the
    /// host's permission decision.
    fn osc_capture_buffer(&mut self, rest: &str) -> SequenceResult {
        let mut parts = rest.split(';');
        let logical = parts.next().map(|p| p == "1").unwrap_or(false);
        let lines: u16 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.settings.page_size.lines);
        self.events
            .push(ScreenEvent::RequestCaptureBuffer { lines, logical });
        SequenceResult::Ok
    }

    /// Produce the OSC 314 reply: screen content in ST-delimited PM chunks,
    /// an empty chunk marking the end.
    pub fn capture_buffer(&mut self, lines: u16, logical: bool) {
        const MAX_CHUNK: usize = 4096;
        let grid = &self.main_buffer().grid;
        let mut captured: Vec<String> = Vec::new();
        if logical {
            let mut taken = 0;
            for line in grid.logical_lines_reverse_from(i64::from(self.settings.page_size.lines) - 1)
            {
                if taken == lines {
                    break;
                }
                captured.push(line.text);
                taken += 1;
            }
            captured.reverse();
        } else {
            let start = i64::from(self.settings.page_size.lines) - i64::from(lines);
            for offset in start..i64::from(self.settings.page_size.lines) {
                if let Some(line) = grid.line_at(offset) {
                    captured.push(line.text());
                }
            }
        }

        let mut chunk = String::new();
        let mut flush = |screen: &mut Self, chunk: &mut String| {
            if !chunk.is_empty() {
                screen.reply_str(&format!("\x1b^314;{chunk}\x1b\\"));
                chunk.clear();
            }
        };
        for line in captured {
            let mut data = line;
            data.push('\n');
            if chunk.len() + data.len() > MAX_CHUNK {
                flush(self, &mut chunk);
            }
            chunk.push_str(&data);
        }
        flush(self, &mut chunk);
        // Terminating empty chunk marks the end of the transfer.
        self.reply_str("\x1b^314;\x1b\\");
    }

    // ── DCS sub-parsers ─────────────────────────────────────────────

    /// Begin a DCS payload stream for the hooked function.
    pub fn hook(&mut self, seq: &Sequence) {
        self.dcs_hook = match Function::select(seq) {
            Some(Function::SIXEL) => {
                self.sixel = SixelDecoder::new(
                    self.settings.max_image_size,
                    self.settings.max_image_register_count,
                );
                self.sixel.hook();
                Some(DcsHook::Sixel)
            }
            Some(Function::DECRQSS) => Some(DcsHook::Rqss(Vec::new())),
            Some(Function::XTGETTCAP) => Some(DcsHook::Tcap(Vec::new())),
            _ => {
                info!(final_byte = seq.final_byte, "unsupported DCS hook");
                Some(DcsHook::Ignore)
            }
        };
    }

    pub fn dcs_put(&mut self, byte: u8) {
        match &mut self.dcs_hook {
            Some(DcsHook::Sixel) => self.sixel.put(byte),
            Some(DcsHook::Rqss(buf)) | Some(DcsHook::Tcap(buf)) => {
                if buf.len() < 4096 {
                    buf.push(byte);
                }
            }
            _ => {}
        }
    }

    pub fn dcs_unhook(&mut self) {
        match self.dcs_hook.take() {
            Some(DcsHook::Sixel) => {
                if let Some(image) = self.sixel.unhook() {
                    self.attach_image(image);
                } else if self.sixel.was_rejected() {
                    warn!("sixel image rejected by resource limits");
                }
            }
            Some(DcsHook::Rqss(buf)) => self.request_status_string(&buf),
            Some(DcsHook::Tcap(buf)) => self.request_termcap(&buf),
            _ => {}
        }
    }

    /// Place a decoded image at the cursor as per-cell fragments.
    fn attach_image(&mut self, image: Image) {
        let cell_w = self.cell_pixel_size.width.max(1);
        let cell_h = self.cell_pixel_size.height.max(1);
        let cols_spanned = image.size.width.div_ceil(cell_w).max(1) as u16;
        let rows_spanned = image.size.height.div_ceil(cell_h).max(1) as u16;

        // VT340 rule: on certain sixel-band boundaries the cursor stops one
        // row short of the final band.
        let height = image.size.height;
        let last_row_adjust = if height % 6 > height % cell_h { 1 } else { 0 };

        let size = self.active_size();
        let mut origin = self.buffer().cursor.position;
        let sixel_scrolling = !self.modes.dec(DecMode::NoSixelScrolling);

        // Scroll up front so every band lands inside the margin, then place
        // fragments against the settled origin.
        if sixel_scrolling {
            let last = origin.line + rows_spanned - 1;
            if last > self.margin.bottom {
                let shortfall = last - self.margin.bottom;
                let attrs = fill_attrs(self.buffer().cursor.attrs);
                self.scroll_up_active(shortfall, attrs);
                origin.line = origin.line.saturating_sub(shortfall);
            }
        } else {
            origin.line = 0;
        }
        let handle = self.images.insert(image);

        for row in 0..rows_spanned {
            let line = origin.line + row;
            if line >= size.lines {
                break;
            }
            for col in 0..cols_spanned {
                let column = origin.column + col;
                if column >= size.columns {
                    break;
                }
                let pos = CellLocation::new(line, column);
                self.release_fragment_at(pos);
                self.images.acquire(handle);
                if let Some(cell) = self.buffer_mut().grid.cell_mut(pos) {
                    cell.set_fragment(ImageFragment {
                        handle,
                        cell_row: row,
                        cell_col: col,
                    });
                }
            }
        }
        // Drop the construction reference; fragments keep it alive.
        self.images.release(handle);

        if sixel_scrolling {
            let advance = rows_spanned.saturating_sub(last_row_adjust);
            let target = origin
                .line
                .saturating_add(advance)
                .min(self.margin.bottom);
            self.buffer_mut().cursor.position.line = target;
            // Cursor column behavior follows SixelCursorNextToGraphic.
            self.buffer_mut().cursor.position.column = origin.column;
        }
    }

    /// DECRQSS: `DCS $ q <setting> ST` → `DCS 1 $ r <value> ST`.
    fn request_status_string(&mut self, payload: &[u8]) {
        let setting = String::from_utf8_lossy(payload);
        let reply = match setting.as_ref() {
            "m" => Some(format!("{}m", self.current_sgr_string())),
            "\"p" => Some("65;1\"p".to_string()),
            " q" => {
                let style = match (self.cursor_shape, self.cursor_blinking) {
                    (CursorShape::Block, true) => 1,
                    (CursorShape::Block, false) => 2,
                    (CursorShape::Underscore, true) => 3,
                    (CursorShape::Underscore, false) => 4,
                    (CursorShape::Bar, true) => 5,
                    (CursorShape::Bar, false) => 6,
                    (CursorShape::Rectangle, _) => 2,
                };
                Some(format!("{style} q"))
            }
            "\"q" => {
                let protected = self
                    .buffer()
                    .cursor
                    .attrs
                    .flags
                    .contains(CellFlags::CHARACTER_PROTECTED);
                Some(format!("{}\"q", u8::from(protected)))
            }
            "r" => Some(format!("{};{}r", self.margin.top + 1, self.margin.bottom + 1)),
            "s" => Some(format!("{};{}s", self.margin.left + 1, self.margin.right + 1)),
            "t" => Some(format!("{}t", self.settings.page_size.lines)),
            "$|" => Some(format!("{}$|", self.settings.page_size.columns)),
            "*|" => Some(format!("{}*|", self.settings.page_size.lines)),
            "$}" => Some(format!(
                "{}$}}",
                u8::from(self.active_display == ActiveDisplay::StatusLine)
            )),
            "$~" => {
                let value = match self.status_type {
                    StatusDisplayType::None => 0,
                    StatusDisplayType::Indicator => 1,
                    StatusDisplayType::HostWritable => 2,
                };
                Some(format!("{value}$~"))
            }
            _ => None,
        };
        match reply {
            Some(value) => self.reply_str(&format!("\x1bP1$r{value}\x1b\\")),
            None => self.reply_str("\x1bP0$r\x1b\\"),
        }
    }

    /// Canonical SGR parameter string for the current attributes.
    fn current_sgr_string(&self) -> String {
        use crate::cell::Color;
        let attrs = self.buffer().cursor.attrs;
        let mut out = String::from("0");
        let mut push = |s: &str| {
            out.push(';');
            out.push_str(s);
        };
        let flag_codes: [(CellFlags, &str); 12] = [
            (CellFlags::BOLD, "1"),
            (CellFlags::FAINT, "2"),
            (CellFlags::ITALIC, "3"),
            (CellFlags::UNDERLINE, "4"),
            (CellFlags::BLINKING, "5"),
            (CellFlags::RAPID_BLINKING, "6"),
            (CellFlags::INVERSE, "7"),
            (CellFlags::HIDDEN, "8"),
            (CellFlags::CROSSED_OUT, "9"),
            (CellFlags::DOUBLY_UNDERLINED, "21"),
            (CellFlags::FRAMED, "51"),
            (CellFlags::OVERLINE, "53"),
        ];
        for (flag, code) in flag_codes {
            if attrs.flags.contains(flag) {
                push(code);
            }
        }
        match attrs.fg {
            Color::Default => {}
            Color::Indexed(i) if i < 8 => push(&format!("3{i}")),
            Color::Indexed(i) => push(&format!("38:5:{i}")),
            Color::Bright(i) => push(&format!("9{i}")),
            Color::Rgb(r, g, b) => push(&format!("38:2::{r}:{g}:{b}")),
        }
        match attrs.bg {
            Color::Default => {}
            Color::Indexed(i) if i < 8 => push(&format!("4{i}")),
            Color::Indexed(i) => push(&format!("48:5:{i}")),
            Color::Bright(i) => push(&format!("10{i}")),
            Color::Rgb(r, g, b) => push(&format!("48:2::{r}:{g}:{b}")),
        }
        out
    }

    /// XTGETTCAP: hex-encoded names in, `DCS 1 + r name=value ST` out.
    fn request_termcap(&mut self, payload: &[u8]) {
        let text = String::from_utf8_lossy(payload);
        for name_hex in text.split(';') {
            let Some(name) = decode_hex(name_hex) else {
                self.reply_str("\x1bP0+r\x1b\\");
                continue;
            };
            let name = String::from_utf8_lossy(&name).into_owned();
            let value = match name.as_str() {
                "TN" | "name" => Some("xterm-256color".to_string()),
                "Co" | "colors" => Some("256".to_string()),
                "RGB" => Some("8/8/8".to_string()),
                _ => None,
            };
            match value {
                Some(value) => {
                    let reply =
                        format!("\x1bP1+r{}={}\x1b\\", encode_hex(name.as_bytes()), encode_hex(value.as_bytes()));
                    self.reply_str(&reply);
                }
                None => self.reply_str("\x1bP0+r\x1b\\"),
            }
        }
    }

    // ── Status line ─────────────────────────────────────────────────

    /// DECSSDT: select the status display type.
    pub fn set_status_display_type(&mut self, kind: u32) -> SequenceResult {
        let new_type = match kind {
            0 => StatusDisplayType::None,
            1 => StatusDisplayType::Indicator,
            2 => StatusDisplayType::HostWritable,
            _ => return SequenceResult::Invalid,
        };
        self.status_type = new_type;
        if new_type != StatusDisplayType::HostWritable
            && self.active_display == ActiveDisplay::StatusLine
        {
            self.active_display = ActiveDisplay::Main;
        }
        if new_type == StatusDisplayType::None {
            self.status.grid.clear_page();
        }
        SequenceResult::Ok
    }

    /// DECSASD: route output to the main display or the status line.
    pub fn select_active_display(&mut self, target: u32) -> SequenceResult {
        match target {
            0 => {
                self.active_display = ActiveDisplay::Main;
                SequenceResult::Ok
            }
            1 => {
                if self.status_type != StatusDisplayType::HostWritable {
                    return SequenceResult::Invalid;
                }
                self.active_display = ActiveDisplay::StatusLine;
                SequenceResult::Ok
            }
            _ => SequenceResult::Invalid,
        }
    }

    // ── Resize ──────────────────────────────────────────────────────

    /// Resize both page buffers, translating each cursor.
    pub fn resize(&mut self, new_size: PageSize) {
        if new_size == self.settings.page_size || new_size.lines == 0 || new_size.columns == 0 {
            return;
        }
        for buffer in [&mut self.primary, &mut self.alternate] {
            let (cursor, wrap) = buffer.grid.resize(
                new_size,
                buffer.cursor.position,
                buffer.cursor.wrap_pending,
            );
            buffer.cursor.position = cursor;
            buffer.cursor.wrap_pending = wrap;
        }
        let status_size = PageSize::new(1, new_size.columns);
        let (status_cursor, _) =
            self.status
                .grid
                .resize(status_size, self.status.cursor.position, false);
        self.status.cursor.position = status_cursor;
        self.tabs.resize(new_size.columns);
        self.settings.page_size = new_size;
        self.margin = Margin::full(new_size);
        self.last_written = None;
    }
}

/// Fill attributes for scrolled-in lines: background only.
fn fill_attrs(attrs: SgrAttrs) -> SgrAttrs {
    SgrAttrs {
        bg: attrs.bg,
        ..SgrAttrs::default()
    }
}

/// Collect explicit numeric parameters (mode lists).
fn collect_params(seq: &Sequence) -> Vec<u16> {
    seq.params
        .iter()
        .filter_map(|p| p.value())
        .map(|v| v.min(u32::from(u16::MAX)) as u16)
        .collect()
}

fn split_fragment(fragment: BufferFragment, at: usize) -> (BufferFragment, Option<BufferFragment>) {
    if at >= fragment.len() {
        return (fragment, None);
    }
    let head = BufferFragment::from_bytes(&fragment.bytes()[..at]);
    let tail = BufferFragment::from_bytes(&fragment.bytes()[at..]);
    (head, Some(tail))
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Minimal base64 decoder for OSC 52 payloads.
fn decode_base64(input: &[u8]) -> Option<Vec<u8>> {
    fn value(b: u8) -> Option<u32> {
        match b {
            b'A'..=b'Z' => Some(u32::from(b - b'A')),
            b'a'..=b'z' => Some(u32::from(b - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(b - b'0') + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let input: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    for chunk in input.chunks(4) {
        let pad = chunk.iter().filter(|&&b| b == b'=').count();
        if chunk.len() < 4 && pad == 0 {
            return None;
        }
        let mut acc = 0u32;
        let mut bits = 0;
        for &b in chunk {
            if b == b'=' {
                break;
            }
            acc = (acc << 6) | value(b)?;
            bits += 6;
        }
        acc <<= 24 - bits.min(24);
        let bytes = acc.to_be_bytes();
        let take = match bits {
            24 => 3,
            18 => 2,
            12 => 1,
            _ => 0,
        };
        out.extend_from_slice(&bytes[1..1 + take]);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Color;

    fn screen(lines: u16, columns: u16) -> Screen {
        let mut settings = Settings::default();
        settings.page_size = PageSize::new(lines, columns);
        Screen::new(settings)
    }

    fn feed_text(screen: &mut Screen, text: &str) {
        for ch in text.chars() {
            match ch {
                '\n' => screen.execute_control(0x0A),
                '\r' => screen.execute_control(0x0D),
                '\t' => screen.execute_control(0x09),
                _ => screen.print(ch),
            }
        }
    }

    fn csi(screen: &mut Screen, text: &str) -> SequenceResult {
        // Build a Sequence the way the sequencer would.
        let mut seq = Sequence::default();
        seq.reset(crate::sequence::SequenceCategory::Csi);
        let bytes = text.as_bytes();
        let (params, final_byte) = bytes.split_at(bytes.len() - 1);
        let mut i = 0;
        while i < params.len() {
            let b = params[i];
            match b {
                b'0'..=b'9' => seq.params.push_digit(b),
                b';' => seq.params.next_param(),
                b':' => seq.params.next_sub_param(),
                b'?' | b'>' | b'<' | b'=' if i == 0 => seq.leader = Some(b),
                _ => seq.intermediates.push(b),
            }
            i += 1;
        }
        seq.final_byte = final_byte[0];
        screen.apply(&seq)
    }

    // ── Printing and wrap ───────────────────────────────────────────

    #[test]
    fn plain_text_lands_on_first_line() {
        let mut s = screen(3, 10);
        feed_text(&mut s, "hello");
        assert_eq!(s.line_text(0), "hello");
        assert_eq!(s.cursor().position, CellLocation::new(0, 5));
    }

    #[test]
    fn wrap_and_carriage_return() {
        let mut s = screen(3, 5);
        feed_text(&mut s, "abcdefghij\r");
        assert_eq!(s.line_text(0), "abcde");
        assert_eq!(s.line_text(1), "fghij");
        assert_eq!(s.line_text(2), "");
        assert!(s.grid().page_line(1).unwrap().is_wrapped());
        assert_eq!(s.cursor().position, CellLocation::new(2, 0));
    }

    #[test]
    fn wrap_pending_is_latched_not_eager() {
        let mut s = screen(2, 3);
        feed_text(&mut s, "abc");
        assert_eq!(s.cursor().position, CellLocation::new(0, 2));
        assert!(s.cursor().wrap_pending);
        feed_text(&mut s, "d");
        assert_eq!(s.cursor().position, CellLocation::new(1, 1));
        assert_eq!(s.line_text(1), "d");
    }

    #[test]
    fn autowrap_off_overwrites_last_column() {
        let mut s = screen(2, 3);
        s.set_dec_mode(7, false);
        feed_text(&mut s, "abcd");
        assert_eq!(s.line_text(0), "abd");
        assert_eq!(s.line_text(1), "");
    }

    #[test]
    fn wide_char_occupies_pair() {
        let mut s = screen(2, 4);
        feed_text(&mut s, "a中");
        let lead = s.grid().cell(CellLocation::new(0, 1)).unwrap();
        let cont = s.grid().cell(CellLocation::new(0, 2)).unwrap();
        assert!(lead.is_wide());
        assert_eq!(lead.content(), '中');
        assert!(cont.is_wide_continuation());
        assert_eq!(s.cursor().position.column, 3);
    }

    #[test]
    fn wide_char_wraps_when_it_cannot_fit() {
        let mut s = screen(2, 3);
        feed_text(&mut s, "ab中");
        assert_eq!(s.line_text(0), "ab");
        assert_eq!(s.line_text(1), "中");
    }

    #[test]
    fn combining_mark_joins_previous_cell() {
        let mut s = screen(2, 10);
        feed_text(&mut s, "e");
        s.print('\u{0301}');
        let cell = s.grid().cell(CellLocation::new(0, 0)).unwrap();
        let cps: Vec<char> = cell.codepoints().collect();
        assert_eq!(cps, vec!['e', '\u{0301}']);
        assert_eq!(s.cursor().position.column, 1);
    }

    #[test]
    fn trivial_run_append_stays_trivial() {
        let mut s = screen(2, 10);
        s.print_run(BufferFragment::from_bytes(b"hello"));
        assert!(s.grid().page_line(0).unwrap().is_trivial());
        assert_eq!(s.line_text(0), "hello");
        assert_eq!(s.cursor().position.column, 5);
    }

    #[test]
    fn trivial_run_wraps_across_lines() {
        let mut s = screen(3, 4);
        s.print_run(BufferFragment::from_bytes(b"abcdefghij"));
        assert_eq!(s.line_text(0), "abcd");
        assert_eq!(s.line_text(1), "efgh");
        assert_eq!(s.line_text(2), "ij");
        assert!(s.grid().page_line(1).unwrap().is_wrapped());
    }

    #[test]
    fn insert_mode_shifts_existing_text() {
        let mut s = screen(1, 6);
        feed_text(&mut s, "abc\r");
        csi(&mut s, "4h"); // IRM on
        feed_text(&mut s, "X");
        assert_eq!(s.line_text(0), "Xabc");
    }

    // ── Cursor motion ───────────────────────────────────────────────

    #[test]
    fn cup_moves_and_clamps() {
        let mut s = screen(5, 10);
        csi(&mut s, "3;4H");
        assert_eq!(s.cursor().position, CellLocation::new(2, 3));
        csi(&mut s, "99;99H");
        assert_eq!(s.cursor().position, CellLocation::new(4, 9));
    }

    #[test]
    fn relative_motions_respect_margins() {
        let mut s = screen(10, 10);
        csi(&mut s, "3;8r"); // margins lines 2..=7
        csi(&mut s, "5;5H");
        csi(&mut s, "9A"); // up stops at margin top
        assert_eq!(s.cursor().position.line, 2);
        csi(&mut s, "99B"); // down stops at margin bottom
        assert_eq!(s.cursor().position.line, 7);
    }

    #[test]
    fn origin_mode_addresses_within_margins() {
        let mut s = screen(10, 10);
        csi(&mut s, "3;8r");
        s.set_dec_mode(6, true);
        assert_eq!(s.cursor().position, CellLocation::new(2, 0));
        csi(&mut s, "2;2H");
        assert_eq!(s.cursor().position, CellLocation::new(3, 1));
        // Clamped to the margin bottom.
        csi(&mut s, "99;1H");
        assert_eq!(s.cursor().position.line, 7);
    }

    #[test]
    fn cha_hpa_vpa_absolute_positioning() {
        let mut s = screen(5, 10);
        csi(&mut s, "5G");
        assert_eq!(s.cursor().position.column, 4);
        csi(&mut s, "3d");
        assert_eq!(s.cursor().position.line, 2);
        csi(&mut s, "7`");
        assert_eq!(s.cursor().position.column, 6);
    }

    #[test]
    fn tabs_default_and_custom() {
        let mut s = screen(2, 20);
        s.execute_control(0x09);
        assert_eq!(s.cursor().position.column, 8);
        csi(&mut s, "3g"); // clear all
        csi(&mut s, "1;4H");
        csi(&mut s, "0g"); // no-op clear at cursor
        s.execute_control(0x09);
        assert_eq!(s.cursor().position.column, 19, "no stops: last column");
    }

    #[test]
    fn hts_sets_stop_and_cbt_returns() {
        let mut s = screen(2, 20);
        csi(&mut s, "3g");
        csi(&mut s, "1;5H");
        let mut seq = Sequence::default();
        seq.reset(crate::sequence::SequenceCategory::Esc);
        seq.final_byte = b'H';
        s.apply(&seq); // HTS at column 4
        csi(&mut s, "1;15H");
        csi(&mut s, "Z"); // CBT
        assert_eq!(s.cursor().position.column, 4);
    }

    // ── Index / scroll ──────────────────────────────────────────────

    #[test]
    fn linefeed_at_bottom_scrolls_into_history() {
        let mut s = screen(2, 3);
        feed_text(&mut s, "aa\r\nbb");
        s.execute_control(0x0A);
        assert_eq!(s.grid().history_count(), 1);
        assert_eq!(s.grid().line_at(-1).unwrap().text(), "aa");
        assert_eq!(s.line_text(0), "bb");
    }

    #[test]
    fn margin_scroll_on_index() {
        // DECSTBM + LF at margin bottom: lines inside the margin rotate,
        // outside lines stay.
        let mut s = screen(5, 5);
        for i in 0..5 {
            csi(&mut s, &format!("{};1H", i + 1));
            feed_text(&mut s, &i.to_string());
        }
        csi(&mut s, "2;4r");
        csi(&mut s, "4;1H");
        s.execute_control(0x0A);
        assert_eq!(s.line_text(0), "0");
        assert_eq!(s.line_text(1), "2");
        assert_eq!(s.line_text(2), "3");
        assert_eq!(s.line_text(3), "");
        assert_eq!(s.line_text(4), "4");
        assert_eq!(s.grid().history_count(), 0);
    }

    #[test]
    fn reverse_index_at_top_scrolls_down() {
        let mut s = screen(3, 3);
        feed_text(&mut s, "aa");
        csi(&mut s, "1;1H");
        let mut seq = Sequence::default();
        seq.reset(crate::sequence::SequenceCategory::Esc);
        seq.final_byte = b'M';
        s.apply(&seq);
        assert_eq!(s.line_text(0), "");
        assert_eq!(s.line_text(1), "aa");
    }

    #[test]
    fn decbi_decfi_shift_at_margin_edges() {
        let mut s = screen(1, 4);
        feed_text(&mut s, "abcd");
        csi(&mut s, "1;1H");
        let mut seq = Sequence::default();
        seq.reset(crate::sequence::SequenceCategory::Esc);
        seq.final_byte = b'6'; // DECBI at left margin
        s.apply(&seq);
        assert_eq!(s.line_text(0), " abc");
    }

    // ── Erase / edit ────────────────────────────────────────────────

    #[test]
    fn erase_below_from_cursor() {
        let mut s = screen(3, 3);
        feed_text(&mut s, "aaa\r\nbbb\r\nccc");
        csi(&mut s, "2;2H");
        csi(&mut s, "J");
        assert_eq!(s.line_text(0), "aaa");
        assert_eq!(s.line_text(1), "b");
        assert_eq!(s.line_text(2), "");
    }

    #[test]
    fn erase_above_inclusive() {
        let mut s = screen(3, 3);
        feed_text(&mut s, "aaa\r\nbbb\r\nccc");
        csi(&mut s, "2;2H");
        csi(&mut s, "1J");
        assert_eq!(s.line_text(0), "");
        assert_eq!(s.line_text(1), "  b");
        assert_eq!(s.line_text(2), "ccc");
    }

    #[test]
    fn erase_all_and_scrollback() {
        let mut s = screen(2, 3);
        feed_text(&mut s, "aa\r\nbb\r\ncc");
        assert_eq!(s.grid().history_count(), 1);
        csi(&mut s, "2J");
        assert_eq!(s.line_text(0), "");
        assert_eq!(s.grid().history_count(), 1, "ED 2 keeps scrollback");
        csi(&mut s, "3J");
        assert_eq!(s.grid().history_count(), 0, "ED 3 clears scrollback");
    }

    #[test]
    fn erase_uses_current_background() {
        let mut s = screen(1, 4);
        csi(&mut s, "44m");
        csi(&mut s, "2J");
        let cell = s.grid().cell(CellLocation::new(0, 2)).unwrap();
        assert_eq!(cell.bg, Color::Indexed(4));
    }

    #[test]
    fn selective_erase_skips_protected() {
        let mut s = screen(1, 6);
        csi(&mut s, "1\"q"); // DECSCA protect
        feed_text(&mut s, "ab");
        csi(&mut s, "0\"q");
        feed_text(&mut s, "cd");
        csi(&mut s, "1;1H");
        csi(&mut s, "?2K"); // DECSEL entire line
        assert_eq!(s.line_text(0), "ab");
    }

    #[test]
    fn plain_erase_ignores_protection() {
        let mut s = screen(1, 6);
        csi(&mut s, "1\"q");
        feed_text(&mut s, "ab");
        csi(&mut s, "2K");
        assert_eq!(s.line_text(0), "");
    }

    #[test]
    fn ich_dch_ech() {
        let mut s = screen(1, 6);
        feed_text(&mut s, "abcdef");
        csi(&mut s, "1;2H");
        csi(&mut s, "2@");
        assert_eq!(s.line_text(0), "a  bcd");
        csi(&mut s, "2P");
        assert_eq!(s.line_text(0), "abcd");
        csi(&mut s, "2X");
        assert_eq!(s.line_text(0), "a  d");
    }

    #[test]
    fn il_dl_within_margins() {
        let mut s = screen(4, 2);
        feed_text(&mut s, "aa\r\nbb\r\ncc\r\ndd");
        csi(&mut s, "2;3r");
        csi(&mut s, "2;1H");
        csi(&mut s, "1L");
        assert_eq!(s.line_text(0), "aa");
        assert_eq!(s.line_text(1), "");
        assert_eq!(s.line_text(2), "bb");
        assert_eq!(s.line_text(3), "dd");
        csi(&mut s, "1M");
        assert_eq!(s.line_text(1), "bb");
        assert_eq!(s.line_text(2), "");
    }

    #[test]
    fn rep_repeats_last_graphic() {
        let mut s = screen(1, 10);
        feed_text(&mut s, "x");
        csi(&mut s, "3b");
        assert_eq!(s.line_text(0), "xxxx");
    }

    // ── SGR ─────────────────────────────────────────────────────────

    #[test]
    fn sgr_roundtrip_with_rgb() {
        let mut s = screen(1, 5);
        csi(&mut s, "1;38;2;10;20;30m");
        feed_text(&mut s, "X");
        let cell = s.grid().cell(CellLocation::new(0, 0)).unwrap();
        assert!(cell.flags.contains(CellFlags::BOLD));
        assert_eq!(cell.fg, Color::Rgb(10, 20, 30));
        assert_eq!(s.cursor().position.column, 1);
        csi(&mut s, "0m");
        feed_text(&mut s, "Y");
        let cell = s.grid().cell(CellLocation::new(0, 1)).unwrap();
        assert_eq!(cell.attrs(), SgrAttrs::default());
    }

    // ── Save / restore ──────────────────────────────────────────────

    #[test]
    fn save_restore_cursor_roundtrip() {
        let mut s = screen(5, 10);
        csi(&mut s, "3;4H");
        csi(&mut s, "1m");
        let mut seq = Sequence::default();
        seq.reset(crate::sequence::SequenceCategory::Esc);
        seq.final_byte = b'7';
        s.apply(&seq);
        csi(&mut s, "1;1H");
        csi(&mut s, "0m");
        seq.final_byte = b'8';
        s.apply(&seq);
        assert_eq!(s.cursor().position, CellLocation::new(2, 3));
        assert!(s.cursor().attrs.flags.contains(CellFlags::BOLD));
    }

    #[test]
    fn nested_save_restore() {
        let mut s = screen(5, 10);
        let mut esc = |screen: &mut Screen, byte: u8| {
            let mut seq = Sequence::default();
            seq.reset(crate::sequence::SequenceCategory::Esc);
            seq.final_byte = byte;
            screen.apply(&seq);
        };
        for i in 0..3u16 {
            csi(&mut s, &format!("{};1H", i + 1));
            esc(&mut s, b'7');
        }
        for i in (0..3u16).rev() {
            esc(&mut s, b'8');
            assert_eq!(s.cursor().position.line, i);
        }
    }

    // ── Device reports ──────────────────────────────────────────────

    #[test]
    fn cursor_position_report() {
        let mut s = screen(10, 10);
        csi(&mut s, "4;8H");
        csi(&mut s, "6n");
        assert_eq!(s.take_replies(), b"\x1b[4;8R");
    }

    #[test]
    fn cursor_position_report_origin_relative() {
        let mut s = screen(10, 10);
        csi(&mut s, "3;8r");
        s.set_dec_mode(6, true);
        csi(&mut s, "2;2H");
        csi(&mut s, "6n");
        assert_eq!(s.take_replies(), b"\x1b[2;2R");
    }

    #[test]
    fn extended_cpr_includes_page() {
        let mut s = screen(5, 5);
        csi(&mut s, "2;3H");
        csi(&mut s, "?6n");
        assert_eq!(s.take_replies(), b"\x1b[?2;3;1R");
    }

    #[test]
    fn dsr_status_ok() {
        let mut s = screen(2, 2);
        csi(&mut s, "5n");
        assert_eq!(s.take_replies(), b"\x1b[0n");
    }

    #[test]
    fn da1_da2_reports() {
        let mut s = screen(2, 2);
        csi(&mut s, "c");
        let reply = s.take_replies();
        assert!(reply.starts_with(b"\x1b[?65;"));
        csi(&mut s, ">c");
        assert_eq!(s.take_replies(), b"\x1b[>65;10;0c");
    }

    #[test]
    fn decrqm_reports_mode_state() {
        let mut s = screen(2, 2);
        csi(&mut s, "?7$p");
        assert_eq!(s.take_replies(), b"\x1b[?7;1$y");
        s.set_dec_mode(7, false);
        csi(&mut s, "?7$p");
        assert_eq!(s.take_replies(), b"\x1b[?7;2$y");
        csi(&mut s, "?9999$p");
        assert_eq!(s.take_replies(), b"\x1b[?9999;0$y");
        csi(&mut s, "4$p");
        assert_eq!(s.take_replies(), b"\x1b[4;2$y");
    }

    #[test]
    fn window_report_text_area() {
        let mut s = screen(24, 80);
        csi(&mut s, "18t");
        assert_eq!(s.take_replies(), b"\x1b[8;24;80t");
    }

    #[test]
    fn title_stack_push_pop() {
        let mut s = screen(2, 2);
        s.apply_osc(b"2;first");
        csi(&mut s, "22t");
        s.apply_osc(b"2;second");
        csi(&mut s, "23t");
        assert_eq!(s.window_title(), "first");
    }

    // ── Mode save/restore (XTSAVE/XTRESTORE) ────────────────────────

    #[test]
    fn xtsave_xtrestore_roundtrip() {
        let mut s = screen(2, 2);
        s.set_dec_mode(2004, true);
        csi(&mut s, "?2004s");
        s.set_dec_mode(2004, false);
        assert!(!s.modes().dec(DecMode::BracketedPaste));
        csi(&mut s, "?2004r");
        assert!(s.modes().dec(DecMode::BracketedPaste));
    }

    // ── Alternate screen ────────────────────────────────────────────

    #[test]
    fn mode_1049_saves_switches_and_restores() {
        let mut s = screen(3, 10);
        feed_text(&mut s, "primary");
        csi(&mut s, "3;4H");
        let before: Vec<String> = (0..3).map(|l| s.line_text(l)).collect();

        s.set_dec_mode(1049, true);
        assert_eq!(s.active_screen(), ScreenType::Alternate);
        assert_eq!(s.line_text(0), "", "alternate starts cleared");
        feed_text(&mut s, "ALT CONTENT");

        s.set_dec_mode(1049, false);
        assert_eq!(s.active_screen(), ScreenType::Primary);
        let after: Vec<String> = (0..3).map(|l| s.line_text(l)).collect();
        assert_eq!(before, after);
        assert_eq!(s.cursor().position, CellLocation::new(2, 3));
        assert_eq!(s.grid().history_count(), 0, "alt content never hits scrollback");
    }

    #[test]
    fn mode_47_switches_without_clear() {
        let mut s = screen(2, 6);
        s.set_dec_mode(47, true);
        feed_text(&mut s, "altalt");
        s.set_dec_mode(47, false);
        s.set_dec_mode(47, true);
        assert_eq!(s.line_text(0), "altalt", "47 does not clear");
    }

    #[test]
    fn mode_1047_clears_alt_on_leave() {
        let mut s = screen(2, 6);
        s.set_dec_mode(1047, true);
        feed_text(&mut s, "altalt");
        s.set_dec_mode(1047, false);
        s.set_dec_mode(1047, true);
        assert_eq!(s.line_text(0), "", "1047 clears on leave");
    }

    #[test]
    fn alternate_screen_has_no_scrollback() {
        let mut s = screen(2, 3);
        s.set_dec_mode(1049, true);
        feed_text(&mut s, "aa\r\nbb\r\ncc\r\ndd");
        assert_eq!(s.grid().history_count(), 0);
    }

    // ── Rectangles ──────────────────────────────────────────────────

    #[test]
    fn decfra_fills_rect() {
        let mut s = screen(4, 6);
        csi(&mut s, "42;2;2;3;4$x"); // '*' = 42
        assert_eq!(s.line_text(0), "");
        assert_eq!(s.line_text(1), " ***");
        assert_eq!(s.line_text(2), " ***");
        assert_eq!(s.line_text(3), "");
    }

    #[test]
    fn decfra_rejects_control_chars() {
        let mut s = screen(2, 4);
        assert_eq!(csi(&mut s, "7;1;1;2;2$x"), SequenceResult::Invalid);
    }

    #[test]
    fn decera_erases_rect() {
        let mut s = screen(3, 4);
        feed_text(&mut s, "aaaa\r\nbbbb\r\ncccc");
        csi(&mut s, "2;2;2;3$z");
        assert_eq!(s.line_text(1), "b  b");
    }

    #[test]
    fn deccra_copies_rect_with_overlap() {
        let mut s = screen(2, 6);
        feed_text(&mut s, "abcde");
        // Copy columns 1..=3 of line 1 onto columns 2..=4 (overlapping).
        csi(&mut s, "1;1;1;3;1;1;2;1$v");
        assert_eq!(s.line_text(0), "aabce");
    }

    #[test]
    fn deccara_changes_attributes_in_rect() {
        let mut s = screen(2, 5);
        feed_text(&mut s, "abcde");
        csi(&mut s, "1;2;1;4;1$r");
        let outside = s.grid().cell(CellLocation::new(0, 0)).unwrap();
        let inside = s.grid().cell(CellLocation::new(0, 2)).unwrap();
        assert!(!outside.flags.contains(CellFlags::BOLD));
        assert!(inside.flags.contains(CellFlags::BOLD));
        assert_eq!(inside.content(), 'c', "content is preserved");
    }

    // ── DECSTBM / DECSLRM ───────────────────────────────────────────

    #[test]
    fn decstbm_homes_cursor() {
        let mut s = screen(10, 10);
        csi(&mut s, "5;5H");
        csi(&mut s, "2;8r");
        assert_eq!(s.cursor().position, CellLocation::new(0, 0));
        assert_eq!(s.margin().top, 1);
        assert_eq!(s.margin().bottom, 7);
    }

    #[test]
    fn invalid_decstbm_is_rejected() {
        let mut s = screen(10, 10);
        assert_eq!(csi(&mut s, "8;2r"), SequenceResult::Invalid);
        assert_eq!(s.margin().top, 0);
    }

    #[test]
    fn decslrm_requires_mode_69() {
        let mut s = screen(5, 10);
        assert_eq!(csi(&mut s, "2;8s"), SequenceResult::Invalid);
        s.set_dec_mode(69, true);
        assert_eq!(csi(&mut s, "2;8s"), SequenceResult::Ok);
        assert_eq!(s.margin().left, 1);
        assert_eq!(s.margin().right, 7);
    }

    // ── Status line ─────────────────────────────────────────────────

    #[test]
    fn host_writable_status_line_receives_text() {
        let mut s = screen(3, 10);
        s.set_status_display_type(2);
        s.select_active_display(1);
        feed_text(&mut s, "status");
        assert_eq!(s.status_grid().line_text(0), "status");
        assert_eq!(s.line_text(0), "", "main grid untouched");
        s.select_active_display(0);
        feed_text(&mut s, "main");
        assert_eq!(s.line_text(0), "main");
    }

    #[test]
    fn status_line_requires_host_writable() {
        let mut s = screen(2, 5);
        s.set_status_display_type(1);
        assert_eq!(s.select_active_display(1), SequenceResult::Invalid);
    }

    // ── OSC ─────────────────────────────────────────────────────────

    #[test]
    fn osc_title_event() {
        let mut s = screen(2, 2);
        s.apply_osc(b"0;my title");
        assert_eq!(s.window_title(), "my title");
        assert!(s
            .take_events()
            .contains(&ScreenEvent::SetWindowTitle("my title".into())));
    }

    #[test]
    fn osc_hyperlink_sets_and_clears() {
        let mut s = screen(1, 20);
        s.apply_osc(b"8;;https://example.com");
        feed_text(&mut s, "link");
        s.apply_osc(b"8;;");
        feed_text(&mut s, "x");
        let linked = s.grid().cell(CellLocation::new(0, 0)).unwrap();
        let plain = s.grid().cell(CellLocation::new(0, 4)).unwrap();
        assert_ne!(linked.hyperlink, 0);
        assert_eq!(
            s.hyperlinks().uri(linked.hyperlink),
            Some("https://example.com")
        );
        assert_eq!(plain.hyperlink, 0);
    }

    #[test]
    fn osc_hyperlink_id_parameter() {
        let mut s = screen(1, 20);
        s.apply_osc(b"8;id=foo;https://a.test");
        let first = s.cursor().hyperlink;
        s.apply_osc(b"8;id=bar;https://a.test");
        let second = s.cursor().hyperlink;
        assert_ne!(first, second);
    }

    #[test]
    fn osc_palette_query_and_set() {
        let mut s = screen(1, 2);
        s.apply_osc(b"4;1;#102030");
        assert_eq!(s.palette().indexed(1), RgbColor::new(0x10, 0x20, 0x30));
        s.apply_osc(b"4;1;?");
        assert_eq!(s.take_replies(), b"\x1b]4;1;rgb:1010/2020/3030\x1b\\");
    }

    #[test]
    fn osc_dynamic_color_roundtrip() {
        let mut s = screen(1, 2);
        s.apply_osc(b"10;#ffffff");
        s.apply_osc(b"10;?");
        assert_eq!(s.take_replies(), b"\x1b]10;rgb:ffff/ffff/ffff\x1b\\");
        s.apply_osc(b"110;");
        assert_eq!(
            s.palette().default_foreground,
            ColorPalette::new().default_foreground
        );
    }

    #[test]
    fn osc_clipboard_decodes_base64() {
        let mut s = screen(1, 2);
        s.apply_osc(b"52;c;aGVsbG8=");
        assert!(s
            .take_events()
            .contains(&ScreenEvent::CopyToClipboard(b"hello".to_vec())));
    }

    #[test]
    fn osc_notify_event() {
        let mut s = screen(1, 2);
        s.apply_osc(b"777;notify;Title;Body text");
        assert!(s.take_events().contains(&ScreenEvent::Notify {
            title: "Title".into(),
            body: "Body text".into()
        }));
    }

    #[test]
    fn osc_capture_buffer_requests_permission_then_replies() {
        let mut s = screen(2, 5);
        feed_text(&mut s, "one\r\ntwo");
        s.apply_osc(b"314;0;2");
        assert!(s
            .take_events()
            .contains(&ScreenEvent::RequestCaptureBuffer {
                lines: 2,
                logical: false
            }));
        assert!(s.take_replies().is_empty(), "no reply before permission");

        s.capture_buffer(2, false);
        let reply = String::from_utf8(s.take_replies()).unwrap();
        assert!(reply.starts_with("\x1b^314;"));
        assert!(reply.contains("one\ntwo\n"));
        assert!(reply.ends_with("\x1b^314;\x1b\\"));
    }

    // ── DCS ─────────────────────────────────────────────────────────

    fn dcs(screen: &mut Screen, intermediates: &[u8], final_byte: u8, payload: &[u8]) {
        let mut seq = Sequence::default();
        seq.reset(crate::sequence::SequenceCategory::Dcs);
        seq.intermediates.extend_from_slice(intermediates);
        seq.final_byte = final_byte;
        screen.hook(&seq);
        for &b in payload {
            screen.dcs_put(b);
        }
        screen.dcs_unhook();
    }

    #[test]
    fn decrqss_sgr_reply() {
        let mut s = screen(2, 5);
        csi(&mut s, "1;31m");
        dcs(&mut s, b"$", b'q', b"m");
        let reply = String::from_utf8(s.take_replies()).unwrap();
        assert_eq!(reply, "\x1bP1$r0;1;31m\x1b\\");
    }

    #[test]
    fn decrqss_margins_reply() {
        let mut s = screen(10, 10);
        csi(&mut s, "2;8r");
        dcs(&mut s, b"$", b'q', b"r");
        assert_eq!(s.take_replies(), b"\x1bP1$r2;8r\x1b\\");
    }

    #[test]
    fn decrqss_unknown_is_negative() {
        let mut s = screen(2, 5);
        dcs(&mut s, b"$", b'q', b"zz");
        assert_eq!(s.take_replies(), b"\x1bP0$r\x1b\\");
    }

    #[test]
    fn xtgettcap_known_and_unknown() {
        let mut s = screen(2, 5);
        // "TN" hex-encoded is 544E.
        dcs(&mut s, b"+", b'q', b"544E");
        let reply = String::from_utf8(s.take_replies()).unwrap();
        assert!(reply.starts_with("\x1bP1+r544E="));
        dcs(&mut s, b"+", b'q', b"5A5A");
        assert_eq!(s.take_replies(), b"\x1bP0+r\x1b\\");
    }

    #[test]
    fn sixel_image_attaches_fragments() {
        let mut s = screen(5, 10);
        // A 2-wide, 6-tall red bar.
        dcs(&mut s, b"", b'q', b"#2;2;100;0;0#2!2~");
        assert_eq!(s.images().len(), 1);
        let cell = s.grid().cell(CellLocation::new(0, 0)).unwrap();
        assert!(cell.fragment().is_some());
    }

    #[test]
    fn oversized_sixel_is_rejected() {
        let mut settings = Settings::default();
        settings.page_size = PageSize::new(5, 10);
        settings.max_image_size = ImageSize::new(4, 4);
        let mut s = Screen::new(settings);
        dcs(&mut s, b"", b'q', b"!9~");
        assert_eq!(s.images().len(), 0);
    }

    #[test]
    fn erasing_image_cells_releases_fragments() {
        let mut s = screen(5, 10);
        dcs(&mut s, b"", b'q', b"~"); // 1x6 image -> 1 cell at 8x16 cells
        assert_eq!(s.images().len(), 1);
        csi(&mut s, "1;1H");
        csi(&mut s, "2J");
        assert_eq!(s.images().len(), 0);
        assert!(s
            .take_events()
            .iter()
            .any(|e| matches!(e, ScreenEvent::DiscardImage(_))));
    }

    // ── Resets ──────────────────────────────────────────────────────

    #[test]
    fn hard_reset_restores_defaults() {
        let mut s = screen(3, 5);
        feed_text(&mut s, "abc");
        csi(&mut s, "1m");
        csi(&mut s, "2;3r");
        s.set_dec_mode(6, true);
        s.hard_reset();
        assert_eq!(s.line_text(0), "");
        assert_eq!(s.cursor().position, CellLocation::new(0, 0));
        assert_eq!(s.cursor().attrs, SgrAttrs::default());
        assert!(!s.modes().origin_mode());
        assert_eq!(s.margin(), Margin::full(PageSize::new(3, 5)));
        assert_eq!(s.grid().history_count(), 0);
    }

    #[test]
    fn soft_reset_preserves_content_and_cursor() {
        let mut s = screen(3, 5);
        feed_text(&mut s, "abc");
        csi(&mut s, "2;3r");
        csi(&mut s, "1m");
        s.soft_reset();
        assert_eq!(s.line_text(0), "abc", "content survives DECSTR");
        assert_eq!(s.cursor().position.column, 3, "cursor position survives");
        assert_eq!(s.cursor().attrs, SgrAttrs::default());
        assert_eq!(s.margin(), Margin::full(PageSize::new(3, 5)));
    }

    // ── Resize ──────────────────────────────────────────────────────

    #[test]
    fn resize_reflows_primary() {
        let mut s = screen(3, 6);
        feed_text(&mut s, "abcdefgh");
        s.resize(PageSize::new(3, 4));
        assert_eq!(s.line_text(0), "abcd");
        assert_eq!(s.line_text(1), "efgh");
    }

    #[test]
    fn resize_clamps_cursor_and_resets_margins() {
        let mut s = screen(5, 10);
        csi(&mut s, "2;4r");
        csi(&mut s, "5;10H");
        s.resize(PageSize::new(3, 6));
        assert!(s.cursor().position.line < 3);
        assert!(s.cursor().position.column < 6);
        assert_eq!(s.margin(), Margin::full(PageSize::new(3, 6)));
    }

    // ── Helpers under test ──────────────────────────────────────────

    #[test]
    fn base64_decoder_handles_padding() {
        assert_eq!(decode_base64(b"aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64(b"aGk=").unwrap(), b"hi");
        assert_eq!(decode_base64(b"aA==").unwrap(), b"h");
        assert_eq!(decode_base64(b"").unwrap(), b"");
        assert!(decode_base64(b"!!!").is_none());
    }

    #[test]
    fn hex_codec_roundtrip() {
        assert_eq!(decode_hex("544E").unwrap(), b"TN");
        assert_eq!(encode_hex(b"TN"), "544E");
        assert!(decode_hex("5").is_none());
    }
}
