//! The terminal orchestrator.
//!
//! Owns the whole pipeline: pinned input buffers fed from the PTY, the
//! parser → sequencer → screen chain, the render double buffer, the input
//! generator, and the vi-mode overlay. The I/O loop reads one bounded chunk
//! per iteration, applies it under whatever lock the host wraps the terminal
//! in, forwards screen side effects to the host callbacks, flushes replies
//! back to the PTY, and schedules a render refresh.

use std::time::Duration;

use tracing::{debug, warn};

use crate::buffer::BufferObjectPool;
use crate::geometry::{CellLocation, PageSize, PixelSize};
use crate::grid::LogicalLine;
use crate::input::{
    InputGenerator, Key, Modifiers, MouseButton, MouseProtocol, MouseTransport, WheelMode,
};
use crate::line::LineFlags;
use crate::modes::DecMode;
use crate::parser::Parser;
use crate::pty::{Pty, ReadOutcome, TerminalEvents};
use crate::render::{RenderDoubleBuffer, RenderFrontBuffer};
use crate::screen::{Screen, ScreenEvent};
use crate::sequencer::Sequencer;
use crate::settings::Settings;
use crate::vi_commands::{ViCommands, ViContext};
use crate::vi_mode::ViInputHandler;
use crate::viewport::Viewport;

/// Reply bytes we are willing to queue before pausing input processing.
const MAX_UNFLUSHED_REPLY: usize = 1 << 20;

/// How the I/O loop advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Process everything as it arrives.
    #[default]
    Normal,
    /// Halted; `step()` or `set_execution_mode` resumes.
    Waiting,
    /// Halt after every dispatched sequence.
    SingleStep,
    /// Halt once the parser has no pending bytes.
    BreakAtEmptyQueue,
}

/// Result of one `process_available` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Bytes were read and applied.
    Processed(usize),
    Timeout,
    /// The wake-up channel fired (shutdown or host nudge).
    Wakeup,
    /// The PTY is gone.
    Closed,
    /// Execution is halted (`Waiting`) or back-pressure is active.
    Halted,
}

/// The terminal core.
pub struct Terminal<P: Pty, E: TerminalEvents> {
    pty: P,
    events: E,
    settings: Settings,
    screen: Screen,
    parser: Parser,
    sequencer: Sequencer,
    pool: BufferObjectPool,
    render: RenderDoubleBuffer,
    input: InputGenerator,
    vi: ViInputHandler,
    vi_commands: ViCommands,
    viewport: Viewport,
    execution_mode: ExecutionMode,
    terminating: bool,
    /// Bytes held back by single-stepping.
    stashed_input: Vec<u8>,
    /// Reply bytes a partial PTY write left behind.
    unflushed: Vec<u8>,
}

impl<P: Pty, E: TerminalEvents> Terminal<P, E> {
    pub fn new(pty: P, events: E, settings: Settings) -> Self {
        let settings = settings.normalized();
        Self {
            screen: Screen::new(settings.clone()),
            pool: BufferObjectPool::new(settings.pty_buffer_object_size),
            parser: Parser::new(),
            sequencer: Sequencer::new(),
            render: RenderDoubleBuffer::new(),
            input: InputGenerator::new(),
            vi: ViInputHandler::new(),
            vi_commands: ViCommands::new(),
            viewport: Viewport::new(0),
            execution_mode: ExecutionMode::Normal,
            terminating: false,
            stashed_input: Vec::new(),
            unflushed: Vec::new(),
            pty,
            events,
            settings,
        }
    }

    pub fn start(&mut self) -> std::io::Result<()> {
        self.pty.start()
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn vi_mode(&self) -> &ViInputHandler {
        &self.vi
    }

    pub fn vi_commands(&self) -> &ViCommands {
        &self.vi_commands
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn instruction_counter(&self) -> u64 {
        self.sequencer.instruction_counter()
    }

    /// Render-thread handle to the front buffer.
    pub fn render_handle(&self) -> RenderFrontBuffer {
        self.render.front_handle()
    }

    pub fn pty(&self) -> &P {
        &self.pty
    }

    pub fn pty_mut(&mut self) -> &mut P {
        &mut self.pty
    }

    // ── The I/O loop ────────────────────────────────────────────────

    /// Run until the PTY closes or `shutdown` is requested.
    pub fn run(&mut self) {
        let timeout = self.settings.refresh_interval();
        while !self.terminating {
            match self.process_available(timeout) {
                ProcessOutcome::Closed => break,
                ProcessOutcome::Wakeup if self.terminating => break,
                ProcessOutcome::Halted => {
                    // Waiting mode or back-pressure: don't spin.
                    std::thread::sleep(Duration::from_millis(5));
                }
                _ => {}
            }
            self.refresh_render_buffer(true);
        }
        self.pty.close();
        self.events.on_closed();
    }

    /// Ask the I/O loop to exit. The wakeup interrupts a blocking read so
    /// the loop notices promptly.
    pub fn shutdown(&mut self) {
        self.terminating = true;
        self.pty.wakeup_reader();
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// One read-and-apply cycle, bounded by `timeout`.
    pub fn process_available(&mut self, timeout: Duration) -> ProcessOutcome {
        if self.execution_mode == ExecutionMode::Waiting {
            return ProcessOutcome::Halted;
        }
        if self.unflushed.len() > MAX_UNFLUSHED_REPLY {
            // Back-pressure: no further sequences until replies drain.
            self.flush_replies();
            if self.unflushed.len() > MAX_UNFLUSHED_REPLY {
                return ProcessOutcome::Halted;
            }
        }
        if !self.stashed_input.is_empty() {
            let stashed = std::mem::take(&mut self.stashed_input);
            let n = stashed.len();
            self.apply_bytes_stepped(&stashed);
            self.post_process();
            return ProcessOutcome::Processed(n);
        }

        let mut chunk = self.pool.acquire();
        let max = self.settings.pty_read_buffer_size;
        let outcome = {
            let buffer = match std::sync::Arc::get_mut(&mut chunk) {
                Some(buffer) => buffer.as_mut_slice(),
                None => return ProcessOutcome::Halted,
            };
            self.pty.read(buffer, timeout, max)
        };
        match outcome {
            Ok(ReadOutcome::Data { len, fast_pipe }) => {
                debug!(len, fast_pipe, "pty chunk");
                match self.execution_mode {
                    ExecutionMode::Normal | ExecutionMode::BreakAtEmptyQueue => {
                        let slice_chunk = chunk.clone();
                        self.sequencer.process(
                            &mut self.parser,
                            &mut self.screen,
                            &slice_chunk[..len],
                            Some((&slice_chunk, 0)),
                        );
                        self.pool.retain(chunk);
                        if self.execution_mode == ExecutionMode::BreakAtEmptyQueue
                            && self.parser.is_ground()
                        {
                            self.execution_mode = ExecutionMode::Waiting;
                        }
                    }
                    ExecutionMode::SingleStep => {
                        let bytes: Vec<u8> = chunk[..len].to_vec();
                        self.apply_bytes_stepped(&bytes);
                    }
                    ExecutionMode::Waiting => unreachable!("checked above"),
                }
                self.post_process();
                ProcessOutcome::Processed(len)
            }
            Ok(ReadOutcome::Timeout) => ProcessOutcome::Timeout,
            Ok(ReadOutcome::Wakeup) => ProcessOutcome::Wakeup,
            Ok(ReadOutcome::Closed) => ProcessOutcome::Closed,
            Err(error) => {
                warn!(%error, "pty read failed, shutting down");
                self.terminating = true;
                ProcessOutcome::Closed
            }
        }
    }

    /// Feed bytes one at a time, stopping after the first dispatched
    /// sequence when single-stepping.
    fn apply_bytes_stepped(&mut self, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let dispatched =
                self.sequencer
                    .process_byte(&mut self.parser, &mut self.screen, byte);
            if dispatched > 0 && self.execution_mode == ExecutionMode::SingleStep {
                self.stashed_input = bytes[i + 1..].to_vec();
                self.execution_mode = ExecutionMode::Waiting;
                return;
            }
        }
        if self.execution_mode == ExecutionMode::BreakAtEmptyQueue && self.parser.is_ground() {
            self.execution_mode = ExecutionMode::Waiting;
        }
    }

    /// Inject bytes as if they came from the PTY (tests, local echo).
    pub fn write_to_screen(&mut self, bytes: &[u8]) {
        self.sequencer
            .process(&mut self.parser, &mut self.screen, bytes, None);
        self.post_process();
    }

    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.execution_mode = mode;
    }

    /// Resume one step while halted.
    pub fn step(&mut self) {
        if self.execution_mode == ExecutionMode::Waiting {
            self.execution_mode = ExecutionMode::SingleStep;
            if !self.stashed_input.is_empty() {
                let stashed = std::mem::take(&mut self.stashed_input);
                self.apply_bytes_stepped(&stashed);
                self.post_process();
            }
        }
    }

    /// Post-batch work: mode sync, event forwarding, reply flush, render.
    fn post_process(&mut self) {
        self.sync_input_modes();
        self.forward_screen_events();
        self.flush_replies();
        self.render.schedule_refresh();
        self.events.screen_updated();
    }

    /// Mirror the screen's mode set into the input generator.
    fn sync_input_modes(&mut self) {
        let modes = self.screen.modes();
        self.input.application_cursor_keys = modes.dec(DecMode::ApplicationCursorKeys);
        self.input.application_keypad = self.screen.application_keypad();
        self.input.bracketed_paste = modes.dec(DecMode::BracketedPaste);
        self.input.focus_tracking = modes.dec(DecMode::FocusTracking);
        self.input.passive_tracking = modes.dec(DecMode::MousePassiveTracking);

        self.input.mouse_protocol = if modes.dec(DecMode::MouseProtocolAny) {
            Some(MouseProtocol::Any)
        } else if modes.dec(DecMode::MouseProtocolButton) {
            Some(MouseProtocol::Button)
        } else if modes.dec(DecMode::MouseProtocolNormal) {
            Some(MouseProtocol::Normal)
        } else if modes.dec(DecMode::MouseProtocolX10) {
            Some(MouseProtocol::X10)
        } else {
            None
        };
        self.input.mouse_transport = if modes.dec(DecMode::MouseSgrPixels) {
            MouseTransport::SgrPixels
        } else if modes.dec(DecMode::MouseSgr) {
            MouseTransport::Sgr
        } else if modes.dec(DecMode::MouseUrxvt) {
            MouseTransport::Urxvt
        } else {
            MouseTransport::Default
        };
        let on_alt = self.screen.active_screen() == crate::screen::ScreenType::Alternate;
        self.input.wheel_mode = if on_alt && modes.dec(DecMode::MouseAlternateScroll) {
            if modes.dec(DecMode::ApplicationCursorKeys) {
                WheelMode::ApplicationCursorKeys
            } else {
                WheelMode::NormalCursorKeys
            }
        } else {
            WheelMode::Default
        };
    }

    fn forward_screen_events(&mut self) {
        for event in self.screen.take_events() {
            match event {
                ScreenEvent::Bell => self.events.bell(),
                ScreenEvent::SetWindowTitle(title) => self.events.set_window_title(&title),
                ScreenEvent::CopyToClipboard(bytes) => self.events.copy_to_clipboard(&bytes),
                ScreenEvent::Notify { title, body } => self.events.notify(&title, &body),
                ScreenEvent::BufferChanged(screen_type) => {
                    self.viewport.scroll_to_bottom();
                    self.events.buffer_changed(screen_type);
                }
                ScreenEvent::DiscardImage(handle) => self.events.discard_image(handle),
                ScreenEvent::CursorStyleChanged => self.events.cursor_style_changed(),
                ScreenEvent::ColorPaletteUpdated => self.events.color_palette_updated(),
                ScreenEvent::ResizeRequest(size) => self.events.resize_requested(size),
                ScreenEvent::HardReset => {
                    self.input.reset();
                    self.execution_mode = ExecutionMode::Normal;
                    self.viewport.scroll_to_bottom();
                }
                ScreenEvent::RequestCaptureBuffer { lines, logical } => {
                    self.events.request_capture_buffer(lines, logical);
                    if self
                        .events
                        .request_permission(crate::pty::PermissionKind::CaptureBuffer, "osc-314")
                    {
                        self.screen.capture_buffer(lines, logical);
                    }
                }
            }
        }
    }

    /// Flush queued replies to the PTY; a partial write is retried once, and
    /// whatever still remains waits for the next flush.
    fn flush_replies(&mut self) {
        let mut outgoing = std::mem::take(&mut self.unflushed);
        outgoing.extend(self.screen.take_replies());
        outgoing.extend(self.input.take());
        if outgoing.is_empty() {
            return;
        }
        let mut written = 0;
        for _attempt in 0..2 {
            match self.pty.write(&outgoing[written..]) {
                Ok(n) => {
                    written += n;
                    if written == outgoing.len() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, "pty write failed, dropping replies");
                    return;
                }
            }
        }
        if written < outgoing.len() {
            self.unflushed = outgoing.split_off(written);
        }
    }

    // ── Render ──────────────────────────────────────────────────────

    /// Rebuild/swap the render snapshot if content changed. `cursor_phase`
    /// is the blink phase from the host's timer.
    pub fn refresh_render_buffer(&mut self, cursor_phase: bool) -> bool {
        let swapped = self.render.refresh(&self.screen, cursor_phase);
        if swapped {
            self.events.render_buffer_updated();
        }
        swapped
    }

    // ── Host input ──────────────────────────────────────────────────

    /// A printable character (with modifiers) from the keyboard.
    pub fn send_char(&mut self, ch: char, modifiers: Modifiers) {
        if self.dispatch_vi(|vi, ctx| vi.on_char(ch, modifiers, ctx)) {
            return;
        }
        self.viewport.scroll_to_bottom();
        self.input.generate_char(ch, modifiers);
        self.flush_replies();
    }

    /// A function/navigation key.
    pub fn send_key(&mut self, key: Key, modifiers: Modifiers) {
        if self.dispatch_vi(|vi, ctx| vi.on_key(key, ctx)) {
            return;
        }
        self.viewport.scroll_to_bottom();
        self.input.generate_key(key, modifiers);
        self.flush_replies();
    }

    /// A bare control byte (Escape, Enter, Backspace).
    pub fn send_control(&mut self, byte: u8) {
        if self.dispatch_vi(|vi, ctx| vi.on_control(byte, ctx)) {
            return;
        }
        self.viewport.scroll_to_bottom();
        self.input.generate_char(byte as char, Modifiers::empty());
        self.flush_replies();
    }

    /// Route a key through the vi overlay; applies deferred side effects
    /// (mark toggles, paste, clipboard) that need the full terminal.
    fn dispatch_vi<F>(&mut self, dispatch: F) -> bool
    where
        F: FnOnce(&mut ViInputHandler, &mut ViContext<'_>) -> bool,
    {
        if !self.vi.is_active() {
            return false;
        }
        let (consumed, paste, mark, yanked) = {
            let mut ctx = ViContext::new(
                &mut self.vi_commands,
                &self.screen,
                &mut self.viewport,
                &self.settings,
            );
            let consumed = dispatch(&mut self.vi, &mut ctx);
            (
                consumed,
                ctx.paste_requested.take(),
                ctx.mark_toggle_requested,
                ctx.yanked.take(),
            )
        };
        if !consumed {
            return false;
        }
        if mark {
            self.toggle_line_mark();
        }
        if let Some(text) = yanked {
            self.events.copy_to_clipboard(text.as_bytes());
        }
        if let Some((count, _before)) = paste {
            let register = self.vi_commands.yank_register().to_string();
            for _ in 0..count {
                self.input.generate_paste(&register);
            }
            self.flush_replies();
        }
        self.render.schedule_refresh();
        true
    }

    /// Enter vi normal mode (host keybinding).
    pub fn enter_vi_mode(&mut self) {
        let mut ctx = ViContext::new(
            &mut self.vi_commands,
            &self.screen,
            &mut self.viewport,
            &self.settings,
        );
        self.vi.enter_normal_mode(&mut ctx);
        self.render.schedule_refresh();
    }

    /// Leave vi mode back to pass-through.
    pub fn leave_vi_mode(&mut self) {
        let mut ctx = ViContext::new(
            &mut self.vi_commands,
            &self.screen,
            &mut self.viewport,
            &self.settings,
        );
        self.vi.leave(&mut ctx);
        self.viewport.scroll_to_bottom();
        self.render.schedule_refresh();
    }

    /// Toggle the mark flag on the line under the vi cursor.
    pub fn toggle_line_mark(&mut self) {
        let offset = self.vi_commands.cursor.line;
        if let Some(line) = self.screen.grid_mut().line_at_mut(offset) {
            line.flags.toggle(LineFlags::MARKED);
        }
        self.render.schedule_refresh();
    }

    /// Paste text from the host clipboard.
    pub fn send_paste(&mut self, text: &str) {
        self.viewport.scroll_to_bottom();
        self.input.generate_paste(text);
        self.flush_replies();
    }

    /// Focus change from the windowing system.
    pub fn send_focus(&mut self, gained: bool) {
        self.input.generate_focus(gained);
        self.flush_replies();
    }

    /// Mouse press. Returns `true` when the event went to the application
    /// (not bypassed for host-side selection).
    pub fn send_mouse_press(
        &mut self,
        button: MouseButton,
        modifiers: Modifiers,
        pos: CellLocation,
        pixel_pos: (u32, u32),
    ) -> bool {
        if self.mouse_bypassed(modifiers) {
            return false;
        }
        let sent = self
            .input
            .generate_mouse_press(button, modifiers, pos, pixel_pos, false);
        self.flush_replies();
        sent
    }

    pub fn send_mouse_release(
        &mut self,
        button: MouseButton,
        modifiers: Modifiers,
        pos: CellLocation,
        pixel_pos: (u32, u32),
    ) -> bool {
        if self.mouse_bypassed(modifiers) {
            return false;
        }
        let sent = self
            .input
            .generate_mouse_release(button, modifiers, pos, pixel_pos, false);
        self.flush_replies();
        sent
    }

    pub fn send_mouse_move(
        &mut self,
        modifiers: Modifiers,
        pos: CellLocation,
        pixel_pos: (u32, u32),
    ) -> bool {
        if self.mouse_bypassed(modifiers) {
            return false;
        }
        let sent = self
            .input
            .generate_mouse_move(modifiers, pos, pixel_pos, false);
        self.flush_replies();
        sent
    }

    /// Holding the configured bypass modifier routes mouse input to the
    /// host (selection) instead of the application.
    fn mouse_bypassed(&self, modifiers: Modifiers) -> bool {
        let bypass = self.settings.mouse_protocol_bypass_modifier;
        !bypass.is_empty() && modifiers.contains(bypass)
    }

    // ── Geometry ────────────────────────────────────────────────────

    /// Host-driven resize: adjusts the model and informs the child.
    pub fn resize(&mut self, size: PageSize, pixels: Option<PixelSize>) {
        self.screen.resize(size);
        if let Some(pixels) = pixels {
            let cell = PixelSize {
                width: pixels.width / u32::from(size.columns.max(1)),
                height: pixels.height / u32::from(size.lines.max(1)),
            };
            self.screen.set_pixel_geometry(pixels, cell);
        }
        if let Err(error) = self.pty.resize_screen(size, pixels) {
            warn!(%error, "pty resize failed");
        }
        self.settings.page_size = size;
        self.render.schedule_refresh();
    }

    // ── Capture / search helpers used by hosts ──────────────────────

    /// Logical lines visible from the current viewport top (host capture).
    pub fn visible_logical_lines(&self) -> Vec<LogicalLine> {
        let top = -(self.viewport.scroll_offset() as i64);
        self.screen
            .grid()
            .logical_lines_from(top)
            .take(usize::from(self.settings.page_size.lines))
            .collect()
    }
}
