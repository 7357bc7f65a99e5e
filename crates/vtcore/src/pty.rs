//! Collaborator contracts: the PTY transport and the host event sink.
//!
//! The core never spawns processes or touches file descriptors; it drives
//! whatever implements [`Pty`] and reports side effects through
//! [`TerminalEvents`]. [`MockPty`] is an in-memory implementation used by the
//! integration tests (and useful to embedders for the same purpose).

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::time::Duration;

use crate::geometry::{PageSize, PixelSize};
use crate::image::ImageHandle;
use crate::screen::ScreenType;

/// Result of one PTY read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `len` bytes landed in the caller's buffer. `fast_pipe` marks the
    /// secondary high-throughput channel; its bytes parse identically.
    Data { len: usize, fast_pipe: bool },
    /// Nothing arrived within the timeout.
    Timeout,
    /// The reader was interrupted via `wakeup_reader`.
    Wakeup,
    /// The peer is gone; no more data will ever arrive.
    Closed,
}

/// The PTY transport contract.
pub trait Pty: Send {
    fn start(&mut self) -> io::Result<()>;
    fn close(&mut self);

    /// Interrupt a blocking [`read`](Pty::read) without closing the PTY.
    fn wakeup_reader(&self);

    /// Read up to `max_bytes` into `buffer`, waiting at most `timeout`.
    fn read(
        &mut self,
        buffer: &mut [u8],
        timeout: Duration,
        max_bytes: usize,
    ) -> io::Result<ReadOutcome>;

    /// Write application-bound bytes. Partial writes return the count; the
    /// caller retries the unwritten suffix.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    fn page_size(&self) -> PageSize;

    /// Propagate a screen resize to the child (TIOCSWINSZ equivalent).
    fn resize_screen(&mut self, size: PageSize, pixels: Option<PixelSize>) -> io::Result<()>;
}

/// Permission-gated operations a host may allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    CaptureBuffer,
    ChangeFont,
    DisplayHostWritableStatusLine,
}

/// Pointer shapes the application can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseCursorShape {
    #[default]
    Default,
    Text,
    Pointer,
    Crosshair,
}

/// Host callbacks. Every method has a default no-op so embedders implement
/// only what they surface.
pub trait TerminalEvents {
    fn bell(&mut self) {}
    fn buffer_changed(&mut self, _screen: ScreenType) {}
    fn screen_updated(&mut self) {}
    fn render_buffer_updated(&mut self) {}
    fn request_capture_buffer(&mut self, _lines: u16, _logical: bool) {}
    fn copy_to_clipboard(&mut self, _bytes: &[u8]) {}
    fn notify(&mut self, _title: &str, _content: &str) {}
    fn set_window_title(&mut self, _title: &str) {}
    fn set_mouse_cursor_shape(&mut self, _shape: MouseCursorShape) {}
    fn discard_image(&mut self, _image: ImageHandle) {}
    fn play_sound(&mut self, _params: &[u32]) {}
    fn resize_requested(&mut self, _size: PageSize) {}
    fn color_palette_updated(&mut self) {}
    fn cursor_style_changed(&mut self) {}
    fn on_closed(&mut self) {}
    fn request_permission(&mut self, _kind: PermissionKind, _topic: &str) -> bool {
        false
    }
}

/// A no-op event sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl TerminalEvents for NullEvents {}

/// In-memory PTY double.
///
/// Feed application output with [`push_output`](MockPty::push_output);
/// everything the terminal writes back lands in
/// [`written`](MockPty::written).
#[derive(Debug)]
pub struct MockPty {
    inbound: VecDeque<(Vec<u8>, bool)>,
    written: Vec<u8>,
    page_size: PageSize,
    closed: bool,
    started: bool,
    wakeup_tx: Sender<()>,
    wakeup_rx: Receiver<()>,
    resize_calls: Vec<PageSize>,
}

impl MockPty {
    pub fn new(page_size: PageSize) -> Self {
        let (wakeup_tx, wakeup_rx) = channel();
        Self {
            inbound: VecDeque::new(),
            written: Vec::new(),
            page_size,
            closed: false,
            started: false,
            wakeup_tx,
            wakeup_rx,
            resize_calls: Vec::new(),
        }
    }

    /// Queue bytes as if the application had produced them.
    pub fn push_output(&mut self, bytes: &[u8]) {
        self.inbound.push_back((bytes.to_vec(), false));
    }

    /// Queue bytes on the fast-pipe channel.
    pub fn push_fast_pipe_output(&mut self, bytes: &[u8]) {
        self.inbound.push_back((bytes.to_vec(), true));
    }

    /// Everything the terminal has written toward the application.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn resize_calls(&self) -> &[PageSize] {
        &self.resize_calls
    }

    /// Mark the peer as gone; subsequent reads return `Closed`.
    pub fn hang_up(&mut self) {
        self.closed = true;
    }
}

impl Pty for MockPty {
    fn start(&mut self) -> io::Result<()> {
        self.started = true;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn wakeup_reader(&self) {
        let _ = self.wakeup_tx.send(());
    }

    fn read(
        &mut self,
        buffer: &mut [u8],
        _timeout: Duration,
        max_bytes: usize,
    ) -> io::Result<ReadOutcome> {
        match self.wakeup_rx.try_recv() {
            Ok(()) => return Ok(ReadOutcome::Wakeup),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Ok(ReadOutcome::Closed),
        }
        let Some((chunk, fast_pipe)) = self.inbound.front_mut() else {
            return Ok(if self.closed {
                ReadOutcome::Closed
            } else {
                ReadOutcome::Timeout
            });
        };
        let fast_pipe = *fast_pipe;
        let take = chunk.len().min(buffer.len()).min(max_bytes);
        buffer[..take].copy_from_slice(&chunk[..take]);
        if take == chunk.len() {
            self.inbound.pop_front();
        } else {
            chunk.drain(..take);
        }
        Ok(ReadOutcome::Data {
            len: take,
            fast_pipe,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pty closed"));
        }
        self.written.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn page_size(&self) -> PageSize {
        self.page_size
    }

    fn resize_screen(&mut self, size: PageSize, _pixels: Option<PixelSize>) -> io::Result<()> {
        self.page_size = size;
        self.resize_calls.push(size);
        Ok(())
    }
}
