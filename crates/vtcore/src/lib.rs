#![forbid(unsafe_code)]

//! Host-agnostic VT100..VT525 terminal backend.
//!
//! `vtcore` consumes the byte stream a PTY master produces, interprets it as
//! a VT/xterm escape-code stream, maintains the full screen model (primary
//! and alternate pages, scrollback, status line, images), and produces
//! renderable snapshots plus the reply stream the application expects. The
//! input side encodes keys, mouse, focus, and paste events into terminal
//! byte sequences, and a modal vi-like overlay drives viewport navigation,
//! selection, and yanking without leaving the core.
//!
//! # Architecture
//!
//! - **Parser** ([`parser`]): deterministic byte-level state machine emitting
//!   events (print, execute, collect, param, dispatch, hook/put/unhook).
//! - **Sequencer** ([`sequencer`]): assembles the in-flight [`Sequence`] and
//!   dispatches completed sequences into the screen.
//! - **Grid** ([`grid`], [`line`], [`cell`]): lines of cells with a trivial
//!   zero-copy representation for plain appends, scrollback history, and
//!   reflow on resize.
//! - **Screen** ([`screen`]): every VT operation — cursor motion, erasure,
//!   rectangles, modes, SGR, device reports, Sixel, status line.
//! - **Terminal** ([`terminal`]): the orchestrator owning the pipeline, the
//!   render double buffer, the reply channel, and the I/O loop over a
//!   host-provided [`Pty`].
//! - **Input** ([`input`]): event-to-bytes encoding under the active modes.
//! - **Vi mode** ([`vi_mode`], [`vi_commands`], [`viewport`]): modal
//!   scrollback navigation, selection, and search.
//!
//! # Design principles
//!
//! - **No I/O in the model**: the PTY and all host side effects are traits.
//! - **Deterministic**: identical byte streams produce identical state.
//! - **`#![forbid(unsafe_code)]`**: safety enforced at compile time.

pub mod buffer;
pub mod cell;
pub mod color;
pub mod cursor;
pub mod functions;
pub mod geometry;
pub mod grid;
pub mod image;
pub mod input;
pub mod line;
pub mod modes;
pub mod parser;
pub mod pty;
pub mod render;
pub mod screen;
pub mod sequence;
pub mod sequencer;
pub mod settings;
pub mod sixel;
pub mod terminal;
pub mod vi_commands;
pub mod vi_mode;
pub mod viewport;

pub use buffer::{BufferFragment, BufferObject, BufferObjectPool};
pub use cell::{Cell, CellFlags, Color, HyperlinkId, HyperlinkRegistry, SgrAttrs};
pub use color::{ColorPalette, ColorStack, DynamicColor, RgbColor};
pub use cursor::{Charset, CharsetMapping, Cursor, SaveStack, SavedCursor, TabStops};
pub use functions::Function;
pub use geometry::{CellLocation, Margin, PageSize, PixelSize};
pub use grid::{Grid, HistoryLimit, LogicalLine};
pub use image::{Image, ImageFragment, ImageHandle, ImagePool, ImageSize};
pub use input::{
    InputGenerator, Key, Modifiers, MouseButton, MouseEventType, MouseProtocol, MouseTransport,
    WheelMode,
};
pub use line::{Line, LineFlags};
pub use modes::{AnsiMode, DecMode, ModeStatus, Modes};
pub use parser::{Parser, ParserEvents, StringKind};
pub use pty::{
    MockPty, MouseCursorShape, NullEvents, PermissionKind, Pty, ReadOutcome, TerminalEvents,
};
pub use render::{
    RenderAttrs, RenderBufferState, RenderCell, RenderCursor, RenderDoubleBuffer,
    RenderFrontBuffer, RenderLine, RenderSnapshot,
};
pub use screen::{ActiveDisplay, Screen, ScreenEvent, ScreenType, SequenceResult};
pub use sequence::{Param, Params, Sequence, SequenceCategory};
pub use sequencer::Sequencer;
pub use settings::{
    CursorDisplay, CursorShape, Settings, StatusDisplayPosition, StatusDisplayType, VtType,
};
pub use sixel::SixelDecoder;
pub use terminal::{ExecutionMode, ProcessOutcome, Terminal};
pub use vi_commands::{BufferPos, Selection, SelectionKind, ViCommands, ViContext};
pub use vi_mode::{
    CharSearch, ObjectScope, TextObject, ViExecutor, ViInputHandler, ViMode, ViMotion, ViScroll,
};
pub use viewport::Viewport;
