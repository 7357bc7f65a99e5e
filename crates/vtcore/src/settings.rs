//! Terminal settings: everything configurable from the embedding host.

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::geometry::PageSize;
use crate::grid::HistoryLimit;
use crate::image::ImageSize;
use crate::input::Modifiers;

/// What the status line shows, if present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusDisplayType {
    #[default]
    None,
    /// Terminal-owned indicator line.
    Indicator,
    /// Host application writes it via DECSASD.
    HostWritable,
}

/// Where the status line sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusDisplayPosition {
    Top,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorDisplay {
    #[default]
    Steady,
    Blink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Block,
    Underscore,
    Bar,
    Rectangle,
}

/// The DEC terminal model this instance reports (DA1/DA2, DECSCL ceiling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::upper_case_acronyms)]
pub enum VtType {
    VT100,
    VT220,
    VT240,
    VT320,
    VT330,
    VT340,
    VT420,
    VT510,
    VT520,
    #[default]
    VT525,
}

impl VtType {
    /// The DA2 model identifier.
    pub fn id(self) -> u16 {
        match self {
            VtType::VT100 => 0,
            VtType::VT220 => 1,
            VtType::VT240 => 2,
            VtType::VT320 => 24,
            VtType::VT330 => 18,
            VtType::VT340 => 19,
            VtType::VT420 => 41,
            VtType::VT510 => 61,
            VtType::VT520 => 64,
            VtType::VT525 => 65,
        }
    }
}

/// `url_pattern` wrapper so `Settings` can derive `Clone` and compare by
/// pattern text.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    regex: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(regex) => Some(Self { regex }),
            Err(error) => {
                warn!(%pattern, %error, "invalid url pattern, keeping default");
                None
            }
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

impl Default for UrlPattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(r"https?://[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}[-a-zA-Z0-9()@:%_+.~#?&/=]*")
                .unwrap_or_else(|_| unreachable!("default url pattern is valid")),
        }
    }
}

/// All recognized terminal options.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub page_size: PageSize,
    pub max_history_line_count: HistoryLimit,
    /// Ceiling for Sixel canvases.
    pub max_image_size: ImageSize,
    /// Ceiling for Sixel color registers.
    pub max_image_register_count: u32,
    pub status_display_type: StatusDisplayType,
    pub status_display_position: StatusDisplayPosition,
    pub cursor_display: CursorDisplay,
    pub cursor_shape: CursorShape,
    pub cursor_blink_interval: Duration,
    /// Render refresh rate in Hz; `refresh_interval()` derives the period.
    pub refresh_rate: f64,
    /// PTY read chunk ceiling; must be a multiple of 16.
    pub pty_read_buffer_size: usize,
    /// Size of each pinned buffer object the reader fills.
    pub pty_buffer_object_size: usize,
    /// Codepoints that delimit words for double-click/vi word selection.
    pub word_delimiters: HashSet<char>,
    /// Holding this modifier bypasses application mouse protocols.
    pub mouse_protocol_bypass_modifier: Modifiers,
    /// Holding this modifier forces rectangular (block) selection.
    pub mouse_block_selection_modifier: Modifiers,
    pub highlight_timeout: Duration,
    pub highlight_double_clicked_word: bool,
    pub visualize_selected_word: bool,
    /// Reflow primary-screen lines on column resize.
    pub primary_screen_allow_reflow_on_resize: bool,
    pub url_pattern: UrlPattern,
    pub terminal_id: VtType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            max_history_line_count: HistoryLimit::Bounded(1000),
            max_image_size: ImageSize::new(800, 600),
            max_image_register_count: 256,
            status_display_type: StatusDisplayType::default(),
            status_display_position: StatusDisplayPosition::default(),
            cursor_display: CursorDisplay::default(),
            cursor_shape: CursorShape::default(),
            cursor_blink_interval: Duration::from_millis(500),
            refresh_rate: 30.0,
            pty_read_buffer_size: 4096,
            pty_buffer_object_size: 64 * 1024,
            word_delimiters: " \t()[]{}<>|'\"`,;:".chars().collect(),
            mouse_protocol_bypass_modifier: Modifiers::SHIFT,
            mouse_block_selection_modifier: Modifiers::CONTROL,
            highlight_timeout: Duration::from_millis(300),
            highlight_double_clicked_word: true,
            visualize_selected_word: true,
            primary_screen_allow_reflow_on_resize: true,
            url_pattern: UrlPattern::default(),
            terminal_id: VtType::default(),
        }
    }
}

impl Settings {
    /// Validate and normalize host-supplied values.
    ///
    /// `pty_read_buffer_size` must be a multiple of 16; out-of-spec values
    /// fall back to the default with a warning rather than failing terminal
    /// construction.
    pub fn normalized(mut self) -> Self {
        if self.pty_read_buffer_size == 0 || self.pty_read_buffer_size % 16 != 0 {
            warn!(
                value = self.pty_read_buffer_size,
                "pty_read_buffer_size must be a non-zero multiple of 16, using default"
            );
            self.pty_read_buffer_size = Settings::default().pty_read_buffer_size;
        }
        if self.pty_buffer_object_size < self.pty_read_buffer_size {
            self.pty_buffer_object_size = self.pty_read_buffer_size;
        }
        if !(self.refresh_rate.is_finite() && self.refresh_rate > 0.0) {
            self.refresh_rate = Settings::default().refresh_rate;
        }
        self
    }

    /// Derived render period from `refresh_rate`.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_rate)
    }

    /// Number of page lines the status display occupies.
    pub fn status_line_height(&self) -> u16 {
        match self.status_display_type {
            StatusDisplayType::None => 0,
            _ => 1,
        }
    }

    pub fn is_word_delimiter(&self, ch: char) -> bool {
        self.word_delimiters.contains(&ch)
    }
}
