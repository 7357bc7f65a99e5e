//! Terminal modes: ANSI (SM/RM) and DEC private (DECSET/DECRST).
//!
//! ANSI mode numbers stay below 32 and live in one bitset. DEC private mode
//! numbers are sparse (1 through 8452), so they live in a hash set keyed by
//! mode number, with a per-mode stack of saved booleans backing XTSAVE /
//! XTRESTORE.

use std::collections::{HashMap, HashSet};

/// DEC private modes the terminal recognizes, by their standard numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DecMode {
    /// DECCKM: application cursor keys.
    ApplicationCursorKeys = 1,
    /// DECANM: VT52 compatibility (recognized, permanently reset).
    Designate = 2,
    /// DECCOLM: 132-column mode.
    Columns132 = 3,
    /// DECSCLM: smooth scroll.
    SmoothScroll = 4,
    /// DECSCNM: reverse video.
    ReverseVideo = 5,
    /// DECOM: origin mode.
    Origin = 6,
    /// DECAWM: auto-wrap.
    AutoWrap = 7,
    /// X10 mouse protocol.
    MouseProtocolX10 = 9,
    /// Show toolbar (recognized only).
    ShowToolbar = 10,
    /// Cursor blinking.
    BlinkingCursor = 12,
    /// Print extent to full screen.
    PrinterExtend = 19,
    /// DECTCEM: cursor visible.
    VisibleCursor = 25,
    /// Show scrollbar (recognized only).
    ShowScrollbar = 30,
    /// Allow 80 ↔ 132 column switching.
    AllowColumns80to132 = 40,
    /// Debug logging.
    DebugLogging = 46,
    /// Alternate screen, plain switch.
    UseAlternateScreen = 47,
    /// DECLRMM: left/right margin mode (gates DECSLRM).
    LeftRightMargin = 69,
    /// DECSDM: Sixel display mode (no scrolling).
    NoSixelScrolling = 80,
    /// Normal mouse tracking (press + release).
    MouseProtocolNormal = 1000,
    /// Highlight mouse tracking.
    MouseProtocolHighlight = 1001,
    /// Button-event mouse tracking (press, release, drag).
    MouseProtocolButton = 1002,
    /// Any-event mouse tracking (all motion).
    MouseProtocolAny = 1003,
    /// Focus in/out reporting.
    FocusTracking = 1004,
    /// UTF-8 mouse coordinate extension (recognized, permanently reset).
    MouseExtendedUtf8 = 1005,
    /// SGR mouse coordinate extension.
    MouseSgr = 1006,
    /// Alternate-scroll: wheel becomes cursor keys on the alt screen.
    MouseAlternateScroll = 1007,
    /// URXVT mouse coordinate extension.
    MouseUrxvt = 1015,
    /// SGR-Pixels mouse coordinate extension.
    MouseSgrPixels = 1016,
    /// Alternate screen, clear on leave.
    UseAlternateScreenClear = 1047,
    /// Save/restore cursor as-if DECSC/DECRC.
    SaveCursor = 1048,
    /// Save cursor + switch to a cleared alternate screen.
    SaveCursorAndAlternateScreen = 1049,
    /// Bracketed paste.
    BracketedPaste = 2004,
    /// Synchronized output batching.
    BatchedRendering = 2026,
    /// Grapheme-cluster processing for text.
    Unicode = 2027,
    /// Text reflow on resize.
    TextReflow = 2028,
    /// Mouse passive (report-only) tracking.
    MousePassiveTracking = 2029,
    /// Report color-scheme changes.
    ReportColorPaletteUpdated = 2030,
    /// In-band window resize notifications.
    ReportGridCellSelection = 8452,
}

impl DecMode {
    /// All recognized modes, for DECRQM and XTSAVE "save all".
    pub const ALL: &'static [DecMode] = &[
        DecMode::ApplicationCursorKeys,
        DecMode::Designate,
        DecMode::Columns132,
        DecMode::SmoothScroll,
        DecMode::ReverseVideo,
        DecMode::Origin,
        DecMode::AutoWrap,
        DecMode::MouseProtocolX10,
        DecMode::ShowToolbar,
        DecMode::BlinkingCursor,
        DecMode::PrinterExtend,
        DecMode::VisibleCursor,
        DecMode::ShowScrollbar,
        DecMode::AllowColumns80to132,
        DecMode::DebugLogging,
        DecMode::UseAlternateScreen,
        DecMode::LeftRightMargin,
        DecMode::NoSixelScrolling,
        DecMode::MouseProtocolNormal,
        DecMode::MouseProtocolHighlight,
        DecMode::MouseProtocolButton,
        DecMode::MouseProtocolAny,
        DecMode::FocusTracking,
        DecMode::MouseExtendedUtf8,
        DecMode::MouseSgr,
        DecMode::MouseAlternateScroll,
        DecMode::MouseUrxvt,
        DecMode::MouseSgrPixels,
        DecMode::UseAlternateScreenClear,
        DecMode::SaveCursor,
        DecMode::SaveCursorAndAlternateScreen,
        DecMode::BracketedPaste,
        DecMode::BatchedRendering,
        DecMode::Unicode,
        DecMode::TextReflow,
        DecMode::MousePassiveTracking,
        DecMode::ReportColorPaletteUpdated,
        DecMode::ReportGridCellSelection,
    ];

    pub fn from_number(mode: u16) -> Option<Self> {
        DecMode::ALL
            .iter()
            .copied()
            .find(|m| *m as u16 == mode)
    }

    pub fn number(self) -> u16 {
        self as u16
    }

    /// Recognized but never settable (reported "permanently reset").
    pub fn is_permanently_reset(self) -> bool {
        matches!(self, DecMode::Designate | DecMode::MouseExtendedUtf8)
    }
}

/// ANSI modes the terminal recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnsiMode {
    /// KAM: keyboard action (recognized only).
    KeyboardAction = 2,
    /// IRM: insert/replace.
    Insert = 4,
    /// SRM: send/receive (recognized only).
    SendReceive = 12,
    /// LNM: linefeed implies carriage return.
    AutomaticNewline = 20,
}

impl AnsiMode {
    pub const ALL: &'static [AnsiMode] = &[
        AnsiMode::KeyboardAction,
        AnsiMode::Insert,
        AnsiMode::SendReceive,
        AnsiMode::AutomaticNewline,
    ];

    pub fn from_number(mode: u16) -> Option<Self> {
        AnsiMode::ALL.iter().copied().find(|m| *m as u16 == mode)
    }

    pub fn number(self) -> u16 {
        self as u16
    }
}

/// DECRQM reply status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModeStatus {
    NotRecognized = 0,
    Set = 1,
    Reset = 2,
    PermanentlySet = 3,
    PermanentlyReset = 4,
}

/// Combined mode state.
#[derive(Debug, Clone, Default)]
pub struct Modes {
    /// ANSI mode bitset, indexed by mode number (< 32).
    ansi: u32,
    /// Enabled DEC private modes by number.
    dec: HashSet<u16>,
    /// XTSAVE stacks, per DEC mode.
    saved: HashMap<u16, Vec<bool>>,
}

impl Modes {
    /// Power-on defaults: auto-wrap and visible cursor on.
    pub fn new() -> Self {
        let mut modes = Self::default();
        modes.set_dec(DecMode::AutoWrap, true);
        modes.set_dec(DecMode::VisibleCursor, true);
        modes.set_dec(DecMode::TextReflow, true);
        modes
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // ── DEC private modes ───────────────────────────────────────────

    pub fn dec(&self, mode: DecMode) -> bool {
        self.dec.contains(&mode.number())
    }

    pub fn set_dec(&mut self, mode: DecMode, enabled: bool) {
        if mode.is_permanently_reset() {
            return;
        }
        if enabled {
            self.dec.insert(mode.number());
        } else {
            self.dec.remove(&mode.number());
        }
    }

    /// DECRQM status for a DEC mode number.
    pub fn dec_status(&self, mode: u16) -> ModeStatus {
        match DecMode::from_number(mode) {
            None => ModeStatus::NotRecognized,
            Some(m) if m.is_permanently_reset() => ModeStatus::PermanentlyReset,
            Some(_) => {
                if self.dec.contains(&mode) {
                    ModeStatus::Set
                } else {
                    ModeStatus::Reset
                }
            }
        }
    }

    /// XTSAVE: push the current value of a mode onto its save stack.
    pub fn save_dec(&mut self, mode: u16) {
        if DecMode::from_number(mode).is_none() {
            return;
        }
        let value = self.dec.contains(&mode);
        let stack = self.saved.entry(mode).or_default();
        if stack.len() < 64 {
            stack.push(value);
        }
    }

    /// XTRESTORE: pop a saved value back into effect.
    ///
    /// Returns the restored value, so callers can run mode side-effects.
    pub fn restore_dec(&mut self, mode: u16) -> Option<bool> {
        let dec_mode = DecMode::from_number(mode)?;
        let value = self.saved.get_mut(&mode)?.pop()?;
        self.set_dec(dec_mode, value);
        Some(value)
    }

    // ── ANSI modes ──────────────────────────────────────────────────

    pub fn ansi(&self, mode: AnsiMode) -> bool {
        self.ansi & (1 << mode.number()) != 0
    }

    pub fn set_ansi(&mut self, mode: AnsiMode, enabled: bool) {
        if enabled {
            self.ansi |= 1 << mode.number();
        } else {
            self.ansi &= !(1 << mode.number());
        }
    }

    /// DECRQM (ANSI variant) status.
    pub fn ansi_status(&self, mode: u16) -> ModeStatus {
        match AnsiMode::from_number(mode) {
            None => ModeStatus::NotRecognized,
            Some(m) => {
                if self.ansi(m) {
                    ModeStatus::Set
                } else {
                    ModeStatus::Reset
                }
            }
        }
    }

    // ── Shorthands for the hot flags ────────────────────────────────

    pub fn origin_mode(&self) -> bool {
        self.dec(DecMode::Origin)
    }

    pub fn auto_wrap(&self) -> bool {
        self.dec(DecMode::AutoWrap)
    }

    pub fn insert_mode(&self) -> bool {
        self.ansi(AnsiMode::Insert)
    }

    pub fn cursor_visible(&self) -> bool {
        self.dec(DecMode::VisibleCursor)
    }

    pub fn left_right_margin(&self) -> bool {
        self.dec(DecMode::LeftRightMargin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_autowrap_and_visible_cursor() {
        let m = Modes::new();
        assert!(m.auto_wrap());
        assert!(m.cursor_visible());
        assert!(!m.origin_mode());
        assert!(!m.insert_mode());
    }

    #[test]
    fn sparse_dec_modes_toggle() {
        let mut m = Modes::new();
        m.set_dec(DecMode::ReportGridCellSelection, true);
        assert!(m.dec(DecMode::ReportGridCellSelection));
        m.set_dec(DecMode::ReportGridCellSelection, false);
        assert!(!m.dec(DecMode::ReportGridCellSelection));
    }

    #[test]
    fn permanently_reset_modes_never_set() {
        let mut m = Modes::new();
        m.set_dec(DecMode::MouseExtendedUtf8, true);
        assert!(!m.dec(DecMode::MouseExtendedUtf8));
        assert_eq!(m.dec_status(1005), ModeStatus::PermanentlyReset);
    }

    #[test]
    fn dec_status_reporting() {
        let mut m = Modes::new();
        assert_eq!(m.dec_status(7), ModeStatus::Set);
        assert_eq!(m.dec_status(6), ModeStatus::Reset);
        assert_eq!(m.dec_status(9999), ModeStatus::NotRecognized);
        m.set_dec(DecMode::Origin, true);
        assert_eq!(m.dec_status(6), ModeStatus::Set);
    }

    #[test]
    fn ansi_status_reporting() {
        let mut m = Modes::new();
        assert_eq!(m.ansi_status(4), ModeStatus::Reset);
        m.set_ansi(AnsiMode::Insert, true);
        assert_eq!(m.ansi_status(4), ModeStatus::Set);
        assert_eq!(m.ansi_status(99), ModeStatus::NotRecognized);
    }

    #[test]
    fn save_restore_roundtrips_across_flip() {
        let mut m = Modes::new();
        m.set_dec(DecMode::BracketedPaste, true);
        m.save_dec(2004);
        m.set_dec(DecMode::BracketedPaste, false);
        assert_eq!(m.restore_dec(2004), Some(true));
        assert!(m.dec(DecMode::BracketedPaste));
    }

    #[test]
    fn save_restore_nests_per_mode() {
        let mut m = Modes::new();
        m.save_dec(6); // off
        m.set_dec(DecMode::Origin, true);
        m.save_dec(6); // on
        m.set_dec(DecMode::Origin, false);

        assert_eq!(m.restore_dec(6), Some(true));
        assert!(m.origin_mode());
        assert_eq!(m.restore_dec(6), Some(false));
        assert!(!m.origin_mode());
        assert_eq!(m.restore_dec(6), None);
    }

    #[test]
    fn restore_of_unknown_mode_is_none() {
        let mut m = Modes::new();
        assert_eq!(m.restore_dec(4242), None);
    }

    #[test]
    fn reset_restores_power_on_state() {
        let mut m = Modes::new();
        m.set_dec(DecMode::Origin, true);
        m.set_ansi(AnsiMode::Insert, true);
        m.save_dec(6);
        m.reset();
        assert!(!m.origin_mode());
        assert!(!m.insert_mode());
        assert!(m.auto_wrap());
        assert_eq!(m.restore_dec(6), None);
    }
}
