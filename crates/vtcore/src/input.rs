//! Input generator: turns host input events into terminal-bound bytes.
//!
//! The generator is a pure encoder. The terminal keeps its flags in sync with
//! the DEC modes (cursor-key application mode, keypad mode, bracketed paste,
//! the mouse protocol/transport pair, focus tracking) and the host calls
//! `generate_*` for each event; produced bytes accumulate in an output buffer
//! the terminal drains into the PTY.

use bitflags::bitflags;

use crate::geometry::CellLocation;

bitflags! {
    /// Keyboard modifiers, encoded per the xterm convention.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT   = 1 << 0;
        const ALT     = 1 << 1;
        const CONTROL = 1 << 2;
        const META    = 1 << 3;
    }
}

impl Modifiers {
    /// The `Ps` modifier parameter: 1 + (shift·1 + alt·2 + ctrl·4 + meta·8).
    pub fn vt_param(self) -> u8 {
        1 + self.bits()
    }

    /// The bits OR'd into mouse button values.
    fn mouse_bits(self) -> u8 {
        let mut bits = 0;
        if self.contains(Modifiers::SHIFT) {
            bits |= 4;
        }
        if self.contains(Modifiers::META) {
            bits |= 8;
        }
        if self.contains(Modifiers::CONTROL) {
            bits |= 16;
        }
        bits
    }
}

/// Non-character keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    UpArrow,
    DownArrow,
    LeftArrow,
    RightArrow,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

/// Mouse buttons, with wheel steps as pseudo-buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
}

impl MouseButton {
    /// X10 button code; wheel buttons land at 64/65.
    fn x10_code(self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
            MouseButton::WheelUp => 64,
            MouseButton::WheelDown => 65,
        }
    }

    fn is_wheel(self) -> bool {
        matches!(self, MouseButton::WheelUp | MouseButton::WheelDown)
    }
}

/// Which events the application asked to receive (DEC modes 9/1000/1002/1003).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseProtocol {
    /// Mode 9: presses only.
    X10,
    /// Mode 1000: press + release.
    Normal,
    /// Mode 1002: press + release + drag.
    Button,
    /// Mode 1003: everything, including bare motion.
    Any,
}

/// How coordinates travel (DEC modes 1005/1006/1015/1016; default otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseTransport {
    /// `CSI M` with byte-encoded 1-based coordinates (limit 223).
    #[default]
    Default,
    /// Mode 1005: like default but UTF-8 coordinate encoding (limit 2015).
    Extended,
    /// Mode 1006: `CSI < b ; x ; y M|m`, decimal 1-based cells.
    Sgr,
    /// Mode 1015: decimal CSI form.
    Urxvt,
    /// Mode 1016: SGR syntax carrying pixel coordinates.
    SgrPixels,
}

/// What a mouse report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventType {
    Press,
    Drag,
    Motion,
    Release,
}

/// Wheel translation on the alternate screen (DEC mode 1007).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WheelMode {
    #[default]
    Default,
    NormalCursorKeys,
    ApplicationCursorKeys,
}

/// The encoder itself.
#[derive(Debug, Default)]
pub struct InputGenerator {
    out: Vec<u8>,
    pub application_cursor_keys: bool,
    pub application_keypad: bool,
    pub bracketed_paste: bool,
    pub focus_tracking: bool,
    /// Mode 2029: report-only tracking; reports carry a ui-handled flag.
    pub passive_tracking: bool,
    pub mouse_protocol: Option<MouseProtocol>,
    pub mouse_transport: MouseTransport,
    pub wheel_mode: WheelMode,
    pressed: Vec<MouseButton>,
    mouse_position: CellLocation,
}

/// The C0 byte `Control` + `ch` synthesizes, if any.
fn control_byte(ch: char) -> Option<u8> {
    match ch {
        ' ' | '@' => Some(0x00),
        'a'..='z' => Some((ch as u8) - b'a' + 1),
        'A'..='Z' => Some((ch as u8) - b'A' + 1),
        '['..='_' => Some((ch as u8) - b'[' + 0x1b),
        '?' => Some(0x7f),
        _ => None,
    }
}

impl InputGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the accumulated reply bytes.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    pub fn pending(&self) -> &[u8] {
        &self.out
    }

    fn append(&mut self, bytes: &[u8]) -> bool {
        self.out.extend_from_slice(bytes);
        true
    }

    fn append_str(&mut self, text: &str) -> bool {
        self.append(text.as_bytes())
    }

    /// Reset per-session state (RIS).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // ── Character input ─────────────────────────────────────────────

    /// Encode a character event under the given modifiers.
    pub fn generate_char(&mut self, ch: char, modifiers: Modifiers) -> bool {
        let without_alt = modifiers & !Modifiers::ALT;
        let mut buf = [0u8; 4];

        let payload: &[u8] = if without_alt == Modifiers::SHIFT && ch == '\t' {
            // Shift+Tab is backtab.
            b"\x1b[Z"
        } else if without_alt == Modifiers::CONTROL && control_byte(ch).is_some() {
            buf[0] = control_byte(ch).unwrap_or(0);
            &buf[..1]
        } else if without_alt.is_empty()
            || without_alt == Modifiers::SHIFT
            || (ch as u32) < 0x20
        {
            ch.encode_utf8(&mut buf).as_bytes()
        } else {
            // Unencodable combination: swallow it.
            return false;
        };
        if modifiers.contains(Modifiers::ALT) {
            self.append(b"\x1b");
        }
        self.append(payload)
    }

    // ── Key input ───────────────────────────────────────────────────

    /// Encode a non-character key under the given modifiers.
    pub fn generate_key(&mut self, key: Key, modifiers: Modifiers) -> bool {
        if !modifiers.is_empty() {
            if let Some((prefix, suffix)) = modified_mapping(key) {
                let param = modifiers.vt_param();
                let mut seq = String::from(prefix);
                seq.push_str(&param.to_string());
                seq.push_str(suffix);
                return self.append_str(&seq);
            }
            return false;
        }
        if self.application_cursor_keys {
            if let Some(seq) = application_cursor_mapping(key) {
                return self.append_str(seq);
            }
        }
        if let Some(seq) = standard_mapping(key) {
            return self.append_str(seq);
        }
        false
    }

    // ── Focus ───────────────────────────────────────────────────────

    /// `CSI I` / `CSI O` when focus tracking is enabled.
    pub fn generate_focus(&mut self, gained: bool) -> bool {
        if !self.focus_tracking {
            return false;
        }
        self.append(if gained { b"\x1b[I" } else { b"\x1b[O" })
    }

    // ── Paste ───────────────────────────────────────────────────────

    /// Encode pasted text, bracketing it when the mode is on and stripping
    /// any embedded bracket terminator so the paste cannot break out.
    pub fn generate_paste(&mut self, text: &str) -> bool {
        if self.bracketed_paste {
            self.append(b"\x1b[200~");
            let sanitized = text.replace("\x1b[201~", "");
            self.append_str(&sanitized);
            self.append(b"\x1b[201~")
        } else {
            self.append_str(text)
        }
    }

    // ── Mouse ───────────────────────────────────────────────────────

    /// A button went down at `pos`.
    pub fn generate_mouse_press(
        &mut self,
        button: MouseButton,
        modifiers: Modifiers,
        pos: CellLocation,
        pixel_pos: (u32, u32),
        ui_handled: bool,
    ) -> bool {
        self.mouse_position = pos;
        if self.mouse_protocol.is_none() {
            return false;
        }
        if button.is_wheel() && !self.passive_tracking {
            match self.wheel_mode {
                WheelMode::NormalCursorKeys => {
                    return self.append(if button == MouseButton::WheelUp {
                        b"\x1b[A"
                    } else {
                        b"\x1b[B"
                    });
                }
                WheelMode::ApplicationCursorKeys => {
                    return self.append(if button == MouseButton::WheelUp {
                        b"\x1bOA"
                    } else {
                        b"\x1bOB"
                    });
                }
                WheelMode::Default => {}
            }
        }
        if !button.is_wheel() && !self.pressed.contains(&button) {
            self.pressed.push(button);
        }
        self.generate_mouse(MouseEventType::Press, button, modifiers, pos, pixel_pos, ui_handled)
    }

    /// A button came up at `pos`.
    pub fn generate_mouse_release(
        &mut self,
        button: MouseButton,
        modifiers: Modifiers,
        pos: CellLocation,
        pixel_pos: (u32, u32),
        ui_handled: bool,
    ) -> bool {
        self.mouse_position = pos;
        self.pressed.retain(|b| *b != button);
        self.generate_mouse(MouseEventType::Release, button, modifiers, pos, pixel_pos, ui_handled)
    }

    /// The pointer moved to `pos`.
    pub fn generate_mouse_move(
        &mut self,
        modifiers: Modifiers,
        pos: CellLocation,
        pixel_pos: (u32, u32),
        ui_handled: bool,
    ) -> bool {
        if pos == self.mouse_position && self.mouse_transport != MouseTransport::SgrPixels {
            return false;
        }
        self.mouse_position = pos;
        let (event, button) = match self.pressed.first() {
            Some(&button) => (MouseEventType::Drag, button),
            None => (MouseEventType::Motion, MouseButton::Left),
        };
        self.generate_mouse(event, button, modifiers, pos, pixel_pos, ui_handled)
    }

    fn generate_mouse(
        &mut self,
        event: MouseEventType,
        button: MouseButton,
        modifiers: Modifiers,
        pos: CellLocation,
        pixel_pos: (u32, u32),
        ui_handled: bool,
    ) -> bool {
        let Some(protocol) = self.mouse_protocol else {
            return false;
        };
        let wanted = match protocol {
            MouseProtocol::X10 => event == MouseEventType::Press,
            MouseProtocol::Normal => {
                matches!(event, MouseEventType::Press | MouseEventType::Release)
            }
            MouseProtocol::Button => matches!(
                event,
                MouseEventType::Press | MouseEventType::Release | MouseEventType::Drag
            ),
            MouseProtocol::Any => true,
        };
        if !wanted {
            return false;
        }

        // Non-SGR transports overload the button field: 3 means release, and
        // drags/motion add 0x20.
        let mut code = button.x10_code();
        if self.mouse_transport != MouseTransport::Sgr
            && self.mouse_transport != MouseTransport::SgrPixels
            && event == MouseEventType::Release
        {
            code = 3;
        }
        if matches!(event, MouseEventType::Drag | MouseEventType::Motion) {
            code = code.saturating_add(0x20);
        }
        let value = code | modifiers.mouse_bits();

        match self.mouse_transport {
            MouseTransport::Default => self.mouse_default(value, pos),
            MouseTransport::Extended => self.mouse_extended(value, pos),
            MouseTransport::Sgr => self.mouse_sgr(
                event,
                value,
                u32::from(pos.column) + 1,
                u32::from(pos.line) + 1,
                ui_handled,
            ),
            MouseTransport::SgrPixels => {
                self.mouse_sgr(event, value, pixel_pos.0, pixel_pos.1, ui_handled)
            }
            MouseTransport::Urxvt => self.mouse_urxvt(event, value, pos),
        }
    }

    /// `CSI M` with byte-packed coordinates; silently drops out-of-range.
    fn mouse_default(&mut self, value: u8, pos: CellLocation) -> bool {
        const LIMIT: u16 = 255 - 0x20;
        if pos.line >= LIMIT || pos.column >= LIMIT {
            return true;
        }
        let bytes = [
            0x1b,
            b'[',
            b'M',
            0x20 + value,
            0x20 + (pos.column as u8) + 1,
            0x20 + (pos.line as u8) + 1,
        ];
        self.append(&bytes)
    }

    /// Mode 1005: coordinates as UTF-8 scalars, limit 2015.
    fn mouse_extended(&mut self, value: u8, pos: CellLocation) -> bool {
        const LIMIT: u16 = 2015;
        if pos.line >= LIMIT || pos.column >= LIMIT {
            return true;
        }
        self.append(b"\x1b[M");
        self.append(&[0x20 + value]);
        let mut buf = [0u8; 4];
        let col = char::from_u32(0x20 + u32::from(pos.column) + 1)
            .unwrap_or(' ');
        self.append(col.encode_utf8(&mut buf).as_bytes());
        let line = char::from_u32(0x20 + u32::from(pos.line) + 1)
            .unwrap_or(' ');
        self.append(line.encode_utf8(&mut buf).as_bytes());
        true
    }

    fn mouse_sgr(
        &mut self,
        event: MouseEventType,
        value: u8,
        x: u32,
        y: u32,
        ui_handled: bool,
    ) -> bool {
        let mut seq = format!("\x1b[<{value};{x};{y}");
        if self.passive_tracking {
            seq.push(';');
            seq.push(if ui_handled { '1' } else { '0' });
        }
        seq.push(if event == MouseEventType::Release { 'm' } else { 'M' });
        self.append_str(&seq)
    }

    fn mouse_urxvt(&mut self, event: MouseEventType, value: u8, pos: CellLocation) -> bool {
        if event != MouseEventType::Press {
            return true;
        }
        let seq = format!(
            "\x1b[{};{};{}M",
            value,
            pos.column + 1,
            pos.line + 1
        );
        self.append_str(&seq)
    }
}

// ── Key tables ──────────────────────────────────────────────────────

/// Mappings used when any modifier is held: `prefix {param} suffix`.
fn modified_mapping(key: Key) -> Option<(&'static str, &'static str)> {
    Some(match key {
        Key::UpArrow => ("\x1b[1;", "A"),
        Key::DownArrow => ("\x1b[1;", "B"),
        Key::RightArrow => ("\x1b[1;", "C"),
        Key::LeftArrow => ("\x1b[1;", "D"),
        Key::Home => ("\x1b[1;", "H"),
        Key::End => ("\x1b[1;", "F"),
        Key::Insert => ("\x1b[2;", "~"),
        Key::Delete => ("\x1b[3;", "~"),
        Key::PageUp => ("\x1b[5;", "~"),
        Key::PageDown => ("\x1b[6;", "~"),
        Key::F(1) => ("\x1bO", "P"),
        Key::F(2) => ("\x1bO", "Q"),
        Key::F(3) => ("\x1bO", "R"),
        Key::F(4) => ("\x1bO", "S"),
        Key::F(n) => return modified_function_key(n),
    })
}

fn modified_function_key(n: u8) -> Option<(&'static str, &'static str)> {
    // The higher function keys all use `CSI code ; param ~`.
    Some(match n {
        5 => ("\x1b[15;", "~"),
        6 => ("\x1b[17;", "~"),
        7 => ("\x1b[18;", "~"),
        8 => ("\x1b[19;", "~"),
        9 => ("\x1b[20;", "~"),
        10 => ("\x1b[21;", "~"),
        11 => ("\x1b[23;", "~"),
        12 => ("\x1b[24;", "~"),
        13 => ("\x1b[25;", "~"),
        14 => ("\x1b[26;", "~"),
        15 => ("\x1b[28;", "~"),
        16 => ("\x1b[29;", "~"),
        17 => ("\x1b[31;", "~"),
        18 => ("\x1b[32;", "~"),
        19 => ("\x1b[33;", "~"),
        20 => ("\x1b[34;", "~"),
        _ => return None,
    })
}

/// DECCKM application-mode cursor keys.
fn application_cursor_mapping(key: Key) -> Option<&'static str> {
    Some(match key {
        Key::UpArrow => "\x1bOA",
        Key::DownArrow => "\x1bOB",
        Key::RightArrow => "\x1bOC",
        Key::LeftArrow => "\x1bOD",
        Key::Home => "\x1bOH",
        Key::End => "\x1bOF",
        _ => return None,
    })
}

fn standard_mapping(key: Key) -> Option<&'static str> {
    Some(match key {
        Key::UpArrow => "\x1b[A",
        Key::DownArrow => "\x1b[B",
        Key::RightArrow => "\x1b[C",
        Key::LeftArrow => "\x1b[D",
        Key::Home => "\x1b[H",
        Key::End => "\x1b[F",
        Key::Insert => "\x1b[2~",
        Key::Delete => "\x1b[3~",
        Key::PageUp => "\x1b[5~",
        Key::PageDown => "\x1b[6~",
        Key::F(1) => "\x1bOP",
        Key::F(2) => "\x1bOQ",
        Key::F(3) => "\x1bOR",
        Key::F(4) => "\x1bOS",
        Key::F(5) => "\x1b[15~",
        Key::F(6) => "\x1b[17~",
        Key::F(7) => "\x1b[18~",
        Key::F(8) => "\x1b[19~",
        Key::F(9) => "\x1b[20~",
        Key::F(10) => "\x1b[21~",
        Key::F(11) => "\x1b[23~",
        Key::F(12) => "\x1b[24~",
        Key::F(_) => return None,
    })
}
