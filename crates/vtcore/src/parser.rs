//! VT parser: a deterministic byte-level state machine.
//!
//! The parser turns an arbitrary byte stream into events on a
//! [`ParserEvents`] handler: printable scalars, C0 executes, collected
//! leaders/intermediates, parameter digits and separators, and dispatches for
//! ESC / CSI / OSC / DCS / APC / PM strings. It performs UTF-8 decoding on
//! the print path only — bytes inside escape-string contexts pass through
//! 8-bit clean — and recovers from invalid UTF-8 by emitting U+FFFD and
//! resuming at the next byte boundary.
//!
//! Maximal runs of printable ASCII are reported as [`ParserEvents::print_run`]
//! ranges into the fed slice so the screen can take its zero-copy append path.

/// String-sequence kinds that share the SOS/PM/APC terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    Sos,
    Pm,
    Apc,
}

/// Receiver for parser events.
///
/// Every method has a default no-op (or forwarding) implementation so tests
/// and tools can observe just the events they care about.
pub trait ParserEvents {
    /// A completed Unicode scalar for display.
    fn print(&mut self, _ch: char) {}

    /// A maximal run of printable ASCII (0x20..=0x7E), as a byte range into
    /// the slice currently being fed. Defaults to per-byte [`print`] calls.
    ///
    /// [`print`]: ParserEvents::print
    fn print_run(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.print(b as char);
        }
    }

    /// A C0 control byte.
    fn execute(&mut self, _byte: u8) {}

    /// A private-marker leader (`?`, `>`, `<`, `=`) in CSI/DCS entry.
    fn collect_leader(&mut self, _byte: u8) {}

    /// An intermediate byte (0x20..=0x2F).
    fn collect(&mut self, _byte: u8) {}

    fn param_digit(&mut self, _byte: u8) {}
    fn param_separator(&mut self) {}
    fn param_sub_separator(&mut self) {}

    fn dispatch_esc(&mut self, _final_byte: u8) {}
    fn dispatch_csi(&mut self, _final_byte: u8) {}

    fn start_osc(&mut self) {}
    fn put_osc(&mut self, _byte: u8) {}
    fn dispatch_osc(&mut self) {}

    /// DCS header complete; payload bytes follow via [`put_dcs`].
    ///
    /// [`put_dcs`]: ParserEvents::put_dcs
    fn hook_dcs(&mut self, _final_byte: u8) {}
    fn put_dcs(&mut self, _byte: u8) {}
    fn unhook_dcs(&mut self) {}

    fn start_string(&mut self, _kind: StringKind) {}
    fn put_string(&mut self, _byte: u8) {}
    fn dispatch_string(&mut self) {}

    /// A malformed construct was dropped (diagnostic only).
    fn parse_error(&mut self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsPassthrough,
    DcsIgnore,
    OscString,
    SosPmApcString(StringKind),
}

/// The byte-level state machine.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    state: State,
    /// Partial UTF-8 scalar carried across feeds.
    utf8: [u8; 4],
    utf8_len: u8,
    utf8_expected: u8,
    /// Set while an ESC was seen inside a string state (possible ST).
    string_esc: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the parser sits between sequences (nothing buffered).
    pub fn is_ground(&self) -> bool {
        self.state == State::Ground && self.utf8_len == 0
    }

    /// Abort any in-flight sequence and return to ground.
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.utf8_len = 0;
        self.utf8_expected = 0;
        self.string_esc = false;
    }

    /// Feed a chunk, emitting events; printable-ASCII runs are reported as
    /// sub-slices of `bytes`.
    pub fn parse<E: ParserEvents>(&mut self, events: &mut E, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if self.state == State::Ground && self.utf8_len == 0 && (0x20..=0x7E).contains(&b) {
                let start = i;
                while i < bytes.len() && (0x20..=0x7E).contains(&bytes[i]) {
                    i += 1;
                }
                events.print_run(&bytes[start..i]);
                continue;
            }
            self.advance(events, b);
            i += 1;
        }
    }

    /// Advance by one byte.
    pub fn advance<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.utf8_len > 0 {
            self.advance_utf8(events, byte);
            return;
        }
        match self.state {
            State::Ground => self.advance_ground(events, byte),
            State::Escape => self.advance_escape(events, byte),
            State::EscapeIntermediate => self.advance_escape_intermediate(events, byte),
            State::CsiEntry => self.advance_csi_entry(events, byte),
            State::CsiParam => self.advance_csi_param(events, byte),
            State::CsiIntermediate => self.advance_csi_intermediate(events, byte),
            State::CsiIgnore => self.advance_csi_ignore(events, byte),
            State::DcsEntry => self.advance_dcs_entry(events, byte),
            State::DcsParam => self.advance_dcs_param(events, byte),
            State::DcsIntermediate => self.advance_dcs_intermediate(events, byte),
            State::DcsPassthrough => self.advance_dcs_passthrough(events, byte),
            State::DcsIgnore => self.advance_dcs_ignore(events, byte),
            State::OscString => self.advance_osc(events, byte),
            State::SosPmApcString(kind) => self.advance_sos_pm_apc(events, byte, kind),
        }
    }

    // ── Ground ──────────────────────────────────────────────────────

    fn advance_ground<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        match byte {
            0x00..=0x1A | 0x1C..=0x1F => events.execute(byte),
            0x1B => self.state = State::Escape,
            0x20..=0x7E => events.print(byte as char),
            0x7F => {} // DEL is ignored on the display path
            0x80..=0x9F => self.dispatch_c1(events, byte),
            0xC2..=0xDF => self.begin_utf8(byte, 2),
            0xE0..=0xEF => self.begin_utf8(byte, 3),
            0xF0..=0xF4 => self.begin_utf8(byte, 4),
            _ => {
                // Stray continuation or invalid lead byte.
                events.parse_error("invalid utf-8 lead byte");
                events.print(char::REPLACEMENT_CHARACTER);
            }
        }
    }

    /// 8-bit C1 controls in ground map onto their 7-bit `ESC`-pair forms.
    fn dispatch_c1<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        match byte {
            0x90 => self.enter(State::DcsEntry),
            0x98 => self.enter_string(events, StringKind::Sos),
            0x9B => self.enter(State::CsiEntry),
            0x9C => {} // stray ST
            0x9D => {
                events.start_osc();
                self.enter(State::OscString);
            }
            0x9E => self.enter_string(events, StringKind::Pm),
            0x9F => self.enter_string(events, StringKind::Apc),
            _ => events.dispatch_esc(byte - 0x40),
        }
    }

    fn begin_utf8(&mut self, byte: u8, expected: u8) {
        self.utf8[0] = byte;
        self.utf8_len = 1;
        self.utf8_expected = expected;
    }

    fn advance_utf8<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if (0x80..=0xBF).contains(&byte) {
            let idx = usize::from(self.utf8_len);
            if idx < 4 {
                self.utf8[idx] = byte;
                self.utf8_len += 1;
            }
            if self.utf8_len == self.utf8_expected {
                let len = usize::from(self.utf8_len);
                self.utf8_len = 0;
                match core::str::from_utf8(&self.utf8[..len]) {
                    Ok(s) => {
                        if let Some(ch) = s.chars().next() {
                            events.print(ch);
                        }
                    }
                    Err(_) => {
                        events.parse_error("invalid utf-8 sequence");
                        events.print(char::REPLACEMENT_CHARACTER);
                    }
                }
            }
            return;
        }
        // Broken sequence: replacement character, then reprocess this byte.
        self.utf8_len = 0;
        events.parse_error("truncated utf-8 sequence");
        events.print(char::REPLACEMENT_CHARACTER);
        self.advance(events, byte);
    }

    fn enter(&mut self, state: State) {
        self.state = state;
    }

    fn enter_string<E: ParserEvents>(&mut self, events: &mut E, kind: StringKind) {
        events.start_string(kind);
        self.state = State::SosPmApcString(kind);
        self.string_esc = false;
    }

    // ── Escape ──────────────────────────────────────────────────────

    fn advance_escape<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        match byte {
            0x18 | 0x1A => {
                events.execute(byte);
                self.state = State::Ground;
            }
            0x1B => {} // ESC ESC restarts
            0x20..=0x2F => {
                events.collect(byte);
                self.state = State::EscapeIntermediate;
            }
            b'[' => self.enter(State::CsiEntry),
            b']' => {
                events.start_osc();
                self.enter(State::OscString);
            }
            b'P' => self.enter(State::DcsEntry),
            b'X' => self.enter_string(events, StringKind::Sos),
            b'^' => self.enter_string(events, StringKind::Pm),
            b'_' => self.enter_string(events, StringKind::Apc),
            0x30..=0x7E => {
                self.state = State::Ground;
                events.dispatch_esc(byte);
            }
            _ => {
                self.state = State::Ground;
                events.parse_error("unexpected byte after ESC");
            }
        }
    }

    fn advance_escape_intermediate<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        match byte {
            0x18 | 0x1A => {
                events.execute(byte);
                self.state = State::Ground;
            }
            0x1B => self.state = State::Escape,
            0x20..=0x2F => events.collect(byte),
            0x30..=0x7E => {
                self.state = State::Ground;
                events.dispatch_esc(byte);
            }
            _ => {
                self.state = State::Ground;
                events.parse_error("unexpected byte in ESC intermediate");
            }
        }
    }

    // ── CSI ─────────────────────────────────────────────────────────

    /// C0 handling shared by the CSI/DCS collecting states: most controls
    /// execute immediately, CAN/SUB abort, ESC restarts.
    fn sequence_control<E: ParserEvents>(&mut self, events: &mut E, byte: u8) -> bool {
        match byte {
            0x18 | 0x1A => {
                events.execute(byte);
                self.state = State::Ground;
                true
            }
            0x1B => {
                self.state = State::Escape;
                true
            }
            0x00..=0x1F => {
                events.execute(byte);
                true
            }
            _ => false,
        }
    }

    fn advance_csi_entry<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.sequence_control(events, byte) {
            return;
        }
        match byte {
            0x20..=0x2F => {
                events.collect(byte);
                self.state = State::CsiIntermediate;
            }
            b'0'..=b'9' => {
                events.param_digit(byte);
                self.state = State::CsiParam;
            }
            b';' => {
                events.param_separator();
                self.state = State::CsiParam;
            }
            b':' => {
                events.param_sub_separator();
                self.state = State::CsiParam;
            }
            0x3C..=0x3F => {
                events.collect_leader(byte);
                self.state = State::CsiParam;
            }
            0x40..=0x7E => {
                self.state = State::Ground;
                events.dispatch_csi(byte);
            }
            _ => self.state = State::CsiIgnore,
        }
    }

    fn advance_csi_param<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.sequence_control(events, byte) {
            return;
        }
        match byte {
            b'0'..=b'9' => events.param_digit(byte),
            b';' => events.param_separator(),
            b':' => events.param_sub_separator(),
            0x20..=0x2F => {
                events.collect(byte);
                self.state = State::CsiIntermediate;
            }
            0x3C..=0x3F => {
                // A second private marker mid-parameters is malformed.
                events.parse_error("private marker inside CSI parameters");
                self.state = State::CsiIgnore;
            }
            0x40..=0x7E => {
                self.state = State::Ground;
                events.dispatch_csi(byte);
            }
            _ => self.state = State::CsiIgnore,
        }
    }

    fn advance_csi_intermediate<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.sequence_control(events, byte) {
            return;
        }
        match byte {
            0x20..=0x2F => events.collect(byte),
            0x40..=0x7E => {
                self.state = State::Ground;
                events.dispatch_csi(byte);
            }
            _ => self.state = State::CsiIgnore,
        }
    }

    fn advance_csi_ignore<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.sequence_control(events, byte) {
            return;
        }
        if (0x40..=0x7E).contains(&byte) {
            self.state = State::Ground;
            events.parse_error("malformed CSI sequence dropped");
        }
    }

    // ── DCS ─────────────────────────────────────────────────────────

    fn advance_dcs_entry<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        match byte {
            0x18 | 0x1A => self.state = State::Ground,
            0x1B => self.state = State::Escape,
            0x20..=0x2F => {
                events.collect(byte);
                self.state = State::DcsIntermediate;
            }
            b'0'..=b'9' => {
                events.param_digit(byte);
                self.state = State::DcsParam;
            }
            b';' => {
                events.param_separator();
                self.state = State::DcsParam;
            }
            b':' => {
                events.param_sub_separator();
                self.state = State::DcsParam;
            }
            0x3C..=0x3F => {
                events.collect_leader(byte);
                self.state = State::DcsParam;
            }
            0x40..=0x7E => {
                events.hook_dcs(byte);
                self.state = State::DcsPassthrough;
                self.string_esc = false;
            }
            _ => self.state = State::DcsIgnore,
        }
    }

    fn advance_dcs_param<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        match byte {
            0x18 | 0x1A => self.state = State::Ground,
            0x1B => self.state = State::Escape,
            b'0'..=b'9' => events.param_digit(byte),
            b';' => events.param_separator(),
            b':' => events.param_sub_separator(),
            0x20..=0x2F => {
                events.collect(byte);
                self.state = State::DcsIntermediate;
            }
            0x40..=0x7E => {
                events.hook_dcs(byte);
                self.state = State::DcsPassthrough;
                self.string_esc = false;
            }
            _ => self.state = State::DcsIgnore,
        }
    }

    fn advance_dcs_intermediate<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        match byte {
            0x18 | 0x1A => self.state = State::Ground,
            0x1B => self.state = State::Escape,
            0x20..=0x2F => events.collect(byte),
            0x40..=0x7E => {
                events.hook_dcs(byte);
                self.state = State::DcsPassthrough;
                self.string_esc = false;
            }
            _ => self.state = State::DcsIgnore,
        }
    }

    fn advance_dcs_passthrough<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                events.unhook_dcs();
                self.state = State::Ground;
            } else {
                // Not ST after all: the ESC belongs to the payload.
                events.put_dcs(0x1B);
                events.put_dcs(byte);
            }
            return;
        }
        match byte {
            0x1B => self.string_esc = true,
            0x9C => {
                events.unhook_dcs();
                self.state = State::Ground;
            }
            0x18 | 0x1A => {
                events.unhook_dcs();
                self.state = State::Ground;
            }
            _ => events.put_dcs(byte),
        }
    }

    fn advance_dcs_ignore<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                self.state = State::Ground;
                events.parse_error("malformed DCS sequence dropped");
            }
            return;
        }
        match byte {
            0x1B => self.string_esc = true,
            0x9C | 0x18 | 0x1A => {
                self.state = State::Ground;
                events.parse_error("malformed DCS sequence dropped");
            }
            _ => {}
        }
    }

    // ── OSC / SOS / PM / APC strings ────────────────────────────────

    fn advance_osc<E: ParserEvents>(&mut self, events: &mut E, byte: u8) {
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                events.dispatch_osc();
                self.state = State::Ground;
            } else {
                events.put_osc(0x1B);
                events.put_osc(byte);
            }
            return;
        }
        match byte {
            0x07 | 0x9C => {
                events.dispatch_osc();
                self.state = State::Ground;
            }
            0x1B => self.string_esc = true,
            0x18 | 0x1A => {
                // Aborted: the collected payload is dropped.
                events.parse_error("OSC aborted");
                self.state = State::Ground;
            }
            _ => events.put_osc(byte),
        }
    }

    fn advance_sos_pm_apc<E: ParserEvents>(&mut self, events: &mut E, byte: u8, _kind: StringKind) {
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                events.dispatch_string();
                self.state = State::Ground;
            } else {
                events.put_string(0x1B);
                events.put_string(byte);
            }
            return;
        }
        match byte {
            0x9C => {
                events.dispatch_string();
                self.state = State::Ground;
            }
            0x1B => self.string_esc = true,
            0x18 | 0x1A => {
                events.parse_error("control string aborted");
                self.state = State::Ground;
            }
            _ => events.put_string(byte),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every event as a readable token for assertions.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ParserEvents for Recorder {
        fn print(&mut self, ch: char) {
            self.events.push(format!("print:{ch}"));
        }
        fn print_run(&mut self, bytes: &[u8]) {
            self.events
                .push(format!("run:{}", String::from_utf8_lossy(bytes)));
        }
        fn execute(&mut self, byte: u8) {
            self.events.push(format!("exec:{byte:02x}"));
        }
        fn collect_leader(&mut self, byte: u8) {
            self.events.push(format!("leader:{}", byte as char));
        }
        fn collect(&mut self, byte: u8) {
            self.events.push(format!("collect:{}", byte as char));
        }
        fn param_digit(&mut self, byte: u8) {
            self.events.push(format!("digit:{}", byte as char));
        }
        fn param_separator(&mut self) {
            self.events.push("sep".into());
        }
        fn param_sub_separator(&mut self) {
            self.events.push("sub".into());
        }
        fn dispatch_esc(&mut self, final_byte: u8) {
            self.events.push(format!("esc:{}", final_byte as char));
        }
        fn dispatch_csi(&mut self, final_byte: u8) {
            self.events.push(format!("csi:{}", final_byte as char));
        }
        fn start_osc(&mut self) {
            self.events.push("osc-start".into());
        }
        fn put_osc(&mut self, byte: u8) {
            self.events.push(format!("osc:{}", byte as char));
        }
        fn dispatch_osc(&mut self) {
            self.events.push("osc-end".into());
        }
        fn hook_dcs(&mut self, final_byte: u8) {
            self.events.push(format!("hook:{}", final_byte as char));
        }
        fn put_dcs(&mut self, byte: u8) {
            self.events.push(format!("dcs:{}", byte as char));
        }
        fn unhook_dcs(&mut self) {
            self.events.push("unhook".into());
        }
        fn start_string(&mut self, kind: StringKind) {
            self.events.push(format!("str-start:{kind:?}"));
        }
        fn put_string(&mut self, byte: u8) {
            self.events.push(format!("str:{}", byte as char));
        }
        fn dispatch_string(&mut self) {
            self.events.push("str-end".into());
        }
        fn parse_error(&mut self, _message: &str) {
            self.events.push("error".into());
        }
    }

    fn record(bytes: &[u8]) -> Vec<String> {
        let mut parser = Parser::new();
        let mut rec = Recorder::default();
        parser.parse(&mut rec, bytes);
        rec.events
    }

    // ── Ground / print runs ─────────────────────────────────────────

    #[test]
    fn ascii_text_is_one_run() {
        assert_eq!(record(b"hello"), vec!["run:hello"]);
    }

    #[test]
    fn c0_controls_split_runs() {
        assert_eq!(
            record(b"ab\rcd"),
            vec!["run:ab", "exec:0d", "run:cd"]
        );
    }

    #[test]
    fn utf8_scalars_print_individually() {
        assert_eq!(
            record("aé中🎉".as_bytes()),
            vec!["run:a", "print:é", "print:中", "print:🎉"]
        );
    }

    #[test]
    fn utf8_split_across_feeds() {
        let mut parser = Parser::new();
        let mut rec = Recorder::default();
        parser.parse(&mut rec, &[0xC3]);
        assert!(rec.events.is_empty());
        parser.parse(&mut rec, &[0xA9]);
        assert_eq!(rec.events, vec!["print:é"]);
    }

    #[test]
    fn invalid_utf8_yields_replacement_and_resumes() {
        // 0xC3 then 'x': broken 2-byte sequence.
        assert_eq!(
            record(&[0xC3, b'x']),
            vec!["error", "print:\u{FFFD}", "run:x"]
        );
    }

    #[test]
    fn stray_continuation_byte_is_replaced() {
        assert_eq!(record(&[0xA9]), vec!["error", "print:\u{FFFD}"]);
    }

    #[test]
    fn del_is_ignored() {
        assert_eq!(record(&[0x7F]), Vec::<String>::new());
    }

    // ── ESC ─────────────────────────────────────────────────────────

    #[test]
    fn esc_final_dispatches() {
        assert_eq!(record(b"\x1bD"), vec!["esc:D"]);
        assert_eq!(record(b"\x1bM"), vec!["esc:M"]);
        assert_eq!(record(b"\x1b7"), vec!["esc:7"]);
    }

    #[test]
    fn esc_intermediate_collects() {
        assert_eq!(record(b"\x1b#8"), vec!["collect:#", "esc:8"]);
        assert_eq!(record(b"\x1b(B"), vec!["collect:(", "esc:B"]);
    }

    #[test]
    fn esc_esc_restarts() {
        assert_eq!(record(b"\x1b\x1bD"), vec!["esc:D"]);
    }

    // ── CSI ─────────────────────────────────────────────────────────

    #[test]
    fn csi_with_params_dispatches() {
        assert_eq!(
            record(b"\x1b[5;10H"),
            vec!["digit:5", "sep", "digit:1", "digit:0", "csi:H"]
        );
    }

    #[test]
    fn csi_leader_is_collected() {
        assert_eq!(
            record(b"\x1b[?25h"),
            vec!["leader:?", "digit:2", "digit:5", "csi:h"]
        );
    }

    #[test]
    fn csi_subparams_emit_sub_separator() {
        assert_eq!(
            record(b"\x1b[4:3m"),
            vec!["digit:4", "sub", "digit:3", "csi:m"]
        );
    }

    #[test]
    fn csi_intermediates_before_final() {
        assert_eq!(
            record(b"\x1b[2 q"),
            vec!["digit:2", "collect: ", "csi:q"]
        );
        assert_eq!(record(b"\x1b[!p"), vec!["collect:!", "csi:p"]);
    }

    #[test]
    fn csi_embedded_c0_executes_inline() {
        assert_eq!(
            record(b"\x1b[2\x08A"),
            vec!["digit:2", "exec:08", "csi:A"]
        );
    }

    #[test]
    fn csi_can_aborts() {
        assert_eq!(record(b"\x1b[2\x18Z"), vec!["digit:2", "exec:18", "run:Z"]);
    }

    #[test]
    fn csi_late_private_marker_is_dropped() {
        let events = record(b"\x1b[1;?2h");
        assert!(events.contains(&"error".to_string()));
        assert!(!events.iter().any(|e| e.starts_with("csi:")));
    }

    #[test]
    fn eight_bit_csi_introducer() {
        assert_eq!(record(&[0x9B, b'5', b'A']), vec!["digit:5", "csi:A"]);
    }

    #[test]
    fn eight_bit_c1_index_maps_to_esc_form() {
        assert_eq!(record(&[0x84]), vec!["esc:D"]);
        assert_eq!(record(&[0x8D]), vec!["esc:M"]);
    }

    // ── OSC ─────────────────────────────────────────────────────────

    #[test]
    fn osc_bel_terminated() {
        let events = record(b"\x1b]0;hi\x07");
        assert_eq!(events.first().unwrap(), "osc-start");
        assert_eq!(events.last().unwrap(), "osc-end");
        let payload: String = events
            .iter()
            .filter_map(|e| e.strip_prefix("osc:"))
            .collect();
        assert_eq!(payload, "0;hi");
    }

    #[test]
    fn osc_st_terminated() {
        let events = record(b"\x1b]8;;x\x1b\\");
        assert_eq!(events.last().unwrap(), "osc-end");
    }

    #[test]
    fn osc_esc_non_st_stays_in_payload() {
        let events = record(b"\x1b]0;a\x1bb\x07");
        let payload: String = events
            .iter()
            .filter_map(|e| e.strip_prefix("osc:"))
            .collect();
        assert_eq!(payload, "0;a\u{1b}b");
    }

    #[test]
    fn osc_can_aborts_payload() {
        let events = record(b"\x1b]0;junk\x18");
        assert!(events.contains(&"error".to_string()));
        assert!(!events.contains(&"osc-end".to_string()));
    }

    // ── DCS ─────────────────────────────────────────────────────────

    #[test]
    fn dcs_hook_put_unhook() {
        assert_eq!(
            record(b"\x1bPq#0\x1b\\"),
            vec!["hook:q", "dcs:#", "dcs:0", "unhook"]
        );
    }

    #[test]
    fn dcs_with_params_and_leader() {
        assert_eq!(
            record(b"\x1bP1;2q\x1b\\"),
            vec!["digit:1", "sep", "digit:2", "hook:q", "unhook"]
        );
        assert_eq!(
            record(b"\x1bP+q544e\x1b\\"),
            vec![
                "collect:+",
                "hook:q",
                "dcs:5",
                "dcs:4",
                "dcs:4",
                "dcs:e",
                "unhook"
            ]
        );
    }

    #[test]
    fn dcs_cancel_unhooks() {
        assert_eq!(record(b"\x1bPqab\x18"), vec!["hook:q", "dcs:a", "dcs:b", "unhook"]);
    }

    // ── APC / PM / SOS ──────────────────────────────────────────────

    #[test]
    fn apc_string_collects_until_st() {
        assert_eq!(
            record(b"\x1b_Ga\x1b\\"),
            vec!["str-start:Apc", "str:G", "str:a", "str-end"]
        );
    }

    #[test]
    fn pm_and_sos_strings() {
        assert_eq!(
            record(b"\x1b^p\x1b\\"),
            vec!["str-start:Pm", "str:p", "str-end"]
        );
        assert_eq!(
            record(b"\x1bXs\x1b\\"),
            vec!["str-start:Sos", "str:s", "str-end"]
        );
    }

    // ── State queries ───────────────────────────────────────────────

    #[test]
    fn is_ground_tracks_pending_sequences() {
        let mut parser = Parser::new();
        let mut rec = Recorder::default();
        assert!(parser.is_ground());
        parser.parse(&mut rec, b"\x1b[");
        assert!(!parser.is_ground());
        parser.parse(&mut rec, b"m");
        assert!(parser.is_ground());
    }

    #[test]
    fn chunked_parse_equals_single_parse() {
        let input: &[u8] = b"a\x1b[1;31mred\x1b[0m\x1b]0;t\x07tail";
        let whole = record(input);
        let mut parser = Parser::new();
        let mut rec = Recorder::default();
        for chunk in input.chunks(3) {
            parser.parse(&mut rec, chunk);
        }
        // Runs may split differently across chunks; compare flattened text.
        let flatten = |events: &[String]| {
            events
                .iter()
                .map(|e| match e.split_once(':') {
                    Some(("run", text)) => text
                        .chars()
                        .map(|c| format!("print:{c}"))
                        .collect::<Vec<_>>()
                        .join(","),
                    _ => e.clone(),
                })
                .collect::<Vec<_>>()
                .join(",")
        };
        assert_eq!(flatten(&whole), flatten(&rec.events));
    }
}
