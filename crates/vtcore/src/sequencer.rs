//! The sequencer: parser events in, screen operations out.
//!
//! Owns one reusable [`Sequence`] record. Parser events fill in the leader,
//! intermediates, and parameters; on a dispatch event the completed record is
//! handed to the screen (which resolves it against the function table). OSC
//! payloads buffer here; DCS payloads stream straight through to the screen's
//! hooked sub-parser so Sixel images never materialize as one giant byte
//! vector.

use crate::buffer::{BufferFragment, BufferObject};
use crate::parser::{Parser, ParserEvents, StringKind};
use crate::screen::{Screen, SequenceResult};
use crate::sequence::{Sequence, SequenceCategory};

/// Upper bound for buffered OSC payloads; excess bytes are dropped.
const MAX_OSC_LENGTH: usize = 1 << 20;

/// Sequence-assembly state shared across feeds.
#[derive(Debug, Default)]
pub struct Sequencer {
    sequence: Sequence,
    collecting: bool,
    /// Completed sequences since construction (tracing, single-stepping).
    instruction_counter: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instruction_counter(&self) -> u64 {
        self.instruction_counter
    }

    /// Feed a byte slice through `parser` into `screen`.
    ///
    /// Returns the number of sequences dispatched. Pass the backing `chunk`
    /// (with `offset` locating `bytes` inside it) to let printable runs reach
    /// the grid zero-copy; without it, runs degrade to per-character prints.
    pub fn process(
        &mut self,
        parser: &mut Parser,
        screen: &mut Screen,
        bytes: &[u8],
        chunk: Option<(&BufferObject, usize)>,
    ) -> u64 {
        let before = self.instruction_counter;
        let mut dispatch = Dispatch {
            sequencer: self,
            screen,
            feed_base: bytes.as_ptr() as usize,
            chunk,
        };
        parser.parse(&mut dispatch, bytes);
        self.instruction_counter - before
    }

    /// Single-byte variant for single-step execution.
    pub fn process_byte(&mut self, parser: &mut Parser, screen: &mut Screen, byte: u8) -> u64 {
        self.process(parser, screen, &[byte], None)
    }

    fn begin(&mut self) {
        if !self.collecting {
            self.sequence.reset(SequenceCategory::Esc);
            self.collecting = true;
        }
    }

    fn finish(&mut self) {
        self.collecting = false;
        self.instruction_counter += 1;
    }
}

/// Borrowed event adapter binding one feed to the screen.
struct Dispatch<'a> {
    sequencer: &'a mut Sequencer,
    screen: &'a mut Screen,
    /// Address of the fed slice, for locating runs inside `chunk`.
    feed_base: usize,
    chunk: Option<(&'a BufferObject, usize)>,
}

impl Dispatch<'_> {
    fn seq(&mut self) -> &mut Sequence {
        self.sequencer.begin();
        &mut self.sequencer.sequence
    }
}

impl ParserEvents for Dispatch<'_> {
    fn print(&mut self, ch: char) {
        self.screen.print(ch);
    }

    fn print_run(&mut self, bytes: &[u8]) {
        match self.chunk {
            Some((chunk, offset)) => {
                let start = bytes.as_ptr() as usize - self.feed_base + offset;
                let fragment = BufferFragment::new(chunk.clone(), start..start + bytes.len());
                self.screen.print_run(fragment);
            }
            None => {
                for &b in bytes {
                    self.screen.print(b as char);
                }
            }
        }
    }

    fn execute(&mut self, byte: u8) {
        self.screen.execute_control(byte);
    }

    fn collect_leader(&mut self, byte: u8) {
        let seq = self.seq();
        if seq.leader.is_none() {
            seq.leader = Some(byte);
        }
    }

    fn collect(&mut self, byte: u8) {
        let seq = self.seq();
        if seq.intermediates.len() < 4 {
            seq.intermediates.push(byte);
        }
    }

    fn param_digit(&mut self, byte: u8) {
        self.seq().params.push_digit(byte);
    }

    fn param_separator(&mut self) {
        self.seq().params.next_param();
    }

    fn param_sub_separator(&mut self) {
        self.seq().params.next_sub_param();
    }

    fn dispatch_esc(&mut self, final_byte: u8) {
        let seq = self.seq();
        seq.category = SequenceCategory::Esc;
        seq.final_byte = final_byte;
        let result = self.screen.apply(&self.sequencer.sequence);
        log_result(result, &self.sequencer.sequence);
        self.sequencer.finish();
    }

    fn dispatch_csi(&mut self, final_byte: u8) {
        let seq = self.seq();
        seq.category = SequenceCategory::Csi;
        seq.final_byte = final_byte;
        let result = self.screen.apply(&self.sequencer.sequence);
        log_result(result, &self.sequencer.sequence);
        self.sequencer.finish();
    }

    fn start_osc(&mut self) {
        self.sequencer.sequence.reset(SequenceCategory::Osc);
        self.sequencer.collecting = true;
    }

    fn put_osc(&mut self, byte: u8) {
        let seq = self.seq();
        if seq.payload.len() < MAX_OSC_LENGTH {
            seq.payload.push(byte);
        }
    }

    fn dispatch_osc(&mut self) {
        let _ = self.screen.apply_osc(&self.sequencer.sequence.payload);
        self.sequencer.finish();
    }

    fn hook_dcs(&mut self, final_byte: u8) {
        let seq = self.seq();
        seq.category = SequenceCategory::Dcs;
        seq.final_byte = final_byte;
        self.screen.hook(&self.sequencer.sequence);
    }

    fn put_dcs(&mut self, byte: u8) {
        self.screen.dcs_put(byte);
    }

    fn unhook_dcs(&mut self) {
        self.screen.dcs_unhook();
        self.sequencer.finish();
    }

    fn start_string(&mut self, _kind: StringKind) {
        self.sequencer.sequence.reset(SequenceCategory::Apc);
        self.sequencer.collecting = true;
    }

    fn put_string(&mut self, _byte: u8) {
        // APC/PM/SOS payloads are accepted and dropped.
    }

    fn dispatch_string(&mut self) {
        self.sequencer.finish();
    }

    fn parse_error(&mut self, message: &str) {
        tracing::debug!(message, "parse error");
        self.sequencer.collecting = false;
    }
}

fn log_result(result: SequenceResult, seq: &Sequence) {
    if result == SequenceResult::Invalid {
        tracing::warn!(
            final_byte = seq.final_byte,
            "sequence with unusable parameters, defaults applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CellLocation, PageSize};
    use crate::settings::Settings;
    use std::sync::Arc;

    fn screen(lines: u16, columns: u16) -> Screen {
        let mut settings = Settings::default();
        settings.page_size = PageSize::new(lines, columns);
        Screen::new(settings)
    }

    fn run(screen: &mut Screen, bytes: &[u8]) -> u64 {
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        sequencer.process(&mut parser, screen, bytes, None)
    }

    #[test]
    fn text_prints_through() {
        let mut s = screen(2, 10);
        run(&mut s, b"hi there");
        assert_eq!(s.line_text(0), "hi there");
    }

    #[test]
    fn csi_sequence_dispatches() {
        let mut s = screen(5, 10);
        let count = run(&mut s, b"\x1b[3;4H");
        assert_eq!(count, 1);
        assert_eq!(s.cursor().position, CellLocation::new(2, 3));
    }

    #[test]
    fn sgr_with_subparams_survives_assembly() {
        let mut s = screen(1, 5);
        run(&mut s, b"\x1b[4:3mX");
        let cell = s.grid().cell(CellLocation::new(0, 0)).unwrap();
        assert!(cell
            .flags
            .contains(crate::cell::CellFlags::CURLY_UNDERLINED));
    }

    #[test]
    fn leader_and_intermediates_route_correctly() {
        let mut s = screen(5, 10);
        run(&mut s, b"\x1b[?25l"); // DECRM
        assert!(!s.modes().cursor_visible());
        run(&mut s, b"\x1b[?25h");
        assert!(s.modes().cursor_visible());
    }

    #[test]
    fn sequence_state_resets_between_sequences() {
        let mut s = screen(5, 10);
        // A `?`-leader sequence followed by a plain one: the leader must not
        // leak into the second dispatch.
        run(&mut s, b"\x1b[?25l\x1b[2;2H");
        assert_eq!(s.cursor().position, CellLocation::new(1, 1));
    }

    #[test]
    fn osc_payload_reaches_screen() {
        let mut s = screen(2, 5);
        run(&mut s, b"\x1b]2;title text\x07");
        assert_eq!(s.window_title(), "title text");
    }

    #[test]
    fn dcs_payload_streams_to_subparser() {
        let mut s = screen(5, 10);
        run(&mut s, b"\x1bP$qm\x1b\\");
        let reply = s.take_replies();
        assert!(reply.starts_with(b"\x1bP1$r"));
    }

    #[test]
    fn sixel_via_full_pipeline() {
        let mut s = screen(5, 10);
        run(&mut s, b"\x1bPq~\x1b\\");
        assert_eq!(s.images().len(), 1);
    }

    #[test]
    fn print_run_goes_zero_copy_with_chunk() {
        let mut s = screen(2, 20);
        let chunk: BufferObject = Arc::new(b"zero copy line".to_vec());
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        let bytes = chunk.clone();
        sequencer.process(&mut parser, &mut s, &bytes, Some((&chunk, 0)));
        assert_eq!(s.line_text(0), "zero copy line");
        assert!(s.grid().page_line(0).unwrap().is_trivial());
    }

    #[test]
    fn chunk_offset_locates_partial_feeds() {
        let mut s = screen(2, 20);
        let chunk: BufferObject = Arc::new(b"XXhelloYY".to_vec());
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        let slice = &chunk[2..7];
        sequencer.process(&mut parser, &mut s, slice, Some((&chunk, 2)));
        assert_eq!(s.line_text(0), "hello");
    }

    #[test]
    fn instruction_counter_advances_per_sequence() {
        let mut s = screen(5, 10);
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        sequencer.process(&mut parser, &mut s, b"\x1b[1m\x1b[2J\x1b]0;t\x07", None);
        assert_eq!(sequencer.instruction_counter(), 3);
    }

    #[test]
    fn split_sequences_across_feeds() {
        let mut s = screen(5, 10);
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        sequencer.process(&mut parser, &mut s, b"\x1b[3", None);
        sequencer.process(&mut parser, &mut s, b";4H", None);
        assert_eq!(s.cursor().position, CellLocation::new(2, 3));
    }

    #[test]
    fn apc_strings_are_swallowed() {
        let mut s = screen(2, 10);
        run(&mut s, b"\x1b_Gsome=payload\x1b\\after");
        assert_eq!(s.line_text(0), "after");
    }
}
