//! The VT function table.
//!
//! Maps a completed sequence — category, leader, intermediates, final byte —
//! to the operation it names. The sequencer performs exactly one lookup per
//! dispatch; parameter validation happens later, in the screen, so that an
//! unknown sequence and a known-but-malformed one are reported differently.

use crate::sequence::{Sequence, SequenceCategory};

/// Every escape/control function the screen implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Function {
    // ── ESC-level ───────────────────────────────────────────────────
    /// `ESC 7` — save cursor.
    DECSC,
    /// `ESC 8` — restore cursor.
    DECRC,
    /// `ESC D` — index (cursor down, scroll at margin).
    IND,
    /// `ESC E` — next line.
    NEL,
    /// `ESC H` — set tab stop at cursor.
    HTS,
    /// `ESC M` — reverse index.
    RI,
    /// `ESC N` — single shift G2.
    SS2,
    /// `ESC O` — single shift G3.
    SS3,
    /// `ESC c` — hard reset.
    RIS,
    /// `ESC =` — application keypad.
    DECKPAM,
    /// `ESC >` — numeric keypad.
    DECKPNM,
    /// `ESC 6` — back index.
    DECBI,
    /// `ESC 9` — forward index.
    DECFI,
    /// `ESC # 8` — screen alignment fill.
    DECALN,
    /// `ESC ( F` / `ESC ) F` / `ESC * F` / `ESC + F` — designate G0..G3.
    SCS { slot: u8 },

    // ── CSI: cursor motion ──────────────────────────────────────────
    CUU,
    CUD,
    CUF,
    CUB,
    CNL,
    CPL,
    CHA,
    CUP,
    CHT,
    CBT,
    HPA,
    HPR,
    VPA,
    VPR,
    HVP,

    // ── CSI: erase / edit ───────────────────────────────────────────
    ED,
    DECSED,
    EL,
    DECSEL,
    ECH,
    ICH,
    DCH,
    IL,
    DL,
    SU,
    SD,
    REP,
    DECIC,
    DECDC,

    // ── CSI: rectangular ────────────────────────────────────────────
    DECCRA,
    DECCARA,
    DECERA,
    DECFRA,
    DECSERA,

    // ── CSI: modes / margins / state ────────────────────────────────
    SM,
    RM,
    DECSM,
    DECRM,
    DECRQM,
    DECRQM_ANSI,
    XTSAVE,
    XTRESTORE,
    SGR,
    DECSTBM,
    DECSLRM,
    SCOSC,
    SCORC,
    DECSTR,
    DECSCL,
    DECSCUSR,
    DECSCA,
    DECSSDT,
    DECSASD,
    TBC,

    // ── CSI: reports / host ─────────────────────────────────────────
    DA1,
    DA2,
    DA3,
    DSR,
    DECDSR,
    XTWINOPS,
    XTSMGRAPHICS,
    XTVERSION,
    XTPUSHCOLORS,
    XTPOPCOLORS,
    XTREPORTCOLORS,

    // ── DCS ─────────────────────────────────────────────────────────
    /// `DCS ... q` — Sixel graphics.
    SIXEL,
    /// `DCS $ q ... ST` — request status string.
    DECRQSS,
    /// `DCS + q <hex> ST` — request termcap string.
    XTGETTCAP,
}

impl Function {
    /// Resolve a completed sequence against the table.
    pub fn select(seq: &Sequence) -> Option<Function> {
        match seq.category {
            SequenceCategory::Esc => select_esc(seq),
            SequenceCategory::Csi => select_csi(seq),
            SequenceCategory::Dcs => select_dcs(seq),
            // OSC is dispatched by its numeric code, APC/PM are ignored.
            _ => None,
        }
    }
}

fn select_esc(seq: &Sequence) -> Option<Function> {
    match (seq.intermediates(), seq.final_byte) {
        ([], b'7') => Some(Function::DECSC),
        ([], b'8') => Some(Function::DECRC),
        ([], b'D') => Some(Function::IND),
        ([], b'E') => Some(Function::NEL),
        ([], b'H') => Some(Function::HTS),
        ([], b'M') => Some(Function::RI),
        ([], b'N') => Some(Function::SS2),
        ([], b'O') => Some(Function::SS3),
        ([], b'c') => Some(Function::RIS),
        ([], b'=') => Some(Function::DECKPAM),
        ([], b'>') => Some(Function::DECKPNM),
        ([], b'6') => Some(Function::DECBI),
        ([], b'9') => Some(Function::DECFI),
        ([], b'\\') => None, // stray ST
        ([b'#'], b'8') => Some(Function::DECALN),
        ([b'('], _) => Some(Function::SCS { slot: 0 }),
        ([b')'], _) => Some(Function::SCS { slot: 1 }),
        ([b'*'], _) => Some(Function::SCS { slot: 2 }),
        ([b'+'], _) => Some(Function::SCS { slot: 3 }),
        _ => None,
    }
}

fn select_csi(seq: &Sequence) -> Option<Function> {
    let leader = seq.leader;
    match (leader, seq.intermediates(), seq.final_byte) {
        (None, [], b'@') => Some(Function::ICH),
        (None, [], b'A') => Some(Function::CUU),
        (None, [], b'B') => Some(Function::CUD),
        (None, [], b'C') => Some(Function::CUF),
        (None, [], b'D') => Some(Function::CUB),
        (None, [], b'E') => Some(Function::CNL),
        (None, [], b'F') => Some(Function::CPL),
        (None, [], b'G') => Some(Function::CHA),
        (None, [], b'H') => Some(Function::CUP),
        (None, [], b'I') => Some(Function::CHT),
        (None, [], b'J') => Some(Function::ED),
        (Some(b'?'), [], b'J') => Some(Function::DECSED),
        (None, [], b'K') => Some(Function::EL),
        (Some(b'?'), [], b'K') => Some(Function::DECSEL),
        (None, [], b'L') => Some(Function::IL),
        (None, [], b'M') => Some(Function::DL),
        (None, [], b'P') => Some(Function::DCH),
        (None, [], b'S') => Some(Function::SU),
        (Some(b'?'), [], b'S') => Some(Function::XTSMGRAPHICS),
        (None, [], b'T') => Some(Function::SD),
        (None, [], b'X') => Some(Function::ECH),
        (None, [], b'Z') => Some(Function::CBT),
        (None, [], b'`') => Some(Function::HPA),
        (None, [], b'a') => Some(Function::HPR),
        (None, [], b'b') => Some(Function::REP),
        (None, [], b'c') => Some(Function::DA1),
        (Some(b'>'), [], b'c') => Some(Function::DA2),
        (Some(b'='), [], b'c') => Some(Function::DA3),
        (None, [], b'd') => Some(Function::VPA),
        (None, [], b'e') => Some(Function::VPR),
        (None, [], b'f') => Some(Function::HVP),
        (None, [], b'g') => Some(Function::TBC),
        (None, [], b'h') => Some(Function::SM),
        (Some(b'?'), [], b'h') => Some(Function::DECSM),
        (None, [], b'l') => Some(Function::RM),
        (Some(b'?'), [], b'l') => Some(Function::DECRM),
        (None, [], b'm') => Some(Function::SGR),
        (None, [], b'n') => Some(Function::DSR),
        (Some(b'?'), [], b'n') => Some(Function::DECDSR),
        (None, [], b'r') => Some(Function::DECSTBM),
        (Some(b'?'), [], b'r') => Some(Function::XTRESTORE),
        // `CSI s` is SCOSC when parameterless, DECSLRM otherwise.
        (None, [], b's') => {
            if seq.params.is_empty() {
                Some(Function::SCOSC)
            } else {
                Some(Function::DECSLRM)
            }
        }
        (Some(b'?'), [], b's') => Some(Function::XTSAVE),
        (None, [], b't') => Some(Function::XTWINOPS),
        (None, [], b'u') => Some(Function::SCORC),
        (Some(b'>'), [], b'q') => Some(Function::XTVERSION),
        (None, [b' '], b'q') => Some(Function::DECSCUSR),
        (None, [b'"'], b'q') => Some(Function::DECSCA),
        (None, [b'!'], b'p') => Some(Function::DECSTR),
        (None, [b'"'], b'p') => Some(Function::DECSCL),
        (Some(b'?'), [b'$'], b'p') => Some(Function::DECRQM),
        (None, [b'$'], b'p') => Some(Function::DECRQM_ANSI),
        (None, [b'$'], b'v') => Some(Function::DECCRA),
        (None, [b'$'], b'r') => Some(Function::DECCARA),
        (None, [b'$'], b'z') => Some(Function::DECERA),
        (None, [b'$'], b'x') => Some(Function::DECFRA),
        (None, [b'$'], b'{') => Some(Function::DECSERA),
        (None, [b'$'], b'~') => Some(Function::DECSSDT),
        (None, [b'$'], b'}') => Some(Function::DECSASD),
        (None, [b'\''], b'}') => Some(Function::DECIC),
        (None, [b'\''], b'~') => Some(Function::DECDC),
        (None, [b'#'], b'P') => Some(Function::XTPUSHCOLORS),
        (None, [b'#'], b'Q') => Some(Function::XTPOPCOLORS),
        (None, [b'#'], b'R') => Some(Function::XTREPORTCOLORS),
        _ => None,
    }
}

fn select_dcs(seq: &Sequence) -> Option<Function> {
    match (seq.leader, seq.intermediates(), seq.final_byte) {
        (None, [b'$'], b'q') => Some(Function::DECRQSS),
        (None, [b'+'], b'q') => Some(Function::XTGETTCAP),
        (None, [], b'q') => Some(Function::SIXEL),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(category: SequenceCategory, build: impl FnOnce(&mut Sequence)) -> Sequence {
        let mut s = Sequence::default();
        s.reset(category);
        build(&mut s);
        s
    }

    fn csi(final_byte: u8) -> Sequence {
        seq(SequenceCategory::Csi, |s| s.final_byte = final_byte)
    }

    fn csi_with(leader: Option<u8>, intermediates: &[u8], final_byte: u8) -> Sequence {
        seq(SequenceCategory::Csi, |s| {
            s.leader = leader;
            s.intermediates.extend_from_slice(intermediates);
            s.final_byte = final_byte;
        })
    }

    #[test]
    fn esc_finals_resolve() {
        let s = seq(SequenceCategory::Esc, |s| s.final_byte = b'7');
        assert_eq!(Function::select(&s), Some(Function::DECSC));
        let s = seq(SequenceCategory::Esc, |s| s.final_byte = b'M');
        assert_eq!(Function::select(&s), Some(Function::RI));
    }

    #[test]
    fn esc_charset_designation_keeps_slot() {
        let s = seq(SequenceCategory::Esc, |s| {
            s.intermediates.push(b')');
            s.final_byte = b'0';
        });
        assert_eq!(Function::select(&s), Some(Function::SCS { slot: 1 }));
    }

    #[test]
    fn csi_cursor_motions_resolve() {
        assert_eq!(Function::select(&csi(b'A')), Some(Function::CUU));
        assert_eq!(Function::select(&csi(b'H')), Some(Function::CUP));
        assert_eq!(Function::select(&csi(b'`')), Some(Function::HPA));
    }

    #[test]
    fn leader_distinguishes_private_forms() {
        assert_eq!(Function::select(&csi(b'h')), Some(Function::SM));
        assert_eq!(
            Function::select(&csi_with(Some(b'?'), &[], b'h')),
            Some(Function::DECSM)
        );
        assert_eq!(
            Function::select(&csi_with(Some(b'?'), &[], b'J')),
            Some(Function::DECSED)
        );
        assert_eq!(
            Function::select(&csi_with(Some(b'>'), &[], b'c')),
            Some(Function::DA2)
        );
        assert_eq!(
            Function::select(&csi_with(Some(b'='), &[], b'c')),
            Some(Function::DA3)
        );
    }

    #[test]
    fn intermediates_distinguish_rectangle_ops() {
        assert_eq!(
            Function::select(&csi_with(None, b"$", b'v')),
            Some(Function::DECCRA)
        );
        assert_eq!(
            Function::select(&csi_with(None, b"$", b'x')),
            Some(Function::DECFRA)
        );
        assert_eq!(
            Function::select(&csi_with(None, b"$", b'{')),
            Some(Function::DECSERA)
        );
        assert_eq!(
            Function::select(&csi_with(None, b"'", b'}')),
            Some(Function::DECIC)
        );
    }

    #[test]
    fn csi_s_splits_on_parameters() {
        assert_eq!(Function::select(&csi(b's')), Some(Function::SCOSC));
        let with_params = seq(SequenceCategory::Csi, |s| {
            s.params.push_digit(b'1');
            s.final_byte = b's';
        });
        assert_eq!(Function::select(&with_params), Some(Function::DECSLRM));
    }

    #[test]
    fn decrqm_dec_and_ansi_variants() {
        assert_eq!(
            Function::select(&csi_with(Some(b'?'), b"$", b'p')),
            Some(Function::DECRQM)
        );
        assert_eq!(
            Function::select(&csi_with(None, b"$", b'p')),
            Some(Function::DECRQM_ANSI)
        );
    }

    #[test]
    fn dcs_subparser_selection() {
        let sixel = seq(SequenceCategory::Dcs, |s| s.final_byte = b'q');
        assert_eq!(Function::select(&sixel), Some(Function::SIXEL));
        let rqss = seq(SequenceCategory::Dcs, |s| {
            s.intermediates.push(b'$');
            s.final_byte = b'q';
        });
        assert_eq!(Function::select(&rqss), Some(Function::DECRQSS));
        let tcap = seq(SequenceCategory::Dcs, |s| {
            s.intermediates.push(b'+');
            s.final_byte = b'q';
        });
        assert_eq!(Function::select(&tcap), Some(Function::XTGETTCAP));
    }

    #[test]
    fn unknown_sequences_resolve_to_none() {
        assert_eq!(Function::select(&csi(b'y')), None);
        let unknown = seq(SequenceCategory::Esc, |s| s.final_byte = b'z');
        assert_eq!(Function::select(&unknown), None);
    }

    #[test]
    fn color_stack_ops_resolve() {
        assert_eq!(
            Function::select(&csi_with(None, b"#", b'P')),
            Some(Function::XTPUSHCOLORS)
        );
        assert_eq!(
            Function::select(&csi_with(None, b"#", b'Q')),
            Some(Function::XTPOPCOLORS)
        );
    }
}
