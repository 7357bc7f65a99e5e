//! Grid lines with two storage representations.
//!
//! The hot path for program output is "append printable ASCII with the
//! current SGR to the end of the line". A *trivial* line captures exactly
//! that: a pinned [`BufferFragment`] of the input chunk, one uniform
//! attribute set, and a used-column count. Anything else — writes into the
//! middle, mixed attributes, combining marks, wide characters — promotes the
//! line to an *inflated* per-cell array. Promotion is one-way; a line never
//! goes back to trivial.

use bitflags::bitflags;

use crate::buffer::BufferFragment;
use crate::cell::{Cell, HyperlinkId, SgrAttrs};

bitflags! {
    /// Per-line flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LineFlags: u8 {
        /// Participates in reflow on resize.
        const WRAPPABLE = 1 << 0;
        /// Soft continuation of the previous line (set by auto-wrap).
        const WRAPPED   = 1 << 1;
        /// User-set mark (vi `mm`, prompt marks).
        const MARKED    = 1 << 2;
    }
}

/// Trivial storage: pinned ASCII text + one attribute set.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrivialLine {
    /// Printable-ASCII bytes; one byte per column.
    fragment: BufferFragment,
    attrs: SgrAttrs,
    hyperlink: HyperlinkId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineStorage {
    Trivial(TrivialLine),
    Inflated(Vec<Cell>),
}

/// One grid line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    storage: LineStorage,
    columns: u16,
    pub flags: LineFlags,
}

impl Line {
    /// A blank line of the given width (trivial, default attributes).
    pub fn blank(columns: u16) -> Self {
        Self::filled(columns, SgrAttrs::default())
    }

    /// A blank line whose whole width renders with `attrs` (BCE fill).
    pub fn filled(columns: u16, attrs: SgrAttrs) -> Self {
        Self {
            storage: LineStorage::Trivial(TrivialLine {
                fragment: BufferFragment::from_bytes(b""),
                attrs,
                hyperlink: 0,
            }),
            columns,
            flags: LineFlags::WRAPPABLE,
        }
    }

    /// A line built from explicit cells (reflow, tests).
    pub fn from_cells(columns: u16, mut cells: Vec<Cell>, flags: LineFlags) -> Self {
        cells.resize(columns as usize, Cell::default());
        Self {
            storage: LineStorage::Inflated(cells),
            columns,
            flags,
        }
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn is_trivial(&self) -> bool {
        matches!(self.storage, LineStorage::Trivial(_))
    }

    /// Columns holding content: the fragment length for trivial lines, the
    /// position after the last non-blank cell for inflated ones.
    pub fn used_columns(&self) -> u16 {
        match &self.storage {
            LineStorage::Trivial(t) => t.fragment.len() as u16,
            LineStorage::Inflated(cells) => {
                let mut used = 0u16;
                let mut col = 0u16;
                for cell in cells {
                    col += u16::from(cell.width().max(if cell.is_wide_continuation() {
                        0
                    } else {
                        1
                    }));
                    if !cell.is_blank() || cell.attrs() != SgrAttrs::default() {
                        used = col.min(self.columns);
                    }
                }
                used
            }
        }
    }

    /// Whether the line holds no visible content at all.
    pub fn is_blank(&self) -> bool {
        match &self.storage {
            LineStorage::Trivial(t) => t.fragment.is_empty(),
            LineStorage::Inflated(cells) => cells.iter().all(Cell::is_blank),
        }
    }

    // ── Trivial path ────────────────────────────────────────────────

    /// Try to append a printable-ASCII run without inflating.
    ///
    /// Succeeds only when the line is still trivial, the attributes match the
    /// line's (or the line is empty), and the run fits before `right_margin`
    /// (exclusive). Adjacent fragments from the same chunk merge in place.
    pub fn try_append_trivial(
        &mut self,
        fragment: BufferFragment,
        attrs: SgrAttrs,
        hyperlink: HyperlinkId,
        right_margin: u16,
    ) -> bool {
        let LineStorage::Trivial(trivial) = &mut self.storage else {
            return false;
        };
        let used = trivial.fragment.len();
        if used + fragment.len() > usize::from(right_margin.min(self.columns)) {
            return false;
        }
        if used == 0 {
            trivial.fragment = fragment;
            trivial.attrs = attrs;
            trivial.hyperlink = hyperlink;
            return true;
        }
        if trivial.attrs != attrs || trivial.hyperlink != hyperlink {
            return false;
        }
        if trivial.fragment.is_adjacent(&fragment) {
            trivial.fragment.grow(&fragment);
            return true;
        }
        false
    }

    /// Trivial text + its uniform attributes, if the line is trivial.
    pub fn trivial_view(&self) -> Option<(&[u8], SgrAttrs, HyperlinkId)> {
        match &self.storage {
            LineStorage::Trivial(t) => Some((t.fragment.bytes(), t.attrs, t.hyperlink)),
            LineStorage::Inflated(_) => None,
        }
    }

    // ── Inflation ───────────────────────────────────────────────────

    /// Promote to per-cell storage (no-op when already inflated).
    pub fn inflate(&mut self) -> &mut Vec<Cell> {
        if let LineStorage::Trivial(t) = &self.storage {
            let mut cells = Vec::with_capacity(self.columns as usize);
            for &b in t.fragment.bytes() {
                let mut cell = Cell::with_attrs(b as char, 1, t.attrs);
                cell.hyperlink = t.hyperlink;
                cells.push(cell);
            }
            let fill = Cell::with_attrs(' ', 1, t.attrs);
            cells.resize(self.columns as usize, fill);
            self.storage = LineStorage::Inflated(cells);
        }
        match &mut self.storage {
            LineStorage::Inflated(cells) => cells,
            LineStorage::Trivial(_) => unreachable!("inflate just converted"),
        }
    }

    /// Mutable cell access; inflates on demand.
    pub fn cell_mut(&mut self, col: u16) -> Option<&mut Cell> {
        if col >= self.columns {
            return None;
        }
        let cells = self.inflate();
        cells.get_mut(col as usize)
    }

    /// Cell value at `col` without mutating the representation.
    pub fn cell(&self, col: u16) -> Option<Cell> {
        if col >= self.columns {
            return None;
        }
        match &self.storage {
            LineStorage::Trivial(t) => {
                let mut cell = match t.fragment.bytes().get(col as usize) {
                    Some(&b) => Cell::with_attrs(b as char, 1, t.attrs),
                    None => Cell::with_attrs(' ', 1, t.attrs),
                };
                cell.hyperlink = t.hyperlink;
                Some(cell)
            }
            LineStorage::Inflated(cells) => cells.get(col as usize).cloned(),
        }
    }

    /// Inflated cell slice, if inflated.
    pub fn cells(&self) -> Option<&[Cell]> {
        match &self.storage {
            LineStorage::Trivial(_) => None,
            LineStorage::Inflated(cells) => Some(cells),
        }
    }

    /// Owned cell vector for reflow (consumes the representation lazily).
    pub fn to_cells(&self) -> Vec<Cell> {
        match &self.storage {
            LineStorage::Trivial(t) => {
                let mut cells: Vec<Cell> = t
                    .fragment
                    .bytes()
                    .iter()
                    .map(|&b| {
                        let mut cell = Cell::with_attrs(b as char, 1, t.attrs);
                        cell.hyperlink = t.hyperlink;
                        cell
                    })
                    .collect();
                let fill = Cell::with_attrs(' ', 1, t.attrs);
                cells.resize(self.columns as usize, fill);
                cells
            }
            LineStorage::Inflated(cells) => cells.clone(),
        }
    }

    // ── Whole-line operations ───────────────────────────────────────

    /// Reset to a blank trivial line filled with `attrs`, keeping the width.
    ///
    /// This is the scroll-fill path, so it may legally return an inflated
    /// line to trivial storage: the line's identity is replaced wholesale.
    pub fn reset(&mut self, attrs: SgrAttrs) {
        let columns = self.columns;
        *self = Self::filled(columns, attrs);
    }

    /// Change the width, truncating or padding inflated storage.
    pub fn set_columns(&mut self, columns: u16) {
        self.columns = columns;
        if let LineStorage::Inflated(cells) = &mut self.storage {
            cells.resize(columns as usize, Cell::default());
        }
    }

    /// Plain text of the line (combining marks included, continuations
    /// skipped), trailing blanks trimmed.
    pub fn text(&self) -> String {
        match &self.storage {
            LineStorage::Trivial(t) => String::from_utf8_lossy(t.fragment.bytes()).into_owned(),
            LineStorage::Inflated(cells) => {
                let mut out = String::new();
                for cell in cells {
                    if cell.is_wide_continuation() {
                        continue;
                    }
                    out.extend(cell.codepoints());
                }
                out.truncate(out.trim_end_matches(' ').len());
                out
            }
        }
    }

    pub fn is_wrapped(&self) -> bool {
        self.flags.contains(LineFlags::WRAPPED)
    }

    pub fn set_wrapped(&mut self, wrapped: bool) {
        self.flags.set(LineFlags::WRAPPED, wrapped);
    }

    pub fn is_marked(&self) -> bool {
        self.flags.contains(LineFlags::MARKED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellFlags, Color};

    fn frag(text: &str) -> BufferFragment {
        BufferFragment::from_bytes(text.as_bytes())
    }

    // ── Trivial path ────────────────────────────────────────────────

    #[test]
    fn blank_line_is_trivial_and_empty() {
        let line = Line::blank(80);
        assert!(line.is_trivial());
        assert!(line.is_blank());
        assert_eq!(line.used_columns(), 0);
    }

    #[test]
    fn trivial_append_sets_text_and_attrs() {
        let mut line = Line::blank(10);
        let mut attrs = SgrAttrs::default();
        attrs.flags = CellFlags::BOLD;
        assert!(line.try_append_trivial(frag("hello"), attrs, 0, 10));
        assert!(line.is_trivial());
        assert_eq!(line.text(), "hello");
        assert_eq!(line.used_columns(), 5);
        assert_eq!(line.cell(0).unwrap().content(), 'h');
        assert!(line.cell(0).unwrap().flags.contains(CellFlags::BOLD));
    }

    #[test]
    fn trivial_append_rejects_attr_change() {
        let mut line = Line::blank(20);
        assert!(line.try_append_trivial(frag("abc"), SgrAttrs::default(), 0, 20));
        let mut bold = SgrAttrs::default();
        bold.flags = CellFlags::BOLD;
        assert!(!line.try_append_trivial(frag("def"), bold, 0, 20));
        assert!(line.is_trivial(), "failed append must not inflate by itself");
    }

    #[test]
    fn trivial_append_rejects_overflow() {
        let mut line = Line::blank(4);
        assert!(!line.try_append_trivial(frag("hello"), SgrAttrs::default(), 0, 4));
    }

    #[test]
    fn trivial_append_respects_right_margin() {
        let mut line = Line::blank(80);
        assert!(!line.try_append_trivial(frag("abcdef"), SgrAttrs::default(), 0, 5));
        assert!(line.try_append_trivial(frag("abcde"), SgrAttrs::default(), 0, 5));
    }

    #[test]
    fn adjacent_fragments_merge_without_copy() {
        let chunk = std::sync::Arc::new(b"abcdef".to_vec());
        let mut line = Line::blank(10);
        let a = BufferFragment::new(chunk.clone(), 0..3);
        let b = BufferFragment::new(chunk, 3..6);
        assert!(line.try_append_trivial(a, SgrAttrs::default(), 0, 10));
        assert!(line.try_append_trivial(b, SgrAttrs::default(), 0, 10));
        assert!(line.is_trivial());
        assert_eq!(line.text(), "abcdef");
    }

    // ── Inflation ───────────────────────────────────────────────────

    #[test]
    fn inflate_preserves_text_and_attrs() {
        let mut line = Line::blank(8);
        let mut attrs = SgrAttrs::default();
        attrs.fg = Color::Indexed(1);
        assert!(line.try_append_trivial(frag("hi"), attrs, 0, 8));
        line.inflate();
        assert!(!line.is_trivial());
        assert_eq!(line.text(), "hi");
        assert_eq!(line.cell(0).unwrap().fg, Color::Indexed(1));
        // Fill cells carry the line attributes too.
        assert_eq!(line.cell(5).unwrap().fg, Color::Indexed(1));
    }

    #[test]
    fn cell_mut_inflates() {
        let mut line = Line::blank(5);
        assert!(line.try_append_trivial(frag("abc"), SgrAttrs::default(), 0, 5));
        line.cell_mut(1).unwrap().set_content('X', 1);
        assert!(!line.is_trivial());
        assert_eq!(line.text(), "aXc");
    }

    #[test]
    fn inflation_is_one_way() {
        let mut line = Line::blank(5);
        line.inflate();
        assert!(!line.is_trivial());
        assert!(!line.try_append_trivial(frag("x"), SgrAttrs::default(), 0, 5));
    }

    #[test]
    fn reset_returns_to_trivial_fill() {
        let mut line = Line::blank(5);
        line.cell_mut(0).unwrap().set_content('X', 1);
        let mut attrs = SgrAttrs::default();
        attrs.bg = Color::Indexed(4);
        line.reset(attrs);
        assert!(line.is_trivial());
        assert!(line.is_blank());
        assert_eq!(line.cell(3).unwrap().bg, Color::Indexed(4));
    }

    // ── Measurements ────────────────────────────────────────────────

    #[test]
    fn used_columns_on_inflated_line() {
        let mut line = Line::blank(10);
        line.cell_mut(4).unwrap().set_content('Z', 1);
        assert_eq!(line.used_columns(), 5);
    }

    #[test]
    fn text_skips_wide_continuations() {
        let mut line = Line::blank(6);
        let (lead, cont) = Cell::wide('中', SgrAttrs::default());
        let cells = line.inflate();
        cells[0] = lead;
        cells[1] = cont;
        assert_eq!(line.text(), "中");
    }

    #[test]
    fn wrapped_flag_roundtrip() {
        let mut line = Line::blank(4);
        assert!(!line.is_wrapped());
        line.set_wrapped(true);
        assert!(line.is_wrapped());
    }
}
