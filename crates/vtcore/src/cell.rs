//! Terminal cell: the fundamental unit of the grid.
//!
//! Each cell stores a codepoint sequence (primary scalar plus any combining
//! marks), its display width, SGR attributes, an optional hyperlink id, and an
//! optional image fragment. Rarely-populated payload (combining marks, image
//! fragments) lives behind one `Box` so the common cell stays small.

use std::collections::HashMap;

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use crate::image::ImageFragment;
use crate::sequence::{Param, Params};

bitflags! {
    /// Per-cell rendition flags.
    ///
    /// The low bits map directly to ECMA-48 / DEC SGR parameters; the two
    /// `WIDE_*` bits mark double-width cell pairs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u32 {
        const BOLD               = 1 << 0;
        const FAINT              = 1 << 1;
        const ITALIC             = 1 << 2;
        const UNDERLINE          = 1 << 3;
        const DOUBLY_UNDERLINED  = 1 << 4;
        const CURLY_UNDERLINED   = 1 << 5;
        const DOTTED_UNDERLINED  = 1 << 6;
        const DASHED_UNDERLINED  = 1 << 7;
        const BLINKING           = 1 << 8;
        const RAPID_BLINKING     = 1 << 9;
        const INVERSE            = 1 << 10;
        const HIDDEN             = 1 << 11;
        const CROSSED_OUT        = 1 << 12;
        const FRAMED             = 1 << 13;
        const ENCIRCLED          = 1 << 14;
        const OVERLINE           = 1 << 15;
        /// DECSCA: selective-erase operations skip this cell.
        const CHARACTER_PROTECTED = 1 << 16;
        /// Leading (left) cell of a 2-column character.
        const WIDE_CHAR          = 1 << 17;
        /// Trailing continuation of a 2-column character; width 0.
        const WIDE_CONTINUATION  = 1 << 18;
    }
}

impl CellFlags {
    /// All underline-variant bits (cleared together by SGR 24 / `4:0`).
    pub const ANY_UNDERLINE: CellFlags = CellFlags::UNDERLINE
        .union(CellFlags::DOUBLY_UNDERLINED)
        .union(CellFlags::CURLY_UNDERLINED)
        .union(CellFlags::DOTTED_UNDERLINED)
        .union(CellFlags::DASHED_UNDERLINED);
}

/// Color of a cell's foreground, background, or underline.
///
/// The terminal color model hierarchy: default → bright 8 → 256 indexed →
/// 24-bit RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// Terminal default (SGR 39 / 49 / 59).
    #[default]
    Default,
    /// 256-color palette index (0-255; 0-15 are the named colors).
    Indexed(u8),
    /// Bright variant of the standard 8 (SGR 90-97 / 100-107).
    Bright(u8),
    /// 24-bit true color.
    Rgb(u8, u8, u8),
}

/// SGR attributes applied to newly written cells: flags plus colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SgrAttrs {
    pub flags: CellFlags,
    pub fg: Color,
    pub bg: Color,
    /// Underline color (SGR 58). `Default` means "use foreground".
    pub underline: Color,
}

impl SgrAttrs {
    /// Reset all attributes to default (SGR 0).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply one SGR parameter list (the payload of `CSI ... m`).
    ///
    /// Handles `;`-separated and `:`-sub-parameter forms for extended colors
    /// (`38;2;R;G;B`, `38:2::R:G:B`, `38;5;P`, `38:5:P`) and underline styles
    /// (`4:0..5`). An empty list is SGR 0.
    pub fn apply_sgr(&mut self, params: &Params) {
        if params.is_empty() {
            self.reset();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            let param = match params.get(i) {
                Some(p) => p,
                None => break,
            };
            let consumed = self.apply_one(param, params, i);
            i += consumed.max(1);
        }
    }

    /// Apply the parameter at position `index`; returns how many positions
    /// were consumed (1 except for semicolon-form extended colors).
    fn apply_one(&mut self, param: &Param, params: &Params, index: usize) -> usize {
        let value = param.value().unwrap_or(0);
        match value {
            0 => self.reset(),
            1 => self.flags.insert(CellFlags::BOLD),
            2 => self.flags.insert(CellFlags::FAINT),
            3 => self.flags.insert(CellFlags::ITALIC),
            4 => self.apply_underline_style(param),
            5 => self.flags.insert(CellFlags::BLINKING),
            6 => self.flags.insert(CellFlags::RAPID_BLINKING),
            7 => self.flags.insert(CellFlags::INVERSE),
            8 => self.flags.insert(CellFlags::HIDDEN),
            9 => self.flags.insert(CellFlags::CROSSED_OUT),
            21 => self.flags.insert(CellFlags::DOUBLY_UNDERLINED),
            22 => self.flags.remove(CellFlags::BOLD | CellFlags::FAINT),
            23 => self.flags.remove(CellFlags::ITALIC),
            24 => self.flags.remove(CellFlags::ANY_UNDERLINE),
            25 => self
                .flags
                .remove(CellFlags::BLINKING | CellFlags::RAPID_BLINKING),
            27 => self.flags.remove(CellFlags::INVERSE),
            28 => self.flags.remove(CellFlags::HIDDEN),
            29 => self.flags.remove(CellFlags::CROSSED_OUT),
            30..=37 => self.fg = Color::Indexed((value - 30) as u8),
            38 => {
                let (color, consumed) = parse_extended_color(param, params, index);
                if let Some(color) = color {
                    self.fg = color;
                }
                return consumed;
            }
            39 => self.fg = Color::Default,
            40..=47 => self.bg = Color::Indexed((value - 40) as u8),
            48 => {
                let (color, consumed) = parse_extended_color(param, params, index);
                if let Some(color) = color {
                    self.bg = color;
                }
                return consumed;
            }
            49 => self.bg = Color::Default,
            51 => self.flags.insert(CellFlags::FRAMED),
            52 => self.flags.insert(CellFlags::ENCIRCLED),
            53 => self.flags.insert(CellFlags::OVERLINE),
            54 => self.flags.remove(CellFlags::FRAMED | CellFlags::ENCIRCLED),
            55 => self.flags.remove(CellFlags::OVERLINE),
            58 => {
                let (color, consumed) = parse_extended_color(param, params, index);
                if let Some(color) = color {
                    self.underline = color;
                }
                return consumed;
            }
            59 => self.underline = Color::Default,
            90..=97 => self.fg = Color::Bright((value - 90) as u8),
            100..=107 => self.bg = Color::Bright((value - 100) as u8),
            _ => {}
        }
        1
    }

    /// SGR 4 with an optional `:n` style sub-parameter.
    fn apply_underline_style(&mut self, param: &Param) {
        let style = match param.sub(0) {
            None => 1,
            Some(n) => n,
        };
        self.flags.remove(CellFlags::ANY_UNDERLINE);
        let flag = match style {
            0 => return,
            1 => CellFlags::UNDERLINE,
            2 => CellFlags::DOUBLY_UNDERLINED,
            3 => CellFlags::CURLY_UNDERLINED,
            4 => CellFlags::DOTTED_UNDERLINED,
            5 => CellFlags::DASHED_UNDERLINED,
            _ => CellFlags::UNDERLINE,
        };
        self.flags.insert(flag);
    }
}

/// Decode the color argument of SGR 38/48/58.
///
/// Returns the color (if well-formed) and the number of `;`-separated
/// positions consumed including the introducing parameter itself.
fn parse_extended_color(param: &Param, params: &Params, index: usize) -> (Option<Color>, usize) {
    if param.has_subs() {
        // Colon form: everything lives in sub-parameters of this position.
        let color = match param.sub(0) {
            Some(5) => param.sub(1).map(|p| Color::Indexed(p.min(255) as u8)),
            Some(2) => {
                // `38:2:R:G:B` or `38:2::R:G:B` (with colorspace id slot).
                let offset = if param.sub_count() >= 5 { 2 } else { 1 };
                match (
                    param.sub(offset),
                    param.sub(offset + 1),
                    param.sub(offset + 2),
                ) {
                    (Some(r), Some(g), Some(b)) => Some(Color::Rgb(
                        r.min(255) as u8,
                        g.min(255) as u8,
                        b.min(255) as u8,
                    )),
                    _ => None,
                }
            }
            _ => None,
        };
        return (color, 1);
    }
    // Semicolon form: the mode and channels are the following positions.
    match params.param(index + 1) {
        Some(5) => {
            let color = params
                .param(index + 2)
                .map(|p| Color::Indexed(p.min(255) as u8));
            (color, 3)
        }
        Some(2) => {
            let color = match (
                params.param(index + 2),
                params.param(index + 3),
                params.param(index + 4),
            ) {
                (Some(r), Some(g), Some(b)) => Some(Color::Rgb(
                    r.min(255) as u8,
                    g.min(255) as u8,
                    b.min(255) as u8,
                )),
                _ => None,
            };
            (color, 5)
        }
        _ => (None, 2),
    }
}

/// Hyperlink identifier for OSC 8 links. Zero means "no link".
pub type HyperlinkId = u16;

/// Registry for OSC 8 hyperlinks.
///
/// Cells store compact [`HyperlinkId`]s instead of URI strings. Links with the
/// same `id=` parameter and URI dedupe to one entry; released ids are reused
/// once their refcount drops to zero.
#[derive(Debug, Clone, Default)]
pub struct HyperlinkRegistry {
    slots: Vec<Option<HyperlinkSlot>>,
    lookup: HashMap<(Option<String>, String), HyperlinkId>,
    free_list: Vec<HyperlinkId>,
}

#[derive(Debug, Clone)]
struct HyperlinkSlot {
    user_id: Option<String>,
    uri: String,
    ref_count: u32,
}

impl HyperlinkRegistry {
    pub fn new() -> Self {
        Self {
            slots: vec![None],
            lookup: HashMap::new(),
            free_list: Vec::new(),
        }
    }

    /// Intern a link and return its id, bumping the refcount.
    ///
    /// An empty URI returns 0 ("no link"). `user_id` is the `id=` parameter
    /// of OSC 8, which scopes deduplication.
    pub fn acquire(&mut self, user_id: Option<&str>, uri: &str) -> HyperlinkId {
        if uri.is_empty() {
            return 0;
        }
        let key = (user_id.map(str::to_owned), uri.to_owned());
        if let Some(&id) = self.lookup.get(&key) {
            if let Some(Some(slot)) = self.slots.get_mut(id as usize) {
                slot.ref_count += 1;
            }
            return id;
        }
        let slot = HyperlinkSlot {
            user_id: key.0.clone(),
            uri: key.1.clone(),
            ref_count: 1,
        };
        let id = if let Some(id) = self.free_list.pop() {
            self.slots[id as usize] = Some(slot);
            id
        } else {
            let id = self.slots.len() as HyperlinkId;
            self.slots.push(Some(slot));
            id
        };
        self.lookup.insert(key, id);
        id
    }

    /// Bump the refcount of an existing id (cell copy).
    pub fn acquire_id(&mut self, id: HyperlinkId) {
        if id == 0 {
            return;
        }
        if let Some(Some(slot)) = self.slots.get_mut(id as usize) {
            slot.ref_count += 1;
        }
    }

    /// Drop one reference; frees the slot at zero.
    pub fn release_id(&mut self, id: HyperlinkId) {
        if id == 0 {
            return;
        }
        let Some(Some(slot)) = self.slots.get_mut(id as usize) else {
            return;
        };
        slot.ref_count = slot.ref_count.saturating_sub(1);
        if slot.ref_count == 0 {
            let key = (slot.user_id.clone(), slot.uri.clone());
            self.lookup.remove(&key);
            self.slots[id as usize] = None;
            self.free_list.push(id);
        }
    }

    /// The URI behind an id, if alive.
    pub fn uri(&self, id: HyperlinkId) -> Option<&str> {
        self.slots
            .get(id as usize)?
            .as_ref()
            .map(|slot| slot.uri.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.slots.push(None);
        self.lookup.clear();
        self.free_list.clear();
    }
}

/// Rarely-populated cell payload, boxed to keep the common cell small.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellExtra {
    /// Combining marks attached to the primary scalar, in input order.
    pub combining: Vec<char>,
    /// Image fragment anchored at this cell.
    pub fragment: Option<ImageFragment>,
}

/// A single cell in the terminal grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// The primary scalar. A space for empty/erased cells.
    ch: char,
    /// Display width in columns (0 = wide continuation, 1, or 2).
    width: u8,
    pub flags: CellFlags,
    pub fg: Color,
    pub bg: Color,
    pub underline: Color,
    /// Hyperlink id (0 = no link).
    pub hyperlink: HyperlinkId,
    extra: Option<Box<CellExtra>>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            width: 1,
            flags: CellFlags::empty(),
            fg: Color::Default,
            bg: Color::Default,
            underline: Color::Default,
            hyperlink: 0,
            extra: None,
        }
    }
}

impl Cell {
    /// A cell with the given scalar and default attributes.
    pub fn new(ch: char) -> Self {
        Self {
            ch,
            width: Self::display_width(ch).max(1),
            ..Self::default()
        }
    }

    /// A cell carrying the given attributes.
    pub fn with_attrs(ch: char, width: u8, attrs: SgrAttrs) -> Self {
        Self {
            ch,
            width,
            flags: attrs.flags,
            fg: attrs.fg,
            bg: attrs.bg,
            underline: attrs.underline,
            hyperlink: 0,
            extra: None,
        }
    }

    /// Leading + continuation pair for a 2-column character.
    pub fn wide(ch: char, attrs: SgrAttrs) -> (Self, Self) {
        let mut lead = Self::with_attrs(ch, 2, attrs);
        lead.flags.insert(CellFlags::WIDE_CHAR);
        let mut cont = Self::with_attrs(' ', 0, attrs);
        cont.flags.insert(CellFlags::WIDE_CONTINUATION);
        (lead, cont)
    }

    /// Display width of a scalar per `wcwidth` semantics: 0 for combining
    /// marks and format controls, 2 for East Asian wide, otherwise 1.
    pub fn display_width(ch: char) -> u8 {
        UnicodeWidthChar::width(ch).unwrap_or(0) as u8
    }

    pub fn content(&self) -> char {
        self.ch
    }

    /// Primary scalar plus combining marks.
    pub fn codepoints(&self) -> impl Iterator<Item = char> + '_ {
        std::iter::once(self.ch).chain(
            self.extra
                .as_deref()
                .map(|e| e.combining.as_slice())
                .unwrap_or(&[])
                .iter()
                .copied(),
        )
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn is_wide(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_CHAR)
    }

    pub fn is_wide_continuation(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_CONTINUATION)
    }

    /// Whether the cell holds nothing visible (used by reflow trimming).
    pub fn is_blank(&self) -> bool {
        self.ch == ' ' && self.extra.is_none() && !self.is_wide_continuation()
    }

    /// Protected against selective erase (DECSCA 1).
    pub fn is_protected(&self) -> bool {
        self.flags.contains(CellFlags::CHARACTER_PROTECTED)
    }

    /// Replace the content, clearing wide flags and combining marks.
    pub fn set_content(&mut self, ch: char, width: u8) {
        self.ch = ch;
        self.width = width;
        self.flags
            .remove(CellFlags::WIDE_CHAR | CellFlags::WIDE_CONTINUATION);
        if let Some(extra) = self.extra.as_deref_mut() {
            extra.combining.clear();
            if extra.fragment.is_none() {
                self.extra = None;
            }
        }
    }

    /// Attach a combining mark to the current content.
    pub fn push_combining(&mut self, mark: char) {
        self.extra
            .get_or_insert_with(Default::default)
            .combining
            .push(mark);
    }

    /// The image fragment anchored here, if any.
    pub fn fragment(&self) -> Option<&ImageFragment> {
        self.extra.as_deref().and_then(|e| e.fragment.as_ref())
    }

    /// Anchor an image fragment at this cell.
    pub fn set_fragment(&mut self, fragment: ImageFragment) {
        self.extra.get_or_insert_with(Default::default).fragment = Some(fragment);
    }

    /// Take the image fragment out of the cell, if any.
    pub fn take_fragment(&mut self) -> Option<ImageFragment> {
        let extra = self.extra.as_deref_mut()?;
        let fragment = extra.fragment.take();
        if extra.combining.is_empty() {
            self.extra = None;
        }
        fragment
    }

    /// Write new content + attributes in one step (the normal print path).
    pub fn write(&mut self, ch: char, width: u8, attrs: SgrAttrs, hyperlink: HyperlinkId) {
        self.set_content(ch, width);
        self.flags = attrs.flags;
        self.fg = attrs.fg;
        self.bg = attrs.bg;
        self.underline = attrs.underline;
        self.hyperlink = hyperlink;
        self.extra = None;
    }

    /// Reset to a blank cell keeping only the erasing background.
    ///
    /// Used by ED/EL/ECH which fill with the current background color but
    /// reset every other attribute.
    pub fn erase(&mut self, bg: Color) {
        *self = Self {
            bg,
            ..Self::default()
        };
    }

    /// Current attributes as an [`SgrAttrs`] value.
    pub fn attrs(&self) -> SgrAttrs {
        SgrAttrs {
            flags: self.flags
                & !(CellFlags::WIDE_CHAR | CellFlags::WIDE_CONTINUATION),
            fg: self.fg,
            bg: self.bg,
            underline: self.underline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_from(text: &str) -> Params {
        let mut p = Params::default();
        for b in text.bytes() {
            match b {
                b'0'..=b'9' => p.push_digit(b),
                b';' => p.next_param(),
                b':' => p.next_sub_param(),
                _ => unreachable!(),
            }
        }
        p
    }

    // ── Cell basics ────────────────────────────────────────────────

    #[test]
    fn default_cell_is_blank_space() {
        let cell = Cell::default();
        assert_eq!(cell.content(), ' ');
        assert_eq!(cell.width(), 1);
        assert!(cell.is_blank());
        assert_eq!(cell.hyperlink, 0);
    }

    #[test]
    fn wide_pair_widths_and_flags() {
        let (lead, cont) = Cell::wide('中', SgrAttrs::default());
        assert!(lead.is_wide());
        assert_eq!(lead.width(), 2);
        assert!(cont.is_wide_continuation());
        assert_eq!(cont.width(), 0);
    }

    #[test]
    fn display_width_classes() {
        assert_eq!(Cell::display_width('a'), 1);
        assert_eq!(Cell::display_width('中'), 2);
        assert_eq!(Cell::display_width('\u{0301}'), 0);
    }

    #[test]
    fn combining_marks_accumulate() {
        let mut cell = Cell::new('e');
        cell.push_combining('\u{0301}');
        let cps: Vec<char> = cell.codepoints().collect();
        assert_eq!(cps, vec!['e', '\u{0301}']);
        cell.set_content('x', 1);
        assert_eq!(cell.codepoints().count(), 1);
    }

    #[test]
    fn erase_keeps_only_background() {
        let mut cell = Cell::new('X');
        cell.flags = CellFlags::BOLD | CellFlags::CHARACTER_PROTECTED;
        cell.hyperlink = 3;
        cell.erase(Color::Indexed(2));
        assert_eq!(cell.content(), ' ');
        assert_eq!(cell.bg, Color::Indexed(2));
        assert_eq!(cell.flags, CellFlags::empty());
        assert_eq!(cell.hyperlink, 0);
    }

    // ── SGR application ────────────────────────────────────────────

    #[test]
    fn sgr_empty_is_reset() {
        let mut attrs = SgrAttrs::default();
        attrs.flags = CellFlags::BOLD;
        attrs.apply_sgr(&Params::default());
        assert_eq!(attrs, SgrAttrs::default());
    }

    #[test]
    fn sgr_basic_flags_set_and_clear() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("1;3;4;9"));
        assert!(attrs.flags.contains(CellFlags::BOLD));
        assert!(attrs.flags.contains(CellFlags::ITALIC));
        assert!(attrs.flags.contains(CellFlags::UNDERLINE));
        assert!(attrs.flags.contains(CellFlags::CROSSED_OUT));

        attrs.apply_sgr(&params_from("22;23;24;29"));
        assert_eq!(attrs.flags, CellFlags::empty());
    }

    #[test]
    fn sgr_rgb_semicolon_form() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("38;2;10;20;30"));
        assert_eq!(attrs.fg, Color::Rgb(10, 20, 30));
    }

    #[test]
    fn sgr_rgb_colon_form_with_colorspace() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("38:2::10:20:30"));
        assert_eq!(attrs.fg, Color::Rgb(10, 20, 30));
    }

    #[test]
    fn sgr_rgb_colon_form_without_colorspace() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("48:2:1:2:3"));
        assert_eq!(attrs.bg, Color::Rgb(1, 2, 3));
    }

    #[test]
    fn sgr_indexed_forms() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("38;5;123"));
        assert_eq!(attrs.fg, Color::Indexed(123));
        attrs.apply_sgr(&params_from("48:5:200"));
        assert_eq!(attrs.bg, Color::Indexed(200));
    }

    #[test]
    fn sgr_extended_color_then_more_params() {
        // Bold follows the 5-position RGB form and must still apply.
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("38;2;1;2;3;1"));
        assert_eq!(attrs.fg, Color::Rgb(1, 2, 3));
        assert!(attrs.flags.contains(CellFlags::BOLD));
    }

    #[test]
    fn sgr_underline_styles_via_subparam() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("4:3"));
        assert!(attrs.flags.contains(CellFlags::CURLY_UNDERLINED));
        assert!(!attrs.flags.contains(CellFlags::UNDERLINE));

        attrs.apply_sgr(&params_from("4:0"));
        assert!(!attrs.flags.intersects(CellFlags::ANY_UNDERLINE));

        attrs.apply_sgr(&params_from("4:5"));
        assert!(attrs.flags.contains(CellFlags::DASHED_UNDERLINED));
    }

    #[test]
    fn sgr_underline_color() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("58;2;9;8;7"));
        assert_eq!(attrs.underline, Color::Rgb(9, 8, 7));
        attrs.apply_sgr(&params_from("59"));
        assert_eq!(attrs.underline, Color::Default);
    }

    #[test]
    fn sgr_bright_colors() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("91;104"));
        assert_eq!(attrs.fg, Color::Bright(1));
        assert_eq!(attrs.bg, Color::Bright(4));
    }

    #[test]
    fn sgr_zero_resets_everything() {
        let mut attrs = SgrAttrs::default();
        attrs.apply_sgr(&params_from("1;38;2;1;2;3"));
        attrs.apply_sgr(&params_from("0"));
        assert_eq!(attrs, SgrAttrs::default());
    }

    // ── Hyperlink registry ─────────────────────────────────────────

    #[test]
    fn registry_dedupes_same_link() {
        let mut reg = HyperlinkRegistry::new();
        let a = reg.acquire(None, "https://example.com");
        let b = reg.acquire(None, "https://example.com");
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn registry_separates_by_user_id() {
        let mut reg = HyperlinkRegistry::new();
        let a = reg.acquire(Some("one"), "https://example.com");
        let b = reg.acquire(Some("two"), "https://example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn registry_empty_uri_is_no_link() {
        let mut reg = HyperlinkRegistry::new();
        assert_eq!(reg.acquire(None, ""), 0);
    }

    #[test]
    fn registry_release_frees_and_reuses_ids() {
        let mut reg = HyperlinkRegistry::new();
        let a = reg.acquire(None, "https://a.test");
        reg.release_id(a);
        assert!(reg.uri(a).is_none());
        let b = reg.acquire(None, "https://b.test");
        assert_eq!(a, b, "freed id should be reused");
    }

    #[test]
    fn registry_refcount_survives_partial_release() {
        let mut reg = HyperlinkRegistry::new();
        let id = reg.acquire(None, "https://a.test");
        reg.acquire_id(id);
        reg.release_id(id);
        assert_eq!(reg.uri(id), Some("https://a.test"));
        reg.release_id(id);
        assert!(reg.uri(id).is_none());
    }
}
