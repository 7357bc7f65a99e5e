//! Color palette: 256 indexed slots plus the dynamic colors.
//!
//! Backs OSC 4 (palette query/set), OSC 10/11/12/17/19 (dynamic colors),
//! their 1xx reset counterparts, and the xterm color-stack operations
//! (XTPUSHCOLORS / XTPOPCOLORS / XTREPORTCOLORS).

/// A concrete RGB value (8 bits per channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse an X11-style color spec: `rgb:RR/GG/BB` (1–4 hex digits per
    /// channel) or `#RRGGBB`.
    pub fn parse(spec: &str) -> Option<Self> {
        if let Some(hex) = spec.strip_prefix('#') {
            if hex.len() == 6 {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Self::new(r, g, b));
            }
            return None;
        }
        let rest = spec.strip_prefix("rgb:")?;
        let mut channels = rest.split('/');
        let r = parse_scaled_channel(channels.next()?)?;
        let g = parse_scaled_channel(channels.next()?)?;
        let b = parse_scaled_channel(channels.next()?)?;
        if channels.next().is_some() {
            return None;
        }
        Some(Self::new(r, g, b))
    }

    /// Format as the 16-bit-per-channel reply form xterm uses.
    pub fn to_x11_spec(self) -> String {
        format!(
            "rgb:{0:02x}{0:02x}/{1:02x}{1:02x}/{2:02x}{2:02x}",
            self.r, self.g, self.b
        )
    }
}

/// Scale a 1–4 digit hex channel down to 8 bits.
fn parse_scaled_channel(text: &str) -> Option<u8> {
    if text.is_empty() || text.len() > 4 {
        return None;
    }
    let value = u16::from_str_radix(text, 16).ok()?;
    let max = (1u32 << (4 * text.len() as u32)) - 1;
    Some(((u32::from(value) * 255 + max / 2) / max) as u8)
}

/// The dynamic colors addressable through OSC 10/11/12/17/19.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicColor {
    /// OSC 10.
    DefaultForeground,
    /// OSC 11.
    DefaultBackground,
    /// OSC 12.
    Cursor,
    /// OSC 17.
    HighlightBackground,
    /// OSC 19.
    HighlightForeground,
}

impl DynamicColor {
    pub fn from_osc_code(code: u16) -> Option<Self> {
        match code {
            10 => Some(Self::DefaultForeground),
            11 => Some(Self::DefaultBackground),
            12 => Some(Self::Cursor),
            17 => Some(Self::HighlightBackground),
            19 => Some(Self::HighlightForeground),
            _ => None,
        }
    }

    pub fn osc_code(self) -> u16 {
        match self {
            Self::DefaultForeground => 10,
            Self::DefaultBackground => 11,
            Self::Cursor => 12,
            Self::HighlightBackground => 17,
            Self::HighlightForeground => 19,
        }
    }
}

/// The full palette state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPalette {
    indexed: [RgbColor; 256],
    pub default_foreground: RgbColor,
    pub default_background: RgbColor,
    pub cursor: RgbColor,
    pub highlight_foreground: RgbColor,
    pub highlight_background: RgbColor,
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self {
            indexed: default_palette(),
            default_foreground: RgbColor::new(0xd0, 0xd0, 0xd0),
            default_background: RgbColor::new(0x00, 0x00, 0x00),
            cursor: RgbColor::new(0xd0, 0xd0, 0xd0),
            highlight_foreground: RgbColor::new(0x00, 0x00, 0x00),
            highlight_background: RgbColor::new(0xc0, 0xc0, 0xc0),
        }
    }
}

impl ColorPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indexed(&self, index: u8) -> RgbColor {
        self.indexed[usize::from(index)]
    }

    pub fn set_indexed(&mut self, index: u8, color: RgbColor) {
        self.indexed[usize::from(index)] = color;
    }

    /// OSC 104 with an index, or full reset without one.
    pub fn reset_indexed(&mut self, index: Option<u8>) {
        let defaults = default_palette();
        match index {
            Some(i) => self.indexed[usize::from(i)] = defaults[usize::from(i)],
            None => self.indexed = defaults,
        }
    }

    pub fn dynamic(&self, which: DynamicColor) -> RgbColor {
        match which {
            DynamicColor::DefaultForeground => self.default_foreground,
            DynamicColor::DefaultBackground => self.default_background,
            DynamicColor::Cursor => self.cursor,
            DynamicColor::HighlightBackground => self.highlight_background,
            DynamicColor::HighlightForeground => self.highlight_foreground,
        }
    }

    pub fn set_dynamic(&mut self, which: DynamicColor, color: RgbColor) {
        match which {
            DynamicColor::DefaultForeground => self.default_foreground = color,
            DynamicColor::DefaultBackground => self.default_background = color,
            DynamicColor::Cursor => self.cursor = color,
            DynamicColor::HighlightBackground => self.highlight_background = color,
            DynamicColor::HighlightForeground => self.highlight_foreground = color,
        }
    }

    pub fn reset_dynamic(&mut self, which: DynamicColor) {
        let defaults = Self::default();
        self.set_dynamic(which, defaults.dynamic(which));
    }
}

/// The standard xterm 256-color palette: 16 base colors, a 6×6×6 cube,
/// and a 24-step grayscale ramp.
fn default_palette() -> [RgbColor; 256] {
    let mut palette = [RgbColor::default(); 256];
    const BASE: [(u8, u8, u8); 16] = [
        (0x00, 0x00, 0x00),
        (0xcd, 0x00, 0x00),
        (0x00, 0xcd, 0x00),
        (0xcd, 0xcd, 0x00),
        (0x00, 0x00, 0xee),
        (0xcd, 0x00, 0xcd),
        (0x00, 0xcd, 0xcd),
        (0xe5, 0xe5, 0xe5),
        (0x7f, 0x7f, 0x7f),
        (0xff, 0x00, 0x00),
        (0x00, 0xff, 0x00),
        (0xff, 0xff, 0x00),
        (0x5c, 0x5c, 0xff),
        (0xff, 0x00, 0xff),
        (0x00, 0xff, 0xff),
        (0xff, 0xff, 0xff),
    ];
    for (i, &(r, g, b)) in BASE.iter().enumerate() {
        palette[i] = RgbColor::new(r, g, b);
    }
    const CUBE: [u8; 6] = [0x00, 0x5f, 0x87, 0xaf, 0xd7, 0xff];
    for r in 0..6 {
        for g in 0..6 {
            for b in 0..6 {
                palette[16 + 36 * r + 6 * g + b] = RgbColor::new(CUBE[r], CUBE[g], CUBE[b]);
            }
        }
    }
    for i in 0..24 {
        let level = (8 + i * 10) as u8;
        palette[232 + i] = RgbColor::new(level, level, level);
    }
    palette
}

/// Bounded stack behind XTPUSHCOLORS / XTPOPCOLORS.
#[derive(Debug, Clone, Default)]
pub struct ColorStack {
    stack: Vec<ColorPalette>,
}

impl ColorStack {
    /// xterm caps the stack at ten entries.
    const MAX_DEPTH: usize = 10;

    /// The maximum depth reported by XTREPORTCOLORS.
    pub const fn reported_limit() -> usize {
        Self::MAX_DEPTH
    }

    pub fn push(&mut self, palette: &ColorPalette) {
        if self.stack.len() == Self::MAX_DEPTH {
            self.stack.remove(0);
        }
        self.stack.push(palette.clone());
    }

    pub fn pop(&mut self) -> Option<ColorPalette> {
        self.stack.pop()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Spec parsing ────────────────────────────────────────────────

    #[test]
    fn parses_hash_form() {
        assert_eq!(
            RgbColor::parse("#ff8000"),
            Some(RgbColor::new(0xff, 0x80, 0x00))
        );
        assert_eq!(RgbColor::parse("#ff80"), None);
    }

    #[test]
    fn parses_rgb_two_digit_form() {
        assert_eq!(
            RgbColor::parse("rgb:ff/80/00"),
            Some(RgbColor::new(0xff, 0x80, 0x00))
        );
    }

    #[test]
    fn parses_rgb_four_digit_form_scaled() {
        assert_eq!(
            RgbColor::parse("rgb:ffff/0000/8080"),
            Some(RgbColor::new(0xff, 0x00, 0x80))
        );
    }

    #[test]
    fn parses_rgb_single_digit_form_scaled() {
        // 'f' of max 'f' scales to 255.
        assert_eq!(
            RgbColor::parse("rgb:f/0/8"),
            Some(RgbColor::new(255, 0, 0x88))
        );
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(RgbColor::parse("").is_none());
        assert!(RgbColor::parse("rgb:ff/80").is_none());
        assert!(RgbColor::parse("rgb:gg/00/00").is_none());
        assert!(RgbColor::parse("cmyk:0/0/0/0").is_none());
    }

    #[test]
    fn x11_spec_roundtrips() {
        let c = RgbColor::new(0x12, 0x34, 0x56);
        assert_eq!(c.to_x11_spec(), "rgb:1212/3434/5656");
        assert_eq!(RgbColor::parse(&c.to_x11_spec()), Some(c));
    }

    // ── Palette ─────────────────────────────────────────────────────

    #[test]
    fn default_palette_known_entries() {
        let p = ColorPalette::new();
        assert_eq!(p.indexed(1), RgbColor::new(0xcd, 0, 0));
        assert_eq!(p.indexed(15), RgbColor::new(0xff, 0xff, 0xff));
        // Cube corner: index 16 is black, 231 is white.
        assert_eq!(p.indexed(16), RgbColor::new(0, 0, 0));
        assert_eq!(p.indexed(231), RgbColor::new(0xff, 0xff, 0xff));
        // Grayscale ramp endpoints.
        assert_eq!(p.indexed(232), RgbColor::new(8, 8, 8));
        assert_eq!(p.indexed(255), RgbColor::new(238, 238, 238));
    }

    #[test]
    fn set_and_reset_indexed() {
        let mut p = ColorPalette::new();
        p.set_indexed(1, RgbColor::new(1, 2, 3));
        assert_eq!(p.indexed(1), RgbColor::new(1, 2, 3));
        p.reset_indexed(Some(1));
        assert_eq!(p.indexed(1), RgbColor::new(0xcd, 0, 0));
    }

    #[test]
    fn reset_all_indexed() {
        let mut p = ColorPalette::new();
        p.set_indexed(100, RgbColor::new(9, 9, 9));
        p.set_indexed(200, RgbColor::new(9, 9, 9));
        p.reset_indexed(None);
        assert_eq!(p, ColorPalette::new());
    }

    #[test]
    fn dynamic_colors_roundtrip() {
        let mut p = ColorPalette::new();
        p.set_dynamic(DynamicColor::Cursor, RgbColor::new(5, 6, 7));
        assert_eq!(p.dynamic(DynamicColor::Cursor), RgbColor::new(5, 6, 7));
        p.reset_dynamic(DynamicColor::Cursor);
        assert_eq!(p.dynamic(DynamicColor::Cursor), ColorPalette::new().cursor);
    }

    #[test]
    fn osc_code_mapping() {
        assert_eq!(
            DynamicColor::from_osc_code(11),
            Some(DynamicColor::DefaultBackground)
        );
        assert_eq!(DynamicColor::from_osc_code(13), None);
        assert_eq!(DynamicColor::Cursor.osc_code(), 12);
    }

    // ── Color stack ─────────────────────────────────────────────────

    #[test]
    fn push_pop_restores_palette() {
        let mut stack = ColorStack::default();
        let mut p = ColorPalette::new();
        stack.push(&p);
        p.set_indexed(0, RgbColor::new(1, 1, 1));
        let restored = stack.pop().unwrap();
        assert_eq!(restored.indexed(0), RgbColor::new(0, 0, 0));
        assert!(stack.pop().is_none());
    }

    #[test]
    fn stack_is_bounded() {
        let mut stack = ColorStack::default();
        let p = ColorPalette::new();
        for _ in 0..20 {
            stack.push(&p);
        }
        assert_eq!(stack.depth(), 10);
    }
}
