//! Sixel graphics decoder.
//!
//! A DCS `q` sequence carries a stream in which every data byte (`?`..`~`)
//! encodes a vertical column of six pixels. The decoder runs as the parser's
//! DCS sub-parser: `hook` starts a canvas, `put` consumes payload bytes, and
//! `unhook` yields the finished RGBA image — or nothing if the stream stayed
//! empty or blew past the configured canvas ceiling.
//!
//! Protocol elements handled: raster attributes (`"Pan;Pad;Ph;Pv`), color
//! register select/define (`#Pc` / `#Pc;Pu;Px;Py;Pz` in RGB and HLS), the
//! repeat introducer (`!Pn`), graphics carriage return (`$`), and graphics
//! newline (`-`).

use smallvec::SmallVec;
use tracing::warn;

use crate::image::{Image, ImageSize};

/// VT340 default register colors (RGB), used before any `#` definition.
const DEFAULT_REGISTERS: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00),
    (0x33, 0x33, 0xcc),
    (0xcc, 0x21, 0x21),
    (0x33, 0xcc, 0x33),
    (0xcc, 0x33, 0xcc),
    (0x33, 0xcc, 0xcc),
    (0xcc, 0xcc, 0x33),
    (0x87, 0x87, 0x87),
    (0x47, 0x47, 0x47),
    (0x64, 0x64, 0xff),
    (0xff, 0x64, 0x64),
    (0x64, 0xff, 0x64),
    (0xff, 0x64, 0xff),
    (0x64, 0xff, 0xff),
    (0xff, 0xff, 0x64),
    (0xff, 0xff, 0xff),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    /// After `"` — collecting raster attributes.
    Raster,
    /// After `!` — collecting the repeat count.
    Repeat,
    /// After `#` — collecting register index / definition.
    Color,
}

/// Streaming Sixel decoder with bounded canvas and register count.
#[derive(Debug, Clone)]
pub struct SixelDecoder {
    state: State,
    params: SmallVec<[u32; 8]>,
    current_param: Option<u32>,
    registers: Vec<(u8, u8, u8)>,
    max_registers: u32,
    max_size: ImageSize,
    /// RGBA canvas, grown band by band.
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Cursor within the canvas.
    x: u32,
    band: u32,
    color: u16,
    repeat: u32,
    /// Set when the stream exceeded a limit; the image is discarded.
    rejected: bool,
    active: bool,
}

impl SixelDecoder {
    pub fn new(max_size: ImageSize, max_registers: u32) -> Self {
        Self {
            state: State::Ground,
            params: SmallVec::new(),
            current_param: None,
            registers: DEFAULT_REGISTERS.to_vec(),
            max_registers: max_registers.max(16),
            max_size,
            pixels: Vec::new(),
            width: 0,
            height: 0,
            x: 0,
            band: 0,
            color: 0,
            repeat: 1,
            rejected: false,
            active: false,
        }
    }

    /// Begin a canvas. The DCS parameters (aspect ratio, background
    /// selector, grid size) do not affect decoding here.
    pub fn hook(&mut self) {
        let max_size = self.max_size;
        let max_registers = self.max_registers;
        *self = Self::new(max_size, max_registers);
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the stream exceeded a configured ceiling.
    pub fn was_rejected(&self) -> bool {
        self.rejected
    }

    /// Consume one payload byte.
    pub fn put(&mut self, byte: u8) {
        if self.rejected {
            return;
        }
        match self.state {
            State::Ground => self.put_ground(byte),
            State::Raster => self.put_param_state(byte, State::Raster),
            State::Repeat => self.put_param_state(byte, State::Repeat),
            State::Color => self.put_param_state(byte, State::Color),
        }
    }

    /// Finish the stream; returns the image unless empty or rejected.
    pub fn unhook(&mut self) -> Option<Image> {
        self.finish_state();
        self.active = false;
        if self.rejected || self.width == 0 || self.height == 0 {
            return None;
        }
        let size = ImageSize::new(self.width, self.height);
        let pixels = std::mem::take(&mut self.pixels);
        Some(Image::new(size, pixels))
    }

    // ── Byte handling ───────────────────────────────────────────────

    fn put_ground(&mut self, byte: u8) {
        match byte {
            b'"' => self.enter_params(State::Raster),
            b'!' => self.enter_params(State::Repeat),
            b'#' => self.enter_params(State::Color),
            b'$' => self.x = 0,
            b'-' => {
                self.x = 0;
                self.band += 1;
            }
            b'?'..=b'~' => self.draw(byte - b'?'),
            _ => {} // stray bytes are ignored, per DEC practice
        }
    }

    fn enter_params(&mut self, state: State) {
        self.params.clear();
        self.current_param = None;
        self.state = state;
    }

    fn put_param_state(&mut self, byte: u8, state: State) {
        match byte {
            b'0'..=b'9' => {
                let value = self.current_param.unwrap_or(0);
                self.current_param = Some(value.saturating_mul(10).saturating_add(u32::from(byte - b'0')));
            }
            b';' => {
                self.params.push(self.current_param.take().unwrap_or(0));
            }
            _ => {
                // Any other byte terminates the parameter group.
                self.params.push(self.current_param.take().unwrap_or(0));
                self.apply_params(state);
                self.state = State::Ground;
                self.put_ground(byte);
            }
        }
    }

    fn finish_state(&mut self) {
        if self.state != State::Ground {
            self.params.push(self.current_param.take().unwrap_or(0));
            let state = self.state;
            self.apply_params(state);
            self.state = State::Ground;
        }
    }

    fn apply_params(&mut self, state: State) {
        match state {
            State::Raster => {
                // "Pan;Pad;Ph;Pv — pre-size the canvas to Ph×Pv.
                let ph = self.params.get(2).copied().unwrap_or(0);
                let pv = self.params.get(3).copied().unwrap_or(0);
                if ph > 0 && pv > 0 {
                    self.ensure_size(ph, pv);
                }
            }
            State::Repeat => {
                self.repeat = self.params.first().copied().unwrap_or(1).max(1);
            }
            State::Color => self.apply_color_params(),
            State::Ground => {}
        }
    }

    fn apply_color_params(&mut self) {
        let register = self.params.first().copied().unwrap_or(0);
        if register >= self.max_registers {
            warn!(register, limit = self.max_registers, "sixel color register out of range");
            self.rejected = true;
            return;
        }
        let register = register as usize;
        if self.registers.len() <= register {
            self.registers.resize(register + 1, (0, 0, 0));
        }
        if self.params.len() >= 5 {
            let system = self.params[1];
            let (x, y, z) = (self.params[2], self.params[3], self.params[4]);
            let rgb = match system {
                1 => hls_to_rgb(x, y, z),
                _ => (
                    scale_100(x),
                    scale_100(y),
                    scale_100(z),
                ),
            };
            self.registers[register] = rgb;
        }
        self.color = register as u16;
    }

    // ── Pixel assembly ──────────────────────────────────────────────

    fn draw(&mut self, bits: u8) {
        let repeat = std::mem::replace(&mut self.repeat, 1);
        if bits == 0 {
            self.x = self.x.saturating_add(repeat);
            return;
        }
        let top = self.band * 6;
        let needed_height = top + 6;
        let needed_width = self.x + repeat;
        if !self.ensure_size(needed_width.max(self.width), needed_height.max(self.height)) {
            return;
        }
        let (r, g, b) = self
            .registers
            .get(usize::from(self.color))
            .copied()
            .unwrap_or((0, 0, 0));
        for row in 0..6u32 {
            if bits & (1 << row) == 0 {
                continue;
            }
            let y = top + row;
            for i in 0..repeat {
                let x = self.x + i;
                if x >= self.width || y >= self.height {
                    continue;
                }
                let offset = ((y * self.width + x) * 4) as usize;
                self.pixels[offset] = r;
                self.pixels[offset + 1] = g;
                self.pixels[offset + 2] = b;
                self.pixels[offset + 3] = 0xff;
            }
        }
        self.x += repeat;
    }

    /// Grow the canvas to at least the given size; rejects past the ceiling.
    fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        if width > self.max_size.width || height > self.max_size.height {
            warn!(
                width,
                height,
                max_width = self.max_size.width,
                max_height = self.max_size.height,
                "sixel image exceeds configured ceiling"
            );
            self.rejected = true;
            return false;
        }
        if width <= self.width && height <= self.height {
            return true;
        }
        let new_width = width.max(self.width);
        let new_height = height.max(self.height);
        let mut grown = vec![0u8; (new_width * new_height * 4) as usize];
        for y in 0..self.height {
            let src = ((y * self.width) * 4) as usize;
            let dst = ((y * new_width) * 4) as usize;
            let len = (self.width * 4) as usize;
            grown[dst..dst + len].copy_from_slice(&self.pixels[src..src + len]);
        }
        self.pixels = grown;
        self.width = new_width;
        self.height = new_height;
        true
    }
}

/// Scale a 0..=100 sixel channel to 8 bits.
fn scale_100(value: u32) -> u8 {
    ((value.min(100) * 255 + 50) / 100) as u8
}

/// HLS (hue 0..=360, lightness 0..=100, saturation 0..=100) to RGB,
/// per the VT340 color model (blue at hue 0).
fn hls_to_rgb(h: u32, l: u32, s: u32) -> (u8, u8, u8) {
    let h = f64::from(h.min(360));
    let l = f64::from(l.min(100)) / 100.0;
    let s = f64::from(s.min(100)) / 100.0;
    // Rotate so hue 0 is blue, matching the DEC definition.
    let h = (h + 240.0) % 360.0;
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_u8 = |v: f64| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    (to_u8(r1), to_u8(g1), to_u8(b1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> SixelDecoder {
        SixelDecoder::new(ImageSize::new(100, 100), 256)
    }

    fn decode(data: &[u8]) -> Option<Image> {
        let mut d = decoder();
        d.hook();
        for &b in data {
            d.put(b);
        }
        d.unhook()
    }

    fn pixel(image: &Image, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let off = ((y * image.size.width + x) * 4) as usize;
        let p = &image.pixels[off..off + 4];
        (p[0], p[1], p[2], p[3])
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert!(decode(b"").is_none());
    }

    #[test]
    fn single_full_column() {
        // '~' = 0b111111: six pixels set in one column.
        let image = decode(b"~").unwrap();
        assert_eq!(image.size, ImageSize::new(1, 6));
        for y in 0..6 {
            assert_eq!(pixel(&image, 0, y).3, 0xff);
        }
    }

    #[test]
    fn sixel_bit_order_is_top_to_bottom() {
        // '?' + 1 = '@' = bit 0 set = topmost pixel of the band.
        let image = decode(b"@").unwrap();
        assert_eq!(pixel(&image, 0, 0).3, 0xff);
        assert_eq!(pixel(&image, 0, 1).3, 0x00);
    }

    #[test]
    fn repeat_introducer_widens() {
        let image = decode(b"!5~").unwrap();
        assert_eq!(image.size.width, 5);
        for x in 0..5 {
            assert_eq!(pixel(&image, x, 0).3, 0xff);
        }
    }

    #[test]
    fn graphics_newline_advances_band() {
        let image = decode(b"~-~").unwrap();
        assert_eq!(image.size, ImageSize::new(1, 12));
        assert_eq!(pixel(&image, 0, 6).3, 0xff);
    }

    #[test]
    fn graphics_cr_returns_to_left_edge() {
        // Draw two columns, CR, overdraw the first with register 1.
        let image = decode(b"#0~~$#1~").unwrap();
        assert_eq!(image.size.width, 2);
        let blue = DEFAULT_REGISTERS[1];
        assert_eq!(pixel(&image, 0, 0), (blue.0, blue.1, blue.2, 0xff));
    }

    #[test]
    fn rgb_color_definition() {
        // Register 2 := RGB(100%, 0%, 0%), then draw.
        let image = decode(b"#2;2;100;0;0#2~").unwrap();
        assert_eq!(pixel(&image, 0, 0), (255, 0, 0, 0xff));
    }

    #[test]
    fn hls_color_definition() {
        // HLS hue=120 (red in the DEC model), l=50, s=100.
        let image = decode(b"#3;1;120;50;100#3~").unwrap();
        let (r, g, b, a) = pixel(&image, 0, 0);
        assert_eq!(a, 0xff);
        assert!(r > 200 && g < 60 && b < 60, "expected red-ish, got ({r},{g},{b})");
    }

    #[test]
    fn raster_attributes_presize_canvas() {
        let image = decode(b"\"1;1;10;12~").unwrap();
        assert_eq!(image.size, ImageSize::new(10, 12));
    }

    #[test]
    fn oversized_canvas_is_rejected() {
        let mut d = SixelDecoder::new(ImageSize::new(4, 4), 256);
        d.hook();
        for &b in b"!9~" {
            d.put(b);
        }
        assert!(d.was_rejected());
        assert!(d.unhook().is_none());
    }

    #[test]
    fn register_limit_is_enforced() {
        let mut d = SixelDecoder::new(ImageSize::new(100, 100), 16);
        d.hook();
        for &b in b"#17;2;0;0;0~" {
            d.put(b);
        }
        assert!(d.was_rejected());
        assert!(d.unhook().is_none());
    }

    #[test]
    fn empty_columns_advance_without_pixels() {
        // '?' draws nothing but moves the cursor.
        let image = decode(b"?~").unwrap();
        assert_eq!(image.size.width, 2);
        assert_eq!(pixel(&image, 0, 0).3, 0);
        assert_eq!(pixel(&image, 1, 0).3, 0xff);
    }

    #[test]
    fn default_register_zero_is_black() {
        let image = decode(b"~").unwrap();
        assert_eq!(pixel(&image, 0, 0), (0, 0, 0, 0xff));
    }
}
