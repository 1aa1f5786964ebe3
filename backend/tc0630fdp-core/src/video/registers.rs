use crate::api::{BlendMode, ControlBank};
use crate::num::{GetBit, combine_masked};
use bincode::{Decode, Encode};

pub const NUM_PLAYFIELDS: usize = 4;
pub const NUM_SPRITE_GROUPS: usize = 4;
pub const NUM_CLIP_PLANES: usize = 4;

/// The two 8-word global control banks.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct ControlRegisters {
    control_0: [u16; 8],
    control_1: [u16; 8],
}

impl ControlRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, bank: ControlBank, offset: usize) -> u16 {
        match bank {
            ControlBank::Zero => self.control_0[offset & 7],
            ControlBank::One => self.control_1[offset & 7],
        }
    }

    /// Returns true if the write changed the pixel layer Y scroll.
    pub fn write(&mut self, bank: ControlBank, offset: usize, data: u16, mem_mask: u16) -> bool {
        let offset = offset & 7;
        match bank {
            ControlBank::Zero => {
                let value = combine_masked(self.control_0[offset], data, mem_mask);
                self.control_0[offset] = value;

                if offset < 4 {
                    log::trace!("  PF{} X scroll: {:04X}", offset + 1, value);
                } else {
                    log::trace!("  PF{} Y scroll: {:04X}", offset - 3, value);
                }

                false
            }
            ControlBank::One => {
                let prev = self.control_1[offset];
                let value = combine_masked(prev, data, mem_mask);
                self.control_1[offset] = value;

                match offset {
                    4 => log::trace!("  Pixel layer X scroll: {value:04X}"),
                    5 => log::trace!("  Pixel layer Y scroll: {value:04X}"),
                    6 => log::trace!("  Text layer X scroll: {value:04X}"),
                    7 => log::trace!("  Text layer Y scroll: {value:04X}"),
                    _ => log::trace!("  Control-1 word {offset}: {value:04X}"),
                }

                offset == 5 && prev != value
            }
        }
    }

    // 10.6 fixed point, returned with 8 fractional bits
    pub fn pf_scroll_x(&self, playfield: usize) -> i32 {
        i32::from(self.control_0[playfield]) << 2
    }

    // 9.7 fixed point, returned with 8 fractional bits
    pub fn pf_scroll_y(&self, playfield: usize) -> i32 {
        i32::from(self.control_0[4 + playfield]) << 1
    }

    pub fn pixel_scroll_x(&self) -> u16 {
        self.control_1[4]
    }

    pub fn pixel_scroll_y(&self) -> u16 {
        self.control_1[5]
    }

    pub fn text_scroll_x(&self) -> u16 {
        self.control_1[6]
    }

    pub fn text_scroll_y(&self) -> u16 {
        self.control_1[7]
    }
}

/// A layer's 16-bit mix word.
///
/// ```text
/// 15    blend B
/// 14    blend A
/// 13    layer enable
/// 12    clip invert mode
/// 11-8  clip enable, one bit per plane
/// 7-4   clip invert, one bit per plane
/// 3-0   priority
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct MixControl(pub u16);

impl MixControl {
    pub fn priority(self) -> u8 {
        self.0.bits(0..=3) as u8
    }

    pub fn clip_enabled(self, plane: usize) -> bool {
        self.0.bit(8 + plane as u8)
    }

    pub fn clip_inverted(self, plane: usize) -> bool {
        self.0.bit(4 + plane as u8) != self.0.bit(12)
    }

    pub fn blend_bits(self) -> u8 {
        self.0.bits(14..=15) as u8
    }

    pub fn layer_enabled(self) -> bool {
        // Both blend bits set disables the layer outright
        self.0.bit(13) && self.blend_bits() != 0b11
    }

    pub fn blend_mode(self) -> BlendMode {
        match self.blend_bits() {
            0b01 => BlendMode::A,
            0b10 => BlendMode::B,
            _ => BlendMode::Opaque,
        }
    }
}

impl BlendMode {
    #[must_use]
    pub fn swapped(self) -> Self {
        match self {
            Self::Opaque => Self::Opaque,
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Per-line blend contributions, in eighths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct BlendLevels {
    pub a_src: u8,
    pub b_src: u8,
    pub a_dst: u8,
    pub b_dst: u8,
}

impl BlendLevels {
    pub fn from_word(word: u16) -> Self {
        // Each nibble counts down from full contribution
        let level = |nibble: u16| 8 - (nibble as u8).min(8);
        Self {
            a_src: level(word.bits(0..=3)),
            b_src: level(word.bits(4..=7)),
            a_dst: level(word.bits(8..=11)),
            b_dst: level(word.bits(12..=15)),
        }
    }

    pub fn for_mode(self, mode: BlendMode) -> (u8, u8) {
        match mode {
            BlendMode::Opaque => (8, 0),
            BlendMode::A => (self.a_src, self.a_dst),
            BlendMode::B => (self.b_src, self.b_dst),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct ClipPlane {
    pub left: u16,
    pub right: u16,
}

impl ClipPlane {
    pub fn from_words(low: u16, high: u16, plane: usize) -> Self {
        let left = low.bits(0..=7) | (u16::from(high.bit(2 * plane as u8)) << 8);
        let right = low.bits(8..=15) | (u16::from(high.bit(2 * plane as u8 + 1)) << 8);
        Self { left, right }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn control_writes_respect_byte_lanes() {
        let mut registers = ControlRegisters::new();
        registers.write(ControlBank::Zero, 2, 0x1234, 0xFFFF);
        registers.write(ControlBank::Zero, 2, 0xFF00, 0x00FF);
        assert_eq!(registers.read(ControlBank::Zero, 2), 0x1200);
        assert_eq!(registers.read(ControlBank::One, 2), 0);
    }

    #[test]
    fn scroll_fixed_point() {
        let mut registers = ControlRegisters::new();
        // X = 3 + 32/64, Y = 5 + 64/128
        registers.write(ControlBank::Zero, 0, (3 << 6) | 32, 0xFFFF);
        registers.write(ControlBank::Zero, 4, (5 << 7) | 64, 0xFFFF);
        assert_eq!(registers.pf_scroll_x(0), 0x380);
        assert_eq!(registers.pf_scroll_y(0), 0x580);
    }

    #[test]
    fn pixel_y_scroll_change_is_reported() {
        let mut registers = ControlRegisters::new();
        assert!(registers.write(ControlBank::One, 5, 0x10, 0xFFFF));
        assert!(!registers.write(ControlBank::One, 5, 0x10, 0xFFFF));
        assert!(!registers.write(ControlBank::One, 4, 0x10, 0xFFFF));
        assert_eq!(registers.pixel_scroll_y(), 0x10);
    }

    #[test]
    fn mix_word_fields() {
        let mix = MixControl(0x6153);
        assert_eq!(mix.priority(), 3);
        assert!(mix.clip_enabled(0));
        assert!(!mix.clip_enabled(1));
        assert!(mix.clip_inverted(0));
        assert!(mix.clip_inverted(2));
        assert!(mix.layer_enabled());
        assert_eq!(mix.blend_mode(), BlendMode::A);

        // Invert mode flips the per-plane invert bits
        assert!(!MixControl(0x1010).clip_inverted(0));
        assert!(MixControl(0x1000).clip_inverted(1));

        // Both blend bits disable the layer
        assert!(!MixControl(0xE000).layer_enabled());
        assert!(!MixControl(0x0000).layer_enabled());
    }

    #[test]
    fn blend_levels_count_down_from_eight() {
        let levels = BlendLevels::from_word(0xF420);
        assert_eq!(levels.for_mode(BlendMode::A), (8, 4));
        assert_eq!(levels.for_mode(BlendMode::B), (6, 0));
        assert_eq!(levels.for_mode(BlendMode::Opaque), (8, 0));
    }

    #[test]
    fn clip_plane_high_bits() {
        let plane = ClipPlane::from_words(0x3F0A, 0b1000_0000, 3);
        assert_eq!(plane, ClipPlane { left: 0x0A, right: 0x13F });
        let plane = ClipPlane::from_words(0x3F0A, 0b0000_0001, 0);
        assert_eq!(plane, ClipPlane { left: 0x10A, right: 0x3F });
    }
}
