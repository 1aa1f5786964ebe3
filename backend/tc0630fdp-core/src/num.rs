use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($($t:ty),+) => {
        $(
            impl GetBit for $t {
                #[inline]
                fn bit(self, i: u8) -> bool {
                    debug_assert!(i < (<$t>::BITS as u8));
                    self & (1 << i) != 0
                }

                #[inline]
                fn bits(self, range: RangeInclusive<u8>) -> Self {
                    let start = *range.start();
                    let end = *range.end();
                    debug_assert!(end < (<$t>::BITS as u8));

                    (self >> start) & ((1 << (end - start + 1)) - 1)
                }
            }
        )+
    };
}

impl_get_bit!(u8, u16, u32);

/// Interpret the low 12 bits of a sprite coordinate word as a two's complement value.
#[inline]
#[must_use]
pub fn sign_extend_12(value: u16) -> i32 {
    (((value & 0x0FFF) as i16) << 4 >> 4).into()
}

/// Byte-lane masked write, only bits set in `mask` are replaced.
#[inline]
#[must_use]
pub fn combine_masked(current: u16, data: u16, mask: u16) -> u16 {
    (current & !mask) | (data & mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bits_extracts_ranges() {
        assert_eq!(0xABCD_u16.bits(4..=7), 0xC);
        assert_eq!(0xABCD_u16.bits(12..=15), 0xA);
        assert!(0x8000_u16.bit(15));
        assert!(!0x8000_u16.bit(14));
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend_12(0x07FF), 0x7FF);
        assert_eq!(sign_extend_12(0x0800), -0x800);
        assert_eq!(sign_extend_12(0xAFFF), -1);
    }

    #[test]
    fn masked_write_keeps_unselected_lanes() {
        assert_eq!(combine_masked(0x1234, 0xABCD, 0x00FF), 0x12CD);
        assert_eq!(combine_masked(0x1234, 0xABCD, 0xFF00), 0xAB34);
        assert_eq!(combine_masked(0x1234, 0xABCD, 0xFFFF), 0xABCD);
    }
}
