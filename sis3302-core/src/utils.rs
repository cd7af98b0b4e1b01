//! Byte-order normalisation and bit concatenation helpers.
//!
//! The digitizer writes little-endian 32-bit words. Hosts with a different
//! native order swap copies of the words before decoding; the borrowed record
//! buffer itself is never rewritten.

/// Returns true when the host stores integers little-endian.
#[inline]
pub const fn is_little_endian_host() -> bool {
    cfg!(target_endian = "little")
}

/// In-place byte-order reversal for unsigned integers.
///
/// `swap` returns a reference to the swapped value so callers can swap and
/// use in one expression.
pub trait ByteSwap {
    fn swap(&mut self) -> &mut Self;
}

macro_rules! impl_byte_swap {
    ($($t:ty),*) => {
        $(
            impl ByteSwap for $t {
                #[inline]
                fn swap(&mut self) -> &mut Self {
                    *self = self.swap_bytes();
                    self
                }
            }
        )*
    };
}

impl_byte_swap!(u16, u32, u64);

/// Converts words read in host order into hardware (little-endian) order.
///
/// No-op on little-endian hosts.
pub fn normalize_words(words: &mut [u32]) {
    if is_little_endian_host() {
        return;
    }
    for word in words.iter_mut() {
        word.swap();
    }
}

/// Concatenates `(value, width)` chunks into one integer, chunk 0 lowest.
///
/// Each value is masked to its width. The caller guarantees the widths sum
/// to at most 64 bits.
pub fn bit_concat(chunks: &[(u64, u32)]) -> u64 {
    let mut result = 0u64;
    let mut shift = 0u32;
    for &(value, width) in chunks {
        debug_assert!(shift + width <= u64::BITS, "bit_concat overflows u64");
        let mask = if width >= u64::BITS {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        result |= (value & mask) << shift;
        shift += width;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_u32_literal() {
        let mut v: u32 = 0x1234_5678;
        assert_eq!(*v.swap(), 0x7856_3412);
    }

    #[test]
    fn test_swap_is_involution() {
        for &v in &[0u16, 1, 0x00FF, 0xABCD, u16::MAX] {
            let mut x = v;
            x.swap().swap();
            assert_eq!(x, v);
        }
        for &v in &[0u32, 0xDEAD_BEEF, 0x0000_FF00, u32::MAX] {
            let mut x = v;
            x.swap().swap();
            assert_eq!(x, v);
        }
        for &v in &[0u64, 0x0123_4567_89AB_CDEF, u64::MAX, 1 << 63] {
            let mut x = v;
            x.swap().swap();
            assert_eq!(x, v);
        }
    }

    #[test]
    fn test_swap_u16_and_u64() {
        let mut a: u16 = 0xA1B2;
        assert_eq!(*a.swap(), 0xB2A1);
        let mut b: u64 = 0x0102_0304_0506_0708;
        assert_eq!(*b.swap(), 0x0807_0605_0403_0201);
    }

    #[test]
    fn test_bit_concat_timestamp_lanes() {
        let ts = bit_concat(&[(0x1234, 16), (0x5678, 16), (0x0009, 16)]);
        assert_eq!(ts, 0x0009_5678_1234);
    }

    #[test]
    fn test_bit_concat_masks_each_chunk() {
        // 0x1F is wider than 4 bits; only the low nibble survives.
        assert_eq!(bit_concat(&[(0x1F, 4), (0x1, 1)]), 0x1F);
        assert_eq!(bit_concat(&[(0xFF, 4), (0x0, 4)]), 0x0F);
    }

    #[test]
    fn test_normalize_words_matches_le_decoding() {
        let bytes = [0x78u8, 0x56, 0x34, 0x12];
        let mut words = [u32::from_ne_bytes(bytes)];
        normalize_words(&mut words);
        assert_eq!(words[0], 0x1234_5678);
    }
}
