//! Top-byte reconstruction for the generic 64-bit pointer layouts.
//!
//! Hardware ignores the top byte of a 64-bit pointer, so the on-disk
//! rebase only stores a narrow target plus a separate `high8` field. These
//! helpers move between that split form and a full virtual address.

use log::debug;

/// Bit position of the reconstructed top byte.
pub const HIGH8_SHIFT: u32 = 56;

/// Mask covering the low `width` bits. Widths of 64 and above select all bits.
pub fn low_mask(width: u32) -> u64 {
    if width >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Rebuilds a 64-bit address from its `high8` byte and narrow target field.
///
/// The target is clamped to `width` bits, and never wider than the 56 bits
/// below the top byte.
pub fn unpack_address(high8: u8, target: u64, width: u32) -> u64 {
    let width = width.min(HIGH8_SHIFT);
    (u64::from(high8) << HIGH8_SHIFT) | (target & low_mask(width))
}

/// Splits `address` into `(target, high8)`, the inverse of [`unpack_address`].
///
/// Bits between `width` and 56 have nowhere to go and are dropped, which
/// makes the round trip lossy for offsets that do not fit the field.
pub fn pack_address(address: u64, width: u32) -> (u64, u8) {
    let width = width.min(HIGH8_SHIFT);
    let high8 = (address >> HIGH8_SHIFT) as u8;
    let low = address & low_mask(HIGH8_SHIFT);
    let target = low & low_mask(width);
    if target != low {
        debug!(
            "truncating {:#x} to {} bits, stored target is {:#x}",
            address, width, target
        );
    }
    (target, high8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_mask() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(36), 0xf_ffff_ffff);
        assert_eq!(low_mask(64), u64::MAX);
        assert_eq!(low_mask(80), u64::MAX);
    }

    #[test]
    fn test_unpack_places_high8_in_top_byte() {
        assert_eq!(unpack_address(0, 0x1000, 36), 0x1000);
        assert_eq!(unpack_address(0x80, 0x1000, 36), 0x8000_0000_0000_1000);
        // bits past the field width are not part of the target
        assert_eq!(unpack_address(0, 0x1_0000_0000_1000, 36), 0x1000);
    }

    #[test]
    fn test_pack_is_inverse_of_unpack() {
        let address = 0xab00_0007_dead_beef;
        let (target, high8) = pack_address(address, 43);
        assert_eq!(high8, 0xab);
        assert_eq!(target, 0x7_dead_beef);
        assert_eq!(unpack_address(high8, target, 43), address);
    }

    #[test]
    fn test_pack_truncates_wide_offsets() {
        let (target, high8) = pack_address((1u64 << 36) | 0x10, 36);
        assert_eq!(high8, 0);
        assert_eq!(target, 0x10);
    }

    #[test]
    fn test_width_is_clamped_below_top_byte() {
        let (target, high8) = pack_address(0xff00_0000_0000_0001, 64);
        assert_eq!(target, 1);
        assert_eq!(high8, 0xff);
        assert_eq!(unpack_address(high8, target, 64), 0xff00_0000_0000_0001);
    }
}
