use nom::{
    error::{Error, ErrorKind},
    number::complete::le_u16,
    Err::Failure,
    IResult,
};
use num_derive::FromPrimitive;
use strum_macros::{Display, EnumIter};

use crate::error::{FixupError, FixupResult};
use crate::fixups::{
    DyldChainedPtr32Rebase, DyldChainedPtr64Rebase, DyldChainedPtrArm64eAuthRebase,
    DyldChainedPtrArm64eRebase, RebaseVariant,
};

#[repr(u16)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum DyldPointerFormat {
    Arm64e = 1,
    Ptr64 = 2,
    Ptr32 = 3,
    Ptr32Cache = 4,
    Ptr32Firmware = 5,
    Ptr64Offset = 6,
    Arm64eKernel = 7,
    Ptr64KernelCache = 8,
    Arm64eUserland = 9,
    Arm64eFirmware = 10,
    X86_64KernelCache = 11,
    Arm64eUserland24 = 12,
    Arm64eSharedCache = 13,
}

impl DyldPointerFormat {
    pub const DYLD_POINTER_MASK: u16 = 0xFF;

    /// Reads the little-endian format tag that heads a starts-in-segment record.
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], DyldPointerFormat> {
        let (rest, tag) = le_u16(bytes)?;
        Self::from_raw(tag)
            .map(|format| (rest, format))
            .map_err(|_| Failure(Error::new(bytes, ErrorKind::Tag)))
    }

    pub fn from_raw(value: u16) -> FixupResult<DyldPointerFormat> {
        num::FromPrimitive::from_u16(value & Self::DYLD_POINTER_MASK)
            .ok_or(FixupError::InvalidPointerFormat(value))
    }

    /// Byte distance represented by one unit of a chain's `next` field.
    pub fn stride(self) -> u64 {
        match self {
            DyldPointerFormat::Arm64e => 8,
            DyldPointerFormat::Arm64eUserland24 => 8,
            DyldPointerFormat::Arm64eUserland => 8,
            DyldPointerFormat::Arm64eSharedCache => 8,
            DyldPointerFormat::Ptr64 => 4,
            DyldPointerFormat::Ptr32 => 4,
            DyldPointerFormat::Ptr32Cache => 4,
            DyldPointerFormat::Ptr32Firmware => 4,
            DyldPointerFormat::Ptr64Offset => 4,
            DyldPointerFormat::Arm64eKernel => 4,
            DyldPointerFormat::Ptr64KernelCache => 4,
            DyldPointerFormat::Arm64eFirmware => 4,
            DyldPointerFormat::X86_64KernelCache => 1,
        }
    }

    /// Size in bytes of a slot in this format.
    pub fn pointer_size(self) -> usize {
        match self {
            DyldPointerFormat::Ptr32
            | DyldPointerFormat::Ptr32Cache
            | DyldPointerFormat::Ptr32Firmware => 4,
            _ => 8,
        }
    }

    fn is_arm64e(self) -> bool {
        matches!(
            self,
            DyldPointerFormat::Arm64e
                | DyldPointerFormat::Arm64eUserland
                | DyldPointerFormat::Arm64eUserland24
                | DyldPointerFormat::Arm64eKernel
                | DyldPointerFormat::Arm64eFirmware
        )
    }

    /// Whether a plain (non-auth) rebase in this format stores an unslid
    /// vmaddr rather than an offset from the image base.
    ///
    /// Auth rebases are offsets in every arm64e format.
    pub fn stores_vmaddr(self) -> bool {
        matches!(
            self,
            DyldPointerFormat::Arm64e
                | DyldPointerFormat::Arm64eFirmware
                | DyldPointerFormat::Ptr64
                | DyldPointerFormat::Ptr32
        )
    }

    pub fn is_bind(self, raw: u64) -> bool {
        match self {
            _ if self.is_arm64e() => (raw >> 62 & 1) == 1,
            DyldPointerFormat::Ptr64 | DyldPointerFormat::Ptr64Offset => (raw >> 63 & 1) == 1,
            DyldPointerFormat::Ptr32 => (raw >> 31 & 1) == 1,
            _ => false,
        }
    }

    /// Raw `next` field of a slot word, bind or rebase alike.
    pub fn next(self, raw: u64) -> u64 {
        match self {
            _ if self.is_arm64e() => (raw >> 51) & 0x7ff,
            DyldPointerFormat::Arm64eSharedCache => (raw >> 52) & 0x7ff,
            DyldPointerFormat::Ptr64
            | DyldPointerFormat::Ptr64Offset
            | DyldPointerFormat::Ptr64KernelCache
            | DyldPointerFormat::X86_64KernelCache => (raw >> 51) & 0xfff,
            DyldPointerFormat::Ptr32 => (raw >> 26) & 0x1f,
            DyldPointerFormat::Ptr32Cache => (raw >> 30) & 0x3,
            DyldPointerFormat::Ptr32Firmware => (raw >> 26) & 0x3f,
            _ => 0,
        }
    }

    /// Decodes a rebase slot word into its on-disk structure.
    ///
    /// Binds and the cache/firmware layouts have no rebase structure here and
    /// come back as [`RebaseVariant::Unknown`].
    pub fn classify(self, raw: u64) -> RebaseVariant {
        if self.is_bind(raw) {
            return RebaseVariant::Unknown;
        }
        match self {
            _ if self.is_arm64e() => {
                if (raw >> 63 & 1) == 1 {
                    RebaseVariant::Arm64eAuthRebase(DyldChainedPtrArm64eAuthRebase::parse(raw))
                } else {
                    RebaseVariant::Arm64eRebase(DyldChainedPtrArm64eRebase::parse(raw))
                }
            }
            DyldPointerFormat::Ptr64 | DyldPointerFormat::Ptr64Offset => {
                RebaseVariant::Ptr64Rebase(DyldChainedPtr64Rebase::parse(raw))
            }
            DyldPointerFormat::Ptr32 => {
                RebaseVariant::Ptr32Rebase(DyldChainedPtr32Rebase::parse(raw as u32))
            }
            _ => RebaseVariant::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use crate::fixups::RebaseKind;

    use super::*;

    #[test]
    fn test_pointer_format_parse() {
        let bytes = [0x02, 0x01, 0xaa];
        let (rest, format) = DyldPointerFormat::parse(&bytes).unwrap();
        // upper byte of the tag is masked off
        assert_eq!(format, DyldPointerFormat::Ptr64);
        assert_eq!(rest, &[0xaa]);

        assert!(DyldPointerFormat::parse(&[0x00, 0x00]).is_err());
        assert_eq!(
            DyldPointerFormat::from_raw(0x40),
            Err(FixupError::InvalidPointerFormat(0x40))
        );
        assert_eq!(
            DyldPointerFormat::from_raw(12),
            Ok(DyldPointerFormat::Arm64eUserland24)
        );
    }

    #[test]
    fn test_every_format_round_trips_its_tag() {
        for format in DyldPointerFormat::iter() {
            assert_eq!(DyldPointerFormat::from_raw(format as u16), Ok(format));
            assert!(format.stride() > 0);
            // a zero next field always ends the chain
            assert_eq!(format.next(0), 0);
        }
    }

    #[test]
    fn test_pointer_size_and_stride() {
        assert_eq!(DyldPointerFormat::Ptr32.pointer_size(), 4);
        assert_eq!(DyldPointerFormat::Arm64e.pointer_size(), 8);
        assert_eq!(DyldPointerFormat::Arm64e.stride(), 8);
        assert_eq!(DyldPointerFormat::Ptr64Offset.stride(), 4);
        assert_eq!(DyldPointerFormat::X86_64KernelCache.stride(), 1);
    }

    #[test]
    fn test_classify_arm64e() {
        let format = DyldPointerFormat::Arm64e;
        assert_eq!(format.classify(0x4000).kind(), RebaseKind::Arm64eRebase);
        assert_eq!(
            format.classify(0x4000 | (1u64 << 63)).kind(),
            RebaseKind::Arm64eAuthRebase
        );
        // binds are not rebases
        assert_eq!(format.classify(1u64 << 62).kind(), RebaseKind::Unknown);
        assert_eq!(format.classify((1u64 << 62) | (1u64 << 63)).kind(), RebaseKind::Unknown);
    }

    #[test]
    fn test_classify_generic() {
        assert_eq!(
            DyldPointerFormat::Ptr64Offset.classify(0x1000).kind(),
            RebaseKind::Ptr64Rebase
        );
        assert_eq!(
            DyldPointerFormat::Ptr64.classify(1u64 << 63).kind(),
            RebaseKind::Unknown
        );
        assert_eq!(
            DyldPointerFormat::Ptr32.classify(0x1000).kind(),
            RebaseKind::Ptr32Rebase
        );
        assert_eq!(
            DyldPointerFormat::Ptr32Cache.classify(0x1000).kind(),
            RebaseKind::Unknown
        );
    }

    #[test]
    fn test_vmaddr_formats() {
        assert!(DyldPointerFormat::Ptr64.stores_vmaddr());
        assert!(DyldPointerFormat::Arm64e.stores_vmaddr());
        assert!(DyldPointerFormat::Arm64eFirmware.stores_vmaddr());
        assert!(DyldPointerFormat::Ptr32.stores_vmaddr());
        assert!(!DyldPointerFormat::Ptr64Offset.stores_vmaddr());
        assert!(!DyldPointerFormat::Arm64eUserland.stores_vmaddr());
        assert!(!DyldPointerFormat::Arm64eUserland24.stores_vmaddr());
        assert!(!DyldPointerFormat::Arm64eKernel.stores_vmaddr());
    }

    #[test]
    fn test_next_field() {
        assert_eq!(DyldPointerFormat::Arm64e.next(3u64 << 51), 3);
        assert_eq!(DyldPointerFormat::Ptr64.next(0xfffu64 << 51), 0xfff);
        assert_eq!(DyldPointerFormat::Ptr32.next(7u64 << 26), 7);
        assert_eq!(DyldPointerFormat::Ptr32Firmware.next(0x3fu64 << 26), 0x3f);
    }
}
