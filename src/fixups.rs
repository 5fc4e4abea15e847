use bitfield::bitfield;
use log::debug;
use num::FromPrimitive;
use num_derive::FromPrimitive;
use strum_macros::Display;

use crate::codec::{pack_address, unpack_address};

#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq, Display)]
pub enum DyldFixupPACKey {
    IA = 0,
    IB = 1,
    DA = 2,
    DB = 3,
}

impl DyldFixupPACKey {
    fn from_bits(bits: u64) -> Self {
        // two bit field, every value has a key
        DyldFixupPACKey::from_u64(bits & 0b11).unwrap_or(DyldFixupPACKey::IA)
    }
}

bitfield! {
    pub struct DyldChainedPtrArm64eRebaseBF(u64);
    impl Debug;
    pub target, set_target: 42, 0;
    pub high8, set_high8: 50, 43;
    pub next, set_next: 61, 51;
    pub bind, set_bind: 62;
    pub auth, set_auth: 63;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyldChainedPtrArm64eRebase {
    pub target: u64,
    pub high8: u8,
    pub next: u16,
    pub bind: bool,
    pub auth: bool,
}

impl DyldChainedPtrArm64eRebase {
    pub const TARGET_BITS: u32 = 43;

    pub fn parse(raw: u64) -> Self {
        let bf = DyldChainedPtrArm64eRebaseBF(raw);
        DyldChainedPtrArm64eRebase {
            target: bf.target(),
            high8: bf.high8() as u8,
            next: bf.next() as u16,
            bind: bf.bind(),
            auth: bf.auth(),
        }
    }

    pub fn raw(&self) -> u64 {
        let mut bf = DyldChainedPtrArm64eRebaseBF(0);
        bf.set_target(self.target);
        bf.set_high8(self.high8 as u64);
        bf.set_next(self.next as u64);
        bf.set_bind(self.bind);
        bf.set_auth(self.auth);
        bf.0
    }

    pub fn unpack_target(&self) -> u64 {
        unpack_address(self.high8, self.target, Self::TARGET_BITS)
    }

    pub fn pack_target(&mut self, address: u64) {
        let (target, high8) = pack_address(address, Self::TARGET_BITS);
        self.target = target;
        self.high8 = high8;
    }
}

bitfield! {
    pub struct DyldChainedPtrArm64eAuthRebaseBF(u64);
    impl Debug;
    pub target, set_target: 31, 0;
    pub diversity, set_diversity: 47, 32;
    pub addr_div, set_addr_div: 48;
    pub key, set_key: 50, 49;
    pub next, set_next: 61, 51;
    pub bind, set_bind: 62;
    pub auth, set_auth: 63;
}

/// Authenticated rebase. The target is a plain offset from the image base;
/// the bits a raw pointer would use for `high8` carry the signing metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyldChainedPtrArm64eAuthRebase {
    pub target: u32,
    pub diversity: u16,
    pub addr_div: bool,
    pub key: DyldFixupPACKey,
    pub next: u16,
    pub bind: bool,
    pub auth: bool,
}

impl DyldChainedPtrArm64eAuthRebase {
    pub const TARGET_BITS: u32 = 32;

    pub fn parse(raw: u64) -> Self {
        let bf = DyldChainedPtrArm64eAuthRebaseBF(raw);
        DyldChainedPtrArm64eAuthRebase {
            target: bf.target() as u32,
            diversity: bf.diversity() as u16,
            addr_div: bf.addr_div(),
            key: DyldFixupPACKey::from_bits(bf.key()),
            next: bf.next() as u16,
            bind: bf.bind(),
            auth: bf.auth(),
        }
    }

    pub fn raw(&self) -> u64 {
        let mut bf = DyldChainedPtrArm64eAuthRebaseBF(0);
        bf.set_target(self.target as u64);
        bf.set_diversity(self.diversity as u64);
        bf.set_addr_div(self.addr_div);
        bf.set_key(self.key as u64);
        bf.set_next(self.next as u64);
        bf.set_bind(self.bind);
        bf.set_auth(self.auth);
        bf.0
    }

    /// Stores `offset` in the 32-bit target, dropping anything above it.
    pub fn set_target_offset(&mut self, offset: u64) {
        if offset > u32::MAX as u64 {
            debug!(
                "truncating auth rebase target {:#x} to {:#x}",
                offset, offset as u32
            );
        }
        self.target = offset as u32;
    }
}

bitfield! {
    pub struct DyldChainedPtr64RebaseBF(u64);
    impl Debug;
    pub target, set_target: 35, 0;
    pub high8, set_high8: 43, 36;
    pub reserved, set_reserved: 50, 44;
    pub next, set_next: 62, 51;
    pub bind, set_bind: 63;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyldChainedPtr64Rebase {
    pub target: u64,
    pub high8: u8,
    pub reserved: u8,
    pub next: u16,
    pub bind: bool,
}

impl DyldChainedPtr64Rebase {
    pub const TARGET_BITS: u32 = 36;

    pub fn parse(raw: u64) -> Self {
        let bf = DyldChainedPtr64RebaseBF(raw);
        DyldChainedPtr64Rebase {
            target: bf.target(),
            high8: bf.high8() as u8,
            reserved: bf.reserved() as u8,
            next: bf.next() as u16,
            bind: bf.bind(),
        }
    }

    pub fn raw(&self) -> u64 {
        let mut bf = DyldChainedPtr64RebaseBF(0);
        bf.set_target(self.target);
        bf.set_high8(self.high8 as u64);
        bf.set_reserved(self.reserved as u64);
        bf.set_next(self.next as u64);
        bf.set_bind(self.bind);
        bf.0
    }

    pub fn unpack_target(&self) -> u64 {
        unpack_address(self.high8, self.target, Self::TARGET_BITS)
    }

    pub fn pack_target(&mut self, address: u64) {
        let (target, high8) = pack_address(address, Self::TARGET_BITS);
        self.target = target;
        self.high8 = high8;
    }
}

bitfield! {
    pub struct DyldChainedPtr32RebaseBF(u32);
    impl Debug;
    pub target, set_target: 25, 0;
    pub next, set_next: 30, 26;
    pub bind, set_bind: 31;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyldChainedPtr32Rebase {
    pub target: u32,
    pub next: u8,
    pub bind: bool,
}

impl DyldChainedPtr32Rebase {
    pub const TARGET_BITS: u32 = 26;

    pub fn parse(raw: u32) -> Self {
        let bf = DyldChainedPtr32RebaseBF(raw);
        DyldChainedPtr32Rebase {
            target: bf.target(),
            next: bf.next() as u8,
            bind: bf.bind(),
        }
    }

    pub fn raw(&self) -> u32 {
        let mut bf = DyldChainedPtr32RebaseBF(0);
        bf.set_target(self.target);
        bf.set_next(self.next as u32);
        bf.set_bind(self.bind);
        bf.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RebaseKind {
    Arm64eRebase,
    Arm64eAuthRebase,
    Ptr64Rebase,
    Ptr32Rebase,
    Unknown,
}

/// The on-disk structure behind a single rebase fixup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebaseVariant {
    Arm64eRebase(DyldChainedPtrArm64eRebase),
    Arm64eAuthRebase(DyldChainedPtrArm64eAuthRebase),
    Ptr64Rebase(DyldChainedPtr64Rebase),
    Ptr32Rebase(DyldChainedPtr32Rebase),
    #[default]
    Unknown,
}

impl RebaseVariant {
    pub fn kind(&self) -> RebaseKind {
        match self {
            RebaseVariant::Arm64eRebase(_) => RebaseKind::Arm64eRebase,
            RebaseVariant::Arm64eAuthRebase(_) => RebaseKind::Arm64eAuthRebase,
            RebaseVariant::Ptr64Rebase(_) => RebaseKind::Ptr64Rebase,
            RebaseVariant::Ptr32Rebase(_) => RebaseKind::Ptr32Rebase,
            RebaseVariant::Unknown => RebaseKind::Unknown,
        }
    }

    /// Re-encodes the slot word. 32-bit rebases are zero extended.
    pub fn raw(&self) -> Option<u64> {
        match self {
            RebaseVariant::Arm64eRebase(rebase) => Some(rebase.raw()),
            RebaseVariant::Arm64eAuthRebase(rebase) => Some(rebase.raw()),
            RebaseVariant::Ptr64Rebase(rebase) => Some(rebase.raw()),
            RebaseVariant::Ptr32Rebase(rebase) => Some(rebase.raw() as u64),
            RebaseVariant::Unknown => None,
        }
    }

    /// Chain link to the following slot, in units of the format's stride.
    pub fn next(&self) -> Option<u64> {
        match self {
            RebaseVariant::Arm64eRebase(rebase) => Some(rebase.next as u64),
            RebaseVariant::Arm64eAuthRebase(rebase) => Some(rebase.next as u64),
            RebaseVariant::Ptr64Rebase(rebase) => Some(rebase.next as u64),
            RebaseVariant::Ptr32Rebase(rebase) => Some(rebase.next as u64),
            RebaseVariant::Unknown => None,
        }
    }
}
