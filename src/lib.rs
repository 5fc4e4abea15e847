//! Decoding and re-encoding of Mach-O chained pointer rebase fixups.
//!
//! A [`RelocationFixup`] wraps one on-disk rebase structure together with the
//! image base it is relative to, and exposes it as "the slot at `address()`
//! points to `target()`" regardless of which pointer layout it came from.

pub mod chain;
pub mod codec;
pub mod error;
pub mod fixups;
pub mod pointer_format;
pub mod relocation;
pub mod relocation_fixup;
pub mod symbol;

pub use chain::{shift_targets, walk_chain};
pub use error::{FixupError, FixupResult};
pub use fixups::{
    DyldChainedPtr32Rebase, DyldChainedPtr64Rebase, DyldChainedPtrArm64eAuthRebase,
    DyldChainedPtrArm64eRebase, DyldFixupPACKey, RebaseKind, RebaseVariant,
};
pub use pointer_format::DyldPointerFormat;
pub use relocation::{
    GenericRelocation, Relocation, RelocationBase, RelocationOrigin, RelocationVisitor,
};
pub use relocation_fixup::RelocationFixup;
pub use symbol::SymbolLookup;
