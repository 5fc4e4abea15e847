//! A single rebase entry from a chained fixup table.
//!
//! The record keeps the slot as an offset from the image base and the
//! on-disk rebase structure unchanged, so every accessor works in absolute
//! virtual addresses while the payload can always be re-encoded.

use std::fmt;

use log::warn;

use crate::error::{FixupError, FixupResult};
use crate::fixups::{
    DyldChainedPtr32Rebase, DyldChainedPtr64Rebase, DyldChainedPtrArm64eAuthRebase,
    DyldChainedPtrArm64eRebase, RebaseKind, RebaseVariant,
};
use crate::pointer_format::DyldPointerFormat;
use crate::relocation::{Relocation, RelocationBase, RelocationOrigin, RelocationVisitor};
use crate::symbol::SymbolLookup;

#[derive(Debug, Clone)]
pub struct RelocationFixup {
    pointer_format: DyldPointerFormat,
    image_base: u64,
    offset: u64,
    rebase: RebaseVariant,
    base: RelocationBase,
}

impl RelocationFixup {
    /// Creates a fixup at offset 0 with no rebase structure attached yet.
    pub fn new(pointer_format: DyldPointerFormat, image_base: u64) -> Self {
        RelocationFixup {
            pointer_format,
            image_base,
            offset: 0,
            rebase: RebaseVariant::Unknown,
            base: RelocationBase::new((pointer_format.pointer_size() * 8) as u8),
        }
    }

    /// Decodes the slot word `raw` found `offset` bytes past the image base.
    ///
    /// Formats whose plain rebases hold an unslid vmaddr have the image base
    /// taken off the stored target, so the payload is always base-relative
    /// and [`RelocationFixup::raw`] re-encodes that relative form.
    pub fn from_raw(
        pointer_format: DyldPointerFormat,
        image_base: u64,
        offset: u64,
        raw: u64,
    ) -> Self {
        let mut fixup = RelocationFixup::new(pointer_format, image_base);
        fixup.offset = offset;
        fixup.rebase = pointer_format.classify(raw);
        if pointer_format.stores_vmaddr() {
            fixup.rebase_vmaddr_to_offset();
        }
        fixup
    }

    fn rebase_vmaddr_to_offset(&mut self) {
        let image_base = self.image_base;
        let vmaddr = match &self.rebase {
            RebaseVariant::Arm64eRebase(rebase) => rebase.target,
            RebaseVariant::Ptr64Rebase(rebase) => rebase.target,
            RebaseVariant::Ptr32Rebase(rebase) => u64::from(rebase.target),
            _ => return,
        };
        if vmaddr < image_base {
            warn!(
                "{} rebase target {:#x} is below the image base {:#x}, kept as an offset",
                self.pointer_format, vmaddr, image_base
            );
            return;
        }
        let relative = vmaddr - image_base;
        match &mut self.rebase {
            RebaseVariant::Arm64eRebase(rebase) => rebase.target = relative,
            RebaseVariant::Ptr64Rebase(rebase) => rebase.target = relative,
            // a 32-bit vmaddr leaves a 32-bit offset
            RebaseVariant::Ptr32Rebase(rebase) => rebase.target = relative as u32,
            _ => {}
        }
    }

    pub fn pointer_format(&self) -> DyldPointerFormat {
        self.pointer_format
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn rebase(&self) -> &RebaseVariant {
        &self.rebase
    }

    pub fn base(&self) -> &RelocationBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut RelocationBase {
        &mut self.base
    }

    pub fn set_arm64e_rebase(&mut self, rebase: DyldChainedPtrArm64eRebase) {
        self.rebase = RebaseVariant::Arm64eRebase(rebase);
    }

    pub fn set_arm64e_auth_rebase(&mut self, rebase: DyldChainedPtrArm64eAuthRebase) {
        self.rebase = RebaseVariant::Arm64eAuthRebase(rebase);
    }

    pub fn set_ptr64_rebase(&mut self, rebase: DyldChainedPtr64Rebase) {
        self.rebase = RebaseVariant::Ptr64Rebase(rebase);
    }

    pub fn set_ptr32_rebase(&mut self, rebase: DyldChainedPtr32Rebase) {
        self.rebase = RebaseVariant::Ptr32Rebase(rebase);
    }

    /// Absolute address the slot points to once the image is loaded.
    pub fn target(&self) -> FixupResult<u64> {
        let relative = match &self.rebase {
            RebaseVariant::Arm64eRebase(rebase) => rebase.unpack_target(),
            RebaseVariant::Arm64eAuthRebase(rebase) => rebase.target as u64,
            RebaseVariant::Ptr64Rebase(rebase) => rebase.unpack_target(),
            // legacy 32-bit targets are stored verbatim
            RebaseVariant::Ptr32Rebase(rebase) => rebase.target as u64,
            RebaseVariant::Unknown => {
                warn!("can't get target at {:#x}: unknown rebase type", self.address());
                return Err(FixupError::UnknownFormat);
            }
        };
        Ok(self.image_base.wrapping_add(relative))
    }

    /// Points the slot at `target`.
    ///
    /// Targets below the image base are stored as-is rather than made
    /// relative. Offsets wider than the rebase's target field lose their
    /// upper bits. 32-bit rebases can't be updated and are left untouched.
    pub fn set_target(&mut self, target: u64) -> FixupResult<()> {
        let address = self.address();
        let relative = if target >= self.image_base {
            target - self.image_base
        } else {
            target
        };

        match &mut self.rebase {
            RebaseVariant::Arm64eRebase(rebase) => rebase.pack_target(relative),
            RebaseVariant::Arm64eAuthRebase(rebase) => rebase.set_target_offset(relative),
            RebaseVariant::Ptr64Rebase(rebase) => rebase.pack_target(relative),
            RebaseVariant::Ptr32Rebase(_) => {
                warn!("updating a dyld_chained_ptr_32_rebase is not supported yet");
                return Err(FixupError::UnsupportedOperation {
                    kind: RebaseKind::Ptr32Rebase,
                });
            }
            RebaseVariant::Unknown => {
                warn!("can't set target at {:#x}: unknown rebase type", address);
                return Err(FixupError::UnknownFormat);
            }
        }
        Ok(())
    }

    /// Absolute address of the slot.
    pub fn address(&self) -> u64 {
        self.image_base.wrapping_add(self.offset)
    }

    /// Moves the slot to `address`, which must not be below the image base.
    pub fn set_address(&mut self, address: u64) -> FixupResult<()> {
        self.offset = address
            .checked_sub(self.image_base)
            .ok_or(FixupError::ArithmeticPrecondition {
                address,
                image_base: self.image_base,
            })?;
        Ok(())
    }

    /// Re-encodes the slot word, `None` when there is no rebase structure.
    pub fn raw(&self) -> Option<u64> {
        self.rebase.raw()
    }

    /// Chained fixups always hold absolute targets.
    pub fn is_pc_relative(&self) -> bool {
        false
    }

    pub fn origin(&self) -> RelocationOrigin {
        RelocationOrigin::ChainedFixups
    }

    pub fn classof(relocation: &Relocation) -> bool {
        relocation.origin() == RelocationOrigin::ChainedFixups
    }

    pub fn accept(&self, visitor: &mut dyn RelocationVisitor) {
        visitor.visit_fixup(self);
    }

    /// `0x<address>: 0x<target>(<symbol>)` followed by the shared fields.
    ///
    /// An unknown rebase renders its target as zero.
    pub fn render(&self, symbols: Option<&dyn SymbolLookup>) -> String {
        let address = self.address();
        let mut out = format!(
            "0x{:08x}: 0x{:08x}",
            address,
            self.target().unwrap_or(0)
        );
        if let Some(name) = symbols.and_then(|symbols| symbols.symbol_at(address)) {
            out.push_str(&format!("({})", name));
        }
        out.push('\n');
        out.push_str(&self.base.render(self.origin()));
        out
    }
}

impl PartialEq for RelocationFixup {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.pointer_format == other.pointer_format
            && self.image_base == other.image_base
            && self.offset == other.offset
            && self.rebase == other.rebase
            && self.base == other.base
    }
}

impl Eq for RelocationFixup {}

impl fmt::Display for RelocationFixup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render(None))
    }
}
