//! The closed set of relocation kinds a Mach-O image can carry.
//!
//! Every relocation shares a [`RelocationBase`]; the concrete kind is told
//! apart by its [`RelocationOrigin`].

use strum_macros::Display;

use crate::relocation_fixup::RelocationFixup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RelocationOrigin {
    Dyldinfo,
    RelocTable,
    ChainedFixups,
}

/// Fields every relocation kind carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationBase {
    /// Size of the patched slot, in bits.
    pub size: u8,
    pub symbol: Option<String>,
    pub section: Option<String>,
    pub segment: Option<String>,
}

impl RelocationBase {
    pub fn new(size: u8) -> Self {
        RelocationBase {
            size,
            ..Default::default()
        }
    }

    pub fn render(&self, origin: RelocationOrigin) -> String {
        let mut out = format!("origin: {} size: {}", origin, self.size);
        if let Some(segment) = &self.segment {
            out.push_str(&format!(" segment: {}", segment));
        }
        if let Some(section) = &self.section {
            out.push_str(&format!(" section: {}", section));
        }
        if let Some(symbol) = &self.symbol {
            out.push_str(&format!(" symbol: {}", symbol));
        }
        out
    }
}

/// A relocation coming from the dyld info opcodes or a section's relocation
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericRelocation {
    pub origin: RelocationOrigin,
    pub address: u64,
    pub pc_relative: bool,
    pub base: RelocationBase,
}

pub trait RelocationVisitor {
    fn visit_fixup(&mut self, fixup: &RelocationFixup);

    fn visit_generic(&mut self, _relocation: &GenericRelocation) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    Generic(GenericRelocation),
    ChainedFixup(RelocationFixup),
}

impl Relocation {
    pub fn origin(&self) -> RelocationOrigin {
        match self {
            Relocation::Generic(reloc) => reloc.origin,
            Relocation::ChainedFixup(fixup) => fixup.origin(),
        }
    }

    pub fn address(&self) -> u64 {
        match self {
            Relocation::Generic(reloc) => reloc.address,
            Relocation::ChainedFixup(fixup) => fixup.address(),
        }
    }

    pub fn is_pc_relative(&self) -> bool {
        match self {
            Relocation::Generic(reloc) => reloc.pc_relative,
            Relocation::ChainedFixup(fixup) => fixup.is_pc_relative(),
        }
    }

    pub fn base(&self) -> &RelocationBase {
        match self {
            Relocation::Generic(reloc) => &reloc.base,
            Relocation::ChainedFixup(fixup) => fixup.base(),
        }
    }

    pub fn as_fixup(&self) -> Option<&RelocationFixup> {
        match self {
            Relocation::ChainedFixup(fixup) => Some(fixup),
            _ => None,
        }
    }

    pub fn as_fixup_mut(&mut self) -> Option<&mut RelocationFixup> {
        match self {
            Relocation::ChainedFixup(fixup) => Some(fixup),
            _ => None,
        }
    }

    pub fn accept(&self, visitor: &mut dyn RelocationVisitor) {
        match self {
            Relocation::Generic(reloc) => visitor.visit_generic(reloc),
            Relocation::ChainedFixup(fixup) => fixup.accept(visitor),
        }
    }
}

impl From<RelocationFixup> for Relocation {
    fn from(fixup: RelocationFixup) -> Self {
        Relocation::ChainedFixup(fixup)
    }
}

impl From<GenericRelocation> for Relocation {
    fn from(reloc: GenericRelocation) -> Self {
        Relocation::Generic(reloc)
    }
}

#[cfg(test)]
mod tests {
    use crate::fixups::DyldChainedPtr64Rebase;
    use crate::pointer_format::DyldPointerFormat;

    use super::*;

    fn generic() -> GenericRelocation {
        GenericRelocation {
            origin: RelocationOrigin::RelocTable,
            address: 0x4000,
            pc_relative: true,
            base: RelocationBase::new(32),
        }
    }

    fn fixup() -> RelocationFixup {
        let mut fixup = RelocationFixup::new(DyldPointerFormat::Ptr64, 0x1_0000_0000);
        fixup.set_ptr64_rebase(DyldChainedPtr64Rebase::parse(0x1000));
        fixup.set_address(0x1_0000_8000).unwrap();
        fixup
    }

    #[derive(Default)]
    struct Collect {
        fixups: Vec<u64>,
        generic: Vec<u64>,
    }

    impl RelocationVisitor for Collect {
        fn visit_fixup(&mut self, fixup: &RelocationFixup) {
            self.fixups.push(fixup.address());
        }

        fn visit_generic(&mut self, relocation: &GenericRelocation) {
            self.generic.push(relocation.address);
        }
    }

    #[test]
    fn test_narrowing_by_origin() {
        let relocs: Vec<Relocation> = vec![generic().into(), fixup().into()];
        assert_eq!(relocs[0].origin(), RelocationOrigin::RelocTable);
        assert!(relocs[0].as_fixup().is_none());
        assert!(!RelocationFixup::classof(&relocs[0]));

        assert_eq!(relocs[1].origin(), RelocationOrigin::ChainedFixups);
        assert!(RelocationFixup::classof(&relocs[1]));
        let narrowed = relocs[1].as_fixup().unwrap();
        assert_eq!(narrowed.target(), Ok(0x1_0000_1000));
    }

    #[test]
    fn test_shared_accessors() {
        let mut relocs: Vec<Relocation> = vec![generic().into(), fixup().into()];
        assert!(relocs[0].is_pc_relative());
        assert!(!relocs[1].is_pc_relative());
        assert_eq!(relocs[0].address(), 0x4000);
        assert_eq!(relocs[1].address(), 0x1_0000_8000);
        assert_eq!(relocs[1].base().size, 64);

        relocs[1]
            .as_fixup_mut()
            .unwrap()
            .set_target(0x1_0000_2000)
            .unwrap();
        assert_eq!(relocs[1].as_fixup().unwrap().target(), Ok(0x1_0000_2000));
    }

    #[test]
    fn test_visitor_dispatch() {
        let relocs: Vec<Relocation> = vec![generic().into(), fixup().into()];
        let mut visitor = Collect::default();
        for reloc in &relocs {
            reloc.accept(&mut visitor);
        }
        assert_eq!(visitor.generic, vec![0x4000]);
        assert_eq!(visitor.fixups, vec![0x1_0000_8000]);
    }

    #[test]
    fn test_base_render() {
        let mut base = RelocationBase::new(64);
        assert_eq!(
            base.render(RelocationOrigin::ChainedFixups),
            "origin: ChainedFixups size: 64"
        );
        base.segment = Some("__DATA_CONST".to_string());
        base.section = Some("__got".to_string());
        assert_eq!(
            base.render(RelocationOrigin::Dyldinfo),
            "origin: Dyldinfo size: 64 segment: __DATA_CONST section: __got"
        );
    }
}
