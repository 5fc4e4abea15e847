use thiserror::Error;

use crate::fixups::RebaseKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixupError {
    #[error("unknown rebase type")]
    UnknownFormat,

    #[error("updating a {kind} fixup is not supported")]
    UnsupportedOperation { kind: RebaseKind },

    #[error("address {address:#x} is below the image base {image_base:#x}")]
    ArithmeticPrecondition { address: u64, image_base: u64 },

    #[error("invalid chained pointer format: {0:#x}")]
    InvalidPointerFormat(u16),

    #[error("fixup at offset {offset:#x} needs {needed} bytes, have {available}")]
    Truncated {
        offset: u64,
        needed: usize,
        available: usize,
    },

    #[error("fixup chain overflows past offset {offset:#x}")]
    ChainOverflow { offset: u64 },
}

impl FixupError {
    /// Whether table-level code may skip the offending entry and keep going.
    ///
    /// Errors tied to a single entry are recoverable; errors that break the
    /// chain itself are not, since the next slot can no longer be located.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FixupError::UnknownFormat
                | FixupError::UnsupportedOperation { .. }
                | FixupError::ArithmeticPrecondition { .. }
        )
    }
}

pub type FixupResult<T> = Result<T, FixupError>;
