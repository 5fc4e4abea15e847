use log::{trace, warn};
use nom::number::complete::{le_u32, le_u64};

use crate::error::{FixupError, FixupResult};
use crate::pointer_format::DyldPointerFormat;
use crate::relocation_fixup::RelocationFixup;

fn read_slot(data: &[u8], pos: usize, pointer_format: DyldPointerFormat) -> FixupResult<u64> {
    let needed = pointer_format.pointer_size();
    let available = data.len().saturating_sub(pos);
    let truncated = FixupError::Truncated {
        offset: pos as u64,
        needed,
        available,
    };
    if available < needed {
        return Err(truncated);
    }

    let bytes = &data[pos..];
    let raw = if needed == 4 {
        le_u32::<_, nom::error::Error<&[u8]>>(bytes).map(|(_, raw)| raw as u64)
    } else {
        le_u64::<_, nom::error::Error<&[u8]>>(bytes).map(|(_, raw)| raw)
    };
    raw.map_err(|_| truncated)
}

/// Follows one fixup chain through `data`, a segment's bytes.
///
/// `segment_offset` is the distance from the image base to the start of
/// `data` and `start` is the first slot of the chain within it. Binds are
/// stepped over; every other slot yields a record, `Unknown` included.
pub fn walk_chain(
    data: &[u8],
    pointer_format: DyldPointerFormat,
    image_base: u64,
    segment_offset: u64,
    start: usize,
) -> FixupResult<Vec<RelocationFixup>> {
    let stride = pointer_format.stride() as usize;
    let mut fixups = Vec::new();
    let mut pos = start;

    loop {
        let raw = read_slot(data, pos, pointer_format)?;
        let offset = segment_offset
            .checked_add(pos as u64)
            .ok_or(FixupError::ChainOverflow { offset: segment_offset })?;

        if pointer_format.is_bind(raw) {
            trace!("skipping bind at {:#x}", offset);
        } else {
            let fixup = RelocationFixup::from_raw(pointer_format, image_base, offset, raw);
            trace!("{} at {:#x}", fixup.rebase().kind(), offset);
            fixups.push(fixup);
        }

        let next = pointer_format.next(raw) as usize;
        if next == 0 {
            break;
        }
        pos = next
            .checked_mul(stride)
            .and_then(|delta| pos.checked_add(delta))
            .ok_or(FixupError::ChainOverflow { offset })?;
    }

    Ok(fixups)
}

fn shift_target(fixup: &mut RelocationFixup, delta: i64) -> FixupResult<()> {
    let target = fixup.target()?;
    let image_base = fixup.image_base();
    match target.checked_add_signed(delta) {
        Some(shifted) if shifted >= image_base => fixup.set_target(shifted),
        shifted => Err(FixupError::ArithmeticPrecondition {
            address: shifted.unwrap_or_else(|| target.wrapping_add_signed(delta)),
            image_base,
        }),
    }
}

/// Moves every target by `delta`, e.g. when the image is re-linked at a new
/// base. Entries that can't be updated are skipped and reported by slot
/// address; the rest of the table is still processed.
///
/// A target pushed below the image base (or past `u64`) can't be stored
/// relative to it, so that entry is reported and left as it was.
pub fn shift_targets(fixups: &mut [RelocationFixup], delta: i64) -> Vec<(u64, FixupError)> {
    let mut failures = Vec::new();
    for fixup in fixups.iter_mut() {
        if let Err(err) = shift_target(fixup, delta) {
            warn!("skipping fixup at {:#x}: {}", fixup.address(), err);
            failures.push((fixup.address(), err));
        }
    }
    failures
}
