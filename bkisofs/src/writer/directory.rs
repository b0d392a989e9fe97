//! Directory record serialization.
use std::io::{Seek, Write};

use crate::cursor::ImageCursor;
use crate::reader::Extent;
use crate::wire::{both_u16, both_u32, BLOCK_SIZE, DR_BASE_LEN};
use crate::Error;

/// Longest record we produce. Records have even length.
pub(crate) const MAX_RECORD: usize = 254;

/// Identifier of the `.` record.
pub(crate) const DOT: &[u8] = &[0];

/// Identifier of the `..` record.
pub(crate) const DOTDOT: &[u8] = &[1];

/// Offset of the system use area in a record with `identifier`.
pub(crate) fn system_use_offset(identifier: &[u8]) -> usize {
    DR_BASE_LEN + identifier.len() + (identifier.len() + 1) % 2
}

/// Serializes a directory record.
pub(crate) fn record(
    extent: Extent,
    flags: u8,
    time: &[u8; 7],
    identifier: &[u8],
    system_use: &[u8],
) -> Vec<u8> {
    let mut r = vec![0u8; DR_BASE_LEN];
    r[2..10].copy_from_slice(&both_u32(extent.lba));
    r[10..18].copy_from_slice(&both_u32(extent.size));
    r[18..25].copy_from_slice(time);
    r[25] = flags;
    r[28..32].copy_from_slice(&both_u16(1));
    r[32] = identifier.len() as u8;
    r.extend_from_slice(identifier);
    if identifier.len() % 2 == 0 {
        r.push(0);
    }
    r.extend_from_slice(system_use);
    if r.len() % 2 == 1 {
        r.push(0);
    }
    r[0] = r.len() as u8;
    r
}

/// The bytes which replace the extent and size fields of a record.
pub(crate) fn extent_fields(extent: Extent) -> [u8; 16] {
    let mut f = [0u8; 16];
    f[..8].copy_from_slice(&both_u32(extent.lba));
    f[8..].copy_from_slice(&both_u32(extent.size));
    f
}

/// Offset of the extent field inside a record.
pub(crate) const EXTENT_FIELD: u64 = 2;

/// Writes `record` so that it does not cross a block boundary. A record
/// that would is erased and written again at the start of the next block.
/// Returns the offset it landed at.
pub(crate) fn write_record<W: Write + Seek>(
    out: &mut ImageCursor<W>,
    record: &[u8],
) -> Result<u64, Error> {
    for _ in 0..2 {
        let start = out.tell();
        out.write(record)?;
        let last = out.tell() - 1;
        if start / BLOCK_SIZE == last / BLOCK_SIZE {
            return Ok(start);
        }
        let boundary = (start / BLOCK_SIZE + 1) * BLOCK_SIZE;
        out.seek_to(start)?;
        out.write_zeros(boundary - start)?;
    }
    Err(Error::SanityCheckFailed(
        "directory record does not fit in a block",
    ))
}
