//! Walks the volume descriptor set.
use tracing::debug;

use super::boot::{is_el_torito, read_catalog};
use super::record::RawRecord;
use super::{susp, Extent, ImageInfo};
use crate::cursor::BlockReader;
use crate::wire::{
    le_u32, parse_long_timestamp, trim_a_chars, ucs2_decode, JOLIET_ESCAPES, STANDARD_ID,
    SYSTEM_AREA_BLOCKS, VD_BOOT_RECORD, VD_PRIMARY, VD_SUPPLEMENTARY, VD_TERMINATOR,
};
use crate::Error;

/// Descriptors examined before concluding the set has no terminator.
const MAX_DESCRIPTORS: usize = 64;

const ROOT_RECORD: std::ops::Range<usize> = 156..190;

/// Position in the descriptor set. The states are visited in order, some
/// repeat on consecutive descriptors of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SystemArea,
    Primary,
    ExtraPrimary,
    BootRecord,
    Supplementary,
    Done,
}

fn has_standard_id(d: &[u8]) -> bool {
    &d[1..6] == STANDARD_ID
}

fn root_extent(d: &[u8]) -> Result<Extent, Error> {
    let root = RawRecord::parse(&d[ROOT_RECORD])
        .ok_or_else(|| Error::InvalidImage("bad root directory record".to_string()))?;
    Ok(Extent {
        lba: root.extent,
        size: root.size,
    })
}

/// Parses the descriptors following the system area.
pub(crate) fn read_descriptors(reader: BlockReader) -> Result<ImageInfo, Error> {
    let mut info = ImageInfo::default();
    let mut state = State::SystemArea;
    let mut lba = 0u32;
    let mut examined = 0usize;

    while state != State::Done {
        if state != State::SystemArea {
            examined += 1;
            if examined > MAX_DESCRIPTORS {
                return Err(Error::InvalidImage(
                    "volume descriptor set has no terminator".to_string(),
                ));
            }
        }
        state = match state {
            State::SystemArea => {
                lba = SYSTEM_AREA_BLOCKS as u32;
                State::Primary
            }
            State::Primary => {
                let d = reader.read_block(lba)?;
                if d[0] != VD_PRIMARY {
                    return Err(Error::VolumeDescriptorNotPrimary);
                }
                if !has_standard_id(&d) {
                    return Err(Error::InvalidImage("missing CD001 identifier".to_string()));
                }
                read_primary(reader, &d, &mut info)?;
                lba += 1;
                State::ExtraPrimary
            }
            State::ExtraPrimary => {
                let d = reader.read_block(lba)?;
                if d[0] == VD_PRIMARY && has_standard_id(&d) {
                    lba += 1;
                    State::ExtraPrimary
                } else {
                    State::BootRecord
                }
            }
            State::BootRecord => {
                let d = reader.read_block(lba)?;
                if d[0] == VD_BOOT_RECORD && has_standard_id(&d) && is_el_torito(&d) {
                    let catalog = le_u32(&d, 71);
                    debug!(catalog, "found El Torito boot record");
                    info.boot = read_catalog(reader, catalog)?;
                    lba += 1;
                }
                State::Supplementary
            }
            State::Supplementary => {
                let d = reader.read_block(lba)?;
                if !has_standard_id(&d) {
                    return Err(Error::InvalidImage("missing CD001 identifier".to_string()));
                }
                lba += 1;
                match d[0] {
                    VD_TERMINATOR => State::Done,
                    VD_SUPPLEMENTARY if info.joliet_root.is_none() && is_joliet(&d) => {
                        let root = root_extent(&d)?;
                        debug!(lba = root.lba, "found Joliet descriptor");
                        info.joliet_volume_id = Some(ucs2_decode(&d[40..72]).trim_end().to_string());
                        info.joliet_root = Some(root);
                        State::Supplementary
                    }
                    _ => State::Supplementary,
                }
            }
            State::Done => State::Done,
        };
    }
    Ok(info)
}

fn is_joliet(d: &[u8]) -> bool {
    JOLIET_ESCAPES.iter().any(|esc| d[88..91] == esc[..])
}

fn read_primary(reader: BlockReader, d: &[u8], info: &mut ImageInfo) -> Result<(), Error> {
    info.volume_id = trim_a_chars(&d[40..72]);
    info.volume_blocks = le_u32(d, 80);
    info.publisher = trim_a_chars(&d[318..446]);
    info.data_preparer = trim_a_chars(&d[446..574]);
    info.creation_time = parse_long_timestamp(&d[813..830]);
    info.primary_root = root_extent(d)?;

    // Rock Ridge announces itself with an SP entry in the root's "." record.
    let block = reader.read_block(info.primary_root.lba)?;
    if let Some(dot) = RawRecord::parse(&block) {
        let rr = susp::parse(reader, dot.system_use)?;
        if let Some(skip) = rr.sp_skip {
            debug!(skip, "found Rock Ridge");
            info.has_rock_ridge = true;
            info.rr_skip = skip;
        }
    }
    Ok(())
}
