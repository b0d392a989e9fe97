//! El Torito boot catalog parsing.
use tracing::warn;

use crate::boot::MediaType;
use crate::cursor::BlockReader;
use crate::wire::{le_u16, le_u32, EL_TORITO_ID};
use crate::Error;

const VALIDATION_HEADER: u8 = 0x01;
const BOOTABLE: u8 = 0x88;

/// The default entry of a boot catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootCatalogEntry {
    pub media: MediaType,
    pub load_segment: u16,
    pub system_type: u8,
    pub sector_count: u16,
    /// First block of the boot image.
    pub load_lba: u32,
}

/// Sum of the little-endian 16-bit words of `data`.
pub(crate) fn checksum16(data: &[u8]) -> u16 {
    data.chunks_exact(2)
        .fold(0u16, |sum, w| sum.wrapping_add(u16::from_le_bytes([w[0], w[1]])))
}

/// Boot system identifier check of a boot record volume descriptor.
pub(crate) fn is_el_torito(descriptor: &[u8]) -> bool {
    descriptor
        .get(7..7 + EL_TORITO_ID.len())
        .is_some_and(|id| id == EL_TORITO_ID)
}

/// Reads the validation and default entries of the catalog at `lba`.
///
/// A default entry that cannot be booted leaves the image without a boot
/// record.
pub(crate) fn read_catalog(reader: BlockReader, lba: u32) -> Result<Option<BootCatalogEntry>, Error> {
    let block = reader.read_block(lba)?;
    let validation = &block[..32];
    if validation[0] != VALIDATION_HEADER || validation[30..32] != [0x55, 0xaa] {
        return Err(Error::InvalidImage("bad boot catalog validation entry".to_string()));
    }
    if checksum16(validation) != 0 {
        return Err(Error::InvalidImage("bad boot catalog checksum".to_string()));
    }

    Ok(default_entry(&block[32..64]))
}

fn default_entry(entry: &[u8]) -> Option<BootCatalogEntry> {
    if entry[0] != BOOTABLE {
        warn!(indicator = entry[0], "boot catalog default entry is not bootable, ignoring it");
        return None;
    }
    let Some(media) = MediaType::from_code(entry[1]) else {
        warn!(media = entry[1], "unknown boot media type, ignoring boot record");
        return None;
    };
    Some(BootCatalogEntry {
        media,
        load_segment: le_u16(entry, 2),
        system_type: entry[4],
        sector_count: le_u16(entry, 6),
        load_lba: le_u32(entry, 8),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{checksum16, default_entry, is_el_torito, BootCatalogEntry, BOOTABLE};
    use crate::boot::MediaType;

    fn entry(indicator: u8, media: u8) -> [u8; 32] {
        let mut e = [0u8; 32];
        e[0] = indicator;
        e[1] = media;
        e[6] = 4;
        e[8..12].copy_from_slice(&27u32.to_le_bytes());
        e
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(3, checksum16(&[1, 0, 2, 0]));
        assert_eq!(0, checksum16(&[1, 0, 0xff, 0xff]));
    }

    #[test]
    fn el_torito_id() {
        let mut d = vec![0u8; 2048];
        d[7..30].copy_from_slice(b"EL TORITO SPECIFICATION");
        assert!(is_el_torito(&d));
        d[7] = b'X';
        assert!(!is_el_torito(&d));
        assert!(!is_el_torito(&[0; 10]));
    }

    #[test]
    fn bootable_default_entry() {
        assert_eq!(
            Some(BootCatalogEntry {
                media: MediaType::NoEmulation,
                load_segment: 0,
                system_type: 0,
                sector_count: 4,
                load_lba: 27,
            }),
            default_entry(&entry(BOOTABLE, 0))
        );
    }

    #[rstest]
    #[case::not_bootable(0x00, 0)]
    #[case::unknown_media(BOOTABLE, 9)]
    fn unusable_default_entry_is_ignored(#[case] indicator: u8, #[case] media: u8) {
        assert_eq!(None, default_entry(&entry(indicator, media)));
    }
}
