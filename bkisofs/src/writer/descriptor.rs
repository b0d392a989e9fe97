//! Volume descriptor serialization.
use time::OffsetDateTime;

use crate::reader::Extent;
use crate::wire::{
    a_chars, both_u16, both_u32, long_timestamp, short_timestamp, ucs2_chars,
    unset_long_timestamp, BLOCK_SIZE,
    EL_TORITO_ID, FLAG_DIRECTORY, JOLIET_ESCAPES, STANDARD_ID, VD_BOOT_RECORD, VD_PRIMARY,
    VD_SUPPLEMENTARY, VD_TERMINATOR,
};

use super::directory::{record, DOT};

const SYSTEM_ID: &str = "LINUX";
const APPLICATION_ID: &str = "BKISOFS";

/// Contents of a primary or Joliet supplementary descriptor.
#[derive(Debug, Clone)]
pub(crate) struct VolumeFields<'a> {
    pub volume_id: &'a str,
    pub publisher: &'a str,
    pub data_preparer: &'a str,
    pub volume_blocks: u32,
    pub path_table_size: u32,
    pub l_table: u32,
    pub m_table: u32,
    pub root: Extent,
    pub time: OffsetDateTime,
}

fn header(kind: u8) -> Vec<u8> {
    let mut d = vec![0u8; BLOCK_SIZE as usize];
    d[0] = kind;
    d[1..6].copy_from_slice(STANDARD_ID);
    d[6] = 1;
    d
}

/// The primary descriptor (`joliet` false) or the Joliet supplementary
/// descriptor, whose text fields are UCS-2.
pub(crate) fn volume(fields: &VolumeFields, joliet: bool) -> Vec<u8> {
    let mut d = header(if joliet { VD_SUPPLEMENTARY } else { VD_PRIMARY });
    let text = |s: &str, len: usize| {
        if joliet {
            ucs2_chars(s, len)
        } else {
            a_chars(s, len)
        }
    };

    d[8..40].copy_from_slice(&text(SYSTEM_ID, 32));
    d[40..72].copy_from_slice(&text(fields.volume_id, 32));
    d[80..88].copy_from_slice(&both_u32(fields.volume_blocks));
    if joliet {
        d[88..91].copy_from_slice(&JOLIET_ESCAPES[2]);
    }
    d[120..124].copy_from_slice(&both_u16(1));
    d[124..128].copy_from_slice(&both_u16(1));
    d[128..132].copy_from_slice(&both_u16(BLOCK_SIZE as u16));
    d[132..140].copy_from_slice(&both_u32(fields.path_table_size));
    d[140..144].copy_from_slice(&fields.l_table.to_le_bytes());
    d[148..152].copy_from_slice(&fields.m_table.to_be_bytes());

    let root = record(
        fields.root,
        FLAG_DIRECTORY,
        &short_timestamp(fields.time),
        DOT,
        &[],
    );
    d[156..156 + root.len()].copy_from_slice(&root);

    d[190..318].copy_from_slice(&text("", 128));
    d[318..446].copy_from_slice(&text(fields.publisher, 128));
    d[446..574].copy_from_slice(&text(fields.data_preparer, 128));
    d[574..702].copy_from_slice(&text(APPLICATION_ID, 128));
    d[702..739].copy_from_slice(&text("", 37));
    d[739..776].copy_from_slice(&text("", 37));
    d[776..813].copy_from_slice(&text("", 37));

    let created = long_timestamp(fields.time);
    d[813..830].copy_from_slice(&created);
    d[830..847].copy_from_slice(&created);
    d[847..864].copy_from_slice(&unset_long_timestamp());
    d[864..881].copy_from_slice(&unset_long_timestamp());
    d[881] = 1;
    d
}

/// The El Torito boot record pointing at the boot catalog.
pub(crate) fn boot_record(catalog: u32) -> Vec<u8> {
    let mut d = header(VD_BOOT_RECORD);
    d[7..7 + EL_TORITO_ID.len()].copy_from_slice(EL_TORITO_ID);
    d[71..75].copy_from_slice(&catalog.to_le_bytes());
    d
}

pub(crate) fn terminator() -> Vec<u8> {
    header(VD_TERMINATOR)
}
