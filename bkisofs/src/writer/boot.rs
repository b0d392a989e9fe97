//! El Torito boot catalog and boot info table.
use crate::boot::{BootRecord, MediaType};
use crate::reader::checksum16;
use crate::wire::BLOCK_SIZE;

/// Offset of the boot info table inside a no-emulation boot image.
pub(crate) const INFO_TABLE_OFFSET: u64 = 8;

/// Bytes of the boot info table including its reserved tail.
pub(crate) const INFO_TABLE_LEN: usize = 56;

/// The checksum covers the image from here on.
pub(crate) const INFO_CHECKSUM_START: u64 = 64;

/// The boot catalog block: a validation entry followed by the default entry.
pub(crate) fn catalog(record: &BootRecord, image_lba: u32) -> Vec<u8> {
    let mut c = vec![0u8; BLOCK_SIZE as usize];
    c[0] = 0x01;
    c[30] = 0x55;
    c[31] = 0xaa;
    let sum = checksum16(&c[..32]);
    c[28..30].copy_from_slice(&0u16.wrapping_sub(sum).to_le_bytes());

    let entry = &mut c[32..64];
    entry[0] = 0x88;
    entry[1] = record.media.code();
    entry[2..4].copy_from_slice(&record.load_segment.to_le_bytes());
    entry[4] = record.system_type;
    entry[6..8].copy_from_slice(&record.media.sector_count().to_le_bytes());
    entry[8..12].copy_from_slice(&image_lba.to_le_bytes());
    c
}

/// Whether an image of this kind and size gets a boot info table.
pub(crate) fn wants_info_table(media: MediaType, size: u64) -> bool {
    media == MediaType::NoEmulation && size >= INFO_CHECKSUM_START
}

/// Running sum of little-endian 32-bit words. The tail of a stream that is
/// not a multiple of 4 bytes counts as zero-padded.
#[derive(Debug, Default)]
pub(crate) struct WordSum {
    sum: u32,
    pending: Vec<u8>,
}

impl WordSum {
    pub(crate) fn update(&mut self, mut data: &[u8]) {
        if !self.pending.is_empty() {
            let need = 4 - self.pending.len();
            let take = need.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() < 4 {
                return;
            }
            let word = std::mem::take(&mut self.pending);
            self.add(&word);
        }
        let mut words = data.chunks_exact(4);
        for w in &mut words {
            self.add(w);
        }
        self.pending.extend_from_slice(words.remainder());
    }

    fn add(&mut self, w: &[u8]) {
        self.sum = self
            .sum
            .wrapping_add(u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
    }

    pub(crate) fn finish(mut self) -> u32 {
        if !self.pending.is_empty() {
            let mut word = std::mem::take(&mut self.pending);
            word.resize(4, 0);
            self.add(&word);
        }
        self.sum
    }
}

/// The boot info table: descriptor set location, image location and
/// length, checksum, then reserved bytes.
pub(crate) fn info_table(pvd_lba: u32, image_lba: u32, size: u32, checksum: u32) -> [u8; INFO_TABLE_LEN] {
    let mut t = [0u8; INFO_TABLE_LEN];
    t[0..4].copy_from_slice(&pvd_lba.to_le_bytes());
    t[4..8].copy_from_slice(&image_lba.to_le_bytes());
    t[8..12].copy_from_slice(&size.to_le_bytes());
    t[12..16].copy_from_slice(&checksum.to_le_bytes());
    t
}
