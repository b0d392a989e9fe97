//! El Torito boot record of a volume.
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::nodes::{FileId, Location};
use crate::Error;

/// Boot media emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    NoEmulation,
    Floppy1200,
    Floppy1440,
    Floppy2880,
    HardDisk,
}

/// Offset of the first partition entry in a master boot record.
const MBR_PARTITION_TABLE: usize = 0x1be;

/// Load segment BIOSes use when the catalog says 0.
pub(crate) const DEFAULT_LOAD_SEGMENT: u16 = 0x07c0;

/// Bytes per emulated sector, the unit of the catalog's sector count.
pub(crate) const VIRTUAL_SECTOR: u64 = 512;

impl MediaType {
    /// Value of the catalog's boot media type field.
    pub(crate) fn code(self) -> u8 {
        match self {
            MediaType::NoEmulation => 0,
            MediaType::Floppy1200 => 1,
            MediaType::Floppy1440 => 2,
            MediaType::Floppy2880 => 3,
            MediaType::HardDisk => 4,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Some(match code & 0x0f {
            0 => MediaType::NoEmulation,
            1 => MediaType::Floppy1200,
            2 => MediaType::Floppy1440,
            3 => MediaType::Floppy2880,
            4 => MediaType::HardDisk,
            _ => return None,
        })
    }

    /// The exact image size floppy emulation requires.
    pub fn floppy_size(self) -> Option<u64> {
        match self {
            MediaType::Floppy1200 => Some(1_228_800),
            MediaType::Floppy1440 => Some(1_474_560),
            MediaType::Floppy2880 => Some(2_949_120),
            _ => None,
        }
    }

    /// Sectors the BIOS loads, as recorded in the catalog entry.
    pub(crate) fn sector_count(self) -> u16 {
        match self {
            MediaType::NoEmulation => 4,
            _ => 1,
        }
    }

    /// Rejects images whose size does not match a floppy media type.
    pub(crate) fn check_size(self, actual: u64) -> Result<(), Error> {
        match self.floppy_size() {
            Some(expected) if expected != actual => {
                Err(Error::BootImageSizeMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaType::NoEmulation => "no-emulation",
            MediaType::Floppy1200 => "floppy-1.2",
            MediaType::Floppy1440 => "floppy-1.44",
            MediaType::Floppy2880 => "floppy-2.88",
            MediaType::HardDisk => "hard-disk",
        })
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "no-emulation" | "noemul" => MediaType::NoEmulation,
            "floppy-1.2" => MediaType::Floppy1200,
            "floppy-1.44" => MediaType::Floppy1440,
            "floppy-2.88" => MediaType::Floppy2880,
            "hard-disk" | "hd" => MediaType::HardDisk,
            other => return Err(format!("unknown boot media type {other:?}")),
        })
    }
}

/// Where the boot image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootImage {
    /// A regular file in the volume tree.
    Visible(FileId),
    /// Bytes not reachable through the tree, written after the catalog.
    Hidden(Location),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRecord {
    pub(crate) media: MediaType,
    /// Partition type of a hard disk image's first MBR partition.
    pub(crate) system_type: u8,
    pub(crate) load_segment: u16,
    pub(crate) image: BootImage,
}

impl BootRecord {
    pub(crate) fn new(media: MediaType, system_type: u8, image: BootImage) -> Self {
        BootRecord {
            media,
            system_type,
            load_segment: 0,
            image,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.media
    }

    pub fn image(&self) -> &BootImage {
        &self.image
    }

    pub fn load_segment(&self) -> u16 {
        if self.load_segment == 0 {
            DEFAULT_LOAD_SEGMENT
        } else {
            self.load_segment
        }
    }
}

/// The system type of a hard disk image is the type byte of its first
/// partition.
pub(crate) fn mbr_system_type(mbr: &[u8]) -> u8 {
    mbr.get(MBR_PARTITION_TABLE + 4).copied().unwrap_or(0)
}

/// Size of a hard disk image: end of its first partition, from the
/// partition's start LBA and sector count.
pub(crate) fn mbr_image_size(mbr: &[u8]) -> Option<u64> {
    let entry = mbr.get(MBR_PARTITION_TABLE..MBR_PARTITION_TABLE + 16)?;
    let start = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
    let count = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]);
    let sectors = u64::from(start) + u64::from(count);
    (sectors > 0).then(|| sectors * VIRTUAL_SECTOR)
}

#[cfg(test)]
mod tests {
    use super::{mbr_image_size, mbr_system_type, MediaType};
    use crate::Error;
    use rstest::rstest;

    #[rstest]
    #[case(MediaType::NoEmulation)]
    #[case(MediaType::Floppy1200)]
    #[case(MediaType::Floppy1440)]
    #[case(MediaType::Floppy2880)]
    #[case(MediaType::HardDisk)]
    fn codes_and_names(#[case] media: MediaType) {
        assert_eq!(Some(media), MediaType::from_code(media.code()));
        assert_eq!(media, media.to_string().parse().unwrap());
    }

    #[test]
    fn floppy_sizes_are_exact() {
        MediaType::Floppy1440.check_size(1_474_560).unwrap();
        assert!(matches!(
            MediaType::Floppy1440.check_size(1_474_561),
            Err(Error::BootImageSizeMismatch {
                expected: 1_474_560,
                actual: 1_474_561
            })
        ));
        MediaType::NoEmulation.check_size(3).unwrap();
    }

    #[test]
    fn mbr_fields() {
        let mut mbr = vec![0u8; 512];
        mbr[0x1be + 4] = 0x0c;
        mbr[0x1be + 8..0x1be + 12].copy_from_slice(&63u32.to_le_bytes());
        mbr[0x1be + 12..0x1be + 16].copy_from_slice(&1000u32.to_le_bytes());
        assert_eq!(0x0c, mbr_system_type(&mbr));
        assert_eq!(Some(1063 * 512), mbr_image_size(&mbr));
        assert_eq!(None, mbr_image_size(&[0u8; 512]));
        assert_eq!(0, mbr_system_type(&[]));
    }
}
