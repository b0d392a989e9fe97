//! Reading existing images into a [Volume].
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::boot::{mbr_image_size, BootImage, BootRecord, MediaType, VIRTUAL_SECTOR};
use crate::config::{Encoding, ReadConfig};
use crate::cursor::BlockReader;
use crate::hardlink::HardLinkTable;
use crate::nodes::{FileId, Location, Node, NodeKind, S_IFDIR};
use crate::wire::BLOCK_SIZE;
use crate::{Error, Volume};

mod boot;
mod descriptor;
mod directory;
mod record;
mod susp;

pub use boot::BootCatalogEntry;
pub(crate) use boot::checksum16;

/// Location and length of a directory extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Extent {
    pub lba: u32,
    pub size: u32,
}

/// What the volume descriptors of an image say about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub volume_id: String,
    pub publisher: String,
    pub data_preparer: String,
    pub creation_time: Option<OffsetDateTime>,
    /// Volume space size, in blocks.
    pub volume_blocks: u32,
    pub has_rock_ridge: bool,
    /// Volume id from the Joliet descriptor, if there is one.
    pub joliet_volume_id: Option<String>,
    pub boot: Option<BootCatalogEntry>,
    pub(crate) primary_root: Extent,
    pub(crate) joliet_root: Option<Extent>,
    pub(crate) rr_skip: usize,
}

impl ImageInfo {
    pub fn has_joliet(&self) -> bool {
        self.joliet_root.is_some()
    }
}

/// An image opened for reading.
#[derive(Debug)]
pub(crate) struct SourceImage {
    pub path: PathBuf,
    pub file: File,
    pub dev: u64,
    pub ino: u64,
    pub info: Option<ImageInfo>,
}

fn find_file_at(node: &Node, offset: u64) -> Option<FileId> {
    match node.kind() {
        NodeKind::File(f) => match f.location {
            Location::OnImage { offset: o, .. } if o == offset => Some(f.id),
            _ => None,
        },
        NodeKind::Directory(d) => d.iter().find_map(|n| find_file_at(n, offset)),
        NodeKind::Symlink { .. } => None,
    }
}

impl Volume {
    /// Opens the image at `path` as the source for reading. Any previously
    /// opened image is closed.
    #[instrument(skip(self), err)]
    pub fn open_image(&mut self, path: &Path) -> Result<(), Error> {
        let file = File::open(path).map_err(|e| Error::OpenRead(path.to_owned(), e))?;
        let meta = file
            .metadata()
            .map_err(|e| Error::Stat(path.to_owned(), e))?;
        self.source = Some(SourceImage {
            path: path.to_owned(),
            file,
            dev: meta.dev(),
            ino: meta.ino(),
            info: None,
        });
        Ok(())
    }

    /// Closes the source image. Files read from it can no longer be written
    /// or extracted afterwards.
    pub fn close_image(&mut self) {
        self.source = None;
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_ref().map(|s| s.path.as_path())
    }

    /// Parses the volume descriptors of the open image. The volume takes
    /// over the image's volume id, publisher and data preparer.
    pub fn read_volume_info(&mut self) -> Result<&ImageInfo, Error> {
        let source = self.source.as_mut().ok_or(Error::NoImageOpen)?;
        if source.info.is_none() {
            let info = descriptor::read_descriptors(BlockReader::new(&source.file))?;
            debug!(
                volume_id = %info.volume_id,
                joliet = info.has_joliet(),
                rock_ridge = info.has_rock_ridge,
                boot = info.boot.is_some(),
                "read volume descriptors"
            );
            self.volume_id = info.volume_id.clone();
            self.publisher = info.publisher.clone();
            self.data_preparer = info.data_preparer.clone();
            source.info = Some(info);
        }
        source.info.as_ref().ok_or(Error::NoImageOpen)
    }

    /// Replaces the volume tree with the tree of the open image, using the
    /// names of the requested encoding.
    #[instrument(skip(self), err)]
    pub fn read_directory_tree(&mut self, config: &ReadConfig) -> Result<(), Error> {
        self.read_volume_info()?;
        let source = self.source.as_ref().ok_or(Error::NoImageOpen)?;
        let info = source.info.as_ref().ok_or(Error::NoImageOpen)?;

        let (root, joliet) = match config.encoding {
            Encoding::Joliet => (
                info.joliet_root
                    .ok_or(Error::EncodingNotPresent(Encoding::Joliet))?,
                true,
            ),
            Encoding::RockRidge if !info.has_rock_ridge => {
                return Err(Error::EncodingNotPresent(Encoding::RockRidge))
            }
            Encoding::RockRidge | Encoding::Iso9660 => (info.primary_root, false),
        };

        let mut hard_links = HardLinkTable::default();
        let mut tree = directory::TreeReader::new(
            BlockReader::new(&source.file),
            &source.file,
            config,
            &self.config,
            info.has_rock_ridge && !joliet,
            info.rr_skip,
            joliet,
            &mut hard_links,
            &mut self.next_file_id,
        );
        let (children, root_mode) = tree.read_root(root)?;
        let catalog = info.boot.clone();

        self.root = Node {
            name: String::new(),
            mode: S_IFDIR | root_mode.map_or(self.config.dir_mode, |m| m & 0o7777),
            original_9660_name: None,
            kind: NodeKind::Directory(children),
        };
        self.hard_links = hard_links;
        self.boot = match catalog {
            Some(entry) => Some(self.attach_boot(&entry)?),
            None => None,
        };
        Ok(())
    }

    /// Ties the catalog's boot image to the file at the same extent, or
    /// keeps it hidden with a size derived from the media type.
    fn attach_boot(&self, entry: &BootCatalogEntry) -> Result<BootRecord, Error> {
        let offset = u64::from(entry.load_lba) * BLOCK_SIZE;
        let image = match find_file_at(&self.root, offset) {
            Some(id) => BootImage::Visible(id),
            None => {
                let size = match entry.media.floppy_size() {
                    Some(size) => size,
                    None => {
                        let source = self.source.as_ref().ok_or(Error::NoImageOpen)?;
                        let mbr = BlockReader::new(&source.file).read_vec(offset, 512)?;
                        match entry.media {
                            MediaType::HardDisk => mbr_image_size(&mbr),
                            _ => None,
                        }
                        .unwrap_or(u64::from(entry.sector_count) * VIRTUAL_SECTOR)
                    }
                };
                let size = u32::try_from(size)
                    .map_err(|_| Error::InvalidImage("boot image is too large".to_string()))?;
                BootImage::Hidden(Location::OnImage { offset, size })
            }
        };
        let mut record = BootRecord::new(entry.media, entry.system_type, image);
        record.load_segment = entry.load_segment;
        Ok(record)
    }
}
