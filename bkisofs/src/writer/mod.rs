//! Serializing a [Volume] into an image.
//!
//! The image is written front to back in a single pass. Fields that depend
//! on later parts of the layout (directory extents, file extents,
//! continuation areas, the boot catalog and the volume descriptors) are
//! written as placeholders and patched once their values are known.
//!
//! Layout:
//!
//! ```text
//! system area (16 blocks)
//! primary volume descriptor
//! boot record descriptor        (with a boot record)
//! Joliet descriptor             (with Joliet)
//! descriptor set terminator
//! boot catalog, hidden boot image
//! primary directory tree        (with Rock Ridge entries)
//! Joliet directory tree
//! path tables (L, M) of both trees
//! file contents
//! Rock Ridge continuation areas
//! ```
use std::collections::HashMap;
use std::fs::{self, File as HostFile};
use std::io::{BufWriter, Read, Seek, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use tracing::{debug, instrument, warn};

use self::directory::{extent_fields, system_use_offset, write_record, DOT, DOTDOT, EXTENT_FIELD, MAX_RECORD};
use self::path_table::Namespace;
use self::tree::WriteNode;
use crate::boot::BootImage;
use crate::config::WriteConfig;
use crate::content::open_location;
use crate::cursor::{ImageCursor, SizeSink, COPY_BUF_SIZE};
use crate::hardlink::HardLinkId;
use crate::nodes::{File, FileId, Location, NodeKind};
use crate::progress::{Progress, ProgressThrottle};
use crate::reader::Extent;
use crate::wire::{short_timestamp, BLOCK_SIZE, FLAG_DIRECTORY, SYSTEM_AREA_BLOCKS};
use crate::{Error, Volume};

mod boot;
mod descriptor;
mod directory;
mod path_table;
mod susp;
mod tree;

/// A `CE` entry waiting for its continuation area.
struct PendingContinuation {
    /// Offset of the `CE` entry in the image.
    entry_at: u64,
    area: Vec<u8>,
}

/// Where the path tables of one tree went.
#[derive(Debug, Clone, Copy)]
struct PathTables {
    l_lba: u32,
    m_lba: u32,
    size: u32,
}

struct ImageWriter<'v, 'p, W: Write + Seek> {
    volume: &'v Volume,
    config: &'v WriteConfig,
    source: Option<&'v HostFile>,
    out: ImageCursor<'p, W>,
    /// Without contents only the layout is computed.
    contents: bool,
    time: [u8; 7],
    continuations: Vec<PendingContinuation>,
    files: HashMap<FileId, Extent>,
    links: HashMap<HardLinkId, u32>,
    /// Boot file that receives a boot info table and so never shares its
    /// extent with other files.
    patched_boot: Option<FileId>,
}

impl<'v, 'p, W: Write + Seek> ImageWriter<'v, 'p, W> {
    fn new(volume: &'v Volume, config: &'v WriteConfig, out: ImageCursor<'p, W>, contents: bool) -> Self {
        ImageWriter {
            volume,
            config,
            source: volume.source.as_ref().map(|s| &s.file),
            out,
            contents,
            time: short_timestamp(config.creation_time),
            continuations: vec![],
            files: HashMap::new(),
            links: HashMap::new(),
            patched_boot: patched_boot_file(volume, config),
        }
    }

    /// Writes the whole image and returns its length.
    fn run(mut self) -> Result<u64, Error> {
        let volume = self.volume;
        let mut tree = WriteNode::build(&volume.root, "/")?;
        let joliet = self.config.joliet();

        self.out.write_zeros(SYSTEM_AREA_BLOCKS * BLOCK_SIZE)?;
        let pvd_lba = self.reserve_block()?;
        let boot_vd_lba = match volume.boot {
            Some(_) => Some(self.reserve_block()?),
            None => None,
        };
        let svd_lba = if joliet {
            Some(self.reserve_block()?)
        } else {
            None
        };
        self.out.write(&descriptor::terminator())?;

        let mut catalog_lba = None;
        let mut hidden_lba = None;
        if let Some(record) = &volume.boot {
            catalog_lba = Some(self.reserve_block()?);
            if let BootImage::Hidden(location) = &record.image {
                hidden_lba = Some(self.out.block()?);
                self.copy_contents(location)?;
            }
        }

        let root_px = (tree.node.mode(), links(&tree));
        self.write_primary_dir(&mut tree, root_px, true)?;
        if joliet {
            self.write_joliet_dir(&mut tree)?;
        }

        let primary_tables = self.write_path_tables(&tree, Namespace::Iso9660)?;
        let joliet_tables = if joliet {
            Some(self.write_path_tables(&tree, Namespace::Joliet)?)
        } else {
            None
        };

        self.write_contents(&mut tree)?;
        self.write_continuations()?;
        self.out.pad_to_block()?;

        let root = tree.layout_9660.extent;
        self.patch_dir(&tree, root, Namespace::Iso9660)?;
        if joliet {
            self.patch_dir(&tree, tree.layout_joliet.extent, Namespace::Joliet)?;
        }

        let volume_blocks = u32::try_from(self.out.end() / BLOCK_SIZE)
            .map_err(|_| Error::SanityCheckFailed("image exceeds 32-bit block addressing"))?;
        debug!(volume_blocks, "laid out image");

        if let (Some(record), Some(catalog_lba), Some(boot_vd_lba)) =
            (&volume.boot, catalog_lba, boot_vd_lba)
        {
            let (image_lba, location) = match &record.image {
                BootImage::Visible(id) => {
                    let file = volume
                        .find_file(*id)
                        .ok_or(Error::SanityCheckFailed("boot file is not in the tree"))?;
                    let extent = self
                        .files
                        .get(id)
                        .ok_or(Error::SanityCheckFailed("boot file was not written"))?;
                    (extent.lba, self.content_location(file))
                }
                BootImage::Hidden(location) => (
                    hidden_lba.ok_or(Error::SanityCheckFailed("hidden boot image was not written"))?,
                    location,
                ),
            };
            self.out.patch(
                u64::from(catalog_lba) * BLOCK_SIZE,
                &boot::catalog(record, image_lba),
            )?;
            if self.contents
                && self.config.boot_info_table
                && boot::wants_info_table(record.media, u64::from(location.size()))
            {
                self.patch_info_table(location, pvd_lba, image_lba)?;
            }
            self.out.patch(
                u64::from(boot_vd_lba) * BLOCK_SIZE,
                &descriptor::boot_record(catalog_lba),
            )?;
        }

        let mut fields = descriptor::VolumeFields {
            volume_id: &volume.volume_id,
            publisher: &volume.publisher,
            data_preparer: &volume.data_preparer,
            volume_blocks,
            path_table_size: primary_tables.size,
            l_table: primary_tables.l_lba,
            m_table: primary_tables.m_lba,
            root,
            time: self.config.creation_time,
        };
        self.out.patch(
            u64::from(pvd_lba) * BLOCK_SIZE,
            &descriptor::volume(&fields, false),
        )?;
        if let (Some(svd_lba), Some(tables)) = (svd_lba, joliet_tables) {
            fields.path_table_size = tables.size;
            fields.l_table = tables.l_lba;
            fields.m_table = tables.m_lba;
            fields.root = tree.layout_joliet.extent;
            self.out.patch(
                u64::from(svd_lba) * BLOCK_SIZE,
                &descriptor::volume(&fields, true),
            )?;
        }

        self.out.finish()
    }

    fn reserve_block(&mut self) -> Result<u32, Error> {
        let lba = self.out.block()?;
        self.out.write_zeros(BLOCK_SIZE)?;
        Ok(lba)
    }

    /// Writes one directory record and queues its continuation area.
    fn record(
        &mut self,
        flags: u8,
        identifier: &[u8],
        entries: Vec<Vec<u8>>,
    ) -> Result<u64, Error> {
        let su_at = system_use_offset(identifier);
        let fitted = susp::fit(entries, MAX_RECORD - su_at);
        let bytes = directory::record(Extent::default(), flags, &self.time, identifier, &fitted.inline);
        let at = write_record(&mut self.out, &bytes)?;
        if let Some((ce_at, area)) = fitted.spill {
            self.continuations.push(PendingContinuation {
                entry_at: at + (su_at + ce_at) as u64,
                area,
            });
        }
        Ok(at)
    }

    fn rock_ridge(&self, node: &WriteNode) -> Vec<Vec<u8>> {
        if !self.config.rock_ridge() {
            return vec![];
        }
        let mut entries = vec![susp::px(node.node.mode(), links(node))];
        entries.extend(susp::nm(node.node.name()));
        if let Some(target) = node.node.symlink_target() {
            entries.extend(susp::sl(target));
        }
        entries
    }

    /// Writes the primary records of `dir` and then its subdirectories.
    /// `parent` is the mode and link count reported in the `..` record.
    fn write_primary_dir(&mut self, dir: &mut WriteNode<'v>, parent: (u32, u32), is_root: bool) -> Result<(), Error> {
        self.out.check_cancel()?;
        let start = self.out.tell();
        dir.layout_9660.extent.lba = self.out.block()?;

        let rr = self.config.rock_ridge();
        let own_px = susp::px(dir.node.mode(), links(dir));
        let dot_entries = match (rr, is_root) {
            (false, _) => vec![],
            (true, true) => vec![susp::sp(), own_px, susp::er()],
            (true, false) => vec![own_px],
        };
        dir.layout_9660.dot = self.record(FLAG_DIRECTORY, DOT, dot_entries)?;
        let dotdot_entries = if rr {
            vec![susp::px(parent.0, parent.1)]
        } else {
            vec![]
        };
        dir.layout_9660.dotdot = self.record(FLAG_DIRECTORY, DOTDOT, dotdot_entries)?;

        let order = dir.order_9660.clone();
        for &i in &order {
            let entries = self.rock_ridge(&dir.children[i]);
            let child = &mut dir.children[i];
            let flags = if child.is_directory() { FLAG_DIRECTORY } else { 0 };
            child.record_9660 = self.record(flags, &child.identifier_9660(), entries)?;
        }
        self.out.pad_to_block()?;
        dir.layout_9660.extent.size = extent_size(start, self.out.tell())?;

        let own = (dir.node.mode(), links(dir));
        for &i in &order {
            if dir.children[i].is_directory() {
                self.write_primary_dir(&mut dir.children[i], own, false)?;
            }
        }
        Ok(())
    }

    fn write_joliet_dir(&mut self, dir: &mut WriteNode<'v>) -> Result<(), Error> {
        self.out.check_cancel()?;
        let start = self.out.tell();
        dir.layout_joliet.extent.lba = self.out.block()?;
        dir.layout_joliet.dot = self.record(FLAG_DIRECTORY, DOT, vec![])?;
        dir.layout_joliet.dotdot = self.record(FLAG_DIRECTORY, DOTDOT, vec![])?;

        let order = dir.order_joliet.clone();
        for &i in &order {
            let child = &mut dir.children[i];
            let flags = if child.is_directory() { FLAG_DIRECTORY } else { 0 };
            child.record_joliet = self.record(flags, &child.identifier_joliet(), vec![])?;
        }
        self.out.pad_to_block()?;
        dir.layout_joliet.extent.size = extent_size(start, self.out.tell())?;

        for &i in &order {
            if dir.children[i].is_directory() {
                self.write_joliet_dir(&mut dir.children[i])?;
            }
        }
        Ok(())
    }

    fn write_path_tables(&mut self, tree: &WriteNode, ns: Namespace) -> Result<PathTables, Error> {
        let entries = path_table::entries(tree, ns)?;
        let little = path_table::serialize(&entries, false);
        let size = u32::try_from(little.len()).map_err(|_| Error::TooManyDirectories)?;

        let l_lba = self.out.block()?;
        self.out.write(&little)?;
        self.out.pad_to_block()?;
        let m_lba = self.out.block()?;
        self.out.write(&path_table::serialize(&entries, true))?;
        self.out.pad_to_block()?;
        Ok(PathTables { l_lba, m_lba, size })
    }

    /// The bytes written for `file`: those of its hard link entry if it has
    /// one.
    fn content_location(&self, file: &'v File) -> &'v Location {
        let volume = self.volume;
        file.hard_link
            .and_then(|id| volume.hard_links.location(id))
            .unwrap_or(&file.location)
    }

    fn copy_contents(&mut self, location: &Location) -> Result<(), Error> {
        let size = u64::from(location.size());
        if self.contents {
            let mut src = open_location(location, self.source)?;
            self.out.copy_exact(&mut src, size)?;
        } else {
            self.out.skip(size)?;
        }
        self.out.pad_to_block()
    }

    /// Writes the contents of every file below `dir`, once per hard link
    /// entry.
    fn write_contents(&mut self, dir: &mut WriteNode<'v>) -> Result<(), Error> {
        let order = dir.order_9660.clone();
        for i in order {
            let child = &mut dir.children[i];
            let node = child.node;
            match node.kind() {
                NodeKind::Directory(_) => self.write_contents(child)?,
                NodeKind::File(file) => {
                    self.out.check_cancel()?;
                    let size = file.size();
                    let shared = file.hard_link.filter(|_| self.patched_boot != Some(file.id));
                    let linked = shared.and_then(|id| self.links.get(&id).copied());
                    let lba = match linked {
                        Some(lba) => lba,
                        None => {
                            let lba = self.out.block()?;
                            self.copy_contents(self.content_location(file))?;
                            if let Some(id) = shared {
                                self.links.insert(id, lba);
                            }
                            lba
                        }
                    };
                    child.data = Extent { lba, size };
                    self.files.insert(file.id, child.data);
                }
                NodeKind::Symlink { .. } => {}
            }
        }
        Ok(())
    }

    /// Packs the continuation areas into blocks. An area never crosses a
    /// block boundary.
    fn write_continuations(&mut self) -> Result<(), Error> {
        for pending in std::mem::take(&mut self.continuations) {
            let len = pending.area.len() as u64;
            if self.out.tell() % BLOCK_SIZE + len > BLOCK_SIZE {
                self.out.pad_to_block()?;
            }
            let block = self.out.block()?;
            let offset = (self.out.tell() % BLOCK_SIZE) as u32;
            self.out.write(&pending.area)?;
            self.out
                .patch(pending.entry_at, &susp::ce(block, offset, len as u32))?;
        }
        Ok(())
    }

    /// Fills in the extent fields of every record of `dir` and below.
    fn patch_dir(&mut self, dir: &WriteNode, parent: Extent, ns: Namespace) -> Result<(), Error> {
        let (layout, order) = match ns {
            Namespace::Iso9660 => (dir.layout_9660, &dir.order_9660),
            Namespace::Joliet => (dir.layout_joliet, &dir.order_joliet),
        };
        self.patch_record(layout.dot, layout.extent)?;
        self.patch_record(layout.dotdot, parent)?;
        for &i in order {
            let child = &dir.children[i];
            let at = match ns {
                Namespace::Iso9660 => child.record_9660,
                Namespace::Joliet => child.record_joliet,
            };
            match child.node.kind() {
                NodeKind::Directory(_) => {
                    let extent = match ns {
                        Namespace::Iso9660 => child.layout_9660.extent,
                        Namespace::Joliet => child.layout_joliet.extent,
                    };
                    self.patch_record(at, extent)?;
                    self.patch_dir(child, layout.extent, ns)?;
                }
                NodeKind::File(_) => self.patch_record(at, child.data)?,
                NodeKind::Symlink { .. } => {}
            }
        }
        Ok(())
    }

    fn patch_record(&mut self, at: u64, extent: Extent) -> Result<(), Error> {
        self.out.patch(at + EXTENT_FIELD, &extent_fields(extent))
    }

    /// Writes the boot info table into the boot image already on disc.
    fn patch_info_table(&mut self, location: &Location, pvd_lba: u32, image_lba: u32) -> Result<(), Error> {
        let mut src = open_location(location, self.source)?;
        let mut head = [0u8; boot::INFO_CHECKSUM_START as usize];
        src.read_exact(&mut head).map_err(Error::ReadGeneric)?;

        let mut sum = boot::WordSum::default();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = src.read(&mut buf).map_err(Error::ReadGeneric)?;
            if n == 0 {
                break;
            }
            sum.update(&buf[..n]);
        }

        let table = boot::info_table(pvd_lba, image_lba, location.size(), sum.finish());
        debug!(image_lba, "writing boot info table");
        self.out.patch(
            u64::from(image_lba) * BLOCK_SIZE + boot::INFO_TABLE_OFFSET,
            &table,
        )
    }
}

/// Link count reported for a node: directories count `.` and the `..` of
/// each subdirectory.
/// The visible boot file, when a boot info table will be patched into it.
fn patched_boot_file(volume: &Volume, config: &WriteConfig) -> Option<FileId> {
    let record = volume.boot.as_ref().filter(|_| config.boot_info_table)?;
    let BootImage::Visible(id) = record.image else {
        return None;
    };
    let file = volume.find_file(id)?;
    boot::wants_info_table(record.media, u64::from(file.size())).then_some(id)
}

fn links(node: &WriteNode) -> u32 {
    if node.is_directory() {
        2 + node.subdirectories() as u32
    } else {
        1
    }
}

fn extent_size(start: u64, end: u64) -> Result<u32, Error> {
    u32::try_from(end - start).map_err(|_| Error::SanityCheckFailed("directory extent too large"))
}

impl Volume {
    /// Computes the exact length of the image [Volume::write_image] would
    /// write with `config`, without reading any file contents.
    #[instrument(skip(self, config), err)]
    pub fn estimate_image_size(&self, config: &WriteConfig) -> Result<u64, Error> {
        let out = ImageCursor::new(
            SizeSink::default(),
            ProgressThrottle::new(None),
            self.cancel.clone(),
        );
        ImageWriter::new(self, config, out, false).run()
    }

    /// Writes the volume as an image to `dest` and returns its length. A
    /// partially written image is removed when writing fails.
    #[instrument(skip(self, config, progress), err)]
    pub fn write_image(
        &self,
        dest: &Path,
        config: &WriteConfig,
        progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Result<u64, Error> {
        self.cancel.reset();
        self.check_overwrite(dest)?;
        let total = self.estimate_image_size(config)?;

        let file = HostFile::create(dest).map_err(|e| Error::OpenWrite(dest.to_owned(), e))?;
        let mut throttle = ProgressThrottle::new(progress);
        throttle.set_total(total);
        let out = ImageCursor::new(BufWriter::new(file), throttle, self.cancel.clone());

        match ImageWriter::new(self, config, out, true).run() {
            Ok(len) => {
                debug!(len, "wrote image");
                Ok(len)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(dest) {
                    warn!(dest = %dest.display(), err = %rm, "unable to remove partial image");
                }
                Err(e)
            }
        }
    }

    /// Refuses to write over the image the volume reads from.
    fn check_overwrite(&self, dest: &Path) -> Result<(), Error> {
        let Some(source) = &self.source else {
            return Ok(());
        };
        match fs::metadata(dest) {
            Ok(meta) if meta.dev() == source.dev && meta.ino() == source.ino => {
                Err(Error::SaveOverwrite)
            }
            _ => Ok(()),
        }
    }
}
