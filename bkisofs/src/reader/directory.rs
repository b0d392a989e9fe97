//! Recursive directory tree reading.
use std::collections::HashMap;
use std::fs::File as HostFile;

use tracing::{debug, warn};

use super::record::{strip_version, RawRecord};
use super::susp::{self, RockRidge};
use super::Extent;
use crate::config::{Encoding, ReadConfig, VolumeConfig};
use crate::cursor::BlockReader;
use crate::hardlink::{HardLinkId, HardLinkTable};
use crate::nodes::{
    validate_name, Directory, File, FileId, Location, Node, NodeKind, S_IFDIR, S_IFLNK, S_IFMT,
    S_IFREG,
};
use crate::wire::{ucs2_decode, BLOCK_SIZE};
use crate::Error;

/// Deepest directory nesting accepted.
const MAX_DEPTH: usize = 256;

/// Largest directory extent accepted.
const MAX_DIR_SIZE: u32 = 16 * 1024 * 1024;

/// State of one tree read.
pub(crate) struct TreeReader<'a> {
    pub reader: BlockReader<'a>,
    pub image: &'a HostFile,
    pub read_config: &'a ReadConfig,
    pub volume_config: &'a VolumeConfig,
    /// Whether records carry Rock Ridge entries worth parsing.
    pub rock_ridge: bool,
    pub rr_skip: usize,
    pub joliet: bool,
    pub hard_links: &'a mut HardLinkTable,
    pub next_file_id: &'a mut u64,
    /// Extents of the directories currently being read, to detect loops.
    ancestors: Vec<u32>,
    /// Hard link entries by content offset.
    by_offset: HashMap<u64, HardLinkId>,
}

impl<'a> TreeReader<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        reader: BlockReader<'a>,
        image: &'a HostFile,
        read_config: &'a ReadConfig,
        volume_config: &'a VolumeConfig,
        rock_ridge: bool,
        rr_skip: usize,
        joliet: bool,
        hard_links: &'a mut HardLinkTable,
        next_file_id: &'a mut u64,
    ) -> Self {
        TreeReader {
            reader,
            image,
            read_config,
            volume_config,
            rock_ridge,
            rr_skip,
            joliet,
            hard_links,
            next_file_id,
            ancestors: vec![],
            by_offset: HashMap::new(),
        }
    }

    /// Reads the root directory. Returns the root's mode if its `.` record
    /// carries one.
    pub(crate) fn read_root(&mut self, root: Extent) -> Result<(Directory, Option<u32>), Error> {
        self.read_dir(root, "/")
    }

    fn system_use<'r>(&self, record: &RawRecord<'r>) -> &'r [u8] {
        let su = record.system_use;
        &su[self.rr_skip.min(su.len())..]
    }

    fn rock_ridge(&self, record: &RawRecord) -> Result<RockRidge, Error> {
        if !self.rock_ridge {
            return Ok(RockRidge::default());
        }
        susp::parse(self.reader, self.system_use(record))
    }

    fn read_dir(&mut self, extent: Extent, path: &str) -> Result<(Directory, Option<u32>), Error> {
        if self.ancestors.len() >= MAX_DEPTH {
            return Err(Error::InvalidImage(format!("{path} is nested too deeply")));
        }
        if self.ancestors.contains(&extent.lba) {
            return Err(Error::InvalidImage(format!("{path} loops back to a parent")));
        }
        if extent.size > MAX_DIR_SIZE {
            return Err(Error::InvalidImage(format!("{path} is too large")));
        }

        debug!(path, lba = extent.lba, size = extent.size, "reading directory");
        let data = self
            .reader
            .read_vec(u64::from(extent.lba) * BLOCK_SIZE, extent.size as usize)?;
        self.ancestors.push(extent.lba);

        let mut dir = Directory::new();
        let mut self_mode = None;
        let mut pos = 0usize;
        while pos < data.len() {
            if data[pos] == 0 {
                // Records never cross blocks; the rest of this one is padding.
                pos = (pos / BLOCK_SIZE as usize + 1) * BLOCK_SIZE as usize;
                continue;
            }
            let record = RawRecord::parse(&data[pos..])
                .ok_or_else(|| Error::InvalidImage(format!("bad directory record in {path}")))?;
            pos += record.len;

            if record.is_self_or_parent() {
                if record.identifier == [0] && !self.joliet {
                    self_mode = self.rock_ridge(&record)?.mode;
                }
                continue;
            }

            if let Some(node) = self.read_entry(&record, path)? {
                let name = node.name.clone();
                if let Err(e) = dir.insert(node) {
                    warn!(path, name = %name, err = %e, "skipping entry");
                }
            }
        }

        self.ancestors.pop();
        Ok((dir, self_mode))
    }

    fn read_entry(&mut self, record: &RawRecord, parent: &str) -> Result<Option<Node>, Error> {
        let raw_name = if self.joliet {
            ucs2_decode(record.identifier)
        } else {
            String::from_utf8_lossy(record.identifier).into_owned()
        };
        let short_name = strip_version(&raw_name).to_string();
        let rr = self.rock_ridge(record)?;

        let name = match self.read_config.encoding {
            Encoding::RockRidge => rr.name().unwrap_or_else(|| short_name.clone()),
            Encoding::Iso9660 | Encoding::Joliet => short_name.clone(),
        };
        if let Err(e) = validate_name(&name) {
            warn!(parent, name = %name, err = %e, "skipping entry with unusable name");
            return Ok(None);
        }
        let path = if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        };
        if rr.mode.is_none() && self.read_config.require_posix {
            return Err(Error::NoPosixPresent(path));
        }
        let perms = |default: u32| rr.mode.map(|m| m & 0o7777).unwrap_or(default);

        let mut node = if record.is_directory() {
            let (children, _) = self.read_dir(
                Extent {
                    lba: record.extent,
                    size: record.size,
                },
                &path,
            )?;
            Node {
                name,
                mode: S_IFDIR | perms(self.volume_config.dir_mode),
                original_9660_name: None,
                kind: NodeKind::Directory(children),
            }
        } else if let Some(target) = rr
            .symlink_target()
            .filter(|_| rr.mode.map_or(true, |m| m & S_IFMT == S_IFLNK))
        {
            Node::new_symlink(&name, target)
        } else {
            let location = Location::OnImage {
                offset: u64::from(record.extent) * BLOCK_SIZE,
                size: record.size,
            };
            let hard_link = self.link(&location)?;
            *self.next_file_id += 1;
            Node {
                name,
                mode: S_IFREG | perms(self.volume_config.file_mode),
                original_9660_name: None,
                kind: NodeKind::File(File {
                    id: FileId(*self.next_file_id),
                    location,
                    hard_link,
                }),
            }
        };

        if !self.joliet {
            node.original_9660_name = Some(short_name);
        }
        Ok(Some(node))
    }

    /// Files sharing an extent are always linked. With duplicate scanning,
    /// so are files with identical bytes.
    fn link(&mut self, location: &Location) -> Result<Option<HardLinkId>, Error> {
        let Location::OnImage { offset, size } = *location else {
            return Ok(None);
        };
        if size == 0 {
            return Ok(None);
        }
        if let Some(&id) = self.by_offset.get(&offset) {
            self.hard_links.add_ref(id);
            return Ok(Some(id));
        }
        let id = if self.volume_config.scan_duplicates {
            self.hard_links.find_or_insert(location, Some(self.image))?
        } else {
            self.hard_links.insert(location, Some(self.image))?
        };
        self.by_offset.insert(offset, id);
        Ok(Some(id))
    }
}
