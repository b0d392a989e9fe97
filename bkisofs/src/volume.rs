use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{instrument, warn};

use crate::boot::{mbr_system_type, BootImage, BootRecord, MediaType};
use crate::config::VolumeConfig;
use crate::content::read_head;
use crate::errors::{Warning, WarningAction};
use crate::hardlink::HardLinkTable;
use crate::nodes::{validate_name, Directory, File, FileId, Location, Node, NodeKind};
use crate::path::ImagePath;
use crate::progress::CancelHandle;
use crate::reader::SourceImage;
use crate::Error;

const MAX_VOLUME_ID: usize = 32;
const MAX_PUBLISHER: usize = 128;

type WarningCallback = Box<dyn FnMut(&Warning) -> WarningAction>;

/// An ISO9660 volume being built, read or modified.
///
/// The volume owns its directory tree, the boot record, the table of shared
/// file contents and, after [Volume::open_image], the source image the tree
/// may refer to. Dropping the volume releases all of it.
pub struct Volume {
    pub(crate) root: Node,
    pub(crate) config: VolumeConfig,
    pub(crate) volume_id: String,
    pub(crate) publisher: String,
    pub(crate) data_preparer: String,
    pub(crate) boot: Option<BootRecord>,
    pub(crate) hard_links: HardLinkTable,
    pub(crate) cancel: CancelHandle,
    warning_callback: Option<WarningCallback>,
    pub(crate) source: Option<SourceImage>,
    pub(crate) next_file_id: u64,
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("volume_id", &self.volume_id)
            .field("publisher", &self.publisher)
            .field("config", &self.config)
            .field("boot", &self.boot)
            .finish_non_exhaustive()
    }
}

impl Default for Volume {
    fn default() -> Self {
        Volume::new(VolumeConfig::default())
    }
}

impl Volume {
    pub fn new(config: VolumeConfig) -> Self {
        Volume {
            root: Node::new_directory("", config.dir_mode),
            config,
            volume_id: "CDROM".to_string(),
            publisher: String::new(),
            data_preparer: String::new(),
            boot: None,
            hard_links: HardLinkTable::default(),
            cancel: CancelHandle::default(),
            warning_callback: None,
            source: None,
            next_file_id: 0,
        }
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Sets the volume label, at most 32 bytes.
    pub fn set_volume_id(&mut self, id: &str) -> Result<(), Error> {
        if id.len() > MAX_VOLUME_ID {
            return Err(Error::NameTooLong(id.to_string()));
        }
        self.volume_id = id.to_string();
        Ok(())
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    /// Sets the publisher, at most 128 bytes.
    pub fn set_publisher(&mut self, publisher: &str) -> Result<(), Error> {
        if publisher.len() > MAX_PUBLISHER {
            return Err(Error::NameTooLong(publisher.to_string()));
        }
        self.publisher = publisher.to_string();
        Ok(())
    }

    pub fn data_preparer(&self) -> &str {
        &self.data_preparer
    }

    pub fn set_data_preparer(&mut self, preparer: &str) -> Result<(), Error> {
        if preparer.len() > MAX_PUBLISHER {
            return Err(Error::NameTooLong(preparer.to_string()));
        }
        self.data_preparer = preparer.to_string();
        Ok(())
    }

    pub fn follow_symlinks(&self) -> bool {
        self.config.follow_symlinks
    }

    pub fn set_follow_symlinks(&mut self, follow: bool) {
        self.config.follow_symlinks = follow;
    }

    /// Requests the running operation to stop at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle to the cancellation flag that can be used while the volume
    /// is mutably borrowed by an operation, e.g. from a progress callback.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Installs the callback consulted when a single item of a batch
    /// operation fails. Without one, the first failure ends the batch.
    pub fn set_warning_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Warning) -> WarningAction + 'static,
    {
        self.warning_callback = Some(Box::new(callback));
    }

    pub fn clear_warning_callback(&mut self) {
        self.warning_callback = None;
    }

    /// Offers a per-item failure to the warning callback. Returns the error
    /// if the batch has to stop.
    pub(crate) fn offer_warning(&mut self, item: &str, error: Error) -> Result<(), Error> {
        if error.is_fatal() {
            return Err(error);
        }
        let action = match self.warning_callback.as_mut() {
            Some(cb) => cb(&Warning {
                item,
                error: &error,
            }),
            None => WarningAction::Abort,
        };
        match action {
            WarningAction::Continue => {
                warn!(item, err = %error, "continuing past failed item");
                Ok(())
            }
            WarningAction::Abort => Err(error),
        }
    }

    pub(crate) fn next_file_id(&mut self) -> FileId {
        self.next_file_id += 1;
        FileId(self.next_file_id)
    }

    /// Looks up the node at `path`.
    pub fn get(&self, path: &str) -> Result<&Node, Error> {
        let path = ImagePath::parse(path)?;
        self.lookup(&path)
            .ok_or_else(|| Error::ItemNotFound(path.to_string()))
    }

    pub(crate) fn lookup(&self, path: &ImagePath) -> Option<&Node> {
        let mut node = &self.root;
        for name in path.components() {
            node = node.as_directory()?.get(name)?;
        }
        Some(node)
    }

    /// The directory at `path`, or [Error::DirNotFound] if any component is
    /// missing or not a directory.
    pub(crate) fn dir_mut(&mut self, path: &ImagePath) -> Result<&mut Directory, Error> {
        let not_found = || Error::DirNotFound(path.to_string());
        let mut node = &mut self.root;
        for name in path.components() {
            node = node
                .as_directory_mut()
                .ok_or_else(not_found)?
                .get_mut(name)
                .ok_or_else(not_found)?;
        }
        node.as_directory_mut().ok_or_else(not_found)
    }

    pub(crate) fn find_file(&self, id: FileId) -> Option<&File> {
        self.root.find_file(id)
    }

    /// Creates an empty directory `name` inside `dest_dir`.
    #[instrument(skip(self), err)]
    pub fn create_directory(&mut self, dest_dir: &str, name: &str) -> Result<(), Error> {
        validate_name(name)?;
        let dest = ImagePath::parse(dest_dir)?;
        let perms = self.config.dir_mode;
        self.dir_mut(&dest)?
            .insert(Node::new_directory(name, perms))
    }

    /// Removes the item at `path`, with its whole subtree for directories.
    #[instrument(skip(self), err)]
    pub fn delete(&mut self, path: &str) -> Result<(), Error> {
        let path = ImagePath::parse(path)?;
        let (parent, name) = path.split_last().ok_or(Error::DeleteRoot)?;
        let not_found = || Error::ItemNotFound(path.to_string());
        let removed = self
            .dir_mut(&parent)
            .map_err(|_| not_found())?
            .remove(name)
            .ok_or_else(not_found)?;

        let boot_file = match &self.boot {
            Some(BootRecord {
                image: BootImage::Visible(id),
                ..
            }) => Some(*id),
            _ => None,
        };
        let mut freed = vec![];
        let mut boot_removed = false;
        removed.for_each_file(&mut |file| {
            freed.extend(file.hard_link);
            boot_removed |= boot_file == Some(file.id);
        });
        for link in freed {
            self.hard_links.release(link);
        }
        if boot_removed {
            self.boot = None;
        }
        Ok(())
    }

    /// Renames the item at `path`. The new name is validated like a name
    /// given to [Volume::add_as].
    #[instrument(skip(self), err)]
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<(), Error> {
        let path = ImagePath::parse(path)?;
        let (parent, name) = path.split_last().ok_or(Error::RenameRoot)?;
        validate_name(new_name)?;
        self.dir_mut(&parent)
            .map_err(|_| Error::ItemNotFound(path.to_string()))?
            .rename(name, new_name)
            .map_err(|e| match e {
                Error::ItemNotFound(_) => Error::ItemNotFound(path.to_string()),
                e => e,
            })
    }

    pub fn boot_record(&self) -> Option<&BootRecord> {
        self.boot.as_ref()
    }

    /// Makes the regular file at `path` the El Torito boot image.
    #[instrument(skip(self), err)]
    pub fn set_boot_file(&mut self, path: &str, media: MediaType) -> Result<(), Error> {
        let node = self.get(path)?;
        let NodeKind::File(file) = node.kind() else {
            return Err(Error::NotRegularFileForBootRecord(path.to_string()));
        };
        let id = file.id;
        media.check_size(u64::from(file.size()))?;
        let system_type = self.system_type(media, file.location())?;
        self.boot = Some(BootRecord::new(media, system_type, BootImage::Visible(id)));
        Ok(())
    }

    /// Uses a host file as boot image without adding it to the tree.
    #[instrument(skip(self), err)]
    pub fn set_boot_image_from_file(&mut self, host_path: &Path, media: MediaType) -> Result<(), Error> {
        let meta = fs::metadata(host_path).map_err(|e| Error::Stat(host_path.to_owned(), e))?;
        if !meta.is_file() {
            return Err(Error::NotRegularFileForBootRecord(
                host_path.display().to_string(),
            ));
        }
        let size = u32::try_from(meta.len()).map_err(|_| Error::FileTooBig(host_path.to_owned()))?;
        media.check_size(meta.len())?;
        let location = Location::OnFilesystem {
            path: host_path.to_owned(),
            size,
        };
        let system_type = self.system_type(media, &location)?;
        self.boot = Some(BootRecord::new(
            media,
            system_type,
            BootImage::Hidden(location),
        ));
        Ok(())
    }

    pub fn remove_boot_record(&mut self) {
        self.boot = None;
    }

    fn system_type(&self, media: MediaType, location: &Location) -> Result<u8, Error> {
        if media != MediaType::HardDisk {
            return Ok(0);
        }
        let mbr = read_head(location, self.source.as_ref().map(|s| &s.file), 512)?;
        Ok(mbr_system_type(&mbr))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Volume;
    use crate::boot::{BootImage, MediaType};
    use crate::errors::WarningAction;
    use crate::nodes::{File, Location, Node, S_IFDIR, S_IFMT};
    use crate::path::ImagePath;
    use crate::Error;

    fn add_file(vol: &mut Volume, dir: &str, name: &str, size: u32) {
        let id = vol.next_file_id();
        let file = File {
            id,
            location: Location::OnImage { offset: 0, size },
            hard_link: None,
        };
        vol.dir_mut(&ImagePath::parse(dir).unwrap())
            .unwrap()
            .insert(Node::new_file(name, 0o644, file))
            .unwrap();
    }

    #[test]
    fn create_and_delete() {
        let mut vol = Volume::default();
        vol.create_directory("/", "a").unwrap();
        vol.create_directory("/a", "b").unwrap();
        let b = vol.get("/a/b").unwrap();
        assert_eq!(S_IFDIR, b.mode() & S_IFMT);
        assert_eq!(0o755, b.mode() & 0o777);

        assert!(matches!(
            vol.create_directory("/a", "b"),
            Err(Error::DuplicateName(_))
        ));
        assert!(matches!(
            vol.create_directory("/nope", "b"),
            Err(Error::DirNotFound(_))
        ));
        assert!(matches!(
            vol.create_directory("/a", ""),
            Err(Error::BlankName)
        ));

        vol.delete("/a").unwrap();
        assert!(matches!(vol.get("/a/b"), Err(Error::ItemNotFound(_))));
        assert!(matches!(vol.delete("/a"), Err(Error::ItemNotFound(_))));
    }

    #[test]
    fn root_is_protected() {
        let mut vol = Volume::default();
        assert!(matches!(vol.delete("/"), Err(Error::DeleteRoot)));
        assert!(matches!(vol.rename("/", "x"), Err(Error::RenameRoot)));
    }

    #[test]
    fn rename_validates() {
        let mut vol = Volume::default();
        vol.create_directory("/", "a").unwrap();
        vol.create_directory("/", "b").unwrap();
        assert!(matches!(vol.rename("/a", "x/y"), Err(Error::NameInvalid(_))));
        assert!(matches!(vol.rename("/a", "b"), Err(Error::DuplicateName(_))));
        assert!(matches!(vol.rename("/c", "d"), Err(Error::ItemNotFound(p)) if p == "/c"));
        assert!(matches!(vol.rename("/nope", "nope"), Err(Error::ItemNotFound(p)) if p == "/nope"));
        vol.rename("/a", "c").unwrap();
        assert!(vol.get("/c").is_ok());
    }

    #[test]
    fn volume_id_limits() {
        let mut vol = Volume::default();
        vol.set_volume_id(&"V".repeat(32)).unwrap();
        assert!(matches!(
            vol.set_volume_id(&"V".repeat(33)),
            Err(Error::NameTooLong(_))
        ));
        assert!(matches!(
            vol.set_publisher(&"P".repeat(129)),
            Err(Error::NameTooLong(_))
        ));
    }

    #[test]
    fn boot_file_must_be_a_file() {
        let mut vol = Volume::default();
        vol.create_directory("/", "boot").unwrap();
        assert!(matches!(
            vol.set_boot_file("/boot", MediaType::NoEmulation),
            Err(Error::NotRegularFileForBootRecord(_))
        ));
        add_file(&mut vol, "/boot", "floppy.img", 1000);
        assert!(matches!(
            vol.set_boot_file("/boot/floppy.img", MediaType::Floppy1440),
            Err(Error::BootImageSizeMismatch { .. })
        ));
        vol.set_boot_file("/boot/floppy.img", MediaType::NoEmulation)
            .unwrap();
        assert!(matches!(
            vol.boot_record().unwrap().image(),
            BootImage::Visible(_)
        ));

        vol.delete("/boot").unwrap();
        assert!(vol.boot_record().is_none());
    }

    #[test]
    fn warning_callback_decides() {
        let mut vol = Volume::default();
        assert!(vol.offer_warning("/x", Error::BlankName).is_err());

        let seen = Rc::new(RefCell::new(vec![]));
        let seen2 = seen.clone();
        vol.set_warning_callback(move |w| {
            seen2.borrow_mut().push(w.item.to_string());
            WarningAction::Continue
        });
        vol.offer_warning("/x", Error::BlankName).unwrap();
        assert!(matches!(
            vol.offer_warning("/y", Error::OperationCanceled),
            Err(Error::OperationCanceled)
        ));
        assert_eq!(vec!["/x".to_string()], *seen.borrow());
    }
}
