//! Adding host files and directories to a [Volume].
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path};

use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::nodes::{validate_name, File, Location, Node};
use crate::path::ImagePath;
use crate::progress::{Progress, ProgressThrottle};
use crate::wire::MAX_SYMLINK_TARGET;
use crate::{Error, Outcome, Volume};

fn host_name(path: &Path, name: &std::ffi::OsStr) -> Result<String, Error> {
    name.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::NameInvalid(path.to_string_lossy().into_owned()))
}

/// Where `entry` lands in the volume: below `top`, which is where the walk
/// root itself goes.
fn image_path(top: &ImagePath, root: &Path, entry: &DirEntry) -> Result<ImagePath, Error> {
    let relative = entry
        .path()
        .strip_prefix(root)
        .map_err(|_| Error::SanityCheckFailed("walked outside the source directory"))?;
    let mut path = top.clone();
    for component in relative.components() {
        if let Component::Normal(name) = component {
            path = path.join(&host_name(entry.path(), name)?);
        }
    }
    Ok(path)
}

fn walk_error(e: walkdir::Error) -> Error {
    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
    Error::OpenRead(path, io::Error::from(e))
}

impl Volume {
    /// Adds the host file, directory or symlink at `src` to the directory
    /// `dest_dir`, keeping its name. Directories are added recursively.
    pub fn add(
        &mut self,
        src: &Path,
        dest_dir: &str,
        progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Result<Outcome, Error> {
        let name = src
            .file_name()
            .ok_or_else(|| Error::NameInvalid(src.display().to_string()))?;
        let name = host_name(src, name)?;
        self.add_as(src, dest_dir, &name, progress)
    }

    /// Like [Volume::add], storing the item as `name`.
    ///
    /// A failure of the top-level item fails the call. Failures further
    /// down are offered to the warning callback; when it continues, the
    /// item (and, for directories, everything below it) is left out and
    /// the outcome is [Outcome::PartlyFailed].
    #[instrument(skip(self, progress), err)]
    pub fn add_as(
        &mut self,
        src: &Path,
        dest_dir: &str,
        name: &str,
        progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Result<Outcome, Error> {
        self.cancel.reset();
        validate_name(name)?;
        let top = ImagePath::parse(dest_dir)?.join(name);

        let mut throttle = ProgressThrottle::new(progress);
        let mut outcome = Outcome::Complete;
        let mut added = 0u64;
        let mut walk = WalkDir::new(src)
            .follow_links(self.config.follow_symlinks)
            .follow_root_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walk.next() {
            throttle.report(added);
            self.cancel.check()?;

            let (item, depth, is_dir, result) = match entry {
                Ok(entry) => (
                    entry.path().display().to_string(),
                    entry.depth(),
                    entry.file_type().is_dir(),
                    image_path(&top, src, &entry).and_then(|path| self.add_entry(&entry, &path)),
                ),
                Err(e) => (
                    e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    e.depth(),
                    false,
                    Err(walk_error(e)),
                ),
            };

            match result {
                Ok(()) => added += 1,
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    self.offer_warning(&item, e)?;
                    outcome.degrade();
                    if is_dir {
                        walk.skip_current_dir();
                    }
                }
            }
        }

        throttle.finish(added);
        debug!(added, "added items");
        Ok(outcome)
    }

    /// Inserts one walked entry at `path`.
    fn add_entry(&mut self, entry: &DirEntry, path: &ImagePath) -> Result<(), Error> {
        let (parent, name) = path
            .split_last()
            .ok_or(Error::SanityCheckFailed("adding to the root itself"))?;
        validate_name(name)?;

        let host = entry.path();
        let file_type = entry.file_type();
        let stat = |e: walkdir::Error| Error::Stat(host.to_path_buf(), io::Error::from(e));

        let node = if file_type.is_dir() {
            let meta = entry.metadata().map_err(stat)?;
            Node::new_directory(name, meta.mode())
        } else if file_type.is_file() {
            let meta = entry.metadata().map_err(stat)?;
            let size = u32::try_from(meta.len()).map_err(|_| Error::FileTooBig(host.to_path_buf()))?;
            let location = Location::OnFilesystem {
                path: host.to_path_buf(),
                size,
            };
            let hard_link = if size > 0 && self.config.scan_duplicates {
                Some(self.hard_links.find_or_insert(&location, None)?)
            } else {
                None
            };
            let file = File {
                id: self.next_file_id(),
                location,
                hard_link,
            };
            Node::new_file(name, meta.mode(), file)
        } else if file_type.is_symlink() {
            let target = fs::read_link(host).map_err(|e| Error::Stat(host.to_path_buf(), e))?;
            let target = target
                .to_str()
                .ok_or_else(|| Error::NameInvalid(target.to_string_lossy().into_owned()))?;
            if target.len() > MAX_SYMLINK_TARGET {
                return Err(Error::SymlinkTargetTooLong(target.to_string()));
            }
            Node::new_symlink(name, target)
        } else {
            warn!(path = %host.display(), "skipping unsupported file type");
            return Ok(());
        };

        let link = node.as_file().and_then(|f| f.hard_link);
        let inserted = self.dir_mut(&parent).and_then(|dir| dir.insert(node));
        if inserted.is_err() {
            if let Some(link) = link {
                self.hard_links.release(link);
            }
        }
        inserted
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::{symlink, PermissionsExt};

    use pretty_assertions::assert_eq;

    use crate::config::VolumeConfig;
    use crate::nodes::{NodeKind, S_IFDIR, S_IFLNK, S_IFREG};
    use crate::{Error, Outcome, Volume, WarningAction};

    fn names(vol: &Volume, path: &str) -> Vec<String> {
        vol.get(path)
            .unwrap()
            .as_directory()
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect()
    }

    #[test]
    fn adds_a_tree() {
        let host = tempfile::tempdir().unwrap();
        let src = host.path().join("data");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("b.txt"), b"bee").unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();
        fs::create_dir(src.join("sub")).unwrap();
        fs::write(src.join("sub/c"), b"").unwrap();
        fs::set_permissions(src.join("a.txt"), fs::Permissions::from_mode(0o600)).unwrap();
        symlink("../a.txt", src.join("sub/link")).unwrap();

        let mut vol = Volume::default();
        assert_eq!(Outcome::Complete, vol.add(&src, "/", None).unwrap());

        assert_eq!(vec!["a.txt", "b.txt", "sub"], names(&vol, "/data"));
        assert_eq!(vec!["c", "link"], names(&vol, "/data/sub"));
        let a = vol.get("/data/a.txt").unwrap();
        assert_eq!(S_IFREG | 0o600, a.mode());
        assert_eq!(1, a.size());
        assert!(vol.get("/data").unwrap().mode() & S_IFDIR != 0);
        let link = vol.get("/data/sub/link").unwrap();
        assert_eq!(Some("../a.txt"), link.symlink_target());
        assert_eq!(S_IFLNK | 0o777, link.mode());
    }

    #[test]
    fn add_as_renames_the_top_item() {
        let host = tempfile::tempdir().unwrap();
        let f = host.path().join("x");
        fs::write(&f, b"x").unwrap();
        let mut vol = Volume::default();
        vol.create_directory("/", "dir").unwrap();
        vol.add_as(&f, "/dir", "y", None).unwrap();
        assert!(matches!(
            vol.get("/dir/y").unwrap().kind(),
            NodeKind::File(_)
        ));
        assert!(matches!(
            vol.add_as(&f, "/dir", "y", None),
            Err(Error::DuplicateName(_))
        ));
        assert!(matches!(
            vol.add_as(&f, "/missing", "y", None),
            Err(Error::DirNotFound(_))
        ));
        assert!(matches!(
            vol.add_as(&f, "/dir", "", None),
            Err(Error::BlankName)
        ));
    }

    #[test]
    fn symlinks_are_followed_on_request() {
        let host = tempfile::tempdir().unwrap();
        fs::write(host.path().join("target"), b"contents").unwrap();
        let link = host.path().join("link");
        symlink(host.path().join("target"), &link).unwrap();

        let mut vol = Volume::default();
        vol.add(&link, "/", None).unwrap();
        assert!(vol.get("/link").unwrap().symlink_target().is_some());

        let mut vol = Volume::new(VolumeConfig::builder().follow_symlinks(true).build());
        vol.add(&link, "/", None).unwrap();
        assert_eq!(8, vol.get("/link").unwrap().size());
    }

    #[test]
    fn long_symlink_target() {
        let host = tempfile::tempdir().unwrap();
        let link = host.path().join("link");
        symlink("t".repeat(251), &link).unwrap();
        let mut vol = Volume::default();
        assert!(matches!(
            vol.add(&link, "/", None),
            Err(Error::SymlinkTargetTooLong(_))
        ));
    }

    #[test]
    fn failures_below_the_top_consult_the_callback() {
        let host = tempfile::tempdir().unwrap();
        let src = host.path().join("d");
        fs::create_dir(&src).unwrap();
        symlink("t".repeat(251), src.join("bad")).unwrap();
        fs::write(src.join("good"), b"g").unwrap();

        let mut vol = Volume::default();
        assert!(matches!(
            vol.add(&src, "/", None),
            Err(Error::SymlinkTargetTooLong(_))
        ));

        let mut vol = Volume::default();
        let mut seen = vec![];
        vol.set_warning_callback(move |w| {
            seen.push(w.item.to_string());
            WarningAction::Continue
        });
        assert_eq!(Outcome::PartlyFailed, vol.add(&src, "/", None).unwrap());
        assert_eq!(vec!["good"], names(&vol, "/d"));
    }

    #[test]
    fn duplicates_share_contents() {
        let host = tempfile::tempdir().unwrap();
        fs::write(host.path().join("one"), b"identical").unwrap();
        fs::write(host.path().join("two"), b"identical").unwrap();
        fs::write(host.path().join("three"), b"different").unwrap();

        let mut vol = Volume::new(VolumeConfig::builder().scan_duplicates(true).build());
        vol.add_as(host.path(), "/", "d", None).unwrap();
        let link = |p: &str| vol.get(p).unwrap().as_file().unwrap().hard_link;
        assert_eq!(link("/d/one"), link("/d/two"));
        assert_ne!(link("/d/one"), link("/d/three"));
        assert_eq!(2, vol.hard_links.len());
    }

    #[test]
    fn cancel_from_progress_stops_before_mutation() {
        let host = tempfile::tempdir().unwrap();
        fs::write(host.path().join("f"), b"f").unwrap();
        let mut vol = Volume::default();
        let cancel = vol.cancel_handle();
        let mut progress = |_: crate::Progress| cancel.cancel();
        assert!(matches!(
            vol.add_as(host.path(), "/", "d", Some(&mut progress)),
            Err(Error::OperationCanceled)
        ));
        assert!(vol.root().as_directory().unwrap().is_empty());
    }
}
