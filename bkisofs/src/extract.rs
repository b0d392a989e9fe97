//! Extracting items of a [Volume] to the host filesystem.
use std::fs::{self, OpenOptions, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::{symlink, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use tracing::{debug, instrument};

use crate::boot::BootImage;
use crate::content::open_location;
use crate::cursor::COPY_BUF_SIZE;
use crate::nodes::{Location, Node, NodeKind};
use crate::path::ImagePath;
use crate::progress::{CancelHandle, Progress, ProgressThrottle};
use crate::{Error, Outcome, Volume};

struct Extraction<'p> {
    throttle: ProgressThrottle<'p>,
    outcome: Outcome,
    done: u64,
    keep_permissions: bool,
}

fn count(node: &Node) -> u64 {
    1 + node
        .as_directory()
        .map_or(0, |d| d.iter().map(count).sum())
}

/// Copies `size` bytes of `location` into a new file at `dest`. The file
/// must not exist yet. A partially written file is removed.
fn copy_out(
    location: &Location,
    source: Option<&std::fs::File>,
    dest: &Path,
    mode: u32,
    cancel: &CancelHandle,
) -> Result<(), Error> {
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(dest)
        .map_err(|e| Error::OpenWrite(dest.to_owned(), e))?;

    let result = (|| {
        let mut src = open_location(location, source)?;
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut remaining = u64::from(location.size());
        while remaining > 0 {
            cancel.check()?;
            let n = remaining.min(COPY_BUF_SIZE as u64) as usize;
            src.read_exact(&mut buf[..n]).map_err(Error::ReadGeneric)?;
            out.write_all(&buf[..n]).map_err(Error::WriteGeneric)?;
            remaining -= n as u64;
        }
        Ok(())
    })();

    if result.is_err() {
        drop(out);
        let _ = fs::remove_file(dest);
    }
    result
}

impl Volume {
    /// Extracts the item at `path` into the host directory `dest_dir`,
    /// recursively for directories. Existing host files are never
    /// overwritten.
    ///
    /// With `keep_permissions` the recorded permission bits are applied,
    /// otherwise the volume's default file and directory modes.
    #[instrument(skip(self, progress), err)]
    pub fn extract(
        &mut self,
        path: &str,
        dest_dir: &Path,
        keep_permissions: bool,
        progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Result<Outcome, Error> {
        self.cancel.reset();
        let path = ImagePath::parse(path)?;
        if path.is_root() {
            return Err(Error::ExtractRoot);
        }
        // The subtree is copied so the warning callback can run while it
        // is walked.
        let node = self
            .lookup(&path)
            .ok_or_else(|| Error::ItemNotFound(path.to_string()))?
            .clone();

        let mut state = Extraction {
            throttle: ProgressThrottle::new(progress),
            outcome: Outcome::Complete,
            done: 0,
            keep_permissions,
        };
        state.throttle.set_total(count(&node));
        self.extract_item(&node, dest_dir, &mut state, true)?;
        state.throttle.finish(state.done);
        debug!(extracted = state.done, "extracted items");
        Ok(state.outcome)
    }

    fn extract_item(
        &mut self,
        node: &Node,
        dest_dir: &Path,
        state: &mut Extraction,
        top: bool,
    ) -> Result<(), Error> {
        state.throttle.report(state.done);
        self.cancel.check()?;

        let target = dest_dir.join(node.name());
        if let Err(e) = self.create_item(node, &target, state.keep_permissions) {
            if top || e.is_fatal() {
                return Err(e);
            }
            self.offer_warning(&target.display().to_string(), e)?;
            state.outcome.degrade();
            return Ok(());
        }
        state.done += 1;

        if let NodeKind::Directory(dir) = node.kind() {
            for child in dir.iter() {
                self.extract_item(child, &target, state, false)?;
            }
            // Applied last, the recorded mode may not allow writing.
            let mode = if state.keep_permissions {
                node.mode() & 0o7777
            } else {
                self.config.dir_mode
            };
            if let Err(e) = fs::set_permissions(&target, Permissions::from_mode(mode)) {
                let e = Error::WriteGeneric(e);
                if top {
                    return Err(e);
                }
                self.offer_warning(&target.display().to_string(), e)?;
                state.outcome.degrade();
            }
        }
        Ok(())
    }

    fn create_item(&self, node: &Node, target: &Path, keep_permissions: bool) -> Result<(), Error> {
        match node.kind() {
            NodeKind::Directory(_) => {
                fs::create_dir(target).map_err(|e| Error::OpenWrite(target.to_owned(), e))
            }
            NodeKind::File(file) => {
                let mode = if keep_permissions {
                    node.mode() & 0o7777
                } else {
                    self.config.file_mode
                };
                copy_out(
                    &file.location,
                    self.source.as_ref().map(|s| &s.file),
                    target,
                    mode,
                    &self.cancel,
                )
            }
            NodeKind::Symlink { target: link } => {
                symlink(link, target).map_err(|e| Error::OpenWrite(target.to_owned(), e))
            }
        }
    }

    /// Writes the boot image to the new host file `dest`.
    #[instrument(skip(self), err)]
    pub fn extract_boot_record(&self, dest: &Path) -> Result<(), Error> {
        self.cancel.reset();
        let record = self.boot.as_ref().ok_or(Error::NoBootRecord)?;
        let location = match &record.image {
            BootImage::Visible(id) => {
                &self
                    .find_file(*id)
                    .ok_or(Error::SanityCheckFailed("boot file is not in the tree"))?
                    .location
            }
            BootImage::Hidden(location) => location,
        };
        copy_out(
            location,
            self.source.as_ref().map(|s| &s.file),
            dest,
            self.config.file_mode,
            &self.cancel,
        )
    }
}
