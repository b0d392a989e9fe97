//! Content-identity table used to store byte-identical files once.
use std::collections::HashMap;
use std::fs::File;

use tracing::debug;

use crate::content::{contents_equal, open_location, read_head};
use crate::nodes::Location;
use crate::Error;

/// Number of leading bytes cached per entry as a pre-filter.
const HEAD_LEN: usize = 32;

/// Handle to an entry of a [HardLinkTable].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardLinkId(usize);

#[derive(Debug)]
struct HardLink {
    size: u32,
    location: Location,
    head: Vec<u8>,
    refs: usize,
}

/// Entries are grouped by size. A candidate is only compared against
/// entries of the same size whose cached heads match, and a head match is
/// always confirmed by a full comparison.
#[derive(Debug, Default)]
pub(crate) struct HardLinkTable {
    entries: Vec<Option<HardLink>>,
    by_size: HashMap<u32, Vec<usize>>,
}

impl HardLinkTable {
    /// Returns the entry holding the same bytes as `location`, creating one
    /// if there is none. Either way the entry gains a reference.
    pub(crate) fn find_or_insert(
        &mut self,
        location: &Location,
        source: Option<&File>,
    ) -> Result<HardLinkId, Error> {
        let size = location.size();
        let head = read_head(location, source, HEAD_LEN)?;

        for &idx in self.by_size.get(&size).into_iter().flatten() {
            let Some(entry) = &self.entries[idx] else {
                continue;
            };
            if entry.head != head {
                continue;
            }
            let same = entry.location == *location
                || contents_equal(
                    &mut open_location(&entry.location, source)?,
                    &mut open_location(location, source)?,
                    u64::from(size),
                )?;
            if same {
                debug!(size, entry = idx, "found identical contents");
                if let Some(entry) = self.entries[idx].as_mut() {
                    entry.refs += 1;
                }
                return Ok(HardLinkId(idx));
            }
        }

        Ok(self.push(size, location, head))
    }

    /// Adds an entry without looking for an existing one.
    pub(crate) fn insert(&mut self, location: &Location, source: Option<&File>) -> Result<HardLinkId, Error> {
        let size = location.size();
        let head = read_head(location, source, HEAD_LEN)?;
        Ok(self.push(size, location, head))
    }

    pub(crate) fn add_ref(&mut self, id: HardLinkId) {
        if let Some(Some(entry)) = self.entries.get_mut(id.0) {
            entry.refs += 1;
        }
    }

    fn push(&mut self, size: u32, location: &Location, head: Vec<u8>) -> HardLinkId {
        let idx = self.entries.len();
        self.entries.push(Some(HardLink {
            size,
            location: location.clone(),
            head,
            refs: 1,
        }));
        self.by_size.entry(size).or_default().push(idx);
        HardLinkId(idx)
    }

    /// Drops one reference, freeing the entry with the last one.
    pub(crate) fn release(&mut self, id: HardLinkId) {
        let Some(Some(entry)) = self.entries.get_mut(id.0) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            let size = entry.size;
            self.entries[id.0] = None;
            if let Some(ids) = self.by_size.get_mut(&size) {
                ids.retain(|&i| i != id.0);
            }
        }
    }

    /// The location whose bytes are written for every member of `id`.
    pub(crate) fn location(&self, id: HardLinkId) -> Option<&Location> {
        self.entries.get(id.0)?.as_ref().map(|e| &e.location)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::HardLinkTable;
    use crate::nodes::Location;

    fn host_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> Location {
        let path: PathBuf = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents)
            .unwrap();
        Location::OnFilesystem {
            path,
            size: contents.len() as u32,
        }
    }

    #[test]
    fn identical_contents_share_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let a = host_file(&dir, "a", b"same bytes");
        let b = host_file(&dir, "b", b"same bytes");
        let mut table = HardLinkTable::default();
        let ia = table.find_or_insert(&a, None).unwrap();
        let ib = table.find_or_insert(&b, None).unwrap();
        assert_eq!(ia, ib);
        assert_eq!(1, table.len());
        assert_eq!(Some(&a), table.location(ib));
    }

    #[test]
    fn same_head_different_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut x = vec![1u8; 4096];
        let a = host_file(&dir, "a", &x);
        x[4000] = 2;
        let b = host_file(&dir, "b", &x);
        let mut table = HardLinkTable::default();
        let ia = table.find_or_insert(&a, None).unwrap();
        let ib = table.find_or_insert(&b, None).unwrap();
        assert_ne!(ia, ib);
        assert_eq!(2, table.len());
    }

    #[test]
    fn release_frees_last_reference() {
        let dir = tempfile::tempdir().unwrap();
        let a = host_file(&dir, "a", b"x");
        let b = host_file(&dir, "b", b"x");
        let mut table = HardLinkTable::default();
        let ia = table.find_or_insert(&a, None).unwrap();
        let ib = table.find_or_insert(&b, None).unwrap();
        table.release(ia);
        assert_eq!(1, table.len());
        table.release(ib);
        assert_eq!(0, table.len());
        assert_eq!(None, table.location(ia));
    }
}
