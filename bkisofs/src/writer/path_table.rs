//! Path tables: every directory of a tree in breadth-first order, with its
//! extent and the number of its parent.
use super::tree::WriteNode;
use crate::Error;

/// One directory of a path table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathEntry {
    pub identifier: Vec<u8>,
    pub lba: u32,
    /// 1-based number of the parent directory.
    pub parent: u16,
}

/// Which of the two trees a table describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Namespace {
    Iso9660,
    Joliet,
}

/// Lists the directories of `root` breadth-first, children in on-disc
/// order. Parent numbers must fit 16 bits.
pub(crate) fn entries(root: &WriteNode, ns: Namespace) -> Result<Vec<PathEntry>, Error> {
    let mut queue: Vec<(&WriteNode, u16)> = vec![(root, 1)];
    let mut out = vec![];
    let mut i = 0;
    while i < queue.len() {
        let (dir, parent) = queue[i];
        let (identifier, lba, order) = match ns {
            Namespace::Iso9660 => (
                dir.name_9660.as_bytes().to_vec(),
                dir.layout_9660.extent.lba,
                &dir.order_9660,
            ),
            Namespace::Joliet => (
                dir.identifier_joliet(),
                dir.layout_joliet.extent.lba,
                &dir.order_joliet,
            ),
        };
        out.push(PathEntry {
            identifier: if i == 0 { vec![0] } else { identifier },
            lba,
            parent,
        });

        i += 1;
        let number = u16::try_from(i);
        for &c in order {
            let child = &dir.children[c];
            if child.is_directory() {
                queue.push((child, number.map_err(|_| Error::TooManyDirectories)?));
            }
        }
    }
    Ok(out)
}

/// Serializes a table, little-endian (type L) or big-endian (type M).
pub(crate) fn serialize(entries: &[PathEntry], big_endian: bool) -> Vec<u8> {
    let mut out = vec![];
    for e in entries {
        out.push(e.identifier.len() as u8);
        out.push(0);
        if big_endian {
            out.extend_from_slice(&e.lba.to_be_bytes());
            out.extend_from_slice(&e.parent.to_be_bytes());
        } else {
            out.extend_from_slice(&e.lba.to_le_bytes());
            out.extend_from_slice(&e.parent.to_le_bytes());
        }
        out.extend_from_slice(&e.identifier);
        if e.identifier.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}
