//! The in-memory volume tree.
mod directory;

use std::path::PathBuf;

pub use directory::Directory;

use crate::hardlink::HardLinkId;
use crate::wire::MAX_NAME_LEN;
use crate::Error;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;

/// Identifies a file node for the lifetime of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u64);

/// Where the bytes of a regular file come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Already inside the source image, `offset` bytes from its start.
    OnImage { offset: u64, size: u32 },
    /// In a host file, read when the image is written.
    OnFilesystem { path: PathBuf, size: u32 },
}

impl Location {
    pub fn size(&self) -> u32 {
        match self {
            Location::OnImage { size, .. } | Location::OnFilesystem { size, .. } => *size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub(crate) id: FileId,
    pub(crate) location: Location,
    pub(crate) hard_link: Option<HardLinkId>,
}

impl File {
    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn size(&self) -> u32 {
        self.location.size()
    }
}

/// The type-specific part of a [Node].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Directory(Directory),
    File(File),
    Symlink { target: String },
}

/// A named entry of the volume tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) name: String,
    /// File type and permission bits, as in `st_mode`.
    pub(crate) mode: u32,
    /// The short name this node had on a source image, reused when writing
    /// so that unchanged images keep their 9660 names.
    pub(crate) original_9660_name: Option<String>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn new_directory(name: &str, perms: u32) -> Self {
        Node {
            name: name.to_string(),
            mode: S_IFDIR | (perms & 0o7777),
            original_9660_name: None,
            kind: NodeKind::Directory(Directory::new()),
        }
    }

    pub(crate) fn new_file(name: &str, perms: u32, file: File) -> Self {
        Node {
            name: name.to_string(),
            mode: S_IFREG | (perms & 0o7777),
            original_9660_name: None,
            kind: NodeKind::File(file),
        }
    }

    /// Symlinks are always world-accessible.
    pub(crate) fn new_symlink(name: &str, target: &str) -> Self {
        Node {
            name: name.to_string(),
            mode: S_IFLNK | 0o777,
            original_9660_name: None,
            kind: NodeKind::Symlink {
                target: target.to_string(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn original_9660_name(&self) -> Option<&str> {
        self.original_9660_name.as_deref()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match &self.kind {
            NodeKind::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn as_directory_mut(&mut self) -> Option<&mut Directory> {
        match &mut self.kind {
            NodeKind::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match &self.kind {
            NodeKind::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn symlink_target(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symlink { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    /// Content size for files, zero otherwise.
    pub fn size(&self) -> u32 {
        self.as_file().map(File::size).unwrap_or(0)
    }

    /// Calls `f` for every file in this subtree, depth first.
    pub(crate) fn for_each_file(&self, f: &mut dyn FnMut(&File)) {
        match &self.kind {
            NodeKind::File(file) => f(file),
            NodeKind::Directory(d) => d.iter().for_each(|n| n.for_each_file(f)),
            NodeKind::Symlink { .. } => {}
        }
    }

    pub(crate) fn find_file(&self, id: FileId) -> Option<&File> {
        match &self.kind {
            NodeKind::File(file) if file.id == id => Some(file),
            NodeKind::Directory(d) => d.iter().find_map(|n| n.find_file(id)),
            _ => None,
        }
    }
}

/// Checks a name for use as a directory entry.
/// We disallow slashes, null bytes, '.', '..', the empty string and names
/// longer than 255 bytes.
pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::BlankName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong(name.to_string()));
    }
    if name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(Error::NameInvalid(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_name, Node, S_IFLNK, S_IFMT};
    use crate::Error;
    use rstest::rstest;

    #[rstest]
    #[case::simple("foo")]
    #[case::dots_inside("a.b.c")]
    #[case::hidden(".profile")]
    #[case::unicode("日本語")]
    #[case::max_len(&"a".repeat(255))]
    fn valid_names(#[case] name: &str) {
        validate_name(name).expect("must be valid");
    }

    #[rstest]
    #[case::dot(".")]
    #[case::dotdot("..")]
    #[case::slash("a/b")]
    #[case::null("a\0b")]
    fn invalid_names(#[case] name: &str) {
        assert!(matches!(validate_name(name), Err(Error::NameInvalid(_))));
    }

    #[test]
    fn blank_and_long_names() {
        assert!(matches!(validate_name(""), Err(Error::BlankName)));
        assert!(matches!(
            validate_name(&"a".repeat(256)),
            Err(Error::NameTooLong(_))
        ));
    }

    #[test]
    fn symlink_mode_is_fixed() {
        let n = Node::new_symlink("l", "/x");
        assert_eq!(S_IFLNK, n.mode() & S_IFMT);
        assert_eq!(0o777, n.mode() & 0o777);
        assert_eq!(Some("/x"), n.symlink_target());
        assert_eq!(0, n.size());
    }
}
