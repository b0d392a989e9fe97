use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::Encoding;

/// Errors returned by volume operations.
///
/// Every variant maps to a stable negative result code (see [Error::code]) and
/// a static human-readable description (see [Error::description]), so
/// front-ends can show them without matching on the variant.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed path {0:?}")]
    MalformedPath(String),

    #[error("{0:?} contains characters that are not allowed in a name")]
    NameInvalid(String),

    #[error("a name may not be blank")]
    BlankName,

    #[error("{0:?} is too long")]
    NameTooLong(String),

    #[error("{0:?} is a duplicate name")]
    DuplicateName(String),

    #[error("no such item: {0}")]
    ItemNotFound(String),

    #[error("no such directory: {0}")]
    DirNotFound(String),

    #[error("the root directory cannot be deleted")]
    DeleteRoot,

    #[error("the root directory cannot be renamed")]
    RenameRoot,

    #[error("the root directory cannot be extracted as a unit")]
    ExtractRoot,

    #[error("{0} is larger than the 4 GiB ISO9660 file size limit")]
    FileTooBig(PathBuf),

    #[error("symbolic link target {0:?} is longer than 250 bytes")]
    SymlinkTargetTooLong(String),

    #[error("unable to resolve name collisions in directory {0:?}")]
    MangleTooManyCollisions(String),

    #[error("unable to open {0} for reading: {1}")]
    OpenRead(PathBuf, io::Error),

    #[error("unable to open {0} for writing: {1}")]
    OpenWrite(PathBuf, io::Error),

    #[error("unable to stat {0}: {1}")]
    Stat(PathBuf, io::Error),

    #[error("read failed: {0}")]
    ReadGeneric(io::Error),

    #[error("write failed: {0}")]
    WriteGeneric(io::Error),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("the first volume descriptor is not a primary volume descriptor")]
    VolumeDescriptorNotPrimary,

    #[error("the image has no {0:?} directory tree")]
    EncodingNotPresent(Encoding),

    #[error("no source image is open")]
    NoImageOpen,

    #[error("no POSIX attributes recorded for {0}")]
    NoPosixPresent(String),

    #[error("{0} is not a regular file and cannot be a boot record")]
    NotRegularFileForBootRecord(String),

    #[error("the volume has no boot record")]
    NoBootRecord,

    #[error("boot image is {actual} bytes, the media type requires {expected}")]
    BootImageSizeMismatch { expected: u64, actual: u64 },

    #[error("too many directories for the path table")]
    TooManyDirectories,

    #[error("refusing to overwrite the image currently being read from")]
    SaveOverwrite,

    #[error("internal consistency check failed: {0}")]
    SanityCheckFailed(&'static str),

    #[error("operation canceled")]
    OperationCanceled,
}

/// Start of the hard failure band.
const ERROR_BAND: i32 = -1000;

/// Start of the partial-success band.
const WARNING_BAND: i32 = -10000;

impl Error {
    /// Returns the negative result code of this error.
    pub fn code(&self) -> i32 {
        ERROR_BAND
            - match self {
                Error::ReadGeneric(_) => 1,
                Error::WriteGeneric(_) => 2,
                Error::OpenRead(..) => 3,
                Error::OpenWrite(..) => 4,
                Error::Stat(..) => 5,
                Error::MalformedPath(_) => 6,
                Error::NameInvalid(_) => 7,
                Error::BlankName => 8,
                Error::NameTooLong(_) => 9,
                Error::DuplicateName(_) => 10,
                Error::ItemNotFound(_) => 11,
                Error::DirNotFound(_) => 12,
                Error::DeleteRoot => 13,
                Error::RenameRoot => 14,
                Error::ExtractRoot => 15,
                Error::FileTooBig(_) => 16,
                Error::SymlinkTargetTooLong(_) => 17,
                Error::MangleTooManyCollisions(_) => 18,
                Error::InvalidImage(_) => 19,
                Error::VolumeDescriptorNotPrimary => 20,
                Error::EncodingNotPresent(_) => 21,
                Error::NoImageOpen => 22,
                Error::NoPosixPresent(_) => 23,
                Error::NotRegularFileForBootRecord(_) => 24,
                Error::NoBootRecord => 25,
                Error::BootImageSizeMismatch { .. } => 26,
                Error::TooManyDirectories => 27,
                Error::SaveOverwrite => 28,
                Error::SanityCheckFailed(_) => 29,
                Error::OperationCanceled => 30,
            }
    }

    /// Returns the static description of this kind of error.
    pub fn description(&self) -> &'static str {
        match self {
            Error::ReadGeneric(_) => "Failed to read expected number of bytes",
            Error::WriteGeneric(_) => "Failed to write expected number of bytes",
            Error::OpenRead(..) => "Failed to open file for reading",
            Error::OpenWrite(..) => "Failed to open file for writing",
            Error::Stat(..) => "Failed to get file information",
            Error::MalformedPath(_) => "Malformed path",
            Error::NameInvalid(_) => "Name contains invalid characters",
            Error::BlankName => "Name may not be blank",
            Error::NameTooLong(_) => "Name is too long",
            Error::DuplicateName(_) => "An item with that name already exists",
            Error::ItemNotFound(_) => "Item not found",
            Error::DirNotFound(_) => "Directory not found",
            Error::DeleteRoot => "Cannot delete the root directory",
            Error::RenameRoot => "Cannot rename the root directory",
            Error::ExtractRoot => "Cannot extract the root directory",
            Error::FileTooBig(_) => "File is too big (ISO9660 limit is 4 GiB)",
            Error::SymlinkTargetTooLong(_) => "Symbolic link target is too long",
            Error::MangleTooManyCollisions(_) => "Too many name collisions while mangling",
            Error::InvalidImage(_) => "Image is corrupt or not an ISO9660 image",
            Error::VolumeDescriptorNotPrimary => "First volume descriptor is not primary",
            Error::EncodingNotPresent(_) => "Requested filename type is not on the image",
            Error::NoImageOpen => "No image is open",
            Error::NoPosixPresent(_) => "No POSIX file attributes present",
            Error::NotRegularFileForBootRecord(_) => "Boot record must be a regular file",
            Error::NoBootRecord => "No boot record",
            Error::BootImageSizeMismatch { .. } => "Boot image size does not match media type",
            Error::TooManyDirectories => "Too many directories",
            Error::SaveOverwrite => "Cannot overwrite the original image",
            Error::SanityCheckFailed(_) => "Internal sanity check failed",
            Error::OperationCanceled => "Operation canceled by user",
        }
    }

    /// Fatal errors end a batch operation even when a warning callback would
    /// continue past ordinary per-item failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SanityCheckFailed(_) | Error::OperationCanceled
        )
    }
}

/// Result of a batch operation which did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every item was processed.
    Complete,
    /// Some items failed and the warning callback chose to continue.
    PartlyFailed,
}

impl Outcome {
    /// Positive for complete success, a warning-band code otherwise.
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Complete => 1,
            Outcome::PartlyFailed => WARNING_BAND - 1,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Outcome::Complete => "Success",
            Outcome::PartlyFailed => "Operation partly failed",
        }
    }

    pub(crate) fn degrade(&mut self) {
        *self = Outcome::PartlyFailed;
    }
}

/// A per-item failure offered to the volume's warning callback.
#[derive(Debug)]
pub struct Warning<'a> {
    /// The host or image path of the item that failed.
    pub item: &'a str,
    pub error: &'a Error,
}

/// Decision returned by a warning callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningAction {
    Continue,
    Abort,
}

#[cfg(test)]
mod tests {
    use super::{Error, Outcome};

    #[test]
    fn codes_are_in_their_bands() {
        let errors = [
            Error::BlankName,
            Error::DeleteRoot,
            Error::SaveOverwrite,
            Error::OperationCanceled,
            Error::SanityCheckFailed("x"),
        ];
        for e in &errors {
            assert!(e.code() <= -1001 && e.code() > -10000, "{e:?}");
        }
        assert!(Outcome::Complete.code() > 0);
        assert!(Outcome::PartlyFailed.code() <= -10001);
    }

    #[test]
    fn codes_are_distinct() {
        let a = Error::DeleteRoot.code();
        let b = Error::RenameRoot.code();
        let c = Error::ItemNotFound("/x".into()).code();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn display_carries_context() {
        assert_eq!(
            "\"a\" is a duplicate name",
            Error::DuplicateName("a".into()).to_string()
        );
        assert_eq!(
            "An item with that name already exists",
            Error::DuplicateName("a".into()).description()
        );
    }

    #[test]
    fn only_sanity_and_cancel_are_fatal() {
        assert!(Error::OperationCanceled.is_fatal());
        assert!(Error::SanityCheckFailed("x").is_fatal());
        assert!(!Error::BlankName.is_fatal());
    }
}
