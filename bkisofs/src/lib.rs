//! Building, reading, modifying and writing ISO9660 images with Joliet,
//! Rock Ridge and El Torito extensions.
//!
//! A [Volume] holds an in-memory directory tree. Items are added from the
//! host filesystem with [Volume::add], or read from an existing image with
//! [Volume::open_image] and [Volume::read_directory_tree]. The tree can be
//! modified, extracted back to the host, and serialized into a new image
//! with [Volume::write_image].
mod content;
mod cursor;
mod errors;
mod extract;
mod hardlink;
mod import;
mod mangle;
mod wire;
mod writer;

pub mod boot;
pub mod config;
pub mod nodes;
pub mod path;
pub mod progress;
pub mod reader;
pub mod volume;

pub use boot::{BootImage, BootRecord, MediaType};
pub use config::{Encoding, Encodings, ReadConfig, VolumeConfig, WriteConfig};
pub use errors::{Error, Outcome, Warning, WarningAction};
pub use nodes::{Directory, File, FileId, Location, Node, NodeKind};
pub use path::ImagePath;
pub use progress::{CancelHandle, Progress};
pub use reader::{BootCatalogEntry, ImageInfo};
pub use volume::Volume;
