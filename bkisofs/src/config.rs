//! Option structs for volumes, image reading and image writing.
use bitflags::bitflags;
use time::OffsetDateTime;

bitflags! {
    /// Set of filename encodings to write.
    ///
    /// The primary ISO9660 tree is always written, since the primary volume
    /// descriptor that points to it is mandatory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Encodings: u8 {
        const ISO9660 = 0b001;
        const JOLIET = 0b010;
        const ROCK_RIDGE = 0b100;
    }
}

/// The filename encoding used when reading a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Short, upper-case names from the primary tree.
    Iso9660,
    /// UCS-2 names from the Joliet supplementary tree.
    Joliet,
    /// Original names from Rock Ridge `NM` fields in the primary tree.
    RockRidge,
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iso9660" | "9660" => Ok(Encoding::Iso9660),
            "joliet" => Ok(Encoding::Joliet),
            "rockridge" | "rr" => Ok(Encoding::RockRidge),
            other => Err(format!("unknown encoding {other:?}")),
        }
    }
}

/// Volume-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeConfig {
    pub(crate) follow_symlinks: bool,
    pub(crate) scan_duplicates: bool,
    pub(crate) dir_mode: u32,
    pub(crate) file_mode: u32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            follow_symlinks: false,
            scan_duplicates: false,
            dir_mode: 0o755,
            file_mode: 0o644,
        }
    }
}

impl VolumeConfig {
    pub fn builder() -> VolumeConfigBuilder {
        VolumeConfigBuilder::default()
    }

    pub fn scan_duplicates(&self) -> bool {
        self.scan_duplicates
    }

    pub fn dir_mode(&self) -> u32 {
        self.dir_mode
    }

    pub fn file_mode(&self) -> u32 {
        self.file_mode
    }
}

#[derive(Default)]
pub struct VolumeConfigBuilder {
    config: VolumeConfig,
}

impl VolumeConfigBuilder {
    /// Add the targets of symbolic links instead of the links themselves.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Compare the contents of added files so byte-identical files are
    /// stored only once.
    pub fn scan_duplicates(mut self, scan: bool) -> Self {
        self.config.scan_duplicates = scan;
        self
    }

    /// Permission bits for new directories and for directories read from
    /// images without POSIX attributes.
    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.config.dir_mode = mode & 0o7777;
        self
    }

    /// Permission bits for files read from images without POSIX attributes.
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.config.file_mode = mode & 0o7777;
        self
    }

    pub fn build(self) -> VolumeConfig {
        self.config
    }
}

/// Options for [crate::Volume::read_directory_tree].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadConfig {
    pub(crate) encoding: Encoding,
    pub(crate) require_posix: bool,
}

impl Default for ReadConfig {
    fn default() -> Self {
        ReadConfig {
            encoding: Encoding::RockRidge,
            require_posix: false,
        }
    }
}

impl ReadConfig {
    pub fn builder() -> ReadConfigBuilder {
        ReadConfigBuilder::default()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

#[derive(Default)]
pub struct ReadConfigBuilder {
    config: ReadConfig,
}

impl ReadConfigBuilder {
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Fail instead of falling back to the default permissions when an item
    /// has no Rock Ridge `PX` entry.
    pub fn require_posix(mut self, require: bool) -> Self {
        self.config.require_posix = require;
        self
    }

    pub fn build(self) -> ReadConfig {
        self.config
    }
}

/// Options for [crate::Volume::write_image] and
/// [crate::Volume::estimate_image_size].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConfig {
    pub(crate) encodings: Encodings,
    pub(crate) creation_time: OffsetDateTime,
    pub(crate) boot_info_table: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        WriteConfig {
            encodings: Encodings::all(),
            creation_time: OffsetDateTime::now_utc(),
            boot_info_table: true,
        }
    }
}

impl WriteConfig {
    pub fn builder() -> WriteConfigBuilder {
        WriteConfigBuilder::default()
    }

    pub fn encodings(&self) -> Encodings {
        self.encodings
    }

    pub(crate) fn joliet(&self) -> bool {
        self.encodings.contains(Encodings::JOLIET)
    }

    pub(crate) fn rock_ridge(&self) -> bool {
        self.encodings.contains(Encodings::ROCK_RIDGE)
    }
}

#[derive(Default)]
pub struct WriteConfigBuilder {
    config: WriteConfig,
}

impl WriteConfigBuilder {
    pub fn encodings(mut self, encodings: Encodings) -> Self {
        self.config.encodings = encodings | Encodings::ISO9660;
        self
    }

    pub fn creation_time(mut self, time: OffsetDateTime) -> Self {
        self.config.creation_time = time;
        self
    }

    /// Patch an isolinux-style boot info table into no-emulation boot
    /// images.
    pub fn boot_info_table(mut self, enable: bool) -> Self {
        self.config.boot_info_table = enable;
        self
    }

    pub fn build(self) -> WriteConfig {
        self.config
    }
}
