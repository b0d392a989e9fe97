#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use bkisofs::{ReadConfig, Volume, WriteConfig};
use time::macros::datetime;

pub const HELLO_CONTENTS: &[u8] = b"Hello World!";
pub const LONG_NAME: &str = "A rather long file name.text";

/// 5000 bytes, spanning three blocks.
pub fn blob() -> Vec<u8> {
    (0..=255u8).cycle().take(5000).collect()
}

pub fn write_config() -> WriteConfig {
    WriteConfig::builder()
        .creation_time(datetime!(2024-05-17 12:30:00 UTC))
        .build()
}

/// Creates this tree below `host` and returns the path of `data`:
///
/// ```text
/// data/
///   A rather long file name.text  (0600)
///   hello.txt
///   link -> hello.txt
///   sub dir/
///     blob.bin
///     empty
/// ```
pub fn sample_tree(host: &Path) -> PathBuf {
    let data = host.join("data");
    fs::create_dir_all(data.join("sub dir")).unwrap();
    fs::write(data.join(LONG_NAME), b"long").unwrap();
    fs::set_permissions(data.join(LONG_NAME), fs::Permissions::from_mode(0o600)).unwrap();
    fs::write(data.join("hello.txt"), HELLO_CONTENTS).unwrap();
    symlink("hello.txt", data.join("link")).unwrap();
    fs::write(data.join("sub dir/blob.bin"), blob()).unwrap();
    fs::write(data.join("sub dir/empty"), b"").unwrap();
    data
}

/// Writes `vol` to `image` and reads it back with `read`.
pub fn write_and_read(vol: &Volume, image: &Path, config: &WriteConfig, read: &ReadConfig) -> Volume {
    let len = vol.write_image(image, config, None).unwrap();
    assert_eq!(len, fs::metadata(image).unwrap().len());

    let mut back = Volume::default();
    back.open_image(image).unwrap();
    back.read_directory_tree(read).unwrap();
    back
}

pub fn child_names(vol: &Volume, path: &str) -> Vec<String> {
    vol.get(path)
        .unwrap()
        .as_directory()
        .unwrap()
        .iter()
        .map(|n| n.name().to_string())
        .collect()
}
