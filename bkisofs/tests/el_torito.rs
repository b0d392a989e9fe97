use std::fs;

use bkisofs::{BootImage, Location, MediaType, ReadConfig, Volume, VolumeConfig, WriteConfig};
use pretty_assertions::assert_eq;

mod common;
use common::*;

fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
fn visible_no_emulation_image_with_info_table() {
    let host = tempfile::tempdir().unwrap();
    let boot = host.path().join("boot.bin");
    let contents = pattern(4096);
    fs::write(&boot, &contents).unwrap();

    let mut vol = Volume::default();
    vol.add(&boot, "/", None).unwrap();
    vol.set_boot_file("/boot.bin", MediaType::NoEmulation).unwrap();

    let image = host.path().join("boot.iso");
    let mut back = write_and_read(&vol, &image, &write_config(), &ReadConfig::default());

    let entry = back.read_volume_info().unwrap().boot.clone().unwrap();
    assert_eq!(MediaType::NoEmulation, entry.media);
    assert_eq!(4, entry.sector_count);
    assert_eq!(0, entry.load_segment);
    assert_eq!(0x07c0, back.boot_record().unwrap().load_segment());

    let file = back.get("/boot.bin").unwrap().as_file().unwrap();
    assert_eq!(
        &BootImage::Visible(file.id()),
        back.boot_record().unwrap().image()
    );
    assert_eq!(
        &Location::OnImage {
            offset: u64::from(entry.load_lba) * 2048,
            size: 4096
        },
        file.location()
    );

    let bytes = fs::read(&image).unwrap();
    let start = entry.load_lba as usize * 2048;
    let written = &bytes[start..start + 4096];
    let checksum = contents[64..]
        .chunks_exact(4)
        .fold(0u32, |sum, w| sum.wrapping_add(le32(w)));
    assert_eq!(16, le32(&written[8..]));
    assert_eq!(entry.load_lba, le32(&written[12..]));
    assert_eq!(4096, le32(&written[16..]));
    assert_eq!(checksum, le32(&written[20..]));
    assert!(written[24..64].iter().all(|&b| b == 0));
    assert_eq!(contents[..8], written[..8]);
    assert_eq!(contents[64..], written[64..]);

    // the host file itself is left alone
    assert_eq!(contents, fs::read(&boot).unwrap());
}

fn shared_boot_volume(host: &std::path::Path, contents: &[u8]) -> Volume {
    let data = host.join("dups");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("boot.bin"), contents).unwrap();
    fs::write(data.join("copy.bin"), contents).unwrap();

    let mut vol = Volume::new(VolumeConfig::builder().scan_duplicates(true).build());
    vol.add(&data, "/", None).unwrap();
    vol.set_boot_file("/dups/boot.bin", MediaType::NoEmulation)
        .unwrap();
    vol
}

fn file_location(vol: &Volume, path: &str) -> Location {
    vol.get(path).unwrap().as_file().unwrap().location().clone()
}

#[test]
fn info_table_leaves_identical_files_alone() {
    let host = tempfile::tempdir().unwrap();
    let contents = pattern(4096);
    let vol = shared_boot_volume(host.path(), &contents);

    let image = host.path().join("boot.iso");
    let config = write_config();
    let estimate = vol.estimate_image_size(&config).unwrap();
    let mut back = write_and_read(&vol, &image, &config, &ReadConfig::default());
    assert_eq!(estimate, fs::metadata(&image).unwrap().len());

    assert_ne!(
        file_location(&back, "/dups/boot.bin"),
        file_location(&back, "/dups/copy.bin")
    );

    let out = host.path().join("out");
    fs::create_dir(&out).unwrap();
    back.extract("/dups", &out, false, None).unwrap();
    assert_eq!(contents, fs::read(out.join("dups/copy.bin")).unwrap());
    let patched = fs::read(out.join("dups/boot.bin")).unwrap();
    assert_eq!(16, le32(&patched[8..]));
    assert_eq!(contents[64..], patched[64..]);
}

#[test]
fn identical_boot_file_is_shared_without_info_table() {
    let host = tempfile::tempdir().unwrap();
    let contents = pattern(4096);
    let vol = shared_boot_volume(host.path(), &contents);

    let image = host.path().join("boot.iso");
    let config = WriteConfig::builder().boot_info_table(false).build();
    let back = write_and_read(&vol, &image, &config, &ReadConfig::default());
    assert_eq!(
        file_location(&back, "/dups/boot.bin"),
        file_location(&back, "/dups/copy.bin")
    );
}

#[test]
fn info_table_can_be_disabled() {
    let host = tempfile::tempdir().unwrap();
    let boot = host.path().join("boot.bin");
    let contents = pattern(2048);
    fs::write(&boot, &contents).unwrap();

    let mut vol = Volume::default();
    vol.set_boot_image_from_file(&boot, MediaType::NoEmulation)
        .unwrap();
    let image = host.path().join("boot.iso");
    let config = WriteConfig::builder().boot_info_table(false).build();
    let mut back = write_and_read(&vol, &image, &config, &ReadConfig::default());

    let out = host.path().join("extracted.bin");
    back.extract_boot_record(&out).unwrap();
    // a hidden no-emulation image is read back as its four loaded sectors
    assert_eq!(contents, fs::read(&out).unwrap());
}

#[test]
fn hidden_floppy_image() {
    let host = tempfile::tempdir().unwrap();
    let boot = host.path().join("floppy.img");
    let contents = pattern(1_474_560);
    fs::write(&boot, &contents).unwrap();

    let mut vol = Volume::default();
    vol.set_boot_image_from_file(&boot, MediaType::Floppy1440)
        .unwrap();
    assert!(vol.root().as_directory().unwrap().is_empty());

    let image = host.path().join("boot.iso");
    let mut back = write_and_read(&vol, &image, &write_config(), &ReadConfig::default());
    let entry = back.read_volume_info().unwrap().boot.clone().unwrap();
    assert_eq!(MediaType::Floppy1440, entry.media);
    assert_eq!(1, entry.sector_count);

    let BootImage::Hidden(location) = back.boot_record().unwrap().image().clone() else {
        panic!("boot image should not be in the tree");
    };
    assert_eq!(1_474_560, location.size());

    let out = host.path().join("extracted.img");
    back.extract_boot_record(&out).unwrap();
    assert_eq!(contents, fs::read(&out).unwrap());
}

#[test]
fn floppy_images_need_the_exact_size() {
    let host = tempfile::tempdir().unwrap();
    let boot = host.path().join("floppy.img");
    fs::write(&boot, pattern(1000)).unwrap();
    let mut vol = Volume::default();
    assert!(matches!(
        vol.set_boot_image_from_file(&boot, MediaType::Floppy1440),
        Err(bkisofs::Error::BootImageSizeMismatch {
            expected: 1_474_560,
            actual: 1000
        })
    ));
}

#[test]
fn deleting_the_boot_file_drops_the_record() {
    let host = tempfile::tempdir().unwrap();
    let boot = host.path().join("boot.bin");
    fs::write(&boot, pattern(2048)).unwrap();

    let mut vol = Volume::default();
    vol.add(&boot, "/", None).unwrap();
    vol.set_boot_file("/boot.bin", MediaType::NoEmulation).unwrap();
    vol.delete("/boot.bin").unwrap();
    assert!(vol.boot_record().is_none());

    let image = host.path().join("out.iso");
    let mut back = write_and_read(&vol, &image, &write_config(), &ReadConfig::default());
    assert!(back.read_volume_info().unwrap().boot.is_none());
}
