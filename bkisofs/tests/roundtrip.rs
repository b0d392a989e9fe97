use std::collections::HashSet;
use std::fs;

use bkisofs::nodes::{S_IFDIR, S_IFMT, S_IFREG};
use bkisofs::{Encoding, Encodings, Location, NodeKind, ReadConfig, Volume, VolumeConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;
use common::*;

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

#[test]
fn rock_ridge_round_trip() {
    let host = tempfile::tempdir().unwrap();
    let data = sample_tree(host.path());
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();
    vol.set_volume_id("ROUNDTRIP").unwrap();

    let image = host.path().join("out.iso");
    let back = write_and_read(&vol, &image, &write_config(), &ReadConfig::default());

    assert_eq!("ROUNDTRIP", back.volume_id());
    assert_eq!(
        vec![LONG_NAME, "hello.txt", "link", "sub dir"],
        sorted(child_names(&back, "/data"))
    );
    assert_eq!(
        vec!["blob.bin", "empty"],
        sorted(child_names(&back, "/data/sub dir"))
    );

    let long = back.get(&format!("/data/{LONG_NAME}")).unwrap();
    assert_eq!(S_IFREG | 0o600, long.mode());
    assert_eq!(4, long.size());
    assert_eq!(S_IFDIR, back.get("/data/sub dir").unwrap().mode() & S_IFMT);
    assert_eq!(
        Some("hello.txt"),
        back.get("/data/link").unwrap().symlink_target()
    );
    assert_eq!(5000, back.get("/data/sub dir/blob.bin").unwrap().size());
    assert_eq!(0, back.get("/data/sub dir/empty").unwrap().size());
}

#[test]
fn extracting_from_a_written_image() {
    let host = tempfile::tempdir().unwrap();
    let data = sample_tree(host.path());
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();

    let image = host.path().join("out.iso");
    let mut back = write_and_read(&vol, &image, &write_config(), &ReadConfig::default());

    let out = host.path().join("extracted");
    fs::create_dir(&out).unwrap();
    back.extract("/data", &out, true, None).unwrap();

    assert_eq!(HELLO_CONTENTS, fs::read(out.join("data/hello.txt")).unwrap());
    assert_eq!(blob(), fs::read(out.join("data/sub dir/blob.bin")).unwrap());
    assert_eq!(
        std::path::Path::new("hello.txt"),
        fs::read_link(out.join("data/link")).unwrap()
    );
}

#[test]
fn primary_names_are_short_and_upper_case() {
    let host = tempfile::tempdir().unwrap();
    let data = sample_tree(host.path());
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();

    let image = host.path().join("out.iso");
    let read = ReadConfig::builder().encoding(Encoding::Iso9660).build();
    let back = write_and_read(&vol, &image, &write_config(), &read);

    assert_eq!(vec!["DATA"], child_names(&back, "/"));
    let names = child_names(&back, "/DATA");
    assert_eq!(4, names.len());
    for name in &names {
        let (base, ext) = name.split_once('.').unwrap_or((name, ""));
        assert!(base.len() <= 8 && ext.len() <= 3, "{name}");
        assert!(
            name.chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || "_.~-$".contains(c)),
            "{name}"
        );
    }
    assert!(names.contains(&"HELLO.TXT".to_string()));
}

#[test]
fn joliet_names_read_back() {
    let host = tempfile::tempdir().unwrap();
    let data = sample_tree(host.path());
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();
    vol.create_directory("/", "Ünïcödé").unwrap();

    let image = host.path().join("out.iso");
    let read = ReadConfig::builder().encoding(Encoding::Joliet).build();
    let back = write_and_read(&vol, &image, &write_config(), &read);

    assert_eq!(vec!["data", "Ünïcödé"], sorted(child_names(&back, "/")));
    assert_eq!(
        vec![LONG_NAME, "hello.txt", "link", "sub dir"],
        sorted(child_names(&back, "/data"))
    );
}

#[rstest]
#[case::joliet(Encodings::ROCK_RIDGE, Encoding::Joliet)]
#[case::rock_ridge(Encodings::JOLIET, Encoding::RockRidge)]
fn missing_encodings_are_reported(#[case] written: Encodings, #[case] wanted: Encoding) {
    let host = tempfile::tempdir().unwrap();
    let vol = Volume::default();
    let image = host.path().join("out.iso");
    let config = bkisofs::WriteConfig::builder().encodings(written).build();
    vol.write_image(&image, &config, None).unwrap();

    let mut back = Volume::default();
    back.open_image(&image).unwrap();
    let read = ReadConfig::builder().encoding(wanted).build();
    assert!(matches!(
        back.read_directory_tree(&read),
        Err(bkisofs::Error::EncodingNotPresent(e)) if e == wanted
    ));
}

#[test]
fn estimate_matches_written_length() {
    let host = tempfile::tempdir().unwrap();
    let data = sample_tree(host.path());
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();

    let config = write_config();
    let estimate = vol.estimate_image_size(&config).unwrap();
    let len = vol
        .write_image(&host.path().join("out.iso"), &config, None)
        .unwrap();
    assert_eq!(estimate, len);
    assert_eq!(0, len % 2048);
}

#[test]
fn file_contents_start_on_block_boundaries() {
    let host = tempfile::tempdir().unwrap();
    let data = sample_tree(host.path());
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();

    let image = host.path().join("out.iso");
    let back = write_and_read(&vol, &image, &write_config(), &ReadConfig::default());

    let long = format!("/data/{LONG_NAME}");
    for path in ["/data/hello.txt", "/data/sub dir/blob.bin", long.as_str()] {
        let NodeKind::File(file) = back.get(path).unwrap().kind() else {
            panic!("{path} is not a file");
        };
        let Location::OnImage { offset, .. } = file.location() else {
            panic!("{path} is not on the image");
        };
        assert_eq!(0, offset % 2048, "{path}");
    }
}

#[test]
fn duplicate_contents_are_stored_once() {
    let host = tempfile::tempdir().unwrap();
    let data = host.path().join("dups");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("one"), blob()).unwrap();
    fs::write(data.join("two"), blob()).unwrap();

    let mut plain = Volume::default();
    plain.add(&data, "/", None).unwrap();
    let mut dedup = Volume::new(VolumeConfig::builder().scan_duplicates(true).build());
    dedup.add(&data, "/", None).unwrap();

    let config = write_config();
    let saved = plain.estimate_image_size(&config).unwrap()
        - dedup.estimate_image_size(&config).unwrap();
    // blob() occupies three blocks
    assert_eq!(3 * 2048, saved);

    let image = host.path().join("out.iso");
    let back = write_and_read(&dedup, &image, &config, &ReadConfig::default());
    let location = |p: &str| back.get(p).unwrap().as_file().unwrap().location().clone();
    assert_eq!(location("/dups/one"), location("/dups/two"));
}

#[test]
fn rewriting_an_opened_image() {
    let host = tempfile::tempdir().unwrap();
    let data = sample_tree(host.path());
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();

    let first = host.path().join("first.iso");
    let mut back = write_and_read(&vol, &first, &write_config(), &ReadConfig::default());

    back.delete("/data/sub dir/empty").unwrap();
    back.rename("/data/hello.txt", "greeting.txt").unwrap();
    let extra = host.path().join("extra");
    fs::write(&extra, b"extra").unwrap();
    back.add(&extra, "/data", None).unwrap();

    let second = host.path().join("second.iso");
    let mut again = write_and_read(&back, &second, &write_config(), &ReadConfig::default());
    assert_eq!(
        vec![LONG_NAME, "extra", "greeting.txt", "link", "sub dir"],
        sorted(child_names(&again, "/data"))
    );

    let out = host.path().join("x");
    fs::create_dir(&out).unwrap();
    again.extract("/data/greeting.txt", &out, false, None).unwrap();
    assert_eq!(HELLO_CONTENTS, fs::read(out.join("greeting.txt")).unwrap());
}

#[test]
fn refuses_to_overwrite_the_source_image() {
    let host = tempfile::tempdir().unwrap();
    let vol = Volume::default();
    let image = host.path().join("out.iso");
    let mut back = write_and_read(&vol, &image, &write_config(), &ReadConfig::default());
    let before = fs::read(&image).unwrap();

    assert!(matches!(
        back.write_image(&image, &write_config(), None),
        Err(bkisofs::Error::SaveOverwrite)
    ));
    assert_eq!(before, fs::read(&image).unwrap());

    back.close_image();
    back.write_image(&image, &write_config(), None).unwrap();
}

#[test]
fn many_colliding_names_stay_distinct() {
    let host = tempfile::tempdir().unwrap();
    let data = host.path().join("many");
    fs::create_dir(&data).unwrap();
    for i in 0..1500 {
        fs::write(data.join(format!("similar file name {i}.txt")), b"").unwrap();
    }
    let mut vol = Volume::default();
    vol.add(&data, "/", None).unwrap();

    let image = host.path().join("out.iso");
    let read = ReadConfig::builder().encoding(Encoding::Iso9660).build();
    let back = write_and_read(&vol, &image, &write_config(), &read);
    let names: HashSet<String> = child_names(&back, "/MANY").into_iter().collect();
    assert_eq!(1500, names.len());
}
