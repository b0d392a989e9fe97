use std::io::Write;
use std::path::{Path, PathBuf};

use bkisofs::{
    Encoding, Encodings, Node, NodeKind, Outcome, Progress, ReadConfig, Volume, VolumeConfig,
    WarningAction, WriteConfig,
};
use time::{OffsetDateTime, UtcOffset};
use bkiso_tracing::Bar;
use tracing::{info, instrument, warn, Span};

mod args;
mod errors;

pub use args::{Args, BuildArgs, Command};
pub use errors::Error;

/// Runs `command`, writing its regular output to `out`.
pub fn run(command: &Command, out: &mut dyn Write) -> Result<Outcome, Error> {
    match command {
        Command::Info { image } => info(image, out).map(|_| Outcome::Complete),
        Command::Ls {
            image,
            path,
            encoding,
            recursive,
        } => {
            let vol = open(image, *encoding, VolumeConfig::default())?;
            list(&vol, path, *recursive, out)?;
            Ok(Outcome::Complete)
        }
        Command::Extract {
            image,
            path,
            dest,
            encoding,
            keep_permissions,
        } => {
            let mut vol = open(image, *encoding, VolumeConfig::default())?;
            extract(&mut vol, path, dest, *keep_permissions)
        }
        Command::ExtractBoot { image, dest } => {
            let vol = open(image, Encoding::Iso9660, VolumeConfig::default())?;
            vol.extract_boot_record(dest)?;
            Ok(Outcome::Complete)
        }
        Command::Create {
            output,
            sources,
            build,
        } => {
            let config = write_config(build)?;
            let mut vol = Volume::new(volume_config(build));
            log_warnings(&mut vol);
            let outcome = add_sources(&mut vol, sources, "/")?;
            apply_build_args(&mut vol, build)?;
            write(&vol, output, &config)?;
            Ok(outcome)
        }
        Command::Estimate { sources, build } => {
            let config = write_config(build)?;
            let mut vol = Volume::new(volume_config(build));
            log_warnings(&mut vol);
            let outcome = add_sources(&mut vol, sources, "/")?;
            apply_build_args(&mut vol, build)?;
            let size = vol.estimate_image_size(&config)?;
            writeln!(out, "{size}")?;
            Ok(outcome)
        }
        Command::Modify {
            image,
            output,
            add,
            delete,
            rename,
            encoding,
            build,
        } => {
            let config = write_config(build)?;
            let mut vol = open(image, *encoding, volume_config(build))?;
            for path in delete {
                vol.delete(path)?;
            }
            for spec in rename {
                let (path, name) = spec
                    .split_once('=')
                    .ok_or_else(|| Error::InvalidArgument(spec.clone(), "expected PATH=NAME"))?;
                vol.rename(path, name)?;
            }
            let mut outcome = Outcome::Complete;
            for spec in add {
                let (source, dir) = spec.split_once(':').unwrap_or((spec.as_str(), "/"));
                if add_sources(&mut vol, &[PathBuf::from(source)], dir)? == Outcome::PartlyFailed
                {
                    outcome = Outcome::PartlyFailed;
                }
            }
            apply_build_args(&mut vol, build)?;
            write(&vol, output, &config)?;
            Ok(outcome)
        }
    }
}

/// Opens `image` and reads the tree with the names of `encoding`.
fn open(image: &Path, encoding: Encoding, config: VolumeConfig) -> Result<Volume, Error> {
    let mut vol = Volume::new(config);
    log_warnings(&mut vol);
    vol.open_image(image)?;
    vol.read_directory_tree(&ReadConfig::builder().encoding(encoding).build())?;
    Ok(vol)
}

/// Per-item failures are logged and skipped.
fn log_warnings(vol: &mut Volume) {
    vol.set_warning_callback(|w| {
        warn!(item = w.item, err = %w.error, "skipping");
        WarningAction::Continue
    });
}

fn volume_config(build: &BuildArgs) -> VolumeConfig {
    VolumeConfig::builder()
        .follow_symlinks(build.follow_symlinks)
        .scan_duplicates(build.dedup)
        .build()
}

fn write_config(build: &BuildArgs) -> Result<WriteConfig, Error> {
    let mut encodings = Encodings::all();
    if build.no_joliet {
        encodings.remove(Encodings::JOLIET);
    }
    if build.no_rock_ridge {
        encodings.remove(Encodings::ROCK_RIDGE);
    }
    let mut config = WriteConfig::builder()
        .encodings(encodings)
        .boot_info_table(!build.no_boot_info_table);
    if let Some(secs) = build.creation_time {
        let t = OffsetDateTime::from_unix_timestamp(secs).map_err(|_| {
            Error::InvalidArgument(secs.to_string(), "creation time out of range")
        })?;
        config = config.creation_time(t);
    }
    Ok(config.build())
}

fn apply_build_args(vol: &mut Volume, build: &BuildArgs) -> Result<(), Error> {
    if let Some(id) = &build.volume_id {
        vol.set_volume_id(id)?;
    }
    if let Some(publisher) = &build.publisher {
        vol.set_publisher(publisher)?;
    }
    if let Some(preparer) = &build.data_preparer {
        vol.set_data_preparer(preparer)?;
    }
    if let Some(path) = &build.boot_file {
        vol.set_boot_file(path, build.boot_media)?;
    }
    if let Some(file) = &build.boot_image {
        vol.set_boot_image_from_file(file, build.boot_media)?;
    }
    Ok(())
}

#[instrument(skip_all, fields(indicatif.pb_show=1))]
fn add_sources(vol: &mut Volume, sources: &[PathBuf], dir: &str) -> Result<Outcome, Error> {
    let span = Span::current();
    let mut outcome = Outcome::Complete;
    for source in sources {
        Bar::Spinner.start(&span, &format!("Adding {}", source.display()));
        let mut progress = |p: Progress| Bar::update(&span, p.completed, None);
        if vol.add(source, dir, Some(&mut progress))? == Outcome::PartlyFailed {
            outcome = Outcome::PartlyFailed;
        }
    }
    Ok(outcome)
}

#[instrument(skip_all, fields(indicatif.pb_show=1, dest = %dest.display()))]
fn write(vol: &Volume, dest: &Path, config: &WriteConfig) -> Result<(), Error> {
    let span = Span::current();
    Bar::Bytes.start(&span, "Writing image");
    let mut progress = |p: Progress| Bar::update(&span, p.completed, p.total);
    let len = vol.write_image(dest, config, Some(&mut progress))?;
    info!(bytes = len, "wrote image");
    Ok(())
}

#[instrument(skip_all, fields(indicatif.pb_show=1, path = %path))]
fn extract(vol: &mut Volume, path: &str, dest: &Path, keep_permissions: bool) -> Result<Outcome, Error> {
    let span = Span::current();
    Bar::Items.start(&span, &format!("Extracting {path}"));
    let mut progress = |p: Progress| Bar::update(&span, p.completed, p.total);
    Ok(vol.extract(path, dest, keep_permissions, Some(&mut progress))?)
}

fn info(image: &Path, out: &mut dyn Write) -> Result<(), Error> {
    let mut vol = Volume::default();
    vol.open_image(image)?;
    let info = vol.read_volume_info()?;

    writeln!(out, "Volume id:     {}", info.volume_id)?;
    writeln!(out, "Publisher:     {}", info.publisher)?;
    writeln!(out, "Data preparer: {}", info.data_preparer)?;
    match info.creation_time {
        Some(t) => writeln!(out, "Created:       {}", format_time(t))?,
        None => writeln!(out, "Created:       unknown")?,
    }
    writeln!(out, "Size:          {} blocks", info.volume_blocks)?;
    writeln!(out, "Rock Ridge:    {}", yes_no(info.has_rock_ridge))?;
    match &info.joliet_volume_id {
        Some(id) => writeln!(out, "Joliet:        yes, volume id {id}")?,
        None => writeln!(out, "Joliet:        no")?,
    }
    match &info.boot {
        Some(entry) => writeln!(
            out,
            "Boot:          {}, {} sectors at block {}",
            entry.media, entry.sector_count, entry.load_lba
        )?,
        None => writeln!(out, "Boot:          no")?,
    }
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn format_time(t: OffsetDateTime) -> String {
    let t = t.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

/// `ls -l` style type and permission bits.
fn mode_string(node: &Node) -> String {
    let kind = match node.kind() {
        NodeKind::Directory(_) => 'd',
        NodeKind::Symlink { .. } => 'l',
        NodeKind::File(_) => '-',
    };
    let mode = node.mode();
    let mut s = String::with_capacity(10);
    s.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 4 != 0 { 'r' } else { '-' });
        s.push(if bits & 2 != 0 { 'w' } else { '-' });
        s.push(if bits & 1 != 0 { 'x' } else { '-' });
    }
    s
}

fn list(vol: &Volume, path: &str, recursive: bool, out: &mut dyn Write) -> Result<(), Error> {
    let node = vol.get(path)?;
    match node.as_directory() {
        Some(_) => list_dir(node, "", recursive, out),
        None => list_entry(node, node.name(), out),
    }
}

fn list_dir(dir: &Node, prefix: &str, recursive: bool, out: &mut dyn Write) -> Result<(), Error> {
    let mut children: Vec<&Node> = dir.as_directory().into_iter().flat_map(|d| d.iter()).collect();
    children.sort_by(|a, b| a.name().cmp(b.name()));
    for child in children {
        let name = format!("{prefix}{}", child.name());
        list_entry(child, &name, out)?;
        if recursive && child.is_directory() {
            list_dir(child, &format!("{name}/"), recursive, out)?;
        }
    }
    Ok(())
}

fn list_entry(node: &Node, name: &str, out: &mut dyn Write) -> Result<(), Error> {
    match node.symlink_target() {
        Some(target) => writeln!(
            out,
            "{} {:>10} {name} -> {target}",
            mode_string(node),
            node.size()
        )?,
        None => writeln!(out, "{} {:>10} {name}", mode_string(node), node.size())?,
    }
    Ok(())
}
