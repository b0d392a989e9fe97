use std::path::PathBuf;

use bkisofs::{Encoding, MediaType};
use clap::{Parser, Subcommand};
use tracing::Level;

/// Inspects, extracts, creates and modifies ISO9660 images with Joliet,
/// Rock Ridge and El Torito extensions.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// A global log level to use when printing logs.
    /// It's also possible to set `RUST_LOG` according to
    /// `tracing_subscriber::filter::EnvFilter`, which will always have
    /// priority.
    #[arg(long, default_value_t=Level::INFO)]
    pub log_level: Level,

    /// Show progress bars for long operations.
    #[arg(long, env = "BKISO_PROGRESS")]
    pub progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Prints the volume descriptors of an image.
    Info {
        image: PathBuf,
    },
    /// Lists a directory of an image.
    Ls {
        image: PathBuf,

        #[arg(default_value = "/")]
        path: String,

        /// Which names to show: rockridge, joliet or iso9660.
        #[arg(long, short, default_value = "rockridge")]
        encoding: Encoding,

        /// Descend into subdirectories.
        #[arg(long, short = 'R')]
        recursive: bool,
    },
    /// Extracts an item of an image into a host directory.
    Extract {
        image: PathBuf,
        path: String,
        dest: PathBuf,

        #[arg(long, short, default_value = "rockridge")]
        encoding: Encoding,

        /// Apply the permissions recorded in the image.
        #[arg(long)]
        keep_permissions: bool,
    },
    /// Writes the El Torito boot image of an image to a host file.
    ExtractBoot {
        image: PathBuf,
        dest: PathBuf,
    },
    /// Builds a new image from host files and directories.
    Create {
        output: PathBuf,

        #[arg(required = true, value_name = "SOURCE")]
        sources: Vec<PathBuf>,

        #[command(flatten)]
        build: BuildArgs,
    },
    /// Prints the size `create` would produce, without writing anything.
    Estimate {
        #[arg(required = true, value_name = "SOURCE")]
        sources: Vec<PathBuf>,

        #[command(flatten)]
        build: BuildArgs,
    },
    /// Reads an image, applies changes and writes the result to a new image.
    Modify {
        image: PathBuf,
        output: PathBuf,

        /// Host file or directory to add, as `SOURCE` or `SOURCE:DIR`.
        #[arg(long, value_name = "SOURCE[:DIR]")]
        add: Vec<String>,

        /// Image path to delete.
        #[arg(long, value_name = "PATH")]
        delete: Vec<String>,

        /// Rename an item, as `PATH=NAME`.
        #[arg(long, value_name = "PATH=NAME")]
        rename: Vec<String>,

        #[arg(long, short, default_value = "rockridge")]
        encoding: Encoding,

        #[command(flatten)]
        build: BuildArgs,
    },
}

/// Options shared by the commands that write images.
#[derive(clap::Args, Clone, Debug)]
pub struct BuildArgs {
    #[arg(long)]
    pub volume_id: Option<String>,

    #[arg(long)]
    pub publisher: Option<String>,

    #[arg(long)]
    pub data_preparer: Option<String>,

    /// Leave out the Joliet tree.
    #[arg(long)]
    pub no_joliet: bool,

    /// Leave out Rock Ridge entries.
    #[arg(long)]
    pub no_rock_ridge: bool,

    /// Add the targets of symbolic links instead of the links.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Store files with identical contents once.
    #[arg(long)]
    pub dedup: bool,

    /// Image path of a file in the tree to boot from.
    #[arg(long, value_name = "PATH", conflicts_with = "boot_image")]
    pub boot_file: Option<String>,

    /// Host file to boot from, stored outside the tree.
    #[arg(long, value_name = "FILE")]
    pub boot_image: Option<PathBuf>,

    /// Emulation for the boot image: no-emulation, floppy-1.2,
    /// floppy-1.44, floppy-2.88 or hard-disk.
    #[arg(long, default_value = "no-emulation")]
    pub boot_media: MediaType,

    /// Do not patch a boot info table into no-emulation boot images.
    #[arg(long)]
    pub no_boot_info_table: bool,

    /// Recording time as seconds since the Unix epoch, instead of now.
    #[arg(long, value_name = "SECONDS", env = "SOURCE_DATE_EPOCH")]
    pub creation_time: Option<i64>,
}
