use clap::{Args, Parser, Subcommand};
use driveprep_core::{
    DEFAULT_BASE_NAME, DEFAULT_MOUNT_ROOT, DEFAULT_TARGET_VOLUME_NAME, DEFAULT_TEMPLATE_PATH,
};
use driveprep_host_macos::DISKUTIL_PATH;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Format removable drives and stamp them with a metadata file")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Directory the OS mounts volumes under.
    #[arg(long, global = true, default_value = DEFAULT_MOUNT_ROOT)]
    pub mount_root: PathBuf,
    #[arg(long, global = true, default_value = DISKUTIL_PATH)]
    pub diskutil: PathBuf,
    /// Extra volume name to never touch. Repeatable.
    #[arg(long = "system-volume", global = true, value_name = "NAME")]
    pub system_volumes: Vec<String>,
    /// Wait after mounting before writing metadata, in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub settle_ms: Option<u64>,
    /// Unattended scan interval, in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub poll_ms: Option<u64>,
    /// Metadata filename on the formatted volume.
    #[arg(long, global = true, value_name = "FILE")]
    pub metadata_file: Option<String>,
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pick drives from a menu and write a JSON template to each.
    Template {
        #[arg(long, default_value = DEFAULT_TEMPLATE_PATH)]
        template: PathBuf,
        /// Use this base name every time instead of asking.
        #[arg(long)]
        base_name: Option<String>,
    },
    /// Pick drives from a menu and write a HubLink configuration to each.
    Hub,
    /// Watch for the target volume and format it without asking.
    Auto {
        #[arg(long, default_value = DEFAULT_TEMPLATE_PATH)]
        template: PathBuf,
        #[arg(long, default_value = DEFAULT_TARGET_VOLUME_NAME)]
        target_name: String,
        #[arg(long, default_value = DEFAULT_BASE_NAME)]
        base_name: String,
    },
}
