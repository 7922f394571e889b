use anyhow::{Context, Result};
use clap::Parser;
use driveprep_core::{
    BaseName, ProvisionConfig, DEFAULT_METADATA_FILENAME, DEFAULT_POLL_INTERVAL,
    INTERACTIVE_SETTLE_DELAY, UNATTENDED_SETTLE_DELAY,
};
use driveprep_host_macos::Diskutil;
use driveprep_metadata::load_template;
use driveprep_workflow::{
    run_workflow, InteractiveSession, LinePrompt, MetadataMode, StopSignal, UnattendedSession,
};
use std::io;
use std::time::Duration;

mod cli;

use cli::{Cli, Command, GlobalArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let disk_util = Diskutil::new(cli.global.diskutil.clone());
    match cli.command {
        Command::Template {
            template,
            base_name,
        } => {
            let payload = load_template(&template)
                .with_context(|| format!("Error loading {}", template.display()))?;
            let base_name = base_name
                .as_deref()
                .map(BaseName::parse)
                .transpose()
                .context("invalid --base-name")?;
            let mode = MetadataMode::Template { payload, base_name };
            run_interactive(&disk_util, &cli.global, &mode)
        }
        Command::Hub => run_interactive(&disk_util, &cli.global, &MetadataMode::Hub),
        Command::Auto {
            template,
            target_name,
            base_name,
        } => {
            let base_name = BaseName::parse(&base_name).context("invalid --base-name")?;
            let payload = load_template(&template)
                .with_context(|| format!("Error loading {}", template.display()))?;
            let config = build_config(&cli.global, UNATTENDED_SETTLE_DELAY, DEFAULT_METADATA_FILENAME);

            let stop = StopSignal::new();
            install_interrupt_handler(stop.clone())?;
            let session = UnattendedSession::new(
                &disk_util,
                &config,
                &payload,
                &base_name,
                target_name,
                io::stdout(),
                stop,
            );
            run_workflow(session)?;
            Ok(())
        }
    }
}

fn run_interactive(disk_util: &Diskutil, global: &GlobalArgs, mode: &MetadataMode) -> Result<()> {
    let config = build_config(global, INTERACTIVE_SETTLE_DELAY, mode.default_metadata_filename());
    let mut prompt = LinePrompt::stdio();
    run_workflow(InteractiveSession::new(disk_util, &config, mode, &mut prompt))?;
    Ok(())
}

fn build_config(global: &GlobalArgs, settle_delay: Duration, metadata_filename: &str) -> ProvisionConfig {
    ProvisionConfig::default()
        .with_mount_root(global.mount_root.clone())
        .with_extra_system_volumes(global.system_volumes.iter().cloned())
        .with_settle_delay(
            global
                .settle_ms
                .map(Duration::from_millis)
                .unwrap_or(settle_delay),
        )
        .with_poll_interval(
            global
                .poll_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
        )
        .with_metadata_filename(
            global
                .metadata_file
                .clone()
                .unwrap_or_else(|| metadata_filename.to_string()),
        )
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();
}

fn install_interrupt_handler(stop: StopSignal) -> Result<()> {
    ctrlc::set_handler(move || {
        stop.raise();
        log::info!("interrupt received, stopping after the current cycle");
    })
    .context("install Ctrl+C handler")?;
    Ok(())
}
