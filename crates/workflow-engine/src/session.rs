//! Session loops: the interactive menu-driven loop and the unattended
//! polling loop. Each session owns its format counter.

use crate::discovery::{read_scan, scan};
use crate::preparation::{MetadataMode, ProvisionPlan};
use crate::prompt::{confirm, pause, unless_declined, Prompt};
use crate::provision::{eject_disk, format_and_provision, ProvisionObserver, ProvisionStage};
use crate::selection::{InteractiveSelection, Selection, SelectionPolicy, TargetNameSelection};
use crate::Workflow;
use anyhow::Result;
use driveprep_core::{now_stamp, BaseName, Candidate, ProvisionConfig};
use driveprep_host_macos::DiskUtil;
use driveprep_metadata::MetadataPayload;
use driveprep_safety::Authorization;
use log::{debug, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Cooperative stop flag shared with an interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` in short slices. Returns `true` as soon as the
    /// signal is raised.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_raised() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub formatted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No drive was picked this round, or the operator backed out of a prompt.
    NoTarget,
    /// Operator answered no at the format confirmation.
    Declined,
    Formatted {
        volume_name: String,
        metadata_path: PathBuf,
        ejected: bool,
    },
    Failed { diagnostic: String },
}

const SPINNER_FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

#[derive(Debug, Default)]
struct Spinner {
    frame: usize,
}

impl Spinner {
    fn next_frame(&mut self) -> char {
        let frame = SPINNER_FRAMES[self.frame % SPINNER_FRAMES.len()];
        self.frame = self.frame.wrapping_add(1);
        frame
    }
}

struct PromptProgress<'p, P: Prompt + ?Sized> {
    prompt: &'p mut P,
    metadata_filename: &'p str,
}

impl<P: Prompt + ?Sized> ProvisionObserver for PromptProgress<'_, P> {
    fn on_stage(&mut self, stage: ProvisionStage, _plan: &ProvisionPlan) {
        let message = match stage {
            ProvisionStage::Erasing => "\nFormatting drive...".to_string(),
            ProvisionStage::Mounting => "Mounting disk...".to_string(),
            ProvisionStage::Settling => return,
            ProvisionStage::WritingMetadata => format!("Writing {}...", self.metadata_filename),
        };
        if let Err(err) = self.prompt.say(&message) {
            debug!("progress output failed: {}", err);
        }
    }
}

/// Operator-driven loop: scan, pick, prepare, confirm, format, eject.
pub struct InteractiveSession<'a, D: DiskUtil + ?Sized, P: Prompt + ?Sized> {
    disk_util: &'a D,
    config: &'a ProvisionConfig,
    mode: &'a MetadataMode,
    prompt: &'a mut P,
    formatted: u64,
}

impl<'a, D: DiskUtil + ?Sized, P: Prompt + ?Sized> InteractiveSession<'a, D, P> {
    pub fn new(
        disk_util: &'a D,
        config: &'a ProvisionConfig,
        mode: &'a MetadataMode,
        prompt: &'a mut P,
    ) -> Self {
        Self {
            disk_util,
            config,
            mode,
            prompt,
            formatted: 0,
        }
    }

    pub fn formatted(&self) -> u64 {
        self.formatted
    }

    fn run_loop(&mut self) -> Result<SessionSummary> {
        loop {
            self.prompt.say("\nScanning for removable drives...")?;
            let snapshot = scan(self.disk_util, self.config);
            debug!(
                "scan {} at {} found {} candidate(s)",
                snapshot.scan_id,
                snapshot.generated_at_utc,
                snapshot.candidates.len()
            );

            let candidate = match InteractiveSelection::new(&mut *self.prompt)
                .select(&snapshot.candidates)?
            {
                Selection::Selected(candidate) => candidate,
                Selection::Rescan => continue,
                Selection::Quit => break,
            };

            match self.provision_candidate(&candidate)? {
                CycleOutcome::NoTarget => continue,
                CycleOutcome::Formatted { .. } => {
                    if !confirm(&mut *self.prompt, "\nScan for another drive? (Y/n): ")? {
                        break;
                    }
                }
                CycleOutcome::Declined | CycleOutcome::Failed { .. } => {
                    pause(&mut *self.prompt, "\nPress Enter to continue...")?;
                }
            }
        }
        Ok(SessionSummary {
            formatted: self.formatted,
        })
    }

    /// Prepares metadata for `candidate`, asks for confirmation and formats.
    pub fn provision_candidate(&mut self, candidate: &Candidate) -> Result<CycleOutcome> {
        let Some(plan) = self.mode.plan(&mut *self.prompt)? else {
            return Ok(CycleOutcome::NoTarget);
        };

        let disk_util = self.disk_util;
        let config = self.config;
        let disk_id = candidate.disk_id.as_str();

        self.prompt.say("\nPreparing to format drive:")?;
        self.prompt.say(&format!("Device: {}", disk_id))?;
        self.prompt.say(&format!("New name: {}", plan.volume_name))?;
        self.prompt
            .say(&format!("\n{} content:", config.metadata_filename))?;
        self.prompt.say(&plan.payload.to_pretty_json()?)?;

        let confirmed = confirm(&mut *self.prompt, "\nProceed with formatting? (Y/n): ")?;
        if !confirmed {
            info!("format of {} declined by operator", disk_id);
            return Ok(CycleOutcome::Declined);
        }

        let mut progress = PromptProgress {
            prompt: &mut *self.prompt,
            metadata_filename: &config.metadata_filename,
        };
        let result = format_and_provision(
            disk_util,
            config,
            Authorization::Operator { confirmed },
            disk_id,
            &plan,
            Some(&mut progress),
        );

        let metadata_path = match result {
            Ok(path) => path,
            Err(err) => {
                error!("format of {} failed: {}", disk_id, err);
                let diagnostic = err.diagnostic();
                self.prompt.say(&format!("\nError: {}", diagnostic))?;
                return Ok(CycleOutcome::Failed { diagnostic });
            }
        };

        self.formatted += 1;
        self.prompt.say("\nDrive formatted successfully!")?;

        let mut ejected = false;
        if unless_declined(&mut *self.prompt, "\nEject drive now? (Y/n): ")? {
            match eject_disk(disk_util, disk_id) {
                Ok(()) => {
                    ejected = true;
                    self.prompt.say("Drive ejected successfully!")?;
                }
                Err(err) => {
                    warn!("{}", err);
                    self.prompt
                        .say(&format!("Error ejecting drive: {}", err.source.diagnostic()))?;
                }
            }
        }

        Ok(CycleOutcome::Formatted {
            volume_name: plan.volume_name,
            metadata_path,
            ejected,
        })
    }
}

impl<D: DiskUtil + ?Sized, P: Prompt + ?Sized> Workflow for InteractiveSession<'_, D, P> {
    fn name(&self) -> &'static str {
        match self.mode {
            MetadataMode::Template { .. } => "template",
            MetadataMode::Hub => "hub",
        }
    }

    fn run(&mut self) -> Result<SessionSummary> {
        self.run_loop()
    }
}

/// Writes to the unattended status line. A broken terminal never stops the
/// loop, so failures are only logged.
fn write_status<W: Write + ?Sized>(status: &mut W, text: &str) {
    if let Err(err) = status.write_all(text.as_bytes()).and_then(|_| status.flush()) {
        debug!("status output failed: {}", err);
    }
}

struct StatusProgress<'s, W: Write> {
    status: &'s mut W,
    metadata_filename: &'s str,
}

impl<W: Write> ProvisionObserver for StatusProgress<'_, W> {
    fn on_stage(&mut self, stage: ProvisionStage, plan: &ProvisionPlan) {
        let text = match stage {
            ProvisionStage::Erasing => format!("\rFormatting drive as: {}...", plan.volume_name),
            ProvisionStage::Mounting => "\rMounting disk...".to_string(),
            ProvisionStage::Settling => return,
            ProvisionStage::WritingMetadata => format!("\rWriting {}...", self.metadata_filename),
        };
        write_status(self.status, &text);
    }
}

/// Polls for a volume carrying the target name and formats it without
/// asking, until the stop signal is raised.
pub struct UnattendedSession<'a, D: DiskUtil + ?Sized, W: Write> {
    disk_util: &'a D,
    config: &'a ProvisionConfig,
    payload: &'a MetadataPayload,
    base_name: &'a BaseName,
    selection: TargetNameSelection,
    status: W,
    spinner: Spinner,
    formatted: u64,
    stop: StopSignal,
    // Last mount-root listing error, reported once until it changes.
    scan_error: Option<String>,
}

impl<'a, D: DiskUtil + ?Sized, W: Write> UnattendedSession<'a, D, W> {
    pub fn new(
        disk_util: &'a D,
        config: &'a ProvisionConfig,
        payload: &'a MetadataPayload,
        base_name: &'a BaseName,
        target: impl Into<String>,
        status: W,
        stop: StopSignal,
    ) -> Self {
        Self {
            disk_util,
            config,
            payload,
            base_name,
            selection: TargetNameSelection::new(target),
            status,
            spinner: Spinner::default(),
            formatted: 0,
            stop,
            scan_error: None,
        }
    }

    pub fn formatted(&self) -> u64 {
        self.formatted
    }

    pub fn into_status(self) -> W {
        self.status
    }

    fn say(&mut self, text: &str) {
        write_status(&mut self.status, text);
    }

    fn run_loop(&mut self) -> Result<SessionSummary> {
        self.say(&format!(
            "\nStarting automatic formatting...\nLooking for volumes named: {}\nUsing base name: {}\nPress Ctrl+C to exit\n\n",
            self.selection.target(),
            self.base_name.as_str()
        ));
        info!(
            "watching {} for {:?}",
            self.config.mount_root.display(),
            self.selection.target()
        );

        while !self.stop.is_raised() {
            self.run_cycle();
            if self.stop.wait(self.config.poll_interval) {
                break;
            }
        }

        self.say(&format!(
            "\n\nExiting... Final format count: {}\n",
            self.formatted
        ));
        info!("stopped after {} formatted drive(s)", self.formatted);
        Ok(SessionSummary {
            formatted: self.formatted,
        })
    }

    /// One poll: scan for the target, and format and eject it if present.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let frame = self.spinner.next_frame();
        self.say(&format!("\r{} Scanning for target volume...", frame));

        let disk_util = self.disk_util;
        let config = self.config;
        let target = self.selection.target().to_string();
        let snapshot = match read_scan(disk_util, config, |name| name == target) {
            Ok(snapshot) => {
                if self.scan_error.take().is_some() {
                    info!("{} readable again", config.mount_root.display());
                }
                snapshot
            }
            Err(err) => {
                let message = err.to_string();
                if self.scan_error.as_deref() != Some(message.as_str()) {
                    warn!(
                        "Error scanning drives under {}: {}",
                        config.mount_root.display(),
                        message
                    );
                    self.say(&format!("\rError scanning drives: {}", message));
                    self.scan_error = Some(message);
                }
                return CycleOutcome::NoTarget;
            }
        };
        let candidate = match self.selection.select(&snapshot.candidates) {
            Ok(Selection::Selected(candidate)) => candidate,
            Ok(Selection::Rescan | Selection::Quit) => return CycleOutcome::NoTarget,
            Err(err) => {
                debug!("target selection failed: {:#}", err);
                return CycleOutcome::NoTarget;
            }
        };
        self.say("\r");

        let plan = ProvisionPlan {
            volume_name: self.base_name.volume_name(),
            payload: self.payload.clone(),
        };
        let authorization = Authorization::TargetMatch {
            expected: target,
            observed: candidate.volume_name.clone(),
        };
        let mut progress = StatusProgress {
            status: &mut self.status,
            metadata_filename: &config.metadata_filename,
        };
        let result = format_and_provision(
            disk_util,
            config,
            authorization,
            &candidate.disk_id,
            &plan,
            Some(&mut progress),
        );

        let metadata_path = match result {
            Ok(path) => path,
            Err(err) => {
                error!("format of {} failed: {}", candidate.disk_id, err);
                let diagnostic = err.diagnostic();
                self.say(&format!("\r❌ Error: {}\n", diagnostic));
                return CycleOutcome::Failed { diagnostic };
            }
        };

        self.formatted += 1;
        self.say(&format!(
            "\r[{}] ✓ Drive {}: {}\n",
            now_stamp(),
            self.formatted,
            plan.volume_name
        ));

        self.say("\rEjecting drive...");
        let ejected = match eject_disk(disk_util, &candidate.disk_id) {
            Ok(()) => {
                self.say("\r");
                true
            }
            Err(err) => {
                warn!("{}", err);
                self.say(&format!(
                    "\r❌ Error ejecting: {}\n",
                    err.source.diagnostic()
                ));
                false
            }
        };

        CycleOutcome::Formatted {
            volume_name: plan.volume_name,
            metadata_path,
            ejected,
        }
    }
}

impl<D: DiskUtil + ?Sized, W: Write> Workflow for UnattendedSession<'_, D, W> {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn run(&mut self) -> Result<SessionSummary> {
        self.run_loop()
    }
}
