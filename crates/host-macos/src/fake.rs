//! In-memory disk utility for tests.
//!
//! Records every call in order and keeps a small model of which volumes are
//! mounted under a mount root, creating and removing the directories the way
//! the OS would so discovery and metadata writes can run against a tempdir.
//! Files present on a volume when its disk is ejected are kept so tests can
//! inspect what left the machine.

use crate::{DiskUtil, DiskUtilError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Info {
        target: String,
    },
    EraseDisk {
        filesystem: String,
        volume_name: String,
        partition_scheme: String,
        disk_id: String,
    },
    MountDisk {
        disk_id: String,
    },
    Eject {
        disk_id: String,
    },
}

#[derive(Debug, Clone)]
struct FakeDisk {
    internal: bool,
    volumes: Vec<String>,
    pending_name: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    operations: Vec<Operation>,
    disks: HashMap<String, FakeDisk>,
    report_overrides: HashMap<String, String>,
    info_failures: HashMap<String, String>,
    erase_failure: Option<String>,
    mount_failure: Option<String>,
    eject_failure: Option<String>,
    ejected_files: HashMap<PathBuf, String>,
}

#[derive(Debug, Clone)]
pub struct FakeDiskUtil {
    mount_root: PathBuf,
    state: Arc<Mutex<FakeState>>,
}

impl FakeDiskUtil {
    pub fn new(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Mounts `volume_name` from `disk_id` and creates its directory.
    pub fn attach_volume(&self, disk_id: &str, volume_name: &str, internal: bool) -> &Self {
        let _ = fs::create_dir_all(self.mount_root.join(volume_name));
        let mut state = self.state();
        let disk = state
            .disks
            .entry(disk_id.to_string())
            .or_insert_with(|| FakeDisk {
                internal,
                volumes: Vec::new(),
                pending_name: None,
            });
        disk.internal = internal;
        disk.volumes.push(volume_name.to_string());
        self
    }

    /// Replaces the generated report for `target`.
    pub fn set_report(&self, target: &str, report: &str) -> &Self {
        self.state()
            .report_overrides
            .insert(target.to_string(), report.to_string());
        self
    }

    pub fn fail_info(&self, target: &str, diagnostic: &str) -> &Self {
        self.state()
            .info_failures
            .insert(target.to_string(), diagnostic.to_string());
        self
    }

    pub fn fail_erase(&self, diagnostic: &str) -> &Self {
        self.state().erase_failure = Some(diagnostic.to_string());
        self
    }

    pub fn fail_mount(&self, diagnostic: &str) -> &Self {
        self.state().mount_failure = Some(diagnostic.to_string());
        self
    }

    pub fn fail_eject(&self, diagnostic: &str) -> &Self {
        self.state().eject_failure = Some(diagnostic.to_string());
        self
    }

    /// Lets erase, mount and eject succeed again. Info failures stay.
    pub fn clear_failures(&self) -> &Self {
        let mut state = self.state();
        state.erase_failure = None;
        state.mount_failure = None;
        state.eject_failure = None;
        drop(state);
        self
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Operations other than `info`, which discovery issues on every scan.
    pub fn mutations(&self) -> Vec<Operation> {
        self.operations()
            .into_iter()
            .filter(|op| !matches!(op, Operation::Info { .. }))
            .collect()
    }

    pub fn mounted_volumes(&self, disk_id: &str) -> Vec<String> {
        self.state()
            .disks
            .get(disk_id)
            .map(|disk| disk.volumes.clone())
            .unwrap_or_default()
    }

    /// Contents of `<mount_root>/<volume_name>/<filename>` at the moment its
    /// disk was ejected.
    pub fn ejected_file(&self, volume_name: &str, filename: &str) -> Option<String> {
        self.state()
            .ejected_files
            .get(&self.mount_root.join(volume_name).join(filename))
            .cloned()
    }

    fn volume_target(&self, volume_name: &str) -> String {
        self.mount_root.join(volume_name).to_string_lossy().to_string()
    }

    fn generated_report(&self, state: &FakeState, target: &str) -> Option<String> {
        if let Some(disk) = state.disks.get(target) {
            let name = target.trim_start_matches("/dev/");
            return Some(format!(
                "   Device Identifier:         {name}\n   Device Node:               {target}\n   Whole:                     Yes\n   Internal:                  {}\n",
                if disk.internal { "Yes" } else { "No" }
            ));
        }
        state.disks.iter().find_map(|(disk_id, disk)| {
            disk.volumes
                .iter()
                .find(|volume| self.volume_target(volume) == target)
                .map(|volume| {
                    let whole = disk_id.trim_start_matches("/dev/");
                    format!(
                        "   Device Identifier:         {whole}s1\n   Whole:                     No\n   Part of Whole:             {whole}\n   Volume Name:               {volume}\n"
                    )
                })
        })
    }

    fn snapshot_files(&self, disk: &FakeDisk) -> Vec<(PathBuf, String)> {
        let mut files = Vec::new();
        for volume in &disk.volumes {
            let Ok(entries) = fs::read_dir(self.mount_root.join(volume)) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if let Ok(contents) = fs::read_to_string(&path) {
                    files.push((path, contents));
                }
            }
        }
        files
    }

    fn unmount_all(&self, disk: &mut FakeDisk) {
        for volume in disk.volumes.drain(..) {
            let _ = fs::remove_dir_all(self.mount_root.join(volume));
        }
    }
}

fn failed(command: &str, diagnostic: &str) -> DiskUtilError {
    DiskUtilError::Failed {
        command: command.to_string(),
        code: Some(1),
        diagnostic: diagnostic.to_string(),
    }
}

impl DiskUtil for FakeDiskUtil {
    fn info(&self, target: &str) -> Result<String, DiskUtilError> {
        let mut state = self.state();
        state.operations.push(Operation::Info {
            target: target.to_string(),
        });
        if let Some(diagnostic) = state.info_failures.get(target) {
            return Err(failed("diskutil info", diagnostic));
        }
        if let Some(report) = state.report_overrides.get(target) {
            return Ok(report.clone());
        }
        self.generated_report(&state, target)
            .ok_or_else(|| failed("diskutil info", "Could not find disk"))
    }

    fn erase_disk(
        &self,
        filesystem: &str,
        volume_name: &str,
        partition_scheme: &str,
        disk_id: &str,
    ) -> Result<(), DiskUtilError> {
        let mut state = self.state();
        state.operations.push(Operation::EraseDisk {
            filesystem: filesystem.to_string(),
            volume_name: volume_name.to_string(),
            partition_scheme: partition_scheme.to_string(),
            disk_id: disk_id.to_string(),
        });
        if let Some(diagnostic) = state.erase_failure.clone() {
            return Err(failed("diskutil eraseDisk", &diagnostic));
        }
        let Some(mut disk) = state.disks.get(disk_id).cloned() else {
            return Err(failed("diskutil eraseDisk", "Could not find disk"));
        };
        self.unmount_all(&mut disk);
        disk.pending_name = Some(volume_name.to_string());
        state.disks.insert(disk_id.to_string(), disk);
        Ok(())
    }

    fn mount_disk(&self, disk_id: &str) -> Result<(), DiskUtilError> {
        let mut state = self.state();
        state.operations.push(Operation::MountDisk {
            disk_id: disk_id.to_string(),
        });
        if let Some(diagnostic) = state.mount_failure.clone() {
            return Err(failed("diskutil mountDisk", &diagnostic));
        }
        let Some(disk) = state.disks.get_mut(disk_id) else {
            return Err(failed("diskutil mountDisk", "Could not find disk"));
        };
        if let Some(name) = disk.pending_name.take() {
            let _ = fs::create_dir_all(self.mount_root.join(&name));
            disk.volumes.push(name);
        }
        Ok(())
    }

    fn eject(&self, disk_id: &str) -> Result<(), DiskUtilError> {
        let mut state = self.state();
        state.operations.push(Operation::Eject {
            disk_id: disk_id.to_string(),
        });
        if let Some(diagnostic) = state.eject_failure.clone() {
            return Err(failed("diskutil eject", &diagnostic));
        }
        let Some(mut disk) = state.disks.remove(disk_id) else {
            return Err(failed("diskutil eject", "Could not find disk"));
        };
        let files = self.snapshot_files(&disk);
        state.ejected_files.extend(files);
        self.unmount_all(&mut disk);
        Ok(())
    }
}
