//! Boundary to the macOS disk utility and the volumes mount root.
//!
//! Everything that touches a real disk goes through [`DiskUtil`] so the
//! workflows can run against [`fake::FakeDiskUtil`] in tests.

pub mod fake;

use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;

pub const DISKUTIL_PATH: &str = "/usr/sbin/diskutil";
pub const WHOLE_DISK_FIELD: &str = "Part of Whole";
pub const INTERNAL_FIELD: &str = "Internal";
pub const DEVICE_LOCATION_FIELD: &str = "Device Location";

#[derive(Debug, Error)]
pub enum DiskUtilError {
    #[error("run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{command} failed: {diagnostic}")]
    Failed {
        command: String,
        code: Option<i32>,
        diagnostic: String,
    },
}

impl DiskUtilError {
    /// Text the utility printed before failing, if any.
    pub fn diagnostic(&self) -> String {
        match self {
            DiskUtilError::Spawn { source, .. } => source.to_string(),
            DiskUtilError::Failed { diagnostic, .. } => diagnostic.clone(),
        }
    }
}

/// The four disk-utility operations the provisioning workflow relies on.
pub trait DiskUtil {
    /// Free-text `key: value` report for a mount path or device node.
    fn info(&self, target: &str) -> Result<String, DiskUtilError>;

    fn erase_disk(
        &self,
        filesystem: &str,
        volume_name: &str,
        partition_scheme: &str,
        disk_id: &str,
    ) -> Result<(), DiskUtilError>;

    fn mount_disk(&self, disk_id: &str) -> Result<(), DiskUtilError>;

    fn eject(&self, disk_id: &str) -> Result<(), DiskUtilError>;
}

impl<T: DiskUtil + ?Sized> DiskUtil for &T {
    fn info(&self, target: &str) -> Result<String, DiskUtilError> {
        (**self).info(target)
    }

    fn erase_disk(
        &self,
        filesystem: &str,
        volume_name: &str,
        partition_scheme: &str,
        disk_id: &str,
    ) -> Result<(), DiskUtilError> {
        (**self).erase_disk(filesystem, volume_name, partition_scheme, disk_id)
    }

    fn mount_disk(&self, disk_id: &str) -> Result<(), DiskUtilError> {
        (**self).mount_disk(disk_id)
    }

    fn eject(&self, disk_id: &str) -> Result<(), DiskUtilError> {
        (**self).eject(disk_id)
    }
}

/// Runs the real `diskutil` binary.
#[derive(Debug, Clone)]
pub struct Diskutil {
    program: PathBuf,
}

impl Default for Diskutil {
    fn default() -> Self {
        Self::new(DISKUTIL_PATH)
    }
}

impl Diskutil {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, DiskUtilError> {
        let command = format!("{} {}", self.program.display(), args.join(" "));
        debug!("exec: {}", command);
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DiskUtilError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(DiskUtilError::Failed {
                command,
                code: output.status.code(),
                diagnostic: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl DiskUtil for Diskutil {
    fn info(&self, target: &str) -> Result<String, DiskUtilError> {
        let output = self.run(&["info", target])?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn erase_disk(
        &self,
        filesystem: &str,
        volume_name: &str,
        partition_scheme: &str,
        disk_id: &str,
    ) -> Result<(), DiskUtilError> {
        self.run(&["eraseDisk", filesystem, volume_name, partition_scheme, disk_id])
            .map(|_| ())
    }

    fn mount_disk(&self, disk_id: &str) -> Result<(), DiskUtilError> {
        self.run(&["mountDisk", disk_id]).map(|_| ())
    }

    fn eject(&self, disk_id: &str) -> Result<(), DiskUtilError> {
        self.run(&["eject", disk_id]).map(|_| ())
    }
}

/// Value of the first `field: value` line in a utility report.
///
/// Lines without a colon and fields with an empty value are ignored, so a
/// missing field is `None` rather than an error.
pub fn parse_field(report: &str, field: &str) -> Option<String> {
    report.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != field {
            return None;
        }
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Device node of the whole disk a volume lives on, e.g. `/dev/disk4`.
pub fn whole_disk_id(volume_report: &str) -> Option<String> {
    parse_field(volume_report, WHOLE_DISK_FIELD).map(|disk| {
        if disk.starts_with("/dev/") {
            disk
        } else {
            format!("/dev/{}", disk)
        }
    })
}

pub fn is_internal(disk_report: &str) -> bool {
    let flagged = parse_field(disk_report, INTERNAL_FIELD)
        .map(|value| value.starts_with("Yes"))
        .unwrap_or(false);
    let located = parse_field(disk_report, DEVICE_LOCATION_FIELD)
        .map(|value| value.eq_ignore_ascii_case("Internal"))
        .unwrap_or(false);
    flagged || located
}

/// Names of every entry under the mount root, sorted so menus are stable.
pub fn list_volumes(mount_root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(mount_root)? {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}
