//! Drive discovery: mounted volumes -> removable whole disks.
//!
//! Nothing is cached between scans; every call re-reads the mount root and
//! re-queries the disk utility.

use driveprep_core::{Candidate, ProvisionConfig, ScanSnapshot};
use driveprep_host_macos::{is_internal, list_volumes, whole_disk_id, DiskUtil, DiskUtilError};
use driveprep_safety::is_system_volume;
use log::{debug, warn};
use std::io;

pub fn scan<D: DiskUtil + ?Sized>(disk_util: &D, config: &ProvisionConfig) -> ScanSnapshot {
    scan_matching(disk_util, config, |_| true)
}

/// Like [`scan`] but only queries the disk utility for volumes `wanted`
/// accepts.
pub fn scan_matching<D, F>(disk_util: &D, config: &ProvisionConfig, wanted: F) -> ScanSnapshot
where
    D: DiskUtil + ?Sized,
    F: Fn(&str) -> bool,
{
    read_scan(disk_util, config, wanted).unwrap_or_else(|err| {
        warn!(
            "Error scanning drives under {}: {}",
            config.mount_root.display(),
            err
        );
        ScanSnapshot::new(&config.mount_root, Vec::new())
    })
}

/// Fails only when the mount root itself cannot be listed; per-volume
/// query failures just leave that volume out.
pub fn read_scan<D, F>(
    disk_util: &D,
    config: &ProvisionConfig,
    wanted: F,
) -> io::Result<ScanSnapshot>
where
    D: DiskUtil + ?Sized,
    F: Fn(&str) -> bool,
{
    let mut candidates = Vec::new();
    for name in list_volumes(&config.mount_root)? {
        if is_system_volume(&name, &config.system_volumes) || !wanted(&name) {
            continue;
        }
        match resolve_candidate(disk_util, config, &name) {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(err) => debug!("skipping volume {:?}: {}", name, err),
        }
    }
    Ok(ScanSnapshot::new(&config.mount_root, candidates))
}

/// Resolves one mounted volume to its backing whole disk. `Ok(None)` when
/// the report has no whole-disk field or the disk is internal.
pub fn resolve_candidate<D: DiskUtil + ?Sized>(
    disk_util: &D,
    config: &ProvisionConfig,
    volume_name: &str,
) -> Result<Option<Candidate>, DiskUtilError> {
    let target = config.volume_path(volume_name);
    let report = disk_util.info(&target.to_string_lossy())?;
    let Some(disk_id) = whole_disk_id(&report) else {
        debug!("skipping volume {:?}: no whole disk reported", volume_name);
        return Ok(None);
    };

    let disk_report = disk_util.info(&disk_id)?;
    if is_internal(&disk_report) {
        debug!("skipping volume {:?}: {} is internal", volume_name, disk_id);
        return Ok(None);
    }
    Ok(Some(Candidate::new(disk_id, volume_name)))
}
