//! Format & provision, and eject.
//!
//! Steps run strictly in order and stop at the first failure. Nothing is
//! rolled back: a drive that fails after erase stays in whatever state the
//! failing step left it, and the next attempt starts from a fresh scan.

use crate::preparation::ProvisionPlan;
use driveprep_core::ProvisionConfig;
use driveprep_host_macos::{DiskUtil, DiskUtilError};
use driveprep_safety::{can_write_to_disk, Authorization, SafetyContext, SafetyDecision};
use log::{info, warn};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    Erasing,
    Mounting,
    Settling,
    WritingMetadata,
}

pub trait ProvisionObserver {
    fn on_stage(&mut self, stage: ProvisionStage, plan: &ProvisionPlan);
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("format refused: {0}")]
    Refused(String),
    #[error("erase {disk_id} failed: {source}")]
    Erase {
        disk_id: String,
        #[source]
        source: DiskUtilError,
    },
    #[error("mount {disk_id} failed: {source}")]
    Mount {
        disk_id: String,
        #[source]
        source: DiskUtilError,
    },
    #[error("write metadata to {path} failed: {reason}")]
    WriteMetadata { path: PathBuf, reason: String },
}

impl ProvisionError {
    /// What to show the operator: the utility's own output where there is one.
    pub fn diagnostic(&self) -> String {
        match self {
            ProvisionError::Erase { source, .. } | ProvisionError::Mount { source, .. } => {
                let text = source.diagnostic();
                if text.is_empty() {
                    self.to_string()
                } else {
                    text
                }
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("eject {disk_id} failed: {source}")]
pub struct EjectError {
    pub disk_id: String,
    #[source]
    pub source: DiskUtilError,
}

/// Erases `disk_id`, remounts it, waits for the mount to settle and writes
/// the payload to the new volume root. Returns the metadata file path.
pub fn format_and_provision<D: DiskUtil + ?Sized>(
    disk_util: &D,
    config: &ProvisionConfig,
    authorization: Authorization,
    disk_id: &str,
    plan: &ProvisionPlan,
    mut observer: Option<&mut dyn ProvisionObserver>,
) -> Result<PathBuf, ProvisionError> {
    let ctx = SafetyContext {
        authorization,
        disk_id: disk_id.to_string(),
        new_volume_name: plan.volume_name.clone(),
    };
    if let SafetyDecision::Deny(reason) = can_write_to_disk(&ctx) {
        warn!("{}", reason);
        return Err(ProvisionError::Refused(reason));
    }

    let mut stage = |current: ProvisionStage| {
        if let Some(obs) = observer.as_deref_mut() {
            obs.on_stage(current, plan);
        }
    };

    stage(ProvisionStage::Erasing);
    info!(
        "erasing {} as {} {} {:?}",
        disk_id, config.partition_scheme, config.filesystem, plan.volume_name
    );
    disk_util
        .erase_disk(
            &config.filesystem,
            &plan.volume_name,
            &config.partition_scheme,
            disk_id,
        )
        .map_err(|source| ProvisionError::Erase {
            disk_id: disk_id.to_string(),
            source,
        })?;

    stage(ProvisionStage::Mounting);
    disk_util
        .mount_disk(disk_id)
        .map_err(|source| ProvisionError::Mount {
            disk_id: disk_id.to_string(),
            source,
        })?;

    stage(ProvisionStage::Settling);
    std::thread::sleep(config.settle_delay);

    stage(ProvisionStage::WritingMetadata);
    let volume_root = config.volume_path(&plan.volume_name);
    let path = plan
        .payload
        .write_to_volume(&volume_root, &config.metadata_filename)
        .map_err(|err| ProvisionError::WriteMetadata {
            path: config.metadata_path(&plan.volume_name),
            reason: format!("{:#}", err),
        })?;
    info!("provisioned {} as {:?}", disk_id, plan.volume_name);
    Ok(path)
}

pub fn eject_disk<D: DiskUtil + ?Sized>(disk_util: &D, disk_id: &str) -> Result<(), EjectError> {
    disk_util.eject(disk_id).map_err(|source| EjectError {
        disk_id: disk_id.to_string(),
        source,
    })?;
    info!("ejected {}", disk_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driveprep_host_macos::fake::{FakeDiskUtil, Operation};
    use driveprep_metadata::MetadataPayload;
    use serde_json::json;
    use std::fs;
    use std::time::Duration;

    fn setup() -> (tempfile::TempDir, FakeDiskUtil, ProvisionConfig) {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeDiskUtil::new(root.path());
        fake.attach_volume("/dev/disk4", "NO NAME", false);
        let config = ProvisionConfig::default()
            .with_mount_root(root.path())
            .with_settle_delay(Duration::ZERO);
        (root, fake, config)
    }

    fn plan() -> ProvisionPlan {
        ProvisionPlan {
            volume_name: "KEPECS_AB1".to_string(),
            payload: MetadataPayload::new(json!({"site": "lab1"})),
        }
    }

    fn confirmed() -> Authorization {
        Authorization::Operator { confirmed: true }
    }

    #[derive(Default)]
    struct Stages(Vec<ProvisionStage>);

    impl ProvisionObserver for Stages {
        fn on_stage(&mut self, stage: ProvisionStage, _plan: &ProvisionPlan) {
            self.0.push(stage);
        }
    }

    #[test]
    fn runs_erase_mount_write_in_order() {
        let (root, fake, config) = setup();
        let mut stages = Stages::default();
        let path =
            format_and_provision(&fake, &config, confirmed(), "/dev/disk4", &plan(), Some(&mut stages))
                .unwrap();

        assert_eq!(path, root.path().join("KEPECS_AB1").join("meta.json"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\n  \"site\": \"lab1\"\n}"
        );
        assert_eq!(
            fake.mutations(),
            vec![
                Operation::EraseDisk {
                    filesystem: "MS-DOS".to_string(),
                    volume_name: "KEPECS_AB1".to_string(),
                    partition_scheme: "MBR".to_string(),
                    disk_id: "/dev/disk4".to_string(),
                },
                Operation::MountDisk {
                    disk_id: "/dev/disk4".to_string()
                },
            ]
        );
        assert_eq!(
            stages.0,
            vec![
                ProvisionStage::Erasing,
                ProvisionStage::Mounting,
                ProvisionStage::Settling,
                ProvisionStage::WritingMetadata
            ]
        );
    }

    #[test]
    fn erase_failure_stops_before_mount() {
        let (_root, fake, config) = setup();
        fake.fail_erase("Unable to unmount disk");

        let err = format_and_provision(&fake, &config, confirmed(), "/dev/disk4", &plan(), None)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Erase { .. }));
        assert_eq!(err.diagnostic(), "Unable to unmount disk");
        assert_eq!(fake.mutations().len(), 1);
    }

    #[test]
    fn mount_failure_skips_metadata_write() {
        let (root, fake, config) = setup();
        fake.fail_mount("timed out");

        let err = format_and_provision(&fake, &config, confirmed(), "/dev/disk4", &plan(), None)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Mount { .. }));
        assert!(!root.path().join("KEPECS_AB1").exists());
    }

    #[test]
    fn volume_not_where_expected_is_write_failure() {
        let (root, fake, config) = setup();
        let config = config.with_mount_root(root.path().join("elsewhere"));
        let err = format_and_provision(&fake, &config, confirmed(), "/dev/disk4", &plan(), None)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::WriteMetadata { .. }));
        assert_eq!(fake.mutations().len(), 2);
    }

    #[test]
    fn refused_context_has_no_side_effects() {
        let (_root, fake, config) = setup();
        let authorization = Authorization::TargetMatch {
            expected: "NO NAME".to_string(),
            observed: "BACKUP".to_string(),
        };
        let err = format_and_provision(&fake, &config, authorization, "/dev/disk4", &plan(), None)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Refused(_)));
        assert!(fake.operations().is_empty());
    }

    #[test]
    fn eject_failure_is_reported() {
        let (_root, fake, _config) = setup();
        fake.fail_eject("Resource busy");
        let err = eject_disk(&fake, "/dev/disk4").unwrap_err();
        assert_eq!(err.source.diagnostic(), "Resource busy");
        assert_eq!(fake.mounted_volumes("/dev/disk4"), vec!["NO NAME"]);
    }
}
