use rand::Rng;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use uuid::Uuid;

pub const DEFAULT_MOUNT_ROOT: &str = "/Volumes";
pub const DEFAULT_SYSTEM_VOLUMES: [&str; 4] = [".timemachine", "Macintosh HD", "System", "Home"];
pub const DEFAULT_METADATA_FILENAME: &str = "meta.json";
pub const DEFAULT_TEMPLATE_PATH: &str = "meta.json";
pub const DEFAULT_TARGET_VOLUME_NAME: &str = "NO NAME";
pub const DEFAULT_BASE_NAME: &str = "KEPECS";
pub const DEFAULT_FILESYSTEM: &str = "MS-DOS";
pub const DEFAULT_PARTITION_SCHEME: &str = "MBR";

pub const INTERACTIVE_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const UNATTENDED_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const BASE_NAME_MAX_LEN: usize = 6;
pub const SUFFIX_LEN: usize = 3;
pub const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A removable volume observed during one scan, paired with the whole disk
/// that backs it. Never cached across scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub disk_id: String,     // whole disk, e.g. /dev/disk4
    pub volume_name: String, // entry under the mount root
}

impl Candidate {
    pub fn new(disk_id: impl Into<String>, volume_name: impl Into<String>) -> Self {
        Self {
            disk_id: disk_id.into(),
            volume_name: volume_name.into(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.disk_id, self.volume_name)
    }
}

#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    pub scan_id: Uuid,
    pub mount_root: PathBuf,
    pub candidates: Vec<Candidate>,
    pub generated_at_utc: String,
}

impl ScanSnapshot {
    pub fn new(mount_root: impl Into<PathBuf>, candidates: Vec<Candidate>) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            mount_root: mount_root.into(),
            candidates,
            generated_at_utc: now_utc_rfc3339(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Please enter a name.")]
    Empty,
    #[error("Name too long. Maximum {max} characters.")]
    TooLong { max: usize },
}

/// Upper-cased prefix shared by every drive formatted in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseName(String);

impl BaseName {
    pub fn parse(value: &str) -> Result<Self, NameError> {
        let name = value.trim().to_uppercase();
        let len = name.chars().count();
        if len == 0 {
            return Err(NameError::Empty);
        }
        if len > BASE_NAME_MAX_LEN {
            return Err(NameError::TooLong {
                max: BASE_NAME_MAX_LEN,
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<BASE>_<XYZ>` with a fresh suffix from the thread-local generator.
    pub fn volume_name(&self) -> String {
        self.volume_name_with(&mut rand::thread_rng())
    }

    pub fn volume_name_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        format!("{}_{}", self.0, random_suffix(rng))
    }
}

impl fmt::Display for BaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// No collision check against names already handed out; three characters give
// 46656 combinations per base name.
pub fn random_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub mount_root: PathBuf,
    pub system_volumes: Vec<String>,
    pub metadata_filename: String,
    pub filesystem: String,
    pub partition_scheme: String,
    pub settle_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            system_volumes: DEFAULT_SYSTEM_VOLUMES.iter().map(|v| v.to_string()).collect(),
            metadata_filename: DEFAULT_METADATA_FILENAME.to_string(),
            filesystem: DEFAULT_FILESYSTEM.to_string(),
            partition_scheme: DEFAULT_PARTITION_SCHEME.to_string(),
            settle_delay: INTERACTIVE_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ProvisionConfig {
    pub fn with_mount_root(mut self, mount_root: impl Into<PathBuf>) -> Self {
        self.mount_root = mount_root.into();
        self
    }

    pub fn with_metadata_filename(mut self, filename: impl Into<String>) -> Self {
        self.metadata_filename = filename.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_extra_system_volumes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.system_volumes.contains(&name) {
                self.system_volumes.push(name);
            }
        }
        self
    }

    pub fn volume_path(&self, volume_name: &str) -> PathBuf {
        self.mount_root.join(volume_name)
    }

    pub fn metadata_path(&self, volume_name: &str) -> PathBuf {
        metadata_path_in(&self.volume_path(volume_name), &self.metadata_filename)
    }
}

pub fn metadata_path_in(volume_root: &Path, filename: &str) -> PathBuf {
    volume_root.join(filename)
}

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn now_stamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(format)
        .unwrap_or_else(|_| "1970-01-01 00:00:00".to_string())
}
