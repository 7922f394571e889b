pub const FAT_LABEL_MAX_LEN: usize = 11;

/// Who vouched for the destructive operation.
#[derive(Debug, Clone)]
pub enum Authorization {
    /// Interactive runs: the answer the operator gave at the confirmation gate.
    Operator { confirmed: bool },
    /// Unattended runs: the volume name that was watched for, and the one seen.
    TargetMatch { expected: String, observed: String },
}

#[derive(Debug, Clone)]
pub struct SafetyContext {
    pub authorization: Authorization,
    pub disk_id: String,
    pub new_volume_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyDecision {
    Allow,
    Deny(String),
}

pub fn can_write_to_disk(ctx: &SafetyContext) -> SafetyDecision {
    match &ctx.authorization {
        Authorization::Operator { confirmed: false } => {
            return SafetyDecision::Deny("Denied: operator did not confirm format".to_string());
        }
        Authorization::Operator { confirmed: true } => {}
        Authorization::TargetMatch { expected, observed } => {
            if expected != observed {
                return SafetyDecision::Deny(format!(
                    "Denied: volume {:?} is not the target {:?}",
                    observed, expected
                ));
            }
        }
    }

    if !is_whole_disk_node(&ctx.disk_id) {
        return SafetyDecision::Deny(format!(
            "Denied: {} is not a whole-disk device node",
            ctx.disk_id
        ));
    }

    if let Err(reason) = validate_volume_label(&ctx.new_volume_name) {
        return SafetyDecision::Deny(format!("Denied: {}", reason));
    }

    SafetyDecision::Allow
}

pub fn is_system_volume<S: AsRef<str>>(name: &str, deny_list: &[S]) -> bool {
    deny_list.iter().any(|entry| entry.as_ref() == name)
}

// diskutil addresses whole disks as /dev/diskN; slices carry an sM suffix.
pub fn is_whole_disk_node(disk_id: &str) -> bool {
    let Some(number) = disk_id.strip_prefix("/dev/disk") else {
        return false;
    };
    !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate_volume_label(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("volume name is empty".to_string());
    }
    if name.chars().count() > FAT_LABEL_MAX_LEN {
        return Err(format!(
            "volume name {:?} exceeds {} characters",
            name, FAT_LABEL_MAX_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(authorization: Authorization) -> SafetyContext {
        SafetyContext {
            authorization,
            disk_id: "/dev/disk4".to_string(),
            new_volume_name: "KEPECS_AB1".to_string(),
        }
    }

    #[test]
    fn denies_without_confirmation() {
        let ctx = ctx(Authorization::Operator { confirmed: false });
        assert!(matches!(can_write_to_disk(&ctx), SafetyDecision::Deny(_)));
    }

    #[test]
    fn allows_with_confirmation() {
        let ctx = ctx(Authorization::Operator { confirmed: true });
        assert_eq!(can_write_to_disk(&ctx), SafetyDecision::Allow);
    }

    #[test]
    fn denies_target_mismatch() {
        let ctx = ctx(Authorization::TargetMatch {
            expected: "NO NAME".to_string(),
            observed: "BACKUP".to_string(),
        });
        assert!(matches!(can_write_to_disk(&ctx), SafetyDecision::Deny(_)));
    }

    #[test]
    fn allows_target_match() {
        let ctx = ctx(Authorization::TargetMatch {
            expected: "NO NAME".to_string(),
            observed: "NO NAME".to_string(),
        });
        assert_eq!(can_write_to_disk(&ctx), SafetyDecision::Allow);
    }

    #[test]
    fn denies_slice_device() {
        let mut ctx = ctx(Authorization::Operator { confirmed: true });
        ctx.disk_id = "/dev/disk4s1".to_string();
        assert!(matches!(can_write_to_disk(&ctx), SafetyDecision::Deny(_)));
        ctx.disk_id = "disk4".to_string();
        assert!(matches!(can_write_to_disk(&ctx), SafetyDecision::Deny(_)));
    }

    #[test]
    fn denies_overlong_label() {
        let mut ctx = ctx(Authorization::Operator { confirmed: true });
        ctx.new_volume_name = "ABCDEFGHIJKL".to_string();
        assert!(matches!(can_write_to_disk(&ctx), SafetyDecision::Deny(_)));
        ctx.new_volume_name = String::new();
        assert!(matches!(can_write_to_disk(&ctx), SafetyDecision::Deny(_)));
    }

    #[test]
    fn deny_list_is_exact_match() {
        let deny = ["Macintosh HD", "Home"];
        assert!(is_system_volume("Home", &deny));
        assert!(!is_system_volume("home", &deny));
        assert!(!is_system_volume("NO NAME", &deny));
    }
}
