use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const HUB_HOST: &str = "hublink.cloud/";
pub const HUB_URL_PREFIX: &str = "https://hublink.cloud/";
pub const HUB_VOLUME_NAME: &str = "HUBLINK";
pub const HUB_METADATA_FILENAME: &str = "hublink.json";

/// JSON document written to the root of every formatted volume.
///
/// Key order is preserved exactly as loaded or composed.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataPayload {
    value: Value,
}

impl MetadataPayload {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(data)?))
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.value)?)
    }

    /// Writes the payload as indented JSON to `<volume_root>/<filename>`.
    pub fn write_to_volume(&self, volume_root: &Path, filename: &str) -> Result<PathBuf> {
        let path = volume_root.join(filename);
        let data = self.to_pretty_json()?;
        fs::write(&path, data).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// Reads the template once at startup. A missing or malformed file is a
/// configuration error.
pub fn load_template(path: impl AsRef<Path>) -> Result<MetadataPayload> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(MetadataPayload::new(value))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    pub secret_url: String,
    pub gateway_name: String,
}

impl HubConfig {
    pub fn new(secret: &str, gateway_name: &str) -> Result<Self> {
        let secret_url =
            normalize_secret_url(secret).ok_or_else(|| anyhow!("Secret URL cannot be empty."))?;
        let gateway_name = gateway_name.trim();
        if gateway_name.is_empty() {
            return Err(anyhow!("Gateway name cannot be empty."));
        }
        Ok(Self {
            secret_url,
            gateway_name: gateway_name.to_string(),
        })
    }

    pub fn to_payload(&self) -> Result<MetadataPayload> {
        MetadataPayload::from_serialize(self)
    }
}

/// Accepts either the bare secret or a pasted hub URL and returns the
/// canonical `https://hublink.cloud/<secret>` form.
pub fn normalize_secret_url(input: &str) -> Option<String> {
    let input = input.trim();
    let secret = match input.rfind(HUB_HOST) {
        Some(idx) => &input[idx + HUB_HOST.len()..],
        None => input,
    };
    let secret = secret.trim();
    if secret.is_empty() {
        return None;
    }
    Some(format!("{}{}", HUB_URL_PREFIX, secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_url_is_requalified() {
        assert_eq!(
            normalize_secret_url("https://hublink.cloud/XYZ123").as_deref(),
            Some("https://hublink.cloud/XYZ123")
        );
    }

    #[test]
    fn bare_secret_matches_full_url() {
        assert_eq!(
            normalize_secret_url("XYZ123"),
            normalize_secret_url("https://hublink.cloud/XYZ123")
        );
        assert_eq!(
            normalize_secret_url("  hublink.cloud/XYZ123 ").as_deref(),
            Some("https://hublink.cloud/XYZ123")
        );
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(normalize_secret_url(""), None);
        assert_eq!(normalize_secret_url("https://hublink.cloud/"), None);
    }

    #[test]
    fn hub_payload_keeps_field_order() {
        let config = HubConfig::new("XYZ123", " gw-01 ").unwrap();
        let payload = config.to_payload().unwrap();
        assert_eq!(
            payload.to_pretty_json().unwrap(),
            "{\n  \"secret_url\": \"https://hublink.cloud/XYZ123\",\n  \"gateway_name\": \"gw-01\"\n}"
        );
    }

    #[test]
    fn hub_config_rejects_blank_gateway() {
        assert!(HubConfig::new("XYZ123", "   ").is_err());
    }

    #[test]
    fn template_round_trips_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, r#"{"site": "lab1", "rig": {"id": 3}, "alpha": true}"#).unwrap();

        let payload = load_template(&path).unwrap();
        let keys: Vec<&String> = payload.as_value().as_object().unwrap().keys().collect();
        assert_eq!(keys, ["site", "rig", "alpha"]);

        let volume = dir.path().join("KEPECS_AB1");
        fs::create_dir(&volume).unwrap();
        let written = payload.write_to_volume(&volume, "meta.json").unwrap();
        let back: Value = serde_json::from_str(&fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(back, json!({"site": "lab1", "rig": {"id": 3}, "alpha": true}));
    }

    #[test]
    fn missing_template_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_template(dir.path().join("meta.json")).is_err());
    }

    #[test]
    fn invalid_template_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_template(&path).unwrap_err();
        assert!(err.to_string().starts_with("parse "));
    }

    #[test]
    fn write_into_missing_volume_fails() {
        let dir = tempfile::tempdir().unwrap();
        let payload = MetadataPayload::new(json!({"site": "lab1"}));
        assert!(payload
            .write_to_volume(&dir.path().join("GONE"), "meta.json")
            .is_err());
    }
}
