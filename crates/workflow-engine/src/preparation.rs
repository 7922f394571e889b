//! Per-cycle metadata preparation: which name the volume gets and what is
//! written to it.

use crate::prompt::{is_quit, Prompt};
use anyhow::Result;
use driveprep_core::{BaseName, DEFAULT_METADATA_FILENAME};
use driveprep_metadata::{
    normalize_secret_url, HubConfig, MetadataPayload, HUB_METADATA_FILENAME, HUB_VOLUME_NAME,
};

#[derive(Debug, Clone)]
pub enum MetadataMode {
    /// Template loaded once per process. The base name is asked for every
    /// cycle unless it is fixed up front.
    Template {
        payload: MetadataPayload,
        base_name: Option<BaseName>,
    },
    /// Hub configuration composed interactively each cycle.
    Hub,
}

#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub volume_name: String,
    pub payload: MetadataPayload,
}

impl MetadataMode {
    pub fn default_metadata_filename(&self) -> &'static str {
        match self {
            MetadataMode::Template { .. } => DEFAULT_METADATA_FILENAME,
            MetadataMode::Hub => HUB_METADATA_FILENAME,
        }
    }

    /// `None` when the operator quits at one of the prompts.
    pub fn plan<P: Prompt + ?Sized>(&self, prompt: &mut P) -> Result<Option<ProvisionPlan>> {
        match self {
            MetadataMode::Template { payload, base_name } => {
                let base_name = match base_name {
                    Some(base_name) => base_name.clone(),
                    None => match prompt_base_name(prompt)? {
                        Some(base_name) => base_name,
                        None => return Ok(None),
                    },
                };
                Ok(Some(ProvisionPlan {
                    volume_name: base_name.volume_name(),
                    payload: payload.clone(),
                }))
            }
            MetadataMode::Hub => {
                let Some(config) = prompt_hub_config(prompt)? else {
                    return Ok(None);
                };
                Ok(Some(ProvisionPlan {
                    volume_name: HUB_VOLUME_NAME.to_string(),
                    payload: config.to_payload()?,
                }))
            }
        }
    }
}

pub fn prompt_base_name<P: Prompt + ?Sized>(prompt: &mut P) -> Result<Option<BaseName>> {
    loop {
        let Some(answer) = prompt.ask("\nEnter 6-character base name (or 'q' to quit): ")? else {
            return Ok(None);
        };
        if is_quit(&answer) {
            return Ok(None);
        }
        match BaseName::parse(&answer) {
            Ok(name) => return Ok(Some(name)),
            Err(err) => prompt.say(&err.to_string())?,
        }
    }
}

pub fn prompt_hub_config<P: Prompt + ?Sized>(prompt: &mut P) -> Result<Option<HubConfig>> {
    prompt.say("\nHubLink Configuration")?;
    prompt.say("--------------------")?;

    let secret_url = loop {
        let Some(answer) = prompt.ask("Enter HubLink secret URL (or 'q' to quit): ")? else {
            return Ok(None);
        };
        if is_quit(&answer) {
            return Ok(None);
        }
        match normalize_secret_url(&answer) {
            Some(url) => break url,
            None => prompt.say("Secret URL cannot be empty.")?,
        }
    };

    let gateway_name = loop {
        let Some(answer) = prompt.ask("Enter gateway name (or 'q' to quit): ")? else {
            return Ok(None);
        };
        if is_quit(&answer) {
            return Ok(None);
        }
        let answer = answer.trim();
        if answer.is_empty() {
            prompt.say("Gateway name cannot be empty.")?;
            continue;
        }
        break answer.to_string();
    };

    Ok(Some(HubConfig::new(&secret_url, &gateway_name)?))
}
