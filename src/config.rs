use std::{env, path::PathBuf};
use log::info;

use crate::error::ClientError;
use crate::types::DeviceType;
use crate::util::{VAR_API_BASE_URL, VAR_DEVICE_TYPE, VAR_LANGUAGE, VAR_SESSION_PATH, VAR_VAPID_KEY};

const DEFAULT_SESSION_PATH: &str = ".medreminder-session.json";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Web push application server key, required for `DeviceType::Web`.
    pub vapid_key: Option<String>,
    pub device_type: DeviceType,
    pub session_path: PathBuf,
    /// Explicit language override. `None` keeps whatever the session already holds.
    pub language: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Result<ClientConfig, ClientError> {
        ClientConfig::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ClientConfig, ClientError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_base_url = var(VAR_API_BASE_URL)
            .ok_or_else(|| ClientError::Config(format!("Required environment variable: {VAR_API_BASE_URL}")))?;
        let api_base_url = normalize_base_url(&api_base_url)?;

        let device_type = match var(VAR_DEVICE_TYPE) {
            Some(raw) => raw
                .parse()
                .map_err(|e: ClientError| ClientError::Config(format!("{VAR_DEVICE_TYPE}: {e}")))?,
            None => DeviceType::Web,
        };

        let session_path = var(VAR_SESSION_PATH).unwrap_or_else(|| {
            info!("{VAR_SESSION_PATH} not set, using default: {DEFAULT_SESSION_PATH}");
            DEFAULT_SESSION_PATH.to_string()
        });

        Ok(ClientConfig {
            api_base_url,
            vapid_key: var(VAR_VAPID_KEY).map(|k| k.trim().to_string()),
            device_type,
            session_path: PathBuf::from(session_path),
            language: var(VAR_LANGUAGE).map(|l| l.trim().to_string()),
        })
    }
}

/// Trims whitespace and trailing slashes; only http(s) URLs are accepted.
pub fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let url = raw.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ClientError::Config(format!("{VAR_API_BASE_URL} must be an http(s) URL, got {raw:?}")));
    }
    Ok(url.to_string())
}
