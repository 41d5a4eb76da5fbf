use anyhow::{Result, anyhow};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://api.mail.tm";
pub const DEFAULT_SESSION_LIFETIME_SECS: u64 = 3600;

const TEMPLATE_HEADER: &str = "\
# tempinbox configuration
#
# api_base_url must point at a mail.tm-compatible API: GET /domains,
# POST /accounts and POST /token to create an inbox, GET|DELETE /accounts/{id},
# GET /messages and DELETE /messages/{id} with the bearer token.
# The default is the public mail.tm service.
#
# Inboxes only count down when the server reports an expiresAt;
# session_lifetime_secs is the full length the progress bar is drawn against.

";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Full lifetime of an inbox, used for the progress bar.
    pub session_lifetime_secs: u64,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub preferred_domain: Option<String>,
    pub desktop_notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            poll_interval_secs: 10,
            request_timeout_secs: 15,
            preferred_domain: None,
            desktop_notifications: true,
        }
    }
}

impl Config {
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api_base_url.trim().to_string();
        // Url::join drops the last path segment unless it ends with a slash
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| anyhow!("Invalid api_base_url '{}': {e}", self.api_base_url))
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_lifetime_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join("tempinbox"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

/// Load the config from its default location, writing a template on first run.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let sample = Config::default();
        let tom = format!("{TEMPLATE_HEADER}{}", toml::to_string_pretty(&sample)?);
        if let Err(e) = fs::write(path, tom) {
            warn!("could not write config template to {}: {e}", path.display());
        } else {
            info!("created config template at {}", path.display());
        }
        return Ok(sample);
    }
    let s = fs::read_to_string(path)?;
    let cfg: Config =
        toml::from_str(&s).map_err(|e| anyhow!("Invalid config {}: {e}", path.display()))?;
    cfg.base_url()?;
    Ok(cfg)
}
