use crate::ingest::AcceptPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "lyrix";
const SETTINGS_FILE: &str = "settings.json";
const LOG_FILE: &str = "lyrix.log";

pub const CONFIG_DIR_VAR: &str = "LYRIX_CONFIG_DIR";
pub const UPLOAD_URL_VAR: &str = "LYRIX_UPLOAD_URL";
pub const UPLOAD_PRESET_VAR: &str = "LYRIX_UPLOAD_PRESET";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub upload_preset: Option<String>,
    #[serde(default = "default_image_size_limit_mb")]
    pub image_size_limit_mb: f64,
    #[serde(default = "default_audio_size_limit_mb")]
    pub audio_size_limit_mb: f64,
    #[serde(default = "default_breakdown_size_limit_mb")]
    pub breakdown_size_limit_mb: f64,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

fn default_image_size_limit_mb() -> f64 {
    1.9
}

fn default_audio_size_limit_mb() -> f64 {
    10.0
}

fn default_breakdown_size_limit_mb() -> f64 {
    10.0
}

fn default_upload_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_url: None,
            upload_preset: None,
            image_size_limit_mb: default_image_size_limit_mb(),
            audio_size_limit_mb: default_audio_size_limit_mb(),
            breakdown_size_limit_mb: default_breakdown_size_limit_mb(),
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn image_policy(&self) -> AcceptPolicy {
        AcceptPolicy::images(self.image_size_limit_mb)
    }

    pub fn audio_policy(&self) -> AcceptPolicy {
        AcceptPolicy::audio_lyrics(self.audio_size_limit_mb)
    }

    pub fn breakdown_policy(&self) -> AcceptPolicy {
        AcceptPolicy::breakdown(self.breakdown_size_limit_mb)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs.max(1))
    }

    /// Environment wins over the settings file. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |name: &str| lookup(name).filter(|value: &String| !value.trim().is_empty());
        if let Some(url) = present(UPLOAD_URL_VAR) {
            self.upload_url = Some(url);
        }
        if let Some(preset) = present(UPLOAD_PRESET_VAR) {
            self.upload_preset = Some(preset);
        }
    }
}

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var(CONFIG_DIR_VAR) {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn ensure_config_dir(root: &Path) -> Result<()> {
    fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))
}

pub fn log_path(root: &Path) -> PathBuf {
    root.join(LOG_FILE)
}

pub fn load_settings_from(root: &Path) -> Result<Settings> {
    let path = root.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

/// Settings file under `root`, then environment overrides.
pub fn load_settings(root: &Path) -> Result<Settings> {
    let mut settings = load_settings_from(root)?;
    settings.apply_overrides(|name| env::var(name).ok());
    Ok(settings)
}
