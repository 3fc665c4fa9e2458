use crate::notify::PermissionState;
use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".taskpulse";
const CONFIG_FILE: &str = "config.json";
pub const FIXED_POLL_SECONDS: u64 = 60;
pub const DEFAULT_BANNER_DURATION_MS: i64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poll_seconds: u64,
    pub db_path: PathBuf,
    pub api_port: u16,
    pub banner_duration_ms: i64,
    pub notification_permission: PermissionState,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            poll_seconds: FIXED_POLL_SECONDS,
            db_path: root.join("db").join("taskpulse.db"),
            api_port: 7891,
            banner_duration_ms: DEFAULT_BANNER_DURATION_MS,
            notification_permission: PermissionState::Default,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.poll_seconds = FIXED_POLL_SECONDS;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        Ok(())
    }

    pub fn api_base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.api_port)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "poll_seconds" => {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("poll_seconds must be a number"))?;
                if parsed != FIXED_POLL_SECONDS {
                    bail!("poll_seconds is fixed to {FIXED_POLL_SECONDS} seconds");
                }
                self.poll_seconds = parsed;
            }
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "banner_duration_ms" => {
                self.banner_duration_ms = value
                    .parse::<i64>()
                    .map_err(|_| anyhow!("banner_duration_ms must be a number"))?;
            }
            "notification_permission" => {
                self.notification_permission = value.parse::<PermissionState>()?;
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: poll_seconds|poller.interval_seconds, db_path|db.path, api_port|api.port, banner_duration_ms|banner.duration_ms, notification_permission|notifications.permission"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "poll_seconds" => Some(self.poll_seconds.to_string()),
            "db_path" => Some(self.db_path.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "banner_duration_ms" => Some(self.banner_duration_ms.to_string()),
            "notification_permission" => Some(self.notification_permission.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "poll_seconds" | "poller.interval_seconds" => "poll_seconds",
        "db_path" | "db.path" => "db_path",
        "api_port" | "api.port" => "api_port",
        "banner_duration_ms" | "banner.duration_ms" => "banner_duration_ms",
        "notification_permission" | "notifications.permission" => "notification_permission",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
