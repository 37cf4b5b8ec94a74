use crate::core::summary::SummaryOptions;
use crate::stream::{LogPaths, StreamSettings};
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Panel configuration. Every field has a default, so partial files load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Where `security.json` lives (default: XDG data dir)
    pub data_dir: Option<PathBuf>,
    /// Firewall frontend run to apply the enabled state
    pub enforcement_program: String,
    /// Run the enforcement program through run0/sudo/pkexec when not root
    pub elevate_enforcement: bool,
    /// Log stream push interval (minimum 1s)
    pub stream_interval_secs: u64,
    pub stream_batch_lines: usize,
    /// How often the reconciler compares desired and applied state
    pub reconcile_interval_secs: u64,
    /// Fill empty attack-trend hours with placeholder counts.
    /// Only meant for demos; never enable on a real server.
    pub demo_trend_data: bool,
    pub top_ip_limit: usize,
    pub syslog_path: PathBuf,
    pub auth_log_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let logs = LogPaths::default();
        Self {
            data_dir: None,
            enforcement_program: crate::core::enforcement::DEFAULT_PROGRAM.to_string(),
            elevate_enforcement: true,
            stream_interval_secs: 2,
            stream_batch_lines: 5,
            reconcile_interval_secs: 30,
            demo_trend_data: false, // OFF: real counts only
            top_ip_limit: 10,
            syslog_path: logs.syslog,
            auth_log_path: logs.auth,
        }
    }
}

impl AppConfig {
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            interval: Duration::from_secs(self.stream_interval_secs.max(1)),
            batch_lines: self.stream_batch_lines,
        }
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            demo_trend_data: self.demo_trend_data,
            top_ip_limit: self.top_ip_limit,
        }
    }

    pub fn log_paths(&self) -> LogPaths {
        LogPaths {
            syslog: self.syslog_path.clone(),
            auth: self.auth_log_path.clone(),
            ..LogPaths::default()
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }
}

/// Default location: `config.json` in the XDG config dir
pub fn default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Saves the config using an atomic write pattern.
/// 1. Writes to a temporary file created with mode 0o600.
/// 2. Flushes it to disk.
/// 3. Atomically renames it over the target.
pub async fn save_config_to(path: &Path, config: &AppConfig) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600) // Set permissions BEFORE any data is written
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

/// Loads the config at `path`.
/// A missing file gives the defaults; an unparsable one also does, with a warning.
pub async fn load_config_from(path: &Path) -> AppConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Ignoring invalid config {}: {e}", path.display());
            AppConfig::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => {
            warn!("Cannot read config {}: {e}", path.display());
            AppConfig::default()
        }
    }
}

/// Loads the config from its default location
pub async fn load_config() -> AppConfig {
    match default_config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}
