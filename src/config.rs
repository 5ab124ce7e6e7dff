use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the output sync engine's fetch scheduling.
///
/// The defaults match the host application's behavior; a config file is only
/// needed to deviate from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Fetch delay while the session is still initializing, giving the agent
    /// process time to produce first output.
    #[serde(default = "default_initializing_delay_ms")]
    pub initializing_delay_ms: u64,

    /// Fetch delay for sessions in any other status.
    #[serde(default = "default_reload_delay_ms")]
    pub reload_delay_ms: u64,

    /// Base backoff for transient-error retries; attempt n waits n times this.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Automatic retries for a transient failure while initializing. Sessions
    /// in any other status get none.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_initializing_delay_ms() -> u64 {
    500
}

fn default_reload_delay_ms() -> u64 {
    200
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initializing_delay_ms: default_initializing_delay_ms(),
            reload_delay_ms: default_reload_delay_ms(),
            retry_base_ms: default_retry_base_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl SyncConfig {
    pub fn initializing_delay(&self) -> Duration {
        Duration::from_millis(self.initializing_delay_ms)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_ms * attempt as u64)
    }
}

fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
        .join("agentdeck");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir.join("config.json"))
}

/// Load the engine config, falling back to defaults when no file exists.
pub fn load() -> Result<SyncConfig> {
    let path = config_path()?;

    if !path.exists() {
        return Ok(SyncConfig::default());
    }

    load_from(&path)
}

pub fn load_from(path: &std::path::Path) -> Result<SyncConfig> {
    let contents = fs::read_to_string(path)?;
    let config: SyncConfig = serde_json::from_str(&contents)?;
    Ok(config)
}

pub fn save(config: &SyncConfig) -> Result<()> {
    let path = config_path()?;
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(&path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_host_behavior() {
        let config = SyncConfig::default();
        assert_eq!(config.initializing_delay(), Duration::from_millis(500));
        assert_eq!(config.reload_delay(), Duration::from_millis(200));
        assert_eq!(config.retry_delay(1), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(3), Duration::from_millis(3000));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"reload_delay_ms": 50}"#).unwrap();

        let config = load_from(&path).unwrap();

        assert_eq!(config.reload_delay_ms, 50);
        assert_eq!(config.initializing_delay_ms, 500);
        assert_eq!(config.max_retries, 3);
    }
}
