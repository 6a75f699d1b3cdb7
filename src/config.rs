use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "cgm_collector".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Deadline for one outstanding control-point operation, in
    /// milliseconds. The profile defines no device-side timeout, so the
    /// collector imposes one to keep the state machine from wedging on a
    /// silent sensor.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: default_op_timeout_ms(),
            log: LogConfig::default(),
        }
    }
}

fn default_op_timeout_ms() -> u64 {
    30_000
}

impl CollectorConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

pub struct ConfigService {
    config: CollectorConfig,
    config_path: PathBuf,
}

impl ConfigService {
    pub fn new() -> anyhow::Result<Self> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_from_file(&config_path).unwrap_or_default();

        Ok(Self {
            config,
            config_path,
        })
    }

    fn get_config_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("CgmCollector");
        fs::create_dir_all(&path)?;
        path.push("config.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<CollectorConfig> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.config_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn get_mut(&mut self) -> &mut CollectorConfig {
        &mut self.config
    }
}
