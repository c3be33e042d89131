//! CLI configuration

use hushwire_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default capacity of the in-process relay's envelope event channel
pub const DEFAULT_ENVELOPE_EVENT_BUFFER: usize = 10;

/// CLI configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory of the persistent processed-message cache
    pub storage_path: PathBuf,
    /// Public chats joined on startup
    pub public_chats: Vec<String>,
    /// Capacity of the envelope event channel of the in-process relay
    pub envelope_event_buffer: usize,
    /// Transport settings
    pub transport: TransportConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        let storage_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hushwire");

        Self {
            storage_path,
            public_chats: vec!["hushwire".to_string()],
            envelope_event_buffer: DEFAULT_ENVELOPE_EVENT_BUFFER,
            transport: TransportConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load config from file or create default
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: CliConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.envelope_event_buffer == 0 {
            anyhow::bail!("envelope_event_buffer must be > 0");
        }
        self.transport
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid transport config: {}", e))
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
