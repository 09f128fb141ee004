use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AckloopError, Result};
use crate::types::Opcode;

/// Top-level configuration for an ackloop session.
///
/// Loaded from `~/.ackloop/config.toml` by default. Every section falls back
/// to its defaults, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckloopConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub opcodes: OpcodeTable,
}

impl AckloopConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AckloopConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AckloopError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Distance beyond which the navigator is asked to approach an NPC.
    pub interact_range: f64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            interact_range: 4.0,
        }
    }
}

/// Wait budgets and poll intervals, in milliseconds.
///
/// A budget of the form `max(floor, latency * 2 + padding)` is written as a
/// `*_floor_ms` / `*_padding_ms` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Latency assumed when the world has no estimate yet.
    pub fallback_latency_ms: u64,
    /// Multiplier applied to latency for settle delays and scaled budgets.
    pub latency_multiplier: u64,
    /// Poll interval for tight confirmation loops.
    pub poll_interval_ms: u64,
    /// Floor of the settle delay after a corrective step.
    pub settle_floor_ms: u64,
    /// Observation window of one menu-open attempt.
    pub menu_window_ms: u64,
    pub menu_poll_ms: u64,
    /// Settle delay floor after the menu opens.
    pub menu_settle_floor_ms: u64,
    /// Spacing of trade-session pulses.
    pub trade_pulse_ms: u64,
    pub shop_floor_ms: u64,
    pub shop_padding_ms: u64,
    pub sell_window_ms: u64,
    pub identify_window_ms: u64,
    pub cursor_floor_ms: u64,
    pub cursor_padding_ms: u64,
    pub belt_window_ms: u64,
    pub belt_poll_ms: u64,
    pub skill_floor_ms: u64,
    pub skill_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fallback_latency_ms: 125,
            latency_multiplier: 2,
            poll_interval_ms: 10,
            settle_floor_ms: 0,
            menu_window_ms: 5000,
            menu_poll_ms: 100,
            menu_settle_floor_ms: 500,
            trade_pulse_ms: 200,
            shop_floor_ms: 2000,
            shop_padding_ms: 500,
            sell_window_ms: 2000,
            identify_window_ms: 2000,
            cursor_floor_ms: 500,
            cursor_padding_ms: 200,
            belt_window_ms: 500,
            belt_poll_ms: 100,
            skill_floor_ms: 1000,
            skill_poll_ms: 25,
        }
    }
}

/// Attempt ceilings per transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub menu_attempts: u32,
    /// Number of trade pulses; a command goes out on every other pulse.
    pub trade_pulses: u32,
    pub buy_attempts: u32,
    pub sell_attempts: u32,
    /// Attempts per identify phase.
    pub identify_attempts: u32,
    pub cursor_attempts: u32,
    pub skill_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            menu_attempts: 5,
            trade_pulses: 10,
            buy_attempts: 3,
            sell_attempts: 5,
            identify_attempts: 3,
            cursor_attempts: 15,
            skill_attempts: 3,
        }
    }
}

/// Notification registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Per-subscription queue depth; messages beyond it are dropped.
    pub queue_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Outbound opcode assignments.
///
/// The engine never hard-codes opcodes; every command it builds takes its
/// selector from this table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpcodeTable {
    pub left_skill_on_location: Opcode,
    pub left_skill_on_entity: Opcode,
    pub right_skill_on_location: Opcode,
    pub right_skill_on_entity: Opcode,
    pub interact_with_entity: Opcode,
    pub pickup_item: Opcode,
    pub drop_item: Opcode,
    pub pickup_buffer_item: Opcode,
    pub pickup_body_item: Opcode,
    pub item_to_belt: Opcode,
    pub use_belt_item: Opcode,
    pub identify_item: Opcode,
    pub npc_init: Opcode,
    pub npc_cancel: Opcode,
    pub npc_buy: Opcode,
    pub npc_sell: Opcode,
    pub entity_action: Opcode,
    pub select_skill: Opcode,
    pub update_quests: Opcode,
    pub request_entity_update: Opcode,
    pub merc_item: Opcode,
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self {
            left_skill_on_location: 0x05,
            left_skill_on_entity: 0x0a,
            right_skill_on_location: 0x0c,
            right_skill_on_entity: 0x11,
            interact_with_entity: 0x13,
            pickup_item: 0x16,
            drop_item: 0x17,
            pickup_buffer_item: 0x19,
            pickup_body_item: 0x1c,
            item_to_belt: 0x23,
            use_belt_item: 0x26,
            identify_item: 0x27,
            npc_init: 0x2f,
            npc_cancel: 0x30,
            npc_buy: 0x32,
            npc_sell: 0x33,
            entity_action: 0x38,
            select_skill: 0x3c,
            update_quests: 0x40,
            request_entity_update: 0x4b,
            merc_item: 0x61,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AckloopConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.timing.fallback_latency_ms, 125);
        assert_eq!(config.timing.shop_floor_ms, 2000);
        assert_eq!(config.retry.menu_attempts, 5);
        assert_eq!(config.retry.cursor_attempts, 15);
        assert_eq!(config.notify.queue_capacity, 64);
        assert_eq!(config.opcodes.npc_buy, 0x32);
    }

    #[test]
    fn test_load_partial_config() {
        let content = r#"
[general]
log_level = "debug"

[retry]
buy_attempts = 4

[opcodes]
npc_sell = 0x99
"#;
        let file = create_temp_config(content);
        let config = AckloopConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.interact_range, 4.0);
        assert_eq!(config.retry.buy_attempts, 4);
        assert_eq!(config.retry.sell_attempts, 5);
        assert_eq!(config.opcodes.npc_sell, 0x99);
        assert_eq!(config.opcodes.npc_buy, 0x32);
        assert_eq!(config.timing.menu_window_ms, 5000);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[retry\nbuy_attempts = ");
        let err = AckloopConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, AckloopError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AckloopConfig::load(Path::new("/nonexistent/ackloop.toml")).unwrap_err();
        assert!(matches!(err, AckloopError::Io(_)));
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let config = AckloopConfig::load_or_default(Path::new("/nonexistent/ackloop.toml"));
        assert_eq!(config.retry.sell_attempts, 5);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AckloopConfig::default();
        config.timing.fallback_latency_ms = 80;
        config.notify.queue_capacity = 8;
        config.save(&path).unwrap();

        let loaded = AckloopConfig::load(&path).unwrap();
        assert_eq!(loaded.timing.fallback_latency_ms, 80);
        assert_eq!(loaded.notify.queue_capacity, 8);
    }
}
