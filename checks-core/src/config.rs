//! Engine configuration.

use crate::error::ConfigError;
use crate::hooks::HookMode;
use crate::model::DEFAULT_MAX_POOL_DICE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Current configuration file version.
pub const CONFIG_VERSION: u32 = 1;

/// Settings shared by the check pipeline and the effect processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Config format version for compatibility checking.
    pub version: u32,

    /// How hook failures are handled.
    pub hook_mode: HookMode,

    /// Crit threshold for actors that do not define their own.
    pub default_crit_threshold: u32,

    /// Attribute rolled for initiative when the request names none.
    pub initiative_attribute: String,

    /// Flag namespace for effect documents.
    pub effect_namespace: String,

    /// Name given to effects applied without one.
    pub default_effect_name: String,

    /// Icon given to effects applied without one.
    pub default_effect_icon: String,

    /// Largest dice pool an attribute or skill check may roll.
    pub max_pool_dice: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            hook_mode: HookMode::Lenient,
            default_crit_threshold: 7,
            initiative_attribute: "dexterity".to_string(),
            effect_namespace: "checks-core".to_string(),
            default_effect_name: "New Effect".to_string(),
            default_effect_icon: "icons/svg/aura.svg".to_string(),
            max_pool_dice: DEFAULT_MAX_POOL_DICE,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hook failure policy.
    pub fn with_hook_mode(mut self, mode: HookMode) -> Self {
        self.hook_mode = mode;
        self
    }

    /// Set the default crit threshold.
    pub fn with_crit_threshold(mut self, threshold: u32) -> Self {
        self.default_crit_threshold = threshold;
        self
    }

    /// Set the default initiative attribute.
    pub fn with_initiative_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.initiative_attribute = attribute.into();
        self
    }

    pub fn with_effect_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.effect_namespace = namespace.into();
        self
    }

    pub fn with_default_effect_name(mut self, name: impl Into<String>) -> Self {
        self.default_effect_name = name.into();
        self
    }

    pub fn with_default_effect_icon(mut self, icon: impl Into<String>) -> Self {
        self.default_effect_icon = icon.into();
        self
    }

    /// Cap the number of dice a pool check may roll.
    pub fn with_max_pool_dice(mut self, max: i32) -> Self {
        self.max_pool_dice = max;
        self
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;

        if config.version != CONFIG_VERSION {
            return Err(ConfigError::VersionMismatch {
                expected: CONFIG_VERSION,
                found: config.version,
            });
        }

        tracing::debug!(hook_mode = ?config.hook_mode, "loaded engine config");
        Ok(config)
    }
}
