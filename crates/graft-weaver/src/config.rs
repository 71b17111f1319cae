//! Weaver configuration (graft.toml)
//!
//! ```toml
//! verify_output = true
//!
//! [safety_net]
//! message = "An error occurred while trying to apply an advisor"
//! report_owner = "graft/rt/Report"
//! report_name = "error"
//! ```

use crate::safety_net::{SafetyNet, DEFAULT_MESSAGE, DEFAULT_REPORT_NAME, DEFAULT_REPORT_OWNER};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A value is present but unusable
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level weaver settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WeaveConfig {
    /// Run the structural verifier on every transformed type
    #[serde(default = "default_verify_output")]
    pub verify_output: bool,

    /// Safety net settings
    #[serde(default)]
    pub safety_net: SafetyNetConfig,
}

/// Safety net settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SafetyNetConfig {
    /// Message passed to the reporting hook
    #[serde(default = "default_message")]
    pub message: String,

    /// Type declaring the reporting hook
    #[serde(default = "default_report_owner")]
    pub report_owner: String,

    /// Name of the static reporting hook
    #[serde(default = "default_report_name")]
    pub report_name: String,
}

fn default_verify_output() -> bool {
    true
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_report_owner() -> String {
    DEFAULT_REPORT_OWNER.to_string()
}

fn default_report_name() -> String {
    DEFAULT_REPORT_NAME.to_string()
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            verify_output: default_verify_output(),
            safety_net: SafetyNetConfig::default(),
        }
    }
}

impl Default for SafetyNetConfig {
    fn default() -> Self {
        Self {
            message: default_message(),
            report_owner: default_report_owner(),
            report_name: default_report_name(),
        }
    }
}

impl WeaveConfig {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: WeaveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let net = &self.safety_net;
        if net.report_owner.is_empty() || net.report_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "safety_net.report_owner and safety_net.report_name cannot be empty".to_string(),
            ));
        }
        if net.report_name == "<init>" {
            return Err(ConfigError::ValidationError(
                "safety_net.report_name must name a static method".to_string(),
            ));
        }
        Ok(())
    }

    /// The safety net these settings describe
    ///
    /// Default settings yield a copy of [`SafetyNet::instance`].
    pub fn safety_net(&self) -> SafetyNet {
        if self.safety_net == SafetyNetConfig::default() {
            return SafetyNet::instance().clone();
        }
        SafetyNet::new(
            self.safety_net.message.clone(),
            self.safety_net.report_owner.clone(),
            self.safety_net.report_name.clone(),
        )
    }
}
