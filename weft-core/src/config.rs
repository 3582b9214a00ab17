//! Engine configuration

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_DEPTH: usize = 50;
pub const DEFAULT_MAX_EVENTS: usize = 1_000_000;
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_ERRORS: usize = 10;
pub const DEFAULT_MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Per-call resource limits. Fixed for the lifetime of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateLimits {
    pub max_depth: usize,
    pub max_events: usize,
    pub max_bytes: usize,
    pub max_errors: usize,
    pub max_error_message_length: usize,
}

impl Default for TemplateLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_events: DEFAULT_MAX_EVENTS,
            max_bytes: DEFAULT_MAX_BYTES,
            max_errors: DEFAULT_MAX_ERRORS,
            max_error_message_length: DEFAULT_MAX_ERROR_MESSAGE_LENGTH,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    pub limits: TemplateLimits,
    /// Recognize `if`, `elseif`, `else` and `each` directives.
    pub extended_directives: bool,
}

impl TemplateConfig {
    /// Parse a TOML document, e.g.
    ///
    /// ```toml
    /// extended_directives = true
    ///
    /// [limits]
    /// max_depth = 64
    /// ```
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: TemplateConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `WEFT_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = TemplateConfig::default();
        let limits = &mut config.limits;
        override_usize("WEFT_MAX_DEPTH", &mut limits.max_depth)?;
        override_usize("WEFT_MAX_EVENTS", &mut limits.max_events)?;
        override_usize("WEFT_MAX_BYTES", &mut limits.max_bytes)?;
        override_usize("WEFT_MAX_ERRORS", &mut limits.max_errors)?;
        override_usize(
            "WEFT_MAX_ERROR_MESSAGE_LENGTH",
            &mut limits.max_error_message_length,
        )?;
        if let Ok(value) = std::env::var("WEFT_EXTENDED_DIRECTIVES") {
            config.extended_directives = value == "true" || value == "1";
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let limits = &self.limits;
        for (field, value) in [
            ("max_depth", limits.max_depth),
            ("max_events", limits.max_events),
            ("max_bytes", limits.max_bytes),
            ("max_errors", limits.max_errors),
            ("max_error_message_length", limits.max_error_message_length),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn override_usize(name: &str, target: &mut usize) -> ConfigResult<()> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(());
    };
    *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        value: raw.clone(),
        reason: "expected a non-negative integer".to_string(),
    })?;
    Ok(())
}
