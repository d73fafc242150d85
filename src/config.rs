//! Endpoint configuration.
//!
//! ```toml
//! high_water_mark = 65536
//! object_mode = false
//! default_encoding = "utf8"
//! ```

use crate::error::ConfigError;
use crate::writable::Encoding;
use serde::Deserialize;

/// Default backpressure threshold in bytes
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Default backpressure threshold in objects
pub const DEFAULT_OBJECT_HIGH_WATER_MARK: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WritableConfig {
    /// Length at which `write` starts returning false; 0 means always
    /// return false unless the write flushed immediately
    pub high_water_mark: Option<usize>,

    /// Count each chunk as 1 instead of its byte length
    pub object_mode: bool,

    /// Convert text chunks to bytes before they are queued
    pub decode_strings: bool,

    #[serde(deserialize_with = "deserialize_encoding")]
    pub default_encoding: Encoding,

    /// Emit `close` once the sink is destroyed
    pub emit_close: bool,

    /// Destroy after `finish` and on error
    pub auto_destroy: bool,
}

impl Default for WritableConfig {
    fn default() -> Self {
        Self {
            high_water_mark: None,
            object_mode: false,
            decode_strings: true,
            default_encoding: Encoding::Utf8,
            emit_close: true,
            auto_destroy: true,
        }
    }
}

fn deserialize_encoding<'de, D>(deserializer: D) -> Result<Encoding, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(serde::de::Error::custom)
}

impl WritableConfig {
    pub fn object_mode() -> Self {
        Self {
            object_mode: true,
            ..Self::default()
        }
    }

    pub fn with_high_water_mark(mut self, hwm: usize) -> Self {
        self.high_water_mark = Some(hwm);
        self
    }

    pub fn effective_high_water_mark(&self) -> usize {
        self.high_water_mark.unwrap_or(if self.object_mode {
            DEFAULT_OBJECT_HIGH_WATER_MARK
        } else {
            DEFAULT_HIGH_WATER_MARK
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.object_mode && self.default_encoding != Encoding::Utf8 && self.decode_strings {
            return Err(ConfigError::Invalid(format!(
                "default_encoding {} has no effect in object mode; set decode_strings = false",
                self.default_encoding
            )));
        }
        Ok(())
    }
}
