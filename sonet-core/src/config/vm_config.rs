use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use sonet_nls::Encoding;

use super::logger_config::LoggerConfig;

/// Deepest call stack a script may build.
pub const MAX_STACK_DEPTH: usize = 1000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("tick rate must be positive")]
    InvalidTickRate,

    #[error("max stack depth {0} is outside 1..={MAX_STACK_DEPTH}")]
    InvalidStackDepth(usize),

    #[error("base directory {0:?} does not exist")]
    MissingBaseDir(PathBuf),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything a [`crate::Vm`] needs from its host.
/// Use [`VmConfigBuilder`] to build one from code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Mute audio and skip real device output.
    pub headless: bool,
    /// Wall-clock bound for [`crate::Vm::run`]. Serialized as milliseconds.
    #[serde(with = "millis")]
    pub timeout: Option<Duration>,
    pub logger: LoggerConfig,
    /// SoundFont used for MIDI synthesis, when the audio backend supports it.
    pub sound_font: Option<PathBuf>,
    /// Relative media and data file names resolve against this directory.
    pub base_dir: PathBuf,
    /// Encoding of text read and written through file handles.
    pub encoding: Encoding,
    /// TIME events per second.
    pub tick_rate: u32,
    pub max_stack_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            headless: false,
            timeout: None,
            logger: LoggerConfig::default(),
            sound_font: None,
            base_dir: PathBuf::from("."),
            encoding: Encoding::ShiftJis,
            tick_rate: 60,
            max_stack_depth: MAX_STACK_DEPTH,
        }
    }
}

impl VmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::InvalidTickRate);
        }
        if !(1..=MAX_STACK_DEPTH).contains(&self.max_stack_depth) {
            return Err(ConfigError::InvalidStackDepth(self.max_stack_depth));
        }
        // headless runs never touch media, so a missing directory is tolerated
        if !self.headless && !self.base_dir.is_dir() {
            return Err(ConfigError::MissingBaseDir(self.base_dir.clone()));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `VmConfigBuilder` is a convenience builder to create a `VmConfig` from code.
#[derive(Debug, Default)]
pub struct VmConfigBuilder {
    config: VmConfig,
}

impl VmConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn logger(mut self, logger: LoggerConfig) -> Self {
        self.config.logger = logger;
        self
    }

    pub fn sound_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sound_font = Some(path.into());
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.base_dir = dir.into();
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn tick_rate(mut self, rate: u32) -> Self {
        self.config.tick_rate = rate;
        self
    }

    pub fn max_stack_depth(mut self, depth: usize) -> Self {
        self.config.max_stack_depth = depth;
        self
    }

    /// Retrieves the configuration built
    pub fn get(self) -> VmConfig {
        self.config
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_validate() {
        let config = VmConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_stack_depth, 1000);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let config = VmConfigBuilder::new().tick_rate(0).get();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTickRate)));

        let config = VmConfigBuilder::new().max_stack_depth(1001).get();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidStackDepth(1001))));

        let config = VmConfigBuilder::new().base_dir("/definitely/not/here").get();
        assert!(matches!(config.validate(), Err(ConfigError::MissingBaseDir(_))));

        let config = VmConfigBuilder::new()
            .headless(true)
            .base_dir("/definitely/not/here")
            .get();
        config.validate().unwrap();
    }

    #[test]
    fn json_uses_milliseconds_and_fills_defaults() {
        let config = VmConfig::from_json(r#"{ "headless": true, "timeout": 1500, "encoding": "utf8" }"#).unwrap();
        assert!(config.headless);
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.encoding, Encoding::Utf8);
        assert_eq!(config.tick_rate, 60);

        let back = VmConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
