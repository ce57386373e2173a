use std::path::PathBuf;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// Logger configuration used by the runtime host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub level_filter: LevelFilter,
    /// Log sink. `None` writes to stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level_filter: LevelFilter::Info,
            log_file: None,
        }
    }
}
