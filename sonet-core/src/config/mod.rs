pub mod logger_config;
pub mod vm_config;

pub use logger_config::LoggerConfig;
pub use vm_config::{ConfigError, VmConfig, VmConfigBuilder, MAX_STACK_DEPTH};
