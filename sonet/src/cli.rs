use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use log::LevelFilter;
use sonet_core::VmConfig;
use sonet_nls::Encoding;

#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Pre-compiled program (JSON instruction tree).
    pub program: PathBuf,

    /// Mute audio and never open an output device.
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LevelFilter>,

    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub sound_font: Option<PathBuf>,

    /// Directory media and data files resolve against. Defaults to the
    /// program's directory.
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Text encoding of script data files (sjis, utf8, gbk).
    #[arg(long)]
    pub encoding: Option<Encoding>,

    /// JSON config file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Args {
    pub fn vm_config(&self) -> Result<VmConfig> {
        let mut config = match &self.config {
            Some(path) => VmConfig::read(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => VmConfig {
                base_dir: self.program_dir(),
                ..VmConfig::default()
            },
        };

        config.headless |= self.headless;
        if let Some(ms) = self.timeout {
            config.timeout = Some(Duration::from_millis(ms));
        }
        if let Some(level) = self.log_level {
            config.logger.level_filter = level;
        }
        if let Some(path) = &self.log_file {
            config.logger.log_file = Some(path.clone());
        }
        if let Some(path) = &self.sound_font {
            config.sound_font = Some(path.clone());
        }
        if let Some(dir) = &self.base_dir {
            config.base_dir = dir.clone();
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        Ok(config)
    }

    fn program_dir(&self) -> PathBuf {
        match self.program.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
