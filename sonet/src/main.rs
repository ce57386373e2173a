mod cli;

use std::{
    fs::File,
    path::{Path, PathBuf},
    thread,
};

use anyhow::{anyhow, Context, Result};
use clap::Parser as ClapParser;

use sonet_audio::HeadlessAudio;
use sonet_core::{audio::AudioSystem, LoggerConfig, Program, Vm, VmConfig};

use crate::cli::Args;

/// Room for the deepest script call stack the VM allows.
const VM_STACK_SIZE: usize = 512 * 1024 * 1024;

fn init_logger(config: &LoggerConfig) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level_filter);
    // RUST_LOG wins over the configured level
    builder.parse_default_env();
    if let Some(path) = &config.log_file {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

#[cfg(feature = "kira")]
fn audio_backend(config: &VmConfig) -> Box<dyn AudioSystem> {
    if !config.headless {
        match sonet_audio::KiraAudio::new(config.tick_rate, config.sound_font.clone()) {
            Ok(audio) => return Box::new(audio),
            Err(e) => log::warn!("{e:#}; continuing without sound"),
        }
    }
    Box::new(HeadlessAudio::new(config.tick_rate))
}

#[cfg(not(feature = "kira"))]
fn audio_backend(config: &VmConfig) -> Box<dyn AudioSystem> {
    if !config.headless {
        log::info!("built without an audio backend; running silent");
    }
    Box::new(HeadlessAudio::new(config.tick_rate))
}

fn load_program(path: &Path) -> Result<Program> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Program::from_json(&json).with_context(|| format!("failed to parse {}", path.display()))
}

fn run(program_path: PathBuf, config: VmConfig) -> Result<()> {
    let program = load_program(&program_path)?;
    let audio = audio_backend(&config);
    let mut vm = Vm::new(program, config, audio).context("invalid configuration")?;
    log::info!("running {}", program_path.display());
    vm.run()
        .with_context(|| format!("{} aborted", program_path.display()))?;
    log::info!("{} finished", program_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.vm_config()?;
    init_logger(&config.logger)?;

    let program_path = args.program.clone();
    let vm_thread = thread::Builder::new()
        .name("sonet-vm".to_string())
        .stack_size(VM_STACK_SIZE)
        .spawn(move || run(program_path, config))
        .context("failed to spawn VM thread")?;

    vm_thread
        .join()
        .map_err(|_| anyhow!("VM thread panicked"))?
}
