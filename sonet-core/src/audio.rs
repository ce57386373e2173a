//! The narrow capability surface the VM needs from an audio backend.
//!
//! Backends live in `sonet-audio`. Every failure reported here is logged by
//! the caller and never aborts a script.

use std::path::Path;

use crate::subsystem::resources::event_queue::EventKind;

pub trait AudioSystem {
    fn play_midi(&mut self, path: &Path) -> anyhow::Result<()>;
    fn play_wav(&mut self, path: &Path) -> anyhow::Result<()>;
    fn stop_midi(&mut self);
    fn stop_wav(&mut self);
    fn mute(&mut self, muted: bool);

    /// Called once per event-loop iteration. Returns the events that became
    /// due since the previous call, oldest first.
    fn update(&mut self) -> Vec<EventKind>;

    fn start_timer(&mut self);
    fn stop_timer(&mut self);
    fn timer_running(&self) -> bool;

    fn shutdown(&mut self);
}

/// Does nothing and never produces events. Useful when the host drives
/// dispatch by hand.
#[derive(Debug, Default)]
pub struct NullAudio {
    timer: bool,
    muted: bool,
}

impl NullAudio {
    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl AudioSystem for NullAudio {
    fn play_midi(&mut self, path: &Path) -> anyhow::Result<()> {
        log::debug!("null audio: play midi {}", path.display());
        Ok(())
    }

    fn play_wav(&mut self, path: &Path) -> anyhow::Result<()> {
        log::debug!("null audio: play wav {}", path.display());
        Ok(())
    }

    fn stop_midi(&mut self) {}

    fn stop_wav(&mut self) {}

    fn mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn update(&mut self) -> Vec<EventKind> {
        Vec::new()
    }

    fn start_timer(&mut self) {
        self.timer = true;
    }

    fn stop_timer(&mut self) {
        self.timer = false;
    }

    fn timer_running(&self) -> bool {
        self.timer
    }

    fn shutdown(&mut self) {
        self.timer = false;
    }
}
