use std::path::{Path, PathBuf};

use sonet_core::{audio::AudioSystem, subsystem::resources::event_queue::EventKind};

use crate::{push_ticks, MidiStandIn, TickTimer};

/// Plays nothing. Ticks follow the wall clock and every track finishes on
/// the update after it starts, so titles run to completion unattended.
#[derive(Debug)]
pub struct HeadlessAudio {
    timer: TickTimer,
    midi: MidiStandIn,
    wav: Option<PathBuf>,
    muted: bool,
}

impl HeadlessAudio {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            timer: TickTimer::new(tick_rate),
            midi: MidiStandIn::new(None),
            wav: None,
            muted: true,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl AudioSystem for HeadlessAudio {
    fn play_midi(&mut self, path: &Path) -> anyhow::Result<()> {
        self.midi.play(path);
        Ok(())
    }

    fn play_wav(&mut self, path: &Path) -> anyhow::Result<()> {
        log::debug!("headless: wav {}", path.display());
        self.wav = Some(path.to_path_buf());
        Ok(())
    }

    fn stop_midi(&mut self) {
        self.midi.stop();
    }

    fn stop_wav(&mut self) {
        self.wav = None;
    }

    fn mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn update(&mut self) -> Vec<EventKind> {
        let mut events = Vec::new();
        self.midi.poll(&mut events);
        if self.wav.take().is_some() {
            events.push(EventKind::WavEnd);
        }
        push_ticks(&mut self.timer, &mut events);
        events
    }

    fn start_timer(&mut self) {
        self.timer.start();
    }

    fn stop_timer(&mut self) {
        self.timer.stop();
    }

    fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    fn shutdown(&mut self) {
        self.timer.stop();
        self.midi.stop();
        self.wav = None;
    }
}
