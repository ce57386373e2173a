//! Audio backends for the sonet VM.
//!
//! Both backends share the same timer and the same MIDI stand-in: there is
//! no synthesizer, so a MIDI track plays a single sequencer tick and
//! "finishes" on the next update.

mod headless;
#[cfg(feature = "kira")]
mod kira_backend;
mod timer;

pub use headless::HeadlessAudio;
#[cfg(feature = "kira")]
pub use kira_backend::KiraAudio;
pub use timer::TickTimer;

use std::path::{Path, PathBuf};

use sonet_core::subsystem::resources::event_queue::EventKind;

/// Tracks the MIDI track a script asked for and reports its one tick and its end.
#[derive(Debug, Default)]
pub(crate) struct MidiStandIn {
    sound_font: Option<PathBuf>,
    playing: Option<PathBuf>,
}

impl MidiStandIn {
    pub fn new(sound_font: Option<PathBuf>) -> Self {
        Self { sound_font, playing: None }
    }

    pub fn play(&mut self, path: &Path) {
        match &self.sound_font {
            Some(font) => log::warn!(
                "MIDI synthesis is unavailable (sound font {}); {} ends immediately",
                font.display(),
                path.display()
            ),
            None => log::warn!("MIDI synthesis is unavailable; {} ends immediately", path.display()),
        }
        self.playing = Some(path.to_path_buf());
    }

    pub fn stop(&mut self) {
        self.playing = None;
    }

    pub fn poll(&mut self, out: &mut Vec<EventKind>) {
        if let Some(path) = self.playing.take() {
            log::debug!("midi {} ended", path.display());
            out.push(EventKind::MidiTime);
            out.push(EventKind::MidiEnd);
        }
    }
}

/// Appends one TIME event per elapsed tick.
pub(crate) fn push_ticks(timer: &mut TickTimer, out: &mut Vec<EventKind>) {
    let due = timer.due();
    out.extend(std::iter::repeat(EventKind::Time).take(due as usize));
}
