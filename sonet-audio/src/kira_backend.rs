use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use kira::{
    manager::{backend::DefaultBackend, AudioManager, AudioManagerSettings, Capacities},
    sound::{
        static_sound::{StaticSoundData, StaticSoundHandle},
        PlaybackState,
    },
    tween::Tween,
};
use sonet_core::{audio::AudioSystem, subsystem::resources::event_queue::EventKind};

use crate::{push_ticks, MidiStandIn, TickTimer};

/// WAV playback through kira's default output device.
pub struct KiraAudio {
    manager: AudioManager<DefaultBackend>,
    wav: Option<StaticSoundHandle>,
    midi: MidiStandIn,
    timer: TickTimer,
    muted: bool,
}

impl KiraAudio {
    pub fn new(tick_rate: u32, sound_font: Option<PathBuf>) -> anyhow::Result<Self> {
        let manager = AudioManager::<DefaultBackend>::new(AudioManagerSettings {
            capacities: Capacities {
                sound_capacity: 64,
                command_capacity: 128,
                ..Default::default()
            },
            ..Default::default()
        })
        .map_err(|e| anyhow!("failed to open the audio device: {e:?}"))?;

        Ok(Self {
            manager,
            wav: None,
            midi: MidiStandIn::new(sound_font),
            timer: TickTimer::new(tick_rate),
            muted: false,
        })
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn halt_wav(&mut self) {
        if let Some(mut handle) = self.wav.take() {
            let _ = handle.stop(Tween::default());
        }
    }
}

impl AudioSystem for KiraAudio {
    fn play_midi(&mut self, path: &Path) -> anyhow::Result<()> {
        self.midi.play(path);
        Ok(())
    }

    fn play_wav(&mut self, path: &Path) -> anyhow::Result<()> {
        let data = StaticSoundData::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        self.halt_wav();
        let handle = self
            .manager
            .play(data)
            .map_err(|e| anyhow!("failed to play {}: {e:?}", path.display()))?;
        self.wav = Some(handle);
        Ok(())
    }

    fn stop_midi(&mut self) {
        self.midi.stop();
    }

    fn stop_wav(&mut self) {
        self.halt_wav();
    }

    /// Muting applies to MIDI only, which is never audible here.
    fn mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn update(&mut self) -> Vec<EventKind> {
        let mut events = Vec::new();
        self.midi.poll(&mut events);
        let finished = self
            .wav
            .as_ref()
            .is_some_and(|h| h.state() == PlaybackState::Stopped);
        if finished {
            self.wav = None;
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
        self.halt_wav();
    }
}
