use std::{collections::VecDeque, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::script::Value;

/// Event categories a `mes(...)` handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Timer tick.
    Time,
    /// MIDI sequencer tick; the stand-in player reports one per track.
    MidiTime,
    /// MIDI playback finished.
    MidiEnd,
    /// WAV playback finished.
    WavEnd,
    /// Left button press.
    LButtonDown,
    /// Right button press.
    RButtonDown,
    /// Right button double click.
    RButtonDoubleClick,
    /// Posted by scripts through `PostMes`.
    User,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Time,
        EventKind::MidiTime,
        EventKind::MidiEnd,
        EventKind::WavEnd,
        EventKind::LButtonDown,
        EventKind::RButtonDown,
        EventKind::RButtonDoubleClick,
        EventKind::User,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Time => "TIME",
            EventKind::MidiTime => "MIDI_TIME",
            EventKind::MidiEnd => "MIDI_END",
            EventKind::WavEnd => "WAV_END",
            EventKind::LButtonDown => "LBDOWN",
            EventKind::RButtonDown => "RBDOWN",
            EventKind::RButtonDoubleClick => "RBDBLCLK",
            EventKind::User => "USER",
        }
    }

    /// Numeric code used by `PostMes` and friends.
    pub fn code(self) -> i64 {
        match self {
            EventKind::Time => 0,
            EventKind::MidiTime => 1,
            EventKind::MidiEnd => 2,
            EventKind::WavEnd => 3,
            EventKind::LButtonDown => 4,
            EventKind::RButtonDown => 5,
            EventKind::RButtonDoubleClick => 6,
            EventKind::User => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|k| k.code() == code)
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CLICK" => return Ok(EventKind::LButtonDown),
            "USER_MES" => return Ok(EventKind::User),
            _ => {}
        }
        EventKind::ALL
            .into_iter()
            .find(|k| k.name() == upper)
            .ok_or_else(|| format!("unknown event category `{s}`"))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Published to `MesP1..MesP4` while the event is dispatched.
    pub params: Vec<Value>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    pub fn with_params(kind: EventKind, params: Vec<Value>) -> Self {
        Self { kind, params }
    }
}

/// FIFO of pending events, drained one at a time by the event loop.
#[derive(Debug, Default)]
pub struct EventQueue {
    q: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ev: Event) {
        self.q.push_back(ev);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.q.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn clear(&mut self) {
        self.q.clear();
    }
}
