use std::time::{Duration, Instant};

/// Upper bound on ticks reported by a single poll. A host that stalls (a
/// debugger break, a suspended laptop) skips ahead instead of flooding the
/// queue with stale TIME events.
const MAX_BURST: u64 = 8;

/// Wall-clock timer that reports how many ticks became due since the last
/// poll, at `tick_rate` ticks per second.
#[derive(Debug, Clone)]
pub struct TickTimer {
    tick_rate: u32,
    started: Option<Instant>,
    emitted: u64,
}

impl TickTimer {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick_rate: tick_rate.max(1),
            started: None,
            emitted: 0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate
    }

    /// Starting a running timer keeps its phase.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
            self.emitted = 0;
        }
    }

    pub fn stop(&mut self) {
        self.started = None;
        self.emitted = 0;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn due(&mut self) -> u64 {
        self.due_at(Instant::now())
    }

    pub fn due_at(&mut self, now: Instant) -> u64 {
        let Some(started) = self.started else {
            return 0;
        };
        let elapsed = now.saturating_duration_since(started);
        let total = (elapsed.as_nanos() * self.tick_rate as u128 / 1_000_000_000) as u64;
        let due = total.saturating_sub(self.emitted);
        self.emitted = total;
        if due > MAX_BURST {
            log::debug!("timer fell {due} ticks behind; skipping ahead");
            return MAX_BURST;
        }
        due
    }
}
