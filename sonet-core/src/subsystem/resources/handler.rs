use std::rc::Rc;

use crate::script::{instruction::has_step_block, Instruction};

use super::event_queue::EventKind;

pub type HandlerId = u32;

/// What the dispatcher should do with a handler for the current event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Frozen or marked for deletion.
    Skip,
    /// Waiting; one more event was consumed from the counter.
    Waiting { remaining: i64 },
    /// Resume the body at this offset.
    Run { pc: usize },
}

/// How a resumed run of the body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A wait was hit; resume at `pc` after `wait` more events.
    Suspended { pc: usize, wait: i64 },
    /// Fell off the end of the body (or returned).
    Completed,
}

/// One registered `mes(...)` reaction with its resumable state.
#[derive(Debug, Clone)]
pub struct EventHandler {
    pub id: HandlerId,
    pub kind: EventKind,
    pub body: Rc<Vec<Instruction>>,
    pub active: bool,
    pub current_pc: usize,
    pub wait_counter: i64,
    pub step_counter: i64,
    pub has_step_block: bool,
    pub marked_for_deletion: bool,
}

impl EventHandler {
    pub fn new(id: HandlerId, kind: EventKind, body: Rc<Vec<Instruction>>) -> Self {
        let has_step_block = has_step_block(&body);
        Self {
            id,
            kind,
            body,
            active: true,
            current_pc: 0,
            wait_counter: 0,
            step_counter: 1,
            has_step_block,
            marked_for_deletion: false,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_counter > 0
    }

    /// Offer the current event to this handler.
    pub fn poll(&mut self) -> Poll {
        if !self.active || self.marked_for_deletion {
            return Poll::Skip;
        }
        if self.wait_counter > 0 {
            self.wait_counter -= 1;
            return Poll::Waiting {
                remaining: self.wait_counter,
            };
        }
        Poll::Run {
            pc: self.current_pc,
        }
    }

    /// Record the result of a run.
    pub fn finish(&mut self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Suspended { pc, wait } => {
                self.current_pc = pc;
                self.wait_counter = wait.max(0);
            }
            RunOutcome::Completed if self.has_step_block => {
                // one-shot: retire
                self.active = false;
                self.marked_for_deletion = true;
            }
            RunOutcome::Completed => {
                self.current_pc = 0;
                self.wait_counter = 0;
            }
        }
    }

    /// Stop receiving events; pc and wait counter are kept.
    pub fn freeze(&mut self) {
        self.active = false;
    }

    /// Resume receiving events exactly where it left off.
    pub fn activate(&mut self) {
        if !self.marked_for_deletion {
            self.active = true;
        }
    }

    pub fn mark_for_deletion(&mut self) {
        self.active = false;
        self.marked_for_deletion = true;
    }

    /// Events per wait unit; non-positive values fall back to 1.
    pub fn set_step(&mut self, per_unit: i64) {
        self.step_counter = if per_unit > 0 { per_unit } else { 1 };
    }
}
