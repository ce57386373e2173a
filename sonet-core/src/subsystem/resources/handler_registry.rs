use std::rc::Rc;

use crate::script::Instruction;

use super::{
    event_queue::EventKind,
    handler::{EventHandler, HandlerId},
};

/// Registered handlers in registration order.
#[derive(Debug)]
pub struct HandlerRegistry {
    handlers: Vec<EventHandler>,
    next_id: HandlerId,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 1,
        }
    }

    pub fn register(&mut self, kind: EventKind, body: Rc<Vec<Instruction>>) -> HandlerId {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push(EventHandler::new(id, kind, body));
        log::debug!("registered handler #{id} for {kind}");
        id
    }

    pub fn get(&self, id: HandlerId) -> Option<&EventHandler> {
        self.handlers.iter().find(|h| h.id == id)
    }

    pub fn get_mut(&mut self, id: HandlerId) -> Option<&mut EventHandler> {
        self.handlers.iter_mut().find(|h| h.id == id)
    }

    /// Snapshot of the handlers interested in `kind`, in registration order.
    pub fn ids_for(&self, kind: EventKind) -> Vec<HandlerId> {
        self.handlers
            .iter()
            .filter(|h| h.kind == kind)
            .map(|h| h.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventHandler> {
        self.handlers.iter()
    }

    pub fn mark_kind_for_deletion(&mut self, kind: EventKind) {
        for h in self.handlers.iter_mut().filter(|h| h.kind == kind) {
            h.mark_for_deletion();
        }
    }

    pub fn mark_all_for_deletion(&mut self) {
        for h in self.handlers.iter_mut() {
            h.mark_for_deletion();
        }
    }

    /// Drop every handler marked for deletion; returns how many went away.
    pub fn sweep(&mut self) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|h| {
            if h.marked_for_deletion {
                log::debug!("removing handler #{} ({})", h.id, h.kind);
            }
            !h.marked_for_deletion
        });
        before - self.handlers.len()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Rc<Vec<Instruction>> {
        Rc::new(Vec::new())
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let mut r = HandlerRegistry::new();
        assert_eq!(r.register(EventKind::Time, body()), 1);
        assert_eq!(r.register(EventKind::LButtonDown, body()), 2);
        assert_eq!(r.register(EventKind::Time, body()), 3);
        assert_eq!(r.ids_for(EventKind::Time), vec![1, 3]);
    }

    #[test]
    fn ids_are_not_reused_after_sweep() {
        let mut r = HandlerRegistry::new();
        let a = r.register(EventKind::Time, body());
        r.get_mut(a).unwrap().mark_for_deletion();
        assert_eq!(r.sweep(), 1);
        assert!(r.is_empty());
        assert_eq!(r.register(EventKind::Time, body()), 2);
    }

    #[test]
    fn kind_deletion_leaves_others() {
        let mut r = HandlerRegistry::new();
        r.register(EventKind::Time, body());
        r.register(EventKind::MidiEnd, body());
        r.mark_kind_for_deletion(EventKind::Time);
        r.sweep();
        assert_eq!(r.len(), 1);
        assert_eq!(r.iter().next().unwrap().kind, EventKind::MidiEnd);
    }
}
