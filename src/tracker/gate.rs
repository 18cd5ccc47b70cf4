use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::models::TaskId;

/// Set of task ids with a terminal-transition call in flight.
///
/// At most one completion or cancellation RPC per id may be outstanding.
#[derive(Debug, Default)]
pub struct CompletionGate {
    in_flight: Mutex<HashSet<TaskId>>,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<TaskId>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("CompletionGate mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Records `id` as in flight. Returns false if it already was.
    pub fn try_acquire(&self, id: &TaskId) -> bool {
        self.ids().insert(id.clone())
    }

    /// Clears `id` whatever the outcome of the call it guarded.
    pub fn release(&self, id: &TaskId) {
        self.ids().remove(id);
    }

    pub fn is_held(&self, id: &TaskId) -> bool {
        self.ids().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Acquires `id` and hands back a pass that releases it on drop.
    pub fn enter(&self, id: &TaskId) -> Option<GatePass<'_>> {
        if self.try_acquire(id) {
            Some(GatePass {
                gate: self,
                id: id.clone(),
            })
        } else {
            None
        }
    }
}

/// Held for the duration of one terminal-transition call.
#[derive(Debug)]
pub struct GatePass<'a> {
    gate: &'a CompletionGate,
    id: TaskId,
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.id);
    }
}
