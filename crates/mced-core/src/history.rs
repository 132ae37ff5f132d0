//! Linear undo/redo over whole-document snapshots.
//!
//! Snapshots are owned by the stack. Callers hand documents over by value and
//! get clones back, so nothing outside can reach stack-held state.

use std::collections::VecDeque;

/// Default number of undo steps kept.
pub const MAX_HISTORY: usize = 50;

/// Past/present/future snapshot holder.
#[derive(Debug, Clone)]
pub struct HistoryStack<T> {
    /// Oldest first
    past: VecDeque<T>,
    present: T,
    /// Next redo first
    future: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> HistoryStack<T> {
    pub fn new(documents: T) -> Self {
        Self::with_capacity(documents, MAX_HISTORY)
    }

    /// Stack keeping at most `capacity` undo steps (at least one).
    pub fn with_capacity(documents: T, capacity: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present: documents,
            future: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Start over from `documents`, dropping all undo and redo steps.
    pub fn init(&mut self, documents: T) {
        self.past.clear();
        self.future.clear();
        self.present = documents;
    }

    /// Record a committed edit batch.
    ///
    /// The previous present becomes an undo step (oldest evicted past
    /// capacity) and the redo branch is discarded.
    pub fn push_state(&mut self, documents: T) {
        let previous = std::mem::replace(&mut self.present, documents);
        self.past.push_back(previous);
        while self.past.len() > self.capacity {
            self.past.pop_front();
        }
        self.future.clear();
    }

    /// Step back. Returns the new present, or `None` when there's nothing to undo.
    pub fn undo(&mut self) -> Option<T> {
        let previous = self.past.pop_back()?;
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        Some(self.present.clone())
    }

    /// Step forward. Returns the new present, or `None` when there's nothing to redo.
    pub fn redo(&mut self) -> Option<T> {
        let next = self.future.pop_front()?;
        let current = std::mem::replace(&mut self.present, next);
        self.past.push_back(current);
        Some(self.present.clone())
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn present(&self) -> &T {
        &self.present
    }

    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone + Default> HistoryStack<T> {
    /// Drop everything and reset the present to an empty document set.
    pub fn clear(&mut self) {
        self.init(T::default());
    }
}

impl<T: Clone + Default> Default for HistoryStack<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
