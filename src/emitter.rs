//! In-process change signalling, one channel per collection kind.
//!
//! A signal carries no payload: listeners re-read the collection they care about.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::Kind;

pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct Emitter {
    next: AtomicU64,
    listeners: Mutex<HashMap<Kind, Vec<(u64, Listener)>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&self, kind: Kind, listener: Listener) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    pub fn forget(&self, kind: Kind, id: u64) {
        if let Some(listeners) = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&kind)
        {
            listeners.retain(|(existing, _)| *existing != id);
        }
    }

    /**
     * Fire every listener of `kind`. The registry lock is released before
     * listeners run so they are free to write and trigger further signals
     */
    pub fn notify(&self, kind: Kind) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener();
        }
    }

    #[cfg(test)]
    pub fn listener_count(&self, kind: Kind) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}
