//! View-change notifications over `event-emitter-rs`.
//!
//! Listeners run on emitter threads, so they observe changes shortly after
//! the write rather than inside it.

use std::sync::Mutex;

use event_emitter_rs::EventEmitter;
use serde::{Deserialize, Serialize};

use super::state::ViewKind;

/// Event name every view change is emitted under.
pub const VIEW_CHANGED: &str = "view_changed";

/// A view was replaced (or cleared) and now holds `len` requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChange {
    pub view: ViewKind,
    pub len: usize,
}

pub(crate) struct ViewEmitter {
    emitter: Mutex<EventEmitter>,
}

impl ViewEmitter {
    pub fn new() -> Self {
        Self {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    fn emitter(&self) -> std::sync::MutexGuard<'_, EventEmitter> {
        self.emitter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a listener; returns its id for `remove`.
    pub fn on<F>(&self, listener: F) -> String
    where
        F: Fn(ViewChange) + Send + Sync + 'static,
    {
        self.emitter().on(VIEW_CHANGED, listener)
    }

    pub fn remove(&self, id: &str) -> bool {
        self.emitter().remove_listener(id).is_some()
    }

    pub fn emit(&self, view: ViewKind, len: usize) {
        self.emitter().emit(VIEW_CHANGED, ViewChange { view, len });
    }
}
