/*!
    Registry of live stream bindings.
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::binding::IoBinding;
use crate::handle::StreamHandle;

pub(crate) type SharedBinding = Arc<Mutex<IoBinding>>;

/**
    Shared registry state.

    Callbacks reach this through a `Weak` held in their attachment cell, so
    the map lives as long as the registry or any attached context does.
*/
pub(crate) struct RegistryState {
    entries: RwLock<HashMap<StreamHandle, SharedBinding>>,
    next_handle: AtomicU64,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /**
        Insert a binding under a freshly allocated handle.
    */
    pub(crate) fn bind(&self, binding: IoBinding) -> StreamHandle {
        let handle = StreamHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .insert(handle, Arc::new(Mutex::new(binding)));
        tracing::debug!(%handle, "binding registered");
        handle
    }

    /**
        Look up the binding for a handle.

        The map lock is held only for the lookup itself; the caller locks
        the returned entry before delegating into caller-supplied code.
    */
    pub(crate) fn lookup(&self, handle: StreamHandle) -> Option<SharedBinding> {
        self.entries.read().get(&handle).cloned()
    }

    /**
        Remove the binding for a handle.
    */
    pub(crate) fn remove(&self, handle: StreamHandle) -> Option<SharedBinding> {
        let removed = self.entries.write().remove(&handle);
        if removed.is_some() {
            tracing::debug!(%handle, "binding removed");
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/**
    Registry of live custom I/O bindings, keyed by [`StreamHandle`].

    One registry instance covers however many streams its owner keeps open;
    it is an owned value, not process state. All operations are safe to call
    concurrently — FFmpeg may fire callbacks from threads of its own while
    other handles are being attached or detached.
*/
pub struct IoRegistry {
    pub(crate) state: Arc<RegistryState>,
}

impl IoRegistry {
    /**
        Create an empty registry.
    */
    pub fn new() -> Self {
        Self {
            state: Arc::new(RegistryState::new()),
        }
    }

    /**
        Number of currently attached bindings.
    */
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /**
        Returns true if no bindings are attached.
    */
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /**
        Returns true if `handle` is currently bound.
    */
    pub fn contains(&self, handle: StreamHandle) -> bool {
        self.state.lookup(handle).is_some()
    }

    /**
        Remove the binding for `handle` and hand it back.

        Returns `None` if the handle is not bound (detach is idempotent) or
        if a native callback still holds the entry at this instant; in
        either case the handle resolves to nothing afterwards. Dropping the
        [`crate::IoContext`] detaches automatically, so calling this by hand
        is only needed to reclaim the binding early.
    */
    pub fn detach(&self, handle: StreamHandle) -> Option<IoBinding> {
        self.state
            .remove(handle)
            .and_then(|entry| Arc::try_unwrap(entry).ok())
            .map(Mutex::into_inner)
    }
}

impl Default for IoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoRegistry")
            .field("bindings", &self.len())
            .finish()
    }
}
