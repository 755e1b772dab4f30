//! Generic multi-subscriber callback dispatch.
//!
//! A [`Manager`] owns a set of [`Callback`] handles and fans each
//! payload out to every enabled handle. Handlers run serially on the
//! calling thread, so anything that may block should hand off to its
//! own executor.
//!
//! Registration modes:
//!
//! - [`Manager::recurring`] — fires on every call until deregistered.
//! - [`Manager::once`] — disables itself after the first invocation.
//! - [`Manager::sleep_until_disabled`] — registers, then blocks the
//!   calling thread until the handle is disabled. Used for
//!   request-response correlation inside otherwise asynchronous
//!   streams; the handler decides when its deadline has passed and
//!   disables the handle.
//!
//! # Example
//!
//! ```
//! use kraken_events::Manager;
//!
//! let manager: Manager<u32> = Manager::new();
//! manager.once(|event| println!("first: {}", event.data));
//! manager.call(&1);
//! manager.call(&2); // the once-handle no longer fires
//! ```

use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One registered subscription.
pub struct Callback<T> {
    action: Box<dyn Fn(&Event<'_, T>) + Send + Sync>,
    enabled: AtomicBool,
}

impl<T> Callback<T> {
    fn new<F>(action: F) -> Arc<Self>
    where
        F: Fn(&Event<'_, T>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            action: Box::new(action),
            enabled: AtomicBool::new(true),
        })
    }

    /// Whether the handle still receives events.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stops the handle from receiving further events. It is removed
    /// from its manager on the next fan-out.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn call(&self, data: &T) {
        (self.action)(&Event {
            data,
            callback: self,
        });
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Payload handed to a handler, with a reference back to its own
/// handle so the handler can disable itself.
pub struct Event<'a, T> {
    /// The dispatched payload.
    pub data: &'a T,
    /// The handle being invoked.
    pub callback: &'a Callback<T>,
}

/// Registry and dispatcher for a set of [`Callback`] handles.
pub struct Manager<T> {
    callbacks: RwLock<Vec<Arc<Callback<T>>>>,
}

impl<T> Default for Manager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Manager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("callbacks", &self.len())
            .finish()
    }
}

impl<T> Manager<T> {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Adds a handle to the registry. Registering the same handle
    /// twice is a no-op.
    pub fn register(&self, callback: Arc<Callback<T>>) -> Arc<Callback<T>> {
        let mut callbacks = self.callbacks.write();
        if !callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            callbacks.push(callback.clone());
        }
        callback
    }

    /// Removes a handle from the registry.
    pub fn deregister(&self, callback: &Arc<Callback<T>>) {
        self.callbacks
            .write()
            .retain(|c| !Arc::ptr_eq(c, callback));
    }

    /// Removes every handle.
    pub fn reset(&self) {
        self.callbacks.write().clear();
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Whether no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Registers a handle that fires on every call until deregistered.
    pub fn recurring<F>(&self, action: F) -> Arc<Callback<T>>
    where
        F: Fn(&Event<'_, T>) + Send + Sync + 'static,
    {
        self.register(Callback::new(action))
    }

    /// Registers a handle that disables itself after the first
    /// invocation; it is compacted away on the next fan-out.
    pub fn once<F>(&self, action: F) -> Arc<Callback<T>>
    where
        F: Fn(&Event<'_, T>) + Send + Sync + 'static,
    {
        self.register(Callback::new(move |event| {
            action(event);
            event.callback.disable();
        }))
    }

    /// Registers a handle and blocks the calling thread until the
    /// handle is disabled — a condition variable with the predicate
    /// "handle disabled". The handler itself decides when to disable,
    /// which is also where a caller-chosen deadline belongs.
    pub fn sleep_until_disabled<F>(&self, action: F) -> Arc<Callback<T>>
    where
        F: Fn(&Event<'_, T>) + Send + Sync + 'static,
    {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&gate);
        let callback = self.register(Callback::new(move |event| {
            action(event);
            if !event.callback.is_enabled() {
                let (done, condvar) = &*signal;
                *done.lock() = true;
                condvar.notify_all();
            }
        }));
        let (done, condvar) = &*gate;
        let mut done = done.lock();
        while !*done {
            condvar.wait(&mut done);
        }
        callback
    }

    /// Fans the payload out to every enabled handle.
    ///
    /// The handle set is snapshotted first, so handlers may register
    /// or deregister re-entrantly; such changes take effect on the
    /// next call. Handles disabled during the fan-out are compacted
    /// afterwards.
    pub fn call(&self, data: &T) {
        let snapshot: Vec<Arc<Callback<T>>> = self.callbacks.read().clone();
        for callback in &snapshot {
            if callback.is_enabled() {
                callback.call(data);
            }
        }
        self.callbacks.write().retain(|c| c.is_enabled());
    }
}
