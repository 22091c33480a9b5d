//! Listener registries for selection / content / error notifications.
//!
//! Everything here is single-threaded: callbacks are boxed `FnMut` closures
//! shared through `Rc<RefCell<_>>`. A callback may unsubscribe itself (or any
//! other listener of the same set) while it is being dispatched.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

type Callback<T> = Box<dyn FnMut(&T) + 'static>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
    /// Ids detached while `entries` was taken out for dispatch.
    detached_during_dispatch: HashSet<u64>,
    dispatching: bool,
}

trait Detach {
    fn detach(&mut self, id: u64);
}

impl<T> Detach for Registry<T> {
    fn detach(&mut self, id: u64) {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        if self.dispatching && self.entries.len() == before {
            self.detached_during_dispatch.insert(id);
        }
    }
}

/// An ordered set of callbacks receiving `&T`.
pub struct ListenerSet<T> {
    inner: Rc<RefCell<Registry<T>>>,
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
                detached_during_dispatch: HashSet::new(),
                dispatching: false,
            })),
        }
    }

    /// Register a callback; the returned handle removes it again.
    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        let mut registry = self.inner.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Box::new(callback)));

        let weak: Weak<RefCell<Registry<T>>> = Rc::downgrade(&self.inner);
        let registry: Weak<RefCell<dyn Detach>> = weak;
        Subscription { id, registry }
    }

    /// Invoke every callback in registration order.
    pub fn emit(&self, value: &T) {
        let mut entries = {
            let mut registry = self.inner.borrow_mut();
            if registry.dispatching {
                // Nested emit from inside a callback of this same set.
                log::debug!("dropping re-entrant notification");
                return;
            }
            registry.dispatching = true;
            std::mem::take(&mut registry.entries)
        };

        for (id, callback) in entries.iter_mut() {
            if self.inner.borrow().detached_during_dispatch.contains(id) {
                continue;
            }
            callback(value);
        }

        let mut registry = self.inner.borrow_mut();
        let added = std::mem::take(&mut registry.entries);
        let detached = std::mem::take(&mut registry.detached_during_dispatch);
        entries.extend(added);
        entries.retain(|(id, _)| !detached.contains(id));
        registry.entries = entries;
        registry.dispatching = false;
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every callback.
    pub fn clear(&self) {
        let mut registry = self.inner.borrow_mut();
        if registry.dispatching {
            let ids: Vec<u64> = (0..registry.next_id).collect();
            registry.detached_during_dispatch.extend(ids);
        }
        registry.entries.clear();
    }
}

impl<T: 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`. Dropping it leaves the listener attached;
/// call [`Subscription::unsubscribe`] to detach.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<dyn Detach>>,
}

impl Subscription {
    /// Detach the listener. A no-op once the owning set is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            match registry.try_borrow_mut() {
                Ok(mut registry) => registry.detach(self.id),
                Err(_) => log::warn!("listener registry busy, unsubscribe ignored"),
            }
        }
    }

    /// Whether the owning set still exists.
    pub fn is_attached(&self) -> bool {
        self.registry.strong_count() > 0
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
