//! A per-thread convenience [`SelectionManager`] for hosts that want one
//! shared manager without threading it through their own code.
//!
//! It is created on first use and lives until [`reset_global_manager`]
//! destroys it; the next use starts a fresh one.

use std::cell::RefCell;

use super::SelectionManager;

thread_local! {
    static GLOBAL_MANAGER: RefCell<Option<SelectionManager>> = const { RefCell::new(None) };
}

/// Run `f` against this thread's manager, creating it if needed.
///
/// # Panics
///
/// If `f` calls back into `with_global_manager`.
pub fn with_global_manager<R>(f: impl FnOnce(&mut SelectionManager) -> R) -> R {
    GLOBAL_MANAGER.with(|slot| {
        let mut slot = slot.borrow_mut();
        f(slot.get_or_insert_with(SelectionManager::new))
    })
}

/// Destroy this thread's manager and every adapter it holds.
pub fn reset_global_manager() {
    let previous = GLOBAL_MANAGER.with(|slot| slot.borrow_mut().take());
    if let Some(mut manager) = previous {
        manager.destroy();
        log::debug!("global selection manager reset");
    }
}
