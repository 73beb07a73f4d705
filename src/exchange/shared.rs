//! Live exchangeable object behind a single lock.
//!
//! [`SharedObject`] is the handle both the application and the coordinator
//! hold. Every mutation, whether a local edit through [`SharedObject::update`]
//! or an inbound apply through [`SharedObject::apply_remote`], runs inside
//! the same mutex, and so does the change notification. The suppress-echo
//! flag lives under that mutex too: while it is set, change hooks are not
//! invoked, so an applied remote update never looks like a local edit.
//!
//! Hooks run while the lock is held. A hook must not call back into the
//! same `SharedObject`.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::exchange::object::{copy_fields, ExchangeObject};
use crate::Result;

/// Change notification callback: receives the object name and the new state.
pub type ChangeHook<T> = Arc<dyn Fn(&str, &T) + Send + Sync>;

/// Identifier returned by [`SharedObject::subscribe`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct HookId(u64);

struct ObjectCell<T> {
    value: T,
    suppress_echo: bool,
    hooks: Vec<(HookId, ChangeHook<T>)>,
    next_hook: u64,
}

impl<T: ExchangeObject> ObjectCell<T> {
    fn notify(&self) {
        if self.suppress_echo {
            trace!(
                object = self.value.object_name(),
                "change notification suppressed"
            );
            return;
        }
        let name = self.value.object_name();
        for (_, hook) in &self.hooks {
            hook(name, &self.value);
        }
    }
}

/// Cloneable handle to the live exchangeable object.
pub struct SharedObject<T> {
    cell: Arc<Mutex<ObjectCell<T>>>,
}

impl<T> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Debug> Debug for SharedObject<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let cell = self.lock();
        f.debug_struct("SharedObject")
            .field("value", &cell.value)
            .field("suppress_echo", &cell.suppress_echo)
            .field("hooks", &cell.hooks.len())
            .finish()
    }
}

impl<T> SharedObject<T> {
    fn lock(&self) -> MutexGuard<'_, ObjectCell<T>> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether two handles refer to the same live object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: ExchangeObject> SharedObject<T> {
    /// Wrap an object for exchange.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(Mutex::new(ObjectCell {
                value,
                suppress_echo: false,
                hooks: Vec::new(),
                next_hook: 0,
            })),
        }
    }

    /// Mutate the object through its public setters and raise the change
    /// notification.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut T) -> R) -> R {
        let mut cell = self.lock();
        let out = mutate(&mut cell.value);
        cell.notify();
        out
    }

    /// Read the object without raising a notification.
    pub fn read<R>(&self, inspect: impl FnOnce(&T) -> R) -> R {
        let cell = self.lock();
        inspect(&cell.value)
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.lock().value.clone()
    }

    /// Name of the wrapped object.
    #[must_use]
    pub fn object_name(&self) -> String {
        self.lock().value.object_name().to_owned()
    }

    /// Register a change hook.
    pub fn subscribe(&self, hook: impl Fn(&str, &T) + Send + Sync + 'static) -> HookId {
        let mut cell = self.lock();
        let id = HookId(cell.next_hook);
        cell.next_hook += 1;
        cell.hooks.push((id, Arc::new(hook)));
        id
    }

    /// Remove a change hook. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: HookId) -> bool {
        let mut cell = self.lock();
        let before = cell.hooks.len();
        cell.hooks.retain(|(hook_id, _)| *hook_id != id);
        cell.hooks.len() != before
    }

    /// Number of registered change hooks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().hooks.len()
    }

    /// Copy every field of a decoded transient object onto the live object
    /// with change hooks suppressed.
    ///
    /// The copy is all-or-nothing: on error the live object is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sync` if a field setter rejects a value.
    pub fn apply_remote(&self, transient: &T) -> Result<()> {
        self.apply_remote_if(transient, || true).map(|_| ())
    }

    /// Like [`apply_remote`](Self::apply_remote), but only if `admit`
    /// returns `true` once the lock is held.
    ///
    /// Returns `Ok(false)` when the update was not admitted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sync` if a field setter rejects a value.
    pub fn apply_remote_if(&self, transient: &T, admit: impl FnOnce() -> bool) -> Result<bool> {
        let mut cell = self.lock();
        if !admit() {
            return Ok(false);
        }
        cell.suppress_echo = true;
        let mut next = cell.value.clone();
        let copied = copy_fields(transient, &mut next);
        if copied.is_ok() {
            cell.value = next;
            cell.notify();
        }
        cell.suppress_echo = false;
        copied.map(|()| true)
    }
}
