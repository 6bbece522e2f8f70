#![forbid(unsafe_code)]

//! Change-notification dispatch.
//!
//! # Design
//!
//! Every successful mutation path ends in [`call_notifiers`]: the
//! descriptor-scoped notifiers run first, then the host-scoped ones, each
//! receiving the same [`ChangeEvent`].
//!
//! # Invariants
//!
//! 1. A host with notifications suppressed runs no callbacks.
//! 2. Both lists are snapshotted before the first callback, so a callback
//!    that adds or removes notifiers does not affect the current round.
//! 3. Before each callback, if the new value is a host with veto set,
//!    dispatch stops; the stored value is untouched.
//! 4. The first failing callback aborts the round; side effects of earlier
//!    callbacks remain.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::descriptor::TraitDescriptor;
use crate::error::Result;
use crate::flags::HostFlags;
use crate::host::Host;
use crate::value::Value;

/// Arguments shared by every callback of one dispatch round.
#[derive(Debug)]
pub struct ChangeEvent<'a> {
    pub host: &'a Host,
    pub name: &'a str,
    pub old: &'a Value,
    pub new: &'a Value,
}

type NotifyFn = dyn Fn(&ChangeEvent<'_>) -> Result<()>;

/// A change callback. Clones share identity, which is what removal uses.
#[derive(Clone)]
pub struct Notifier {
    inner: Rc<NotifyFn>,
}

impl Notifier {
    pub fn new(callback: impl Fn(&ChangeEvent<'_>) -> Result<()> + 'static) -> Self {
        Self {
            inner: Rc::new(callback),
        }
    }

    /// # Errors
    ///
    /// Propagates the callback's failure.
    pub fn call(&self, event: &ChangeEvent<'_>) -> Result<()> {
        (self.inner)(event)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Notifier) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Notifier({:p})", Rc::as_ptr(&self.inner).cast::<()>())
    }
}

/// Wrapper that, when installed, receives every notifier invocation.
pub type NotificationHook = Rc<dyn Fn(&Notifier, &ChangeEvent<'_>) -> Result<()>>;

/// Lazily created notifier list.
#[derive(Default)]
pub(crate) struct NotifierList {
    list: RefCell<Option<Vec<Notifier>>>,
}

impl NotifierList {
    pub(crate) fn snapshot(&self) -> Vec<Notifier> {
        self.list.borrow().as_ref().map(Vec::clone).unwrap_or_default()
    }

    pub(crate) fn has_any(&self) -> bool {
        self.list.borrow().as_ref().is_some_and(|l| !l.is_empty())
    }

    /// Whether the list has been created (possibly empty).
    pub(crate) fn exists(&self) -> bool {
        self.list.borrow().is_some()
    }

    pub(crate) fn ensure(&self) {
        self.list.borrow_mut().get_or_insert_with(Vec::new);
    }

    pub(crate) fn push(&self, notifier: Notifier) {
        self.list
            .borrow_mut()
            .get_or_insert_with(Vec::new)
            .push(notifier);
    }

    pub(crate) fn remove(&self, notifier: &Notifier) -> bool {
        let mut list = self.list.borrow_mut();
        let Some(items) = list.as_mut() else {
            return false;
        };
        match items.iter().position(|n| n.ptr_eq(notifier)) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replace this list by an independent copy of `source`.
    pub(crate) fn copy_from(&self, source: &NotifierList) {
        let copy = source.list.borrow().clone();
        *self.list.borrow_mut() = copy;
    }

    pub(crate) fn clear(&self) {
        self.list.borrow_mut().take();
    }
}

/// Run the notifiers of `descriptor` and then those of `host`.
///
/// # Errors
///
/// The first callback failure is returned; remaining callbacks do not run.
pub(crate) fn call_notifiers(
    descriptor: &TraitDescriptor,
    host: &Host,
    name: &str,
    old: &Value,
    new: &Value,
) -> Result<()> {
    if host.flags().contains(HostFlags::NO_NOTIFY) {
        return Ok(());
    }
    let mut all = descriptor.notifier_snapshot();
    all.extend(host.notifier_snapshot());
    if all.is_empty() {
        return Ok(());
    }

    let event = ChangeEvent {
        host,
        name,
        old,
        new,
    };
    let hook = host.context().notification_handler();
    for (index, notifier) in all.iter().enumerate() {
        if let Value::Host(target) = new
            && target.flags().contains(HostFlags::VETO_NOTIFY)
        {
            tracing::trace!(
                message = "ctrait.notify.veto",
                name,
                skipped = all.len() - index
            );
            break;
        }
        match &hook {
            Some(hook) => hook(notifier, &event)?,
            None => notifier.call(&event)?,
        }
    }
    tracing::trace!(message = "ctrait.notify", name, count = all.len());
    Ok(())
}
