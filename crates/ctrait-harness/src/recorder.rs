#![forbid(unsafe_code)]

//! Recording notifiers.

use std::cell::RefCell;
use std::rc::Rc;

use ctrait_core::{ChangeEvent, Notifier, TraitError, Value};

/// One observed change.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedChange {
    pub class: String,
    pub name: String,
    pub old: Value,
    pub new: Value,
}

impl RecordedChange {
    fn from_event(event: &ChangeEvent<'_>) -> Self {
        Self {
            class: event.host.type_name().to_owned(),
            name: event.name.to_owned(),
            old: event.old.clone(),
            new: event.new.clone(),
        }
    }
}

/// Shared log of changes. Every notifier handed out by
/// [`notifier`](Self::notifier) appends to the same log.
#[derive(Clone, Default)]
pub struct ChangeRecorder {
    log: Rc<RefCell<Vec<RecordedChange>>>,
}

impl ChangeRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notifier(&self) -> Notifier {
        let log = Rc::clone(&self.log);
        Notifier::new(move |event| {
            log.borrow_mut().push(RecordedChange::from_event(event));
            Ok(())
        })
    }

    #[must_use]
    pub fn changes(&self) -> Vec<RecordedChange> {
        self.log.borrow().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<RecordedChange> {
        self.log.borrow().last().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    /// Attribute names in notification order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.log.borrow().iter().map(|c| c.name.clone()).collect()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

/// A notifier that always fails with a user error carrying `message`.
#[must_use]
pub fn failing_notifier(message: &str) -> Notifier {
    let message = message.to_owned();
    Notifier::new(move |_| Err(TraitError::user(message.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn clones_share_one_log() {
        let recorder = ChangeRecorder::new();
        let host = fixtures::counter_host().unwrap();
        host.on_any_trait_change(recorder.notifier());
        host.on_any_trait_change(recorder.clone().notifier());
        host.set("n", 3).unwrap();
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.names(), ["n", "n"]);
        let last = recorder.last().unwrap();
        assert_eq!((last.old, last.new), (Value::Int(0), Value::Int(3)));
        assert_eq!(last.class, "Counter");
    }
}
