#![forbid(unsafe_code)]

//! Construction sequence.

use std::rc::Rc;

use crate::error::Result;
use crate::flags::HostFlags;
use crate::host::Host;
use crate::value::Value;

impl Host {
    /// Run the construction sequence on a freshly allocated host.
    ///
    /// Listener hooks run only for classes that declare listeners; keyword
    /// arguments are applied as ordinary writes in iteration order. The host
    /// is marked initialized last.
    ///
    /// # Errors
    ///
    /// The first failing hook or write aborts construction.
    pub fn init<K: AsRef<str>>(&self, kwargs: impl IntoIterator<Item = (K, Value)>) -> Result<()> {
        let behavior = Rc::clone(self.class().behavior());
        let listeners = self.class().has_listeners();
        if listeners {
            behavior.init_trait_listeners(self)?;
        }
        behavior.init_trait_observers(self)?;
        for (name, value) in kwargs {
            self.set(name.as_ref(), value)?;
        }
        if listeners {
            behavior.post_init_trait_listeners(self)?;
        }
        behavior.post_init_trait_observers(self)?;
        behavior.traits_init(self)?;
        self.set_traits_inited();
        Ok(())
    }

    /// Whether construction completed.
    #[must_use]
    pub fn traits_inited(&self) -> bool {
        self.flags().contains(HostFlags::INITED)
    }

    pub fn set_traits_inited(&self) {
        self.toggle(HostFlags::INITED, true);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::class::{HostBehavior, HostClass};
    use crate::descriptor::{TraitDescriptor, TraitKind};
    use crate::error::TraitError;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
        fail_traits_init: bool,
    }

    impl Recorder {
        fn push(&self, call: &str) {
            self.calls.borrow_mut().push(call.to_owned());
        }
    }

    impl HostBehavior for Recorder {
        fn init_trait_listeners(&self, _host: &Host) -> Result<()> {
            self.push("init_listeners");
            Ok(())
        }

        fn post_init_trait_listeners(&self, _host: &Host) -> Result<()> {
            self.push("post_init_listeners");
            Ok(())
        }

        fn init_trait_observers(&self, _host: &Host) -> Result<()> {
            self.push("init_observers");
            Ok(())
        }

        fn post_init_trait_observers(&self, host: &Host) -> Result<()> {
            let value = host.get("a")?;
            self.push(&format!("post_init_observers a={}", value.repr()));
            Ok(())
        }

        fn traits_init(&self, host: &Host) -> Result<()> {
            self.push(&format!("traits_init inited={}", host.traits_inited()));
            if self.fail_traits_init {
                return Err(TraitError::user("traits_init failed"));
            }
            Ok(())
        }
    }

    fn build(recorder: &Rc<Recorder>, listeners: bool) -> Rc<HostClass> {
        HostClass::builder("Widget")
            .trait_("a", TraitDescriptor::new(TraitKind::Python))
            .listeners(listeners)
            .behavior(Rc::clone(recorder) as Rc<dyn HostBehavior>)
            .build()
    }

    #[test]
    fn hooks_run_in_order() {
        let recorder = Rc::new(Recorder::default());
        let host = Host::new(&build(&recorder, true), [("a", Value::Int(1))]).unwrap();
        assert_eq!(
            *recorder.calls.borrow(),
            [
                "init_listeners",
                "init_observers",
                "post_init_listeners",
                "post_init_observers a=1",
                "traits_init inited=false",
            ]
        );
        assert!(host.traits_inited());
    }

    #[test]
    fn listener_hooks_skipped_without_listeners() {
        let recorder = Rc::new(Recorder::default());
        Host::new(&build(&recorder, false), [("a", Value::Int(2))]).unwrap();
        assert_eq!(recorder.calls.borrow().len(), 3);
        assert_eq!(recorder.calls.borrow()[0], "init_observers");
    }

    #[test]
    fn failing_hook_aborts_before_inited() {
        let recorder = Rc::new(Recorder {
            fail_traits_init: true,
            ..Recorder::default()
        });
        let class = build(&recorder, false);
        let host = Host::alloc(&class).unwrap();
        let err = host.init([("a", Value::Int(3))]).unwrap_err();
        assert_eq!(err.to_string(), "traits_init failed");
        assert!(!host.traits_inited());
        assert_eq!(host.get("a").unwrap(), Value::Int(3));
    }
}
