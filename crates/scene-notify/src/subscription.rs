use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Owning handle to one or more registered listeners.
///
/// Dropping the subscription deregisters its listeners. A subscription is either empty, a single
/// listener, or a composite of child subscriptions that are all dropped together.
///
/// Subscriptions hold the only strong reference to their listener: the dispatcher stops seeing a
/// listener as soon as its subscription is gone, even in the middle of a dispatch.
#[must_use = "dropping a subscription deregisters its listener"]
pub struct Subscription {
    state: State,
}

enum State {
    Empty,
    Single {
        // Dropped after `deregister` has run.
        _listener: Rc<dyn Any>,
        deregister: Option<Box<dyn FnOnce()>>,
    },
    Composite(Vec<Subscription>),
}

impl Subscription {
    pub(crate) fn new(listener: Rc<dyn Any>, deregister: impl FnOnce() + 'static) -> Subscription {
        Subscription {
            state: State::Single {
                _listener: listener,
                deregister: Some(Box::new(deregister)),
            },
        }
    }

    /// Creates a subscription that holds nothing.
    pub fn empty() -> Subscription {
        Subscription { state: State::Empty }
    }

    /// Creates a subscription that owns all of `children`.
    pub fn composite(children: Vec<Subscription>) -> Subscription {
        Subscription {
            state: State::Composite(children),
        }
    }

    /// Adds `child` to this subscription, turning it into a composite if necessary.
    pub fn push(&mut self, child: Subscription) {
        match &mut self.state {
            State::Empty => *self = child,
            State::Composite(children) => children.push(child),
            State::Single { .. } => {
                let this = std::mem::take(self);
                *self = Subscription::composite(vec![this, child]);
            }
        }
    }

    /// Whether this subscription holds no listener.
    pub fn is_empty(&self) -> bool {
        match &self.state {
            State::Empty => true,
            State::Single { .. } => false,
            State::Composite(children) => children.iter().all(Subscription::is_empty),
        }
    }

    /// Deregisters the listeners now. Same as dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Default for Subscription {
    fn default() -> Self {
        Subscription::empty()
    }
}

impl FromIterator<Subscription> for Subscription {
    fn from_iter<T: IntoIterator<Item = Subscription>>(iter: T) -> Self {
        Subscription::composite(iter.into_iter().collect())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let State::Single { deregister, .. } = &mut self.state {
            if let Some(deregister) = deregister.take() {
                deregister();
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Empty => f.write_str("Subscription(empty)"),
            State::Single { .. } => f.write_str("Subscription(single)"),
            State::Composite(children) => f.debug_tuple("Subscription").field(children).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counted(counter: &Rc<Cell<u32>>) -> Subscription {
        let counter = counter.clone();
        Subscription::new(Rc::new(()), move || counter.set(counter.get() + 1))
    }

    #[test]
    fn drop_deregisters_once() {
        let counter = Rc::new(Cell::new(0));
        let sub = counted(&counter);
        let moved = sub;
        assert_eq!(counter.get(), 0);
        drop(moved);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn empty_is_noop() {
        let sub = Subscription::default();
        assert!(sub.is_empty());
        drop(sub);
    }

    #[test]
    fn composite_releases_all_children() {
        let counter = Rc::new(Cell::new(0));
        let sub: Subscription = (0..3).map(|_| counted(&counter)).collect();
        assert!(!sub.is_empty());
        sub.unsubscribe();
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn push_turns_into_composite() {
        let counter = Rc::new(Cell::new(0));
        let mut sub = Subscription::empty();
        sub.push(counted(&counter));
        sub.push(counted(&counter));
        sub.push(Subscription::empty());
        assert_eq!(counter.get(), 0);
        drop(sub);
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn listener_outlives_deregistration() {
        let listener = Rc::new(5u32);
        let weak = Rc::downgrade(&listener);
        let observed = Rc::new(Cell::new(false));
        let sub = {
            let weak = weak.clone();
            let observed = observed.clone();
            Subscription::new(listener, move || observed.set(weak.upgrade().is_some()))
        };
        drop(sub);
        assert!(observed.get());
        assert!(weak.upgrade().is_none());
    }
}
