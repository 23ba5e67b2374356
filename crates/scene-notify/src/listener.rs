//! Listener variants.
//!
//! Each channel pairs a matching key (stored in the channel table) with one of these listener
//! types. Listeners are owned by their `Subscription`; channel tables only hold weak references.
use scene_model::{LinkDescriptor, ObjectId, PropertyPath};

pub(crate) type Callback = Box<dyn Fn()>;
pub(crate) type PathCallback = Box<dyn Fn(&PropertyPath)>;
pub(crate) type ObjectCallback = Box<dyn Fn(&ObjectId)>;
pub(crate) type LinkCallback = Box<dyn Fn(&LinkDescriptor)>;

/// Listener without a payload, used by flag-triggered channels and by channels keyed by object.
pub(crate) struct NotifyListener {
    callback: Callback,
}

impl NotifyListener {
    pub(crate) fn new(callback: impl Fn() + 'static) -> NotifyListener {
        NotifyListener {
            callback: Box::new(callback),
        }
    }

    pub(crate) fn call(&self) {
        (self.callback)()
    }
}

/// Listener on exactly one property path.
pub(crate) struct ValueListener {
    path: PropertyPath,
    callback: Callback,
}

impl ValueListener {
    pub(crate) fn new(path: PropertyPath, callback: impl Fn() + 'static) -> ValueListener {
        ValueListener {
            path,
            callback: Box::new(callback),
        }
    }

    pub(crate) fn path(&self) -> &PropertyPath {
        &self.path
    }

    pub(crate) fn call(&self) {
        (self.callback)()
    }
}

/// Listener on a property path and everything nested under it.
pub(crate) struct ChildrenListener {
    path: PropertyPath,
    callback: PathCallback,
}

impl ChildrenListener {
    pub(crate) fn new(path: PropertyPath, callback: impl Fn(&PropertyPath) + 'static) -> ChildrenListener {
        ChildrenListener {
            path,
            callback: Box::new(callback),
        }
    }

    pub(crate) fn matches(&self, changed: &PropertyPath) -> bool {
        self.path.contains(changed)
    }

    pub(crate) fn call(&self, changed: &PropertyPath) {
        (self.callback)(changed)
    }
}

/// Listener on a property name, on any object. The name is the channel key.
pub(crate) struct PropertyListener {
    callback: PathCallback,
}

impl PropertyListener {
    pub(crate) fn new(callback: impl Fn(&PropertyPath) + 'static) -> PropertyListener {
        PropertyListener {
            callback: Box::new(callback),
        }
    }

    pub(crate) fn call(&self, changed: &PropertyPath) {
        (self.callback)(changed)
    }
}

pub(crate) struct ObjectLifecycleListener {
    on_creation: ObjectCallback,
    on_deletion: ObjectCallback,
}

impl ObjectLifecycleListener {
    pub(crate) fn new(
        on_creation: impl Fn(&ObjectId) + 'static,
        on_deletion: impl Fn(&ObjectId) + 'static,
    ) -> ObjectLifecycleListener {
        ObjectLifecycleListener {
            on_creation: Box::new(on_creation),
            on_deletion: Box::new(on_deletion),
        }
    }

    pub(crate) fn on_creation(&self, object: &ObjectId) {
        (self.on_creation)(object)
    }

    pub(crate) fn on_deletion(&self, object: &ObjectId) {
        (self.on_deletion)(object)
    }
}

pub(crate) struct LinkLifecycleListener {
    on_creation: LinkCallback,
    on_deletion: LinkCallback,
}

impl LinkLifecycleListener {
    pub(crate) fn new(
        on_creation: impl Fn(&LinkDescriptor) + 'static,
        on_deletion: impl Fn(&LinkDescriptor) + 'static,
    ) -> LinkLifecycleListener {
        LinkLifecycleListener {
            on_creation: Box::new(on_creation),
            on_deletion: Box::new(on_deletion),
        }
    }

    pub(crate) fn on_creation(&self, link: &LinkDescriptor) {
        (self.on_creation)(link)
    }

    pub(crate) fn on_deletion(&self, link: &LinkDescriptor) {
        (self.on_deletion)(link)
    }
}

/// Listener on link validity changes.
pub(crate) struct LinkListener {
    callback: LinkCallback,
}

impl LinkListener {
    pub(crate) fn new(callback: impl Fn(&LinkDescriptor) + 'static) -> LinkListener {
        LinkListener {
            callback: Box::new(callback),
        }
    }

    pub(crate) fn call(&self, link: &LinkDescriptor) {
        (self.callback)(link)
    }
}
