//! Change dispatcher.
//!
//! The dispatcher sits between the data model and its consumers. Consumers register listeners on
//! typed channels and receive a `Subscription` in return; the owner of the data model hands the
//! batch of recorded changes to `ChangeDispatcher::dispatch` once per unit of work, which fans
//! it out to the matching listeners in a fixed order:
//!
//! 1. link validity changes
//! 2. removed links
//! 3. created objects
//! 4. changed values (children listeners, property name listeners, then exact path listeners)
//! 5. changed errors
//! 6. dirty previews
//! 7. added links
//! 8. the bulk change callback
//! 9. deleted objects
//! 10. undo changed, if flagged
//! 11. external project changed, if flagged
//! 12. root order changed
//! 13. external project map changed
//! 14. after dispatch
//!
//! Each step works on a copy of the relevant listeners taken at the start of the step. Listeners
//! may register or drop subscriptions from their callbacks: new listeners are only notified from
//! the next step that takes a copy of their table, and dropped listeners are skipped.
use crate::channel::{Channel, Channels, ListenerInfo, ListenerKey, Target};
use crate::diagnostics::ChannelKind;
use crate::listener::{
    ChildrenListener, LinkLifecycleListener, LinkListener, NotifyListener, ObjectLifecycleListener, PropertyListener,
    ValueListener,
};
use crate::{DispatcherConfig, Error, LeakCheck, Subscription};
use scene_model::{
    ChangeRecorder, ChangedObjects, LinkDescriptor, LinksByEndObject, ObjectId, PathsByObject, PropertyPath, SmolStr,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::Location;
use std::rc::{Rc, Weak};
use tracing::{trace, trace_span, warn};

/// Callback receiving the set of all objects changed by a batch.
pub type BulkChangeCallback = dyn Fn(&BTreeSet<ObjectId>);

/// Selects one channel table from the set of tables.
type ChannelMut<K, L> = fn(&mut Channels) -> &mut Channel<K, L>;
type ChannelRef<K, L> = fn(&Channels) -> &Channel<K, L>;

struct DispatcherInner {
    channels: RefCell<Channels>,
    undo_changed: Cell<bool>,
    external_project_changed: Cell<bool>,
    bulk_change_callback: RefCell<Option<Rc<BulkChangeCallback>>>,
    config: DispatcherConfig,
}

impl Drop for DispatcherInner {
    fn drop(&mut self) {
        if self.config.leak_check == LeakCheck::Off {
            return;
        }
        let report = self.channels.get_mut().leak_report();
        if report.is_empty() {
            return;
        }
        warn!("change dispatcher dropped with {report}");
        if self.config.leak_check == LeakCheck::Assert && cfg!(debug_assertions) && !std::thread::panicking() {
            panic!("change dispatcher dropped with {report}");
        }
    }
}

/// Fans out batches of data model changes to registered listeners.
///
/// `ChangeDispatcher` is a handle: clones refer to the same dispatcher. Callbacks can capture a
/// clone to register or deregister listeners while a dispatch is in progress.
///
/// The dispatcher is single-threaded. All callbacks run synchronously on the thread calling
/// `dispatch`.
///
/// # Callback panics
///
/// A panic in a callback propagates out of `dispatch` and the remaining steps of that dispatch
/// are skipped. The dispatcher itself stays consistent: no table is borrowed while a callback runs,
/// and the undo / external project flags are cleared before their listeners are called.
#[derive(Clone)]
pub struct ChangeDispatcher {
    inner: Rc<DispatcherInner>,
}

impl Default for ChangeDispatcher {
    fn default() -> Self {
        ChangeDispatcher::new()
    }
}

impl fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("listeners", &self.listener_count())
            .field("undo_changed", &self.inner.undo_changed.get())
            .field("external_project_changed", &self.inner.external_project_changed.get())
            .finish_non_exhaustive()
    }
}

impl ChangeDispatcher {
    pub fn new() -> ChangeDispatcher {
        ChangeDispatcher::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> ChangeDispatcher {
        ChangeDispatcher {
            inner: Rc::new(DispatcherInner {
                channels: RefCell::new(Channels::default()),
                undo_changed: Cell::new(false),
                external_project_changed: Cell::new(false),
                bulk_change_callback: RefCell::new(None),
                config,
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Inserts a listener in a channel table and returns the subscription owning it.
    fn register<K, L>(
        &self,
        kind: ChannelKind,
        key: K,
        listener: L,
        channel: ChannelMut<K, L>,
        location: &'static Location<'static>,
    ) -> Subscription
    where
        K: Ord + Clone + 'static,
        L: 'static,
    {
        let listener = Rc::new(listener);
        let listener_key = {
            let mut channels = self.inner.channels.borrow_mut();
            let listener_key = channels.registry.insert(ListenerInfo { channel: kind, location });
            channel(&mut *channels).insert(key.clone(), listener_key, &listener);
            listener_key
        };

        let dispatcher = Rc::downgrade(&self.inner);
        Subscription::new(listener, move || {
            // nothing to clean up if the dispatcher is already gone
            let Some(inner) = dispatcher.upgrade() else {
                return;
            };
            let mut channels = inner.channels.borrow_mut();
            channel(&mut *channels).remove(&key, listener_key);
            channels.registry.remove(listener_key);
        })
    }

    /// Registers a callback invoked when exactly `path` changes.
    ///
    /// The callback is invoked at most once per dispatch, after all children and property name
    /// listeners of the batch.
    #[track_caller]
    pub fn register_on(&self, path: PropertyPath, callback: impl Fn() + 'static) -> Subscription {
        let object = path.object_id().clone();
        self.register(
            ChannelKind::Value,
            object,
            ValueListener::new(path, callback),
            |c| &mut c.values,
            Location::caller(),
        )
    }

    /// Registers a callback on several subtrees at once (see `register_on_children`).
    ///
    /// Returns a composite subscription covering all paths.
    #[track_caller]
    pub fn register_on_paths(
        &self,
        paths: impl IntoIterator<Item = PropertyPath>,
        callback: impl Fn(&PropertyPath) + 'static,
    ) -> Subscription {
        let location = Location::caller();
        let callback: Rc<dyn Fn(&PropertyPath)> = Rc::new(callback);
        paths
            .into_iter()
            .map(|path| {
                let callback = callback.clone();
                self.register_children(path, move |changed| callback(changed), location)
            })
            .collect()
    }

    /// Registers a callback invoked when `path` or any property nested under it changes.
    ///
    /// The callback receives the changed path, once for every matching path in the batch.
    #[track_caller]
    pub fn register_on_children(
        &self,
        path: PropertyPath,
        callback: impl Fn(&PropertyPath) + 'static,
    ) -> Subscription {
        self.register_children(path, callback, Location::caller())
    }

    fn register_children(
        &self,
        path: PropertyPath,
        callback: impl Fn(&PropertyPath) + 'static,
        location: &'static Location<'static>,
    ) -> Subscription {
        let object = path.object_id().clone();
        self.register(
            ChannelKind::Children,
            object,
            ChildrenListener::new(path, callback),
            |c| &mut c.children,
            location,
        )
    }

    /// Registers a callback invoked when a property named `property_name` changes, on any object.
    #[track_caller]
    pub fn register_on_property_change(
        &self,
        property_name: impl Into<SmolStr>,
        callback: impl Fn(&PropertyPath) + 'static,
    ) -> Subscription {
        self.register(
            ChannelKind::PropertyName,
            property_name.into(),
            PropertyListener::new(callback),
            |c| &mut c.property_names,
            Location::caller(),
        )
    }

    /// Registers callbacks invoked once per created and deleted object, in batch order.
    #[track_caller]
    pub fn register_on_objects_lifecycle(
        &self,
        on_creation: impl Fn(&ObjectId) + 'static,
        on_deletion: impl Fn(&ObjectId) + 'static,
    ) -> Subscription {
        self.register(
            ChannelKind::ObjectLifecycle,
            (),
            ObjectLifecycleListener::new(on_creation, on_deletion),
            |c| &mut c.object_lifecycle,
            Location::caller(),
        )
    }

    /// Registers callbacks invoked once per added and removed link.
    #[track_caller]
    pub fn register_on_links_lifecycle(
        &self,
        on_creation: impl Fn(&LinkDescriptor) + 'static,
        on_deletion: impl Fn(&LinkDescriptor) + 'static,
    ) -> Subscription {
        self.register(
            ChannelKind::LinkLifecycle,
            (),
            LinkLifecycleListener::new(on_creation, on_deletion),
            |c| &mut c.link_lifecycle,
            Location::caller(),
        )
    }

    /// Same as `register_on_links_lifecycle`, restricted to links ending on `end_object`.
    #[track_caller]
    pub fn register_on_links_lifecycle_for_end(
        &self,
        end_object: ObjectId,
        on_creation: impl Fn(&LinkDescriptor) + 'static,
        on_deletion: impl Fn(&LinkDescriptor) + 'static,
    ) -> Subscription {
        self.register(
            ChannelKind::LinkLifecycleForEnd,
            end_object,
            LinkLifecycleListener::new(on_creation, on_deletion),
            |c| &mut c.link_lifecycle_for_end,
            Location::caller(),
        )
    }

    /// Same as `register_on_links_lifecycle`, restricted to links starting on `start_object`.
    #[track_caller]
    pub fn register_on_links_lifecycle_for_start(
        &self,
        start_object: ObjectId,
        on_creation: impl Fn(&LinkDescriptor) + 'static,
        on_deletion: impl Fn(&LinkDescriptor) + 'static,
    ) -> Subscription {
        self.register(
            ChannelKind::LinkLifecycleForStart,
            start_object,
            LinkLifecycleListener::new(on_creation, on_deletion),
            |c| &mut c.link_lifecycle_for_start,
            Location::caller(),
        )
    }

    /// Registers a callback invoked once per link whose validity changed.
    #[track_caller]
    pub fn register_on_link_validity_change(&self, callback: impl Fn(&LinkDescriptor) + 'static) -> Subscription {
        self.register(
            ChannelKind::LinkValidity,
            (),
            LinkListener::new(callback),
            |c| &mut c.link_validity,
            Location::caller(),
        )
    }

    /// Registers a callback invoked when the error state of exactly `path` changes.
    #[track_caller]
    pub fn register_on_error_changed(&self, path: PropertyPath, callback: impl Fn() + 'static) -> Subscription {
        let object = path.object_id().clone();
        self.register(
            ChannelKind::ErrorChanged,
            object,
            ValueListener::new(path, callback),
            |c| &mut c.errors,
            Location::caller(),
        )
    }

    /// Registers a callback invoked once per dispatch if any error state changed.
    #[track_caller]
    pub fn register_on_error_changed_in_scene(&self, callback: impl Fn() + 'static) -> Subscription {
        self.register_global(ChannelKind::ErrorChangedInScene, callback, |c| &mut c.errors_in_scene)
    }

    /// Registers a callback invoked when the preview of `object` is marked dirty.
    #[track_caller]
    pub fn register_on_preview_dirty(&self, object: ObjectId, callback: impl Fn() + 'static) -> Subscription {
        self.register(
            ChannelKind::PreviewDirty,
            object,
            NotifyListener::new(callback),
            |c| &mut c.preview_dirty,
            Location::caller(),
        )
    }

    /// Registers a callback invoked by the next dispatch after `set_undo_changed`.
    #[track_caller]
    pub fn register_on_undo_changed(&self, callback: impl Fn() + 'static) -> Subscription {
        self.register_global(ChannelKind::UndoChanged, callback, |c| &mut c.undo_changed)
    }

    /// Registers a callback invoked by the next dispatch after `set_external_project_changed`.
    #[track_caller]
    pub fn register_on_external_project_changed(&self, callback: impl Fn() + 'static) -> Subscription {
        self.register_global(ChannelKind::ExternalProjectChanged, callback, |c| {
            &mut c.external_project_changed
        })
    }

    #[track_caller]
    pub fn register_on_external_project_map_changed(&self, callback: impl Fn() + 'static) -> Subscription {
        self.register_global(ChannelKind::ExternalProjectMapChanged, callback, |c| {
            &mut c.external_project_map_changed
        })
    }

    #[track_caller]
    pub fn register_on_root_order_changed(&self, callback: impl Fn() + 'static) -> Subscription {
        self.register_global(ChannelKind::RootOrderChanged, callback, |c| &mut c.root_order_changed)
    }

    /// Registers a callback invoked at the end of every dispatch, after all other notifications,
    /// whether or not anything changed.
    #[track_caller]
    pub fn register_on_after_dispatch(&self, callback: impl Fn() + 'static) -> Subscription {
        self.register_global(ChannelKind::AfterDispatch, callback, |c| &mut c.after_dispatch)
    }

    #[track_caller]
    fn register_global(
        &self,
        kind: ChannelKind,
        callback: impl Fn() + 'static,
        channel: ChannelMut<(), NotifyListener>,
    ) -> Subscription {
        self.register(kind, (), NotifyListener::new(callback), channel, Location::caller())
    }

    /// Sets the bulk change callback, replacing the previous one.
    ///
    /// The callback is invoked once per dispatch with all objects created, changed or marked
    /// preview-dirty by the batch, after value, error and link notifications and before deletions.
    pub fn register_bulk_change_callback(&self, callback: impl Fn(&BTreeSet<ObjectId>) + 'static) {
        self.inner.bulk_change_callback.replace(Some(Rc::new(callback)));
    }

    pub fn reset_bulk_change_callback(&self) {
        self.inner.bulk_change_callback.replace(None);
    }

    /// Flags the undo stack as changed. The flag is consumed by the next dispatch.
    pub fn set_undo_changed(&self) {
        self.inner.undo_changed.set(true);
    }

    /// Flags an external project as changed. The flag is consumed by the next dispatch.
    pub fn set_external_project_changed(&self) {
        self.inner.external_project_changed.set(true);
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Notifies listeners of all changes in `changes`.
    pub fn dispatch(&self, changes: &ChangeRecorder) {
        let _span = trace_span!("dispatch").entered();

        self.emit_links_validity_changed(changes.validity_changed_links());
        self.emit_link_lifecycle(changes.removed_links(), LinkLifecycleListener::on_deletion);
        self.emit_object_lifecycle(changes.created_objects(), ObjectLifecycleListener::on_creation);
        self.emit_values_changed(changes.changed_values());
        self.emit_errors_changed(changes.changed_errors());
        self.emit_preview_dirty(changes.preview_dirty_objects());
        self.emit_link_lifecycle(changes.added_links(), LinkLifecycleListener::on_creation);
        self.emit_bulk_change(changes);
        self.emit_object_lifecycle(changes.deleted_objects(), ObjectLifecycleListener::on_deletion);

        if self.inner.undo_changed.replace(false) {
            trace!("undo changed");
            self.emit_global(|c| &c.undo_changed);
        }
        if self.inner.external_project_changed.replace(false) {
            trace!("external project changed");
            self.emit_global(|c| &c.external_project_changed);
        }
        if changes.root_order_changed() {
            trace!("root order changed");
            self.emit_global(|c| &c.root_order_changed);
        }
        if changes.external_project_map_changed() {
            trace!("external project map changed");
            self.emit_global(|c| &c.external_project_map_changed);
        }
        self.emit_global(|c| &c.after_dispatch);
    }

    /// Invokes the listeners in `targets` that are still alive.
    fn fire<L>(&self, targets: &[Target<L>], invoke: impl Fn(&L)) {
        for (key, weak) in targets {
            let Some(listener) = weak.upgrade() else {
                continue;
            };
            if self.inner.config.trace_targets {
                if let Some(info) = self.inner.channels.borrow().registry.get(*key) {
                    trace!(channel = %info.channel, "target registered at {}", info.location);
                }
            }
            invoke(&*listener);
        }
    }

    fn emit_global(&self, channel: ChannelRef<(), NotifyListener>) {
        let targets = channel(&self.inner.channels.borrow()).snapshot(&());
        self.fire(&targets, NotifyListener::call);
    }

    fn emit_links_validity_changed(&self, links: &LinksByEndObject) {
        if links.is_empty() {
            return;
        }
        let targets = self.inner.channels.borrow().link_validity.snapshot(&());
        for link in links.values().flatten() {
            trace!(%link, "link validity changed");
            self.fire(&targets, |l| l.call(link));
        }
    }

    fn emit_link_lifecycle(&self, links: &LinksByEndObject, invoke: fn(&LinkLifecycleListener, &LinkDescriptor)) {
        if links.is_empty() {
            return;
        }
        let plan: Vec<(&LinkDescriptor, Vec<Target<LinkLifecycleListener>>)> = {
            let channels = self.inner.channels.borrow();
            let global = channels.link_lifecycle.snapshot(&());
            links
                .values()
                .flatten()
                .map(|link| {
                    let mut targets = global.clone();
                    targets.extend(channels.link_lifecycle_for_end.snapshot(link.end_object()));
                    targets.extend(channels.link_lifecycle_for_start.snapshot(link.start_object()));
                    (link, targets)
                })
                .collect()
        };
        for (link, targets) in plan.iter() {
            trace!(%link, "link lifecycle");
            self.fire(targets, |l| invoke(l, link));
        }
    }

    fn emit_object_lifecycle<'a>(
        &self,
        objects: impl IntoIterator<Item = &'a ObjectId>,
        invoke: fn(&ObjectLifecycleListener, &ObjectId),
    ) {
        let mut objects = objects.into_iter().peekable();
        if objects.peek().is_none() {
            return;
        }
        let targets = self.inner.channels.borrow().object_lifecycle.snapshot(&());
        for object in objects {
            trace!(%object, "object lifecycle");
            self.fire(&targets, |l| invoke(l, object));
        }
    }

    fn emit_values_changed(&self, changed: &PathsByObject) {
        struct PathTargets<'a> {
            path: &'a PropertyPath,
            children: Vec<Target<ChildrenListener>>,
            properties: Vec<Target<PropertyListener>>,
        }

        if changed.is_empty() {
            return;
        }

        // Exact path listeners are collected over the whole batch so that each fires only once.
        let (plan, exact) = {
            let channels = self.inner.channels.borrow();
            let mut plan = Vec::new();
            let mut exact: BTreeMap<ListenerKey, Weak<ValueListener>> = BTreeMap::new();
            for (object, paths) in changed.iter() {
                let values = channels.values.snapshot(object);
                let children = channels.children.snapshot(object);
                for path in paths.iter() {
                    for (key, weak) in values.iter() {
                        if weak.upgrade().is_some_and(|l| l.path() == path) {
                            exact.insert(*key, weak.clone());
                        }
                    }
                    let children = children
                        .iter()
                        .filter(|(_, weak)| weak.upgrade().is_some_and(|l| l.matches(path)))
                        .cloned()
                        .collect();
                    let properties = match path.property_name() {
                        Some(name) => channels.property_names.snapshot(name),
                        None => Vec::new(),
                    };
                    plan.push(PathTargets {
                        path,
                        children,
                        properties,
                    });
                }
            }
            (plan, exact.into_iter().collect::<Vec<_>>())
        };

        for entry in plan.iter() {
            trace!(path = %entry.path, "value changed");
            self.fire(&entry.children, |l| l.call(entry.path));
            self.fire(&entry.properties, |l| l.call(entry.path));
        }
        self.fire(&exact, ValueListener::call);
    }

    fn emit_errors_changed(&self, changed: &BTreeSet<PropertyPath>) {
        if changed.is_empty() {
            return;
        }
        let (plan, in_scene) = {
            let channels = self.inner.channels.borrow();
            let plan: Vec<(&PropertyPath, Vec<Target<ValueListener>>)> = changed
                .iter()
                .map(|path| {
                    let mut targets = channels.errors.snapshot(path.object_id());
                    targets.retain(|(_, weak)| weak.upgrade().is_some_and(|l| l.path() == path));
                    (path, targets)
                })
                .collect();
            (plan, channels.errors_in_scene.snapshot(&()))
        };
        for (path, targets) in plan.iter() {
            trace!(%path, "error changed");
            self.fire(targets, ValueListener::call);
        }
        trace!("error changed in scene");
        self.fire(&in_scene, NotifyListener::call);
    }

    fn emit_preview_dirty(&self, objects: &BTreeSet<ObjectId>) {
        if objects.is_empty() {
            return;
        }
        let plan: Vec<(&ObjectId, Vec<Target<NotifyListener>>)> = {
            let channels = self.inner.channels.borrow();
            objects
                .iter()
                .map(|object| (object, channels.preview_dirty.snapshot(object)))
                .collect()
        };
        for (object, targets) in plan.iter() {
            trace!(%object, "preview dirty");
            self.fire(targets, NotifyListener::call);
        }
    }

    fn emit_bulk_change(&self, changes: &ChangeRecorder) {
        // clone so that the callback can replace or reset itself
        let callback = self.inner.bulk_change_callback.borrow().clone();
        if let Some(callback) = callback {
            let objects = changes.all_changed_objects(ChangedObjects::PREVIEW_DIRTY);
            trace!(count = objects.len(), "bulk change");
            callback(&objects);
        }
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Number of registered listeners, across all channels.
    pub fn listener_count(&self) -> usize {
        self.inner.channels.borrow().registry.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listener_count() == 0
    }

    /// Checks that no listener is registered anymore.
    ///
    /// Intended for application teardown, after all consumers have dropped their subscriptions.
    /// The error lists the remaining listeners along with where they were registered.
    pub fn check_empty(&self) -> Result<(), Error> {
        let report = self.inner.channels.borrow().leak_report();
        if report.is_empty() {
            Ok(())
        } else {
            Err(Error::Leaked(report))
        }
    }

    /// Debug assertion version of `check_empty`. Does nothing in release builds.
    pub fn assert_empty(&self) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.check_empty() {
                panic!("{err}");
            }
        }
    }
}
