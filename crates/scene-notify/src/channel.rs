//! Channel tables.
use crate::diagnostics::{ChannelKind, LeakReport, LeakedListener};
use crate::listener::{
    ChildrenListener, LinkLifecycleListener, LinkListener, NotifyListener, ObjectLifecycleListener, PropertyListener,
    ValueListener,
};
use scene_model::{ObjectId, SmolStr};
use slotmap::{new_key_type, SlotMap};
use std::collections::BTreeMap;
use std::panic::Location;
use std::rc::{Rc, Weak};

new_key_type! {
    /// Identifies a registered listener.
    pub(crate) struct ListenerKey;
}

/// A listener as seen from the dispatch loop: its key and a weak reference to it.
pub(crate) type Target<L> = (ListenerKey, Weak<L>);

/// Listener table of one channel.
///
/// Listeners are grouped by matching key. Within a group, they are ordered by listener key.
pub(crate) struct Channel<K, L> {
    buckets: BTreeMap<K, BTreeMap<ListenerKey, Weak<L>>>,
}

impl<K, L> Default for Channel<K, L> {
    fn default() -> Self {
        Channel {
            buckets: BTreeMap::new(),
        }
    }
}

impl<K: Ord, L> Channel<K, L> {
    pub(crate) fn insert(&mut self, key: K, listener_key: ListenerKey, listener: &Rc<L>) {
        self.buckets
            .entry(key)
            .or_default()
            .insert(listener_key, Rc::downgrade(listener));
    }

    /// Removes a listener. Empty groups are removed with their last listener.
    pub(crate) fn remove(&mut self, key: &K, listener_key: ListenerKey) -> bool {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return false;
        };
        let removed = bucket.remove(&listener_key).is_some();
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        removed
    }

    /// Returns a copy of the listeners registered under `key`.
    pub(crate) fn snapshot(&self, key: &K) -> Vec<Target<L>> {
        match self.buckets.get(key) {
            Some(bucket) => bucket.iter().map(|(k, w)| (*k, w.clone())).collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }
}

/// Registry entry describing a live listener.
pub(crate) struct ListenerInfo {
    pub(crate) channel: ChannelKind,
    pub(crate) location: &'static Location<'static>,
}

/// All channel tables of a dispatcher.
#[derive(Default)]
pub(crate) struct Channels {
    /// Every live listener, across all channels.
    pub(crate) registry: SlotMap<ListenerKey, ListenerInfo>,

    pub(crate) values: Channel<ObjectId, ValueListener>,
    pub(crate) children: Channel<ObjectId, ChildrenListener>,
    pub(crate) property_names: Channel<SmolStr, PropertyListener>,
    pub(crate) object_lifecycle: Channel<(), ObjectLifecycleListener>,
    pub(crate) link_lifecycle: Channel<(), LinkLifecycleListener>,
    pub(crate) link_lifecycle_for_end: Channel<ObjectId, LinkLifecycleListener>,
    pub(crate) link_lifecycle_for_start: Channel<ObjectId, LinkLifecycleListener>,
    pub(crate) link_validity: Channel<(), LinkListener>,
    /// Keyed by the root object of the listened path.
    pub(crate) errors: Channel<ObjectId, ValueListener>,
    pub(crate) errors_in_scene: Channel<(), NotifyListener>,
    pub(crate) preview_dirty: Channel<ObjectId, NotifyListener>,
    pub(crate) undo_changed: Channel<(), NotifyListener>,
    pub(crate) external_project_changed: Channel<(), NotifyListener>,
    pub(crate) external_project_map_changed: Channel<(), NotifyListener>,
    pub(crate) root_order_changed: Channel<(), NotifyListener>,
    pub(crate) after_dispatch: Channel<(), NotifyListener>,
}

impl Channels {
    /// Number of entries in the table of the specified channel.
    pub(crate) fn table_len(&self, kind: ChannelKind) -> usize {
        match kind {
            ChannelKind::Value => self.values.len(),
            ChannelKind::Children => self.children.len(),
            ChannelKind::PropertyName => self.property_names.len(),
            ChannelKind::ObjectLifecycle => self.object_lifecycle.len(),
            ChannelKind::LinkLifecycle => self.link_lifecycle.len(),
            ChannelKind::LinkLifecycleForEnd => self.link_lifecycle_for_end.len(),
            ChannelKind::LinkLifecycleForStart => self.link_lifecycle_for_start.len(),
            ChannelKind::LinkValidity => self.link_validity.len(),
            ChannelKind::ErrorChanged => self.errors.len(),
            ChannelKind::ErrorChangedInScene => self.errors_in_scene.len(),
            ChannelKind::PreviewDirty => self.preview_dirty.len(),
            ChannelKind::UndoChanged => self.undo_changed.len(),
            ChannelKind::ExternalProjectChanged => self.external_project_changed.len(),
            ChannelKind::ExternalProjectMapChanged => self.external_project_map_changed.len(),
            ChannelKind::RootOrderChanged => self.root_order_changed.len(),
            ChannelKind::AfterDispatch => self.after_dispatch.len(),
        }
    }

    /// Lists the listeners still registered, ordered by channel.
    pub(crate) fn leak_report(&self) -> LeakReport {
        let mut leaks: Vec<LeakedListener> = self
            .registry
            .values()
            .map(|info| LeakedListener {
                channel: info.channel,
                location: info.location,
            })
            .collect();
        leaks.sort_by_key(|leak| leak.channel);

        debug_assert_eq!(
            ChannelKind::ALL.iter().map(|kind| self.table_len(*kind)).sum::<usize>(),
            self.registry.len(),
            "channel tables out of sync with the listener registry"
        );
        LeakReport { leaks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_drops_empty_groups() {
        let mut keys: SlotMap<ListenerKey, ()> = SlotMap::with_key();
        let (k1, k2) = (keys.insert(()), keys.insert(()));
        let listener = Rc::new(NotifyListener::new(|| {}));

        let mut channel: Channel<ObjectId, NotifyListener> = Channel::default();
        let a = ObjectId::new("a");
        channel.insert(a.clone(), k1, &listener);
        channel.insert(a.clone(), k2, &listener);
        assert_eq!(channel.len(), 2);
        assert_eq!(channel.snapshot(&a).len(), 2);
        assert!(channel.snapshot(&ObjectId::new("b")).is_empty());

        assert!(channel.remove(&a, k1));
        assert!(!channel.remove(&a, k1));
        assert_eq!(channel.len(), 1);
        assert!(channel.remove(&a, k2));
        assert!(channel.buckets.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_table() {
        let mut keys: SlotMap<ListenerKey, ()> = SlotMap::with_key();
        let k = keys.insert(());
        let listener = Rc::new(NotifyListener::new(|| {}));
        let mut channel: Channel<(), NotifyListener> = Channel::default();
        channel.insert((), k, &listener);

        let snapshot = channel.snapshot(&());
        channel.remove(&(), k);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].1.upgrade().is_some());

        drop(listener);
        assert!(snapshot[0].1.upgrade().is_none());
    }
}
