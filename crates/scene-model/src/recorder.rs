//! Recording of data model changes.
use crate::{LinkDescriptor, ObjectId, PropertyPath};
use bitflags::bitflags;
use indexmap::IndexSet;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Links grouped by the id of the object they end on.
pub type LinksByEndObject = BTreeMap<ObjectId, BTreeSet<LinkDescriptor>>;

/// Changed property paths grouped by root object.
pub type PathsByObject = BTreeMap<ObjectId, BTreeSet<PropertyPath>>;

bitflags! {
    /// Selects which additional objects `ChangeRecorder::all_changed_objects` reports.
    ///
    /// Created objects and the roots of changed values are always reported.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ChangedObjects: u8 {
        /// Objects whose preview was marked dirty.
        const PREVIEW_DIRTY = 1 << 0;
        /// Start objects of added, removed or validity-changed links.
        const LINK_START = 1 << 1;
        /// End objects of added, removed or validity-changed links.
        const LINK_END = 1 << 2;
    }
}

/// Sink for data model mutations.
pub trait RecordChanges {
    fn reset(&mut self);

    fn record_create_object(&mut self, object: &ObjectId);
    fn record_delete_object(&mut self, object: &ObjectId);

    fn record_value_changed(&mut self, path: &PropertyPath);

    fn record_add_link(&mut self, link: &LinkDescriptor);
    fn record_change_validity_of_link(&mut self, link: &LinkDescriptor);
    fn record_remove_link(&mut self, link: &LinkDescriptor);

    fn record_error_changed(&mut self, path: &PropertyPath);
    fn record_preview_dirty(&mut self, object: &ObjectId);

    fn record_root_order_changed(&mut self);
    fn record_external_project_map_changed(&mut self);
}

/// Accumulates the mutations of one unit of work into a batch.
///
/// Recording coalesces redundant entries: an object created and deleted in the same batch
/// disappears entirely, a value change nested under an already recorded one is dropped, and
/// a link added and removed again cancels out.
#[derive(Clone, Debug, Default)]
pub struct ChangeRecorder {
    created_objects: IndexSet<ObjectId>,
    deleted_objects: IndexSet<ObjectId>,
    changed_values: PathsByObject,
    added_links: LinksByEndObject,
    validity_changed_links: LinksByEndObject,
    removed_links: LinksByEndObject,
    changed_errors: BTreeSet<PropertyPath>,
    preview_dirty: BTreeSet<ObjectId>,
    root_order_changed: bool,
    external_project_map_changed: bool,
}

impl ChangeRecorder {
    pub fn new() -> ChangeRecorder {
        ChangeRecorder::default()
    }

    /// Returns the recorded batch and leaves this recorder empty.
    pub fn release(&mut self) -> ChangeRecorder {
        std::mem::take(self)
    }

    /// Replays all changes of `other` into this recorder.
    pub fn merge_changes(&mut self, other: &ChangeRecorder) {
        for object in other.created_objects.iter() {
            self.record_create_object(object);
        }
        for object in other.deleted_objects.iter() {
            self.record_delete_object(object);
        }
        for path in other.changed_values.values().flatten() {
            self.record_value_changed(path);
        }
        for path in other.changed_errors.iter() {
            self.record_error_changed(path);
        }
        for object in other.preview_dirty.iter() {
            self.record_preview_dirty(object);
        }
        for link in other.removed_links.values().flatten() {
            self.record_remove_link(link);
        }
        for link in other.added_links.values().flatten() {
            self.record_add_link(link);
        }
        for link in other.validity_changed_links.values().flatten() {
            self.record_change_validity_of_link(link);
        }
        self.root_order_changed |= other.root_order_changed;
        self.external_project_map_changed |= other.external_project_map_changed;
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.created_objects.is_empty()
            && self.deleted_objects.is_empty()
            && self.changed_values.is_empty()
            && self.added_links.is_empty()
            && self.validity_changed_links.is_empty()
            && self.removed_links.is_empty()
            && self.changed_errors.is_empty()
            && self.preview_dirty.is_empty()
            && !self.root_order_changed
            && !self.external_project_map_changed
    }

    /// Objects created in this batch, in creation order.
    pub fn created_objects(&self) -> &IndexSet<ObjectId> {
        &self.created_objects
    }

    /// Objects deleted in this batch, in deletion order.
    pub fn deleted_objects(&self) -> &IndexSet<ObjectId> {
        &self.deleted_objects
    }

    /// Changed property paths, grouped by root object.
    ///
    /// Added and removed entries of dynamic containers are recorded as a change of the container.
    pub fn changed_values(&self) -> &PathsByObject {
        &self.changed_values
    }

    pub fn changed_errors(&self) -> &BTreeSet<PropertyPath> {
        &self.changed_errors
    }

    pub fn preview_dirty_objects(&self) -> &BTreeSet<ObjectId> {
        &self.preview_dirty
    }

    pub fn added_links(&self) -> &LinksByEndObject {
        &self.added_links
    }

    pub fn removed_links(&self) -> &LinksByEndObject {
        &self.removed_links
    }

    pub fn validity_changed_links(&self) -> &LinksByEndObject {
        &self.validity_changed_links
    }

    pub fn root_order_changed(&self) -> bool {
        self.root_order_changed
    }

    pub fn external_project_map_changed(&self) -> bool {
        self.external_project_map_changed
    }

    /// Returns the set of all objects touched by this batch.
    pub fn all_changed_objects(&self, include: ChangedObjects) -> BTreeSet<ObjectId> {
        let mut objects: BTreeSet<ObjectId> = self.created_objects.iter().cloned().collect();
        objects.extend(self.changed_values.keys().cloned());
        if include.contains(ChangedObjects::PREVIEW_DIRTY) {
            objects.extend(self.preview_dirty.iter().cloned());
        }
        if include.intersects(ChangedObjects::LINK_START | ChangedObjects::LINK_END) {
            let links = self
                .added_links
                .values()
                .chain(self.validity_changed_links.values())
                .chain(self.removed_links.values())
                .flatten();
            for link in links {
                if include.contains(ChangedObjects::LINK_START) {
                    objects.insert(link.start_object().clone());
                }
                if include.contains(ChangedObjects::LINK_END) {
                    objects.insert(link.end_object().clone());
                }
            }
        }
        objects
    }
}

/// Removes `link` from its end-object bucket, dropping the bucket once empty.
fn remove_link(links: &mut LinksByEndObject, link: &LinkDescriptor) -> bool {
    let Some(bucket) = links.get_mut(link.end_object()) else {
        return false;
    };
    let removed = bucket.remove(link);
    if bucket.is_empty() {
        links.remove(link.end_object());
    }
    removed
}

impl RecordChanges for ChangeRecorder {
    fn reset(&mut self) {
        *self = ChangeRecorder::default();
    }

    fn record_create_object(&mut self, object: &ObjectId) {
        self.created_objects.insert(object.clone());
    }

    fn record_delete_object(&mut self, object: &ObjectId) {
        if !self.created_objects.shift_remove(object) {
            self.deleted_objects.insert(object.clone());
        }
        self.changed_values.remove(object);
    }

    fn record_value_changed(&mut self, path: &PropertyPath) {
        let paths = self.changed_values.entry(path.object_id().clone()).or_default();
        if paths.iter().any(|existing| existing != path && existing.contains(path)) {
            return;
        }
        paths.retain(|existing| !path.contains(existing));
        paths.insert(path.clone());
    }

    fn record_add_link(&mut self, link: &LinkDescriptor) {
        // `replace` also refreshes the validity flag of an already recorded link
        self.added_links
            .entry(link.end_object().clone())
            .or_default()
            .replace(link.clone());
    }

    fn record_change_validity_of_link(&mut self, link: &LinkDescriptor) {
        if let Some(added) = self.added_links.get_mut(link.end_object()) {
            if added.contains(link) {
                added.replace(link.clone());
                return;
            }
        }
        self.validity_changed_links
            .entry(link.end_object().clone())
            .or_default()
            .replace(link.clone());
    }

    fn record_remove_link(&mut self, link: &LinkDescriptor) {
        remove_link(&mut self.validity_changed_links, link);
        if remove_link(&mut self.added_links, link) {
            return;
        }
        self.removed_links
            .entry(link.end_object().clone())
            .or_default()
            .insert(link.clone());
    }

    fn record_error_changed(&mut self, path: &PropertyPath) {
        self.changed_errors.insert(path.clone());
    }

    fn record_preview_dirty(&mut self, object: &ObjectId) {
        self.preview_dirty.insert(object.clone());
    }

    fn record_root_order_changed(&mut self) {
        self.root_order_changed = true;
    }

    fn record_external_project_map_changed(&mut self) {
        self.external_project_map_changed = true;
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Forwards every recorded change to a list of attached recorders.
#[derive(Default)]
pub struct MultiplexedRecorder {
    recorders: Vec<Rc<RefCell<dyn RecordChanges>>>,
}

impl MultiplexedRecorder {
    pub fn new() -> MultiplexedRecorder {
        MultiplexedRecorder::default()
    }

    pub fn add_recorder(&mut self, recorder: Rc<RefCell<dyn RecordChanges>>) {
        self.recorders.push(recorder);
    }

    /// Detaches a recorder previously passed to `add_recorder`. Compares by identity.
    pub fn remove_recorder(&mut self, recorder: &Rc<RefCell<dyn RecordChanges>>) {
        let target = Rc::as_ptr(recorder) as *const ();
        self.recorders.retain(|r| Rc::as_ptr(r) as *const () != target);
    }

    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }

    fn for_each(&self, mut f: impl FnMut(&mut dyn RecordChanges)) {
        for recorder in self.recorders.iter() {
            f(&mut *recorder.borrow_mut());
        }
    }
}

impl RecordChanges for MultiplexedRecorder {
    fn reset(&mut self) {
        self.for_each(|r| r.reset());
    }

    fn record_create_object(&mut self, object: &ObjectId) {
        self.for_each(|r| r.record_create_object(object));
    }

    fn record_delete_object(&mut self, object: &ObjectId) {
        self.for_each(|r| r.record_delete_object(object));
    }

    fn record_value_changed(&mut self, path: &PropertyPath) {
        self.for_each(|r| r.record_value_changed(path));
    }

    fn record_add_link(&mut self, link: &LinkDescriptor) {
        self.for_each(|r| r.record_add_link(link));
    }

    fn record_change_validity_of_link(&mut self, link: &LinkDescriptor) {
        self.for_each(|r| r.record_change_validity_of_link(link));
    }

    fn record_remove_link(&mut self, link: &LinkDescriptor) {
        self.for_each(|r| r.record_remove_link(link));
    }

    fn record_error_changed(&mut self, path: &PropertyPath) {
        self.for_each(|r| r.record_error_changed(path));
    }

    fn record_preview_dirty(&mut self, object: &ObjectId) {
        self.for_each(|r| r.record_preview_dirty(object));
    }

    fn record_root_order_changed(&mut self) {
        self.for_each(|r| r.record_root_order_changed());
    }

    fn record_external_project_map_changed(&mut self) {
        self.for_each(|r| r.record_external_project_map_changed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PropertyPath {
        s.parse().unwrap()
    }

    fn link(start: &str, end: &str) -> LinkDescriptor {
        LinkDescriptor::new(path(start), path(end))
    }

    fn changed(recorder: &ChangeRecorder) -> Vec<PropertyPath> {
        recorder.changed_values().values().flatten().cloned().collect()
    }

    #[test]
    fn create_then_delete_cancels_out() {
        let mut recorder = ChangeRecorder::new();
        let a = ObjectId::new("a");
        recorder.record_create_object(&a);
        recorder.record_value_changed(&path("a.translation"));
        recorder.record_delete_object(&a);
        assert!(recorder.created_objects().is_empty());
        assert!(recorder.deleted_objects().is_empty());
        assert!(recorder.changed_values().is_empty());
        assert!(recorder.is_empty());
    }

    #[test]
    fn created_objects_keep_order() {
        let mut recorder = ChangeRecorder::new();
        for id in ["c", "a", "b"] {
            recorder.record_create_object(&ObjectId::new(id));
        }
        let ids: Vec<_> = recorder.created_objects().iter().map(ObjectId::as_str).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn nested_value_changes_coalesce() {
        let mut recorder = ChangeRecorder::new();
        recorder.record_value_changed(&path("a.translation.x"));
        recorder.record_value_changed(&path("a.translation.y"));
        recorder.record_value_changed(&path("b.scale"));
        assert_eq!(changed(&recorder), vec![path("a.translation.x"), path("a.translation.y"), path("b.scale")]);

        // a change on the parent replaces the nested ones
        recorder.record_value_changed(&path("a.translation"));
        assert_eq!(changed(&recorder), vec![path("a.translation"), path("b.scale")]);

        // nested under an existing record: dropped
        recorder.record_value_changed(&path("a.translation.z"));
        assert_eq!(changed(&recorder), vec![path("a.translation"), path("b.scale")]);
    }

    #[test]
    fn add_then_remove_link_cancels_out() {
        let mut recorder = ChangeRecorder::new();
        let l = link("a.out", "b.in");
        recorder.record_add_link(&l);
        recorder.record_change_validity_of_link(&l.clone().with_validity(false));
        let added: Vec<_> = recorder.added_links().values().flatten().collect();
        assert_eq!(added.len(), 1);
        assert!(!added[0].is_valid);
        assert!(recorder.validity_changed_links().is_empty());

        recorder.record_remove_link(&l);
        assert!(recorder.added_links().is_empty());
        assert!(recorder.removed_links().is_empty());
    }

    #[test]
    fn remove_drops_pending_validity_change() {
        let mut recorder = ChangeRecorder::new();
        let l = link("a.out", "b.in");
        recorder.record_change_validity_of_link(&l);
        recorder.record_remove_link(&l);
        recorder.record_remove_link(&l);
        assert!(recorder.validity_changed_links().is_empty());
        let removed: Vec<_> = recorder.removed_links().values().flatten().collect();
        assert_eq!(removed, vec![&l]);
        assert!(recorder.removed_links().contains_key(&ObjectId::new("b")));
    }

    #[test]
    fn all_changed_objects_filters() {
        let mut recorder = ChangeRecorder::new();
        recorder.record_create_object(&ObjectId::new("created"));
        recorder.record_value_changed(&path("changed.x"));
        recorder.record_preview_dirty(&ObjectId::new("dirty"));
        recorder.record_add_link(&link("start.out", "end.in"));

        let ids = |include| -> Vec<String> {
            recorder
                .all_changed_objects(include)
                .into_iter()
                .map(|id| id.to_string())
                .collect()
        };
        assert_eq!(ids(ChangedObjects::empty()), ["changed", "created"]);
        assert_eq!(ids(ChangedObjects::PREVIEW_DIRTY), ["changed", "created", "dirty"]);
        assert_eq!(
            ids(ChangedObjects::LINK_START | ChangedObjects::LINK_END),
            ["changed", "created", "end", "start"]
        );
    }

    #[test]
    fn release_and_merge() {
        let mut recorder = ChangeRecorder::new();
        recorder.record_create_object(&ObjectId::new("a"));
        recorder.record_root_order_changed();
        let batch = recorder.release();
        assert!(recorder.is_empty());
        assert!(batch.root_order_changed());

        let mut merged = ChangeRecorder::new();
        merged.record_value_changed(&path("b.x"));
        merged.merge_changes(&batch);
        assert_eq!(merged.created_objects().len(), 1);
        assert!(merged.root_order_changed());
        assert_eq!(changed(&merged), vec![path("b.x")]);
    }

    #[test]
    fn multiplexed_recorder_forwards() {
        let first = Rc::new(RefCell::new(ChangeRecorder::new()));
        let second = Rc::new(RefCell::new(ChangeRecorder::new()));
        let mut mux = MultiplexedRecorder::new();
        let first_dyn: Rc<RefCell<dyn RecordChanges>> = first.clone();
        mux.add_recorder(first_dyn.clone());
        mux.add_recorder(second.clone());

        mux.record_value_changed(&path("a.x"));
        mux.remove_recorder(&first_dyn);
        assert_eq!(mux.len(), 1);
        mux.record_external_project_map_changed();

        assert_eq!(changed(&first.borrow()), vec![path("a.x")]);
        assert!(!first.borrow().external_project_map_changed());
        assert_eq!(changed(&second.borrow()), vec![path("a.x")]);
        assert!(second.borrow().external_project_map_changed());
    }
}
