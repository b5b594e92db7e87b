use super::{RecordList, ScopeKind};
use crate::core::Result;
use crate::storage::{IdentityStore, PropChange};
use tracing::debug;

impl RecordList {
    /// Drains this list's subscription and applies every change in order.
    /// Returns how many changes were seen.
    ///
    /// Reloads requested by related-field deletions are left pending; call
    /// `flush_pending` (or use `sync`) once every interested list has seen
    /// the batch.
    pub fn process_notifications<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<usize> {
        let changes = match self.subscription.as_mut() {
            Some(subscription) => subscription.drain(),
            None => return Ok(0),
        };
        for change in &changes {
            self.on_property_changed(store, change)?;
        }
        Ok(changes.len())
    }

    /// Performs a reload left pending by `on_property_changed`
    pub fn flush_pending<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<bool> {
        if !self.pending_reload {
            return Ok(false);
        }
        self.pending_reload = false;
        self.reload(store)?;
        Ok(true)
    }

    /// `process_notifications` followed by `flush_pending`
    pub fn sync<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<usize> {
        let seen = self.process_notifications(store)?;
        self.flush_pending(store)?;
        Ok(seen)
    }

    /// Routes one store change:
    ///
    /// 1. a change to the scope's own vector goes through `reload_range`
    /// 2. deletions in a related field mark a reload as pending
    /// 3. a field the sorter or filter reads reloads; a display field
    ///    relabels the affected row
    /// 4. a deletion (or any change under a matching scope) purges rows
    ///    that now reference deleted objects
    /// 5. if the current row now references a deleted object, reload
    pub fn on_property_changed<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        change: &PropChange,
    ) -> Result<()> {
        if !self.loaded {
            return Ok(());
        }

        if self.scope.matches(change.object, &change.field) {
            self.reload_range(store, change.range_start, change.inserted, change.deleted)?;
        } else if self.is_flattened_child_change(store, change) {
            if change.inserted == 0 && change.deleted > 0 {
                self.purge(store);
            } else {
                self.reload(store)?;
            }
        } else if self.related_fields.contains(&change.field) && change.deleted > 0 {
            debug!(scope = %self.scope, field = %change.field, "related deletion; reload pending");
            self.pending_reload = true;
        } else if self.strategies_depend_on(&change.field) {
            if self.touches(store, change) {
                self.reload(store)?;
            }
        } else if self.config.display_fields.contains(&change.field) {
            if let Some(index) = self.items.iter().position(|item| item.references(change.object)) {
                self.emit_row(index);
            }
        }

        let may_strand_rows = change.deleted > 0 || matches!(self.kind, ScopeKind::Matching { .. });
        if may_strand_rows && self.items.iter().any(|item| !item.is_valid_in(store)) {
            if self.suspension.suppressed {
                self.request_deferred_reload();
            } else {
                self.purge(store);
            }
        }

        let current_is_stale = self
            .current_row
            .as_ref()
            .is_some_and(|row| !row.is_valid_in(store));
        if current_is_stale {
            debug!(scope = %self.scope, "current row went stale; reloading");
            self.reload(store)?;
        }
        Ok(())
    }

    fn is_flattened_child_change<S: IdentityStore + ?Sized>(&self, store: &S, change: &PropChange) -> bool {
        match &self.kind {
            ScopeKind::Flattened { child_field } => {
                change.field == *child_field
                    && (store.get_owner(change.object) == Some(self.scope.owner)
                        || self.items.iter().any(|item| item.references(change.object)))
            }
            _ => false,
        }
    }

    /// Whether `change` concerns an object that is, or could become, part
    /// of this list
    fn touches<S: IdentityStore + ?Sized>(&self, store: &S, change: &PropChange) -> bool {
        self.items.iter().any(|item| item.references(change.object))
            || self.kind.covers(store, &self.scope, change.object)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::{ObjectId, OwningScope};
    use crate::list::{ListAction, ListExtent, RecordList, RecordListConfig, ScopeKind};
    use crate::pipeline::{Condition, RecordFilter, Sorter};
    use crate::storage::{InMemoryStore, PropChange};

    fn lexicon(forms: &[&str]) -> (InMemoryStore, OwningScope, Vec<ObjectId>) {
        let mut store = InMemoryStore::new();
        store
            .declare_vector("Lexicon.Entries")
            .declare_vector("Entry.Senses")
            .declare_scalar("Entry.Form")
            .declare_scalar("Entry.Note");
        let lexicon = store.create_root("Lexicon");
        let mut ids = Vec::new();
        for form in forms {
            let id = store.create_owned(lexicon, "Lexicon.Entries", "Entry").unwrap();
            store.set_property(id, "Entry.Form", *form).unwrap();
            ids.push(id);
        }
        (store, OwningScope::new(lexicon, "Lexicon.Entries"), ids)
    }

    fn loaded(store: &InMemoryStore, scope: OwningScope, config: RecordListConfig) -> RecordList {
        let mut list = RecordList::new(store, scope, ScopeKind::Vector, config);
        list.init_load(store).unwrap();
        list.take_events();
        list
    }

    #[test]
    fn test_append_reloads() {
        let (mut store, scope, _) = lexicon(&["a"]);
        let mut list = loaded(&store, scope.clone(), RecordListConfig::new());

        let added = store.create_owned(scope.owner, "Lexicon.Entries", "Entry").unwrap();
        assert_eq!(list.process_notifications(&store).unwrap(), 1);
        assert!(list.contains(added));
        assert_eq!(list.stats().full_reloads, 2);
    }

    #[test]
    fn test_sort_key_change_resorts() {
        let (mut store, scope, ids) = lexicon(&["a", "b", "c"]);
        let config = RecordListConfig::new().default_sorter(Sorter::by("Entry.Form"));
        let mut list = loaded(&store, scope, config);

        store.set_property(ids[0], "Entry.Form", "z").unwrap();
        list.process_notifications(&store).unwrap();
        assert_eq!(list.index_of(ids[0]), Some(2));
    }

    #[test]
    fn test_filter_field_change_can_admit_new_rows() {
        let (mut store, scope, ids) = lexicon(&["cat", "dog"]);
        let mut list = loaded(&store, scope, RecordListConfig::new());
        let only_c = RecordFilter::field("c", "Entry.Form", Condition::like("c%"));
        list.on_change_filter(&store, Some(only_c), None).unwrap();
        assert!(!list.contains(ids[1]));

        store.set_property(ids[1], "Entry.Form", "cur").unwrap();
        list.process_notifications(&store).unwrap();
        assert!(list.contains(ids[1]));
    }

    #[test]
    fn test_display_field_only_relabels() {
        let (mut store, scope, ids) = lexicon(&["a", "b"]);
        let config = RecordListConfig::new().display_field("Entry.Note");
        let mut list = loaded(&store, scope, config);

        store.set_property(ids[1], "Entry.Note", "see also").unwrap();
        list.process_notifications(&store).unwrap();

        let events = list.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ListAction::UpdateRowDisplay);
        assert_eq!(events[0].extent, ListExtent::Row(1));
        assert_eq!(list.stats().full_reloads, 1);
    }

    #[test]
    fn test_unrelated_change_is_ignored() {
        let (mut store, scope, ids) = lexicon(&["a"]);
        let mut list = loaded(&store, scope, RecordListConfig::new());

        store.set_property(ids[0], "Entry.Note", "x").unwrap();
        list.process_notifications(&store).unwrap();
        assert!(list.take_events().is_empty());
    }

    #[test]
    fn test_related_deletion_waits_for_flush() {
        let (mut store, scope, ids) = lexicon(&["a"]);
        let sense = store.create_owned(ids[0], "Entry.Senses", "Sense").unwrap();
        let mut list = loaded(&store, scope, RecordListConfig::new());
        list.watch_related_field("Entry.Senses");
        list.process_notifications(&store).unwrap();

        store.delete_object(sense).unwrap();
        list.process_notifications(&store).unwrap();
        assert!(list.has_pending_reload());
        assert_eq!(list.stats().full_reloads, 1);

        assert!(list.flush_pending(&store).unwrap());
        assert_eq!(list.stats().full_reloads, 2);
        assert!(!list.flush_pending(&store).unwrap());
    }

    #[test]
    fn test_stale_current_row_forces_reload() {
        let (mut store, scope, ids) = lexicon(&["a", "b"]);
        let mut list = loaded(&store, scope, RecordListConfig::new());

        store.delete_object(ids[0]).unwrap();
        list.on_property_changed(&store, &PropChange::scalar(ids[1], "Entry.Note"))
            .unwrap();
        assert_eq!(list.items().len(), 1);
        assert_eq!(list.current_object(), Some(ids[1]));
    }

    #[test]
    fn test_flattened_child_deletion_purges() {
        let (mut store, scope, ids) = lexicon(&["a", "b"]);
        let s1 = store.create_owned(ids[0], "Entry.Senses", "Sense").unwrap();
        let s2 = store.create_owned(ids[0], "Entry.Senses", "Sense").unwrap();
        let s3 = store.create_owned(ids[1], "Entry.Senses", "Sense").unwrap();
        let mut list = RecordList::new(
            &store,
            scope,
            ScopeKind::flattened("Entry.Senses"),
            RecordListConfig::new(),
        );
        list.init_load(&store).unwrap();
        assert_eq!(list.len(), 3);

        store.delete_object(s2).unwrap();
        list.process_notifications(&store).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains(s1) && list.contains(s3));
        assert_eq!(list.stats().purges, 1);
        assert_eq!(list.stats().full_reloads, 1);
    }

    #[test]
    fn test_matching_list_purges_deleted_hit_outside_anchor_field() {
        let (mut store, scope, ids) = lexicon(&["a"]);
        let s1 = store.create_owned(ids[0], "Entry.Senses", "Sense").unwrap();
        let s2 = store.create_owned(ids[0], "Entry.Senses", "Sense").unwrap();
        let mut list = RecordList::new(
            &store,
            scope,
            ScopeKind::Matching { ids: vec![s1, s2] },
            RecordListConfig::new(),
        );
        list.init_load(&store).unwrap();
        assert_eq!(list.current_object(), Some(s1));

        store.delete_object(s2).unwrap();
        list.sync(&store).unwrap();

        assert_eq!(list.len(), 1);
        assert!(list.items().iter().all(|item| item.is_valid_in(&store)));
        assert_eq!(list.current_object(), Some(s1));
        assert_eq!(list.stats().purges, 1);
        assert!(list.take_notices().is_empty());
    }

    #[test]
    fn test_suppressed_list_defers_stale_row_purge() {
        let (mut store, scope, ids) = lexicon(&["a"]);
        let s1 = store.create_owned(ids[0], "Entry.Senses", "Sense").unwrap();
        let s2 = store.create_owned(ids[0], "Entry.Senses", "Sense").unwrap();
        let mut list = RecordList::new(
            &store,
            scope,
            ScopeKind::Matching { ids: vec![s1, s2] },
            RecordListConfig::new(),
        );
        list.init_load(&store).unwrap();
        list.set_list_loading_suppressed(&store, true).unwrap();

        store.delete_object(s2).unwrap();
        list.process_notifications(&store).unwrap();
        assert_eq!(list.stats().purges, 0);

        list.set_list_loading_suppressed(&store, false).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.contains(s1));
    }
}
