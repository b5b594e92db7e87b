use super::{ListAction, ListChanged, ListExtent, ListNotice, RecordList, ScopeKind};
use crate::core::{ListError, ObjectId, Result, SortItem, purge_stale};
use crate::pipeline::{self, RecordFilter, Sorter, compose_filter};
use crate::storage::IdentityStore;
use std::collections::HashMap;
use tracing::{debug, info_span, warn};

/// Current row as it stood before `items` changed
struct Prior {
    row: Option<SortItem>,
    index: Option<usize>,
}

/// Hints for re-establishing the current row
#[derive(Default)]
struct Settle {
    /// Row that took the place of a replaced object
    replacement: Option<usize>,
    /// The prior object left the list on purpose; follow a neighbour even
    /// though it is still valid
    removed: bool,
}

impl RecordList {
    // ========================================================================
    // Full reload
    // ========================================================================

    /// Recomputes the list from its scope.
    ///
    /// While loading is suppressed this only records the request. A failed
    /// reload leaves the previous rows in place and reports `ReloadFailed`.
    pub fn reload<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.suspension.suppressed {
            self.request_deferred_reload();
            return Ok(());
        }
        self.full_reload(store)
    }

    fn full_reload<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        let span = info_span!("reload", scope = %self.scope);
        let _entered = span.enter();

        self.pending_reload = false;
        self.stats.full_reloads += 1;

        if !store.is_valid(self.scope.owner) {
            debug!("owner is gone; list is now empty");
            self.items.clear();
            self.current_index = None;
            self.current_row = None;
            self.loaded = true;
            return Ok(());
        }

        let items = self
            .compute_items(store)
            .map_err(|err| ListError::ReloadFailed(format!("{}: {}", self.scope, err)))?;
        let prior = self.prior();
        let old_items = std::mem::replace(&mut self.items, items);
        self.loaded = true;
        let action = self.settle(store, prior, &old_items, Settle::default());
        debug!(rows = self.items.len(), current = ?self.current_index, "reloaded");
        self.emit(action, ListExtent::Full);
        Ok(())
    }

    /// Runs the pipeline, falling back to the default sorter and no filter
    /// once if either names a field the store no longer has
    fn compute_items<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<Vec<SortItem>> {
        match self.run_pipeline(store) {
            Err(ListError::SchemaDrift { field }) if self.strategies_depend_on(&field) => {
                warn!(field = %field, "sorter or filter uses a missing field; resetting to defaults");
                self.sorter = self
                    .config
                    .default_sorter
                    .clone()
                    .filter(|sorter| sorter.validate(store).is_ok());
                self.filter = None;
                self.notices.push(ListNotice::SchemaDriftRecovered { field });
                self.run_pipeline(store)
            }
            other => other,
        }
    }

    fn run_pipeline<S: IdentityStore + ?Sized>(&self, store: &S) -> Result<Vec<SortItem>> {
        let sources = self.kind.enumerate(store, &self.scope)?;
        pipeline::build_items(store, &sources, self.sorter.as_ref(), self.filter.as_ref())
    }

    pub(super) fn strategies_depend_on(&self, field: &crate::core::FieldRef) -> bool {
        self.sorter.as_ref().is_some_and(|sorter| sorter.depends_on(field))
            || self.filter.as_ref().is_some_and(|filter| filter.depends_on(field))
    }

    // ========================================================================
    // Incremental patch
    // ========================================================================

    /// Applies a bounded change to the scope's vector, patching where the
    /// change is well understood and reloading otherwise:
    ///
    /// | inserted              | deleted                 | result                 |
    /// |-----------------------|-------------------------|------------------------|
    /// | > `max_patch_inserts` | any                     | full reload            |
    /// | > deleted             | any                     | full reload            |
    /// | 0                     | 0                       | current row relabelled |
    /// | 0                     | < len * `purge_ratio`   | stale rows purged      |
    /// | 0                     | otherwise               | full reload            |
    /// | 1..                   | >= inserted             | replacement spliced in |
    pub fn reload_range<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        range_start: usize,
        inserted: usize,
        deleted: usize,
    ) -> Result<()> {
        if self.suspension.suppressed {
            self.request_deferred_reload();
            return Ok(());
        }
        if !self.loaded {
            return Ok(());
        }

        if !self.kind.supports_patch()
            || inserted > self.config.max_patch_inserts
            || inserted > deleted
        {
            return self.reload(store);
        }

        match (inserted, deleted) {
            (0, 0) => {
                self.refresh_current_row();
                Ok(())
            }
            (0, deleted) if self.config.should_purge(deleted, self.items.len()) => {
                self.purge(store);
                Ok(())
            }
            (0, _) => self.reload(store),
            (inserted, _) => self.splice_replacements(store, range_start, inserted),
        }
    }

    pub(super) fn refresh_current_row(&mut self) {
        if let Some(index) = self.current_index {
            self.emit_row(index);
        }
    }

    /// Drops rows that reference deleted objects, without resorting
    pub(super) fn purge<S: IdentityStore + ?Sized>(&mut self, store: &S) {
        let prior = self.prior();
        let old_items = self.items.clone();
        let Some(start) = purge_stale(&mut self.items, store) else {
            return;
        };
        let deleted = old_items.len() - self.items.len();
        self.stats.purges += 1;
        self.settle(store, prior, &old_items, Settle::default());
        debug!(scope = %self.scope, start, deleted, "purged stale rows");
        self.emit(
            ListAction::Normal,
            ListExtent::Patch {
                start,
                inserted: 0,
                deleted,
            },
        );
    }

    /// Replaces the rows of deleted objects with the rows of the objects now
    /// at `range_start..range_start + count` in the scope vector. The new
    /// rows take the slot of the old ones.
    fn splice_replacements<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        range_start: usize,
        count: usize,
    ) -> Result<()> {
        let sources = self.kind.enumerate(store, &self.scope)?;
        let Some(replacements) = sources.get(range_start..range_start + count) else {
            return self.reload(store);
        };

        let mut rows = Vec::new();
        for &id in replacements {
            if self.contains(id) {
                continue;
            }
            match pipeline::rows_for(store, id, self.sorter.as_ref(), self.filter.as_ref()) {
                Ok(found) => rows.extend(found),
                Err(err) if err.is_schema_drift() => return self.reload(store),
                Err(err) => return Err(err),
            }
        }

        let prior = self.prior();
        let old_items = self.items.clone();
        let first_stale = purge_stale(&mut self.items, store);
        let deleted = old_items.len() - self.items.len();
        let start = first_stale.unwrap_or(range_start).min(self.items.len());
        let inserted = rows.len();
        self.items.splice(start..start, rows);

        self.stats.patches += 1;
        let hints = Settle {
            replacement: (inserted > 0).then_some(start),
            removed: false,
        };
        self.settle(store, prior, &old_items, hints);
        debug!(scope = %self.scope, start, inserted, deleted, "spliced replacement rows");
        self.emit(
            ListAction::Normal,
            ListExtent::Patch {
                start,
                inserted,
                deleted,
            },
        );
        Ok(())
    }

    // ========================================================================
    // Current row
    // ========================================================================

    fn prior(&self) -> Prior {
        Prior {
            row: self.current_row.clone(),
            index: self.current_index,
        }
    }

    /// Re-establishes the current row against the new `items` and returns
    /// how consumers should treat the change
    fn settle<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        prior: Prior,
        old_items: &[SortItem],
        hints: Settle,
    ) -> ListAction {
        let (index, action) = self.locate_current(store, &prior, old_items, &hints);
        self.current_index = index;
        self.current_row = index.and_then(|i| self.items.get(i).cloned());
        if index.is_some() {
            self.remembered_index = index;
        }
        action
    }

    fn locate_current<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        prior: &Prior,
        old_items: &[SortItem],
        hints: &Settle,
    ) -> (Option<usize>, ListAction) {
        if self.items.is_empty() {
            if let Some(root) = prior.row.as_ref().map(SortItem::root_object) {
                if !store.is_valid(root) {
                    self.announce_removed(root);
                }
            }
            return (None, ListAction::Normal);
        }
        let last = self.items.len() - 1;

        if let Some(row) = &prior.row {
            if let Some(index) = self.items.iter().position(|item| item == row) {
                return (Some(index), ListAction::SkipNavigation);
            }
            let root = row.root_object();
            if let Some(index) = self.index_of(root) {
                return (Some(index), ListAction::SkipNavigation);
            }

            let deleted = !store.is_valid(root);
            if deleted || hints.removed {
                if let Some(index) = hints.replacement {
                    return (Some(index.min(last)), ListAction::Normal);
                }
                if deleted {
                    self.announce_removed(root);
                }
                if let Some(index) = nearest_surviving(old_items, prior.index, &self.items) {
                    return (Some(index), ListAction::Normal);
                }
            }
        }

        let index = prior
            .index
            .or(self.remembered_index)
            .map_or(0, |index| index.min(last));
        (Some(index), ListAction::Normal)
    }

    /// Raises the removal notice unless `id` was the last one announced
    fn announce_removed(&mut self, id: ObjectId) {
        if self.last_removed.replace(id) != Some(id) {
            debug!(scope = %self.scope, id = %id, "selected record was removed");
            self.notices.push(ListNotice::SelectedRecordRemoved(id));
        }
    }

    pub(super) fn emit(&mut self, action: ListAction, extent: ListExtent) {
        self.events.push(ListChanged {
            action,
            affected: self.current_object(),
            extent,
        });
    }

    /// Relabel event for the row at `index`
    pub(super) fn emit_row(&mut self, index: usize) {
        self.events.push(ListChanged {
            action: ListAction::UpdateRowDisplay,
            affected: self.items.get(index).map(SortItem::root_object),
            extent: ListExtent::Row(index),
        });
    }

    // ========================================================================
    // Scope and strategy changes
    // ========================================================================

    /// Points the list at a different owner. A loaded list reloads in full;
    /// an unloaded one gets its first load, restoring state if it can.
    pub fn set_owner<S: IdentityStore + ?Sized>(&mut self, store: &S, owner: ObjectId) -> Result<()> {
        if self.scope.owner == owner && self.loaded {
            return Ok(());
        }
        debug!(from = %self.scope.owner, to = %owner, "changing list owner");
        self.scope.owner = owner;
        self.items.clear();
        self.current_index = None;
        self.current_row = None;
        self.remembered_index = None;
        if self.loaded {
            self.reload(store)
        } else {
            self.init_load(store)
        }
    }

    /// Swaps the scope kind, e.g. a new set of search hits
    pub fn set_scope_kind<S: IdentityStore + ?Sized>(&mut self, store: &S, kind: ScopeKind) -> Result<()> {
        self.kind = kind;
        self.reload(store)
    }

    /// Adds and/or removes one filter and reloads. On failure the previous
    /// filter and rows stay in place.
    pub fn on_change_filter<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        added: Option<RecordFilter>,
        removed: Option<&RecordFilter>,
    ) -> Result<()> {
        let previous = self.filter.clone();
        self.filter = compose_filter(self.filter.take(), added, removed);
        if self.filter == previous || !self.loaded {
            return Ok(());
        }
        debug!(scope = %self.scope, filter = ?self.filter, "filter changed");
        self.reload(store).inspect_err(|_| self.filter = previous)
    }

    /// Removes the active filter member called `name`
    pub fn remove_filter_named<S: IdentityStore + ?Sized>(&mut self, store: &S, name: &str) -> Result<bool> {
        let Some(member) = self
            .filter
            .as_ref()
            .and_then(|filter| filter.members().into_iter().find(|m| m.name() == Some(name)).cloned())
        else {
            return Ok(false);
        };
        self.on_change_filter(store, None, Some(&member))?;
        Ok(true)
    }

    pub fn change_sorter<S: IdentityStore + ?Sized>(&mut self, store: &S, sorter: Option<Sorter>) -> Result<()> {
        if self.sorter == sorter {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.sorter, sorter);
        if !self.loaded {
            return Ok(());
        }
        self.reload(store).inspect_err(|_| self.sorter = previous)
    }

    // ========================================================================
    // Direct edits
    // ========================================================================

    /// Adds a newly created object's rows, in sorted position when a sorter
    /// is active. Returns the positions of the new rows.
    pub fn insert_object<S: IdentityStore + ?Sized>(&mut self, store: &S, id: ObjectId) -> Result<Vec<usize>> {
        if !store.is_valid(id) {
            return Err(ListError::StaleReference(id));
        }
        if self.contains(id) {
            return Ok(Vec::new());
        }
        let rows = pipeline::rows_for(store, id, self.sorter.as_ref(), self.filter.as_ref())?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let prior = self.prior();
        let positions = match &self.sorter {
            Some(sorter) => sorter.merge_into(store, &mut self.items, rows)?,
            None => {
                let start = self.items.len();
                self.items.extend(rows);
                (start..self.items.len()).collect()
            }
        };

        self.stats.patches += 1;
        self.settle(store, prior, &[], Settle::default());
        let start = positions.iter().copied().min().unwrap_or(0);
        self.emit(
            ListAction::Normal,
            ListExtent::Patch {
                start,
                inserted: positions.len(),
                deleted: 0,
            },
        );
        Ok(positions)
    }

    /// Drops every row about `id` without touching the store
    pub fn remove_object<S: IdentityStore + ?Sized>(&mut self, store: &S, id: ObjectId) -> Result<usize> {
        let start = self
            .items
            .iter()
            .position(|item| item.references(id))
            .ok_or(ListError::ObjectNotInList(id))?;

        let prior = self.prior();
        let old_items = self.items.clone();
        self.items.retain(|item| !item.references(id));
        let deleted = old_items.len() - self.items.len();

        self.stats.patches += 1;
        let hints = Settle {
            replacement: None,
            removed: true,
        };
        self.settle(store, prior, &old_items, hints);
        self.emit(
            ListAction::Normal,
            ListExtent::Patch {
                start,
                inserted: 0,
                deleted,
            },
        );
        Ok(deleted)
    }
}

/// Position in `items` of the closest old row, after `from` first and then
/// before it, whose object is still listed
fn nearest_surviving(old_items: &[SortItem], from: Option<usize>, items: &[SortItem]) -> Option<usize> {
    let from = from?;
    let mut positions: HashMap<ObjectId, usize> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        positions.entry(item.root_object()).or_insert(index);
    }

    let after = old_items.iter().skip(from + 1);
    let before = old_items.iter().take(from.min(old_items.len())).rev();
    after
        .chain(before)
        .find_map(|item| positions.get(&item.root_object()).copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::RecordListConfig;
    use crate::core::OwningScope;
    use crate::pipeline::Condition;
    use crate::storage::InMemoryStore;

    fn lexicon(forms: &[&str]) -> (InMemoryStore, OwningScope, Vec<ObjectId>) {
        let mut store = InMemoryStore::new();
        store
            .declare_vector("Lexicon.Entries")
            .declare_scalar("Entry.Form");
        let lexicon = store.create_root("Lexicon");
        let mut ids = Vec::new();
        for form in forms {
            let id = store.create_owned(lexicon, "Lexicon.Entries", "Entry").unwrap();
            store.set_property(id, "Entry.Form", *form).unwrap();
            ids.push(id);
        }
        (store, OwningScope::new(lexicon, "Lexicon.Entries"), ids)
    }

    fn loaded(store: &InMemoryStore, scope: OwningScope) -> RecordList {
        let mut list = RecordList::new(store, scope, ScopeKind::Vector, RecordListConfig::new());
        list.init_load(store).unwrap();
        list.take_events();
        list
    }

    #[test]
    fn test_reload_follows_current_object_through_resort() {
        let (store, scope, ids) = lexicon(&["cow", "ant", "bee"]);
        let mut list = loaded(&store, scope);
        list.set_current_object(ids[0]).unwrap();

        list.change_sorter(&store, Some(Sorter::by("Entry.Form"))).unwrap();
        assert_eq!(list.current_index(), Some(2));
        assert_eq!(list.current_object(), Some(ids[0]));
        let events = list.take_events();
        assert_eq!(events.last().unwrap().action, ListAction::SkipNavigation);
    }

    #[test]
    fn test_deleted_current_moves_to_next_neighbour() {
        let (mut store, scope, ids) = lexicon(&["a", "b", "c", "d", "e", "f"]);
        let mut list = loaded(&store, scope);
        list.set_current_index(2);

        store.delete_object(ids[2]).unwrap();
        list.process_notifications(&store).unwrap();

        assert_eq!(list.len(), 5);
        assert_eq!(list.current_object(), Some(ids[3]));
        assert_eq!(list.take_notices(), vec![ListNotice::SelectedRecordRemoved(ids[2])]);
        assert_eq!(list.stats().purges, 1);
        assert_eq!(list.stats().full_reloads, 1);
    }

    #[test]
    fn test_deleted_last_row_moves_back() {
        let (mut store, scope, ids) = lexicon(&["a", "b", "c"]);
        let mut list = loaded(&store, scope);
        list.set_current_index(2);

        store.delete_object(ids[2]).unwrap();
        list.process_notifications(&store).unwrap();
        assert_eq!(list.current_object(), Some(ids[1]));
    }

    #[test]
    fn test_filtered_out_current_keeps_position() {
        let (store, scope, ids) = lexicon(&["cat", "cow", "dog", "cub"]);
        let mut list = loaded(&store, scope);
        list.set_current_index(2);

        let only_c = RecordFilter::field("c", "Entry.Form", Condition::like("c%"));
        list.on_change_filter(&store, Some(only_c), None).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.current_index(), Some(2));
        assert_eq!(list.current_object(), Some(ids[3]));
        assert!(list.take_notices().is_empty());
    }

    #[test]
    fn test_each_removed_current_record_is_announced_once() {
        let (mut store, scope, ids) = lexicon(&["a", "b", "c"]);
        let mut list = loaded(&store, scope);

        store.delete_object(ids[0]).unwrap();
        list.process_notifications(&store).unwrap();
        store.delete_object(ids[1]).unwrap();
        list.process_notifications(&store).unwrap();
        list.reload(&store).unwrap();

        assert_eq!(
            list.take_notices(),
            vec![
                ListNotice::SelectedRecordRemoved(ids[0]),
                ListNotice::SelectedRecordRemoved(ids[1]),
            ]
        );
        assert_eq!(list.last_removed, Some(ids[1]));
        assert_eq!(list.current_object(), Some(ids[2]));
    }

    #[test]
    fn test_emptied_list_announces_removal_once() {
        let (mut store, scope, ids) = lexicon(&["a"]);
        let mut list = loaded(&store, scope);

        store.delete_object(ids[0]).unwrap();
        list.process_notifications(&store).unwrap();
        list.reload(&store).unwrap();
        assert_eq!(list.take_notices(), vec![ListNotice::SelectedRecordRemoved(ids[0])]);
    }

    #[test]
    fn test_large_delete_reloads() {
        let (mut store, scope, ids) = lexicon(&["a", "b", "c", "d"]);
        let mut list = loaded(&store, scope);

        list.reload_range(&store, 0, 0, 2).unwrap();
        assert_eq!(list.stats().full_reloads, 2);

        store.delete_object(ids[0]).unwrap();
        list.reload_range(&store, 0, 0, 1).unwrap();
        assert_eq!(list.stats().purges, 1);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_zero_change_relabels_current_row() {
        let (store, scope, ids) = lexicon(&["a", "b"]);
        let mut list = loaded(&store, scope);
        list.reload_range(&store, 0, 0, 0).unwrap();

        let events = list.take_events();
        assert_eq!(
            events,
            vec![ListChanged {
                action: ListAction::UpdateRowDisplay,
                affected: Some(ids[0]),
                extent: ListExtent::Row(0),
            }]
        );
    }

    #[test]
    fn test_schema_drift_resets_strategies() {
        let (mut store, scope, _) = lexicon(&["b", "a"]);
        store.declare_scalar("Entry.Rank");
        let mut list = loaded(&store, scope);
        list.change_sorter(&store, Some(Sorter::by("Entry.Rank"))).unwrap();

        store.drop_field(&"Entry.Rank".into());
        list.reload(&store).unwrap();

        assert!(list.sorter().is_none());
        assert_eq!(list.len(), 2);
        assert_eq!(
            list.take_notices(),
            vec![ListNotice::SchemaDriftRecovered {
                field: "Entry.Rank".into()
            }]
        );
    }

    #[test]
    fn test_failed_filter_change_keeps_previous_state() {
        let (mut store, scope, _) = lexicon(&["a", "b"]);
        let mut list = loaded(&store, scope.clone());
        store.drop_field(&"Lexicon.Entries".into());

        let filter = RecordFilter::field("a", "Entry.Form", Condition::like("a%"));
        let err = list.on_change_filter(&store, Some(filter), None).unwrap_err();
        assert!(matches!(err, ListError::ReloadFailed(_)));
        assert!(list.filter().is_none());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_insert_object_merges_in_sorted_position() {
        let (mut store, scope, _) = lexicon(&["ant", "cow"]);
        let mut list = loaded(&store, scope.clone());
        list.change_sorter(&store, Some(Sorter::by("Entry.Form"))).unwrap();

        let bee = store.create_owned(scope.owner, "Lexicon.Entries", "Entry").unwrap();
        store.set_property(bee, "Entry.Form", "bee").unwrap();
        assert_eq!(list.insert_object(&store, bee).unwrap(), vec![1]);
        assert_eq!(list.index_of(bee), Some(1));
        assert_eq!(list.current_index(), Some(0));
    }

    #[test]
    fn test_remove_object_selects_neighbour() {
        let (store, scope, ids) = lexicon(&["a", "b", "c"]);
        let mut list = loaded(&store, scope);
        list.set_current_index(1);

        assert_eq!(list.remove_object(&store, ids[1]).unwrap(), 1);
        assert_eq!(list.current_object(), Some(ids[2]));
        assert!(list.take_notices().is_empty());
        assert!(list.remove_object(&store, ids[1]).is_err());
    }

    #[test]
    fn test_owner_deleted_empties_list() {
        let (mut store, scope, _) = lexicon(&["a", "b"]);
        let mut list = loaded(&store, scope.clone());
        store.delete_object(scope.owner).unwrap();
        list.reload(&store).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.current_index(), None);
    }

    #[test]
    fn test_nearest_surviving_prefers_following_rows() {
        let old: Vec<_> = (1..=4).map(|n| SortItem::new(ObjectId(n))).collect();
        let new = vec![SortItem::new(ObjectId(1)), SortItem::new(ObjectId(4))];
        assert_eq!(nearest_surviving(&old, Some(1), &new), Some(1));
        let new = vec![SortItem::new(ObjectId(1))];
        assert_eq!(nearest_surviving(&old, Some(2), &new), Some(0));
        assert_eq!(nearest_surviving(&old, None, &new), None);
    }
}
