// ============================================================================
// Record List
// ============================================================================
//
// A RecordList is the materialized, sorted, filtered view of one owning
// scope. It keeps three things consistent with the live store:
//
//   items          rows produced by the pipeline, never referencing a
//                  deleted object once an operation returns
//   current row    tracked by identity, so it survives reorders
//   events         what changed, for the clerk layer to act on
//
// The list never holds a reference to the store. Every operation that reads
// it takes `&S`, and change notifications arrive over the list's own
// subscription and are applied in `process_notifications`.
//
// ============================================================================

mod bridge;
mod config;
mod events;
mod reload;
mod scope;
mod suspend;

pub use config::RecordListConfig;
pub use events::{ListAction, ListChanged, ListExtent, ListNotice, ListStats};
pub use scope::ScopeKind;
pub use suspend::BulkEditGuard;

use crate::core::{ClassId, FieldRef, ListError, ObjectId, OwningScope, Result, SortItem};
use crate::pipeline::{self, RecordFilter, Sorter};
use crate::storage::{
    IdentityStore, ListSnapshot, ListStateStore, PersistKey, Subscription, encode_list, restore_list,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Bulk-edit suppression bookkeeping
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SuspensionState {
    pub suppressed: bool,
    pub reload_requested: bool,
    pub depth: usize,
}

pub struct RecordList {
    scope: OwningScope,
    kind: ScopeKind,
    config: RecordListConfig,
    sorter: Option<Sorter>,
    filter: Option<RecordFilter>,
    items: Vec<SortItem>,
    current_index: Option<usize>,
    current_row: Option<SortItem>,
    /// Index to fall back on when the current row cannot be followed
    remembered_index: Option<usize>,
    suspension: SuspensionState,
    loaded: bool,
    /// Set by related-field deletions; honoured at the next flush
    pending_reload: bool,
    related_fields: HashSet<FieldRef>,
    subscription: Option<Subscription>,
    states: Option<ListStateStore>,
    events: Vec<ListChanged>,
    notices: Vec<ListNotice>,
    /// Last object a removal notice was raised for
    last_removed: Option<ObjectId>,
    stats: ListStats,
}

impl RecordList {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Creates an unloaded list and subscribes it to `store`'s changes
    pub fn new<S: IdentityStore + ?Sized>(
        store: &S,
        scope: OwningScope,
        kind: ScopeKind,
        config: RecordListConfig,
    ) -> Self {
        let sorter = config.default_sorter.clone();
        Self {
            scope,
            kind,
            config,
            sorter,
            filter: None,
            items: Vec::new(),
            current_index: None,
            current_row: None,
            remembered_index: None,
            suspension: SuspensionState::default(),
            loaded: false,
            pending_reload: false,
            related_fields: HashSet::new(),
            subscription: Some(store.subscribe()),
            states: None,
            events: Vec::new(),
            notices: Vec::new(),
            last_removed: None,
            stats: ListStats::default(),
        }
    }

    pub fn with_sorter(mut self, sorter: Option<Sorter>) -> Self {
        self.sorter = sorter;
        self
    }

    pub fn with_filter(mut self, filter: Option<RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Where `init_load` restores from and `save_state` writes to
    pub fn with_state_store(mut self, states: ListStateStore) -> Self {
        self.states = Some(states);
        self
    }

    /// Deletions in `field` make this list reload at the next flush
    pub fn watch_related_field(&mut self, field: impl Into<FieldRef>) {
        self.related_fields.insert(field.into());
    }

    /// Unsubscribes from the store. Dropping the list has the same effect
    /// once the store next broadcasts.
    pub fn close<S: IdentityStore + ?Sized>(mut self, store: &S) {
        if let Some(subscription) = self.subscription.take() {
            store.unsubscribe(subscription.id());
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn scope(&self) -> &OwningScope {
        &self.scope
    }

    pub fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    /// The field whose elements the rows are: the child field for a
    /// flattened list, the scope's own field otherwise
    pub fn item_field(&self) -> &FieldRef {
        match &self.kind {
            ScopeKind::Flattened { child_field } => child_field,
            _ => &self.scope.property,
        }
    }

    pub fn config(&self) -> &RecordListConfig {
        &self.config
    }

    pub fn sorter(&self) -> Option<&Sorter> {
        self.sorter.as_ref()
    }

    pub fn filter(&self) -> Option<&RecordFilter> {
        self.filter.as_ref()
    }

    pub fn items(&self) -> &[SortItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_item(&self) -> Option<&SortItem> {
        self.current_index.and_then(|index| self.items.get(index))
    }

    /// The object the current row is about
    pub fn current_object(&self) -> Option<ObjectId> {
        self.current_row.as_ref().map(SortItem::root_object)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn stats(&self) -> ListStats {
        self.stats
    }

    pub fn suspension(&self) -> SuspensionState {
        self.suspension
    }

    pub fn has_pending_reload(&self) -> bool {
        self.pending_reload
    }

    /// First row about `id`
    pub fn index_of(&self, id: ObjectId) -> Option<usize> {
        self.items.iter().position(|item| item.root_object() == id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index_of(id).is_some()
    }

    /// Whether users may create `class` records directly in this list
    pub fn can_insert(&self, class: &ClassId) -> bool {
        self.kind.allows_insertion() && self.config.insertable_classes.contains(class)
    }

    /// Events since the last call, oldest first
    pub fn take_events(&mut self) -> Vec<ListChanged> {
        std::mem::take(&mut self.events)
    }

    pub fn take_notices(&mut self) -> Vec<ListNotice> {
        std::mem::take(&mut self.notices)
    }

    // ========================================================================
    // Current row
    // ========================================================================

    /// Moves the current row.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range. Navigation targets come from the
    /// list itself, so an out-of-range index is a caller bug.
    pub fn set_current_index(&mut self, index: usize) {
        assert!(
            index < self.items.len(),
            "invalid navigation: index {} out of range for {} rows",
            index,
            self.items.len()
        );
        self.current_index = Some(index);
        self.current_row = Some(self.items[index].clone());
        self.remembered_index = Some(index);
    }

    /// Makes the first row about `id` current
    pub fn set_current_object(&mut self, id: ObjectId) -> Result<usize> {
        let index = self.index_of(id).ok_or(ListError::ObjectNotInList(id))?;
        self.set_current_index(index);
        Ok(index)
    }

    // ========================================================================
    // Loading and persistence
    // ========================================================================

    /// First load: restores persisted state if there is valid state for
    /// this scope, otherwise computes from the store. With `defer_load`
    /// set nothing happens until `ensure_loaded`.
    pub fn init_load<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.config.defer_load {
            debug!(scope = %self.scope, "deferring initial load");
            return Ok(());
        }
        self.load(store)
    }

    pub fn ensure_loaded<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.load(store)
    }

    fn load<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.try_restore(store) {
            return Ok(());
        }
        self.reload(store)
    }

    pub fn persist_key<S: IdentityStore + ?Sized>(&self, store: &S) -> Option<PersistKey> {
        PersistKey::for_scope(store, &self.scope, &self.config.persist_role)
    }

    fn try_restore<S: IdentityStore + ?Sized>(&mut self, store: &S) -> bool {
        if matches!(self.kind, ScopeKind::Matching { .. }) {
            return false;
        }
        let (Some(states), Some(key)) = (self.states.clone(), self.persist_key(store)) else {
            return false;
        };
        let bytes = match states.load(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "could not read persisted list state");
                return false;
            }
        };

        let reconciled = restore_list(store, &bytes)
            .filter(|snapshot| snapshot.scope == self.scope)
            .and_then(|mut snapshot| match self.reconcile_snapshot(store, &mut snapshot) {
                Ok(changed) => Some((snapshot, changed)),
                Err(err) => {
                    warn!(error = %err, "could not reconcile persisted list state");
                    None
                }
            });
        match reconciled {
            Some((snapshot, changed)) => {
                self.install_snapshot(snapshot, changed);
                true
            }
            None => {
                warn!(file = %states.path_for(&key).display(), "deleting unusable list state");
                if let Err(err) = states.delete(&key) {
                    warn!(error = %err, "could not delete list state");
                }
                false
            }
        }
    }

    /// Brings restored rows in line with the scope's live collection. Rows
    /// about objects that left the scope are dropped and objects added since
    /// the save are merged in. Returns whether the rows changed.
    fn reconcile_snapshot<S: IdentityStore + ?Sized>(
        &self,
        store: &S,
        snapshot: &mut ListSnapshot,
    ) -> Result<bool> {
        let live = self.kind.enumerate(store, &self.scope)?;
        let live_set: HashSet<ObjectId> = live.iter().copied().collect();
        let restored: HashSet<ObjectId> = snapshot.items.iter().map(SortItem::root_object).collect();

        let mut added = Vec::new();
        for &id in live.iter().filter(|id| !restored.contains(*id)) {
            added.extend(pipeline::rows_for(store, id, snapshot.sorter.as_ref(), snapshot.filter.as_ref())?);
        }
        let left = restored.iter().any(|id| !live_set.contains(id));
        if added.is_empty() && !left {
            return Ok(false);
        }

        debug!(scope = %self.scope, added = added.len(), "persisted rows out of date; reconciling");
        let current = snapshot
            .current_index
            .and_then(|index| snapshot.items.get(index).cloned());
        match &snapshot.sorter {
            Some(sorter) => {
                snapshot.items.retain(|item| live_set.contains(&item.root_object()));
                sorter.merge_into(store, &mut snapshot.items, added)?;
            }
            None => {
                snapshot.items =
                    pipeline::build_items(store, &live, None, snapshot.filter.as_ref())?;
            }
        }

        let followed = current.and_then(|row| snapshot.items.iter().position(|item| *item == row));
        let fallback = snapshot.current_index;
        snapshot.current_index = snapshot
            .items
            .len()
            .checked_sub(1)
            .map(|last| followed.or(fallback).map_or(0, |index| index.min(last)));
        Ok(true)
    }

    fn install_snapshot(&mut self, snapshot: ListSnapshot, reconciled: bool) {
        debug!(scope = %self.scope, rows = snapshot.items.len(), "restored list state");
        self.sorter = snapshot.sorter;
        self.filter = snapshot.filter;
        self.items = snapshot.items;
        self.current_index = snapshot.current_index;
        self.current_row = snapshot
            .current_index
            .and_then(|index| self.items.get(index).cloned());
        self.remembered_index = snapshot.current_index;
        self.loaded = true;
        let action = if reconciled {
            ListAction::Normal
        } else {
            ListAction::SuppressSave
        };
        self.events.push(ListChanged {
            action,
            affected: self.current_object(),
            extent: ListExtent::Full,
        });
    }

    pub fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            scope: self.scope.clone(),
            sorter: self.sorter.clone(),
            filter: self.filter.clone(),
            current_index: self.current_index,
            items: self.items.clone(),
        }
    }

    /// Saves the current state. Returns `false` when nothing was written:
    /// no state store, an unloaded list, or rows that went stale.
    pub fn save_state<S: IdentityStore + ?Sized>(&self, store: &S) -> Result<bool> {
        let (Some(states), Some(key)) = (self.states.as_ref(), self.persist_key(store)) else {
            return Ok(false);
        };
        if !self.loaded || matches!(self.kind, ScopeKind::Matching { .. }) {
            return Ok(false);
        }
        match encode_list(store, &self.snapshot())? {
            Some(bytes) => {
                states.save(&key, &bytes)?;
                debug!(file = %states.path_for(&key).display(), "saved list state");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for RecordList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordList")
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .field("rows", &self.items.len())
            .field("current_index", &self.current_index)
            .field("loaded", &self.loaded)
            .finish()
    }
}
