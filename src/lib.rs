// ============================================================================
// recordview Library
// ============================================================================
//
// Materialized, sorted, filtered record lists over a live object store,
// kept in sync through change notifications.
//
//   storage   identity store trait, in-memory store, notifications,
//             persisted list state
//   pipeline  sorters, filters, LIKE matching
//   list      RecordList: reload, incremental patch, suppression
//   correspond  cross-field selection mapping
//   clerk     navigation and dependent lists over a RecordList
//
// ============================================================================

pub mod clerk;
pub mod core;
pub mod correspond;
pub mod list;
pub mod pipeline;
pub mod storage;

pub use clerk::{ClerkEvent, RecordClerk};
pub use crate::core::{ClassId, FieldRef, ListError, ObjectId, OwningScope, Result, SortItem, Value};
pub use correspond::{Correspondence, OwnershipTree, find_corresponding};
pub use list::{
    BulkEditGuard, ListAction, ListChanged, ListExtent, ListNotice, ListStats, RecordList,
    RecordListConfig, ScopeKind,
};
pub use pipeline::{Condition, NullOrdering, RecordFilter, SortKey, Sorter};
pub use storage::{IdentityStore, InMemoryStore, ListStateStore, PersistKey, PropChange};

/// Builds and loads a list over `owner.property` in one call
///
/// # Examples
///
/// ```
/// use recordview::{InMemoryStore, OwningScope, RecordListConfig, ScopeKind, Sorter, open_list};
///
/// # fn main() -> recordview::Result<()> {
/// let mut store = InMemoryStore::new();
/// store.declare_vector("Lexicon.Entries").declare_scalar("Entry.Form");
/// let lexicon = store.create_root("Lexicon");
/// for form in ["cow", "ant"] {
///     let entry = store.create_owned(lexicon, "Lexicon.Entries", "Entry")?;
///     store.set_property(entry, "Entry.Form", form)?;
/// }
///
/// let config = RecordListConfig::new().default_sorter(Sorter::by("Entry.Form"));
/// let list = open_list(&store, OwningScope::new(lexicon, "Lexicon.Entries"), ScopeKind::Vector, config)?;
/// assert_eq!(list.len(), 2);
/// assert_eq!(list.current_index(), Some(0));
/// # Ok(())
/// # }
/// ```
pub fn open_list<S: IdentityStore + ?Sized>(
    store: &S,
    scope: OwningScope,
    kind: ScopeKind,
    config: RecordListConfig,
) -> Result<RecordList> {
    let mut list = RecordList::new(store, scope, kind, config);
    list.init_load(store)?;
    Ok(list)
}
