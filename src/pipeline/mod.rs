// ============================================================================
// Sort/Filter Pipeline
// ============================================================================
//
// A derived list is computed by plain stages over an owned Vec:
//
//   source ids ──expand──> rows ──filter──> rows ──sort──> rows
//
// Each stage is a function of its inputs and the live store; none of them
// keeps state between calls.
//
// ============================================================================

pub mod filter;
pub mod pattern;
pub mod sorter;

pub use filter::{Condition, FilterTarget, PropertyCache, RecordFilter, compose_filter};
pub use sorter::{NullOrdering, SortKey, Sorter};

use crate::core::{ObjectId, Result, SortItem};
use crate::storage::IdentityStore;

/// Turns source objects into rows. Without a sorter each object is one row.
/// Objects that vanished since enumeration are skipped.
pub fn expand<S: IdentityStore + ?Sized>(
    store: &S,
    sources: &[ObjectId],
    sorter: Option<&Sorter>,
) -> Result<Vec<SortItem>> {
    let mut items = Vec::with_capacity(sources.len());
    for &id in sources {
        if !store.is_valid(id) {
            continue;
        }
        match sorter {
            Some(sorter) => items.extend(sorter.collect_items(store, id)?),
            None => items.push(SortItem::new(id)),
        }
    }
    Ok(items)
}

/// Drops the rows `filter` rejects, preloading its values once up front
pub fn apply_filter<S: IdentityStore + ?Sized>(
    store: &S,
    items: Vec<SortItem>,
    filter: Option<&RecordFilter>,
) -> Result<Vec<SortItem>> {
    let Some(filter) = filter else {
        return Ok(items);
    };
    let cache = filter.preload(store, &items)?;
    let mut accepted = Vec::with_capacity(items.len());
    for item in items {
        if filter.accept(&cache, &item)? {
            accepted.push(item);
        }
    }
    Ok(accepted)
}

pub fn order<S: IdentityStore + ?Sized>(
    store: &S,
    items: &mut Vec<SortItem>,
    sorter: Option<&Sorter>,
) -> Result<()> {
    match sorter {
        Some(sorter) => sorter.sort(store, items),
        None => Ok(()),
    }
}

/// Full pipeline run: expand, filter, sort
pub fn build_items<S: IdentityStore + ?Sized>(
    store: &S,
    sources: &[ObjectId],
    sorter: Option<&Sorter>,
    filter: Option<&RecordFilter>,
) -> Result<Vec<SortItem>> {
    if let Some(sorter) = sorter {
        sorter.validate(store)?;
    }
    if let Some(filter) = filter {
        filter.validate(store)?;
    }
    let items = expand(store, sources, sorter)?;
    let mut items = apply_filter(store, items, filter)?;
    order(store, &mut items, sorter)?;
    Ok(items)
}

/// Rows one object contributes after filtering, unsorted
pub fn rows_for<S: IdentityStore + ?Sized>(
    store: &S,
    id: ObjectId,
    sorter: Option<&Sorter>,
    filter: Option<&RecordFilter>,
) -> Result<Vec<SortItem>> {
    let items = expand(store, &[id], sorter)?;
    apply_filter(store, items, filter)
}
