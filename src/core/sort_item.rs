use crate::core::ObjectId;
use crate::storage::IdentityStore;
use serde::{Deserialize, Serialize};

/// One row of a derived list.
///
/// `key` is the object the sort/filter keys are read from. `path` is the
/// ownership path for grouped rows, with the row's subject at `path[0]`.
/// Flat rows have an empty path and are about `key` itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortItem {
    pub key: ObjectId,
    pub path: Vec<ObjectId>,
}

impl SortItem {
    /// A flat row about `key`
    pub fn new(key: ObjectId) -> Self {
        Self {
            key,
            path: Vec::new(),
        }
    }

    pub fn with_path(key: ObjectId, path: Vec<ObjectId>) -> Self {
        Self { key, path }
    }

    /// The object this row is about
    pub fn root_object(&self) -> ObjectId {
        self.path.first().copied().unwrap_or(self.key)
    }

    /// Key followed by every path element
    pub fn referenced_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        std::iter::once(self.key).chain(self.path.iter().copied())
    }

    pub fn references(&self, id: ObjectId) -> bool {
        self.referenced_ids().any(|candidate| candidate == id)
    }

    /// A row is stale as soon as any object it mentions is gone
    pub fn is_valid_in<S: IdentityStore + ?Sized>(&self, store: &S) -> bool {
        self.referenced_ids().all(|id| store.is_valid(id))
    }
}

/// Removes stale rows in place and returns the index of the first removed row
pub fn purge_stale<S: IdentityStore + ?Sized>(
    items: &mut Vec<SortItem>,
    store: &S,
) -> Option<usize> {
    let first_stale = items.iter().position(|item| !item.is_valid_in(store));
    if first_stale.is_some() {
        items.retain(|item| item.is_valid_in(store));
    }
    first_stale
}
