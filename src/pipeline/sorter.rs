// ============================================================================
// Sorters
// ============================================================================
//
// - Expansion: one object becomes zero or more rows (grouped presentations
//   emit one row per child of a vector field)
// - Ordering: multi-key stable sort, keys read once per row
// - Merge: binary insertion into an already-sorted list, after equal keys
//
// Null handling follows SQL: ASC puts NULLs last, DESC puts them first.
//
// ============================================================================

use crate::core::{FieldRef, ObjectId, Result, SortItem, Value};
use crate::storage::IdentityStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Strategy for placing NULL values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    /// ASC → NULLS LAST, DESC → NULLS FIRST
    pub fn default_for_direction(descending: bool) -> Self {
        if descending {
            Self::NullsFirst
        } else {
            Self::NullsLast
        }
    }
}

/// A single sort column, read from the row's key object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: FieldRef,
    pub descending: bool,
    pub null_ordering: NullOrdering,
}

impl SortKey {
    pub fn new(field: impl Into<FieldRef>, descending: bool) -> Self {
        Self {
            field: field.into(),
            descending,
            null_ordering: NullOrdering::default_for_direction(descending),
        }
    }

    pub fn with_null_ordering(
        field: impl Into<FieldRef>,
        descending: bool,
        null_ordering: NullOrdering,
    ) -> Self {
        Self {
            field: field.into(),
            descending,
            null_ordering,
        }
    }
}

/// Compares precomputed key tuples
struct KeyComparator<'a> {
    keys: &'a [SortKey],
}

impl<'a> KeyComparator<'a> {
    fn new(keys: &'a [SortKey]) -> Self {
        Self { keys }
    }

    fn compare(&self, left: &[Value], right: &[Value]) -> Ordering {
        for (index, key) in self.keys.iter().enumerate() {
            let ordering = Self::compare_values(&left[index], &right[index], key);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn compare_values(left: &Value, right: &Value, key: &SortKey) -> Ordering {
        // Null placement is absolute; direction only applies to real values
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Less,
                NullOrdering::NullsLast => Ordering::Greater,
            },
            (false, true) => match key.null_ordering {
                NullOrdering::NullsFirst => Ordering::Greater,
                NullOrdering::NullsLast => Ordering::Less,
            },
            (false, false) => {
                let ordering = left.total_cmp(right);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }
}

/// Expands objects into rows and orders rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sorter {
    /// One row per object
    Property { keys: Vec<SortKey> },
    /// One row per element of `vector_field`, keyed on the element and
    /// grouped under the owning object. Objects without elements get a
    /// row of their own when `include_empty` is set.
    Expand {
        vector_field: FieldRef,
        keys: Vec<SortKey>,
        include_empty: bool,
    },
}

impl Sorter {
    /// Ascending single-field sorter
    pub fn by(field: impl Into<FieldRef>) -> Self {
        Self::Property {
            keys: vec![SortKey::new(field, false)],
        }
    }

    pub fn keys(&self) -> &[SortKey] {
        match self {
            Self::Property { keys } | Self::Expand { keys, .. } => keys,
        }
    }

    /// Every field this sorter reads, for dependency checks
    pub fn referenced_fields(&self) -> Vec<&FieldRef> {
        let mut fields: Vec<&FieldRef> = self.keys().iter().map(|key| &key.field).collect();
        if let Self::Expand { vector_field, .. } = self {
            fields.push(vector_field);
        }
        fields
    }

    pub fn depends_on(&self, field: &FieldRef) -> bool {
        self.referenced_fields().contains(&field)
    }

    /// Fails with `SchemaDrift` on the first field the store no longer knows
    pub fn validate<S: IdentityStore + ?Sized>(&self, store: &S) -> Result<()> {
        for field in self.referenced_fields() {
            if !store.field_exists(field) {
                return Err(crate::core::ListError::SchemaDrift {
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Rows contributed by `id`
    pub fn collect_items<S: IdentityStore + ?Sized>(
        &self,
        store: &S,
        id: ObjectId,
    ) -> Result<Vec<SortItem>> {
        match self {
            Self::Property { .. } => Ok(vec![SortItem::new(id)]),
            Self::Expand {
                vector_field,
                include_empty,
                ..
            } => {
                let children = store.vector_property(id, vector_field)?;
                if children.is_empty() {
                    return Ok(if *include_empty {
                        vec![SortItem::new(id)]
                    } else {
                        Vec::new()
                    });
                }
                Ok(children
                    .into_iter()
                    .map(|child| SortItem::with_path(child, vec![id]))
                    .collect())
            }
        }
    }

    fn key_values<S: IdentityStore + ?Sized>(&self, store: &S, item: &SortItem) -> Result<Vec<Value>> {
        self.keys()
            .iter()
            .map(|key| store.property(item.key, &key.field))
            .collect()
    }

    /// Stable sort; equal keys keep their incoming order
    pub fn sort<S: IdentityStore + ?Sized>(&self, store: &S, items: &mut Vec<SortItem>) -> Result<()> {
        if items.len() < 2 || self.keys().is_empty() {
            return Ok(());
        }

        let mut decorated = Vec::with_capacity(items.len());
        for item in items.drain(..) {
            let values = self.key_values(store, &item)?;
            decorated.push((values, item));
        }

        let comparator = KeyComparator::new(self.keys());
        decorated.sort_by(|(left, _), (right, _)| comparator.compare(left, right));
        items.extend(decorated.into_iter().map(|(_, item)| item));
        Ok(())
    }

    /// Inserts `new_items` into the sorted `existing` list without resorting.
    /// Returns the final positions of the inserted rows.
    pub fn merge_into<S: IdentityStore + ?Sized>(
        &self,
        store: &S,
        existing: &mut Vec<SortItem>,
        new_items: Vec<SortItem>,
    ) -> Result<Vec<usize>> {
        let comparator = KeyComparator::new(self.keys());
        let mut positions = Vec::with_capacity(new_items.len());

        for item in new_items {
            let incoming = self.key_values(store, &item)?;
            let mut low = 0;
            let mut high = existing.len();
            while low < high {
                let mid = low + (high - low) / 2;
                let values = self.key_values(store, &existing[mid])?;
                if comparator.compare(&values, &incoming) == Ordering::Greater {
                    high = mid;
                } else {
                    low = mid + 1;
                }
            }
            for position in positions.iter_mut() {
                if *position >= low {
                    *position += 1;
                }
            }
            existing.insert(low, item);
            positions.push(low);
        }
        Ok(positions)
    }
}
