// ============================================================================
// Correspondence Resolver
// ============================================================================
//
// Maps records selected in one list onto rows of a list built from a
// different field. Both lists sit somewhere in the same ownership tree, so
// an old record is mapped through its nearest owner (or itself) that the
// new list can address:
//
//   Lexicon ─owns─> Entry ─owns─> Sense
//
//   entry E selected, new list shows senses:
//     E is addressable (Entry owns Sense) -> rows owned by E
//     E has no senses                     -> try Lexicon, and so on upward
//
// ============================================================================

use crate::core::{ClassId, FieldRef, ListError, ObjectId, Result, SortItem};
use crate::list::RecordList;
use crate::storage::IdentityStore;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Class-level ownership declarations plus which class each list field holds
#[derive(Debug, Clone, Default)]
pub struct OwnershipTree {
    /// child class -> classes that may own it
    owners: HashMap<ClassId, HashSet<ClassId>>,
    /// list field -> class of its items
    bindings: HashMap<FieldRef, ClassId>,
}

impl OwnershipTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_owner(&mut self, parent: impl Into<ClassId>, child: impl Into<ClassId>) -> &mut Self {
        self.owners
            .entry(child.into())
            .or_default()
            .insert(parent.into());
        self
    }

    pub fn bind_field(&mut self, field: impl Into<FieldRef>, item_class: impl Into<ClassId>) -> &mut Self {
        self.bindings.insert(field.into(), item_class.into());
        self
    }

    pub fn item_class(&self, field: &FieldRef) -> Result<&ClassId> {
        self.bindings
            .get(field)
            .ok_or_else(|| ListError::UnmappedField(field.clone()))
    }

    /// The item class of `field` and every class that can own it, directly
    /// or transitively
    pub fn addressable_classes(&self, field: &FieldRef) -> Result<HashSet<ClassId>> {
        let mut addressable = HashSet::new();
        let mut frontier = vec![self.item_class(field)?.clone()];
        while let Some(class) = frontier.pop() {
            if !addressable.insert(class.clone()) {
                continue;
            }
            if let Some(parents) = self.owners.get(&class) {
                frontier.extend(parents.iter().cloned());
            }
        }
        Ok(addressable)
    }
}

/// Rows of the new list that correspond to the old selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correspondence {
    /// Root objects of matching new-list rows, in list order, no repeats
    pub relatives: Vec<ObjectId>,
    /// The ancestors the relatives were found through, no repeats
    pub common_ancestors: Vec<ObjectId>,
}

impl Correspondence {
    pub fn first(&self) -> Option<ObjectId> {
        self.relatives.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.relatives.is_empty()
    }
}

/// Projects `old_ids` (records of `old_field`) onto `new_items`, the rows
/// of a list over `new_field`.
///
/// Each id is tried through itself and then its owners, nearest first. The
/// first one whose class the new field can address and that has at least one
/// row in `new_items` (being it, or owned by it) wins. Ids with no such
/// ancestor are dropped.
pub fn find_corresponding<S: IdentityStore + ?Sized>(
    store: &S,
    tree: &OwnershipTree,
    old_field: &FieldRef,
    old_ids: &[ObjectId],
    new_field: &FieldRef,
    new_items: &[SortItem],
) -> Result<Correspondence> {
    tree.item_class(old_field)?;
    let addressable = tree.addressable_classes(new_field)?;

    let mut result = Correspondence::default();
    let mut seen = HashSet::new();

    for &old in old_ids {
        if !store.is_valid(old) {
            continue;
        }
        let candidates = store
            .ancestors_and_self(old)
            .into_iter()
            .filter(|ancestor| {
                store
                    .class_of(*ancestor)
                    .is_some_and(|class| addressable.contains(&class))
            });

        let mut found = false;
        for ancestor in candidates {
            let relatives: Vec<ObjectId> = new_items
                .iter()
                .filter(|item| item.referenced_ids().any(|id| store.is_owned_by(id, ancestor)))
                .map(SortItem::root_object)
                .collect();
            if relatives.is_empty() {
                continue;
            }
            if !result.common_ancestors.contains(&ancestor) {
                result.common_ancestors.push(ancestor);
            }
            for relative in relatives {
                if seen.insert(relative) {
                    result.relatives.push(relative);
                }
            }
            found = true;
            break;
        }
        if !found {
            debug!(id = %old, field = %new_field, "no corresponding record");
        }
    }
    Ok(result)
}

impl RecordList {
    /// Selects the first row corresponding to `old_ids` from a list over
    /// `old_field`. Leaves the selection alone when nothing corresponds.
    pub fn select_corresponding<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        tree: &OwnershipTree,
        old_field: &FieldRef,
        old_ids: &[ObjectId],
    ) -> Result<Option<ObjectId>> {
        let found = find_corresponding(
            store,
            tree,
            old_field,
            old_ids,
            self.item_field(),
            self.items(),
        )?;
        let Some(target) = found.first() else {
            return Ok(None);
        };
        self.set_current_object(target)?;
        Ok(Some(target))
    }
}
