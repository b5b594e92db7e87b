use super::pattern::eval_like;
use crate::core::{FieldRef, ListError, ObjectId, Result, SortItem, Value};
use crate::storage::IdentityStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Predicate applied to one property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Equals(Value),
    NotEquals(Value),
    Like { pattern: String, case_sensitive: bool },
    IsNull,
    IsNotNull,
    InList(Vec<Value>),
    Between { low: Value, high: Value },
}

impl Condition {
    pub fn like(pattern: impl Into<String>) -> Self {
        Self::Like {
            pattern: pattern.into(),
            case_sensitive: false,
        }
    }

    pub fn matches(&self, value: &Value) -> Result<bool> {
        Ok(match self {
            Self::Equals(expected) => value == expected,
            Self::NotEquals(expected) => value != expected,
            Self::Like {
                pattern,
                case_sensitive,
            } => match value {
                Value::Null => false,
                Value::Text(text) => eval_like(text, pattern, *case_sensitive)?,
                other => eval_like(&other.to_string(), pattern, *case_sensitive)?,
            },
            Self::IsNull => value.is_null(),
            Self::IsNotNull => !value.is_null(),
            Self::InList(candidates) => candidates.contains(value),
            Self::Between { low, high } => {
                !value.is_null()
                    && matches!(value.compare(low), Ok(Ordering::Greater | Ordering::Equal))
                    && matches!(value.compare(high), Ok(Ordering::Less | Ordering::Equal))
            }
        })
    }
}

/// Which object of a row a leaf filter inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterTarget {
    Key,
    Root,
}

impl FilterTarget {
    fn object_of(self, item: &SortItem) -> ObjectId {
        match self {
            Self::Key => item.key,
            Self::Root => item.root_object(),
        }
    }
}

/// A named row predicate, or an AND of several.
///
/// Leaves carry a name so that one of several AND-ed filters can be removed
/// without disturbing the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordFilter {
    Field {
        name: String,
        field: FieldRef,
        target: FilterTarget,
        condition: Condition,
    },
    And(Vec<RecordFilter>),
}

impl RecordFilter {
    pub fn field(name: impl Into<String>, field: impl Into<FieldRef>, condition: Condition) -> Self {
        Self::Field {
            name: name.into(),
            field: field.into(),
            target: FilterTarget::Key,
            condition,
        }
    }

    /// Test the row's root object instead of its key object
    pub fn on_root(self) -> Self {
        match self {
            Self::Field {
                name,
                field,
                condition,
                ..
            } => Self::Field {
                name,
                field,
                target: FilterTarget::Root,
                condition,
            },
            other => other,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Field { name, .. } => Some(name),
            Self::And(_) => None,
        }
    }

    /// An empty AND accepts everything and counts as no filter at all
    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::And(members) if members.iter().all(RecordFilter::is_trivial))
    }

    /// Direct members of a composite, or the filter itself
    pub fn members(&self) -> Vec<&RecordFilter> {
        match self {
            Self::And(members) => members.iter().collect(),
            leaf => vec![leaf],
        }
    }

    fn leaves(&self) -> Vec<(&FieldRef, FilterTarget)> {
        match self {
            Self::Field { field, target, .. } => vec![(field, *target)],
            Self::And(members) => members.iter().flat_map(RecordFilter::leaves).collect(),
        }
    }

    pub fn referenced_fields(&self) -> Vec<&FieldRef> {
        self.leaves().into_iter().map(|(field, _)| field).collect()
    }

    pub fn depends_on(&self, field: &FieldRef) -> bool {
        self.referenced_fields().contains(&field)
    }

    pub fn validate<S: IdentityStore + ?Sized>(&self, store: &S) -> Result<()> {
        for field in self.referenced_fields() {
            if !store.field_exists(field) {
                return Err(ListError::SchemaDrift {
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Bulk-fetches every value this filter will look at for `items`
    pub fn preload<S: IdentityStore + ?Sized>(&self, store: &S, items: &[SortItem]) -> Result<PropertyCache> {
        let mut cache = PropertyCache::default();
        let leaves = self.leaves();
        for item in items {
            for (field, target) in &leaves {
                let object = target.object_of(item);
                let slot = (object, (*field).clone());
                if !cache.values.contains_key(&slot) {
                    let value = store.property(object, field)?;
                    cache.values.insert(slot, value);
                }
            }
        }
        Ok(cache)
    }

    /// Evaluates against preloaded values
    pub fn accept(&self, cache: &PropertyCache, item: &SortItem) -> Result<bool> {
        match self {
            Self::Field {
                field,
                target,
                condition,
                ..
            } => {
                let value = cache
                    .get(target.object_of(item), field)
                    .cloned()
                    .unwrap_or_default();
                condition.matches(&value)
            }
            Self::And(members) => {
                for member in members {
                    if !member.accept(cache, item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// One-off evaluation for a single row
    pub fn accepts<S: IdentityStore + ?Sized>(&self, store: &S, item: &SortItem) -> Result<bool> {
        let cache = self.preload(store, std::slice::from_ref(item))?;
        self.accept(&cache, item)
    }
}

/// Property values fetched ahead of filtering
#[derive(Debug, Default)]
pub struct PropertyCache {
    values: HashMap<(ObjectId, FieldRef), Value>,
}

impl PropertyCache {
    pub fn get(&self, object: ObjectId, field: &FieldRef) -> Option<&Value> {
        self.values.get(&(object, field.clone()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn collapse(mut members: Vec<RecordFilter>) -> Option<RecordFilter> {
    match members.len() {
        0 => None,
        1 => members.pop(),
        _ => Some(RecordFilter::And(members)),
    }
}

/// Applies one filter change to the active filter.
///
/// `removed` is taken out (from inside a composite if need be) and `added`
/// is AND-ed in. A composite left with one member collapses to that member,
/// and one left empty collapses to `None`, so "nothing filtered" is always
/// plain `None`.
pub fn compose_filter(
    active: Option<RecordFilter>,
    added: Option<RecordFilter>,
    removed: Option<&RecordFilter>,
) -> Option<RecordFilter> {
    let added = added.filter(|filter| !filter.is_trivial());

    match active {
        None => added,
        Some(active) if removed == Some(&active) => added,
        Some(RecordFilter::And(mut members)) => {
            if let Some(removed) = removed {
                members.retain(|member| member != removed);
            }
            if let Some(added) = added {
                if !members.contains(&added) {
                    members.push(added);
                }
            }
            collapse(members)
        }
        Some(active) => match added {
            Some(added) if added != active => Some(RecordFilter::And(vec![active, added])),
            _ => Some(active),
        },
    }
}
