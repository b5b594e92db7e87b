use crate::core::{FieldRef, ObjectId, OwningScope, Result};
use crate::storage::IdentityStore;

/// What kind of collection a list presents.
///
/// Each kind carries its own answers to: which objects make up the list,
/// whether bounded changes can be spliced in, and whether users may create
/// records in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    /// The objects in `owner.property`
    Vector,
    /// Every `child_field` element of every object in `owner.property`
    Flattened { child_field: FieldRef },
    /// A fixed result set, e.g. search hits; `owner` only anchors the list
    Matching { ids: Vec<ObjectId> },
}

impl ScopeKind {
    pub fn flattened(child_field: impl Into<FieldRef>) -> Self {
        Self::Flattened {
            child_field: child_field.into(),
        }
    }

    /// Live source objects, before sorter expansion and filtering
    pub fn enumerate<S: IdentityStore + ?Sized>(
        &self,
        store: &S,
        scope: &OwningScope,
    ) -> Result<Vec<ObjectId>> {
        match self {
            Self::Vector => store.vector_property(scope.owner, &scope.property),
            Self::Flattened { child_field } => {
                let mut objects = Vec::new();
                for parent in store.vector_property(scope.owner, &scope.property)? {
                    objects.extend(store.vector_property(parent, child_field)?);
                }
                Ok(objects)
            }
            Self::Matching { ids } => Ok(ids.iter().copied().filter(|id| store.is_valid(*id)).collect()),
        }
    }

    /// Only a plain vector maps notification positions onto list rows
    pub fn supports_patch(&self) -> bool {
        matches!(self, Self::Vector)
    }

    pub fn allows_insertion(&self) -> bool {
        !matches!(self, Self::Matching { .. })
    }

    /// Whether `object` (or one of its owners) belongs to this collection
    pub fn covers<S: IdentityStore + ?Sized>(
        &self,
        store: &S,
        scope: &OwningScope,
        object: ObjectId,
    ) -> bool {
        let chain = store.ancestors_and_self(object);
        match self {
            Self::Vector | Self::Flattened { .. } => chain.iter().any(|candidate| {
                store.get_owner(*candidate) == Some(scope.owner)
                    && store.owning_field(*candidate).as_ref() == Some(&scope.property)
            }),
            Self::Matching { ids } => chain.iter().any(|candidate| ids.contains(candidate)),
        }
    }
}
