// ============================================================================
// Identifiers
// ============================================================================
//
// Object ids are handed out by the identity store and are only meaningful
// while the object is alive. Classes and fields are named, so persisted
// state and configuration stay readable.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-local identifier of an object in the identity store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Class (kind) of an object, e.g. `Entry` or `Sense`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Named property of an object, either scalar or an owning vector
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef(String);

impl FieldRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The live collection a list is derived from: `owner.property`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwningScope {
    pub owner: ObjectId,
    pub property: FieldRef,
}

impl OwningScope {
    pub fn new(owner: ObjectId, property: impl Into<FieldRef>) -> Self {
        Self {
            owner,
            property: property.into(),
        }
    }

    /// True when a change on `(object, field)` targets this very collection
    pub fn matches(&self, object: ObjectId, field: &FieldRef) -> bool {
        self.owner == object && &self.property == field
    }
}

impl fmt::Display for OwningScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.property)
    }
}
