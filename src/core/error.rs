use crate::core::{FieldRef, ObjectId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListError {
    #[error("Object {0} is no longer valid")]
    StaleReference(ObjectId),

    #[error("Field '{field}' does not exist")]
    SchemaDrift { field: FieldRef },

    #[error("Persisted list state is corrupt: {0}")]
    CorruptPersistedState(String),

    #[error("Object {0} not found")]
    UnknownObject(ObjectId),

    #[error("Object {0} is not in the list")]
    ObjectNotInList(ObjectId),

    #[error("Field '{0}' is not bound in the ownership tree")]
    UnmappedField(FieldRef),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid LIKE pattern: {0}")]
    InvalidPattern(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Reload failed: {0}")]
    ReloadFailed(String),
}

impl ListError {
    /// Whether the error means a sorter or filter refers to a vanished field.
    pub fn is_schema_drift(&self) -> bool {
        matches!(self, Self::SchemaDrift { .. })
    }
}

pub type Result<T> = std::result::Result<T, ListError>;

impl From<std::io::Error> for ListError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
