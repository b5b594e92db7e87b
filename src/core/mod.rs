pub mod error;
pub mod ids;
pub mod sort_item;
pub mod value;

pub use error::{ListError, Result};
pub use ids::{ClassId, FieldRef, ObjectId, OwningScope};
pub use sort_item::{SortItem, purge_stale};
pub use value::Value;
