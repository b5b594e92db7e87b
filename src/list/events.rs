use crate::core::{FieldRef, ObjectId};

/// How consumers should react to a list change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListAction {
    /// Contents changed; redraw and treat the current record as (re)navigated
    Normal,
    /// Same current object, possibly at a new index; redraw only
    SkipNavigation,
    /// Contents came from persisted state; nothing new to save
    SuppressSave,
    /// Only the label of one row changed
    UpdateRowDisplay,
}

/// Which part of the list a change touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListExtent {
    /// Rebuilt from scratch
    Full,
    /// Bounded splice starting at `start`
    Patch {
        start: usize,
        inserted: usize,
        deleted: usize,
    },
    /// A single row, contents only
    Row(usize),
}

/// List-changed event produced for the orchestrating layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListChanged {
    pub action: ListAction,
    pub affected: Option<ObjectId>,
    pub extent: ListExtent,
}

impl ListChanged {
    pub fn is_full_reload(&self) -> bool {
        self.extent == ListExtent::Full
    }
}

/// User-facing conditions the list recovered from on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListNotice {
    /// The selected record was deleted elsewhere; a neighbour was selected
    SelectedRecordRemoved(ObjectId),
    /// Sorter/filter named a field that no longer exists and were reset
    SchemaDriftRecovered { field: FieldRef },
}

/// Counters for what the engine actually did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListStats {
    pub full_reloads: u64,
    pub patches: u64,
    pub purges: u64,
    /// Reload requests absorbed while loading was suppressed
    pub coalesced_requests: u64,
}
