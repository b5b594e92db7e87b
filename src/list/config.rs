use crate::core::{ClassId, FieldRef};
use crate::pipeline::Sorter;
use std::collections::HashSet;

/// Record list configuration
///
/// Built like a connection config: start from `new()` and chain setters.
#[derive(Debug, Clone)]
pub struct RecordListConfig {
    /// Role part of the persistence key (e.g. "browse", "bulk-edit")
    pub persist_role: String,

    /// Skip loading in `init_load`; the first `ensure_loaded` does it
    pub defer_load: bool,

    /// Deletion-only changes at or above this share of the list trigger a
    /// full reload instead of a purge
    pub purge_ratio: f64,

    /// Largest insert count still handled by splicing
    pub max_patch_inserts: usize,

    /// Fields whose change only relabels a row
    pub display_fields: HashSet<FieldRef>,

    /// Sorter installed at construction and after schema-drift recovery
    pub default_sorter: Option<Sorter>,

    /// Classes a user may create directly in this list
    pub insertable_classes: Vec<ClassId>,
}

impl RecordListConfig {
    pub fn new() -> Self {
        Self {
            persist_role: "default".to_string(),
            defer_load: false,
            purge_ratio: 0.5,
            max_patch_inserts: 1,
            display_fields: HashSet::new(),
            default_sorter: None,
            insertable_classes: Vec::new(),
        }
    }

    pub fn persist_role(mut self, role: &str) -> Self {
        self.persist_role = role.to_string();
        self
    }

    pub fn defer_load(mut self, defer: bool) -> Self {
        self.defer_load = defer;
        self
    }

    pub fn purge_ratio(mut self, ratio: f64) -> Self {
        self.purge_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_patch_inserts(mut self, max: usize) -> Self {
        self.max_patch_inserts = max;
        self
    }

    pub fn display_field(mut self, field: impl Into<FieldRef>) -> Self {
        self.display_fields.insert(field.into());
        self
    }

    pub fn default_sorter(mut self, sorter: Sorter) -> Self {
        self.default_sorter = Some(sorter);
        self
    }

    pub fn insertable_class(mut self, class: impl Into<ClassId>) -> Self {
        self.insertable_classes.push(class.into());
        self
    }

    /// Whether deleting `deleted` rows out of `len` is cheap enough to purge
    pub fn should_purge(&self, deleted: usize, len: usize) -> bool {
        deleted > 0 && (deleted as f64) < (len as f64) * self.purge_ratio
    }
}

impl Default for RecordListConfig {
    fn default() -> Self {
        Self::new()
    }
}
