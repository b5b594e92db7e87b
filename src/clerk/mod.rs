// ============================================================================
// Record Clerk
// ============================================================================
//
// Thin orchestration over one RecordList:
//
//   list events ──absorb──> clerk events (RecordNavigated, RowDisplayChanged,
//                           SelectedRecordRemoved, SchemaDriftRecovered)
//                    └────> dependent clerks re-targeted, list state saved
//
// Dependent clerks show a field of the parent's current record. They are
// owned by the parent and always processed after it.
//
// ============================================================================

mod navigation;

use crate::core::{FieldRef, ObjectId, Result};
use crate::correspond::OwnershipTree;
use crate::list::{ListAction, ListExtent, ListNotice, RecordList};
use crate::pipeline::{RecordFilter, Sorter};
use crate::storage::IdentityStore;
use tracing::{debug, warn};

/// What a clerk tells the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClerkEvent {
    RecordNavigated {
        index: Option<usize>,
        object: Option<ObjectId>,
        /// The current object did not change; only redraw
        skip_navigation: bool,
    },
    RowDisplayChanged {
        index: usize,
        object: Option<ObjectId>,
    },
    SelectedRecordRemoved(ObjectId),
    SchemaDriftRecovered {
        field: FieldRef,
    },
}

/// A navigation announcement held back by a suppression window
#[derive(Debug, Default, Clone, Copy)]
struct HeldNavigation {
    pending: bool,
    skip_navigation: bool,
    save: bool,
}

pub struct RecordClerk {
    name: String,
    list: RecordList,
    events: Vec<ClerkEvent>,
    auto_save: bool,
    suppress_depth: usize,
    held: HeldNavigation,
    dependents: Vec<RecordClerk>,
}

impl RecordClerk {
    pub fn new(name: impl Into<String>, list: RecordList) -> Self {
        Self {
            name: name.into(),
            list,
            events: Vec::new(),
            auto_save: true,
            suppress_depth: 0,
            held: HeldNavigation::default(),
            dependents: Vec::new(),
        }
    }

    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn list(&self) -> &RecordList {
        &self.list
    }

    pub fn current_object(&self) -> Option<ObjectId> {
        self.list.current_object()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.list.current_index()
    }

    pub fn take_events(&mut self) -> Vec<ClerkEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn dependents(&self) -> &[RecordClerk] {
        &self.dependents
    }

    pub fn dependent_mut(&mut self, name: &str) -> Option<&mut RecordClerk> {
        self.dependents.iter_mut().find(|clerk| clerk.name == name)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Loads the list, restoring saved state when possible. Dependents load
    /// as the first record is announced.
    pub fn init<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.list.init_load(store)?;
        self.absorb(store)
    }

    /// Adopts `child`, whose list owner will follow this clerk's current
    /// record. Deletions in either list's field mark the other for reload.
    pub fn add_dependent<S: IdentityStore + ?Sized>(&mut self, store: &S, mut child: RecordClerk) -> Result<()> {
        let parent_field = self.list.scope().property.clone();
        let child_field = child.list.scope().property.clone();
        self.list.watch_related_field(child_field);
        child.list.watch_related_field(parent_field);

        debug!(parent = %self.name, child = %child.name, "adding dependent clerk");
        self.dependents.push(child);
        if self.list.is_loaded() {
            self.retarget_dependent(store, self.dependents.len() - 1)?;
        }
        Ok(())
    }

    fn retarget_dependent<S: IdentityStore + ?Sized>(&mut self, store: &S, index: usize) -> Result<()> {
        let Some(owner) = self.list.current_object() else {
            return Ok(());
        };
        let child = &mut self.dependents[index];
        child.list.set_owner(store, owner)?;
        child.absorb(store)
    }

    // ========================================================================
    // Change processing
    // ========================================================================

    /// Applies pending store changes to this clerk and its dependents,
    /// parent first, then flushes deferred reloads in the same order
    pub fn process_notifications<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.process_tree(store)?;
        self.flush_tree(store)
    }

    fn process_tree<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.list.process_notifications(store)?;
        self.absorb(store)?;
        for child in &mut self.dependents {
            child.process_tree(store)?;
        }
        Ok(())
    }

    fn flush_tree<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.list.flush_pending(store)? {
            self.absorb(store)?;
        }
        for child in &mut self.dependents {
            child.flush_tree(store)?;
        }
        Ok(())
    }

    /// Runs `edit` against the list and then publishes whatever it changed
    pub fn update_list<S, T, F>(&mut self, store: &S, edit: F) -> Result<T>
    where
        S: IdentityStore + ?Sized,
        F: FnOnce(&mut RecordList) -> Result<T>,
    {
        let outcome = edit(&mut self.list);
        self.absorb(store)?;
        outcome
    }

    pub fn on_change_filter<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        added: Option<RecordFilter>,
        removed: Option<&RecordFilter>,
    ) -> Result<()> {
        self.update_list(store, |list| list.on_change_filter(store, added, removed))
    }

    pub fn change_sorter<S: IdentityStore + ?Sized>(&mut self, store: &S, sorter: Option<Sorter>) -> Result<()> {
        self.update_list(store, |list| list.change_sorter(store, sorter))
    }

    /// Replaces the list with one over another field and selects the record
    /// corresponding to the old selection. Returns the selected object.
    pub fn switch_scope<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        tree: &OwnershipTree,
        list: RecordList,
    ) -> Result<Option<ObjectId>> {
        let old_field = self.list.item_field().clone();
        let selection: Vec<ObjectId> = self.list.current_object().into_iter().collect();

        let previous = std::mem::replace(&mut self.list, list);
        previous.close(store);
        self.list.init_load(store)?;
        let selected = self
            .list
            .select_corresponding(store, tree, &old_field, &selection)?;
        debug!(clerk = %self.name, from = %old_field, to = %self.list.item_field(), selected = ?selected, "switched scope");

        self.list.take_events();
        self.record_navigated(store, false, true)?;
        self.absorb(store)?;
        Ok(selected)
    }

    // ========================================================================
    // Event translation
    // ========================================================================

    fn absorb<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        for notice in self.list.take_notices() {
            self.events.push(match notice {
                ListNotice::SelectedRecordRemoved(id) => ClerkEvent::SelectedRecordRemoved(id),
                ListNotice::SchemaDriftRecovered { field } => ClerkEvent::SchemaDriftRecovered { field },
            });
        }

        let mut navigation: Option<(bool, bool)> = None;
        for event in self.list.take_events() {
            match (event.action, event.extent) {
                (ListAction::UpdateRowDisplay, ListExtent::Row(index)) => {
                    self.events.push(ClerkEvent::RowDisplayChanged {
                        index,
                        object: event.affected,
                    });
                }
                (ListAction::UpdateRowDisplay, _) => {}
                (action, _) => {
                    let (skip, save) = navigation.unwrap_or((true, false));
                    navigation = Some((
                        skip && action == ListAction::SkipNavigation,
                        save || action != ListAction::SuppressSave,
                    ));
                }
            }
        }

        match navigation {
            Some((skip_navigation, save)) => self.record_navigated(store, skip_navigation, save),
            None => Ok(()),
        }
    }

    fn record_navigated<S: IdentityStore + ?Sized>(
        &mut self,
        store: &S,
        skip_navigation: bool,
        save: bool,
    ) -> Result<()> {
        if self.suppress_depth > 0 {
            self.held.skip_navigation = if self.held.pending {
                self.held.skip_navigation && skip_navigation
            } else {
                skip_navigation
            };
            self.held.pending = true;
            self.held.save |= save;
            return Ok(());
        }

        self.events.push(ClerkEvent::RecordNavigated {
            index: self.list.current_index(),
            object: self.list.current_object(),
            skip_navigation,
        });
        for index in 0..self.dependents.len() {
            self.retarget_dependent(store, index)?;
        }
        if save && self.auto_save {
            if let Err(err) = self.list.save_state(store) {
                warn!(clerk = %self.name, error = %err, "could not save list state");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Navigation suppression
    // ========================================================================

    /// Holds back `RecordNavigated` until the matching `resume_navigation`
    pub fn suppress_navigation(&mut self) {
        self.suppress_depth += 1;
    }

    /// Ends a suppression window; the outermost end publishes one
    /// `RecordNavigated` if anything was held back
    pub fn resume_navigation<S: IdentityStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        self.suppress_depth = self.suppress_depth.saturating_sub(1);
        if self.suppress_depth > 0 {
            return Ok(());
        }
        let held = std::mem::take(&mut self.held);
        if held.pending {
            self.record_navigated(store, held.skip_navigation, held.save)?;
        }
        Ok(())
    }

    pub fn with_navigation_suppressed<S, T, F>(&mut self, store: &S, body: F) -> Result<T>
    where
        S: IdentityStore + ?Sized,
        F: FnOnce(&mut RecordClerk) -> Result<T>,
    {
        self.suppress_navigation();
        let outcome = body(self);
        let resumed = self.resume_navigation(store);
        let value = outcome?;
        resumed?;
        Ok(value)
    }
}

impl std::fmt::Debug for RecordClerk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordClerk")
            .field("name", &self.name)
            .field("list", &self.list)
            .field("dependents", &self.dependents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OwningScope;
    use crate::list::{RecordListConfig, ScopeKind};
    use crate::storage::InMemoryStore;

    fn lexicon() -> (InMemoryStore, ObjectId, Vec<ObjectId>) {
        let mut store = InMemoryStore::new();
        store
            .declare_vector("Lexicon.Entries")
            .declare_vector("Entry.Senses")
            .declare_scalar("Entry.Form")
            .declare_scalar("Sense.Gloss");
        let root = store.create_root("Lexicon");
        let entries = ["ant", "bee", "cow"]
            .iter()
            .map(|form| {
                let id = store.create_owned(root, "Lexicon.Entries", "Entry").unwrap();
                store.set_property(id, "Entry.Form", *form).unwrap();
                id
            })
            .collect();
        (store, root, entries)
    }

    fn entries_clerk(store: &InMemoryStore, root: ObjectId) -> RecordClerk {
        let list = RecordList::new(
            store,
            OwningScope::new(root, "Lexicon.Entries"),
            ScopeKind::Vector,
            RecordListConfig::new().display_field("Entry.Form"),
        );
        RecordClerk::new("entries", list)
    }

    #[test]
    fn test_init_announces_first_record() {
        let (store, root, entries) = lexicon();
        let mut clerk = entries_clerk(&store, root);
        clerk.init(&store).unwrap();
        assert_eq!(
            clerk.take_events(),
            vec![ClerkEvent::RecordNavigated {
                index: Some(0),
                object: Some(entries[0]),
                skip_navigation: false,
            }]
        );
    }

    #[test]
    fn test_display_change_is_not_navigation() {
        let (mut store, root, entries) = lexicon();
        let mut clerk = entries_clerk(&store, root);
        clerk.init(&store).unwrap();
        clerk.take_events();

        store.set_property(entries[1], "Entry.Form", "bat").unwrap();
        clerk.process_notifications(&store).unwrap();
        assert_eq!(
            clerk.take_events(),
            vec![ClerkEvent::RowDisplayChanged {
                index: 1,
                object: Some(entries[1]),
            }]
        );
    }

    #[test]
    fn test_dependent_follows_parent_selection() {
        let (mut store, root, entries) = lexicon();
        let s1 = store.create_owned(entries[0], "Entry.Senses", "Sense").unwrap();
        let s2 = store.create_owned(entries[1], "Entry.Senses", "Sense").unwrap();
        let s3 = store.create_owned(entries[1], "Entry.Senses", "Sense").unwrap();

        let mut parent = entries_clerk(&store, root);
        let senses = RecordList::new(
            &store,
            OwningScope::new(entries[0], "Entry.Senses"),
            ScopeKind::Vector,
            RecordListConfig::new(),
        );
        parent.add_dependent(&store, RecordClerk::new("senses", senses)).unwrap();
        parent.init(&store).unwrap();

        let child = &parent.dependents()[0];
        assert_eq!(child.list().items().len(), 1);
        assert_eq!(child.current_object(), Some(s1));

        parent.next(&store).unwrap();
        let child = &parent.dependents()[0];
        assert_eq!(child.list().scope().owner, entries[1]);
        let keys: Vec<_> = child.list().items().iter().map(|item| item.key).collect();
        assert_eq!(keys, vec![s2, s3]);
    }

    #[test]
    fn test_suppression_window_coalesces_navigation() {
        let (store, root, entries) = lexicon();
        let mut clerk = entries_clerk(&store, root);
        clerk.init(&store).unwrap();
        clerk.take_events();

        clerk
            .with_navigation_suppressed(&store, |clerk| {
                clerk.next(&store)?;
                clerk.next(&store)?;
                clerk.previous(&store)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(
            clerk.take_events(),
            vec![ClerkEvent::RecordNavigated {
                index: Some(1),
                object: Some(entries[1]),
                skip_navigation: false,
            }]
        );
    }

    #[test]
    fn test_deleting_current_record_reports_removal() {
        let (mut store, root, entries) = lexicon();
        let mut clerk = entries_clerk(&store, root);
        clerk.init(&store).unwrap();
        clerk.jump_to_object(&store, entries[1]).unwrap();
        clerk.take_events();

        store.delete_object(entries[1]).unwrap();
        clerk.process_notifications(&store).unwrap();
        let events = clerk.take_events();
        assert_eq!(events[0], ClerkEvent::SelectedRecordRemoved(entries[1]));
        assert_eq!(clerk.current_object(), Some(entries[2]));
    }
}
