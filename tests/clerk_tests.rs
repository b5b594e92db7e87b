// ============================================================================
// Integration Tests for RecordClerk
// ============================================================================
//
// Test Coverage:
// - Filter and sorter changes published as navigation
// - Dependent clerks reacting to deletions in their parent's records
// - Suspended loading released as a single announcement
// - Nested navigation suppression
//
// ============================================================================

use recordview::{
    ClerkEvent, Condition, InMemoryStore, ObjectId, OwningScope, RecordClerk, RecordFilter,
    RecordList, RecordListConfig, ScopeKind, Sorter,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn lexicon(forms: &[&str]) -> (InMemoryStore, ObjectId, Vec<ObjectId>) {
    let mut store = InMemoryStore::new();
    store
        .declare_vector("Lexicon.Entries")
        .declare_vector("Entry.Senses")
        .declare_scalar("Entry.Form");
    let root = store.create_root("Lexicon");
    let entries = forms
        .iter()
        .map(|form| {
            let id = store.create_owned(root, "Lexicon.Entries", "Entry").unwrap();
            store.set_property(id, "Entry.Form", *form).unwrap();
            id
        })
        .collect();
    (store, root, entries)
}

fn clerk(store: &InMemoryStore, root: ObjectId) -> RecordClerk {
    let list = RecordList::new(
        store,
        OwningScope::new(root, "Lexicon.Entries"),
        ScopeKind::Vector,
        RecordListConfig::new(),
    );
    let mut clerk = RecordClerk::new("entries", list);
    clerk.init(store).unwrap();
    clerk.take_events();
    clerk
}

fn navigated(events: &[ClerkEvent]) -> Vec<(Option<usize>, Option<ObjectId>, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            ClerkEvent::RecordNavigated {
                index,
                object,
                skip_navigation,
            } => Some((*index, *object, *skip_navigation)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// STRATEGY CHANGES
// ============================================================================

#[test]
fn test_filter_excluding_current_record_moves_selection() {
    let (store, root, entries) = lexicon(&["ant", "bee", "cow"]);
    let mut clerk = clerk(&store, root);
    clerk.last(&store).unwrap();
    clerk.take_events();

    let filter = RecordFilter::field("has-e", "Entry.Form", Condition::like("%e%"));
    clerk.on_change_filter(&store, Some(filter), None).unwrap();

    assert_eq!(clerk.list().len(), 1);
    assert_eq!(navigated(&clerk.take_events()), vec![(Some(0), Some(entries[1]), false)]);
}

#[test]
fn test_resort_keeps_current_record_and_skips_navigation() {
    let (store, root, entries) = lexicon(&["cow", "bee", "ant"]);
    let mut clerk = clerk(&store, root);
    clerk.take_events();

    clerk.change_sorter(&store, Some(Sorter::by("Entry.Form"))).unwrap();

    assert_eq!(clerk.current_object(), Some(entries[0]));
    assert_eq!(clerk.current_index(), Some(2));
    assert_eq!(navigated(&clerk.take_events()), vec![(Some(2), Some(entries[0]), true)]);
}

// ============================================================================
// DEPENDENTS
// ============================================================================

#[test]
fn test_dependent_purges_deleted_child_and_parent_keeps_place() {
    let (mut store, root, entries) = lexicon(&["ant", "bee"]);
    let sense = store.create_owned(entries[0], "Entry.Senses", "Sense").unwrap();
    let kept = store.create_owned(entries[0], "Entry.Senses", "Sense").unwrap();

    let mut parent = clerk(&store, root);
    let senses = RecordList::new(
        &store,
        OwningScope::new(entries[0], "Entry.Senses"),
        ScopeKind::Vector,
        RecordListConfig::new(),
    );
    parent.add_dependent(&store, RecordClerk::new("senses", senses)).unwrap();
    parent.take_events();

    store.delete_object(sense).unwrap();
    parent.process_notifications(&store).unwrap();

    let child = &parent.dependents()[0];
    assert_eq!(child.list().len(), 1);
    assert_eq!(child.current_object(), Some(kept));
    assert_eq!(parent.current_object(), Some(entries[0]));
    assert!(navigated(&parent.take_events()).iter().all(|(_, _, skip)| *skip));
}

#[test]
fn test_dependent_empties_when_parent_list_empties() {
    let (mut store, root, entries) = lexicon(&["ant"]);
    store.create_owned(entries[0], "Entry.Senses", "Sense").unwrap();

    let mut parent = clerk(&store, root);
    let senses = RecordList::new(
        &store,
        OwningScope::new(entries[0], "Entry.Senses"),
        ScopeKind::Vector,
        RecordListConfig::new(),
    );
    parent.add_dependent(&store, RecordClerk::new("senses", senses)).unwrap();

    store.delete_object(entries[0]).unwrap();
    parent.process_notifications(&store).unwrap();

    assert!(parent.list().is_empty());
    let events = parent.take_events();
    assert!(events.contains(&ClerkEvent::SelectedRecordRemoved(entries[0])));
    let child = parent.dependent_mut("senses").unwrap();
    assert!(child.list().is_empty());
    assert_eq!(child.current_object(), None);
}

// ============================================================================
// SUSPENSION
// ============================================================================

#[test]
fn test_suspended_loading_announces_once_on_release() {
    let (mut store, root, _) = lexicon(&["ant", "bee"]);
    let mut clerk = clerk(&store, root);

    clerk
        .update_list(&store, |list| list.set_list_loading_suppressed(&store, true))
        .unwrap();
    for form in ["cat", "dog", "eel"] {
        let id = store.create_owned(root, "Lexicon.Entries", "Entry").unwrap();
        store.set_property(id, "Entry.Form", form).unwrap();
        clerk.process_notifications(&store).unwrap();
    }
    assert!(clerk.take_events().is_empty());
    assert_eq!(clerk.list().len(), 2);

    clerk
        .update_list(&store, |list| list.set_list_loading_suppressed(&store, false))
        .unwrap();
    assert_eq!(clerk.list().len(), 5);
    assert_eq!(navigated(&clerk.take_events()).len(), 1);
}

#[test]
fn test_nested_suppression_publishes_at_outermost_resume() {
    let (store, root, entries) = lexicon(&["ant", "bee", "cow"]);
    let mut clerk = clerk(&store, root);

    clerk.suppress_navigation();
    clerk.suppress_navigation();
    clerk.next(&store).unwrap();
    clerk.resume_navigation(&store).unwrap();
    clerk.next(&store).unwrap();
    assert!(clerk.take_events().is_empty());

    clerk.resume_navigation(&store).unwrap();
    assert_eq!(
        clerk.take_events(),
        vec![ClerkEvent::RecordNavigated {
            index: Some(2),
            object: Some(entries[2]),
            skip_navigation: false,
        }]
    );
}
