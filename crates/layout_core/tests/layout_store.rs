use layout_core::db::open_db_in_memory;
use layout_core::{
    DefaultPromotion, DefaultSwap, EnsuredDefault, IdentifierMode, Layout, LayoutConflict,
    LayoutFilter, LayoutOrder, LayoutPatch, LayoutScope, LayoutStore, Pagination, RepoError,
    SqliteLayoutStore,
};
use rusqlite::Connection;
use uuid::Uuid;

const CONTENT: &str = "<html><body>{{{body}}}</body></html>";

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn new_scope() -> LayoutScope {
    LayoutScope::new(Uuid::new_v4(), Uuid::new_v4())
}

fn layout(scope: &LayoutScope, name: &str) -> Layout {
    Layout::new(*scope, Uuid::new_v4(), name, CONTENT)
}

#[test]
fn first_insert_fills_vacant_default_and_second_does_not() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();

    let first = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    let second = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();

    assert!(first.is_default);
    assert!(!second.is_default);
    assert!(first.created_at > 0);
    assert_eq!(first.created_at, first.updated_at);
    assert_eq!(store.current_default(&scope).unwrap().unwrap().id, first.id);
}

#[test]
fn insert_never_promotion_leaves_environment_without_default() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();

    let stored = store
        .insert(
            &layout(&scope, "Plain"),
            DefaultPromotion::Never,
            IdentifierMode::Exact,
        )
        .unwrap();
    assert!(!stored.is_default);
    assert!(store.current_default(&scope).unwrap().is_none());
}

#[test]
fn duplicate_active_name_or_identifier_is_conflict() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();

    let err = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(LayoutConflict::Name(name)) if name == "Welcome"));

    let mut same_slug = layout(&scope, "Welcome!");
    same_slug.identifier = "welcome".to_string();
    let err = store
        .insert(
            &same_slug,
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Conflict(LayoutConflict::Identifier(identifier)) if identifier == "welcome"
    ));

    // Other environments are independent.
    store
        .insert(
            &layout(&new_scope(), "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
}

#[test]
fn get_by_id_is_scoped_to_environment() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let stored = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();

    assert_eq!(
        store.get_by_id(stored.id, &scope, false).unwrap(),
        Some(stored.clone())
    );
    assert!(store
        .get_by_id(stored.id, &new_scope(), false)
        .unwrap()
        .is_none());
}

#[test]
fn update_applies_patch_and_rejects_taken_name() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let welcome = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();

    let patch = LayoutPatch {
        description: Some(Some("Greets new users".to_string())),
        content: Some("<main>{{{body}}}</main>".to_string()),
        ..LayoutPatch::default()
    };
    let updated = store.update(welcome.id, &scope, &patch).unwrap();
    assert_eq!(updated.description.as_deref(), Some("Greets new users"));
    assert_eq!(updated.content, "<main>{{{body}}}</main>");
    assert_eq!(updated.name, "Welcome");
    assert!(updated.is_default);
    assert!(updated.updated_at >= welcome.updated_at);

    let rename = LayoutPatch {
        name: Some("Alert".to_string()),
        ..LayoutPatch::default()
    };
    let err = store.update(welcome.id, &scope, &rename).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(LayoutConflict::Name(_))));

    let err = store
        .update(Uuid::new_v4(), &scope, &rename)
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn soft_delete_tombstones_and_hides_from_default_reads() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    let alert = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();

    store.soft_delete(alert.id, &scope).unwrap();

    assert!(store.get_by_id(alert.id, &scope, false).unwrap().is_none());
    let tombstone = store.find_deleted(alert.id, &scope).unwrap().unwrap();
    assert!(tombstone.deleted_at.is_some());
    assert!(!tombstone.is_default);
    assert!(store.get_by_id(alert.id, &scope, true).unwrap().is_some());

    let err = store.soft_delete(alert.id, &scope).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == alert.id));
}

#[test]
fn soft_delete_of_default_is_rejected() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let welcome = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();

    let err = store.soft_delete(welcome.id, &scope).unwrap_err();
    assert!(matches!(err, RepoError::DefaultLayout(id) if id == welcome.id));
    assert!(store.get_by_id(welcome.id, &scope, false).unwrap().is_some());
}

#[test]
fn deleted_name_can_be_reused_and_blocks_restore() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    let alert = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    store.soft_delete(alert.id, &scope).unwrap();

    let replacement = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    assert_ne!(replacement.id, alert.id);

    let err = store.restore(alert.id, &scope).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(LayoutConflict::Name(_))));
}

#[test]
fn restore_reactivates_without_taking_existing_default() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let welcome = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    let alert = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    store.soft_delete(alert.id, &scope).unwrap();

    let restored = store.restore(alert.id, &scope).unwrap();
    assert!(restored.is_active());
    assert!(!restored.is_default);
    assert_eq!(store.current_default(&scope).unwrap().unwrap().id, welcome.id);

    let err = store.restore(alert.id, &scope).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn filter_matches_name_substring_case_insensitively_with_total_count() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    for name in ["Welcome", "Weekly digest", "Alert", "Password reset", "weekend promo"] {
        store
            .insert(
                &layout(&scope, name),
                DefaultPromotion::IfVacant,
                IdentifierMode::Exact,
            )
            .unwrap();
    }

    let criteria = LayoutFilter {
        name_contains: Some("WE".to_string()),
        include_deleted: false,
        order: LayoutOrder::NameAscending,
    };
    let first_page = store
        .filter(
            &scope,
            &criteria,
            &Pagination {
                limit: Some(2),
                offset: 0,
            },
        )
        .unwrap();
    let names: Vec<&str> = first_page.items.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["weekend promo", "Weekly digest"]);
    assert_eq!(first_page.total_count, 3);

    let second_page = store
        .filter(
            &scope,
            &criteria,
            &Pagination {
                limit: Some(2),
                offset: 2,
            },
        )
        .unwrap();
    let names: Vec<&str> = second_page.items.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Welcome"]);
    assert_eq!(second_page.total_count, 3);
}

#[test]
fn filter_excludes_tombstones_unless_requested() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    let alert = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    store.soft_delete(alert.id, &scope).unwrap();

    let active = store
        .filter(&scope, &LayoutFilter::default(), &Pagination::default())
        .unwrap();
    assert_eq!(active.total_count, 1);
    assert_eq!(active.items.len(), 1);

    let all = store
        .filter(
            &scope,
            &LayoutFilter {
                include_deleted: true,
                ..LayoutFilter::default()
            },
            &Pagination::default(),
        )
        .unwrap();
    assert_eq!(all.total_count, 2);

    let other = store
        .filter(&new_scope(), &LayoutFilter::default(), &Pagination::default())
        .unwrap();
    assert_eq!(other.total_count, 0);
    assert!(other.items.is_empty());
}

#[test]
fn compare_and_swap_moves_default_and_detects_stale_expectation() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let welcome = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    let alert = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();

    let swap = store
        .compare_and_swap_default(&scope, Some(welcome.id), alert.id)
        .unwrap();
    match swap {
        DefaultSwap::Swapped { previous, current } => {
            let previous = previous.unwrap();
            assert_eq!(previous.id, welcome.id);
            assert!(!previous.is_default);
            assert_eq!(current.id, alert.id);
            assert!(current.is_default);
        }
        other => panic!("unexpected swap outcome: {other:?}"),
    }

    let stale = store
        .compare_and_swap_default(&scope, Some(alert.id), welcome.id)
        .unwrap();
    assert!(matches!(stale, DefaultSwap::Swapped { .. }));

    let stale = store
        .compare_and_swap_default(&scope, Some(alert.id), alert.id)
        .unwrap();
    assert!(matches!(stale, DefaultSwap::Stale { current: Some(id) } if id == welcome.id));

    let unchanged = store
        .compare_and_swap_default(&scope, None, welcome.id)
        .unwrap();
    assert!(matches!(unchanged, DefaultSwap::Unchanged(layout) if layout.id == welcome.id));
}

#[test]
fn compare_and_swap_to_deleted_layout_is_not_found() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let welcome = store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    let alert = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap();
    store.soft_delete(alert.id, &scope).unwrap();

    let err = store
        .compare_and_swap_default(&scope, Some(welcome.id), alert.id)
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == alert.id));
    assert_eq!(store.current_default(&scope).unwrap().unwrap().id, welcome.id);
}

#[test]
fn insert_default_if_absent_returns_existing_default() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();

    let created = store
        .insert_default_if_absent(&layout(&scope, "Default Layout"))
        .unwrap();
    let created = match created {
        EnsuredDefault::Created(layout) => layout,
        other => panic!("expected a created default, got {other:?}"),
    };
    assert!(created.is_default);

    let again = store
        .insert_default_if_absent(&layout(&scope, "Another Default"))
        .unwrap();
    assert!(matches!(&again, EnsuredDefault::Existing(layout) if layout.id == created.id));

    let page = store
        .filter(&scope, &LayoutFilter::default(), &Pagination::default())
        .unwrap();
    assert_eq!(page.total_count, 1);
}

#[test]
fn derived_identifier_is_suffixed_until_free() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();

    let identifiers: Vec<String> = ["Alert", "alert", "Alert!"]
        .into_iter()
        .map(|name| {
            store
                .insert(
                    &layout(&scope, name),
                    DefaultPromotion::IfVacant,
                    IdentifierMode::DeriveUnique,
                )
                .unwrap()
                .identifier
        })
        .collect();
    assert_eq!(identifiers, vec!["alert", "alert-2", "alert-3"]);

    let err = store
        .insert(
            &layout(&scope, "ALERT"),
            DefaultPromotion::IfVacant,
            IdentifierMode::Exact,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Conflict(LayoutConflict::Identifier(identifier)) if identifier == "alert"
    ));
}

#[test]
fn derived_identifier_suffix_respects_length_limit() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let long_name = "x".repeat(100);

    let first = store
        .insert(
            &layout(&scope, &long_name),
            DefaultPromotion::IfVacant,
            IdentifierMode::DeriveUnique,
        )
        .unwrap();
    let mut second = layout(&scope, "Other name");
    second.identifier = first.identifier.clone();
    let second = store
        .insert(
            &second,
            DefaultPromotion::IfVacant,
            IdentifierMode::DeriveUnique,
        )
        .unwrap();

    assert_eq!(first.identifier.len(), 64);
    assert_eq!(second.identifier.len(), 64);
    assert!(second.identifier.ends_with("-2"));
}

#[test]
fn filter_folds_non_ascii_case() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    for name in ["ÉTÉ Newsletter", "Привет", "Summer"] {
        store
            .insert(
                &layout(&scope, name),
                DefaultPromotion::IfVacant,
                IdentifierMode::DeriveUnique,
            )
            .unwrap();
    }

    for (needle, expected) in [("été", "ÉTÉ Newsletter"), ("ПРИВ", "Привет")] {
        let page = store
            .filter(
                &scope,
                &LayoutFilter {
                    name_contains: Some(needle.to_string()),
                    ..LayoutFilter::default()
                },
                &Pagination::default(),
            )
            .unwrap();
        assert_eq!(page.total_count, 1, "needle {needle}");
        assert_eq!(page.items[0].name, expected);
    }
}

#[test]
fn renamed_layout_is_found_by_new_folded_name() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    let stored = store
        .insert(
            &layout(&scope, "Summer"),
            DefaultPromotion::IfVacant,
            IdentifierMode::DeriveUnique,
        )
        .unwrap();
    let patch = LayoutPatch {
        name: Some("Öffnungszeiten".to_string()),
        ..LayoutPatch::default()
    };
    store.update(stored.id, &scope, &patch).unwrap();

    let criteria = |needle: &str| LayoutFilter {
        name_contains: Some(needle.to_string()),
        ..LayoutFilter::default()
    };
    let found = store
        .filter(&scope, &criteria("ÖFFNUNG"), &Pagination::default())
        .unwrap();
    assert_eq!(found.total_count, 1);
    let stale = store
        .filter(&scope, &criteria("summer"), &Pagination::default())
        .unwrap();
    assert_eq!(stale.total_count, 0);
}

#[test]
fn restore_replaces_identifier_taken_while_deleted() {
    let conn = setup();
    let store = SqliteLayoutStore::try_new(&conn).unwrap();
    let scope = new_scope();
    store
        .insert(
            &layout(&scope, "Welcome"),
            DefaultPromotion::IfVacant,
            IdentifierMode::DeriveUnique,
        )
        .unwrap();
    let alert = store
        .insert(
            &layout(&scope, "Alert"),
            DefaultPromotion::IfVacant,
            IdentifierMode::DeriveUnique,
        )
        .unwrap();
    store.soft_delete(alert.id, &scope).unwrap();
    let newcomer = store
        .insert(
            &layout(&scope, "Alert!"),
            DefaultPromotion::IfVacant,
            IdentifierMode::DeriveUnique,
        )
        .unwrap();
    assert_eq!(newcomer.identifier, "alert");

    let restored = store.restore(alert.id, &scope).unwrap();
    assert_eq!(restored.name, "Alert");
    assert_eq!(restored.identifier, "alert-2");
}
