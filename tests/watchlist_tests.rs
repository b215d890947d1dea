mod common;

use animeverse::domain::WatchStatus;
use animeverse::models::filter::FilterParams;
use animeverse::services::CatalogError;
use common::{FakeProvider, complete_record, test_state};

#[tokio::test]
async fn adding_copies_the_canonical_record() {
    let state = test_state(FakeProvider::new()).await;
    let canonical = complete_record("Naruto", 8.0);
    state.store.insert_anime(&canonical).await.unwrap();

    let entry = state
        .watchlist
        .add_to_list("user-a", "naruto", WatchStatus::Watching)
        .await
        .unwrap();

    assert_ne!(entry.id, canonical.id);
    assert_eq!(entry.user_id.as_deref(), Some("user-a"));
    assert_eq!(entry.name, "Naruto");
    assert_eq!(entry.status, Some(WatchStatus::Watching));
    assert_eq!(entry.synopsis, canonical.synopsis);
    assert_eq!(entry.progress.watched, 0);
    assert_eq!(entry.progress.total, 220);
}

#[tokio::test]
async fn unknown_title_becomes_a_stub() {
    let provider = FakeProvider::new();
    let state = test_state(provider.clone()).await;

    let entry = state
        .watchlist
        .add_to_list("user-a", "Some Obscure OVA", WatchStatus::PlanToWatch)
        .await
        .unwrap();

    assert_eq!(entry.notes, "Added by user");
    assert_eq!(entry.status, Some(WatchStatus::PlanToWatch));
    assert!(entry.synopsis.is_empty());
    assert_eq!(FakeProvider::calls(&provider.search_calls), 1);
}

#[tokio::test]
async fn adding_twice_conflicts() {
    let state = test_state(FakeProvider::new()).await;
    state
        .store
        .insert_anime(&complete_record("Naruto", 8.0))
        .await
        .unwrap();

    state
        .watchlist
        .add_to_list("user-a", "Naruto", WatchStatus::Watching)
        .await
        .unwrap();
    let err = state
        .watchlist
        .add_to_list("user-a", "Naruto", WatchStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Conflict(_)));

    // Another user's list is independent.
    state
        .watchlist
        .add_to_list("user-b", "Naruto", WatchStatus::Completed)
        .await
        .unwrap();
}

#[tokio::test]
async fn mutations_are_scoped_to_the_owner() {
    let state = test_state(FakeProvider::new()).await;
    state
        .store
        .insert_anime(&complete_record("Naruto", 8.0))
        .await
        .unwrap();
    let entry = state
        .watchlist
        .add_to_list("user-a", "Naruto", WatchStatus::Watching)
        .await
        .unwrap();

    let err = state
        .watchlist
        .update_status("user-b", &entry.id, WatchStatus::Dropped)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));

    let err = state.watchlist.remove("user-b", &entry.id).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));

    let err = state.watchlist.get("user-b", &entry.id).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));

    let untouched = state.watchlist.get("user-a", &entry.id).await.unwrap();
    assert_eq!(untouched.status, Some(WatchStatus::Watching));
}

#[tokio::test]
async fn finishing_the_last_episode_completes_the_entry() {
    let state = test_state(FakeProvider::new()).await;
    state
        .store
        .insert_anime(&complete_record("Naruto", 8.0))
        .await
        .unwrap();
    let entry = state
        .watchlist
        .add_to_list("user-a", "Naruto", WatchStatus::Watching)
        .await
        .unwrap();

    let halfway = state
        .watchlist
        .update_progress("user-a", &entry.id, 110)
        .await
        .unwrap();
    assert_eq!(halfway.progress.watched, 110);
    assert_eq!(halfway.status, Some(WatchStatus::Watching));

    let done = state
        .watchlist
        .update_progress("user-a", &entry.id, 220)
        .await
        .unwrap();
    assert_eq!(done.status, Some(WatchStatus::Completed));

    let err = state
        .watchlist
        .update_progress("user-a", &entry.id, 221)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));
}

#[tokio::test]
async fn score_and_notes_are_validated() {
    let state = test_state(FakeProvider::new()).await;
    let entry = state
        .watchlist
        .add_to_list("user-a", "Trigun", WatchStatus::Watching)
        .await
        .unwrap();

    let scored = state
        .watchlist
        .update_score("user-a", &entry.id, 9.5)
        .await
        .unwrap();
    assert!((scored.score - 9.5).abs() < f32::EPSILON);

    let err = state
        .watchlist
        .update_score("user-a", &entry.id, 11.0)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));

    let err = state
        .watchlist
        .update_notes("user-a", &entry.id, &"n".repeat(501))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));

    let noted = state
        .watchlist
        .update_notes("user-a", &entry.id, "Rewatch later")
        .await
        .unwrap();
    assert_eq!(noted.notes, "Rewatch later");
}

#[tokio::test]
async fn list_only_returns_own_entries() {
    let state = test_state(FakeProvider::new()).await;
    for (user, name, status) in [
        ("user-a", "Trigun", WatchStatus::Watching),
        ("user-a", "Cowboy Bebop", WatchStatus::Completed),
        ("user-b", "Monster", WatchStatus::Watching),
    ] {
        state
            .watchlist
            .add_to_list(user, name, status)
            .await
            .unwrap();
    }

    let all = state
        .watchlist
        .list("user-a", &FilterParams::default(), 0, 50)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|e| e.user_id.as_deref() == Some("user-a")));

    let watching = state
        .watchlist
        .list(
            "user-a",
            &FilterParams {
                status: Some(WatchStatus::Watching),
                ..FilterParams::default()
            },
            0,
            50,
        )
        .await
        .unwrap();
    assert_eq!(watching.len(), 1);
    assert_eq!(watching[0].name, "Trigun");

    state.watchlist.remove("user-a", &watching[0].id).await.unwrap();
    let remaining = state
        .watchlist
        .list("user-a", &FilterParams::default(), 0, 50)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}
