mod common;

use animeverse::domain::Season;
use animeverse::models::anime::AnimeRecord;
use animeverse::models::filter::AnimeQuery;
use animeverse::services::CatalogError;
use common::{FakeProvider, complete_record, external, test_state};
use sea_orm::ConnectionTrait;

#[tokio::test]
async fn bulk_import_skips_duplicates_and_keeps_going() {
    let state = test_state(FakeProvider::new()).await;

    let records: Vec<AnimeRecord> = (0..1000)
        .map(|i| {
            if i == 500 {
                AnimeRecord::new("Title 0")
            } else {
                AnimeRecord::new(format!("Title {i}"))
            }
        })
        .collect();

    let imported = state.importer.import_records(records).await;

    assert_eq!(imported, 999);
    assert_eq!(
        state.store.count_anime(&AnimeQuery::canonical()).await.unwrap(),
        999
    );
}

#[tokio::test]
async fn failed_batch_leaves_no_partial_rows() {
    let state = test_state(FakeProvider::new()).await;
    state
        .store
        .conn
        .execute_unprepared(
            "CREATE TRIGGER reject_cursed BEFORE INSERT ON anime \
             WHEN NEW.name = 'Cursed' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .await
        .unwrap();

    // First batch of 1000 fails in its second SQL chunk; the second batch is clean.
    let records: Vec<AnimeRecord> = (0..1500)
        .map(|i| {
            if i == 300 {
                AnimeRecord::new("Cursed")
            } else {
                AnimeRecord::new(format!("Title {i}"))
            }
        })
        .collect();

    let imported = state.importer.import_records(records).await;

    assert_eq!(imported, 500);
    assert_eq!(
        state.store.count_anime(&AnimeQuery::canonical()).await.unwrap(),
        500
    );
}

#[tokio::test]
async fn reimport_inserts_nothing() {
    let state = test_state(FakeProvider::new()).await;
    let batch = || vec![AnimeRecord::new("Cowboy Bebop"), AnimeRecord::new("Trigun")];

    assert_eq!(state.importer.import_records(batch()).await, 2);
    assert_eq!(state.importer.import_records(batch()).await, 0);
}

#[tokio::test]
async fn backfill_fills_only_missing_year_and_season() {
    let mut listed = external("Cowboy Bebop", 8.8);
    listed.details.year = Some(1998);
    listed.details.season = Some(Season::Spring);
    listed.details.synopsis = "Bounty hunters in space.".to_string();
    let provider = FakeProvider::new().with_anime(listed);
    let state = test_state(provider).await;

    let mut stored = AnimeRecord::new("Cowboy Bebop");
    stored.season = Some(Season::Fall);
    state.store.insert_anime(&stored).await.unwrap();

    let updated = state.importer.backfill_missing_fields().await.unwrap();
    assert_eq!(updated, 1);

    let patched = state.store.get_anime(&stored.id).await.unwrap().unwrap();
    assert_eq!(patched.year, Some(1998));
    assert_eq!(patched.season, Some(Season::Fall));
    assert!(patched.synopsis.is_empty());
}

#[tokio::test]
async fn backfill_survives_provider_failures() {
    let provider = FakeProvider::new();
    provider.fail();
    let state = test_state(provider).await;
    state
        .store
        .insert_anime(&AnimeRecord::new("Trigun"))
        .await
        .unwrap();

    let updated = state.importer.backfill_missing_fields().await.unwrap();
    assert_eq!(updated, 0);
}

#[tokio::test]
async fn season_update_inserts_new_and_refreshes_existing() {
    let provider = FakeProvider::new();
    let mut refreshed = external("Frieren", 9.3);
    refreshed.details.image_url = "https://img.example/covers/frieren-new-extraLarge.jpg".to_string();
    provider
        .season
        .lock()
        .unwrap()
        .extend([refreshed, external("Dandadan", 8.5)]);
    let state = test_state(provider).await;

    let mut existing = complete_record("Frieren", 8.0);
    existing.synopsis = "Kept as is.".to_string();
    state.store.insert_anime(&existing).await.unwrap();

    let processed = state
        .importer
        .update_season(Season::Fall, 2025)
        .await
        .unwrap();
    assert_eq!(processed, 2);

    let frieren = state.store.get_anime(&existing.id).await.unwrap().unwrap();
    assert!((frieren.score - 9.3).abs() < f32::EPSILON);
    assert_eq!(
        frieren.image_url,
        "https://img.example/covers/frieren-new-extraLarge.jpg"
    );
    assert_eq!(frieren.synopsis, "Kept as is.");

    assert!(
        state
            .store
            .find_canonical_by_title("Dandadan")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn season_update_reports_provider_outage() {
    let provider = FakeProvider::new();
    provider.fail();
    let state = test_state(provider).await;

    let err = state
        .importer
        .update_season(Season::Winter, 2026)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Upstream(_)));
}
