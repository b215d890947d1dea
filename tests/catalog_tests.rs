mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use animeverse::cache::{CacheTtl, keys};
use animeverse::domain::{AnimeType, UserRole, WatchStatus};
use animeverse::models::anime::{AnimePatch, AnimeRecord, ImagePair};
use animeverse::models::user::CallerIdentity;
use animeverse::services::{CatalogError, Scheduler};
use common::{FakeProvider, complete_record, test_state, test_state_with_ttl};

#[tokio::test]
async fn listings_expire_by_ttl_not_by_writes() {
    let ttl = CacheTtl {
        trending: Duration::from_millis(200),
        ..CacheTtl::default()
    };
    let state = test_state_with_ttl(FakeProvider::new(), ttl).await;
    state
        .store
        .insert_anime(&complete_record("Steins;Gate", 9.1))
        .await
        .unwrap();

    let first = state.listings.trending().await.unwrap();
    assert_eq!(first.len(), 1);

    state
        .store
        .insert_anime(&complete_record("Monster", 8.9))
        .await
        .unwrap();
    let cached = state.listings.trending().await.unwrap();
    assert_eq!(cached.len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let refreshed = state.listings.trending().await.unwrap();
    assert_eq!(refreshed.len(), 2);
}

#[tokio::test]
async fn trending_and_spotlight_apply_score_floors() {
    let state = test_state(FakeProvider::new()).await;
    for (name, score) in [("A Great Show", 8.5), ("A Good Show", 7.2), ("A Meh Show", 5.0)] {
        state
            .store
            .insert_anime(&complete_record(name, score))
            .await
            .unwrap();
    }

    let trending = state.listings.trending().await.unwrap();
    let names: Vec<&str> = trending.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["A Great Show", "A Good Show"]);

    let spotlight = state.listings.spotlight().await.unwrap();
    assert_eq!(spotlight.len(), 1);
}

#[tokio::test]
async fn movies_listing_only_has_movies() {
    let state = test_state(FakeProvider::new()).await;
    let mut movie = complete_record("Perfect Blue", 8.5);
    movie.kind = Some(AnimeType::Movie);
    state.store.insert_anime(&movie).await.unwrap();
    state
        .store
        .insert_anime(&complete_record("Paranoia Agent", 7.7))
        .await
        .unwrap();

    let movies = state.listings.movies().await.unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].name, "Perfect Blue");
}

#[tokio::test]
async fn browse_pages_through_the_catalog() {
    let state = test_state(FakeProvider::new()).await;
    for i in 0..5u8 {
        let record = complete_record(&format!("Show {i}"), 5.0 + f32::from(i));
        state.store.insert_anime(&record).await.unwrap();
    }

    let page = state.listings.browse(1, 2).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].name, "Show 4");
    assert!(page.has_next);

    let last = state.listings.browse(3, 2).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_next);

    let err = state.listings.browse(0, 2).await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));
    let err = state.listings.browse(1, 101).await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));
}

#[tokio::test]
async fn random_on_empty_catalog_is_not_found() {
    let state = test_state(FakeProvider::new()).await;
    let err = state.listings.random().await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn low_quality_artwork_is_upgraded_in_the_background() {
    let provider = FakeProvider::new();
    *provider.images.lock().unwrap() = Some(ImagePair {
        cover_url: "https://img.example/covers/bebop-extraLarge.jpg".to_string(),
        banner_url: "https://img.example/banners/bebop-wide.jpg".to_string(),
    });
    let state = test_state(provider.clone()).await;

    let mut record = complete_record("Cowboy Bebop", 8.8);
    record.image_url = "https://img.example/covers/bebop-small.jpg".to_string();
    state.store.insert_anime(&record).await.unwrap();

    let resolved = state.resolver.resolve("Cowboy Bebop").await.unwrap();
    assert_eq!(resolved.image_url, "https://img.example/covers/bebop-small.jpg");

    state.pool.wait_idle().await;

    let upgraded = state.store.get_anime(&record.id).await.unwrap().unwrap();
    assert_eq!(
        upgraded.image_url,
        "https://img.example/covers/bebop-extraLarge.jpg"
    );
    // The good banner stays.
    assert_eq!(upgraded.banner_url, record.banner_url);
    assert_eq!(provider.image_calls.load(Ordering::SeqCst), 1);

    let fresh = state.resolver.resolve("Cowboy Bebop").await.unwrap();
    assert_eq!(fresh.image_url, upgraded.image_url);
}

#[tokio::test]
async fn image_cache_serves_fresh_entries_without_refetch() {
    let provider = FakeProvider::new();
    *provider.images.lock().unwrap() = Some(ImagePair {
        cover_url: "https://img.example/covers/1-extraLarge.jpg".to_string(),
        banner_url: String::new(),
    });
    let state = test_state(provider.clone()).await;

    let first = state.image_cache.get_images(Some(1), None).await.unwrap();
    provider.fail();
    let second = state.image_cache.get_images(Some(1), None).await.unwrap();
    assert_eq!(first.image_url, second.image_url);

    let err = state.image_cache.get_images(None, None).await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));
}

#[tokio::test]
async fn admin_catalog_edits_invalidate_cached_records() {
    let state = test_state(FakeProvider::new()).await;
    let created = state
        .catalog
        .create(complete_record("Trigun", 8.2))
        .await
        .unwrap();

    let err = state
        .catalog
        .create(complete_record("trigun", 8.2))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Conflict(_)));

    // Warm the cache, then edit.
    state.resolver.resolve("Trigun").await.unwrap();
    state
        .catalog
        .update(
            &created.id,
            &AnimePatch {
                synopsis: Some("Vash the Stampede.".to_string()),
                ..AnimePatch::default()
            },
        )
        .await
        .unwrap();

    let resolved = state.resolver.resolve("Trigun").await.unwrap();
    assert_eq!(resolved.synopsis, "Vash the Stampede.");

    state.catalog.delete(&created.id).await.unwrap();
    let err = state.catalog.get(&created.id).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn delete_all_leaves_personal_lists() {
    let state = test_state(FakeProvider::new()).await;
    let inserted = state
        .catalog
        .create_many(vec![
            complete_record("Trigun", 8.2),
            complete_record("Monster", 8.9),
            AnimeRecord::new(""),
        ])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let entry = state
        .watchlist
        .add_to_list("user-a", "Trigun", WatchStatus::Watching)
        .await
        .unwrap();

    assert_eq!(state.catalog.delete_all().await.unwrap(), 2);
    assert!(state.watchlist.get("user-a", &entry.id).await.is_ok());
}

#[tokio::test]
async fn user_stats_and_roles() {
    let state = test_state(FakeProvider::new()).await;
    let caller = CallerIdentity {
        subject_id: "user-a".to_string(),
        email: "a@example.com".to_string(),
        name: "A".to_string(),
        role: UserRole::Admin,
    };

    let user = state.users.ensure_user(&caller).await.unwrap();
    assert_eq!(user.role, UserRole::User);

    for (name, status) in [
        ("Trigun", WatchStatus::Watching),
        ("Monster", WatchStatus::Completed),
        ("Mushishi", WatchStatus::Completed),
    ] {
        state
            .watchlist
            .add_to_list("user-a", name, status)
            .await
            .unwrap();
    }

    let stats = state.users.refresh_stats("user-a").await.unwrap();
    assert_eq!(stats.watching, 1);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.total, 3);

    let promoted = state.users.set_role("user-a", UserRole::Admin).await.unwrap();
    assert_eq!(promoted.role, UserRole::Admin);

    let err = state
        .users
        .set_role("nobody", UserRole::Admin)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn edits_reach_records_cached_under_an_alias() {
    let state = test_state(FakeProvider::new()).await;
    let mut record = complete_record("Attack on Titan", 8.5);
    record.alternative_titles.synonyms = vec!["AoT".to_string()];
    let created = state.catalog.create(record).await.unwrap();

    assert_eq!(state.resolver.resolve("AoT").await.unwrap().id, created.id);

    state
        .catalog
        .update(
            &created.id,
            &AnimePatch {
                synopsis: Some("Walls fall.".to_string()),
                ..AnimePatch::default()
            },
        )
        .await
        .unwrap();
    let updated = state.resolver.resolve("AoT").await.unwrap();
    assert_eq!(updated.synopsis, "Walls fall.");

    state.catalog.delete(&created.id).await.unwrap();
    let err = state.resolver.resolve("AoT").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn delete_all_drops_cached_records_and_listings() {
    let state = test_state(FakeProvider::new()).await;
    state
        .catalog
        .create(complete_record("Trigun", 8.2))
        .await
        .unwrap();

    state.resolver.resolve("Trigun").await.unwrap();
    assert_eq!(state.listings.trending().await.unwrap().len(), 1);

    state.catalog.delete_all().await.unwrap();

    let err = state.resolver.resolve("Trigun").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
    assert!(!state.cache.exists(keys::TRENDING).await);
    assert!(state.listings.trending().await.unwrap().is_empty());
}

#[tokio::test]
async fn rename_onto_taken_name_is_a_conflict() {
    let state = test_state(FakeProvider::new()).await;
    state
        .catalog
        .create(complete_record("Trigun", 8.2))
        .await
        .unwrap();
    let monster = state
        .catalog
        .create(complete_record("Monster", 8.9))
        .await
        .unwrap();

    let err = state
        .catalog
        .update(
            &monster.id,
            &AnimePatch {
                name: Some("TRIGUN".to_string()),
                ..AnimePatch::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Conflict(_)));
    assert_eq!(state.catalog.get(&monster.id).await.unwrap().name, "Monster");
}

#[tokio::test]
async fn sweep_queues_only_low_quality_records_up_to_limit() {
    let provider = FakeProvider::new();
    *provider.images.lock().unwrap() = Some(ImagePair {
        cover_url: "https://img.example/covers/upgraded-extraLarge.jpg".to_string(),
        banner_url: "https://img.example/banners/upgraded-wide.jpg".to_string(),
    });
    let state = test_state(provider.clone()).await;

    for (name, score) in [
        ("Good Art", 9.0),
        ("Thumb One", 8.0),
        ("Thumb Two", 7.0),
        ("Thumb Three", 6.0),
    ] {
        let mut record = complete_record(name, score);
        if name.starts_with("Thumb") {
            record.image_url = format!("https://img.example/thumb/{}.jpg", record.id);
        }
        state.store.insert_anime(&record).await.unwrap();
    }

    let queued = state.images.sweep(2).await.unwrap();
    assert_eq!(queued, 2);
    state.pool.wait_idle().await;
    assert_eq!(provider.image_calls.load(Ordering::SeqCst), 2);

    let remaining = state.images.sweep(10).await.unwrap();
    assert_eq!(remaining, 1);
    state.pool.wait_idle().await;
    assert_eq!(state.images.sweep(10).await.unwrap(), 0);
}

#[tokio::test]
async fn maintenance_run_reports_each_job() {
    let provider = FakeProvider::new();
    provider
        .season
        .lock()
        .unwrap()
        .push(common::external("Frieren", 9.3));
    let state = test_state(provider.clone()).await;

    let scheduler = Scheduler::new(
        state.importer.clone(),
        state.images.clone(),
        state.config.scheduler.clone(),
    );
    let report = scheduler.run_once().await;
    assert_eq!(report.season_processed, Some(1));
    assert_eq!(report.images_queued, Some(0));
    assert!(state.store.find_canonical_by_title("Frieren").await.unwrap().is_some());

    provider.fail();
    let report = scheduler.run_once().await;
    assert_eq!(report.season_processed, None);
    assert_eq!(report.images_queued, Some(0));
}
