mod common;

use animeverse::domain::{AnimeType, Season};
use animeverse::models::filter::{AnimeQuery, FilterParams};
use animeverse::services::{CatalogError, SearchRequest};
use common::{FakeProvider, complete_record, external, test_state};

#[tokio::test]
async fn free_text_orders_exact_before_partial_matches() {
    let state = test_state(FakeProvider::new()).await;
    for (name, score) in [
        ("Naruto Shippuden", 8.6),
        ("Boruto: Naruto Next Generations", 6.0),
        ("Naruto", 8.0),
    ] {
        state
            .store
            .insert_anime(&complete_record(name, score))
            .await
            .unwrap();
    }

    let results = state
        .search
        .search(&SearchRequest::text("naruto"))
        .await
        .unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Naruto", "Naruto Shippuden", "Boruto: Naruto Next Generations"]
    );
}

#[tokio::test]
async fn empty_local_result_imports_candidates_once() {
    let provider = FakeProvider::new();
    provider
        .candidates
        .lock()
        .unwrap()
        .push(external("Bleach", 7.9));
    let state = test_state(provider.clone()).await;

    let results = state
        .search
        .search(&SearchRequest::text("Bleach"))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Bleach");
    assert_eq!(FakeProvider::calls(&provider.candidate_calls), 1);

    let again = state
        .search
        .search(&SearchRequest::text("Bleach"))
        .await
        .unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(FakeProvider::calls(&provider.candidate_calls), 1);
}

#[tokio::test]
async fn no_match_anywhere_is_an_empty_result() {
    let provider = FakeProvider::new();
    let state = test_state(provider.clone()).await;

    let results = state
        .search
        .search(&SearchRequest::text("zzzz unknown"))
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(FakeProvider::calls(&provider.candidate_calls), 1);
}

#[tokio::test]
async fn provider_outage_during_fallback_is_an_empty_result() {
    let provider = FakeProvider::new();
    provider.fail();
    let state = test_state(provider.clone()).await;

    let results = state
        .search
        .search(&SearchRequest::text("Bleach"))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn structured_filters_are_anded() {
    let state = test_state(FakeProvider::new()).await;

    let mut movie = complete_record("Your Name", 8.9);
    movie.kind = Some(AnimeType::Movie);
    movie.year = Some(2016);
    movie.season = Some(Season::Summer);
    movie.genres = vec!["Romance".to_string()];

    let mut series = complete_record("Kimi ni Todoke", 7.9);
    series.year = Some(2016);
    series.genres = vec!["Romance".to_string()];

    for record in [&movie, &series] {
        state.store.insert_anime(record).await.unwrap();
    }

    let filters = FilterParams {
        genre: Some("romance".to_string()),
        year: Some(2016),
        kind: Some(AnimeType::Movie),
        ..FilterParams::default()
    };
    let results = state.search.filter(&filters, 0, None).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Your Name");
}

#[tokio::test]
async fn filter_never_triggers_fallback_import() {
    let provider = FakeProvider::new();
    let state = test_state(provider.clone()).await;

    let request = SearchRequest {
        filters: FilterParams {
            year: Some(1999),
            ..FilterParams::default()
        },
        ..SearchRequest::default()
    };
    let results = state.search.search(&request).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(FakeProvider::calls(&provider.candidate_calls), 0);
}

#[tokio::test]
async fn overlong_query_is_rejected() {
    let state = test_state(FakeProvider::new()).await;

    let err = state
        .search
        .search(&SearchRequest::text("a".repeat(201)))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));
}

#[tokio::test]
async fn ranked_search_scores_and_caches() {
    let provider = FakeProvider::new();
    let state = test_state(provider.clone()).await;
    for (name, score) in [("Naruto", 8.0), ("Naruto Shippuden", 8.6)] {
        state
            .store
            .insert_anime(&complete_record(name, score))
            .await
            .unwrap();
    }

    let ranked = state.search.ranked("Naruto", 10).await.unwrap();
    assert_eq!(ranked[0].anime.name, "Naruto");
    assert!(ranked[0].relevance > ranked[1].relevance);

    // A new record does not show up until the cached ranking expires.
    state
        .store
        .insert_anime(&complete_record("Naruto the Movie", 7.0))
        .await
        .unwrap();
    let cached = state.search.ranked("Naruto", 10).await.unwrap();
    assert_eq!(cached.len(), ranked.len());

    assert_eq!(
        state.store.count_anime(&AnimeQuery::canonical()).await.unwrap(),
        3
    );
}
