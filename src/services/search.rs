//! Tiered free-text search, structured filtering and scored ranking.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use strsim::normalized_levenshtein;
use tracing::{debug, info, instrument, warn};

use super::error::{CatalogError, CatalogResult};
use super::image_upgrade::ImageUpgrader;
use super::resolver::AnimeResolver;
use crate::cache::{Cache, keys};
use crate::clients::MetadataProvider;
use crate::db::Store;
use crate::domain::{MAX_NAME_LEN, normalize_name};
use crate::models::anime::AnimeRecord;
use crate::models::filter::{AnimeQuery, AnimeSort, FilterParams, NameMatch};

/// Rows taken from each free-text pass.
pub const PASS_LIMIT: u64 = 10;
/// Overall cap on free-text results.
pub const RESULT_CAP: usize = 20;

const DEFAULT_FILTER_LIMIT: u64 = 50;
const MAX_FILTER_LIMIT: u64 = 100;
const MAX_RANKED_LIMIT: usize = 50;

const EXACT_SCORE: f64 = 100.0;
const CONTAINS_SCORE: f64 = 0.8 * 80.0;
const FUZZY_WEIGHT: f64 = 80.0;
const GENRE_SCORE: f64 = 60.0;

/// A search as received from callers: free text, structured fields, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default, alias = "q")]
    pub query: Option<String>,
    #[serde(flatten)]
    pub filters: FilterParams,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl SearchRequest {
    #[must_use]
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    fn text_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedMatch {
    pub anime: AnimeRecord,
    pub relevance: f64,
}

/// Relevance of `record` for `query`: 0 means no match.
#[must_use]
pub fn relevance(query: &str, record: &AnimeRecord) -> f64 {
    let query = normalize_name(query);
    if query.is_empty() {
        return 0.0;
    }

    let name = record.name_key();
    let title = if name == query {
        EXACT_SCORE
    } else if name.contains(&query) {
        CONTAINS_SCORE
    } else {
        normalized_levenshtein(&query, &name) * FUZZY_WEIGHT
    };

    let genre = if record.genres.iter().any(|g| normalize_name(g) == query) {
        GENRE_SCORE
    } else {
        0.0
    };

    title.max(genre)
}

#[derive(Clone)]
pub struct SearchEngine {
    store: Store,
    cache: Cache,
    provider: Arc<dyn MetadataProvider>,
    resolver: AnimeResolver,
    images: ImageUpgrader,
}

impl SearchEngine {
    pub fn new(
        store: Store,
        cache: Cache,
        provider: Arc<dyn MetadataProvider>,
        resolver: AnimeResolver,
        images: ImageUpgrader,
    ) -> Self {
        Self {
            store,
            cache,
            provider,
            resolver,
            images,
        }
    }

    /// Runs the local search; on zero rows with a text query, imports
    /// provider candidates once and runs it again.
    #[instrument(skip(self))]
    pub async fn search(&self, request: &SearchRequest) -> CatalogResult<Vec<AnimeRecord>> {
        if let Some(query) = request.text_query()
            && query.chars().count() > MAX_NAME_LEN
        {
            return Err(CatalogError::validation(format!(
                "query must be at most {MAX_NAME_LEN} characters"
            )));
        }

        let results = self.search_local(request).await?;
        if !results.is_empty() {
            self.images.schedule_many(&results);
            return Ok(results);
        }

        // Importing canonical records cannot help a personal-list filter.
        let Some(query) = request.text_query() else {
            return Ok(results);
        };
        if request.filters.user_id.is_some() {
            return Ok(results);
        }

        let imported = self.import_candidates(query).await;
        if imported == 0 {
            return Ok(Vec::new());
        }

        let results = self.search_local(request).await?;
        self.images.schedule_many(&results);
        Ok(results)
    }

    async fn search_local(&self, request: &SearchRequest) -> CatalogResult<Vec<AnimeRecord>> {
        match request.text_query() {
            Some(query) if request.filters.is_empty() => self.free_text(query).await,
            text => {
                let mut filters = request.filters.clone();
                if filters.name.is_none() {
                    filters.name = text.map(ToString::to_string);
                }
                self.filter(&filters, request.skip.unwrap_or(0), request.limit)
                    .await
            }
        }
    }

    /// Structured mode: every present field is ANDed.
    pub async fn filter(
        &self,
        filters: &FilterParams,
        skip: u64,
        limit: Option<u64>,
    ) -> CatalogResult<Vec<AnimeRecord>> {
        let mut query = filters.to_query();
        query.skip = skip;
        query.limit = Some(limit.unwrap_or(DEFAULT_FILTER_LIMIT).clamp(1, MAX_FILTER_LIMIT));
        Ok(self.store.find_anime(&query).await?)
    }

    /// Exact, prefix, substring, then notes/synonyms; deduplicated by name.
    pub async fn free_text(&self, query: &str) -> CatalogResult<Vec<AnimeRecord>> {
        let passes = [
            NameMatch::Exact(query.to_string()),
            NameMatch::Prefix(query.to_string()),
            NameMatch::Contains(query.to_string()),
            NameMatch::NotesOrSynonyms(query.to_string()),
        ];

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for pass in passes {
            let query = AnimeQuery::canonical()
                .with_name(pass)
                .sorted(AnimeSort::ScoreDesc)
                .with_limit(PASS_LIMIT);

            for record in self.store.find_anime(&query).await? {
                if results.len() >= RESULT_CAP {
                    return Ok(results);
                }
                if seen.insert(record.name_key()) {
                    results.push(record);
                }
            }
        }
        Ok(results)
    }

    /// Best-effort import of provider matches. Returns how many are now stored.
    async fn import_candidates(&self, query: &str) -> usize {
        let candidates = match self.provider.search_candidates(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(query, error = %e, "Search fallback import failed");
                return 0;
            }
        };

        let mut stored = 0;
        for candidate in candidates {
            match self.resolver.insert_canonical(candidate.into_record()).await {
                Ok(_) => stored += 1,
                Err(e) => debug!(query, error = %e, "Skipping search candidate"),
            }
        }

        info!(event = "search_fallback_import", query, stored, "Imported search candidates");
        stored
    }

    /// Scored similarity search, cached per query and limit.
    #[instrument(skip(self))]
    pub async fn ranked(&self, query: &str, limit: usize) -> CatalogResult<Vec<RankedMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CatalogError::validation("query must not be empty"));
        }
        let limit = limit.clamp(1, MAX_RANKED_LIMIT);

        let key = keys::search(query, limit);
        if let Some(hit) = self.cache.get_json::<Vec<RankedMatch>>(&key).await {
            return Ok(hit);
        }

        let mut candidates = self.search(&SearchRequest::text(query)).await?;
        let genre_matches = AnimeQuery {
            genre: Some(query.to_string()),
            ..AnimeQuery::canonical()
        }
        .sorted(AnimeSort::ScoreDesc)
        .with_limit(PASS_LIMIT);
        let mut seen: HashSet<String> = candidates.iter().map(AnimeRecord::name_key).collect();
        for record in self.store.find_anime(&genre_matches).await? {
            if seen.insert(record.name_key()) {
                candidates.push(record);
            }
        }

        let ranked = rank(query, candidates, limit);
        self.cache
            .set_json(&key, &ranked, self.cache.ttl().search)
            .await;
        Ok(ranked)
    }
}

/// Scores, drops non-matches, and orders by relevance then popularity.
#[must_use]
pub fn rank(query: &str, candidates: Vec<AnimeRecord>, limit: usize) -> Vec<RankedMatch> {
    let mut ranked: Vec<RankedMatch> = candidates
        .into_iter()
        .map(|anime| RankedMatch {
            relevance: relevance(query, &anime),
            anime,
        })
        .filter(|m| m.relevance > 0.0)
        .collect();

    ranked.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.anime
                    .score
                    .partial_cmp(&a.anime.score)
                    .unwrap_or(Ordering::Equal)
            })
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, score: f32) -> AnimeRecord {
        let mut record = AnimeRecord::new(name);
        record.score = score;
        record
    }

    #[test]
    fn exact_beats_contains_beats_fuzzy() {
        let exact = relevance("naruto", &record("Naruto", 0.0));
        let contains = relevance("naruto", &record("Naruto Shippuden", 0.0));
        let fuzzy = relevance("naruto", &record("Narutu", 0.0));

        assert!((exact - 100.0).abs() < f64::EPSILON);
        assert!((contains - 64.0).abs() < f64::EPSILON);
        assert!(fuzzy > 0.0 && fuzzy < contains);
    }

    #[test]
    fn genre_match_counts() {
        let mut r = record("Berserk", 0.0);
        r.genres = vec!["Action".to_string()];
        assert!(relevance("action", &r) >= 60.0);
    }

    #[test]
    fn ties_break_by_popularity() {
        let ranked = rank(
            "titan",
            vec![record("Titan A", 6.0), record("Titan B", 9.0)],
            10,
        );
        assert_eq!(ranked[0].anime.name, "Titan B");
        assert_eq!(ranked[1].anime.name, "Titan A");
    }

    #[test]
    fn request_text_is_trimmed() {
        assert_eq!(SearchRequest::text("  ").text_query(), None);
        assert_eq!(SearchRequest::text(" aot ").text_query(), Some("aot"));
    }
}
