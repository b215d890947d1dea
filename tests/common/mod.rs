#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use animeverse::cache::{Cache, CacheTtl};
use animeverse::clients::MetadataProvider;
use animeverse::config::Config;
use animeverse::db::Store;
use animeverse::domain::{AnimeType, Season, normalize_name};
use animeverse::models::anime::{
    AnimeInformation, AnimeRecord, AnimeThemes, Character, Enhancement, ExternalAnime, ImagePair,
};
use animeverse::state::SharedState;
use async_trait::async_trait;

/// Scriptable stand-in for the external metadata sources.
#[derive(Default)]
pub struct FakeProvider {
    pub by_name: Mutex<HashMap<String, ExternalAnime>>,
    pub enhancements: Mutex<HashMap<String, Enhancement>>,
    pub candidates: Mutex<Vec<ExternalAnime>>,
    pub images: Mutex<Option<ImagePair>>,
    pub season: Mutex<Vec<ExternalAnime>>,
    pub failing: AtomicBool,
    pub delay_ms: AtomicU64,

    pub search_calls: AtomicUsize,
    pub candidate_calls: AtomicUsize,
    pub enhance_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_anime(self: &Arc<Self>, external: ExternalAnime) -> Arc<Self> {
        self.by_name
            .lock()
            .unwrap()
            .insert(normalize_name(&external.name), external);
        Arc::clone(self)
    }

    pub fn with_enhancement(self: &Arc<Self>, name: &str, enhancement: Enhancement) -> Arc<Self> {
        self.enhancements
            .lock()
            .unwrap()
            .insert(normalize_name(name), enhancement);
        Arc::clone(self)
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn pause(&self) -> anyhow::Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("provider unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataProvider for FakeProvider {
    async fn search_by_name(&self, name: &str) -> anyhow::Result<Option<ExternalAnime>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        Ok(self.by_name.lock().unwrap().get(&normalize_name(name)).cloned())
    }

    async fn search_candidates(&self, _query: &str) -> anyhow::Result<Vec<ExternalAnime>> {
        self.candidate_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        Ok(self.candidates.lock().unwrap().clone())
    }

    async fn fetch_enhanced(&self, name: &str) -> anyhow::Result<Option<Enhancement>> {
        self.enhance_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        Ok(self
            .enhancements
            .lock()
            .unwrap()
            .get(&normalize_name(name))
            .cloned())
    }

    async fn fetch_high_quality_images(&self, _name: &str) -> anyhow::Result<Option<ImagePair>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await?;
        Ok(self.images.lock().unwrap().clone())
    }

    async fn fetch_images_by_ids(
        &self,
        _mal_id: Option<i32>,
        _anilist_id: Option<i32>,
    ) -> anyhow::Result<Option<ImagePair>> {
        self.pause().await?;
        Ok(self.images.lock().unwrap().clone())
    }

    async fn fetch_current_season(
        &self,
        _season: Season,
        _year: i32,
    ) -> anyhow::Result<Vec<ExternalAnime>> {
        self.pause().await?;
        Ok(self.season.lock().unwrap().clone())
    }

    async fn fetch_themes(&self, _name: &str) -> anyhow::Result<Option<AnimeThemes>> {
        Ok(None)
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    config.scheduler.enabled = false;
    config.jobs.backfill_delay_ms = 0;
    config
}

pub async fn test_state(provider: Arc<FakeProvider>) -> SharedState {
    test_state_with_ttl(provider, CacheTtl::default()).await
}

pub async fn test_state_with_ttl(provider: Arc<FakeProvider>, ttl: CacheTtl) -> SharedState {
    let config = test_config();
    let store = Store::new(&config.database.url)
        .await
        .expect("in-memory store");
    let cache = Cache::in_memory(ttl);
    let provider: Arc<dyn MetadataProvider> = provider;
    SharedState::from_parts(config, store, cache, provider)
}

/// Details that pass the completeness gate, with artwork that needs no upgrade.
pub fn full_details(name: &str) -> Enhancement {
    let slug = name.to_lowercase().replace(' ', "-");
    Enhancement {
        kind: Some(AnimeType::Series),
        synopsis: format!("{name} synopsis."),
        genres: vec!["Action".to_string(), "Adventure".to_string()],
        year: Some(2002),
        season: Some(Season::Fall),
        image_url: format!("https://img.example/covers/{slug}-extraLarge.jpg"),
        banner_url: format!("https://img.example/banners/{slug}-wide.jpg"),
        information: AnimeInformation {
            episodes: 220,
            status: "Finished Airing".to_string(),
            ..AnimeInformation::default()
        },
        characters: vec![Character {
            name: format!("{name} lead"),
            ..Character::default()
        }],
        ..Enhancement::default()
    }
}

pub fn external(name: &str, score: f32) -> ExternalAnime {
    ExternalAnime {
        name: name.to_string(),
        score: Some(score),
        details: full_details(name),
    }
}

pub fn complete_record(name: &str, score: f32) -> AnimeRecord {
    external(name, score).into_record()
}
