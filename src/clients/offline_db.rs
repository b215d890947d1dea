//! Client for the community anime offline database.
//!
//! The dataset is a single zstd-compressed JSON document with tens of
//! thousands of entries. Decompression and parsing run on blocking threads
//! so the import never starves the async runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::domain::{AnimeType, Season, WatchStatus};
use crate::models::anime::{AlternativeTitles, AnimeInformation, AnimeRecord};

const CACHE_FILENAME: &str = "anime-offline-database.json";

/// Tags that push the import popularity heuristic up by one point each.
const POPULAR_TAGS: [&str; 7] = [
    "Action",
    "Adventure",
    "Comedy",
    "Drama",
    "Fantasy",
    "Romance",
    "Shounen",
];

#[derive(Debug, Deserialize)]
struct DatabaseRoot {
    data: Vec<AnimeEntry>,
}

/// Single entry of the offline dataset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeEntry {
    pub title: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub episodes: i32,
    #[serde(rename = "type", default)]
    pub anime_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub anime_season: Option<AnimeSeason>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub thumbnail: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnimeSeason {
    pub season: Option<String>,
    pub year: Option<i32>,
}

impl AnimeEntry {
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.anime_season
            .as_ref()
            .and_then(|s| s.year)
            .filter(|y| *y > 0)
    }

    /// `(mal_id, anilist_id)` parsed from the source URLs.
    #[must_use]
    pub fn external_ids(&self) -> (Option<i32>, Option<i32>) {
        let mut mal_id = None;
        let mut anilist_id = None;
        for source in &self.sources {
            if let Some(id) = extract_id(source, "myanimelist.net/anime/") {
                mal_id = Some(id);
            } else if let Some(id) = extract_id(source, "anilist.co/anime/") {
                anilist_id = Some(id);
            }
        }
        (mal_id, anilist_id)
    }

    /// Heuristic 0..=10 popularity: base 5, recency bonus, popular tags.
    #[must_use]
    pub fn popularity_score(&self) -> f32 {
        let mut score: u8 = 5;
        match self.year() {
            Some(y) if y >= 2020 => score += 2,
            Some(y) if y >= 2015 => score += 1,
            _ => {}
        }

        let tag_hits = self
            .tags
            .iter()
            .filter(|tag| POPULAR_TAGS.iter().any(|p| p.eq_ignore_ascii_case(tag)))
            .count();
        let tag_hits = u8::try_from(tag_hits).unwrap_or(u8::MAX);

        f32::from(score.saturating_add(tag_hits).min(10))
    }

    /// Maps the entry onto a fresh canonical record, or `None` without a title.
    #[must_use]
    pub fn into_record(self) -> Option<AnimeRecord> {
        if self.title.trim().is_empty() {
            return None;
        }

        let (mal_id, anilist_id) = self.external_ids();
        let year = self.year();
        let score = self.popularity_score();
        let airing = airing_status(&self.status);

        let mut record = AnimeRecord::new(self.title);
        record.mal_id = mal_id;
        record.anilist_id = anilist_id;
        record.kind = Some(AnimeType::from_external(&self.anime_type).unwrap_or(AnimeType::Series));
        record.status = Some(WatchStatus::from_airing(&self.status));
        record.score = score;
        record.year = year;
        record.season = self
            .anime_season
            .and_then(|s| s.season)
            .and_then(|s| s.parse::<Season>().ok());
        record.genres = self.tags;
        record.image_url = self.picture;
        record.banner_url = self.thumbnail;
        record.progress.total = self.episodes.max(0);
        record.alternative_titles = AlternativeTitles {
            synonyms: self.synonyms,
            ..AlternativeTitles::default()
        };
        record.information = AnimeInformation {
            episodes: self.episodes.max(0),
            status: airing.to_string(),
            ..AnimeInformation::default()
        };
        Some(record)
    }
}

fn airing_status(status: &str) -> &'static str {
    match status.to_uppercase().as_str() {
        "FINISHED" => "Finished Airing",
        "ONGOING" => "Currently Airing",
        "UPCOMING" => "Not yet aired",
        _ => "",
    }
}

/// Extracts a numeric ID from a URL after a given prefix.
fn extract_id(url: &str, prefix: &str) -> Option<i32> {
    url.find(prefix)
        .map(|pos| &url[pos + prefix.len()..])
        .and_then(|s| {
            let num_str: String = s.chars().take_while(char::is_ascii_digit).collect();
            num_str.parse().ok()
        })
}

/// Downloads and caches the dataset on disk.
#[derive(Clone)]
pub struct OfflineDatabase {
    data_dir: PathBuf,
    url: String,
    http_client: reqwest::Client,
}

impl OfflineDatabase {
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        url: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            url: url.into(),
            http_client,
        }
    }

    fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILENAME)
    }

    /// Loads every entry, downloading the dataset first unless a cached
    /// copy exists or `refresh` is set.
    #[instrument(skip(self), fields(data_dir = ?self.data_dir))]
    pub async fn load_entries(&self, refresh: bool) -> Result<Vec<AnimeEntry>> {
        let cache_path = self.cache_path();

        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create data directory: {}",
                    self.data_dir.display()
                )
            })?;

        if refresh || !cache_path.exists() {
            self.download_and_cache(&cache_path).await?;
        } else {
            debug!(path = ?cache_path, "Using cached dataset");
        }

        let entries = tokio::task::spawn_blocking(move || parse_file(&cache_path))
            .await
            .context("Blocking task panicked while parsing dataset")??;

        info!(entries = entries.len(), "Offline dataset loaded");
        Ok(entries)
    }

    async fn download_and_cache(&self, cache_path: &Path) -> Result<()> {
        debug!(url = %self.url, "Downloading offline dataset");

        let compressed = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .context("Failed to send download request")?
            .error_for_status()
            .context("Download request returned error status")?
            .bytes()
            .await
            .context("Failed to download response body")?;

        let target = cache_path.to_path_buf();
        tokio::task::spawn_blocking(move || decompress_to_file(&compressed, &target))
            .await
            .context("Blocking task panicked during decompression")??;

        debug!(path = ?cache_path, "Cached dataset");
        Ok(())
    }
}

fn decompress_to_file(compressed: &[u8], output_path: &Path) -> Result<()> {
    use std::fs::File;
    use std::io::{BufWriter, Write};

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create cache file: {}", output_path.display()))?;

    let mut writer = BufWriter::new(file);
    let mut decoder = zstd::Decoder::new(compressed).context("Failed to create zstd decoder")?;
    std::io::copy(&mut decoder, &mut writer).context("Failed to decompress data")?;
    writer.flush().context("Failed to flush cache file")?;
    Ok(())
}

fn parse_file(path: &Path) -> Result<Vec<AnimeEntry>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
    let mut contents = String::new();
    std::io::BufReader::new(file)
        .read_to_string(&mut contents)
        .context("Failed to read dataset")?;
    parse_dataset(&contents)
}

/// Parses the dataset document.
pub fn parse_dataset(json: &str) -> Result<Vec<AnimeEntry>> {
    let root: DatabaseRoot = serde_json::from_str(json).context("Failed to parse dataset JSON")?;
    Ok(root.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AnimeEntry {
        AnimeEntry {
            title: "Frieren".to_string(),
            sources: vec![
                "https://anilist.co/anime/154587".to_string(),
                "https://myanimelist.net/anime/52991".to_string(),
            ],
            synonyms: vec!["Sousou no Frieren".to_string()],
            episodes: 28,
            anime_type: "TV".to_string(),
            status: "FINISHED".to_string(),
            anime_season: Some(AnimeSeason {
                season: Some("FALL".to_string()),
                year: Some(2023),
            }),
            tags: vec!["adventure".to_string(), "fantasy".to_string(), "magic".to_string()],
            picture: "https://cdn.example/frieren.jpg".to_string(),
            thumbnail: "https://cdn.example/frieren-thumb.jpg".to_string(),
        }
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id("https://anilist.co/anime/12345/Title", "anilist.co/anime/"), Some(12345));
        assert_eq!(extract_id("https://example.com/anime/123", "anilist.co/anime/"), None);
    }

    #[test]
    fn popularity_heuristic_is_capped() {
        assert!((entry().popularity_score() - 9.0).abs() < f32::EPSILON);

        let mut busy = entry();
        busy.tags = POPULAR_TAGS.iter().map(ToString::to_string).collect();
        assert!((busy.popularity_score() - 10.0).abs() < f32::EPSILON);

        let mut old = entry();
        old.anime_season = None;
        old.tags.clear();
        assert!((old.popularity_score() - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn entry_maps_to_canonical_record() {
        let record = entry().into_record().unwrap();
        assert!(record.is_canonical());
        assert_eq!(record.mal_id, Some(52991));
        assert_eq!(record.anilist_id, Some(154_587));
        assert_eq!(record.kind, Some(AnimeType::Series));
        assert_eq!(record.status, Some(WatchStatus::Completed));
        assert_eq!(record.season, Some(Season::Fall));
        assert_eq!(record.progress.total, 28);
        assert_eq!(record.information.status, "Finished Airing");
    }

    #[test]
    fn untitled_entries_are_skipped() {
        let mut untitled = entry();
        untitled.title = "  ".to_string();
        assert!(untitled.into_record().is_none());
    }

    #[test]
    fn dataset_document_parses() {
        let json = r#"{"data":[{"title":"Naruto","type":"TV","status":"FINISHED","animeSeason":{"season":"FALL","year":2002}}]}"#;
        let entries = parse_dataset(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].year(), Some(2002));
    }
}
