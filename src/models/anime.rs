use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnimeId, AnimeType, Season, WatchStatus, normalize_name};
use crate::models::lenient;

/// Maximum length of personal notes.
pub const MAX_NOTES_LEN: usize = 500;

/// Canonical or user-owned anime document.
///
/// A record with `user_id == None` is canonical shared reference data; a
/// record with a user id is that user's personal copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeRecord {
    #[serde(default = "AnimeId::generate")]
    pub id: AnimeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub mal_id: Option<i32>,
    #[serde(default, rename = "aniListId")]
    pub anilist_id: Option<i32>,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<AnimeType>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub banner_url: String,
    #[serde(default)]
    pub status: Option<WatchStatus>,
    #[serde(default)]
    pub progress: Progress,
    /// 0 to 10. Popularity for canonical records, the user's rating for copies.
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub alternative_titles: AlternativeTitles,
    #[serde(default)]
    pub information: AnimeInformation,
    #[serde(default)]
    pub statistics: AnimeStatistics,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub staff: Vec<StaffMember>,
    #[serde(default)]
    pub themes: AnimeThemes,
    #[serde(default)]
    pub related: Vec<RelatedAnime>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default, deserialize_with = "lenient::i32_from_any")]
    pub watched: i32,
    #[serde(default, deserialize_with = "lenient::i32_from_any")]
    pub total: i32,
}

impl Progress {
    /// `0 <= watched`, and `watched <= total` whenever `total > 0`.
    ///
    /// # Errors
    ///
    /// Returns a message describing the violated bound.
    pub fn validate(&self) -> Result<(), String> {
        if self.watched < 0 || self.total < 0 {
            return Err("progress values must not be negative".to_string());
        }
        if self.total > 0 && self.watched > self.total {
            return Err(format!(
                "watched episodes ({}) exceed total ({})",
                self.watched, self.total
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlternativeTitles {
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub japanese: String,
    #[serde(default)]
    pub english: String,
}

impl AlternativeTitles {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty() && self.japanese.is_empty() && self.english.is_empty()
    }

    /// Every known alternate title, normalized, framed by newlines.
    ///
    /// The framing lets a store match a whole title with `LIKE '%\nkey\n%'`.
    #[must_use]
    pub fn search_key(&self) -> String {
        let titles: Vec<String> = [self.english.as_str(), self.japanese.as_str()]
            .into_iter()
            .chain(self.synonyms.iter().map(String::as_str))
            .map(normalize_name)
            .filter(|t| !t.is_empty())
            .collect();

        if titles.is_empty() {
            String::new()
        } else {
            format!("\n{}\n", titles.join("\n"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimeInformation {
    #[serde(default, deserialize_with = "lenient::i32_from_any")]
    pub episodes: i32,
    /// Airing status as reported by the provider ("Finished Airing", ...).
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub aired: String,
    #[serde(default)]
    pub premiered: String,
    #[serde(default)]
    pub studios: Vec<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnimeStatistics {
    #[serde(default, deserialize_with = "lenient::f64_from_any")]
    pub score: f64,
    #[serde(default, deserialize_with = "lenient::i32_from_any")]
    pub ranked: i32,
    #[serde(default, deserialize_with = "lenient::i32_from_any")]
    pub popularity: i32,
    #[serde(default, deserialize_with = "lenient::i32_from_any")]
    pub favorites: i32,
}

impl AnimeStatistics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.score == 0.0 && self.ranked == 0 && self.popularity == 0 && self.favorites == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub voice_actor: String,
    #[serde(default)]
    pub voice_actor_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimeThemes {
    #[serde(default)]
    pub openings: Vec<String>,
    #[serde(default)]
    pub endings: Vec<String>,
}

impl AnimeThemes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.openings.is_empty() && self.endings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedAnime {
    pub name: String,
    #[serde(default)]
    pub relation_type: String,
    #[serde(default)]
    pub image_url: String,
}

/// Descriptive fields an external provider can contribute to a record.
///
/// Every field is optional in spirit: empty strings and vectors mean
/// "provider had nothing".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enhancement {
    pub mal_id: Option<i32>,
    pub anilist_id: Option<i32>,
    pub kind: Option<AnimeType>,
    pub synopsis: String,
    pub genres: Vec<String>,
    pub year: Option<i32>,
    pub season: Option<Season>,
    pub image_url: String,
    pub banner_url: String,
    pub alternative_titles: AlternativeTitles,
    pub information: AnimeInformation,
    pub statistics: AnimeStatistics,
    pub characters: Vec<Character>,
    pub staff: Vec<StaffMember>,
    pub themes: AnimeThemes,
    pub related: Vec<RelatedAnime>,
}

/// A full provider-side record, as returned by name search or season listings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAnime {
    pub name: String,
    /// Already converted to the 0..=10 scale.
    pub score: Option<f32>,
    pub details: Enhancement,
}

impl ExternalAnime {
    /// Builds a new canonical record with a fresh ID.
    #[must_use]
    pub fn into_record(self) -> AnimeRecord {
        let mut record = AnimeRecord::new(self.name);
        record.merge_enhancement(self.details);
        record.progress.total = record.information.episodes;
        record.score = self.score.map_or(0.0, clamp_score);
        record.status = (!record.information.status.is_empty())
            .then(|| WatchStatus::from_airing(&record.information.status));
        record
    }
}

/// Cover and banner pair returned by image lookups.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePair {
    pub cover_url: String,
    pub banner_url: String,
}

/// Sparse update applied by admin edits and watch-list operations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimePatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<AnimeType>,
    pub genres: Option<Vec<String>>,
    pub synopsis: Option<String>,
    pub notes: Option<String>,
    pub year: Option<i32>,
    pub season: Option<Season>,
    pub image_url: Option<String>,
    pub banner_url: Option<String>,
    pub status: Option<WatchStatus>,
    pub watched: Option<i32>,
    pub total: Option<i32>,
    pub score: Option<f32>,
    pub mal_id: Option<i32>,
    #[serde(rename = "aniListId")]
    pub anilist_id: Option<i32>,
}

impl AnimePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Checks name, notes, score and episode bounds on the present fields.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            crate::domain::validate_name(name)?;
        }
        if let Some(notes) = &self.notes {
            validate_notes(notes)?;
        }
        if let Some(score) = self.score {
            validate_score(score)?;
        }
        if self.watched.is_some_and(|w| w < 0) || self.total.is_some_and(|t| t < 0) {
            return Err("progress values must not be negative".to_string());
        }
        Ok(())
    }
}

/// # Errors
///
/// Returns a message when `score` is outside 0..=10.
pub fn validate_score(score: f32) -> Result<(), String> {
    if (0.0..=10.0).contains(&score) {
        Ok(())
    } else {
        Err(format!("score must be between 0 and 10, got {score}"))
    }
}

/// # Errors
///
/// Returns a message when notes exceed [`MAX_NOTES_LEN`] characters.
pub fn validate_notes(notes: &str) -> Result<(), String> {
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(format!("notes must be at most {MAX_NOTES_LEN} characters"));
    }
    Ok(())
}

#[must_use]
pub fn clamp_score(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 10.0)
    } else {
        0.0
    }
}

fn fill_string(target: &mut String, source: String) -> bool {
    if target.trim().is_empty() && !source.trim().is_empty() {
        *target = source;
        return true;
    }
    false
}

fn fill_vec<T>(target: &mut Vec<T>, source: Vec<T>) -> bool {
    if target.is_empty() && !source.is_empty() {
        *target = source;
        return true;
    }
    false
}

fn fill_option<T>(target: &mut Option<T>, source: Option<T>) -> bool {
    if target.is_none() && source.is_some() {
        *target = source;
        return true;
    }
    false
}

fn fill_number<T: Default + PartialEq>(target: &mut T, source: T) -> bool {
    if *target == T::default() && source != T::default() {
        *target = source;
        return true;
    }
    false
}

impl AnimeRecord {
    /// Empty canonical record with a fresh ID and current timestamps.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AnimeId::generate(),
            user_id: None,
            mal_id: None,
            anilist_id: None,
            name: name.into().trim().to_string(),
            kind: None,
            genres: Vec::new(),
            synopsis: String::new(),
            notes: String::new(),
            year: None,
            season: None,
            image_url: String::new(),
            banner_url: String::new(),
            status: None,
            progress: Progress::default(),
            score: 0.0,
            alternative_titles: AlternativeTitles::default(),
            information: AnimeInformation::default(),
            statistics: AnimeStatistics::default(),
            characters: Vec::new(),
            staff: Vec::new(),
            themes: AnimeThemes::default(),
            related: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Minimal personal record used when no canonical data can be found.
    #[must_use]
    pub fn stub(name: &str, user_id: &str, status: WatchStatus) -> Self {
        let mut record = Self::new(name);
        record.user_id = Some(user_id.to_string());
        record.kind = Some(AnimeType::Series);
        record.status = Some(status);
        record.notes = "Added by user".to_string();
        record
    }

    #[must_use]
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }

    #[must_use]
    pub const fn is_canonical(&self) -> bool {
        self.user_id.is_none()
    }

    /// A record is complete when it needs no enhancement round trip.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.synopsis.is_empty()
            && !self.genres.is_empty()
            && !self.image_url.is_empty()
            && self.information.episodes > 0
            && !self.information.status.is_empty()
            && !self.characters.is_empty()
    }

    /// Fills blank fields from `enhancement`; never overwrites non-empty data.
    ///
    /// Returns whether anything changed. `name` is never touched.
    pub fn merge_enhancement(&mut self, enhancement: Enhancement) -> bool {
        let Enhancement {
            mal_id,
            anilist_id,
            kind,
            synopsis,
            genres,
            year,
            season,
            image_url,
            banner_url,
            alternative_titles,
            information,
            statistics,
            characters,
            staff,
            themes,
            related,
        } = enhancement;

        let mut changed = false;
        changed |= fill_option(&mut self.mal_id, mal_id);
        changed |= fill_option(&mut self.anilist_id, anilist_id);
        changed |= fill_option(&mut self.kind, kind);
        changed |= fill_string(&mut self.synopsis, synopsis);
        changed |= fill_vec(&mut self.genres, genres);
        changed |= fill_option(&mut self.year, year.filter(|y| *y > 0));
        changed |= fill_option(&mut self.season, season);
        changed |= fill_string(&mut self.image_url, image_url);
        changed |= fill_string(&mut self.banner_url, banner_url);

        let titles = &mut self.alternative_titles;
        changed |= fill_vec(&mut titles.synonyms, alternative_titles.synonyms);
        changed |= fill_string(&mut titles.japanese, alternative_titles.japanese);
        changed |= fill_string(&mut titles.english, alternative_titles.english);

        let info = &mut self.information;
        changed |= fill_number(&mut info.episodes, information.episodes);
        changed |= fill_string(&mut info.status, information.status);
        changed |= fill_string(&mut info.aired, information.aired);
        changed |= fill_string(&mut info.premiered, information.premiered);
        changed |= fill_vec(&mut info.studios, information.studios);
        changed |= fill_string(&mut info.source, information.source);
        changed |= fill_string(&mut info.duration, information.duration);

        let stats = &mut self.statistics;
        changed |= fill_number(&mut stats.score, statistics.score);
        changed |= fill_number(&mut stats.ranked, statistics.ranked);
        changed |= fill_number(&mut stats.popularity, statistics.popularity);
        changed |= fill_number(&mut stats.favorites, statistics.favorites);

        changed |= fill_vec(&mut self.characters, characters);
        changed |= fill_vec(&mut self.staff, staff);
        changed |= fill_vec(&mut self.themes.openings, themes.openings);
        changed |= fill_vec(&mut self.themes.endings, themes.endings);
        changed |= fill_vec(&mut self.related, related);

        if self.progress.total == 0 && self.information.episodes > 0 {
            self.progress.total = self.information.episodes;
            changed = true;
        }

        if changed {
            self.touch();
        }
        changed
    }

    /// Personal copy for `user_id`: descriptive fields cloned, watch data reset.
    #[must_use]
    pub fn user_copy(&self, user_id: &str, status: WatchStatus) -> Self {
        let now = Utc::now();
        Self {
            id: AnimeId::generate(),
            user_id: Some(user_id.to_string()),
            status: Some(status),
            score: 0.0,
            progress: Progress {
                watched: 0,
                total: self.progress.total.max(self.information.episodes),
            },
            notes: String::new(),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_record() -> AnimeRecord {
        let mut record = AnimeRecord::new("Frieren");
        record.synopsis = "An elf mage outlives her party.".to_string();
        record.genres = vec!["Adventure".to_string()];
        record.image_url = "https://img.example/frieren-extraLarge.jpg".to_string();
        record.information.episodes = 28;
        record.information.status = "Finished Airing".to_string();
        record.characters = vec![Character {
            name: "Frieren".to_string(),
            ..Character::default()
        }];
        record
    }

    #[test]
    fn complete_record_passes_gate() {
        assert!(complete_record().is_complete());
    }

    #[test]
    fn each_missing_field_fails_gate() {
        let mutations: [fn(&mut AnimeRecord); 6] = [
            |r| r.synopsis.clear(),
            |r| r.genres.clear(),
            |r| r.image_url.clear(),
            |r| r.information.episodes = 0,
            |r| r.information.status.clear(),
            |r| r.characters.clear(),
        ];

        for mutate in mutations {
            let mut record = complete_record();
            mutate(&mut record);
            assert!(!record.is_complete());
        }
    }

    #[test]
    fn whitespace_counts_as_present() {
        let mut record = complete_record();
        record.synopsis = " ".to_string();
        record.information.status = "\t".to_string();
        assert!(record.is_complete());
    }

    #[test]
    fn merge_fills_blanks_and_keeps_existing() {
        let mut record = AnimeRecord::new("Attack on Titan");
        record.genres = vec!["Action".to_string()];
        record.image_url = "https://img.example/aot.jpg".to_string();

        let changed = record.merge_enhancement(Enhancement {
            synopsis: "Humanity behind walls.".to_string(),
            genres: vec!["Drama".to_string()],
            image_url: String::new(),
            information: AnimeInformation {
                episodes: 25,
                status: "Finished Airing".to_string(),
                ..AnimeInformation::default()
            },
            ..Enhancement::default()
        });

        assert!(changed);
        assert_eq!(record.name, "Attack on Titan");
        assert_eq!(record.synopsis, "Humanity behind walls.");
        assert_eq!(record.genres, vec!["Action".to_string()]);
        assert_eq!(record.image_url, "https://img.example/aot.jpg");
        assert_eq!(record.information.episodes, 25);
        assert_eq!(record.progress.total, 25);
    }

    #[test]
    fn merge_with_empty_enhancement_changes_nothing() {
        let mut record = complete_record();
        let before = record.clone();
        assert!(!record.merge_enhancement(Enhancement::default()));
        assert_eq!(record, before);
    }

    #[test]
    fn user_copy_resets_watch_data() {
        let mut canonical = complete_record();
        canonical.score = 8.7;
        canonical.progress.total = 28;

        let copy = canonical.user_copy("user-1", WatchStatus::Watching);
        assert_ne!(copy.id, canonical.id);
        assert_eq!(copy.user_id.as_deref(), Some("user-1"));
        assert_eq!(copy.score, 0.0);
        assert_eq!(copy.progress, Progress { watched: 0, total: 28 });
        assert_eq!(copy.status, Some(WatchStatus::Watching));
        assert_eq!(copy.synopsis, canonical.synopsis);
    }

    #[test]
    fn progress_bounds() {
        assert!(Progress { watched: 3, total: 12 }.validate().is_ok());
        assert!(Progress { watched: 5, total: 0 }.validate().is_ok());
        assert!(Progress { watched: 13, total: 12 }.validate().is_err());
        assert!(Progress { watched: -1, total: 0 }.validate().is_err());
    }

    #[test]
    fn alternative_title_key_is_framed() {
        let titles = AlternativeTitles {
            synonyms: vec!["AoT".to_string()],
            japanese: String::new(),
            english: "Attack on Titan".to_string(),
        };
        assert_eq!(titles.search_key(), "\nattack on titan\naot\n");
        assert_eq!(AlternativeTitles::default().search_key(), "");
    }

    #[test]
    fn stored_statistics_tolerate_numeric_variance() {
        let stats: AnimeStatistics =
            serde_json::from_str(r#"{"score": "8.4", "ranked": 12.0, "popularity": 3000}"#)
                .unwrap();
        assert_eq!(stats.ranked, 12);
        assert_eq!(stats.popularity, 3000);
        assert_eq!(stats.favorites, 0);
    }

    #[test]
    fn external_anime_converts_to_canonical_record() {
        let record = ExternalAnime {
            name: "Naruto".to_string(),
            score: Some(7.9),
            details: Enhancement {
                information: AnimeInformation {
                    episodes: 220,
                    status: "Finished Airing".to_string(),
                    ..AnimeInformation::default()
                },
                ..Enhancement::default()
            },
        }
        .into_record();

        assert!(record.is_canonical());
        assert_eq!(record.progress.total, 220);
        assert_eq!(record.status, Some(WatchStatus::Completed));
        assert!((record.score - 7.9).abs() < f32::EPSILON);
    }
}
