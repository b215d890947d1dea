//! Domain primitives for the anime catalog.
//!
//! Identifiers and closed vocabularies (type, season, watch status, role)
//! live here so that parsing from external formats happens in exactly one
//! place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of an [`AnimeRecord`](crate::models::anime::AnimeRecord).
///
/// Store-assigned, backed by a random UUID.
///
/// # Examples
///
/// ```rust
/// use animeverse::domain::AnimeId;
///
/// let id = AnimeId::generate();
/// let parsed: AnimeId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimeId(uuid::Uuid);

impl AnimeId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for AnimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AnimeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Maximum length of an anime name, in characters.
pub const MAX_NAME_LEN: usize = 200;

/// What a caller asked to resolve: a store ID or a free-form name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnimeIdentifier {
    Id(AnimeId),
    Name(String),
}

impl AnimeIdentifier {
    /// Parses a raw identifier. UUID-shaped input is an ID, anything else a name.
    ///
    /// # Errors
    ///
    /// Returns a message when the input is blank or longer than [`MAX_NAME_LEN`].
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if let Ok(id) = trimmed.parse::<AnimeId>() {
            return Ok(Self::Id(id));
        }
        validate_name(trimmed)?;
        Ok(Self::Name(trimmed.to_string()))
    }
}

impl fmt::Display for AnimeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Checks the 1..=200 character bound on names.
///
/// # Errors
///
/// Returns a human readable reason when the bound is violated.
pub fn validate_name(name: &str) -> Result<(), String> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err("name must not be empty".to_string());
    }
    if len > MAX_NAME_LEN {
        return Err(format!("name must be at most {MAX_NAME_LEN} characters"));
    }
    Ok(())
}

/// Lowercases, trims and collapses inner whitespace.
///
/// This is the uniqueness key for canonical records and the basis of
/// name-derived cache keys.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnimeType {
    Series,
    Movie,
    ShortForm,
}

impl AnimeType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Movie => "movie",
            Self::ShortForm => "short-form",
        }
    }

    /// Maps provider formats (`TV`, `MOVIE`, `OVA`, `ONA`, `SPECIAL`, ...).
    #[must_use]
    pub fn from_external(format: &str) -> Option<Self> {
        match format.trim().to_uppercase().as_str() {
            "TV" | "TV_SHORT" | "SERIES" => Some(Self::Series),
            "MOVIE" => Some(Self::Movie),
            "OVA" | "ONA" | "SPECIAL" | "MUSIC" | "SHORT-FORM" | "CM" | "PV" => {
                Some(Self::ShortForm)
            }
            _ => None,
        }
    }
}

impl fmt::Display for AnimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "series" => Ok(Self::Series),
            "movie" => Ok(Self::Movie),
            "short-form" => Ok(Self::ShortForm),
            other => Self::from_external(other).ok_or_else(|| format!("unknown anime type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Winter => "winter",
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Fall => "fall",
        }
    }

    /// Season and season-year for a calendar month.
    ///
    /// December belongs to the winter season of the following year.
    #[must_use]
    pub const fn for_month(month: u32, year: i32) -> (Self, i32) {
        match month {
            12 => (Self::Winter, year + 1),
            1 | 2 => (Self::Winter, year),
            3..=5 => (Self::Spring, year),
            6..=8 => (Self::Summer, year),
            _ => (Self::Fall, year),
        }
    }

    /// Upper-case form used by the GraphQL provider's `MediaSeason` enum.
    #[must_use]
    pub const fn as_media_season(&self) -> &'static str {
        match self {
            Self::Winter => "WINTER",
            Self::Spring => "SPRING",
            Self::Summer => "SUMMER",
            Self::Fall => "FALL",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "winter" => Ok(Self::Winter),
            "spring" => Ok(Self::Spring),
            "summer" => Ok(Self::Summer),
            "fall" | "autumn" => Ok(Self::Fall),
            _ => Err(format!("unknown season: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchStatus {
    Watching,
    Completed,
    OnHold,
    Dropped,
    PlanToWatch,
}

impl WatchStatus {
    pub const ALL: [Self; 5] = [
        Self::Watching,
        Self::Completed,
        Self::OnHold,
        Self::Dropped,
        Self::PlanToWatch,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Watching => "watching",
            Self::Completed => "completed",
            Self::OnHold => "on-hold",
            Self::Dropped => "dropped",
            Self::PlanToWatch => "plan-to-watch",
        }
    }

    /// Derives a list status from a provider airing status.
    #[must_use]
    pub fn from_airing(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "finished" | "completed" | "finished airing" => Self::Completed,
            "ongoing" | "currently airing" | "releasing" => Self::Watching,
            _ => Self::PlanToWatch,
        }
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| format!("invalid status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_parses_uuid_as_id() {
        let id = AnimeId::generate();
        assert_eq!(
            AnimeIdentifier::parse(&id.to_string()),
            Ok(AnimeIdentifier::Id(id))
        );
    }

    #[test]
    fn identifier_rejects_blank_and_long_names() {
        assert!(AnimeIdentifier::parse("   ").is_err());
        assert!(AnimeIdentifier::parse(&"a".repeat(201)).is_err());
        assert_eq!(
            AnimeIdentifier::parse("  Naruto "),
            Ok(AnimeIdentifier::Name("Naruto".to_string()))
        );
    }

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize_name("  Attack   on TITAN "), "attack on titan");
    }

    #[test]
    fn external_formats_map_to_types() {
        assert_eq!(AnimeType::from_external("TV"), Some(AnimeType::Series));
        assert_eq!(AnimeType::from_external("MOVIE"), Some(AnimeType::Movie));
        assert_eq!(AnimeType::from_external("ona"), Some(AnimeType::ShortForm));
        assert_eq!(AnimeType::from_external("SPECIAL"), Some(AnimeType::ShortForm));
        assert_eq!(AnimeType::from_external("UNKNOWN"), None);
    }

    #[test]
    fn airing_status_maps_to_watch_status() {
        assert_eq!(WatchStatus::from_airing("FINISHED"), WatchStatus::Completed);
        assert_eq!(WatchStatus::from_airing("Currently Airing"), WatchStatus::Watching);
        assert_eq!(WatchStatus::from_airing("UPCOMING"), WatchStatus::PlanToWatch);
    }

    #[test]
    fn watch_status_round_trips_kebab_case() {
        assert_eq!("on-hold".parse::<WatchStatus>(), Ok(WatchStatus::OnHold));
        assert!("paused".parse::<WatchStatus>().is_err());
        let json = serde_json::to_string(&WatchStatus::PlanToWatch).unwrap();
        assert_eq!(json, "\"plan-to-watch\"");
    }

    #[test]
    fn december_rolls_into_next_winter() {
        assert_eq!(Season::for_month(12, 2025), (Season::Winter, 2026));
        assert_eq!(Season::for_month(4, 2025), (Season::Spring, 2025));
        assert_eq!(Season::for_month(10, 2025), (Season::Fall, 2025));
    }
}
