use serde::{Deserialize, Serialize};

use crate::domain::{AnimeType, Season, WatchStatus};

/// Which records a query may see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Owner {
    #[default]
    Canonical,
    User(String),
    Any,
}

/// How a name predicate is matched against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    /// Whole name, case-insensitive.
    Exact(String),
    /// Whole name or any whole alternate title.
    Title(String),
    Prefix(String),
    Contains(String),
    /// Substring of notes or alternate titles.
    NotesOrSynonyms(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimeSort {
    #[default]
    ScoreDesc,
    ScoreThenYearDesc,
    NameAsc,
    RecentlyUpdated,
}

/// Conjunctive store filter. Absent fields impose no constraint.
#[derive(Debug, Clone, Default)]
pub struct AnimeQuery {
    pub owner: Owner,
    pub name: Option<NameMatch>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub season: Option<Season>,
    pub kind: Option<AnimeType>,
    pub status: Option<WatchStatus>,
    pub min_score: Option<f32>,
    pub missing_year_or_season: bool,
    pub sort: AnimeSort,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl AnimeQuery {
    #[must_use]
    pub fn canonical() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owned_by(user_id: &str) -> Self {
        Self {
            owner: Owner::User(user_id.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: NameMatch) -> Self {
        self.name = Some(name);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn sorted(mut self, sort: AnimeSort) -> Self {
        self.sort = sort;
        self
    }
}

/// Structured filter as accepted from callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub name: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub season: Option<Season>,
    #[serde(rename = "format", alias = "type")]
    pub kind: Option<AnimeType>,
    pub status: Option<WatchStatus>,
    pub user_id: Option<String>,
}

impl FilterParams {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Translates into a store query; `user_id` restricts to personal copies.
    #[must_use]
    pub fn to_query(&self) -> AnimeQuery {
        let owner = self
            .user_id
            .as_ref()
            .map_or(Owner::Canonical, |id| Owner::User(id.clone()));

        AnimeQuery {
            owner,
            name: self
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(|n| NameMatch::Contains(n.to_string())),
            genre: self.genre.clone().filter(|g| !g.trim().is_empty()),
            year: self.year,
            season: self.season,
            kind: self.kind,
            status: self.status,
            ..AnimeQuery::default()
        }
    }
}
