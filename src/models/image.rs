use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Image cache entries older than this are refetched.
pub const IMAGE_CACHE_MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCacheEntry {
    pub mal_id: Option<i32>,
    #[serde(rename = "aniListId")]
    pub anilist_id: Option<i32>,
    pub image_url: String,
    pub banner_url: String,
    pub last_updated: DateTime<Utc>,
}

impl ImageCacheEntry {
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > Duration::days(IMAGE_CACHE_MAX_AGE_DAYS)
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_day_staleness() {
        let now = Utc::now();
        let mut entry = ImageCacheEntry {
            mal_id: Some(1),
            anilist_id: None,
            image_url: "https://img.example/a.jpg".to_string(),
            banner_url: String::new(),
            last_updated: now - Duration::days(29),
        };
        assert!(!entry.is_stale_at(now));

        entry.last_updated = now - Duration::days(31);
        assert!(entry.is_stale_at(now));
    }
}
