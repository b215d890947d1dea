//! Cache key layout.

use crate::domain::{AnimeId, AnimeIdentifier, normalize_name};

pub const TRENDING: &str = "trending:anime";
pub const POPULAR: &str = "popular:anime";
pub const SPOTLIGHT: &str = "spotlight:anime";
pub const MOVIES: &str = "movies:anime";

/// Listing keys that may embed any canonical record.
pub const LISTINGS: [&str; 4] = [TRENDING, POPULAR, SPOTLIGHT, MOVIES];

#[must_use]
pub fn record(id: &AnimeId) -> String {
    format!("anime:{id}")
}

#[must_use]
pub fn enhanced(id: &AnimeId) -> String {
    format!("enhanced_anime:{id}")
}

#[must_use]
pub fn by_name(name: &str) -> String {
    format!("anime_fallback:{}", normalize_name(name))
}

#[must_use]
pub fn for_identifier(identifier: &AnimeIdentifier) -> String {
    match identifier {
        AnimeIdentifier::Id(id) => record(id),
        AnimeIdentifier::Name(name) => by_name(name),
    }
}

#[must_use]
pub fn search(query: &str, limit: usize) -> String {
    format!("search:{}:{limit}", normalize_name(query))
}

#[must_use]
pub fn browse(page: u64, per_page: u64) -> String {
    format!("browse:anime:{page}:{per_page}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keys_are_normalized() {
        assert_eq!(by_name("  Attack on  Titan"), "anime_fallback:attack on titan");
        assert_eq!(search("Naruto ", 10), "search:naruto:10");
    }

    #[test]
    fn identifier_picks_key_family() {
        let id = AnimeId::generate();
        assert_eq!(
            for_identifier(&AnimeIdentifier::Id(id.clone())),
            format!("anime:{id}")
        );
        assert_eq!(
            for_identifier(&AnimeIdentifier::Name("Naruto".to_string())),
            "anime_fallback:naruto"
        );
    }
}
