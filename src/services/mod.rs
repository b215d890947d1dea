pub mod catalog;
pub mod error;
pub mod image_cache;
pub mod image_upgrade;
pub mod import;
pub mod listings;
pub mod resolver;
pub mod scheduler;
pub mod search;
pub mod users;
pub mod watchlist;

pub use catalog::CatalogService;
pub use error::{CatalogError, CatalogResult};
pub use image_cache::ImageCacheService;
pub use image_upgrade::ImageUpgrader;
pub use import::Importer;
pub use listings::{BrowsePage, ListingService};
pub use resolver::AnimeResolver;
pub use scheduler::Scheduler;
pub use search::{RankedMatch, SearchEngine, SearchRequest};
pub use users::UserService;
pub use watchlist::WatchListService;
