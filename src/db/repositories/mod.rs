pub mod anime;
pub mod image_cache;
pub mod user;
