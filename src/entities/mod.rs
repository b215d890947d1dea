pub mod prelude;

pub mod anime;
pub mod image_cache;
pub mod users;
