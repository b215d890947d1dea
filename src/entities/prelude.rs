pub use super::anime::Entity as Anime;
pub use super::image_cache::Entity as ImageCache;
pub use super::users::Entity as Users;
