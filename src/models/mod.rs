pub mod anime;
pub mod filter;
pub mod image;
pub mod user;

pub(crate) mod lenient;
