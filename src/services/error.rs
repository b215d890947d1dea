//! Error taxonomy shared by the catalog services.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The identifier resolved in none of the tiers.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The external provider could not be reached or answered garbage.
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Rejected before any tier was consulted.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl CatalogError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upstream(err: &anyhow::Error) -> Self {
        Self::Upstream(format!("{err:#}"))
    }
}

/// Store failures reach services as `anyhow` errors.
impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

impl From<sea_orm::DbErr> for CatalogError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
