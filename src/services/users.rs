use tracing::{debug, info};

use super::error::{CatalogError, CatalogResult};
use crate::db::Store;
use crate::domain::UserRole;
use crate::models::user::{CallerIdentity, UserRecord, UserStats};

#[derive(Clone)]
pub struct UserService {
    store: Store,
}

impl UserService {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates the caller's user row on first sight and keeps email and
    /// name in sync. Roles are never taken from the caller.
    pub async fn ensure_user(&self, identity: &CallerIdentity) -> CatalogResult<UserRecord> {
        if identity.subject_id.trim().is_empty() {
            return Err(CatalogError::validation("subject id must not be empty"));
        }

        if let Some(existing) = self.store.get_user_by_external_id(&identity.subject_id).await?
            && existing.email == identity.email
            && existing.name == identity.name
        {
            return Ok(existing);
        }

        let user = self
            .store
            .upsert_user(&identity.subject_id, &identity.email, &identity.name, None)
            .await?;
        debug!(user_id = %identity.subject_id, "User profile synced");
        Ok(user)
    }

    pub async fn get(&self, external_id: &str) -> CatalogResult<UserRecord> {
        self.store
            .get_user_by_external_id(external_id)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("user {external_id}")))
    }

    pub async fn set_role(&self, external_id: &str, role: UserRole) -> CatalogResult<UserRecord> {
        if !self.store.set_user_role(external_id, role).await? {
            return Err(CatalogError::not_found(format!("user {external_id}")));
        }
        info!(event = "user_role_changed", user_id = external_id, role = role.as_str(), "User role changed");
        self.get(external_id).await
    }

    /// Recounts the user's list per watch status and stores the result.
    pub async fn refresh_stats(&self, external_id: &str) -> CatalogResult<UserStats> {
        let rows = self.store.status_counts(external_id).await?;
        let stats = UserStats::from_counts(&rows);
        if !self.store.save_user_stats(external_id, &stats).await? {
            debug!(user_id = external_id, "Stats computed for unknown user, not stored");
        }
        Ok(stats)
    }
}
