use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{UserRole, WatchStatus};

/// Caller identity handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub subject_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
}

impl CallerIdentity {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub watching: u64,
    pub completed: u64,
    pub on_hold: u64,
    pub dropped: u64,
    pub plan_to_watch: u64,
    pub total: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl UserStats {
    /// Builds stats from `(status, count)` rows of a group-by aggregate.
    ///
    /// Rows with an unknown or missing status only count towards `total`.
    #[must_use]
    pub fn from_counts(rows: &[(Option<String>, u64)]) -> Self {
        let mut stats = Self::default();
        for (status, count) in rows {
            stats.total += count;
            match status.as_deref().and_then(|s| s.parse::<WatchStatus>().ok()) {
                Some(WatchStatus::Watching) => stats.watching += count,
                Some(WatchStatus::Completed) => stats.completed += count,
                Some(WatchStatus::OnHold) => stats.on_hold += count,
                Some(WatchStatus::Dropped) => stats.dropped += count,
                Some(WatchStatus::PlanToWatch) => stats.plan_to_watch += count,
                None => {}
            }
        }
        stats.last_updated = Some(Utc::now());
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i32,
    pub external_auth_id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub stats: UserStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
