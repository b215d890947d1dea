use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::domain::UserRole;
use crate::entities::users;
use crate::models::user::{UserRecord, UserStats};

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

impl From<users::Model> for UserRecord {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            external_auth_id: model.external_auth_id,
            email: model.email,
            name: model.name,
            role: model.role.parse().unwrap_or_default(),
            stats: serde_json::from_str(&model.stats).unwrap_or_default(),
            created_at: parse_timestamp(&model.created_at),
            updated_at: parse_timestamp(&model.updated_at),
        }
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<UserRecord>> {
        let user = users::Entity::find()
            .filter(users::Column::ExternalAuthId.eq(external_id))
            .one(&self.conn)
            .await
            .context("Failed to query user by external id")?;

        Ok(user.map(UserRecord::from))
    }

    /// Creates the user on first sight, otherwise refreshes profile fields.
    ///
    /// `role` is only written when given; new users default to `user`.
    pub async fn upsert(
        &self,
        external_id: &str,
        email: &str,
        name: &str,
        role: Option<UserRole>,
    ) -> Result<UserRecord> {
        let now = Utc::now().to_rfc3339();
        let existing = users::Entity::find()
            .filter(users::Column::ExternalAuthId.eq(external_id))
            .one(&self.conn)
            .await
            .context("Failed to query user by external id")?;

        let model = match existing {
            Some(model) => {
                let mut active: users::ActiveModel = model.into();
                if !email.is_empty() {
                    active.email = Set(email.to_string());
                }
                if !name.is_empty() {
                    active.name = Set(name.to_string());
                }
                if let Some(role) = role {
                    active.role = Set(role.as_str().to_string());
                }
                active.updated_at = Set(now);
                active.update(&self.conn).await.context("Failed to update user")?
            }
            None => {
                let active = users::ActiveModel {
                    external_auth_id: Set(external_id.to_string()),
                    email: Set(email.to_string()),
                    name: Set(name.to_string()),
                    role: Set(role.unwrap_or_default().as_str().to_string()),
                    stats: Set(serde_json::to_string(&UserStats::default())?),
                    created_at: Set(now.clone()),
                    updated_at: Set(now),
                    ..Default::default()
                };
                active.insert(&self.conn).await.context("Failed to create user")?
            }
        };

        Ok(UserRecord::from(model))
    }

    pub async fn set_role(&self, external_id: &str, role: UserRole) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::Role, Expr::value(role.as_str()))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::ExternalAuthId.eq(external_id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn save_stats(&self, external_id: &str, stats: &UserStats) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::Stats, Expr::value(serde_json::to_string(stats)?))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::ExternalAuthId.eq(external_id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
