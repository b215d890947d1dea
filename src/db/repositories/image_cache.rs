use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::image_cache;
use crate::models::image::ImageCacheEntry;

pub struct ImageCacheRepository {
    conn: DatabaseConnection,
}

fn id_condition(mal_id: Option<i32>, anilist_id: Option<i32>) -> Condition {
    let mal = mal_id.map_or_else(
        || image_cache::Column::MalId.is_null(),
        |id| image_cache::Column::MalId.eq(id),
    );
    let anilist = anilist_id.map_or_else(
        || image_cache::Column::AnilistId.is_null(),
        |id| image_cache::Column::AnilistId.eq(id),
    );
    Condition::all().add(mal).add(anilist)
}

impl ImageCacheRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(
        &self,
        mal_id: Option<i32>,
        anilist_id: Option<i32>,
    ) -> Result<Option<ImageCacheEntry>> {
        let row = image_cache::Entity::find()
            .filter(id_condition(mal_id, anilist_id))
            .order_by_desc(image_cache::Column::LastUpdated)
            .one(&self.conn)
            .await?;

        Ok(row.map(|m| ImageCacheEntry {
            mal_id: m.mal_id,
            anilist_id: m.anilist_id,
            image_url: m.image_url,
            banner_url: m.banner_url,
            last_updated: DateTime::parse_from_rfc3339(&m.last_updated)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_default(),
        }))
    }

    pub async fn upsert(&self, entry: &ImageCacheEntry) -> Result<()> {
        let existing = image_cache::Entity::find()
            .filter(id_condition(entry.mal_id, entry.anilist_id))
            .one(&self.conn)
            .await?;

        let last_updated = entry.last_updated.to_rfc3339();

        match existing {
            Some(model) => {
                let mut active: image_cache::ActiveModel = model.into();
                active.image_url = Set(entry.image_url.clone());
                active.banner_url = Set(entry.banner_url.clone());
                active.last_updated = Set(last_updated);
                active.update(&self.conn).await?;
            }
            None => {
                image_cache::ActiveModel {
                    mal_id: Set(entry.mal_id),
                    anilist_id: Set(entry.anilist_id),
                    image_url: Set(entry.image_url.clone()),
                    banner_url: Set(entry.banner_url.clone()),
                    last_updated: Set(last_updated),
                    created_at: Set(Utc::now().to_rfc3339()),
                    ..Default::default()
                }
                .insert(&self.conn)
                .await?;
            }
        }

        Ok(())
    }
}
