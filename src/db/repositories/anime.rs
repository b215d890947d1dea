use crate::domain::{AnimeId, normalize_name};
use crate::entities::{anime, prelude::*};
use crate::models::anime::{AnimePatch, AnimeRecord, Progress};
use crate::models::filter::{AnimeQuery, AnimeSort, NameMatch, Owner};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::sea_query::{Expr, LikeExpr, OnConflict, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Rows per multi-row INSERT; keeps bound parameters under SQLite's limit.
const SQL_INSERT_CHUNK: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Same owner already has a record with this normalized name.
    Duplicate,
}

pub struct AnimeRepository {
    conn: DatabaseConnection,
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn like(column: anime::Column, pattern: String) -> SimpleExpr {
    Expr::col(column).like(LikeExpr::new(pattern).escape('\\'))
}

fn decode<T: DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

fn owner_key(owner: Option<&String>) -> String {
    owner.cloned().unwrap_or_default()
}

fn owner_condition(owner: &Owner) -> Condition {
    match owner {
        Owner::Canonical => Condition::all().add(anime::Column::UserId.eq("")),
        Owner::User(id) => Condition::all().add(anime::Column::UserId.eq(id.as_str())),
        Owner::Any => Condition::all(),
    }
}

fn name_condition(name: &NameMatch) -> Condition {
    match name {
        NameMatch::Exact(raw) => Condition::all().add(anime::Column::NameKey.eq(normalize_name(raw))),
        NameMatch::Title(raw) => {
            let key = normalize_name(raw);
            Condition::any()
                .add(anime::Column::NameKey.eq(key.clone()))
                .add(like(
                    anime::Column::AltTitlesKey,
                    format!("%\n{}\n%", escape_like(&key)),
                ))
        }
        NameMatch::Prefix(raw) => Condition::all().add(like(
            anime::Column::NameKey,
            format!("{}%", escape_like(&normalize_name(raw))),
        )),
        NameMatch::Contains(raw) => Condition::all().add(like(
            anime::Column::NameKey,
            format!("%{}%", escape_like(&normalize_name(raw))),
        )),
        NameMatch::NotesOrSynonyms(raw) => {
            let pattern = format!("%{}%", escape_like(&normalize_name(raw)));
            Condition::any()
                .add(like(anime::Column::Notes, pattern.clone()))
                .add(like(anime::Column::AltTitlesKey, pattern))
        }
    }
}

fn query_condition(query: &AnimeQuery) -> Condition {
    let mut cond = owner_condition(&query.owner);

    if let Some(name) = &query.name {
        cond = cond.add(name_condition(name));
    }
    if let Some(genre) = &query.genre {
        cond = cond.add(like(
            anime::Column::Genres,
            format!("%\"{}\"%", escape_like(genre.trim())),
        ));
    }
    if let Some(year) = query.year {
        cond = cond.add(anime::Column::Year.eq(year));
    }
    if let Some(season) = query.season {
        cond = cond.add(anime::Column::Season.eq(season.as_str()));
    }
    if let Some(kind) = query.kind {
        cond = cond.add(anime::Column::AnimeType.eq(kind.as_str()));
    }
    if let Some(status) = query.status {
        cond = cond.add(anime::Column::Status.eq(status.as_str()));
    }
    if let Some(min_score) = query.min_score {
        cond = cond.add(anime::Column::Score.gte(f64::from(min_score)));
    }
    if query.missing_year_or_season {
        cond = cond.add(
            Condition::any()
                .add(anime::Column::Year.is_null())
                .add(anime::Column::Year.eq(0))
                .add(anime::Column::Season.is_null())
                .add(anime::Column::Season.eq("")),
        );
    }

    cond
}

fn apply_sort(select: Select<Anime>, sort: AnimeSort) -> Select<Anime> {
    match sort {
        AnimeSort::ScoreDesc => select
            .order_by_desc(anime::Column::Score)
            .order_by_asc(anime::Column::NameKey),
        AnimeSort::ScoreThenYearDesc => select
            .order_by_desc(anime::Column::Score)
            .order_by_desc(anime::Column::Year),
        AnimeSort::NameAsc => select.order_by_asc(anime::Column::NameKey),
        AnimeSort::RecentlyUpdated => select.order_by_desc(anime::Column::UpdatedAt),
    }
}

fn duplicate_guard() -> OnConflict {
    OnConflict::columns([anime::Column::UserId, anime::Column::NameKey])
        .do_nothing()
        .to_owned()
}

impl AnimeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn map_model_to_record(model: anime::Model) -> anyhow::Result<AnimeRecord> {
        let id = model
            .id
            .parse::<AnimeId>()
            .with_context(|| format!("Corrupt anime id in store: {}", model.id))?;

        Ok(AnimeRecord {
            id,
            user_id: (!model.user_id.is_empty()).then_some(model.user_id),
            mal_id: model.mal_id,
            anilist_id: model.anilist_id,
            name: model.name,
            kind: model.anime_type.as_deref().and_then(|s| s.parse().ok()),
            genres: decode(&model.genres),
            synopsis: model.synopsis,
            notes: model.notes,
            year: model.year.filter(|y| *y > 0),
            season: model.season.as_deref().and_then(|s| s.parse().ok()),
            image_url: model.image_url,
            banner_url: model.banner_url,
            status: model.status.as_deref().and_then(|s| s.parse().ok()),
            progress: Progress {
                watched: model.watched,
                total: model.total_episodes,
            },
            score: model.score as f32,
            alternative_titles: decode(&model.alternative_titles),
            information: decode(&model.information),
            statistics: decode(&model.statistics),
            characters: decode(&model.characters),
            staff: decode(&model.staff),
            themes: decode(&model.themes),
            related: decode(&model.related),
            created_at: parse_timestamp(&model.created_at),
            updated_at: parse_timestamp(&model.updated_at),
        })
    }

    fn map_records(models: Vec<anime::Model>) -> anyhow::Result<Vec<AnimeRecord>> {
        models.into_iter().map(Self::map_model_to_record).collect()
    }

    fn to_active_model(record: &AnimeRecord) -> anime::ActiveModel {
        anime::ActiveModel {
            id: Set(record.id.to_string()),
            user_id: Set(owner_key(record.user_id.as_ref())),
            name: Set(record.name.clone()),
            name_key: Set(record.name_key()),
            alt_titles_key: Set(record.alternative_titles.search_key()),
            mal_id: Set(record.mal_id),
            anilist_id: Set(record.anilist_id),
            anime_type: Set(record.kind.map(|k| k.as_str().to_string())),
            genres: Set(encode(&record.genres)),
            synopsis: Set(record.synopsis.clone()),
            notes: Set(record.notes.clone()),
            year: Set(record.year),
            season: Set(record.season.map(|s| s.as_str().to_string())),
            image_url: Set(record.image_url.clone()),
            banner_url: Set(record.banner_url.clone()),
            status: Set(record.status.map(|s| s.as_str().to_string())),
            watched: Set(record.progress.watched),
            total_episodes: Set(record.progress.total),
            score: Set(f64::from(record.score)),
            alternative_titles: Set(encode(&record.alternative_titles)),
            information: Set(encode(&record.information)),
            statistics: Set(encode(&record.statistics)),
            characters: Set(encode(&record.characters)),
            staff: Set(encode(&record.staff)),
            themes: Set(encode(&record.themes)),
            related: Set(encode(&record.related)),
            created_at: Set(record.created_at.to_rfc3339()),
            updated_at: Set(record.updated_at.to_rfc3339()),
        }
    }

    pub async fn get(&self, id: &AnimeId) -> anyhow::Result<Option<AnimeRecord>> {
        Anime::find_by_id(id.to_string())
            .one(&self.conn)
            .await?
            .map(Self::map_model_to_record)
            .transpose()
    }

    /// Canonical record whose name, or failing that an alternate title,
    /// equals `name` case-insensitively.
    pub async fn find_canonical_by_title(&self, name: &str) -> anyhow::Result<Option<AnimeRecord>> {
        let by_name = Anime::find()
            .filter(anime::Column::UserId.eq(""))
            .filter(anime::Column::NameKey.eq(normalize_name(name)))
            .one(&self.conn)
            .await?;

        if let Some(model) = by_name {
            return Self::map_model_to_record(model).map(Some);
        }

        let by_title = Anime::find()
            .filter(owner_condition(&Owner::Canonical))
            .filter(name_condition(&NameMatch::Title(name.to_string())))
            .order_by_desc(anime::Column::Score)
            .one(&self.conn)
            .await?;

        by_title.map(Self::map_model_to_record).transpose()
    }

    pub async fn find(&self, query: &AnimeQuery) -> anyhow::Result<Vec<AnimeRecord>> {
        let mut select = apply_sort(Anime::find().filter(query_condition(query)), query.sort);
        if query.skip > 0 {
            select = select.offset(query.skip);
        }
        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        let rows = select.all(&self.conn).await?;
        Self::map_records(rows)
    }

    pub async fn count(&self, query: &AnimeQuery) -> anyhow::Result<u64> {
        Ok(Anime::find()
            .filter(query_condition(query))
            .count(&self.conn)
            .await?)
    }

    /// Inserts unless the owner already has a record with the same normalized name.
    pub async fn insert(&self, record: &AnimeRecord) -> anyhow::Result<InsertOutcome> {
        let result = Anime::insert(Self::to_active_model(record))
            .on_conflict(duplicate_guard())
            .exec_without_returning(&self.conn)
            .await;

        match result {
            Ok(0) | Err(DbErr::RecordNotInserted) => {
                debug!(anime = %record.name, "Insert skipped, record already exists");
                Ok(InsertOutcome::Duplicate)
            }
            Ok(_) => {
                info!(anime = %record.name, id = %record.id, "Inserted anime record");
                Ok(InsertOutcome::Inserted)
            }
            Err(e) => Err(e).context("Failed to insert anime record"),
        }
    }

    /// Bulk insert where duplicates are skipped row by row instead of
    /// aborting the batch. Returns the number of rows actually written.
    ///
    /// The whole slice is one transaction: any other error leaves nothing
    /// of it behind.
    pub async fn insert_many_unordered(&self, records: &[AnimeRecord]) -> anyhow::Result<u64> {
        let txn = self.conn.begin().await?;
        let mut inserted = 0u64;

        for chunk in records.chunks(SQL_INSERT_CHUNK) {
            let models: Vec<anime::ActiveModel> = chunk.iter().map(Self::to_active_model).collect();
            let result = Anime::insert_many(models)
                .on_conflict(duplicate_guard())
                .exec_without_returning(&txn)
                .await;

            match result {
                Ok(rows) => inserted += rows,
                Err(DbErr::RecordNotInserted) => {}
                Err(e) => {
                    txn.rollback().await?;
                    return Err(e).context("Failed to insert anime batch");
                }
            }
        }

        txn.commit().await?;

        let skipped = records.len() as u64 - inserted.min(records.len() as u64);
        if skipped > 0 {
            debug!(skipped, "Skipped duplicate anime records during bulk insert");
        }

        Ok(inserted)
    }

    /// Overwrites every mutable column of an existing record.
    pub async fn save(&self, record: &AnimeRecord) -> anyhow::Result<()> {
        Anime::insert(Self::to_active_model(record))
            .on_conflict(
                OnConflict::column(anime::Column::Id)
                    .update_columns([
                        anime::Column::Name,
                        anime::Column::NameKey,
                        anime::Column::AltTitlesKey,
                        anime::Column::MalId,
                        anime::Column::AnilistId,
                        anime::Column::AnimeType,
                        anime::Column::Genres,
                        anime::Column::Synopsis,
                        anime::Column::Notes,
                        anime::Column::Year,
                        anime::Column::Season,
                        anime::Column::ImageUrl,
                        anime::Column::BannerUrl,
                        anime::Column::Status,
                        anime::Column::Watched,
                        anime::Column::TotalEpisodes,
                        anime::Column::Score,
                        anime::Column::AlternativeTitles,
                        anime::Column::Information,
                        anime::Column::Statistics,
                        anime::Column::Characters,
                        anime::Column::Staff,
                        anime::Column::Themes,
                        anime::Column::Related,
                        anime::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await
            .context("Failed to save anime record")?;

        Ok(())
    }

    /// Applies a sparse update to one record visible to `owner`.
    ///
    /// Returns the number of matched rows; zero means the record does not
    /// exist for that owner.
    pub async fn update(
        &self,
        id: &AnimeId,
        owner: &Owner,
        patch: &AnimePatch,
    ) -> anyhow::Result<u64> {
        let mut update = Anime::update_many()
            .col_expr(anime::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()));

        if let Some(name) = &patch.name {
            update = update
                .col_expr(anime::Column::Name, Expr::value(name.trim()))
                .col_expr(anime::Column::NameKey, Expr::value(normalize_name(name)));
        }
        if let Some(kind) = patch.kind {
            update = update.col_expr(anime::Column::AnimeType, Expr::value(kind.as_str()));
        }
        if let Some(genres) = &patch.genres {
            update = update.col_expr(anime::Column::Genres, Expr::value(encode(genres)));
        }
        if let Some(synopsis) = &patch.synopsis {
            update = update.col_expr(anime::Column::Synopsis, Expr::value(synopsis.as_str()));
        }
        if let Some(notes) = &patch.notes {
            update = update.col_expr(anime::Column::Notes, Expr::value(notes.as_str()));
        }
        if let Some(year) = patch.year {
            update = update.col_expr(anime::Column::Year, Expr::value(year));
        }
        if let Some(season) = patch.season {
            update = update.col_expr(anime::Column::Season, Expr::value(season.as_str()));
        }
        if let Some(image_url) = &patch.image_url {
            update = update.col_expr(anime::Column::ImageUrl, Expr::value(image_url.as_str()));
        }
        if let Some(banner_url) = &patch.banner_url {
            update = update.col_expr(anime::Column::BannerUrl, Expr::value(banner_url.as_str()));
        }
        if let Some(status) = patch.status {
            update = update.col_expr(anime::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(watched) = patch.watched {
            update = update.col_expr(anime::Column::Watched, Expr::value(watched));
        }
        if let Some(total) = patch.total {
            update = update.col_expr(anime::Column::TotalEpisodes, Expr::value(total));
        }
        if let Some(score) = patch.score {
            update = update.col_expr(anime::Column::Score, Expr::value(f64::from(score)));
        }
        if let Some(mal_id) = patch.mal_id {
            update = update.col_expr(anime::Column::MalId, Expr::value(mal_id));
        }
        if let Some(anilist_id) = patch.anilist_id {
            update = update.col_expr(anime::Column::AnilistId, Expr::value(anilist_id));
        }

        let result = update
            .filter(anime::Column::Id.eq(id.to_string()))
            .filter(owner_condition(owner))
            .exec(&self.conn)
            .await
            .context("Failed to update anime record")?;

        Ok(result.rows_affected)
    }

    pub async fn update_images(
        &self,
        id: &AnimeId,
        image_url: &str,
        banner_url: &str,
    ) -> anyhow::Result<u64> {
        let result = Anime::update_many()
            .col_expr(anime::Column::ImageUrl, Expr::value(image_url))
            .col_expr(anime::Column::BannerUrl, Expr::value(banner_url))
            .col_expr(anime::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(anime::Column::Id.eq(id.to_string()))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn delete(&self, id: &AnimeId, owner: &Owner) -> anyhow::Result<bool> {
        let result = Anime::delete_many()
            .filter(anime::Column::Id.eq(id.to_string()))
            .filter(owner_condition(owner))
            .exec(&self.conn)
            .await?;

        let removed = result.rows_affected > 0;
        if removed {
            info!("Removed anime with ID: {}", id);
        }
        Ok(removed)
    }

    pub async fn ids(&self, owner: &Owner) -> anyhow::Result<Vec<AnimeId>> {
        let rows: Vec<String> = Anime::find()
            .select_only()
            .column(anime::Column::Id)
            .filter(owner_condition(owner))
            .into_tuple()
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().filter_map(|raw| raw.parse().ok()).collect())
    }

    pub async fn delete_all(&self, owner: &Owner) -> anyhow::Result<u64> {
        let result = Anime::delete_many()
            .filter(owner_condition(owner))
            .exec(&self.conn)
            .await?;

        info!(count = result.rows_affected, "Deleted anime records");
        Ok(result.rows_affected)
    }

    /// Group-by-status counts over one user's list.
    pub async fn status_counts(&self, user_id: &str) -> anyhow::Result<Vec<(Option<String>, u64)>> {
        let rows: Vec<(Option<String>, i64)> = Anime::find()
            .select_only()
            .column(anime::Column::Status)
            .column_as(Expr::col(anime::Column::Id).count(), "count")
            .filter(anime::Column::UserId.eq(user_id))
            .group_by(anime::Column::Status)
            .into_tuple()
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(status, count)| (status, u64::try_from(count).unwrap_or(0)))
            .collect())
    }

    pub async fn random_canonical(&self) -> anyhow::Result<Option<AnimeRecord>> {
        let total = self.count(&AnimeQuery::canonical()).await?;
        if total == 0 {
            return Ok(None);
        }

        let offset = rand::rng().random_range(0..total);
        Anime::find()
            .filter(owner_condition(&Owner::Canonical))
            .order_by_asc(anime::Column::NameKey)
            .offset(offset)
            .limit(1)
            .one(&self.conn)
            .await?
            .map(Self::map_model_to_record)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("naruto"), "naruto");
    }

    #[test]
    fn blank_user_id_maps_to_canonical() {
        let record = AnimeRecord::new("Monster");
        let model = AnimeRepository::to_active_model(&record);
        assert_eq!(model.user_id, Set(String::new()));
        assert_eq!(model.name_key, Set("monster".to_string()));
    }
}
