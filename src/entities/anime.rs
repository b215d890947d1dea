use sea_orm::entity::prelude::*;

/// One anime document. Canonical rows carry an empty `user_id`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "anime")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Normalized name, unique together with `user_id`.
    pub name_key: String,
    /// Newline-framed normalized alternate titles.
    #[sea_orm(column_type = "Text")]
    pub alt_titles_key: String,
    pub mal_id: Option<i32>,
    pub anilist_id: Option<i32>,
    pub anime_type: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub genres: String, // JSON array
    #[sea_orm(column_type = "Text")]
    pub synopsis: String,
    #[sea_orm(column_type = "Text")]
    pub notes: String,
    pub year: Option<i32>,
    pub season: Option<String>,
    pub image_url: String,
    pub banner_url: String,
    pub status: Option<String>,
    pub watched: i32,
    pub total_episodes: i32,
    pub score: f64,
    #[sea_orm(column_type = "Text")]
    pub alternative_titles: String,
    #[sea_orm(column_type = "Text")]
    pub information: String,
    #[sea_orm(column_type = "Text")]
    pub statistics: String,
    #[sea_orm(column_type = "Text")]
    pub characters: String,
    #[sea_orm(column_type = "Text")]
    pub staff: String,
    #[sea_orm(column_type = "Text")]
    pub themes: String,
    #[sea_orm(column_type = "Text")]
    pub related: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
