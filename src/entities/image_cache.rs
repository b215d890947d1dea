use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "image_cache")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub mal_id: Option<i32>,
    pub anilist_id: Option<i32>,
    pub image_url: String,
    pub banner_url: String,
    pub last_updated: String,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
