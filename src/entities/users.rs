use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Subject of the identity provider.
    #[sea_orm(unique)]
    pub external_auth_id: String,

    pub email: String,

    pub name: String,

    /// `user` or `admin`
    pub role: String,

    /// Per-status counts, JSON
    #[sea_orm(column_type = "Text")]
    pub stats: String,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
