use sea_orm_migration::prelude::*;

mod m20250101_create_anime;
mod m20250102_add_users;
mod m20250103_add_image_cache;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_create_anime::Migration),
            Box::new(m20250102_add_users::Migration),
            Box::new(m20250103_add_image_cache::Migration),
        ]
    }
}
