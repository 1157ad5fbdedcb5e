use sea_orm::entity::prelude::*;

/// Represents a registered user of the gallery.
/// Credentials are stored as an argon2 hash; the plaintext password never
/// reaches the database.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    /// PHC-format argon2 hash of the user's password.
    pub password_hash: String,
    /// Admin users may review entries and mark them as viewed.
    #[sea_orm(default_value = "false")]
    pub is_admin: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// A user can have acknowledged multiple image entries.
    #[sea_orm(has_many = "super::viewed_image::Entity")]
    ViewedImage,
}

impl Related<super::image_entry::Entity> for Entity {
    fn to() -> RelationDef {
        super::viewed_image::Relation::ImageEntry.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::viewed_image::Relation::User.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
