use super::{image_entry, user};
use sea_orm::entity::prelude::*;

/// Records that an admin has acknowledged an entry. A (user, image) pair
/// appears at most once; rows are removed with the entry they reference.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "viewed_images")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub user_id: i32,
    #[sea_orm(primary_key)]
    pub image_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "image_entry::Entity",
        from = "Column::ImageId",
        to = "image_entry::Column::Id"
    )]
    ImageEntry,
    #[sea_orm(belongs_to = "user::Entity", from = "Column::UserId", to = "user::Column::Id")]
    User,
}

impl Related<image_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImageEntry.def()
    }
}

impl Related<user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
