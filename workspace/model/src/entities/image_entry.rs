use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Where an entry is in the detection workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum DetectionStatus {
    /// The row exists but the detection job has not delivered a result yet.
    /// `vehicle_count` is a provisional zero until this changes.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// The detection job wrote the final count and the annotated image.
    #[sea_orm(string_value = "completed")]
    Completed,
    /// The detection job exhausted its retry budget.
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// One uploaded image together with its detection result.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "image_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Stored filename of the original upload, relative to the upload
    /// directory. Uploads are prefixed with a UUID so names never collide.
    pub original_filename: String,
    /// Stored filename of the annotated image, relative to the detection
    /// directory. Absent until detection completes.
    pub annotated_filename: Option<String>,
    pub description: String,
    /// Number of vehicles the model found. Meaningful only once
    /// `detection_status` is `Completed`.
    #[sea_orm(default_value = "0")]
    pub vehicle_count: i32,
    pub detection_status: DetectionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The per-admin acknowledgement rows for this entry.
    #[sea_orm(has_many = "super::viewed_image::Entity")]
    ViewedImage,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        super::viewed_image::Relation::User.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::viewed_image::Relation::ImageEntry.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
