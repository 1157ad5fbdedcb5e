use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string(Users::Username).unique_key())
                    .col(string(Users::PasswordHash))
                    .col(boolean(Users::IsAdmin).default(false))
                    .to_owned(),
            )
            .await?;

        // Create image_entries table
        manager
            .create_table(
                Table::create()
                    .table(ImageEntries::Table)
                    .if_not_exists()
                    .col(pk_auto(ImageEntries::Id))
                    .col(string(ImageEntries::OriginalFilename))
                    .col(string_null(ImageEntries::AnnotatedFilename))
                    .col(string(ImageEntries::Description))
                    .col(integer(ImageEntries::VehicleCount).default(0))
                    .col(string_len(ImageEntries::DetectionStatus, 20).default("pending"))
                    .col(timestamp(ImageEntries::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create viewed_images table (join table)
        manager
            .create_table(
                Table::create()
                    .table(ViewedImages::Table)
                    .if_not_exists()
                    .col(integer(ViewedImages::UserId))
                    .col(integer(ViewedImages::ImageId))
                    .primary_key(
                        Index::create()
                            .name("pk_viewed_images")
                            .col(ViewedImages::UserId)
                            .col(ViewedImages::ImageId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_viewed_images_user")
                            .from(ViewedImages::Table, ViewedImages::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_viewed_images_image")
                            .from(ViewedImages::Table, ViewedImages::ImageId)
                            .to(ImageEntries::Table, ImageEntries::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ViewedImages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ImageEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    PasswordHash,
    IsAdmin,
}

#[derive(DeriveIden)]
enum ImageEntries {
    Table,
    Id,
    OriginalFilename,
    AnnotatedFilename,
    Description,
    VehicleCount,
    DetectionStatus,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ViewedImages {
    Table,
    UserId,
    ImageId,
}
