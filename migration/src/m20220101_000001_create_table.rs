use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movie::Table)
                    .if_not_exists()
                    .col(pk_auto(Movie::Id))
                    .col(string_null(Movie::ExternalId))
                    .col(string(Movie::Title))
                    .col(text(Movie::Overview).default(""))
                    .col(string_null(Movie::ReleaseDate))
                    .col(string_null(Movie::PosterPath))
                    .col(json(Movie::Genres))
                    .col(string_null(Movie::Duration))
                    .col(double_null(Movie::Rating))
                    .col(string_null(Movie::TrailerUrl))
                    .col(string_null(Movie::MovieUrl))
                    .col(json(Movie::Cast))
                    .col(json(Movie::Subtitles))
                    .col(json(Movie::Categories))
                    .col(string_null(Movie::ContentRating))
                    .col(big_integer(Movie::ViewCount).default(0))
                    .col(big_integer(Movie::CreatedAt))
                    .col(big_integer(Movie::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // SQLite allows any number of NULLs under a unique index, so
        // admin-created rows without a provider id never collide.
        manager
            .create_index(
                Index::create()
                    .name("idx_movie_external_id_unique")
                    .table(Movie::Table)
                    .col(Movie::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movie_created_at")
                    .table(Movie::Table)
                    .col(Movie::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Movie::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movie {
    Table,
    Id,
    ExternalId,
    Title,
    Overview,
    ReleaseDate,
    PosterPath,
    Genres,
    Duration,
    Rating,
    TrailerUrl,
    MovieUrl,
    Cast,
    Subtitles,
    Categories,
    ContentRating,
    ViewCount,
    CreatedAt,
    UpdatedAt,
}
