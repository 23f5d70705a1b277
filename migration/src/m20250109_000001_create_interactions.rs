use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(membership_table(Favorite::Table)).await?;
        manager.create_table(membership_table(Watchlist::Table)).await?;
        manager.create_table(membership_table(Love::Table)).await?;

        manager
            .create_index(unique_membership_index("idx_favorite_unique", Favorite::Table))
            .await?;
        manager
            .create_index(unique_membership_index("idx_watchlist_unique", Watchlist::Table))
            .await?;
        manager.create_index(unique_membership_index("idx_love_unique", Love::Table)).await?;

        manager
            .create_table(
                Table::create()
                    .table(Comment::Table)
                    .if_not_exists()
                    .col(pk_auto(Comment::Id))
                    .col(integer(Comment::UserId))
                    .col(integer(Comment::MovieId))
                    .col(text(Comment::Text))
                    .col(big_integer(Comment::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Comment::Table, Comment::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Comment::Table, Comment::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comment_movie")
                    .table(Comment::Table)
                    .col(Comment::MovieId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Comment::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Love::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Watchlist::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Favorite::Table).to_owned()).await?;
        Ok(())
    }
}

/// Favorites, watchlist entries and loves share one shape: a user/movie pair.
fn membership_table<T: IntoIden + Copy + 'static>(table: T) -> TableCreateStatement {
    Table::create()
        .table(table)
        .if_not_exists()
        .col(pk_auto(Membership::Id))
        .col(integer(Membership::UserId))
        .col(integer(Membership::MovieId))
        .col(big_integer(Membership::CreatedAt))
        .foreign_key(
            ForeignKey::create()
                .from(table, Membership::UserId)
                .to(User::Table, User::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .foreign_key(
            ForeignKey::create()
                .from(table, Membership::MovieId)
                .to(Movie::Table, Movie::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_owned()
}

fn unique_membership_index<T: IntoIden + 'static>(name: &str, table: T) -> IndexCreateStatement {
    Index::create()
        .name(name)
        .table(table)
        .col(Membership::UserId)
        .col(Membership::MovieId)
        .unique()
        .to_owned()
}

#[derive(DeriveIden, Clone, Copy)]
enum Favorite {
    Table,
}

#[derive(DeriveIden, Clone, Copy)]
enum Watchlist {
    Table,
}

#[derive(DeriveIden, Clone, Copy)]
enum Love {
    Table,
}

#[derive(DeriveIden)]
enum Membership {
    Id,
    UserId,
    MovieId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Comment {
    Table,
    Id,
    UserId,
    MovieId,
    Text,
    CreatedAt,
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Movie {
    Table,
    Id,
}
