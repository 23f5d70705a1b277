use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set, sea_query::OnConflict,
};
use tracing::debug;

use crate::{
    catalog::now_sec,
    entities::{comment, favorite, love, movie, review, watchlist},
    error::StoreError,
    models::MovieRecord,
};

/// User-to-movie memberships that share the same shape.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Shelf {
    Favorites,
    Watchlist,
    Loves,
}

impl Shelf {
    pub fn label(self) -> &'static str {
        match self {
            Shelf::Favorites => "favorites",
            Shelf::Watchlist => "watchlist",
            Shelf::Loves => "loves",
        }
    }
}

const REVIEW_RATINGS: std::ops::RangeInclusive<i32> = 1..=10;

#[derive(Clone)]
pub struct Interactions {
    db: DatabaseConnection,
}

impl Interactions {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn add(&self, shelf: Shelf, user_id: i32, movie_id: i32) -> Result<(), StoreError> {
        self.ensure_movie(movie_id).await?;
        let now = now_sec();

        let res = match shelf {
            Shelf::Favorites => favorite::ActiveModel {
                id: NotSet,
                user_id: Set(user_id),
                movie_id: Set(movie_id),
                created_at: Set(now),
            }
            .insert(&self.db)
            .await
            .map(|_| ()),
            Shelf::Watchlist => watchlist::ActiveModel {
                id: NotSet,
                user_id: Set(user_id),
                movie_id: Set(movie_id),
                created_at: Set(now),
            }
            .insert(&self.db)
            .await
            .map(|_| ()),
            Shelf::Loves => love::ActiveModel {
                id: NotSet,
                user_id: Set(user_id),
                movie_id: Set(movie_id),
                created_at: Set(now),
            }
            .insert(&self.db)
            .await
            .map(|_| ()),
        };

        res.map_err(|e| match StoreError::from(e) {
            StoreError::Conflict(_) => {
                StoreError::Conflict(format!("movie already in {}", shelf.label()))
            },
            other => other,
        })?;
        debug!(user_id, movie_id, shelf = shelf.label(), "added movie to shelf");
        Ok(())
    }

    /// Movies on a user's shelf, oldest addition first.
    pub async fn shelf(&self, shelf: Shelf, user_id: i32) -> Result<Vec<MovieRecord>, StoreError> {
        let movie_ids: Vec<i32> = match shelf {
            Shelf::Favorites => favorite::Entity::find()
                .filter(favorite::Column::UserId.eq(user_id))
                .order_by_asc(favorite::Column::Id)
                .all(&self.db)
                .await?
                .into_iter()
                .map(|row| row.movie_id)
                .collect(),
            Shelf::Watchlist => watchlist::Entity::find()
                .filter(watchlist::Column::UserId.eq(user_id))
                .order_by_asc(watchlist::Column::Id)
                .all(&self.db)
                .await?
                .into_iter()
                .map(|row| row.movie_id)
                .collect(),
            Shelf::Loves => love::Entity::find()
                .filter(love::Column::UserId.eq(user_id))
                .order_by_asc(love::Column::Id)
                .all(&self.db)
                .await?
                .into_iter()
                .map(|row| row.movie_id)
                .collect(),
        };

        if movie_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<i32, movie::Model> = movie::Entity::find()
            .filter(movie::Column::Id.is_in(movie_ids.clone()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        Ok(movie_ids
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .map(MovieRecord::from)
            .collect())
    }

    pub async fn add_comment(
        &self,
        user_id: i32,
        movie_id: i32,
        text: &str,
    ) -> Result<comment::Model, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::validation("comment text is required"));
        }
        self.ensure_movie(movie_id).await?;

        let row = comment::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            movie_id: Set(movie_id),
            text: Set(text.to_string()),
            created_at: Set(now_sec()),
        }
        .insert(&self.db)
        .await?;
        debug!(user_id, movie_id, comment_id = row.id, "added comment");
        Ok(row)
    }

    /// Comments on a movie, newest first.
    pub async fn comments(&self, movie_id: i32) -> Result<Vec<comment::Model>, StoreError> {
        self.ensure_movie(movie_id).await?;
        Ok(comment::Entity::find()
            .filter(comment::Column::MovieId.eq(movie_id))
            .order_by_desc(comment::Column::CreatedAt)
            .order_by_desc(comment::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Records a user's rating of a movie. A user holds at most one review
    /// per movie, so posting again replaces the rating and comment.
    pub async fn review(
        &self,
        user_id: i32,
        movie_id: i32,
        rating: i32,
        comment: Option<&str>,
    ) -> Result<review::Model, StoreError> {
        if !REVIEW_RATINGS.contains(&rating) {
            return Err(StoreError::validation(format!(
                "rating must be between {} and {}",
                REVIEW_RATINGS.start(),
                REVIEW_RATINGS.end()
            )));
        }
        self.ensure_movie(movie_id).await?;

        let comment = comment.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string);
        let now = now_sec();
        review::Entity::insert(review::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            movie_id: Set(movie_id),
            rating: Set(rating),
            comment: Set(comment),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::columns([review::Column::UserId, review::Column::MovieId])
                .update_columns([
                    review::Column::Rating,
                    review::Column::Comment,
                    review::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;

        let row = review::Entity::find()
            .filter(review::Column::UserId.eq(user_id))
            .filter(review::Column::MovieId.eq(movie_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound("review missing after save".to_string()))?;
        debug!(user_id, movie_id, rating, review_id = row.id, "saved review");
        Ok(row)
    }

    /// Reviews of a movie, most recently written first.
    pub async fn reviews(&self, movie_id: i32) -> Result<Vec<review::Model>, StoreError> {
        self.ensure_movie(movie_id).await?;
        Ok(review::Entity::find()
            .filter(review::Column::MovieId.eq(movie_id))
            .order_by_desc(review::Column::UpdatedAt)
            .order_by_desc(review::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn ensure_movie(&self, movie_id: i32) -> Result<(), StoreError> {
        match movie::Entity::find_by_id(movie_id).one(&self.db).await? {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { entity: "movie", id: movie_id }),
        }
    }
}
