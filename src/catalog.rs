use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use tracing::debug;

use crate::{
    entities::movie::{self, CastList, StringList, SubtitleList},
    error::StoreError,
    models::{ListQuery, MovieRecord, MovieUpdate, NewMovie, SyncedFields},
};

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpsertOutcome {
    Created(i32),
    Updated(i32),
    /// The stored synced fields already matched; nothing was written.
    Unchanged(i32),
}

impl UpsertOutcome {
    pub fn id(self) -> i32 {
        match self {
            UpsertOutcome::Created(id)
            | UpsertOutcome::Updated(id)
            | UpsertOutcome::Unchanged(id) => id,
        }
    }
}

/// The slice of the catalog the synchronizer writes through.
#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str)
    -> Result<Option<MovieRecord>, StoreError>;

    async fn create(&self, movie: NewMovie) -> Result<MovieRecord, StoreError>;

    async fn update(&self, id: i32, changes: MovieUpdate) -> Result<MovieRecord, StoreError>;

    /// Creates the record for `external_id` or refreshes its synced fields.
    /// Admin-owned fields of an existing record are left untouched.
    async fn upsert_by_external_id(
        &self,
        external_id: &str,
        fields: SyncedFields,
    ) -> Result<UpsertOutcome, StoreError>;
}

#[derive(Clone)]
pub struct CatalogStore {
    db: DatabaseConnection,
}

impl CatalogStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i32) -> Result<MovieRecord, StoreError> {
        movie::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(MovieRecord::from)
            .ok_or(StoreError::NotFound { entity: "movie", id })
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<MovieRecord>, StoreError> {
        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);

        let mut select = movie::Entity::find()
            .order_by_desc(movie::Column::CreatedAt)
            .order_by_desc(movie::Column::Id);
        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            select = select.filter(movie::Column::Title.like(format!("%{q}%")));
        }

        let rows = select.paginate(&self.db, per_page).fetch_page(page - 1).await?;
        Ok(rows.into_iter().map(MovieRecord::from).collect())
    }

    pub async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let res = movie::Entity::delete_by_id(id).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(StoreError::NotFound { entity: "movie", id });
        }
        debug!(movie_id = id, "deleted movie");
        Ok(())
    }

    /// Bumps the view counter and returns the refreshed record.
    pub async fn record_view(&self, id: i32) -> Result<MovieRecord, StoreError> {
        let res = movie::Entity::update_many()
            .col_expr(movie::Column::ViewCount, Expr::col(movie::Column::ViewCount).add(1))
            .filter(movie::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if res.rows_affected == 0 {
            return Err(StoreError::NotFound { entity: "movie", id });
        }
        self.get(id).await
    }
}

#[async_trait]
impl MovieStore for CatalogStore {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<MovieRecord>, StoreError> {
        let row = movie::Entity::find()
            .filter(movie::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?;
        Ok(row.map(MovieRecord::from))
    }

    async fn create(&self, movie: NewMovie) -> Result<MovieRecord, StoreError> {
        let title = require_title(&movie.title)?;
        let now = now_sec();
        let model = movie::ActiveModel {
            id: NotSet,
            external_id: Set(movie.external_id.filter(|id| !id.trim().is_empty())),
            title: Set(title),
            overview: Set(movie.overview),
            release_date: Set(movie.release_date.map(|d| d.to_string())),
            poster_path: Set(movie.poster_path),
            genres: Set(StringList(movie.genres)),
            duration: Set(movie.duration),
            rating: Set(movie.rating),
            trailer_url: Set(movie.trailer_url),
            movie_url: Set(movie.movie_url),
            cast: Set(CastList(movie.cast)),
            subtitles: Set(SubtitleList(movie.subtitles)),
            categories: Set(StringList(movie.categories)),
            content_rating: Set(movie.content_rating),
            view_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let row = model.insert(&self.db).await?;
        debug!(movie_id = row.id, title = %row.title, "created movie");
        Ok(row.into())
    }

    async fn update(&self, id: i32, changes: MovieUpdate) -> Result<MovieRecord, StoreError> {
        let row = movie::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound { entity: "movie", id })?;

        let mut active: movie::ActiveModel = row.into();
        if let Some(title) = changes.title {
            active.title = Set(require_title(&title)?);
        }
        if let Some(overview) = changes.overview {
            active.overview = Set(overview);
        }
        if let Some(date) = changes.release_date {
            active.release_date = Set(Some(date.to_string()));
        }
        if let Some(poster_path) = changes.poster_path {
            active.poster_path = Set(Some(poster_path));
        }
        if let Some(genres) = changes.genres {
            active.genres = Set(StringList(genres));
        }
        if let Some(duration) = changes.duration {
            active.duration = Set(Some(duration));
        }
        if let Some(rating) = changes.rating {
            active.rating = Set(Some(rating));
        }
        if let Some(url) = changes.trailer_url {
            active.trailer_url = Set(Some(url));
        }
        if let Some(url) = changes.movie_url {
            active.movie_url = Set(Some(url));
        }
        if let Some(cast) = changes.cast {
            active.cast = Set(CastList(cast));
        }
        if let Some(subtitles) = changes.subtitles {
            active.subtitles = Set(SubtitleList(subtitles));
        }
        if let Some(categories) = changes.categories {
            active.categories = Set(StringList(categories));
        }
        if let Some(content_rating) = changes.content_rating {
            active.content_rating = Set(Some(content_rating));
        }
        active.updated_at = Set(now_sec());

        let row = active.update(&self.db).await?;
        debug!(movie_id = row.id, "updated movie");
        Ok(row.into())
    }

    async fn upsert_by_external_id(
        &self,
        external_id: &str,
        fields: SyncedFields,
    ) -> Result<UpsertOutcome, StoreError> {
        if external_id.trim().is_empty() {
            return Err(StoreError::validation("external id is required"));
        }
        let title = require_title(&fields.title)?;
        let release_date = fields.release_date.map(|d| d.to_string());
        let now = now_sec();

        let txn = self.db.begin().await?;

        let existing = movie::Entity::find()
            .filter(movie::Column::ExternalId.eq(external_id))
            .one(&txn)
            .await?;

        let outcome = match existing {
            Some(row)
                if row.title == title
                    && row.overview == fields.overview
                    && row.release_date == release_date
                    && row.poster_path == fields.poster_path =>
            {
                UpsertOutcome::Unchanged(row.id)
            },
            Some(row) => {
                let id = row.id;
                let mut active: movie::ActiveModel = row.into();
                active.title = Set(title);
                active.overview = Set(fields.overview);
                active.release_date = Set(release_date);
                active.poster_path = Set(fields.poster_path);
                active.updated_at = Set(now);
                active.update(&txn).await?;
                UpsertOutcome::Updated(id)
            },
            None => {
                let model = movie::ActiveModel {
                    id: NotSet,
                    external_id: Set(Some(external_id.to_string())),
                    title: Set(title),
                    overview: Set(fields.overview),
                    release_date: Set(release_date),
                    poster_path: Set(fields.poster_path),
                    genres: Set(StringList::default()),
                    duration: Set(None),
                    rating: Set(None),
                    trailer_url: Set(None),
                    movie_url: Set(None),
                    cast: Set(CastList::default()),
                    subtitles: Set(SubtitleList::default()),
                    categories: Set(StringList::default()),
                    content_rating: Set(None),
                    view_count: Set(0),
                    created_at: Set(now),
                    updated_at: Set(now),
                };

                // A concurrent writer may have inserted the same external id
                // since the lookup; fall back to refreshing the synced columns.
                let res = movie::Entity::insert(model)
                    .on_conflict(
                        OnConflict::column(movie::Column::ExternalId)
                            .update_columns([
                                movie::Column::Title,
                                movie::Column::Overview,
                                movie::Column::ReleaseDate,
                                movie::Column::PosterPath,
                                movie::Column::UpdatedAt,
                            ])
                            .to_owned(),
                    )
                    .exec(&txn)
                    .await?;
                UpsertOutcome::Created(res.last_insert_id)
            },
        };

        txn.commit().await?;
        Ok(outcome)
    }
}

fn require_title(title: &str) -> Result<String, StoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::validation("title is required"));
    }
    Ok(title.to_string())
}

pub(crate) fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}
