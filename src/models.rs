use jiff::civil::Date;
use serde::{Deserialize, Deserializer, Serialize};

use crate::entities::{
    comment,
    movie::{self, CastMember, Subtitle},
    review,
};

/// A catalog entry as exposed to callers; storage details stay in `entities`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovieRecord {
    pub id: i32,
    pub external_id: Option<String>,
    pub title: String,
    pub overview: String,
    pub release_date: Option<Date>,
    pub poster_path: Option<String>,
    pub genres: Vec<String>,
    pub duration: Option<String>,
    pub rating: Option<f64>,
    pub trailer_url: Option<String>,
    pub movie_url: Option<String>,
    pub cast: Vec<CastMember>,
    pub subtitles: Vec<Subtitle>,
    pub categories: Vec<String>,
    pub content_rating: Option<String>,
    pub view_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<movie::Model> for MovieRecord {
    fn from(row: movie::Model) -> Self {
        Self {
            id: row.id,
            external_id: row.external_id,
            title: row.title,
            overview: row.overview,
            release_date: row.release_date.as_deref().and_then(|s| s.parse().ok()),
            poster_path: row.poster_path,
            genres: row.genres.0,
            duration: row.duration,
            rating: row.rating,
            trailer_url: row.trailer_url,
            movie_url: row.movie_url,
            cast: row.cast.0,
            subtitles: row.subtitles.0,
            categories: row.categories.0,
            content_rating: row.content_rating,
            view_count: row.view_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// The subset of a movie record the synchronizer owns. Everything else on
/// the record is curated by admins and never written by a sync cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncedFields {
    pub title: String,
    pub overview: String,
    pub release_date: Option<Date>,
    pub poster_path: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewMovie {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "description")]
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<Date>,
    #[serde(default, alias = "poster")]
    pub poster_path: Option<String>,
    #[serde(default, alias = "genre", deserialize_with = "one_or_many")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub trailer_url: Option<String>,
    #[serde(default)]
    pub movie_url: Option<String>,
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub content_rating: Option<String>,
}

impl NewMovie {
    pub fn synced(external_id: &str, fields: SyncedFields) -> Self {
        Self {
            external_id: Some(external_id.to_string()),
            title: fields.title,
            overview: fields.overview,
            release_date: fields.release_date,
            poster_path: fields.poster_path,
            ..Default::default()
        }
    }
}

/// Partial update: `None` keeps the stored value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MovieUpdate {
    pub title: Option<String>,
    #[serde(alias = "description")]
    pub overview: Option<String>,
    pub release_date: Option<Date>,
    #[serde(alias = "poster")]
    pub poster_path: Option<String>,
    #[serde(default, alias = "genre", deserialize_with = "some_one_or_many")]
    pub genres: Option<Vec<String>>,
    pub duration: Option<String>,
    pub rating: Option<f64>,
    pub trailer_url: Option<String>,
    pub movie_url: Option<String>,
    pub cast: Option<Vec<CastMember>>,
    pub subtitles: Option<Vec<Subtitle>>,
    #[serde(default, deserialize_with = "some_one_or_many")]
    pub categories: Option<Vec<String>>,
    pub content_rating: Option<String>,
}

/// List fields also accept a bare string, e.g. `"genre": "crime"`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s.trim().to_string()],
        OneOrMany::Many(v) => v,
    })
}

fn some_one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    one_or_many(deserializer).map(Some)
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommentView {
    pub id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    pub text: String,
    pub created_at: i64,
}

impl From<comment::Model> for CommentView {
    fn from(row: comment::Model) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            movie_id: row.movie_id,
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewView {
    pub id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<review::Model> for ReviewView {
    fn from(row: review::Model) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            movie_id: row.movie_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
