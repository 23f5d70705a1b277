use sea_orm::{FromJsonQueryResult, entity::prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movie")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub external_id: Option<String>,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub overview: String,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub genres: StringList,
    pub duration: Option<String>,
    #[sea_orm(column_type = "Double", nullable)]
    pub rating: Option<f64>,
    pub trailer_url: Option<String>,
    pub movie_url: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub cast: CastList,
    #[sea_orm(column_type = "Json")]
    pub subtitles: SubtitleList,
    #[sea_orm(column_type = "Json")]
    pub categories: StringList,
    pub content_rating: Option<String>,
    pub view_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringList(pub Vec<String>);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastMember {
    pub actor: String,
    pub character: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct CastList(pub Vec<CastMember>);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub language: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct SubtitleList(pub Vec<Subtitle>);

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
