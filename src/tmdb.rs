use std::{num::NonZeroU32, sync::Arc, time::Duration};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::{Deserialize, Deserializer};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no TMDB API key configured")]
    MissingApiKey,
    #[error("provider request timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider responded with status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed provider payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One entry of the provider's popular-movies page. Every field is optional;
/// entries are validated one by one by the synchronizer.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PopularMovie {
    #[serde(default, deserialize_with = "external_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

/// A page entry whose fields have the wrong JSON types.
#[derive(Clone, Debug)]
pub struct MalformedEntry {
    /// The raw `id` value, when there was one.
    pub id: Option<String>,
    pub error: String,
}

/// Each entry of a page is read on its own, so a mistyped entry is reported
/// next to its well-formed neighbours.
pub type PageEntry = Result<PopularMovie, MalformedEntry>;

#[async_trait]
pub trait MovieProvider: Send + Sync {
    /// Fetches one page of popular movies, in provider order.
    async fn popular_movies(&self) -> Result<Vec<PageEntry>, FetchError>;
}

#[derive(Clone, Debug)]
pub struct TmdbSettings {
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    pub page: u32,
    pub timeout: Duration,
    pub rps: u32,
}

pub struct TmdbClient {
    client: reqwest::Client,
    settings: TmdbSettings,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(client: reqwest::Client, settings: TmdbSettings) -> Self {
        if settings.api_key.trim().is_empty() {
            tracing::warn!("no TMDB_API_KEY provided; catalog sync cycles will fail to fetch");
        }

        let rps = NonZeroU32::new(settings.rps).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self { client, settings, limiter }
    }
}

#[async_trait]
impl MovieProvider for TmdbClient {
    async fn popular_movies(&self) -> Result<Vec<PageEntry>, FetchError> {
        if self.settings.api_key.trim().is_empty() {
            return Err(FetchError::MissingApiKey);
        }

        self.limiter.until_ready().await;

        let url = format!("{}/movie/popular", self.settings.base_url.trim_end_matches('/'));
        let req = self
            .client
            .get(url)
            .query(&[
                ("api_key", self.settings.api_key.as_str()),
                ("language", self.settings.language.as_str()),
            ])
            .query(&[("page", self.settings.page)]);

        let fetch = async {
            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }
            Ok(resp.bytes().await?)
        };

        let body = tokio::time::timeout(self.settings.timeout, fetch)
            .await
            .map_err(|_| FetchError::Timeout(self.settings.timeout))??;

        let entries = parse_page(&body)?;
        tracing::debug!(results = entries.len(), "fetched popular movies page");
        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
struct PopularPage {
    results: Vec<serde_json::Value>,
}

/// Fails only when the page itself is unreadable. Entries are converted one
/// at a time.
pub(crate) fn parse_page(body: &[u8]) -> Result<Vec<PageEntry>, serde_json::Error> {
    let page: PopularPage = serde_json::from_slice(body)?;
    Ok(page.results.into_iter().map(parse_entry).collect())
}

fn parse_entry(raw: serde_json::Value) -> PageEntry {
    let id = raw.get("id").map(|id| match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    serde_json::from_value(raw).map_err(|e| MalformedEntry { id, error: e.to_string() })
}

/// TMDB ids are numbers; accept strings as well and normalise to text.
fn external_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(n)) => Some(n.to_string()),
        Some(RawId::Text(s)) => Some(s),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, routing::get};

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: String, timeout: Duration) -> TmdbClient {
        TmdbClient::new(
            reqwest::Client::new(),
            TmdbSettings {
                api_key: "test-key".to_string(),
                base_url,
                language: "en-US".to_string(),
                page: 1,
                timeout,
                rps: 50,
            },
        )
    }

    #[test]
    fn parses_numeric_and_textual_ids() {
        let entries = parse_page(
            br#"{"page":1,"results":[
                {"id":42,"title":"Dune","overview":"...","release_date":"2021-10-01",
                 "poster_path":"/d.jpg","popularity":9.1},
                {"id":"","title":""},
                {"title":"No id"}
            ]}"#,
        )
        .unwrap();

        let movies: Vec<_> = entries.into_iter().map(Result::unwrap).collect();
        assert_eq!(movies.len(), 3);
        assert_eq!(movies[0].id.as_deref(), Some("42"));
        assert_eq!(movies[0].poster_path.as_deref(), Some("/d.jpg"));
        assert_eq!(movies[1].id.as_deref(), Some(""));
        assert_eq!(movies[2].id, None);
    }

    #[test]
    fn mistyped_entries_do_not_spoil_the_page() {
        let entries = parse_page(
            br#"{"results":[
                {"id":1,"title":"Good"},
                {"id":2,"title":5},
                {"id":3.5,"title":"Fractional id"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].as_ref().unwrap().title.as_deref(), Some("Good"));

        let bad_title = entries[1].as_ref().unwrap_err();
        assert_eq!(bad_title.id.as_deref(), Some("2"));
        assert!(bad_title.error.contains("invalid type"));

        let bad_id = entries[2].as_ref().unwrap_err();
        assert_eq!(bad_id.id.as_deref(), Some("3.5"));
    }

    #[test]
    fn unreadable_page_is_an_error() {
        assert!(parse_page(br#"{"page":1}"#).is_err());
        assert!(parse_page(br#"{"results":{"id":1}}"#).is_err());
        assert!(parse_page(b"<html>").is_err());
    }

    #[tokio::test]
    async fn fetches_popular_page_with_query_parameters() {
        let app = Router::new().route(
            "/movie/popular",
            get(|axum::extract::RawQuery(query): axum::extract::RawQuery| async move {
                let query = query.unwrap_or_default();
                assert!(query.contains("api_key=test-key"));
                assert!(query.contains("language=en-US"));
                assert!(query.contains("page=1"));
                axum::Json(serde_json::json!({
                    "page": 1,
                    "results": [{"id": 7, "title": "Se7en"}]
                }))
            }),
        );
        let base = serve(app).await;

        let entries = client(base, Duration::from_secs(5)).popular_movies().await.unwrap();
        assert_eq!(entries.len(), 1);
        let movie = entries[0].as_ref().unwrap();
        assert_eq!(movie.id.as_deref(), Some("7"));
        assert_eq!(movie.title.as_deref(), Some("Se7en"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let app = Router::new()
            .route("/movie/popular", get(|| async { (StatusCode::UNAUTHORIZED, "bad key") }));
        let base = serve(app).await;

        let err = client(base, Duration::from_secs(5)).popular_movies().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(s) if s == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_fetch_error() {
        let app = Router::new().route("/movie/popular", get(|| async { "{\"page\": 1}" }));
        let base = serve(app).await;

        let err = client(base, Duration::from_secs(5)).popular_movies().await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let app = Router::new().route(
            "/movie/popular",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{\"results\": []}"
            }),
        );
        let base = serve(app).await;

        let err = client(base, Duration::from_millis(100)).popular_movies().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_a_request() {
        let mut tmdb = client("http://127.0.0.1:9".to_string(), Duration::from_secs(1));
        tmdb.settings.api_key.clear();
        assert!(matches!(tmdb.popular_movies().await, Err(FetchError::MissingApiKey)));
    }
}
