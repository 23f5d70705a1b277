use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use cron::Schedule;

use crate::scheduler::parse_schedule;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub tmdb_language: String,
    pub tmdb_page: u32,
    pub tmdb_timeout: Duration,
    pub tmdb_rps: u32,
    pub sync_schedule: Schedule,
    pub sync_enabled: bool,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://reelhouse.db?mode=rwc".to_string());

        let tmdb_api_key = std::env::var("TMDB_API_KEY").unwrap_or_default();
        let tmdb_base_url = std::env::var("TMDB_BASE_URL")
            .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string());
        let tmdb_language =
            std::env::var("TMDB_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());

        let tmdb_page: u32 = parse_or("TMDB_PAGE", 1)?;
        let tmdb_timeout = Duration::from_secs(parse_or("TMDB_TIMEOUT_SECS", 30)?);
        let tmdb_rps: u32 = parse_or("TMDB_RPS", 4)?;

        let sync_cron = std::env::var("SYNC_CRON").unwrap_or_else(|_| "0 0 * * *".to_string());
        let sync_schedule = parse_schedule(&sync_cron).context("SYNC_CRON")?;
        let sync_enabled: bool = parse_or("SYNC_ENABLED", true)?;

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_ttl_secs: i64 = parse_or("JWT_TTL_SECS", 3600)?;

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            tmdb_api_key,
            tmdb_base_url,
            tmdb_language,
            tmdb_page,
            tmdb_timeout,
            tmdb_rps,
            sync_schedule,
            sync_enabled,
            jwt_secret,
            jwt_ttl_secs,
        })
    }
}

/// Reads `key`, falling back to `default` when unset. A value that is set
/// but unparseable is an error rather than a silent fallback.
fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key}={raw}")),
        Err(_) => Ok(default),
    }
}
