use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    Statement,
};
use tracing::info;

const SQLITE_PRAGMAS: [&str; 3] =
    ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA cache_size=-64000"];

pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(database_url);
    opts.sqlx_logging(false);
    let db = Database::connect(opts).await?;
    prepare(&db).await?;
    info!("database ready");
    Ok(db)
}

/// A private in-memory SQLite database. The pool is pinned to one connection
/// because every SQLite memory connection is its own database.
#[cfg(test)]
pub async fn connect_in_memory() -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await?;
    prepare(&db).await?;
    Ok(db)
}

async fn prepare(db: &DatabaseConnection) -> Result<(), DbErr> {
    if db.get_database_backend() == DatabaseBackend::Sqlite {
        for pragma in SQLITE_PRAGMAS {
            db.execute(Statement::from_string(DatabaseBackend::Sqlite, pragma.to_string()))
                .await?;
        }
    }
    Migrator::up(db, None).await
}
