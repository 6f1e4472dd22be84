use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use crate::models::WatchlistEntry;
use crate::store::{StoreError, WatchlistStore};

/// Watchlist in the `watchlist_entries` table, ordered by `position`.
pub struct PostgresWatchlistStore {
    pool: PgPool,
}

impl PostgresWatchlistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Config(format!("migration failed: {}", e)))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
                StoreError::Corrupt(e.to_string())
            }
            sqlx::Error::Configuration(_) | sqlx::Error::Tls(_) => StoreError::Config(e.to_string()),
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

pub async fn fetch_entries(pool: &PgPool) -> Result<Vec<WatchlistEntry>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT ticker, display_name
         FROM watchlist_entries
         ORDER BY position ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(ticker, name)| WatchlistEntry::new(ticker, name))
        .collect())
}

pub async fn replace_entries(pool: &PgPool, entries: &[WatchlistEntry]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM watchlist_entries").execute(&mut *tx).await?;

    if !entries.is_empty() {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO watchlist_entries (ticker, display_name, position) ");
        builder.push_values(entries.iter().enumerate(), |mut row, (position, entry)| {
            row.push_bind(entry.ticker.clone())
                .push_bind(entry.name.clone())
                .push_bind(position as i32);
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl WatchlistStore for PostgresWatchlistStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn read(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
        Ok(fetch_entries(&self.pool).await?)
    }

    async fn write(&self, entries: &[WatchlistEntry]) -> Result<(), StoreError> {
        replace_entries(&self.pool, entries).await?;
        info!("Replaced watchlist table with {} entries", entries.len());
        Ok(())
    }
}
