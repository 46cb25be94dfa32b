//! Connection to the snapshot database.
//!
//! The tracker opens one pool at startup, brings the `holder_snapshots`
//! schema up to date, and hands the pool to the snapshot sink for the rest of
//! the process lifetime.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::error::DbError;
use crate::snapshot_store::SnapshotStore;

/// How long a cycle's upsert waits for a free connection before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connections idle longer than this are closed between hourly cycles.
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Open a pool against `url`, apply pending migrations, and return a handle.
///
/// Pool sizing is `max_connections`. Connections are acquired lazily after
/// the first one, which is opened here so a wrong URL or password fails
/// startup instead of the first cycle.
///
/// # Errors
///
/// Returns [`DbError::Config`] if the URL cannot be parsed,
/// [`DbError::Postgres`] if no connection can be opened, or
/// [`DbError::Migration`] if the schema cannot be brought up to date.
pub async fn open(url: &str, max_connections: u32) -> Result<SnapshotDb, DbError> {
    let options: PgConnectOptions = url
        .parse()
        .map_err(|e: sqlx::Error| DbError::Config(format!("Invalid database URL: {e}")))?;
    let target = describe_target(&options);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(%target, max_connections, "Snapshot database ready");

    Ok(SnapshotDb { pool })
}

/// Handle to the snapshot database.
#[derive(Clone)]
pub struct SnapshotDb {
    pool: PgPool,
}

impl SnapshotDb {
    /// Wrap an existing pool. The caller is responsible for migrations.
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Snapshot store over this database, rejecting rows computed before
    /// `min_block`.
    pub fn snapshots(&self, min_block: u64) -> SnapshotStore<'_> {
        SnapshotStore::new(&self.pool).with_min_block(min_block)
    }

    /// The underlying pool, for queries outside the snapshot store.
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Snapshot database closed");
    }
}

/// `host:port/database` of a connection, without credentials, for logs.
fn describe_target(options: &PgConnectOptions) -> String {
    format!(
        "{}:{}/{}",
        options.get_host(),
        options.get_port(),
        options.get_database().unwrap_or("<default>")
    )
}
