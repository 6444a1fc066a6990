//! SQL access to the dealer database
//!
//! The dealer database is owned by other services; this crate only reads it.
//! Connections come from an r2d2 pool and are switched to `query_only` as
//! they are handed out.
//!
//! ## Relations read
//!
//! - `deallist_eligible` - candidate (piece, source) rows
//! - `replica_counts` - per-piece active/pending count documents (JSON)
//! - `providers` / `program_caps` - placement and cap scalars
//! - `provider_ineligibility` - explicit block reasons
//! - `proposals`, `published_deals`, `clients`, `pieces`, `payloads`

pub mod rows;
pub mod store;

use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::SqliteConnection;
use tracing::info;

use crate::error::Result;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub use store::SqlDealStore;

/// Applied to every connection the pool hands out
#[derive(Debug, Clone, Copy)]
struct ReadOnlySession;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ReadOnlySession {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA query_only = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Build the connection pool
pub fn open_pool(database_url: &str, max_size: u32, timeout: Duration) -> Result<DbPool> {
    info!(database = %database_url, max_size, "Opening database pool");

    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(timeout)
        .connection_customizer(Box::new(ReadOnlySession))
        .build(manager)?;

    Ok(pool)
}
