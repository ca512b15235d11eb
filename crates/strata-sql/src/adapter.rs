//! The SQL adapter
//!
//! A thin driver abstraction: parameterized query execution and a single
//! transaction scope over one held connection. One adapter instance serves
//! one request task; connections are never shared across tasks.

use crate::bind::{bind_pg, bind_sqlite};
use crate::placeholder::to_sqlite_placeholders;
use crate::row::{decode_pg_row, decode_sqlite_row};
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use strata_core::error::{Error, Result};
use strata_core::record::Record;
use tracing::{debug, instrument};

/// Database dialect behind the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    Sqlite,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Sqlite => "sqlite",
        }
    }
}

/// Per-tenant connection pool; cheap to clone
#[derive(Clone)]
pub enum AdapterPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl AdapterPool {
    /// Connect a pool from a database URL. `postgres://…` and `sqlite:…`
    /// schemes are recognized; in-memory SQLite pools are pinned to a
    /// single connection so the database survives between acquisitions.
    pub async fn connect(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(16)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await
                .map_err(|e| Error::adapter(e.to_string()))?;
            Ok(AdapterPool::Postgres(pool))
        } else if url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(url)
                .map_err(|e| Error::adapter(e.to_string()))?
                .create_if_missing(true);
            let in_memory = url.contains(":memory:") || url.contains("mode=memory");
            let max = if in_memory { 1 } else { 8 };
            let pool = SqlitePoolOptions::new()
                .max_connections(max)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(|e| Error::adapter(e.to_string()))?;
            Ok(AdapterPool::Sqlite(pool))
        } else {
            Err(Error::adapter(format!("unrecognized database url: {url}")))
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        match self {
            AdapterPool::Postgres(_) => DatabaseKind::Postgres,
            AdapterPool::Sqlite(_) => DatabaseKind::Sqlite,
        }
    }
}

enum Connection {
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

/// Rows plus affected-row count. SELECT-shaped statements fill `rows`;
/// mutations report `row_count` with an empty row array (unless they carry
/// a `RETURNING` clause).
#[derive(Debug, Default)]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub row_count: u64,
}

/// The adapter proper: one held connection, at most one open transaction
pub struct SqlAdapter {
    pool: AdapterPool,
    conn: Option<Connection>,
    in_transaction: bool,
}

impl SqlAdapter {
    pub fn new(pool: AdapterPool) -> Self {
        Self {
            pool,
            conn: None,
            in_transaction: false,
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        self.pool.kind()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Acquire the physical connection; a no-op when already connected
    pub async fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = match &self.pool {
            AdapterPool::Postgres(pool) => Connection::Postgres(
                pool.acquire()
                    .await
                    .map_err(|e| Error::adapter(e.to_string()))?,
            ),
            AdapterPool::Sqlite(pool) => Connection::Sqlite(
                pool.acquire()
                    .await
                    .map_err(|e| Error::adapter(e.to_string()))?,
            ),
        };
        self.conn = Some(conn);
        Ok(())
    }

    /// Release the connection; rolls back a still-open transaction first
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.in_transaction {
            self.rollback().await?;
        }
        self.conn = None;
        Ok(())
    }

    /// Execute parameterized SQL. Placeholders are `$1…$n`; the SQLite
    /// path rewrites them to `?N` before dispatch.
    #[instrument(skip(self, sql, params), fields(kind = self.kind().as_str()))]
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.connect().await?;
        debug!(sql, params = params.len(), "executing");

        let returns_rows = statement_returns_rows(sql);
        let conn = self.conn.as_mut().expect("connected above");

        match conn {
            Connection::Postgres(conn) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_pg(query, param);
                }
                if returns_rows {
                    let rows = query
                        .fetch_all(&mut **conn)
                        .await
                        .map_err(map_driver_error)?;
                    let row_count = rows.len() as u64;
                    let rows = rows
                        .iter()
                        .map(decode_pg_row)
                        .collect::<Result<Vec<_>>>()?;
                    Ok(QueryResult { rows, row_count })
                } else {
                    let done = query
                        .execute(&mut **conn)
                        .await
                        .map_err(map_driver_error)?;
                    Ok(QueryResult {
                        rows: Vec::new(),
                        row_count: done.rows_affected(),
                    })
                }
            }
            Connection::Sqlite(conn) => {
                let sql = to_sqlite_placeholders(sql);
                let mut query = sqlx::query(&sql);
                for param in params {
                    query = bind_sqlite(query, param);
                }
                if returns_rows {
                    let rows = query
                        .fetch_all(&mut **conn)
                        .await
                        .map_err(map_driver_error)?;
                    let row_count = rows.len() as u64;
                    let rows = rows
                        .iter()
                        .map(decode_sqlite_row)
                        .collect::<Result<Vec<_>>>()?;
                    Ok(QueryResult { rows, row_count })
                } else {
                    let done = query
                        .execute(&mut **conn)
                        .await
                        .map_err(map_driver_error)?;
                    Ok(QueryResult {
                        rows: Vec::new(),
                        row_count: done.rows_affected(),
                    })
                }
            }
        }
    }

    /// Open the transaction; a second begin on the same connection is an error
    pub async fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::transaction_state("transaction already open"));
        }
        self.query("BEGIN", &[]).await?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit; an error without an open transaction
    pub async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::transaction_state("commit without transaction"));
        }
        self.in_transaction = false;
        self.query("COMMIT", &[]).await?;
        Ok(())
    }

    /// Roll back; a no-op without an open transaction
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.query("ROLLBACK", &[]).await?;
        Ok(())
    }
}

/// SELECT-shaped statements and RETURNING clauses produce rows
fn statement_returns_rows(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    upper.starts_with("SELECT")
        || upper.starts_with("WITH")
        || upper.starts_with("PRAGMA")
        || upper.contains("RETURNING")
}

fn map_driver_error(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        let code = db_err.code().unwrap_or_default();
        // 23505: Postgres unique_violation; 1555/2067: SQLite constraint codes
        if code == "23505" || code == "1555" || code == "2067" {
            return Error::conflict("UNIQUE_VIOLATION", db_err.message().to_string());
        }
    }
    Error::adapter(err.to_string())
}
