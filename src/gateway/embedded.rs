//! Embedded store - SQLite-backed stand-in for the column store cluster
//!
//! Emulates the parts of the distributed store the core depends on:
//!
//! - password authentication against an `auth_users` catalog, seeded with the
//!   store's well-known default administrative account
//! - per-keyspace replication settings in `auth_settings`
//! - TTL expiry: tables with an `expires_at` column (epoch millis) are purged by
//!   [`EmbeddedCluster::purge_expired`]; readers filter on it as well
//! - a configurable node list, so replication factor decisions can be exercised
//! - an availability switch to simulate an unreachable cluster
//!
//! Statements are SQL with positional `?` parameters. All SQLite work runs on
//! the blocking thread pool behind a single connection mutex.

use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::types::{BoundStatement, Credentials, ResultSet, Row, Value};
use crate::gateway::{Cluster, StorageSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Default administrative account present on a pristine store
pub const DEFAULT_ADMIN_USER: &str = "cassandra";
pub const DEFAULT_ADMIN_PASSWORD: &str = "cassandra";

/// Keyspace whose replication governs authentication reads
pub const AUTH_KEYSPACE: &str = "system_auth";

type SharedConnection = Arc<Mutex<Connection>>;

/// Single-file store exposing the [`Cluster`] contract
pub struct EmbeddedCluster {
    conn: SharedConnection,
    path: Option<PathBuf>,
    nodes: Vec<String>,
    available: Arc<AtomicBool>,
}

impl EmbeddedCluster {
    /// Create or open a store file
    pub fn open(path: &Path, nodes: Vec<String>) -> GatewayResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::bootstrap(conn, Some(path.to_path_buf()), nodes)
    }

    /// A throwaway store living only in memory
    pub fn in_memory(nodes: Vec<String>) -> GatewayResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?, None, nodes)
    }

    fn bootstrap(
        conn: Connection,
        path: Option<PathBuf>,
        nodes: Vec<String>,
    ) -> GatewayResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_users (
                username TEXT PRIMARY KEY,
                password TEXT NOT NULL,
                superuser INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_settings (
                keyspace_name TEXT PRIMARY KEY,
                replication_factor INTEGER NOT NULL
            )",
            [],
        )?;

        // Pristine stores ship with the default superuser
        conn.execute(
            "INSERT OR IGNORE INTO auth_users (username, password, superuser) VALUES (?1, ?2, 1)",
            params![DEFAULT_ADMIN_USER, DEFAULT_ADMIN_PASSWORD],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO auth_settings (keyspace_name, replication_factor) \
             VALUES (?1, 1)",
            params![AUTH_KEYSPACE],
        )?;

        let nodes = if nodes.is_empty() {
            vec!["127.0.0.1".to_string()]
        } else {
            nodes
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            nodes,
            available: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Simulate the cluster going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Remove every row whose TTL has elapsed, in any table carrying an
    /// `expires_at` column. Returns the number of rows removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> GatewayResult<usize> {
        ensure_available(&self.available)?;
        let now_ms = now.timestamp_millis();

        with_connection(&self.conn, move |conn| {
            let tables: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT m.name FROM sqlite_master AS m, pragma_table_info(m.name) AS p
                     WHERE m.type = 'table' AND p.name = 'expires_at'",
                )?;
                let names = stmt.query_map([], |row| row.get(0))?;
                names.collect::<Result<_, _>>()?
            };

            let mut purged = 0;
            for table in tables {
                purged += conn.execute(
                    &format!("DELETE FROM \"{}\" WHERE expires_at <= ?1", table.replace('"', "")),
                    params![now_ms],
                )?;
            }

            if purged > 0 {
                tracing::info!("Purged {} expired rows", purged);
            }
            Ok(purged)
        })
        .await
    }
}

#[async_trait]
impl Cluster for EmbeddedCluster {
    async fn connect(&self, credentials: &Credentials) -> GatewayResult<Arc<dyn StorageSession>> {
        ensure_available(&self.available)?;

        let username = credentials.username.clone();
        let password = credentials.password.clone();
        let authenticated = with_connection(&self.conn, move |conn| {
            let mut stmt =
                conn.prepare_cached("SELECT password FROM auth_users WHERE username = ?1")?;
            let mut rows = stmt.query(params![username])?;
            let matches = match rows.next()? {
                Some(row) => row.get::<_, String>(0)? == password,
                None => false,
            };
            Ok(matches)
        })
        .await?;

        if !authenticated {
            return Err(GatewayError::Authentication(credentials.username.clone()));
        }

        tracing::debug!("Opened session for {}", credentials.username);
        Ok(Arc::new(EmbeddedSession {
            conn: Arc::clone(&self.conn),
            username: credentials.username.clone(),
            available: Arc::clone(&self.available),
        }))
    }

    async fn node_count(&self) -> GatewayResult<usize> {
        ensure_available(&self.available)?;
        Ok(self.nodes.len())
    }
}

impl std::fmt::Debug for EmbeddedCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedCluster")
            .field("path", &self.path)
            .field("nodes", &self.nodes)
            .finish()
    }
}

/// Session handed out by [`EmbeddedCluster::connect`]
struct EmbeddedSession {
    conn: SharedConnection,
    username: String,
    available: Arc<AtomicBool>,
}

#[async_trait]
impl StorageSession for EmbeddedSession {
    fn username(&self) -> &str {
        &self.username
    }

    async fn execute(&self, statement: &BoundStatement) -> GatewayResult<ResultSet> {
        ensure_available(&self.available)?;
        let statement = statement.clone();
        with_connection(&self.conn, move |conn| run_statement(conn, &statement)).await
    }
}

fn ensure_available(available: &AtomicBool) -> GatewayResult<()> {
    if available.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(GatewayError::Unavailable(
            "All host(s) tried for query failed".to_string(),
        ))
    }
}

async fn with_connection<T, F>(conn: &SharedConnection, f: F) -> GatewayResult<T>
where
    F: FnOnce(&mut Connection) -> GatewayResult<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn
            .lock()
            .map_err(|_| GatewayError::Query("connection lock poisoned".to_string()))?;
        f(&mut guard)
    })
    .await
    .map_err(|e| GatewayError::Query(format!("store worker failed: {}", e)))?
}

fn run_statement(conn: &Connection, statement: &BoundStatement) -> GatewayResult<ResultSet> {
    let mut prepared = conn.prepare_cached(&statement.query)?;
    let column_count = prepared.column_count();

    if column_count == 0 {
        prepared.execute(params_from_iter(statement.params.iter()))?;
        return Ok(ResultSet::empty());
    }

    let mut rows = prepared.query(params_from_iter(statement.params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut columns = Vec::with_capacity(column_count);
        for index in 0..column_count {
            columns.push(Value::try_from(row.get_ref(index)?)?);
        }
        out.push(Row::new(columns));
    }

    Ok(ResultSet::new(out))
}
