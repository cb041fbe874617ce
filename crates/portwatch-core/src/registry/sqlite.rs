//! SQLite endpoint store.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use super::schema::init_schema;
use super::{Endpoint, EndpointStore, RegistryError};

const COLUMNS: &str = "display_name, hostname, port, down, downtime";

/// File-backed endpoint store. All statements run on the connection's
/// dedicated thread through `tokio-rusqlite`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory().await.map_err(persistence)?;
        Self::init(conn).await
    }

    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(path).await.map_err(persistence)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, RegistryError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(persistence)?;
        Ok(Self { conn })
    }
}

fn persistence(e: tokio_rusqlite::Error) -> RegistryError {
    RegistryError::Persistence(e.to_string())
}

fn row_to_endpoint(row: &Row<'_>) -> rusqlite::Result<Endpoint> {
    let downtime: i64 = row.get(4)?;
    Ok(Endpoint {
        display_name: row.get(0)?,
        hostname: row.get(1)?,
        port: row.get(2)?,
        down: row.get(3)?,
        downtime: u64::try_from(downtime).unwrap_or(0),
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[async_trait]
impl EndpointStore for SqliteStore {
    async fn insert(&self, endpoint: Endpoint) -> Result<(), RegistryError> {
        let name = endpoint.display_name.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let downtime = i64::try_from(endpoint.downtime).unwrap_or(i64::MAX);
                let result = conn.execute(
                    "INSERT INTO data (display_name, hostname, port, down, downtime)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        endpoint.display_name,
                        endpoint.hostname,
                        endpoint.port,
                        endpoint.down,
                        downtime
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(e) if is_unique_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(persistence)?;

        if inserted {
            Ok(())
        } else {
            Err(RegistryError::Duplicate(name))
        }
    }

    async fn list_all(&self) -> Result<Vec<Endpoint>, RegistryError> {
        self.conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {COLUMNS} FROM data ORDER BY rowid"))?;
                let rows = stmt
                    .query_map([], row_to_endpoint)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(persistence)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Endpoint>, RegistryError> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                let endpoint = conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM data WHERE display_name = ?1"),
                        [&name],
                        row_to_endpoint,
                    )
                    .optional()?;
                Ok(endpoint)
            })
            .await
            .map_err(persistence)
    }

    async fn set_down(&self, name: &str, down: bool) -> Result<bool, RegistryError> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE data SET down = ?1 WHERE display_name = ?2",
                    params![down, name],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(persistence)
    }

    async fn increment_downtime(&self, name: &str) -> Result<bool, RegistryError> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE data SET downtime = downtime + 1 WHERE display_name = ?1",
                    [&name],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(persistence)
    }

    async fn remove(&self, name: &str) -> Result<bool, RegistryError> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM data WHERE display_name = ?1", [&name])?;
                Ok(changed > 0)
            })
            .await
            .map_err(persistence)
    }
}
