//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS data (
    display_name TEXT NOT NULL UNIQUE,
    hostname TEXT NOT NULL,
    port INTEGER NOT NULL DEFAULT 80,
    down INTEGER NOT NULL,
    downtime INTEGER NOT NULL DEFAULT 0
);
"#;
