//! Agent and settings storage backed by SQLite.

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use qc_core::Error;

use crate::record::{AgentRecord, AgentUpdate, NewAgent};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// Schema migrations, applied in order. The applied version is tracked in
/// `PRAGMA user_version`.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_agents_table",
        sql: "CREATE TABLE IF NOT EXISTS agents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                system_prompt TEXT DEFAULT '',
                allow_tools INTEGER DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
    },
    Migration {
        version: 2,
        description: "create_config_table",
        sql: "CREATE TABLE IF NOT EXISTS config (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
    },
];

pub const SCHEMA_VERSION: u32 = 2;

const AGENT_COLUMNS: &str = "id, name, system_prompt, allow_tools, created_at, updated_at";

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn storage(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::storage(format!("{}: {}", context, e))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::invalid_request("agent name must not be empty"));
    }
    Ok(())
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        system_prompt: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        allow_tools: row.get::<_, Option<bool>>(3)?.unwrap_or(true),
        created_at: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        updated_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}

fn migrate(conn: &Connection) -> Result<(), Error> {
    let current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(storage("Failed to read schema version"))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::debug!(
            version = migration.version,
            name = migration.description,
            "Applying migration"
        );
        let tx = conn
            .unchecked_transaction()
            .map_err(storage("Failed to start migration"))?;
        tx.execute_batch(migration.sql)
            .map_err(storage("Failed to apply migration"))?;
        tx.pragma_update(None, "user_version", migration.version)
            .map_err(storage("Failed to record schema version"))?;
        tx.commit().map_err(storage("Failed to commit migration"))?;
    }
    Ok(())
}

fn fetch_agent(conn: &Connection, id: i64) -> Result<AgentRecord, Error> {
    conn.query_row(
        &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
        params![id],
        agent_from_row,
    )
    .optional()
    .map_err(storage("Failed to read agent"))?
    .ok_or_else(|| Error::not_found(format!("agent {}", id)))
}

/// Agent records and key/value settings in one SQLite database.
#[derive(Clone)]
pub struct AgentStore {
    conn: Arc<Mutex<Connection>>,
}

impl AgentStore {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = db_path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(&path).map_err(storage("Failed to open database"))?;
        tracing::debug!(path = %path.display(), "Opened agent store");
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .map_err(storage("Failed to create in-memory database"))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, Error> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn schema_version(&self) -> Result<u32, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(storage("Failed to read schema version"))
    }

    pub fn list_agents(&self) -> Result<Vec<AgentRecord>, Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM agents ORDER BY id", AGENT_COLUMNS))
            .map_err(storage("Failed to list agents"))?;
        let agents = stmt
            .query_map([], agent_from_row)
            .map_err(storage("Failed to list agents"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("Failed to read agent"))?;
        Ok(agents)
    }

    pub fn get_agent(&self, id: i64) -> Result<AgentRecord, Error> {
        let conn = self.conn.lock().unwrap();
        fetch_agent(&conn, id)
    }

    pub fn get_agent_by_name(&self, name: &str) -> Result<Option<AgentRecord>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM agents WHERE name = ?1", AGENT_COLUMNS),
            params![name],
            agent_from_row,
        )
        .optional()
        .map_err(storage("Failed to read agent"))
    }

    pub fn create_agent(&self, agent: &NewAgent) -> Result<AgentRecord, Error> {
        validate_name(&agent.name)?;
        let conn = self.conn.lock().unwrap();
        let now = timestamp();
        conn.execute(
            "INSERT INTO agents (name, system_prompt, allow_tools, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![agent.name, agent.system_prompt, agent.allow_tools, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::invalid_request(format!("agent '{}' already exists", agent.name))
            } else {
                Error::storage(format!("Failed to create agent: {}", e))
            }
        })?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, name = %agent.name, "Created agent");
        fetch_agent(&conn, id)
    }

    pub fn update_agent(&self, id: i64, update: &AgentUpdate) -> Result<AgentRecord, Error> {
        let conn = self.conn.lock().unwrap();
        let mut record = fetch_agent(&conn, id)?;
        if update.is_empty() {
            return Ok(record);
        }
        update.apply(&mut record);
        validate_name(&record.name)?;

        conn.execute(
            "UPDATE agents SET name = ?1, system_prompt = ?2, allow_tools = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                record.name,
                record.system_prompt,
                record.allow_tools,
                timestamp(),
                id
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::invalid_request(format!("agent '{}' already exists", record.name))
            } else {
                Error::storage(format!("Failed to update agent: {}", e))
            }
        })?;
        fetch_agent(&conn, id)
    }

    /// Returns whether a row was deleted.
    pub fn delete_agent(&self, id: i64) -> Result<bool, Error> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute("DELETE FROM agents WHERE id = ?1", params![id])
            .map_err(storage("Failed to delete agent"))?;
        Ok(rows > 0)
    }

    pub fn get_config(&self, key: &str) -> Result<Option<Value>, Error> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage("Failed to read config"))?;

        match raw {
            None => Ok(None),
            Some(None) => Ok(Some(Value::Object(Default::default()))),
            Some(Some(text)) => Ok(Some(serde_json::from_str(&text)?)),
        }
    }

    pub fn set_config(&self, key: &str, value: &Value) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO config (key, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value.to_string(), timestamp()],
        )
        .map_err(storage("Failed to save config"))?;
        Ok(())
    }
}
