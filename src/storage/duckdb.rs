//! DuckDB-based storage backend.
//!
//! Models and versions live in two tables of an embedded DuckDB database,
//! either on disk or `:memory:`. The connection sits behind an async mutex and
//! every mutating operation runs in its own transaction, so at most one write
//! is in flight and version numbers are assigned without collisions.

use super::{
    assign_version_number, effective_limit, BackendError, ModelInfo, StorageBackend, VersionArgs,
    VersionInfo,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection, Row};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS models (
    model_id VARCHAR NOT NULL PRIMARY KEY,
    latest_version_number BIGINT NOT NULL,
    user_data VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS model_versions (
    model_id VARCHAR NOT NULL,
    version_number BIGINT NOT NULL,
    creation_timestamp BIGINT NOT NULL,
    archived BOOLEAN NOT NULL,
    data_hash VARCHAR NOT NULL,
    data_size BIGINT NOT NULL,
    user_data VARCHAR NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (model_id, version_number)
);
"#;

const VERSION_COLUMNS: &str =
    "model_id, version_number, creation_timestamp, archived, data_hash, data_size, user_data";

/// Raw version row, converted to a `VersionInfo` outside of the row callback.
struct VersionRow {
    model_id: String,
    version_number: i64,
    creation_timestamp: i64,
    archived: bool,
    data_hash: String,
    data_size: i64,
    user_data: String,
}

impl VersionRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            model_id: row.get(0)?,
            version_number: row.get(1)?,
            creation_timestamp: row.get(2)?,
            archived: row.get(3)?,
            data_hash: row.get(4)?,
            data_size: row.get(5)?,
            user_data: row.get(6)?,
        })
    }

    fn into_info(self) -> Result<VersionInfo, BackendError> {
        Ok(VersionInfo {
            model_id: self.model_id,
            version_number: to_u32(self.version_number)?,
            creation_timestamp: DateTime::from_timestamp_nanos(self.creation_timestamp),
            archived: self.archived,
            data_hash: self.data_hash,
            data_size: u64::try_from(self.data_size)
                .map_err(|_| BackendError::Storage(format!("invalid stored data size {}", self.data_size)))?,
            user_data: decode_user_data(&self.user_data)?,
        })
    }
}

fn to_u32(value: i64) -> Result<u32, BackendError> {
    u32::try_from(value).map_err(|_| BackendError::Storage(format!("invalid stored version number {value}")))
}

fn encode_user_data(user_data: &HashMap<String, String>) -> Result<String, BackendError> {
    Ok(serde_json::to_string(user_data)?)
}

fn decode_user_data(encoded: &str) -> Result<HashMap<String, String>, BackendError> {
    Ok(serde_json::from_str(encoded)?)
}

fn timestamp_nanos(timestamp: &DateTime<Utc>) -> Result<i64, BackendError> {
    timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| BackendError::Storage(format!("creation timestamp {timestamp} is out of range")))
}

fn load_model(conn: &Connection, model_id: &str) -> Result<Option<ModelInfo>, BackendError> {
    let mut stmt = conn.prepare("SELECT latest_version_number, user_data FROM models WHERE model_id = ?1")?;
    let mut rows = stmt.query_map(params![model_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    match rows.next() {
        Some(row) => {
            let (latest_version_number, user_data) = row?;
            Ok(Some(ModelInfo {
                model_id: model_id.to_owned(),
                latest_version_number: to_u32(latest_version_number)?,
                user_data: decode_user_data(&user_data)?,
            }))
        }
        None => Ok(None),
    }
}

fn require_model(conn: &Connection, model_id: &str) -> Result<ModelInfo, BackendError> {
    load_model(conn, model_id)?.ok_or_else(|| BackendError::unknown_model(model_id))
}

fn version_exists(conn: &Connection, model_id: &str, version_number: u32) -> Result<bool, BackendError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM model_versions WHERE model_id = ?1 AND version_number = ?2",
        params![model_id, i64::from(version_number)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Resolve a requested version number against the stored ones, 0 designating the highest.
fn resolve_version(conn: &Connection, model_id: &str, version_number: u32) -> Result<u32, BackendError> {
    require_model(conn, model_id)?;
    let highest: Option<i64> = conn.query_row(
        "SELECT MAX(version_number) FROM model_versions WHERE model_id = ?1",
        params![model_id],
        |row| row.get(0),
    )?;
    let Some(highest) = highest else {
        return Err(BackendError::unknown_model_version(model_id, 0));
    };
    if version_number == 0 {
        return to_u32(highest);
    }
    if version_exists(conn, model_id, version_number)? {
        Ok(version_number)
    } else {
        Err(BackendError::unknown_model_version(model_id, version_number))
    }
}

fn load_version_info(conn: &Connection, model_id: &str, version_number: u32) -> Result<VersionInfo, BackendError> {
    let row = conn.query_row(
        &format!("SELECT {VERSION_COLUMNS} FROM model_versions WHERE model_id = ?1 AND version_number = ?2"),
        params![model_id, i64::from(version_number)],
        VersionRow::from_row,
    )?;
    row.into_info()
}

/// Persistent backend storing models in DuckDB.
pub struct DuckDbBackend {
    conn: Mutex<Option<Connection>>,
    connection_string: String,
}

impl DuckDbBackend {
    /// Open (or create) the database designated by `connection_string`, `:memory:` for a transient one.
    pub fn new(connection_string: &str) -> Result<Self, BackendError> {
        let conn = if connection_string.is_empty() || connection_string == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(connection_string)?
        };
        conn.execute_batch(SCHEMA)
            .map_err(|e| BackendError::Storage(format!("Failed to create tables: {e}")))?;

        info!(connection = %connection_string, "Opened DuckDB model store");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            connection_string: connection_string.to_owned(),
        })
    }

    pub fn new_in_memory() -> Result<Self, BackendError> {
        Self::new(":memory:")
    }

    async fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().await
    }
}

fn open(guard: &mut Option<Connection>) -> Result<&mut Connection, BackendError> {
    guard.as_mut().ok_or(BackendError::Destroyed)
}

#[async_trait]
impl StorageBackend for DuckDbBackend {
    async fn destroy(&self) -> Result<(), BackendError> {
        let mut guard = self.lock().await;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| BackendError::from(e))?;
            debug!(connection = %self.connection_string, "Closed DuckDB model store");
        }
        Ok(())
    }

    async fn create_or_update_model(&self, model_info: ModelInfo) -> Result<ModelInfo, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        let tx = conn.transaction()?;

        let user_data = encode_user_data(&model_info.user_data)?;
        let latest_version_number = match load_model(&tx, &model_info.model_id)? {
            Some(existing) => {
                tx.execute(
                    "UPDATE models SET user_data = ?1 WHERE model_id = ?2",
                    params![user_data, model_info.model_id],
                )?;
                existing.latest_version_number
            }
            None => {
                tx.execute(
                    "INSERT INTO models (model_id, latest_version_number, user_data) VALUES (?1, 0, ?2)",
                    params![model_info.model_id, user_data],
                )?;
                0
            }
        };
        tx.commit()?;

        Ok(ModelInfo {
            latest_version_number,
            ..model_info
        })
    }

    async fn retrieve_model_info(&self, model_id: &str) -> Result<ModelInfo, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        require_model(conn, model_id)
    }

    async fn has_model(&self, model_id: &str) -> Result<bool, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        Ok(load_model(conn, model_id)?.is_some())
    }

    async fn delete_model(&self, model_id: &str) -> Result<(), BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        let tx = conn.transaction()?;

        require_model(&tx, model_id)?;
        tx.execute("DELETE FROM model_versions WHERE model_id = ?1", params![model_id])?;
        tx.execute("DELETE FROM models WHERE model_id = ?1", params![model_id])?;
        tx.commit()?;
        Ok(())
    }

    async fn list_models(&self, offset: usize, limit: usize) -> Result<Vec<String>, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;

        // Offsets past i64::MAX can't match any row.
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare("SELECT model_id FROM models ORDER BY model_id LIMIT ?1 OFFSET ?2")?;
        let rows = stmt.query_map(
            params![effective_limit(limit) as i64, offset],
            |row| row.get::<_, String>(0),
        )?;
        let mut model_ids = Vec::new();
        for row in rows {
            model_ids.push(row?);
        }
        Ok(model_ids)
    }

    async fn create_or_update_model_version(
        &self,
        model_id: &str,
        args: VersionArgs,
    ) -> Result<VersionInfo, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        let tx = conn.transaction()?;

        let model = match load_model(&tx, model_id)? {
            Some(model) => model,
            None => {
                tx.execute(
                    "INSERT INTO models (model_id, latest_version_number, user_data) VALUES (?1, 0, ?2)",
                    params![model_id, encode_user_data(&HashMap::new())?],
                )?;
                ModelInfo::new(model_id)
            }
        };

        let existing = args.version_number != 0 && version_exists(&tx, model_id, args.version_number)?;
        let version_number =
            assign_version_number(model_id, model.latest_version_number, args.version_number, existing)?;

        let timestamp = timestamp_nanos(&args.creation_timestamp)?;
        let user_data = encode_user_data(&args.user_data)?;
        let (info, data) = args.into_version_info(model_id, version_number);
        let data_size = i64::try_from(info.data_size)
            .map_err(|_| BackendError::Storage(format!("payload of {} bytes is too large", info.data_size)))?;

        if existing {
            tx.execute(
                "UPDATE model_versions SET creation_timestamp = ?1, archived = ?2, data_hash = ?3, \
                 data_size = ?4, user_data = ?5, data = ?6 WHERE model_id = ?7 AND version_number = ?8",
                params![
                    timestamp,
                    info.archived,
                    info.data_hash,
                    data_size,
                    user_data,
                    data.as_ref(),
                    model_id,
                    i64::from(version_number),
                ],
            )?;
        } else {
            tx.execute(
                "INSERT INTO model_versions (model_id, version_number, creation_timestamp, archived, \
                 data_hash, data_size, user_data, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    model_id,
                    i64::from(version_number),
                    timestamp,
                    info.archived,
                    info.data_hash,
                    data_size,
                    user_data,
                    data.as_ref(),
                ],
            )?;
        }

        if version_number > model.latest_version_number {
            tx.execute(
                "UPDATE models SET latest_version_number = ?1 WHERE model_id = ?2",
                params![i64::from(version_number), model_id],
            )?;
        }
        tx.commit()?;

        debug!(model_id, version_number, updated = existing, "Stored model version");
        // Round-trip the timestamp so callers see the stored resolution.
        Ok(VersionInfo {
            creation_timestamp: DateTime::from_timestamp_nanos(timestamp),
            ..info
        })
    }

    async fn retrieve_model_version_info(
        &self,
        model_id: &str,
        version_number: u32,
    ) -> Result<VersionInfo, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        let resolved = resolve_version(conn, model_id, version_number)?;
        load_version_info(conn, model_id, resolved)
    }

    async fn retrieve_model_version_data(
        &self,
        model_id: &str,
        version_number: u32,
    ) -> Result<Bytes, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        let resolved = resolve_version(conn, model_id, version_number)?;
        let data: Vec<u8> = conn.query_row(
            "SELECT data FROM model_versions WHERE model_id = ?1 AND version_number = ?2",
            params![model_id, i64::from(resolved)],
            |row| row.get(0),
        )?;
        Ok(Bytes::from(data))
    }

    async fn delete_model_version(&self, model_id: &str, version_number: u32) -> Result<(), BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        let tx = conn.transaction()?;

        let resolved = resolve_version(&tx, model_id, version_number)?;
        tx.execute(
            "DELETE FROM model_versions WHERE model_id = ?1 AND version_number = ?2",
            params![model_id, i64::from(resolved)],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn list_model_version_infos(
        &self,
        model_id: &str,
        initial_version_number: u32,
        limit: usize,
    ) -> Result<Vec<VersionInfo>, BackendError> {
        let mut guard = self.lock().await;
        let conn = open(&mut guard)?;
        require_model(conn, model_id)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM model_versions WHERE model_id = ?1 AND version_number >= ?2 \
             ORDER BY version_number LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![model_id, i64::from(initial_version_number), effective_limit(limit) as i64],
            VersionRow::from_row,
        )?;
        let mut infos = Vec::new();
        for row in rows {
            infos.push(row?.into_info()?);
        }
        Ok(infos)
    }
}
