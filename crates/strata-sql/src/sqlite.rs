//! A batteries-included [`SqlExecutor`] over SQLite, used both as the
//! default driver and as the end-to-end test backend.

use crate::executor::{SqlExecutor, SqlOutcome};
use crate::statement::SqlStatement;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use strata_core::{Error, Result};
use tracing::debug;

/// Serializes all statements through one connection behind a mutex.
pub struct RusqliteExecutor {
    conn: Mutex<Connection>,
}

impl RusqliteExecutor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(to_backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(to_backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run raw setup SQL (schema creation in tests and migrations).
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock().execute_batch(sql).map_err(to_backend)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock only means a panic mid-statement elsewhere; the
        // connection handle itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SqlExecutor for RusqliteExecutor {
    fn execute(&self, statement: &SqlStatement) -> Result<SqlOutcome> {
        let sql = statement.construct();
        debug!(sql = %sql, params = ?statement.params, "Executing SQL statement");
        let conn = self.lock();
        let params = rusqlite::params_from_iter(statement.params.iter().map(SqlParam));

        if statement.is_row_query() {
            let mut stmt = conn.prepare(&sql).map_err(to_backend)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let mut rows = stmt.query(params).map_err(to_backend)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(to_backend)? {
                let mut map = serde_json::Map::new();
                for (i, column) in columns.iter().enumerate() {
                    let v = row.get_ref(i).map_err(to_backend)?;
                    map.insert(column.clone(), column_to_json(v));
                }
                out.push(map);
            }
            Ok(SqlOutcome::Rows(out))
        } else {
            let rows_affected = conn.execute(&sql, params).map_err(to_backend)? as u64;
            let is_insert = sql.trim_start().to_ascii_uppercase().starts_with("INSERT");
            let last_insert_id = is_insert.then(|| conn.last_insert_rowid().to_string());
            Ok(SqlOutcome::Write {
                rows_affected,
                last_insert_id,
            })
        }
    }
}

fn to_backend(e: rusqlite::Error) -> Error {
    Error::Backend(format!("SQLite: {e}"))
}

struct SqlParam<'a>(&'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqliteValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(*b as i64)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ToSqlOutput::Owned(SqliteValue::Integer(i)),
                None => ToSqlOutput::Owned(SqliteValue::Real(n.as_f64().unwrap_or(0.0))),
            },
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            // arrays/objects persist as their JSON text
            other => ToSqlOutput::Owned(SqliteValue::Text(other.to_string())),
        })
    }
}

fn column_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(BASE64.encode(b)),
    }
}
