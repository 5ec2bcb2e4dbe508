//! Transactional key-value store.
//!
//! [`KvStore`] hands out [`KvTxn`]s; a transaction that is dropped without
//! [`KvTxn::commit`] is rolled back, so every early return releases it.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::meds::error::StorageError;

/// A store of byte values under string keys.
pub trait KvStore: Send + Sync {
    /// Open a transaction. Read-only transactions reject writes.
    fn begin(&self, writable: bool) -> Result<Box<dyn KvTxn + '_>, StorageError>;
}

pub trait KvTxn {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    fn delete(&mut self, key: &str) -> Result<(), StorageError>;
    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Abandon the transaction. Dropping has the same effect.
    fn discard(self: Box<Self>) {}
}

/// Read and decode a JSON value. `None` if the key is absent.
pub fn get_json<T: DeserializeOwned>(
    txn: &mut dyn KvTxn,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match txn.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub fn set_json<T: Serialize + ?Sized>(
    txn: &mut dyn KvTxn,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value)?;
    txn.set(key, &bytes)
}

/// SQLite-backed [`KvStore`]. One connection, serialized by a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run `f` against the raw connection (diagnostics only).
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, StorageError> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }
}

impl KvStore for SqliteStore {
    fn begin(&self, writable: bool) -> Result<Box<dyn KvTxn + '_>, StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(if writable {
            "BEGIN IMMEDIATE"
        } else {
            "BEGIN DEFERRED"
        })?;
        Ok(Box::new(SqliteTxn {
            conn,
            writable,
            finished: false,
        }))
    }
}

struct SqliteTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    writable: bool,
    finished: bool,
}

impl SqliteTxn<'_> {
    fn ensure_writable(&self) -> Result<(), StorageError> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly)
        }
    }
}

impl KvTxn for SqliteTxn<'_> {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.ensure_writable()?;
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTxn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "failed to roll back transaction");
            }
        }
    }
}
