//! Embedded SQLite database used for addon schema files

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::application::errors::StorageError;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// `*.sql` files directly inside `dir`, sorted by file name
    pub fn schema_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "sql"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Execute every schema file in `dir`; returns how many ran
    pub fn apply_schema_dir(&self, dir: &Path) -> Result<usize, StorageError> {
        let files = Self::schema_files(dir)?;
        for file in &files {
            let sql = std::fs::read_to_string(file)?;
            self.execute_batch(&sql)?;
            debug!(file = %file.display(), "Schema file applied");
        }
        Ok(files.len())
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
