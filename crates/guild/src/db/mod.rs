//! SQLite archive of finished job results.
//!
//! One connection per [`Database`], shared by every clone and serialized
//! through a mutex. Workers only touch it once per finished job.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod migrations;
pub mod result_repo;

pub use error::DatabaseError;

const FILE_PRAGMAS: &str = "PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens or creates the file at `path`, creating parent directories, and
    /// brings its schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(FILE_PRAGMAS)?;
        let db = Self::migrated(conn, Some(path.to_path_buf()))?;
        log::info!("Result database ready at {}", path.display());
        Ok(db)
    }

    /// Opens the file at `path`, or at [`default_database_path`] when `None`.
    pub fn open_or_default(path: Option<&Path>) -> Result<Self, DatabaseError> {
        match path.map(Path::to_path_buf).or_else(default_database_path) {
            Some(path) => Self::open(&path),
            None => {
                log::warn!("No home directory, keeping results in memory");
                Self::open_in_memory()
            }
        }
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::migrated(Connection::open_in_memory()?, None)
    }

    fn migrated(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, DatabaseError> {
        migrations::run_all(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.with_conn(migrations::current_version)
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned("database connection"))?;
        f(&conn)
    }
}

/// `~/.guild/data/guild.db`
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".guild").join("data").join("guild.db"))
}
