//! Song catalog
//!
//! A flat list of song entries. Entries can be added and listed; there is
//! no update or delete.

pub mod schema;

use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One song entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub genre: String,
    pub performer: String,
    pub writer: String,
    pub release_date: String,
    pub lyrics: String,
    pub rating: String,
    pub url: String,
}

/// Storage backend for the catalog
pub trait SongStore {
    /// All entries, oldest first
    fn select(&self) -> Result<Vec<Song>>;

    fn insert(&self, song: &Song) -> Result<()>;
}

/// SQLite-backed song store
pub struct SongDatabase {
    conn: Mutex<Connection>,
}

impl SongDatabase {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        schema::run_migrations(&self.connection())
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .connection()
            .query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))?;
        Ok(count)
    }
}

impl SongStore for SongDatabase {
    fn select(&self) -> Result<Vec<Song>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            r#"
            SELECT title, genre, performer, writer, release_date, lyrics, rating, url
            FROM songs
            ORDER BY id
            "#,
        )?;
        let songs = stmt
            .query_map([], |row| {
                Ok(Song {
                    title: row.get(0)?,
                    genre: row.get(1)?,
                    performer: row.get(2)?,
                    writer: row.get(3)?,
                    release_date: row.get(4)?,
                    lyrics: row.get(5)?,
                    rating: row.get(6)?,
                    url: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    fn insert(&self, song: &Song) -> Result<()> {
        self.connection().execute(
            r#"
            INSERT INTO songs (title, genre, performer, writer, release_date, lyrics, rating, url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                song.title,
                song.genre,
                song.performer,
                song.writer,
                song.release_date,
                song.lyrics,
                song.rating,
                song.url,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tracing::debug!(title = %song.title, "Song inserted");
        Ok(())
    }
}
