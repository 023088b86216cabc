//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{DeliveryMode, Response};
use crate::error::StorageError;

type Result<T> = std::result::Result<T, StorageError>;

/// A stored response.
#[derive(Debug)]
pub struct CachedEntry {
  pub response: Response,
  /// When the entry was written
  pub stored_at: DateTime<Utc>,
  /// Hex SHA-256 of the body at write time
  pub digest: String,
}

/// Listing row for a stored entry (no body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
  pub locator: String,
  pub status: u16,
  pub content_type: Option<String>,
  pub size: usize,
  pub digest: String,
  pub stored_at: DateTime<Utc>,
}

/// A cache generation known to the database.
#[derive(Debug, Clone)]
pub struct GenerationInfo {
  pub name: String,
  pub created_at: DateTime<Utc>,
  pub installed_at: Option<DateTime<Utc>>,
}

/// Trait for cache storage backends.
///
/// A storage handle is scoped to exactly one generation; every operation
/// reads and writes that generation only.
pub trait CacheStorage: Send + Sync {
  /// Name of the generation this handle is bound to.
  fn generation(&self) -> &str;

  /// Look up a stored response by locator.
  fn get(&self, locator: &str) -> Result<Option<CachedEntry>>;

  /// Store a single response, replacing any previous entry for the locator.
  /// The store takes ownership of its copy.
  fn put(&self, locator: &str, response: Response) -> Result<()>;

  /// Write all entries and mark the generation installed, or nothing at all.
  fn install(&self, entries: &[(String, Response)]) -> Result<()>;

  /// Whether a full install has completed for this generation.
  fn is_installed(&self) -> Result<bool>;

  /// All stored entries, ordered by locator.
  fn entries(&self) -> Result<Vec<EntrySummary>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  generation: String,
}

impl SqliteStorage {
  /// Open (or create) the database at `path` and bind to `generation`.
  ///
  /// Opening never records the generation; it only becomes known to the
  /// database once something is written to it.
  pub fn open(path: &Path, generation: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::init(conn, generation)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory(generation: &str) -> Result<Self> {
    Self::init(Connection::open_in_memory()?, generation)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StorageError::Other("Could not determine data directory".into()))?;

    Ok(data_dir.join("zerodex").join("cache.db"))
  }

  fn init(conn: Connection, generation: &str) -> Result<Self> {
    conn.execute_batch(CACHE_SCHEMA)?;

    Ok(Self {
      conn: Mutex::new(conn),
      generation: generation.to_string(),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }

  /// Every generation in the database, oldest first.
  pub fn generations(&self) -> Result<Vec<GenerationInfo>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT name, created_at, installed_at FROM generations ORDER BY created_at, name",
    )?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, Option<String>>(2)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows
      .into_iter()
      .map(|(name, created_at, installed_at)| {
        Ok(GenerationInfo {
          name,
          created_at: parse_datetime(&created_at)?,
          installed_at: installed_at.as_deref().map(parse_datetime).transpose()?,
        })
      })
      .collect()
  }

  /// Remove a generation and all of its entries. Returns the number of
  /// entries removed.
  pub fn delete_generation(&self, name: &str) -> Result<usize> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    let removed = tx.execute("DELETE FROM responses WHERE generation = ?", params![name])?;
    tx.execute("DELETE FROM generations WHERE name = ?", params![name])?;
    tx.commit()?;
    Ok(removed)
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    installed_at TEXT
);

CREATE TABLE IF NOT EXISTS responses (
    generation TEXT NOT NULL,
    locator TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    content_type TEXT,
    delivery TEXT NOT NULL,
    body BLOB NOT NULL,
    digest TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, locator),
    FOREIGN KEY (generation) REFERENCES generations(name) ON DELETE CASCADE
);
"#;

fn ensure_generation(conn: &Connection, generation: &str) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO generations (name) VALUES (?)",
    params![generation],
  )?;
  Ok(())
}

fn write_entry(
  conn: &Connection,
  generation: &str,
  locator: &str,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)?;

  conn.execute(
    "INSERT OR REPLACE INTO responses
       (generation, locator, url, status, headers, content_type, delivery, body, digest, stored_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      generation,
      locator,
      response.url,
      response.status,
      headers,
      response.content_type(),
      response.delivery.as_str(),
      response.body(),
      response.digest(),
    ],
  )?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn generation(&self) -> &str {
    &self.generation
  }

  fn get(&self, locator: &str) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT url, status, headers, delivery, body, digest, stored_at FROM responses
       WHERE generation = ? AND locator = ?",
    )?;

    let row = stmt
      .query_row(params![self.generation, locator], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, u16>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, Vec<u8>>(4)?,
          row.get::<_, String>(5)?,
          row.get::<_, String>(6)?,
        ))
      })
      .optional()?;

    let Some((url, status, headers, delivery, body, digest, stored_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
    let delivery = delivery
      .parse::<DeliveryMode>()
      .map_err(StorageError::Other)?;

    Ok(Some(CachedEntry {
      response: Response::new(url, status, headers, delivery, body),
      stored_at: parse_datetime(&stored_at)?,
      digest,
    }))
  }

  fn put(&self, locator: &str, response: Response) -> Result<()> {
    let conn = self.lock()?;
    ensure_generation(&conn, &self.generation)?;
    write_entry(&conn, &self.generation, locator, &response)
  }

  fn install(&self, entries: &[(String, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    // Dropping the transaction without commit rolls everything back
    let tx = conn.transaction()?;
    ensure_generation(&tx, &self.generation)?;

    for (locator, response) in entries {
      write_entry(&tx, &self.generation, locator, response)?;
    }

    tx.execute(
      "UPDATE generations SET installed_at = datetime('now') WHERE name = ?",
      params![self.generation],
    )?;
    tx.commit()?;

    Ok(())
  }

  fn is_installed(&self) -> Result<bool> {
    let conn = self.lock()?;
    let installed: Option<Option<String>> = conn
      .query_row(
        "SELECT installed_at FROM generations WHERE name = ?",
        params![self.generation],
        |row| row.get(0),
      )
      .optional()?;

    Ok(installed.flatten().is_some())
  }

  fn entries(&self) -> Result<Vec<EntrySummary>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT locator, status, content_type, length(body), digest, stored_at FROM responses
       WHERE generation = ?
       ORDER BY locator",
    )?;

    let rows = stmt
      .query_map(params![self.generation], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, u16>(1)?,
          row.get::<_, Option<String>>(2)?,
          row.get::<_, i64>(3)?,
          row.get::<_, String>(4)?,
          row.get::<_, String>(5)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows
      .into_iter()
      .map(|(locator, status, content_type, size, digest, stored_at)| {
        Ok(EntrySummary {
          locator,
          status,
          content_type,
          size: usize::try_from(size).unwrap_or_default(),
          digest,
          stored_at: parse_datetime(&stored_at)?,
        })
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StorageError::Other(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &str) -> Response {
    Response::new(
      "https://zerodex.example.com/style.css",
      200,
      vec![("content-type".into(), "text/css".into())],
      DeliveryMode::Basic,
      body.as_bytes().to_vec(),
    )
  }

  #[test]
  fn test_put_then_get() {
    let storage = SqliteStorage::open_in_memory("zerodex-cache-v1").unwrap();
    storage
      .put("https://zerodex.example.com/style.css", response("body{}"))
      .unwrap();

    let entry = storage
      .get("https://zerodex.example.com/style.css")
      .unwrap()
      .unwrap();
    assert_eq!(entry.response.status, 200);
    assert_eq!(entry.response.body(), b"body{}");
    assert_eq!(entry.response.content_type(), Some("text/css"));
    assert_eq!(entry.response.delivery, DeliveryMode::Basic);
    assert_eq!(entry.digest, response("body{}").digest());

    assert!(storage.get("https://zerodex.example.com/missing").unwrap().is_none());
  }

  #[test]
  fn test_put_is_last_write_wins() {
    let storage = SqliteStorage::open_in_memory("zerodex-cache-v1").unwrap();
    storage.put("k", response("first")).unwrap();
    storage.put("k", response("second")).unwrap();

    let entry = storage.get("k").unwrap().unwrap();
    assert_eq!(entry.response.body(), b"second");
    assert_eq!(storage.entries().unwrap().len(), 1);
  }

  #[test]
  fn test_install_marks_generation_installed() {
    let storage = SqliteStorage::open_in_memory("zerodex-cache-v1").unwrap();
    assert!(!storage.is_installed().unwrap());

    storage
      .install(&[("a".into(), response("a")), ("b".into(), response("bb"))])
      .unwrap();

    assert!(storage.is_installed().unwrap());
    let entries = storage.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].locator, "b");
    assert_eq!(entries[1].size, 2);
  }

  #[test]
  fn test_generations_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let v1 = SqliteStorage::open(&path, "zerodex-cache-v1").unwrap();
    v1.install(&[("a".into(), response("old"))]).unwrap();

    let v2 = SqliteStorage::open(&path, "zerodex-cache-v2").unwrap();
    assert!(v2.get("a").unwrap().is_none());
    assert!(!v2.is_installed().unwrap());

    v2.put("b", response("new")).unwrap();
    let names: Vec<String> = v2.generations().unwrap().into_iter().map(|g| g.name).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"zerodex-cache-v1".to_string()));

    assert_eq!(v2.delete_generation("zerodex-cache-v1").unwrap(), 1);
    assert_eq!(v2.generations().unwrap().len(), 1);
    assert!(v2.get("b").unwrap().is_some());
  }

  #[test]
  fn test_reading_does_not_create_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let v1 = SqliteStorage::open(&path, "zerodex-cache-v1").unwrap();
    v1.install(&[("a".into(), response("a"))]).unwrap();

    let typo = SqliteStorage::open(&path, "zerodex-cahce-v1").unwrap();
    assert!(!typo.is_installed().unwrap());
    assert!(typo.entries().unwrap().is_empty());
    assert!(typo.get("a").unwrap().is_none());

    let names: Vec<String> = typo
      .generations()
      .unwrap()
      .into_iter()
      .map(|g| g.name)
      .collect();
    assert_eq!(names, vec!["zerodex-cache-v1"]);
  }

  #[test]
  fn test_empty_install_still_marks_installed() {
    let storage = SqliteStorage::open_in_memory("zerodex-cache-v1").unwrap();
    storage.install(&[]).unwrap();

    assert!(storage.is_installed().unwrap());
    assert_eq!(storage.generations().unwrap().len(), 1);
  }

  #[test]
  fn test_reopen_keeps_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open(&path, "zerodex-cache-v1").unwrap();
      storage.install(&[("a".into(), response("kept"))]).unwrap();
    }

    let storage = SqliteStorage::open(&path, "zerodex-cache-v1").unwrap();
    assert!(storage.is_installed().unwrap());
    assert_eq!(storage.get("a").unwrap().unwrap().response.body(), b"kept");
  }
}
