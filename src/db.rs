use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::dates;
use crate::models::{EventItem, RawEventCandidate};
use crate::normalize;
use crate::utils;

pub const READ_LIMIT: usize = 200;

static SHARED: OnceCell<Arc<EventStore>> = OnceCell::const_new();

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache directory unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage task failed: {0}")]
    Task(String),
    #[error("storage connection poisoned")]
    Poisoned,
    #[error("upsert stopped after {written} events at {source_url}: {source}")]
    Upsert {
        written: usize,
        source_url: String,
        source: rusqlite::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CachedEvents {
    pub events: Vec<EventItem>,
    pub fetched_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventCache: Send + Sync {
    async fn read(&self, state: &str, start: &str, end: &str) -> Result<CachedEvents, StoreError>;

    /// Writes events one by one; returns how many were written.
    async fn upsert(&self, state: &str, events: &[EventItem]) -> Result<usize, StoreError>;
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path)?;
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                state TEXT NOT NULL,
                source_url TEXT NOT NULL,
                name TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                location TEXT NOT NULL,
                target_audience TEXT NOT NULL,
                summary TEXT NOT NULL,
                image_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                PRIMARY KEY (state, source_url)
            );
            CREATE INDEX IF NOT EXISTS events_state_start_idx ON events (state, start_date);
            CREATE INDEX IF NOT EXISTS events_last_seen_idx ON events (last_seen_at);",
        )
    }

    pub fn upsert_event(&self, state: &str, event: &EventItem) -> rusqlite::Result<()> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO events (
                state, source_url, name, start_date, end_date,
                location, target_audience, summary, image_url,
                created_at, updated_at, last_seen_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?10)
             ON CONFLICT(state, source_url) DO UPDATE SET
               name = excluded.name,
               start_date = excluded.start_date,
               end_date = excluded.end_date,
               location = excluded.location,
               target_audience = excluded.target_audience,
               summary = excluded.summary,
               image_url = excluded.image_url,
               updated_at = excluded.updated_at,
               last_seen_at = excluded.last_seen_at",
            params![
                state,
                event.source_url,
                event.name,
                event.start_date,
                event.end_date,
                event.location,
                event.target_audience,
                event.summary,
                event.image_url,
                now
            ],
        )?;
        Ok(())
    }

    pub fn read_window(
        &self,
        state: &str,
        start: &str,
        end: &str,
        limit: usize,
    ) -> rusqlite::Result<CachedEvents> {
        let mut stmt = self.conn.prepare(
            "SELECT name, start_date, end_date, location, target_audience, summary,
                    source_url, image_url, last_seen_at
             FROM events
             WHERE state = ?1 AND start_date >= ?2 AND start_date <= ?3
             ORDER BY start_date ASC, name ASC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![state, start, end, limit as i64], |row| {
            let candidate = RawEventCandidate {
                name: row.get(0)?,
                start_date: row.get(1)?,
                end_date: row.get(2)?,
                location: row.get(3)?,
                target_audience: row.get(4)?,
                summary: row.get(5)?,
                source_url: row.get(6)?,
                image_url: row.get(7)?,
            };
            let last_seen: DateTime<Utc> = row.get(8)?;
            Ok((candidate, last_seen))
        })?;

        let today = dates::today();
        let mut events = Vec::new();
        let mut latest: Option<DateTime<Utc>> = None;
        for row in rows {
            let (candidate, last_seen) = row?;
            let Some(event) = normalize::normalize_on(&candidate, today) else {
                continue;
            };
            latest = Some(latest.map_or(last_seen, |seen| seen.max(last_seen)));
            events.push(event);
        }

        Ok(CachedEvents {
            events,
            fetched_at: latest.unwrap_or_else(Utc::now),
        })
    }

    pub fn count_events(&self, state: &str) -> rusqlite::Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE state = ?1",
            params![state],
            |row| row.get(0),
        )
    }
}

/// Async handle over one SQLite connection. The schema is created once per handle; concurrent
/// first callers wait on the same bootstrap.
pub struct EventStore {
    store: Arc<Mutex<Store>>,
    schema: OnceCell<()>,
    schema_runs: AtomicUsize,
}

impl EventStore {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            schema: OnceCell::new(),
            schema_runs: AtomicUsize::new(0),
        }
    }

    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let store = tokio::task::spawn_blocking(move || Store::open(&path))
            .await
            .map_err(|err| StoreError::Task(err.to_string()))??;
        Ok(Self::new(store))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Store::open_in_memory()?))
    }

    /// Process-wide handle, created on first use. Later calls get the same handle regardless of
    /// `path`.
    pub async fn shared(path: PathBuf) -> Result<Arc<EventStore>, StoreError> {
        SHARED
            .get_or_try_init(|| async move {
                info!("opening event cache at {:?}", path);
                EventStore::open(path).await.map(Arc::new)
            })
            .await
            .cloned()
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema
            .get_or_try_init(|| async {
                self.schema_runs.fetch_add(1, Ordering::SeqCst);
                self.run(|store| Ok(store.init_schema()?)).await
            })
            .await?;
        Ok(())
    }

    pub fn schema_runs(&self) -> usize {
        self.schema_runs.load(Ordering::SeqCst)
    }

    async fn run<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let guard = store.lock().map_err(|_| StoreError::Poisoned)?;
            work(&guard)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

#[async_trait]
impl EventCache for EventStore {
    async fn read(&self, state: &str, start: &str, end: &str) -> Result<CachedEvents, StoreError> {
        self.ensure_schema().await?;
        let (state, start, end) = (state.to_string(), start.to_string(), end.to_string());
        let cached = self
            .run(move |store| Ok(store.read_window(&state, &start, &end, READ_LIMIT)?))
            .await?;
        debug!("cache read returned {} events", cached.events.len());
        Ok(cached)
    }

    async fn upsert(&self, state: &str, events: &[EventItem]) -> Result<usize, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }
        self.ensure_schema().await?;
        let state = state.to_string();
        let events = events.to_vec();
        self.run(move |store| {
            let mut written = 0;
            for event in &events {
                store
                    .upsert_event(&state, event)
                    .map_err(|source| StoreError::Upsert {
                        written,
                        source_url: event.source_url.clone(),
                        source,
                    })?;
                written += 1;
            }
            Ok(written)
        })
        .await
    }
}
