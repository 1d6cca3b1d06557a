use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::entity::{ActivityError, ActivityResult};

/// Durable key-value storage the activity store persists its snapshot into
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn load(&self, key: &str) -> ActivityResult<Option<String>>;

    async fn save(&self, key: &str, value: &str) -> ActivityResult<()>;
}

/// SQLite backed key-value storage
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database and runs migrations
    pub async fn connect(database_url: &str) -> ActivityResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// In-memory database, lives as long as the storage does
    pub async fn in_memory() -> ActivityResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn from_pool(pool: SqlitePool) -> ActivityResult<Self> {
        info!("Running storage migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStorage for SqliteStorage {
    async fn load(&self, key: &str) -> ActivityResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, value: &str) -> ActivityResult<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Process-local storage, used when no database is configured
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, simulating a broken disk
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> ActivityResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ActivityError::Storage("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn load(&self, key: &str) -> ActivityResult<Option<String>> {
        self.check()?;
        let entries = self
            .entries
            .lock()
            .map_err(|_| ActivityError::Storage("storage lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> ActivityResult<()> {
        self.check()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ActivityError::Storage("storage lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
