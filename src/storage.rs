/// Durable local storage for the signed-in principal
///
/// Holds the access/refresh token pair plus a cached copy of the profile
/// for offline display. The pair lives in a single row so both fields are
/// written and removed together.

use crate::error::Result;
use crate::models::{TokenPair, User};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct TokenStore {
    conn: Mutex<Connection>,
}

impl TokenStore {
    /// Create a new store with the given database path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and ephemeral sessions
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profile_cache (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                user_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load the persisted token pair.
    ///
    /// Returns `None` when absent. A corrupt row is logged and treated as
    /// absent rather than surfaced; the caller re-authenticates either way.
    pub fn load(&self) -> Option<TokenPair> {
        let conn = self.lock();
        let result = conn
            .prepare("SELECT access_token, refresh_token FROM tokens WHERE id = 1")
            .and_then(|mut stmt| {
                stmt.query_row([], |row| {
                    Ok(TokenPair {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                    })
                })
                .optional()
            });

        match result {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("Token row unreadable, treating as signed out: {}", e);
                None
            }
        }
    }

    /// Persist a token pair, replacing any previous one
    pub fn save(&self, pair: &TokenPair) -> Result<()> {
        let saved_at = chrono::Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT OR REPLACE INTO tokens (id, access_token, refresh_token, saved_at) VALUES (1, ?1, ?2, ?3)",
            (&pair.access_token, &pair.refresh_token, saved_at),
        )?;
        Ok(())
    }

    /// Remove the token pair and cached profile; idempotent
    pub fn clear(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM tokens WHERE id = 1", [])?;
        conn.execute("DELETE FROM profile_cache WHERE id = 1", [])?;
        Ok(())
    }

    /// Cache the profile for offline display
    pub fn save_profile(&self, user: &User) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();
        let user_json = serde_json::to_string(user)?;
        self.lock().execute(
            "INSERT OR REPLACE INTO profile_cache (id, user_json, updated_at) VALUES (1, ?1, ?2)",
            (user_json, updated_at),
        )?;
        Ok(())
    }

    /// Load the cached profile, if any
    pub fn load_profile(&self) -> Result<Option<User>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT user_json FROM profile_cache WHERE id = 1")?;

        let result = stmt
            .query_row([], |row| {
                let json: String = row.get(0)?;
                let user: User = serde_json::from_str(&json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(user)
            })
            .optional()?;

        Ok(result)
    }
}
