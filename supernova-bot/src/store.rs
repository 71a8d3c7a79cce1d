//! Allow-list and activity log backed by SQLite.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Authorization data the bot consults before running gated commands.
pub trait AuthorizationStore: Send + Sync {
    /// Whether `user_id` is on the allow-list. Lookup failures count as "no".
    fn is_allowed(&self, user_id: i64) -> bool;

    /// Add `user_id` to the allow-list. Allowing a user twice is a no-op.
    fn allow(&self, user_id: i64) -> Result<()>;

    /// Record a command issued by `user_id`.
    fn log_activity(&self, user_id: i64, command: &str) -> Result<()>;
}

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        up: "CREATE TABLE IF NOT EXISTS allowed_users (
                user_id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL
            );",
        down: "DROP TABLE IF EXISTS allowed_users;",
    },
    Migration {
        version: 2,
        up: "CREATE TABLE IF NOT EXISTS user_activity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                command TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_user_activity_user ON user_activity(user_id);",
        down: "DROP INDEX IF EXISTS idx_user_activity_user;
            DROP TABLE IF EXISTS user_activity;",
    },
];

/// Latest schema version known to this build.
pub const SCHEMA_VERSION: i32 = 2;

/// SQLite implementation of [`AuthorizationStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database. The schema is not touched; see [`Self::migrate_up`].
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)", [])
            .context("Failed to create schema_version table")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock();
        read_version(&conn)
    }

    /// Apply every pending migration. Returns the number applied.
    pub fn migrate_up(&self) -> Result<usize> {
        let mut conn = self.conn.lock();
        let current = read_version(&conn)?;
        let mut applied = 0;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.up)
                .with_context(|| format!("Migration {} up failed", migration.version))?;
            write_version(&tx, migration.version)?;
            tx.commit()?;

            tracing::info!(version = migration.version, "applied migration");
            applied += 1;
        }

        Ok(applied)
    }

    /// Revert every applied migration, newest first. Returns the number reverted.
    pub fn migrate_down(&self) -> Result<usize> {
        let mut conn = self.conn.lock();
        let current = read_version(&conn)?;
        let mut reverted = 0;

        for migration in MIGRATIONS.iter().rev().filter(|m| m.version <= current) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.down)
                .with_context(|| format!("Migration {} down failed", migration.version))?;
            write_version(&tx, migration.version - 1)?;
            tx.commit()?;

            tracing::info!(version = migration.version, "reverted migration");
            reverted += 1;
        }

        Ok(reverted)
    }

    /// Number of activity rows recorded for `user_id`.
    pub fn activity_count(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM user_activity WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl AuthorizationStore for SqliteStore {
    fn is_allowed(&self, user_id: i64) -> bool {
        let conn = self.conn.lock();
        let res = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM allowed_users WHERE user_id = ?1)",
            params![user_id],
            |row| row.get::<_, bool>(0),
        );

        match res {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(user_id, "allow-list lookup failed: {e}");
                false
            }
        }
    }

    fn allow(&self, user_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO allowed_users (user_id, created_at) VALUES (?1, ?2)
             ON CONFLICT (user_id) DO NOTHING",
            params![user_id, Utc::now().to_rfc3339()],
        )
        .context("Failed to allow user")?;
        Ok(())
    }

    fn log_activity(&self, user_id: i64, command: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO user_activity (user_id, command, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, command, Utc::now().to_rfc3339()],
        )
        .context("Failed to log user activity")?;
        Ok(())
    }
}

fn read_version(conn: &Connection) -> Result<i32> {
    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?
        .unwrap_or(0);
    Ok(version)
}

fn write_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", params![version])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.migrate_up().unwrap();
        store
    }

    #[test]
    fn migrate_up_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), 0);

        assert_eq!(store.migrate_up().unwrap(), MIGRATIONS.len());
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(store.migrate_up().unwrap(), 0);
    }

    #[test]
    fn migrate_down_drops_tables() {
        let store = migrated();
        assert_eq!(store.migrate_down().unwrap(), MIGRATIONS.len());
        assert_eq!(store.schema_version().unwrap(), 0);

        assert!(store.allow(1).is_err());
        assert!(!store.is_allowed(1));
    }

    #[test]
    fn allow_then_check() {
        let store = migrated();
        assert!(!store.is_allowed(42));

        store.allow(42).unwrap();
        store.allow(42).unwrap();

        assert!(store.is_allowed(42));
        assert!(!store.is_allowed(43));
    }

    #[test]
    fn activity_is_recorded() {
        let store = migrated();
        store.log_activity(7, "/weather london 1 days").unwrap();
        store.log_activity(7, "/chat hi").unwrap();

        assert_eq!(store.activity_count(7).unwrap(), 2);
        assert_eq!(store.activity_count(8).unwrap(), 0);
    }

    #[test]
    fn unmigrated_lookup_reads_as_not_allowed() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!store.is_allowed(1));
        assert!(store.log_activity(1, "/help").is_err());
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("bot.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.migrate_up().unwrap();
            store.allow(5).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(store.is_allowed(5));
    }
}
