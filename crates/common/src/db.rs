//! SQLite storage for the site backend

use crate::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Cache entries with this expiry are never purged by cron
pub const CACHE_PERMANENT: i64 = 0;

/// Cache entries with this expiry are purged by the next cron run
pub const CACHE_TEMPORARY: i64 = -1;

/// Database wrapper for site state
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Expose the underlying connection for the site API, which runs its own
    /// statements and transactions against the shared schema.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

impl Database {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        info!("Opened site database at {:?}", path.as_ref());
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema and the built-in rows every site carries
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Accounts
            CREATE TABLE IF NOT EXISTS users (
                uid INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                pass TEXT NOT NULL,
                mail TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 1,
                created INTEGER NOT NULL
            );

            -- Roles and assignments
            CREATE TABLE IF NOT EXISTS role (
                rid INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS users_roles (
                uid INTEGER NOT NULL,
                rid INTEGER NOT NULL,
                PRIMARY KEY (uid, rid)
            );

            -- Granted permissions; legacy sites keep one comma-joined row per role
            CREATE TABLE IF NOT EXISTS permission (
                rid INTEGER NOT NULL,
                perm TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_permission_rid ON permission(rid);

            -- Permissions declared by modules
            CREATE TABLE IF NOT EXISTS permission_catalog (
                perm TEXT PRIMARY KEY,
                module TEXT NOT NULL
            );

            -- Content
            CREATE TABLE IF NOT EXISTS node (
                nid INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                uid INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 1,
                fields TEXT NOT NULL DEFAULT '{}',
                created INTEGER NOT NULL,
                changed INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_node_type ON node(type);

            -- Taxonomy
            CREATE TABLE IF NOT EXISTS vocabulary (
                vid INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS term_data (
                tid INTEGER PRIMARY KEY AUTOINCREMENT,
                vid INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                parent INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_term_data_vid ON term_data(vid);

            -- Installed extensions
            CREATE TABLE IF NOT EXISTS system (
                name TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                path TEXT NOT NULL,
                status INTEGER NOT NULL DEFAULT 0
            );

            -- Cache bins
            CREATE TABLE IF NOT EXISTS cache (
                cid TEXT NOT NULL,
                bin TEXT NOT NULL DEFAULT 'cache',
                data TEXT NOT NULL,
                expire INTEGER NOT NULL DEFAULT 0,
                created INTEGER NOT NULL,
                PRIMARY KEY (bin, cid)
            );

            -- Site variables
            CREATE TABLE IF NOT EXISTS variable (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO role (rid, name) VALUES
                (1, 'anonymous user'),
                (2, 'authenticated user');

            INSERT OR IGNORE INTO permission_catalog (perm, module) VALUES
                ('access content', 'node'),
                ('administer nodes', 'node'),
                ('create card_art content', 'node'),
                ('edit own card_art content', 'node'),
                ('create campaign content', 'node'),
                ('access comments', 'comment'),
                ('post comments', 'comment'),
                ('access user profiles', 'user'),
                ('administer users', 'user'),
                ('administer taxonomy', 'taxonomy'),
                ('access administration pages', 'system'),
                ('administer site configuration', 'system');

            INSERT OR IGNORE INTO system (name, type, path, status) VALUES
                ('system', 'module', 'modules/system', 1),
                ('user', 'module', 'modules/user', 1),
                ('node', 'module', 'modules/node', 1),
                ('comment', 'module', 'modules/comment', 1),
                ('taxonomy', 'module', 'modules/taxonomy', 1),
                ('garland', 'theme', 'themes/garland', 1);
            "#,
        )?;

        debug!("Site schema initialized");
        Ok(())
    }

    // ========================================================================
    // Generic row helpers
    // ========================================================================

    /// Delete rows whose `column` equals `id`, returning the affected count
    pub fn delete_where(&self, table: &str, column: &str, id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?1", table, column),
            params![id],
        )?;

        if rows > 0 {
            debug!("Deleted {} row(s) from {} where {} = {}", rows, table, column, id);
        }

        Ok(rows)
    }

    /// Check if a row exists
    pub fn exists(&self, table: &str, column: &str, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", table, column),
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Count all rows in a table
    pub fn count(&self, table: &str) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // Variables
    // ========================================================================

    /// Set a variable to a JSON value
    pub fn variable_set(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT OR REPLACE INTO variable (name, value, updated_at) VALUES (?1, ?2, ?3)",
            params![name, serde_json::to_string(value)?, now],
        )?;

        Ok(())
    }

    /// Get a variable
    pub fn variable_get(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();

        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM variable WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Cache
    // ========================================================================

    /// Store a cache entry; `expire` is a timestamp, [`CACHE_PERMANENT`] or
    /// [`CACHE_TEMPORARY`]
    pub fn cache_set(&self, bin: &str, cid: &str, data: &str, expire: i64) -> Result<()> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT OR REPLACE INTO cache (cid, bin, data, expire, created) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![cid, bin, data, expire, now],
        )?;

        Ok(())
    }

    /// Fetch a cache entry
    pub fn cache_get(&self, bin: &str, cid: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();

        let data = conn
            .query_row(
                "SELECT data FROM cache WHERE bin = ?1 AND cid = ?2",
                params![bin, cid],
                |row| row.get(0),
            )
            .optional()?;

        Ok(data)
    }

    /// Remove every cache entry in every bin
    pub fn cache_flush_all(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM cache", [])?;
        Ok(rows)
    }

    /// Remove temporary entries and entries whose expiry has passed
    pub fn cache_purge_expired(&self, now: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM cache WHERE expire = ?1 OR (expire > 0 AND expire <= ?2)",
            params![CACHE_TEMPORARY, now],
        )?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_seeds_builtin_rows() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.count("role").unwrap(), 2);
        assert!(db.count("permission_catalog").unwrap() > 0);
        assert!(db.exists("role", "rid", 2).unwrap());
    }

    #[test]
    fn test_variables() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.variable_get("site_name").unwrap(), None);

        db.variable_set("site_name", &serde_json::json!("CARDlike")).unwrap();
        db.variable_set("features", &serde_json::json!({"voting": true})).unwrap();
        assert_eq!(
            db.variable_get("site_name").unwrap(),
            Some(serde_json::json!("CARDlike"))
        );
        assert_eq!(
            db.variable_get("features").unwrap().unwrap()["voting"],
            serde_json::json!(true)
        );
        assert_eq!(db.variable_get("missing").unwrap(), None);
    }

    #[test]
    fn test_cache_purge_keeps_permanent_entries() {
        let db = Database::open_memory().unwrap();
        db.cache_set("cache", "permanent", "a", CACHE_PERMANENT).unwrap();
        db.cache_set("cache", "temporary", "b", CACHE_TEMPORARY).unwrap();
        db.cache_set("cache_page", "stale", "c", 100).unwrap();
        db.cache_set("cache_page", "fresh", "d", 10_000).unwrap();

        assert_eq!(db.cache_purge_expired(5_000).unwrap(), 2);
        assert_eq!(db.cache_get("cache", "permanent").unwrap().as_deref(), Some("a"));
        assert_eq!(db.cache_get("cache_page", "fresh").unwrap().as_deref(), Some("d"));
        assert_eq!(db.cache_get("cache_page", "stale").unwrap(), None);

        assert_eq!(db.cache_flush_all().unwrap(), 2);
        assert_eq!(db.count("cache").unwrap(), 0);
    }

    #[test]
    fn test_delete_where_reports_rows() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.delete_where("role", "rid", 99).unwrap(), 0);
        assert_eq!(db.delete_where("role", "rid", 1).unwrap(), 1);
        assert!(!db.exists("role", "rid", 1).unwrap());
    }
}
