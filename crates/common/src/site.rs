//! Site backend API
//!
//! The operations the site exposes to fixture drivers. Every method is a
//! direct round-trip to the site database; drivers layer defaults and
//! validation on top.

use crate::db::Database;
use crate::types::{CronReport, NodeId, RoleId, TermId, TestNode, TestTerm, UserId, UserStatus};
use crate::{DriverError, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the per-site settings file inside `sites/<dir>/`
pub const SETTINGS_FILE: &str = "settings.toml";

/// Directory holding per-site configuration below the backend root
pub const SITES_DIR: &str = "sites";

const MEMORY_URL: &str = "sqlite::memory:";
const SQLITE_SCHEME: &str = "sqlite://";

/// Contents of a site's `settings.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteSettings {
    /// `sqlite://<path>` (relative to the backend root) or `sqlite::memory:`
    #[serde(default)]
    pub database_url: Option<String>,

    /// Variables written to the site on every bootstrap
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Extra catalog permissions, keyed by declaring module
    #[serde(default)]
    pub permissions: BTreeMap<String, Vec<String>>,
}

/// Where the site database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl SiteSettings {
    /// Load settings from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            DriverError::Configuration(format!("Invalid settings file {}: {}", path.display(), e))
        })
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DriverError::Configuration(format!("Cannot encode settings: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the database location against the backend root
    pub fn database_location(&self, root: &Path) -> Result<DatabaseLocation> {
        let url = self.database_url.as_deref().map(str::trim).unwrap_or("");
        if url.is_empty() {
            return Err(DriverError::Configuration(
                "Missing database setting, verify the database configuration in settings.toml."
                    .to_string(),
            ));
        }

        if url == MEMORY_URL {
            return Ok(DatabaseLocation::Memory);
        }

        match url.strip_prefix(SQLITE_SCHEME) {
            Some(path) if !path.is_empty() => {
                let path = PathBuf::from(path);
                if path.is_absolute() {
                    Ok(DatabaseLocation::File(path))
                } else {
                    Ok(DatabaseLocation::File(root.join(path)))
                }
            }
            _ => Err(DriverError::Configuration(format!(
                "Unsupported database url \"{}\"",
                url
            ))),
        }
    }
}

/// Path of the settings file for a site directory
pub fn settings_path(root: &Path, conf_dir: &str) -> PathBuf {
    root.join(SITES_DIR).join(conf_dir).join(SETTINGS_FILE)
}

/// An account row ready to be written; `pass_hash` is never plaintext
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub name: String,
    pub pass_hash: String,
    pub mail: String,
    pub status: UserStatus,
    pub roles: BTreeSet<RoleId>,
}

/// How a role's granted permissions are laid out in the `permission` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLayout {
    /// One row per role holding every permission joined by `", "`
    Joined,
    /// One row per granted permission
    PerRow,
}

/// Handle to a bootstrapped site
#[derive(Clone)]
pub struct Site {
    root: PathBuf,
    db: Database,
}

impl Site {
    /// Open the site described by `settings`, seeding configured variables
    /// and declaring configured permissions
    pub fn open(root: impl Into<PathBuf>, settings: &SiteSettings) -> Result<Self> {
        let root = root.into();
        let db = match settings.database_location(&root)? {
            DatabaseLocation::Memory => Database::open_memory()?,
            DatabaseLocation::File(path) => Database::open(path)?,
        };

        for (name, value) in &settings.variables {
            db.variable_set(name, value)?;
        }

        let site = Self { root, db };
        for (module, perms) in &settings.permissions {
            let perms: Vec<&str> = perms.iter().map(String::as_str).collect();
            site.declare_permissions(module, &perms)?;
        }
        Ok(site)
    }

    /// Wrap an already-open database
    pub fn from_database(root: impl Into<PathBuf>, db: Database) -> Self {
        Self {
            root: root.into(),
            db,
        }
    }

    /// Lay out a fresh site under `root`: settings file plus database file
    pub fn install(root: &Path, conf_dir: &str) -> Result<Self> {
        let settings_file = settings_path(root, conf_dir);
        let settings = SiteSettings {
            database_url: Some(format!(
                "{}{}/{}/site.db",
                SQLITE_SCHEME, SITES_DIR, conf_dir
            )),
            variables: BTreeMap::new(),
            permissions: BTreeMap::new(),
        };
        settings.save(&settings_file)?;
        info!("Installed site settings at {}", settings_file.display());
        Self::open(root, &settings)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// All roles keyed by name
    pub fn user_roles(&self) -> Result<BTreeMap<String, RoleId>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT name, rid FROM role ORDER BY rid")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, RoleId(row.get(1)?))))?;

        let mut roles = BTreeMap::new();
        for row in rows {
            let (name, rid) = row?;
            roles.insert(name, rid);
        }
        Ok(roles)
    }

    /// Look up a role by name
    pub fn role_id(&self, name: &str) -> Result<Option<RoleId>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let rid = conn
            .query_row("SELECT rid FROM role WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(rid.map(RoleId))
    }

    /// Insert an account and its role assignments
    pub fn save_account(&self, account: &AccountRecord) -> Result<UserId> {
        let conn = self.db.connection();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().timestamp();

        tx.execute(
            "INSERT INTO users (name, pass, mail, status, created) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                account.name,
                account.pass_hash,
                account.mail,
                account.status.as_flag(),
                now
            ],
        )?;
        let uid = tx.last_insert_rowid();

        for rid in &account.roles {
            tx.execute(
                "INSERT OR IGNORE INTO users_roles (uid, rid) VALUES (?1, ?2)",
                params![uid, rid.0],
            )?;
        }
        tx.commit()?;

        debug!("Saved account {} ({})", account.name, uid);
        Ok(UserId(uid))
    }

    /// Delete an account; false when no such account existed
    pub fn delete_account(&self, uid: UserId) -> Result<bool> {
        let conn = self.db.connection();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM users_roles WHERE uid = ?1", params![uid.0])?;
        let rows = tx.execute("DELETE FROM users WHERE uid = ?1", params![uid.0])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    pub fn account_exists(&self, uid: UserId) -> Result<bool> {
        self.db.exists("users", "uid", uid.0)
    }

    /// Add a role to several accounts at once
    pub fn grant_role(&self, uids: &[UserId], rid: RoleId) -> Result<()> {
        let conn = self.db.connection();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        for uid in uids {
            tx.execute(
                "INSERT OR IGNORE INTO users_roles (uid, rid) VALUES (?1, ?2)",
                params![uid.0, rid.0],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Roles assigned to an account
    pub fn account_roles(&self, uid: UserId) -> Result<BTreeSet<RoleId>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT rid FROM users_roles WHERE uid = ?1")?;
        let rows = stmt.query_map(params![uid.0], |row| Ok(RoleId(row.get(0)?)))?;

        let mut roles = BTreeSet::new();
        for row in rows {
            roles.insert(row?);
        }
        Ok(roles)
    }

    /// Verify credentials of an active account
    pub fn authenticate(&self, name: &str, pass: &str) -> Result<Option<UserId>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let row: Option<(i64, String, i64)> = conn
            .query_row(
                "SELECT uid, pass, status FROM users WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(match row {
            Some((uid, hash, status))
                if UserStatus::from_flag(status) == UserStatus::Active
                    && crate::crypto::verify_password(pass, &hash) =>
            {
                Some(UserId(uid))
            }
            _ => None,
        })
    }

    // ========================================================================
    // Roles and permissions
    // ========================================================================

    /// Every permission declared by an installed module
    pub fn permission_catalog(&self) -> Result<BTreeSet<String>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT perm FROM permission_catalog")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut perms = BTreeSet::new();
        for row in rows {
            perms.insert(row?);
        }
        Ok(perms)
    }

    /// Declare permissions on behalf of a module
    pub fn declare_permissions(&self, module: &str, perms: &[&str]) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn.lock();
        for perm in perms {
            conn.execute(
                "INSERT OR REPLACE INTO permission_catalog (perm, module) VALUES (?1, ?2)",
                params![perm, module],
            )?;
        }
        Ok(())
    }

    /// Create a role without permissions
    pub fn create_named_role(&self, name: &str) -> Result<RoleId> {
        self.insert_role(name, &[], PermissionLayout::PerRow)
    }

    /// Create a role and grant `perms` in one transaction
    pub fn insert_role(
        &self,
        name: &str,
        perms: &[String],
        layout: PermissionLayout,
    ) -> Result<RoleId> {
        let conn = self.db.connection();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;

        tx.execute("INSERT INTO role (name) VALUES (?1)", params![name])?;
        let rid = tx.last_insert_rowid();

        match layout {
            PermissionLayout::Joined => {
                if !perms.is_empty() {
                    tx.execute(
                        "INSERT INTO permission (rid, perm) VALUES (?1, ?2)",
                        params![rid, perms.join(", ")],
                    )?;
                }
            }
            PermissionLayout::PerRow => {
                for perm in perms {
                    tx.execute(
                        "INSERT INTO permission (rid, perm) VALUES (?1, ?2)",
                        params![rid, perm],
                    )?;
                }
            }
        }
        tx.commit()?;

        debug!("Inserted role {} ({}) with {} permission(s)", name, rid, perms.len());
        Ok(RoleId(rid))
    }

    /// Permissions granted to a role, whichever layout stored them
    pub fn role_permissions(&self, rid: RoleId) -> Result<BTreeSet<String>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT perm FROM permission WHERE rid = ?1")?;
        let rows = stmt.query_map(params![rid.0], |row| row.get::<_, String>(0))?;

        let mut perms = BTreeSet::new();
        for row in rows {
            for perm in row?.split(", ").filter(|p| !p.is_empty()) {
                perms.insert(perm.to_string());
            }
        }
        Ok(perms)
    }

    /// Delete a role with its grants and assignments, returning affected role rows
    pub fn delete_role(&self, rid: RoleId) -> Result<usize> {
        let conn = self.db.connection();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        let rows = tx.execute("DELETE FROM role WHERE rid = ?1", params![rid.0])?;
        if rows > 0 {
            tx.execute("DELETE FROM permission WHERE rid = ?1", params![rid.0])?;
            tx.execute("DELETE FROM users_roles WHERE rid = ?1", params![rid.0])?;
        }
        tx.commit()?;
        Ok(rows)
    }

    pub fn role_exists(&self, rid: RoleId) -> Result<bool> {
        self.db.exists("role", "rid", rid.0)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Insert a node; the status must already be defaulted by the caller
    pub fn save_node(&self, node: &TestNode) -> Result<NodeId> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO node (type, title, uid, status, fields, created, changed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                node.node_type,
                node.title,
                node.author.map(|uid| uid.0).unwrap_or(0),
                node.status.unwrap_or_default().as_flag(),
                serde_json::to_string(&node.fields)?,
                now,
                now,
            ],
        )?;
        let nid = conn.last_insert_rowid();

        debug!("Saved {} node \"{}\" ({})", node.node_type, node.title, nid);
        Ok(NodeId(nid))
    }

    /// Delete a node; false when no such node existed
    pub fn delete_node(&self, nid: NodeId) -> Result<bool> {
        Ok(self.db.delete_where("node", "nid", nid.0)? > 0)
    }

    pub fn node_exists(&self, nid: NodeId) -> Result<bool> {
        self.db.exists("node", "nid", nid.0)
    }

    /// Field values stored for a node
    pub fn node_fields(&self, nid: NodeId) -> Result<Option<BTreeMap<String, serde_json::Value>>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let raw: Option<String> = conn
            .query_row("SELECT fields FROM node WHERE nid = ?1", params![nid.0], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Taxonomy
    // ========================================================================

    pub fn vocabulary_id(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let vid = conn
            .query_row(
                "SELECT vid FROM vocabulary WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(vid)
    }

    pub fn create_vocabulary(&self, name: &str) -> Result<i64> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute("INSERT INTO vocabulary (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a term into vocabulary `vid`
    pub fn save_term(&self, vid: i64, term: &TestTerm) -> Result<TermId> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute(
            "INSERT INTO term_data (vid, name, description, parent) VALUES (?1, ?2, ?3, ?4)",
            params![
                vid,
                term.name,
                term.description,
                term.parent.map(|tid| tid.0).unwrap_or(0)
            ],
        )?;
        let tid = conn.last_insert_rowid();

        debug!("Saved term \"{}\" ({})", term.name, tid);
        Ok(TermId(tid))
    }

    /// Delete a term; false when no such term existed
    pub fn delete_term(&self, tid: TermId) -> Result<bool> {
        Ok(self.db.delete_where("term_data", "tid", tid.0)? > 0)
    }

    pub fn term_exists(&self, tid: TermId) -> Result<bool> {
        self.db.exists("term_data", "tid", tid.0)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Empty every cache bin
    pub fn flush_all_caches(&self) -> Result<usize> {
        let flushed = self.db.cache_flush_all()?;
        debug!("Flushed {} cache entries", flushed);
        Ok(flushed)
    }

    /// Run periodic maintenance: purge expired cache entries and stamp `cron_last`
    pub fn cron_run(&self) -> Result<CronReport> {
        let now = chrono::Utc::now().timestamp();
        let purged = self.db.cache_purge_expired(now)?;
        self.db.variable_set("cron_last", &serde_json::json!(now))?;

        info!("Cron run completed, {} expired cache entries purged", purged);
        Ok(CronReport {
            ran_at: now,
            expired_cache_entries: purged,
        })
    }

    /// Enabled extensions as (name, absolute path)
    pub fn enabled_extensions(&self) -> Result<Vec<(String, PathBuf)>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt =
            conn.prepare("SELECT name, path FROM system WHERE status = 1 ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut extensions = Vec::new();
        for row in rows {
            let (name, path) = row?;
            extensions.push((name, self.root.join(path)));
        }
        Ok(extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_password;

    fn memory_site() -> Site {
        Site::from_database("/srv/site", Database::open_memory().unwrap())
    }

    fn account(name: &str, pass: &str, roles: &[RoleId]) -> AccountRecord {
        AccountRecord {
            name: name.to_string(),
            pass_hash: hash_password(pass),
            mail: format!("{}@example.com", name),
            status: UserStatus::Active,
            roles: roles.iter().copied().collect(),
        }
    }

    #[test]
    fn test_database_location() {
        let root = Path::new("/srv/site");
        let mut settings = SiteSettings::default();
        assert!(matches!(
            settings.database_location(root),
            Err(DriverError::Configuration(_))
        ));

        settings.database_url = Some("sqlite://sites/default/site.db".to_string());
        assert_eq!(
            settings.database_location(root).unwrap(),
            DatabaseLocation::File(PathBuf::from("/srv/site/sites/default/site.db"))
        );

        settings.database_url = Some("sqlite:///var/db/site.db".to_string());
        assert_eq!(
            settings.database_location(root).unwrap(),
            DatabaseLocation::File(PathBuf::from("/var/db/site.db"))
        );

        settings.database_url = Some("sqlite::memory:".to_string());
        assert_eq!(settings.database_location(root).unwrap(), DatabaseLocation::Memory);

        settings.database_url = Some("mysql://user@host/db".to_string());
        assert!(settings.database_location(root).is_err());
    }

    #[test]
    fn test_settings_parse_variables() {
        let settings: SiteSettings = toml::from_str(
            r#"
database_url = "sqlite::memory:"

[variables]
site_name = "CARDcom"
comment_limit = 50
"#,
        )
        .unwrap();
        let site = Site::open("/srv/site", &settings).unwrap();
        assert_eq!(
            site.db().variable_get("site_name").unwrap(),
            Some(serde_json::json!("CARDcom"))
        );
        assert_eq!(
            site.db().variable_get("comment_limit").unwrap(),
            Some(serde_json::json!(50))
        );
    }

    #[test]
    fn test_settings_declare_permissions() {
        let settings: SiteSettings = toml::from_str(
            r#"
database_url = "sqlite::memory:"

[permissions]
card_voting = ["vote on cards", "administer card voting"]
"#,
        )
        .unwrap();
        let site = Site::open("/srv/site", &settings).unwrap();
        let catalog = site.permission_catalog().unwrap();
        assert!(catalog.contains("vote on cards"));
        assert!(catalog.contains("administer card voting"));
        assert!(catalog.contains("access content"));
    }

    #[test]
    fn test_account_lifecycle() {
        let site = memory_site();
        let editor = site.create_named_role("editor").unwrap();
        let uid = site.save_account(&account("alice", "pw", &[editor])).unwrap();

        assert!(site.account_exists(uid).unwrap());
        assert_eq!(site.account_roles(uid).unwrap(), BTreeSet::from([editor]));
        assert_eq!(site.authenticate("alice", "pw").unwrap(), Some(uid));
        assert_eq!(site.authenticate("alice", "nope").unwrap(), None);

        assert!(site.delete_account(uid).unwrap());
        assert!(!site.delete_account(uid).unwrap());
        assert_eq!(site.authenticate("alice", "pw").unwrap(), None);
    }

    #[test]
    fn test_blocked_account_cannot_authenticate() {
        let site = memory_site();
        let mut record = account("bob", "pw", &[]);
        record.status = UserStatus::Blocked;
        site.save_account(&record).unwrap();
        assert_eq!(site.authenticate("bob", "pw").unwrap(), None);
    }

    #[test]
    fn test_role_permission_layouts() {
        let site = memory_site();
        let perms = vec!["access content".to_string(), "post comments".to_string()];

        let joined = site.insert_role("joined", &perms, PermissionLayout::Joined).unwrap();
        let per_row = site.insert_role("rows", &perms, PermissionLayout::PerRow).unwrap();

        assert_eq!(site.db().count("permission").unwrap(), 3);
        assert_eq!(site.role_permissions(joined).unwrap(), site.role_permissions(per_row).unwrap());

        assert_eq!(site.delete_role(joined).unwrap(), 1);
        assert_eq!(site.delete_role(joined).unwrap(), 0);
        assert!(site.role_permissions(joined).unwrap().is_empty());
    }

    #[test]
    fn test_enabled_extensions_are_rooted() {
        let site = memory_site();
        let extensions = site.enabled_extensions().unwrap();
        assert!(extensions
            .iter()
            .any(|(name, path)| name == "node" && path == Path::new("/srv/site/modules/node")));
    }

    #[test]
    fn test_install_writes_settings() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::install(dir.path(), "default").unwrap();
        let settings_file = settings_path(dir.path(), "default");
        assert!(settings_file.exists());
        assert!(dir.path().join("sites/default/site.db").exists());

        let uid = site.save_account(&account("carol", "pw", &[])).unwrap();
        let reopened = Site::open(dir.path(), &SiteSettings::load(&settings_file).unwrap()).unwrap();
        assert!(reopened.account_exists(uid).unwrap());
    }

    #[test]
    fn test_cron_stamps_last_run() {
        let site = memory_site();
        let report = site.cron_run().unwrap();
        assert_eq!(
            site.db().variable_get("cron_last").unwrap(),
            Some(serde_json::json!(report.ran_at))
        );
    }
}
