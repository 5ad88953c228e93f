//! Operations shared by the site-backed cores

use crate::environment::RequestContext;
use cardtest_common::crypto::hash_password;
use cardtest_common::site::{AccountRecord, PermissionLayout};
use cardtest_common::{
    DriverError, Fixture, RandomNames, Result, RoleId, Site, SiteSettings, TestNode, TestRole,
    NodeStatus, TestUser, UserId, UserStatus,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Length of generated role names
const ROLE_NAME_LEN: usize = 8;

/// State established by the first successful bootstrap
struct Bootstrapped {
    context: RequestContext,
    conf_dir: String,
    site: Site,
}

/// Site connection plus the defaulting rules every site-backed core applies
pub(crate) struct SiteCore {
    label: &'static str,
    root: PathBuf,
    uri: String,
    names: Mutex<RandomNames>,
    state: Option<Bootstrapped>,
}

impl SiteCore {
    pub(crate) fn new(label: &'static str, root: impl Into<PathBuf>, uri: impl Into<String>) -> Self {
        Self {
            label,
            root: root.into(),
            uri: uri.into(),
            names: Mutex::new(RandomNames::new()),
            state: None,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn is_bootstrapped(&self) -> bool {
        self.state.is_some()
    }

    /// Open the site selected by `context`; later calls are no-ops
    pub(crate) fn bootstrap(&mut self, context: RequestContext) -> Result<()> {
        if self.state.is_some() {
            debug!("{} already bootstrapped", self.label);
            return Ok(());
        }

        if !self.root.is_dir() {
            return Err(DriverError::Path {
                path: self.root.clone(),
                reason: "Backend root is not a directory".to_string(),
            });
        }

        let conf_dir = context.conf_dir(&self.root);
        let settings_file = cardtest_common::site::settings_path(&self.root, &conf_dir);
        if !settings_file.is_file() {
            return Err(DriverError::Path {
                path: settings_file,
                reason: "Could not find a settings.toml file".to_string(),
            });
        }

        let settings = SiteSettings::load(&settings_file)?;
        let site = Site::open(&self.root, &settings)?;

        info!(
            "{} bootstrapped site \"{}\" for {}",
            self.label, conf_dir, context.http_host
        );

        self.state = Some(Bootstrapped {
            context,
            conf_dir,
            site,
        });
        Ok(())
    }

    pub(crate) fn request_context(&self) -> Option<&RequestContext> {
        self.state.as_ref().map(|s| &s.context)
    }

    pub(crate) fn conf_dir(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.conf_dir.as_str())
    }

    pub(crate) fn site(&self) -> Result<&Site> {
        self.state
            .as_ref()
            .map(|s| &s.site)
            .ok_or_else(|| DriverError::not_bootstrapped(self.label))
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub(crate) fn create_user(&self, user: &mut TestUser) -> Result<()> {
        let site = self.site()?;
        let roles = resolve_roles(site, &user.roles)?;
        let status = *user.status.get_or_insert(UserStatus::Active);

        // Hash a copy; the handle keeps the plaintext for later login steps.
        let account = user.clone();
        let record = AccountRecord {
            name: account.name,
            pass_hash: hash_password(&account.pass),
            mail: account.mail,
            status,
            roles,
        };

        let uid = site.save_account(&record)?;
        user.uid = Some(uid);

        debug!("Created user {} ({})", user.name, uid);
        Ok(())
    }

    pub(crate) fn delete_user(&self, user: &TestUser) -> Result<()> {
        let site = self.site()?;
        let uid = user
            .uid
            .ok_or_else(|| DriverError::not_found("user", &user.name))?;

        if !site.delete_account(uid)? {
            return Err(DriverError::not_found("user", uid));
        }

        debug!("Deleted user {} ({})", user.name, uid);
        Ok(())
    }

    pub(crate) fn add_role(&self, user: &mut TestUser, role_name: &str) -> Result<()> {
        let site = self.site()?;
        let rid = site
            .role_id(role_name)?
            .ok_or_else(|| DriverError::not_found("role", role_name))?;
        let uid = user
            .uid
            .ok_or_else(|| DriverError::not_found("user", &user.name))?;
        if !site.account_exists(uid)? {
            return Err(DriverError::not_found("user", uid));
        }

        site.grant_role(&[uid], rid)?;
        user.roles.insert(role_name.to_string());

        debug!("Granted role {} to user {}", role_name, user.name);
        Ok(())
    }

    pub(crate) fn authenticate(&self, name: &str, pass: &str) -> Result<Option<UserId>> {
        self.site()?.authenticate(name, pass)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub(crate) fn create_node(&self, node: &mut TestNode) -> Result<()> {
        let site = self.site()?;
        node.status.get_or_insert(NodeStatus::Published);

        let nid = site.save_node(node)?;
        node.nid = Some(nid);

        debug!("Created {} node \"{}\" ({})", node.node_type, node.title, nid);
        Ok(())
    }

    pub(crate) fn delete_node(&self, node: &TestNode) -> Result<()> {
        let site = self.site()?;
        let nid = node
            .nid
            .ok_or_else(|| DriverError::not_found("node", &node.title))?;

        if !site.delete_node(nid)? {
            return Err(DriverError::not_found("node", nid));
        }

        debug!("Deleted node \"{}\" ({})", node.title, nid);
        Ok(())
    }

    // ========================================================================
    // Roles
    // ========================================================================

    pub(crate) fn create_role(
        &self,
        permissions: &[String],
        layout: PermissionLayout,
    ) -> Result<TestRole> {
        let site = self.site()?;

        let catalog = site.permission_catalog()?;
        if let Some(unknown) = permissions.iter().find(|p| !catalog.contains(p.as_str())) {
            return Err(DriverError::Validation(format!(
                "No permission '{}' exists.",
                unknown
            )));
        }

        let granted: BTreeSet<String> = permissions.iter().cloned().collect();
        let ordered: Vec<String> = granted.iter().cloned().collect();
        let name = self.names.lock().name(ROLE_NAME_LEN);
        let rid = site.insert_role(&name, &ordered, layout)?;

        debug!("Created role {} ({})", name, rid);
        Ok(TestRole {
            name,
            permissions: granted,
            rid: Some(rid),
        })
    }

    pub(crate) fn delete_role(&self, rid: RoleId) -> Result<()> {
        if self.site()?.delete_role(rid)? == 0 {
            return Err(DriverError::not_found("role", rid));
        }
        debug!("Deleted role {}", rid);
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub(crate) fn clear_cache(&self) -> Result<()> {
        self.site()?.flush_all_caches()?;
        Ok(())
    }

    pub(crate) fn extension_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .site()?
            .enabled_extensions()?
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    }

    /// Whether the entity behind a handle still resolves in the backend
    pub(crate) fn exists(&self, fixture: &Fixture) -> Result<bool> {
        let site = self.site()?;
        match fixture {
            Fixture::User(u) => u.uid.map_or(Ok(false), |uid| site.account_exists(uid)),
            Fixture::Node(n) => n.nid.map_or(Ok(false), |nid| site.node_exists(nid)),
            Fixture::Term(t) => t.tid.map_or(Ok(false), |tid| site.term_exists(tid)),
            Fixture::Role(r) => r.rid.map_or(Ok(false), |rid| site.role_exists(rid)),
        }
    }
}

/// Map role names onto a de-duplicated id set, failing on the first unknown name
fn resolve_roles(site: &Site, names: &BTreeSet<String>) -> Result<BTreeSet<RoleId>> {
    if names.is_empty() {
        return Ok(BTreeSet::new());
    }
    let known = site.user_roles()?;
    names
        .iter()
        .map(|name| {
            known
                .get(name)
                .copied()
                .ok_or_else(|| DriverError::not_found("role", name))
        })
        .collect()
}
