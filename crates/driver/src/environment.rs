//! Request context for a backend invocation
//!
//! The site expects to be told which host and script it is serving before it
//! can pick its settings directory. Instead of writing that into process-wide
//! state, drivers derive a [`RequestContext`] from the target URI and hand it
//! to the bootstrap.

use cardtest_common::site::settings_path;
use cardtest_common::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use url::Url;

/// URI value meaning "the default site"
pub const DEFAULT_URI: &str = "default";

/// Site directory used when no host-specific directory matches
pub const DEFAULT_CONF_DIR: &str = "default";

const SCRIPT: &str = "/index.php";

/// Request fields the site reads during bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Host, with `:port` when the URI carried an explicit port
    pub http_host: String,
    pub server_port: Option<u16>,
    pub script_name: String,
    pub request_uri: String,
    /// Always loopback
    pub remote_addr: IpAddr,
    /// Unset: the invocation is not an HTTP request
    pub request_method: Option<String>,
    pub server_software: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Derive the context for `uri`, or for the default site when `uri` is
    /// [`DEFAULT_URI`]
    pub fn from_uri(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri == DEFAULT_URI {
            return Ok(Self::local(DEFAULT_URI.to_string(), None, SCRIPT.to_string()));
        }

        let with_scheme = if uri.contains("://") {
            uri.to_string()
        } else {
            format!("http://{}", uri)
        };

        let parsed = Url::parse(&with_scheme).map_err(|e| {
            DriverError::Configuration(format!("Invalid site uri \"{}\": {}", uri, e))
        })?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DriverError::Configuration(format!("Site uri \"{}\" has no host", uri)))?;

        // Url drops ports equal to the scheme default; the site still sees them.
        let port = parsed.port().or_else(|| explicit_port(&with_scheme));
        let http_host = match port {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let path = parsed.path().trim_end_matches('/');
        let script_name = if path.is_empty() {
            SCRIPT.to_string()
        } else {
            format!("{}{}", path, SCRIPT)
        };

        Ok(Self::local(http_host, port, script_name))
    }

    fn local(http_host: String, server_port: Option<u16>, script_name: String) -> Self {
        Self {
            http_host,
            server_port,
            request_uri: script_name.clone(),
            script_name,
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            request_method: None,
            server_software: None,
            user_agent: None,
        }
    }

    /// Candidate site directories, most specific first
    ///
    /// The host is split into labels with the port leading
    /// (`8080.www.example.com`), and the script directory is appended with
    /// dots (`.cards`). Host suffixes are tried longest first for each path
    /// prefix, longest path prefix first.
    pub fn conf_dir_candidates(&self) -> Vec<String> {
        let host = self.http_host.trim_end_matches('.');
        let mut host_parts: Vec<&str> = host.split(':').collect();
        host_parts.reverse();
        let server: Vec<&str> = host_parts.iter().flat_map(|part| part.split('.')).collect();

        // Drop the script file itself; a leading "" keeps the joined path
        // starting with a dot.
        let uri: Vec<&str> = self.script_name.split('/').collect();
        let mut candidates = Vec::new();
        for i in (1..uri.len()).rev() {
            let path = uri[..i].join(".");
            for j in (1..=server.len()).rev() {
                let suffix = server[server.len() - j..].join(".");
                candidates.push(format!("{}{}", suffix, path));
            }
        }
        candidates
    }

    /// First candidate directory under `root` holding a settings file,
    /// falling back to [`DEFAULT_CONF_DIR`]
    pub fn conf_dir(&self, root: &Path) -> String {
        self.conf_dir_candidates()
            .into_iter()
            .find(|dir| settings_path(root, dir).is_file())
            .unwrap_or_else(|| DEFAULT_CONF_DIR.to_string())
    }

    /// Settings file the site will load for this request
    pub fn settings_file(&self, root: &Path) -> PathBuf {
        settings_path(root, &self.conf_dir(root))
    }
}

/// Port written in the authority of `uri`, if any
fn explicit_port(uri: &str) -> Option<u16> {
    let rest = uri.split_once("://")?.1;
    let authority = rest.split(|c| c == '/' || c == '?' || c == '#').next()?;
    let host_port = authority.rsplit('@').next()?;
    let (_, port) = host_port.rsplit_once(':')?;
    port.parse().ok()
}
