//! Path derivation for deployment artifacts
//!
//! Centralized path construction: every remote path is a pure function of
//! the deploy root and the site name, so the same invocation always
//! addresses the same resources. The local staging tree mirrors the remote
//! `/etc` layout under `sites/<site>/`.

use std::path::PathBuf;

pub const NGINX_AVAILABLE_DIR: &str = "/etc/nginx/sites-available";
pub const NGINX_ENABLED_DIR: &str = "/etc/nginx/sites-enabled";
pub const SUPERVISOR_CONF_DIR: &str = "/etc/supervisor/conf.d";

/// Paths for one site: the remote layout under the deploy root plus the
/// local staging tree rendered config files are written to before upload.
#[derive(Debug, Clone)]
pub struct SitePaths {
    root: String,
    staging_root: PathBuf,
}

impl SitePaths {
    pub fn new(root: impl Into<String>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging_root: staging_root.into(),
        }
    }

    /// The deploy root on the remote host
    pub fn root(&self) -> &str {
        &self.root
    }

    // ========================================================================
    // Remote layout: {root}/sites/{site}/...
    // ========================================================================

    pub fn site_dir(&self, site: &str) -> String {
        format!("{}/sites/{}", self.root, site)
    }

    /// Bare repository receiving pushes
    pub fn git_dir(&self, site: &str) -> String {
        format!("{}/git", self.site_dir(site))
    }

    /// Working tree the post-receive hook checks pushes out into
    pub fn work_tree(&self, site: &str) -> String {
        format!("{}/src", self.site_dir(site))
    }

    pub fn venv_dir(&self, site: &str) -> String {
        format!("{}/venv", self.site_dir(site))
    }

    pub fn post_receive_hook(&self, site: &str) -> String {
        format!("{}/hooks/post-receive", self.git_dir(site))
    }

    pub fn envrc(&self, site: &str) -> String {
        format!("{}/.envrc", self.site_dir(site))
    }

    pub fn requirements(&self, site: &str) -> String {
        format!("{}/requirements.txt", self.site_dir(site))
    }

    /// Symlink nginx serves static assets from
    pub fn static_link(&self, site: &str) -> String {
        format!("{}/static", self.site_dir(site))
    }

    // ========================================================================
    // Remote daemon configuration directories
    // ========================================================================

    pub fn nginx_available(&self, site: &str) -> String {
        format!("{NGINX_AVAILABLE_DIR}/{site}")
    }

    pub fn nginx_enabled(&self, site: &str) -> String {
        format!("{NGINX_ENABLED_DIR}/{site}")
    }

    /// The distribution's default site, removed on first configure
    pub fn nginx_default_enabled(&self) -> String {
        format!("{NGINX_ENABLED_DIR}/default")
    }

    pub fn supervisor_conf(&self, site: &str) -> String {
        format!("{SUPERVISOR_CONF_DIR}/{site}.conf")
    }

    // ========================================================================
    // Local staging tree: sites/{site}/etc/...
    // ========================================================================

    pub fn staged_site_dir(&self, site: &str) -> PathBuf {
        self.staging_root.join(site)
    }

    pub fn staged_nginx(&self, site: &str) -> PathBuf {
        self.staged_site_dir(site)
            .join("etc/nginx/sites-available")
            .join(site)
    }

    pub fn staged_supervisor(&self, site: &str) -> PathBuf {
        self.staged_site_dir(site)
            .join("etc/supervisor/conf.d")
            .join(format!("{site}.conf"))
    }
}
