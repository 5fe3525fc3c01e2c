//! Reverse proxy reconciliation
//!
//! nginx tracks a site as two independent resources: the config file in
//! sites-available and the activation symlink in sites-enabled. Only the
//! symlink is probed; the config content is staged and re-uploaded on every
//! run so the two can never drift apart.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::paths::SitePaths;
use crate::remote::{install_file, sudo_checked, RemoteExecutor};
use crate::render;

pub struct ReverseProxyManager<'a, E: RemoteExecutor> {
    exec: &'a E,
    paths: &'a SitePaths,
}

impl<'a, E: RemoteExecutor> ReverseProxyManager<'a, E> {
    pub fn new(exec: &'a E, paths: &'a SitePaths) -> Self {
        Self { exec, paths }
    }

    /// Bring the site's proxy config to the desired state and reload nginx.
    pub async fn ensure(&self, site: &str, port: u16) -> Result<()> {
        sudo_checked(self.exec, &["/etc/init.d/nginx", "start"])?;
        self.disable_default()?;

        let available = self.paths.nginx_available(site);
        let enabled = self.paths.nginx_enabled(site);
        if self.exec.path_exists(&enabled)? {
            info!("{} already enabled", site);
        } else {
            info!("Enabling site: {}", site);
            sudo_checked(self.exec, &["touch", &available])?;
            sudo_checked(self.exec, &["ln", "-s", &available, &enabled])?;
        }

        let staged = self.stage(site, port).await?;
        install_file(self.exec, &staged, &available)?;
        self.restart()?;
        Ok(())
    }

    /// Drop the distribution's default site so it cannot shadow ours
    pub fn disable_default(&self) -> Result<()> {
        let default = self.paths.nginx_default_enabled();
        if self.exec.path_exists(&default)? {
            sudo_checked(self.exec, &["rm", &default])?;
        }
        Ok(())
    }

    pub fn restart(&self) -> Result<()> {
        sudo_checked(self.exec, &["/etc/init.d/nginx", "restart"])?;
        Ok(())
    }

    /// Render the server block into the local staging tree
    async fn stage(&self, site: &str, port: u16) -> Result<PathBuf> {
        let staged = self.paths.staged_nginx(site);
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&staged, render::nginx_site(site, self.paths.root(), port))
            .await
            .with_context(|| format!("Failed to write {}", staged.display()))?;
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingExecutor;

    fn paths_in(dir: &std::path::Path) -> SitePaths {
        SitePaths::new("/www", dir.join("sites"))
    }

    #[tokio::test]
    async fn test_ensure_fresh_site_enables_and_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let exec = RecordingExecutor::new();
        let p = paths_in(dir.path());
        let proxy = ReverseProxyManager::new(&exec, &p);

        proxy.ensure("foo.bar", 9000).await.unwrap();

        let calls = exec.commands();
        assert_eq!(calls[0], "sudo: /etc/init.d/nginx start");
        assert!(calls.contains(&"sudo: touch /etc/nginx/sites-available/foo.bar".to_string()));
        assert!(calls.contains(
            &"sudo: ln -s /etc/nginx/sites-available/foo.bar /etc/nginx/sites-enabled/foo.bar"
                .to_string()
        ));
        assert!(calls.contains(
            &"sudo: mv /tmp/foo.bar /etc/nginx/sites-available/foo.bar".to_string()
        ));
        assert_eq!(calls.last().unwrap(), "sudo: /etc/init.d/nginx restart");
        // Uploaded content proxies to the configured port
        assert!(exec.uploads.borrow()[0]
            .0
            .contains("proxy_pass http://localhost:9000;"));
    }

    #[tokio::test]
    async fn test_ensure_enabled_site_skips_symlink_but_reuploads() {
        let dir = tempfile::tempdir().unwrap();
        let exec = RecordingExecutor::new();
        exec.mark_existing("/etc/nginx/sites-enabled/foo.bar");
        let p = paths_in(dir.path());
        let proxy = ReverseProxyManager::new(&exec, &p);

        proxy.ensure("foo.bar", 9000).await.unwrap();

        let calls = exec.commands();
        assert!(!calls.iter().any(|c| c.starts_with("sudo: touch")));
        assert!(!calls.iter().any(|c| c.starts_with("sudo: ln -s")));
        // Content still lands even when the link is already in place
        assert!(calls.contains(
            &"sudo: mv /tmp/foo.bar /etc/nginx/sites-available/foo.bar".to_string()
        ));
    }

    #[tokio::test]
    async fn test_default_site_removed_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let exec = RecordingExecutor::new();
        let p = paths_in(dir.path());
        let proxy = ReverseProxyManager::new(&exec, &p);

        proxy.disable_default().unwrap();
        assert!(!exec
            .commands()
            .iter()
            .any(|c| c.starts_with("sudo: rm")));

        exec.mark_existing("/etc/nginx/sites-enabled/default");
        proxy.disable_default().unwrap();
        assert!(exec
            .commands()
            .contains(&"sudo: rm /etc/nginx/sites-enabled/default".to_string()));
    }
}
