//! Process supervisor reconciliation and control
//!
//! The program definition file is existence-gated: an already-installed
//! site keeps its definition until `clean` removes it. Control-plane
//! operations go through supervisorctl.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::SiteConfig;
use crate::paths::SitePaths;
use crate::remote::{install_file, sudo_checked, RemoteExecutor, StepOutcome};
use crate::render;

pub struct ProcessSupervisorManager<'a, E: RemoteExecutor> {
    exec: &'a E,
    paths: &'a SitePaths,
}

impl<'a, E: RemoteExecutor> ProcessSupervisorManager<'a, E> {
    pub fn new(exec: &'a E, paths: &'a SitePaths) -> Self {
        Self { exec, paths }
    }

    /// Install the program definition if it is not already on the host.
    pub async fn ensure(&self, config: &SiteConfig) -> Result<StepOutcome> {
        let conf = self.paths.supervisor_conf(&config.site);
        if self.exec.path_exists(&conf)? {
            info!("{} already exists", conf);
            return Ok(StepOutcome::AlreadyPresent);
        }
        let staged = self.stage(config).await?;
        install_file(self.exec, &staged, &conf)?;
        self.reload()?;
        Ok(StepOutcome::Created)
    }

    /// Pick up definition changes: update must follow reread.
    pub fn reload(&self) -> Result<()> {
        sudo_checked(self.exec, &["supervisorctl", "reread"])?;
        sudo_checked(self.exec, &["supervisorctl", "update"])?;
        Ok(())
    }

    pub fn start(&self, site: &str) -> Result<()> {
        info!("Start app");
        sudo_checked(self.exec, &["supervisorctl", "start", site])?;
        Ok(())
    }

    /// Stop the program if it is running. supervisorctl exits non-zero for
    /// unknown or already-stopped programs, so only a RUNNING program gets
    /// an explicit stop.
    pub fn stop(&self, site: &str) -> Result<()> {
        let status = self.exec.sudo(&["supervisorctl", "status", site])?;
        if status.stdout.contains("RUNNING") {
            sudo_checked(self.exec, &["supervisorctl", "stop", site])?;
        } else {
            info!("{} is not running", site);
        }
        Ok(())
    }

    /// Stop, reload, start — as separate steps so a changed definition file
    /// is picked up in between.
    pub fn restart(&self, site: &str) -> Result<()> {
        self.stop(site)?;
        self.reload()?;
        self.start(site)
    }

    pub fn status(&self) -> Result<String> {
        let out = self.exec.sudo(&["supervisorctl", "status"])?;
        Ok(out.stdout)
    }

    /// Render the program section into the local staging tree
    async fn stage(&self, config: &SiteConfig) -> Result<PathBuf> {
        let staged = self.paths.staged_supervisor(&config.site);
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&staged, render::supervisor_program(config, self.paths))
            .await
            .with_context(|| format!("Failed to write {}", staged.display()))?;
        Ok(staged)
    }
}
