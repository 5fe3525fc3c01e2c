//! Deployment pipeline
//!
//! Composes the managers into the command sequences the CLI exposes. The
//! pipeline holds no state beyond the site configuration it threads
//! through: every run recomputes remote state via probes, so a partially
//! completed `create` resumes from the first unsatisfied step when
//! re-invoked, and `clean` tolerates resources that are already gone.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::cert::CertificateManager;
use crate::config::{SiteConfig, DEFAULT_BRANCH};
use crate::git::GitBridge;
use crate::nginx::ReverseProxyManager;
use crate::paths::SitePaths;
use crate::remote::{sudo_checked, RemoteExecutor, StepOutcome};
use crate::supervisor::ProcessSupervisorManager;
use crate::ui;

pub struct DeploymentPipeline<'a, E: RemoteExecutor> {
    exec: &'a E,
    config: &'a SiteConfig,
    paths: SitePaths,
    project_root: PathBuf,
}

impl<'a, E: RemoteExecutor> DeploymentPipeline<'a, E> {
    pub fn new(
        exec: &'a E,
        config: &'a SiteConfig,
        paths: SitePaths,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            exec,
            config,
            paths,
            project_root: project_root.into(),
        }
    }

    fn git(&self) -> GitBridge<'_, E> {
        GitBridge::new(self.exec, &self.paths, self.project_root.clone())
    }

    fn proxy(&self) -> ReverseProxyManager<'_, E> {
        ReverseProxyManager::new(self.exec, &self.paths)
    }

    fn supervisor(&self) -> ProcessSupervisorManager<'_, E> {
        ProcessSupervisorManager::new(self.exec, &self.paths)
    }

    fn certificates(&self) -> CertificateManager<'_, E> {
        CertificateManager::new(self.exec)
    }

    /// Bring a site from nothing to a running, certified deployment.
    ///
    /// Each step is idempotent; a failure at step N leaves steps 1..N-1
    /// intact and re-running resumes from the first unsatisfied step.
    pub async fn create(&self) -> Result<()> {
        let site = &self.config.site;
        ui::print_header(&format!("Create {site}"));
        info!("Create from scratch");
        let git = self.git();

        info!("━━━ Step 1/9: Local repository ━━━");
        git.ensure_local_repo(&self.config.module)?;

        info!("━━━ Step 2/9: Deploy root ━━━");
        self.ensure_root()?;

        info!("━━━ Step 3/9: Bare repository ━━━");
        git.ensure_bare_repo(site)?;

        info!("━━━ Step 4/9: Work tree ━━━");
        git.ensure_work_tree(site, &self.config.module)?;

        info!("━━━ Step 5/9: Virtualenv ━━━");
        git.ensure_venv(site)?;

        info!("━━━ Step 6/9: Push ━━━");
        git.ensure_remote_tracking(self.config)?;
        self.push_with_spinner(&git, site, false)?;

        info!("━━━ Step 7/9: Reverse proxy ━━━");
        self.proxy().ensure(site, self.config.port).await?;

        info!("━━━ Step 8/9: Supervisor ━━━");
        let supervisor = self.supervisor();
        if supervisor.ensure(self.config).await?.created() {
            info!("Program definition installed");
        }
        supervisor.start(site)?;

        info!("━━━ Step 9/9: Certificate ━━━");
        self.certificates().ensure(site)?;

        ui::print_success(&format!("{site} is deployed"));
        Ok(())
    }

    /// Fast path for iterative updates once `create` has run: commit
    /// everything, push, restart.
    pub async fn deploy(&self, message: &str, remote: Option<&str>, force: bool) -> Result<()> {
        let site = &self.config.site;
        let remote = remote.unwrap_or(site);
        ui::print_header(&format!("Deploy {site}"));
        let git = self.git();
        git.commit_all(message)?;
        self.push_with_spinner(&git, remote, force)?;
        self.supervisor().restart(site)?;
        ui::print_success(&format!("{site} is live"));
        Ok(())
    }

    /// Revert the latest commit, push, restart.
    pub async fn rollback(&self, remote: Option<&str>) -> Result<()> {
        let site = &self.config.site;
        let remote = remote.unwrap_or(site);
        ui::print_header(&format!("Rollback {site}"));
        let git = self.git();
        git.revert_latest()?;
        self.push_with_spinner(&git, remote, false)?;
        self.supervisor().restart(site)?;
        ui::print_success(&format!("{site} rolled back"));
        Ok(())
    }

    pub async fn restart(&self) -> Result<()> {
        self.supervisor().restart(&self.config.site)
    }

    pub async fn status(&self) -> Result<()> {
        let status = self.supervisor().status()?;
        print!("{status}");
        Ok(())
    }

    /// Remove every trace of the site: remote tree, daemon configs, local
    /// remote binding and staging tree. Absent resources are no-ops.
    pub async fn clean(&self) -> Result<()> {
        let site = &self.config.site;
        ui::print_header(&format!("Clean {site}"));
        ui::print_warning(&format!(
            "Removing {site} from {}",
            self.config.deploy_host
        ));
        self.supervisor().stop(site)?;
        sudo_checked(self.exec, &["rm", "-rf", &self.paths.site_dir(site)])?;
        sudo_checked(self.exec, &["rm", "-f", &self.paths.supervisor_conf(site)])?;
        sudo_checked(self.exec, &["rm", "-f", &self.paths.nginx_available(site)])?;
        sudo_checked(self.exec, &["rm", "-f", &self.paths.nginx_enabled(site)])?;
        self.git().remove_remote(site)?;
        let staged = self.paths.staged_site_dir(site);
        if staged.exists() {
            tokio::fs::remove_dir_all(&staged)
                .await
                .with_context(|| format!("Failed to remove {}", staged.display()))?;
        }
        ui::print_success(&format!("{site} cleaned"));
        Ok(())
    }

    pub async fn install_cert(&self) -> Result<()> {
        self.certificates().ensure(&self.config.site)
    }

    /// The deploy root itself is owned by root; everything below it belongs
    /// to the deploy user.
    fn ensure_root(&self) -> Result<StepOutcome> {
        let root = self.paths.root();
        if self.exec.path_exists(root)? {
            info!("{} exists", root);
            return Ok(StepOutcome::AlreadyPresent);
        }
        let owner = format!("{0}:{0}", self.config.deploy_user);
        sudo_checked(self.exec, &["mkdir", "-p", root])?;
        sudo_checked(self.exec, &["chown", &owner, root])?;
        Ok(StepOutcome::Created)
    }

    fn push_with_spinner(&self, git: &GitBridge<'_, E>, remote: &str, force: bool) -> Result<()> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message(format!("Pushing {DEFAULT_BRANCH} to {remote}..."));
        pb.enable_steady_tick(Duration::from_millis(100));
        let result = git.push(remote, force);
        match &result {
            Ok(()) => pb.finish_with_message(format!("Pushed {DEFAULT_BRANCH} to {remote}")),
            Err(_) => pb.finish_and_clear(),
        }
        result
    }
}

/// One-shot install of everything a fresh deploy host needs. No decision
/// logic; apt resolves what is already present.
pub async fn install_packages<E: RemoteExecutor>(exec: &E) -> Result<()> {
    info!("Installing system packages");
    sudo_checked(exec, &["apt-get", "update"])?;
    sudo_checked(
        exec,
        &[
            "apt-get",
            "install",
            "-y",
            "python3",
            "python3-pip",
            "python3-venv",
            "nginx",
            "supervisor",
            "git",
            "certbot",
            "python3-certbot-nginx",
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::remote::testing::RecordingExecutor;

    fn config() -> SiteConfig {
        SiteConfig::new(
            "foo.bar".to_string(),
            "app".to_string(),
            "app".to_string(),
            9000,
            "www".to_string(),
            "deployhost".to_string(),
            Backend::Gunicorn,
        )
        .unwrap()
    }

    /// Project checkout fixture: a committed-looking repository the local
    /// git commands are scripted against.
    fn project_fixture(exec: &RecordingExecutor) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let root = dir.path().to_string_lossy().to_string();
        // Fresh remote: the tracking binding does not exist yet.
        exec.script(
            &format!("local: git -C {root} remote get-url foo.bar"),
            RecordingExecutor::failed(2),
        );
        (dir, root)
    }

    fn pipeline<'a>(
        exec: &'a RecordingExecutor,
        config: &'a SiteConfig,
        dir: &tempfile::TempDir,
    ) -> DeploymentPipeline<'a, RecordingExecutor> {
        let paths = SitePaths::new("/www", dir.path().join("sites"));
        DeploymentPipeline::new(exec, config, paths, dir.path())
    }

    fn position(calls: &[String], needle: &str) -> usize {
        calls
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("missing call: {needle}"))
    }

    #[tokio::test]
    async fn test_fresh_bootstrap_sequence() {
        let exec = RecordingExecutor::new();
        let cfg = config();
        let (dir, root) = project_fixture(&exec);

        pipeline(&exec, &cfg, &dir).create().await.unwrap();

        let calls = exec.commands();
        let init = position(&calls, "run: git init --bare /www/sites/foo.bar/git");
        let hook = position(&calls, "put: /www/sites/foo.bar/git/hooks/post-receive");
        let venv = position(&calls, "run: python3 -m venv /www/sites/foo.bar/venv");
        let push = position(&calls, &format!("local: git -C {root} push foo.bar main"));
        let nginx = position(&calls, "sudo: mv /tmp/foo.bar /etc/nginx/sites-available/foo.bar");
        let conf = position(
            &calls,
            "sudo: mv /tmp/foo.bar.conf /etc/supervisor/conf.d/foo.bar.conf",
        );
        let start = position(&calls, "sudo: supervisorctl start foo.bar");
        let cert = position(&calls, "sudo: certbot --nginx -d foo.bar -n");
        assert!(init < hook && hook < venv && venv < push);
        assert!(push < nginx && nginx < conf && conf < start && start < cert);

        // Uploaded artifacts carry the site's port and work tree
        let uploads = exec.uploads.borrow();
        let hook_body = &uploads
            .iter()
            .find(|(_, remote)| remote.ends_with("post-receive"))
            .unwrap()
            .0;
        assert!(hook_body.contains("GIT_WORK_TREE=/www/sites/foo.bar/src"));
        assert!(uploads
            .iter()
            .any(|(content, _)| content.contains("proxy_pass http://localhost:9000;")));
        assert!(uploads
            .iter()
            .any(|(content, _)| content.contains("-b localhost:9000")));
    }

    #[tokio::test]
    async fn test_create_resumes_past_existing_bare_repo() {
        let exec = RecordingExecutor::new();
        exec.mark_existing("/www/sites/foo.bar/git");
        let cfg = config();
        let (dir, _root) = project_fixture(&exec);

        pipeline(&exec, &cfg, &dir).create().await.unwrap();

        let calls = exec.commands();
        assert!(!calls.iter().any(|c| c.contains("git init --bare")));
        // Later unsatisfied steps still run
        assert!(calls
            .iter()
            .any(|c| c.contains("run: python3 -m venv /www/sites/foo.bar/venv")));
        assert!(calls
            .iter()
            .any(|c| c.contains("sudo: supervisorctl start foo.bar")));
    }

    #[tokio::test]
    async fn test_create_rerun_on_converged_host_only_probes() {
        let exec = RecordingExecutor::new();
        for path in [
            "/www",
            "/www/sites/foo.bar/git",
            "/www/sites/foo.bar/src",
            "/www/sites/foo.bar/venv",
            "/etc/nginx/sites-enabled/foo.bar",
            "/etc/supervisor/conf.d/foo.bar.conf",
        ] {
            exec.mark_existing(path);
        }
        let cfg = config();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        // Tracking remote already bound: get-url succeeds by default.

        pipeline(&exec, &cfg, &dir).create().await.unwrap();

        let calls = exec.commands();
        for absent in [
            "git init --bare",
            "mkdir -p /www",
            "python3 -m venv",
            "sudo: touch",
            "ln -s ",
            "remote add",
            "supervisorctl reread",
        ] {
            assert!(
                !calls.iter().any(|c| c.contains(absent)),
                "unexpected mutation on converged host: {absent}"
            );
        }
    }

    #[tokio::test]
    async fn test_clean_removes_all_well_known_paths() {
        let exec = RecordingExecutor::new();
        let cfg = config();
        let dir = tempfile::tempdir().unwrap();
        let paths = SitePaths::new("/www", dir.path().join("sites"));
        let staged = paths.staged_nginx("foo.bar");
        std::fs::create_dir_all(staged.parent().unwrap()).unwrap();
        std::fs::write(&staged, "server {}\n").unwrap();
        let pipeline = DeploymentPipeline::new(&exec, &cfg, paths, dir.path());

        pipeline.clean().await.unwrap();

        let calls = exec.commands();
        for removal in [
            "sudo: rm -rf /www/sites/foo.bar",
            "sudo: rm -f /etc/supervisor/conf.d/foo.bar.conf",
            "sudo: rm -f /etc/nginx/sites-available/foo.bar",
            "sudo: rm -f /etc/nginx/sites-enabled/foo.bar",
        ] {
            assert!(
                calls.contains(&removal.to_string()),
                "missing removal: {removal}"
            );
        }
        // Local staging tree is gone too
        assert!(!dir.path().join("sites/foo.bar").exists());
    }

    #[tokio::test]
    async fn test_clean_on_empty_host_is_noop() {
        let exec = RecordingExecutor::new();
        exec.script(
            "sudo: supervisorctl status foo.bar",
            RecordingExecutor::failed(4),
        );
        let cfg = config();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&exec, &cfg, &dir);

        // Nothing exists anywhere; every removal must still succeed.
        pipeline.clean().await.unwrap();

        assert!(!exec
            .commands()
            .contains(&"sudo: supervisorctl stop foo.bar".to_string()));
    }

    #[tokio::test]
    async fn test_deploy_commits_pushes_then_restarts() {
        let exec = RecordingExecutor::new();
        let cfg = config();
        let (dir, root) = project_fixture(&exec);
        exec.script(
            &format!("local: git -C {root} status --porcelain"),
            RecordingExecutor::ok_with_stdout(" M app.py\n"),
        );
        exec.script(
            "sudo: supervisorctl status foo.bar",
            RecordingExecutor::ok_with_stdout("foo.bar  RUNNING  pid 7, uptime 0:10:00\n"),
        );

        pipeline(&exec, &cfg, &dir)
            .deploy("tweak the header", None, false)
            .await
            .unwrap();

        let calls = exec.commands();
        let commit = position(&calls, "commit -m tweak the header");
        let push = position(&calls, &format!("local: git -C {root} push foo.bar main"));
        let stop = position(&calls, "sudo: supervisorctl stop foo.bar");
        let start = position(&calls, "sudo: supervisorctl start foo.bar");
        assert!(commit < push && push < stop && stop < start);
    }

    #[tokio::test]
    async fn test_install_packages_is_one_shot() {
        let exec = RecordingExecutor::new();
        install_packages(&exec).await.unwrap();
        let calls = exec.commands();
        assert_eq!(calls[0], "sudo: apt-get update");
        assert!(calls[1].starts_with("sudo: apt-get install -y"));
        assert!(calls[1].contains("supervisor"));
    }
}
