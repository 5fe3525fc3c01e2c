//! Local repository management and the push-to-deploy bare repository
//!
//! The local side runs the system git binary against the project checkout;
//! the remote side reconciles a bare repository whose post-receive hook
//! checks pushes out into the site's work tree. Local git goes through the
//! executor's `local` channel so the same seams cover both sides.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{SiteConfig, DEFAULT_BRANCH};
use crate::error::GitError;
use crate::paths::SitePaths;
use crate::remote::{put_content, run_checked, ExecOutput, RemoteExecutor, StepOutcome};
use crate::tools::{self, get_tool_path};

/// Seed ignore list for a fresh project repository: build artifacts,
/// secrets, and this tool's own output.
const IGNORE_SEED: &str = "target/\nsites/\ndeploy.log\n.env\n*.pyc\n__pycache__/\n";

pub struct GitBridge<'a, E: RemoteExecutor> {
    exec: &'a E,
    paths: &'a SitePaths,
    project_root: PathBuf,
}

impl<'a, E: RemoteExecutor> GitBridge<'a, E> {
    pub fn new(exec: &'a E, paths: &'a SitePaths, project_root: impl Into<PathBuf>) -> Self {
        Self {
            exec,
            paths,
            project_root: project_root.into(),
        }
    }

    /// Run git against the project checkout
    fn git(&self, args: &[&str]) -> Result<ExecOutput> {
        let git = get_tool_path(tools::GIT);
        let root = self.project_root.to_string_lossy();
        let mut argv: Vec<&str> = vec![git.as_str(), "-C", root.as_ref()];
        argv.extend_from_slice(args);
        Ok(self.exec.local(&argv)?)
    }

    fn git_checked(&self, args: &[&str]) -> Result<ExecOutput> {
        let out = self.git(args)?;
        if !out.success() {
            if !out.stderr.trim().is_empty() {
                debug!("git stderr: {}", out.stderr.trim());
            }
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                status: out.status,
            }
            .into());
        }
        Ok(out)
    }

    // ========================================================================
    // Local repository
    // ========================================================================

    /// Make sure the project checkout is a committed git repository.
    ///
    /// A missing repository is initialized with a seeded ignore list and an
    /// initial commit of the known project files. Either way, a dirty
    /// working tree aborts here, before any remote command is issued.
    pub fn ensure_local_repo(&self, module: &str) -> Result<()> {
        if self.project_root.join(".git").is_dir() {
            return self.assert_clean_workdir();
        }
        info!("Initializing local repository");
        self.git_checked(&["init", "--initial-branch", DEFAULT_BRANCH, "."])?;
        let ignore = self.project_root.join(".gitignore");
        if !ignore.exists() {
            fs::write(&ignore, IGNORE_SEED).context("Failed to write .gitignore")?;
        }
        // Stage only the known project files that are actually on disk.
        for candidate in [module, "requirements.txt", "config.py", ".gitignore"] {
            if self.project_root.join(candidate).exists() {
                self.git_checked(&["add", candidate])?;
            }
        }
        self.git_checked(&["commit", "-m", "initial commit"])?;
        self.assert_clean_workdir()
    }

    /// Refuse to touch the remote with uncommitted local changes.
    ///
    /// Untracked files are not counted; only modifications to tracked
    /// content can silently diverge from what a push would deploy.
    pub fn assert_clean_workdir(&self) -> Result<()> {
        let status = self.git(&["status", "--porcelain", "--untracked-files=no"])?;
        if !status.success() {
            return Err(GitError::NotARepository.into());
        }
        if !status.stdout.trim().is_empty() {
            return Err(GitError::DirtyWorkingTree.into());
        }
        Ok(())
    }

    // ========================================================================
    // Remote repository
    // ========================================================================

    /// Set up the bare repository that receives pushes, with its
    /// post-receive hook checking the default branch out into the work tree.
    pub fn ensure_bare_repo(&self, site: &str) -> Result<StepOutcome> {
        let git_dir = self.paths.git_dir(site);
        if self.exec.path_exists(&git_dir)? {
            info!("{} already exists", git_dir);
            return Ok(StepOutcome::AlreadyPresent);
        }
        info!("Creating: {}", git_dir);
        run_checked(self.exec, &["git", "init", "--bare", &git_dir])?;
        let hook_path = self.paths.post_receive_hook(site);
        let hook = post_receive_hook(&self.paths.work_tree(site), DEFAULT_BRANCH);
        put_content(self.exec, &hook, &hook_path)?;
        run_checked(self.exec, &["chmod", "+x", &hook_path])?;
        Ok(StepOutcome::Created)
    }

    /// Create the work tree the hook checks out into, plus the static-asset
    /// symlink nginx serves from.
    pub fn ensure_work_tree(&self, site: &str, module: &str) -> Result<StepOutcome> {
        let work_tree = self.paths.work_tree(site);
        if self.exec.path_exists(&work_tree)? {
            info!("{} exists", work_tree);
            return Ok(StepOutcome::AlreadyPresent);
        }
        run_checked(self.exec, &["mkdir", "-p", &work_tree])?;
        let static_src = format!("{work_tree}/{module}/static");
        run_checked(
            self.exec,
            &["ln", "-sf", &static_src, &self.paths.static_link(site)],
        )?;
        Ok(StepOutcome::Created)
    }

    /// Create the site's virtualenv and install its requirements.
    pub fn ensure_venv(&self, site: &str) -> Result<StepOutcome> {
        let venv = self.paths.venv_dir(site);
        if self.exec.path_exists(&venv)? {
            info!("{} already exists", venv);
            return Ok(StepOutcome::AlreadyPresent);
        }
        info!("Creating virtualenv: {}", venv);
        run_checked(self.exec, &["python3", "-m", "venv", &venv])?;
        let python = format!("{venv}/bin/python");
        run_checked(
            self.exec,
            &[&python, "-m", "pip", "install", "--upgrade", "pip", "setuptools"],
        )?;
        let local_requirements = self.project_root.join("requirements.txt");
        if local_requirements.exists() {
            let remote_requirements = self.paths.requirements(site);
            self.exec.put(&local_requirements, &remote_requirements)?;
            run_checked(
                self.exec,
                &[&python, "-m", "pip", "install", "-r", &remote_requirements],
            )?;
        }
        // Shell convenience for operating the site over a plain login.
        let envrc = format!(
            "source {venv}/bin/activate\nexport GIT_DIR={}\nexport GIT_WORK_TREE={}\n",
            self.paths.git_dir(site),
            self.paths.work_tree(site)
        );
        put_content(self.exec, &envrc, &self.paths.envrc(site))?;
        Ok(StepOutcome::Created)
    }

    // ========================================================================
    // Tracking remote
    // ========================================================================

    /// Bind the local repository to the site's bare repository under the
    /// site name. An existing binding is never overwritten.
    pub fn ensure_remote_tracking(&self, config: &SiteConfig) -> Result<StepOutcome> {
        if !self.project_root.join(".git").is_dir() {
            return Err(GitError::NotARepository.into());
        }
        let probe = self.git(&["remote", "get-url", &config.site])?;
        if probe.success() {
            info!("Remote {} exists", config.site);
            return Ok(StepOutcome::AlreadyPresent);
        }
        let url = format!(
            "{}@{}:{}",
            config.deploy_user,
            config.deploy_host,
            self.paths.git_dir(&config.site)
        );
        info!("Adding remote {} -> {}", config.site, url);
        self.git_checked(&["remote", "add", &config.site, &url])?;
        Ok(StepOutcome::Created)
    }

    /// Drop the tracking remote if it is configured
    pub fn remove_remote(&self, site: &str) -> Result<()> {
        if !self.project_root.join(".git").is_dir() {
            return Ok(());
        }
        let probe = self.git(&["remote", "get-url", site])?;
        if !probe.success() {
            info!("Remote {} not configured", site);
            return Ok(());
        }
        self.git_checked(&["remote", "remove", site])?;
        Ok(())
    }

    pub fn push(&self, remote: &str, force: bool) -> Result<()> {
        info!("Push to remote");
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.push(remote);
        args.push(DEFAULT_BRANCH);
        self.git_checked(&args)?;
        Ok(())
    }

    /// Stage and commit everything, skipping the commit when the tree is
    /// already clean.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git_checked(&["add", "-A"])?;
        let status = self.git_checked(&["status", "--porcelain"])?;
        if status.stdout.trim().is_empty() {
            info!("Nothing to commit");
            return Ok(());
        }
        self.git_checked(&["commit", "-m", message])?;
        Ok(())
    }

    /// Revert the tip of the default branch; the caller pushes and restarts.
    pub fn revert_latest(&self) -> Result<()> {
        self.git_checked(&["revert", "--no-edit", DEFAULT_BRANCH])?;
        Ok(())
    }
}

fn post_receive_hook(work_tree: &str, branch: &str) -> String {
    format!(
        "#!/bin/sh\nGIT_WORK_TREE={work_tree} git checkout {branch} --recurse-submodules -f\n"
    )
}
