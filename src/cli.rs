//! CLI definitions for shipway
//!
//! All argument parsing structures, using clap. Defaults come from
//! environment variables so a project can pin its deployment target in the
//! environment and override per invocation.

use clap::{Args, Parser, Subcommand};

use crate::config::Backend;

#[derive(Parser)]
#[command(
    name = "shipway",
    version,
    about = "Push-to-deploy orchestrator for single-host web applications",
    long_about = "Brings a web application from nothing to a running, HTTPS-served site \
                  on a single host: bare git repository, work tree, virtualenv, nginx, \
                  supervisor and certificate.\nEvery step is idempotent and safe to re-run."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct SiteArgs {
    /// Site identifier; doubles as hostname, git remote name, nginx file
    /// name and supervisor program name
    pub site: String,

    /// Importable module exposing the application
    #[arg(long, env = "APP_MODULE", default_value = "flask_project")]
    pub module: String,

    /// Callable inside the module that serves the app
    #[arg(long, env = "APP_ENTRYPOINT", default_value = "app")]
    pub app: String,

    /// Local port the app process binds to (unique per host)
    #[arg(short, long, env = "PORT", default_value_t = 9000)]
    pub port: u16,

    /// SSH user on the deploy host
    #[arg(long = "user", env = "DEPLOY_USER", default_value = "user")]
    pub deploy_user: String,

    /// Host to deploy to
    #[arg(long = "host", env = "DEPLOY_HOST", default_value = "deployhost")]
    pub deploy_host: String,

    /// App server the supervisor program runs
    #[arg(long, value_enum, default_value_t = Backend::Gunicorn)]
    pub backend: Backend,

    /// Root directory for deployments on the host
    #[arg(long, env = "DEPLOY_ROOT", default_value = "/home/www")]
    pub root: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision a site from scratch (idempotent; safe to re-run)
    Create {
        #[command(flatten)]
        site: SiteArgs,
    },

    /// Commit local changes, push to the site and restart the app
    Deploy {
        #[command(flatten)]
        site: SiteArgs,

        /// Commit message for the deployed change
        #[arg(short, long)]
        message: String,

        /// Git remote to push to (defaults to the site name)
        #[arg(long)]
        remote: Option<String>,

        /// Force-push the branch
        #[arg(long)]
        force: bool,
    },

    /// Revert the latest commit, push and restart the app
    Rollback {
        #[command(flatten)]
        site: SiteArgs,

        /// Git remote to push to (defaults to the site name)
        #[arg(long)]
        remote: Option<String>,
    },

    /// Stop and start the app, picking up program definition changes
    Restart {
        #[command(flatten)]
        site: SiteArgs,
    },

    /// Show supervisor status on the deploy host
    Status {
        #[command(flatten)]
        site: SiteArgs,
    },

    /// Remove every trace of a site from the host and the local checkout
    Clean {
        #[command(flatten)]
        site: SiteArgs,
    },

    /// Request and install a TLS certificate for the site
    InstallCert {
        #[command(flatten)]
        site: SiteArgs,
    },

    /// One-shot install of the system packages a deploy host needs
    InstallPackages {
        /// SSH user on the deploy host
        #[arg(long = "user", env = "DEPLOY_USER", default_value = "user")]
        deploy_user: String,

        /// Host to deploy to
        #[arg(long = "host", env = "DEPLOY_HOST", default_value = "deployhost")]
        deploy_host: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_parses_with_defaults() {
        let cli = Cli::try_parse_from(["shipway", "create", "foo.bar"]).unwrap();
        match cli.command {
            Commands::Create { site } => {
                assert_eq!(site.site, "foo.bar");
                assert_eq!(site.app, "app");
                assert_eq!(site.backend, Backend::Gunicorn);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_deploy_requires_message() {
        assert!(Cli::try_parse_from(["shipway", "deploy", "foo.bar"]).is_err());
        let cli = Cli::try_parse_from([
            "shipway", "deploy", "foo.bar", "-m", "fix the header", "--force",
        ])
        .unwrap();
        match cli.command {
            Commands::Deploy { message, force, .. } => {
                assert_eq!(message, "fix the header");
                assert!(force);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_backend_override() {
        let cli = Cli::try_parse_from([
            "shipway", "create", "foo.bar", "--backend", "uvicorn", "--port", "8001",
        ])
        .unwrap();
        match cli.command {
            Commands::Create { site } => {
                assert_eq!(site.backend, Backend::Uvicorn);
                assert_eq!(site.port, 8001);
            }
            _ => panic!("expected create"),
        }
    }
}
