use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info_span, Instrument};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cert;
mod cli;
mod config;
mod error;
mod git;
mod nginx;
mod paths;
mod pipeline;
mod remote;
mod render;
mod supervisor;
mod tools;
mod ui;

use cli::{Cli, Commands, SiteArgs};
use config::SiteConfig;
use paths::SitePaths;
use pipeline::DeploymentPipeline;
use remote::SshExecutor;

/// File-backed log, truncated each run
const LOG_FILE: &str = "deploy.log";

/// Local directory rendered config files are staged under before upload
const STAGING_DIR: &str = "sites";

fn init_logging(verbose: bool) -> Result<()> {
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| {
            if verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    let log_file = std::fs::File::create(LOG_FILE)
        .with_context(|| format!("Failed to create {LOG_FILE}"))?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .without_time(),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(log_file)),
        )
        .init();
    Ok(())
}

fn assemble(args: &SiteArgs) -> Result<(SiteConfig, SitePaths)> {
    let config = SiteConfig::new(
        args.site.clone(),
        args.module.clone(),
        args.app.clone(),
        args.port,
        args.deploy_user.clone(),
        args.deploy_host.clone(),
        args.backend,
    )?;
    let paths = SitePaths::new(args.root.clone(), STAGING_DIR);
    Ok((config, paths))
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Create { site } => {
            let (config, paths) = assemble(&site)?;
            let exec = SshExecutor::new(&config.deploy_user, &config.deploy_host);
            DeploymentPipeline::new(&exec, &config, paths, ".")
                .create()
                .instrument(info_span!("create"))
                .await
        }
        Commands::Deploy {
            site,
            message,
            remote,
            force,
        } => {
            let (config, paths) = assemble(&site)?;
            let exec = SshExecutor::new(&config.deploy_user, &config.deploy_host);
            DeploymentPipeline::new(&exec, &config, paths, ".")
                .deploy(&message, remote.as_deref(), force)
                .instrument(info_span!("deploy"))
                .await
        }
        Commands::Rollback { site, remote } => {
            let (config, paths) = assemble(&site)?;
            let exec = SshExecutor::new(&config.deploy_user, &config.deploy_host);
            DeploymentPipeline::new(&exec, &config, paths, ".")
                .rollback(remote.as_deref())
                .instrument(info_span!("rollback"))
                .await
        }
        Commands::Restart { site } => {
            let (config, paths) = assemble(&site)?;
            let exec = SshExecutor::new(&config.deploy_user, &config.deploy_host);
            DeploymentPipeline::new(&exec, &config, paths, ".")
                .restart()
                .instrument(info_span!("restart"))
                .await
        }
        Commands::Status { site } => {
            let (config, paths) = assemble(&site)?;
            let exec = SshExecutor::new(&config.deploy_user, &config.deploy_host);
            DeploymentPipeline::new(&exec, &config, paths, ".")
                .status()
                .instrument(info_span!("status"))
                .await
        }
        Commands::Clean { site } => {
            let (config, paths) = assemble(&site)?;
            let exec = SshExecutor::new(&config.deploy_user, &config.deploy_host);
            DeploymentPipeline::new(&exec, &config, paths, ".")
                .clean()
                .instrument(info_span!("clean"))
                .await
        }
        Commands::InstallCert { site } => {
            let (config, paths) = assemble(&site)?;
            let exec = SshExecutor::new(&config.deploy_user, &config.deploy_host);
            DeploymentPipeline::new(&exec, &config, paths, ".")
                .install_cert()
                .instrument(info_span!("install-cert"))
                .await
        }
        Commands::InstallPackages {
            deploy_user,
            deploy_host,
        } => {
            let exec = SshExecutor::new(&deploy_user, &deploy_host);
            pipeline::install_packages(&exec)
                .instrument(info_span!("install-packages"))
                .await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    tools::preflight()?;

    let result = dispatch(cli.command).await;
    if let Err(e) = result {
        error!("Deployment step failed: {:#}", e);
        ui::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
