//! Site configuration
//!
//! One `SiteConfig` is assembled per invocation from CLI flags and
//! environment-variable defaults, validated once, and treated as read-only
//! by every manager it is handed to.

use clap::ValueEnum;

use crate::error::ConfigError;

/// Branch used for local init, the post-receive hook and every push.
///
/// The hook checks out exactly this branch into the work tree; a mismatch
/// between the pushed branch and the hook makes checkouts silently do
/// nothing, so one name is applied uniformly.
pub const DEFAULT_BRANCH: &str = "main";

/// Process-supervision command template for the application server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// WSGI application served by gunicorn
    Gunicorn,
    /// ASGI application served by uvicorn
    Uvicorn,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::Gunicorn => "gunicorn",
            Backend::Uvicorn => "uvicorn",
        })
    }
}

/// Identifies one deployable site.
///
/// The site name doubles as the hostname, the supervisor program name, the
/// nginx file name and the git remote name.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub site: String,
    pub module: String,
    pub app: String,
    pub port: u16,
    pub deploy_user: String,
    pub deploy_host: String,
    pub backend: Backend,
}

impl SiteConfig {
    pub fn new(
        site: String,
        module: String,
        app: String,
        port: u16,
        deploy_user: String,
        deploy_host: String,
        backend: Backend,
    ) -> Result<Self, ConfigError> {
        validate_site_name(&site)?;
        if deploy_host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "deploy host".to_string(),
            });
        }
        if deploy_user.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "deploy user".to_string(),
            });
        }
        Ok(Self {
            site,
            module,
            app,
            port,
            deploy_user,
            deploy_host,
            backend,
        })
    }
}

/// The site name lands in filesystem paths, hostnames and supervisor
/// program names, so it is restricted to the intersection of what all
/// three accept.
fn validate_site_name(site: &str) -> Result<(), ConfigError> {
    let starts_ok = site
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    let chars_ok = site
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !starts_ok || !chars_ok {
        return Err(ConfigError::InvalidSiteName {
            site: site.to_string(),
        });
    }
    Ok(())
}
