//! TLS certificate installation
//!
//! One non-interactive certbot invocation against the already-configured
//! nginx site. Failures are reported to the operator, not retried; the
//! command is safe to re-run.

use anyhow::Result;
use tracing::info;

use crate::remote::{sudo_checked, RemoteExecutor};

pub struct CertificateManager<'a, E: RemoteExecutor> {
    exec: &'a E,
}

impl<'a, E: RemoteExecutor> CertificateManager<'a, E> {
    pub fn new(exec: &'a E) -> Self {
        Self { exec }
    }

    /// Request and install a certificate for the site's hostname
    pub fn ensure(&self, site: &str) -> Result<()> {
        info!("Install cert");
        sudo_checked(self.exec, &["certbot", "--nginx", "-d", site, "-n"])?;
        Ok(())
    }
}
