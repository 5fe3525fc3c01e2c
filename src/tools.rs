//! Runtime tool path resolution
//!
//! Each local binary shipway drives can be overridden with a `{TOOL}_BIN`
//! environment variable (e.g. `GIT_BIN=/opt/git/bin/git`), falling back to
//! PATH-based invocation. Overriding the envvar is also how tests point a
//! tool at a stub.

use std::env;

use anyhow::{bail, Result};

pub const GIT: &str = "git";
pub const SSH: &str = "ssh";
pub const SCP: &str = "scp";

/// Get the path to an external tool.
///
/// Checks the `{TOOL}_BIN` environment variable (uppercase tool name +
/// `_BIN`) and falls back to the tool name itself, which relies on PATH.
pub fn get_tool_path(tool: &str) -> String {
    let env_var = format!("{}_BIN", tool.to_uppercase());
    env::var(&env_var).unwrap_or_else(|_| tool.to_string())
}

/// Verify the local binaries a deployment needs before any remote work
/// starts, so a missing tool fails the command up front rather than halfway
/// through a pipeline.
pub fn preflight() -> Result<()> {
    for tool in [GIT, SSH, SCP] {
        let resolved = get_tool_path(tool);
        if which::which(&resolved).is_err() {
            bail!(
                "Required tool not found: {} (install it or set {}_BIN)",
                resolved,
                tool.to_uppercase()
            );
        }
    }
    Ok(())
}
