//! Config file rendering for nginx and supervisor
//!
//! Pure text templating. The output matches the files historical
//! deployments shipped byte for byte, so re-rendering over an existing site
//! never changes what the daemons see.

use crate::config::{Backend, SiteConfig};
use crate::paths::SitePaths;

/// Reverse-proxy server block: `/` forwards to the app's local port,
/// `/static` serves the checked-out static tree straight from disk.
pub fn nginx_site(site: &str, root: &str, port: u16) -> String {
    format!(
        "\
server {{
    server_name {site};
    location / {{
        proxy_pass http://localhost:{port};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
    }}
    location /static {{
        alias  {root}/sites/{site}/static/;
    }}
}}
"
    )
}

/// Supervisor program section running the app server out of the site's
/// virtualenv, in the work tree, as the deploy user.
pub fn supervisor_program(config: &SiteConfig, paths: &SitePaths) -> String {
    let venv_bin = format!("{}/bin", paths.venv_dir(&config.site));
    let command = match config.backend {
        Backend::Gunicorn => format!(
            "{venv_bin}/gunicorn {}:{} -b localhost:{}",
            config.module, config.app, config.port
        ),
        Backend::Uvicorn => format!(
            "{venv_bin}/uvicorn {}:{} --port {}",
            config.module, config.app, config.port
        ),
    };
    format!(
        "\
[program:{program}]
command = {command}
directory = {directory}
user = {user}
",
        program = config.site,
        directory = paths.work_tree(&config.site),
        user = config.deploy_user,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> SitePaths {
        SitePaths::new("/www", "sites")
    }

    fn config(backend: Backend) -> SiteConfig {
        SiteConfig::new(
            "foo.bar".to_string(),
            "baz".to_string(),
            "bla".to_string(),
            9000,
            "www".to_string(),
            "deployhost".to_string(),
            backend,
        )
        .unwrap()
    }

    #[test]
    fn test_nginx_site_block() {
        let rendered = nginx_site("foo.bar", "/www", 9000);
        assert_eq!(
            rendered,
            "\
server {
    server_name foo.bar;
    location / {
        proxy_pass http://localhost:9000;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
    }
    location /static {
        alias  /www/sites/foo.bar/static/;
    }
}
"
        );
    }

    #[test]
    fn test_nginx_site_uses_given_port() {
        for port in [8000, 8001] {
            let rendered = nginx_site("foo.bar", "/www", port);
            assert!(rendered.contains(&format!("proxy_pass http://localhost:{port};")));
        }
    }

    #[test]
    fn test_supervisor_program_gunicorn() {
        let rendered = supervisor_program(&config(Backend::Gunicorn), &paths());
        assert_eq!(
            rendered,
            "\
[program:foo.bar]
command = /www/sites/foo.bar/venv/bin/gunicorn baz:bla -b localhost:9000
directory = /www/sites/foo.bar/src
user = www
"
        );
    }

    #[test]
    fn test_supervisor_program_uvicorn() {
        let rendered = supervisor_program(&config(Backend::Uvicorn), &paths());
        assert!(rendered.contains("command = /www/sites/foo.bar/venv/bin/uvicorn baz:bla --port 9000"));
        assert!(rendered.contains("directory = /www/sites/foo.bar/src"));
    }
}
