//! Renders the on-disk deployment artifacts from the shared configuration.
//!
//! The output tree is rebuilt from scratch on every run: nginx snippets are
//! copied verbatim, the per-site and edge configs come from `{{KEY}}`
//! templates, and the compose manifest is stamped with the bind port and
//! certificate directory. The only thing that survives a re-render is an
//! operator-edited `secrets.env`.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, info};
use thiserror::Error;

use crate::{
    config::{Config, SiteConfig},
    types::is_fqdn,
};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid domain in edge.sites[{index}].tls_domains: {domain}")]
    InvalidDomain { index: usize, domain: String },
    #[error("{0}")]
    Invalid(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RenderError + '_ {
    move |source| RenderError::Io {
        path: path.to_owned(),
        source,
    }
}

/// A site as the templates consume it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    pub kind: String,
    pub server_names: Vec<String>,
    pub cert_name: String,
    pub upstream: String,
}

impl Site {
    /// Unlike the DNS record builder, which skips odd names, an invalid TLS
    /// domain here fails the run: it would end up verbatim in a server_name
    /// directive and in certificate paths.
    fn from_config(index: usize, cfg: &SiteConfig) -> Result<Site, RenderError> {
        if cfg.tls_domains.is_empty() {
            return Err(RenderError::Invalid(format!(
                "edge.sites[{}].tls_domains must be a non-empty list",
                index
            )));
        }
        for domain in &cfg.tls_domains {
            if !is_fqdn(domain) {
                return Err(RenderError::InvalidDomain {
                    index,
                    domain: domain.clone(),
                });
            }
        }
        Ok(Site {
            name: cfg.name.clone(),
            kind: cfg.kind.clone(),
            server_names: cfg.tls_domains.clone(),
            cert_name: cert_name_for(&cfg.tls_domains).to_owned(),
            upstream: cfg.upstream.clone(),
        })
    }
}

/// Certbot names its live directory after the first domain requested; prefer
/// the first non-wildcard entry so the path stays predictable.
fn cert_name_for(domains: &[String]) -> &str {
    domains
        .iter()
        .find(|domain| !domain.starts_with("*."))
        .unwrap_or(&domains[0])
}

/// Substitute `{{KEY}}` markers. Literal replacement, no escaping; unknown
/// markers are left in place.
fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_owned();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    out
}

fn read_text(path: &Path) -> Result<String, RenderError> {
    fs::read_to_string(path).map_err(io_err(path))
}

fn write_text(path: &Path, content: &str) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(path, content).map_err(io_err(path))
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), RenderError> {
    if dst.exists() {
        fs::remove_dir_all(dst).map_err(io_err(dst))?;
    }
    fs::create_dir_all(dst).map_err(io_err(dst))?;
    for entry in fs::read_dir(src).map_err(io_err(src))? {
        let entry = entry.map_err(io_err(src))?;
        let source = entry.path();
        let target = dst.join(entry.file_name());
        if entry.file_type().map_err(io_err(&source))?.is_dir() {
            copy_tree(&source, &target)?;
        } else {
            fs::copy(&source, &target).map_err(io_err(&source))?;
        }
    }
    Ok(())
}

/// Render the full output tree. `config_dir` is where the config file lives;
/// canonical secrets are picked up from there.
pub fn render(
    cfg: &Config,
    config_dir: &Path,
    templates_dir: &Path,
    out_dir: &Path,
) -> Result<(), RenderError> {
    let bind_port = cfg
        .edge
        .bind_port
        .ok_or_else(|| RenderError::Invalid("edge.bind_port must be an integer".to_string()))?;
    let le_dir = cfg
        .letsencrypt
        .as_ref()
        .map(|le| le.dir.clone())
        .ok_or_else(|| RenderError::Invalid("letsencrypt must be a mapping".to_string()))?;
    let upload_max_mb = cfg
        .wordpress
        .as_ref()
        .map(|wp| wp.php.upload_max_mb.to_string())
        .ok_or_else(|| RenderError::Invalid("wordpress must be a mapping".to_string()))?;

    let sites = cfg
        .edge
        .sites
        .iter()
        .enumerate()
        .map(|(index, site)| Site::from_config(index, site))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "Rendering {} sites: {:?}",
        sites.len(),
        sites.iter().map(|s| s.name.as_str()).collect::<BTreeSet<_>>()
    );

    // Operator-managed secrets survive the teardown below.
    let preserved_secrets = fs::read_to_string(out_dir.join("secrets.env")).ok();

    if out_dir.exists() {
        fs::remove_dir_all(out_dir).map_err(io_err(out_dir))?;
    }
    fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;

    copy_tree(
        &templates_dir.join("nginx").join("snippets"),
        &out_dir.join("nginx").join("snippets"),
    )?;

    // Internal WordPress vhosts share one template and differ only in the
    // php-fpm upstream they hand requests to.
    let wp_site_tpl = read_text(&templates_dir.join("nginx").join("wp").join("site.conf.template"))?;
    for (instance, upstream) in [("wp-a", "wp-a-php:9000"), ("wp-b", "wp-b-php:9000")] {
        let rendered = render_template(
            &wp_site_tpl,
            &[
                ("UPLOAD_MAX_MB", upload_max_mb.clone()),
                ("PHP_FPM_UPSTREAM", upstream.to_string()),
            ],
        );
        write_text(
            &out_dir.join("nginx").join(instance).join("site.conf"),
            &rendered,
        )?;
    }

    let edge_dir = templates_dir.join("nginx").join("edge");
    let edge_base = read_text(&edge_dir.join("edge.conf.template"))?;
    let server_tpl = read_text(&edge_dir.join("server-block.template"))?;
    let server_blocks = sites
        .iter()
        .map(|site| {
            render_template(
                &server_tpl,
                &[
                    ("SERVER_NAME", site.server_names.join(" ")),
                    ("CERT_NAME", site.cert_name.clone()),
                    ("UPSTREAM", site.upstream.clone()),
                ],
            )
        })
        .collect_vec()
        .join("\n\n");
    let edge_conf = render_template(
        &edge_base,
        &[
            ("SERVER_BLOCKS", server_blocks),
            ("UPLOAD_MAX_MB", upload_max_mb.clone()),
        ],
    );
    write_text(
        &out_dir.join("nginx").join("edge").join("00-edge.conf"),
        &edge_conf,
    )?;

    let php_ini_tpl = read_text(&templates_dir.join("php-fpm").join("php.ini.template"))?;
    write_text(
        &out_dir.join("php-fpm").join("php.ini"),
        &render_template(&php_ini_tpl, &[("UPLOAD_MAX_MB", upload_max_mb)]),
    )?;
    let dockerfile = templates_dir.join("php-fpm").join("Dockerfile");
    fs::copy(&dockerfile, out_dir.join("php-fpm").join("Dockerfile"))
        .map_err(io_err(&dockerfile))?;

    let compose_tpl = read_text(&templates_dir.join("docker-compose.template.yml"))?;
    let compose = render_template(
        &compose_tpl,
        &[
            ("EDGE_BIND_PORT", bind_port.to_string()),
            ("LE_DIR", le_dir),
        ],
    );
    write_text(&out_dir.join("docker-compose.yml"), &compose)?;

    // Give the operator a starting point next to the rendered stack.
    let example = config_dir.join("secrets.env.example");
    if example.exists() {
        write_text(&out_dir.join("secrets.env.example"), &read_text(&example)?)?;
    }

    // Canonical secrets win over whatever the previous output tree had.
    let canonical = config_dir.join("secrets.env");
    let secrets_content = if canonical.exists() {
        Some(read_text(&canonical)?)
    } else {
        preserved_secrets
    };
    if let Some(content) = secrets_content {
        write_text(&out_dir.join("secrets.env"), &content)?;
        // env_file only sets container env; compose resolves ${VAR}
        // substitution from .env, so mirror the secrets there too.
        write_text(&out_dir.join(".env"), &content)?;
    }

    info!("Rendered stack artifacts into {}", out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
cloudflare:
  dns:
    enabled: false
edge:
  bind_port: 8443
  sites:
    - name: blog
      type: wordpress
      upstream: wp-a:8080
      tls_domains: ["*.example.com", "blog.example.com"]
    - name: landing
      type: static
      upstream: static-site:80
      tls_domains: ["landing.example.com"]
letsencrypt:
  dir: /etc/letsencrypt
wordpress:
  php:
    upload_max_mb: 64
"#;

    fn config() -> Config {
        serde_yaml::from_str(CONFIG).expect("test config should parse")
    }

    fn write_templates(root: &Path) {
        let w = |rel: &str, content: &str| {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        };
        w("nginx/snippets/proxy.conf", "proxy_http_version 1.1;\n");
        w(
            "nginx/wp/site.conf.template",
            "client_max_body_size {{UPLOAD_MAX_MB}}m;\nfastcgi_pass {{PHP_FPM_UPSTREAM}};\n",
        );
        w(
            "nginx/edge/edge.conf.template",
            "client_max_body_size {{UPLOAD_MAX_MB}}m;\n{{SERVER_BLOCKS}}\n",
        );
        w(
            "nginx/edge/server-block.template",
            "server {\n  server_name {{SERVER_NAME}};\n  ssl_certificate live/{{CERT_NAME}}/fullchain.pem;\n  proxy_pass http://{{UPSTREAM}};\n}",
        );
        w("php-fpm/php.ini.template", "upload_max_filesize = {{UPLOAD_MAX_MB}}M\n");
        w("php-fpm/Dockerfile", "FROM php:8.3-fpm\n");
        w(
            "docker-compose.template.yml",
            "services:\n  edge:\n    ports: [\"{{EDGE_BIND_PORT}}:443\"]\n    volumes: [\"{{LE_DIR}}:/certs\"]\n",
        );
    }

    fn render_into(cfg: &Config) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        let out = tmp.path().join("out");
        write_templates(&templates);
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        render(cfg, &tmp.path().join("config"), &templates, &out).unwrap();
        (tmp, out)
    }

    #[test]
    fn renders_the_full_output_tree() {
        let (_tmp, out) = render_into(&config());
        for rel in [
            "nginx/snippets/proxy.conf",
            "nginx/wp-a/site.conf",
            "nginx/wp-b/site.conf",
            "nginx/edge/00-edge.conf",
            "php-fpm/php.ini",
            "php-fpm/Dockerfile",
            "docker-compose.yml",
        ] {
            assert!(out.join(rel).exists(), "{} should exist", rel);
        }
    }

    #[test]
    fn substitutes_template_variables() {
        let (_tmp, out) = render_into(&config());

        let wp_a = fs::read_to_string(out.join("nginx/wp-a/site.conf")).unwrap();
        assert!(wp_a.contains("client_max_body_size 64m;"));
        assert!(wp_a.contains("fastcgi_pass wp-a-php:9000;"));
        let wp_b = fs::read_to_string(out.join("nginx/wp-b/site.conf")).unwrap();
        assert!(wp_b.contains("fastcgi_pass wp-b-php:9000;"));

        let edge = fs::read_to_string(out.join("nginx/edge/00-edge.conf")).unwrap();
        assert!(edge.contains("server_name *.example.com blog.example.com;"));
        assert!(edge.contains("server_name landing.example.com;"));
        // Wildcard entries make poor directory names; the cert is named
        // after the first concrete domain.
        assert!(edge.contains("live/blog.example.com/fullchain.pem"));

        let compose = fs::read_to_string(out.join("docker-compose.yml")).unwrap();
        assert!(compose.contains("\"8443:443\""));
        assert!(compose.contains("/etc/letsencrypt:/certs"));
    }

    #[test]
    fn preserves_operator_secrets_across_rerenders() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        let out = tmp.path().join("out");
        write_templates(&templates);
        fs::create_dir_all(tmp.path().join("config")).unwrap();

        render(&config(), &tmp.path().join("config"), &templates, &out).unwrap();
        fs::write(out.join("secrets.env"), "CF_DNS_API_TOKEN=operator-edit\n").unwrap();

        render(&config(), &tmp.path().join("config"), &templates, &out).unwrap();
        let secrets = fs::read_to_string(out.join("secrets.env")).unwrap();
        assert_eq!(secrets, "CF_DNS_API_TOKEN=operator-edit\n");
        let dotenv = fs::read_to_string(out.join(".env")).unwrap();
        assert_eq!(dotenv, secrets);
    }

    #[test]
    fn canonical_secrets_beat_preserved_ones() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        let out = tmp.path().join("out");
        let config_dir = tmp.path().join("config");
        write_templates(&templates);
        fs::create_dir_all(&config_dir).unwrap();

        render(&config(), &config_dir, &templates, &out).unwrap();
        fs::write(out.join("secrets.env"), "STALE=1\n").unwrap();
        fs::write(config_dir.join("secrets.env"), "CANONICAL=1\n").unwrap();

        render(&config(), &config_dir, &templates, &out).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("secrets.env")).unwrap(),
            "CANONICAL=1\n"
        );
    }

    #[test]
    fn invalid_tls_domain_fails_the_run() {
        let yaml = CONFIG.replace("\"landing.example.com\"", "\"not a domain\"");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        let tmp = TempDir::new().unwrap();
        write_templates(&tmp.path().join("templates"));

        let err = render(
            &cfg,
            tmp.path(),
            &tmp.path().join("templates"),
            &tmp.path().join("out"),
        )
        .unwrap_err();
        assert!(
            matches!(err, RenderError::InvalidDomain { index: 1, ref domain } if domain == "not a domain")
        );
    }

    #[test]
    fn cert_name_prefers_the_first_non_wildcard_domain() {
        let domains = |list: &[&str]| list.iter().map(|d| d.to_string()).collect_vec();
        assert_eq!(
            cert_name_for(&domains(&["*.example.com", "example.com"])),
            "example.com"
        );
        assert_eq!(
            cert_name_for(&domains(&["*.example.com", "*.other.com"])),
            "*.example.com"
        );
        assert_eq!(cert_name_for(&domains(&["a.example.com"])), "a.example.com");
    }

    #[test]
    fn unknown_markers_are_left_alone() {
        let rendered = render_template(
            "a={{KNOWN}} b={{UNKNOWN}}",
            &[("KNOWN", "1".to_string())],
        );
        assert_eq!(rendered, "a=1 b={{UNKNOWN}}");
    }
}
