//! Configuration for both stack tools.
//!
//! `edgestack-dns` and `edgestack-render` read the same `config.yml`; the
//! sections only one of them needs are optional here and checked by the tool
//! that consumes them. Secrets come from a shell-style `KEY=value` file next
//! to the config, merged with the process environment by
//! [`resolve_api_token`] with the environment taking precedence.

use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

/// Name under which the API token is looked up when the config does not
/// override it.
pub const DEFAULT_TOKEN_ENV: &str = "CF_DNS_API_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{0}")]
    Invalid(String),
    #[error("missing Cloudflare API token; put {env_name}=... into {secrets_path} (or export it)")]
    MissingToken {
        env_name: String,
        secrets_path: String,
    },
}

/// Root of the shared YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cloudflare: Option<CloudflareConfig>,
    pub edge: EdgeConfig,
    #[serde(default)]
    pub letsencrypt: Option<LetsencryptConfig>,
    #[serde(default)]
    pub wordpress: Option<WordpressConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareConfig {
    /// Missing `dns` means the feature predates this config; treated as
    /// disabled rather than an error.
    #[serde(default)]
    pub dns: Option<DnsConfig>,
    #[serde(default, deserialize_with = "de::lenient_bool")]
    proxy_enabled: Option<bool>,
    #[serde(default)]
    dns_api_token_env: Option<String>,
}

impl CloudflareConfig {
    /// Whether new records should be proxied through the provider's network.
    pub fn proxy_enabled(&self) -> bool {
        self.proxy_enabled.unwrap_or(true)
    }

    /// Environment variable name the API token is expected under.
    pub fn token_env_name(&self) -> &str {
        match self.dns_api_token_env.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_TOKEN_ENV,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    #[serde(default, deserialize_with = "de::lenient_bool")]
    enabled: Option<bool>,
    /// Explicit origin address, or "auto" to probe for our public address.
    /// Unset behaves like "auto".
    #[serde(default)]
    pub origin_ipv4: Option<String>,
    /// Unset means no AAAA records are managed.
    #[serde(default)]
    pub origin_ipv6: Option<String>,
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl DnsConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Effective record TTL; unset and 0 both mean 1, the provider's
    /// "automatic" marker.
    pub fn effective_ttl(&self) -> u32 {
        match self.ttl {
            Some(0) | None => 1,
            Some(ttl) => ttl,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    #[serde(default)]
    pub bind_port: Option<u16>,
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub upstream: String,
    #[serde(default)]
    pub tls_domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LetsencryptConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordpressConfig {
    pub php: PhpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhpConfig {
    pub upload_max_mb: u32,
}

impl Config {
    /// Read and parse the config file. Shape errors carry the serde key path
    /// and abort the run; there is no partial loading.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Semantic checks the serde model cannot express.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.edge.sites.is_empty() {
            return Err(ConfigError::Invalid(
                "edge.sites must be a non-empty list".to_string(),
            ));
        }
        for (idx, site) in self.edge.sites.iter().enumerate() {
            for (key, value) in [
                ("name", &site.name),
                ("type", &site.kind),
                ("upstream", &site.upstream),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "edge.sites[{}].{} must be a non-empty string",
                        idx, key
                    )));
                }
            }
        }
        if let Some(dns) = self.cloudflare.as_ref().and_then(|cf| cf.dns.as_ref()) {
            if let Some(origin) = dns.origin_ipv4.as_deref() {
                if origin.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "cloudflare.dns.origin_ipv4 must be a non-empty string".to_string(),
                    ));
                }
            }
        }
        if let Some(le) = &self.letsencrypt {
            if le.dir.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "letsencrypt.dir must be a non-empty string".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Parse a shell-style secrets file into a map. Blank lines and `#` comments
/// are skipped, an `export ` prefix is tolerated, and lines without `=` are
/// ignored.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_env(&raw))
}

fn parse_env(raw: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for raw_line in raw.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("export ") {
            line = rest;
        }
        if let Some((key, value)) = line.split_once('=') {
            env.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    env
}

/// Resolve the API token with explicit precedence: the process environment
/// first, then the secrets file under the configured name, then the secrets
/// file under [`DEFAULT_TOKEN_ENV`]. Empty values are treated as absent.
pub fn resolve_api_token(
    cf: &CloudflareConfig,
    process_env: &HashMap<String, String>,
    secrets: &HashMap<String, String>,
) -> Option<String> {
    fn non_empty(value: Option<&String>) -> Option<&String> {
        value.filter(|v| !v.trim().is_empty())
    }

    let name = cf.token_env_name();
    non_empty(process_env.get(name))
        .or_else(|| non_empty(secrets.get(name)))
        .or_else(|| non_empty(secrets.get(DEFAULT_TOKEN_ENV)))
        .cloned()
}

mod de {
    use serde::{Deserialize, Deserializer};

    /// Accepts booleans plus the usual shell-ish spellings ("1", "yes",
    /// "on"), which YAML 1.2 parses as strings or integers.
    pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Int(i64),
            Str(String),
            Null,
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Some(b),
            Raw::Int(n) => Some(n != 0),
            Raw::Str(s) => Some(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )),
            Raw::Null => None,
        })
    }
}
