//! Builds the desired record set from configuration.
//!
//! One `A` record per unique TLS domain across all sites, plus an `AAAA`
//! when an IPv6 origin is available. The output is sorted and carries no
//! zone yet; zone resolution needs the live zone list and happens in the
//! reconciler.

use itertools::Itertools;
use log::{debug, info};

use crate::{
    config::{CloudflareConfig, EdgeConfig},
    ipsource::{self, IpVersion, SourceError},
    types::{is_fqdn, DesiredRecord, RecordType},
};

/// Derive the target record set. Returns an empty list when DNS management
/// is disabled or absent, which configs predating the feature rely on.
///
/// Entries in `tls_domains` that don't look like FQDNs are skipped without
/// failing the run. The only error source left at this stage is public-IP
/// detection; configuration shape was already checked at load time.
pub fn build(cf: &CloudflareConfig, edge: &EdgeConfig) -> Result<Vec<DesiredRecord>, SourceError> {
    let Some(dns) = cf.dns.as_ref() else {
        return Ok(Vec::new());
    };
    if !dns.enabled() {
        return Ok(Vec::new());
    }

    let origin_ipv4 = match dns.origin_ipv4.as_deref().map(str::trim) {
        Some(origin) if !origin.eq_ignore_ascii_case("auto") => origin.to_owned(),
        _ => ipsource::detect(IpVersion::V4)?.to_string(),
    };
    let origin_ipv6 = match dns.origin_ipv6.as_deref().map(str::trim) {
        None => None,
        Some(origin) if origin.eq_ignore_ascii_case("auto") => {
            Some(ipsource::detect(IpVersion::V6)?.to_string())
        }
        Some("") => None,
        // Used verbatim; if it's junk, the provider will say so.
        Some(origin) => Some(origin.to_owned()),
    };

    let ttl = dns.effective_ttl();
    let proxied = cf.proxy_enabled();

    let names = edge
        .sites
        .iter()
        .flat_map(|site| site.tls_domains.iter())
        .map(|domain| domain.trim())
        .filter(|domain| {
            let keep = is_fqdn(domain);
            if !keep {
                debug!("Skipping non-FQDN tls_domains entry: {:?}", domain);
            }
            keep
        })
        .map(str::to_owned)
        .sorted()
        .dedup()
        .collect_vec();

    let mut desired = Vec::with_capacity(names.len() * 2);
    for name in names {
        desired.push(DesiredRecord {
            rtype: RecordType::A,
            name: name.clone(),
            content: origin_ipv4.clone(),
            ttl,
            proxied,
        });
        if let Some(origin) = &origin_ipv6 {
            desired.push(DesiredRecord {
                rtype: RecordType::Aaaa,
                name,
                content: origin.clone(),
                ttl,
                proxied,
            });
        }
    }
    info!("Built {} desired records", desired.len());
    Ok(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).expect("test config should parse")
    }

    fn build_from(yaml: &str) -> Vec<DesiredRecord> {
        let cfg = config(yaml);
        let cf = cfg.cloudflare.as_ref().expect("cloudflare section");
        build(cf, &cfg.edge).expect("build should succeed")
    }

    const ENABLED: &str = r#"
cloudflare:
  dns:
    enabled: true
    origin_ipv4: 198.51.100.7
edge:
  sites:
    - name: blog
      type: wordpress
      upstream: wp-a:8080
      tls_domains: ["www.example.com", "blog.example.com"]
"#;

    #[test]
    fn disabled_or_absent_feature_builds_nothing() {
        let records = build_from(&ENABLED.replace("enabled: true", "enabled: false"));
        assert!(records.is_empty());

        let cfg = config(
            r#"
cloudflare: {}
edge:
  sites:
    - { name: a, type: static, upstream: "u:1", tls_domains: ["a.example.com"] }
"#,
        );
        let records = build(cfg.cloudflare.as_ref().unwrap(), &cfg.edge).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn one_a_record_per_unique_name_in_sorted_order() {
        let records = build_from(ENABLED);
        let names = records.iter().map(|r| r.name.as_str()).collect_vec();
        assert_eq!(names, ["blog.example.com", "www.example.com"]);
        assert!(records.iter().all(|r| r.rtype == RecordType::A));
        assert!(records.iter().all(|r| r.content == "198.51.100.7"));
        assert!(records.iter().all(|r| r.ttl == 1 && r.proxied));
    }

    #[test]
    fn duplicate_names_across_sites_collapse() {
        let records = build_from(
            r#"
cloudflare:
  dns:
    enabled: true
    origin_ipv4: 198.51.100.7
edge:
  sites:
    - { name: a, type: wordpress, upstream: "u:1", tls_domains: ["www.example.com"] }
    - { name: b, type: static, upstream: "u:2", tls_domains: ["www.example.com"] }
"#,
        );
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn malformed_names_are_skipped() {
        let records = build_from(&ENABLED.replace(
            r#"["www.example.com", "blog.example.com"]"#,
            r#"["www.example.com", "not a domain", "localhost", ""]"#,
        ));
        let names = records.iter().map(|r| r.name.as_str()).collect_vec();
        assert_eq!(names, ["www.example.com"]);
    }

    #[test]
    fn wildcards_are_kept() {
        let records = build_from(&ENABLED.replace(
            r#"["www.example.com", "blog.example.com"]"#,
            r#"["*.example.com"]"#,
        ));
        assert_eq!(records[0].name, "*.example.com");
    }

    #[test]
    fn ipv6_origin_adds_aaaa_records() {
        let records = build_from(&ENABLED.replace(
            "origin_ipv4: 198.51.100.7",
            "origin_ipv4: 198.51.100.7\n    origin_ipv6: \"2001:470::1\"",
        ));
        assert_eq!(records.len(), 4);
        let aaaa = records
            .iter()
            .filter(|r| r.rtype == RecordType::Aaaa)
            .collect_vec();
        assert_eq!(aaaa.len(), 2);
        assert!(aaaa.iter().all(|r| r.content == "2001:470::1"));
    }

    #[test]
    fn empty_ipv6_origin_means_no_aaaa() {
        let records = build_from(&ENABLED.replace(
            "origin_ipv4: 198.51.100.7",
            "origin_ipv4: 198.51.100.7\n    origin_ipv6: \"\"",
        ));
        assert!(records.iter().all(|r| r.rtype == RecordType::A));
    }

    #[test]
    fn ttl_and_proxy_settings_flow_through() {
        let records = build_from(
            r#"
cloudflare:
  proxy_enabled: false
  dns:
    enabled: true
    origin_ipv4: 198.51.100.7
    ttl: 300
edge:
  sites:
    - { name: a, type: static, upstream: "u:1", tls_domains: ["a.example.com"] }
"#,
        );
        assert_eq!(records[0].ttl, 300);
        assert!(!records[0].proxied);
    }
}
