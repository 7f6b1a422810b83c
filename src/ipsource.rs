//! Public-IP detection for origin records.
//!
//! When an origin address is configured as "auto" we ask a fixed list of
//! external endpoints, each of which returns our address as plain text. The
//! first response that parses as a global-scope address of the requested
//! version wins; everything else (transport errors, timeouts, garbage,
//! wrong-version or non-global answers) moves on to the next probe.

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probe endpoints, tried in order. No per-endpoint retries.
const V4_PROBES: &[&str] = &[
    "https://api.ipify.org",
    "https://checkip.amazonaws.com",
    "https://ifconfig.me/ip",
];
const V6_PROBES: &[&str] = &["https://api64.ipify.org", "https://ifconfig.me/ip"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    fn matches(&self, addr: &IpAddr) -> bool {
        match self {
            IpVersion::V4 => addr.is_ipv4(),
            IpVersion::V6 => addr.is_ipv6(),
        }
    }
}

impl Display for IpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IpVersion::V4 => "IPv4",
            IpVersion::V6 => "IPv6",
        })
    }
}

/// All probe endpoints were exhausted without a usable answer. Carries the
/// most recent underlying failure for diagnostics.
#[derive(Error, Debug)]
#[error("could not auto-detect a public {version} address (set the origin explicitly); last error: {last}")]
pub struct SourceError {
    pub version: IpVersion,
    pub last: String,
}

/// Detect our public address of the given version.
pub fn detect(version: IpVersion) -> Result<IpAddr, SourceError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| SourceError {
            version,
            last: e.to_string(),
        })?;

    let probes = match version {
        IpVersion::V4 => V4_PROBES,
        IpVersion::V6 => V6_PROBES,
    };

    let mut last = String::from("no probe endpoints configured");
    for url in probes {
        debug!("Probing {} for our public {} address", url, version);
        let text = match fetch_probe(&client, url) {
            Ok(text) => text,
            Err(reason) => {
                warn!("Probe {} failed: {}", url, reason);
                last = format!("{}: {}", url, reason);
                continue;
            }
        };
        match check_probe_response(&text, version) {
            Ok(addr) => {
                debug!("Detected public address {} via {}", addr, url);
                return Ok(addr);
            }
            Err(reason) => {
                warn!("Probe {} returned an unusable answer: {}", url, reason);
                last = format!("{}: {}", url, reason);
            }
        }
    }
    Err(SourceError { version, last })
}

fn fetch_probe(client: &reqwest::blocking::Client, url: &str) -> Result<String, String> {
    let response = client.get(url).send().map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    response.text().map_err(|e| e.to_string())
}

/// Validate a probe response body: it must parse as an address of the
/// requested version and have global scope.
fn check_probe_response(text: &str, version: IpVersion) -> Result<IpAddr, String> {
    let trimmed = text.trim();
    let addr: IpAddr = trimmed
        .parse()
        .map_err(|_| format!("not an IP address: {:?}", trimmed))?;
    if !version.matches(&addr) {
        return Err(format!("{} is not an {} address", addr, version));
    }
    if !is_global(&addr) {
        return Err(format!("{} is not a global-scope address", addr));
    }
    Ok(addr)
}

/// Stand-in for `IpAddr::is_global`, which is not on stable Rust.
pub fn is_global(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_global_v4(v4),
        IpAddr::V6(v6) => is_global_v6(v6),
    }
}

fn is_global_v4(addr: &Ipv4Addr) -> bool {
    let octets = addr.octets();
    // Ranges std has no stable predicate for: shared/CGNAT (100.64.0.0/10),
    // benchmarking (198.18.0.0/15) and reserved (240.0.0.0/4, which also
    // covers the broadcast address).
    let shared = octets[0] == 100 && (octets[1] & 0xc0) == 64;
    let benchmarking = octets[0] == 198 && (octets[1] & 0xfe) == 18;
    let reserved = (octets[0] & 0xf0) == 240;
    !(addr.is_unspecified()
        || addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_documentation()
        || addr.is_multicast()
        || shared
        || benchmarking
        || reserved)
}

fn is_global_v6(addr: &Ipv6Addr) -> bool {
    let segments = addr.segments();
    // Global unicast is 2000::/3; that single test rules out loopback,
    // link-local, unique-local and multicast. The documentation prefix
    // 2001:db8::/32 sits inside it and needs excluding separately.
    let documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;
    (segments[0] & 0xe000) == 0x2000 && !documentation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_global_v4_answer() {
        let addr = check_probe_response("93.184.216.34\n", IpVersion::V4).unwrap();
        assert_eq!(addr, "93.184.216.34".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn rejects_non_global_v4_answers() {
        for probe in [
            "10.1.2.3",
            "127.0.0.1",
            "169.254.0.5",
            "172.16.9.9",
            "192.168.1.1",
            "100.64.0.1",
            "198.18.0.1",
            "192.0.2.55",
            "255.255.255.255",
            "0.0.0.0",
        ] {
            assert!(
                check_probe_response(probe, IpVersion::V4).is_err(),
                "{} should be rejected",
                probe
            );
        }
    }

    #[test]
    fn rejects_wrong_version_answers() {
        assert!(check_probe_response("2606:4700:4700::1111", IpVersion::V4).is_err());
        assert!(check_probe_response("93.184.216.34", IpVersion::V6).is_err());
    }

    #[test]
    fn rejects_garbage_answers() {
        assert!(check_probe_response("<html>rate limited</html>", IpVersion::V4).is_err());
        assert!(check_probe_response("", IpVersion::V4).is_err());
    }

    #[test]
    fn v6_global_unicast_only() {
        let ok = |s: &str| check_probe_response(s, IpVersion::V6).is_ok();
        assert!(ok("2606:4700:4700::1111"));
        assert!(!ok("::1"));
        assert!(!ok("fe80::1"));
        assert!(!ok("fd00::1"));
        assert!(!ok("2001:db8::1"));
        assert!(!ok("ff02::1"));
    }
}
