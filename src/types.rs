use std::fmt::Display;

/// Record types managed by this tool. Everything else in the zone is left
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record we want to exist, before its zone is known. Building these needs
/// no API access; resolving them does, so the zone lives on [`ZonedRecord`]
/// instead of an optional field here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DesiredRecord {
    pub rtype: RecordType,
    /// Fully-qualified name, possibly with a `*.` wildcard prefix.
    pub name: String,
    /// IP address as a string; explicit origins are passed through verbatim.
    pub content: String,
    /// Seconds; 1 means "automatic" at the provider.
    pub ttl: u32,
    pub proxied: bool,
}

impl DesiredRecord {
    pub fn into_zoned(self, zone_name: String) -> ZonedRecord {
        ZonedRecord {
            zone_name,
            rtype: self.rtype,
            name: self.name,
            content: self.content,
            ttl: self.ttl,
            proxied: self.proxied,
        }
    }
}

/// A desired record with its managed zone resolved. Only zone resolution
/// produces these, so an unresolved record can never reach a mutating call.
///
/// Identity for de-duplication and ordering is (zone, type, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZonedRecord {
    pub zone_name: String,
    pub rtype: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl Display for ZonedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zone={} {} {}", self.zone_name, self.rtype, self.name)
    }
}

/// Shape check for record and server names: optional `*.` wildcard prefix,
/// then ASCII alphanumerics, dots and hyphens, with at least one dot.
pub fn is_fqdn(name: &str) -> bool {
    let name = name.strip_prefix("*.").unwrap_or(name);
    !name.is_empty()
        && name.contains('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_wildcard_fqdns() {
        assert!(is_fqdn("example.com"));
        assert!(is_fqdn("sub.example.com"));
        assert!(is_fqdn("*.example.com"));
        assert!(is_fqdn("a-b.example.com"));
    }

    #[test]
    fn rejects_non_fqdn_shapes() {
        assert!(!is_fqdn(""));
        assert!(!is_fqdn("not a domain"));
        assert!(!is_fqdn("localhost"));
        assert!(!is_fqdn("*.com"));
        assert!(!is_fqdn("exa_mple.com"));
    }

    #[test]
    fn record_types_sort_a_before_aaaa() {
        assert!(RecordType::A < RecordType::Aaaa);
        assert_eq!(RecordType::Aaaa.as_str(), "AAAA");
    }
}
