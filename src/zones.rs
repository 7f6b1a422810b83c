//! Maps record names onto managed zones.

use crate::provider::Zone;

/// Pick the zone responsible for a record name, ignoring any wildcard
/// prefix. A zone matches when the name equals it or ends with `"." + zone`;
/// with nested delegations the longest (most specific) zone wins.
///
/// Returns `None` when no configured zone covers the name; the caller treats
/// that as fatal, since a record in the wrong zone is worse than a visible
/// failure.
pub fn zone_for_fqdn<'a>(fqdn: &str, zones: &'a [Zone]) -> Option<&'a Zone> {
    let name = fqdn.trim_start_matches(|c| c == '*' || c == '.');
    zones
        .iter()
        .filter(|zone| match name.strip_suffix(zone.name.as_str()) {
            Some(rest) => rest.is_empty() || rest.ends_with('.'),
            None => false,
        })
        .max_by_key(|zone| zone.name.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(names: &[&str]) -> Vec<Zone> {
        names
            .iter()
            .map(|name| Zone {
                id: format!("id-{}", name),
                name: (*name).to_string(),
            })
            .collect()
    }

    #[test]
    fn exact_match_resolves() {
        let zones = zones(&["example.com"]);
        assert_eq!(
            zone_for_fqdn("example.com", &zones).map(|z| z.name.as_str()),
            Some("example.com")
        );
    }

    #[test]
    fn longest_suffix_wins_for_nested_zones() {
        let zones = zones(&["example.com", "dev.example.com"]);
        assert_eq!(
            zone_for_fqdn("app.dev.example.com", &zones).map(|z| z.name.as_str()),
            Some("dev.example.com")
        );
    }

    #[test]
    fn wildcard_prefix_is_ignored() {
        let zones = zones(&["example.com"]);
        assert_eq!(
            zone_for_fqdn("*.sub.example.com", &zones).map(|z| z.name.as_str()),
            Some("example.com")
        );
    }

    #[test]
    fn suffix_must_fall_on_a_label_boundary() {
        let zones = zones(&["example.com"]);
        assert_eq!(zone_for_fqdn("notexample.com", &zones), None);
    }

    #[test]
    fn no_match_is_none() {
        let zones = zones(&["example.com"]);
        assert_eq!(zone_for_fqdn("other.org", &zones), None);
    }
}
