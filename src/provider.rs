mod cloudflare;

// Re-export for convenience
pub use self::cloudflare::CloudflareProvider;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::types::{RecordType, ZonedRecord};

/// A zone managed by the provider account. Loaded once per run and treated
/// as read-only reference data afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// A record as it currently exists at the provider. Fetched on demand per
/// desired record; never cached across records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRecord {
    pub id: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// Error returned by a provider call. Transport failures and API-level
/// failures both carry the method and path; no distinction is made between
/// 4xx and 5xx and nothing is retried.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("could not construct HTTP client: {source}")]
    Init {
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {path}: {source}")]
    Transport {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("API failure for {method} {path}: {body}")]
    Api {
        method: &'static str,
        path: String,
        body: String,
    },
}

/// A provider is any DNS service the reconciler can read and mutate records
/// through. Kept minimal so tests can substitute a mock.
#[cfg_attr(test, automock)]
pub trait DnsProvider {
    /// All zones on the account as (name, opaque id) pairs, fetched page by
    /// page. A partial zone list is never returned.
    fn zones(&self) -> Result<Vec<Zone>, ProviderError>;

    /// The first record of the given type and name in a zone, if any. The
    /// API's own filtering is trusted to keep the candidate set small.
    fn find_record(
        &self,
        zone_id: &str,
        rtype: RecordType,
        name: &str,
    ) -> Result<Option<LiveRecord>, ProviderError>;

    /// Create a record. The provider's representation of the result is
    /// discarded beyond confirming success.
    fn create_record(&self, zone_id: &str, record: &ZonedRecord) -> Result<(), ProviderError>;

    /// Overwrite an existing record in place.
    fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &ZonedRecord,
    ) -> Result<(), ProviderError>;
}
