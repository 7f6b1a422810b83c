//! Thin client for the Cloudflare v4 REST API.
//!
//! Deliberately minimal: bearer-token auth, JSON bodies, and the four calls
//! the reconciler needs. Holds nothing but the credential and a blocking
//! HTTP client; every call is synchronous with a fixed timeout.

use std::time::Duration;

use log::{debug, trace};
use serde::Deserialize;
use serde_json::json;

use super::{DnsProvider, LiveRecord, ProviderError, Zone};
use crate::types::{RecordType, ZonedRecord};

const API_BASE: &str = "https://api.cloudflare.com/client/v4";
const PAGE_SIZE: u32 = 50;
const API_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CloudflareProvider {
    client: reqwest::blocking::Client,
    token: String,
}

/// Response envelope shared by all v4 endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ApiZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    // The id is required for updates; an empty one is caught by the
    // reconciler rather than silently PUT to a bogus path.
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

impl CloudflareProvider {
    pub fn new(api_token: &str) -> Result<CloudflareProvider, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|source| ProviderError::Init { source })?;
        Ok(CloudflareProvider {
            client,
            token: api_token.to_owned(),
        })
    }

    /// Perform one API call and unwrap the response envelope. Non-2xx
    /// responses and `success: false` envelopes both surface the raw body.
    fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        path: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<Envelope<T>, ProviderError> {
        let url = format!("{}{}", API_BASE, path);
        let mut request = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            other => unreachable!("unsupported method {}", other),
        };
        request = request
            .bearer_auth(&self.token)
            .header("Accept", "application/json");
        if let Some(body) = payload {
            request = request.json(&body);
        }

        trace!("{} {}", method, path);
        let response = request.send().map_err(|source| ProviderError::Transport {
            method,
            path: path.to_owned(),
            source,
        })?;
        let status = response.status();
        let body = response.text().map_err(|source| ProviderError::Transport {
            method,
            path: path.to_owned(),
            source,
        })?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                method,
                path: path.to_owned(),
                body: format!("HTTP {}: {}", status, body),
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|_| ProviderError::Api {
                method,
                path: path.to_owned(),
                body: body.clone(),
            })?;
        if !envelope.success {
            return Err(ProviderError::Api {
                method,
                path: path.to_owned(),
                body,
            });
        }
        Ok(envelope)
    }

    fn record_payload(record: &ZonedRecord) -> serde_json::Value {
        json!({
            "type": record.rtype.as_str(),
            "name": record.name,
            "content": record.content,
            "ttl": record.ttl,
            "proxied": record.proxied,
        })
    }
}

impl DnsProvider for CloudflareProvider {
    fn zones(&self) -> Result<Vec<Zone>, ProviderError> {
        let mut zones = Vec::new();
        let mut page = 1u32;
        loop {
            let path = format!("/zones?page={}&per_page={}", page, PAGE_SIZE);
            let envelope: Envelope<Vec<ApiZone>> = self.request("GET", &path, None)?;
            zones.extend(
                envelope
                    .result
                    .unwrap_or_default()
                    .into_iter()
                    .map(|zone| Zone {
                        id: zone.id,
                        name: zone.name,
                    }),
            );
            // The envelope reports how many pages exist; stop once we have
            // them all (or when the API stops telling us).
            let total_pages = envelope
                .result_info
                .map_or(page, |info| info.total_pages.max(1));
            if page >= total_pages {
                break;
            }
            page += 1;
        }
        debug!("Fetched {} zones from the Cloudflare account", zones.len());
        Ok(zones)
    }

    fn find_record(
        &self,
        zone_id: &str,
        rtype: RecordType,
        name: &str,
    ) -> Result<Option<LiveRecord>, ProviderError> {
        let path = format!(
            "/zones/{}/dns_records?type={}&name={}&per_page={}",
            zone_id, rtype, name, PAGE_SIZE
        );
        let envelope: Envelope<Vec<ApiRecord>> = self.request("GET", &path, None)?;
        let first = envelope.result.unwrap_or_default().into_iter().next();
        trace!(
            "Lookup {} {} in zone {}: {}",
            rtype,
            name,
            zone_id,
            if first.is_some() { "found" } else { "absent" }
        );
        Ok(first.map(|record| LiveRecord {
            id: record.id,
            content: record.content,
            ttl: record.ttl,
            proxied: record.proxied,
        }))
    }

    fn create_record(&self, zone_id: &str, record: &ZonedRecord) -> Result<(), ProviderError> {
        let path = format!("/zones/{}/dns_records", zone_id);
        self.request::<serde_json::Value>("POST", &path, Some(Self::record_payload(record)))?;
        debug!("Created record {}", record);
        Ok(())
    }

    fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &ZonedRecord,
    ) -> Result<(), ProviderError> {
        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);
        self.request::<serde_json::Value>("PUT", &path, Some(Self::record_payload(record)))?;
        debug!("Updated record {} (id {})", record, record_id);
        Ok(())
    }
}
