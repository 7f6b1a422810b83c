//! Desired-vs-live reconciliation.
//!
//! One pass over the desired records in (zone, type, name) order. Each
//! record is looked up at the provider and lands on create, update or
//! no-change; plan mode only reports what apply mode would do. There is no
//! retry and no rollback: a mid-run failure leaves earlier mutations in
//! place and aborts before the rest.

use itertools::Itertools;
use log::info;
use thiserror::Error;

use crate::{
    provider::{DnsProvider, LiveRecord, ProviderError},
    types::{DesiredRecord, ZonedRecord},
    zones,
};

/// Whether to mutate the provider or just report what would change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Plan,
    Apply,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("no managed zone found for record name: {name}")]
    ZoneNotFound { name: String },
    #[error("existing record for {name} has no id; refusing to update")]
    MissingRecordId { name: String },
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub planned: u32,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Create,
    Update { record_id: String },
    NoChange,
}

fn decide(desired: &ZonedRecord, existing: Option<&LiveRecord>) -> Decision {
    match existing {
        None => Decision::Create,
        Some(live) => {
            if live.content != desired.content
                || live.ttl != desired.ttl
                || live.proxied != desired.proxied
            {
                Decision::Update {
                    record_id: live.id.clone(),
                }
            } else {
                Decision::NoChange
            }
        }
    }
}

/// Bring the provider in line with the desired records.
///
/// Every record name must resolve to a zone before anything is looked up or
/// mutated; a miss aborts the whole run rather than skipping the record.
pub fn run(
    provider: &dyn DnsProvider,
    desired: Vec<DesiredRecord>,
    mode: Mode,
) -> Result<Summary, ReconcileError> {
    let zones = provider.zones()?;
    info!("Found {} zones on the provider account", zones.len());

    let mut resolved = Vec::with_capacity(desired.len());
    for record in desired {
        let zone = zones::zone_for_fqdn(&record.name, &zones).ok_or_else(|| {
            ReconcileError::ZoneNotFound {
                name: record.name.clone(),
            }
        })?;
        resolved.push((zone.id.clone(), record.into_zoned(zone.name.clone())));
    }

    // Last writer wins on identical (zone, type, name) triples; the reversal
    // makes unique_by keep it. Sorting afterwards fixes the apply order.
    let ordered = resolved
        .into_iter()
        .rev()
        .unique_by(|(_, r)| (r.zone_name.clone(), r.rtype, r.name.clone()))
        .sorted_by_key(|(_, r)| (r.zone_name.clone(), r.rtype, r.name.clone()))
        .collect_vec();

    let mut summary = Summary::default();
    for (zone_id, record) in ordered {
        let existing = provider.find_record(&zone_id, record.rtype, &record.name)?;
        let decision = decide(&record, existing.as_ref());

        match mode {
            Mode::Plan => {
                match decision {
                    Decision::Create => println!(
                        "PLAN create: {} -> {} proxied={} ttl={}",
                        record, record.content, record.proxied as u8, record.ttl
                    ),
                    Decision::Update { .. } => println!(
                        "PLAN update: {} -> {} proxied={} ttl={}",
                        record, record.content, record.proxied as u8, record.ttl
                    ),
                    Decision::NoChange => println!("PLAN ok: {} (no change)", record),
                }
                summary.planned += 1;
            }
            Mode::Apply => match decision {
                Decision::Create => {
                    provider.create_record(&zone_id, &record)?;
                    summary.created += 1;
                    println!("CREATED: {}", record);
                }
                Decision::Update { record_id } => {
                    if record_id.is_empty() {
                        return Err(ReconcileError::MissingRecordId { name: record.name });
                    }
                    provider.update_record(&zone_id, &record_id, &record)?;
                    summary.updated += 1;
                    println!("UPDATED: {}", record);
                }
                Decision::NoChange => {
                    summary.unchanged += 1;
                    println!("OK: {} (no change)", record);
                }
            },
        }
    }

    match mode {
        Mode::Apply => println!(
            "Done. created={} updated={} unchanged={}",
            summary.created, summary.updated, summary.unchanged
        ),
        Mode::Plan => println!("Done. planned_records={}", summary.planned),
    }
    Ok(summary)
}
