//! Turns a fetched feed into the set of retained entries

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, warn};

use crate::entry::{FeedEntry, ProcessedEntry, ATTR_DISTANCE};
use crate::error::{EntryError, EntryFailure};
use crate::extractor::AttributeExtractor;
use crate::filter::EntryFilter;
use crate::geometry::GeoDistanceCalculator;

/// Outcome of processing one fetched feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingReport {
    /// Retained entries, in feed order
    pub entries: Vec<ProcessedEntry>,
    /// Entries excluded because they could not be processed
    pub failures: Vec<EntryFailure>,
    pub without_geometry: usize,
    pub out_of_range: usize,
    pub filtered_out: usize,
}

impl ProcessingReport {
    pub fn external_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.external_id.clone()).collect()
    }
}

/// Distance, radius, extraction and filtering for a single feed
#[derive(Debug, Clone)]
pub struct FeedEntryProcessor {
    calculator: GeoDistanceCalculator,
    radius_km: f64,
    extractor: AttributeExtractor,
    filter: EntryFilter,
}

impl FeedEntryProcessor {
    pub fn new(
        calculator: GeoDistanceCalculator,
        radius_km: f64,
        extractor: AttributeExtractor,
        filter: EntryFilter,
    ) -> Self {
        Self {
            calculator,
            radius_km,
            extractor,
            filter,
        }
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Process raw entries in feed order
    ///
    /// Entries without geometry are dropped silently. Entries whose geometry
    /// or identifier is unusable are reported as failures and never abort
    /// the batch. An entry on the radius boundary is kept.
    pub fn process(&self, raw: Vec<FeedEntry>) -> ProcessingReport {
        let mut report = ProcessingReport::default();
        let mut seen = HashSet::new();

        for (index, entry) in raw.into_iter().enumerate() {
            let fail = |report: &mut ProcessingReport, entry: &FeedEntry, error: EntryError| {
                let external_id = entry.external_id();
                warn!(index, external_id = ?external_id, error = %error, "Skipping feed entry");
                report.failures.push(EntryFailure {
                    index,
                    external_id,
                    error,
                });
            };

            let geometry = match entry.resolve_geometry() {
                Ok(Some(geometry)) => geometry,
                Ok(None) => {
                    report.without_geometry += 1;
                    continue;
                }
                Err(error) => {
                    fail(&mut report, &entry, error);
                    continue;
                }
            };

            let distance = match self.calculator.distance(&geometry) {
                Ok(distance) => distance,
                Err(error) => {
                    fail(&mut report, &entry, error.into());
                    continue;
                }
            };

            if distance > self.radius_km {
                report.out_of_range += 1;
                continue;
            }

            let Some(external_id) = entry.external_id() else {
                fail(&mut report, &entry, EntryError::MissingIdentifier);
                continue;
            };

            let mut attributes = entry.attributes;
            attributes.insert(ATTR_DISTANCE.to_string(), json!(distance));
            self.extractor.apply(&mut attributes);

            if !self.filter.keep(&attributes) {
                report.filtered_out += 1;
                continue;
            }

            if !seen.insert(external_id.clone()) {
                warn!(index, external_id = %external_id, "Duplicate entry identifier");
                report.failures.push(EntryFailure {
                    index,
                    external_id: Some(external_id.clone()),
                    error: EntryError::DuplicateIdentifier(external_id),
                });
                continue;
            }

            report.entries.push(ProcessedEntry {
                external_id,
                distance,
                geometry,
                attributes,
            });
        }

        debug!(
            retained = report.entries.len(),
            failed = report.failures.len(),
            without_geometry = report.without_geometry,
            out_of_range = report.out_of_range,
            filtered_out = report.filtered_out,
            "Processed feed entries"
        );

        report
    }
}
