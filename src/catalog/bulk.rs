//! Bulk import of books

use serde::Serialize;
use tracing::{info, warn};

use super::Catalog;
use crate::error::{CatalogError, CatalogResult};
use crate::notify::{Notification, Publisher};
use crate::sync::ProgressThrottle;
use crate::types::Attributes;
use crate::utils::{current_timestamp_millis, elapsed_millis};

/// Result of a bulk import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub total: u64,
    pub created: u64,
    pub rejected: u64,
    pub ids: Vec<String>,
}

impl Catalog {
    /// Create many books in one call
    ///
    /// Each item goes through the normal create path. Items with invalid
    /// attributes are skipped; a persistence failure stops the import.
    pub fn bulk_create(&self, items: Vec<Attributes>, user: &str) -> CatalogResult<BulkReport> {
        let total = items.len() as u64;
        let start_time = current_timestamp_millis();
        self.broadcaster
            .publish(Notification::BulkStarted { total, start_time });

        let mut throttle = ProgressThrottle::new(total, self.config.progress_interval);
        let mut report = BulkReport {
            total,
            created: 0,
            rejected: 0,
            ids: Vec::with_capacity(items.len()),
        };

        for (index, attributes) in items.into_iter().enumerate() {
            match self.create(attributes, user) {
                Ok(id) => {
                    report.created += 1;
                    report.ids.push(id);
                }
                Err(CatalogError::InvalidAttributes(reason)) => {
                    warn!(index, reason = %reason, "Bulk item rejected");
                    report.rejected += 1;
                }
                Err(e) => {
                    self.broadcaster.publish(Notification::BulkFinished {
                        total,
                        start_time,
                        created: report.created,
                    });
                    return Err(e);
                }
            }

            if let Some(percent) = throttle.tick(index as u64 + 1) {
                self.broadcaster.publish(Notification::BulkProgress {
                    total,
                    start_time,
                    percent,
                });
            }
        }

        self.broadcaster.publish(Notification::BulkFinished {
            total,
            start_time,
            created: report.created,
        });
        info!(
            total,
            created = report.created,
            rejected = report.rejected,
            elapsed_ms = elapsed_millis(start_time),
            "Bulk import finished"
        );

        Ok(report)
    }
}
