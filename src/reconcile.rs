//! Out-of-band sweep for orphaned picture objects.
//!
//! Lists the picture folder, cross-checks against the identifiers referenced
//! by live records and deletes what nobody references. Objects younger than
//! the grace period are left alone: a create uploads before it inserts, so a
//! fresh unreferenced object may belong to a request still in flight.

use crate::codec::{ObjectIdentifier, derive_identifier};
use crate::core::{ProfileId, Result};
use crate::storage::{ObjectStore, RecordStore};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_GRACE: Duration = Duration::from_secs(600);
const DELETE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Objects found in the folder
    pub scanned: usize,
    /// Distinct identifiers referenced by live records
    pub referenced: usize,
    /// Unreferenced objects older than the grace period
    pub orphans: Vec<ObjectIdentifier>,
    pub deleted: Vec<ObjectIdentifier>,
    pub failed: Vec<ObjectIdentifier>,
    /// Unreferenced objects spared because they are too recent
    pub skipped_recent: usize,
    /// Records whose picture is missing from the folder listing
    pub dangling: Vec<ProfileId>,
}

pub struct Reconciler {
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    folder: String,
    grace: Duration,
}

impl Reconciler {
    pub fn new(records: Arc<dyn RecordStore>, objects: Arc<dyn ObjectStore>, folder: &str) -> Self {
        Self {
            records,
            objects,
            folder: folder.trim_matches('/').to_string(),
            grace: DEFAULT_GRACE,
        }
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs one sweep. With `dry_run` nothing is deleted.
    pub async fn run(&self, dry_run: bool) -> Result<ReconcileReport> {
        self.run_at(Utc::now(), dry_run).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>, dry_run: bool) -> Result<ReconcileReport> {
        let listed = self.objects.list(&self.folder).await?;
        let profiles = self.records.list().await?;

        let mut referenced = BTreeSet::new();
        let mut references = Vec::new();
        for profile in &profiles {
            let Some(picture) = &profile.picture else {
                continue;
            };
            match derive_identifier(picture.url(), &self.folder) {
                Ok(identifier) => {
                    referenced.insert(identifier.clone());
                    references.push((profile.id.clone(), identifier));
                }
                Err(err) => {
                    warn!(profile_id = %profile.id, error = %err, "reference not resolvable; ignored by sweep");
                }
            }
        }

        let present: BTreeSet<_> = listed.iter().map(|object| object.identifier.clone()).collect();
        // A grace beyond chrono's range spares everything with a known age.
        let cutoff = chrono::Duration::from_std(self.grace)
            .ok()
            .and_then(|grace| now.checked_sub_signed(grace))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = ReconcileReport {
            scanned: listed.len(),
            referenced: referenced.len(),
            ..ReconcileReport::default()
        };

        for object in listed {
            if referenced.contains(&object.identifier) {
                continue;
            }
            // Unknown age counts as old enough.
            if object.created_at.is_some_and(|created| created > cutoff) {
                report.skipped_recent += 1;
                continue;
            }
            report.orphans.push(object.identifier);
        }

        report.dangling = references
            .into_iter()
            .filter(|(_, identifier)| {
                identifier.folder() == self.folder && !present.contains(identifier)
            })
            .map(|(id, _)| id)
            .collect();

        if !dry_run {
            let outcomes: Vec<_> = stream::iter(report.orphans.clone())
                .map(|identifier| async move {
                    let outcome = self.objects.delete(&identifier).await;
                    (identifier, outcome)
                })
                .buffer_unordered(DELETE_CONCURRENCY)
                .collect()
                .await;

            for (identifier, outcome) in outcomes {
                match outcome {
                    Ok(_) => report.deleted.push(identifier),
                    Err(err) => {
                        warn!(identifier = %identifier, error = %err, "orphan delete failed");
                        report.failed.push(identifier);
                    }
                }
            }
            report.deleted.sort();
            report.failed.sort();
        }

        info!(
            folder = %self.folder,
            scanned = report.scanned,
            orphans = report.orphans.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            dangling = report.dangling.len(),
            dry_run,
            "reconciliation finished"
        );
        Ok(report)
    }
}
