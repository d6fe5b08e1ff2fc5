//! Inheritance engine.

use tracing::{debug, error, info, warn};

use bwkit_client::VaultClient;
use bwkit_common::Result;

use crate::permissions::PermissionSet;
use crate::report::{FailureReason, InheritanceReport, TargetOutcome};

/// Receives progress while a run is in flight.
pub trait InheritanceObserver: Send + Sync {
    /// Called once per target, after it was handled. `index` is zero-based.
    fn on_target(&self, index: usize, total: usize, collection_id: &str, outcome: &TargetOutcome);
}

/// Copies permissions onto organization collections.
///
/// Targets are handled strictly in the given order, one at a time. A failing
/// target is recorded and the run moves on; every target is attempted
/// exactly once.
pub struct InheritanceEngine {
    client: VaultClient,
    dry_run: bool,
}

impl InheritanceEngine {
    /// Create an engine over an object client.
    pub fn new(client: VaultClient) -> Self {
        Self {
            client,
            dry_run: false,
        }
    }

    /// Fetch targets but do not write them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply `users` and `groups` to every target collection.
    ///
    /// An empty set leaves that field of each collection untouched.
    ///
    /// # Postconditions
    /// - `report.processed == targets.len()`
    /// - Failures appear in target order
    pub async fn run(
        &self,
        organization_id: &str,
        targets: &[String],
        users: &PermissionSet,
        groups: &PermissionSet,
        observer: Option<&dyn InheritanceObserver>,
    ) -> InheritanceReport {
        let total = targets.len();
        info!(
            organization_id,
            total,
            users = users.len(),
            groups = groups.len(),
            dry_run = self.dry_run,
            "Starting permission inheritance"
        );

        let mut report = InheritanceReport::new();
        for (index, collection_id) in targets.iter().enumerate() {
            let outcome = match self.apply(organization_id, collection_id, users, groups).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(collection_id = %collection_id, error = %e, "Inheritance failed");
                    TargetOutcome::Failed(FailureReason::Error(e.to_string()))
                }
            };

            if let TargetOutcome::Failed(reason) = &outcome {
                warn!(collection_id = %collection_id, reason = %reason, "Collection not updated");
            }
            report.record(collection_id, &outcome);
            if let Some(observer) = observer {
                observer.on_target(index, total, collection_id, &outcome);
            }
        }

        if report.is_success() {
            info!(processed = report.processed, "Permission inheritance completed");
        } else {
            warn!(
                processed = report.processed,
                failed = report.failures.len(),
                "Permission inheritance completed with failures"
            );
        }
        report
    }

    async fn apply(
        &self,
        organization_id: &str,
        collection_id: &str,
        users: &PermissionSet,
        groups: &PermissionSet,
    ) -> Result<TargetOutcome> {
        let Some(mut collection) = self
            .client
            .org_collection(organization_id, collection_id, None)
            .await?
        else {
            return Ok(TargetOutcome::Failed(FailureReason::NotFound));
        };

        users.apply(&mut collection, "users");
        groups.apply(&mut collection, "groups");

        if self.dry_run {
            debug!(collection_id, name = ?collection.name(), "Dry run, not writing");
            return Ok(TargetOutcome::Skipped);
        }

        match self
            .client
            .org_collection(organization_id, collection_id, Some(&collection))
            .await?
        {
            Some(_) => {
                info!(collection_id, name = ?collection.name(), "Collection updated");
                Ok(TargetOutcome::Updated)
            }
            None => Ok(TargetOutcome::Failed(FailureReason::UpdateFailed)),
        }
    }
}
