//! Outcome of an inheritance run.

use std::fmt;

/// Why a target could not be updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The collection could not be fetched.
    NotFound,
    /// The vault did not accept the update.
    UpdateFailed,
    /// Anything else that went wrong while handling the target.
    Error(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotFound => f.write_str("not found"),
            FailureReason::UpdateFailed => f.write_str("update failed"),
            FailureReason::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Permissions were written.
    Updated,
    /// Dry run: the collection was fetched but not written.
    Skipped,
    /// The target failed.
    Failed(FailureReason),
}

/// A target that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritanceFailure {
    /// Collection that failed.
    pub collection_id: String,
    /// What went wrong.
    pub reason: FailureReason,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritanceReport {
    /// Targets attempted.
    pub processed: usize,
    /// Targets that succeeded, in order.
    pub succeeded: Vec<String>,
    /// Targets that failed, in order.
    pub failures: Vec<InheritanceFailure>,
}

impl InheritanceReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one target.
    pub fn record(&mut self, collection_id: &str, outcome: &TargetOutcome) {
        self.processed += 1;
        match outcome {
            TargetOutcome::Updated | TargetOutcome::Skipped => {
                self.succeeded.push(collection_id.to_string())
            }
            TargetOutcome::Failed(reason) => self.failures.push(InheritanceFailure {
                collection_id: collection_id.to_string(),
                reason: reason.clone(),
            }),
        }
    }

    /// Check if every target succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for InheritanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} succeeded, {} failed",
            self.processed,
            self.succeeded.len(),
            self.failures.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut report = InheritanceReport::new();
        assert!(report.is_success());

        report.record("c1", &TargetOutcome::Updated);
        report.record("c2", &TargetOutcome::Failed(FailureReason::NotFound));
        report.record("c3", &TargetOutcome::Skipped);

        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, vec!["c1", "c3"]);
        assert_eq!(report.failures[0].collection_id, "c2");
        assert!(!report.is_success());
        assert_eq!(report.to_string(), "3 processed, 2 succeeded, 1 failed");
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(FailureReason::UpdateFailed.to_string(), "update failed");
        assert_eq!(
            FailureReason::Error("bad id".to_string()).to_string(),
            "error: bad id"
        );
    }
}
