//! Permission inheritance for organization collections.
//!
//! Collections form a hierarchy only through their names: `Parent/Child` is
//! a child of `Parent`. The [`InheritanceEngine`] copies a set of user and
//! group permissions onto a list of target collections, one at a time, and
//! reports which targets could not be updated.

pub mod engine;
pub mod hierarchy;
pub mod permissions;
pub mod report;

pub use engine::{InheritanceEngine, InheritanceObserver};
pub use hierarchy::{children_of, find_by_name, SEPARATOR};
pub use permissions::PermissionSet;
pub use report::{FailureReason, InheritanceFailure, InheritanceReport, TargetOutcome};
