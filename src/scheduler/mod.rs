//! Liveness scheduling
//!
//! The poller and the single-flight table it owns.

pub mod poller;
pub mod table;

pub use poller::{LivenessOutcome, PollSummary, Scheduler, SchedulerConfig};
pub use table::{ClaimOutcome, SourceClaim, SourceStateTable};
