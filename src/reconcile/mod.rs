//! Reconciliation module
//!
//! This module turns duplicate partial recordings into one verified
//! file: content comparison, size-based selection, a three step mux, and
//! a read-back integrity check.

pub mod hash;
pub mod pipeline;
pub mod types;

pub use pipeline::{select_canonical, verify_artifact, ReconciliationEngine};
pub use types::{
    Disposition, MuxStep, PairSelection, ReconcileError, ReconcileStage, ReconciliationResult,
    SelectionReason, StepOutput,
};
