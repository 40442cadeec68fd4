//! Capture session module
//!
//! This module implements the redundant capture architecture:
//! - CaptureSession state machine and file layout
//! - CaptureStrategy table mapping capture kinds to FFmpeg arguments
//! - CaptureSupervisor driving a session from resolution to reconciliation

pub mod state;
pub mod strategy;
pub mod supervisor;

pub use state::{
    new_session_id, CaptureKind, CaptureSession, CaptureSlot, CaptureTask, SessionLayout,
    SessionReport, SessionState,
};
pub use strategy::{CaptureArgs, CaptureStrategy};
pub use supervisor::CaptureSupervisor;
