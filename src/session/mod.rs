//! Capture session - channel hopping loop and its state

mod orchestrator;
mod state;

pub use orchestrator::CaptureOrchestrator;
pub use state::{CaptureSession, SessionOutcome};
