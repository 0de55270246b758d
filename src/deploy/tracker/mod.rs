//! Startup barrier
//!
//! Observes unit lifecycle transitions and starts accumulated batches once
//! their cohort completes.

pub mod start_tracker;

pub use start_tracker::StartTracker;
