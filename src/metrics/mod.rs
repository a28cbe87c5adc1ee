//! Metrics for the dispatch subsystem
//!
//! Counters are registered on a private prometheus registry. Exposition is
//! left to whatever serves the process; callers read values through
//! `DispatchMetrics` or render the registry as text.

pub mod collector;

pub use collector::{DispatchMetrics, DispatchOutcome};
