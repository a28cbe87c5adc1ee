//! Producer-facing dispatch API
//!
//! `Dispatcher` turns (queue, payload) into a best-effort enqueue, and the
//! hook module wires it behind axum routes so work is queued only after a
//! successful response.

pub mod dispatcher;
pub mod hook;

pub use dispatcher::{Dispatcher, TaskDispatcher};
pub use hook::{dispatch_on_success, path_id, DispatchHook, PayloadExtractor};
