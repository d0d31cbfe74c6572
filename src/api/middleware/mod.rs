//! API middleware.
//!
//! Only per-client throttling runs in-process; authentication belongs to
//! the main backend that fronts this service.

pub mod rate;
