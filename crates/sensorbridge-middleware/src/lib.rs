//! `sensorbridge-middleware` – the handoff point between producers and
//! consumers.
//!
//! Both bridges share one primitive: a [`LatestSlot`] holding at most one
//! value.  Producers overwrite it; consumers either take the value (capture
//! side) or copy it out (pose side).  Nothing is queued.

pub mod slot;

pub use slot::LatestSlot;
