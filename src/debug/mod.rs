//! Debug-build invariant checking.
//!
//! Only compiled when `debug_assertions` are enabled.

pub(crate) mod affinity;
