//! Support for observing running simulations.

pub mod tracing;
