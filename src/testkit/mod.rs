//! Test support: in-memory stores, a scripted venue, and domain builders.
//!
//! Compiled for unit tests and behind the `testkit` feature for the
//! integration suites.

pub mod domain;
pub mod store;
pub mod venue;
