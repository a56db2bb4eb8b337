//! Domain entities for PrintFleet.
//!
//! Everything here is plain data plus pure functions. Code in the hub's
//! application and infrastructure layers depends on these types, never the
//! other way round, so the rules below can be tested without a runtime.

pub mod backend;
pub mod events;
/// Capability model and resolution.
///
/// See [`features::resolve`] for the precedence rules.
pub mod features;
pub mod operation;
pub mod session;
pub mod snapshot;
