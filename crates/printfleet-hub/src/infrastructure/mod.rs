//! Infrastructure layer for the hub.
//!
//! Contains the printer-facing adapters: protocol client contracts (plus the
//! simulated printers), the backend adapter variants, the relay port pool and
//! configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `printfleet_core`, but MUST NOT be imported by the domain crate.

pub mod backends;
pub mod protocol;
pub mod relay;
pub mod storage;
