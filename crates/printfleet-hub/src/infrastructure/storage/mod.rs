//! Storage infrastructure: configuration loading and the per-printer
//! capability overrides derived from it.
//!
//! - **`config`** – the TOML schema with serde defaults and `load_config`.
//! - **`overrides`** – the `OverrideSource` contract and its config-backed
//!   implementation.
//!
//! Configuration is read-only here; the desktop UI owns writing it.

pub mod config;
pub mod overrides;
