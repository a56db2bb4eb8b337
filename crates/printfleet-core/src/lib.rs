//! # printfleet-core
//!
//! Shared domain model for PrintFleet, the multi-printer session engine.
//!
//! This crate is used by the hub application and by anything that consumes
//! the hub's event stream (a desktop UI, a remote web transport, integration
//! trackers). It has zero dependencies on async runtimes, sockets, or the
//! file system.
//!
//! # Overview
//!
//! PrintFleet keeps one *session* per connected printer. Each session is
//! served by a *backend adapter* chosen from the printer's declared model, and
//! each adapter exposes a *feature set* describing which capabilities (camera,
//! LED, filtration, job control, ...) are usable right now.
//!
//! - **`domain::session`** – session identity, connection parameters and the
//!   connection state machine.
//! - **`domain::backend`** – the closed set of backend variants and the ordered
//!   model-matching rules that pick one.
//! - **`domain::features`** – the capability model and the pure
//!   [`resolve`](domain::features::resolve) function that merges a backend's
//!   base matrix, a hardware probe and user overrides.
//! - **`domain::snapshot`** – the cached full-status payload produced by polling.
//! - **`domain::operation`** – the uniform operations dispatched to adapters.
//! - **`domain::events`** – the event contract published by the hub.

pub mod domain;

pub use domain::backend::{resolve_backend_kind, BackendKind};
pub use domain::events::{EventFamily, FleetEvent};
pub use domain::features::{
    resolve, validate_overrides, Availability, BaseSupport, Capability, CapabilityMatrix,
    CapabilityOverrides, FeatureSet, HardwareProbe, OverrideRejection, OverrideSetting,
};
pub use domain::operation::{
    FiltrationMode, JobCommand, MaterialCommand, Operation, OperationOutcome,
};
pub use domain::session::{
    unix_millis, ConnectionParameters, ConnectionState, Session, SessionId,
};
pub use domain::snapshot::{
    JobProgress, MachineState, MaterialSlot, MaterialStationState, PollingSnapshot, Temperature,
    Temperatures,
};
