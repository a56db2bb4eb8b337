//! Application layer: the coordinators that own per-session state.
//!
//! Every coordinator is an explicitly constructed instance held by the
//! [`fleet::Fleet`] composition root; there are no global singletons. All
//! derived state (adapter, feature set, snapshot cache, port lease) is keyed
//! by the registry's `SessionId`.
//!
//! # Sub-modules
//!
//! - **`event_bus`** – typed publish/subscribe for [`FleetEvent`]s plus the
//!   separate UI channel that only carries the active session's data.
//! - **`session_registry`** – canonical, insertion-ordered set of sessions and
//!   the single active selection.
//! - **`backend_coordinator`** – adapter construction, de-duplicated
//!   initialization, feature resolution, dispatch and disposal.
//! - **`polling_coordinator`** – one independent poll loop per session with a
//!   snapshot cache for instant switching.
//! - **`fleet`** – wires the coordinators together and owns the teardown order.
//!
//! [`FleetEvent`]: printfleet_core::FleetEvent

pub mod backend_coordinator;
pub mod event_bus;
pub mod fleet;
pub mod polling_coordinator;
pub mod session_registry;
