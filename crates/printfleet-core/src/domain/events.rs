//! Events published by the hub.
//!
//! The same enum is delivered to in-process subscribers and serialised for
//! the remote transport as `{"event": "<kebab-name>", "payload": {...}}`.
//! Connection parameters inside `session-created` never carry the check code.

use serde::{Deserialize, Serialize};

use super::backend::BackendKind;
use super::features::FeatureSet;
use super::session::{ConnectionParameters, ConnectionState, SessionId};
use super::snapshot::PollingSnapshot;

/// Event families a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventFamily {
    Session,
    Backend,
    Polling,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum FleetEvent {
    SessionCreated {
        id: SessionId,
        connection: ConnectionParameters,
    },
    SessionRemoving {
        id: SessionId,
    },
    SessionRemoved {
        id: SessionId,
    },
    SessionSwitched {
        from_id: Option<SessionId>,
        to_id: SessionId,
    },
    ConnectionStateChanged {
        id: SessionId,
        from: ConnectionState,
        to: ConnectionState,
    },
    BackendReady {
        id: SessionId,
        kind: BackendKind,
        feature_set: FeatureSet,
    },
    BackendFailed {
        id: SessionId,
        cause: String,
    },
    BackendDisposed {
        id: SessionId,
    },
    FeaturesUpdated {
        id: SessionId,
        feature_set: FeatureSet,
    },
    PollingData {
        id: SessionId,
        snapshot: PollingSnapshot,
    },
    CameraRelayStarted {
        id: SessionId,
        port: u16,
        upstream_url: String,
    },
    CameraRelayStopped {
        id: SessionId,
        port: u16,
    },
}

impl FleetEvent {
    pub fn family(&self) -> EventFamily {
        match self {
            FleetEvent::SessionCreated { .. }
            | FleetEvent::SessionRemoving { .. }
            | FleetEvent::SessionRemoved { .. }
            | FleetEvent::SessionSwitched { .. }
            | FleetEvent::ConnectionStateChanged { .. } => EventFamily::Session,
            FleetEvent::BackendReady { .. }
            | FleetEvent::BackendFailed { .. }
            | FleetEvent::BackendDisposed { .. }
            | FleetEvent::FeaturesUpdated { .. } => EventFamily::Backend,
            FleetEvent::PollingData { .. } => EventFamily::Polling,
            FleetEvent::CameraRelayStarted { .. } | FleetEvent::CameraRelayStopped { .. } => {
                EventFamily::Relay
            }
        }
    }

    /// The session the event is about. For `session-switched` this is the
    /// newly active session.
    pub fn session_id(&self) -> &SessionId {
        match self {
            FleetEvent::SessionCreated { id, .. }
            | FleetEvent::SessionRemoving { id }
            | FleetEvent::SessionRemoved { id }
            | FleetEvent::ConnectionStateChanged { id, .. }
            | FleetEvent::BackendReady { id, .. }
            | FleetEvent::BackendFailed { id, .. }
            | FleetEvent::BackendDisposed { id }
            | FleetEvent::FeaturesUpdated { id, .. }
            | FleetEvent::PollingData { id, .. }
            | FleetEvent::CameraRelayStarted { id, .. }
            | FleetEvent::CameraRelayStopped { id, .. } => id,
            FleetEvent::SessionSwitched { to_id, .. } => to_id,
        }
    }

    /// Kebab-case event name, as used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            FleetEvent::SessionCreated { .. } => "session-created",
            FleetEvent::SessionRemoving { .. } => "session-removing",
            FleetEvent::SessionRemoved { .. } => "session-removed",
            FleetEvent::SessionSwitched { .. } => "session-switched",
            FleetEvent::ConnectionStateChanged { .. } => "connection-state-changed",
            FleetEvent::BackendReady { .. } => "backend-ready",
            FleetEvent::BackendFailed { .. } => "backend-failed",
            FleetEvent::BackendDisposed { .. } => "backend-disposed",
            FleetEvent::FeaturesUpdated { .. } => "features-updated",
            FleetEvent::PollingData { .. } => "polling-data",
            FleetEvent::CameraRelayStarted { .. } => "camera-relay-started",
            FleetEvent::CameraRelayStopped { .. } => "camera-relay-stopped",
        }
    }
}
