//! Session domain entity.
//!
//! A session is one logical connection to one printer. The hub's
//! `SessionRegistry` owns the canonical set of sessions; every other component
//! keys its derived state (adapter, snapshot cache, port lease) by
//! [`SessionId`].
//!
//! # Connection lifecycle
//!
//! ```text
//! Uninitialized ──► Connecting ──► Ready ◄──► Degraded
//!                       │            │           │
//!                       ▼            ▼           ▼
//!                     Failed      Disposed    Disposed
//! ```
//!
//! A session holds a backend descriptor exactly while it is `Ready` or
//! `Degraded`.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::backend::BackendKind;

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Opaque, never-reused session identifier (`session-{counter}-{unix_millis}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Builds the identifier for the `counter`-th session created at `created_at_ms`.
    pub fn generate(counter: u64, created_at_ms: u64) -> Self {
        Self(format!("session-{counter}-{created_at_ms}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Validated connection parameters supplied by the connection-flow collaborator.
///
/// The `check_code` credential is accepted on deserialization but never
/// serialized, and is redacted from `Debug` output, so events and logs can
/// carry the parameters safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Name shown in the UI (e.g. "Workshop 5M Pro").
    pub display_name: String,
    /// Host name or IP address of the printer.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing)]
    pub check_code: Option<String>,
    /// Model string as reported during discovery (e.g. "Adventurer 5M Pro").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Pins the session to the legacy protocol even on dual-API printers.
    #[serde(default)]
    pub force_legacy: bool,
}

impl ConnectionParameters {
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            address: address.into(),
            serial_number: None,
            check_code: None,
            model: None,
            force_legacy: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_check_code(mut self, check_code: impl Into<String>) -> Self {
        self.check_code = Some(check_code.into());
        self
    }

    pub fn with_force_legacy(mut self, force_legacy: bool) -> Self {
        self.force_legacy = force_legacy;
        self
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("display_name", &self.display_name)
            .field("address", &self.address)
            .field("serial_number", &self.serial_number)
            .field("check_code", &self.check_code.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("force_legacy", &self.force_legacy)
            .finish()
    }
}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    /// Created; no initialization attempted yet.
    Uninitialized,
    /// Backend initialization in flight.
    Connecting,
    /// Backend attached and polling healthy.
    Ready,
    /// Backend attached but status queries keep failing.
    Degraded,
    /// Initialization failed; a retry is possible.
    Failed,
    /// Resources released; the record is about to disappear.
    Disposed,
}

impl ConnectionState {
    /// Returns `true` for the states in which a backend is attached.
    pub fn has_backend(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Degraded)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Failed => "failed",
            ConnectionState::Disposed => "disposed",
        };
        f.write_str(s)
    }
}

/// Snapshot of one session record as held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub display_name: String,
    pub connection: ConnectionParameters,
    /// Variant of the attached backend; `Some` iff the state is ready or degraded.
    pub backend: Option<BackendKind>,
    pub connection_state: ConnectionState,
    pub is_active: bool,
    /// Relay port leased while a camera relay runs for this session.
    pub proxy_port: Option<u16>,
    pub created_at: u64,
    pub last_activity_at: u64,
}

impl Session {
    /// Creates a fresh, uninitialized, inactive session record.
    pub fn new(id: SessionId, connection: ConnectionParameters, created_at: u64) -> Self {
        Self {
            id,
            display_name: connection.display_name.clone(),
            connection,
            backend: None,
            connection_state: ConnectionState::Uninitialized,
            is_active: false,
            proxy_port: None,
            created_at,
            last_activity_at: created_at,
        }
    }

    /// Returns `true` when the backend/state invariant holds for this record.
    pub fn is_consistent(&self) -> bool {
        self.backend.is_some() == self.connection_state.has_backend()
    }
}
