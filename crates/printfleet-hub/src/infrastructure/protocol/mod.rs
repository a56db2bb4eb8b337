//! Protocol client contracts.
//!
//! The hub never speaks a wire protocol itself. A [`ProtocolClientFactory`]
//! hands out already-connected client objects for one printer; backend
//! adapters compose one or two of them:
//!
//! | Client            | Transport                          | Used by            |
//! |-------------------|------------------------------------|--------------------|
//! | [`LegacyClient`]  | TCP, line-based G-code (`~M115`)   | every backend      |
//! | [`HttpApiClient`] | HTTP/JSON detail and control API   | dual-API backends  |
//!
//! The `simulated` sub-module provides in-memory printers implementing both
//! traits; the binary's `--simulate` mode and the integration tests use them.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use printfleet_core::{
    BackendKind, ConnectionParameters, FiltrationMode, JobCommand, JobProgress, MaterialCommand,
    MaterialStationState, Temperatures,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("could not connect to {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error("printer rejected {command:?}: {reply}")]
    Rejected { command: String, reply: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("client is closed")]
    Closed,
}

/// Status as reported over the legacy TCP channel (`~M119` / `~M105` / `~M27`).
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyStatus {
    /// Raw machine status keyword, e.g. `READY` or `BUILDING_FROM_SD`.
    pub status_text: String,
    pub temperatures: Temperatures,
    pub progress_percent: f32,
    pub file_name: Option<String>,
    pub led_on: Option<bool>,
}

/// Full detail document returned by the HTTP API.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineDetail {
    pub status_text: String,
    pub temperatures: Temperatures,
    pub job: Option<JobProgress>,
    /// Stream URL advertised by the printer when a camera is fitted.
    pub camera_stream_url: Option<String>,
    /// `None` when the printer has no controllable light.
    pub led_on: Option<bool>,
    /// `None` when no filtration module is fitted.
    pub filtration: Option<FiltrationMode>,
    /// `None` when the model has no material-station port.
    pub material_station: Option<MaterialStationState>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LegacyClient: Send + Sync {
    /// Sends one G-code line and returns the raw reply.
    async fn send_command(&self, command: &str) -> Result<String, ClientError>;

    async fn machine_status(&self) -> Result<LegacyStatus, ClientError>;

    async fn close(&self);
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpApiClient: Send + Sync {
    async fn fetch_detail(&self) -> Result<MachineDetail, ClientError>;

    async fn job_control(&self, command: JobCommand) -> Result<(), ClientError>;

    async fn set_led(&self, on: bool) -> Result<(), ClientError>;

    async fn set_filtration(&self, mode: FiltrationMode) -> Result<(), ClientError>;

    async fn material_command(&self, command: MaterialCommand) -> Result<(), ClientError>;

    async fn close(&self);
}

/// Client handles for one printer.
#[derive(Clone)]
pub struct ProtocolClients {
    pub legacy: Arc<dyn LegacyClient>,
    pub http: Option<Arc<dyn HttpApiClient>>,
}

/// Opens the protocol clients a backend variant needs.
#[async_trait]
pub trait ProtocolClientFactory: Send + Sync {
    async fn connect(
        &self,
        params: &ConnectionParameters,
        kind: BackendKind,
    ) -> Result<ProtocolClients, ClientError>;
}
