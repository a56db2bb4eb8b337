//! Backend adapters: one uniform surface over each printer family.
//!
//! ```text
//! BackendKind::GenericLegacy                    ──► GenericLegacyBackend (legacy TCP only)
//! BackendKind::{Adventurer5M, 5M Pro, Ad5x}     ──► DualApiBackend       (HTTP + legacy TCP)
//! ```
//!
//! Adapters translate [`Operation`]s into protocol calls and protocol status
//! into [`PollingSnapshot`]s. They do not check capabilities; the
//! `BackendCoordinator` refuses unavailable operations before they get here.

pub mod dual_api;
pub mod legacy;

use std::sync::Arc;

use async_trait::async_trait;
use printfleet_core::{
    BackendKind, CapabilityMatrix, HardwareProbe, Operation, OperationOutcome, PollingSnapshot,
};
use thiserror::Error;

use crate::infrastructure::protocol::{ClientError, ProtocolClients};

pub use dual_api::DualApiBackend;
pub use legacy::GenericLegacyBackend;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{operation} is not supported by the {backend} backend")]
    UnsupportedOperation {
        operation: &'static str,
        backend: BackendKind,
    },
    #[error("the {0} backend needs an HTTP API client")]
    MissingHttpClient(BackendKind),
    #[error("backend has been disposed")]
    Disposed,
}

#[async_trait]
pub trait PrinterBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn base_capabilities(&self) -> CapabilityMatrix {
        self.kind().base_capabilities()
    }

    /// Asks the printer which optional hardware is fitted.
    async fn probe_hardware(&self) -> Result<HardwareProbe, BackendError>;

    async fn status(&self) -> Result<PollingSnapshot, BackendError>;

    async fn execute(&self, operation: &Operation) -> Result<OperationOutcome, BackendError>;

    /// Closes the protocol clients. Idempotent.
    async fn dispose(&self);
}

/// Builds the adapter for `kind` from already-connected clients.
pub fn build_backend(
    kind: BackendKind,
    clients: ProtocolClients,
) -> Result<Arc<dyn PrinterBackend>, BackendError> {
    if kind.is_dual_api() {
        let http = clients.http.ok_or(BackendError::MissingHttpClient(kind))?;
        Ok(Arc::new(DualApiBackend::new(kind, clients.legacy, http)))
    } else {
        Ok(Arc::new(GenericLegacyBackend::new(clients.legacy)))
    }
}
