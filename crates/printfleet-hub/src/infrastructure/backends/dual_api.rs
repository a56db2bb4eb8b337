//! DualApiBackend: Adventurer 5M, 5M Pro and AD5X.
//!
//! Status, job control, LED, filtration and the material station go through
//! the HTTP API; raw G-code still travels over the legacy TCP channel. The
//! hardware probe reads the HTTP detail document once and reports what it
//! mentions; anything it is silent about stays "unknown".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use printfleet_core::{
    unix_millis, BackendKind, Capability, HardwareProbe, MachineState, Operation,
    OperationOutcome, PollingSnapshot,
};
use tracing::debug;

use super::{BackendError, PrinterBackend};
use crate::infrastructure::protocol::{HttpApiClient, LegacyClient, MachineDetail};

pub struct DualApiBackend {
    kind: BackendKind,
    legacy: Arc<dyn LegacyClient>,
    http: Arc<dyn HttpApiClient>,
    disposed: AtomicBool,
}

impl DualApiBackend {
    pub fn new(kind: BackendKind, legacy: Arc<dyn LegacyClient>, http: Arc<dyn HttpApiClient>) -> Self {
        Self {
            kind,
            legacy,
            http,
            disposed: AtomicBool::new(false),
        }
    }

    fn unsupported(&self, operation: &Operation) -> BackendError {
        BackendError::UnsupportedOperation {
            operation: operation.name(),
            backend: self.kind,
        }
    }

    fn ensure_live(&self) -> Result<(), BackendError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(BackendError::Disposed)
        } else {
            Ok(())
        }
    }
}

fn probe_from(detail: &MachineDetail) -> HardwareProbe {
    let mut probe = HardwareProbe::new();
    if let Some(url) = &detail.camera_stream_url {
        probe = probe.with(Capability::Camera, true).with_camera_url(url.clone());
    }
    if detail.led_on.is_some() {
        probe = probe.with(Capability::Led, true);
    }
    if detail.filtration.is_some() {
        probe = probe.with(Capability::Filtration, true);
    }
    if let Some(station) = &detail.material_station {
        probe = probe.with(Capability::MaterialMultiplexing, station.connected);
    }
    probe
}

fn snapshot_from(detail: MachineDetail) -> PollingSnapshot {
    PollingSnapshot {
        machine_state: MachineState::from_status_text(&detail.status_text),
        temperatures: detail.temperatures,
        job: detail.job,
        material_station: detail.material_station,
        led_on: detail.led_on,
        filtration: detail.filtration,
        captured_at: unix_millis(),
    }
}

#[async_trait]
impl PrinterBackend for DualApiBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn probe_hardware(&self) -> Result<HardwareProbe, BackendError> {
        self.ensure_live()?;
        let detail = self.http.fetch_detail().await?;
        Ok(probe_from(&detail))
    }

    async fn status(&self) -> Result<PollingSnapshot, BackendError> {
        self.ensure_live()?;
        Ok(snapshot_from(self.http.fetch_detail().await?))
    }

    async fn execute(&self, operation: &Operation) -> Result<OperationOutcome, BackendError> {
        self.ensure_live()?;
        debug!("{} backend executing {}", self.kind, operation.name());
        match operation {
            Operation::StatusQuery => Ok(OperationOutcome::Status {
                snapshot: self.status().await?,
            }),
            Operation::Job(command) => {
                self.http.job_control(command.clone()).await?;
                Ok(OperationOutcome::Accepted)
            }
            Operation::SetLed { on } => {
                self.http.set_led(*on).await?;
                Ok(OperationOutcome::Accepted)
            }
            Operation::SetFiltration { mode } => {
                if self.kind != BackendKind::Adventurer5MPro {
                    return Err(self.unsupported(operation));
                }
                self.http.set_filtration(*mode).await?;
                Ok(OperationOutcome::Accepted)
            }
            Operation::Material(command) => {
                if self.kind != BackendKind::Ad5x {
                    return Err(self.unsupported(operation));
                }
                self.http.material_command(command.clone()).await?;
                Ok(OperationOutcome::Accepted)
            }
            Operation::RawCommand { command } => {
                let line = if command.starts_with('~') {
                    command.clone()
                } else {
                    format!("~{command}")
                };
                let text = self.legacy.send_command(&line).await?;
                Ok(OperationOutcome::Response { text })
            }
        }
    }

    async fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.http.close().await;
            self.legacy.close().await;
        }
    }
}
