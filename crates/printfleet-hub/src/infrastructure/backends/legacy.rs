//! GenericLegacyBackend: printers reachable only over the legacy TCP channel.
//!
//! Every operation becomes one G-code line. The printer acknowledges with a
//! reply whose last meaningful line is `ok`; anything else is a rejection.
//!
//! | Operation                | G-code                          |
//! |--------------------------|---------------------------------|
//! | start local file         | `~M23 0:/user/<file>`           |
//! | resume                   | `~M24`                          |
//! | pause                    | `~M25`                          |
//! | cancel                   | `~M26`                          |
//! | LED on / off             | `~M146 r255 g255 b255 F0` / `~M146 r0 g0 b0 F0` |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use printfleet_core::{
    unix_millis, BackendKind, HardwareProbe, JobCommand, JobProgress, MachineState, Operation,
    OperationOutcome, PollingSnapshot,
};
use tracing::debug;

use super::{BackendError, PrinterBackend};
use crate::infrastructure::protocol::{ClientError, LegacyClient, LegacyStatus};

pub struct GenericLegacyBackend {
    legacy: Arc<dyn LegacyClient>,
    disposed: AtomicBool,
}

impl GenericLegacyBackend {
    pub fn new(legacy: Arc<dyn LegacyClient>) -> Self {
        Self {
            legacy,
            disposed: AtomicBool::new(false),
        }
    }

    fn gcode_for(operation: &Operation) -> Option<String> {
        let line = match operation {
            Operation::Job(JobCommand::StartLocal { file_name, .. }) => {
                format!("~M23 0:/user/{file_name}")
            }
            Operation::Job(JobCommand::Resume) => "~M24".to_string(),
            Operation::Job(JobCommand::Pause) => "~M25".to_string(),
            Operation::Job(JobCommand::Cancel) => "~M26".to_string(),
            Operation::SetLed { on: true } => "~M146 r255 g255 b255 F0".to_string(),
            Operation::SetLed { on: false } => "~M146 r0 g0 b0 F0".to_string(),
            _ => return None,
        };
        Some(line)
    }

    async fn send_checked(&self, command: &str) -> Result<(), BackendError> {
        let reply = self.legacy.send_command(command).await?;
        if acknowledged(&reply) {
            Ok(())
        } else {
            Err(ClientError::Rejected {
                command: command.to_string(),
                reply: reply.trim().to_string(),
            }
            .into())
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

/// `true` when any reply line is exactly `ok`.
fn acknowledged(reply: &str) -> bool {
    reply.lines().any(|l| l.trim().eq_ignore_ascii_case("ok"))
}

fn snapshot_from(status: LegacyStatus) -> PollingSnapshot {
    let job = status.file_name.map(|file_name| JobProgress {
        file_name,
        progress_percent: status.progress_percent,
        current_layer: None,
        total_layers: None,
        elapsed_secs: 0,
        remaining_secs: None,
    });
    PollingSnapshot {
        machine_state: MachineState::from_status_text(&status.status_text),
        temperatures: status.temperatures,
        job,
        material_station: None,
        led_on: status.led_on,
        filtration: None,
        captured_at: unix_millis(),
    }
}

#[async_trait]
impl PrinterBackend for GenericLegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GenericLegacy
    }

    /// The legacy protocol cannot describe optional hardware, so the probe
    /// only verifies the printer answers.
    async fn probe_hardware(&self) -> Result<HardwareProbe, BackendError> {
        self.ensure_live()?;
        self.legacy.machine_status().await?;
        Ok(HardwareProbe::new())
    }

    async fn status(&self) -> Result<PollingSnapshot, BackendError> {
        self.ensure_live()?;
        Ok(snapshot_from(self.legacy.machine_status().await?))
    }

    async fn execute(&self, operation: &Operation) -> Result<OperationOutcome, BackendError> {
        self.ensure_live()?;
        match operation {
            Operation::StatusQuery => Ok(OperationOutcome::Status {
                snapshot: self.status().await?,
            }),
            Operation::RawCommand { command } => {
                let line = if command.starts_with('~') {
                    command.clone()
                } else {
                    format!("~{command}")
                };
                let text = self.legacy.send_command(&line).await?;
                Ok(OperationOutcome::Response { text })
            }
            other => {
                let line = Self::gcode_for(other).ok_or(BackendError::UnsupportedOperation {
                    operation: other.name(),
                    backend: BackendKind::GenericLegacy,
                })?;
                debug!("legacy backend sending {line}");
                self.send_checked(&line).await?;
                Ok(OperationOutcome::Accepted)
            }
        }
    }

    async fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.legacy.close().await;
        }
    }
}
