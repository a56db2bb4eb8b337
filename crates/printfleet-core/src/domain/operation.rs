//! Uniform operations dispatched to backend adapters.
//!
//! Each operation names the [`Capability`] it needs; the hub refuses to route
//! an operation whose capability is unavailable in the session's feature set.

use serde::{Deserialize, Serialize};

use super::features::Capability;
use super::snapshot::PollingSnapshot;

/// Filtration fan mode (5M Pro).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FiltrationMode {
    Off,
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum JobCommand {
    Pause,
    Resume,
    Cancel,
    /// Acknowledge a finished job so the next one can start.
    ClearPlatform,
    /// Start a file already stored on the printer.
    StartLocal { file_name: String, auto_level: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum MaterialCommand {
    /// Feed the spool in `slot` to the toolhead.
    LoadSlot { slot: u8 },
    /// Retract the currently loaded filament back into the station.
    Unload,
}

/// Operation routed through `BackendCoordinator::dispatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Operation {
    StatusQuery,
    Job(JobCommand),
    Material(MaterialCommand),
    SetLed { on: bool },
    SetFiltration { mode: FiltrationMode },
    /// Raw G-code line sent over the legacy channel.
    RawCommand { command: String },
}

impl Operation {
    pub fn required_capability(&self) -> Capability {
        match self {
            Operation::StatusQuery => Capability::StatusMonitoring,
            Operation::Job(_) => Capability::JobControl,
            Operation::Material(_) => Capability::MaterialMultiplexing,
            Operation::SetLed { .. } => Capability::Led,
            Operation::SetFiltration { .. } => Capability::Filtration,
            Operation::RawCommand { .. } => Capability::CommandExecution,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::StatusQuery => "status-query",
            Operation::Job(_) => "job-control",
            Operation::Material(_) => "material-control",
            Operation::SetLed { .. } => "set-led",
            Operation::SetFiltration { .. } => "set-filtration",
            Operation::RawCommand { .. } => "raw-command",
        }
    }
}

/// Result of a dispatched operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum OperationOutcome {
    Status { snapshot: PollingSnapshot },
    Accepted,
    /// Raw reply text from the printer.
    Response { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_maps_to_a_capability() {
        let cases = [
            (Operation::StatusQuery, Capability::StatusMonitoring),
            (Operation::Job(JobCommand::Pause), Capability::JobControl),
            (
                Operation::Material(MaterialCommand::Unload),
                Capability::MaterialMultiplexing,
            ),
            (Operation::SetLed { on: true }, Capability::Led),
            (
                Operation::SetFiltration {
                    mode: FiltrationMode::Internal,
                },
                Capability::Filtration,
            ),
            (
                Operation::RawCommand {
                    command: "M115".to_string(),
                },
                Capability::CommandExecution,
            ),
        ];
        for (op, cap) in cases {
            assert_eq!(op.required_capability(), cap, "{}", op.name());
        }
    }

    #[test]
    fn test_operation_json_shape() {
        let op = Operation::Job(JobCommand::StartLocal {
            file_name: "benchy.gcode".to_string(),
            auto_level: true,
        });
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "job");
        assert_eq!(json["command"], "start-local");
        assert_eq!(json["file_name"], "benchy.gcode");
    }
}
