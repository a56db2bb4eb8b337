//! Polling snapshot: the latest full status payload of a session.
//!
//! Only the most recent snapshot per session is kept; older ones are
//! discarded, not versioned.

use serde::{Deserialize, Serialize};

use super::operation::FiltrationMode;

/// Coarse machine state, normalised across protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MachineState {
    Idle,
    Printing,
    Paused,
    Completed,
    Heating,
    Calibrating,
    Busy,
    Error,
    Unknown,
}

impl MachineState {
    /// Parses the status keyword reported by either printer protocol.
    pub fn from_status_text(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "READY" | "IDLE" => MachineState::Idle,
            "BUILDING" | "PRINTING" | "BUILDING_FROM_SD" => MachineState::Printing,
            "PAUSED" | "PAUSING" => MachineState::Paused,
            "COMPLETED" | "FINISHED" => MachineState::Completed,
            "HEATING" => MachineState::Heating,
            "CALIBRATE_DOING" | "CALIBRATING" => MachineState::Calibrating,
            "BUSY" => MachineState::Busy,
            "ERROR" => MachineState::Error,
            _ => MachineState::Unknown,
        }
    }

    /// Returns `true` while a job occupies the printer.
    pub fn is_job_active(self) -> bool {
        matches!(self, MachineState::Printing | MachineState::Paused | MachineState::Heating)
    }
}

/// Current and target temperature of one heater, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Temperature {
    pub current: f32,
    pub target: f32,
}

impl Temperature {
    pub fn new(current: f32, target: f32) -> Self {
        Self { current, target }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Temperatures {
    pub extruder: Temperature,
    pub bed: Temperature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chamber: Option<Temperature>,
}

/// Progress of the job currently on the printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub file_name: String,
    /// 0.0 ..= 100.0
    pub progress_percent: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_layer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_layers: Option<u32>,
    pub elapsed_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
}

/// One spool slot of a material station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSlot {
    pub index: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    /// Hex colour such as `#FF8800`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialStationState {
    pub connected: bool,
    pub slots: Vec<MaterialSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_slot: Option<u8>,
}

/// Latest known full status of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSnapshot {
    pub machine_state: MachineState,
    pub temperatures: Temperatures,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_station: Option<MaterialStationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtration: Option<FiltrationMode>,
    /// Unix milliseconds at which the status was read.
    pub captured_at: u64,
}

impl PollingSnapshot {
    /// An idle snapshot with only temperatures filled in.
    pub fn idle(temperatures: Temperatures, captured_at: u64) -> Self {
        Self {
            machine_state: MachineState::Idle,
            temperatures,
            job: None,
            material_station: None,
            led_on: None,
            filtration: None,
            captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_parsing_covers_both_protocols() {
        assert_eq!(MachineState::from_status_text("READY"), MachineState::Idle);
        assert_eq!(MachineState::from_status_text("BUILDING_FROM_SD"), MachineState::Printing);
        assert_eq!(MachineState::from_status_text("printing"), MachineState::Printing);
        assert_eq!(MachineState::from_status_text(" paused "), MachineState::Paused);
        assert_eq!(MachineState::from_status_text("CALIBRATE_DOING"), MachineState::Calibrating);
        assert_eq!(MachineState::from_status_text("???"), MachineState::Unknown);
    }

    #[test]
    fn test_job_active_states() {
        assert!(MachineState::Printing.is_job_active());
        assert!(MachineState::Paused.is_job_active());
        assert!(!MachineState::Idle.is_job_active());
        assert!(!MachineState::Completed.is_job_active());
    }

    #[test]
    fn test_idle_snapshot_omits_optional_sections_in_json() {
        let snap = PollingSnapshot::idle(
            Temperatures {
                extruder: Temperature::new(24.5, 0.0),
                bed: Temperature::new(23.0, 0.0),
                chamber: None,
            },
            1_000,
        );
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["machine_state"], "idle");
        assert!(json.get("job").is_none());
        assert!(json.get("material_station").is_none());
        assert!(json["temperatures"].get("chamber").is_none());
    }
}
