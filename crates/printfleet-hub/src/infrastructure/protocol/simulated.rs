//! In-memory printers that speak both client contracts.
//!
//! A [`SimulatedPrinter`] keeps a tiny machine model (state, temperatures,
//! job, LED, filtration, material station) and mutates it in response to
//! G-code lines and HTTP-style control calls. Test hooks let a caller inject
//! status failures and latency, or slow down and fail connections through
//! the [`SimulatedClientFactory`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use printfleet_core::{
    resolve_backend_kind, BackendKind, ConnectionParameters, FiltrationMode, JobCommand,
    JobProgress, MachineState, MaterialCommand, MaterialSlot, MaterialStationState, Temperature,
    Temperatures,
};
use tracing::debug;

use super::{
    ClientError, HttpApiClient, LegacyClient, LegacyStatus, MachineDetail, ProtocolClientFactory,
    ProtocolClients,
};

const PROGRESS_PER_STATUS: f32 = 2.0;
const MATERIAL_SLOTS: u8 = 4;

#[derive(Debug, Clone)]
struct MachineModel {
    machine: MachineState,
    file_name: Option<String>,
    progress: f32,
    elapsed_secs: u64,
    extruder: Temperature,
    bed: Temperature,
    led_on: bool,
    filtration: FiltrationMode,
    station: Option<MaterialStationState>,
}

pub struct SimulatedPrinter {
    address: String,
    hardware: BackendKind,
    camera: bool,
    model: Mutex<MachineModel>,
    commands: Mutex<Vec<String>>,
    status_failing: AtomicBool,
    status_delay: Mutex<Duration>,
    status_calls: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
}

impl SimulatedPrinter {
    /// Creates an idle printer with the hardware of `hardware`.
    pub fn new(address: impl Into<String>, hardware: BackendKind) -> Self {
        let station = (hardware == BackendKind::Ad5x).then(|| MaterialStationState {
            connected: true,
            slots: (0..MATERIAL_SLOTS)
                .map(|index| MaterialSlot {
                    index,
                    material: Some("PLA".to_string()),
                    color: Some("#FFFFFF".to_string()),
                    loaded: false,
                })
                .collect(),
            active_slot: None,
        });

        Self {
            address: address.into(),
            hardware,
            camera: matches!(hardware, BackendKind::Adventurer5MPro | BackendKind::Ad5x),
            model: Mutex::new(MachineModel {
                machine: MachineState::Idle,
                file_name: None,
                progress: 0.0,
                elapsed_secs: 0,
                extruder: Temperature::new(24.0, 0.0),
                bed: Temperature::new(23.0, 0.0),
                led_on: false,
                filtration: FiltrationMode::Off,
                station,
            }),
            commands: Mutex::new(Vec::new()),
            status_failing: AtomicBool::new(false),
            status_delay: Mutex::new(Duration::ZERO),
            status_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Fits or removes the camera.
    pub fn with_camera(mut self, camera: bool) -> Self {
        self.camera = camera;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// While set, every status read fails with a transport error.
    pub fn set_status_failing(&self, failing: bool) {
        self.status_failing.store(failing, Ordering::SeqCst);
    }

    /// Latency added to every status read.
    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().expect("lock poisoned") = delay;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Every G-code line received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("lock poisoned").clone()
    }

    pub fn machine_state(&self) -> MachineState {
        self.model.lock().expect("lock poisoned").machine
    }

    pub fn led_on(&self) -> bool {
        self.model.lock().expect("lock poisoned").led_on
    }

    fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }

    fn camera_url(&self) -> Option<String> {
        self.camera
            .then(|| format!("http://{}:8080/?action=stream", self.address))
    }

    /// Shared status path: latency, failure injection and job progress.
    async fn read_model(&self) -> Result<MachineModel, ClientError> {
        self.ensure_open()?;
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.status_delay.lock().expect("lock poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.status_failing.load(Ordering::SeqCst) {
            return Err(ClientError::Transport(format!(
                "{}: simulated status failure",
                self.address
            )));
        }

        let mut model = self.model.lock().expect("lock poisoned");
        if model.machine == MachineState::Printing {
            model.progress = (model.progress + PROGRESS_PER_STATUS).min(100.0);
            model.elapsed_secs += 3;
            if model.progress >= 100.0 {
                model.machine = MachineState::Completed;
            }
        }
        Ok(model.clone())
    }

    fn apply_job(&self, command: &JobCommand) -> Result<(), ClientError> {
        let mut model = self.model.lock().expect("lock poisoned");
        match command {
            JobCommand::Pause if model.machine == MachineState::Printing => {
                model.machine = MachineState::Paused;
            }
            JobCommand::Resume if model.machine == MachineState::Paused => {
                model.machine = MachineState::Printing;
            }
            JobCommand::Cancel | JobCommand::ClearPlatform => {
                model.machine = MachineState::Idle;
                model.file_name = None;
                model.progress = 0.0;
                model.elapsed_secs = 0;
                model.extruder.target = 0.0;
                model.bed.target = 0.0;
            }
            JobCommand::StartLocal { file_name, .. } if !model.machine.is_job_active() => {
                model.machine = MachineState::Printing;
                model.file_name = Some(file_name.clone());
                model.progress = 0.0;
                model.elapsed_secs = 0;
                model.extruder.target = 220.0;
                model.bed.target = 60.0;
            }
            other => {
                return Err(ClientError::Rejected {
                    command: format!("{other:?}"),
                    reply: format!("printer is {:?}", model.machine),
                })
            }
        }
        Ok(())
    }

    fn temperatures(model: &MachineModel) -> Temperatures {
        Temperatures {
            extruder: model.extruder,
            bed: model.bed,
            chamber: None,
        }
    }
}

#[async_trait]
impl LegacyClient for SimulatedPrinter {
    async fn send_command(&self, command: &str) -> Result<String, ClientError> {
        self.ensure_open()?;
        self.commands
            .lock()
            .expect("lock poisoned")
            .push(command.to_string());

        let line = command.trim().trim_start_matches('~');
        let (code, args) = line.split_once(' ').unwrap_or((line, ""));

        let applied = match code {
            "M23" => {
                let file_name = args.trim().trim_start_matches("0:/user/").to_string();
                self.apply_job(&JobCommand::StartLocal {
                    file_name,
                    auto_level: false,
                })
            }
            "M24" => self.apply_job(&JobCommand::Resume),
            "M25" => self.apply_job(&JobCommand::Pause),
            "M26" => self.apply_job(&JobCommand::Cancel),
            "M146" => {
                self.model.lock().expect("lock poisoned").led_on = !args.contains("r0 g0 b0");
                Ok(())
            }
            "M115" => {
                return Ok(format!(
                    "CMD M115 Received.\r\nMachine Type: {}\r\nok\r\n",
                    self.hardware.display_name()
                ))
            }
            _ => Ok(()),
        };

        match applied {
            Ok(()) => Ok(format!("CMD {code} Received.\r\nok\r\n")),
            Err(ClientError::Rejected { reply, .. }) => {
                Ok(format!("CMD {code} Received.\r\n{reply}\r\n"))
            }
            Err(e) => Err(e),
        }
    }

    async fn machine_status(&self) -> Result<LegacyStatus, ClientError> {
        let model = self.read_model().await?;
        let status_text = match model.machine {
            MachineState::Printing => "BUILDING_FROM_SD",
            MachineState::Paused => "PAUSED",
            MachineState::Completed => "COMPLETED",
            _ => "READY",
        };
        Ok(LegacyStatus {
            status_text: status_text.to_string(),
            temperatures: Self::temperatures(&model),
            progress_percent: model.progress,
            file_name: model.file_name,
            led_on: None,
        })
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl HttpApiClient for SimulatedPrinter {
    async fn fetch_detail(&self) -> Result<MachineDetail, ClientError> {
        let model = self.read_model().await?;
        let job = model.file_name.clone().map(|file_name| JobProgress {
            file_name,
            progress_percent: model.progress,
            current_layer: Some((model.progress * 2.0) as u32),
            total_layers: Some(200),
            elapsed_secs: model.elapsed_secs,
            remaining_secs: Some(((100.0 - model.progress) * 3.0) as u64),
        });
        let status_text = match model.machine {
            MachineState::Printing => "PRINTING",
            MachineState::Paused => "PAUSED",
            MachineState::Completed => "COMPLETED",
            _ => "READY",
        };

        Ok(MachineDetail {
            status_text: status_text.to_string(),
            temperatures: Self::temperatures(&model),
            job,
            camera_stream_url: self.camera_url(),
            led_on: Some(model.led_on),
            filtration: (self.hardware == BackendKind::Adventurer5MPro).then_some(model.filtration),
            material_station: model.station,
        })
    }

    async fn job_control(&self, command: JobCommand) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.apply_job(&command)
    }

    async fn set_led(&self, on: bool) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.model.lock().expect("lock poisoned").led_on = on;
        Ok(())
    }

    async fn set_filtration(&self, mode: FiltrationMode) -> Result<(), ClientError> {
        self.ensure_open()?;
        if self.hardware != BackendKind::Adventurer5MPro {
            return Err(ClientError::Rejected {
                command: "setFiltration".to_string(),
                reply: "no filtration module".to_string(),
            });
        }
        self.model.lock().expect("lock poisoned").filtration = mode;
        Ok(())
    }

    async fn material_command(&self, command: MaterialCommand) -> Result<(), ClientError> {
        self.ensure_open()?;
        let mut model = self.model.lock().expect("lock poisoned");
        let station = model.station.as_mut().ok_or_else(|| ClientError::Rejected {
            command: format!("{command:?}"),
            reply: "no material station".to_string(),
        })?;
        match command {
            MaterialCommand::LoadSlot { slot } if slot < MATERIAL_SLOTS => {
                for s in station.slots.iter_mut() {
                    s.loaded = s.index == slot;
                }
                station.active_slot = Some(slot);
            }
            MaterialCommand::LoadSlot { slot } => {
                return Err(ClientError::Rejected {
                    command: format!("load slot {slot}"),
                    reply: "no such slot".to_string(),
                })
            }
            MaterialCommand::Unload => {
                for s in station.slots.iter_mut() {
                    s.loaded = false;
                }
                station.active_slot = None;
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out [`SimulatedPrinter`]s keyed by address.
///
/// The printer's hardware follows the declared model; the client set follows
/// the backend variant, so a forced-legacy session gets no HTTP client.
#[derive(Default)]
pub struct SimulatedClientFactory {
    printers: Mutex<HashMap<String, Arc<SimulatedPrinter>>>,
    connect_delay: Mutex<Duration>,
    fail_connect: AtomicBool,
    connect_attempts: AtomicUsize,
}

impl SimulatedClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pre-built printer under its address.
    pub fn add_printer(&self, printer: SimulatedPrinter) -> Arc<SimulatedPrinter> {
        let printer = Arc::new(printer);
        self.printers
            .lock()
            .expect("lock poisoned")
            .insert(printer.address().to_string(), Arc::clone(&printer));
        printer
    }

    pub fn printer(&self, address: &str) -> Option<Arc<SimulatedPrinter>> {
        self.printers.lock().expect("lock poisoned").get(address).cloned()
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().expect("lock poisoned") = delay;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Number of `connect` calls so far.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolClientFactory for SimulatedClientFactory {
    async fn connect(
        &self,
        params: &ConnectionParameters,
        kind: BackendKind,
    ) -> Result<ProtocolClients, ClientError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        debug!("simulated connect to {} as {kind}", params.address);

        let delay = *self.connect_delay.lock().expect("lock poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Connect {
                address: params.address.clone(),
                reason: "simulated connection refused".to_string(),
            });
        }

        let printer = {
            let mut printers = self.printers.lock().expect("lock poisoned");
            Arc::clone(printers.entry(params.address.clone()).or_insert_with(|| {
                Arc::new(SimulatedPrinter::new(
                    params.address.clone(),
                    resolve_backend_kind(params.model.as_deref()),
                ))
            }))
        };
        printer.reopen();

        let legacy: Arc<dyn LegacyClient> = printer.clone();
        let http = if kind.is_dual_api() {
            Some(printer as Arc<dyn HttpApiClient>)
        } else {
            None
        };
        Ok(ProtocolClients { legacy, http })
    }
}
