//! Fleet: the composition root of the hub.
//!
//! A [`Fleet`] owns one registry, one backend coordinator, one polling
//! coordinator, one port allocator and the event bus that ties them together.
//! Nothing here is global; tests build as many fleets as they like.
//!
//! # Reactor
//!
//! [`Fleet::start`] spawns a task that listens to session and backend events:
//!
//! ```text
//! session-created  ──► BackendCoordinator::initialize   (own task per session)
//! backend-ready    ──► PollingCoordinator::start        (active/inactive cadence)
//! ```
//!
//! # Teardown order
//!
//! ```text
//! begin_remove ──► stop polling ──► dispose backend ──► release relay port ──► complete_remove
//! ```
//!
//! Every step tolerates the previous ones having done nothing.

use std::sync::{Arc, Mutex};

use printfleet_core::{
    Capability, ConnectionParameters, EventFamily, FeatureSet, FleetEvent, Operation,
    OperationOutcome, PollingSnapshot, Session, SessionId,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend_coordinator::{
    BackendCoordinator, BackendSettings, DispatchError, InitError, InitOutcome,
};
use super::event_bus::{EventBus, EventFilter, Subscription};
use super::polling_coordinator::{PollingCoordinator, PollingSettings};
use super::session_registry::{RegistryError, SessionRegistry};
use crate::infrastructure::protocol::ProtocolClientFactory;
use crate::infrastructure::relay::{PortAllocator, PortError, PortRange};
use crate::infrastructure::storage::overrides::OverrideSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetSettings {
    pub polling: PollingSettings,
    pub backend: BackendSettings,
    pub relay_ports: PortRange,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            polling: PollingSettings::default(),
            backend: BackendSettings::default(),
            relay_ports: PortRange::new(8181, 8190).expect("default relay range is valid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("camera relay unavailable for {id}: {reason}")]
    CameraUnavailable { id: SessionId, reason: String },
}

struct Reactor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Fleet {
    events: Arc<EventBus>,
    registry: Arc<SessionRegistry>,
    backends: Arc<BackendCoordinator>,
    polling: PollingCoordinator,
    ports: PortAllocator,
    reactor: Mutex<Option<Reactor>>,
}

impl Fleet {
    pub fn new(
        settings: FleetSettings,
        clients: Arc<dyn ProtocolClientFactory>,
        overrides: Arc<dyn OverrideSource>,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&events)));
        let backends = Arc::new(BackendCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            clients,
            overrides,
            settings.backend,
        ));
        let polling = PollingCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&events),
            backends.clone(),
            settings.polling,
        );

        Self {
            events,
            registry,
            backends,
            polling,
            ports: PortAllocator::new(settings.relay_ports),
            reactor: Mutex::new(None),
        }
    }

    /// Spawns the reactor task. Returns `false` if it is already running.
    pub fn start(&self) -> bool {
        let mut reactor = self.reactor.lock().expect("lock poisoned");
        if reactor.is_some() {
            return false;
        }

        // Subscribe before spawning so no event published after `start`
        // returns can be missed.
        let subscription = self.events.subscribe(EventFilter::Families(vec![
            EventFamily::Session,
            EventFamily::Backend,
        ]));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(react(
            Arc::clone(&self.registry),
            Arc::clone(&self.backends),
            self.polling.clone(),
            subscription,
            cancel.clone(),
        ));
        *reactor = Some(Reactor { cancel, task });
        info!("fleet started");
        true
    }

    /// Registers a printer. Backend initialization starts in the background
    /// once the reactor sees `session-created`.
    pub fn connect(&self, params: ConnectionParameters) -> Session {
        self.registry.create(params)
    }

    /// Waits until the session's backend is ready, joining any attempt that
    /// is already running.
    pub async fn ensure_ready(&self, id: &SessionId) -> Result<FeatureSet, FleetError> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        match self.backends.initialize(id, session.connection).await {
            InitOutcome::Ready(features) => Ok(features),
            InitOutcome::Failed(cause) => Err(cause.into()),
        }
    }

    /// Makes `id` the active session.
    ///
    /// Returns as soon as the registry has switched: the cached snapshot of
    /// the new session is re-emitted on the UI channel and the polling
    /// cadences are swapped, none of which waits on a printer.
    pub fn switch_active(&self, id: &SessionId) -> Result<Option<SessionId>, FleetError> {
        let previous = self.registry.switch_active(id)?;
        if previous.as_ref() != Some(id) {
            self.polling.on_session_switched(previous.as_ref(), id);
        }
        Ok(previous)
    }

    pub async fn dispatch(
        &self,
        id: &SessionId,
        operation: Operation,
    ) -> Result<OperationOutcome, FleetError> {
        Ok(self.backends.dispatch(id, operation).await?)
    }

    /// Tears a session down in order and returns its final record.
    pub async fn remove_session(&self, id: &SessionId) -> Result<Session, FleetError> {
        self.registry.begin_remove(id)?;
        self.polling.stop(id);
        self.backends.dispose(id).await;
        self.release_relay(id);
        let session = self.registry.complete_remove(id)?;

        // A backend-ready handled mid-teardown may have restarted polling.
        self.polling.stop(id);
        Ok(session)
    }

    /// Drops the current backend and connects again.
    pub async fn reconnect(&self, id: &SessionId) -> Result<FeatureSet, FleetError> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        info!("reconnecting {id}");
        self.polling.stop(id);
        self.backends.dispose(id).await;
        match self.backends.initialize(id, session.connection).await {
            InitOutcome::Ready(features) => Ok(features),
            InitOutcome::Failed(cause) => Err(cause.into()),
        }
    }

    pub async fn refresh_features(&self, id: &SessionId) -> Result<FeatureSet, FleetError> {
        Ok(self.backends.refresh_features(id).await?)
    }

    /// Leases a relay port for the session's camera stream.
    ///
    /// Requires the camera capability. Port exhaustion is returned as
    /// [`FleetError::Port`] and leaves the session as it was. Calling it
    /// again for the same session returns the same port without a new event.
    pub fn start_camera_relay(&self, id: &SessionId) -> Result<u16, FleetError> {
        if self.registry.get(id).is_none() {
            return Err(RegistryError::NotFound(id.clone()).into());
        }
        let upstream_url = self.backends.camera_stream_url(id).ok_or_else(|| {
            let reason = match self.backends.get_feature_set(id) {
                None => "no backend attached".to_string(),
                Some(features) => features
                    .disabled_reason(Capability::Camera)
                    .unwrap_or("camera is unavailable")
                    .to_string(),
            };
            FleetError::CameraUnavailable {
                id: id.clone(),
                reason,
            }
        })?;

        if let Some(port) = self.ports.lease(id) {
            return Ok(port);
        }
        let port = self.ports.acquire(id)?;
        if let Err(e) = self.registry.set_proxy_port(id, Some(port)) {
            self.ports.release(id);
            return Err(e.into());
        }

        info!("camera relay for {id} on port {port} <- {upstream_url}");
        self.events.publish(FleetEvent::CameraRelayStarted {
            id: id.clone(),
            port,
            upstream_url,
        });
        Ok(port)
    }

    /// Releases the session's relay port. Returns the freed port, if any.
    pub fn stop_camera_relay(&self, id: &SessionId) -> Option<u16> {
        self.release_relay(id)
    }

    /// Stops the reactor and tears down every session.
    pub async fn shutdown(&self) {
        let reactor = self.reactor.lock().expect("lock poisoned").take();
        if let Some(reactor) = reactor {
            reactor.cancel.cancel();
            if let Err(e) = reactor.task.await {
                warn!("fleet reactor ended abnormally: {e}");
            }
        }

        for session in self.registry.list_all() {
            if let Err(e) = self.remove_session(&session.id).await {
                warn!("could not remove {} during shutdown: {e}", session.id);
            }
        }
        self.polling.stop_all();
        info!("fleet shut down");
    }

    fn release_relay(&self, id: &SessionId) -> Option<u16> {
        let port = self.ports.release(id)?;
        let _ = self.registry.set_proxy_port(id, None);
        info!("camera relay for {id} stopped, port {port} released");
        self.events.publish(FleetEvent::CameraRelayStopped {
            id: id.clone(),
            port,
        });
        Some(port)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.events.subscribe(filter)
    }

    pub fn subscribe_ui(&self) -> Subscription {
        self.events.subscribe_ui()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn backends(&self) -> &BackendCoordinator {
        &self.backends
    }

    pub fn polling(&self) -> &PollingCoordinator {
        &self.polling
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.registry.list_all()
    }

    pub fn active_session(&self) -> Option<Session> {
        self.registry.get_active()
    }

    pub fn feature_set(&self, id: &SessionId) -> Option<FeatureSet> {
        self.backends.get_feature_set(id)
    }

    pub fn snapshot(&self, id: &SessionId) -> Option<PollingSnapshot> {
        self.polling.snapshot(id)
    }
}

async fn react(
    registry: Arc<SessionRegistry>,
    backends: Arc<BackendCoordinator>,
    polling: PollingCoordinator,
    mut events: Subscription,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            FleetEvent::SessionCreated { id, connection } => {
                let backends = Arc::clone(&backends);
                tokio::spawn(async move {
                    backends.initialize(&id, connection).await;
                });
            }
            FleetEvent::BackendReady { id, .. } => {
                let every = polling.cadence_for(registry.is_active(&id));
                if !polling.start(&id, every) {
                    debug!("polling for {id} not started by reactor");
                }
            }
            _ => {}
        }
    }
    debug!("fleet reactor stopped");
}
