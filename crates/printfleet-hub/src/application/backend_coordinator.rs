//! BackendCoordinator: one backend adapter per session.
//!
//! # Initialization
//!
//! ```text
//! initialize(id) ──► slot has features?  ──► Ready(current features)
//!                └─► slot in flight?     ──► await the same shared future
//!                └─► spawn attempt       ──► connect → build adapter → probe
//!                                            → resolve features → commit
//! ```
//!
//! Concurrent callers for one session share a single attempt: the attempt runs
//! as a spawned task wrapped in a [`Shared`] future, stored in the session's
//! slot under the same lock that later stores the adapter. Failures become a
//! `failed` connection state plus a `backend-failed` event and are returned to
//! every waiter as [`InitOutcome::Failed`], never re-thrown.
//!
//! Each attempt carries a generation number. [`BackendCoordinator::dispose`]
//! removes the slot, so an attempt that finishes afterwards finds its
//! generation gone, disposes the adapter it just built and reports failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use printfleet_core::{
    resolve, validate_overrides, BackendKind, Capability, ConnectionParameters, ConnectionState,
    FeatureSet, FleetEvent, HardwareProbe, Operation, OperationOutcome, PollingSnapshot,
    SessionId,
};
use thiserror::Error;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use super::event_bus::EventBus;
use super::session_registry::SessionRegistry;
use crate::infrastructure::backends::{build_backend, BackendError, PrinterBackend};
use crate::infrastructure::protocol::ProtocolClientFactory;
use crate::infrastructure::storage::overrides::OverrideSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSettings {
    pub init_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// Why an initialization attempt failed. Cloneable so every de-duplicated
/// waiter receives the same cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("hardware probe failed: {0}")]
    Probe(String),
    #[error("initialization timed out after {0} ms")]
    Timeout(u64),
    #[error("session was disposed while initializing")]
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready(FeatureSet),
    Failed(InitError),
}

impl InitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, InitOutcome::Ready(_))
    }

    pub fn feature_set(&self) -> Option<&FeatureSet> {
        match self {
            InitOutcome::Ready(features) => Some(features),
            InitOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session {0} has no ready backend")]
    NotReady(SessionId),
    #[error("{capability} is unavailable: {reason}")]
    Unsupported {
        capability: Capability,
        reason: String,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

/// Source of polled status, implemented by [`BackendCoordinator`].
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn query_status(&self, id: &SessionId) -> Result<PollingSnapshot, DispatchError>;
}

type InitFuture = Shared<BoxFuture<'static, InitOutcome>>;

struct Attached {
    adapter: Arc<dyn PrinterBackend>,
    kind: BackendKind,
    features: FeatureSet,
    probe: HardwareProbe,
}

struct Slot {
    generation: u64,
    attached: Option<Attached>,
    in_flight: Option<InitFuture>,
}

pub struct BackendCoordinator {
    registry: Arc<SessionRegistry>,
    events: Arc<EventBus>,
    clients: Arc<dyn ProtocolClientFactory>,
    overrides: Arc<dyn OverrideSource>,
    settings: BackendSettings,
    slots: Mutex<HashMap<SessionId, Slot>>,
    next_generation: AtomicU64,
}

impl BackendCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        events: Arc<EventBus>,
        clients: Arc<dyn ProtocolClientFactory>,
        overrides: Arc<dyn OverrideSource>,
        settings: BackendSettings,
    ) -> Self {
        Self {
            registry,
            events,
            clients,
            overrides,
            settings,
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Connects the session's backend, or joins the attempt already running.
    pub async fn initialize(self: &Arc<Self>, id: &SessionId, params: ConnectionParameters) -> InitOutcome {
        if self.registry.get(id).is_none() || self.registry.is_removing(id) {
            return InitOutcome::Failed(InitError::NotFound(id.clone()));
        }

        let attempt = {
            let mut slots = self.slots.lock().expect("lock poisoned");
            let slot = slots.entry(id.clone()).or_insert_with(|| Slot {
                generation: 0,
                attached: None,
                in_flight: None,
            });

            if let Some(attached) = &slot.attached {
                return InitOutcome::Ready(attached.features.clone());
            }
            match slot.in_flight.clone() {
                Some(in_flight) => {
                    debug!("joining in-flight initialization of {id}");
                    in_flight
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
                    slot.generation = generation;

                    let this = Arc::clone(self);
                    let task_id = id.clone();
                    let handle = tokio::spawn(async move {
                        this.run_attempt(task_id, params, generation).await
                    });
                    let shared = async move {
                        handle.await.unwrap_or_else(|e| {
                            InitOutcome::Failed(InitError::Connect(format!(
                                "initialization task ended abnormally: {e}"
                            )))
                        })
                    }
                    .boxed()
                    .shared();
                    slot.in_flight = Some(shared.clone());
                    shared
                }
            }
        };

        attempt.await
    }

    async fn run_attempt(
        &self,
        id: SessionId,
        params: ConnectionParameters,
        generation: u64,
    ) -> InitOutcome {
        if self.registry.set_connecting(&id).is_err() {
            self.release_slot(&id, generation);
            return InitOutcome::Failed(InitError::NotFound(id));
        }

        let kind = BackendKind::for_connection(&params);
        info!("initializing {kind} backend for {id} at {}", params.address);

        // One deadline covers both steps. The adapter lives outside the timed
        // futures so a slow probe still gets its clients closed.
        let deadline = Instant::now() + self.settings.init_timeout;
        let timed_out = InitError::Timeout(self.settings.init_timeout.as_millis() as u64);

        let connect = async {
            let clients = self
                .clients
                .connect(&params, kind)
                .await
                .map_err(|e| InitError::Connect(e.to_string()))?;
            build_backend(kind, clients).map_err(|e| InitError::Connect(e.to_string()))
        };
        let adapter = match timeout_at(deadline, connect).await {
            Ok(Ok(adapter)) => adapter,
            Ok(Err(cause)) => return self.fail(id, cause, generation),
            Err(_) => return self.fail(id, timed_out, generation),
        };

        let probe = match timeout_at(deadline, adapter.probe_hardware()).await {
            Ok(Ok(probe)) => probe,
            Ok(Err(e)) => {
                adapter.dispose().await;
                return self.fail(id, InitError::Probe(e.to_string()), generation);
            }
            Err(_) => {
                adapter.dispose().await;
                return self.fail(id, timed_out, generation);
            }
        };

        self.commit(id, params, kind, adapter, probe, generation).await
    }

    async fn commit(
        &self,
        id: SessionId,
        params: ConnectionParameters,
        kind: BackendKind,
        adapter: Arc<dyn PrinterBackend>,
        probe: HardwareProbe,
        generation: u64,
    ) -> InitOutcome {
        let base = adapter.base_capabilities();
        let overrides = self.overrides.overrides_for(&params);
        for rejection in validate_overrides(&base, &overrides) {
            warn!("session {id}: {rejection}");
        }
        let features = resolve(&base, &probe, &overrides);

        // The registry update and `backend-ready` happen under the slot lock,
        // so a concurrent `dispose` either finds the slot attached or finds
        // it gone; it never runs between the two.
        let rejected = {
            let mut slots = self.slots.lock().expect("lock poisoned");
            let current = slots
                .get(&id)
                .map(|slot| slot.generation == generation)
                .unwrap_or(false);
            if !current {
                Some(InitError::Superseded)
            } else if let Err(e) = self.registry.attach_backend(&id, kind) {
                slots.remove(&id);
                debug!("not attaching backend to {id}: {e}");
                Some(InitError::NotFound(id.clone()))
            } else {
                if let Some(slot) = slots.get_mut(&id) {
                    slot.attached = Some(Attached {
                        adapter: Arc::clone(&adapter),
                        kind,
                        features: features.clone(),
                        probe,
                    });
                    slot.in_flight = None;
                }
                self.events.publish(FleetEvent::BackendReady {
                    id: id.clone(),
                    kind,
                    feature_set: features.clone(),
                });
                None
            }
        };

        if let Some(cause) = rejected {
            info!("session {id} went away during initialization; discarding backend");
            adapter.dispose().await;
            return InitOutcome::Failed(cause);
        }

        info!(
            "session {id} ready on {kind} backend ({} capabilities available)",
            features.available_capabilities().len()
        );
        InitOutcome::Ready(features)
    }

    fn fail(&self, id: SessionId, cause: InitError, generation: u64) -> InitOutcome {
        if !self.release_slot(&id, generation) {
            return InitOutcome::Failed(InitError::Superseded);
        }

        error!("backend initialization for {id} failed: {cause}");
        // The session may already be gone; nothing to record then.
        let _ = self.registry.detach_backend(&id, ConnectionState::Failed);
        self.events.publish(FleetEvent::BackendFailed {
            id,
            cause: cause.to_string(),
        });
        InitOutcome::Failed(cause)
    }

    /// Drops the slot of a failed attempt if `generation` is still current.
    fn release_slot(&self, id: &SessionId, generation: u64) -> bool {
        let mut slots = self.slots.lock().expect("lock poisoned");
        match slots.get(id) {
            Some(slot) if slot.generation == generation => {
                slots.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Releases the session's adapter. Safe to call repeatedly; only the call
    /// that actually released something emits `backend-disposed`.
    pub async fn dispose(&self, id: &SessionId) -> bool {
        let slot = self.slots.lock().expect("lock poisoned").remove(id);
        let Some(slot) = slot else {
            return false;
        };

        let was_in_flight = slot.in_flight.is_some();
        let attached = slot.attached;
        if attached.is_none() && !was_in_flight {
            return false;
        }

        if let Some(attached) = attached {
            attached.adapter.dispose().await;
        }
        let _ = self.registry.detach_backend(id, ConnectionState::Disposed);
        info!("backend for {id} disposed");
        self.events
            .publish(FleetEvent::BackendDisposed { id: id.clone() });
        true
    }

    /// Routes one operation to the session's adapter.
    pub async fn dispatch(
        &self,
        id: &SessionId,
        operation: Operation,
    ) -> Result<OperationOutcome, DispatchError> {
        if self.registry.get(id).is_none() {
            return Err(DispatchError::NotFound(id.clone()));
        }
        let (adapter, features) = self.attached(id)?;

        let capability = operation.required_capability();
        let availability = features.get(capability);
        if !availability.available {
            let reason = availability
                .disabled_reason
                .unwrap_or_else(|| format!("{capability} is disabled"));
            debug!("refusing {} on {id}: {reason}", operation.name());
            return Err(DispatchError::Unsupported { capability, reason });
        }

        let outcome = timeout(self.settings.command_timeout, adapter.execute(&operation))
            .await
            .map_err(|_| DispatchError::Timeout {
                operation: operation.name(),
                timeout_ms: self.settings.command_timeout.as_millis() as u64,
            })??;
        let _ = self.registry.touch(id);
        Ok(outcome)
    }

    pub fn get_feature_set(&self, id: &SessionId) -> Option<FeatureSet> {
        let slots = self.slots.lock().expect("lock poisoned");
        slots
            .get(id)
            .and_then(|s| s.attached.as_ref())
            .map(|a| a.features.clone())
    }

    pub fn backend_kind(&self, id: &SessionId) -> Option<BackendKind> {
        let slots = self.slots.lock().expect("lock poisoned");
        slots.get(id).and_then(|s| s.attached.as_ref()).map(|a| a.kind)
    }

    pub fn is_ready(&self, id: &SessionId) -> bool {
        self.get_feature_set(id).is_some()
    }

    pub fn is_initializing(&self, id: &SessionId) -> bool {
        let slots = self.slots.lock().expect("lock poisoned");
        slots.get(id).map(|s| s.in_flight.is_some()).unwrap_or(false)
    }

    /// Re-probes the hardware and re-reads overrides, then replaces the
    /// feature set and emits `features-updated`.
    pub async fn refresh_features(&self, id: &SessionId) -> Result<FeatureSet, DispatchError> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| DispatchError::NotFound(id.clone()))?;
        let (adapter, _) = self.attached(id)?;

        let probe = adapter.probe_hardware().await?;
        let base = adapter.base_capabilities();
        let overrides = self.overrides.overrides_for(&session.connection);
        for rejection in validate_overrides(&base, &overrides) {
            warn!("session {id}: {rejection}");
        }
        let features = resolve(&base, &probe, &overrides);

        {
            let mut slots = self.slots.lock().expect("lock poisoned");
            match slots.get_mut(id).and_then(|s| s.attached.as_mut()) {
                Some(attached) if Arc::ptr_eq(&attached.adapter, &adapter) => {
                    attached.features = features.clone();
                    attached.probe = probe;
                }
                _ => return Err(DispatchError::NotReady(id.clone())),
            }
        }

        info!("features for {id} refreshed");
        self.events.publish(FleetEvent::FeaturesUpdated {
            id: id.clone(),
            feature_set: features.clone(),
        });
        Ok(features)
    }

    /// Upstream camera stream for the relay: a user-configured URL, else the
    /// URL the printer advertised, else the model's default stream path.
    /// `None` when the camera capability is unavailable.
    pub fn camera_stream_url(&self, id: &SessionId) -> Option<String> {
        let session = self.registry.get(id)?;
        let slots = self.slots.lock().expect("lock poisoned");
        let attached = slots.get(id)?.attached.as_ref()?;
        if !attached.features.is_available(Capability::Camera) {
            return None;
        }

        let overrides = self.overrides.overrides_for(&session.connection);
        let url = overrides
            .custom_camera_url()
            .or_else(|| attached.probe.camera_url())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!("http://{}:8080/?action=stream", session.connection.address)
            });
        Some(url)
    }

    fn attached(
        &self,
        id: &SessionId,
    ) -> Result<(Arc<dyn PrinterBackend>, FeatureSet), DispatchError> {
        let slots = self.slots.lock().expect("lock poisoned");
        slots
            .get(id)
            .and_then(|s| s.attached.as_ref())
            .map(|a| (Arc::clone(&a.adapter), a.features.clone()))
            .ok_or_else(|| DispatchError::NotReady(id.clone()))
    }
}

#[async_trait]
impl StatusSource for BackendCoordinator {
    async fn query_status(&self, id: &SessionId) -> Result<PollingSnapshot, DispatchError> {
        let (adapter, _) = self.attached(id)?;
        Ok(adapter.status().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_bus::{EventFilter, Subscription};
    use crate::infrastructure::protocol::simulated::{SimulatedClientFactory, SimulatedPrinter};
    use crate::infrastructure::storage::overrides::ConfigOverrideSource;
    use printfleet_core::{CapabilityOverrides, JobCommand, OverrideSetting};

    struct Harness {
        registry: Arc<SessionRegistry>,
        factory: Arc<SimulatedClientFactory>,
        overrides: Arc<ConfigOverrideSource>,
        coordinator: Arc<BackendCoordinator>,
        events: Subscription,
    }

    fn harness() -> Harness {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe(EventFilter::All);
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&bus)));
        let factory = Arc::new(SimulatedClientFactory::new());
        let overrides = Arc::new(ConfigOverrideSource::new());
        let coordinator = Arc::new(BackendCoordinator::new(
            Arc::clone(&registry),
            bus,
            factory.clone(),
            overrides.clone(),
            BackendSettings::default(),
        ));
        Harness {
            registry,
            factory,
            overrides,
            coordinator,
            events,
        }
    }

    fn params(model: &str) -> ConnectionParameters {
        ConnectionParameters::new("bench", "10.0.0.20").with_model(model)
    }

    fn event_names(sub: &mut Subscription) -> Vec<&'static str> {
        sub.drain().iter().map(FleetEvent::name).collect()
    }

    #[tokio::test]
    async fn test_initialize_attaches_backend_and_emits_ready() {
        // Arrange
        let mut h = harness();
        let p = params("Adventurer 5M Pro");
        let id = h.registry.create(p.clone()).id;
        h.events.drain();

        // Act
        let outcome = h.coordinator.initialize(&id, p).await;

        // Assert
        assert!(outcome.is_ready());
        let session = h.registry.get(&id).unwrap();
        assert_eq!(session.connection_state, ConnectionState::Ready);
        assert_eq!(session.backend, Some(BackendKind::Adventurer5MPro));
        assert!(h.coordinator.get_feature_set(&id).is_some());
        assert_eq!(
            event_names(&mut h.events),
            vec![
                "connection-state-changed",
                "connection-state-changed",
                "backend-ready"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_initialize_calls_share_one_attempt() {
        // Arrange
        let h = harness();
        h.factory.set_connect_delay(Duration::from_millis(500));
        let p = params("AD5X");
        let id = h.registry.create(p.clone()).id;

        // Act
        let calls = (0..8).map(|_| {
            let coordinator = Arc::clone(&h.coordinator);
            let id = id.clone();
            let p = p.clone();
            async move { coordinator.initialize(&id, p).await }
        });
        let outcomes = futures_util::future::join_all(calls).await;

        // Assert
        assert_eq!(h.factory.connect_attempts(), 1);
        assert!(outcomes.iter().all(InitOutcome::is_ready));
        assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_initialize_on_ready_session_does_not_reconnect() {
        let h = harness();
        let p = params("Adventurer 5M");
        let id = h.registry.create(p.clone()).id;

        h.coordinator.initialize(&id, p.clone()).await;
        let again = h.coordinator.initialize(&id, p).await;

        assert!(again.is_ready());
        assert_eq!(h.factory.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_is_reported_not_thrown() {
        // Arrange
        let mut h = harness();
        h.factory.set_fail_connect(true);
        let p = params("Adventurer 5M");
        let id = h.registry.create(p.clone()).id;
        h.events.drain();

        // Act
        let outcome = h.coordinator.initialize(&id, p.clone()).await;

        // Assert
        assert!(matches!(outcome, InitOutcome::Failed(InitError::Connect(_))));
        assert_eq!(
            h.registry.get(&id).unwrap().connection_state,
            ConnectionState::Failed
        );
        assert!(event_names(&mut h.events).contains(&"backend-failed"));

        // A later attempt starts fresh.
        h.factory.set_fail_connect(false);
        assert!(h.coordinator.initialize(&id, p).await.is_ready());
        assert_eq!(h.factory.connect_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialization_times_out() {
        let h = harness();
        h.factory.set_connect_delay(Duration::from_secs(60));
        let p = params("Adventurer 5M");
        let id = h.registry.create(p.clone()).id;

        let outcome = h.coordinator.initialize(&id, p).await;

        assert_eq!(outcome, InitOutcome::Failed(InitError::Timeout(15_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_closes_connected_clients() {
        // Arrange: connect succeeds, the hardware probe never answers in time
        let mut h = harness();
        let printer = h
            .factory
            .add_printer(SimulatedPrinter::new("10.0.0.20", BackendKind::Adventurer5M));
        printer.set_status_delay(Duration::from_secs(60));
        let p = params("Adventurer 5M");
        let id = h.registry.create(p.clone()).id;
        h.events.drain();

        // Act
        let outcome = h.coordinator.initialize(&id, p).await;

        // Assert
        assert_eq!(outcome, InitOutcome::Failed(InitError::Timeout(15_000)));
        assert!(printer.close_calls() > 0);
        assert!(!h.coordinator.is_initializing(&id));
        assert_eq!(
            h.registry.get(&id).unwrap().connection_state,
            ConnectionState::Failed
        );
        assert!(event_names(&mut h.events).contains(&"backend-failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_probe_never_reports_ready() {
        // Arrange
        let mut h = harness();
        let printer = h
            .factory
            .add_printer(SimulatedPrinter::new("10.0.0.20", BackendKind::Adventurer5M));
        printer.set_status_delay(Duration::from_secs(2));
        let p = params("Adventurer 5M");
        let id = h.registry.create(p.clone()).id;
        h.events.drain();
        let coordinator = Arc::clone(&h.coordinator);
        let init_id = id.clone();
        let pending = tokio::spawn(async move { coordinator.initialize(&init_id, p).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Act
        assert!(h.coordinator.dispose(&id).await);
        let outcome = pending.await.unwrap();

        // Assert
        assert_eq!(outcome, InitOutcome::Failed(InitError::Superseded));
        let names = event_names(&mut h.events);
        assert!(names.contains(&"backend-disposed"));
        assert!(!names.contains(&"backend-ready"));
        let session = h.registry.get(&id).unwrap();
        assert_eq!(session.connection_state, ConnectionState::Disposed);
        assert!(session.backend.is_none());
    }

    #[tokio::test]
    async fn test_initialize_refuses_session_being_removed() {
        let h = harness();
        let p = params("AD5X");
        let id = h.registry.create(p.clone()).id;
        h.registry.begin_remove(&id).unwrap();

        let outcome = h.coordinator.initialize(&id, p).await;

        assert_eq!(outcome, InitOutcome::Failed(InitError::NotFound(id.clone())));
        assert_eq!(h.factory.connect_attempts(), 0);
        assert!(!h.coordinator.is_initializing(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_begun_mid_initialization_discards_backend() {
        // Arrange
        let mut h = harness();
        h.factory.set_connect_delay(Duration::from_secs(2));
        let p = params("Adventurer 5M");
        let id = h.registry.create(p.clone()).id;
        h.events.drain();
        let coordinator = Arc::clone(&h.coordinator);
        let init_id = id.clone();
        let pending = tokio::spawn(async move { coordinator.initialize(&init_id, p).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Act
        h.registry.begin_remove(&id).unwrap();
        let outcome = pending.await.unwrap();

        // Assert
        assert_eq!(outcome, InitOutcome::Failed(InitError::NotFound(id.clone())));
        assert!(!h.coordinator.is_ready(&id));
        assert!(!h.coordinator.is_initializing(&id));
        assert!(h.registry.get(&id).unwrap().backend.is_none());
        assert_eq!(h.factory.printer("10.0.0.20").unwrap().close_calls(), 2);
        assert!(!event_names(&mut h.events).contains(&"backend-ready"));
    }

    #[tokio::test]
    async fn test_initialize_unknown_session_fails() {
        let h = harness();
        let outcome = h
            .coordinator
            .initialize(&SessionId::from("ghost"), params("AD5X"))
            .await;
        assert!(matches!(outcome, InitOutcome::Failed(InitError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_during_initialization_discards_late_adapter() {
        // Arrange
        let h = harness();
        h.factory.set_connect_delay(Duration::from_secs(2));
        let p = params("Adventurer 5M");
        let id = h.registry.create(p.clone()).id;
        let coordinator = Arc::clone(&h.coordinator);
        let init_id = id.clone();
        let pending = tokio::spawn(async move { coordinator.initialize(&init_id, p).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.coordinator.is_initializing(&id));

        // Act
        assert!(h.coordinator.dispose(&id).await);
        let outcome = pending.await.unwrap();

        // Assert
        assert_eq!(outcome, InitOutcome::Failed(InitError::Superseded));
        assert!(!h.coordinator.is_ready(&id));
        let printer = h.factory.printer("10.0.0.20").unwrap();
        assert_eq!(printer.close_calls(), 2);
        assert_eq!(
            h.registry.get(&id).unwrap().connection_state,
            ConnectionState::Disposed
        );
    }

    #[tokio::test]
    async fn test_dispose_twice_emits_once() {
        // Arrange
        let mut h = harness();
        let p = params("AD5X");
        let id = h.registry.create(p.clone()).id;
        h.coordinator.initialize(&id, p).await;
        h.events.drain();

        // Act
        let first = h.coordinator.dispose(&id).await;
        let second = h.coordinator.dispose(&id).await;

        // Assert
        assert!(first);
        assert!(!second);
        let names = event_names(&mut h.events);
        assert_eq!(names.iter().filter(|n| **n == "backend-disposed").count(), 1);
        assert!(h.coordinator.get_feature_set(&id).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_before_ready_is_not_ready() {
        let h = harness();
        let id = h.registry.create(params("AD5X")).id;

        let result = h.coordinator.dispatch(&id, Operation::StatusQuery).await;

        assert_eq!(result, Err(DispatchError::NotReady(id)));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_session_is_not_found() {
        let h = harness();
        let ghost = SessionId::from("ghost");

        let result = h.coordinator.dispatch(&ghost, Operation::StatusQuery).await;

        assert_eq!(result, Err(DispatchError::NotFound(ghost)));
    }

    #[tokio::test]
    async fn test_unknown_model_uses_legacy_backend_and_refuses_filtration() {
        // Arrange
        let h = harness();
        let p = params("Some Future Printer");
        let id = h.registry.create(p.clone()).id;
        h.coordinator.initialize(&id, p).await;

        // Act
        let result = h
            .coordinator
            .dispatch(
                &id,
                Operation::SetFiltration {
                    mode: printfleet_core::FiltrationMode::Internal,
                },
            )
            .await;

        // Assert
        assert_eq!(h.coordinator.backend_kind(&id), Some(BackendKind::GenericLegacy));
        match result {
            Err(DispatchError::Unsupported { capability, reason }) => {
                assert_eq!(capability, Capability::Filtration);
                assert!(!reason.is_empty());
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_printer() {
        let h = harness();
        let p = params("Adventurer 5M Pro");
        let id = h.registry.create(p.clone()).id;
        h.coordinator.initialize(&id, p).await;

        let outcome = h
            .coordinator
            .dispatch(
                &id,
                Operation::Job(JobCommand::StartLocal {
                    file_name: "cube.gcode".to_string(),
                    auto_level: false,
                }),
            )
            .await
            .unwrap();

        assert_eq!(outcome, OperationOutcome::Accepted);
        let printer = h.factory.printer("10.0.0.20").unwrap();
        assert_eq!(printer.machine_state(), printfleet_core::MachineState::Printing);
    }

    #[tokio::test]
    async fn test_overrides_are_applied_at_initialization() {
        // Arrange
        let h = harness();
        h.overrides.set_for_address(
            "10.0.0.20",
            CapabilityOverrides::new().with(Capability::Camera, OverrideSetting::ForceOff),
        );
        let p = params("Adventurer 5M Pro");
        let id = h.registry.create(p.clone()).id;

        // Act
        let outcome = h.coordinator.initialize(&id, p).await;

        // Assert
        let features = outcome.feature_set().unwrap();
        assert!(!features.is_available(Capability::Camera));
        assert!(h.coordinator.camera_stream_url(&id).is_none());
    }

    #[tokio::test]
    async fn test_refresh_features_picks_up_new_overrides() {
        // Arrange
        let mut h = harness();
        let p = params("Adventurer 5M Pro");
        let id = h.registry.create(p.clone()).id;
        h.coordinator.initialize(&id, p).await;
        assert!(h.coordinator.get_feature_set(&id).unwrap().is_available(Capability::Led));
        h.events.drain();

        // Act
        h.overrides.set_for_address(
            "10.0.0.20",
            CapabilityOverrides::new().with(Capability::Led, OverrideSetting::ForceOff),
        );
        let refreshed = h.coordinator.refresh_features(&id).await.unwrap();

        // Assert
        assert!(!refreshed.is_available(Capability::Led));
        assert_eq!(event_names(&mut h.events), vec!["features-updated"]);
    }

    #[tokio::test]
    async fn test_camera_url_precedence() {
        // Arrange: the Pro advertises its own stream
        let h = harness();
        let p = params("Adventurer 5M Pro");
        let id = h.registry.create(p.clone()).id;
        h.coordinator.initialize(&id, p).await;
        assert_eq!(
            h.coordinator.camera_stream_url(&id).as_deref(),
            Some("http://10.0.0.20:8080/?action=stream")
        );

        // Act: a user URL beats the advertised one
        h.overrides.set_for_address(
            "10.0.0.20",
            CapabilityOverrides::new().with(
                Capability::Camera,
                OverrideSetting::CustomUrl {
                    url: "http://10.0.0.99/cam".to_string(),
                },
            ),
        );

        // Assert
        assert_eq!(
            h.coordinator.camera_stream_url(&id).as_deref(),
            Some("http://10.0.0.99/cam")
        );
    }

    #[tokio::test]
    async fn test_status_source_reads_snapshot() {
        let h = harness();
        let p = params("AD5X");
        let id = h.registry.create(p.clone()).id;
        h.coordinator.initialize(&id, p).await;

        let snapshot = h.coordinator.query_status(&id).await.unwrap();

        assert!(snapshot.material_station.is_some());
    }
}
