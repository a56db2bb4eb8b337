//! PollingCoordinator: one status loop per ready session.
//!
//! Each loop is an independent tokio task driven by an interval timer. Every
//! tick queries the backend through a [`StatusSource`] with a timeout, then
//! commits the result:
//!
//! - success replaces the cached snapshot, resets the failure counter, brings
//!   a degraded session back to ready and publishes `polling-data` (also on
//!   the UI channel when the session is active);
//! - failure keeps the cache and counts; at the threshold the session is
//!   marked degraded but polling continues.
//!
//! A tick that fires while the previous one is still running is skipped, not
//! queued. `stop` cancels the loop and any tick in flight; a tick that raced
//! the stop finds its generation gone at commit time and discards its result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use printfleet_core::{FleetEvent, PollingSnapshot, SessionId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend_coordinator::StatusSource;
use super::event_bus::EventBus;
use super::session_registry::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingSettings {
    /// Cadence of the active session.
    pub interval: Duration,
    /// Cadence of every other session.
    pub inactive_interval: Duration,
    pub tick_timeout: Duration,
    /// Consecutive failures before a session is marked degraded.
    pub failure_threshold: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            inactive_interval: Duration::from_secs(3),
            tick_timeout: Duration::from_secs(5),
            failure_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Stopped,
    Scheduled,
    Ticking,
}

#[derive(Default)]
struct TickState {
    ticking: AtomicBool,
    consecutive_failures: AtomicU32,
}

/// Clears the ticking flag when a tick task ends, however it ends.
struct TickGuard(Arc<TickState>);

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.ticking.store(false, Ordering::SeqCst);
    }
}

struct PollLoop {
    generation: u64,
    cancel: CancellationToken,
    interval: watch::Sender<Duration>,
    state: Arc<TickState>,
    task: JoinHandle<()>,
}

struct Inner {
    registry: Arc<SessionRegistry>,
    events: Arc<EventBus>,
    source: Arc<dyn StatusSource>,
    settings: PollingSettings,
    loops: Mutex<HashMap<SessionId, PollLoop>>,
    snapshots: RwLock<HashMap<SessionId, PollingSnapshot>>,
    next_generation: AtomicU64,
}

#[derive(Clone)]
pub struct PollingCoordinator {
    inner: Arc<Inner>,
}

impl PollingCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        events: Arc<EventBus>,
        source: Arc<dyn StatusSource>,
        settings: PollingSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                events,
                source,
                settings,
                loops: Mutex::new(HashMap::new()),
                snapshots: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> PollingSettings {
        self.inner.settings
    }

    /// Polling cadence for a session with the given active flag.
    pub fn cadence_for(&self, active: bool) -> Duration {
        if active {
            self.inner.settings.interval
        } else {
            self.inner.settings.inactive_interval
        }
    }

    /// Starts polling `id` every `every`. The first tick fires immediately.
    ///
    /// Returns `false` without starting anything when `every` is zero, when
    /// the session has no backend, or when a loop is already running (its
    /// interval is updated instead).
    pub fn start(&self, id: &SessionId, every: Duration) -> bool {
        if every.is_zero() {
            warn!("not polling {id}: interval must be non-zero");
            return false;
        }
        let mut loops = self.inner.loops.lock().expect("lock poisoned");
        if let Some(existing) = loops.get(id) {
            retime(&existing.interval, every);
            return false;
        }

        // Checked under the loop lock so a concurrent teardown cannot slip
        // between the check and the insert.
        let has_backend = self
            .inner
            .registry
            .get(id)
            .map(|s| s.backend.is_some())
            .unwrap_or(false);
        if !has_backend {
            debug!("not polling {id}: no backend attached");
            return false;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let (interval_tx, interval_rx) = watch::channel(every);
        let state = Arc::new(TickState::default());
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            id.clone(),
            generation,
            cancel.clone(),
            interval_rx,
            Arc::clone(&state),
        ));
        loops.insert(
            id.clone(),
            PollLoop {
                generation,
                cancel,
                interval: interval_tx,
                state,
                task,
            },
        );
        info!("polling {id} every {} ms", every.as_millis());
        true
    }

    /// Cancels the loop and any tick in flight, and drops the cached
    /// snapshot. Returns `false` if nothing was running.
    pub fn stop(&self, id: &SessionId) -> bool {
        let removed = self.inner.loops.lock().expect("lock poisoned").remove(id);
        if let Some(poll) = &removed {
            poll.cancel.cancel();
        }
        self.inner
            .snapshots
            .write()
            .expect("lock poisoned")
            .remove(id);
        match removed {
            Some(poll) => {
                drop(poll.task);
                info!("polling for {id} stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<(SessionId, PollLoop)> = self
            .inner
            .loops
            .lock()
            .expect("lock poisoned")
            .drain()
            .collect();
        for (_, poll) in &drained {
            poll.cancel.cancel();
        }
        self.inner.snapshots.write().expect("lock poisoned").clear();
        for (id, _) in drained {
            debug!("polling for {id} stopped");
        }
    }

    /// Retimes a running loop. Returns `false` if `id` is not polled or
    /// `every` is zero.
    pub fn set_interval(&self, id: &SessionId, every: Duration) -> bool {
        if every.is_zero() {
            warn!("ignoring zero polling interval for {id}");
            return false;
        }
        let loops = self.inner.loops.lock().expect("lock poisoned");
        match loops.get(id) {
            Some(poll) => {
                retime(&poll.interval, every);
                true
            }
            None => false,
        }
    }

    /// Re-emits the newly active session's cached snapshot on the UI channel
    /// and applies the active/inactive cadences. Never touches the network.
    pub fn on_session_switched(&self, from: Option<&SessionId>, to: &SessionId) {
        if let Some(snapshot) = self.snapshot(to) {
            self.inner.events.publish_ui(FleetEvent::PollingData {
                id: to.clone(),
                snapshot,
            });
        }
        if let Some(from) = from.filter(|f| *f != to) {
            self.set_interval(from, self.cadence_for(false));
        }
        self.set_interval(to, self.cadence_for(true));
    }

    pub fn snapshot(&self, id: &SessionId) -> Option<PollingSnapshot> {
        self.inner
            .snapshots
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn state(&self, id: &SessionId) -> PollState {
        let loops = self.inner.loops.lock().expect("lock poisoned");
        match loops.get(id) {
            None => PollState::Stopped,
            Some(poll) if poll.state.ticking.load(Ordering::SeqCst) => PollState::Ticking,
            Some(_) => PollState::Scheduled,
        }
    }

    pub fn is_polling(&self, id: &SessionId) -> bool {
        self.state(id) != PollState::Stopped
    }

    pub fn consecutive_failures(&self, id: &SessionId) -> u32 {
        let loops = self.inner.loops.lock().expect("lock poisoned");
        loops
            .get(id)
            .map(|p| p.state.consecutive_failures.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Current interval of a running loop.
    pub fn interval(&self, id: &SessionId) -> Option<Duration> {
        let loops = self.inner.loops.lock().expect("lock poisoned");
        loops.get(id).map(|p| *p.interval.borrow())
    }
}

fn retime(tx: &watch::Sender<Duration>, every: Duration) {
    tx.send_if_modified(|current| {
        if *current == every {
            false
        } else {
            *current = every;
            true
        }
    });
}

fn ticker(first: Instant, every: Duration) -> Interval {
    let mut ticker = interval_at(first, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_loop(
    inner: Arc<Inner>,
    id: SessionId,
    generation: u64,
    cancel: CancellationToken,
    mut interval_rx: watch::Receiver<Duration>,
    state: Arc<TickState>,
) {
    let mut every = interval(*interval_rx.borrow_and_update());
    every.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *interval_rx.borrow_and_update();
                debug!("polling {id} retimed to {} ms", period.as_millis());
                every = ticker(Instant::now() + period, period);
            }
            _ = every.tick() => {
                if state.ticking.swap(true, Ordering::SeqCst) {
                    debug!("skipping tick for {id}: previous tick still running");
                    continue;
                }
                let guard = TickGuard(Arc::clone(&state));
                let inner = Arc::clone(&inner);
                let id = id.clone();
                let cancel = cancel.clone();
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let _guard = guard;
                    inner.tick(&id, generation, &cancel, &state).await;
                });
            }
        }
    }
}

impl Inner {
    async fn tick(
        &self,
        id: &SessionId,
        generation: u64,
        cancel: &CancellationToken,
        state: &TickState,
    ) {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = timeout(self.settings.tick_timeout, self.source.query_status(id)) => result,
        };

        let current = {
            let loops = self.loops.lock().expect("lock poisoned");
            matches!(loops.get(id), Some(poll) if poll.generation == generation)
        };
        if !current {
            debug!("discarding tick result for {id}: polling was stopped");
            return;
        }

        match result {
            Ok(Ok(snapshot)) => {
                {
                    // `stop` cancels before it drops the cached snapshot, so
                    // checking under the cache lock keeps a stale tick out.
                    let mut snapshots = self.snapshots.write().expect("lock poisoned");
                    if cancel.is_cancelled() {
                        return;
                    }
                    snapshots.insert(id.clone(), snapshot.clone());
                }
                state.consecutive_failures.store(0, Ordering::SeqCst);
                if let Ok(true) = self.registry.mark_recovered(id) {
                    info!("session {id} recovered");
                }
                let _ = self.registry.touch(id);
                debug!("polled {id}: {:?}", snapshot.machine_state);

                if self.registry.is_active(id) {
                    self.events.publish_ui(FleetEvent::PollingData {
                        id: id.clone(),
                        snapshot: snapshot.clone(),
                    });
                }
                self.events.publish(FleetEvent::PollingData {
                    id: id.clone(),
                    snapshot,
                });
            }
            Ok(Err(e)) => self.record_failure(id, state, &e.to_string()),
            Err(_) => self.record_failure(
                id,
                state,
                &format!(
                    "status query timed out after {} ms",
                    self.settings.tick_timeout.as_millis()
                ),
            ),
        }
    }

    fn record_failure(&self, id: &SessionId, state: &TickState, cause: &str) {
        let failures = state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("poll of {id} failed ({failures} in a row): {cause}");
        if failures >= self.settings.failure_threshold {
            if let Ok(true) = self.registry.mark_degraded(id) {
                warn!("session {id} degraded after {failures} failed polls: {cause}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend_coordinator::DispatchError;
    use crate::application::event_bus::{EventFilter, Subscription};
    use async_trait::async_trait;
    use printfleet_core::{
        unix_millis, BackendKind, ConnectionParameters, ConnectionState, EventFamily,
        Temperatures,
    };
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    #[derive(Default)]
    struct FakeSource {
        failing: AtomicBool,
        delay: Mutex<Duration>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for FakeSource {
        async fn query_status(&self, id: &SessionId) -> Result<PollingSnapshot, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(DispatchError::NotReady(id.clone()));
            }
            Ok(PollingSnapshot::idle(Temperatures::default(), unix_millis()))
        }
    }

    struct Harness {
        registry: Arc<SessionRegistry>,
        bus: Arc<EventBus>,
        source: Arc<FakeSource>,
        polling: PollingCoordinator,
    }

    fn harness() -> Harness {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&bus)));
        let source = Arc::new(FakeSource::default());
        let polling = PollingCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            source.clone(),
            PollingSettings::default(),
        );
        Harness {
            registry,
            bus,
            source,
            polling,
        }
    }

    fn ready_session(h: &Harness, address: &str) -> SessionId {
        let id = h
            .registry
            .create(ConnectionParameters::new("p", address))
            .id;
        h.registry.attach_backend(&id, BackendKind::Adventurer5M).unwrap();
        id
    }

    fn polling_data_count(sub: &mut Subscription) -> usize {
        sub.drain()
            .iter()
            .filter(|e| matches!(e, FleetEvent::PollingData { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_publishes_and_caches() {
        // Arrange
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        let mut all = h.bus.subscribe(EventFilter::only(EventFamily::Polling));
        let mut ui = h.bus.subscribe_ui();

        // Act
        assert!(h.polling.start(&id, Duration::from_secs(3)));
        sleep(Duration::from_millis(10)).await;

        // Assert
        assert!(h.polling.snapshot(&id).is_some());
        assert_eq!(polling_data_count(&mut all), 1);
        assert_eq!(polling_data_count(&mut ui), 1);
        assert_eq!(h.polling.state(&id), PollState::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ui_channel_only_gets_active_session() {
        // Arrange: the first session is active, the second is not
        let h = harness();
        let _active = ready_session(&h, "10.0.0.1");
        let inactive = ready_session(&h, "10.0.0.2");
        let mut all = h.bus.subscribe(EventFilter::All);
        let mut ui = h.bus.subscribe_ui();

        // Act
        h.polling.start(&inactive, Duration::from_secs(3));
        sleep(Duration::from_millis(10)).await;

        // Assert
        assert_eq!(polling_data_count(&mut all), 1);
        assert_eq!(polling_data_count(&mut ui), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_failures_degrade_then_success_recovers() {
        // Arrange
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        h.source.failing.store(true, Ordering::SeqCst);
        let mut polling_events = h.bus.subscribe(EventFilter::only(EventFamily::Polling));

        // Act: ticks at 0, 3, 6, 9 and 12 s all fail
        h.polling.start(&id, Duration::from_secs(3));
        sleep(Duration::from_millis(12_100)).await;

        // Assert
        assert_eq!(h.source.calls(), 5);
        assert_eq!(h.polling.consecutive_failures(&id), 5);
        assert_eq!(
            h.registry.get(&id).unwrap().connection_state,
            ConnectionState::Degraded
        );
        assert!(h.polling.is_polling(&id));

        // Act: the sixth tick succeeds
        h.source.failing.store(false, Ordering::SeqCst);
        sleep(Duration::from_secs(3)).await;

        // Assert
        assert_eq!(
            h.registry.get(&id).unwrap().connection_state,
            ConnectionState::Ready
        );
        assert_eq!(h.polling.consecutive_failures(&id), 0);
        assert_eq!(polling_data_count(&mut polling_events), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_below_threshold_keep_ready_and_cache() {
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        h.polling.start(&id, Duration::from_secs(3));
        sleep(Duration::from_millis(10)).await;
        let cached = h.polling.snapshot(&id);

        h.source.failing.store(true, Ordering::SeqCst);
        sleep(Duration::from_secs(6)).await;

        assert_eq!(h.polling.consecutive_failures(&id), 2);
        assert_eq!(h.polling.snapshot(&id), cached);
        assert_eq!(
            h.registry.get(&id).unwrap().connection_state,
            ConnectionState::Ready
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_skips_overlapping_ticks() {
        // Arrange: one query takes 7 s, the interval is 3 s
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        *h.source.delay.lock().unwrap() = Duration::from_secs(7);
        let settings = PollingSettings {
            tick_timeout: Duration::from_secs(10),
            ..PollingSettings::default()
        };
        let polling = PollingCoordinator::new(
            Arc::clone(&h.registry),
            Arc::clone(&h.bus),
            h.source.clone(),
            settings,
        );

        // Act
        polling.start(&id, Duration::from_secs(3));
        sleep(Duration::from_secs(1)).await;
        let mid_tick = polling.state(&id);
        sleep(Duration::from_secs(7)).await;

        // Assert: the ticks at 3 s and 6 s were dropped
        assert_eq!(mid_tick, PollState::Ticking);
        assert_eq!(h.source.calls(), 1);
        assert!(polling.snapshot(&id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_timeout_counts_as_failure() {
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        *h.source.delay.lock().unwrap() = Duration::from_secs(60);

        h.polling.start(&id, Duration::from_secs(3));
        sleep(Duration::from_millis(5_100)).await;

        assert_eq!(h.polling.consecutive_failures(&id), 1);
        assert!(h.polling.snapshot(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_in_flight_tick() {
        // Arrange
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        *h.source.delay.lock().unwrap() = Duration::from_secs(2);
        let mut polling_events = h.bus.subscribe(EventFilter::only(EventFamily::Polling));
        h.polling.start(&id, Duration::from_secs(3));
        sleep(Duration::from_secs(1)).await;

        // Act
        assert!(h.polling.stop(&id));
        sleep(Duration::from_secs(10)).await;

        // Assert
        assert_eq!(polling_events.drain().len(), 0);
        assert_eq!(h.source.calls(), 1);
        assert!(h.polling.snapshot(&id).is_none());
        assert_eq!(h.polling.state(&id), PollState::Stopped);
        assert!(!h.polling.stop(&id));
    }

    #[tokio::test]
    async fn test_start_requires_backend() {
        let h = harness();
        let id = h
            .registry
            .create(ConnectionParameters::new("p", "10.0.0.1"))
            .id;

        assert!(!h.polling.start(&id, Duration::from_secs(3)));
        assert_eq!(h.polling.state(&id), PollState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_rejected() {
        // Arrange
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");

        // Act
        let started = h.polling.start(&id, Duration::ZERO);
        sleep(Duration::from_secs(10)).await;

        // Assert
        assert!(!started);
        assert_eq!(h.polling.state(&id), PollState::Stopped);
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retime_keeps_loop_running() {
        // Arrange
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        h.polling.start(&id, Duration::from_secs(1));
        sleep(Duration::from_millis(100)).await;

        // Act
        assert!(!h.polling.set_interval(&id, Duration::ZERO));
        sleep(Duration::from_millis(2_000)).await;

        // Assert: initial tick plus ticks at 1 and 2 s on the old cadence
        assert_eq!(h.polling.interval(&id), Some(Duration::from_secs(1)));
        assert_eq!(h.source.calls(), 3);
        assert!(h.polling.is_polling(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_ignores_old_tick() {
        // Arrange: a slow tick is in flight when the loop is replaced
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        *h.source.delay.lock().unwrap() = Duration::from_secs(2);
        h.polling.start(&id, Duration::from_secs(30));
        sleep(Duration::from_millis(500)).await;

        // Act
        h.polling.stop(&id);
        *h.source.delay.lock().unwrap() = Duration::ZERO;
        h.polling.start(&id, Duration::from_secs(30));
        sleep(Duration::from_secs(3)).await;

        // Assert: only the new loop's tick counted and committed
        assert_eq!(h.source.calls(), 2);
        assert!(h.polling.snapshot(&id).is_some());
        assert_eq!(h.polling.consecutive_failures(&id), 0);
        assert_eq!(h.polling.state(&id), PollState::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");

        assert!(h.polling.start(&id, Duration::from_secs(3)));
        assert!(!h.polling.start(&id, Duration::from_secs(3)));
        sleep(Duration::from_millis(3_100)).await;

        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval_retimes_running_loop() {
        // Arrange
        let h = harness();
        let id = ready_session(&h, "10.0.0.1");
        h.polling.start(&id, Duration::from_secs(10));
        sleep(Duration::from_millis(100)).await;

        // Act
        assert!(h.polling.set_interval(&id, Duration::from_secs(1)));
        sleep(Duration::from_millis(3_400)).await;

        // Assert: one initial tick plus ticks at 1.1, 2.1 and 3.1 s
        assert_eq!(h.source.calls(), 4);
        assert_eq!(h.polling.interval(&id), Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_reemits_cached_snapshot_on_ui_channel() {
        // Arrange
        let h = harness();
        let first = ready_session(&h, "10.0.0.1");
        let second = ready_session(&h, "10.0.0.2");
        h.polling.start(&second, Duration::from_secs(3));
        sleep(Duration::from_millis(10)).await;
        let mut ui = h.bus.subscribe_ui();

        // Act
        h.registry.switch_active(&second).unwrap();
        h.polling.on_session_switched(Some(&first), &second);

        // Assert: delivered before any further tick
        match ui.try_recv() {
            Some(FleetEvent::PollingData { id, .. }) => assert_eq!(id, second),
            other => panic!("expected polling-data, got {other:?}"),
        }
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_switch_without_cache_emits_nothing() {
        let h = harness();
        let first = ready_session(&h, "10.0.0.1");
        let second = ready_session(&h, "10.0.0.2");
        let mut ui = h.bus.subscribe_ui();

        h.polling.on_session_switched(Some(&first), &second);

        assert!(ui.try_recv().is_none());
    }

    #[test]
    fn test_cadence_follows_active_flag() {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&bus)));
        let polling = PollingCoordinator::new(
            registry,
            bus,
            Arc::new(FakeSource::default()),
            PollingSettings {
                interval: Duration::from_secs(2),
                inactive_interval: Duration::from_secs(10),
                ..PollingSettings::default()
            },
        );

        assert_eq!(polling.cadence_for(true), Duration::from_secs(2));
        assert_eq!(polling.cadence_for(false), Duration::from_secs(10));
    }
}
