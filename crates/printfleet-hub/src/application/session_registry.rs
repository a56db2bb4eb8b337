//! SessionRegistry: the canonical set of printer sessions.
//!
//! The registry owns every [`Session`] record, keeps them in insertion order,
//! and tracks the single active selection. It is the only component allowed
//! to change a session's connection state; the transition methods below keep
//! the "backend descriptor present iff ready or degraded" invariant.
//!
//! All operations are synchronous. Events are published after the internal
//! lock has been released.
//!
//! # Removal
//!
//! Removal is split in two so the hub can release per-session resources in
//! between:
//!
//! ```text
//! begin_remove(id)     ──► session-removing   (record kept, cannot be activated)
//!   ... stop polling, dispose backend, release port ...
//! complete_remove(id)  ──► session-removed    (record deleted, active cleared)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use printfleet_core::{
    unix_millis, BackendKind, ConnectionParameters, ConnectionState, FleetEvent, Session,
    SessionId,
};
use thiserror::Error;
use tracing::{info, warn};

use super::event_bus::EventBus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session {0} is being removed")]
    Removing(SessionId),
}

struct Entry {
    session: Session,
    removing: bool,
}

#[derive(Default)]
struct Inner {
    order: Vec<SessionId>,
    entries: HashMap<SessionId, Entry>,
    active: Option<SessionId>,
    next_counter: u64,
}

impl Inner {
    fn entry_mut(&mut self, id: &SessionId) -> Result<&mut Entry, RegistryError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }
}

pub struct SessionRegistry {
    inner: RwLock<Inner>,
    events: Arc<EventBus>,
}

impl SessionRegistry {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Registers a new session. The first session in an empty registry
    /// becomes active.
    pub fn create(&self, params: ConnectionParameters) -> Session {
        let (session, became_active) = {
            let mut inner = self.inner.write().expect("lock poisoned");
            inner.next_counter += 1;
            let now = unix_millis();
            let id = SessionId::generate(inner.next_counter, now);
            let mut session = Session::new(id.clone(), params, now);

            let became_active = inner.entries.is_empty();
            if became_active {
                session.is_active = true;
                inner.active = Some(id.clone());
            }

            inner.order.push(id.clone());
            inner.entries.insert(
                id,
                Entry {
                    session: session.clone(),
                    removing: false,
                },
            );
            (session, became_active)
        };

        info!(
            "session {} created for {} ({})",
            session.id, session.display_name, session.connection.address
        );
        self.events.publish(FleetEvent::SessionCreated {
            id: session.id.clone(),
            connection: session.connection.clone(),
        });
        if became_active {
            self.events.publish(FleetEvent::SessionSwitched {
                from_id: None,
                to_id: session.id.clone(),
            });
        }
        session
    }

    /// Removes a session in one step.
    pub fn remove(&self, id: &SessionId) -> Result<Session, RegistryError> {
        self.begin_remove(id)?;
        self.complete_remove(id)
    }

    /// Announces removal. The record stays readable but can no longer be
    /// activated. Calling it twice emits `session-removing` once.
    pub fn begin_remove(&self, id: &SessionId) -> Result<Session, RegistryError> {
        let (session, first) = {
            let mut inner = self.inner.write().expect("lock poisoned");
            let entry = inner.entry_mut(id)?;
            let first = !entry.removing;
            entry.removing = true;
            (entry.session.clone(), first)
        };

        if first {
            info!("session {id} removing");
            self.events
                .publish(FleetEvent::SessionRemoving { id: id.clone() });
        }
        Ok(session)
    }

    /// Deletes the record. Removing the active session leaves no session
    /// active until the next switch.
    pub fn complete_remove(&self, id: &SessionId) -> Result<Session, RegistryError> {
        let session = {
            let mut inner = self.inner.write().expect("lock poisoned");
            let entry = inner
                .entries
                .remove(id)
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            inner.order.retain(|o| o != id);
            if inner.active.as_ref() == Some(id) {
                inner.active = None;
            }
            entry.session
        };

        info!("session {id} removed");
        self.events
            .publish(FleetEvent::SessionRemoved { id: id.clone() });
        Ok(session)
    }

    /// Makes `id` the active session and returns the previously active one.
    ///
    /// Switching to the already active session changes nothing and emits no
    /// event. Never waits on network work.
    pub fn switch_active(&self, id: &SessionId) -> Result<Option<SessionId>, RegistryError> {
        let previous = {
            let mut inner = self.inner.write().expect("lock poisoned");
            match inner.entries.get(id) {
                Some(entry) if !entry.removing => {}
                _ => return Err(RegistryError::NotFound(id.clone())),
            }

            let previous = inner.active.clone();
            if previous.as_ref() == Some(id) {
                return Ok(previous);
            }
            if let Some(prev) = previous.as_ref() {
                if let Some(entry) = inner.entries.get_mut(prev) {
                    entry.session.is_active = false;
                }
            }
            if let Some(entry) = inner.entries.get_mut(id) {
                entry.session.is_active = true;
            }
            inner.active = Some(id.clone());
            previous
        };

        info!(
            "active session switched {} -> {id}",
            previous.as_ref().map(SessionId::as_str).unwrap_or("none")
        );
        self.events.publish(FleetEvent::SessionSwitched {
            from_id: previous.clone(),
            to_id: id.clone(),
        });
        Ok(previous)
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.entries.get(id).map(|e| e.session.clone())
    }

    pub fn get_active(&self) -> Option<Session> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .active
            .as_ref()
            .and_then(|id| inner.entries.get(id))
            .map(|e| e.session.clone())
    }

    /// All sessions in creation order.
    pub fn list_all(&self) -> Vec<Session> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|e| e.session.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_active(&self, id: &SessionId) -> bool {
        self.inner.read().expect("lock poisoned").active.as_ref() == Some(id)
    }

    /// `true` between `begin_remove` and `complete_remove`.
    pub fn is_removing(&self, id: &SessionId) -> bool {
        let inner = self.inner.read().expect("lock poisoned");
        inner.entries.get(id).map(|e| e.removing).unwrap_or(false)
    }

    // ── State transitions ─────────────────────────────────────────────────────

    /// Backend initialization has started.
    pub fn set_connecting(&self, id: &SessionId) -> Result<(), RegistryError> {
        self.transition(id, |s| {
            s.backend = None;
            Some(ConnectionState::Connecting)
        })
        .map(|_| ())
    }

    /// Records the attached backend and moves the session to `Ready`.
    /// Refused once removal has begun.
    pub fn attach_backend(&self, id: &SessionId, kind: BackendKind) -> Result<(), RegistryError> {
        if self.is_removing(id) {
            return Err(RegistryError::Removing(id.clone()));
        }
        self.transition(id, |s| {
            s.backend = Some(kind);
            Some(ConnectionState::Ready)
        })
        .map(|_| ())
    }

    /// `Ready` → `Degraded`. Returns `true` if the state changed.
    pub fn mark_degraded(&self, id: &SessionId) -> Result<bool, RegistryError> {
        self.transition(id, |s| {
            (s.connection_state == ConnectionState::Ready).then_some(ConnectionState::Degraded)
        })
    }

    /// `Degraded` → `Ready`. Returns `true` if the state changed.
    pub fn mark_recovered(&self, id: &SessionId) -> Result<bool, RegistryError> {
        self.transition(id, |s| {
            (s.connection_state == ConnectionState::Degraded).then_some(ConnectionState::Ready)
        })
    }

    /// Drops the backend descriptor and moves to a backend-less state
    /// (`Failed`, `Disposed` or `Uninitialized`).
    pub fn detach_backend(
        &self,
        id: &SessionId,
        state: ConnectionState,
    ) -> Result<(), RegistryError> {
        let target = if state.has_backend() {
            warn!("detach_backend({id}) called with {state}; using failed");
            ConnectionState::Failed
        } else {
            state
        };
        self.transition(id, |s| {
            s.backend = None;
            Some(target)
        })
        .map(|_| ())
    }

    /// Bumps `last_activity_at` to now.
    pub fn touch(&self, id: &SessionId) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.entry_mut(id)?.session.last_activity_at = unix_millis();
        Ok(())
    }

    pub fn set_proxy_port(&self, id: &SessionId, port: Option<u16>) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.entry_mut(id)?.session.proxy_port = port;
        Ok(())
    }

    /// Applies `change` to the record; the closure returns the new state or
    /// `None` to leave the state as is.
    fn transition(
        &self,
        id: &SessionId,
        change: impl FnOnce(&mut Session) -> Option<ConnectionState>,
    ) -> Result<bool, RegistryError> {
        let (from, to) = {
            let mut inner = self.inner.write().expect("lock poisoned");
            let session = &mut inner.entry_mut(id)?.session;
            let from = session.connection_state;
            match change(session) {
                Some(to) => {
                    session.connection_state = to;
                    debug_assert!(session.is_consistent());
                    (from, to)
                }
                None => return Ok(false),
            }
        };

        if from == to {
            return Ok(false);
        }
        info!("session {id} {from} -> {to}");
        self.events.publish(FleetEvent::ConnectionStateChanged {
            id: id.clone(),
            from,
            to,
        });
        Ok(true)
    }
}
