//! PortAllocator: bounded pool of relay ports, at most one lease per session.
//!
//! Ports are handed out lowest-first from an inclusive range. A session that
//! already holds a lease gets the same port back, so a relay restart never
//! leaks a port. Releasing is idempotent: the second release finds nothing
//! and returns `None`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use printfleet_core::SessionId;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("all {capacity} relay ports in {min}-{max} are leased")]
    Exhausted { min: u16, max: u16, capacity: usize },
    #[error("invalid relay port range {min}-{max}")]
    InvalidRange { min: u16, max: u16 },
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self, PortError> {
        if min == 0 || min > max {
            return Err(PortError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn len(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct Leases {
    by_port: BTreeMap<u16, SessionId>,
    by_session: HashMap<SessionId, u16>,
}

pub struct PortAllocator {
    range: PortRange,
    leases: Mutex<Leases>,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            leases: Mutex::new(Leases::default()),
        }
    }

    /// Leases the lowest free port to `id`, or returns its existing lease.
    pub fn acquire(&self, id: &SessionId) -> Result<u16, PortError> {
        let mut leases = self.leases.lock().expect("lock poisoned");
        if let Some(&port) = leases.by_session.get(id) {
            return Ok(port);
        }

        let port = (self.range.min..=self.range.max)
            .find(|p| !leases.by_port.contains_key(p))
            .ok_or_else(|| {
                warn!("relay port pool exhausted while leasing for {id}");
                PortError::Exhausted {
                    min: self.range.min,
                    max: self.range.max,
                    capacity: self.range.len(),
                }
            })?;

        leases.by_port.insert(port, id.clone());
        leases.by_session.insert(id.clone(), port);
        debug!("leased relay port {port} to {id}");
        Ok(port)
    }

    /// Frees the lease held by `id`. Returns the freed port, if any.
    pub fn release(&self, id: &SessionId) -> Option<u16> {
        let mut leases = self.leases.lock().expect("lock poisoned");
        let port = leases.by_session.remove(id)?;
        leases.by_port.remove(&port);
        debug!("released relay port {port} from {id}");
        Some(port)
    }

    pub fn lease(&self, id: &SessionId) -> Option<u16> {
        self.leases
            .lock()
            .expect("lock poisoned")
            .by_session
            .get(id)
            .copied()
    }

    pub fn leased_count(&self) -> usize {
        self.leases.lock().expect("lock poisoned").by_port.len()
    }

    pub fn capacity(&self) -> usize {
        self.range.len()
    }

    pub fn range(&self) -> PortRange {
        self.range
    }
}
