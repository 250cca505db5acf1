//! Port allocation.
//!
//! Ports are a process-wide scarce resource: the allocator serializes all
//! allocation and release under one lock so concurrent service starts can
//! never be issued the same port. A held port is never reissued until
//! released; release is idempotent.

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Mutex;

use tracing::debug;

use crate::errors::ResourceError;

/// Ports unlikely to need privileges or collide with common system services;
/// scanned before the sequential range walk.
const SAFE_PORTS: &[u16] = &[3000, 3001, 4173, 5173, 5000, 8000, 8080, 8081, 9000];

/// Restricted ports inside typical scan ranges that user agents refuse to
/// talk to (X11, IRC, SIP); never issued.
const DENIED_PORTS: &[u16] = &[
    3659, 4045, 5060, 5061, 6000, 6566, 6665, 6666, 6667, 6668, 6669, 6697,
];

/// Process-wide port allocator over a configured scan range.
#[derive(Debug)]
pub struct PortAllocator {
    range_start: u16,
    range_end: u16,
    allocated: Mutex<HashMap<u16, String>>,
}

impl PortAllocator {
    pub fn new(range_start: u16, range_end: u16) -> Self {
        Self {
            range_start,
            range_end,
            allocated: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a port for `owner_tag`.
    ///
    /// Tries `preferred` first, then the safe-port list, then a sequential
    /// scan of the whole range. Fails with `NoPortAvailable` only after the
    /// full scan is exhausted.
    pub fn allocate(
        &self,
        preferred: Option<u16>,
        owner_tag: &str,
    ) -> Result<u16, ResourceError> {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());

        let mut candidates: Vec<u16> = Vec::new();
        if let Some(port) = preferred {
            candidates.push(port);
        }
        candidates.extend(
            SAFE_PORTS
                .iter()
                .copied()
                .filter(|p| (self.range_start..=self.range_end).contains(p)),
        );
        candidates.extend(self.range_start..=self.range_end);

        for port in candidates {
            if DENIED_PORTS.contains(&port) || allocated.contains_key(&port) {
                continue;
            }
            if !port_is_bindable(port) {
                continue;
            }
            allocated.insert(port, owner_tag.to_string());
            debug!(port, owner = owner_tag, "allocated port");
            return Ok(port);
        }

        Err(ResourceError::NoPortAvailable {
            start: self.range_start,
            end: self.range_end,
        })
    }

    /// Release a port. Releasing an unallocated port is a no-op.
    pub fn release(&self, port: u16) {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        if allocated.remove(&port).is_some() {
            debug!(port, "released port");
        }
    }

    /// Release every port held by `owner_tag`.
    pub fn release_owned_by(&self, owner_tag: &str) {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        allocated.retain(|_, owner| owner != owner_tag);
    }

    pub fn allocated_ports(&self) -> Vec<u16> {
        let allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        let mut ports: Vec<u16> = allocated.keys().copied().collect();
        ports.sort_unstable();
        ports
    }
}

/// A port the OS will let us bind right now. Bind-then-drop is racy against
/// other processes, but the allocation map closes the race within this one.
fn port_is_bindable(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}
