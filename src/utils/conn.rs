//! Outer Connection Id Allocator
//!
//! Allocates the stable 32-bit outer connection ids handed to clients on
//! RouterSYN. Each live route holds exactly one id; incoming established
//! frames carry it for registry lookup.
//!
//! ## Design
//!
//! - Ids are random (not sequential) so a probe cannot walk the id space
//! - Zero is reserved: clients send `outer_conn = 0` before assignment
//! - An id stays reserved until the route is evicted

use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

/// Errors related to conn-id allocation.
#[derive(Debug, Error)]
pub enum ConnIdError {
    #[error("no available conn ids (too many active routes)")]
    Exhausted,

    #[error("conn id {0} not found")]
    NotFound(u32),

    #[error("conn id {0} already in use")]
    AlreadyInUse(u32),
}

/// Allocator for outer connection ids.
///
/// Tracks which ids are in use to guarantee process-wide uniqueness.
/// Single-threaded; the router owns one instance.
#[derive(Debug)]
pub struct ConnIdAllocator {
    /// Set of currently allocated ids.
    in_use: HashSet<u32>,
    /// Maximum allocation attempts before giving up.
    max_attempts: usize,
}

impl ConnIdAllocator {
    /// Create a new allocator.
    pub fn new() -> Self {
        Self {
            in_use: HashSet::new(),
            max_attempts: 100,
        }
    }

    /// Allocate a new random non-zero id.
    ///
    /// Returns an error if allocation fails after `max_attempts` tries,
    /// which indicates the id space is badly oversubscribed.
    pub fn allocate(&mut self) -> Result<u32, ConnIdError> {
        let mut rng = rand::rng();

        for _ in 0..self.max_attempts {
            let candidate = rng.random::<u32>();
            if candidate != 0 && !self.in_use.contains(&candidate) {
                self.in_use.insert(candidate);
                return Ok(candidate);
            }
        }

        Err(ConnIdError::Exhausted)
    }

    /// Free an id, returning it to the available pool.
    ///
    /// Returns an error if the id was not allocated.
    pub fn free(&mut self, id: u32) -> Result<(), ConnIdError> {
        if self.in_use.remove(&id) {
            Ok(())
        } else {
            Err(ConnIdError::NotFound(id))
        }
    }

    /// Reserve a specific id.
    ///
    /// Used on the reconnect path, where the client presents an id assigned
    /// by a previous router incarnation. Returns an error if already in use.
    pub fn reserve(&mut self, id: u32) -> Result<(), ConnIdError> {
        if self.in_use.contains(&id) {
            Err(ConnIdError::AlreadyInUse(id))
        } else {
            self.in_use.insert(id);
            Ok(())
        }
    }

    /// Check if an id is currently allocated.
    pub fn is_allocated(&self, id: u32) -> bool {
        self.in_use.contains(&id)
    }

    /// Number of currently allocated ids.
    pub fn count(&self) -> usize {
        self.in_use.len()
    }

    /// Clear all allocations. Only valid at router shutdown.
    pub fn clear(&mut self) {
        self.in_use.clear();
    }
}

impl Default for ConnIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
