//! Handle allocation
//!
//! Issues small integer handles starting at 1 and takes them back on release.
//! Released handles are reissued lowest-first before the high-water mark grows.

use std::collections::BTreeSet;
use std::marker::PhantomData;

use tracing::debug;

use crate::error::{FederationError, Result};
use crate::handles::Handle;

/// Allocator for one handle domain
#[derive(Debug)]
pub struct HandleAllocator<H> {
    /// Highest handle ever issued
    highest: u32,
    /// Upper bound (inclusive) of the domain
    max: u32,
    /// Released handles below `highest`
    released: BTreeSet<u32>,
    _marker: PhantomData<H>,
}

impl<H: Handle> HandleAllocator<H> {
    /// Create an allocator issuing handles in `1..=max`
    pub fn new(max: u32) -> Self {
        debug!(%max, "HandleAllocator::new: called");
        Self {
            highest: 0,
            max,
            released: BTreeSet::new(),
            _marker: PhantomData,
        }
    }

    /// Issue a handle not currently outstanding
    pub fn provide(&mut self) -> Result<H> {
        if let Some(raw) = self.released.pop_first() {
            debug!(%raw, "HandleAllocator::provide: reusing released handle");
            return Ok(H::from_raw(raw));
        }

        if self.highest >= self.max {
            debug!(max = %self.max, "HandleAllocator::provide: domain exhausted");
            return Err(FederationError::ResourceExhausted(format!(
                "No more handles available (max {})",
                self.max
            )));
        }

        self.highest += 1;
        debug!(raw = %self.highest, "HandleAllocator::provide: issued new handle");
        Ok(H::from_raw(self.highest))
    }

    /// Release a handle so it may be issued again
    pub fn free(&mut self, handle: H) -> Result<()> {
        let raw = handle.raw();
        debug!(%raw, "HandleAllocator::free: called");
        if !self.is_issued(handle) {
            return Err(FederationError::internal(format!(
                "Handle <{}> was not issued",
                handle
            )));
        }

        if raw == self.highest {
            // Shrink the high-water mark over any trailing released handles
            self.highest -= 1;
            while self.highest > 0 && self.released.remove(&self.highest) {
                self.highest -= 1;
            }
        } else {
            self.released.insert(raw);
        }
        Ok(())
    }

    /// Whether `handle` is currently outstanding
    pub fn is_issued(&self, handle: H) -> bool {
        let raw = handle.raw();
        raw != 0 && raw <= self.highest && !self.released.contains(&raw)
    }

    /// Number of outstanding handles
    pub fn outstanding(&self) -> usize {
        self.highest as usize - self.released.len()
    }
}
