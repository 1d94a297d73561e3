//! Logical clocks of the time-regulating federates

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{FederationError, Result};
use crate::handles::{FederateHandle, FederationTime};

/// Ledger of regulator clocks; the lower bound is the minimum entry
#[derive(Debug, Clone, Default)]
pub struct ClockSet {
    clocks: BTreeMap<FederateHandle, FederationTime>,
}

impl ClockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a regulator
    pub fn insert(&mut self, federate: FederateHandle, time: FederationTime) -> Result<()> {
        debug!(%federate, %time, "ClockSet::insert: called");
        if self.clocks.contains_key(&federate) {
            return Err(FederationError::internal(format!(
                "Federate <{}> already has a clock",
                federate
            )));
        }
        self.clocks.insert(federate, time);
        Ok(())
    }

    /// Record a regulator's new time
    ///
    /// A time going backwards is stored as given and logged; callers are
    /// responsible for monotonic advance.
    pub fn update(&mut self, federate: FederateHandle, time: FederationTime) -> Result<()> {
        let entry = self.clocks.get_mut(&federate).ok_or_else(|| {
            FederationError::internal(format!("Federate <{}> has no clock", federate))
        })?;
        if time < *entry {
            debug!(%federate, old = %entry, new = %time, "ClockSet::update: clock moved backwards");
        }
        *entry = time;
        Ok(())
    }

    /// Stop tracking a regulator
    pub fn remove(&mut self, federate: FederateHandle) -> Result<FederationTime> {
        debug!(%federate, "ClockSet::remove: called");
        self.clocks
            .remove(&federate)
            .ok_or_else(|| FederationError::internal(format!("Federate <{}> has no clock", federate)))
    }

    pub fn get(&self, federate: FederateHandle) -> Option<FederationTime> {
        self.clocks.get(&federate).copied()
    }

    pub fn contains(&self, federate: FederateHandle) -> bool {
        self.clocks.contains_key(&federate)
    }

    /// All (regulator, time) pairs in handle order
    pub fn clocks(&self) -> impl Iterator<Item = (FederateHandle, FederationTime)> + '_ {
        self.clocks.iter().map(|(h, t)| (*h, *t))
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Lower bound time stamp, `None` without regulators
    pub fn lbts(&self) -> Option<FederationTime> {
        min_time(self.clocks.values().copied())
    }
}

/// Minimum of a sequence of times, `None` when empty
pub fn min_time(times: impl IntoIterator<Item = FederationTime>) -> Option<FederationTime> {
    times.into_iter().fold(None, |acc, t| match acc {
        Some(m) if m <= t => Some(m),
        _ => Some(t),
    })
}
