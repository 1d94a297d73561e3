//! Per-participant state held by a federation

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FederationError, Result};
use crate::handles::{FederateHandle, FederationTime};

/// One joined federate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Federate {
    handle: FederateHandle,
    name: String,
    regulator: bool,
    constrained: bool,
    saving: bool,
    restoring: bool,
    sync_labels: BTreeSet<String>,
    last_nerx_value: FederationTime,
    using_nerx: bool,
    class_relevance_advisory: bool,
}

impl Federate {
    /// Create a fresh record; neither regulating nor constrained
    pub fn new(handle: FederateHandle, name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%handle, %name, "Federate::new: called");
        Self {
            handle,
            name,
            regulator: false,
            constrained: false,
            saving: false,
            restoring: false,
            sync_labels: BTreeSet::new(),
            last_nerx_value: FederationTime::ZERO,
            using_nerx: false,
            class_relevance_advisory: true,
        }
    }

    pub fn handle(&self) -> FederateHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_regulator(&self) -> bool {
        self.regulator
    }

    pub fn is_constrained(&self) -> bool {
        self.constrained
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub fn is_using_nerx(&self) -> bool {
        self.using_nerx
    }

    pub fn last_nerx_value(&self) -> FederationTime {
        self.last_nerx_value
    }

    pub fn class_relevance_advisory(&self) -> bool {
        self.class_relevance_advisory
    }

    /// Toggle the regulator flag; setting it to its current value is an error
    pub fn set_regulator(&mut self, regulator: bool) -> Result<()> {
        if self.regulator == regulator {
            return Err(FederationError::internal(if regulator {
                "Time regulation already enabled."
            } else {
                "Time regulation not enabled."
            }));
        }
        self.regulator = regulator;
        Ok(())
    }

    /// Toggle the constrained flag; setting it to its current value is an error
    pub fn set_constrained(&mut self, constrained: bool) -> Result<()> {
        if self.constrained == constrained {
            return Err(FederationError::internal(if constrained {
                "Time constrained already enabled."
            } else {
                "Time constrained not enabled."
            }));
        }
        self.constrained = constrained;
        Ok(())
    }

    pub fn set_saving(&mut self, saving: bool) {
        self.saving = saving;
    }

    pub fn set_restoring(&mut self, restoring: bool) {
        self.restoring = restoring;
    }

    pub fn set_last_nerx_value(&mut self, time: FederationTime) {
        self.last_nerx_value = time;
    }

    pub fn set_using_nerx(&mut self, using: bool) {
        self.using_nerx = using;
    }

    pub fn set_class_relevance_advisory(&mut self, enabled: bool) {
        self.class_relevance_advisory = enabled;
    }

    /// Add a pending synchronization label
    pub fn add_synchronization_label(&mut self, label: &str) -> Result<()> {
        if !self.sync_labels.insert(label.to_string()) {
            return Err(FederationError::internal(format!(
                "Federate <{}> already has label '{}'",
                self.handle, label
            )));
        }
        Ok(())
    }

    /// Drop a pending synchronization label
    pub fn remove_synchronization_label(&mut self, label: &str) -> Result<()> {
        if !self.sync_labels.remove(label) {
            return Err(FederationError::internal(format!(
                "Federate <{}> has no label '{}'",
                self.handle, label
            )));
        }
        Ok(())
    }

    pub fn is_synchronizing_to(&self, label: &str) -> bool {
        self.sync_labels.contains(label)
    }

    pub fn synchronization_labels(&self) -> impl Iterator<Item = &str> {
        self.sync_labels.iter().map(String::as_str)
    }
}
