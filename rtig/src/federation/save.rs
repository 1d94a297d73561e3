//! Federation save and restore rounds
//!
//! A round starts with a request from one federate, marks every joined
//! federate as busy and completes when the last one reports its status. The
//! aggregate status is the AND of every report and is re-initialized at the
//! start of each round.

use tracing::{debug, info, warn};

use super::Federation;
use crate::error::{FederationError, Result};
use crate::handles::{FederateHandle, FederationTime};
use crate::message::Payload;
use crate::persistence::{FederationSnapshot, SnapshotFederate};
use crate::response::Responses;

impl Federation {
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    /// Label of the save in progress, empty when idle
    pub fn save_label(&self) -> &str {
        &self.save_label
    }

    /// Start a save round and ask every federate to save
    pub fn request_federation_save(
        &mut self,
        federate: FederateHandle,
        label: &str,
        time: Option<FederationTime>,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %label, ?time, "Federation::request_federation_save: called");
        self.federate(federate)?;
        if self.saving {
            return Err(FederationError::SaveInProgress("Already in saving state.".to_string()));
        }
        if self.restoring {
            return Err(FederationError::RestoreInProgress("Restore in progress.".to_string()));
        }

        for f in self.federates.values_mut() {
            f.set_saving(true);
        }
        self.saving = true;
        self.save_label = label.to_string();
        self.save_status = true;
        info!(%label, federates = self.federates.len(), "Federation save requested");

        let response = self.respond_to_all(
            None,
            federate,
            Payload::InitiateFederateSave {
                label: label.to_string(),
                date: time,
            },
        );
        self.notify_mom(|mom| mom.save_changed(true, label));
        Ok(vec![response])
    }

    /// A federate started saving
    pub fn federate_save_begun(&self, federate: FederateHandle) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, "Federation::federate_save_begun: called");
        self.federate(federate)?;
        if !self.saving {
            return Err(FederationError::internal("No save in progress."));
        }
        Ok(())
    }

    /// A federate finished saving, successfully or not
    pub fn federate_save_status(&mut self, federate: FederateHandle, ok: bool) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %ok, "Federation::federate_save_status: called");
        if !self.saving {
            return Err(FederationError::internal("No save in progress."));
        }
        self.federate_mut(federate)?.set_saving(false);
        self.save_status &= ok;

        if self.federates.values().any(|f| f.is_saving()) {
            debug!("Federation::federate_save_status: still waiting for other federates");
            return Ok(Responses::new());
        }
        Ok(self.finish_save())
    }

    /// Start a restore round from a previously saved snapshot
    ///
    /// The caller always gets a first answer telling whether the label could
    /// be restored; only on success does the round begin.
    pub fn request_federation_restore(&mut self, federate: FederateHandle, label: &str) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %label, "Federation::request_federation_restore: called");
        self.federate(federate)?;
        if self.restoring {
            return Err(FederationError::RestoreInProgress("Already in restoring state.".to_string()));
        }
        if self.saving {
            return Err(FederationError::SaveInProgress("Save in progress.".to_string()));
        }

        let snapshot = match self.load_snapshot(label) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%label, error = %e, "Federation restore refused");
                return Ok(vec![self.respond_to(
                    federate,
                    federate,
                    Payload::RequestFederationRestoreFailed {
                        label: label.to_string(),
                    },
                )]);
            }
        };

        let mut responses = vec![self.respond_to(
            federate,
            federate,
            Payload::RequestFederationRestoreSucceeded {
                label: label.to_string(),
            },
        )];

        responses.extend(self.apply_snapshot(&snapshot)?);
        for f in self.federates.values_mut() {
            f.set_restoring(true);
        }
        self.restoring = true;
        self.restore_label = label.to_string();
        self.restore_status = true;
        info!(%label, "Federation restore begun");

        responses.push(self.respond_to_all(None, federate, Payload::FederationRestoreBegun));
        for handle in self.federate_handles() {
            responses.push(self.respond_to(
                handle,
                handle,
                Payload::InitiateFederateRestore {
                    label: label.to_string(),
                },
            ));
        }
        self.notify_mom(|mom| mom.restore_changed(true, label));
        Ok(responses)
    }

    /// A federate finished restoring, successfully or not
    pub fn federate_restore_status(&mut self, federate: FederateHandle, ok: bool) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %ok, "Federation::federate_restore_status: called");
        if !self.restoring {
            return Err(FederationError::internal("No restore in progress."));
        }
        self.federate_mut(federate)?.set_restoring(false);
        self.restore_status &= ok;

        if self.federates.values().any(|f| f.is_restoring()) {
            debug!("Federation::federate_restore_status: still waiting for other federates");
            return Ok(Responses::new());
        }
        Ok(self.finish_restore())
    }

    /// Close rounds that no remaining federate can hold up anymore
    ///
    /// Called after a federate left. A round whose federates are all gone is
    /// dropped without a broadcast.
    pub fn settle_save_and_restore(&mut self) -> Responses {
        let mut responses = Responses::new();
        if self.saving && !self.federates.values().any(|f| f.is_saving()) {
            if self.federates.is_empty() {
                info!(label = %self.save_label, "Save abandoned, no federate left");
                self.reset_save();
            } else {
                responses.extend(self.finish_save());
            }
        }
        if self.restoring && !self.federates.values().any(|f| f.is_restoring()) {
            if self.federates.is_empty() {
                info!(label = %self.restore_label, "Restore abandoned, no federate left");
                self.reset_restore();
            } else {
                responses.extend(self.finish_restore());
            }
        }
        responses
    }

    fn finish_save(&mut self) -> Responses {
        if self.save_status
            && let Err(e) = self.store.save(&self.save_label, &self.snapshot())
        {
            warn!(label = %self.save_label, error = %e, "Failed to persist federation snapshot");
            self.save_status = false;
        }

        let payload = if self.save_status {
            info!(label = %self.save_label, "Federation saved");
            Payload::FederationSaved
        } else {
            info!(label = %self.save_label, "Federation not saved");
            Payload::FederationNotSaved
        };
        let response = self.respond_to_all(None, FederateHandle::ANONYMOUS, payload);
        self.reset_save();
        vec![response]
    }

    fn reset_save(&mut self) {
        let label = std::mem::take(&mut self.save_label);
        self.saving = false;
        self.save_status = true;
        self.notify_mom(|mom| mom.save_changed(false, &label));
    }

    fn finish_restore(&mut self) -> Responses {
        let payload = if self.restore_status {
            info!(label = %self.restore_label, "Federation restored");
            Payload::FederationRestored
        } else {
            info!(label = %self.restore_label, "Federation not restored");
            Payload::FederationNotRestored
        };
        let response = self.respond_to_all(None, FederateHandle::ANONYMOUS, payload);
        self.reset_restore();
        vec![response]
    }

    fn reset_restore(&mut self) {
        let label = std::mem::take(&mut self.restore_label);
        self.restoring = false;
        self.restore_status = true;
        self.notify_mom(|mom| mom.restore_changed(false, &label));
    }

    fn snapshot(&self) -> FederationSnapshot {
        let federates = self
            .federates
            .values()
            .map(|f| SnapshotFederate {
                name: f.name().to_string(),
                handle: f.handle(),
                constrained: f.is_constrained(),
                regulator: f.is_regulator(),
                time: self.clocks.get(f.handle()),
            })
            .collect();
        FederationSnapshot::new(self.name.clone(), self.handle, federates)
    }

    /// Load and check that every joined federate appears in the snapshot
    fn load_snapshot(&self, label: &str) -> Result<FederationSnapshot> {
        let snapshot = self.store.load(&self.name, label)?;
        for f in self.federates.values() {
            if snapshot.federate(f.name()).is_none() {
                return Err(FederationError::internal(format!(
                    "Federate <{}> is not part of snapshot <{}>",
                    f.name(),
                    label
                )));
            }
        }
        Ok(snapshot)
    }

    /// Bring time-management flags back to their saved values
    ///
    /// Each change goes through the regular time-management path so the other
    /// federates and the MOM hear about it. A regulator comes back at its
    /// saved time, or at the current lower bound for snapshots that carry
    /// none.
    fn apply_snapshot(&mut self, snapshot: &FederationSnapshot) -> Result<Responses> {
        let mut responses = Responses::new();
        for handle in self.federate_handles() {
            let record = self.federate(handle)?;
            let Some(saved) = snapshot.federate(record.name()) else {
                continue;
            };
            if saved.handle != handle {
                warn!(federate = %handle, saved = %saved.handle, "Federate handle differs from snapshot");
            }
            let (regulator, constrained) = (record.is_regulator(), record.is_constrained());
            let time = saved
                .time
                .or_else(|| self.clocks.get(handle))
                .or_else(|| self.lbts())
                .unwrap_or(FederationTime::ZERO);

            match (saved.regulator, regulator) {
                (true, false) => responses.extend(self.add_regulator(handle, time)?),
                (false, true) => responses.extend(self.remove_regulator(handle)?),
                _ => {}
            }
            if saved.constrained != constrained {
                responses.extend(self.set_constrained(handle, saved.constrained, time)?);
            }
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_support::*;
    use crate::error::FederationError;
    use crate::handles::{FederateHandle, FederationTime};
    use crate::message::{MessageType, Payload};
    use crate::persistence::{FederationSnapshot, MemorySnapshotStore, SnapshotFederate, SnapshotStore};

    #[test]
    fn test_save_round_succeeds_and_persists() {
        let store = Arc::new(MemorySnapshotStore::new());
        let mut fed = federation_with_store(store.clone());
        let a = fed.add("a").unwrap().0;
        let b = fed.add("b").unwrap().0;
        fed.add_regulator(b, FederationTime(4.0)).unwrap();

        let responses = fed.request_federation_save(a, "s1", Some(FederationTime(10.0))).unwrap();
        assert_eq!(responses[0].recipients, vec![a, b]);
        assert_eq!(
            responses[0].message.payload,
            Payload::InitiateFederateSave {
                label: "s1".to_string(),
                date: Some(FederationTime(10.0))
            }
        );
        assert!(fed.is_saving());
        assert_eq!(fed.save_label(), "s1");

        fed.federate_save_begun(a).unwrap();
        assert!(fed.federate_save_status(a, true).unwrap().is_empty());
        let responses = fed.federate_save_status(b, true).unwrap();
        assert_eq!(kinds(&responses), vec![MessageType::FederationSaved]);
        assert!(!fed.is_saving());

        let snapshot = store.load("Aircraft", "s1").unwrap();
        assert!(snapshot.federate("b").unwrap().regulator);
        assert!(!snapshot.federate("a").unwrap().regulator);
    }

    #[test]
    fn test_one_failure_makes_round_not_saved() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.request_federation_save(h[0], "s1", None).unwrap();
        fed.federate_save_status(h[0], false).unwrap();
        let responses = fed.federate_save_status(h[1], true).unwrap();
        assert_eq!(kinds(&responses), vec![MessageType::FederationNotSaved]);

        // Next round starts clean
        fed.request_federation_save(h[0], "s2", None).unwrap();
        fed.federate_save_status(h[0], true).unwrap();
        let responses = fed.federate_save_status(h[1], true).unwrap();
        assert_eq!(kinds(&responses), vec![MessageType::FederationSaved]);
    }

    #[test]
    fn test_second_save_is_rejected() {
        let (mut fed, h) = joined(&["a"]);
        fed.request_federation_save(h[0], "s1", None).unwrap();
        let err = fed.request_federation_save(h[0], "s2", None).unwrap_err();
        assert!(matches!(err, FederationError::SaveInProgress(_)));
        assert_eq!(err.to_string(), "Save in progress: Already in saving state.");
        assert_eq!(fed.save_label(), "s1");
    }

    #[test]
    fn test_save_status_without_round() {
        let (mut fed, h) = joined(&["a"]);
        assert!(fed.federate_save_status(h[0], true).is_err());
        assert!(fed.federate_save_begun(h[0]).is_err());
    }

    #[test]
    fn test_killed_federate_does_not_block_save() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.request_federation_save(h[0], "s1", None).unwrap();
        fed.federate_save_status(h[0], true).unwrap();

        let responses = fed.kill(h[1]);
        assert_eq!(kinds(&responses), vec![MessageType::FederationSaved]);
        assert_eq!(responses[0].recipients, vec![h[0]]);
        assert!(!fed.is_saving());
    }

    #[test]
    fn test_save_notifies_mom() {
        let mut fed = federation();
        let (_, log) = with_mom(&mut fed);
        let (a, _) = fed.add("a").unwrap();
        fed.request_federation_save(a, "s1", None).unwrap();
        fed.federate_save_status(a, true).unwrap();
        let events = mom_events(&log);
        assert!(events.contains(&"save true s1".to_string()));
        assert!(events.contains(&"save false s1".to_string()));
    }

    #[test]
    fn test_restore_unknown_label_fails_to_requester_only() {
        let (mut fed, h) = joined(&["a", "b"]);
        let responses = fed.request_federation_restore(h[1], "nothing").unwrap();
        assert_eq!(kinds(&responses), vec![MessageType::RequestFederationRestoreFailed]);
        assert_eq!(responses[0].recipients, vec![h[1]]);
        assert!(!fed.is_restoring());
    }

    #[test]
    fn test_restore_round() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.add_regulator(h[0], FederationTime(3.0)).unwrap();
        fed.request_federation_save(h[0], "s1", None).unwrap();
        fed.federate_save_status(h[0], true).unwrap();
        fed.federate_save_status(h[1], true).unwrap();

        // Diverge from the saved state
        fed.remove_regulator(h[0]).unwrap();
        fed.set_constrained(h[1], true, FederationTime::ZERO).unwrap();

        let responses = fed.request_federation_restore(h[1], "s1").unwrap();
        assert_eq!(
            kinds(&responses),
            vec![
                MessageType::RequestFederationRestoreSucceeded,
                MessageType::SetTimeRegulating,
                MessageType::TimeRegulationEnabled,
                MessageType::FederationRestoreBegun,
                MessageType::InitiateFederateRestore,
                MessageType::InitiateFederateRestore,
            ]
        );
        assert_eq!(responses[0].recipients, vec![h[1]]);
        assert_eq!(responses[1].recipients, vec![h[1]]);
        assert_eq!(
            responses[1].message.payload,
            Payload::SetTimeRegulating {
                regulating: true,
                date: FederationTime(3.0)
            }
        );
        assert_eq!(responses[2].recipients, vec![h[0]]);
        assert_eq!(responses[3].recipients, h);
        for (response, handle) in responses[4..].iter().zip(&h) {
            assert_eq!(response.recipients, vec![*handle]);
            assert_eq!(response.message.federate, *handle);
        }

        assert!(fed.is_restoring());
        assert!(fed.federate(h[0]).unwrap().is_regulator());
        assert_eq!(fed.lbts(), Some(FederationTime(3.0)));
        assert!(!fed.federate(h[1]).unwrap().is_constrained());

        assert!(fed.federate_restore_status(h[0], true).unwrap().is_empty());
        let responses = fed.federate_restore_status(h[1], false).unwrap();
        assert_eq!(kinds(&responses), vec![MessageType::FederationNotRestored]);
        assert!(!fed.is_restoring());
    }

    #[test]
    fn test_restore_reenables_constraint_at_lower_bound() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.add_regulator(h[0], FederationTime(7.0)).unwrap();
        fed.set_constrained(h[1], true, FederationTime(7.0)).unwrap();
        fed.request_federation_save(h[0], "s1", None).unwrap();
        fed.federate_save_status(h[0], true).unwrap();
        fed.federate_save_status(h[1], true).unwrap();

        fed.set_constrained(h[1], false, FederationTime(7.0)).unwrap();
        let responses = fed.request_federation_restore(h[0], "s1").unwrap();
        let ack = responses
            .iter()
            .find(|r| r.message.message_type() == MessageType::TimeConstrainedEnabled)
            .unwrap();
        assert_eq!(ack.recipients, vec![h[1]]);
        assert_eq!(ack.message.payload, Payload::TimeConstrainedEnabled { date: FederationTime(7.0) });
        assert!(fed.federate(h[1]).unwrap().is_constrained());
        assert_eq!(fed.lbts(), Some(FederationTime(7.0)));
    }

    #[test]
    fn test_restore_drops_regulation_taken_after_save() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.request_federation_save(h[0], "s1", None).unwrap();
        fed.federate_save_status(h[0], true).unwrap();
        fed.federate_save_status(h[1], true).unwrap();

        fed.add_regulator(h[0], FederationTime(5.0)).unwrap();
        let responses = fed.request_federation_restore(h[1], "s1").unwrap();
        assert_eq!(kinds(&responses)[1], MessageType::SetTimeRegulating);
        assert_eq!(responses[1].recipients, vec![h[1]]);
        assert_eq!(
            responses[1].message.payload,
            Payload::SetTimeRegulating {
                regulating: false,
                date: FederationTime(5.0)
            }
        );
        assert_eq!(fed.lbts(), None);
    }

    #[test]
    fn test_restore_rejects_snapshot_missing_a_federate() {
        let store = Arc::new(MemorySnapshotStore::new());
        store
            .save(
                "s1",
                &FederationSnapshot::new(
                    "Aircraft",
                    crate::handles::FederationHandle(1),
                    vec![SnapshotFederate {
                        name: "a".to_string(),
                        handle: FederateHandle(1),
                        constrained: false,
                        regulator: false,
                        time: None,
                    }],
                ),
            )
            .unwrap();
        let mut fed = federation_with_store(store);
        let a = fed.add("a").unwrap().0;
        fed.add("stranger").unwrap();

        let responses = fed.request_federation_restore(a, "s1").unwrap();
        assert_eq!(kinds(&responses), vec![MessageType::RequestFederationRestoreFailed]);
    }

    #[test]
    fn test_save_and_restore_exclude_each_other() {
        let (mut fed, h) = joined(&["a"]);
        fed.request_federation_save(h[0], "s1", None).unwrap();
        let err = fed.request_federation_restore(h[0], "s1").unwrap_err();
        assert!(matches!(err, FederationError::SaveInProgress(_)));
    }
}
