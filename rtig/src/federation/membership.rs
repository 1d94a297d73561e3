//! Join, resign and forced removal

use tracing::{debug, info, warn};

use super::Federation;
use crate::error::{FederationError, Result};
use crate::federate::Federate;
use crate::handles::FederateHandle;
use crate::message::{Message, Payload};
use crate::response::Responses;

impl Federation {
    /// Join a federate
    ///
    /// The joiner is caught up on the current state: one null message per
    /// existing regulator carrying that regulator's time, and one
    /// announcement per pending synchronization label, which the joiner then
    /// also has to achieve.
    pub fn add(&mut self, name: &str) -> Result<(FederateHandle, Responses)> {
        let _span = self.span.clone().entered();
        debug!(%name, "Federation::add: called");
        if self.federates.values().any(|f| f.name() == name) {
            return Err(FederationError::FederateAlreadyExecutionMember(format!(
                "Federate with same name <{}> has already joined the federation",
                name
            )));
        }

        let handle = self.federate_handles.provide()?;
        let mut federate = Federate::new(handle, name);
        let mut responses = Responses::new();

        for (regulator, date) in self.clocks.clocks() {
            debug!(%regulator, %date, "Federation::add: sending null message to new federate");
            responses.push(self.respond_to(handle, regulator, Payload::MessageNull { date }));
        }

        for (label, tag) in &self.sync_labels {
            debug!(%label, "Federation::add: sending synchronization announce to new federate");
            federate.add_synchronization_label(label)?;
            responses.push(self.respond_to(
                handle,
                handle,
                Payload::AnnounceSynchronizationPoint {
                    label: label.clone(),
                    tag: tag.clone(),
                },
            ));
        }

        self.federates.insert(handle, federate);
        info!(federate = %handle, %name, "Federate joined");

        let federates = self.federate_handles();
        self.notify_mom(|mom| {
            mom.federate_joined(handle, name);
            mom.federates_changed(&federates);
        });
        Ok((handle, responses))
    }

    /// Resign a federate
    ///
    /// Any regulator or constrained status still held is dropped and the
    /// object model forgets the federate. Returns the message describing the
    /// resignation and the traffic the object model produced for the
    /// survivors, such as the removal of instances the leaver owned.
    pub fn remove(&mut self, handle: FederateHandle) -> Result<(Message, Responses)> {
        let _span = self.span.clone().entered();
        debug!(federate = %handle, "Federation::remove: called");
        self.federate(handle)?;

        if self.clocks.contains(handle) {
            debug!(federate = %handle, "Federation::remove: dropping regulator clock");
            let _ = self.clocks.remove(handle);
        }
        let mut responses = Responses::new();
        match self.object_model.kill_federate(handle) {
            Ok((objects, notices)) => {
                for object in objects {
                    if let Err(e) = self.object_handles.free(object) {
                        warn!(%object, error = %e, "Failed to release object handle");
                    }
                }
                responses.extend(self.relay(notices));
            }
            Err(e) => warn!(federate = %handle, error = %e, "Object model cleanup failed"),
        }

        self.federate_handles.free(handle)?;
        self.federates.remove(&handle);
        info!(federate = %handle, "Federate resigned");

        let federates = self.federate_handles();
        self.notify_mom(|mom| {
            mom.federate_resigned(handle);
            mom.federates_changed(&federates);
        });
        Ok((self.message(handle, Payload::ResignFederationExecution), responses))
    }

    /// Forced removal after an abnormal disconnect
    ///
    /// Never fails. Each step is skipped when there is nothing to undo, and a
    /// failure of one step is logged without stopping the next. The returned
    /// responses tell the survivors what changed.
    pub fn kill(&mut self, handle: FederateHandle) -> Responses {
        let _span = self.span.clone().entered();
        debug!(federate = %handle, "Federation::kill: called");
        let Some(federate) = self.federates.get(&handle) else {
            debug!(federate = %handle, "Federation::kill: federate was not from this federation");
            return Responses::new();
        };
        let (regulator, constrained) = (federate.is_regulator(), federate.is_constrained());

        let mut responses = Responses::new();
        if regulator {
            match self.remove_regulator(handle) {
                Ok(r) => responses.extend(r),
                Err(e) => warn!(federate = %handle, error = %e, "Failed to remove regulator"),
            }
        } else {
            debug!(federate = %handle, "Federation::kill: was not a regulator, continue");
        }

        if constrained && let Some(federate) = self.federates.get_mut(&handle) {
            if let Err(e) = federate.set_constrained(false) {
                warn!(federate = %handle, error = %e, "Failed to clear constrained flag");
            }
            self.notify_mom(|mom| mom.time_constrained_changed(handle, false));
        }

        match self.object_model.kill_federate(handle) {
            Ok((objects, notices)) => {
                for object in objects {
                    if let Err(e) = self.object_handles.free(object) {
                        warn!(%object, error = %e, "Failed to release object handle");
                    }
                }
                responses.extend(self.relay(notices));
            }
            Err(e) => warn!(federate = %handle, error = %e, "Object model cleanup failed"),
        }

        match self.remove(handle) {
            Ok((_, r)) => responses.extend(r),
            Err(e) => warn!(federate = %handle, error = %e, "Failed to remove killed federate"),
        }

        responses.extend(self.complete_orphaned_synchronizations());
        // A killed federate must not hold up a save or restore round
        responses.extend(self.settle_save_and_restore());
        info!(federate = %handle, "Federate killed");
        responses
    }

    /// Whether `handle` is a regular joined federate
    ///
    /// The MOM's own handle is present but not regular and yields `Ok(false)`.
    pub fn check(&self, handle: FederateHandle) -> Result<bool> {
        if self.mom_handle() == Some(handle) {
            return Ok(false);
        }
        if !self.federates.contains_key(&handle) {
            return Err(FederationError::not_member(format!(
                "Federate Handle <{}> not found in federation <{}>",
                handle, self.handle
            )));
        }
        Ok(true)
    }
}
