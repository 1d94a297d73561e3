//! Synchronization points

use tracing::{debug, info};

use super::Federation;
use crate::error::{FederationError, Result};
use crate::handles::FederateHandle;
use crate::message::Payload;
use crate::response::{Response, Responses};

impl Federation {
    /// Register a pending label and hand it to every federate that must achieve it
    ///
    /// With a non-empty `subset` only the caller and the subset hold the
    /// label; otherwise every joined federate does.
    pub fn register_synchronization(
        &mut self,
        federate: FederateHandle,
        label: &str,
        tag: &str,
        subset: Option<&[FederateHandle]>,
    ) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %label, ?subset, "Federation::register_synchronization: called");
        self.federate(federate)?;
        if label.is_empty() {
            return Err(FederationError::internal("Bad pause label(null)."));
        }
        if self.sync_labels.contains_key(label) {
            return Err(FederationError::FederationAlreadyPaused(
                "Label already pending".to_string(),
            ));
        }

        let targets = self.synchronization_targets(federate, subset)?;
        for handle in &targets {
            self.federate_mut(*handle)?.add_synchronization_label(label)?;
        }
        self.sync_labels.insert(label.to_string(), tag.to_string());
        info!(%label, federates = targets.len(), "Synchronization point registered");
        Ok(())
    }

    /// Record that `federate` reached `label`
    ///
    /// The completion broadcast goes out once nobody holds the label anymore.
    pub fn unregister_synchronization(&mut self, federate: FederateHandle, label: &str) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %label, "Federation::unregister_synchronization: called");
        if label.is_empty() {
            return Err(FederationError::internal("Bad pause label(null)."));
        }
        self.federate_mut(federate)?.remove_synchronization_label(label)?;

        let mut responses = Responses::new();
        if !self.is_label_held(label) {
            self.sync_labels.remove(label);
            info!(%label, "Federation synchronized");
            responses.push(self.respond_to_all(
                None,
                federate,
                Payload::FederationSynchronized {
                    label: label.to_string(),
                },
            ));
        }
        Ok(responses)
    }

    /// Announce a registered label to the federates that hold it
    pub fn broadcast_synchronization(
        &self,
        federate: FederateHandle,
        label: &str,
        tag: &str,
        subset: Option<&[FederateHandle]>,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %label, ?subset, "Federation::broadcast_synchronization: called");
        self.federate(federate)?;

        let recipients = self.synchronization_targets(federate, subset)?;
        let message = self.message(
            federate,
            Payload::AnnounceSynchronizationPoint {
                label: label.to_string(),
                tag: tag.to_string(),
            },
        );
        Ok(vec![Response::new(recipients, message)])
    }

    pub fn is_synchronizing(&self) -> bool {
        !self.sync_labels.is_empty()
    }

    pub fn pending_synchronization_labels(&self) -> impl Iterator<Item = &str> {
        self.sync_labels.keys().map(String::as_str)
    }

    /// Complete every pending label nobody holds anymore
    ///
    /// Happens when the last federates still holding a label leave.
    pub fn complete_orphaned_synchronizations(&mut self) -> Responses {
        let _span = self.span.clone().entered();
        let orphaned: Vec<String> = self
            .sync_labels
            .keys()
            .filter(|label| !self.is_label_held(label))
            .cloned()
            .collect();

        let mut responses = Responses::new();
        for label in orphaned {
            debug!(%label, "Federation::complete_orphaned_synchronizations: completing");
            self.sync_labels.remove(&label);
            let response = self.respond_to_all(
                None,
                FederateHandle::ANONYMOUS,
                Payload::FederationSynchronized { label },
            );
            if !response.recipients.is_empty() {
                responses.push(response);
            }
        }
        responses
    }

    fn is_label_held(&self, label: &str) -> bool {
        self.federates.values().any(|f| f.is_synchronizing_to(label))
    }

    /// Caller plus a validated subset, or everybody when no subset is given
    fn synchronization_targets(
        &self,
        federate: FederateHandle,
        subset: Option<&[FederateHandle]>,
    ) -> Result<Vec<FederateHandle>> {
        match subset {
            Some(subset) if !subset.is_empty() => {
                let mut targets = vec![federate];
                for handle in subset {
                    self.federate(*handle)?;
                    if !targets.contains(handle) {
                        targets.push(*handle);
                    }
                }
                Ok(targets)
            }
            _ => Ok(self.federate_handles()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::error::{ErrorKind, FederationError};
    use crate::handles::FederateHandle;
    use crate::message::{MessageType, Payload};

    #[test]
    fn test_barrier_completes_once_everybody_achieved() {
        let (mut fed, h) = joined(&["a", "b", "c"]);
        fed.register_synchronization(h[0], "sync1", "", None).unwrap();
        assert!(fed.is_synchronizing());

        assert!(fed.unregister_synchronization(h[0], "sync1").unwrap().is_empty());
        assert!(fed.unregister_synchronization(h[1], "sync1").unwrap().is_empty());
        let responses = fed.unregister_synchronization(h[2], "sync1").unwrap();

        assert_eq!(kinds(&responses), vec![MessageType::FederationSynchronized]);
        assert_eq!(responses[0].recipients, h);
        assert_eq!(responses[0].message.federate, h[2]);
        assert!(!fed.is_synchronizing());

        // Label is gone, achieving it again is an error
        assert!(fed.unregister_synchronization(h[0], "sync1").is_err());
    }

    #[test]
    fn test_already_pending_label_is_rejected() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.register_synchronization(h[0], "sync1", "first", None).unwrap();

        let err = fed.register_synchronization(h[1], "sync1", "second", None).unwrap_err();
        assert!(matches!(err, FederationError::FederationAlreadyPaused(_)));
        assert_eq!(fed.pending_synchronization_labels().collect::<Vec<_>>(), vec!["sync1"]);

        // The first tag survives
        let (_, responses) = fed.add("c").unwrap();
        assert_eq!(
            responses[0].message.payload,
            Payload::AnnounceSynchronizationPoint {
                label: "sync1".to_string(),
                tag: "first".to_string()
            }
        );
    }

    #[test]
    fn test_empty_label_is_rejected() {
        let (mut fed, h) = joined(&["a"]);
        let err = fed.register_synchronization(h[0], "", "", None).unwrap_err();
        assert_eq!(err.to_string(), "RTI internal error: Bad pause label(null).");
        assert!(fed.unregister_synchronization(h[0], "").is_err());
        assert!(!fed.is_synchronizing());
    }

    #[test]
    fn test_subset_holds_label_with_caller() {
        let (mut fed, h) = joined(&["a", "b", "c"]);
        fed.register_synchronization(h[0], "sub", "", Some(&[h[1]])).unwrap();

        assert!(fed.federate(h[0]).unwrap().is_synchronizing_to("sub"));
        assert!(fed.federate(h[1]).unwrap().is_synchronizing_to("sub"));
        assert!(!fed.federate(h[2]).unwrap().is_synchronizing_to("sub"));

        let responses = fed.broadcast_synchronization(h[0], "sub", "", Some(&[h[1]])).unwrap();
        assert_eq!(responses[0].recipients, vec![h[0], h[1]]);
    }

    #[test]
    fn test_subset_with_unknown_federate_mutates_nothing() {
        let (mut fed, h) = joined(&["a", "b"]);
        let err = fed
            .register_synchronization(h[0], "sub", "", Some(&[h[1], FederateHandle(7)]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExecutionMember);
        assert!(!fed.is_synchronizing());
        assert!(!fed.federate(h[0]).unwrap().is_synchronizing_to("sub"));
    }

    #[test]
    fn test_broadcast_to_everybody() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.register_synchronization(h[1], "sync1", "tag", None).unwrap();
        let responses = fed.broadcast_synchronization(h[1], "sync1", "tag", None).unwrap();
        assert_eq!(kinds(&responses), vec![MessageType::AnnounceSynchronizationPoint]);
        assert_eq!(responses[0].recipients, h);
        assert_eq!(responses[0].message.federate, h[1]);
    }

    #[test]
    fn test_unknown_federate_cannot_achieve() {
        let (mut fed, h) = joined(&["a"]);
        fed.register_synchronization(h[0], "sync1", "", None).unwrap();
        let err = fed.unregister_synchronization(FederateHandle(5), "sync1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExecutionMember);
    }

    #[test]
    fn test_orphaned_label_completes_after_resign() {
        let (mut fed, h) = joined(&["a", "b"]);
        fed.register_synchronization(h[0], "sync1", "", None).unwrap();
        fed.unregister_synchronization(h[1], "sync1").unwrap();

        fed.remove(h[0]).unwrap();
        let responses = fed.complete_orphaned_synchronizations();
        assert_eq!(kinds(&responses), vec![MessageType::FederationSynchronized]);
        assert_eq!(responses[0].recipients, vec![h[1]]);
        assert!(fed.complete_orphaned_synchronizations().is_empty());
    }
}
