//! Management-object-model mirror
//!
//! A federation may carry one mirror that is told, in line, about every
//! membership, time, save/restore and object transition. The mirror is
//! itself a federate of the federation (it owns a federate handle) but never
//! has a transport channel; anything addressed to it is served in-process.
//! All notification methods default to doing nothing.

use crate::handles::{
    AttributeHandle, AttributeValue, FederateHandle, FederationTime, InteractionClassHandle,
    ObjectHandle, ParameterHandle,
};
use crate::response::Responses;

/// Notification seam for an optional in-process management federate
pub trait MomMirror: Send {
    /// Federate handle the mirror was created with
    fn handle(&self) -> FederateHandle;

    fn federate_joined(&mut self, _federate: FederateHandle, _name: &str) {}

    fn federate_resigned(&mut self, _federate: FederateHandle) {}

    /// Full list of joined federates after a membership change
    fn federates_changed(&mut self, _federates: &[FederateHandle]) {}

    fn time_regulation_changed(&mut self, _federate: FederateHandle, _enabled: bool, _time: FederationTime) {}

    fn time_constrained_changed(&mut self, _federate: FederateHandle, _enabled: bool) {}

    fn save_changed(&mut self, _in_progress: bool, _label: &str) {}

    fn restore_changed(&mut self, _in_progress: bool, _label: &str) {}

    fn auto_provide_changed(&mut self, _enabled: bool) {}

    fn object_registered(&mut self, _federate: FederateHandle, _object: ObjectHandle) {}

    fn attributes_updated(&mut self, _federate: FederateHandle, _object: ObjectHandle) {}

    fn interaction_sent(&mut self, _federate: FederateHandle, _class: InteractionClassHandle) {}

    /// Interaction delivered to the mirror as a subscriber
    fn process_interaction(
        &mut self,
        _from: FederateHandle,
        _class: InteractionClassHandle,
        _parameters: &[ParameterHandle],
        _values: &[AttributeValue],
    ) -> Responses {
        Responses::new()
    }

    /// Update request for attributes the mirror owns
    fn provide_attribute_value_update(
        &mut self,
        _object: ObjectHandle,
        _attributes: &[AttributeHandle],
    ) -> Responses {
        Responses::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet(FederateHandle);

    impl MomMirror for Quiet {
        fn handle(&self) -> FederateHandle {
            self.0
        }
    }

    #[test]
    fn test_default_methods_are_inert() {
        let mut mom = Quiet(FederateHandle(1));
        mom.federate_joined(FederateHandle(2), "alpha");
        mom.save_changed(true, "checkpoint");
        assert_eq!(mom.handle(), FederateHandle(1));
        assert!(mom
            .process_interaction(FederateHandle(2), InteractionClassHandle(1), &[], &[])
            .is_empty());
        assert!(mom.provide_attribute_value_update(ObjectHandle(1), &[]).is_empty());
    }
}
