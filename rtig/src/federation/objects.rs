//! Declaration, object, ownership and region operations
//!
//! These validate the caller, delegate to the object model and turn the
//! notices it returns into responses.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::Federation;
use crate::error::{FederationError, Result};
use crate::handles::{
    AttributeHandle, AttributeValue, FederateHandle, FederationTime, InteractionClassHandle, ObjectClassHandle,
    ObjectHandle, ParameterHandle, RegionHandle, SpaceHandle,
};
use crate::message::Payload;
use crate::object_model::Extent;
use crate::response::{Response, Responses};

impl Federation {
    // Declarations

    /// Publish or withdraw the attributes of an object class
    pub fn publish_object(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
        publish: bool,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, ?attributes, %publish, "Federation::publish_object: called");
        let regular = self.check(federate)?;
        self.object_model.publish_object_class(federate, class, attributes, publish)?;

        let mut responses = Responses::new();
        if !attributes.is_empty() {
            responses.extend(self.start_registration(federate, class)?);
        }
        if regular {
            let ack = if publish {
                Payload::PublishObjectClass { class }
            } else {
                Payload::UnpublishObjectClass { class }
            };
            responses.push(self.respond_to(federate, federate, ack));
        }
        Ok(responses)
    }

    /// Subscribe to or withdraw from the attributes of an object class
    pub fn subscribe_object(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
        subscribe: bool,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, ?attributes, %subscribe, "Federation::subscribe_object: called");
        let regular = self.check(federate)?;
        let notices = self
            .object_model
            .subscribe_object_class(federate, class, attributes, subscribe, None)?;

        let mut responses = self.relay(notices);
        if !attributes.is_empty() {
            responses.extend(self.start_registration(federate, class)?);
        }
        if regular {
            let ack = if subscribe {
                Payload::SubscribeObjectClass { class }
            } else {
                Payload::UnsubscribeObjectClass { class }
            };
            responses.push(self.respond_to(federate, federate, ack));
        }
        Ok(responses)
    }

    /// Tell interested publishers of `class` they may start registering
    ///
    /// Only federates with class relevance advisory switched on are told;
    /// the MOM never is.
    fn start_registration(&self, federate: FederateHandle, class: ObjectClassHandle) -> Result<Responses> {
        let mom = self.mom_handle();
        let recipients: Vec<FederateHandle> = self
            .object_model
            .class_publishers(class)?
            .into_iter()
            .filter(|p| Some(*p) != mom)
            .filter(|p| self.federates.get(p).is_some_and(|f| f.class_relevance_advisory()))
            .collect();

        if recipients.is_empty() {
            return Ok(Responses::new());
        }
        debug!(?recipients, %class, "Federation::start_registration: notifying publishers");
        Ok(vec![Response::new(
            recipients,
            self.message(federate, Payload::StartRegistrationForObjectClass { class }),
        )])
    }

    pub fn publish_interaction(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        publish: bool,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %publish, "Federation::publish_interaction: called");
        let regular = self.check(federate)?;
        self.object_model.publish_interaction_class(federate, class, publish)?;

        let mut responses = Responses::new();
        if regular {
            let ack = if publish {
                Payload::PublishInteractionClass { class }
            } else {
                Payload::UnpublishInteractionClass { class }
            };
            responses.push(self.respond_to(federate, federate, ack));
        }
        Ok(responses)
    }

    pub fn subscribe_interaction(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        subscribe: bool,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %subscribe, "Federation::subscribe_interaction: called");
        let regular = self.check(federate)?;
        self.object_model
            .subscribe_interaction_class(federate, class, subscribe, None)?;

        let mut responses = Responses::new();
        if regular {
            let ack = if subscribe {
                Payload::SubscribeInteractionClass { class }
            } else {
                Payload::UnsubscribeInteractionClass { class }
            };
            responses.push(self.respond_to(federate, federate, ack));
        }
        Ok(responses)
    }

    // Objects

    /// Reserve an instance name ahead of registration
    ///
    /// The MOM learns the outcome from the return of its own call, so it
    /// gets no message.
    pub fn reserve_object_instance_name(&mut self, federate: FederateHandle, name: &str) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %name, "Federation::reserve_object_instance_name: called");
        let regular = self.check(federate)?;
        let reserved = self.object_model.reserve_object_instance_name(federate, name)?;
        debug!(%name, %reserved, "Federation::reserve_object_instance_name: reservation done");

        if !regular {
            return Ok(Responses::new());
        }
        let name = name.to_string();
        let payload = if reserved {
            Payload::ReserveObjectInstanceNameSucceeded { name }
        } else {
            Payload::ReserveObjectInstanceNameFailed { name }
        };
        Ok(vec![self.respond_to(federate, federate, payload)])
    }

    /// Register an instance under a fresh object handle
    ///
    /// An empty `name` becomes `HLAObject_<handle>`. The returned responses
    /// carry the discoveries for current subscribers.
    pub fn register_object(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        name: &str,
    ) -> Result<(ObjectHandle, Responses)> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %name, "Federation::register_object: called");
        self.check(federate)?;

        let object = self.object_handles.provide()?;
        let name = if name.is_empty() {
            format!("HLAObject_{}", object)
        } else {
            name.to_string()
        };

        let notices = match self.object_model.register_object(federate, class, object, &name) {
            Ok(notices) => notices,
            Err(e) => {
                self.object_handles.free(object)?;
                return Err(e.into());
            }
        };
        info!(%federate, %object, %name, "Object registered");
        self.notify_mom(|mom| mom.object_registered(federate, object));
        Ok((object, self.relay(notices)))
    }

    /// Register an instance and associate `attributes` with `region`
    ///
    /// A failed association undoes the registration.
    pub fn register_object_with_region(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        name: &str,
        region: RegionHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(ObjectHandle, Responses)> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %region, ?attributes, "Federation::register_object_with_region: called");
        let (object, responses) = self.register_object(federate, class, name)?;

        if let Err(e) = self.object_model.associate_region(federate, object, region, attributes) {
            warn!(%object, %region, error = %e, "Region association failed, dropping object");
            if let Err(undo) = self.object_model.delete_object(federate, object, None, "") {
                warn!(%object, error = %undo, "Failed to drop object");
            }
            self.object_handles.free(object)?;
            return Err(e.into());
        }
        Ok((object, responses))
    }

    pub fn delete_object(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        time: Option<FederationTime>,
        tag: &str,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?time, "Federation::delete_object: called");
        self.check(federate)?;
        let notices = self.object_model.delete_object(federate, object, time, tag)?;
        if let Err(e) = self.object_handles.free(object) {
            warn!(%object, error = %e, "Failed to release object handle");
        }
        info!(%federate, %object, "Object deleted");

        let mut responses = self.relay(notices);
        responses.push(self.respond_to(federate, federate, Payload::DeleteObject { object }));
        Ok(responses)
    }

    /// Ask the owners of `attributes` to provide fresh values
    ///
    /// One request goes to each owner with the attributes it owns; unowned
    /// attributes are skipped. Returns the holder of the delete privilege.
    pub fn request_object_owner(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(FederateHandle, Responses)> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::request_object_owner: called");
        self.check(federate)?;

        let mut by_owner: BTreeMap<FederateHandle, Vec<AttributeHandle>> = BTreeMap::new();
        for attribute in attributes {
            let owner = self.object_model.attribute_owner(object, *attribute)?;
            if owner != FederateHandle::ANONYMOUS {
                by_owner.entry(owner).or_default().push(*attribute);
            }
        }

        let mom = self.mom_handle();
        let mut responses = Responses::new();
        for (owner, attributes) in by_owner {
            if Some(owner) == mom {
                if let Some(mirror) = self.mom.as_mut() {
                    responses.extend(mirror.provide_attribute_value_update(object, &attributes));
                }
                continue;
            }
            responses.push(self.respond_to(
                owner,
                federate,
                Payload::ProvideAttributeValueUpdate { object, attributes },
            ));
        }

        let owner = self.object_model.object_owner(object)?;
        Ok((owner, responses))
    }

    /// Value update request for every instance of a class
    pub fn request_class_attribute_value_update(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, "Federation::request_class_attribute_value_update: called");
        let mut responses = Responses::new();
        for object in self.object_model.class_instances(class)? {
            let (_, r) = self.request_object_owner(federate, object, attributes)?;
            responses.extend(r);
        }
        Ok(responses)
    }

    pub fn update_attribute_values(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        values: &[AttributeValue],
        time: Option<FederationTime>,
        tag: &str,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, ?time, "Federation::update_attribute_values: called");
        self.check(federate)?;
        let notices = self
            .object_model
            .update_attribute_values(federate, object, attributes, values, time, tag)?;
        self.notify_mom(|mom| mom.attributes_updated(federate, object));
        Ok(self.relay(notices))
    }

    /// Deliver an interaction to its subscribers and acknowledge the sender
    #[allow(clippy::too_many_arguments)]
    pub fn broadcast_interaction(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        parameters: &[ParameterHandle],
        values: &[AttributeValue],
        time: Option<FederationTime>,
        region: Option<RegionHandle>,
        tag: &str,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, ?parameters, ?time, ?region, "Federation::broadcast_interaction: called");
        let regular = self.check(federate)?;
        let notices = self
            .object_model
            .send_interaction(federate, class, parameters, values, time, region, tag)?;

        let mut responses = Responses::new();
        if regular {
            responses.push(self.respond_to(federate, federate, Payload::SendInteraction { class }));
        }
        self.notify_mom(|mom| mom.interaction_sent(federate, class));
        responses.extend(self.relay(notices));
        Ok(responses)
    }

    // Ownership

    pub fn is_owner(&self, federate: FederateHandle, object: ObjectHandle, attribute: AttributeHandle) -> Result<bool> {
        self.check(federate)?;
        Ok(self.object_model.is_owner(federate, object, attribute)?)
    }

    /// Tell `federate` who owns `attribute`
    pub fn query_attribute_ownership(
        &self,
        federate: FederateHandle,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, %attribute, "Federation::query_attribute_ownership: called");
        self.check(federate)?;
        let owner = self.object_model.attribute_owner(object, attribute)?;
        let payload = if owner == FederateHandle::ANONYMOUS {
            Payload::AttributeIsNotOwned { object, attribute }
        } else {
            Payload::InformAttributeOwnership {
                object,
                attribute,
                owner,
            }
        };
        Ok(vec![self.respond_to(federate, federate, payload)])
    }

    pub fn negotiate_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        tag: &str,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::negotiate_divestiture: called");
        self.check(federate)?;
        let notices = self
            .object_model
            .negotiated_divestiture(federate, object, attributes, tag)?;
        Ok(self.relay(notices))
    }

    pub fn acquire_if_available(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::acquire_if_available: called");
        self.check(federate)?;
        let notices = self.object_model.acquire_if_available(federate, object, attributes)?;
        Ok(self.relay(notices))
    }

    /// Unconditional divestiture, acknowledged to the divesting federate
    pub fn divest(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::divest: called");
        self.check(federate)?;
        let notices = self
            .object_model
            .unconditional_divestiture(federate, object, attributes)?;

        let mut responses = self.relay(notices);
        responses.push(self.respond_to(
            federate,
            federate,
            Payload::UnconditionalAttributeOwnershipDivestiture {
                object,
                attributes: attributes.to_vec(),
            },
        ));
        Ok(responses)
    }

    pub fn acquire(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        tag: &str,
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::acquire: called");
        self.check(federate)?;
        let notices = self.object_model.acquire(federate, object, attributes, tag)?;
        Ok(self.relay(notices))
    }

    pub fn cancel_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::cancel_divestiture: called");
        self.check(federate)?;
        self.object_model.cancel_divestiture(federate, object, attributes)?;
        Ok(())
    }

    /// Release attributes to pending acquirers, returning those released
    pub fn respond_release(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(Vec<AttributeHandle>, Responses)> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::respond_release: called");
        self.check(federate)?;
        let (released, notices) = self.object_model.release_response(federate, object, attributes)?;
        Ok((released, self.relay(notices)))
    }

    pub fn cancel_acquisition(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, ?attributes, "Federation::cancel_acquisition: called");
        self.check(federate)?;
        let notices = self.object_model.cancel_acquisition(federate, object, attributes)?;
        Ok(self.relay(notices))
    }

    // Regions

    pub fn create_region(&mut self, federate: FederateHandle, space: SpaceHandle, extents: Vec<Extent>) -> Result<RegionHandle> {
        let _span = self.span.clone().entered();
        debug!(%federate, %space, "Federation::create_region: called");
        self.check(federate)?;
        Ok(self.object_model.create_region(federate, space, extents)?)
    }

    pub fn modify_region(&mut self, federate: FederateHandle, region: RegionHandle, extents: Vec<Extent>) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %region, "Federation::modify_region: called");
        self.check(federate)?;
        Ok(self.object_model.modify_region(federate, region, extents)?)
    }

    /// Delete a region; refused while a save or restore is running
    pub fn delete_region(&mut self, federate: FederateHandle, region: RegionHandle) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %region, "Federation::delete_region: called");
        self.check(federate)?;
        if self.saving {
            return Err(FederationError::SaveInProgress(String::new()));
        }
        if self.restoring {
            return Err(FederationError::RestoreInProgress(String::new()));
        }
        Ok(self.object_model.delete_region(federate, region)?)
    }

    pub fn associate_region(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        region: RegionHandle,
        attributes: &[AttributeHandle],
    ) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, %region, "Federation::associate_region: called");
        self.check(federate)?;
        Ok(self.object_model.associate_region(federate, object, region, attributes)?)
    }

    pub fn unassociate_region(&mut self, federate: FederateHandle, object: ObjectHandle, region: RegionHandle) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %object, %region, "Federation::unassociate_region: called");
        self.check(federate)?;
        Ok(self.object_model.unassociate_region(federate, object, region)?)
    }

    pub fn subscribe_attributes_with_region(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        region: RegionHandle,
        attributes: &[AttributeHandle],
    ) -> Result<Responses> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %region, ?attributes, "Federation::subscribe_attributes_with_region: called");
        self.check(federate)?;
        let notices = self
            .object_model
            .subscribe_object_class(federate, class, attributes, true, Some(region))?;
        Ok(self.relay(notices))
    }

    pub fn unsubscribe_attributes_with_region(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        region: RegionHandle,
    ) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %region, "Federation::unsubscribe_attributes_with_region: called");
        self.check(federate)?;
        self.object_model
            .subscribe_object_class(federate, class, &[], false, Some(region))?;
        Ok(())
    }

    pub fn subscribe_interaction_with_region(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        region: RegionHandle,
    ) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %region, "Federation::subscribe_interaction_with_region: called");
        self.check(federate)?;
        Ok(self
            .object_model
            .subscribe_interaction_class(federate, class, true, Some(region))?)
    }

    pub fn unsubscribe_interaction_with_region(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        region: RegionHandle,
    ) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %class, %region, "Federation::unsubscribe_interaction_with_region: called");
        self.check(federate)?;
        Ok(self
            .object_model
            .subscribe_interaction_class(federate, class, false, Some(region))?)
    }
}
