//! Object-model collaborator
//!
//! The coordinator sequences publish/subscribe, object lifecycle, ownership
//! and region calls but keeps no such state itself. Everything lives behind
//! the [`ObjectModel`] trait. Operations that produce traffic for other
//! federates return [`Notice`]s which the federation stamps and relays.

mod memory;

pub use memory::InMemoryObjectModel;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::handles::{
    AttributeHandle, AttributeValue, FederateHandle, FederationTime, InteractionClassHandle,
    ObjectClassHandle, ObjectHandle, ParameterHandle, RegionHandle, SpaceHandle,
};
use crate::message::Payload;

/// Errors raised by the object model
#[derive(Debug, Error, PartialEq)]
pub enum ObjectModelError {
    #[error("Object class not defined: {0}")]
    ObjectClassNotDefined(ObjectClassHandle),

    #[error("Attribute {attribute} not defined in class {class}")]
    AttributeNotDefined {
        class: ObjectClassHandle,
        attribute: AttributeHandle,
    },

    #[error("Interaction class not defined: {0}")]
    InteractionClassNotDefined(InteractionClassHandle),

    #[error("Parameter {parameter} not defined in interaction class {class}")]
    InteractionParameterNotDefined {
        class: InteractionClassHandle,
        parameter: ParameterHandle,
    },

    #[error("Object class {0} not published")]
    ObjectClassNotPublished(ObjectClassHandle),

    #[error("Object class {0} not subscribed")]
    ObjectClassNotSubscribed(ObjectClassHandle),

    #[error("Interaction class {0} not published")]
    InteractionClassNotPublished(InteractionClassHandle),

    #[error("Interaction class {0} not subscribed")]
    InteractionClassNotSubscribed(InteractionClassHandle),

    #[error("Object not known: {0}")]
    ObjectNotKnown(ObjectHandle),

    #[error("Object already registered: {0}")]
    ObjectAlreadyRegistered(String),

    #[error("Federate does not hold delete privilege for object {0}")]
    DeletePrivilegeNotHeld(ObjectHandle),

    #[error("Attribute {attribute} of object {object} not owned")]
    AttributeNotOwned {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },

    #[error("Attribute {attribute} of object {object} already owned")]
    AttributeAlreadyOwned {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },

    #[error("Attribute {attribute} of object {object} not published")]
    AttributeNotPublished {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },

    #[error("Divestiture of attribute {attribute} of object {object} was not requested")]
    AttributeDivestitureWasNotRequested {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },

    #[error("Acquisition of attribute {attribute} of object {object} was not requested")]
    AttributeAcquisitionWasNotRequested {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },

    #[error("Routing space not defined: {0}")]
    SpaceNotDefined(SpaceHandle),

    #[error("Region not known: {0}")]
    RegionNotKnown(RegionHandle),

    #[error("Region {0} is in use")]
    RegionInUse(RegionHandle),

    #[error("Invalid extents: {0}")]
    InvalidExtents(String),

    #[error("Expected {expected} values, got {found}")]
    ValueCountMismatch { expected: usize, found: usize },
}

/// Inclusive range along one dimension of a routing space
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Range {
    pub lower: u64,
    pub upper: u64,
}

impl Range {
    pub fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }
}

/// One range per dimension of the region's routing space
pub type Extent = Vec<Range>;

/// Traffic produced by the object model for the federation to relay
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub recipients: Vec<FederateHandle>,
    /// Source of the notice as advertised to recipients
    pub federate: FederateHandle,
    pub payload: Payload,
}

impl Notice {
    pub fn new(recipients: Vec<FederateHandle>, federate: FederateHandle, payload: Payload) -> Self {
        Self {
            recipients,
            federate,
            payload,
        }
    }

    pub fn to(recipient: FederateHandle, federate: FederateHandle, payload: Payload) -> Self {
        Self::new(vec![recipient], federate, payload)
    }
}

pub type ObjectModelResult<T> = std::result::Result<T, ObjectModelError>;

/// Class hierarchy, instance and ownership bookkeeping for one federation
pub trait ObjectModel: Send {
    // Declaration management

    /// Replace `federate`'s published attribute set of `class`, or withdraw it
    fn publish_object_class(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
        publish: bool,
    ) -> ObjectModelResult<()>;

    /// Replace `federate`'s subscribed attribute set of `class`, or withdraw it
    ///
    /// Returns discovery notices for instances the subscriber can now see.
    fn subscribe_object_class(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
        subscribe: bool,
        region: Option<RegionHandle>,
    ) -> ObjectModelResult<Vec<Notice>>;

    /// Union of the publishers of every attribute of `class`
    fn class_publishers(&self, class: ObjectClassHandle) -> ObjectModelResult<BTreeSet<FederateHandle>>;

    fn publish_interaction_class(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        publish: bool,
    ) -> ObjectModelResult<()>;

    fn subscribe_interaction_class(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        subscribe: bool,
        region: Option<RegionHandle>,
    ) -> ObjectModelResult<()>;

    fn is_interaction_subscriber(&self, federate: FederateHandle, class: InteractionClassHandle) -> bool;

    // Object management

    /// Reserve an instance name; `Ok(false)` when the name is unavailable
    fn reserve_object_instance_name(&mut self, federate: FederateHandle, name: &str) -> ObjectModelResult<bool>;

    /// Create an instance under a handle issued by the federation
    fn register_object(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        object: ObjectHandle,
        name: &str,
    ) -> ObjectModelResult<Vec<Notice>>;

    fn delete_object(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        date: Option<FederationTime>,
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>>;

    fn object_class_of(&self, object: ObjectHandle) -> ObjectModelResult<ObjectClassHandle>;

    fn class_instances(&self, class: ObjectClassHandle) -> ObjectModelResult<Vec<ObjectHandle>>;

    /// Owner of an attribute; [`FederateHandle::ANONYMOUS`] when unowned
    fn attribute_owner(&self, object: ObjectHandle, attribute: AttributeHandle) -> ObjectModelResult<FederateHandle>;

    /// Holder of the instance's delete privilege
    fn object_owner(&self, object: ObjectHandle) -> ObjectModelResult<FederateHandle>;

    fn update_attribute_values(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        values: &[AttributeValue],
        date: Option<FederationTime>,
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>>;

    #[allow(clippy::too_many_arguments)]
    fn send_interaction(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        parameters: &[ParameterHandle],
        values: &[AttributeValue],
        date: Option<FederationTime>,
        region: Option<RegionHandle>,
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>>;

    // Ownership management

    fn negotiated_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>>;

    fn acquire_if_available(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<Vec<Notice>>;

    fn unconditional_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<Vec<Notice>>;

    fn acquire(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>>;

    fn cancel_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<()>;

    /// Release attributes to pending acquirers; returns those actually released
    fn release_response(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<(Vec<AttributeHandle>, Vec<Notice>)>;

    fn cancel_acquisition(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<Vec<Notice>>;

    fn is_owner(&self, federate: FederateHandle, object: ObjectHandle, attribute: AttributeHandle) -> ObjectModelResult<bool>;

    // Data distribution management

    fn create_region(&mut self, federate: FederateHandle, space: SpaceHandle, extents: Vec<Extent>) -> ObjectModelResult<RegionHandle>;

    fn modify_region(&mut self, federate: FederateHandle, region: RegionHandle, extents: Vec<Extent>) -> ObjectModelResult<()>;

    fn delete_region(&mut self, federate: FederateHandle, region: RegionHandle) -> ObjectModelResult<()>;

    fn associate_region(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        region: RegionHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<()>;

    fn unassociate_region(&mut self, federate: FederateHandle, object: ObjectHandle, region: RegionHandle) -> ObjectModelResult<()>;

    // Lifecycle

    /// Purge every reference to `federate`
    ///
    /// Instances it held the delete privilege for are removed; their handles
    /// are returned so the federation can release them.
    fn kill_federate(&mut self, federate: FederateHandle) -> ObjectModelResult<(Vec<ObjectHandle>, Vec<Notice>)>;

    /// Object model description handed to joining federates
    fn serialized_fom(&self) -> serde_json::Value;
}
