//! Outbound protocol messages
//!
//! A [`Message`] is the addressed envelope (federation and source/target
//! federate) around one [`Payload`] variant. The set of kinds is closed; the
//! [`MessageType`] tag names a kind without its fields and
//! [`Message::create`] builds a default-filled message from a tag.

use serde::{Deserialize, Serialize};

use crate::handles::{
    AttributeHandle, AttributeValue, FederateHandle, FederationHandle, FederationTime,
    InteractionClassHandle, ObjectClassHandle, ObjectHandle, ParameterHandle, RegionHandle,
};

/// Addressed protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub federation: FederationHandle,
    /// Source federate for relayed updates, target for individualized ones
    pub federate: FederateHandle,
    pub payload: Payload,
}

/// Every kind of message the coordinator emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Payload {
    // Time management
    MessageNull {
        date: FederationTime,
    },
    SetTimeRegulating {
        regulating: bool,
        date: FederationTime,
    },
    TimeRegulationEnabled {
        date: FederationTime,
    },
    TimeConstrainedEnabled {
        date: FederationTime,
    },

    // Synchronization
    ConfirmSynchronizationPointRegistration {
        label: String,
    },
    AnnounceSynchronizationPoint {
        label: String,
        tag: String,
    },
    FederationSynchronized {
        label: String,
    },

    // Save
    InitiateFederateSave {
        label: String,
        date: Option<FederationTime>,
    },
    FederationSaved,
    FederationNotSaved,

    // Restore
    RequestFederationRestoreSucceeded {
        label: String,
    },
    RequestFederationRestoreFailed {
        label: String,
    },
    FederationRestoreBegun,
    InitiateFederateRestore {
        label: String,
    },
    FederationRestored,
    FederationNotRestored,

    // Membership
    ResignFederationExecution,

    // Declaration management
    PublishObjectClass {
        class: ObjectClassHandle,
    },
    UnpublishObjectClass {
        class: ObjectClassHandle,
    },
    SubscribeObjectClass {
        class: ObjectClassHandle,
    },
    UnsubscribeObjectClass {
        class: ObjectClassHandle,
    },
    StartRegistrationForObjectClass {
        class: ObjectClassHandle,
    },
    PublishInteractionClass {
        class: InteractionClassHandle,
    },
    UnpublishInteractionClass {
        class: InteractionClassHandle,
    },
    SubscribeInteractionClass {
        class: InteractionClassHandle,
    },
    UnsubscribeInteractionClass {
        class: InteractionClassHandle,
    },

    // Object management
    ReserveObjectInstanceNameSucceeded {
        name: String,
    },
    ReserveObjectInstanceNameFailed {
        name: String,
    },
    DiscoverObject {
        object: ObjectHandle,
        class: ObjectClassHandle,
        name: String,
    },
    ReflectAttributeValues {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
        values: Vec<AttributeValue>,
        date: Option<FederationTime>,
        tag: String,
    },
    RemoveObject {
        object: ObjectHandle,
        date: Option<FederationTime>,
        tag: String,
    },
    DeleteObject {
        object: ObjectHandle,
    },
    ProvideAttributeValueUpdate {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    SendInteraction {
        class: InteractionClassHandle,
    },
    ReceiveInteraction {
        class: InteractionClassHandle,
        parameters: Vec<ParameterHandle>,
        values: Vec<AttributeValue>,
        date: Option<FederationTime>,
        region: Option<RegionHandle>,
        tag: String,
    },

    // Ownership management
    UnconditionalAttributeOwnershipDivestiture {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    AttributeOwnershipAcquisitionNotification {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    AttributeOwnershipDivestitureNotification {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    AttributeOwnershipUnavailable {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    RequestAttributeOwnershipAssumption {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
        tag: String,
    },
    RequestAttributeOwnershipRelease {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
        tag: String,
    },
    ConfirmAttributeOwnershipAcquisitionCancellation {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    InformAttributeOwnership {
        object: ObjectHandle,
        attribute: AttributeHandle,
        owner: FederateHandle,
    },
    AttributeIsNotOwned {
        object: ObjectHandle,
        attribute: AttributeHandle,
    },
}

/// Field-less tag naming a [`Payload`] kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    MessageNull,
    SetTimeRegulating,
    TimeRegulationEnabled,
    TimeConstrainedEnabled,
    ConfirmSynchronizationPointRegistration,
    AnnounceSynchronizationPoint,
    FederationSynchronized,
    InitiateFederateSave,
    FederationSaved,
    FederationNotSaved,
    RequestFederationRestoreSucceeded,
    RequestFederationRestoreFailed,
    FederationRestoreBegun,
    InitiateFederateRestore,
    FederationRestored,
    FederationNotRestored,
    ResignFederationExecution,
    PublishObjectClass,
    UnpublishObjectClass,
    SubscribeObjectClass,
    UnsubscribeObjectClass,
    StartRegistrationForObjectClass,
    PublishInteractionClass,
    UnpublishInteractionClass,
    SubscribeInteractionClass,
    UnsubscribeInteractionClass,
    ReserveObjectInstanceNameSucceeded,
    ReserveObjectInstanceNameFailed,
    DiscoverObject,
    ReflectAttributeValues,
    RemoveObject,
    DeleteObject,
    ProvideAttributeValueUpdate,
    SendInteraction,
    ReceiveInteraction,
    UnconditionalAttributeOwnershipDivestiture,
    AttributeOwnershipAcquisitionNotification,
    AttributeOwnershipDivestitureNotification,
    AttributeOwnershipUnavailable,
    RequestAttributeOwnershipAssumption,
    RequestAttributeOwnershipRelease,
    ConfirmAttributeOwnershipAcquisitionCancellation,
    InformAttributeOwnership,
    AttributeIsNotOwned,
}

impl Payload {
    /// Tag of this payload
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::MessageNull { .. } => MessageType::MessageNull,
            Self::SetTimeRegulating { .. } => MessageType::SetTimeRegulating,
            Self::TimeRegulationEnabled { .. } => MessageType::TimeRegulationEnabled,
            Self::TimeConstrainedEnabled { .. } => MessageType::TimeConstrainedEnabled,
            Self::ConfirmSynchronizationPointRegistration { .. } => {
                MessageType::ConfirmSynchronizationPointRegistration
            }
            Self::AnnounceSynchronizationPoint { .. } => MessageType::AnnounceSynchronizationPoint,
            Self::FederationSynchronized { .. } => MessageType::FederationSynchronized,
            Self::InitiateFederateSave { .. } => MessageType::InitiateFederateSave,
            Self::FederationSaved => MessageType::FederationSaved,
            Self::FederationNotSaved => MessageType::FederationNotSaved,
            Self::RequestFederationRestoreSucceeded { .. } => {
                MessageType::RequestFederationRestoreSucceeded
            }
            Self::RequestFederationRestoreFailed { .. } => {
                MessageType::RequestFederationRestoreFailed
            }
            Self::FederationRestoreBegun => MessageType::FederationRestoreBegun,
            Self::InitiateFederateRestore { .. } => MessageType::InitiateFederateRestore,
            Self::FederationRestored => MessageType::FederationRestored,
            Self::FederationNotRestored => MessageType::FederationNotRestored,
            Self::ResignFederationExecution => MessageType::ResignFederationExecution,
            Self::PublishObjectClass { .. } => MessageType::PublishObjectClass,
            Self::UnpublishObjectClass { .. } => MessageType::UnpublishObjectClass,
            Self::SubscribeObjectClass { .. } => MessageType::SubscribeObjectClass,
            Self::UnsubscribeObjectClass { .. } => MessageType::UnsubscribeObjectClass,
            Self::StartRegistrationForObjectClass { .. } => {
                MessageType::StartRegistrationForObjectClass
            }
            Self::PublishInteractionClass { .. } => MessageType::PublishInteractionClass,
            Self::UnpublishInteractionClass { .. } => MessageType::UnpublishInteractionClass,
            Self::SubscribeInteractionClass { .. } => MessageType::SubscribeInteractionClass,
            Self::UnsubscribeInteractionClass { .. } => MessageType::UnsubscribeInteractionClass,
            Self::ReserveObjectInstanceNameSucceeded { .. } => {
                MessageType::ReserveObjectInstanceNameSucceeded
            }
            Self::ReserveObjectInstanceNameFailed { .. } => {
                MessageType::ReserveObjectInstanceNameFailed
            }
            Self::DiscoverObject { .. } => MessageType::DiscoverObject,
            Self::ReflectAttributeValues { .. } => MessageType::ReflectAttributeValues,
            Self::RemoveObject { .. } => MessageType::RemoveObject,
            Self::DeleteObject { .. } => MessageType::DeleteObject,
            Self::ProvideAttributeValueUpdate { .. } => MessageType::ProvideAttributeValueUpdate,
            Self::SendInteraction { .. } => MessageType::SendInteraction,
            Self::ReceiveInteraction { .. } => MessageType::ReceiveInteraction,
            Self::UnconditionalAttributeOwnershipDivestiture { .. } => {
                MessageType::UnconditionalAttributeOwnershipDivestiture
            }
            Self::AttributeOwnershipAcquisitionNotification { .. } => {
                MessageType::AttributeOwnershipAcquisitionNotification
            }
            Self::AttributeOwnershipDivestitureNotification { .. } => {
                MessageType::AttributeOwnershipDivestitureNotification
            }
            Self::AttributeOwnershipUnavailable { .. } => {
                MessageType::AttributeOwnershipUnavailable
            }
            Self::RequestAttributeOwnershipAssumption { .. } => {
                MessageType::RequestAttributeOwnershipAssumption
            }
            Self::RequestAttributeOwnershipRelease { .. } => {
                MessageType::RequestAttributeOwnershipRelease
            }
            Self::ConfirmAttributeOwnershipAcquisitionCancellation { .. } => {
                MessageType::ConfirmAttributeOwnershipAcquisitionCancellation
            }
            Self::InformAttributeOwnership { .. } => MessageType::InformAttributeOwnership,
            Self::AttributeIsNotOwned { .. } => MessageType::AttributeIsNotOwned,
        }
    }

    /// Default-filled payload for a tag
    pub fn create(kind: MessageType) -> Self {
        match kind {
            MessageType::MessageNull => Self::MessageNull {
                date: FederationTime::ZERO,
            },
            MessageType::SetTimeRegulating => Self::SetTimeRegulating {
                regulating: false,
                date: FederationTime::ZERO,
            },
            MessageType::TimeRegulationEnabled => Self::TimeRegulationEnabled {
                date: FederationTime::ZERO,
            },
            MessageType::TimeConstrainedEnabled => Self::TimeConstrainedEnabled {
                date: FederationTime::ZERO,
            },
            MessageType::ConfirmSynchronizationPointRegistration => {
                Self::ConfirmSynchronizationPointRegistration {
                    label: String::new(),
                }
            }
            MessageType::AnnounceSynchronizationPoint => Self::AnnounceSynchronizationPoint {
                label: String::new(),
                tag: String::new(),
            },
            MessageType::FederationSynchronized => Self::FederationSynchronized {
                label: String::new(),
            },
            MessageType::InitiateFederateSave => Self::InitiateFederateSave {
                label: String::new(),
                date: None,
            },
            MessageType::FederationSaved => Self::FederationSaved,
            MessageType::FederationNotSaved => Self::FederationNotSaved,
            MessageType::RequestFederationRestoreSucceeded => {
                Self::RequestFederationRestoreSucceeded {
                    label: String::new(),
                }
            }
            MessageType::RequestFederationRestoreFailed => Self::RequestFederationRestoreFailed {
                label: String::new(),
            },
            MessageType::FederationRestoreBegun => Self::FederationRestoreBegun,
            MessageType::InitiateFederateRestore => Self::InitiateFederateRestore {
                label: String::new(),
            },
            MessageType::FederationRestored => Self::FederationRestored,
            MessageType::FederationNotRestored => Self::FederationNotRestored,
            MessageType::ResignFederationExecution => Self::ResignFederationExecution,
            MessageType::PublishObjectClass => Self::PublishObjectClass {
                class: ObjectClassHandle::default(),
            },
            MessageType::UnpublishObjectClass => Self::UnpublishObjectClass {
                class: ObjectClassHandle::default(),
            },
            MessageType::SubscribeObjectClass => Self::SubscribeObjectClass {
                class: ObjectClassHandle::default(),
            },
            MessageType::UnsubscribeObjectClass => Self::UnsubscribeObjectClass {
                class: ObjectClassHandle::default(),
            },
            MessageType::StartRegistrationForObjectClass => Self::StartRegistrationForObjectClass {
                class: ObjectClassHandle::default(),
            },
            MessageType::PublishInteractionClass => Self::PublishInteractionClass {
                class: InteractionClassHandle::default(),
            },
            MessageType::UnpublishInteractionClass => Self::UnpublishInteractionClass {
                class: InteractionClassHandle::default(),
            },
            MessageType::SubscribeInteractionClass => Self::SubscribeInteractionClass {
                class: InteractionClassHandle::default(),
            },
            MessageType::UnsubscribeInteractionClass => Self::UnsubscribeInteractionClass {
                class: InteractionClassHandle::default(),
            },
            MessageType::ReserveObjectInstanceNameSucceeded => {
                Self::ReserveObjectInstanceNameSucceeded {
                    name: String::new(),
                }
            }
            MessageType::ReserveObjectInstanceNameFailed => Self::ReserveObjectInstanceNameFailed {
                name: String::new(),
            },
            MessageType::DiscoverObject => Self::DiscoverObject {
                object: ObjectHandle::default(),
                class: ObjectClassHandle::default(),
                name: String::new(),
            },
            MessageType::ReflectAttributeValues => Self::ReflectAttributeValues {
                object: ObjectHandle::default(),
                attributes: Vec::new(),
                values: Vec::new(),
                date: None,
                tag: String::new(),
            },
            MessageType::RemoveObject => Self::RemoveObject {
                object: ObjectHandle::default(),
                date: None,
                tag: String::new(),
            },
            MessageType::DeleteObject => Self::DeleteObject {
                object: ObjectHandle::default(),
            },
            MessageType::ProvideAttributeValueUpdate => Self::ProvideAttributeValueUpdate {
                object: ObjectHandle::default(),
                attributes: Vec::new(),
            },
            MessageType::SendInteraction => Self::SendInteraction {
                class: InteractionClassHandle::default(),
            },
            MessageType::ReceiveInteraction => Self::ReceiveInteraction {
                class: InteractionClassHandle::default(),
                parameters: Vec::new(),
                values: Vec::new(),
                date: None,
                region: None,
                tag: String::new(),
            },
            MessageType::UnconditionalAttributeOwnershipDivestiture => {
                Self::UnconditionalAttributeOwnershipDivestiture {
                    object: ObjectHandle::default(),
                    attributes: Vec::new(),
                }
            }
            MessageType::AttributeOwnershipAcquisitionNotification => {
                Self::AttributeOwnershipAcquisitionNotification {
                    object: ObjectHandle::default(),
                    attributes: Vec::new(),
                }
            }
            MessageType::AttributeOwnershipDivestitureNotification => {
                Self::AttributeOwnershipDivestitureNotification {
                    object: ObjectHandle::default(),
                    attributes: Vec::new(),
                }
            }
            MessageType::AttributeOwnershipUnavailable => Self::AttributeOwnershipUnavailable {
                object: ObjectHandle::default(),
                attributes: Vec::new(),
            },
            MessageType::RequestAttributeOwnershipAssumption => {
                Self::RequestAttributeOwnershipAssumption {
                    object: ObjectHandle::default(),
                    attributes: Vec::new(),
                    tag: String::new(),
                }
            }
            MessageType::RequestAttributeOwnershipRelease => {
                Self::RequestAttributeOwnershipRelease {
                    object: ObjectHandle::default(),
                    attributes: Vec::new(),
                    tag: String::new(),
                }
            }
            MessageType::ConfirmAttributeOwnershipAcquisitionCancellation => {
                Self::ConfirmAttributeOwnershipAcquisitionCancellation {
                    object: ObjectHandle::default(),
                    attributes: Vec::new(),
                }
            }
            MessageType::InformAttributeOwnership => Self::InformAttributeOwnership {
                object: ObjectHandle::default(),
                attribute: AttributeHandle::default(),
                owner: FederateHandle::default(),
            },
            MessageType::AttributeIsNotOwned => Self::AttributeIsNotOwned {
                object: ObjectHandle::default(),
                attribute: AttributeHandle::default(),
            },
        }
    }
}

impl Message {
    pub fn new(federation: FederationHandle, federate: FederateHandle, payload: Payload) -> Self {
        Self {
            federation,
            federate,
            payload,
        }
    }

    /// Build a default-filled message of the given kind
    pub fn create(kind: MessageType, federation: FederationHandle, federate: FederateHandle) -> Self {
        Self::new(federation, federate, Payload::create(kind))
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}
