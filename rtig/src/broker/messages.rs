//! Request and reply types for the Broker

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ErrorKind, FederationError};
use crate::handles::{
    AttributeHandle, AttributeValue, FederateHandle, FederationHandle, FederationTime, InteractionClassHandle,
    ObjectClassHandle, ObjectHandle, ParameterHandle, RegionHandle, SpaceHandle,
};
use crate::message::Message;
use crate::object_model::{Extent, ObjectModel};

/// Errors seen by broker clients
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error("Broker channel closed")]
    ChannelClosed,

    #[error("Broker dropped the reply")]
    NoReply,
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Federation(e) => e.kind(),
            Self::ChannelClosed | Self::NoReply => ErrorKind::TransientDeliveryFailure,
        }
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// One decoded request of a joined federate
#[derive(Debug, Clone, PartialEq)]
pub enum FederateRequest {
    // Time management
    EnableTimeRegulation { time: FederationTime },
    DisableTimeRegulation,
    SetTimeConstrained { enabled: bool, time: FederationTime },
    MessageNull { time: FederationTime },
    /// Next-event-request-available time advance request
    MessageNullPrime { time: FederationTime },
    QueryLbts,

    // Synchronization points
    RegisterSynchronizationPoint {
        label: String,
        tag: String,
        subset: Option<Vec<FederateHandle>>,
    },
    SynchronizationPointAchieved { label: String },

    // Save and restore
    RequestFederationSave { label: String, time: Option<FederationTime> },
    FederateSaveBegun,
    FederateSaveStatus { ok: bool },
    RequestFederationRestore { label: String },
    FederateRestoreStatus { ok: bool },

    // Declarations
    PublishObjectClass {
        class: ObjectClassHandle,
        attributes: Vec<AttributeHandle>,
        publish: bool,
    },
    SubscribeObjectClass {
        class: ObjectClassHandle,
        attributes: Vec<AttributeHandle>,
        subscribe: bool,
    },
    PublishInteractionClass { class: InteractionClassHandle, publish: bool },
    SubscribeInteractionClass { class: InteractionClassHandle, subscribe: bool },
    SetClassRelevanceAdvisorySwitch { enabled: bool },
    SetAutoProvide { enabled: bool },

    // Objects
    ReserveObjectInstanceName { name: String },
    RegisterObject { class: ObjectClassHandle, name: String },
    RegisterObjectWithRegion {
        class: ObjectClassHandle,
        name: String,
        region: RegionHandle,
        attributes: Vec<AttributeHandle>,
    },
    DeleteObject {
        object: ObjectHandle,
        time: Option<FederationTime>,
        tag: String,
    },
    UpdateAttributeValues {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
        values: Vec<AttributeValue>,
        time: Option<FederationTime>,
        tag: String,
    },
    SendInteraction {
        class: InteractionClassHandle,
        parameters: Vec<ParameterHandle>,
        values: Vec<AttributeValue>,
        time: Option<FederationTime>,
        region: Option<RegionHandle>,
        tag: String,
    },
    RequestObjectAttributeValueUpdate {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    RequestClassAttributeValueUpdate {
        class: ObjectClassHandle,
        attributes: Vec<AttributeHandle>,
    },

    // Ownership
    IsAttributeOwnedByFederate { object: ObjectHandle, attribute: AttributeHandle },
    QueryAttributeOwnership { object: ObjectHandle, attribute: AttributeHandle },
    NegotiatedAttributeOwnershipDivestiture {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
        tag: String,
    },
    AttributeOwnershipAcquisitionIfAvailable {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    UnconditionalAttributeOwnershipDivestiture {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    AttributeOwnershipAcquisition {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
        tag: String,
    },
    CancelNegotiatedAttributeOwnershipDivestiture {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    AttributeOwnershipReleaseResponse {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },
    CancelAttributeOwnershipAcquisition {
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
    },

    // Regions
    CreateRegion { space: SpaceHandle, extents: Vec<Extent> },
    ModifyRegion { region: RegionHandle, extents: Vec<Extent> },
    DeleteRegion { region: RegionHandle },
    AssociateRegion {
        object: ObjectHandle,
        region: RegionHandle,
        attributes: Vec<AttributeHandle>,
    },
    UnassociateRegion { object: ObjectHandle, region: RegionHandle },
    SubscribeAttributesWithRegion {
        class: ObjectClassHandle,
        region: RegionHandle,
        attributes: Vec<AttributeHandle>,
    },
    UnsubscribeAttributesWithRegion { class: ObjectClassHandle, region: RegionHandle },
    SubscribeInteractionWithRegion { class: InteractionClassHandle, region: RegionHandle },
    UnsubscribeInteractionWithRegion { class: InteractionClassHandle, region: RegionHandle },
}

/// Direct answer to a [`FederateRequest`]
///
/// Everything else the request causes is delivered on the federates' links.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Done,
    Lbts(Option<FederationTime>),
    Object(ObjectHandle),
    Owner(FederateHandle),
    Owned(bool),
    Released(Vec<AttributeHandle>),
    Region(RegionHandle),
}

/// Outcome of a successful join
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub federation: FederationHandle,
    pub federate: FederateHandle,
    /// Object model description of the federation
    pub fom: serde_json::Value,
}

/// Internal requests to the Broker task
pub enum BrokerRequest {
    CreateFederation {
        name: String,
        fom_id: String,
        object_model: Box<dyn ObjectModel>,
        reply_tx: oneshot::Sender<Result<FederationHandle, FederationError>>,
    },

    DestroyFederation {
        name: String,
        reply_tx: oneshot::Sender<Result<(), FederationError>>,
    },

    /// Join a federate and register its outbound link
    Join {
        federation: String,
        federate: String,
        link: mpsc::Sender<Message>,
        reply_tx: oneshot::Sender<Result<Joined, FederationError>>,
    },

    /// Orderly resignation
    Resign {
        federation: FederationHandle,
        federate: FederateHandle,
        reply_tx: oneshot::Sender<Result<(), FederationError>>,
    },

    /// The federate's link broke
    Disconnect {
        federation: FederationHandle,
        federate: FederateHandle,
    },

    Federate {
        federation: FederationHandle,
        federate: FederateHandle,
        request: FederateRequest,
        reply_tx: oneshot::Sender<Result<Answer, FederationError>>,
    },

    GetMetrics {
        reply_tx: oneshot::Sender<BrokerMetrics>,
    },

    Shutdown,
}

impl std::fmt::Debug for BrokerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateFederation { name, fom_id, .. } => f
                .debug_struct("CreateFederation")
                .field("name", name)
                .field("fom_id", fom_id)
                .finish_non_exhaustive(),
            Self::DestroyFederation { name, .. } => {
                f.debug_struct("DestroyFederation").field("name", name).finish_non_exhaustive()
            }
            Self::Join {
                federation, federate, ..
            } => f
                .debug_struct("Join")
                .field("federation", federation)
                .field("federate", federate)
                .finish_non_exhaustive(),
            Self::Resign {
                federation, federate, ..
            } => f
                .debug_struct("Resign")
                .field("federation", federation)
                .field("federate", federate)
                .finish_non_exhaustive(),
            Self::Disconnect { federation, federate } => f
                .debug_struct("Disconnect")
                .field("federation", federation)
                .field("federate", federate)
                .finish(),
            Self::Federate {
                federation,
                federate,
                request,
                ..
            } => f
                .debug_struct("Federate")
                .field("federation", federation)
                .field("federate", federate)
                .field("request", request)
                .finish_non_exhaustive(),
            Self::GetMetrics { .. } => f.write_str("GetMetrics"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Broker metrics
#[derive(Debug, Clone, Default)]
pub struct BrokerMetrics {
    /// Requests processed
    pub requests: u64,
    /// Requests answered with an error
    pub rejected: u64,
    /// Messages handed to a federate link
    pub delivered: u64,
    /// Messages that could not be handed to their recipient
    pub delivery_failures: u64,
    /// Federates removed after a broken link
    pub killed: u64,
    /// Federations currently running
    pub federations: usize,
    /// Federate links currently registered
    pub links: usize,
}
