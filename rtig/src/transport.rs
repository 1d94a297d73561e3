//! Delivery of response batches to federate channels

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::handles::{FederateHandle, FederationHandle};
use crate::message::Message;
use crate::response::Responses;

/// Failure to hand one message to one recipient
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("No channel registered for federate {federate} of federation {federation}")]
    UnknownRecipient {
        federation: FederationHandle,
        federate: FederateHandle,
    },

    #[error("Channel to federate {0} is closed")]
    ChannelClosed(FederateHandle),

    #[error("Channel to federate {0} is full")]
    Backpressure(FederateHandle),
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TransientDeliveryFailure
    }
}

/// Resolves a federate to its outbound channel and writes to it
pub trait Transport {
    fn deliver(&self, to: FederateHandle, message: &Message) -> Result<(), DeliveryError>;
}

/// Outcome of dispatching one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<(FederateHandle, DeliveryError)>,
}

impl DispatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Deliver every response in order, continuing past per-recipient failures
pub fn dispatch(responses: &Responses, transport: &dyn Transport) -> DispatchReport {
    debug!(responses = responses.len(), "dispatch: called");
    let mut report = DispatchReport::default();
    for response in responses {
        for recipient in &response.recipients {
            match transport.deliver(*recipient, &response.message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        federate = %recipient,
                        message = ?response.message.message_type(),
                        error = %e,
                        "Failed to deliver message"
                    );
                    report.failures.push((*recipient, e));
                }
            }
        }
    }
    report
}

/// Registry of per-federate tokio channels
#[derive(Debug, Default)]
pub struct ChannelTransport {
    links: HashMap<(FederationHandle, FederateHandle), mpsc::Sender<Message>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, federation: FederationHandle, federate: FederateHandle, link: mpsc::Sender<Message>) {
        debug!(%federation, %federate, "ChannelTransport::register: called");
        self.links.insert((federation, federate), link);
    }

    pub fn unregister(&mut self, federation: FederationHandle, federate: FederateHandle) -> bool {
        debug!(%federation, %federate, "ChannelTransport::unregister: called");
        self.links.remove(&(federation, federate)).is_some()
    }

    /// Drop every link of a federation
    pub fn unregister_federation(&mut self, federation: FederationHandle) {
        self.links.retain(|(fed, _), _| *fed != federation);
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl Transport for ChannelTransport {
    fn deliver(&self, to: FederateHandle, message: &Message) -> Result<(), DeliveryError> {
        let link = self
            .links
            .get(&(message.federation, to))
            .ok_or(DeliveryError::UnknownRecipient {
                federation: message.federation,
                federate: to,
            })?;
        link.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure(to),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::ChannelClosed(to),
        })
    }
}
