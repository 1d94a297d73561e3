//! Deferred message deliveries
//!
//! Coordinator operations never send anything themselves. They return a
//! [`Responses`] batch describing who gets which message, in order, and the
//! caller hands the batch to a transport.

use serde::{Deserialize, Serialize};

use crate::handles::FederateHandle;
use crate::message::Message;

/// Send `message` to every federate in `recipients`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub recipients: Vec<FederateHandle>,
    pub message: Message,
}

/// Ordered batch of deliveries produced by one operation
pub type Responses = Vec<Response>;

impl Response {
    pub fn new(recipients: Vec<FederateHandle>, message: Message) -> Self {
        Self {
            recipients,
            message,
        }
    }

    /// Unicast
    pub fn to(recipient: FederateHandle, message: Message) -> Self {
        Self::new(vec![recipient], message)
    }

    /// Broadcast to `population`, optionally leaving one federate out
    pub fn to_all_except(
        population: impl IntoIterator<Item = FederateHandle>,
        except: Option<FederateHandle>,
        message: Message,
    ) -> Self {
        let recipients = population
            .into_iter()
            .filter(|h| Some(*h) != except)
            .collect();
        Self::new(recipients, message)
    }

    pub fn is_addressed_to(&self, federate: FederateHandle) -> bool {
        self.recipients.contains(&federate)
    }
}
