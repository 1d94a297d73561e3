//! Broker actor driving the federation executions
//!
//! The Broker owns every federation and processes one request at a time to
//! completion. A request is validated and applied by its federation; the
//! resulting responses are then delivered, in order, to the recipients'
//! outbound links before the requester gets its direct answer.
//! - **BrokerClient:** create, destroy and join federations
//! - **BrokerHandle:** one per joined federate, sends its requests and
//!   receives its messages

mod config;
mod core;
mod handle;
mod messages;

pub use config::BrokerConfig;
pub use core::Broker;
pub use handle::{BrokerClient, BrokerHandle};
pub use messages::{Answer, BrokerError, BrokerMetrics, BrokerRequest, BrokerResult, FederateRequest, Joined};
