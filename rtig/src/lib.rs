//! RTIG - federation execution coordinator
//!
//! The RTIG is the central broker of an HLA run-time infrastructure. It keeps
//! the authoritative model of every running federation execution and turns
//! each federate request into the protocol messages the other federates must
//! see.
//!
//! # Core Concepts
//!
//! - **Validate, mutate, respond**: every operation checks its preconditions
//!   before changing anything and returns the outbound traffic as data
//! - **Run to completion**: the broker handles one request at a time
//! - **Forced removal never fails**: a broken link cleans up whatever it can
//!
//! # Modules
//!
//! - [`federation`] - Per-execution coordinator (membership, time, barriers,
//!   save/restore, objects)
//! - [`federations`] - The set of live executions
//! - [`broker`] - Actor task, client handles and request types
//! - [`object_model`] - Object model seam and its in-memory implementation
//! - [`transport`] - Delivery of responses to federate channels
//! - [`persistence`] - Snapshot stores for save/restore
//! - [`config`] - Configuration types and loading
//! - [`logging`] - Log file setup

pub mod broker;
pub mod clock;
pub mod config;
pub mod error;
pub mod federate;
pub mod federation;
pub mod federations;
pub mod handle_allocator;
pub mod handles;
pub mod logging;
pub mod message;
pub mod mom;
pub mod object_model;
pub mod persistence;
pub mod response;
pub mod transport;

pub use broker::{Answer, Broker, BrokerClient, BrokerConfig, BrokerError, BrokerHandle, FederateRequest};
pub use config::Config;
pub use error::{ErrorKind, FederationError, Result};
pub use federation::Federation;
pub use federations::FederationsList;
pub use handles::{FederateHandle, FederationHandle, FederationTime};
pub use message::{Message, MessageType, Payload};
pub use response::{Response, Responses};
