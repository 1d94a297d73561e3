//! Broker configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Channel buffer size for broker requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Channel buffer size for each federate's outbound link
    #[serde(rename = "federate-channel-buffer", default = "default_federate_channel_buffer")]
    pub federate_channel_buffer: usize,
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1000
}

fn default_federate_channel_buffer() -> usize {
    debug!("default_federate_channel_buffer: called");
    256
}

impl Default for BrokerConfig {
    fn default() -> Self {
        debug!("BrokerConfig::default: called");
        Self {
            channel_buffer: default_channel_buffer(),
            federate_channel_buffer: default_federate_channel_buffer(),
        }
    }
}
