//! Typed handles and federation time
//!
//! Every entity the coordinator talks about is addressed by a small integer
//! handle. Handle `0` is reserved: it means "no federate" (an unowned
//! attribute) or "anonymous" (a time update relayed by the broker itself).

use serde::{Deserialize, Serialize};

/// Common behavior of all handle newtypes so they can share one allocator
pub trait Handle: Copy + Ord + std::fmt::Debug + std::fmt::Display {
    /// Wrap a raw value
    fn from_raw(raw: u32) -> Self;

    /// Unwrap to the raw value
    fn raw(self) -> u32;

    /// Whether this handle designates a real entity
    fn is_valid(self) -> bool {
        self.raw() != 0
    }
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl Handle for $name {
            fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            fn raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

handle_type!(
    /// Identifies one federation execution inside the broker
    FederationHandle
);
handle_type!(
    /// Identifies one joined federate inside its federation
    FederateHandle
);
handle_type!(
    /// Identifies a registered object instance
    ObjectHandle
);
handle_type!(
    /// Identifies an object class of the object model
    ObjectClassHandle
);
handle_type!(
    /// Identifies an attribute of an object class
    AttributeHandle
);
handle_type!(
    /// Identifies an interaction class of the object model
    InteractionClassHandle
);
handle_type!(
    /// Identifies a parameter of an interaction class
    ParameterHandle
);
handle_type!(
    /// Identifies a routing space
    SpaceHandle
);
handle_type!(
    /// Identifies a region inside a routing space
    RegionHandle
);

impl FederateHandle {
    /// Source handle used for broker-originated (anonymous) messages
    pub const ANONYMOUS: FederateHandle = FederateHandle(0);
}

/// Opaque attribute or parameter value
pub type AttributeValue = Vec<u8>;

/// Logical time on the shared simulated timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FederationTime(pub f64);

impl FederationTime {
    pub const ZERO: FederationTime = FederationTime(0.0);

    /// Raw floating-point value
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl std::fmt::Display for FederationTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for FederationTime {
    fn from(value: f64) -> Self {
        Self(value)
    }
}
