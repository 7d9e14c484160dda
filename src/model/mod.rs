//! Domain objects exchanged between the API client and the provider.

mod connector;
mod group;
mod remote_network;
mod resource;
mod user;

pub use connector::{Connector, ConnectorTokens};
pub use group::{Group, GroupType, GroupUpdate, GroupsFilter};
pub use remote_network::{Location, RemoteNetwork};
pub use resource::{
    ports_equivalent, Policy, PolicyError, PortError, PortRange, PortRangeError, Protocol, Protocols,
    Resource,
};
pub use user::User;

/// Error for enum values the API or a configuration does not recognise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`, expected one of: {expected}")]
pub struct UnknownVariant {
    /// What was being parsed, e.g. `location`.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Comma-separated accepted values.
    pub expected: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str, expected: &[&str]) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}
