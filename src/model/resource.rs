use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::UnknownVariant;

const PORT_RANGE_SEPARATOR: char = '-';
const MIN_PORT: i64 = 0;
const MAX_PORT: i64 = 65535;

/// A network endpoint inside a remote network that access is granted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub name: String,
    /// IP, CIDR range or FQDN.
    pub address: String,
    pub remote_network_id: String,
    pub group_ids: Vec<String>,
    pub protocols: Protocols,
    pub is_active: bool,
}

/// Traffic policy for one protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Policy {
    Restricted,
    #[default]
    AllowAll,
    DenyAll,
}

impl Policy {
    pub const ALL: [&'static str; 3] = ["RESTRICTED", "ALLOW_ALL", "DENY_ALL"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restricted => "RESTRICTED",
            Self::AllowAll => "ALLOW_ALL",
            Self::DenyAll => "DENY_ALL",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESTRICTED" => Ok(Self::Restricted),
            "ALLOW_ALL" => Ok(Self::AllowAll),
            "DENY_ALL" => Ok(Self::DenyAll),
            _ => Err(UnknownVariant::new("policy", s, &Self::ALL)),
        }
    }
}

/// Why a single port or port pair was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port `{port}` is not a valid integer: {source}")]
    NotInteger {
        port: String,
        #[source]
        source: ParseIntError,
    },

    #[error("port {0} not in the range of 0-65535")]
    OutOfRange(i64),

    #[error("ports {start}, {end} needs to be in a rising sequence")]
    NotRising { start: u16, end: u16 },

    #[error("port range expects 2 values")]
    InvalidLength,
}

/// A port range string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse protocols port range \"{input}\": {source}")]
pub struct PortRangeError {
    pub input: String,
    #[source]
    pub source: PortError,
}

/// An inclusive range of ports. A single port has `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_port_range(s).map_err(|source| PortRangeError {
            input: s.to_string(),
            source,
        })
    }
}

fn parse_port_range(s: &str) -> Result<PortRange, PortError> {
    if !s.contains(PORT_RANGE_SEPARATOR) {
        return parse_port(s).map(PortRange::single);
    }

    let parts: Vec<&str> = s.split(PORT_RANGE_SEPARATOR).collect();
    let [start, end] = parts.as_slice() else {
        return Err(PortError::InvalidLength);
    };

    let start = parse_port(start)?;
    let end = parse_port(end)?;
    if end < start {
        return Err(PortError::NotRising { start, end });
    }

    Ok(PortRange { start, end })
}

fn parse_port(s: &str) -> Result<u16, PortError> {
    let port: i64 = s.parse().map_err(|source| PortError::NotInteger {
        port: s.to_string(),
        source,
    })?;

    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(PortError::OutOfRange(port));
    }

    u16::try_from(port).map_err(|_| PortError::OutOfRange(port))
}

/// Whether two port lists cover exactly the same ports.
///
/// `["80", "81-90"]` and `["80-90"]` are equivalent.
pub fn ports_equivalent(a: &[PortRange], b: &[PortRange]) -> bool {
    merge_ranges(a) == merge_ranges(b)
}

fn merge_ranges(ranges: &[PortRange]) -> Vec<PortRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    let mut merged: Vec<PortRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if u32::from(range.start) <= u32::from(last.end) + 1 => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// A policy/ports pair that breaks the policy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("ALLOW_ALL policy does not allow specifying ports.")]
    AllowAllWithPorts,

    #[error("DENY_ALL policy does not allow specifying ports.")]
    DenyAllWithPorts,

    #[error("RESTRICTED policy requires specifying ports.")]
    RestrictedWithoutPorts,
}

/// Traffic rules for TCP or UDP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protocol {
    pub policy: Policy,
    pub ports: Vec<PortRange>,
}

impl Protocol {
    pub fn new(policy: Policy, ports: Vec<PortRange>) -> Self {
        Self { policy, ports }
    }

    /// Parse a policy and its port strings.
    pub fn parse<S: AsRef<str>>(policy: Policy, ports: &[S]) -> Result<Self, PortRangeError> {
        let ports = ports
            .iter()
            .map(|port| port.as_ref().parse())
            .collect::<Result<Vec<PortRange>, _>>()?;
        Ok(Self { policy, ports })
    }

    /// Build from what the API returns: `RESTRICTED` without ports means deny all.
    pub fn from_api(policy: Policy, ports: Vec<PortRange>) -> Self {
        match policy {
            Policy::Restricted if ports.is_empty() => Self::new(Policy::DenyAll, ports),
            _ => Self::new(policy, ports),
        }
    }

    /// The policy and ports to send to the API.
    ///
    /// The API has no `DENY_ALL`; it is sent as `RESTRICTED` with no ports.
    /// `ALLOW_ALL` never carries ports.
    pub fn to_api(&self) -> (Policy, Vec<PortRange>) {
        match self.policy {
            Policy::DenyAll => (Policy::Restricted, Vec::new()),
            Policy::AllowAll => (Policy::AllowAll, Vec::new()),
            Policy::Restricted => (Policy::Restricted, self.ports.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        match (self.policy, self.ports.is_empty()) {
            (Policy::AllowAll, false) => Err(PolicyError::AllowAllWithPorts),
            (Policy::DenyAll, false) => Err(PolicyError::DenyAllWithPorts),
            (Policy::Restricted, true) => Err(PolicyError::RestrictedWithoutPorts),
            _ => Ok(()),
        }
    }

    pub fn port_strings(&self) -> Vec<String> {
        self.ports.iter().map(PortRange::to_string).collect()
    }
}

/// Per-protocol traffic rules of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocols {
    pub allow_icmp: bool,
    pub tcp: Protocol,
    pub udp: Protocol,
}

impl Default for Protocols {
    /// ICMP allowed, all TCP and UDP ports open.
    fn default() -> Self {
        Self {
            allow_icmp: true,
            tcp: Protocol::default(),
            udp: Protocol::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range_parse() {
        assert_eq!("80".parse::<PortRange>().unwrap(), PortRange::single(80));
        assert_eq!(
            "80-90".parse::<PortRange>().unwrap(),
            PortRange { start: 80, end: 90 }
        );
        assert_eq!(
            "0-65535".parse::<PortRange>().unwrap(),
            PortRange {
                start: 0,
                end: 65535
            }
        );
    }

    #[test]
    fn test_port_range_errors() {
        let err = "80-90-100".parse::<PortRange>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse protocols port range \"80-90-100\": port range expects 2 values"
        );

        let err = "80-70".parse::<PortRange>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse protocols port range \"80-70\": ports 80, 70 needs to be in a rising sequence"
        );

        let err = "0-65536".parse::<PortRange>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse protocols port range \"0-65536\": port 65536 not in the range of 0-65535"
        );

        for input in ["", " ", "foo", "80-", "-80"] {
            let err = input.parse::<PortRange>().unwrap_err();
            assert!(
                matches!(err.source, PortError::NotInteger { .. }),
                "input {:?}",
                input
            );
            assert!(err
                .to_string()
                .starts_with(&format!("failed to parse protocols port range \"{}\": port `", input)));
        }
    }

    #[test]
    fn test_port_range_display() {
        assert_eq!(PortRange::single(443).to_string(), "443");
        assert_eq!(PortRange { start: 1, end: 5 }.to_string(), "1-5");
    }

    #[test]
    fn test_ports_equivalent() {
        let split = Protocol::parse(Policy::Restricted, &["80", "81-90"]).unwrap();
        let joined = Protocol::parse(Policy::Restricted, &["80-90"]).unwrap();
        assert!(ports_equivalent(&split.ports, &joined.ports));

        let reordered = Protocol::parse(Policy::Restricted, &["443", "80-90", "85"]).unwrap();
        let canonical = Protocol::parse(Policy::Restricted, &["80-90", "443"]).unwrap();
        assert!(ports_equivalent(&reordered.ports, &canonical.ports));

        let gap = Protocol::parse(Policy::Restricted, &["80", "82-90"]).unwrap();
        assert!(!ports_equivalent(&gap.ports, &joined.ports));

        assert!(ports_equivalent(&[], &[]));
        assert!(ports_equivalent(
            &[PortRange::single(65535), PortRange { start: 0, end: 65534 }],
            &[PortRange { start: 0, end: 65535 }]
        ));
    }

    #[test]
    fn test_policy_rules() {
        let ports = vec![PortRange::single(22)];

        assert_eq!(
            Protocol::new(Policy::AllowAll, ports.clone()).validate(),
            Err(PolicyError::AllowAllWithPorts)
        );
        assert_eq!(
            Protocol::new(Policy::DenyAll, ports.clone())
                .validate()
                .unwrap_err()
                .to_string(),
            "DENY_ALL policy does not allow specifying ports."
        );
        assert_eq!(
            Protocol::new(Policy::Restricted, vec![]).validate(),
            Err(PolicyError::RestrictedWithoutPorts)
        );
        assert!(Protocol::new(Policy::Restricted, ports).validate().is_ok());
        assert!(Protocol::new(Policy::AllowAll, vec![]).validate().is_ok());
    }

    #[test]
    fn test_api_mapping() {
        let deny = Protocol::new(Policy::DenyAll, vec![]);
        assert_eq!(deny.to_api(), (Policy::Restricted, vec![]));

        let read_back = Protocol::from_api(Policy::Restricted, vec![]);
        assert_eq!(read_back.policy, Policy::DenyAll);

        let restricted = Protocol::from_api(Policy::Restricted, vec![PortRange::single(22)]);
        assert_eq!(restricted.policy, Policy::Restricted);
        assert_eq!(restricted.port_strings(), vec!["22"]);
    }

    #[test]
    fn test_default_protocols() {
        let protocols = Protocols::default();
        assert!(protocols.allow_icmp);
        assert_eq!(protocols.tcp.policy, Policy::AllowAll);
        assert_eq!(protocols.udp.policy, Policy::AllowAll);
        assert!(protocols.tcp.ports.is_empty());
    }
}
