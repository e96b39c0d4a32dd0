//! # vsync-types: Core types for `vsync`
//!
//! This crate contains the identifier types shared by every layer of the
//! group membership service:
//! - Member identity ([`NodeId`])
//! - View numbering ([`EpochId`])
//! - Network addressing ([`NodeAddress`])

use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised when constructing identifier types from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// The address was empty or contained whitespace.
    #[error("invalid node address {0:?}: must be non-empty and contain no whitespace")]
    InvalidAddress(String),

    /// The address does not fit the fixed-width row slot.
    #[error("node address {address:?} is {len} bytes, maximum is {max}")]
    AddressTooLong {
        address: String,
        len: usize,
        max: usize,
    },

    /// A numeric identifier failed to parse.
    #[error("invalid {kind} {input:?}")]
    InvalidNumber { kind: &'static str, input: String },
}

// ============================================================================
// Entity IDs - All Copy (cheap values)
// ============================================================================

/// Stable identifier of a group member.
///
/// Node ids survive across views; ranks do not. The value `u32::MAX` is
/// reserved as the "empty slot" marker in the shared state table and is
/// never a valid node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct NodeId(u32);

impl NodeId {
    /// Reserved wire value for an unused change-log slot.
    pub const RESERVED: u32 = u32::MAX;

    pub fn new(id: u32) -> Self {
        debug_assert!(id != Self::RESERVED, "node id u32::MAX is reserved");
        Self(id)
    }

    /// Returns the id as a `u32`.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for NodeId {
    type Error = TypesError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == Self::RESERVED {
            return Err(TypesError::InvalidNumber {
                kind: "node id",
                input: value.to_string(),
            });
        }
        Ok(Self(value))
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl FromStr for NodeId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .ok()
            .and_then(|v| Self::try_from(v).ok())
            .ok_or_else(|| TypesError::InvalidNumber {
                kind: "node id",
                input: s.to_string(),
            })
    }
}

/// Identifier of one committed view ("vid").
///
/// Epochs are monotonically increasing: every successor view carries
/// `predecessor.next()`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EpochId(u64);

impl EpochId {
    pub const ZERO: EpochId = EpochId(0);

    pub fn new(epoch: u64) -> Self {
        Self(epoch)
    }

    /// Returns the epoch following this one, or `None` at `u64::MAX`.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Returns the epoch as a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for EpochId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EpochId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<EpochId> for u64 {
    fn from(id: EpochId) -> Self {
        id.0
    }
}

impl FromStr for EpochId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| TypesError::InvalidNumber {
                kind: "epoch id",
                input: s.to_string(),
            })
    }
}

// ============================================================================
// Addresses
// ============================================================================

/// Maximum encoded length of a [`NodeAddress`], in bytes.
///
/// Addresses travel through a fixed-width slot in every table row, so they
/// are bounded.
pub const MAX_ADDRESS_LEN: usize = 63;

/// Network address of a group member (for example `10.0.0.7:4400`).
///
/// Opaque to the membership protocol. It must be non-empty and free of
/// whitespace because views serialize addresses as a whitespace-separated
/// line.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Validates and wraps an address.
    pub fn new(address: impl Into<String>) -> Result<Self, TypesError> {
        let address = address.into();
        if address.is_empty() || address.chars().any(char::is_whitespace) {
            return Err(TypesError::InvalidAddress(address));
        }
        if address.len() > MAX_ADDRESS_LEN {
            let len = address.len();
            return Err(TypesError::AddressTooLong {
                address,
                len,
                max: MAX_ADDRESS_LEN,
            });
        }
        Ok(Self(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Debug for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeAddress({})", self.0)
    }
}

impl Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeAddress> for String {
    fn from(address: NodeAddress) -> Self {
        address.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn epoch_next_is_strictly_greater() {
        let e = EpochId::new(41);
        assert_eq!(e.next(), Some(EpochId::new(42)));
        assert!(e.next() > Some(e));
        assert_eq!(EpochId::ZERO.next().map(|e| e.as_u64()), Some(1));
    }

    #[test]
    fn last_epoch_has_no_successor() {
        assert_eq!(EpochId::new(u64::MAX).next(), None);
    }

    #[test_case("10.0.0.1:4400" ; "ip and port")]
    #[test_case("node-a.cluster.local" ; "hostname")]
    #[test_case("x" ; "single char")]
    fn valid_addresses(input: &str) {
        let addr = NodeAddress::new(input).unwrap();
        assert_eq!(addr.as_str(), input);
        assert_eq!(addr.to_string(), input);
    }

    #[test_case("" ; "empty")]
    #[test_case("10.0.0.1 4400" ; "embedded space")]
    #[test_case("a\tb" ; "tab")]
    fn invalid_addresses(input: &str) {
        assert!(matches!(
            NodeAddress::new(input),
            Err(TypesError::InvalidAddress(_))
        ));
    }

    #[test]
    fn overlong_address_rejected() {
        let long = "a".repeat(MAX_ADDRESS_LEN + 1);
        assert!(matches!(
            NodeAddress::new(long),
            Err(TypesError::AddressTooLong { len: 64, .. })
        ));
        assert!(NodeAddress::new("a".repeat(MAX_ADDRESS_LEN)).is_ok());
    }

    #[test]
    fn reserved_node_id_does_not_parse() {
        assert!("4294967295".parse::<NodeId>().is_err());
        assert_eq!("7".parse::<NodeId>().unwrap(), NodeId::new(7));
        assert!("seven".parse::<NodeId>().is_err());
    }

    #[test]
    fn reserved_node_id_does_not_deserialize() {
        assert!(serde_json::from_str::<NodeId>("4294967295").is_err());
        assert!(NodeId::try_from(u32::MAX).is_err());
        let id: NodeId = serde_json::from_str("12").unwrap();
        assert_eq!(id, NodeId::new(12));
        assert_eq!(serde_json::to_string(&id).unwrap(), "12");
    }

    #[test]
    fn address_serde_validates() {
        let ok: NodeAddress = serde_json::from_str("\"10.0.0.2:1\"").unwrap();
        assert_eq!(ok.as_str(), "10.0.0.2:1");
        assert!(serde_json::from_str::<NodeAddress>("\"has space\"").is_err());
    }

    proptest! {
        #[test]
        fn node_id_display_parses_back(id in 0u32..u32::MAX) {
            let node = NodeId::new(id);
            prop_assert_eq!(node.to_string().parse::<NodeId>().unwrap(), node);
        }
    }
}
