//! Remote peer descriptors.

use std::fmt;

use crate::id::SwarmId;

/// A remote overlay participant: ring identifier plus `"host:port"` address.
///
/// Equality and hashing cover both fields. Two peers at the same address but
/// different identifiers are distinct — one endpoint hosts many virtual
/// nodes. Bootstrap descriptors carry [`SwarmId::ZERO`] until their real
/// identifier is learned.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RemoteNode {
    /// Ring identifier of the peer, or [`SwarmId::ZERO`] if unknown.
    pub id: SwarmId,
    /// Network address, `"host:port"`.
    pub address: String,
}

impl RemoteNode {
    /// Create a descriptor for a peer.
    pub fn new(id: SwarmId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// The "I know nothing" sentinel: zero identifier, empty address.
    pub fn zero() -> Self {
        Self {
            id: SwarmId::ZERO,
            address: String::new(),
        }
    }
}

impl fmt::Display for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

impl fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteNode({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn id(v: u64) -> SwarmId {
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&v.to_le_bytes());
        SwarmId(bytes)
    }

    #[test]
    fn equality_covers_both_fields() {
        let a = RemoteNode::new(id(1), "127.0.0.1:9001");
        let same = RemoteNode::new(id(1), "127.0.0.1:9001");
        let other_id = RemoteNode::new(id(2), "127.0.0.1:9001");
        let other_addr = RemoteNode::new(id(1), "127.0.0.1:9002");
        assert_eq!(a, same);
        assert_ne!(a, other_id);
        assert_ne!(a, other_addr);
    }

    #[test]
    fn usable_as_set_key() {
        let mut set = HashSet::new();
        set.insert(RemoteNode::new(id(1), "127.0.0.1:9001"));
        set.insert(RemoteNode::new(id(1), "127.0.0.1:9001"));
        set.insert(RemoteNode::new(id(2), "127.0.0.1:9001"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn zero_sentinel() {
        let z = RemoteNode::zero();
        assert!(z.id.is_zero());
        assert!(z.address.is_empty());
    }
}
