//! The node pool: all virtual nodes hosted at one endpoint.
//!
//! The pool owns the hosted registry and the bootstrap list, dispatches
//! inbound messages by destination identifier, and answers requests
//! addressed to the all-zero identifier as the *zero node* — a fictitious
//! participant every pool runs, serving liveness probes and pool-wide
//! routing queries.
//!
//! Lock order is pool state before virtual-node state, never the reverse,
//! and no lock is held across an await.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use skein_core::{PoolError, RemoteNode, SwarmId, Timings};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::iface::Interface;
use crate::protocol::{Body, Message};
use crate::vnode::VirtualNode;

struct HostedEntry {
    node: Arc<VirtualNode>,
    stabilizer: JoinHandle<()>,
}

#[derive(Default)]
struct PoolState {
    hosted: HashMap<SwarmId, HostedEntry>,
    bootstraps: Vec<RemoteNode>,
}

/// Container for the virtual nodes hosted at one network endpoint.
pub struct NodePool {
    iface: Arc<dyn Interface>,
    timings: Timings,
    state: Mutex<PoolState>,
}

impl NodePool {
    pub fn new(iface: Arc<dyn Interface>, timings: Timings) -> Self {
        Self {
            iface,
            timings,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Register a bootstrap address. Its identifier stays zero until the
    /// network walk learns better; zero-identifier descriptors are never
    /// installed into routing tables.
    pub fn add_bootstrap(&self, address: impl Into<String>) {
        let address = address.into();
        info!(%address, "bootstrap added");
        self.state
            .lock()
            .bootstraps
            .push(RemoteNode::new(SwarmId::ZERO, address));
    }

    pub fn bootstraps(&self) -> Vec<RemoteNode> {
        self.state.lock().bootstraps.clone()
    }

    /// Start hosting `node`: register it and spawn its stabilizer task.
    ///
    /// Fails if a virtual node with the same identifier is already hosted.
    pub fn host_virtual_node(
        self: &Arc<Self>,
        node: VirtualNode,
    ) -> Result<Arc<VirtualNode>, PoolError> {
        let node = Arc::new(node);
        let mut st = self.state.lock();
        if st.hosted.contains_key(&node.id()) {
            return Err(PoolError::DuplicateId(node.id().to_hex()));
        }
        let stabilizer = {
            let node = Arc::clone(&node);
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                let id = node.id();
                // A panicking stabilizer must not take the pool down with it.
                if std::panic::AssertUnwindSafe(node.run(pool))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!(node = %id, "stabilizer task panicked");
                }
            })
        };
        info!(node = %node.id(), "hosting virtual node");
        st.hosted.insert(
            node.id(),
            HostedEntry {
                node: Arc::clone(&node),
                stabilizer,
            },
        );
        Ok(node)
    }

    /// All currently hosted virtual nodes.
    pub fn hosted_nodes(&self) -> Vec<Arc<VirtualNode>> {
        self.state
            .lock()
            .hosted
            .values()
            .map(|entry| Arc::clone(&entry.node))
            .collect()
    }

    /// Stop all stabilizer tasks and drop the hosted registry.
    pub fn shutdown(&self) {
        let mut st = self.state.lock();
        for (_, entry) in st.hosted.drain() {
            entry.stabilizer.abort();
        }
    }

    /// Transmit `message` to `remote` through the shared interface.
    pub fn send_message(&self, remote: &RemoteNode, message: &Message) {
        self.iface.send_message(remote, message);
    }

    /// Route an inbound message: the zero id is served by the pool itself,
    /// hosted identifiers go to their virtual node, anything else is
    /// dropped silently.
    pub fn process_message(&self, remote: RemoteNode, message: Message) {
        if message.to.is_zero() {
            self.process_zero(&remote, &message);
            return;
        }
        let node = {
            let st = self.state.lock();
            st.hosted.get(&message.to).map(|entry| Arc::clone(&entry.node))
        };
        match node {
            Some(node) => node.handle_message(self, &remote, &message),
            None => debug!(to = %message.to, peer = %remote, "message for unhosted id dropped"),
        }
    }

    /// The zero-node service: pool liveness pings and pool-wide lookups.
    fn process_zero(&self, remote: &RemoteNode, message: &Message) {
        match &message.body {
            Body::PingRequest => {
                self.send_message(
                    remote,
                    &Message::new(SwarmId::ZERO, remote.id, Body::PingResponse),
                );
            }
            Body::GetNodeRequest { query } => {
                let mut best = self.pool_get_node(query);
                {
                    // A hosted identifier in (best, query] beats anything
                    // learned from peers; its address is left empty so the
                    // receiver substitutes our public endpoint.
                    let st = self.state.lock();
                    let upper = query.advance(1);
                    for id in st.hosted.keys() {
                        let wins = match &best {
                            None => true,
                            Some(b) => id.in_range(&b.id, &upper),
                        };
                        if wins {
                            best = Some(RemoteNode::new(*id, ""));
                            break;
                        }
                    }
                }
                let node = best.unwrap_or_else(RemoteNode::zero);
                self.send_message(
                    remote,
                    &Message::new(SwarmId::ZERO, remote.id, Body::GetNodeResponse { node }),
                );
            }
            _ => {}
        }
    }

    /// Best predecessor-or-equal of `query` across every hosted node's
    /// routing tables. Never forwards; only hands out what is known locally.
    pub fn pool_get_node(&self, query: &SwarmId) -> Option<RemoteNode> {
        let upper = query.advance(1);
        let st = self.state.lock();
        let mut best: Option<RemoteNode> = None;
        for entry in st.hosted.values() {
            if let Some(found) = entry.node.local_get_pred_or_eq(&upper) {
                let wins = match &best {
                    None => true,
                    Some(b) => found.id.in_range(&b.id, &upper),
                };
                if wins {
                    best = Some(found);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemStore;
    use crate::protocol::Command;

    fn id(v: u64) -> SwarmId {
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&v.to_le_bytes());
        SwarmId(bytes)
    }

    #[derive(Default)]
    struct RecordingIface {
        sent: Mutex<Vec<(RemoteNode, Message)>>,
    }

    impl Interface for RecordingIface {
        fn send_message(&self, remote: &RemoteNode, message: &Message) {
            self.sent.lock().push((remote.clone(), message.clone()));
        }
    }

    fn pool() -> (Arc<RecordingIface>, Arc<NodePool>) {
        let iface = Arc::new(RecordingIface::default());
        let pool = Arc::new(NodePool::new(iface.clone(), Timings::default()));
        (iface, pool)
    }

    fn vnode(v: u64) -> VirtualNode {
        VirtualNode::new(id(v), Box::new(MemStore::empty("test")), true)
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ping_answered_by_pool() {
        let (iface, pool) = pool();
        let peer = RemoteNode::new(id(9), "10.0.0.1:1");
        pool.process_message(
            peer.clone(),
            Message::new(id(9), SwarmId::ZERO, Body::PingRequest),
        );
        let sent = iface.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, peer);
        assert_eq!(sent[0].1.command(), Command::PingResponse);
        assert!(sent[0].1.from.is_zero());
        assert_eq!(sent[0].1.to, id(9));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_lookup_with_nothing_known_returns_sentinel() {
        let (iface, pool) = pool();
        let peer = RemoteNode::new(id(9), "10.0.0.1:1");
        pool.process_message(
            peer.clone(),
            Message::new(id(9), SwarmId::ZERO, Body::GetNodeRequest { query: id(5) }),
        );
        let sent = iface.sent.lock();
        assert_eq!(sent.len(), 1);
        match &sent[0].1.body {
            Body::GetNodeResponse { node } => {
                assert!(node.id.is_zero());
                assert!(node.address.is_empty());
            }
            other => panic!("wrong body: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_lookup_prefers_hosted_id() {
        let (iface, pool) = pool();
        pool.host_virtual_node(vnode(5)).unwrap();
        let peer = RemoteNode::new(id(9), "10.0.0.1:1");
        pool.process_message(
            peer.clone(),
            Message::new(id(9), SwarmId::ZERO, Body::GetNodeRequest { query: id(9) }),
        );
        let sent = iface.sent.lock();
        match &sent[0].1.body {
            Body::GetNodeResponse { node } => {
                assert_eq!(node.id, id(5));
                // Empty address: the receiver fills in our endpoint.
                assert!(node.address.is_empty());
            }
            other => panic!("wrong body: {other:?}"),
        }
        pool.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_lookup_exact_hosted_match() {
        let (iface, pool) = pool();
        pool.host_virtual_node(vnode(9)).unwrap();
        let peer = RemoteNode::new(id(1), "10.0.0.1:1");
        pool.process_message(
            peer.clone(),
            Message::new(id(1), SwarmId::ZERO, Body::GetNodeRequest { query: id(9) }),
        );
        let sent = iface.sent.lock();
        match &sent[0].1.body {
            // The half-open interval (best, query] includes the query itself.
            Body::GetNodeResponse { node } => assert_eq!(node.id, id(9)),
            other => panic!("wrong body: {other:?}"),
        }
        pool.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_id_is_rejected() {
        let (_iface, pool) = pool();
        pool.host_virtual_node(vnode(5)).unwrap();
        let err = pool.host_virtual_node(vnode(5)).unwrap_err();
        assert_eq!(err, PoolError::DuplicateId(id(5).to_hex()));
        assert_eq!(pool.hosted_nodes().len(), 1);
        pool.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn message_for_unhosted_id_dropped() {
        let (iface, pool) = pool();
        let peer = RemoteNode::new(id(9), "10.0.0.1:1");
        pool.process_message(
            peer,
            Message::new(id(9), id(77), Body::PingRequest),
        );
        assert!(iface.sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn message_for_hosted_id_delivered() {
        let (iface, pool) = pool();
        pool.host_virtual_node(vnode(5)).unwrap();
        let peer = RemoteNode::new(id(9), "10.0.0.1:1");
        pool.process_message(
            peer.clone(),
            Message::new(id(9), id(5), Body::PingRequest),
        );
        let sent = iface.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.command(), Command::PingResponse);
        assert_eq!(sent[0].1.from, id(5));
        drop(sent);
        pool.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn pool_get_node_aggregates_hosted_tables() {
        let (_iface, pool) = pool();
        let a = pool.host_virtual_node(vnode(100)).unwrap();
        let b = pool.host_virtual_node(vnode(200)).unwrap();
        // Feed different peers into the two nodes' tables.
        let low = RemoteNode::new(id(150), "10.0.0.1:1");
        let high = RemoteNode::new(id(180), "10.0.0.2:1");
        a.handle_message(&pool, &low, &Message::new(id(150), id(100), Body::PingRequest));
        b.handle_message(&pool, &high, &Message::new(id(180), id(200), Body::PingRequest));
        // The closest-from-below peer for a query above both wins.
        let best = pool.pool_get_node(&id(190)).unwrap();
        assert_eq!(best.id, id(180));
        pool.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn bootstraps_carry_zero_id() {
        let (_iface, pool) = pool();
        pool.add_bootstrap("10.0.0.5:9000");
        let bootstraps = pool.bootstraps();
        assert_eq!(bootstraps.len(), 1);
        assert!(bootstraps[0].id.is_zero());
        assert_eq!(bootstraps[0].address, "10.0.0.5:9000");
    }
}
