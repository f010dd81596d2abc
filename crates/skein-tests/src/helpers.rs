//! Shared test helpers: the in-memory network simulator and fixtures.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sha3::{Digest, Sha3_512};
use skein_core::{RemoteNode, SwarmId, Timings};
use skein_net::{decode_message, Interface, MemStore, Message, NodePool, VirtualNode};

/// In-memory network connecting pools by address string.
///
/// Sends are serialized through the real codec and delivered synchronously
/// to the destination pool, so tests exercise the full wire path (including
/// empty-address rewriting) without sockets. Messages to detached addresses
/// vanish, which is how tests model a stopped peer.
#[derive(Default)]
pub struct SimNetwork {
    endpoints: Mutex<HashMap<String, Weak<NodePool>>>,
}

impl SimNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Build a pool attached to this network at `address`.
    pub fn pool(self: &Arc<Self>, address: &str, timings: Timings) -> Arc<NodePool> {
        let iface = Arc::new(SimInterface {
            net: Arc::clone(self),
            local: address.to_string(),
        });
        let pool = Arc::new(NodePool::new(iface, timings));
        self.endpoints
            .lock()
            .insert(address.to_string(), Arc::downgrade(&pool));
        pool
    }

    /// Detach the endpoint at `address`; traffic to it is dropped from now on.
    pub fn detach(&self, address: &str) {
        self.endpoints.lock().remove(address);
    }

    fn deliver(&self, from: &str, to: &str, bytes: Vec<u8>) {
        let pool = {
            let endpoints = self.endpoints.lock();
            endpoints.get(to).and_then(Weak::upgrade)
        };
        let Some(pool) = pool else { return };
        let mut rest: &[u8] = &bytes;
        while !rest.is_empty() {
            let (message, tail) = decode_message(rest, from);
            let Some(message) = message else { break };
            let origin = RemoteNode::new(message.from, from.to_string());
            pool.process_message(origin, message);
            rest = tail;
        }
    }
}

struct SimInterface {
    net: Arc<SimNetwork>,
    local: String,
}

impl Interface for SimInterface {
    fn send_message(&self, remote: &RemoteNode, message: &Message) {
        self.net.deliver(&self.local, &remote.address, message.encode());
    }
}

/// SHA3-512 of `data` as a ring identifier.
pub fn content_id(data: &[u8]) -> SwarmId {
    let digest = Sha3_512::digest(data);
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&digest);
    SwarmId(bytes)
}

/// Host `data` on `pool`; the virtual node's id is the content hash.
pub fn host_blob(pool: &Arc<NodePool>, data: &[u8]) -> Arc<VirtualNode> {
    let id = content_id(data);
    let node = VirtualNode::new(id, Box::new(MemStore::with_data("blob", data.to_vec())), true);
    pool.host_virtual_node(node).expect("fresh id")
}

/// Join the swarm for `id` on `pool` with an empty in-memory store.
pub fn join_swarm(pool: &Arc<NodePool>, id: SwarmId) -> Arc<VirtualNode> {
    let node = VirtualNode::new(id, Box::new(MemStore::empty("out")), false);
    pool.host_virtual_node(node).expect("fresh id")
}
