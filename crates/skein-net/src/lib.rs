//! # skein-net — overlay networking for Skein.
//!
//! Many virtual nodes share one UDP endpoint. A [`NodePool`] owns the hosted
//! virtual nodes at that endpoint, dispatches inbound messages by destination
//! identifier, and answers pool-wide routing queries as the *zero node*. Each
//! [`VirtualNode`] runs a Chord-style stabilization loop, gossips swarm
//! membership with peers sharing its identifier, and fetches the swarm's
//! content once a live member is found.
//!
//! The wire protocol is a fixed byte layout (see [`protocol`]); transports
//! implement the narrow [`Interface`] trait, with [`UdpServer`] as the real
//! one and in-memory substitutes used by tests.

pub mod content;
pub mod iface;
pub mod pool;
pub mod protocol;
pub mod udp;
pub mod vnode;

pub use content::{ContentStore, FileStore, MemStore};
pub use iface::Interface;
pub use pool::NodePool;
pub use protocol::{decode_message, Body, Command, Message};
pub use udp::UdpServer;
pub use vnode::{AliveRemoteNode, NodeSummary, VirtualNode, FINGER_TABLE_SIZE};
