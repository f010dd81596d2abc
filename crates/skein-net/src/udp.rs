//! UDP transport.
//!
//! One socket serves the whole pool. Outbound sends are non-blocking and
//! best-effort. The receiver task keeps a reassembly buffer per source
//! address: each datagram is appended to any retained partial bytes and the
//! codec is invoked repeatedly, so several concatenated messages in one
//! datagram all dispatch immediately and a message split across datagrams
//! is recovered once the rest arrives.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use skein_core::RemoteNode;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::iface::Interface;
use crate::pool::NodePool;
use crate::protocol::{decode_message, Message};

const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// UDP endpoint shared by all virtual nodes of a pool.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
}

impl UdpServer {
    /// Bind the shared socket.
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "listening");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawn the receiver task feeding inbound messages to `pool`.
    pub fn spawn_receiver(&self, pool: Arc<NodePool>) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            let mut partial: HashMap<SocketAddr, Vec<u8>> = HashMap::new();
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (len, src) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "datagram receive failed");
                        continue;
                    }
                };
                let sender = src.to_string();
                let mut pending = partial.remove(&src).unwrap_or_default();
                pending.extend_from_slice(&buf[..len]);
                loop {
                    let (message, rest) = decode_message(&pending, &sender);
                    let rest = rest.to_vec();
                    match message {
                        Some(message) => {
                            let origin = RemoteNode::new(message.from, sender.clone());
                            pool.process_message(origin, message);
                            pending = rest;
                        }
                        None => {
                            pending = rest;
                            break;
                        }
                    }
                }
                if !pending.is_empty() {
                    partial.insert(src, pending);
                }
            }
        })
    }
}

impl Interface for UdpServer {
    fn send_message(&self, remote: &RemoteNode, message: &Message) {
        let addr: SocketAddr = match remote.address.parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!(address = %remote.address, "unparseable peer address, dropping message");
                return;
            }
        };
        if let Err(e) = self.socket.try_send_to(&message.encode(), addr) {
            debug!(%addr, error = %e, "send failed, dropping message");
        }
    }
}
