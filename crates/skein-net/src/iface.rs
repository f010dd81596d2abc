//! Abstract network interface.

use skein_core::RemoteNode;

use crate::protocol::Message;

/// Outbound half of a transport.
///
/// Sends are fire-and-forget: best effort, may drop, no completion signal.
/// Implementations must not block the caller. The inbound half is whatever
/// feeds [`crate::NodePool::process_message`] — the UDP receiver task in
/// production, a simulator in tests.
pub trait Interface: Send + Sync {
    fn send_message(&self, remote: &RemoteNode, message: &Message);
}
