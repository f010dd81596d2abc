//! Wire messages for the Skein overlay protocol.
//!
//! Every message starts with `from_id (64B) ∥ to_id (64B) ∥ command (1B)`;
//! integers are little-endian and identifiers are raw 64-byte values.
//! Requests carry even command bytes, responses odd, and a response's
//! command is always its request's plus one. The format is self-delimiting,
//! so one datagram may carry several concatenated messages and a message may
//! arrive split across datagrams.

use bytes::{BufMut, Bytes};
use skein_core::{RemoteNode, SwarmId};

/// Size of the fixed message header: two identifiers plus the command byte.
pub const HEADER_LEN: usize = SwarmId::BYTES * 2 + 1;

/// Command byte of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    PingRequest = 0,
    PingResponse = 1,
    GetNodeRequest = 2,
    GetNodeResponse = 3,
    GetSwarmRequest = 4,
    GetSwarmResponse = 5,
    GetContentRequest = 6,
    GetContentResponse = 7,
}

impl Command {
    /// Decode a command byte; unknown values are `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::PingRequest),
            1 => Some(Self::PingResponse),
            2 => Some(Self::GetNodeRequest),
            3 => Some(Self::GetNodeResponse),
            4 => Some(Self::GetSwarmRequest),
            5 => Some(Self::GetSwarmResponse),
            6 => Some(Self::GetContentRequest),
            7 => Some(Self::GetContentResponse),
            _ => None,
        }
    }

    /// Responses carry odd command bytes.
    pub fn is_response(self) -> bool {
        self as u8 % 2 == 1
    }

    /// The response command paired with this request command.
    pub fn response(self) -> Option<Command> {
        if self.is_response() {
            None
        } else {
            Command::from_byte(self as u8 + 1)
        }
    }
}

/// Payload of a wire message, one variant per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    PingRequest,
    PingResponse,
    /// Ask for the responder's closest known predecessor-or-equal of `query`.
    GetNodeRequest { query: SwarmId },
    /// A zero identifier in `node` means "I know nothing".
    GetNodeResponse { node: RemoteNode },
    GetSwarmRequest,
    GetSwarmResponse { swarm: Vec<RemoteNode> },
    GetContentRequest,
    /// Empty `data` means the responder has no content yet.
    GetContentResponse { data: Bytes },
}

impl Body {
    /// The command byte this payload is carried under.
    pub fn command(&self) -> Command {
        match self {
            Body::PingRequest => Command::PingRequest,
            Body::PingResponse => Command::PingResponse,
            Body::GetNodeRequest { .. } => Command::GetNodeRequest,
            Body::GetNodeResponse { .. } => Command::GetNodeResponse,
            Body::GetSwarmRequest => Command::GetSwarmRequest,
            Body::GetSwarmResponse { .. } => Command::GetSwarmResponse,
            Body::GetContentRequest => Command::GetContentRequest,
            Body::GetContentResponse { .. } => Command::GetContentResponse,
        }
    }
}

/// A wire message between two virtual nodes (or a pool's zero node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: SwarmId,
    pub to: SwarmId,
    pub body: Body,
}

impl Message {
    pub fn new(from: SwarmId, to: SwarmId, body: Body) -> Self {
        Self { from, to, body }
    }

    pub fn command(&self) -> Command {
        self.body.command()
    }

    /// Serialize to the wire layout. Serialization is total.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 8);
        buf.put_slice(&self.from.0);
        buf.put_slice(&self.to.0);
        buf.put_u8(self.command() as u8);
        match &self.body {
            Body::PingRequest
            | Body::PingResponse
            | Body::GetSwarmRequest
            | Body::GetContentRequest => {}
            Body::GetNodeRequest { query } => buf.put_slice(&query.0),
            Body::GetNodeResponse { node } => encode_remote_node(&mut buf, node),
            Body::GetSwarmResponse { swarm } => {
                buf.put_u32_le(swarm.len() as u32);
                for node in swarm {
                    encode_remote_node(&mut buf, node);
                }
            }
            Body::GetContentResponse { data } => {
                buf.put_u32_le(data.len() as u32);
                buf.put_slice(data);
            }
        }
        buf
    }
}

fn encode_remote_node(buf: &mut Vec<u8>, node: &RemoteNode) {
    buf.put_slice(&node.id.0);
    buf.put_u32_le(node.address.len() as u32);
    buf.put_slice(node.address.as_bytes());
}

/// `id (64B) ∥ addr_len (u32 LE) ∥ utf8 address`. Returns the node and the
/// unconsumed tail, or `None` if the input is incomplete.
fn decode_remote_node(buf: &[u8]) -> Option<(RemoteNode, &[u8])> {
    if buf.len() < SwarmId::BYTES + 4 {
        return None;
    }
    let id = SwarmId(buf[..SwarmId::BYTES].try_into().expect("64-byte id"));
    let addr_len =
        u32::from_le_bytes(buf[SwarmId::BYTES..SwarmId::BYTES + 4].try_into().expect("u32")) as usize;
    let rest = &buf[SwarmId::BYTES + 4..];
    if rest.len() < addr_len {
        return None;
    }
    let address = std::str::from_utf8(&rest[..addr_len]).ok()?.to_string();
    Some((RemoteNode { id, address }, &rest[addr_len..]))
}

/// Parse one message from the front of `buf`.
///
/// Returns the parsed message and the unconsumed remainder. Incomplete input
/// yields `(None, buf)` so the caller can retain the bytes until more
/// arrive; an unknown command byte or an undecodable address yields
/// `(None, &[])`, flushing the buffer to resynchronize.
///
/// `sender_addr` is the datagram source; a parsed [`RemoteNode`] with an
/// empty address is rewritten to it, which is how peers learn their own
/// public endpoint.
pub fn decode_message<'a>(buf: &'a [u8], sender_addr: &str) -> (Option<Message>, &'a [u8]) {
    if buf.len() < HEADER_LEN {
        return (None, buf);
    }
    let from = SwarmId(buf[..SwarmId::BYTES].try_into().expect("64-byte id"));
    let to = SwarmId(
        buf[SwarmId::BYTES..SwarmId::BYTES * 2]
            .try_into()
            .expect("64-byte id"),
    );
    let Some(command) = Command::from_byte(buf[HEADER_LEN - 1]) else {
        return (None, &[]);
    };
    let rest = &buf[HEADER_LEN..];

    let rewrite = |mut node: RemoteNode| {
        if node.address.is_empty() {
            node.address = sender_addr.to_string();
        }
        node
    };

    match command {
        Command::PingRequest => (Some(Message::new(from, to, Body::PingRequest)), rest),
        Command::PingResponse => (Some(Message::new(from, to, Body::PingResponse)), rest),
        Command::GetSwarmRequest => (Some(Message::new(from, to, Body::GetSwarmRequest)), rest),
        Command::GetContentRequest => {
            (Some(Message::new(from, to, Body::GetContentRequest)), rest)
        }
        Command::GetNodeRequest => {
            if rest.len() < SwarmId::BYTES {
                return (None, buf);
            }
            let query = SwarmId(rest[..SwarmId::BYTES].try_into().expect("64-byte id"));
            (
                Some(Message::new(from, to, Body::GetNodeRequest { query })),
                &rest[SwarmId::BYTES..],
            )
        }
        Command::GetNodeResponse => match decode_remote_node(rest) {
            None => (None, buf),
            Some((node, tail)) => (
                Some(Message::new(
                    from,
                    to,
                    Body::GetNodeResponse { node: rewrite(node) },
                )),
                tail,
            ),
        },
        Command::GetSwarmResponse => {
            if rest.len() < 4 {
                return (None, buf);
            }
            let count = u32::from_le_bytes(rest[..4].try_into().expect("u32")) as usize;
            let mut tail = &rest[4..];
            let mut swarm = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                match decode_remote_node(tail) {
                    None => return (None, buf),
                    Some((node, rest)) => {
                        swarm.push(rewrite(node));
                        tail = rest;
                    }
                }
            }
            (
                Some(Message::new(from, to, Body::GetSwarmResponse { swarm })),
                tail,
            )
        }
        Command::GetContentResponse => {
            if rest.len() < 4 {
                return (None, buf);
            }
            let len = u32::from_le_bytes(rest[..4].try_into().expect("u32")) as usize;
            if rest.len() < 4 + len {
                return (None, buf);
            }
            let data = Bytes::copy_from_slice(&rest[4..4 + len]);
            (
                Some(Message::new(from, to, Body::GetContentResponse { data })),
                &rest[4 + len..],
            )
        }
    }
}
