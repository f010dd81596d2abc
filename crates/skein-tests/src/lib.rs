//! Integration test suite for the Skein overlay.
//!
//! Multi-pool scenarios run over an in-memory network simulator
//! ([`helpers::SimNetwork`]): sends pass through the real wire codec and are
//! delivered synchronously, so convergence tests are deterministic under
//! paused tokio time and exercise the protocol end to end without sockets.

pub mod helpers;
