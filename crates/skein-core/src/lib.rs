//! # skein-core
//! Foundation types for the Skein overlay.

pub mod error;
pub mod id;
pub mod remote;
pub mod timings;

pub use error::{IdError, PoolError};
pub use id::SwarmId;
pub use remote::RemoteNode;
pub use timings::Timings;
