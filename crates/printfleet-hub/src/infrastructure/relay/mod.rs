//! Camera relay support.
//!
//! The relay itself (an HTTP stream forwarder) is run by the embedding
//! application; the hub only hands out its listening ports, one per session,
//! from a fixed configured range.

pub mod port_allocator;

pub use port_allocator::{PortAllocator, PortError, PortRange};
