//! Bridge between the parent control plane and the service process.
//!
//! # Architecture
//!
//! - **protocol**: serde message types crossing the channel
//! - **codec**: length-prefixed JSON framing
//! - **channel**: the transport seam and its Unix-socket implementation

pub mod channel;
pub mod codec;
pub mod protocol;
