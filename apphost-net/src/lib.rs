//! Reference TCP node for the AppHost adapter.
//! Implements the adapter's stack seam over plain TCP and exports the C ABI.

pub mod config;
pub mod ffi;
pub mod node;
pub mod protocol;
pub mod wire;

pub use config::{Contact, NodeConfig};
pub use node::{TcpConn, TcpServiceListener, TcpStack};
pub use protocol::{Message, PROTOCOL_VERSION};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
