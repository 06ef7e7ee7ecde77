//! AppHost flat adapter.
//! Turns listeners and streams of a peer-to-peer stack into string keys an embedding host can hold.

pub mod adapter;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod registry;
pub mod stack;

#[cfg(test)]
mod testing;

pub use adapter::{AppHostAdapter, READ_BUFFER_SIZE};
pub use error::{AppHostError, ResourceKind, Result};
pub use identity::{Identity, IdentityParseError, Keypair};
pub use protocol::client_js;
pub use stack::{Conn, Listener, NodeInfo, Stack};
