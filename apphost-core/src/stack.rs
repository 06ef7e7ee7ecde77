//! Seam to the underlying peer-to-peer stack. The adapter only ever talks to these traits.

use std::io;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Public node metadata returned by a node info lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub identity: String,
    pub name: String,
}

/// Bidirectional byte stream. All methods take `&self` so one stream can be read
/// on one thread while another writes to or closes it.
pub trait Conn: Send + Sync + 'static {
    /// Read into `buf`. `Ok(0)` means end of stream.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    /// Write the whole of `data`, returning the number of bytes written.
    fn write(&self, data: &[u8]) -> io::Result<usize>;
    fn close(&self) -> io::Result<()>;
}

/// Listening endpoint bound to a service name.
pub trait Listener: Send + Sync + 'static {
    type Conn: Conn;

    /// Block until a peer queries this service.
    fn accept(&self) -> io::Result<Self::Conn>;
    fn close(&self) -> io::Result<()>;
}

/// The networking/identity collaborator. Every call may block.
pub trait Stack: Send + Sync + 'static {
    type Conn: Conn;
    type Listener: Listener<Conn = Self::Conn>;

    fn register(&self, service: &str) -> io::Result<Self::Listener>;
    /// Open a stream to `query` on `target`; `None` addresses the local node.
    fn query(&self, target: Option<&Identity>, query: &str) -> io::Result<Self::Conn>;
    fn query_name(&self, name: &str, query: &str) -> io::Result<Self::Conn>;
    fn resolve(&self, name: &str) -> io::Result<Identity>;
    fn node_info(&self, identity: &Identity) -> io::Result<NodeInfo>;
}
