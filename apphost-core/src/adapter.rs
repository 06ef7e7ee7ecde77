//! Flat adapter: owns every listener and stream and hands out string keys instead.
//!
//! Services are keyed by the caller's name, connections by a fresh UUID. Callers never
//! hold the resource itself, so a stale or forged key can only ever miss.
//!
//! Close policy differs on purpose:
//! - service close keeps the entry when the stack's close fails, so the caller can retry;
//! - connection close forgets the entry before the stack's close runs, whatever it returns.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppHostError, Result};
use crate::identity::Identity;
use crate::registry::Registry;
use crate::stack::{Conn, Listener, NodeInfo, Stack};

/// Size of each read issued by [`AppHostAdapter::conn_read`].
pub const READ_BUFFER_SIZE: usize = 4096;

pub struct AppHostAdapter<S: Stack> {
    stack: S,
    listeners: Registry<Arc<S::Listener>>,
    connections: Registry<Arc<S::Conn>>,
}

impl<S: Stack> AppHostAdapter<S> {
    pub fn new(stack: S) -> Self {
        Self {
            stack,
            listeners: Registry::new(),
            connections: Registry::new(),
        }
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn is_shut_down(&self) -> bool {
        self.listeners.is_sealed()
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.listeners.contains(service)
    }

    pub fn has_connection(&self, id: &str) -> bool {
        self.connections.contains(id)
    }

    pub fn service_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn ensure_running(&self, op: &str) -> Result<()> {
        if self.is_shut_down() {
            return Err(AppHostError::shut_down(op));
        }
        Ok(())
    }

    /// Start listening on `service`. Duplicate names are resolved by the stack.
    pub fn service_register(&self, service: &str) -> Result<()> {
        self.ensure_running("service register")?;
        let listener = self
            .stack
            .register(service)
            .map_err(AppHostError::underlying("service register"))?;
        if let Err(listener) = self.listeners.insert(service, Arc::new(listener)) {
            let _ = listener.close();
            return Err(AppHostError::service_not_found(service));
        }
        debug!(service, "service registered");
        Ok(())
    }

    /// Close the listener for `service`. The entry survives a failed close.
    pub fn service_close(&self, service: &str) -> Result<()> {
        let listener = self
            .listeners
            .get(service)
            .ok_or_else(|| AppHostError::service_not_found(service))?;
        listener
            .close()
            .map_err(AppHostError::underlying("service close"))?;
        // A concurrent re-register may have replaced the entry; leave that one alone.
        self.listeners
            .remove_if(service, |current| Arc::ptr_eq(current, &listener));
        debug!(service, "service closed");
        Ok(())
    }

    /// Block until a peer connects to `service`, then return the new connection id.
    pub fn conn_accept(&self, service: &str) -> Result<String> {
        let listener = self
            .listeners
            .get(service)
            .ok_or_else(|| AppHostError::service_not_found(service))?;
        let conn = listener
            .accept()
            .map_err(AppHostError::underlying("conn accept"))?;
        self.store_conn(conn)
    }

    /// Forget the connection, then close it. The stack's close error is still returned.
    pub fn conn_close(&self, id: &str) -> Result<()> {
        let conn = self
            .connections
            .remove(id)
            .ok_or_else(|| AppHostError::connection_not_found(id))?;
        debug!(conn = id, "connection closed");
        conn.close().map_err(AppHostError::underlying("conn close"))
    }

    pub fn conn_write(&self, id: &str, data: &[u8]) -> Result<()> {
        let conn = self.conn(id)?;
        conn.write(data)
            .map_err(AppHostError::underlying("conn write"))?;
        Ok(())
    }

    /// Read whatever is currently available on `id`.
    ///
    /// Reads [`READ_BUFFER_SIZE`] bytes at a time and stops at the first short read.
    /// There is no framing: a sender writing in small chunks can be cut mid-message, and
    /// data ending exactly on a buffer boundary costs one more blocking read. End of
    /// stream is an error, and any error discards what was accumulated.
    pub fn conn_read_bytes(&self, id: &str) -> Result<Vec<u8>> {
        let conn = self.conn(id)?;
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut out = Vec::new();
        loop {
            let n = conn
                .read(&mut buf)
                .map_err(AppHostError::underlying("conn read"))?;
            if n == 0 {
                return Err(AppHostError::Underlying {
                    op: "conn read",
                    source: std::io::ErrorKind::UnexpectedEof.into(),
                });
            }
            out.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                return Ok(out);
            }
        }
    }

    /// Like [`conn_read_bytes`](Self::conn_read_bytes), decoded lossily for string-only hosts.
    pub fn conn_read(&self, id: &str) -> Result<String> {
        let bytes = self.conn_read_bytes(id)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Query `identity` (hex; empty means the local node) and return the new connection id.
    pub fn query(&self, identity: &str, query: &str) -> Result<String> {
        let target = if identity.is_empty() {
            None
        } else {
            Some(Identity::from_hex(identity)?)
        };
        self.ensure_running("query")?;
        let conn = self
            .stack
            .query(target.as_ref(), query)
            .map_err(AppHostError::underlying("query"))?;
        self.store_conn(conn)
    }

    pub fn query_name(&self, name: &str, query: &str) -> Result<String> {
        self.ensure_running("query name")?;
        let conn = self
            .stack
            .query_name(name, query)
            .map_err(AppHostError::underlying("query name"))?;
        self.store_conn(conn)
    }

    /// Resolve a node name to its identity in hex.
    pub fn resolve(&self, name: &str) -> Result<String> {
        self.ensure_running("resolve")?;
        let identity = self
            .stack
            .resolve(name)
            .map_err(AppHostError::underlying("resolve"))?;
        Ok(identity.to_hex())
    }

    pub fn node_info(&self, identity: &str) -> Result<NodeInfo> {
        let identity = Identity::from_hex(identity)?;
        self.ensure_running("node info")?;
        self.stack
            .node_info(&identity)
            .map_err(AppHostError::underlying("node info"))
    }

    /// Close every listener and connection and refuse all further work.
    /// Close errors are ignored. Safe to call more than once.
    pub fn shutdown(&self) {
        let mut listeners = self.listeners.lock_exclusive();
        let mut connections = self.connections.lock_exclusive();
        if listeners.is_sealed() {
            return;
        }
        for (service, listener) in listeners.seal() {
            if let Err(e) = listener.close() {
                debug!(service = %service, error = %e, "listener close failed during shutdown");
            }
        }
        for (id, conn) in connections.seal() {
            if let Err(e) = conn.close() {
                debug!(conn = %id, error = %e, "connection close failed during shutdown");
            }
        }
        info!("apphost adapter closed");
    }

    fn conn(&self, id: &str) -> Result<Arc<S::Conn>> {
        self.connections
            .get(id)
            .ok_or_else(|| AppHostError::connection_not_found(id))
    }

    fn store_conn(&self, conn: S::Conn) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        if let Err(conn) = self.connections.insert(&id, Arc::new(conn)) {
            // Shut down while the stack was blocked; nobody else will ever close it.
            let _ = conn.close();
            return Err(AppHostError::shut_down("store connection"));
        }
        debug!(conn = %id, "connection stored");
        Ok(id)
    }
}

impl<S: Stack> Drop for AppHostAdapter<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
