//! Scripted in-memory stack for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::identity::Identity;
use crate::stack::{Conn, Listener, NodeInfo, Stack};

#[derive(Default)]
struct ConnState {
    reads: Mutex<VecDeque<io::Result<Vec<u8>>>>,
    echo: Mutex<VecDeque<u8>>,
    closed: AtomicBool,
    close_fails: AtomicBool,
    close_calls: AtomicUsize,
}

/// Loopback stream: reads return scripted chunks first, then whatever was written.
#[derive(Clone, Default)]
pub struct MockConn(Arc<ConnState>);

impl MockConn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_read(&self, chunk: io::Result<Vec<u8>>) {
        self.0.reads.lock().unwrap().push_back(chunk);
    }

    pub fn set_close_fails(&self, fails: bool) {
        self.0.close_fails.store(fails, Ordering::SeqCst);
    }

    pub fn close_calls(&self) -> usize {
        self.0.close_calls.load(Ordering::SeqCst)
    }
}

impl Conn for MockConn {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0.closed.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if let Some(chunk) = self.0.reads.lock().unwrap().pop_front() {
            let chunk = chunk?;
            assert!(chunk.len() <= buf.len(), "scripted chunk larger than buffer");
            buf[..chunk.len()].copy_from_slice(&chunk);
            return Ok(chunk.len());
        }
        let mut echo = self.0.echo.lock().unwrap();
        let n = echo.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(echo.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.0.closed.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.0.echo.lock().unwrap().extend(data);
        Ok(data.len())
    }

    fn close(&self) -> io::Result<()> {
        self.0.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.close_fails.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "close refused"));
        }
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct ListenerState {
    pending: Mutex<VecDeque<MockConn>>,
    closed: AtomicBool,
    close_fails: AtomicBool,
}

/// Listener that hands out pre-pushed streams and errors instead of blocking when empty.
#[derive(Clone, Default)]
pub struct MockListener(Arc<ListenerState>);

impl MockListener {
    pub fn push(&self, conn: MockConn) {
        self.0.pending.lock().unwrap().push_back(conn);
    }

    pub fn set_close_fails(&self, fails: bool) {
        self.0.close_fails.store(fails, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

impl Listener for MockListener {
    type Conn = MockConn;

    fn accept(&self) -> io::Result<MockConn> {
        if self.is_closed() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.0
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no pending peer"))
    }

    fn close(&self) -> io::Result<()> {
        if self.0.close_fails.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "close refused"));
        }
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockStack {
    listeners: Mutex<HashMap<String, MockListener>>,
    failing_register: Mutex<HashSet<String>>,
    failing_query: Mutex<HashSet<String>>,
    next_conns: Mutex<VecDeque<MockConn>>,
    nodes: Mutex<HashMap<Identity, String>>,
    query_calls: AtomicUsize,
}

impl MockStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self, service: &str) -> Option<MockListener> {
        self.listeners.lock().unwrap().get(service).cloned()
    }

    pub fn fail_register(&self, service: &str) {
        self.failing_register
            .lock()
            .unwrap()
            .insert(service.to_string());
    }

    pub fn fail_query(&self, query: &str) {
        self.failing_query.lock().unwrap().insert(query.to_string());
    }

    /// Stream returned by the next successful query (a fresh one otherwise).
    pub fn next_query_conn(&self, conn: MockConn) {
        self.next_conns.lock().unwrap().push_back(conn);
    }

    pub fn add_node(&self, identity: Identity, name: &str) {
        self.nodes
            .lock()
            .unwrap()
            .insert(identity, name.to_string());
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

impl Stack for MockStack {
    type Conn = MockConn;
    type Listener = MockListener;

    fn register(&self, service: &str) -> io::Result<MockListener> {
        if self.failing_register.lock().unwrap().contains(service) {
            return Err(io::ErrorKind::AddrInUse.into());
        }
        let listener = MockListener::default();
        self.listeners
            .lock()
            .unwrap()
            .insert(service.to_string(), listener.clone());
        Ok(listener)
    }

    fn query(&self, target: Option<&Identity>, query: &str) -> io::Result<MockConn> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_query.lock().unwrap().contains(query) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        if let Some(target) = target {
            if !self.nodes.lock().unwrap().contains_key(target) {
                return Err(io::ErrorKind::NotFound.into());
            }
        }
        Ok(self
            .next_conns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn query_name(&self, name: &str, query: &str) -> io::Result<MockConn> {
        let identity = self.resolve(name)?;
        self.query(Some(&identity), query)
    }

    fn resolve(&self, name: &str) -> io::Result<Identity> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| io::ErrorKind::NotFound.into())
    }

    fn node_info(&self, identity: &Identity) -> io::Result<NodeInfo> {
        let name = self
            .nodes
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .ok_or(io::ErrorKind::NotFound)?;
        Ok(NodeInfo {
            identity: identity.to_hex(),
            name,
        })
    }
}
