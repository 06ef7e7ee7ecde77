//! Reference TCP node: a router that hands inbound queries to service listeners,
//! and outbound queries to peers listed in the config.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use apphost_core::{Conn, Identity, Keypair, Listener, NodeInfo, Stack};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::{Contact, NodeConfig};
use crate::protocol::{Message, PROTOCOL_VERSION};
use crate::wire;

/// Service name → queue feeding that service's listener.
type ServiceQueues = Arc<Mutex<HashMap<String, mpsc::Sender<TcpStream>>>>;

fn lock(services: &ServiceQueues) -> MutexGuard<'_, HashMap<String, mpsc::Sender<TcpStream>>> {
    services.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Byte stream to a peer, after the query handshake.
#[derive(Debug)]
pub struct TcpConn(TcpStream);

impl TcpConn {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.0.peer_addr()
    }
}

impl Conn for TcpConn {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.0).read(buf)
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        (&self.0).write_all(data)?;
        Ok(data.len())
    }

    fn close(&self) -> io::Result<()> {
        self.0.shutdown(Shutdown::Both)
    }
}

/// Listener for one service name. Accept blocks until the router hands over a query.
#[derive(Debug)]
pub struct TcpServiceListener {
    service: String,
    queue: Mutex<mpsc::Receiver<TcpStream>>,
    services: ServiceQueues,
    closed: AtomicBool,
}

impl TcpServiceListener {
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Listener for TcpServiceListener {
    type Conn = TcpConn;

    fn accept(&self) -> io::Result<TcpConn> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        // The only long-lived sender sits in the service map; close() drops it.
        queue
            .recv()
            .map(TcpConn)
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener already closed",
            ));
        }
        lock(&self.services).remove(&self.service);
        debug!(service = %self.service, "service queue removed");
        Ok(())
    }
}

impl Drop for TcpServiceListener {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A running node. Owns the router runtime; dropping the stack stops routing.
pub struct TcpStack {
    keypair: Keypair,
    name: String,
    local_addr: SocketAddr,
    contacts: Vec<Contact>,
    query_timeout: Duration,
    services: ServiceQueues,
    _runtime: Runtime,
}

impl TcpStack {
    /// Bind the router and start accepting inbound queries.
    /// Must not be called from inside a tokio runtime.
    pub fn start(config: &NodeConfig, keypair: Keypair) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("apphost-router")
            .enable_all()
            .build()?;
        let listener =
            runtime.block_on(TcpListener::bind((config.bind_address, config.listen_port)))?;
        let local_addr = listener.local_addr()?;
        let services: ServiceQueues = Arc::new(Mutex::new(HashMap::new()));
        let query_timeout = config.query_timeout();
        runtime.spawn(run_router(listener, services.clone(), query_timeout));
        info!(
            name = %config.name,
            identity = %keypair.identity(),
            addr = %local_addr,
            "node started"
        );
        Ok(Self {
            keypair,
            name: config.name.clone(),
            local_addr,
            contacts: config.contacts.clone(),
            query_timeout,
            services,
            _runtime: runtime,
        })
    }

    pub fn identity(&self) -> Identity {
        self.keypair.identity()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the router is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address to dial for queries to this node.
    fn loopback_addr(&self) -> SocketAddr {
        match self.local_addr.ip() {
            ip if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.local_addr.port())
            }
            _ => self.local_addr,
        }
    }

    fn contact_by_identity(&self, identity: &Identity) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.identity == *identity)
    }

    fn contact_by_name(&self, name: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.name == name)
    }

    fn open(&self, addr: SocketAddr, query: &str) -> io::Result<TcpConn> {
        let stream = TcpStream::connect_timeout(&addr, self.query_timeout)?;
        stream.set_read_timeout(Some(self.query_timeout))?;
        let frame = wire::encode_frame(&Message::Query {
            protocol_version: PROTOCOL_VERSION,
            caller: self.identity(),
            query: query.to_string(),
        })?;
        (&stream).write_all(&frame)?;
        let reply = wire::read_frame(&mut &stream)?;
        stream.set_read_timeout(None)?;
        match reply {
            Message::Accept => {
                debug!(%addr, query, "query accepted");
                Ok(TcpConn(stream))
            }
            Message::Reject { reason } => {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, reason))
            }
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected reply to query: {other:?}"),
            )),
        }
    }
}

impl Stack for TcpStack {
    type Conn = TcpConn;
    type Listener = TcpServiceListener;

    fn register(&self, service: &str) -> io::Result<TcpServiceListener> {
        let mut services = lock(&self.services);
        if services.contains_key(service) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("service already registered: {service}"),
            ));
        }
        let (tx, rx) = mpsc::channel();
        services.insert(service.to_string(), tx);
        Ok(TcpServiceListener {
            service: service.to_string(),
            queue: Mutex::new(rx),
            services: self.services.clone(),
            closed: AtomicBool::new(false),
        })
    }

    fn query(&self, target: Option<&Identity>, query: &str) -> io::Result<TcpConn> {
        let addr = match target {
            None => self.loopback_addr(),
            Some(id) if *id == self.identity() => self.loopback_addr(),
            Some(id) => {
                self.contact_by_identity(id)
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::NotFound, format!("unknown node: {id}"))
                    })?
                    .address
            }
        };
        self.open(addr, query)
    }

    fn query_name(&self, name: &str, query: &str) -> io::Result<TcpConn> {
        let identity = self.resolve(name)?;
        self.query(Some(&identity), query)
    }

    fn resolve(&self, name: &str) -> io::Result<Identity> {
        if name == self.name {
            return Ok(self.identity());
        }
        self.contact_by_name(name)
            .map(|c| c.identity)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("could not resolve {name}"))
            })
    }

    fn node_info(&self, identity: &Identity) -> io::Result<NodeInfo> {
        let name = if *identity == self.identity() {
            self.name.clone()
        } else {
            self.contact_by_identity(identity)
                .map(|c| c.name.clone())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("unknown node: {identity}"))
                })?
        };
        Ok(NodeInfo {
            identity: identity.to_hex(),
            name,
        })
    }
}

async fn run_router(listener: TcpListener, services: ServiceQueues, query_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let services = services.clone();
                tokio::spawn(async move {
                    if let Err(e) = route(stream, &services, query_timeout).await {
                        debug!(%peer, error = %e, "inbound query dropped");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "router accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Read the query header, then hand the socket to the service's listener or reject it.
async fn route(
    mut stream: tokio::net::TcpStream,
    services: &ServiceQueues,
    query_timeout: Duration,
) -> io::Result<()> {
    let msg = tokio::time::timeout(query_timeout, wire::read_frame_async(&mut stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "query header timed out"))??;
    let (caller, query) = match msg {
        Message::Query {
            protocol_version,
            caller,
            query,
        } => {
            if protocol_version != PROTOCOL_VERSION {
                return reject(&mut stream, "unsupported protocol version").await;
            }
            (caller, query)
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected query, got {other:?}"),
            ))
        }
    };
    let queue = lock(services).get(&query).cloned();
    let Some(queue) = queue else {
        debug!(%caller, query = %query, "no such service");
        return reject(&mut stream, &format!("no such service: {query}")).await;
    };
    wire::write_frame_async(&mut stream, &Message::Accept).await?;
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    if queue.send(stream).is_err() {
        debug!(%caller, query = %query, "listener closed before hand-off");
        return Ok(());
    }
    debug!(%caller, query = %query, "query routed");
    Ok(())
}

async fn reject(stream: &mut tokio::net::TcpStream, reason: &str) -> io::Result<()> {
    wire::write_frame_async(
        stream,
        &Message::Reject {
            reason: reason.to_string(),
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(name: &str) -> TcpStack {
        let config = NodeConfig {
            name: name.to_string(),
            listen_port: 0,
            query_timeout_ms: 2_000,
            ..NodeConfig::default()
        };
        TcpStack::start(&config, Keypair::generate()).unwrap()
    }

    #[test]
    fn duplicate_register_is_addr_in_use() {
        let stack = start("n");
        let first = stack.register("svc").unwrap();
        let err = stack.register("svc").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        first.close().unwrap();
        let again = stack.register("svc").unwrap();
        assert_eq!(again.service(), "svc");
    }

    #[test]
    fn second_close_fails() {
        let stack = start("n");
        let l = stack.register("svc").unwrap();
        l.close().unwrap();
        assert_eq!(l.close().unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn dropping_listener_frees_the_name() {
        let stack = start("n");
        drop(stack.register("svc").unwrap());
        stack.register("svc").unwrap();
    }

    #[test]
    fn close_wakes_blocked_accept() {
        let stack = start("n");
        let l = Arc::new(stack.register("svc").unwrap());
        let waiter = {
            let l = l.clone();
            std::thread::spawn(move || l.accept().map(|_| ()))
        };
        std::thread::sleep(Duration::from_millis(50));
        l.close().unwrap();
        let err = waiter.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn local_query_reaches_listener() {
        let stack = start("n");
        let l = stack.register("echo").unwrap();
        let client = stack.query(None, "echo").unwrap();
        let server = l.accept().unwrap();
        client.write(b"ping").unwrap();
        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        client.close().unwrap();
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn query_to_missing_service_is_refused() {
        let stack = start("n");
        let err = stack.query(None, "ping").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(err.to_string().contains("ping"));
    }

    #[test]
    fn resolve_and_node_info_cover_self_and_contacts() {
        let peer = Keypair::generate().identity();
        let config = NodeConfig {
            name: "desk".into(),
            listen_port: 0,
            contacts: vec![Contact {
                name: "laptop".into(),
                identity: peer,
                address: "127.0.0.1:1".parse().unwrap(),
            }],
            ..NodeConfig::default()
        };
        let stack = TcpStack::start(&config, Keypair::generate()).unwrap();
        assert_eq!(stack.resolve("desk").unwrap(), stack.identity());
        assert_eq!(stack.resolve("laptop").unwrap(), peer);
        assert_eq!(
            stack.resolve("phone").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(stack.node_info(&peer).unwrap().name, "laptop");
        assert_eq!(stack.node_info(&stack.identity()).unwrap().name, "desk");
        let stranger = Keypair::generate().identity();
        assert_eq!(
            stack.node_info(&stranger).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            stack.query(Some(&stranger), "svc").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn garbage_header_is_dropped() {
        let stack = start("n");
        let raw = TcpStream::connect(stack.local_addr()).unwrap();
        (&raw).write_all(&[0xff, 0xff, 0xff, 0xff]).unwrap();
        raw.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buf = [0u8; 8];
        // Router closes without replying.
        assert_eq!((&raw).read(&mut buf).unwrap_or(0), 0);
    }
}
