/*!
 * Connection Multiplexer and Event Loop
 *
 * One thread owns every socket and drives all I/O through cooperative
 * readiness polling: wait for ready sockets, handle exactly those,
 * repeat. A request is fully read, dispatched, and answered before the
 * loop considers the next ready socket.
 *
 * Startup sequencing also lives here: bind/listen (fatal on failure),
 * snapshot load (logged, non-fatal), the replica handshake when
 * configured (fatal to serving on failure), then the serve loop.
 */

use crate::command::CommandHandler;
use crate::config::Config;
use crate::protocol::parse_request;
use crate::replica;
use crate::snapshot;
use crate::storage::Keyspace;
use anyhow::{Context, Result};
use bytes::BytesMut;
use hashbrown::HashMap;
use log::{debug, info, warn};
use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

/// Size of the per-tick read buffer for incoming data
const READ_BUF: usize = 4096;

/// Poll token reserved for the listening socket
const LISTENER: Token = Token(0);

/// One readiness notification, detached from the underlying mechanism
#[derive(Debug, Clone, Copy)]
pub struct Ready {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

/// Readiness-polling facade over mio
///
/// The serve loop only registers, deregisters, and waits; keeping that
/// surface this narrow means the readiness mechanism can be swapped for
/// a higher-throughput one without touching the multiplexer's logic.
pub struct Poller {
    poll: Poll,
    events: Events,
}

impl Poller {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(1024),
        })
    }

    pub fn register(&self, source: &mut impl Source, token: Token, interest: Interest) -> Result<()> {
        self.poll.registry().register(source, token, interest)?;
        Ok(())
    }

    pub fn reregister(&self, source: &mut impl Source, token: Token, interest: Interest) -> Result<()> {
        self.poll.registry().reregister(source, token, interest)?;
        Ok(())
    }

    pub fn deregister(&self, source: &mut impl Source) -> Result<()> {
        self.poll.registry().deregister(source)?;
        Ok(())
    }

    /// Block until at least one registered socket is ready
    pub fn wait(&mut self, out: &mut Vec<Ready>) -> Result<()> {
        self.poll.poll(&mut self.events, None)?;
        out.clear();
        out.extend(self.events.iter().map(|ev| Ready {
            token: ev.token(),
            readable: ev.is_readable(),
            writable: ev.is_writable(),
        }));
        Ok(())
    }
}

/// A live client connection: the socket plus bytes queued for it
struct Client {
    sock: TcpStream,
    wbuf: BytesMut,
}

/// The server: listener, clients, and the startup/serve sequencing
pub struct Server {
    config: Arc<Config>,
    store: Arc<Keyspace>,
    handler: CommandHandler,
    listener: TcpListener,
    poller: Poller,
    clients: HashMap<usize, Client>,
    next_token: usize,
    /// Outbound connection from the replica handshake, retained so the
    /// master link stays up. Never polled at this stage of replication
    /// support.
    master_link: Option<std::net::TcpStream>,
}

impl Server {
    /// Bind the listening socket; failure here aborts startup entirely
    pub fn bind(config: Arc<Config>, store: Arc<Keyspace>) -> Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", config.port())
            .parse()
            .context("invalid listen address")?;
        let listener = bind_listener(addr)
            .with_context(|| format!("failed to bind port {}", config.port()))?;
        let handler = CommandHandler::new(config.clone(), store.clone());

        Ok(Self {
            config,
            store,
            handler,
            listener,
            poller: Poller::new()?,
            clients: HashMap::new(),
            next_token: 1,
            master_link: None,
        })
    }

    /// Load the snapshot, handshake if a replica, then serve forever
    ///
    /// A handshake failure returns before the listener is ever
    /// registered: the socket is bound but the instance never accepts.
    pub fn run(&mut self) -> Result<()> {
        self.load_snapshot();

        if self.config.is_replica() {
            let link = replica::perform_handshake(&self.config)
                .context("replica handshake failed")?;
            self.master_link = Some(link);
        }

        self.poller
            .register(&mut self.listener, LISTENER, Interest::READABLE)?;
        info!("listening on port {}", self.config.port());

        let mut ready = Vec::new();
        loop {
            self.poller.wait(&mut ready)?;
            for ev in &ready {
                match ev.token {
                    LISTENER => self.accept_one(),
                    Token(token) => self.drive_client(token, ev.readable, ev.writable),
                }
            }
        }
    }

    fn load_snapshot(&self) {
        let path = self.config.snapshot_path();
        match snapshot::load_file(&path, &self.store) {
            Ok(count) => info!("loaded {} keys from {}", count, path.display()),
            // Keys installed before a mid-stream failure remain; the
            // instance serves with whatever was read, possibly nothing.
            Err(e) => warn!("snapshot {} not loaded: {}", path.display(), e),
        }
    }

    /// Accept a single pending connection and register it for reads
    fn accept_one(&mut self) {
        match self.listener.accept() {
            Ok((mut sock, peer)) => {
                sock.set_nodelay(true).ok();

                let token = self.next_token;
                self.next_token = self.next_token.wrapping_add(1);
                if self.next_token == 0 {
                    self.next_token = 1; // skip the listener token
                }

                if let Err(e) = self.poller.register(&mut sock, Token(token), Interest::READABLE) {
                    warn!("failed to register client from {}: {}", peer, e);
                    return;
                }
                debug!("client connected from {} (token {})", peer, token);
                self.clients.insert(token, Client { sock, wbuf: BytesMut::new() });
            }
            Err(ref e) if would_block(e) => {}
            Err(e) => warn!("accept failed: {}", e),
        }
    }

    /// Read, decode, dispatch, and respond for one ready client
    fn drive_client(&mut self, token: usize, readable: bool, writable: bool) {
        let mut drop_client = false;

        if let Some(client) = self.clients.get_mut(&token) {
            if readable {
                let mut buf = [0u8; READ_BUF];
                match client.sock.read(&mut buf) {
                    Ok(0) => drop_client = true,
                    Ok(n) => {
                        // One frame per read, decoded from exactly the
                        // bytes just received. A frame split across two
                        // reads, or a second back-to-back frame cut short
                        // by the buffer, is not reassembled; per-connection
                        // read buffering is the upgrade path if that ever
                        // matters for real clients.
                        let request = parse_request(&buf[..n]);
                        let response = self.handler.handle(&request);
                        client.wbuf.extend_from_slice(&response);
                    }
                    Err(ref e) if would_block(e) => {}
                    Err(_) => drop_client = true,
                }
            }

            // Flush opportunistically after handling and on writability.
            if !drop_client && !client.wbuf.is_empty() && (readable || writable) {
                match client.sock.write(&client.wbuf) {
                    Ok(n) => {
                        let _ = client.wbuf.split_to(n);
                    }
                    Err(ref e) if would_block(e) => {}
                    Err(_) => drop_client = true,
                }
            }

            // Ask for writability only while bytes are still queued.
            if !drop_client {
                let interest = if client.wbuf.is_empty() {
                    Interest::READABLE
                } else {
                    Interest::READABLE | Interest::WRITABLE
                };
                if self.poller.reregister(&mut client.sock, Token(token), interest).is_err() {
                    drop_client = true;
                }
            }
        }

        if drop_client {
            if let Some(mut client) = self.clients.remove(&token) {
                let _ = self.poller.deregister(&mut client.sock);
                debug!("client disconnected (token {})", token);
            }
        }
    }
}

/// Bind the server listener
///
/// SO_REUSEADDR keeps quick restarts from tripping over sockets left in
/// TIME_WAIT. The socket is non-blocking so the serve loop only touches
/// it once readiness has been signaled.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(TcpListener::from_std(socket.into()))
}

/// Check if an I/O error indicates the operation would block
#[inline]
fn would_block(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}
