//! Inbound receiver built on mio readiness polling
//!
//! A single thread blocks in one `poll` over the listening socket and every
//! accepted peer connection. Frames decoded from any connection are pushed
//! onto the machine's inbound queue.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use clockmesh_core::{ClockError, ClockResult, InboundQueue};
use clockmesh_wire::FrameReader;

const LISTENER: Token = Token(0);
const SHUTDOWN: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

const EVENT_CAPACITY: usize = 128;

/// An accepted peer connection
struct Connection {
    stream: TcpStream,
    remote: SocketAddr,
    reader: FrameReader,
}

/// Wakes a running receiver and makes `run` return
#[derive(Clone)]
pub struct ReceiverShutdown {
    waker: Arc<Waker>,
}

impl ReceiverShutdown {
    pub fn shutdown(&self) -> ClockResult<()> {
        self.waker.wake()?;
        Ok(())
    }
}

/// Inbound receiver for one machine
pub struct Receiver {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    inbound: InboundQueue,
    waker: Arc<Waker>,
}

impl Receiver {
    /// Bind the listening socket and register it for accept readiness.
    ///
    /// Failing to bind is fatal for the machine.
    pub fn bind(addr: SocketAddr, inbound: InboundQueue) -> ClockResult<Self> {
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ClockError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), SHUTDOWN)?);

        tracing::info!(addr = %local_addr, "receiver listening");

        Ok(Receiver {
            poll,
            listener,
            local_addr,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            inbound,
            waker,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Handle for stopping `run` from another thread
    pub fn shutdown_handle(&self) -> ReceiverShutdown {
        ReceiverShutdown {
            waker: Arc::clone(&self.waker),
        }
    }

    /// Run the readiness loop until shut down.
    ///
    /// The wait has no timeout; the loop only wakes for socket readiness or
    /// the shutdown waker.
    pub fn run(&mut self) -> ClockResult<()> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_ready(),
                    SHUTDOWN => {
                        tracing::info!(addr = %self.local_addr, "receiver shutting down");
                        return Ok(());
                    }
                    token => self.connection_ready(token),
                }
            }
        }
    }

    /// Accept pending connections and register each for read readiness.
    ///
    /// Readiness is edge-triggered, so accepting continues until the
    /// listener would block.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, remote)) => self.register(stream, remote),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn register(&mut self, mut stream: TcpStream, remote: SocketAddr) {
        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) = self
            .poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)
        {
            tracing::warn!(%remote, error = %e, "failed to register connection");
            return;
        }

        tracing::debug!(%remote, token = token.0, "accepted connection");
        self.connections.insert(
            token,
            Connection {
                stream,
                remote,
                reader: FrameReader::new(),
            },
        );
    }

    /// Drain every complete frame available on a ready connection
    fn connection_ready(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let error = loop {
            match conn.reader.next_frame(&mut conn.stream) {
                Ok(Some(frame)) => {
                    tracing::trace!(remote = %conn.remote, clock = %frame.clock, "frame received");
                    self.inbound.push(frame.clock);
                }
                Ok(None) => return,
                Err(e) => break e,
            }
        };

        self.close(token, error);
    }

    /// Deregister and drop a failed connection; other connections keep running
    fn close(&mut self, token: Token, error: ClockError) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            tracing::debug!(remote = %conn.remote, error = %e, "deregister failed");
        }

        match error {
            ClockError::ConnectionClosed if !conn.reader.is_mid_frame() => {
                tracing::info!(remote = %conn.remote, "peer closed connection");
            }
            error => {
                tracing::warn!(
                    remote = %conn.remote,
                    mid_frame = conn.reader.is_mid_frame(),
                    %error,
                    "dropping connection"
                );
            }
        }
    }
}
