//! Outbound TCP links to peer machines

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use clockmesh_core::{ClockError, ClockResult, PeerId};
use clockmesh_wire::Frame;

/// Retry policy for opening outbound links at startup
#[derive(Clone, Debug)]
pub struct ConnectPolicy {
    /// Total connection attempts per peer (at least 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay
    pub max_backoff: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        ConnectPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl ConnectPolicy {
    /// Single attempt, fail immediately
    pub fn no_retry() -> Self {
        ConnectPolicy {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    pub fn validate(&self) -> ClockResult<()> {
        if self.max_attempts == 0 {
            return Err(ClockError::InvalidConfig(
                "connect max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

enum Link {
    Up(TcpStream),
    /// A send failed; the link is not reopened
    Down,
}

/// Outbound link table, keyed by peer identity
pub struct OutboundLinks {
    links: HashMap<PeerId, Link>,
    /// Configured order
    order: Vec<PeerId>,
}

impl OutboundLinks {
    /// Open one connection per peer.
    ///
    /// Each peer is retried per `policy`; running out of attempts for any
    /// peer is fatal.
    pub async fn connect(peers: &[PeerId], policy: &ConnectPolicy) -> ClockResult<Self> {
        policy.validate()?;

        let mut links = HashMap::with_capacity(peers.len());
        for &peer in peers {
            let stream = connect_with_retry(peer, policy).await?;
            tracing::info!(%peer, "outbound link established");
            links.insert(peer, Link::Up(stream));
        }

        Ok(OutboundLinks {
            links,
            order: peers.to_vec(),
        })
    }

    pub fn peers(&self) -> &[PeerId] {
        &self.order
    }

    pub fn is_up(&self, peer: PeerId) -> bool {
        matches!(self.links.get(&peer), Some(Link::Up(_)))
    }

    pub fn up_count(&self) -> usize {
        self.links
            .values()
            .filter(|link| matches!(link, Link::Up(_)))
            .count()
    }

    /// Write one frame to a peer.
    ///
    /// A write failure marks the link down; later sends to the same peer
    /// fail fast with `LinkDown`.
    pub async fn send(&mut self, peer: PeerId, frame: &Frame) -> ClockResult<()> {
        let link = self
            .links
            .get_mut(&peer)
            .ok_or(ClockError::UnknownPeer(peer))?;

        let Link::Up(stream) = link else {
            return Err(ClockError::LinkDown(peer));
        };

        let written = stream.write_all(&frame.serialize()).await;
        if let Err(e) = written {
            tracing::warn!(%peer, error = %e, "send failed, marking link down");
            *link = Link::Down;
            return Err(e.into());
        }
        Ok(())
    }

    /// Send the same frame to several peers; returns the failures
    pub async fn send_all(&mut self, peers: &[PeerId], frame: &Frame) -> Vec<(PeerId, ClockError)> {
        let mut failures = Vec::new();
        for &peer in peers {
            if let Err(e) = self.send(peer, frame).await {
                failures.push((peer, e));
            }
        }
        failures
    }
}

async fn connect_with_retry(peer: PeerId, policy: &ConnectPolicy) -> ClockResult<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(peer.addr()).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(source) if attempt >= policy.max_attempts => {
                return Err(ClockError::PeerConnect {
                    peer,
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::debug!(%peer, attempt, ?delay, error = %e, "connect failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
