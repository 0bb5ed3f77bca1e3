//! Machine and cluster configuration

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clockmesh_core::{ClockError, ClockResult, PeerId, TickRate};
use clockmesh_transport::ConnectPolicy;

use crate::MemoryEventLog;

/// Ports of the default three-machine cluster
pub const DEFAULT_PORTS: [u16; 3] = [11113, 22224, 33335];

/// Where a machine writes its event log
#[derive(Clone, Debug)]
pub enum EventLogTarget {
    File(PathBuf),
    Memory(MemoryEventLog),
}

impl EventLogTarget {
    /// `machine-<port>.log` inside `dir`
    pub fn file_for_port(dir: &Path, port: u16) -> Self {
        EventLogTarget::File(dir.join(format!("machine-{port}.log")))
    }
}

/// Configuration for a single machine
#[derive(Clone, Debug)]
pub struct MachineConfig {
    /// Receiver listening address; also the machine's identity
    pub listen: SocketAddr,
    /// Peers in send-selection order
    pub peers: Vec<PeerId>,
    /// Fixed tick rate; drawn at random when `None`
    pub tick_rate: Option<TickRate>,
    /// Seed for the engine's random source; entropy when `None`
    pub seed: Option<u64>,
    pub event_log: EventLogTarget,
    /// Extra delay between binding the receiver and opening links
    pub startup_grace: Duration,
    pub connect: ConnectPolicy,
}

impl MachineConfig {
    pub fn new(listen: SocketAddr, peers: Vec<PeerId>) -> Self {
        MachineConfig {
            listen,
            peers,
            tick_rate: None,
            seed: None,
            event_log: EventLogTarget::file_for_port(Path::new("."), listen.port()),
            startup_grace: Duration::ZERO,
            connect: ConnectPolicy::default(),
        }
    }

    pub fn validate(&self) -> ClockResult<()> {
        self.connect.validate()?;

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if !seen.insert(*peer) {
                return Err(ClockError::InvalidConfig(format!("duplicate peer {peer}")));
            }
            if self.listen.port() != 0 && peer.addr() == self.listen {
                return Err(ClockError::InvalidConfig(format!(
                    "machine {} lists itself as a peer",
                    self.listen
                )));
            }
        }
        Ok(())
    }
}

/// Full-mesh cluster on one host
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    pub host: IpAddr,
    /// One machine per port; port 0 binds an ephemeral port
    pub ports: Vec<u16>,
    /// Directory for file event logs; in-memory logs when `None`
    pub log_dir: Option<PathBuf>,
    /// Pin every machine to one rate instead of drawing per machine
    pub tick_rate: Option<TickRate>,
    pub startup_grace: Duration,
    pub connect: ConnectPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ports: DEFAULT_PORTS.to_vec(),
            log_dir: Some(PathBuf::from(".")),
            tick_rate: None,
            startup_grace: Duration::ZERO,
            connect: ConnectPolicy::default(),
        }
    }
}

impl ClusterConfig {
    /// Loopback cluster of `machines` on ephemeral ports with in-memory logs
    pub fn ephemeral(machines: usize) -> Self {
        ClusterConfig {
            ports: vec![0; machines],
            log_dir: None,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ClockResult<()> {
        if self.ports.len() < 2 {
            return Err(ClockError::InvalidConfig(
                "a cluster needs at least two machines".into(),
            ));
        }
        let fixed: Vec<u16> = self.ports.iter().copied().filter(|&p| p != 0).collect();
        let unique: HashSet<u16> = fixed.iter().copied().collect();
        if unique.len() != fixed.len() {
            return Err(ClockError::InvalidConfig("duplicate port".into()));
        }
        self.connect.validate()
    }

    /// Per-machine configs without peers; peers are filled in once every
    /// receiver is bound and its real address is known.
    pub fn machine_configs(&self) -> Vec<MachineConfig> {
        self.ports
            .iter()
            .map(|&port| {
                let listen = SocketAddr::new(self.host, port);
                let mut config = MachineConfig::new(listen, Vec::new());
                config.tick_rate = self.tick_rate;
                config.startup_grace = self.startup_grace;
                config.connect = self.connect.clone();
                config.event_log = match &self.log_dir {
                    Some(dir) if port != 0 => EventLogTarget::file_for_port(dir, port),
                    _ => EventLogTarget::Memory(MemoryEventLog::new()),
                };
                config
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_default_cluster_ports() {
        let config = ClusterConfig::default();
        assert_eq!(config.ports, vec![11113, 22224, 33335]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_machine_configs_name_log_files_by_port() {
        let config = ClusterConfig {
            log_dir: Some(PathBuf::from("/tmp/logs")),
            ..ClusterConfig::default()
        };
        let machines = config.machine_configs();
        assert_eq!(machines.len(), 3);
        match &machines[1].event_log {
            EventLogTarget::File(path) => {
                assert_eq!(path, &PathBuf::from("/tmp/logs/machine-22224.log"))
            }
            other => panic!("expected file log, got {:?}", other),
        }
        assert_eq!(machines[2].listen, addr(33335));
    }

    #[test]
    fn test_cluster_validation() {
        assert!(ClusterConfig::ephemeral(1).validate().is_err());
        assert!(ClusterConfig::ephemeral(3).validate().is_ok());

        let dup = ClusterConfig {
            ports: vec![11113, 11113],
            ..ClusterConfig::default()
        };
        assert!(matches!(dup.validate(), Err(ClockError::InvalidConfig(_))));
    }

    #[test]
    fn test_machine_rejects_self_and_duplicate_peers() {
        let me = MachineConfig::new(addr(11113), vec![PeerId::new(addr(11113))]);
        assert!(me.validate().is_err());

        let dup = MachineConfig::new(
            addr(11113),
            vec![PeerId::new(addr(22224)), PeerId::new(addr(22224))],
        );
        assert!(dup.validate().is_err());

        let ok = MachineConfig::new(
            addr(11113),
            vec![PeerId::new(addr(22224)), PeerId::new(addr(33335))],
        );
        assert!(ok.validate().is_ok());
    }
}
