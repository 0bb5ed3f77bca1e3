//! clockmesh Machine - composition root for one simulated machine

use std::net::SocketAddr;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use clockmesh_core::{ClockError, ClockResult, InboundQueue, LogicalTime, PeerId, TickRate};
use clockmesh_time::{ClockEngine, ClockEvent, EngineStats, Pacer};
use clockmesh_transport::{OutboundLinks, Receiver, ReceiverShutdown};
use clockmesh_wire::Frame;

use crate::{EventLogTarget, EventLogger, FileEventLog, MachineConfig};

/// Final state of a machine after shutdown
#[derive(Clone, Debug)]
pub struct MachineReport {
    pub id: PeerId,
    pub tick_rate: TickRate,
    pub clock: LogicalTime,
    pub stats: EngineStats,
    /// Frames that could not be delivered
    pub send_failures: u64,
    /// Event log entries that could not be written
    pub log_failures: u64,
}

/// Receiver thread plus the waker that stops it.
///
/// Dropping it without `stop` still wakes the receiver, so the listening
/// socket closes and the blocking thread exits.
pub(crate) struct ReceiverTask {
    shutdown: ReceiverShutdown,
    /// `None` once `stop` has taken it
    task: Option<JoinHandle<ClockResult<()>>>,
}

impl ReceiverTask {
    fn new(shutdown: ReceiverShutdown, task: JoinHandle<ClockResult<()>>) -> Self {
        ReceiverTask {
            shutdown,
            task: Some(task),
        }
    }

    pub(crate) async fn stop(mut self) -> ClockResult<()> {
        self.shutdown.shutdown()?;
        match self.task.take() {
            Some(task) => task.await.map_err(join_error)?,
            None => Ok(()),
        }
    }
}

impl Drop for ReceiverTask {
    fn drop(&mut self) {
        if self.task.is_some() {
            if let Err(e) = self.shutdown.shutdown() {
                tracing::debug!(error = %e, "failed to wake receiver on drop");
            }
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> ClockError {
    ClockError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// A machine whose receiver is listening but whose clock loop has not started
pub struct Machine {
    id: PeerId,
    config: MachineConfig,
    inbound: InboundQueue,
    receiver: ReceiverTask,
}

impl Machine {
    /// Bind the receiver and start its readiness loop.
    ///
    /// Returns once the listener accepts connections, so peers may connect
    /// as soon as this completes.
    pub async fn bind(config: MachineConfig) -> ClockResult<Self> {
        config.validate()?;

        let inbound = InboundQueue::new();
        let mut receiver = Receiver::bind(config.listen, inbound.clone())?;
        let id = PeerId::new(receiver.local_addr());
        let shutdown = receiver.shutdown_handle();
        let task = tokio::task::spawn_blocking(move || receiver.run());

        Ok(Machine {
            id,
            config,
            inbound,
            receiver: ReceiverTask::new(shutdown, task),
        })
    }

    /// Identity: the address the receiver is bound to
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.id.addr()
    }

    pub fn inbound(&self) -> &InboundQueue {
        &self.inbound
    }

    /// Replace the configured peer set
    pub fn with_peers(mut self, peers: Vec<PeerId>) -> Self {
        self.config.peers = peers;
        self
    }

    /// Open outbound links and start the paced clock loop.
    ///
    /// On failure the receiver is stopped before the error is returned.
    pub async fn start(self) -> ClockResult<MachineHandle> {
        match self.prepare().await {
            Ok((engine, links, logger)) => Ok(self.spawn(engine, links, logger)),
            Err(e) => {
                tracing::error!(machine = %self.id, error = %e, "machine failed to start");
                if let Err(stop_error) = self.receiver.stop().await {
                    tracing::warn!(
                        machine = %self.id,
                        error = %stop_error,
                        "receiver did not stop cleanly"
                    );
                }
                Err(e)
            }
        }
    }

    async fn prepare(&self) -> ClockResult<(ClockEngine, OutboundLinks, EventLogger)> {
        let config = &self.config;
        config.validate()?;
        if config.peers.contains(&self.id) {
            return Err(ClockError::InvalidConfig(format!(
                "machine {} lists itself as a peer",
                self.id
            )));
        }

        let logger = match &config.event_log {
            EventLogTarget::File(path) => EventLogger::new(FileEventLog::open(path)?),
            EventLogTarget::Memory(log) => EventLogger::new(log.clone()),
        };

        if !config.startup_grace.is_zero() {
            tokio::time::sleep(config.startup_grace).await;
        }

        let links = OutboundLinks::connect(&config.peers, &config.connect).await?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut engine = ClockEngine::with_rng(config.peers.clone(), rng);
        if let Some(rate) = config.tick_rate {
            engine = engine.with_tick_rate(rate);
        }

        Ok((engine, links, logger))
    }

    fn spawn(
        self,
        engine: ClockEngine,
        links: OutboundLinks,
        logger: EventLogger,
    ) -> MachineHandle {
        let tick_rate = engine.tick_rate();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (clock_tx, clock_rx) = watch::channel(engine.now());

        tracing::info!(
            machine = %self.id,
            %tick_rate,
            peers = self.config.peers.len(),
            "clock loop starting"
        );

        let clock_loop = ClockLoop {
            id: self.id,
            engine,
            links,
            logger,
            inbound: self.inbound.clone(),
            clock_tx,
            send_failures: 0,
        };
        let engine_task = tokio::spawn(clock_loop.run(shutdown_rx));

        MachineHandle {
            id: self.id,
            tick_rate,
            inbound: self.inbound,
            clock: clock_rx,
            shutdown: shutdown_tx,
            engine_task,
            receiver: self.receiver,
        }
    }

    /// Stop the receiver without ever starting the clock loop
    pub async fn shutdown(self) -> ClockResult<()> {
        self.receiver.stop().await
    }
}

/// A running machine.
///
/// Dropping the handle closes the shutdown channel, which ends the clock
/// loop, and wakes the receiver.
pub struct MachineHandle {
    id: PeerId,
    tick_rate: TickRate,
    inbound: InboundQueue,
    clock: watch::Receiver<LogicalTime>,
    shutdown: watch::Sender<bool>,
    engine_task: JoinHandle<MachineReport>,
    receiver: ReceiverTask,
}

impl MachineHandle {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn tick_rate(&self) -> TickRate {
        self.tick_rate
    }

    /// Clock value after the most recent cycle
    pub fn clock(&self) -> LogicalTime {
        *self.clock.borrow()
    }

    /// Values received but not yet processed
    pub fn queue_depth(&self) -> usize {
        self.inbound.len()
    }

    /// Wait until the clock reaches at least `target`
    pub async fn wait_for_clock(&mut self, target: LogicalTime) -> ClockResult<LogicalTime> {
        let id = self.id;
        let reached = self
            .clock
            .wait_for(|clock| *clock >= target)
            .await
            .map_err(|_| ClockError::ClockStopped(id))?;
        Ok(*reached)
    }

    /// Ask the clock loop to stop after its current cycle
    pub fn request_stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal both loops to stop and wait for them
    pub async fn shutdown(self) -> ClockResult<MachineReport> {
        let (report, receiver) = self.stop_clock().await?;
        receiver.stop().await?;
        Ok(report)
    }

    /// Stop the clock loop only; the receiver keeps accepting frames
    pub(crate) async fn stop_clock(self) -> ClockResult<(MachineReport, ReceiverTask)> {
        self.request_stop();
        let report = self.engine_task.await.map_err(join_error)?;
        tracing::info!(machine = %self.id, clock = %report.clock, "machine stopped");
        Ok((report, self.receiver))
    }
}

/// State owned by the clock loop task
struct ClockLoop {
    id: PeerId,
    engine: ClockEngine,
    links: OutboundLinks,
    logger: EventLogger,
    inbound: InboundQueue,
    clock_tx: watch::Sender<LogicalTime>,
    send_failures: u64,
}

impl ClockLoop {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MachineReport {
        let pacer = Pacer::new(self.engine.tick_rate());

        while !*shutdown.borrow() {
            let started = Instant::now();
            self.step().await;

            let pause = pacer.remaining_since(started);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        MachineReport {
            id: self.id,
            tick_rate: self.engine.tick_rate(),
            clock: self.engine.now(),
            stats: self.engine.stats().clone(),
            send_failures: self.send_failures,
            log_failures: self.logger.failures(),
        }
    }

    /// One cycle: decide, transmit, record
    async fn step(&mut self) {
        let event = self.engine.cycle(&self.inbound);

        if let ClockEvent::Sent { clock, peers } = &event {
            let frame = Frame::new(*clock);
            for (peer, error) in self.links.send_all(peers, &frame).await {
                self.send_failures += 1;
                tracing::warn!(machine = %self.id, %peer, %error, "frame not delivered");
            }
        }

        self.logger.record(&event);
        tracing::debug!(machine = %self.id, kind = event.kind(), clock = %event.clock(), "cycle");
        self.clock_tx.send_replace(event.clock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryEventLog;
    use clockmesh_transport::ConnectPolicy;
    use std::time::Duration;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_bind_reports_actual_port() {
        let machine = Machine::bind(MachineConfig::new(loopback(), vec![]))
            .await
            .unwrap();
        assert_ne!(machine.local_addr().port(), 0);
        machine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = Machine::bind(MachineConfig::new(loopback(), vec![]))
            .await
            .unwrap();
        let taken = first.local_addr();

        let second = Machine::bind(MachineConfig::new(taken, vec![])).await;
        assert!(matches!(second, Err(ClockError::Bind { .. })));
        first.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_peer_fails_start() {
        let ghost = {
            let listener = std::net::TcpListener::bind(loopback()).unwrap();
            PeerId::new(listener.local_addr().unwrap())
        };
        let mut config = MachineConfig::new(loopback(), vec![ghost]);
        config.connect = ConnectPolicy::no_retry();
        config.event_log = EventLogTarget::Memory(MemoryEventLog::new());

        let machine = Machine::bind(config).await.unwrap();
        assert!(matches!(
            machine.start().await,
            Err(ClockError::PeerConnect { .. })
        ));
    }

    #[tokio::test]
    async fn test_isolated_machine_only_has_internal_events() {
        let log = MemoryEventLog::new();
        let mut config = MachineConfig::new(loopback(), vec![]);
        config.tick_rate = Some(TickRate::new(6).unwrap());
        config.seed = Some(1);
        config.event_log = EventLogTarget::Memory(log.clone());

        let mut handle = Machine::bind(config).await.unwrap().start().await.unwrap();
        assert_eq!(handle.tick_rate().per_second(), 6);

        tokio::time::timeout(Duration::from_secs(5), handle.wait_for_clock(LogicalTime(3)))
            .await
            .unwrap()
            .unwrap();
        let report = handle.shutdown().await.unwrap();

        assert!(report.clock >= LogicalTime(3));
        assert_eq!(report.stats.sends, 0);
        assert_eq!(report.stats.internal, report.stats.cycles);
        assert_eq!(report.send_failures, 0);
        assert!(log.lines().iter().all(|line| line.contains(" internal clock=")));
    }

    #[tokio::test]
    async fn test_queued_value_is_consumed_by_next_cycle() {
        let log = MemoryEventLog::new();
        let mut config = MachineConfig::new(loopback(), vec![]);
        config.tick_rate = Some(TickRate::new(6).unwrap());
        config.event_log = EventLogTarget::Memory(log.clone());

        let machine = Machine::bind(config).await.unwrap();
        machine.inbound().push(LogicalTime(123));
        let mut handle = machine.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.wait_for_clock(LogicalTime(124)))
            .await
            .unwrap()
            .unwrap();
        handle.shutdown().await.unwrap();

        assert!(log.lines()[0].contains("received clock=124 queue=0 remote=123"));
    }

    /// Poll until connecting to `addr` is refused
    async fn wait_until_closed(addr: SocketAddr) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while tokio::net::TcpStream::connect(addr).await.is_ok() {
            assert!(Instant::now() < deadline, "{addr} still accepting connections");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_dropped_machine_releases_port() {
        let machine = Machine::bind(MachineConfig::new(loopback(), vec![]))
            .await
            .unwrap();
        let addr = machine.local_addr();
        drop(machine);

        wait_until_closed(addr).await;
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_both_loops() {
        let log = MemoryEventLog::new();
        let mut config = MachineConfig::new(loopback(), vec![]);
        config.tick_rate = Some(TickRate::new(6).unwrap());
        config.event_log = EventLogTarget::Memory(log.clone());

        let machine = Machine::bind(config).await.unwrap();
        let addr = machine.local_addr();
        let mut handle = machine.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for_clock(LogicalTime(2)))
            .await
            .unwrap()
            .unwrap();
        drop(handle);

        wait_until_closed(addr).await;
        let settled = log.len();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(log.len(), settled);
    }

    #[tokio::test]
    async fn test_wait_for_clock_reports_stopped_loop() {
        let mut config = MachineConfig::new(loopback(), vec![]);
        config.tick_rate = Some(TickRate::new(6).unwrap());
        config.event_log = EventLogTarget::Memory(MemoryEventLog::new());

        let mut handle = Machine::bind(config).await.unwrap().start().await.unwrap();
        let id = handle.id();
        handle.request_stop();

        let waited =
            tokio::time::timeout(Duration::from_secs(5), handle.wait_for_clock(LogicalTime::MAX))
                .await
                .unwrap();
        assert!(matches!(waited, Err(ClockError::ClockStopped(p)) if p == id));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_peers_rejected_at_start() {
        let peer = {
            let listener = std::net::TcpListener::bind(loopback()).unwrap();
            PeerId::new(listener.local_addr().unwrap())
        };
        let mut config = MachineConfig::new(loopback(), vec![]);
        config.event_log = EventLogTarget::Memory(MemoryEventLog::new());

        let machine = Machine::bind(config).await.unwrap();
        let addr = machine.local_addr();
        let started = machine.with_peers(vec![peer, peer]).start().await;
        assert!(matches!(started, Err(ClockError::InvalidConfig(_))));

        wait_until_closed(addr).await;
    }
}
