//! Cluster bootstrap - full mesh of machines in one process
//!
//! Startup is a two-phase handshake: every machine binds its receiver
//! first, and only then does any machine open outbound links and start
//! its clock loop. No machine can send before all peers are listening.

use clockmesh_core::{ClockResult, PeerId};

use crate::{ClusterConfig, EventLogTarget, Machine, MachineHandle, MachineReport, MemoryEventLog};

/// Running cluster
pub struct Cluster {
    machines: Vec<MachineHandle>,
    logs: Vec<Option<MemoryEventLog>>,
}

impl Cluster {
    pub async fn launch(config: ClusterConfig) -> ClockResult<Self> {
        config.validate()?;
        let configs = config.machine_configs();

        // Phase 1: every receiver listening
        let mut bound = Vec::with_capacity(configs.len());
        let mut logs = Vec::with_capacity(configs.len());
        for machine_config in configs {
            logs.push(match &machine_config.event_log {
                EventLogTarget::Memory(log) => Some(log.clone()),
                EventLogTarget::File(_) => None,
            });
            match Machine::bind(machine_config).await {
                Ok(machine) => bound.push(machine),
                Err(e) => {
                    shutdown_bound(bound).await;
                    return Err(e);
                }
            }
        }
        let ids: Vec<PeerId> = bound.iter().map(Machine::id).collect();
        tracing::info!(machines = ids.len(), "all receivers listening");

        // Phase 2: links and clock loops
        let mut bound = bound.into_iter().enumerate();
        let mut machines = Vec::with_capacity(ids.len());
        while let Some((index, machine)) = bound.next() {
            let peers = ids
                .iter()
                .copied()
                .filter(|&peer| peer != ids[index])
                .collect();
            match machine.with_peers(peers).start().await {
                Ok(handle) => machines.push(handle),
                Err(e) => {
                    shutdown_bound(bound.map(|(_, m)| m).collect()).await;
                    for handle in machines {
                        let _ = handle.shutdown().await;
                    }
                    return Err(e);
                }
            }
        }

        Ok(Cluster { machines, logs })
    }

    pub fn machines(&self) -> &[MachineHandle] {
        &self.machines
    }

    /// In-memory event log of the machine at `index`, if it uses one
    pub fn memory_log(&self, index: usize) -> Option<&MemoryEventLog> {
        self.logs.get(index).and_then(Option::as_ref)
    }

    /// Stop every machine; reports are in launch order.
    ///
    /// All clock loops stop before any receiver does, so no machine sends
    /// to a peer that has already closed its connections.
    pub async fn shutdown(self) -> ClockResult<Vec<MachineReport>> {
        for handle in &self.machines {
            handle.request_stop();
        }

        let mut reports = Vec::with_capacity(self.machines.len());
        let mut receivers = Vec::with_capacity(self.machines.len());
        let mut first_error = None;
        for handle in self.machines {
            match handle.stop_clock().await {
                Ok((report, receiver)) => {
                    reports.push(report);
                    receivers.push(receiver);
                }
                Err(e) => {
                    tracing::error!(error = %e, "clock loop did not stop cleanly");
                    first_error.get_or_insert(e);
                }
            }
        }
        for receiver in receivers {
            if let Err(e) = receiver.stop().await {
                tracing::error!(error = %e, "receiver shutdown failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

async fn shutdown_bound(machines: Vec<Machine>) {
    for machine in machines {
        let id = machine.id();
        if let Err(e) = machine.shutdown().await {
            tracing::warn!(machine = %id, error = %e, "receiver shutdown failed");
        }
    }
}
