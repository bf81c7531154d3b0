/// Ranging session orchestrator: turns radio events into ranging requests.
///
/// Two triggers, one per radio role:
/// - **Scanner side**: a protocol payload seen while scanning, from the peer
///   the roster expects, becomes an initiator request using the peer's access
///   address and a short start delay so the responder can arm first.
/// - **Beacon side**: a scan request from a known peer becomes a responder
///   request using this node's own access address.
///
/// Requests are submitted fire-and-forget. The engine's result comes back
/// through [`Orchestrator::on_result`], which frees the session gate.
/// Every entry point is bounded and non-blocking.
use crate::gate::SessionGate;
use crate::peer::{PeerAddress, PeerDirectory};
use crate::ranging::{RangingEngine, RangingMode, RangingRequest, RangingResult, Role, SubmitError};
use crate::roster::{Admission, Restart, RosterScheduler, SchedulerState};
use crate::scanner::AdvParser;

/// Radio roles a node is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Scans and initiates against the roster
    Scanner,
    /// Advertises and responds to one configured initiator
    Beacon,
    /// Both; responds to any admitted peer
    Combined,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Scanner => "scanner",
            NodeRole::Beacon => "beacon",
            NodeRole::Combined => "combined",
        }
    }

    pub fn scans(&self) -> bool {
        matches!(self, NodeRole::Scanner | NodeRole::Combined)
    }

    pub fn advertises(&self) -> bool {
        matches!(self, NodeRole::Beacon | NodeRole::Combined)
    }
}

/// Runtime configuration. The host can adjust it without reflashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Whether radio events are turned into requests
    pub running: bool,
    pub mode: RangingMode,
    /// Start delay applied to initiator requests, microseconds
    pub initiator_start_delay_us: u32,
}

impl OrchestratorConfig {
    pub const fn new() -> Self {
        Self {
            running: true,
            mode: RangingMode::Mcpd,
            initiator_start_delay_us: crate::defaults::INITIATOR_START_DELAY_US,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Radio event delivered from the transport's callback context.
#[derive(Debug, Clone, Copy)]
pub enum RadioEvent<'a> {
    /// Advertisement or scan response received while scanning
    Advertisement {
        addr: PeerAddress,
        rssi: i8,
        data: &'a [u8],
    },
    /// Scan request received against our advertising set
    ScanRequest { addr: PeerAddress },
}

/// What the orchestrator did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Request accepted by the engine
    Dispatched(Role),
    /// Request refused by the engine; gate freed, no retry
    Rejected(SubmitError),
    /// Not relevant to this node right now
    Ignored,
    /// No valid ranging payload
    Malformed,
    /// Expected peer seen while a session is in flight
    Stalled { stalls: u8 },
    /// Responder trigger dropped because a session is in flight
    Busy,
    /// Stall threshold reached; restart invoked
    Restarting,
    /// Dispatch stopped by the host
    Paused,
}

/// Counters reported in status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub role: NodeRole,
    pub state: SchedulerState,
    pub cursor: usize,
    pub stalls: u8,
    pub peers: usize,
    pub sessions: u32,
    pub gate_held: bool,
}

pub struct Orchestrator<'g, const R: usize, const D: usize> {
    role: NodeRole,
    config: OrchestratorConfig,
    gate: &'g SessionGate,
    scheduler: RosterScheduler<R>,
    directory: PeerDirectory<D>,
    local_access_address: u32,
    /// The only initiator a stand-alone beacon responds to
    initiator: Option<PeerAddress>,
    sessions: u32,
}

impl<'g, const R: usize, const D: usize> Orchestrator<'g, R, D> {
    pub fn new(
        role: NodeRole,
        gate: &'g SessionGate,
        roster: [PeerAddress; R],
        stall_threshold: u8,
        local_access_address: u32,
    ) -> Self {
        let mut scheduler = RosterScheduler::new(roster, stall_threshold);
        if role.scans() {
            scheduler.start();
        }
        Self {
            role,
            config: OrchestratorConfig::new(),
            gate,
            scheduler,
            directory: PeerDirectory::new(),
            local_access_address,
            initiator: None,
            sessions: 0,
        }
    }

    /// Restrict a stand-alone beacon to one initiator.
    pub fn with_initiator(mut self, initiator: PeerAddress) -> Self {
        self.initiator = Some(initiator);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle one radio event synchronously.
    pub fn handle_event(
        &mut self,
        event: RadioEvent<'_>,
        engine: &impl RangingEngine,
        restart: &impl Restart,
    ) -> Outcome {
        if !self.config.running {
            return Outcome::Paused;
        }
        match event {
            RadioEvent::Advertisement { addr, rssi, data } if self.role.scans() => {
                self.on_advertisement(addr, rssi, data, engine, restart)
            }
            RadioEvent::ScanRequest { addr } if self.role.advertises() => {
                self.on_scan_request(addr, engine)
            }
            _ => Outcome::Ignored,
        }
    }

    fn on_advertisement(
        &mut self,
        addr: PeerAddress,
        rssi: i8,
        data: &[u8],
        engine: &impl RangingEngine,
        restart: &impl Restart,
    ) -> Outcome {
        let Some(payload) = AdvParser::ranging_payload(data) else {
            return Outcome::Malformed;
        };

        // Every valid observation refreshes the directory, in turn or not
        match self.directory.upsert(addr, Some(rssi)) {
            Ok(record) => record.access_address = payload.access_address,
            Err(e) => log::warn!("{}: {}", addr, e),
        }

        match self.scheduler.observe(&addr, self.gate, restart) {
            Admission::Admitted { slot } => {
                log::debug!("Roster slot {} admitted: {} ({} dBm)", slot, addr, rssi);
                let request = RangingRequest {
                    peer: addr,
                    role: Role::Initiator,
                    mode: self.config.mode,
                    access_address: payload.access_address,
                    start_delay_us: self.config.initiator_start_delay_us,
                };
                self.submit(&request, engine, true)
            }
            Admission::Ignored => Outcome::Ignored,
            Admission::Contended { stalls } => Outcome::Stalled { stalls },
            Admission::Restart => Outcome::Restarting,
        }
    }

    fn on_scan_request(&mut self, addr: PeerAddress, engine: &impl RangingEngine) -> Outcome {
        let known = match self.role {
            NodeRole::Combined => self.directory.supported(&addr),
            _ => self.initiator.is_some_and(|i| i.same_device(&addr)),
        };
        if !known {
            return Outcome::Ignored;
        }

        // Only a combined node shares the engine between both directions
        let gated = self.role == NodeRole::Combined;
        if gated && !self.gate.try_acquire() {
            return Outcome::Busy;
        }

        let request = RangingRequest {
            peer: addr,
            role: Role::Responder,
            mode: self.config.mode,
            access_address: self.local_access_address,
            start_delay_us: 0,
        };
        self.submit(&request, engine, gated)
    }

    fn submit(
        &mut self,
        request: &RangingRequest,
        engine: &impl RangingEngine,
        gated: bool,
    ) -> Outcome {
        match engine.submit(request) {
            Ok(()) => {
                self.sessions = self.sessions.wrapping_add(1);
                Outcome::Dispatched(request.role)
            }
            Err(e) => {
                log::warn!("{} request for {}: {}", request.role.as_str(), request.peer, e);
                if gated {
                    self.gate.release();
                }
                Outcome::Rejected(e)
            }
        }
    }

    /// Result callback from the ranging engine. Frees the session gate and
    /// records completed measurements. Returns true if the directory was
    /// updated.
    pub fn on_result(&mut self, result: &RangingResult) -> bool {
        self.gate.release();
        if !result.status {
            log::debug!("Ranging with {} failed", result.peer);
            return false;
        }
        self.directory.update_from_ranging_result(result)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut OrchestratorConfig {
        &mut self.config
    }

    pub fn directory(&self) -> &PeerDirectory<D> {
        &self.directory
    }

    pub fn scheduler(&self) -> &RosterScheduler<R> {
        &self.scheduler
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            role: self.role,
            state: self.scheduler.state(),
            cursor: self.scheduler.cursor(),
            stalls: self.scheduler.stall_count(),
            peers: self.directory.len(),
            sessions: self.sessions,
            gate_held: self.gate.is_held(),
        }
    }
}
