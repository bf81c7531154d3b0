/// Round-robin roster scheduler with stall watchdog.
///
/// The scheduler walks a fixed, ordered roster of peers. A peer is only
/// admitted for ranging when it is the one the cursor expects *and* the
/// session gate is free; peers seen out of order are dropped so every roster
/// entry gets the same share of airtime.
///
/// Seeing the expected peer while the gate is still held means the previous
/// session has not completed. After `threshold` such cycles in a row the
/// ranging engine is considered wedged and the node is cold-restarted. That
/// transition is terminal.
use crate::gate::SessionGate;
use crate::peer::PeerAddress;

/// Irreversible whole-node restart.
///
/// On hardware this never returns. Implementations used in tests record the
/// call instead.
pub trait Restart {
    fn cold_restart(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started; observations are ignored
    Idle,
    /// Waiting for `roster[cursor]`
    AwaitingPeer,
    /// Stall threshold reached, restart requested
    Stalled,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::AwaitingPeer => "awaiting",
            SchedulerState::Stalled => "stalled",
        }
    }
}

/// Result of offering one observed address to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Expected peer, gate acquired by this call. `slot` is the roster index
    /// that was admitted.
    Admitted { slot: usize },
    /// Not the expected peer, or the scheduler is not running
    Ignored,
    /// Expected peer but a session is still in flight
    Contended { stalls: u8 },
    /// Stall threshold reached on this call; restart was invoked
    Restart,
}

pub struct RosterScheduler<const N: usize> {
    roster: [PeerAddress; N],
    cursor: usize,
    stall_count: u8,
    threshold: u8,
    state: SchedulerState,
}

impl<const N: usize> RosterScheduler<N> {
    pub const fn new(roster: [PeerAddress; N], threshold: u8) -> Self {
        Self {
            roster,
            cursor: 0,
            stall_count: 0,
            threshold,
            state: SchedulerState::Idle,
        }
    }

    /// Begin waiting for the first roster entry. No effect once stalled.
    pub fn start(&mut self) {
        if self.state == SchedulerState::Idle {
            self.cursor = 0;
            self.stall_count = 0;
            self.state = SchedulerState::AwaitingPeer;
        }
    }

    /// Offer an observed peer address.
    ///
    /// Addresses are compared by their 48 bits only; the type tag is not
    /// part of the roster match.
    pub fn observe(
        &mut self,
        address: &PeerAddress,
        gate: &SessionGate,
        restart: &impl Restart,
    ) -> Admission {
        if self.state != SchedulerState::AwaitingPeer {
            return Admission::Ignored;
        }

        let Some(expected) = self.roster.get(self.cursor) else {
            return Admission::Ignored;
        };
        if !expected.same_device(address) {
            return Admission::Ignored;
        }

        if !gate.try_acquire() {
            self.stall_count = self.stall_count.saturating_add(1);
            if self.stall_count >= self.threshold {
                self.state = SchedulerState::Stalled;
                log::error!(
                    "No ranging progress for {} cycles (waiting on {}), restarting",
                    self.stall_count,
                    address
                );
                restart.cold_restart();
                return Admission::Restart;
            }
            log::debug!("Gate held, stall {}/{}", self.stall_count, self.threshold);
            return Admission::Contended {
                stalls: self.stall_count,
            };
        }

        let slot = self.cursor;
        self.cursor = if slot + 1 < N { slot + 1 } else { 0 };
        self.stall_count = 0;
        Admission::Admitted { slot }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn stall_count(&self) -> u8 {
        self.stall_count
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Peer the scheduler is waiting for.
    pub fn expected(&self) -> Option<&PeerAddress> {
        match self.state {
            SchedulerState::AwaitingPeer => self.roster.get(self.cursor),
            _ => None,
        }
    }
}
