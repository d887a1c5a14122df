//! The arbiter state machine: canonical metrics copy, per-classification
//! confirmation rules, and the one-way trip to the fatal state.

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use hangwatch_wire::{Classification, MetricsSnapshot, WireMessage};

use crate::escalate::FatalAction;
use crate::heuristics::{memory_hog, ProcessTable, RuntimeTracker};

/// Arbiter-side thresholds. Deliberately harsher than the sampler's: the
/// sampler flags suspicion, the arbiter confirms it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// CPU confirm: sys at or above this while usr is at or below `usr_pct`.
    pub sys_pct: u32,
    pub usr_pct: u32,
    /// Memory confirm: any core's iowait at or above this.
    pub iowait_pct: u32,
    /// Process confirm: runnable at or above this times the CPU count.
    pub runnable_per_cpu: u32,
    /// Blocked-queue threshold shared by the memory and process confirms.
    pub blocked: u32,
    /// Memory confirm: free memory at or below this.
    pub memfree_kb: u32,
    /// Memory confirm: swap-out rate at or above this floor.
    pub swap_out_floor: u32,
    /// Memory-hog heuristic: single-process resident size.
    pub hog_resident_bytes: u64,
    /// Persistent-runtime heuristic: consecutive evaluations runnable.
    pub runnable_streak: u32,
    /// Always-runnable system daemon the runtime tracker must ignore.
    pub ignore_comm: String,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            sys_pct: 95,
            usr_pct: 1,
            iowait_pct: 90,
            runnable_per_cpu: 10,
            blocked: 10,
            memfree_kb: 20_480,
            swap_out_floor: 0,
            hog_resident_bytes: 900_000,
            runnable_streak: 5,
            ignore_comm: "adbd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No sampler session, no timer.
    Idle,
    /// Session open, dead-man switch running.
    Armed,
    /// Terminal; escalation has fired.
    Fatal,
}

/// Why the arbiter went fatal, logged for post-mortem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangReason {
    /// A core pegged in sys time with no user progress.
    CpuSaturated,
    /// Swapping hard with no free memory and a core stuck in iowait.
    MemoryExhausted,
    /// Blocked queue over threshold with a single-process resident hog.
    MemoryHog,
    /// Run and blocked queues both flooded.
    RunQueueFlooded,
    /// One process stayed runnable across consecutive evaluations.
    PersistentRunnable,
    /// The dead-man switch elapsed with no message at all.
    SamplerSilent,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("HELLO while a sampler session is already armed")]
    DuplicateHello,
    #[error("{0:?} received before HELLO")]
    NotArmed(Classification),
    #[error("per-cpu payload for {got} cpus does not match the {want}-cpu session")]
    CpuCountMismatch { got: u32, want: u32 },
}

/// What the caller owes the timer after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Session alive: reset the dead-man switch.
    Rearm,
    /// Hang confirmed; escalation has already run.
    Fatal,
    /// Dropped (the fatal state processes nothing).
    Ignored,
}

pub struct Arbiter<T, F> {
    phase: Phase,
    metrics: MetricsSnapshot,
    thresholds: Thresholds,
    tracker: RuntimeTracker,
    table: T,
    fatal: F,
}

impl<T: ProcessTable, F: FatalAction> Arbiter<T, F> {
    pub fn new(thresholds: Thresholds, table: T, fatal: F) -> Self {
        let tracker =
            RuntimeTracker::new(thresholds.runnable_streak, thresholds.ignore_comm.clone());
        Self {
            phase: Phase::Idle,
            metrics: MetricsSnapshot::sized(0),
            thresholds,
            tracker,
            table,
            fatal,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_armed(&self) -> bool {
        self.phase == Phase::Armed
    }

    pub fn is_fatal(&self) -> bool {
        self.phase == Phase::Fatal
    }

    /// The session's CPU count; 0 until a HELLO armed the session.
    pub fn cpu_count(&self) -> u32 {
        self.metrics.cpu_count
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    /// Process one decoded message. Protocol errors leave every piece of
    /// state exactly as it was.
    pub fn handle_message(&mut self, msg: WireMessage) -> Result<Action, ProtocolError> {
        if self.phase == Phase::Fatal {
            return Ok(Action::Ignored);
        }
        match msg {
            WireMessage::Hello { cpu_count } => {
                if self.phase == Phase::Armed {
                    return Err(ProtocolError::DuplicateHello);
                }
                // the one and only per-CPU allocation for this session
                self.metrics = MetricsSnapshot::sized(cpu_count as u32);
                self.phase = Phase::Armed;
                info!(cpu_count, "sampler session armed");
                Ok(Action::Rearm)
            }
            other if self.phase == Phase::Idle => {
                Err(ProtocolError::NotArmed(other.classification()))
            }
            WireMessage::Heartbeat => Ok(Action::Rearm),
            WireMessage::CpuError { per_cpu } => {
                self.check_core_count(per_cpu.len())?;
                for (slot, s) in self.metrics.per_cpu.iter_mut().zip(&per_cpu) {
                    slot.sys = s.sys as u32;
                    slot.usr = s.usr as u32;
                }
                if self.cpu_confirmed() {
                    return Ok(self.go_fatal(HangReason::CpuSaturated));
                }
                Ok(Action::Rearm)
            }
            WireMessage::MemError {
                iowait,
                blocked,
                swap_out,
                free_kb,
            } => {
                self.check_core_count(iowait.len())?;
                for (slot, w) in self.metrics.per_cpu.iter_mut().zip(&iowait) {
                    slot.iowait = *w as u32;
                }
                self.metrics.blocked_count = blocked as u32;
                self.metrics.swap_out_rate = swap_out as u32;
                self.metrics.free_memory_kb = free_kb;
                if let Some(reason) = self.mem_confirmed() {
                    return Ok(self.go_fatal(reason));
                }
                Ok(Action::Rearm)
            }
            WireMessage::ProcError { runnable, blocked } => {
                self.metrics.runnable_count = runnable as u32;
                self.metrics.blocked_count = blocked as u32;
                if let Some(reason) = self.proc_confirmed() {
                    return Ok(self.go_fatal(reason));
                }
                Ok(Action::Rearm)
            }
        }
    }

    /// The dead-man switch elapsed without a message.
    pub fn on_deadline(&mut self) -> Action {
        if self.phase != Phase::Armed {
            return Action::Ignored;
        }
        warn!("no sampler message within the timeout");
        self.go_fatal(HangReason::SamplerSilent)
    }

    fn check_core_count(&self, got: usize) -> Result<(), ProtocolError> {
        if got as u32 != self.metrics.cpu_count {
            return Err(ProtocolError::CpuCountMismatch {
                got: got as u32,
                want: self.metrics.cpu_count,
            });
        }
        Ok(())
    }

    fn cpu_confirmed(&self) -> bool {
        let t = &self.thresholds;
        self.metrics
            .per_cpu
            .iter()
            .any(|c| c.usr <= t.usr_pct && c.sys >= t.sys_pct)
    }

    fn mem_confirmed(&mut self) -> Option<HangReason> {
        let m = &self.metrics;
        let t = &self.thresholds;
        if m.swap_out_rate >= t.swap_out_floor
            && m.free_memory_kb <= t.memfree_kb
            && m.per_cpu.iter().any(|c| c.iowait >= t.iowait_pct)
        {
            return Some(HangReason::MemoryExhausted);
        }
        if self.metrics.blocked_count >= self.thresholds.blocked
            && memory_hog(&mut self.table, self.thresholds.hog_resident_bytes)
        {
            return Some(HangReason::MemoryHog);
        }
        None
    }

    fn proc_confirmed(&mut self) -> Option<HangReason> {
        let m = &self.metrics;
        let t = &self.thresholds;
        if m.runnable_count >= t.runnable_per_cpu * m.cpu_count && m.blocked_count >= t.blocked {
            return Some(HangReason::RunQueueFlooded);
        }
        // ambiguous: the tracker gets the deciding vote
        if self.tracker.persistent_runnable(&mut self.table) {
            return Some(HangReason::PersistentRunnable);
        }
        None
    }

    fn go_fatal(&mut self, reason: HangReason) -> Action {
        self.phase = Phase::Fatal;
        self.fatal.escalate(reason);
        Action::Fatal
    }
}
