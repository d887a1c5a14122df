//! Threshold classification with hysteresis. One decision per cadence.

use hangwatch_wire::{MetricsSnapshot, WireMessage};
use serde::Deserialize;

/// Sampler-side thresholds. Defaults are the deployed values; a config file
/// may override any subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// CPU class: sys above this…
    pub sys_pct: u32,
    /// …while usr is below this, on any single core.
    pub usr_pct: u32,
    /// CPU class, no hysteresis: any core's iowait above this.
    pub iowait_pct: u32,
    /// Process class: runnable count above this times the CPU count.
    pub runnable_per_cpu: u32,
    /// Process class: context-switch rate below this times the CPU count.
    pub cswch_per_cpu: u32,
    /// Memory class: free memory below this.
    pub memfree_kb: u32,
    /// Consecutive satisfying cadences required before the CPU and memory
    /// classes emit (the 3-strike rule at the default of 2).
    pub strike_cadences: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            sys_pct: 50,
            usr_pct: 4,
            iowait_pct: 50,
            runnable_per_cpu: 4,
            cswch_per_cpu: 25,
            memfree_kb: 30_720,
            strike_cadences: 2,
        }
    }
}

/// Debounced classifier. The two streak counters persist across cadences
/// and reset whenever their condition is not observed.
pub struct Classifier {
    thresholds: Thresholds,
    cpu_streak: u32,
    mem_streak: u32,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            cpu_streak: 0,
            mem_streak: 0,
        }
    }

    /// Evaluate one cadence. All three classes are checked and both streak
    /// counters updated every time; exactly one message comes back, with
    /// CPU > MEM > PROC precedence and a heartbeat when nothing fired.
    pub fn classify(&mut self, m: &MetricsSnapshot) -> WireMessage {
        let t = &self.thresholds;

        let sys_usr = m
            .per_cpu
            .iter()
            .any(|c| c.sys > t.sys_pct && c.usr < t.usr_pct);
        let mut cpu_fires = m.per_cpu.iter().any(|c| c.iowait > t.iowait_pct);
        if sys_usr {
            if self.cpu_streak >= t.strike_cadences {
                cpu_fires = true;
            } else {
                self.cpu_streak += 1;
            }
        } else {
            self.cpu_streak = 0;
        }

        let mut mem_fires = false;
        if m.free_memory_kb < t.memfree_kb {
            if self.mem_streak >= t.strike_cadences {
                mem_fires = true;
            } else {
                self.mem_streak += 1;
            }
        } else {
            self.mem_streak = 0;
        }

        let proc_fires = m.runnable_count > t.runnable_per_cpu * m.cpu_count
            || m.context_switch_rate < t.cswch_per_cpu * m.cpu_count;

        if cpu_fires {
            WireMessage::cpu_error(m)
        } else if mem_fires {
            WireMessage::mem_error(m)
        } else if proc_fires {
            WireMessage::proc_error(m)
        } else {
            WireMessage::Heartbeat
        }
    }
}
