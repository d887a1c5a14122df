//! Process-table corroboration checks, run synchronously while handling a
//! message. Scans work on a point-in-time snapshot of the table, so the
//! rest of the system is never blocked and a process vanishing mid-scan is
//! simply absent from the snapshot.

use std::collections::HashMap;

use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// One process as seen by a table scan.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub runnable: bool,
    pub resident_bytes: u64,
}

/// Read-side view of the live process table.
pub trait ProcessTable {
    fn scan(&mut self) -> Vec<ProcessRecord>;
    /// Pid of the scanning process itself, excluded from runtime tracking.
    fn own_pid(&self) -> u32;
}

pub struct LiveProcessTable {
    sys: System,
}

impl LiveProcessTable {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for LiveProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for LiveProcessTable {
    fn scan(&mut self) -> Vec<ProcessRecord> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true, // drop processes that exited since the last scan
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.sys
            .processes()
            .values()
            .map(|p| ProcessRecord {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                runnable: matches!(p.status(), ProcessStatus::Run),
                resident_bytes: p.memory(),
            })
            .collect()
    }

    fn own_pid(&self) -> u32 {
        std::process::id()
    }
}

/// True if any single process's resident size is at or above the threshold.
pub fn memory_hog<T: ProcessTable>(table: &mut T, resident_threshold: u64) -> bool {
    table
        .scan()
        .iter()
        .any(|p| p.resident_bytes >= resident_threshold)
}

/// Tracks how many consecutive check invocations each process has stayed
/// runnable. An entry lives exactly as long as its process remains runnable
/// across invocations; one non-runnable observation drops it.
pub struct RuntimeTracker {
    streaks: HashMap<u32, u32>,
    streak_cadences: u32,
    ignore_comm: String,
}

impl RuntimeTracker {
    pub fn new(streak_cadences: u32, ignore_comm: impl Into<String>) -> Self {
        Self {
            streaks: HashMap::new(),
            streak_cadences,
            ignore_comm: ignore_comm.into(),
        }
    }

    /// One invocation of the persistent-runtime check: sweep the tracked
    /// set first, then adopt newly runnable processes. Fires on the Nth
    /// consecutive invocation that found the same process runnable, where
    /// N is the configured streak.
    pub fn persistent_runnable<T: ProcessTable>(&mut self, table: &mut T) -> bool {
        let own = table.own_pid();
        let procs = table.scan();
        let runnable: HashMap<u32, &ProcessRecord> = procs
            .iter()
            .filter(|p| p.runnable)
            .map(|p| (p.pid, p))
            .collect();

        self.streaks.retain(|pid, _| runnable.contains_key(pid));
        for streak in self.streaks.values_mut() {
            *streak += 1;
            if *streak >= self.streak_cadences {
                return true;
            }
        }

        for p in runnable.values() {
            if p.pid == own || p.name == self.ignore_comm {
                continue;
            }
            // first observation counts: a streak starts at 1
            self.streaks.entry(p.pid).or_insert(1);
        }
        false
    }
}
