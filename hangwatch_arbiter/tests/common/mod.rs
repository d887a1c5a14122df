//! Synthetic process tables and a recording escalation for the tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hangwatch_arbiter::arbiter::{Arbiter, HangReason, Thresholds};
use hangwatch_arbiter::deadman::Watch;
use hangwatch_arbiter::escalate::FatalAction;
use hangwatch_arbiter::heuristics::{ProcessRecord, ProcessTable};

pub fn rec(pid: u32, name: &str, runnable: bool, resident_bytes: u64) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: name.to_string(),
        runnable,
        resident_bytes,
    }
}

/// A process table the test can mutate between messages.
#[derive(Clone, Default)]
pub struct FakeTable {
    pub procs: Arc<Mutex<Vec<ProcessRecord>>>,
    pub own: u32,
}

impl FakeTable {
    pub fn with(procs: Vec<ProcessRecord>) -> Self {
        Self {
            procs: Arc::new(Mutex::new(procs)),
            own: 1,
        }
    }

    pub fn set(&self, procs: Vec<ProcessRecord>) {
        *self.procs.lock().unwrap() = procs;
    }
}

impl ProcessTable for FakeTable {
    fn scan(&mut self) -> Vec<ProcessRecord> {
        self.procs.lock().unwrap().clone()
    }

    fn own_pid(&self) -> u32 {
        self.own
    }
}

/// Records every escalation instead of crashing the box.
#[derive(Clone, Default)]
pub struct RecordingFatal {
    pub fired: Arc<Mutex<Vec<HangReason>>>,
}

impl FatalAction for RecordingFatal {
    fn escalate(&mut self, reason: HangReason) {
        self.fired.lock().unwrap().push(reason);
    }
}

pub type TestArbiter = Arbiter<FakeTable, RecordingFatal>;

pub fn arbiter_with(table: FakeTable) -> (TestArbiter, Arc<Mutex<Vec<HangReason>>>) {
    let fatal = RecordingFatal::default();
    let fired = fatal.fired.clone();
    (Arbiter::new(Thresholds::default(), table, fatal), fired)
}

pub fn watch_with(
    table: FakeTable,
    timeout: Duration,
) -> (
    Arc<Watch<FakeTable, RecordingFatal>>,
    Arc<Mutex<Vec<HangReason>>>,
) {
    let (arbiter, fired) = arbiter_with(table);
    (Watch::new(arbiter, timeout), fired)
}
