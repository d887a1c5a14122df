//! Hysteresis and precedence behavior of the cadence classifier.

use hangwatch_sampler::classify::{Classifier, Thresholds};
use hangwatch_wire::{Classification, MetricsSnapshot, WireMessage};

/// A comfortably healthy 2-core snapshot.
fn clean() -> MetricsSnapshot {
    let mut m = MetricsSnapshot::sized(2);
    for c in &mut m.per_cpu {
        c.usr = 20;
        c.sys = 10;
        c.iowait = 0;
    }
    m.context_switch_rate = 400;
    m.swap_out_rate = 0;
    m.free_memory_kb = 200_000;
    m.runnable_count = 1;
    m.blocked_count = 0;
    m
}

fn cpu_loaded() -> MetricsSnapshot {
    let mut m = clean();
    m.per_cpu[0].sys = 60;
    m.per_cpu[0].usr = 2;
    m
}

fn kind(c: &mut Classifier, m: &MetricsSnapshot) -> Classification {
    c.classify(m).classification()
}

#[test]
fn cpu_error_needs_three_consecutive_strikes() {
    let mut c = Classifier::new(Thresholds::default());
    let m = cpu_loaded();
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::CpuError);
    // the condition persisting keeps the classification coming
    assert_eq!(kind(&mut c, &m), Classification::CpuError);
}

#[test]
fn an_intervening_clean_cadence_resets_the_cpu_streak() {
    let mut c = Classifier::new(Thresholds::default());
    let m = cpu_loaded();
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &clean()), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::None);
}

#[test]
fn iowait_fires_immediately_without_hysteresis() {
    let mut c = Classifier::new(Thresholds::default());
    let mut m = clean();
    m.per_cpu[1].iowait = 80;
    assert_eq!(kind(&mut c, &m), Classification::CpuError);
}

#[test]
fn mem_error_follows_the_same_three_strike_rule() {
    let mut c = Classifier::new(Thresholds::default());
    let mut m = clean();
    m.free_memory_kb = 29_000;
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::MemError);

    // reset on recovery, then the count starts over
    assert_eq!(kind(&mut c, &clean()), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::None);
}

#[test]
fn proc_error_fires_on_the_first_cadence() {
    let mut c = Classifier::new(Thresholds::default());
    let mut m = clean();
    m.runnable_count = 9; // > 4 * 2 cpus
    assert_eq!(kind(&mut c, &m), Classification::ProcError);

    let mut c = Classifier::new(Thresholds::default());
    let mut m = clean();
    m.context_switch_rate = 10; // < 25 * 2 cpus
    assert_eq!(kind(&mut c, &m), Classification::ProcError);
}

#[test]
fn healthy_cadences_emit_heartbeats() {
    let mut c = Classifier::new(Thresholds::default());
    assert_eq!(
        c.classify(&clean()),
        WireMessage::Heartbeat,
        "nothing fired, heartbeat expected"
    );
}

#[test]
fn simultaneous_anomalies_send_one_message_by_precedence() {
    // everything fires at once: CPU wins
    let mut c = Classifier::new(Thresholds::default());
    let mut m = cpu_loaded();
    m.free_memory_kb = 29_000;
    m.runnable_count = 9;
    assert_eq!(kind(&mut c, &m), Classification::ProcError); // cpu+mem still counting
    assert_eq!(kind(&mut c, &m), Classification::ProcError);
    assert_eq!(kind(&mut c, &m), Classification::CpuError);

    // memory beats process once its streak is up
    let mut c = Classifier::new(Thresholds::default());
    let mut m = clean();
    m.free_memory_kb = 29_000;
    m.runnable_count = 9;
    assert_eq!(kind(&mut c, &m), Classification::ProcError);
    assert_eq!(kind(&mut c, &m), Classification::ProcError);
    assert_eq!(kind(&mut c, &m), Classification::MemError);
}

#[test]
fn streaks_keep_counting_while_a_higher_class_emits() {
    // CPU emits from cadence 3; memory's own streak must ripen in parallel
    // and take over the moment the CPU condition clears.
    let mut c = Classifier::new(Thresholds::default());
    let mut m = cpu_loaded();
    m.free_memory_kb = 29_000;
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::None);
    assert_eq!(kind(&mut c, &m), Classification::CpuError);
    let mut m = clean();
    m.free_memory_kb = 29_000;
    assert_eq!(kind(&mut c, &m), Classification::MemError);
}
