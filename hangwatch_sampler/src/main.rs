//! Entry point for the sampler tier: spawn sar, parse each cadence,
//! classify it, and report exactly one message per cadence to the arbiter.

use std::env;
use std::process::Stdio;

use anyhow::Context;
use once_cell::sync::OnceCell;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hangwatch_sampler::args::parse_args;
use hangwatch_sampler::channel::ArbiterLink;
use hangwatch_sampler::classify::Classifier;
use hangwatch_sampler::config;
use hangwatch_sampler::sar::SarStream;

/// SCHED_RR priority for the sampling loop, so it keeps getting scheduled
/// through the very hang it is watching for.
const SCHED_PRIORITY: i32 = 50;

/// With HANGWATCH_STRICT_PARSE=1 a failed cadence ends the sampler instead
/// of being skipped.
fn strict_parse() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        env::var("HANGWATCH_STRICT_PARSE")
            .map(|v| v != "0")
            .unwrap_or(false)
    })
}

fn set_realtime_priority(priority: i32) -> std::io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pid 0 targets the calling process; the param struct lives
    // across the call and the kernel copies it.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn detect_cpu_count() -> u32 {
    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
    );
    sys.cpus().len().max(1) as u32
}

fn spawn_sar(cmd: &str) -> anyhow::Result<Child> {
    // the command is a shell line (overridable), same contract as popen
    Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning metric source {cmd:?}"))
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };
    let cfg = config::load(parsed.config.as_deref());

    if let Err(e) = set_realtime_priority(SCHED_PRIORITY) {
        warn!(error = %e, "could not raise scheduling priority, staying best-effort");
    }

    let cpu_count = detect_cpu_count();
    let sock = config::socket_path(&cfg, parsed.sock);
    let link = ArbiterLink::connect(&sock, cpu_count)
        .await
        .with_context(|| format!("connecting to arbiter at {}", sock.display()))?;
    info!(cpu_count, sock = %sock.display(), "sampler session opened");

    let sar_cmd = parsed.sar.unwrap_or_else(|| config::sar_command(&cfg));
    let mut child = spawn_sar(&sar_cmd)?;
    let stdout = child.stdout.take().context("metric source has no stdout")?;
    let mut stream = SarStream::new(BufReader::new(stdout), cpu_count);
    stream.prime().await.context("reading metric source banner")?;

    let mut classifier = Classifier::new(cfg.thresholds.clone());
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("termination signal, shutting down");
                break;
            }
            snapshot = stream.next_snapshot() => match snapshot {
                Ok(Some(m)) => {
                    let msg = classifier.classify(&m);
                    debug!(classification = ?msg.classification(), "cadence classified");
                    if let Err(e) = link.send(&msg).await {
                        // transport errors never kill the loop; the arbiter's
                        // timer covers the gap
                        warn!(error = %e, "send to arbiter failed");
                    }
                }
                Ok(None) => {
                    warn!("metric source closed");
                    break;
                }
                Err(e) if strict_parse() => return Err(e).context("parsing cadence"),
                Err(e) => warn!(error = %e, "cadence discarded"),
            }
        }
    }

    child.start_kill().ok();
    Ok(())
}
