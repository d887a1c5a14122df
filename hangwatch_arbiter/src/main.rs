//! Entry point for the arbiter tier: bind the channel, arm the dead-man
//! switch on handshake, confirm or clear every classification the sampler
//! reports, and force a restart the moment a hang is confirmed.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hangwatch_arbiter::arbiter::Arbiter;
use hangwatch_arbiter::args::parse_args;
use hangwatch_arbiter::channel::SamplerChannel;
use hangwatch_arbiter::config;
use hangwatch_arbiter::deadman::Watch;
use hangwatch_arbiter::escalate::{FatalAction, SysrqCrash};
use hangwatch_arbiter::heuristics::{LiveProcessTable, ProcessTable};
use hangwatch_wire::WireMessage;

async fn serve<T, F>(watch: Arc<Watch<T, F>>, mut chan: SamplerChannel)
where
    T: ProcessTable + Send + 'static,
    F: FatalAction + 'static,
{
    loop {
        let cpus = watch.session_cpus().await;
        let frame = match chan.recv().await {
            Ok(f) => f,
            Err(e) => {
                // from here until the next good datagram the dead-man
                // switch alone guards the session
                warn!(error = %e, "channel receive failed");
                continue;
            }
        };
        let msg = match WireMessage::decode(frame, cpus) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed datagram dropped");
                continue;
            }
        };
        if watch.on_message(msg).await {
            return;
        }
    }
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

    let sock = config::socket_path(&cfg, parsed.sock);
    let chan = SamplerChannel::bind(&sock)
        .with_context(|| format!("binding arbiter socket at {}", sock.display()))?;
    info!(sock = %sock.display(), "arbiter listening");

    let arbiter = Arbiter::new(cfg.thresholds.clone(), LiveProcessTable::new(), SysrqCrash);
    let watch = Watch::new(arbiter, config::timeout(&cfg));
    let timer = Arc::clone(&watch).spawn_timer();

    tokio::select! {
        _ = serve(Arc::clone(&watch), chan) => {
            // only reachable if escalation returned, i.e. no sysrq
            warn!("session ended fatal");
        }
        _ = shutdown_signal() => {
            info!("termination signal, shutting down");
        }
    }

    // teardown: the channel drop removes the socket file, aborting the
    // timer task releases the deadline
    timer.abort();
    Ok(())
}
