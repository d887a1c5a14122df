//! The dead-man switch: a resettable deadline shared between the receive
//! path and one timer task. Both paths take the same lock before touching
//! the arbiter, so the armed→fatal transition happens exactly once no
//! matter how a late message races the timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::warn;

use hangwatch_wire::WireMessage;

use crate::arbiter::{Action, Arbiter};
use crate::escalate::FatalAction;
use crate::heuristics::ProcessTable;

struct Inner<T, F> {
    arbiter: Arbiter<T, F>,
    deadline: Option<Instant>,
}

pub struct Watch<T, F> {
    inner: Mutex<Inner<T, F>>,
    rearmed: Notify,
    timeout: Duration,
}

impl<T, F> Watch<T, F>
where
    T: ProcessTable + Send + 'static,
    F: FatalAction + 'static,
{
    pub fn new(arbiter: Arbiter<T, F>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                arbiter,
                deadline: None,
            }),
            rearmed: Notify::new(),
            timeout,
        })
    }

    /// The session's CPU count, for sizing the decode (0 while idle).
    pub async fn session_cpus(&self) -> u32 {
        self.inner.lock().await.arbiter.cpu_count()
    }

    /// Handle one inbound message under the shared lock. Returns true once
    /// the session is fatal and the receive loop should stop.
    pub async fn on_message(&self, msg: WireMessage) -> bool {
        let mut g = self.inner.lock().await;
        match g.arbiter.handle_message(msg) {
            Ok(Action::Rearm) => {
                g.deadline = Some(Instant::now() + self.timeout);
                self.rearmed.notify_one();
                false
            }
            Ok(Action::Fatal) => {
                g.deadline = None;
                self.rearmed.notify_one();
                true
            }
            Ok(Action::Ignored) => g.arbiter.is_fatal(),
            Err(e) => {
                // protocol errors never disturb the session state
                warn!(error = %e, "protocol error, message dropped");
                g.arbiter.is_fatal()
            }
        }
    }

    /// Run the timer side of the switch until the session goes fatal.
    pub fn spawn_timer(self: Arc<Self>) -> JoinHandle<()> {
        let watch = self;
        tokio::spawn(async move {
            loop {
                let deadline = {
                    let g = watch.inner.lock().await;
                    if g.arbiter.is_fatal() {
                        return;
                    }
                    g.deadline
                };
                match deadline {
                    // idle: nothing to time out until a session arms
                    None => watch.rearmed.notified().await,
                    Some(d) => {
                        tokio::select! {
                            _ = sleep_until(d) => {
                                let mut g = watch.inner.lock().await;
                                // a message may have moved the deadline
                                // while we slept on the old one
                                if g.deadline == Some(d) {
                                    g.arbiter.on_deadline();
                                    return;
                                }
                            }
                            _ = watch.rearmed.notified() => {}
                        }
                    }
                }
            }
        })
    }
}
