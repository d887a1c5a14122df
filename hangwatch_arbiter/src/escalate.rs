//! Unrecoverable escalation on a confirmed hang.

use crate::arbiter::HangReason;

/// What to do once a hang is confirmed. Fired exactly once, on entry to the
/// fatal state.
pub trait FatalAction: Send {
    fn escalate(&mut self, reason: HangReason);
}

/// Forces an immediate kernel crash via sysrq so the platform comes back
/// through a full restart. Needs the privileges the arbiter tier runs with.
pub struct SysrqCrash;

impl FatalAction for SysrqCrash {
    fn escalate(&mut self, reason: HangReason) {
        tracing::error!(?reason, "hang confirmed, forcing restart");
        if std::fs::write("/proc/sysrq-trigger", b"c").is_err() {
            // no sysrq available: die loudly and let the platform
            // supervisor restart the device
            std::process::abort();
        }
    }
}
