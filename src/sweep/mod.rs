//! Fleet-wide expiry sweep.
//!
//! An external scheduler calls [`PresenceHub::auto_leave_all`] on a fixed
//! period (roughly half the presence timeout). The sweep enumerates the
//! persistent channel registry and expires each channel in turn. Because
//! every per-channel mutation is idempotent and lock-guarded, redundant or
//! concurrent sweeps from multiple scheduler instances are safe; no leader
//! election is needed.

use crate::error::PresenceError;
use crate::hub::PresenceHub;

/// Outcome of one [`auto_leave_all`](PresenceHub::auto_leave_all) pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Channels whose expiry pass completed.
    pub swept: usize,
    /// Channels that errored; each is logged and the rest still run.
    pub failed: usize,
    /// Registry names dropped because their config no longer resolves.
    pub pruned: usize,
}

impl PresenceHub {
    /// Expire stale entries in every registered channel.
    ///
    /// A failure in one channel never aborts the sweep of the others. A
    /// registered name that no longer resolves to a config is pruned from
    /// the registry; resolvable-but-empty channels stay registered.
    pub async fn auto_leave_all(&self) -> Result<SweepReport, PresenceError> {
        let names = self.store.registered_channels().await?;
        let mut report = SweepReport::default();

        for name in names {
            match self.channel(&name) {
                Ok(channel) => match channel.auto_leave().await {
                    Ok(()) => report.swept += 1,
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(channel = %name, error = %err, "channel sweep failed");
                    }
                },
                Err(PresenceError::NotFound(_)) => {
                    // Dead registry weight: the feature that owned this
                    // prefix is gone or the resolver now declines the name.
                    match self.store.deregister_channel(&name).await {
                        Ok(()) => report.pruned += 1,
                        Err(err) => {
                            report.failed += 1;
                            tracing::warn!(
                                channel = %name,
                                error = %err,
                                "failed to prune channel registration"
                            );
                        }
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(channel = %name, error = %err, "channel sweep failed");
                }
            }
        }

        Ok(report)
    }
}
