// ── Connection watchdog ──
//
// Periodically probes gateway liveness and, when enabled, drives
// session recovery with exponential backoff. One probe is in flight at
// a time; the next is scheduled only after the previous one answered.
// Consumers follow the state through a broadcast event stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchdogOptions;
use crate::error::CoreError;

const EVENT_CHANNEL_SIZE: usize = 64;

/// Backoff exponents are capped so delays stay bounded however long an
/// outage lasts.
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// What the watchdog needs from the connection it guards.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// A single liveness probe. `false` means no answer in time.
    async fn ping(&self) -> bool;

    /// Discard the session so the next use re-negotiates it.
    async fn drop_session(&self);
}

/// Observable watchdog state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogEvent {
    PingSucceeded,
    PingFailed { consecutive: u32 },
    /// The gateway answered after being dead or of unknown state.
    ConnectionAlive,
    /// The gateway stopped answering (first failure after life).
    ConnectionLost,
    /// The failed-ping threshold was crossed.
    Offline,
    /// A reconnect was triggered. `attempt` counts from 1.
    Reconnecting { attempt: u32, maximum: Option<u32> },
    /// The maximum number of reconnects is exhausted; the watchdog
    /// keeps probing but stops touching the session.
    GiveUp,
}

/// Watches a connection and reconnects it when it dies.
pub struct ConnectionWatchdog {
    probe: Arc<dyn LivenessProbe>,
    options: WatchdogOptions,
    event_tx: broadcast::Sender<WatchdogEvent>,
    task: Mutex<Option<WatchdogTask>>,
}

struct WatchdogTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ConnectionWatchdog {
    /// Build a watchdog over `probe`. Options are validated here, so a
    /// misconfigured watchdog is never constructed.
    pub fn new(
        probe: Arc<dyn LivenessProbe>,
        options: WatchdogOptions,
    ) -> Result<Self, CoreError> {
        options.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Ok(Self {
            probe,
            options,
            event_tx,
            task: Mutex::new(None),
        })
    }

    /// Subscribe to watchdog events.
    pub fn events(&self) -> broadcast::Receiver<WatchdogEvent> {
        self.event_tx.subscribe()
    }

    /// Start the probe cycle. Errors if already running.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut slot = self.task.lock().await;
        if slot.is_some() {
            return Err(CoreError::WatchdogRunning);
        }

        let cancel = CancellationToken::new();
        let cycle = Cycle {
            probe: self.probe.clone(),
            options: self.options.clone(),
            event_tx: self.event_tx.clone(),
            state: CycleState::default(),
        };
        let handle = tokio::spawn(cycle.run(cancel.clone()));
        *slot = Some(WatchdogTask { cancel, handle });
        info!(
            interval_ms = self.options.ping_interval.as_millis() as u64,
            "watchdog started"
        );
        Ok(())
    }

    /// Stop the probe cycle. Cancels the pending timer; a probe already
    /// in flight completes first. Idempotent.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        task.cancel.cancel();
        let _ = task.handle.await;
        debug!("watchdog stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.try_lock().map(|slot| slot.is_some()).unwrap_or(true)
    }
}

// ── Probe cycle ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CycleState {
    /// `None` until the very first probe answers either way.
    known_alive: Option<bool>,
    consecutive_failures: u32,
    /// Failed pings accumulated while offline, towards the next
    /// reconnect trigger.
    offline_pings: u32,
    reconnect_attempts: u32,
}

struct Cycle {
    probe: Arc<dyn LivenessProbe>,
    options: WatchdogOptions,
    event_tx: broadcast::Sender<WatchdogEvent>,
    state: CycleState,
}

impl Cycle {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let delay = self.probe_once().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One probe plus bookkeeping; returns the delay until the next.
    async fn probe_once(&mut self) -> Duration {
        if self.probe.ping().await {
            self.ping_succeeded();
            return self.options.ping_interval;
        }
        self.ping_failed().await
    }

    fn ping_succeeded(&mut self) {
        if self.state.known_alive != Some(true) {
            self.emit(WatchdogEvent::ConnectionAlive);
        }
        // Full counter reset: the connection recovered.
        self.state = CycleState {
            known_alive: Some(true),
            ..CycleState::default()
        };
        self.emit(WatchdogEvent::PingSucceeded);
    }

    async fn ping_failed(&mut self) -> Duration {
        let was_alive = self.state.known_alive == Some(true);
        self.state.known_alive = Some(false);
        self.state.consecutive_failures += 1;
        let failures = self.state.consecutive_failures;

        self.emit(WatchdogEvent::PingFailed {
            consecutive: failures,
        });
        if was_alive {
            self.emit(WatchdogEvent::ConnectionLost);
        }

        let threshold = self.options.failed_ping_count_until_offline;
        if failures == threshold {
            warn!(failures, "gateway offline");
            self.emit(WatchdogEvent::Offline);
        }

        if failures >= threshold && self.options.reconnection_enabled {
            self.state.offline_pings += 1;
            if self.state.offline_pings >= self.options.offline_ping_count_until_reconnect {
                return self.trigger_reconnect().await;
            }
        }

        backoff_delay(
            self.options.ping_interval,
            self.options.failed_ping_backoff_factor,
            failures,
        )
    }

    async fn trigger_reconnect(&mut self) -> Duration {
        self.state.offline_pings = 0;

        if let Some(maximum) = self.options.maximum_reconnects {
            if self.state.reconnect_attempts >= maximum {
                // Emit GiveUp exactly once, then only keep probing.
                if self.state.reconnect_attempts == maximum {
                    warn!(maximum, "maximum reconnects exhausted, giving up");
                    self.emit(WatchdogEvent::GiveUp);
                    self.state.reconnect_attempts = maximum + 1;
                }
                return backoff_delay(
                    self.options.ping_interval,
                    self.options.failed_ping_backoff_factor,
                    self.state.consecutive_failures,
                );
            }
        }

        self.state.reconnect_attempts += 1;
        let attempt = self.state.reconnect_attempts;
        info!(attempt, "triggering reconnect");
        self.emit(WatchdogEvent::Reconnecting {
            attempt,
            maximum: self.options.maximum_reconnects,
        });
        self.probe.drop_session().await;

        backoff_delay(
            self.options.reconnect_interval,
            self.options.connection_backoff_factor,
            attempt,
        )
    }

    fn emit(&self, event: WatchdogEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// `base × factor^min(5, count)`, rounded to whole milliseconds.
pub fn backoff_delay(base: Duration, factor: f64, count: u32) -> Duration {
    let exponent = count.min(MAX_BACKOFF_EXPONENT);
    let millis = base.as_millis() as f64 * factor.powi(exponent as i32);
    Duration::from_millis(millis.round() as u64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn backoff_caps_the_exponent() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1.5, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 1.5, 1), Duration::from_millis(1500));
        assert_eq!(backoff_delay(base, 1.5, 2), Duration::from_millis(2250));
        // 1000 × 1.5^5 = 7593.75 → 7594, for any count ≥ 5.
        assert_eq!(backoff_delay(base, 1.5, 5), Duration::from_millis(7594));
        assert_eq!(backoff_delay(base, 1.5, 40), Duration::from_millis(7594));
    }

    #[test]
    fn unit_factor_keeps_the_base_delay() {
        let base = Duration::from_secs(10);
        assert_eq!(backoff_delay(base, 1.0, 3), base);
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_at_construction() {
        struct NeverAnswers;

        #[async_trait]
        impl LivenessProbe for NeverAnswers {
            async fn ping(&self) -> bool {
                false
            }
            async fn drop_session(&self) {}
        }

        let options = WatchdogOptions {
            failed_ping_count_until_offline: 0,
            ..WatchdogOptions::default()
        };
        let result = ConnectionWatchdog::new(Arc::new(NeverAnswers), options);
        assert!(matches!(result, Err(CoreError::Config { .. })));
    }
}
