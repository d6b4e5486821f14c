// ── Runtime configuration ──
//
// These types describe *how* to reach a gateway and how the watchdog
// behaves. They are built by the embedding application and handed in;
// the core never reads config files.
//
// Watchdog bounds are validated eagerly at construction (spec'd wire
// behavior: a misconfigured watchdog must not be constructible), not
// lazily at first use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Gateway connection ───────────────────────────────────────────────

/// Connection parameters for a single gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host name or address (no scheme, no port).
    pub host: String,
    /// Secure CoAP port.
    pub port: u16,
    /// DTLS identity negotiated during onboarding.
    pub identity: String,
    /// Pre-shared key belonging to `identity`.
    pub psk: String,
}

impl GatewayConfig {
    pub fn new(
        host: impl Into<String>,
        identity: impl Into<String>,
        psk: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: candela_coap::path::DEFAULT_SECURE_PORT,
            identity: identity.into(),
            psk: psk.into(),
        }
    }
}

// ── Watchdog options ─────────────────────────────────────────────────

/// Lower bound for the ping and reconnect intervals.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound for the ping and reconnect intervals.
pub const MAX_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Bounds for both backoff factors.
pub const BACKOFF_FACTOR_RANGE: (f64, f64) = (1.0, 3.0);
/// Bounds for the failed-ping and offline-ping thresholds.
pub const THRESHOLD_RANGE: (u32, u32) = (1, 10);

/// Tuning knobs for the connection watchdog.
///
/// All bounds are enforced by [`validate`](Self::validate), which the
/// watchdog constructor calls before anything is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogOptions {
    /// Base delay between liveness probes.
    pub ping_interval: Duration,
    /// Consecutive failed pings before the connection counts as offline.
    pub failed_ping_count_until_offline: u32,
    /// Exponential backoff factor applied to `ping_interval` while
    /// pings keep failing.
    pub failed_ping_backoff_factor: f64,
    /// Whether the watchdog drives automatic reconnection at all.
    pub reconnection_enabled: bool,
    /// Offline pings between two reconnect attempts.
    pub offline_ping_count_until_reconnect: u32,
    /// Base delay scheduled after a cycle that triggered a reconnect.
    pub reconnect_interval: Duration,
    /// Exponential backoff factor applied to `reconnect_interval` as
    /// reconnect attempts accumulate.
    pub connection_backoff_factor: f64,
    /// Reconnect attempts before the watchdog gives up.
    /// `None` means never give up.
    pub maximum_reconnects: Option<u32>,
}

impl Default for WatchdogOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            failed_ping_count_until_offline: 1,
            failed_ping_backoff_factor: 1.5,
            reconnection_enabled: true,
            offline_ping_count_until_reconnect: 3,
            reconnect_interval: Duration::from_secs(10),
            connection_backoff_factor: 1.5,
            maximum_reconnects: None,
        }
    }
}

impl WatchdogOptions {
    /// Check every option against its documented range.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_interval("ping_interval", self.ping_interval)?;
        check_interval("reconnect_interval", self.reconnect_interval)?;
        check_factor("failed_ping_backoff_factor", self.failed_ping_backoff_factor)?;
        check_factor("connection_backoff_factor", self.connection_backoff_factor)?;
        check_threshold(
            "failed_ping_count_until_offline",
            self.failed_ping_count_until_offline,
        )?;
        check_threshold(
            "offline_ping_count_until_reconnect",
            self.offline_ping_count_until_reconnect,
        )?;
        if self.maximum_reconnects == Some(0) {
            return Err(config_error("maximum_reconnects must be at least 1"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> CoreError {
    CoreError::Config {
        message: message.into(),
    }
}

fn check_interval(name: &str, value: Duration) -> Result<(), CoreError> {
    if value < MIN_INTERVAL || value > MAX_INTERVAL {
        return Err(config_error(format!(
            "{name} must be between {}s and {}s, got {}ms",
            MIN_INTERVAL.as_secs(),
            MAX_INTERVAL.as_secs(),
            value.as_millis()
        )));
    }
    Ok(())
}

fn check_factor(name: &str, value: f64) -> Result<(), CoreError> {
    let (lo, hi) = BACKOFF_FACTOR_RANGE;
    if !value.is_finite() || value < lo || value > hi {
        return Err(config_error(format!(
            "{name} must be between {lo} and {hi}, got {value}"
        )));
    }
    Ok(())
}

fn check_threshold(name: &str, value: u32) -> Result<(), CoreError> {
    let (lo, hi) = THRESHOLD_RANGE;
    if value < lo || value > hi {
        return Err(config_error(format!(
            "{name} must be between {lo} and {hi}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        WatchdogOptions::default().validate().unwrap();
    }

    #[test]
    fn zero_offline_threshold_is_rejected() {
        let options = WatchdogOptions {
            failed_ping_count_until_offline: 0,
            ..WatchdogOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn interval_bounds_are_enforced() {
        let too_short = WatchdogOptions {
            ping_interval: Duration::from_millis(500),
            ..WatchdogOptions::default()
        };
        assert!(too_short.validate().is_err());

        let too_long = WatchdogOptions {
            reconnect_interval: Duration::from_secs(600),
            ..WatchdogOptions::default()
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn backoff_factor_bounds_are_enforced() {
        for factor in [0.5, 3.5, f64::NAN] {
            let options = WatchdogOptions {
                failed_ping_backoff_factor: factor,
                ..WatchdogOptions::default()
            };
            assert!(options.validate().is_err(), "factor {factor} should fail");
        }
    }

    #[test]
    fn zero_maximum_reconnects_is_rejected() {
        let options = WatchdogOptions {
            maximum_reconnects: Some(0),
            ..WatchdogOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn infinite_reconnects_are_allowed() {
        let options = WatchdogOptions {
            maximum_reconnects: None,
            ..WatchdogOptions::default()
        };
        options.validate().unwrap();
    }
}
