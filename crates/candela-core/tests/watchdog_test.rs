// Watchdog cycle semantics over a scripted probe, with paused time.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use candela_core::watchdog::{ConnectionWatchdog, LivenessProbe, WatchdogEvent};
use candela_core::{CoreError, WatchdogOptions};

/// Answers pings from a script; repeats the last answer when the
/// script runs out.
struct ScriptedProbe {
    answers: Mutex<VecDeque<bool>>,
    fallback: bool,
    session_drops: AtomicU32,
}

impl ScriptedProbe {
    fn new(answers: &[bool], fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            fallback,
            session_drops: AtomicU32::new(0),
        })
    }

    fn session_drops(&self) -> u32 {
        self.session_drops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for ScriptedProbe {
    async fn ping(&self) -> bool {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }

    async fn drop_session(&self) {
        self.session_drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn quick_options() -> WatchdogOptions {
    WatchdogOptions {
        ping_interval: Duration::from_secs(1),
        reconnect_interval: Duration::from_secs(1),
        failed_ping_count_until_offline: 2,
        offline_ping_count_until_reconnect: 2,
        ..WatchdogOptions::default()
    }
}

async fn next_event(rx: &mut broadcast::Receiver<WatchdogEvent>) -> WatchdogEvent {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for a watchdog event")
        .expect("watchdog event channel closed")
}

#[tokio::test(start_paused = true)]
async fn first_successful_ping_reports_the_connection_alive() {
    let probe = ScriptedProbe::new(&[], true);
    let watchdog = ConnectionWatchdog::new(probe, quick_options()).unwrap();
    let mut events = watchdog.events();

    watchdog.start().await.unwrap();
    assert_eq!(next_event(&mut events).await, WatchdogEvent::ConnectionAlive);
    assert_eq!(next_event(&mut events).await, WatchdogEvent::PingSucceeded);

    // Steady life: plain successes, no further alive transitions.
    assert_eq!(next_event(&mut events).await, WatchdogEvent::PingSucceeded);
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failures_cross_the_offline_threshold_once() {
    let probe = ScriptedProbe::new(&[true], false);
    let watchdog = ConnectionWatchdog::new(probe, quick_options()).unwrap();
    let mut events = watchdog.events();

    watchdog.start().await.unwrap();
    assert_eq!(next_event(&mut events).await, WatchdogEvent::ConnectionAlive);
    assert_eq!(next_event(&mut events).await, WatchdogEvent::PingSucceeded);

    // First failure: lost but not yet offline.
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 1 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::ConnectionLost);

    // Second failure crosses the threshold.
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 2 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::Offline);

    // Third failure: offline already announced, no repeat.
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 3 }
    );
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_triggers_after_enough_offline_pings() {
    let probe = ScriptedProbe::new(&[], false);
    let watchdog = ConnectionWatchdog::new(probe.clone(), quick_options()).unwrap();
    let mut events = watchdog.events();

    watchdog.start().await.unwrap();

    // Failures 1 and 2: lost, then offline (offline ping no. 1).
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 1 }
    );
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 2 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::Offline);

    // Failure 3 is offline ping no. 2 and triggers the reconnect.
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 3 }
    );
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::Reconnecting { attempt: 1, maximum: None }
    );
    assert_eq!(probe.session_drops(), 1);
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn recovery_resets_every_counter() {
    // Fail to the brink of a reconnect, recover, then fail again: the
    // offline announcement repeats because the counters started over.
    let probe = ScriptedProbe::new(&[false, false, true], false);
    let watchdog = ConnectionWatchdog::new(probe.clone(), quick_options()).unwrap();
    let mut events = watchdog.events();

    watchdog.start().await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 1 }
    );
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 2 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::Offline);

    assert_eq!(next_event(&mut events).await, WatchdogEvent::ConnectionAlive);
    assert_eq!(next_event(&mut events).await, WatchdogEvent::PingSucceeded);

    // The failure count restarts at 1.
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 1 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::ConnectionLost);
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 2 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::Offline);
    assert_eq!(probe.session_drops(), 0);
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn give_up_fires_once_when_reconnects_run_out() {
    let options = WatchdogOptions {
        ping_interval: Duration::from_secs(1),
        reconnect_interval: Duration::from_secs(1),
        failed_ping_count_until_offline: 1,
        offline_ping_count_until_reconnect: 1,
        maximum_reconnects: Some(1),
        ..WatchdogOptions::default()
    };
    let probe = ScriptedProbe::new(&[], false);
    let watchdog = ConnectionWatchdog::new(probe.clone(), options).unwrap();
    let mut events = watchdog.events();

    watchdog.start().await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 1 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::Offline);
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::Reconnecting { attempt: 1, maximum: Some(1) }
    );

    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 2 }
    );
    assert_eq!(next_event(&mut events).await, WatchdogEvent::GiveUp);

    // Probing continues, but no further reconnects or give-ups.
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 3 }
    );
    assert_eq!(
        next_event(&mut events).await,
        WatchdogEvent::PingFailed { consecutive: 4 }
    );
    assert_eq!(probe.session_drops(), 1);
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn start_twice_is_an_error_and_stop_is_idempotent() {
    let probe = ScriptedProbe::new(&[], true);
    let watchdog = ConnectionWatchdog::new(probe, quick_options()).unwrap();

    watchdog.start().await.unwrap();
    assert!(matches!(
        watchdog.start().await,
        Err(CoreError::WatchdogRunning)
    ));

    watchdog.stop().await;
    watchdog.stop().await;

    // A stopped watchdog can be started again.
    watchdog.start().await.unwrap();
    watchdog.stop().await;
}
