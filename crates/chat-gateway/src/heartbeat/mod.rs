//! Heartbeat scheduler
//!
//! Sends op 1 pulses while the session is Ready. The loop wakes every slice
//! rather than sleeping for the whole interval, so it notices shutdown and state
//! changes within one slice.

use crate::protocol::{GatewayMessage, StatusUpdatePayload};
use crate::session::{Outbound, SessionState};
use chat_common::HeartbeatSettings;
use chat_core::StatusSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Heartbeat timing, resolved from settings and the server-supplied interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatTiming {
    pub interval: Duration,
    pub slice: Duration,
    pub safety_margin: Duration,
    pub status_refresh_probability: f64,
}

impl HeartbeatTiming {
    pub fn from_settings(settings: &HeartbeatSettings, interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            slice: Duration::from_millis(settings.slice_ms.max(1)),
            safety_margin: Duration::from_millis(settings.safety_margin_ms),
            status_refresh_probability: settings.status_refresh_probability,
        }
    }

    /// Elapsed time after which the next pulse is due
    fn due_after(&self) -> Duration {
        self.interval.saturating_sub(self.safety_margin)
    }
}

/// Handle to a running heartbeat task
#[derive(Debug)]
pub struct HeartbeatHandle {
    interval: Duration,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task without waiting
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Stop the task and wait for it to end
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Periodic liveness pulse for one Ready session
pub struct HeartbeatScheduler {
    timing: HeartbeatTiming,
    outbound: mpsc::UnboundedSender<Outbound>,
    status: Arc<RwLock<StatusSnapshot>>,
    state: watch::Receiver<SessionState>,
    shutdown: watch::Receiver<bool>,
    last_timestamp: u64,
}

impl HeartbeatScheduler {
    pub fn new(
        timing: HeartbeatTiming,
        outbound: mpsc::UnboundedSender<Outbound>,
        status: Arc<RwLock<StatusSnapshot>>,
        state: watch::Receiver<SessionState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            timing,
            outbound,
            status,
            state,
            shutdown,
            last_timestamp: 0,
        }
    }

    /// Spawn the loop on the runtime
    pub fn spawn(self) -> HeartbeatHandle {
        let interval = self.timing.interval;
        HeartbeatHandle {
            interval,
            task: tokio::spawn(self.run()),
        }
    }

    /// Run until the session leaves Ready, shutdown is signalled or the writer is gone
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.timing.slice);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_beat = Instant::now();

        tracing::debug!(
            interval_ms = self.timing.interval.as_millis() as u64,
            "Heartbeat started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *self.shutdown.borrow() || *self.state.borrow() != SessionState::Ready {
                break;
            }

            if last_beat.elapsed() >= self.timing.due_after() {
                if !self.pulse() {
                    break;
                }
                last_beat = Instant::now();
            }
        }

        tracing::debug!("Heartbeat stopped");
    }

    /// Send one pulse; returns `false` if the writer has gone away
    fn pulse(&mut self) -> bool {
        let timestamp = self.next_timestamp();
        let sent = GatewayMessage::heartbeat(timestamp)
            .to_json()
            .map(|json| self.outbound.send(Outbound::Text(json)).is_ok())
            .unwrap_or(false);

        if !sent {
            tracing::debug!("Heartbeat writer closed");
            return false;
        }
        tracing::trace!(timestamp, "Heartbeat sent");

        if rand::random::<f64>() < self.timing.status_refresh_probability {
            let payload = StatusUpdatePayload::from(&*self.status.read());
            if let Ok(json) = GatewayMessage::status_update(payload).to_json() {
                tracing::trace!("Status refreshed with heartbeat");
                return self.outbound.send(Outbound::Text(json)).is_ok();
            }
        }
        true
    }

    /// Wall-clock milliseconds, never lower than the previous pulse
    fn next_timestamp(&mut self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        self.last_timestamp = self.last_timestamp.max(now);
        self.last_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::Value;

    struct Harness {
        state: watch::Sender<SessionState>,
        shutdown: watch::Sender<bool>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        handle: HeartbeatHandle,
    }

    fn start(interval_ms: u64, probability: f64) -> Harness {
        let settings = HeartbeatSettings {
            status_refresh_probability: probability,
            ..HeartbeatSettings::default()
        };
        let (state, state_rx) = watch::channel(SessionState::Ready);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (tx, outbound) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(StatusSnapshot::new(Some("chess".into()), false)));

        let handle = HeartbeatScheduler::new(
            HeartbeatTiming::from_settings(&settings, interval_ms),
            tx,
            status,
            state_rx,
            shutdown_rx,
        )
        .spawn();

        Harness {
            state,
            shutdown,
            outbound,
            handle,
        }
    }

    fn op_of(frame: &Outbound) -> u64 {
        match frame {
            Outbound::Text(json) => serde_json::from_str::<Value>(json).unwrap()["op"]
                .as_u64()
                .unwrap(),
            Outbound::Close { .. } => panic!("unexpected close frame"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulses_at_least_once_per_interval() {
        let interval = Duration::from_millis(1_000);
        let Harness {
            state: _state,
            shutdown: _shutdown,
            mut outbound,
            handle,
        } = start(1_000, 0.0);

        let started = Instant::now();
        let beats = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&beats);
        let collector = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if op_of(&frame) == 1 {
                    sink.lock().push(Instant::now());
                }
            }
        });

        tokio::time::sleep(interval * 3 + Duration::from_millis(50)).await;

        let beats = beats.lock().clone();
        assert!(beats.len() >= 3, "only {} pulses", beats.len());

        let mut previous = started;
        for beat in beats {
            assert!(beat - previous <= interval);
            previous = beat;
        }

        handle.stop().await;
        collector.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_within_one_slice_when_state_leaves_ready() {
        let harness = start(40_000, 0.0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.handle.is_running());

        harness.state.send_replace(SessionState::Closing);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(!harness.handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let harness = start(40_000, 0.0);
        harness.shutdown.send_replace(true);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(!harness.handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_refresh_with_certain_probability() {
        let mut harness = start(100, 1.0);
        tokio::time::sleep(Duration::from_millis(105)).await;

        let first = harness.outbound.recv().await.unwrap();
        let second = harness.outbound.recv().await.unwrap();
        assert_eq!(op_of(&first), 1);
        assert_eq!(op_of(&second), 3);

        harness.handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_status_refresh_with_zero_probability() {
        let mut harness = start(100, 0.0);
        tokio::time::sleep(Duration::from_millis(350)).await;
        harness.handle.stop().await;

        while let Ok(frame) = harness.outbound.try_recv() {
            assert_eq!(op_of(&frame), 1);
        }
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let (_state, state_rx) = watch::channel(SessionState::Ready);
        let (_shutdown, shutdown_rx) = watch::channel(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = HeartbeatScheduler::new(
            HeartbeatTiming::from_settings(&HeartbeatSettings::default(), 1_000),
            tx,
            Arc::new(RwLock::new(StatusSnapshot::default())),
            state_rx,
            shutdown_rx,
        );

        scheduler.last_timestamp = u64::MAX - 1;
        assert_eq!(scheduler.next_timestamp(), u64::MAX - 1);
    }

    #[test]
    fn test_due_after_subtracts_margin() {
        let timing = HeartbeatTiming::from_settings(&HeartbeatSettings::default(), 40_000);
        assert_eq!(timing.due_after(), Duration::from_millis(39_990));
        assert_eq!(timing.slice, Duration::from_millis(10));
    }
}
