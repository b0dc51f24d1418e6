//! Per-job progress fan-out with coalescing subscriptions.
//!
//! Each job owns one `watch` channel holding its most recent snapshot.
//! Publishing replaces the value and never blocks; every [`Subscription`]
//! reads the channel independently and applies its own coalescing policy:
//!
//! - the first call yields the current snapshot,
//! - a later snapshot is forwarded when it is terminal, when progress rose by
//!   at least `min_progress_delta`, or when `min_interval` passed since the
//!   last forward (a skipped snapshot is flushed once the interval elapses),
//! - `heartbeat_interval` of silence yields [`StreamEvent::Heartbeat`],
//! - the stream ends after a terminal snapshot, after `idle_timeout` without
//!   updates, or when the job's channel is closed.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use resmatch_core::{defaults, JobId, ProgressSnapshot};

/// Delivery policy for subscriptions.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Progress increase that forwards a snapshot immediately.
    pub min_progress_delta: u8,
    /// Minimum spacing of forwarded non-terminal snapshots.
    pub min_interval: Duration,
    /// Silence after which a heartbeat is emitted.
    pub heartbeat_interval: Duration,
    /// The stream ends after this long without a real update.
    pub idle_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_progress_delta: defaults::PROGRESS_MIN_DELTA,
            min_interval: Duration::from_millis(defaults::PROGRESS_MIN_INTERVAL_MS),
            heartbeat_interval: Duration::from_secs(defaults::STREAM_HEARTBEAT_SECS),
            idle_timeout: Duration::from_secs(defaults::STREAM_IDLE_TIMEOUT_SECS),
        }
    }
}

impl StreamConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PROGRESS_MIN_DELTA` | `5` | Progress points that force a forward |
    /// | `PROGRESS_MIN_INTERVAL_MS` | `500` | Minimum spacing of forwarded snapshots |
    /// | `STREAM_HEARTBEAT_SECS` | `30` | Heartbeat after this much silence |
    /// | `STREAM_IDLE_TIMEOUT_SECS` | `300` | End the stream after this long idle |
    pub fn from_env() -> Self {
        fn env_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        }

        let min_progress_delta = std::env::var("PROGRESS_MIN_DELTA")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(defaults::PROGRESS_MIN_DELTA);

        Self {
            min_progress_delta,
            min_interval: Duration::from_millis(env_u64(
                "PROGRESS_MIN_INTERVAL_MS",
                defaults::PROGRESS_MIN_INTERVAL_MS,
            )),
            heartbeat_interval: Duration::from_secs(
                env_u64("STREAM_HEARTBEAT_SECS", defaults::STREAM_HEARTBEAT_SECS).max(1),
            ),
            idle_timeout: Duration::from_secs(env_u64(
                "STREAM_IDLE_TIMEOUT_SECS",
                defaults::STREAM_IDLE_TIMEOUT_SECS,
            )),
        }
    }

    pub fn with_min_progress_delta(mut self, delta: u8) -> Self {
        self.min_progress_delta = delta;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// One item of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Progress(ProgressSnapshot),
    Heartbeat,
}

impl StreamEvent {
    /// Event name used by push-stream transports.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Heartbeat => "heartbeat",
        }
    }

    /// JSON payload: the snapshot for progress, `{"type":"heartbeat"}` otherwise.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            StreamEvent::Progress(snapshot) => {
                serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
            }
            StreamEvent::Heartbeat => serde_json::json!({ "type": "heartbeat" }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Progress(s) if s.is_terminal())
    }
}

/// Registry of per-job progress channels.
#[derive(Debug, Default)]
pub struct ProgressBroadcaster {
    channels: RwLock<HashMap<JobId, watch::Sender<ProgressSnapshot>>>,
    config: StreamConfig,
}

impl ProgressBroadcaster {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open the channel for a new job with its initial snapshot.
    pub fn register(&self, snapshot: ProgressSnapshot) {
        let job_id = snapshot.job_id;
        let (tx, _) = watch::channel(snapshot);
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, tx);
        trace!(%job_id, "Registered progress channel");
    }

    /// Replace the job's current snapshot. Returns the number of live subscribers.
    pub fn publish(&self, snapshot: ProgressSnapshot) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        match channels.get(&snapshot.job_id) {
            Some(tx) => {
                let receivers = tx.receiver_count();
                tx.send_replace(snapshot);
                receivers
            }
            None => 0,
        }
    }

    /// Drop the job's channel; open subscriptions drain and end.
    pub fn close(&self, job_id: JobId) {
        let removed = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        if removed.is_some() {
            debug!(%job_id, "Closed progress channel");
        }
    }

    /// Attach a new coalescing subscriber. `None` if the job is unknown.
    pub fn subscribe(&self, job_id: JobId) -> Option<Subscription> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let rx = channels.get(&job_id)?.subscribe();
        debug!(%job_id, "New progress subscriber");
        Some(Subscription::new(rx, self.config.clone()))
    }

    /// Live subscriber count for a job.
    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A single subscriber's finite, coalesced view of one job.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<ProgressSnapshot>,
    config: StreamConfig,
    started: bool,
    finished: bool,
    pending: bool,
    last_progress: u8,
    last_forward_at: Instant,
    last_emit_at: Instant,
    last_update_at: Instant,
}

impl Subscription {
    fn new(rx: watch::Receiver<ProgressSnapshot>, config: StreamConfig) -> Self {
        let now = Instant::now();
        Self {
            rx,
            config,
            started: false,
            finished: false,
            pending: false,
            last_progress: 0,
            last_forward_at: now,
            last_emit_at: now,
            last_update_at: now,
        }
    }

    /// Whether the stream has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next event, or `None` once the stream has ended.
    ///
    /// Cancel safe: no event is lost if the future is dropped, so it can be
    /// used as a `tokio::select!` branch.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            let snapshot = self.rx.borrow_and_update().clone();
            return Some(self.forward(snapshot));
        }

        loop {
            let wake = if self.pending {
                self.last_forward_at + self.config.min_interval
            } else {
                self.last_emit_at + self.config.heartbeat_interval
            };
            let deadline = wake.min(self.last_update_at + self.config.idle_timeout);

            match tokio::time::timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => {
                    let snapshot = self.rx.borrow_and_update().clone();
                    self.last_update_at = Instant::now();
                    if self.should_forward(&snapshot) {
                        return Some(self.forward(snapshot));
                    }
                    self.pending = true;
                }
                Ok(Err(_)) => {
                    if self.pending {
                        let snapshot = self.rx.borrow().clone();
                        return Some(self.forward(snapshot));
                    }
                    self.finished = true;
                    return None;
                }
                Err(_) => {
                    if self.pending {
                        let snapshot = self.rx.borrow().clone();
                        return Some(self.forward(snapshot));
                    }
                    let now = Instant::now();
                    if now.duration_since(self.last_update_at) >= self.config.idle_timeout {
                        debug!("Progress subscription idle, ending stream");
                        self.finished = true;
                        return None;
                    }
                    self.last_emit_at = now;
                    return Some(StreamEvent::Heartbeat);
                }
            }
        }
    }

    /// Adapt into a `Stream` for push-stream transports.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|event| (event, sub))
        })
    }

    fn should_forward(&self, snapshot: &ProgressSnapshot) -> bool {
        snapshot.is_terminal()
            || snapshot.progress
                >= self
                    .last_progress
                    .saturating_add(self.config.min_progress_delta)
            || Instant::now().duration_since(self.last_forward_at) >= self.config.min_interval
    }

    fn forward(&mut self, snapshot: ProgressSnapshot) -> StreamEvent {
        let now = Instant::now();
        self.pending = false;
        self.last_progress = snapshot.progress;
        self.last_forward_at = now;
        self.last_emit_at = now;
        if snapshot.is_terminal() {
            self.finished = true;
        }
        StreamEvent::Progress(snapshot)
    }
}
