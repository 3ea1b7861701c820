//! Frame-rate-limited broadcast hub.
//!
//! Owns the sample buffer and the trigger controller, ticks at the display
//! FPS, and publishes a freshly assembled snapshot whenever the buffer's
//! version has advanced. The frame is serialized once and fanned out to
//! every client over a broadcast channel; slow or dead clients drop
//! themselves in the per-client writer tasks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::buffer::{SampleBuffer, MIN_SNAPSHOT_SAMPLES};
use crate::event::SnapshotEvent;
use crate::trigger::{TriggerController, TriggerSlope, TriggerState};

/// Display frame rate bounds.
pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 240;

/// Default snapshot window, adjustable per `set_view`.
pub const DEFAULT_VIEW_SAMPLES: usize = 2048;

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct Hub {
    buffer: Arc<RwLock<SampleBuffer>>,
    trigger: Arc<TriggerController>,
    frames: broadcast::Sender<Arc<String>>,
    snapshot_samples: AtomicUsize,
    last_broadcast: AtomicU64,
    frame_interval: Duration,
    view_max: usize,
}

impl Hub {
    pub fn new(
        buffer: Arc<RwLock<SampleBuffer>>,
        trigger: Arc<TriggerController>,
        fps: u32,
    ) -> Self {
        let fps = fps.clamp(MIN_FPS, MAX_FPS);
        let view_max = buffer.read().expect("buffer lock poisoned").capacity();
        let (frames, _) = broadcast::channel(16);
        Self {
            buffer,
            trigger,
            frames,
            snapshot_samples: AtomicUsize::new(DEFAULT_VIEW_SAMPLES.min(view_max)),
            last_broadcast: AtomicU64::new(0),
            frame_interval: Duration::from_secs(1) / fps,
            view_max,
        }
    }

    pub fn trigger(&self) -> &Arc<TriggerController> {
        &self.trigger
    }

    /// Subscribe a client to serialized frames.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<String>> {
        self.frames.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.frames.receiver_count()
    }

    pub fn write_timeout(&self) -> Duration {
        WRITE_TIMEOUT
    }

    pub fn snapshot_samples(&self) -> usize {
        self.snapshot_samples.load(Ordering::Relaxed)
    }

    /// Resize the snapshot window, clamped to what the ring can serve.
    /// Returns the value actually applied.
    pub fn set_view(&self, samples: usize) -> usize {
        let clamped = samples.clamp(MIN_SNAPSHOT_SAMPLES.min(self.view_max), self.view_max);
        self.snapshot_samples.store(clamped, Ordering::Relaxed);
        info!(samples = clamped, "view window resized");
        clamped
    }

    /// Tick at the display rate, broadcasting when the buffer moved.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_ms = self.frame_interval.as_millis() as u64,
            "broadcast hub running"
        );

        loop {
            ticker.tick().await;

            let snapshot = {
                let buffer = self.buffer.read().expect("buffer lock poisoned");
                buffer.snapshot(self.snapshot_samples())
            };
            let Some((mut event, version)) = snapshot else {
                continue;
            };
            if version <= self.last_broadcast.load(Ordering::Acquire) {
                continue;
            }

            postprocess_trigger(&mut event);

            match serde_json::to_string(&event) {
                Ok(json) => {
                    self.last_broadcast.store(version, Ordering::Release);
                    // Err here only means no client is connected.
                    let _ = self.frames.send(Arc::new(json));
                    debug!(version, "frame broadcast");
                }
                Err(e) => warn!(error = %e, "snapshot serialization failed"),
            }
        }
    }
}

/// When the live trigger left no anchor in the window, try to recover one
/// from the windowed data itself so the viewer can still align the trace.
fn postprocess_trigger(event: &mut SnapshotEvent) {
    if event.trigger.index >= 0 {
        return;
    }
    let Some(slope) = TriggerSlope::parse(event.trigger.slope) else {
        return;
    };
    let channel = event.trigger.channel.min(event.samples.len().saturating_sub(1));
    let Some(samples) = event.samples.get(channel) else {
        return;
    };
    if samples.len() < 2 {
        return;
    }

    let level = event.trigger.level;
    let mut prev = samples[0];
    for (i, &cur) in samples.iter().enumerate().skip(1) {
        if slope.crosses(prev, cur, level) {
            event.trigger.index = i as i64;
            event.trigger.state = TriggerState::Postproc.as_str();
            return;
        }
        prev = cur;
    }
}
