//! The per-channel history buffer between the trigger stage and the hub.
//!
//! One fixed-capacity ring per channel, all advancing in lockstep. The
//! absolute sample index from the packet headers is the time base: a header
//! index ahead of the expected one is a gap (counted and reset), behind it
//! is a stream rewind (reset). A version counter lets the hub suppress
//! idle re-broadcasts without holding the lock.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::downsample;
use crate::event::{SnapshotEvent, TriggerInfoWire, SCHEMA_VERSION};
use crate::packet::SampleJob;
use crate::ring::ChannelRing;
use crate::trigger::{TriggerInfo, TriggerMode, TriggerSlope, TriggerState};

/// Smallest window a client can request; also the lower bound on ring
/// capacity.
pub const MIN_SNAPSHOT_SAMPLES: usize = 256;

/// Upper bound on per-channel ring capacity.
pub const MAX_RING_CAPACITY: usize = 100_000_000;

/// Per-channel point cap for the min/max display envelope.
pub const DISPLAY_POINT_CAP: usize = 2048;

/// Per-channel ring capacity for a history target, clamped to sane bounds.
pub fn ring_capacity(history_secs: f64, sample_rate: u32) -> usize {
    let raw = (history_secs * sample_rate as f64).ceil() as usize;
    raw.clamp(MIN_SNAPSHOT_SAMPLES, MAX_RING_CAPACITY)
}

fn idle_trigger_info() -> TriggerInfo {
    TriggerInfo {
        mode: TriggerMode::Auto,
        slope: TriggerSlope::Rising,
        level: 128,
        holdoff_us: 0,
        channel: 0,
        state: TriggerState::Passthrough,
        active: false,
        fired_at: None,
    }
}

pub struct SampleBuffer {
    rings: Vec<ChannelRing>,
    capacity: usize,
    /// Absolute index the next packet should start at; `None` until the
    /// first append.
    expected_next: Option<u64>,
    /// Cumulative samples lost to stream gaps and ring overflow.
    dropped: u64,
    last_seq: u32,
    last_flags: u16,
    last_sample_bits: u16,
    last_trigger: TriggerInfo,
    /// Absolute index of the latest accepted edge; 0 when none yet.
    trigger_index: u64,
    sample_rate: u32,
    history_secs: f64,
    ingest_lag_us: u64,
    version: AtomicU64,
}

impl SampleBuffer {
    pub fn new(capacity: usize, sample_rate: u32, history_secs: f64) -> Self {
        Self {
            rings: Vec::new(),
            capacity,
            expected_next: None,
            dropped: 0,
            last_seq: 0,
            last_flags: 0,
            last_sample_bits: 8,
            last_trigger: idle_trigger_info(),
            trigger_index: 0,
            sample_rate,
            history_secs,
            ingest_lag_us: 0,
            version: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn bump_version(&mut self) {
        self.version.fetch_add(1, Ordering::Release);
    }

    fn reset_rings(&mut self, channels: usize, start_index: u64) {
        self.rings = (0..channels)
            .map(|_| ChannelRing::new(self.capacity, start_index))
            .collect();
    }

    /// Append a forwarded job. See the module docs for the gap/rewind
    /// rules; ring overflow on channel 0 stands in for all channels since
    /// every ring advances by the same amount.
    pub fn append(&mut self, job: &SampleJob, trigger: &TriggerInfo) {
        let header = &job.header;
        let first_idx = header.first_sample_idx;

        if self.rings.len() != header.channels as usize {
            if !self.rings.is_empty() {
                warn!(
                    old = self.rings.len(),
                    new = header.channels,
                    "channel count changed, resetting buffer"
                );
            }
            self.reset_rings(header.channels as usize, first_idx);
            self.expected_next = None;
        }

        match self.expected_next {
            None => {
                self.expected_next = Some(first_idx);
            }
            Some(expected) if first_idx > expected => {
                let gap = first_idx - expected;
                warn!(
                    expected,
                    got = first_idx,
                    missing = gap,
                    "gap in sample stream, resetting time base"
                );
                self.dropped += gap;
                for ring in &mut self.rings {
                    ring.reset_to(first_idx);
                }
            }
            Some(expected) if first_idx < expected => {
                info!(expected, got = first_idx, "sample stream rewound, resetting");
                for ring in &mut self.rings {
                    ring.reset_to(first_idx);
                }
            }
            Some(_) => {}
        }

        let mut overflow = 0;
        for (ring, samples) in self.rings.iter_mut().zip(&job.channels) {
            let pushed_out = ring.push_slice(samples);
            if overflow == 0 {
                overflow = pushed_out;
            }
        }
        self.dropped += overflow;

        self.expected_next = Some(first_idx + header.samples_per_ch as u64);
        self.record_meta(job, trigger);
        self.bump_version();
    }

    /// Record the outcome of a dropped job: trigger status and lag still
    /// reach clients even when no samples are appended.
    pub fn record_trigger(&mut self, job: &SampleJob, trigger: &TriggerInfo) {
        self.record_meta(job, trigger);
        self.bump_version();
    }

    fn record_meta(&mut self, job: &SampleJob, trigger: &TriggerInfo) {
        self.last_seq = job.header.seq;
        self.last_flags = job.header.flags;
        self.last_sample_bits = job.header.sample_bits;
        self.last_trigger = *trigger;
        if trigger.active {
            if let Some(at) = trigger.fired_at {
                self.trigger_index = at;
            }
        }
        self.ingest_lag_us = job.received.elapsed().as_micros() as u64;
    }

    /// Copy out the newest `want` samples of every channel as a wire event.
    /// Returns `None` while no channel holds data. The returned version is
    /// the one the event reflects.
    pub fn snapshot(&self, want: usize) -> Option<(SnapshotEvent, u64)> {
        let version = self.version();
        if self.rings.is_empty() || self.rings.iter().all(|r| r.is_empty()) {
            return None;
        }

        let ring_len = self.rings.iter().map(|r| r.len()).min().unwrap_or(0);
        let window = want.min(ring_len);
        if window == 0 {
            return None;
        }

        // All rings advance in lockstep, so trimming every channel to the
        // shortest snapshot aligns them on the same absolute range.
        let samples: Vec<Vec<u16>> = self.rings.iter().map(|r| r.tail(window)).collect();
        let window = samples.iter().map(|s| s.len()).min().unwrap_or(0);
        let samples: Vec<Vec<u16>> = samples
            .into_iter()
            .map(|mut s| {
                let trim = s.len() - window;
                if trim > 0 {
                    s.drain(..trim);
                }
                s
            })
            .collect();

        let first_idx = self.rings[0].end_index() - window as u64;

        let (min, max) = if window > DISPLAY_POINT_CAP {
            let mut mins = Vec::with_capacity(samples.len());
            let mut maxs = Vec::with_capacity(samples.len());
            for chan in &samples {
                let (lo, hi) = downsample::min_max(chan, DISPLAY_POINT_CAP);
                mins.push(lo);
                maxs.push(hi);
            }
            (Some(mins), Some(maxs))
        } else {
            (None, None)
        };

        let trigger_window_index = if self.last_trigger.active
            && self.trigger_index >= first_idx
            && self.trigger_index < first_idx + window as u64
        {
            (self.trigger_index - first_idx) as i64
        } else {
            -1
        };

        let event = SnapshotEvent {
            seq: self.last_seq,
            first_idx,
            sample_rate: self.sample_rate,
            channels: self.rings.len() as u16,
            samples_per_ch: window as u32,
            sample_bits: self.last_sample_bits,
            flags: self.last_flags,
            samples,
            min,
            max,
            history_secs: self.history_secs,
            buffer_fill: ring_len as f64 / self.capacity as f64,
            dropped: self.dropped,
            ingest_lag_us: self.ingest_lag_us,
            trigger_idx: self.trigger_index,
            schema_version: SCHEMA_VERSION,
            trigger: TriggerInfoWire::from_info(&self.last_trigger, trigger_window_index),
        };
        Some((event, version))
    }
}
