//! The trigger engine: a classical oscilloscope trigger evaluated against
//! each decoded job before it reaches the sample buffer.
//!
//! Slope and mode are closed variants, so the fan-out is an exhaustive
//! match. Auto mode always forwards data; normal and single gate the buffer
//! on an edge crossing, with holdoff measured in absolute sample distance.

use std::sync::RwLock;

use tracing::{debug, warn};

use crate::packet::SampleJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Auto,
    Normal,
    Single,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Auto => "auto",
            TriggerMode::Normal => "normal",
            TriggerMode::Single => "single",
        }
    }

    /// Lenient parse for command frames; `None` for unrecognized input.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(TriggerMode::Auto),
            "normal" => Some(TriggerMode::Normal),
            "single" => Some(TriggerMode::Single),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSlope {
    Rising,
    Falling,
}

impl TriggerSlope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSlope::Rising => "rising",
            TriggerSlope::Falling => "falling",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rising" => Some(TriggerSlope::Rising),
            "falling" => Some(TriggerSlope::Falling),
            _ => None,
        }
    }

    /// True when `prev -> cur` crosses `level` in this slope's direction.
    pub fn crosses(&self, prev: u16, cur: u16, level: u16) -> bool {
        match self {
            TriggerSlope::Rising => prev < level && cur >= level,
            TriggerSlope::Falling => prev > level && cur <= level,
        }
    }
}

/// Textual trigger state carried in every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Auto,
    Waiting,
    Armed,
    Latched,
    Holdoff,
    Triggered,
    Passthrough,
    Error,
    Postproc,
}

impl TriggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Auto => "auto",
            TriggerState::Waiting => "waiting",
            TriggerState::Armed => "armed",
            TriggerState::Latched => "latched",
            TriggerState::Holdoff => "holdoff",
            TriggerState::Triggered => "triggered",
            TriggerState::Passthrough => "passthrough",
            TriggerState::Error => "error",
            TriggerState::Postproc => "postproc",
        }
    }
}

/// Operator-tunable trigger settings. `level` is the 0-255 slider; it is
/// mapped into the stream's full-scale range at evaluation time.
#[derive(Debug, Clone, Copy)]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    pub slope: TriggerSlope,
    pub level: u8,
    pub holdoff_us: u64,
    pub channel: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::Auto,
            slope: TriggerSlope::Rising,
            level: 128,
            holdoff_us: 0,
            channel: 0,
        }
    }
}

/// Partial update from a `set_trigger` command. Absent fields keep the
/// current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerUpdate {
    pub mode: Option<TriggerMode>,
    pub slope: Option<TriggerSlope>,
    pub level: Option<u8>,
    pub holdoff_us: Option<u64>,
    pub channel: Option<usize>,
}

/// Result of evaluating one job, recorded in the buffer and echoed to
/// clients inside every snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TriggerInfo {
    pub mode: TriggerMode,
    pub slope: TriggerSlope,
    /// Level in sample counts, already mapped from the slider.
    pub level: u16,
    pub holdoff_us: u64,
    pub channel: usize,
    pub state: TriggerState,
    /// True when this evaluation fired; `fired_at` then names the edge.
    pub active: bool,
    /// Absolute sample index of the accepted edge.
    pub fired_at: Option<u64>,
}

/// Forward-or-drop decision plus the info record for the buffer.
#[derive(Debug, Clone, Copy)]
pub struct TriggerVerdict {
    pub forward: bool,
    pub info: TriggerInfo,
}

#[derive(Debug, Default)]
struct TriggerRuntime {
    /// Absolute index of the last accepted edge. Survives re-arm so holdoff
    /// spans arm cycles.
    last_fired: Option<u64>,
    armed: bool,
}

/// Shared trigger controller. Evaluation reads configuration under the
/// shared lock; only an accepted edge takes the exclusive lock to write
/// back `last_fired`.
pub struct TriggerController {
    config: RwLock<TriggerConfig>,
    runtime: RwLock<TriggerRuntime>,
    sample_rate: u32,
}

impl TriggerController {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            config: RwLock::new(TriggerConfig::default()),
            runtime: RwLock::new(TriggerRuntime::default()),
            sample_rate,
        }
    }

    pub fn config(&self) -> TriggerConfig {
        *self.config.read().expect("trigger config lock poisoned")
    }

    /// Apply a `set_trigger` update. A mode change to anything but single
    /// re-arms; a change to single clears the armed flag so the operator
    /// must arm explicitly.
    pub fn apply(&self, update: TriggerUpdate) {
        let mut config = self.config.write().expect("trigger config lock poisoned");
        if let Some(slope) = update.slope {
            config.slope = slope;
        }
        if let Some(level) = update.level {
            config.level = level;
        }
        if let Some(holdoff_us) = update.holdoff_us {
            config.holdoff_us = holdoff_us;
        }
        if let Some(channel) = update.channel {
            config.channel = channel;
        }
        if let Some(mode) = update.mode {
            config.mode = mode;
            let mut runtime = self.runtime.write().expect("trigger runtime lock poisoned");
            runtime.armed = mode != TriggerMode::Single;
        }
        debug!(
            mode = config.mode.as_str(),
            slope = config.slope.as_str(),
            level = config.level,
            holdoff_us = config.holdoff_us,
            channel = config.channel,
            "trigger reconfigured"
        );
    }

    /// Make a single-mode trigger eligible to fire exactly once more.
    pub fn arm_single(&self) {
        let mut runtime = self.runtime.write().expect("trigger runtime lock poisoned");
        runtime.armed = true;
        debug!("single trigger armed");
    }

    pub fn is_armed(&self) -> bool {
        self.runtime
            .read()
            .expect("trigger runtime lock poisoned")
            .armed
    }

    fn holdoff_samples(&self, holdoff_us: u64) -> u64 {
        holdoff_us * self.sample_rate as u64 / 1_000_000
    }

    /// Evaluate one job against the current configuration.
    pub fn evaluate(&self, job: &SampleJob) -> TriggerVerdict {
        let config = self.config();
        let channel = config.channel.min(job.channels.len().saturating_sub(1));
        let full_scale = ((1u32 << job.header.sample_bits) - 1) as u16;
        let level = (config.level as u32 * full_scale as u32 / 255) as u16;

        let mut info = TriggerInfo {
            mode: config.mode,
            slope: config.slope,
            level,
            holdoff_us: config.holdoff_us,
            channel,
            state: TriggerState::Auto,
            active: false,
            fired_at: None,
        };

        let samples = &job.channels[channel];
        if samples.is_empty() {
            warn!(seq = job.header.seq, "empty payload in trigger evaluation");
            info.state = TriggerState::Error;
            return TriggerVerdict {
                forward: false,
                info,
            };
        }

        let edge = find_edge(samples, config.slope, level);
        let armed = self.is_armed();
        let (last_fired, holdoff) = {
            let runtime = self.runtime.read().expect("trigger runtime lock poisoned");
            (runtime.last_fired, self.holdoff_samples(config.holdoff_us))
        };

        let edge_abs = edge.map(|e| job.header.first_sample_idx + e as u64);
        let in_holdoff = match (edge_abs, last_fired) {
            (Some(at), Some(last)) => at.saturating_sub(last) < holdoff,
            _ => false,
        };

        let (forward, state, fire) = match (config.mode, edge) {
            (TriggerMode::Auto, None) => (true, TriggerState::Auto, false),
            (TriggerMode::Auto, Some(_)) if in_holdoff => (true, TriggerState::Holdoff, false),
            (TriggerMode::Auto, Some(_)) => (true, TriggerState::Triggered, true),
            (TriggerMode::Normal, None) => (false, TriggerState::Waiting, false),
            (TriggerMode::Normal, Some(_)) if in_holdoff => (false, TriggerState::Holdoff, false),
            (TriggerMode::Normal, Some(_)) => (true, TriggerState::Triggered, true),
            (TriggerMode::Single, None) if armed => (false, TriggerState::Armed, false),
            (TriggerMode::Single, None) => (false, TriggerState::Latched, false),
            (TriggerMode::Single, Some(_)) if !armed => (false, TriggerState::Latched, false),
            (TriggerMode::Single, Some(_)) if in_holdoff => (false, TriggerState::Holdoff, false),
            (TriggerMode::Single, Some(_)) => (true, TriggerState::Triggered, true),
        };

        info.state = state;
        if fire {
            if let Some(at) = edge_abs {
                info.active = true;
                info.fired_at = Some(at);
                let mut runtime =
                    self.runtime.write().expect("trigger runtime lock poisoned");
                runtime.last_fired = Some(at);
                if config.mode == TriggerMode::Single {
                    runtime.armed = false;
                }
            }
        }

        TriggerVerdict { forward, info }
    }
}

/// Single-consumer trigger stage: drain the capture queue, evaluate each
/// job, and hand forwarded jobs to the buffer. Dropped jobs still record
/// their trigger outcome so clients see state changes without new data.
/// Returns when the reader closes the queue.
pub fn run_trigger_stage(
    jobs: crossbeam_channel::Receiver<SampleJob>,
    trigger: std::sync::Arc<TriggerController>,
    buffer: std::sync::Arc<RwLock<crate::buffer::SampleBuffer>>,
) {
    for job in jobs.iter() {
        let verdict = trigger.evaluate(&job);
        let mut buffer = buffer.write().expect("buffer lock poisoned");
        if verdict.forward {
            buffer.append(&job, &verdict.info);
        } else {
            buffer.record_trigger(&job, &verdict.info);
        }
    }
    debug!("capture queue closed, trigger stage exiting");
}

/// First index `i > 0` where the slope crosses the level, if any.
fn find_edge(samples: &[u16], slope: TriggerSlope, level: u16) -> Option<usize> {
    let mut prev = samples[0];
    for (i, &cur) in samples.iter().enumerate().skip(1) {
        if slope.crosses(prev, cur, level) {
            return Some(i);
        }
        prev = cur;
    }
    None
}
