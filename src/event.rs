//! Wire types for the websocket snapshot frame.
//!
//! Field names follow the device's established JSON contract (`seq`,
//! `first_idx`, `samples_per_ch`, ...). Consumers must tolerate unknown
//! fields; absent `min`/`max` arrays mean the window was already at or
//! below display density and downsampling was skipped.

use serde::Serialize;

use crate::trigger::TriggerInfo;

/// Integer bumped only on incompatible frame changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Trigger status echoed inside every snapshot. `index` is relative to the
/// snapshot window, or -1 when the anchor is absent or outside it.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerInfoWire {
    pub mode: &'static str,
    pub slope: &'static str,
    pub level: u16,
    pub holdoff_us: u64,
    pub channel: usize,
    pub state: &'static str,
    pub active: bool,
    pub index: i64,
}

impl TriggerInfoWire {
    pub fn from_info(info: &TriggerInfo, index: i64) -> Self {
        Self {
            mode: info.mode.as_str(),
            slope: info.slope.as_str(),
            level: info.level,
            holdoff_us: info.holdoff_us,
            channel: info.channel,
            state: info.state.as_str(),
            active: info.active,
            index,
        }
    }
}

/// One display frame: the aligned per-channel window plus stream health
/// counters. Serialized once per broadcast tick and fanned out verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEvent {
    pub seq: u32,
    /// Absolute index of the first sample in the window.
    pub first_idx: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Window length per channel after alignment.
    pub samples_per_ch: u32,
    pub sample_bits: u16,
    pub flags: u16,
    pub samples: Vec<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Vec<Vec<u16>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Vec<Vec<u16>>>,
    pub history_secs: f64,
    /// Ring fill fraction in [0, 1].
    pub buffer_fill: f64,
    /// Cumulative samples lost to queue drops, gaps, and ring overflow.
    pub dropped: u64,
    /// Receive-to-append delay of the newest packet, microseconds.
    pub ingest_lag_us: u64,
    /// Absolute index of the latest accepted trigger edge, 0 when absent.
    pub trigger_idx: u64,
    pub schema_version: u32,
    pub trigger: TriggerInfoWire,
}
