//! Inbound control frames from viewing clients.
//!
//! Every frame is a JSON object discriminated by `cmd`. Numeric fields
//! arrive as doubles and are coerced and clamped server-side; invalid
//! values are never a reason to reject a frame. Unknown commands and
//! malformed JSON are logged and ignored.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::hub::Hub;
use crate::relay::FgRelay;
use crate::trigger::{TriggerController, TriggerMode, TriggerSlope, TriggerUpdate};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    SetTrigger {
        mode: Option<String>,
        slope: Option<String>,
        level: Option<f64>,
        holdoff_us: Option<f64>,
        channel: Option<f64>,
    },
    ArmSingle,
    SetView {
        samples: Option<f64>,
    },
    FgSend {
        line: String,
    },
}

/// Parse and apply one text frame.
pub fn handle_frame(text: &str, trigger: &TriggerController, hub: &Hub, relay: &FgRelay) {
    let command: Command = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, frame = text, "ignoring unparseable command frame");
            return;
        }
    };
    dispatch(command, trigger, hub, relay);
}

fn dispatch(command: Command, trigger: &TriggerController, hub: &Hub, relay: &FgRelay) {
    match command {
        Command::SetTrigger {
            mode,
            slope,
            level,
            holdoff_us,
            channel,
        } => {
            let mode = mode.as_deref().and_then(|m| {
                let parsed = TriggerMode::parse(m);
                if parsed.is_none() {
                    warn!(mode = m, "unknown trigger mode ignored");
                }
                parsed
            });
            let slope = slope.as_deref().and_then(|s| {
                let parsed = TriggerSlope::parse(s);
                if parsed.is_none() {
                    warn!(slope = s, "unknown trigger slope ignored");
                }
                parsed
            });
            trigger.apply(TriggerUpdate {
                mode,
                slope,
                level: level.map(|v| v.max(0.0).min(255.0) as u8),
                holdoff_us: holdoff_us.map(|v| v.max(0.0) as u64),
                channel: channel.map(|v| v.max(0.0) as usize),
            });
        }
        Command::ArmSingle => trigger.arm_single(),
        Command::SetView { samples } => {
            let Some(samples) = samples else {
                warn!("set_view without samples ignored");
                return;
            };
            hub.set_view(samples.max(0.0) as usize);
        }
        Command::FgSend { line } => {
            debug!(line = line.trim(), "fg_send");
            relay.send_line(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, RwLock};

    use crate::buffer::{SampleBuffer, MIN_SNAPSHOT_SAMPLES};
    use crate::trigger::TriggerMode;

    fn fixture() -> (Arc<TriggerController>, Hub, FgRelay) {
        let trigger = Arc::new(TriggerController::new(1_000_000));
        let buffer = Arc::new(RwLock::new(SampleBuffer::new(4096, 1_000_000, 1.0)));
        let hub = Hub::new(buffer, trigger.clone(), 30);
        let relay = FgRelay::connect("").unwrap();
        (trigger, hub, relay)
    }

    #[test]
    fn test_set_trigger_applies_and_clamps() {
        let (trigger, hub, relay) = fixture();
        handle_frame(
            r#"{"cmd":"set_trigger","mode":"normal","slope":"falling","level":512,"holdoff_us":-4,"channel":1}"#,
            &trigger,
            &hub,
            &relay,
        );
        let config = trigger.config();
        assert_eq!(config.mode, TriggerMode::Normal);
        assert_eq!(config.slope.as_str(), "falling");
        assert_eq!(config.level, 255);
        assert_eq!(config.holdoff_us, 0);
        assert_eq!(config.channel, 1);
    }

    #[test]
    fn test_set_trigger_is_idempotent() {
        let (trigger, hub, relay) = fixture();
        let frame = r#"{"cmd":"set_trigger","mode":"single","level":100}"#;
        handle_frame(frame, &trigger, &hub, &relay);
        let first = trigger.config();
        let armed_first = trigger.is_armed();
        handle_frame(frame, &trigger, &hub, &relay);
        assert_eq!(trigger.config().level, first.level);
        assert_eq!(trigger.config().mode, first.mode);
        assert_eq!(trigger.is_armed(), armed_first);
    }

    #[test]
    fn test_mode_change_preserves_armed() {
        let (trigger, hub, relay) = fixture();
        handle_frame(r#"{"cmd":"set_trigger","mode":"single"}"#, &trigger, &hub, &relay);
        assert!(!trigger.is_armed());
        handle_frame(r#"{"cmd":"arm_single"}"#, &trigger, &hub, &relay);
        assert!(trigger.is_armed());
        handle_frame(r#"{"cmd":"set_trigger","mode":"auto"}"#, &trigger, &hub, &relay);
        assert!(trigger.is_armed());
    }

    #[test]
    fn test_unknown_mode_keeps_current() {
        let (trigger, hub, relay) = fixture();
        handle_frame(r#"{"cmd":"set_trigger","mode":"normal"}"#, &trigger, &hub, &relay);
        handle_frame(r#"{"cmd":"set_trigger","mode":"bogus"}"#, &trigger, &hub, &relay);
        assert_eq!(trigger.config().mode, TriggerMode::Normal);
    }

    #[test]
    fn test_set_view_clamped() {
        let (trigger, hub, relay) = fixture();
        handle_frame(r#"{"cmd":"set_view","samples":2}"#, &trigger, &hub, &relay);
        assert_eq!(hub.snapshot_samples(), MIN_SNAPSHOT_SAMPLES);
        handle_frame(r#"{"cmd":"set_view","samples":1e9}"#, &trigger, &hub, &relay);
        assert_eq!(hub.snapshot_samples(), 4096);
    }

    #[test]
    fn test_unknown_and_malformed_ignored() {
        let (trigger, hub, relay) = fixture();
        let before = trigger.config();
        handle_frame(r#"{"cmd":"reboot"}"#, &trigger, &hub, &relay);
        handle_frame("not json at all", &trigger, &hub, &relay);
        handle_frame(r#"{"nocmd":true}"#, &trigger, &hub, &relay);
        assert_eq!(trigger.config().mode, before.mode);
        assert_eq!(trigger.config().level, before.level);
    }
}
