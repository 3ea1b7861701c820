//! End-to-end scenarios for the decode -> trigger -> buffer -> snapshot
//! path, driven through the library types without sockets.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use udpscope::buffer::SampleBuffer;
use udpscope::capture::CaptureQueue;
use udpscope::packet::{decode_datagram, SampleJob, HEADER_SIZE};
use udpscope::trigger::{
    run_trigger_stage, TriggerController, TriggerMode, TriggerSlope, TriggerUpdate,
};

fn datagram(seq: u32, first_idx: u64, channels: u16, payload: &[u8]) -> Vec<u8> {
    let samples_per_ch = (payload.len() / channels as usize) as u16;
    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len());
    data.extend_from_slice(&seq.to_le_bytes());
    data.extend_from_slice(&first_idx.to_le_bytes());
    data.extend_from_slice(&channels.to_le_bytes());
    data.extend_from_slice(&samples_per_ch.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&8u16.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

fn job(seq: u32, first_idx: u64, channels: u16, payload: &[u8]) -> SampleJob {
    decode_datagram(&datagram(seq, first_idx, channels, payload), Instant::now()).unwrap()
}

struct Rig {
    trigger: TriggerController,
    buffer: SampleBuffer,
}

impl Rig {
    fn new(capacity: usize, update: TriggerUpdate) -> Self {
        let trigger = TriggerController::new(1_000_000);
        trigger.apply(update);
        Self {
            trigger,
            buffer: SampleBuffer::new(capacity, 1_000_000, 1.0),
        }
    }

    fn feed(&mut self, job: &SampleJob) -> bool {
        let verdict = self.trigger.evaluate(job);
        if verdict.forward {
            self.buffer.append(job, &verdict.info);
        } else {
            self.buffer.record_trigger(job, &verdict.info);
        }
        verdict.forward
    }
}

#[test]
fn auto_idle_snapshot() {
    let mut rig = Rig::new(256, TriggerUpdate::default());
    rig.feed(&job(1, 0, 1, &[0x00, 0x40, 0x80, 0xC0]));

    let (event, _) = rig.buffer.snapshot(256).unwrap();
    assert_eq!(event.samples, vec![vec![0, 64, 128, 192]]);
    // The default rising/128 trigger sees the 0x80 boundary.
    assert_eq!(event.trigger.state, "triggered");
    assert_eq!(event.trigger.index, 2);
    assert_eq!(event.trigger.level, 128);
}

#[test]
fn normal_mode_rising_edge_then_waiting() {
    let mut rig = Rig::new(
        256,
        TriggerUpdate {
            mode: Some(TriggerMode::Normal),
            slope: Some(TriggerSlope::Rising),
            ..Default::default()
        },
    );

    assert!(rig.feed(&job(1, 0, 1, &[0x10, 0x20, 0x90, 0x70])));
    let (event, v1) = rig.buffer.snapshot(256).unwrap();
    assert_eq!(event.trigger.state, "triggered");
    assert_eq!(event.trigger.index, 2);
    assert_eq!(event.trigger.level, 128);

    // No crossing: the job is dropped, but the version still advances so
    // the hub re-broadcasts the latest buffer state with the new status.
    assert!(!rig.feed(&job(2, 4, 1, &[0x20, 0x30, 0x40, 0x50])));
    let (event, v2) = rig.buffer.snapshot(256).unwrap();
    assert!(v2 > v1);
    assert_eq!(event.samples, vec![vec![16, 32, 144, 112]]);
    assert_eq!(event.trigger.state, "waiting");
    assert_eq!(event.trigger.index, -1);
}

#[test]
fn single_shot_fires_exactly_once_per_arm() {
    let mut rig = Rig::new(
        256,
        TriggerUpdate {
            mode: Some(TriggerMode::Single),
            ..Default::default()
        },
    );
    rig.trigger.arm_single();

    let edge = [0x00, 0x00, 0xF0, 0xF0];
    assert!(rig.feed(&job(1, 0, 1, &edge)));
    let (event, _) = rig.buffer.snapshot(256).unwrap();
    assert_eq!(event.trigger.state, "triggered");

    // Second edge: latched, nothing forwarded.
    assert!(!rig.feed(&job(2, 4, 1, &edge)));
    let (event, _) = rig.buffer.snapshot(256).unwrap();
    assert_eq!(event.trigger.state, "latched");
    assert_eq!(event.samples_per_ch, 4);

    // Re-arm: the next edge fires exactly once again.
    rig.trigger.arm_single();
    assert!(rig.feed(&job(3, 8, 1, &edge)));
    assert!(!rig.feed(&job(4, 12, 1, &edge)));
}

#[test]
fn gap_resets_time_base_and_counts_drops() {
    let mut rig = Rig::new(256, TriggerUpdate::default());
    rig.feed(&job(1, 0, 1, &[0u8; 8]));
    rig.feed(&job(2, 32, 1, &[1u8; 8]));

    let (event, _) = rig.buffer.snapshot(256).unwrap();
    assert!(event.dropped >= 24);
    assert_eq!(event.first_idx, 32);
    assert_eq!(event.samples, vec![vec![1u16; 8]]);
}

#[test]
fn ring_overflow_keeps_newest_window() {
    let mut rig = Rig::new(16, TriggerUpdate::default());
    for p in 0..4u32 {
        let samples: Vec<u8> = (p * 8..p * 8 + 8).map(|v| v as u8).collect();
        rig.feed(&job(p + 1, p as u64 * 8, 1, &samples));
    }

    let (event, _) = rig.buffer.snapshot(64).unwrap();
    assert_eq!(event.dropped, 16);
    assert_eq!(event.buffer_fill, 1.0);
    assert_eq!(event.first_idx, 16);
    let expect: Vec<u16> = (16..32).collect();
    assert_eq!(event.samples, vec![expect]);
}

#[test]
fn two_channel_stream_stays_aligned() {
    let mut rig = Rig::new(256, TriggerUpdate::default());
    // Interleaved: ch0 = 1,3,5,7  ch1 = 2,4,6,8
    rig.feed(&job(1, 0, 2, &[1, 2, 3, 4, 5, 6, 7, 8]));
    let (event, _) = rig.buffer.snapshot(256).unwrap();
    assert_eq!(event.channels, 2);
    assert_eq!(event.samples[0], vec![1, 3, 5, 7]);
    assert_eq!(event.samples[1], vec![2, 4, 6, 8]);
    assert_eq!(event.first_idx + event.samples_per_ch as u64, 4);
}

#[test]
fn queue_to_buffer_through_trigger_thread() {
    let (tx, rx) = CaptureQueue::new(8).split();
    let trigger = Arc::new(TriggerController::new(1_000_000));
    let buffer = Arc::new(RwLock::new(SampleBuffer::new(1024, 1_000_000, 1.0)));

    let stage = {
        let trigger = trigger.clone();
        let buffer = buffer.clone();
        std::thread::spawn(move || run_trigger_stage(rx, trigger, buffer))
    };

    for p in 0..8u32 {
        tx.push(job(p + 1, p as u64 * 4, 1, &[0, 64, 192, 128]));
    }
    // Closing the queue drains the stage and ends the thread.
    drop(tx);
    stage.join().unwrap();

    let buffer = buffer.read().unwrap();
    let (event, _) = buffer.snapshot(1024).unwrap();
    assert_eq!(event.samples_per_ch, 32);
    assert_eq!(event.seq, 8);
    assert_eq!(event.dropped, 0);
}
