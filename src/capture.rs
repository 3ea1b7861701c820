//! The UDP ingest loop and the bounded, lossy hand-off to the trigger
//! stage.
//!
//! The reader never blocks on downstream stages: when the queue is full the
//! oldest queued job is discarded in favor of the newest. Continuity is
//! already broken once the network drops packets; queueing latency on top
//! would only make the display stale as well as gapped.

use std::net::UdpSocket;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::packet::{decode_datagram, SampleJob, MAX_DATAGRAM};

/// Bounded single-producer single-consumer job queue with newest-wins
/// overflow.
pub struct CaptureQueue {
    tx: Sender<SampleJob>,
    rx: Receiver<SampleJob>,
}

/// Producer half. Holds a receiver clone so it can evict the oldest job
/// when the queue is full.
pub struct CaptureSender {
    tx: Sender<SampleJob>,
    rx: Receiver<SampleJob>,
}

impl CaptureQueue {
    pub fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth.max(1));
        Self { tx, rx }
    }

    pub fn split(self) -> (CaptureSender, Receiver<SampleJob>) {
        let consumer = self.rx.clone();
        (
            CaptureSender {
                tx: self.tx,
                rx: self.rx,
            },
            consumer,
        )
    }
}

impl CaptureSender {
    /// Enqueue a job, evicting the oldest queued one on overflow. Returns
    /// the evicted job's (seq, sample count) when something was dropped.
    pub fn push(&self, job: SampleJob) -> Option<(u32, u64)> {
        let mut evicted = None;
        let mut job = job;
        loop {
            match self.tx.try_send(job) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    if let Ok(old) = self.rx.try_recv() {
                        evicted = Some((
                            old.header.seq,
                            old.header.channels as u64 * old.header.samples_per_ch as u64,
                        ));
                    }
                    job = back;
                }
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }
}

/// Read datagrams until the socket fails, decoding each and handing it to
/// the trigger stage. Dropping the sender on return closes the queue and
/// lets the consumer drain and exit.
pub fn capture_udp(socket: UdpSocket, queue: CaptureSender, dump_packets: bool) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut last_seq: Option<u32> = None;

    loop {
        let (n, remote) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "udp receive failed, stopping reader");
                return;
            }
        };
        if n == 0 {
            continue;
        }

        let job = match decode_datagram(&buf[..n], Instant::now()) {
            Ok(job) => job,
            Err(e) => {
                warn!(%remote, len = n, error = %e, "invalid datagram");
                continue;
            }
        };

        if let Some(last) = last_seq {
            if job.header.seq != last.wrapping_add(1) {
                warn!(last, got = job.header.seq, "sequence jump");
            }
        }
        last_seq = Some(job.header.seq);

        if dump_packets {
            info!(
                seq = job.header.seq,
                first_idx = job.header.first_sample_idx,
                channels = job.header.channels,
                samples = job.header.samples_per_ch,
                flags = format_args!("0x{:04X}", job.header.flags),
                head = ?&job.channels[0][..job.channels[0].len().min(8)],
                "rx"
            );
        }

        if let Some((seq, samples)) = queue.push(job) {
            debug!(seq, samples, "capture queue full, dropped oldest job");
        }
    }
}
