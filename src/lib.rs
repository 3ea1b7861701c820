//! udpscope — host-side capture and trigger engine for a networked
//! oscilloscope.
//!
//! A microcontroller streams ADC samples in fixed UDP datagrams; this crate
//! ingests them at line rate, runs a classical scope trigger over the
//! selected channel, keeps a seconds-deep per-channel history ring, and
//! fans out JSON snapshots to websocket viewers at a bounded display rate.
//!
//! Pipeline, leaves first:
//!
//! ```text
//! UdpSocket -> capture (reader thread) -> CaptureQueue -> trigger (thread)
//!           -> SampleBuffer (RwLock) <- Hub tick (tokio) -> ws clients
//! ```
//!
//! The hub owns the buffer and the trigger controller; the reader owns only
//! the queue; the function-generator relay is a leaf. Nothing points back
//! at the hub.

pub mod args;
pub mod buffer;
pub mod capture;
pub mod command;
pub mod downsample;
pub mod event;
pub mod hub;
pub mod packet;
pub mod relay;
pub mod ring;
pub mod server;
pub mod trigger;

pub use buffer::SampleBuffer;
pub use capture::CaptureQueue;
pub use hub::Hub;
pub use packet::{PacketHeader, SampleJob};
pub use relay::FgRelay;
pub use trigger::TriggerController;
