//! Wire format of the ADC datagram stream and the decode into per-channel
//! sample vectors.
//!
//! Every datagram starts with a 20-byte little-endian header followed by an
//! interleaved payload: for each sample index, one value per channel in
//! channel order. The device currently emits 8-bit samples; the decoder
//! widens everything to u16 so downstream stages are width-agnostic.

use std::time::Instant;

use thiserror::Error;

/// Size of [`PacketHeader`] on the wire.
pub const HEADER_SIZE: usize = 20;

/// Largest datagram we will accept (UDP maximum).
pub const MAX_DATAGRAM: usize = 65535;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too small: {0} bytes")]
    TooShort(usize),
    #[error("header reports zero channels")]
    ZeroChannels,
    #[error("invalid sample bits: {0}")]
    BadSampleBits(u16),
    #[error("unsupported sample bits: {0}")]
    UnsupportedSampleBits(u16),
    #[error("payload mismatch: have {have}, expected {expected}")]
    PayloadMismatch { have: usize, expected: usize },
}

/// Fixed header preceding every sample payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub seq: u32,
    /// Absolute index of the first sample in this packet, monotonic per
    /// stream. The sole source of truth for gap detection.
    pub first_sample_idx: u64,
    pub channels: u16,
    pub samples_per_ch: u16,
    pub flags: u16,
    pub sample_bits: u16,
}

impl PacketHeader {
    pub fn sample_bytes(&self) -> usize {
        (self.sample_bits / 8) as usize
    }

    pub fn payload_len(&self) -> usize {
        self.channels as usize * self.samples_per_ch as usize * self.sample_bytes()
    }
}

/// A decoded datagram: header, one sample vector per channel, and the
/// monotonic receive timestamp used for end-to-end lag accounting.
#[derive(Debug, Clone)]
pub struct SampleJob {
    pub header: PacketHeader,
    pub channels: Vec<Vec<u16>>,
    pub received: Instant,
}

/// Split a datagram into header and payload, validating both.
pub fn parse_packet(data: &[u8]) -> Result<(PacketHeader, &[u8]), PacketError> {
    if data.len() < HEADER_SIZE {
        return Err(PacketError::TooShort(data.len()));
    }

    let header = PacketHeader {
        seq: u32::from_le_bytes(data[0..4].try_into().unwrap()),
        first_sample_idx: u64::from_le_bytes(data[4..12].try_into().unwrap()),
        channels: u16::from_le_bytes(data[12..14].try_into().unwrap()),
        samples_per_ch: u16::from_le_bytes(data[14..16].try_into().unwrap()),
        flags: u16::from_le_bytes(data[16..18].try_into().unwrap()),
        sample_bits: u16::from_le_bytes(data[18..20].try_into().unwrap()),
    };

    if header.channels == 0 {
        return Err(PacketError::ZeroChannels);
    }
    if header.sample_bits == 0 || header.sample_bits % 8 != 0 {
        return Err(PacketError::BadSampleBits(header.sample_bits));
    }
    // Current firmware emits 8-bit samples only.
    if header.sample_bits != 8 {
        return Err(PacketError::UnsupportedSampleBits(header.sample_bits));
    }

    let payload = &data[HEADER_SIZE..];
    let expected = header.payload_len();
    if payload.len() != expected {
        return Err(PacketError::PayloadMismatch {
            have: payload.len(),
            expected,
        });
    }

    Ok((header, payload))
}

/// De-interleave the payload into per-channel vectors, widening to u16.
///
/// Channel `c`, position `i` comes from the bytes at
/// `(i * channels + c) * sample_bytes`, little-endian.
pub fn decode_channels(header: &PacketHeader, payload: &[u8]) -> Vec<Vec<u16>> {
    let channels = header.channels as usize;
    let samples = header.samples_per_ch as usize;
    let sample_bytes = header.sample_bytes();

    let mut out = vec![Vec::with_capacity(samples); channels];
    for i in 0..samples {
        for (c, chan) in out.iter_mut().enumerate() {
            let start = (i * channels + c) * sample_bytes;
            let mut v = 0u16;
            for b in 0..sample_bytes {
                v |= (payload[start + b] as u16) << (8 * b);
            }
            chan.push(v);
        }
    }
    out
}

/// Parse and decode a whole datagram, stamping the receive time.
pub fn decode_datagram(data: &[u8], received: Instant) -> Result<SampleJob, PacketError> {
    let (header, payload) = parse_packet(data)?;
    let channels = decode_channels(&header, payload);
    Ok(SampleJob {
        header,
        channels,
        received,
    })
}
