use super::*;
use crate::{FrameStatus, MeasurementRecord};

/// Why a partially received frame was dropped.
///
/// Discards are never errors: line noise and resynchronisation are expected
/// on a free-running serial line. They are reported so callers can log them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// First marker matched but the next byte was not the second marker.
    BadSecondMarker(u8),
    /// Declared frame length is neither of the supported variants.
    UnsupportedLength(u16),
    /// Trailing checksum did not match the sum of the frame bytes.
    ChecksumMismatch { received: u16, calculated: u16 },
}

/// Outcome of feeding one byte to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Byte consumed, no frame finished.
    Pending,
    /// A frame validated and its record is now published.
    Complete(MeasurementRecord),
    /// The frame in progress was abandoned.
    Discarded(DiscardReason),
}

/// Running counters kept by a [`FrameDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub bytes_ingested: u64,
    pub frames_decoded: u64,
    pub checksum_failures: u64,
    /// Frames abandoned on a bad second marker or an unsupported length.
    pub resyncs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitMarker1,
    AwaitMarker2,
    ReadLengthHigh,
    ReadLengthLow { high: u8 },
    ReadPayload { remaining: u16 },
    ReadChecksumHigh,
    ReadChecksumLow { high: u8 },
}

/// Byte-at-a-time decoder for the sensor's measurement frames.
///
/// The decoder owns the single published [`MeasurementRecord`] and overwrites
/// it in place whenever a frame validates. Until then the record holds
/// [`MeasurementRecord::NO_DATA`] and [`status`](Self::status) is
/// [`FrameStatus::Waiting`].
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecodeState,
    calculated: u16,
    payload: [u8; PAYLOAD_CAPACITY],
    payload_len: usize,
    status: FrameStatus,
    record: MeasurementRecord,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::AwaitMarker1,
            calculated: 0,
            payload: [0; PAYLOAD_CAPACITY],
            payload_len: 0,
            status: FrameStatus::Waiting,
            record: MeasurementRecord::NO_DATA,
            stats: DecoderStats::default(),
        }
    }

    /// Abandon the frame in progress. Status and the published record are kept.
    pub fn reset(&mut self) {
        self.state = DecodeState::AwaitMarker1;
    }

    pub fn status(&self) -> FrameStatus {
        self.status
    }

    /// The most recently published record.
    pub fn latest(&self) -> MeasurementRecord {
        self.record
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Whether the decoder sits between frames.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::AwaitMarker1
    }

    /// Feed one byte.
    pub fn ingest(&mut self, byte: u8) -> Ingest {
        self.stats.bytes_ingested += 1;

        match self.state {
            DecodeState::AwaitMarker1 => {
                // Anything but the first marker is skipped silently.
                if byte == START_MARKER_1 {
                    self.calculated = u16::from(byte);
                    self.payload = [0; PAYLOAD_CAPACITY];
                    self.payload_len = 0;
                    self.state = DecodeState::AwaitMarker2;
                }
                Ingest::Pending
            }
            DecodeState::AwaitMarker2 => {
                if byte != START_MARKER_2 {
                    return self.discard(DiscardReason::BadSecondMarker(byte));
                }
                self.accumulate(byte);
                self.state = DecodeState::ReadLengthHigh;
                Ingest::Pending
            }
            DecodeState::ReadLengthHigh => {
                self.accumulate(byte);
                self.state = DecodeState::ReadLengthLow { high: byte };
                Ingest::Pending
            }
            DecodeState::ReadLengthLow { high } => {
                let frame_len = u16::from_be_bytes([high, byte]);
                if !SUPPORTED_FRAME_LENGTHS.contains(&frame_len) {
                    return self.discard(DiscardReason::UnsupportedLength(frame_len));
                }
                self.accumulate(byte);
                self.state = DecodeState::ReadPayload {
                    remaining: frame_len - CHECKSUM_SIZE as u16,
                };
                Ingest::Pending
            }
            DecodeState::ReadPayload { remaining } => {
                self.accumulate(byte);
                if let Some(slot) = self.payload.get_mut(self.payload_len) {
                    *slot = byte;
                }
                self.payload_len += 1;

                self.state = match remaining - 1 {
                    0 => DecodeState::ReadChecksumHigh,
                    remaining => DecodeState::ReadPayload { remaining },
                };
                Ingest::Pending
            }
            DecodeState::ReadChecksumHigh => {
                self.state = DecodeState::ReadChecksumLow { high: byte };
                Ingest::Pending
            }
            DecodeState::ReadChecksumLow { high } => {
                self.state = DecodeState::AwaitMarker1;

                let received = u16::from_be_bytes([high, byte]);
                if received != self.calculated {
                    self.stats.checksum_failures += 1;
                    return Ingest::Discarded(DiscardReason::ChecksumMismatch {
                        received,
                        calculated: self.calculated,
                    });
                }

                self.record = MeasurementRecord::from_payload(&self.payload);
                self.status = FrameStatus::Ok;
                self.stats.frames_decoded += 1;
                Ingest::Complete(self.record)
            }
        }
    }

    /// Feed a chunk of bytes, returning the last record completed in it.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<MeasurementRecord> {
        let mut completed = None;
        for &byte in bytes {
            if let Ingest::Complete(record) = self.ingest(byte) {
                completed = Some(record);
            }
        }
        completed
    }

    fn accumulate(&mut self, byte: u8) {
        self.calculated = self.calculated.wrapping_add(u16::from(byte));
    }

    // The offending byte is consumed; scanning restarts with its successor.
    fn discard(&mut self, reason: DiscardReason) -> Ingest {
        self.state = DecodeState::AwaitMarker1;
        self.stats.resyncs += 1;
        Ingest::Discarded(reason)
    }
}
