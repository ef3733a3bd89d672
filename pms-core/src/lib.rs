use serde::{Deserialize, Serialize};

pub mod protocol;

pub use protocol::command::{Command, WAKE_STABILIZATION};
pub use protocol::decoder::{DecoderStats, DiscardReason, FrameDecoder, Ingest};

/// One decoded measurement frame.
///
/// Every field is a big-endian word taken from two consecutive payload bytes.
/// Concentrations are in µg/m³, particle counts are per 0.1 L of air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// PM1.0 concentration, standard particle (CF=1).
    pub pm1_0_standard: u16,
    /// PM2.5 concentration, standard particle (CF=1).
    pub pm2_5_standard: u16,
    /// PM10 concentration, standard particle (CF=1).
    pub pm10_0_standard: u16,
    /// PM1.0 concentration under atmospheric environment.
    pub pm1_0_atmospheric: u16,
    /// PM2.5 concentration under atmospheric environment.
    pub pm2_5_atmospheric: u16,
    /// PM10 concentration under atmospheric environment.
    pub pm10_0_atmospheric: u16,
    /// Particles with diameter beyond 0.3 µm.
    pub particles_0_3: u16,
    /// Particles with diameter beyond 0.5 µm.
    pub particles_0_5: u16,
    /// Particles with diameter beyond 1.0 µm.
    pub particles_1_0: u16,
    /// Particles with diameter beyond 2.5 µm.
    pub particles_2_5: u16,
    /// Particles with diameter beyond 5.0 µm.
    pub particles_5_0: u16,
    /// Particles with diameter beyond 10 µm.
    pub particles_10_0: u16,
}

impl MeasurementRecord {
    /// Value held by every field until the first valid frame arrives.
    pub const SENTINEL: u16 = 0xFFFF;

    /// Record published before any frame has validated.
    pub const NO_DATA: Self = Self::from_words([Self::SENTINEL; Self::WORD_COUNT]);

    /// Number of words carried by a record.
    pub const WORD_COUNT: usize = 12;

    /// Build a record from its words, in wire order.
    pub const fn from_words(words: [u16; Self::WORD_COUNT]) -> Self {
        Self {
            pm1_0_standard: words[0],
            pm2_5_standard: words[1],
            pm10_0_standard: words[2],
            pm1_0_atmospheric: words[3],
            pm2_5_atmospheric: words[4],
            pm10_0_atmospheric: words[5],
            particles_0_3: words[6],
            particles_0_5: words[7],
            particles_1_0: words[8],
            particles_2_5: words[9],
            particles_5_0: words[10],
            particles_10_0: words[11],
        }
    }

    /// Decode the record from the first 24 bytes of a frame payload.
    /// Words missing from a shorter payload decode as 0.
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut words = [0u16; Self::WORD_COUNT];
        for (word, pair) in words.iter_mut().zip(payload.chunks_exact(2)) {
            *word = u16::from_be_bytes([pair[0], pair[1]]);
        }
        Self::from_words(words)
    }

    /// The record's words, in wire order.
    pub const fn words(&self) -> [u16; Self::WORD_COUNT] {
        [
            self.pm1_0_standard,
            self.pm2_5_standard,
            self.pm10_0_standard,
            self.pm1_0_atmospheric,
            self.pm2_5_atmospheric,
            self.pm10_0_atmospheric,
            self.particles_0_3,
            self.particles_0_5,
            self.particles_1_0,
            self.particles_2_5,
            self.particles_5_0,
            self.particles_10_0,
        ]
    }

    /// Whether this is the placeholder published before the first valid frame.
    pub fn is_no_data(&self) -> bool {
        *self == Self::NO_DATA
    }
}

impl Default for MeasurementRecord {
    fn default() -> Self {
        Self::NO_DATA
    }
}

/// Reporting mode of the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Sensor streams frames unsolicited. Power-up default.
    #[default]
    Active,
    /// Sensor answers only a request-read command.
    Passive,
}

/// Whether a validated frame has been published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameStatus {
    /// No frame has validated yet.
    #[default]
    Waiting,
    /// At least one frame has validated. Never reverts to `Waiting`.
    Ok,
}
