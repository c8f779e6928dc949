//! PCM audio frame as delivered by the media transport.

/// One frame of 16-bit PCM audio.
///
/// Frames arrive from the transport already decoded; timestamps are the
/// transport's capture clock in milliseconds and are only compared within a
/// single speaker's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub data: Vec<i16>,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate_hz == 0 || self.channels == 0 {
            return 0;
        }
        let samples_per_channel = self.data.len() as u64 / self.channels as u64;
        samples_per_channel * 1000 / self.sample_rate_hz as u64
    }
}
