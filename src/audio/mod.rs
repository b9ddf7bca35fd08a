//! Audio output path
//!
//! Fragments streamed back by the Live API are decoded on a small worker pool
//! and packed back to back on a single playback timeline. Playback order always
//! equals arrival order, whatever order the decodes finish in.

pub mod decoder;
pub mod device;
pub mod mixer;
pub mod scheduler;

pub use device::{list_output_devices, DeviceOutput};
pub use scheduler::{FragmentScheduler, PlaybackEvent, PlaybackListener};

/// Handle of one scheduled buffer on an output sink
pub type PlaybackId = u64;

/// One chunk of encoded audio as received from the Live API
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFragment {
    /// e.g. `audio/pcm;rate=24000`
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

impl AudioFragment {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// Decoded mono PCM
#[derive(Clone, Debug, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
