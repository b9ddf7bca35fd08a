//! Config struct definition.

use serde::{Deserialize, Serialize};

use super::types::{
    default_decode_workers, default_language, default_model, default_session_id, default_voice,
    PollingConfig, StoreConfig,
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Transcript session the relay follows
    #[serde(default = "default_session_id")]
    pub session_id: String,
    /// Target language code (see `catalog::LANGUAGES`)
    #[serde(default = "default_language")]
    pub language: String,
    /// Prebuilt voice name
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_model")]
    pub model: String,

    // --- Credentials ---
    /// Local tokens, loaded ahead of the ones listed by the store
    #[serde(default)]
    pub credentials: Vec<String>,

    // --- Transcript Store ---
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub polling: PollingConfig,

    // --- Playback ---
    #[serde(default = "default_decode_workers")]
    pub decode_workers: usize,
    #[serde(default)]
    pub output_device: String, // Device name, empty = system default
}

impl Config {
    /// Repair values that would make the relay misbehave.
    pub fn normalized(mut self) -> Self {
        if self.polling.min_interval_ms > self.polling.max_interval_ms {
            std::mem::swap(
                &mut self.polling.min_interval_ms,
                &mut self.polling.max_interval_ms,
            );
        }
        if self.polling.max_interval_ms == 0 {
            self.polling = PollingConfig::default();
        }
        if self.decode_workers == 0 {
            self.decode_workers = default_decode_workers();
        }
        self.credentials.retain(|t| !t.trim().is_empty());
        self
    }
}
