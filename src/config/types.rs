//! Config sub-types and serde default helpers.

use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Native audio model used for the interpreter session
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

pub const DEFAULT_LANGUAGE: &str = "en-tl";
pub const DEFAULT_VOICE: &str = "Charon";
pub const DEFAULT_SESSION_ID: &str = "43f847a2-6836-4d5f-b16e-bf67f12972e5";

pub const POLLING_INTERVAL_MIN_MS: u64 = 800;
pub const POLLING_INTERVAL_MAX_MS: u64 = 2000;

pub const DEFAULT_DECODE_WORKERS: usize = 2;

// ============================================================================
// TRANSCRIPT STORE
// ============================================================================

/// Where transcripts are polled from and where shared credentials live.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// Base URL of the REST endpoint. Empty disables the store.
    #[serde(default)]
    pub url: String,
    /// Anonymous API key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_transcripts_table")]
    pub transcripts_table: String,
    #[serde(default = "default_keys_table")]
    pub keys_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            transcripts_table: default_transcripts_table(),
            keys_table: default_keys_table(),
        }
    }
}

impl StoreConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

// ============================================================================
// POLLING
// ============================================================================

/// Bounds of the randomized transcript polling interval, in milliseconds
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PollingConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: POLLING_INTERVAL_MIN_MS,
            max_interval_ms: POLLING_INTERVAL_MAX_MS,
        }
    }
}

// ============================================================================
// SERDE DEFAULTS
// ============================================================================

pub fn default_model() -> String {
    DEFAULT_LIVE_MODEL.to_string()
}
pub fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}
pub fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}
pub fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}
pub fn default_decode_workers() -> usize {
    DEFAULT_DECODE_WORKERS
}
fn default_transcripts_table() -> String {
    "transcriptions".to_string()
}
fn default_keys_table() -> String {
    "orbit_keys".to_string()
}
fn default_min_interval_ms() -> u64 {
    POLLING_INTERVAL_MIN_MS
}
fn default_max_interval_ms() -> u64 {
    POLLING_INTERVAL_MAX_MS
}
