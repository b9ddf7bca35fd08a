//! Config Default implementation.

use super::config_struct::Config;
use super::types::{
    default_decode_workers, default_language, default_model, default_session_id, default_voice,
    PollingConfig, StoreConfig,
};

impl Default for Config {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            language: default_language(),
            voice: default_voice(),
            model: default_model(),
            credentials: Vec::new(),
            store: StoreConfig::default(),
            polling: PollingConfig::default(),
            decode_workers: default_decode_workers(),
            output_device: String::new(),
        }
    }
}
