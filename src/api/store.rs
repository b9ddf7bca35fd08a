//! Remote transcript store (PostgREST tables behind a Supabase-style API)

use tracing::debug;

use super::client::UREQ_AGENT;
use crate::config::StoreConfig;
use crate::error::{RelayError, RelayResult};

/// Where new text and shared credentials come from
pub trait TranscriptStore: Send + Sync {
    /// Most recent transcript of a session, if any
    fn fetch_latest(&self, session_id: &str) -> RelayResult<Option<String>>;

    /// Shared credentials, oldest first
    fn list_credentials(&self) -> RelayResult<Vec<String>>;

    fn add_credential(&self, token: &str) -> RelayResult<bool>;
}

pub struct RestStore {
    config: StoreConfig,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    fn table_url(&self, table: &str, params: &[(&str, &str)]) -> RelayResult<url::Url> {
        let base = format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            table
        );
        url::Url::parse_with_params(&base, params)
            .map_err(|e| RelayError::Store(format!("bad store url: {}", e)))
    }

    fn latest_url(&self, session_id: &str) -> RelayResult<url::Url> {
        let filter = format!("eq.{}", session_id);
        self.table_url(
            &self.config.transcripts_table,
            &[
                ("select", "text"),
                ("session_id", filter.as_str()),
                ("order", "created_at.desc"),
                ("limit", "1"),
            ],
        )
    }

    fn keys_url(&self) -> RelayResult<url::Url> {
        self.table_url(
            &self.config.keys_table,
            &[("select", "token"), ("order", "created_at.asc")],
        )
    }

    fn get_rows(&self, url: &url::Url) -> RelayResult<Vec<serde_json::Value>> {
        let bearer = format!("Bearer {}", self.config.api_key);
        UREQ_AGENT
            .get(url.as_str())
            .header("apikey", self.config.api_key.as_str())
            .header("Authorization", bearer.as_str())
            .call()
            .map_err(|e| RelayError::Store(e.to_string()))?
            .into_body()
            .read_json::<Vec<serde_json::Value>>()
            .map_err(|e| RelayError::Store(format!("bad response: {}", e)))
    }
}

impl TranscriptStore for RestStore {
    fn fetch_latest(&self, session_id: &str) -> RelayResult<Option<String>> {
        if !self.config.is_configured() || session_id.trim().is_empty() {
            return Ok(None);
        }
        let rows = self.get_rows(&self.latest_url(session_id)?)?;
        Ok(latest_text(&rows))
    }

    fn list_credentials(&self) -> RelayResult<Vec<String>> {
        if !self.config.is_configured() {
            return Ok(Vec::new());
        }
        let rows = self.get_rows(&self.keys_url()?)?;
        debug!("Store returned {} credential rows", rows.len());
        Ok(tokens(&rows))
    }

    fn add_credential(&self, token: &str) -> RelayResult<bool> {
        let token = token.trim();
        if !self.config.is_configured() || token.is_empty() {
            return Ok(false);
        }
        let url = self.table_url(&self.config.keys_table, &[])?;
        let bearer = format!("Bearer {}", self.config.api_key);
        let result = UREQ_AGENT
            .post(url.as_str())
            .header("apikey", self.config.api_key.as_str())
            .header("Authorization", bearer.as_str())
            .header("Prefer", "return=minimal")
            .send_json(serde_json::json!({ "token": token }));

        match result {
            Ok(_) => Ok(true),
            // Unique constraint: the token is already stored
            Err(ureq::Error::StatusCode(409)) => Ok(false),
            Err(e) => Err(RelayError::Store(e.to_string())),
        }
    }
}

fn latest_text(rows: &[serde_json::Value]) -> Option<String> {
    rows.first()
        .and_then(|row| row.get("text"))
        .and_then(|text| text.as_str())
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

fn tokens(rows: &[serde_json::Value]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get("token").and_then(|t| t.as_str()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
