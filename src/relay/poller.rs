//! Background transcript polling

use rand::Rng;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::RelayEvent;
use crate::api::TranscriptStore;
use crate::config::PollingConfig;
use crate::error::RelayResult;

/// Draw the wait before the next poll. Redrawn every tick so that several
/// relays following one session drift apart.
pub fn next_interval(polling: &PollingConfig) -> Duration {
    let min = polling.min_interval_ms.min(polling.max_interval_ms);
    let max = polling.min_interval_ms.max(polling.max_interval_ms);
    Duration::from_millis(rand::rng().random_range(min..=max))
}

/// Polls the store until dropped. New text is posted as
/// [`RelayEvent::Transcript`].
pub struct Poller {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn spawn(
        store: Arc<dyn TranscriptStore>,
        session_id: String,
        polling: PollingConfig,
        events: Sender<RelayEvent>,
    ) -> RelayResult<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("orbit-poll".to_string())
            .spawn(move || {
                info!("Polling transcripts for session {}", session_id);
                let mut last_seen: Option<String> = None;
                loop {
                    match store.fetch_latest(&session_id) {
                        Ok(Some(text)) => {
                            if last_seen.as_deref() != Some(text.as_str()) {
                                debug!("New transcript ({} chars)", text.len());
                                last_seen = Some(text.clone());
                                if events.send(RelayEvent::Transcript(text)).is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Transcript poll failed: {}", e),
                    }

                    match stop_rx.recv_timeout(next_interval(&polling)) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Transcript polling stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Instant;

    struct ScriptedStore {
        replies: Mutex<VecDeque<RelayResult<Option<String>>>>,
    }

    impl TranscriptStore for ScriptedStore {
        fn fetch_latest(&self, _session_id: &str) -> RelayResult<Option<String>> {
            self.replies.lock().pop_front().unwrap_or(Ok(None))
        }

        fn list_credentials(&self) -> RelayResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn add_credential(&self, _token: &str) -> RelayResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn interval_stays_within_bounds() {
        let polling = PollingConfig {
            min_interval_ms: 800,
            max_interval_ms: 2000,
        };
        for _ in 0..200 {
            let wait = next_interval(&polling);
            assert!(wait >= Duration::from_millis(800) && wait <= Duration::from_millis(2000));
        }

        let fixed = PollingConfig {
            min_interval_ms: 5,
            max_interval_ms: 5,
        };
        assert_eq!(next_interval(&fixed), Duration::from_millis(5));
    }

    #[test]
    fn repeated_transcripts_are_posted_once() {
        let store = Arc::new(ScriptedStore {
            replies: Mutex::new(VecDeque::from(vec![
                Ok(Some("uno".to_string())),
                Ok(Some("uno".to_string())),
                Err(crate::error::RelayError::Store("offline".to_string())),
                Ok(None),
                Ok(Some("dos".to_string())),
            ])),
        });
        let (tx, rx) = mpsc::channel();
        let poller = Poller::spawn(
            store.clone(),
            "session".to_string(),
            PollingConfig {
                min_interval_ms: 1,
                max_interval_ms: 2,
            },
            tx,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !store.replies.lock().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        drop(poller);

        let texts: Vec<String> = rx
            .try_iter()
            .filter_map(|event| match event {
                RelayEvent::Transcript(text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["uno".to_string(), "dos".to_string()]);
    }
}
