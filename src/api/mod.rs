pub mod client;
pub mod gemini_live;
pub mod store;

pub use gemini_live::GeminiLive;
pub use store::{RestStore, TranscriptStore};
