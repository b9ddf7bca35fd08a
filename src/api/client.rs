use lazy_static::lazy_static;
use std::time::Duration;

lazy_static! {
    /// Shared HTTP agent. Polls are frequent, so a stuck request must not
    /// hold up the next tick for long.
    pub static ref UREQ_AGENT: ureq::Agent = {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(15)))
            .build();
        config.into()
    };
}
