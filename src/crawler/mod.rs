//! Crawl orchestration
//!
//! This module contains the core harvesting logic, including:
//! - The supervisor that runs sessions concurrently
//! - The per-session state machine
//! - Page lifecycle management and wait policy
//! - Retry classification and backoff

mod lifecycle;
mod retry;
mod session;
mod supervisor;

pub use lifecycle::{PageLease, PageLifecycle, WaitPolicy};
pub use retry::{FailureClass, RetryError, RetryPolicy};
pub use session::{run_session, SessionError, SessionOutcome, SessionSetup};
pub use supervisor::{HarvestReport, HarvestStatus, Supervisor};

use crate::config::Config;
use crate::transport::Transport;
use std::sync::Arc;

/// Runs a complete harvest
///
/// This is the main entry point. It will:
/// 1. Compile the configured selectors
/// 2. Launch one session per configured slot
/// 3. Wait for every session to reach `Done` or `Failed`
/// 4. Merge the records of the successful sessions
///
/// The returned report always covers every session; use
/// [`HarvestReport::ensure_any_succeeded`] to turn a run without any
/// successful session into an error.
pub async fn harvest(
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
) -> crate::Result<HarvestReport> {
    let supervisor = Supervisor::new(config, transport)?;
    Ok(supervisor.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::transport::scripted::ScriptedTransport;
    use crate::{ConfigError, HarvestError};

    #[tokio::test]
    async fn test_harvest_rejects_unusable_selectors() {
        let mut config = parse_config(
            r#"
[harvest]
start-url = "https://trekky.test/level8"
"#,
        )
        .unwrap();
        config.selectors.name = "..broken[".to_string();
        let transport = ScriptedTransport::new();

        let result = harvest(Arc::new(config), Arc::new(transport.clone())).await;

        assert!(matches!(
            result,
            Err(HarvestError::Config(ConfigError::InvalidSelector(_)))
        ));
        assert_eq!(transport.contexts_opened(), 0);
    }
}
