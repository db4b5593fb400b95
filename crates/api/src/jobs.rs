//! Job definitions for this deployment.
//!
//! Every instance polling the shared store must register the same set
//! before its scheduler starts, since handler availability is not
//! distributed.

use std::time::Duration;

use tracing::info;

use courseboard_queue::{JobOptions, JobRegistry};

/// Register all job definitions.
pub fn register_all(registry: &mut JobRegistry) {
    registry.define("send-welcome-email", JobOptions::default(), |job| async move {
        let email = job
            .data
            .get("email")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("payload missing email"))?
            .to_string();
        let username = job
            .data
            .get("username")
            .and_then(|v| v.as_str())
            .unwrap_or("there")
            .to_string();

        info!(%email, %username, "sending welcome email");
        // Simulated SMTP round trip; swap in a real mail client here.
        tokio::time::sleep(Duration::from_secs(2)).await;
        info!(%email, "welcome email sent");
        Ok(())
    });
}
