use anyhow::Context;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::dls::RecordOutcome;
use crate::state::AppState;

/// Queue-subscribe to max-deliveries advisories and record each one on its own task.
///
/// Returns when the subscription ends.
pub async fn listen_for_poison_messages(state: AppState) -> anyhow::Result<()> {
    let subject = state.config.advisory_subject.clone();
    let queue_group = state.config.listener_queue_group.clone();

    let mut advisories = state
        .store
        .subscribe(&subject, Some(&queue_group))
        .await
        .with_context(|| format!("Failed to subscribe to {subject}"))?;
    info!(subject = %subject, queue_group = %queue_group, "Listening for poison messages");

    let recorder = state.recorder();
    while let Some(advisory) = advisories.next().await {
        let recorder = recorder.clone();
        tokio::spawn(async move {
            match recorder.handle_advisory(&advisory.payload).await {
                Ok(RecordOutcome::Recorded(record)) => {
                    debug!(id = %record.id, "Advisory handled");
                }
                Ok(RecordOutcome::Skipped(reason)) => {
                    debug!(?reason, "Advisory skipped");
                }
                Err(e) if e.is_malformed_input() => {
                    warn!(subject = %advisory.subject, error = %e, "Dropping poison message advisory");
                }
                Err(e) => {
                    error!(subject = %advisory.subject, error = %e, "Failed to record poison message");
                }
            }
        });
    }

    warn!(subject = %subject, "Advisory subscription closed");
    Ok(())
}
