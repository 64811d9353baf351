//! Selection capture — "what does the user have selected right now?"
//!
//! Thin service over the clipboard transfer channel. One attempt, no
//! retries: a miss is reported upward as "no selection", not as an error.

use crate::clipboard::{TransferChannel, TransferError};
use std::sync::Arc;
use std::time::Instant;

/// The selected text at one moment in time. Consumed once by the
/// orchestrator and superseded entirely on the next capture.
#[derive(Debug, Clone)]
pub struct SelectionSnapshot {
    pub text: String,
    pub captured_at: Instant,
}

#[derive(Clone)]
pub struct SelectionService {
    channel: Arc<dyn TransferChannel>,
}

impl SelectionService {
    pub fn new(channel: Arc<dyn TransferChannel>) -> Self {
        Self { channel }
    }

    /// Capture the current selection via copy simulation.
    ///
    /// The settle-delay sleep inside the channel blocks, so this hops to the
    /// blocking pool rather than stalling the reactor.
    pub async fn capture(&self) -> Result<Option<SelectionSnapshot>, TransferError> {
        let channel = self.channel.clone();
        let captured = tokio::task::spawn_blocking(move || channel.capture_via_copy())
            .await
            .map_err(|e| TransferError::Clipboard(format!("capture task failed: {e}")))??;

        Ok(captured.map(|text| {
            log::info!("[CAPTURE] Selection: {} chars", text.len());
            SelectionSnapshot {
                text,
                captured_at: Instant::now(),
            }
        }))
    }
}
