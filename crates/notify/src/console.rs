//! Built-in delivery channels: terminal and structured log

use async_trait::async_trait;

use tontine_otp::CODE_TTL_MINUTES;

use crate::error::NotifyResult;
use crate::event::NotifyEvent;
use crate::traits::Notifier;

/// Prints events to stdout, plaintext codes included.
///
/// This is the delivery channel for single-operator local use, where
/// the terminal stands in for the approver's inbox. Anything shared or
/// multi-user should use a real channel instead.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    async fn notify(&self, event: &NotifyEvent) -> NotifyResult<()> {
        let summary = event.summary();
        match event {
            NotifyEvent::CodeIssued {
                approver, code, ..
            } => {
                println!(
                    "🔐 {}: code for {} is {} (valid {} min)",
                    summary.request_id,
                    approver.id,
                    code.reveal(),
                    CODE_TTL_MINUTES
                );
            }
            NotifyEvent::PartyVerified {
                approver, stage, ..
            } => {
                println!(
                    "✅ {}: {} verified (stage {})",
                    summary.request_id, approver.id, stage
                );
            }
            NotifyEvent::Completed { .. } => {
                println!(
                    "🏁 {}: fully authorized, {} on {} may proceed",
                    summary.request_id, summary.action, summary.resource
                );
            }
            NotifyEvent::Rejected {
                approver, reason, ..
            } => {
                println!(
                    "⛔ {}: rejected by {}: {}",
                    summary.request_id, approver.id, reason
                );
            }
            NotifyEvent::Expired { .. } => {
                println!("⌛ {}: expired without full approval", summary.request_id);
            }
        }
        Ok(())
    }
}

/// Emits events as tracing records, never revealing codes.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    // Log lines go out before any delivery channel
    fn priority(&self) -> u32 {
        10
    }

    async fn notify(&self, event: &NotifyEvent) -> NotifyResult<()> {
        let summary = event.summary();
        tracing::info!(
            kind = event.kind(),
            request_id = %summary.request_id,
            action = %summary.action,
            resource = %summary.resource,
            initiator = %summary.initiator.id,
            "Validation event"
        );
        Ok(())
    }
}
