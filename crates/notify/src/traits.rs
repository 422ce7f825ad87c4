//! Sink traits - interfaces for delivery channels and audit trails

use async_trait::async_trait;

use crate::error::NotifyResult;
use crate::event::{AuditRecord, NotifyEvent};

/// Delivery channel for lifecycle events
///
/// Notifiers are fire-and-forget: the workflow publishes after the
/// state transition is durable, and a failing notifier never unwinds
/// the transition. Implementations must tolerate redelivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logging/debugging
    fn name(&self) -> &str;

    /// Priority (lower = runs first)
    fn priority(&self) -> u32 {
        100
    }

    /// Deliver one event
    ///
    /// Return `Err(_)` to report a delivery failure; the registry logs
    /// it and moves on to the next sink.
    async fn notify(&self, event: &NotifyEvent) -> NotifyResult<()>;
}

/// Append-only audit trail
///
/// Receives one record per workflow operation, accepted or refused.
/// Like notifiers, audit sinks cannot fail an operation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Sink name for logging/debugging
    fn name(&self) -> &str;

    /// Priority (lower = runs first)
    fn priority(&self) -> u32 {
        100
    }

    /// Append one record
    async fn record(&self, record: &AuditRecord) -> NotifyResult<()>;
}

/// A notifier that drops everything (for testing)
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn name(&self) -> &str {
        "NoopNotifier"
    }

    async fn notify(&self, _event: &NotifyEvent) -> NotifyResult<()> {
        Ok(())
    }
}

/// An audit sink that drops everything (for testing)
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    fn name(&self) -> &str {
        "NoopAuditSink"
    }

    async fn record(&self, _record: &AuditRecord) -> NotifyResult<()> {
        Ok(())
    }
}
