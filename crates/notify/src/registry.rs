//! Sink registry - fans events out to every registered sink

use std::sync::Arc;

use crate::event::{AuditRecord, NotifyEvent};
use crate::traits::{AuditSink, Notifier};

/// Registry holding the configured notifiers and audit sinks
///
/// Sinks run in priority order (lower = first). Failures are logged
/// with the sink name and swallowed: a dead mail relay or a full disk
/// must never block or unwind a validation transition.
pub struct SinkRegistry {
    notifiers: Vec<Arc<dyn Notifier>>,
    audits: Vec<Arc<dyn AuditSink>>,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            notifiers: Vec::new(),
            audits: Vec::new(),
        }
    }

    /// Register a notifier
    pub fn register_notifier(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
        // Sort by priority
        self.notifiers.sort_by_key(|n| n.priority());
    }

    /// Register an audit sink
    pub fn register_audit(&mut self, sink: Arc<dyn AuditSink>) {
        self.audits.push(sink);
        // Sort by priority
        self.audits.sort_by_key(|s| s.priority());
    }

    /// Deliver one event to every notifier
    pub async fn publish(&self, event: &NotifyEvent) {
        for notifier in &self.notifiers {
            match notifier.notify(event).await {
                Ok(()) => {
                    tracing::debug!(
                        sink = notifier.name(),
                        kind = event.kind(),
                        request_id = %event.summary().request_id,
                        "Event delivered"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        sink = notifier.name(),
                        kind = event.kind(),
                        request_id = %event.summary().request_id,
                        error = %e,
                        "Notifier failed; continuing"
                    );
                }
            }
        }
    }

    /// Append one record to every audit sink
    pub async fn record(&self, record: &AuditRecord) {
        for sink in &self.audits {
            if let Err(e) = sink.record(record).await {
                tracing::error!(
                    sink = sink.name(),
                    operation = %record.operation,
                    request_id = %record.request_id,
                    error = %e,
                    "Audit sink failed; continuing"
                );
            }
        }
    }

    /// Get number of registered notifiers
    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// Get number of registered audit sinks
    pub fn audit_count(&self) -> usize {
        self.audits.len()
    }
}
