//! Tontine Notify - Lifecycle Delivery and Audit
//!
//! Carries validation lifecycle events out of the engine without ever
//! being allowed to push a failure back in:
//!
//! ```text
//! Workflow transition (durably stored)
//!     │
//!     ▼
//! ┌─────────────────────────────┐
//! │ SinkRegistry::publish       │ ← notifiers (code delivery, chat, log)
//! │ SinkRegistry::record        │ ← audit sinks (JSONL trail)
//! └─────────────────────────────┘
//!     │ failures are logged and swallowed
//!     ▼
//! Caller sees only the transition outcome
//! ```
//!
//! Plaintext codes ride inside [`NotifyEvent::CodeIssued`] as
//! [`tontine_otp::PlainCode`], which no sink shipped here serializes.

pub mod console;
pub mod error;
pub mod event;
pub mod jsonl;
pub mod registry;
pub mod traits;

pub use console::{ConsoleNotifier, LogNotifier};
pub use error::{NotifyError, NotifyResult};
pub use event::{AuditOutcome, AuditRecord, NotifyEvent, RequestSummary};
pub use jsonl::JsonlAuditSink;
pub use registry::SinkRegistry;
pub use traits::{AuditSink, NoopAuditSink, NoopNotifier, Notifier};
