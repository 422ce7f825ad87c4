//! Tontine Validation - Dual-Control Request Engine
//!
//! The security-critical core of the tontine back office: irreversible
//! administrative actions (deleting members or groups, blocking groups,
//! de/activating accounts) execute only after a maker-checker protocol
//! completes:
//!
//! ```text
//! initiator ──create──► [pending] ──code 1 verified──► [stage1_verified]
//!                           │                               │
//!                           │                         code 2 verified
//!                           │                               ▼
//!                           ├──reject──► [rejected]    [completed]
//!                           └──sweep───► [expired]          │
//!                                                 check_authorized + consume
//!                                                   (exactly once)
//! ```
//!
//! - [`ValidationWorkflow`] owns every transition; collaborators
//!   (store, resolver, notifier, audit, clock) are injected.
//! - [`ValidationStore`] persists requests in SQLite; the one-live-
//!   request-per-target invariant is a partial unique index and every
//!   transition a guarded update.
//! - [`ApprovalPolicy`] pins who may initiate and which roles confirm,
//!   in what order.

pub mod clock;
pub mod config;
pub mod error;
pub mod policy;
pub mod request;
pub mod resolver;
pub mod store;
pub mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ValidationConfig;
pub use error::{ValidationError, ValidationResult};
pub use policy::{ApprovalPolicy, PolicyViolation};
pub use request::{ApproverSlot, RequestStatus, ValidationRequest};
pub use resolver::{ResolveError, ResourceResolver, ResourceSnapshot, StaticResolver};
pub use store::{StoreError, ValidationStore};
pub use workflow::{RequestStats, ValidationWorkflow};
