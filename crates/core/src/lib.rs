//! Tontine Core - Domain vocabulary
//!
//! This crate contains the fundamental types used across Tontine:
//! - `Principal` / `Role`: who is acting, with a closed role enumeration
//! - `ActionKind` / `ResourceRef`: the gated administrative operations and
//!   the resources they target
//! - `Reason`: length-bounded justification text

pub mod action;
pub mod principal;
pub mod reason;

pub use action::{ActionKind, ResourceKind, ResourceRef};
pub use principal::{Principal, Role};
pub use reason::{Reason, ReasonError};
