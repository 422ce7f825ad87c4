//! Lifecycle events and audit records handed to sinks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tontine_core::{ActionKind, Principal, ResourceRef};
use tontine_otp::PlainCode;

/// Compact view of a request, safe to serialize and log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    /// Request identifier, e.g. "VR-1a2b3c4d"
    pub request_id: String,

    /// The sensitive action awaiting validation
    pub action: ActionKind,

    /// Resource the action targets
    pub resource: ResourceRef,

    /// Who opened the request
    pub initiator: Principal,

    /// Declared justification
    pub reason: String,
}

impl RequestSummary {
    /// Create a new summary
    pub fn new(
        request_id: impl Into<String>,
        action: ActionKind,
        resource: ResourceRef,
        initiator: Principal,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            action,
            resource,
            initiator,
            reason: reason.into(),
        }
    }
}

/// A lifecycle event published to notifiers
///
/// Deliberately not `Serialize`: `CodeIssued` carries the plaintext
/// code, which only a delivery channel may reveal.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    /// A code was issued (or re-issued) to an approver
    CodeIssued {
        summary: RequestSummary,
        approver: Principal,
        code: PlainCode,
    },

    /// An approver entered the correct code
    PartyVerified {
        summary: RequestSummary,
        approver: Principal,
        /// 1-based position in the approval chain
        stage: usize,
    },

    /// Every approver verified; the request is authorized
    Completed { summary: RequestSummary },

    /// An approver refused the request
    Rejected {
        summary: RequestSummary,
        approver: Principal,
        reason: String,
    },

    /// The request aged out before completion
    Expired { summary: RequestSummary },
}

impl NotifyEvent {
    /// Short event kind for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyEvent::CodeIssued { .. } => "code_issued",
            NotifyEvent::PartyVerified { .. } => "party_verified",
            NotifyEvent::Completed { .. } => "completed",
            NotifyEvent::Rejected { .. } => "rejected",
            NotifyEvent::Expired { .. } => "expired",
        }
    }

    /// Request view common to all variants
    pub fn summary(&self) -> &RequestSummary {
        match self {
            NotifyEvent::CodeIssued { summary, .. }
            | NotifyEvent::PartyVerified { summary, .. }
            | NotifyEvent::Completed { summary }
            | NotifyEvent::Rejected { summary, .. }
            | NotifyEvent::Expired { summary } => summary,
        }
    }

    /// Plaintext code, present only on `CodeIssued`
    pub fn code(&self) -> Option<&PlainCode> {
        match self {
            NotifyEvent::CodeIssued { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// How an audited operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// The operation changed state as requested
    Accepted,
    /// The operation was refused and state is unchanged
    Refused,
}

/// One line of the audit trail
///
/// Every workflow operation emits exactly one record, refusals included,
/// so the trail reconstructs the full history of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the operation was decided
    pub at: DateTime<Utc>,

    /// Request the operation addressed
    pub request_id: String,

    /// Operation name, e.g. "create", "verify", "reject"
    pub operation: String,

    /// Principal id of the caller, if the operation has one
    pub actor: Option<String>,

    /// Accepted or refused
    pub outcome: AuditOutcome,

    /// Free-form specifics, e.g. the refusal cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Record an accepted operation
    pub fn accepted(
        at: DateTime<Utc>,
        request_id: impl Into<String>,
        operation: impl Into<String>,
        actor: Option<&str>,
    ) -> Self {
        Self {
            at,
            request_id: request_id.into(),
            operation: operation.into(),
            actor: actor.map(str::to_owned),
            outcome: AuditOutcome::Accepted,
            detail: None,
        }
    }

    /// Record a refused operation
    pub fn refused(
        at: DateTime<Utc>,
        request_id: impl Into<String>,
        operation: impl Into<String>,
        actor: Option<&str>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            at,
            request_id: request_id.into(),
            operation: operation.into(),
            actor: actor.map(str::to_owned),
            outcome: AuditOutcome::Refused,
            detail: Some(detail.into()),
        }
    }

    /// Attach specifics to an accepted record
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tontine_core::Role;

    fn summary() -> RequestSummary {
        RequestSummary::new(
            "VR-1a2b3c4d",
            ActionKind::DeleteGroup,
            ResourceRef::for_action(ActionKind::DeleteGroup, "GRP-7"),
            Principal::new("alice", Role::Administrator),
            "group dissolved by member vote",
        )
    }

    #[test]
    fn test_event_kinds() {
        let completed = NotifyEvent::Completed { summary: summary() };
        assert_eq!(completed.kind(), "completed");
        assert_eq!(completed.summary().request_id, "VR-1a2b3c4d");
        assert!(completed.code().is_none());
    }

    #[test]
    fn test_summary_serialization() {
        let json = serde_json::to_string(&summary()).unwrap();
        assert!(json.contains("VR-1a2b3c4d"));
        assert!(json.contains("delete-group"));

        let parsed: RequestSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.initiator.id, "alice");
    }

    #[test]
    fn test_audit_record_roundtrip() {
        let rec = AuditRecord::refused(
            Utc::now(),
            "VR-1a2b3c4d",
            "verify",
            Some("bob"),
            "code mismatch, 2 attempts remaining",
        );
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"refused\""));

        let parsed: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.outcome, AuditOutcome::Refused);
        assert_eq!(parsed.actor.as_deref(), Some("bob"));
    }

    #[test]
    fn test_accepted_record_omits_empty_detail() {
        let rec = AuditRecord::accepted(Utc::now(), "VR-1a2b3c4d", "create", Some("alice"));
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("detail"));
    }
}
