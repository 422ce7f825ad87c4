//! Validation request entity and status machine data

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tontine_core::{ActionKind, Principal, Reason, ResourceRef};
use tontine_notify::RequestSummary;
use tontine_otp::CodeSlot;

use crate::resolver::ResourceSnapshot;

/// Status of a validation request
///
/// Transitions are one-directional; `Completed`, `Rejected` and
/// `Expired` are terminal and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting the first (or only) approver
    Pending,
    /// First approver confirmed; awaiting the second (dual-party only)
    Stage1Verified,
    /// Every required approver confirmed; the gated action is authorized
    Completed,
    /// Explicitly refused by the terminal approver
    Rejected,
    /// Aged out before completion
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Stage1Verified => "stage1_verified",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "stage1_verified" => Some(RequestStatus::Stage1Verified),
            "completed" => Some(RequestStatus::Completed),
            "rejected" => Some(RequestStatus::Rejected),
            "expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }

    /// True for `Completed`, `Rejected` and `Expired`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Rejected | RequestStatus::Expired
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approver's position in the chain: who must confirm, and the
/// code slot tracking their confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproverSlot {
    /// The principal assigned to this stage
    pub approver: Principal,

    /// The one-time code state for this stage
    pub code: CodeSlot,
}

impl ApproverSlot {
    pub fn new(approver: Principal) -> Self {
        Self {
            approver,
            code: CodeSlot::new(),
        }
    }
}

/// A dual-control validation request
///
/// The sole entity of the engine. Everything needed to interpret the
/// request later - including the resource's display snapshot - is
/// captured at creation; nothing is re-read from the resource
/// repositories afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Unique identifier, e.g. "VR-1A2B3C4D"
    pub id: String,

    /// The gated administrative operation
    pub action: ActionKind,

    /// Resource the action targets
    pub resource: ResourceRef,

    /// Who opened the request (id + role at creation time)
    pub initiator: Principal,

    /// Ordered approval chain, one or two slots
    pub approvers: Vec<ApproverSlot>,

    /// Current status
    pub status: RequestStatus,

    /// Declared justification (10-500 chars)
    pub reason: Reason,

    /// Resource display data frozen at creation
    pub snapshot: ResourceSnapshot,

    /// When the request was opened
    pub created_at: DateTime<Utc>,

    /// Overall deadline, distinct from each code's 15-minute window
    pub expires_at: DateTime<Utc>,

    /// When the last approver verified
    pub completed_at: Option<DateTime<Utc>>,

    /// When the request was rejected
    pub rejected_at: Option<DateTime<Utc>>,

    /// Why it was rejected
    pub rejection_reason: Option<Reason>,

    /// Which approver rejected it
    pub rejected_by: Option<String>,

    /// When the external executor consumed the authorization
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Generate a fresh request identifier
pub fn new_request_id() -> String {
    format!(
        "VR-{}",
        uuid::Uuid::new_v4().to_string()[..8].to_uppercase()
    )
}

impl ValidationRequest {
    /// Build a new pending request. No code is issued yet; the workflow
    /// arms slot 0 before persisting.
    pub fn new(
        action: ActionKind,
        resource: ResourceRef,
        initiator: Principal,
        approvers: Vec<Principal>,
        reason: Reason,
        snapshot: ResourceSnapshot,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: new_request_id(),
            action,
            resource,
            initiator,
            approvers: approvers.into_iter().map(ApproverSlot::new).collect(),
            status: RequestStatus::Pending,
            reason,
            snapshot,
            created_at,
            expires_at: created_at + ttl,
            completed_at: None,
            rejected_at: None,
            rejection_reason: None,
            rejected_by: None,
            consumed_at: None,
        }
    }

    /// True once the status is terminal
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once the overall deadline has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Index of the stage currently awaiting verification, in chain
    /// order. `None` once every slot is verified.
    pub fn active_stage(&self) -> Option<usize> {
        self.approvers.iter().position(|s| !s.code.verified)
    }

    /// Index of the slot assigned to the given principal, if any
    pub fn stage_of(&self, principal_id: &str) -> Option<usize> {
        self.approvers
            .iter()
            .position(|s| s.approver.id == principal_id)
    }

    /// The approver who finalizes (and may reject) the request
    pub fn terminal_approver(&self) -> &Principal {
        // approvers is never empty: policy enforces one or two slots
        &self.approvers[self.approvers.len() - 1].approver
    }

    /// True when every slot in the chain is verified
    pub fn fully_verified(&self) -> bool {
        self.approvers.iter().all(|s| s.code.verified)
    }

    /// True for the initiator and every assigned approver
    pub fn involves(&self, principal_id: &str) -> bool {
        self.initiator.id == principal_id || self.stage_of(principal_id).is_some()
    }

    /// Compact view for notifications and logs
    pub fn summary(&self) -> RequestSummary {
        RequestSummary::new(
            &self.id,
            self.action,
            self.resource.clone(),
            self.initiator.clone(),
            self.reason.as_str(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tontine_core::Role;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, hour, 0, 0).unwrap()
    }

    fn dual_request() -> ValidationRequest {
        ValidationRequest::new(
            ActionKind::DeactivateAccount,
            ResourceRef::for_action(ActionKind::DeactivateAccount, "U1"),
            Principal::new("init", Role::Administrator),
            vec![
                Principal::new("theo", Role::Treasurer),
                Principal::new("ada", Role::Administrator),
            ],
            Reason::new("holder asked for a freeze").unwrap(),
            ResourceSnapshot::new("Malick Sow"),
            at(8),
            Duration::hours(24),
        )
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Stage1Verified,
            RequestStatus::Completed,
            RequestStatus::Rejected,
            RequestStatus::Expired,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("accepted"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Stage1Verified.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }

    #[test]
    fn test_new_request_shape() {
        let req = dual_request();
        assert!(req.id.starts_with("VR-"));
        assert_eq!(req.id.len(), 11);
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.approvers.len(), 2);
        assert_eq!(req.expires_at, at(8) + Duration::hours(24));
        assert!(!req.approvers[0].code.is_armed());
    }

    #[test]
    fn test_active_stage_follows_verification() {
        let mut req = dual_request();
        assert_eq!(req.active_stage(), Some(0));

        req.approvers[0].code.verified = true;
        assert_eq!(req.active_stage(), Some(1));
        assert!(!req.fully_verified());

        req.approvers[1].code.verified = true;
        assert_eq!(req.active_stage(), None);
        assert!(req.fully_verified());
    }

    #[test]
    fn test_stage_of_and_involvement() {
        let req = dual_request();
        assert_eq!(req.stage_of("theo"), Some(0));
        assert_eq!(req.stage_of("ada"), Some(1));
        assert_eq!(req.stage_of("mallory"), None);

        assert!(req.involves("init"));
        assert!(req.involves("theo"));
        assert!(!req.involves("mallory"));
    }

    #[test]
    fn test_terminal_approver_is_last_in_chain() {
        let req = dual_request();
        assert_eq!(req.terminal_approver().id, "ada");
    }

    #[test]
    fn test_overall_expiry_is_strictly_after() {
        let req = dual_request();
        assert!(!req.is_expired(req.expires_at));
        assert!(req.is_expired(req.expires_at + Duration::seconds(1)));
    }
}
