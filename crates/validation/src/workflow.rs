//! Validation workflow - the dual-control state machine
//!
//! Orchestrates every named transition of a request's life:
//!
//! ```text
//! create ──► pending ──verify(stage 1)──► stage1_verified
//!               │                              │
//!               │                        verify(stage 2)
//!               │                              ▼
//!               ├──reject──► rejected      completed ──consume──► (spent)
//!               └──sweep───► expired
//! ```
//!
//! All mutation goes through the store's guarded updates; the workflow
//! re-reads after a lost guard and answers with a typed error. Notifier
//! and audit sinks run after the durable write and can never unwind it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tontine_core::{ActionKind, Principal, Reason, ResourceRef};
use tontine_notify::{AuditRecord, NotifyEvent, SinkRegistry};
use tontine_otp::VerifyOutcome;

use crate::clock::Clock;
use crate::config::ValidationConfig;
use crate::error::{ValidationError, ValidationResult};
use crate::policy::ApprovalPolicy;
use crate::request::{new_request_id, RequestStatus, ValidationRequest};
use crate::resolver::{ResolveError, ResourceResolver};
use crate::store::{StoreError, ValidationStore};

/// Counts of requests by status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestStats {
    pub pending: usize,
    pub stage1_verified: usize,
    pub completed: usize,
    pub rejected: usize,
    pub expired: usize,
}

/// The dual-control workflow controller
///
/// Every collaborator is injected: no wall clock, no global notifier,
/// no ambient store. The controller is the only component allowed to
/// call the store's transition methods.
pub struct ValidationWorkflow {
    store: Arc<ValidationStore>,
    policy: ApprovalPolicy,
    config: ValidationConfig,
    resolver: Arc<dyn ResourceResolver>,
    sinks: SinkRegistry,
    clock: Arc<dyn Clock>,
}

impl ValidationWorkflow {
    pub fn new(
        store: Arc<ValidationStore>,
        policy: ApprovalPolicy,
        config: ValidationConfig,
        resolver: Arc<dyn ResourceResolver>,
        sinks: SinkRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            config,
            resolver,
            sinks,
            clock,
        }
    }

    /// The policy table in force
    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Open a request against a resource and action type.
    ///
    /// Checks initiation rights and the approver assignment against the
    /// policy, snapshots the resource, persists the request in `pending`
    /// (the store's unique index arbitrates duplicate creates), then
    /// issues and delivers the first approver's code.
    pub async fn create(
        &self,
        action: ActionKind,
        resource_id: &str,
        initiator: Principal,
        approvers: Vec<Principal>,
        reason: Reason,
    ) -> ValidationResult<ValidationRequest> {
        let id = new_request_id();
        let actor = initiator.id.clone();
        let result = self
            .create_inner(&id, action, resource_id, initiator, approvers, reason)
            .await;
        self.audit_outcome(&id, "create", Some(&actor), &result).await;
        result
    }

    async fn create_inner(
        &self,
        id: &str,
        action: ActionKind,
        resource_id: &str,
        initiator: Principal,
        approvers: Vec<Principal>,
        reason: Reason,
    ) -> ValidationResult<ValidationRequest> {
        self.policy
            .validate_assignment(action, &initiator, &approvers)
            .map_err(|v| ValidationError::Forbidden(v.to_string()))?;

        let resource = ResourceRef::for_action(action, resource_id);
        let snapshot = self.resolver.resolve(&resource).await.map_err(|e| match e {
            ResolveError::NotFound(r) => ValidationError::ResourceNotFound(r),
            ResolveError::Unavailable(detail) => {
                tracing::error!(%resource, %detail, "Resource directory unreachable");
                ValidationError::ResolverUnavailable(detail)
            }
        })?;

        let now = self.clock.now();
        let mut request = ValidationRequest::new(
            action,
            resource,
            initiator,
            approvers,
            reason,
            snapshot,
            now,
            self.config.request_ttl(),
        );
        request.id = id.to_string();
        let code = request.approvers[0].code.issue(now);

        self.store.insert(&request).map_err(|e| match e {
            StoreError::DuplicateLive {
                action,
                resource_id,
            } => ValidationError::DuplicatePending {
                action,
                resource_id,
            },
            other => other.into(),
        })?;

        tracing::info!(
            request_id = %request.id,
            action = %request.action,
            resource = %request.resource,
            initiator = %request.initiator.id,
            "Validation request opened"
        );

        let approver = request.approvers[0].approver.clone();
        self.sinks
            .publish(&NotifyEvent::CodeIssued {
                summary: request.summary(),
                approver,
                code,
            })
            .await;

        Ok(request)
    }

    /// Submit a one-time code for the caller's stage.
    ///
    /// On the last required stage the request completes; otherwise it
    /// advances to `stage1_verified` and the next approver's code goes
    /// out. A stale deadline observed here expires the request in place.
    pub async fn verify_party(
        &self,
        request_id: &str,
        acting: &Principal,
        code: &str,
    ) -> ValidationResult<ValidationRequest> {
        let result = self.verify_inner(request_id, acting, code).await;
        self.audit_outcome(request_id, "verify", Some(&acting.id), &result)
            .await;
        result
    }

    async fn verify_inner(
        &self,
        request_id: &str,
        acting: &Principal,
        code: &str,
    ) -> ValidationResult<ValidationRequest> {
        let request = self.store.fetch(request_id).map_err(not_found)?;
        // Party membership first: an outsider learns nothing about the
        // request's state, not even that it is terminal.
        let stage = request.stage_of(&acting.id).ok_or_else(|| {
            ValidationError::Forbidden(format!("{} holds no slot on {}", acting.id, request_id))
        })?;
        if request.is_terminal() {
            return Err(ValidationError::WrongState {
                status: request.status,
            });
        }
        if request.approvers[stage].code.verified {
            return Err(ValidationError::WrongState {
                status: request.status,
            });
        }
        // Sequential gating: a later approver waits for the earlier one
        let active = request
            .active_stage()
            .ok_or(ValidationError::WrongState {
                status: request.status,
            })?;
        if stage != active {
            return Err(ValidationError::WrongState {
                status: request.status,
            });
        }

        let now = self.clock.now();
        if request.is_expired(now) || request.approvers[stage].code.is_expired(now) {
            self.expire_in_place(&request, now).await?;
            return Err(ValidationError::Expired);
        }

        let mut slot = request.approvers[stage].code.clone();
        let prior_attempts = slot.attempts;
        match slot.verify(code, now) {
            VerifyOutcome::Verified => {
                if !self
                    .store
                    .persist_slot(&request.id, stage, &slot, prior_attempts)?
                {
                    return Err(self.lost_race(&request.id)?);
                }
                self.advance(&request, acting, stage, now).await
            }
            VerifyOutcome::Mismatch { remaining } => {
                if !self
                    .store
                    .persist_slot(&request.id, stage, &slot, prior_attempts)?
                {
                    return Err(self.lost_race(&request.id)?);
                }
                Err(ValidationError::InvalidCode {
                    attempts_remaining: remaining,
                })
            }
            VerifyOutcome::Expired => {
                self.expire_in_place(&request, now).await?;
                Err(ValidationError::Expired)
            }
            VerifyOutcome::AttemptsExhausted => Err(ValidationError::AttemptsExceeded),
            VerifyOutcome::NotIssued | VerifyOutcome::AlreadyVerified => {
                Err(ValidationError::WrongState {
                    status: request.status,
                })
            }
        }
    }

    /// After a successful slot verification: finalize, or arm the next
    /// stage.
    async fn advance(
        &self,
        request: &ValidationRequest,
        acting: &Principal,
        stage: usize,
        now: DateTime<Utc>,
    ) -> ValidationResult<ValidationRequest> {
        let verified_event = NotifyEvent::PartyVerified {
            summary: request.summary(),
            approver: acting.clone(),
            stage: stage + 1,
        };

        let last_stage = stage + 1 == request.approvers.len();
        if last_stage {
            if !self.store.mark_completed(&request.id, now)? {
                return Err(self.lost_race(&request.id)?);
            }
            tracing::info!(
                request_id = %request.id,
                action = %request.action,
                "Validation request completed; gated action authorized"
            );
            self.sinks.publish(&verified_event).await;
            self.sinks
                .publish(&NotifyEvent::Completed {
                    summary: request.summary(),
                })
                .await;
        } else {
            if !self.store.mark_stage1(&request.id)? {
                return Err(self.lost_race(&request.id)?);
            }
            let mut next = request.approvers[stage + 1].code.clone();
            let next_code = next.issue(now);
            if !self
                .store
                .persist_slot(&request.id, stage + 1, &next, 0)?
            {
                return Err(self.lost_race(&request.id)?);
            }
            tracing::info!(
                request_id = %request.id,
                next_approver = %request.approvers[stage + 1].approver.id,
                "First stage verified; second code issued"
            );
            self.sinks.publish(&verified_event).await;
            self.sinks
                .publish(&NotifyEvent::CodeIssued {
                    summary: request.summary(),
                    approver: request.approvers[stage + 1].approver.clone(),
                    code: next_code,
                })
                .await;
        }

        self.store.fetch(&request.id).map_err(not_found)
    }

    /// Refuse the request outright.
    ///
    /// Reserved for the terminal approver: the party whose confirmation
    /// would have finalized the action is the one entitled to veto it.
    pub async fn reject(
        &self,
        request_id: &str,
        acting: &Principal,
        reason: Reason,
    ) -> ValidationResult<ValidationRequest> {
        let result = self.reject_inner(request_id, acting, reason).await;
        self.audit_outcome(request_id, "reject", Some(&acting.id), &result)
            .await;
        result
    }

    async fn reject_inner(
        &self,
        request_id: &str,
        acting: &Principal,
        reason: Reason,
    ) -> ValidationResult<ValidationRequest> {
        let request = self.store.fetch(request_id).map_err(not_found)?;
        if request.terminal_approver().id != acting.id {
            return Err(ValidationError::Forbidden(format!(
                "only {} may reject {}",
                request.terminal_approver().id,
                request_id
            )));
        }
        if request.is_terminal() {
            return Err(ValidationError::WrongState {
                status: request.status,
            });
        }

        let now = self.clock.now();
        if request.is_expired(now) {
            self.expire_in_place(&request, now).await?;
            return Err(ValidationError::Expired);
        }

        if !self
            .store
            .mark_rejected(&request.id, now, &reason, &acting.id)?
        {
            return Err(self.lost_race(&request.id)?);
        }

        tracing::info!(
            request_id = %request.id,
            rejected_by = %acting.id,
            "Validation request rejected"
        );
        self.sinks
            .publish(&NotifyEvent::Rejected {
                summary: request.summary(),
                approver: acting.clone(),
                reason: reason.to_string(),
            })
            .await;

        self.store.fetch(&request.id).map_err(not_found)
    }

    /// Re-issue the active code for the caller's stage.
    ///
    /// Replaces the code and restarts its window. A locked slot stays
    /// locked: resending never restores a spent attempt budget.
    pub async fn resend(
        &self,
        request_id: &str,
        acting: &Principal,
    ) -> ValidationResult<ValidationRequest> {
        let result = self.resend_inner(request_id, acting).await;
        self.audit_outcome(request_id, "resend", Some(&acting.id), &result)
            .await;
        result
    }

    async fn resend_inner(
        &self,
        request_id: &str,
        acting: &Principal,
    ) -> ValidationResult<ValidationRequest> {
        let request = self.store.fetch(request_id).map_err(not_found)?;
        let stage = request.stage_of(&acting.id).ok_or_else(|| {
            ValidationError::Forbidden(format!("{} holds no slot on {}", acting.id, request_id))
        })?;
        if request.is_terminal() {
            return Err(ValidationError::WrongState {
                status: request.status,
            });
        }
        if request.approvers[stage].code.verified
            || request.active_stage() != Some(stage)
        {
            return Err(ValidationError::WrongState {
                status: request.status,
            });
        }

        let now = self.clock.now();
        if request.is_expired(now) {
            self.expire_in_place(&request, now).await?;
            return Err(ValidationError::Expired);
        }
        if request.approvers[stage].code.attempts_exhausted() {
            return Err(ValidationError::AttemptsExceeded);
        }

        let mut slot = request.approvers[stage].code.clone();
        let prior_attempts = slot.attempts;
        let code = slot.issue(now);
        if !self
            .store
            .persist_slot(&request.id, stage, &slot, prior_attempts)?
        {
            return Err(self.lost_race(&request.id)?);
        }

        self.sinks
            .publish(&NotifyEvent::CodeIssued {
                summary: request.summary(),
                approver: acting.clone(),
                code,
            })
            .await;

        self.store.fetch(&request.id).map_err(not_found)
    }

    /// Expire every non-terminal request whose overall deadline or
    /// active code window has passed.
    ///
    /// Driven by an external scheduler. Idempotent and safe under
    /// concurrent invocation: each transition is a guarded update, and
    /// only the invocation that wins the guard notifies and audits.
    /// Returns the ids swept by this call.
    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> ValidationResult<Vec<String>> {
        let mut swept = Vec::new();
        for request in self.store.list_non_terminal()? {
            let code_lapsed = request
                .active_stage()
                .map(|i| request.approvers[i].code.is_expired(now))
                .unwrap_or(false);
            if !request.is_expired(now) && !code_lapsed {
                continue;
            }
            if self.store.mark_expired(&request.id)? {
                tracing::info!(request_id = %request.id, "Request expired by sweep");
                self.sinks
                    .publish(&NotifyEvent::Expired {
                        summary: request.summary(),
                    })
                    .await;
                self.sinks
                    .record(&AuditRecord::accepted(now, &request.id, "expire", None))
                    .await;
                swept.push(request.id);
            }
        }
        Ok(swept)
    }

    /// True iff the request is completed and its authorization has not
    /// been consumed. The executor calls this immediately before
    /// [`ValidationWorkflow::consume`]; only `consume` actually claims
    /// the authorization.
    pub fn check_authorized(&self, request_id: &str) -> ValidationResult<bool> {
        let request = self.store.fetch(request_id).map_err(not_found)?;
        Ok(request.status == RequestStatus::Completed && request.consumed_at.is_none())
    }

    /// Atomically claim a completed request's single authorization.
    ///
    /// The check and the claim are one guarded update in the store, so
    /// two racing executors cannot both be told to proceed.
    pub async fn consume(
        &self,
        request_id: &str,
        actor: &Principal,
    ) -> ValidationResult<ValidationRequest> {
        let result = self.consume_inner(request_id).await;
        self.audit_outcome(request_id, "consume", Some(&actor.id), &result)
            .await;
        result
    }

    async fn consume_inner(&self, request_id: &str) -> ValidationResult<ValidationRequest> {
        let now = self.clock.now();
        if self.store.mark_consumed(request_id, now)? {
            tracing::info!(request_id, "Authorization consumed");
            return self.store.fetch(request_id).map_err(not_found);
        }

        // The guard lost; re-read to name the cause
        let request = self.store.fetch(request_id).map_err(not_found)?;
        if request.consumed_at.is_some() {
            Err(ValidationError::AlreadyConsumed)
        } else {
            Err(ValidationError::WrongState {
                status: request.status,
            })
        }
    }

    /// Load one request, visible to the initiator and assigned approvers
    pub fn fetch(
        &self,
        request_id: &str,
        acting: &Principal,
    ) -> ValidationResult<ValidationRequest> {
        let request = self.store.fetch(request_id).map_err(not_found)?;
        if !request.involves(&acting.id) {
            return Err(ValidationError::Forbidden(format!(
                "{} is not a party to {}",
                acting.id, request_id
            )));
        }
        Ok(request)
    }

    /// The caller's action inbox: non-terminal requests whose active
    /// stage is assigned to them.
    pub fn pending_for(&self, acting: &Principal) -> ValidationResult<Vec<ValidationRequest>> {
        Ok(self
            .store
            .list_non_terminal()?
            .into_iter()
            .filter(|r| {
                r.active_stage()
                    .map(|i| r.approvers[i].approver.id == acting.id)
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Counts by status
    pub fn stats(&self) -> ValidationResult<RequestStats> {
        Ok(RequestStats {
            pending: self.store.count_by_status(RequestStatus::Pending)?,
            stage1_verified: self.store.count_by_status(RequestStatus::Stage1Verified)?,
            completed: self.store.count_by_status(RequestStatus::Completed)?,
            rejected: self.store.count_by_status(RequestStatus::Rejected)?,
            expired: self.store.count_by_status(RequestStatus::Expired)?,
        })
    }

    /// Lazily transition a request whose deadline was observed stale.
    /// Guarded, so concurrent observers expire it once.
    async fn expire_in_place(
        &self,
        request: &ValidationRequest,
        now: DateTime<Utc>,
    ) -> ValidationResult<()> {
        if self.store.mark_expired(&request.id)? {
            tracing::info!(request_id = %request.id, "Request expired on access");
            self.sinks
                .publish(&NotifyEvent::Expired {
                    summary: request.summary(),
                })
                .await;
            self.sinks
                .record(&AuditRecord::accepted(now, &request.id, "expire", None))
                .await;
        }
        Ok(())
    }

    /// A guarded update matched zero rows: someone else transitioned the
    /// record first. Re-read and answer with the state they left behind.
    fn lost_race(&self, request_id: &str) -> Result<ValidationError, ValidationError> {
        let current = self.store.fetch(request_id).map_err(not_found)?;
        tracing::warn!(
            request_id,
            status = %current.status,
            "Concurrent transition won; operation refused"
        );
        Ok(ValidationError::WrongState {
            status: current.status,
        })
    }

    /// One audit record per operation, refusals included
    async fn audit_outcome<T>(
        &self,
        request_id: &str,
        operation: &str,
        actor: Option<&str>,
        result: &ValidationResult<T>,
    ) {
        let now = self.clock.now();
        let record = match result {
            Ok(_) => AuditRecord::accepted(now, request_id, operation, actor),
            Err(e) => AuditRecord::refused(now, request_id, operation, actor, e.to_string()),
        };
        self.sinks.record(&record).await;
    }
}

fn not_found(e: StoreError) -> ValidationError {
    match e {
        StoreError::NotFound(id) => ValidationError::RequestNotFound(id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tontine_core::Role;

    use crate::clock::FixedClock;
    use crate::resolver::{ResourceSnapshot, StaticResolver};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
    }

    fn workflow_for(resource: ResourceRef) -> ValidationWorkflow {
        let resolver =
            StaticResolver::new().with(resource, ResourceSnapshot::new("Quartier Nord circle"));
        ValidationWorkflow::new(
            Arc::new(ValidationStore::in_memory().unwrap()),
            ApprovalPolicy::default(),
            ValidationConfig::default(),
            Arc::new(resolver),
            SinkRegistry::new(),
            Arc::new(FixedClock::new(start())),
        )
    }

    fn admin(id: &str) -> Principal {
        Principal::new(id, Role::Administrator)
    }

    fn treasurer(id: &str) -> Principal {
        Principal::new(id, Role::Treasurer)
    }

    fn approvers() -> Vec<Principal> {
        vec![treasurer("theo"), admin("ada")]
    }

    fn reason() -> Reason {
        Reason::new("group dissolved by member vote").unwrap()
    }

    #[tokio::test]
    async fn test_create_persists_and_arms_first_slot() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);

        let req = wf
            .create(
                ActionKind::BlockGroup,
                "GRP-1",
                admin("init"),
                approvers(),
                reason(),
            )
            .await
            .unwrap();

        assert_eq!(req.status, RequestStatus::Pending);
        assert!(req.approvers[0].code.is_armed());
        assert!(!req.approvers[1].code.is_armed());
        assert_eq!(req.snapshot.label, "Quartier Nord circle");
        assert_eq!(req.expires_at, start() + chrono::Duration::hours(24));
    }

    #[tokio::test]
    async fn test_create_unknown_resource_refused() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);

        let err = wf
            .create(
                ActionKind::BlockGroup,
                "GRP-404",
                admin("init"),
                approvers(),
                reason(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_policy_violation_is_forbidden() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);

        let err = wf
            .create(
                ActionKind::BlockGroup,
                "GRP-1",
                Principal::new("m1", Role::Member),
                approvers(),
                reason(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_duplicate_pending_refused() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);

        wf.create(
            ActionKind::BlockGroup,
            "GRP-1",
            admin("init"),
            approvers(),
            reason(),
        )
        .await
        .unwrap();

        let err = wf
            .create(
                ActionKind::BlockGroup,
                "GRP-1",
                admin("init"),
                approvers(),
                reason(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicatePending { .. }));
    }

    #[tokio::test]
    async fn test_outsider_cannot_verify() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);
        let req = wf
            .create(
                ActionKind::BlockGroup,
                "GRP-1",
                admin("init"),
                approvers(),
                reason(),
            )
            .await
            .unwrap();

        let err = wf
            .verify_party(&req.id, &admin("mallory"), "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_second_stage_gated_behind_first() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);
        let req = wf
            .create(
                ActionKind::BlockGroup,
                "GRP-1",
                admin("init"),
                approvers(),
                reason(),
            )
            .await
            .unwrap();

        // Ada is assigned, but stage 1 has not verified yet
        let err = wf
            .verify_party(&req.id, &admin("ada"), "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongState { .. }));
    }

    #[tokio::test]
    async fn test_check_authorized_on_unknown_request() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);
        assert!(matches!(
            wf.check_authorized("VR-MISSING1"),
            Err(ValidationError::RequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_hides_requests_from_outsiders() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);
        let req = wf
            .create(
                ActionKind::BlockGroup,
                "GRP-1",
                admin("init"),
                approvers(),
                reason(),
            )
            .await
            .unwrap();

        assert!(wf.fetch(&req.id, &admin("init")).is_ok());
        assert!(wf.fetch(&req.id, &treasurer("theo")).is_ok());
        assert!(matches!(
            wf.fetch(&req.id, &admin("mallory")),
            Err(ValidationError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_for_follows_the_active_stage() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "GRP-1");
        let wf = workflow_for(target);
        wf.create(
            ActionKind::BlockGroup,
            "GRP-1",
            admin("init"),
            approvers(),
            reason(),
        )
        .await
        .unwrap();

        assert_eq!(wf.pending_for(&treasurer("theo")).unwrap().len(), 1);
        // Ada's turn comes only after stage 1
        assert!(wf.pending_for(&admin("ada")).unwrap().is_empty());
    }
}
