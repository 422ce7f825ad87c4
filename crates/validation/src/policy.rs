//! Approval policy - who initiates, who confirms, in what order
//!
//! The state machine itself handles one or two slots uniformly; this
//! table decides how many slots each action gets and which role each
//! stage demands. The default pins every gated action to the dual
//! treasurer-then-administrator chain.

use std::collections::HashMap;

use thiserror::Error;

use tontine_core::{ActionKind, Principal, Role};

/// Ways an approver assignment can violate policy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Role {0} may not initiate gated actions")]
    MayNotInitiate(Role),

    #[error("Action needs {expected} approver(s), got {got}")]
    WrongApproverCount { expected: usize, got: usize },

    #[error("Stage {stage} requires role {required}, but {assigned} holds {held}")]
    RoleMismatch {
        /// 1-based stage number
        stage: usize,
        required: Role,
        assigned: String,
        held: Role,
    },

    #[error("Approver {0} is assigned to more than one stage")]
    DuplicateApprover(String),

    #[error("Initiator {0} cannot be their own approver")]
    InitiatorIsApprover(String),
}

/// Maps each action to its ordered role-constraint chain.
pub struct ApprovalPolicy {
    stages: HashMap<ActionKind, Vec<Role>>,
    initiator_roles: Vec<Role>,
}

impl Default for ApprovalPolicy {
    /// Dual control everywhere: treasurer confirms first, administrator
    /// finalizes. Members never initiate.
    fn default() -> Self {
        let chain = vec![Role::Treasurer, Role::Administrator];
        let stages = ActionKind::all()
            .iter()
            .map(|action| (*action, chain.clone()))
            .collect();

        Self {
            stages,
            initiator_roles: vec![Role::Administrator, Role::Treasurer],
        }
    }
}

impl ApprovalPolicy {
    /// Override the chain for one action (builder-style).
    ///
    /// A deployment that wants, say, single-administrator approval for
    /// `unblock-group` pins it here without touching the state machine.
    pub fn with_stages(mut self, action: ActionKind, roles: Vec<Role>) -> Self {
        assert!(
            !roles.is_empty() && roles.len() <= 2,
            "approval chains have one or two stages"
        );
        self.stages.insert(action, roles);
        self
    }

    /// The ordered role constraints for an action
    pub fn stages_for(&self, action: ActionKind) -> &[Role] {
        // Default covers every ActionKind; with_stages only replaces
        self.stages
            .get(&action)
            .map(Vec::as_slice)
            .unwrap_or(&[Role::Treasurer, Role::Administrator])
    }

    /// True if the role may open requests at all
    pub fn may_initiate(&self, role: Role) -> bool {
        self.initiator_roles.contains(&role)
    }

    /// Check an initiator plus approver assignment against the table.
    ///
    /// Maker-checker means the maker never checks: the initiator cannot
    /// appear in the chain, and the chain cannot repeat a principal.
    pub fn validate_assignment(
        &self,
        action: ActionKind,
        initiator: &Principal,
        approvers: &[Principal],
    ) -> Result<(), PolicyViolation> {
        if !self.may_initiate(initiator.role) {
            return Err(PolicyViolation::MayNotInitiate(initiator.role));
        }

        let required = self.stages_for(action);
        if approvers.len() != required.len() {
            return Err(PolicyViolation::WrongApproverCount {
                expected: required.len(),
                got: approvers.len(),
            });
        }

        for (i, (approver, required_role)) in approvers.iter().zip(required).enumerate() {
            if approver.role != *required_role {
                return Err(PolicyViolation::RoleMismatch {
                    stage: i + 1,
                    required: *required_role,
                    assigned: approver.id.clone(),
                    held: approver.role,
                });
            }
            if approver.id == initiator.id {
                return Err(PolicyViolation::InitiatorIsApprover(approver.id.clone()));
            }
            if approvers[..i].iter().any(|prev| prev.id == approver.id) {
                return Err(PolicyViolation::DuplicateApprover(approver.id.clone()));
            }
        }

        Ok(())
    }
}
