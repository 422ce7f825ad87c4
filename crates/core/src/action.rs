//! ActionKind / ResourceRef - The gated administrative operations
//!
//! Each kind names an irreversible (or hard-to-reverse) mutation that must
//! pass dual-control validation before it may execute. The wire names are
//! kebab-case and stable: they appear in the store, in audit records and in
//! notification payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

/// Sensitive operations that require a completed validation request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Permanently remove a member account
    DeleteAccount,
    /// Permanently remove a savings group
    DeleteGroup,
    /// Freeze a group (no contributions, no draws)
    BlockGroup,
    /// Lift a freeze on a group
    UnblockGroup,
    /// Re-enable a previously deactivated account
    ActivateAccount,
    /// Disable an account without deleting its history
    DeactivateAccount,
}

impl ActionKind {
    /// The kind of resource this action targets.
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            ActionKind::DeleteAccount
            | ActionKind::ActivateAccount
            | ActionKind::DeactivateAccount => ResourceKind::Account,
            ActionKind::DeleteGroup | ActionKind::BlockGroup | ActionKind::UnblockGroup => {
                ResourceKind::Group
            }
        }
    }

    /// All gated action kinds, in declaration order.
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::DeleteAccount,
            ActionKind::DeleteGroup,
            ActionKind::BlockGroup,
            ActionKind::UnblockGroup,
            ActionKind::ActivateAccount,
            ActionKind::DeactivateAccount,
        ]
    }
}

/// The kinds of resources a gated action can target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A member account
    Account,
    /// A savings group
    Group,
}

/// A reference to the resource a request targets.
///
/// The kind is derived from the action, so a `delete-group` request can
/// never point at an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource kind (account, group)
    pub kind: ResourceKind,
    /// Identifier within that kind's repository
    pub id: String,
}

impl ResourceRef {
    /// Build the reference an action targets.
    pub fn for_action(action: ActionKind, id: impl Into<String>) -> Self {
        Self {
            kind: action.resource_kind(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(ActionKind::DeleteAccount.to_string(), "delete-account");
        assert_eq!(ActionKind::UnblockGroup.to_string(), "unblock-group");
        assert_eq!(
            "deactivate-account".parse::<ActionKind>().unwrap(),
            ActionKind::DeactivateAccount
        );
    }

    #[test]
    fn test_action_parse_rejects_unknown() {
        assert!("format-disk".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_resource_kind_mapping() {
        assert_eq!(ActionKind::DeleteAccount.resource_kind(), ResourceKind::Account);
        assert_eq!(ActionKind::DeactivateAccount.resource_kind(), ResourceKind::Account);
        assert_eq!(ActionKind::BlockGroup.resource_kind(), ResourceKind::Group);
        assert_eq!(ActionKind::DeleteGroup.resource_kind(), ResourceKind::Group);
    }

    #[test]
    fn test_resource_ref_for_action() {
        let target = ResourceRef::for_action(ActionKind::BlockGroup, "G42");
        assert_eq!(target.kind, ResourceKind::Group);
        assert_eq!(target.id, "G42");
        assert_eq!(target.to_string(), "group:G42");
    }

    #[test]
    fn test_all_covers_every_kind() {
        assert_eq!(ActionKind::all().len(), 6);
    }

    #[test]
    fn test_serde_wire_format() {
        let json = serde_json::to_string(&ActionKind::BlockGroup).unwrap();
        assert_eq!(json, "\"block-group\"");
        let parsed: ActionKind = serde_json::from_str("\"delete-group\"").unwrap();
        assert_eq!(parsed, ActionKind::DeleteGroup);
    }
}
