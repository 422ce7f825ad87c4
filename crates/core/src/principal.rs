//! Principal / Role - An already-authenticated caller
//!
//! Authentication happens outside this system; every operation receives a
//! `Principal` resolved by the identity layer. Roles are a closed
//! enumeration; the workflow never compares role strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

/// Role a principal holds within a savings group's administration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary group member - may not initiate or confirm gated actions
    Member,
    /// Group treasurer - first confirmation stage in the default policy
    Treasurer,
    /// Platform administrator - final confirmation stage
    Administrator,
}

/// An authenticated caller: identity plus the role it held when resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Identifier assigned by the identity layer
    pub id: String,
    /// Role at resolution time
    pub role: Role,
}

impl Principal {
    /// Create a principal from an id and role.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::Treasurer.to_string(), "treasurer");
        assert_eq!("administrator".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!("member".parse::<Role>().unwrap(), Role::Member);
    }

    #[test]
    fn test_role_parse_rejects_unknown() {
        // The source system patched ad hoc spellings at runtime; this
        // enumeration refuses them at the boundary instead.
        assert!("tresorier".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_principal_display() {
        let p = Principal::new("U-017", Role::Treasurer);
        assert_eq!(p.to_string(), "U-017 (treasurer)");
    }

    #[test]
    fn test_serde_roundtrip() {
        let p = Principal::new("U-017", Role::Administrator);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"administrator\""));
        let parsed: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(p, parsed);
    }
}
