//! Access levels and the per-deployment security context.
//!
//! Levels are strictly hierarchical: a higher ordinal carries every
//! capability of the levels below it, with no lateral grants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The caller's permitted capability tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    ReadOnly = 0,
    ComplianceRead = 1,
    SecurityWrite = 2,
    AdminWrite = 3,
    EmergencyWrite = 4,
}

impl AccessLevel {
    /// Whether this level satisfies `required`.
    pub fn permits(self, required: AccessLevel) -> bool {
        self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "READ_ONLY",
            Self::ComplianceRead => "COMPLIANCE_READ",
            Self::SecurityWrite => "SECURITY_WRITE",
            Self::AdminWrite => "ADMIN_WRITE",
            Self::EmergencyWrite => "EMERGENCY_WRITE",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READ_ONLY" => Ok(Self::ReadOnly),
            "COMPLIANCE_READ" => Ok(Self::ComplianceRead),
            "SECURITY_WRITE" => Ok(Self::SecurityWrite),
            "ADMIN_WRITE" => Ok(Self::AdminWrite),
            "EMERGENCY_WRITE" => Ok(Self::EmergencyWrite),
            other => Err(format!("unknown access level: {other:?}")),
        }
    }
}

/// Identity attached to every dispatch. Built once at startup from the
/// deployment configuration; never persisted (the audit sink is external).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: String,
    pub access_level: AccessLevel,
    pub session_id: String,
}

impl SecurityContext {
    pub fn new(user_id: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            user_id: user_id.into(),
            access_level,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_is_strict() {
        assert!(!AccessLevel::ReadOnly.permits(AccessLevel::SecurityWrite));
        assert!(AccessLevel::AdminWrite.permits(AccessLevel::SecurityWrite));
        assert!(AccessLevel::EmergencyWrite.permits(AccessLevel::ReadOnly));
        assert!(AccessLevel::ComplianceRead.permits(AccessLevel::ReadOnly));
        assert!(!AccessLevel::ComplianceRead.permits(AccessLevel::SecurityWrite));
    }

    #[test]
    fn test_every_level_permits_itself() {
        for level in [
            AccessLevel::ReadOnly,
            AccessLevel::ComplianceRead,
            AccessLevel::SecurityWrite,
            AccessLevel::AdminWrite,
            AccessLevel::EmergencyWrite,
        ] {
            assert!(level.permits(level));
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        for name in [
            "READ_ONLY",
            "COMPLIANCE_READ",
            "SECURITY_WRITE",
            "ADMIN_WRITE",
            "EMERGENCY_WRITE",
        ] {
            let level: AccessLevel = name.parse().unwrap();
            assert_eq!(level.as_str(), name);
        }
        assert!("ROOT".parse::<AccessLevel>().is_err());
        // Lowercase input is accepted.
        assert_eq!(
            "security_write".parse::<AccessLevel>().unwrap(),
            AccessLevel::SecurityWrite
        );
    }

    #[test]
    fn test_context_gets_fresh_session_ids() {
        let a = SecurityContext::new("ops", AccessLevel::ReadOnly);
        let b = SecurityContext::new("ops", AccessLevel::ReadOnly);
        assert_ne!(a.session_id, b.session_id);
    }
}
