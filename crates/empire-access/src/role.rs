use serde::{Deserialize, Serialize};

/// The closed set of roles a member can hold.
///
/// Assignments come from the backend as strings; anything
/// unrecognized, missing, or unfetchable degrades to `Member` so an
/// authorization check can never accidentally grant privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
    SuperAdmin,
    National,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::National => "national",
        }
    }

    /// Parse a backend role string. Unknown strings are `None`;
    /// callers decide whether that means `Member`.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            "national" => Some(Role::National),
            _ => None,
        }
    }

    /// Interpret a raw assignment, defaulting to `Member` when absent
    /// or unrecognized.
    pub fn from_assignment(raw: Option<&str>) -> Role {
        raw.and_then(Role::parse).unwrap_or(Role::Member)
    }

    /// Elevated roles see through member-level visibility restrictions
    /// and invisible profiles.
    pub fn is_elevated(&self) -> bool {
        !matches!(self, Role::Member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_known_roles() {
        for role in [Role::Member, Role::Admin, Role::SuperAdmin, Role::National] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("chancellor"), None);
    }

    #[test]
    fn assignment_defaults_to_member() {
        assert_eq!(Role::from_assignment(None), Role::Member);
        assert_eq!(Role::from_assignment(Some("garbage")), Role::Member);
        assert_eq!(Role::from_assignment(Some("super_admin")), Role::SuperAdmin);
    }

    #[test]
    fn only_member_is_not_elevated() {
        assert!(!Role::Member.is_elevated());
        assert!(Role::Admin.is_elevated());
        assert!(Role::SuperAdmin.is_elevated());
        assert!(Role::National.is_elevated());
    }

    #[test]
    fn role_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&Role::SuperAdmin).unwrap(),
            "\"super_admin\""
        );
        let back: Role = serde_json::from_str("\"national\"").unwrap();
        assert_eq!(back, Role::National);
    }
}
