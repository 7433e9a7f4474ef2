//! Per-field profile disclosure.
//!
//! A profile owner controls who sees each field through a visibility
//! map (`public` / `members` / `private`) and an `invisible` flag that
//! pulls the whole profile out of directory listings. Recognized
//! fields are a closed set with hardcoded defaults; unknown field
//! names are rejected rather than silently defaulted.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use empire_core::{Backend, BackendError, Record, UserId, Value};

use crate::role::Role;

/// Errors from the visibility layer.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("invalid visibility level: '{0}'")]
    InvalidLevel(String),

    #[error("unrecognized profile field: '{0}'")]
    UnknownField(String),

    #[error("only the profile owner may change visibility settings")]
    NotOwner,

    #[error("malformed profile record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Who may see a profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityLevel {
    /// Anyone, signed in or not.
    Public,
    /// Any authenticated member.
    Members,
    /// The owner only.
    Private,
}

impl VisibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityLevel::Public => "public",
            VisibilityLevel::Members => "members",
            VisibilityLevel::Private => "private",
        }
    }
}

impl FromStr for VisibilityLevel {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(VisibilityLevel::Public),
            "members" => Ok(VisibilityLevel::Members),
            "private" => Ok(VisibilityLevel::Private),
            other => Err(AccessError::InvalidLevel(other.to_string())),
        }
    }
}

/// The closed set of profile fields with per-field visibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    Email,
    Phone,
    Location,
    Bio,
    Interests,
    ServiceHours,
    Accomplishments,
    JoinDate,
}

impl ProfileField {
    pub const ALL: [ProfileField; 8] = [
        ProfileField::Email,
        ProfileField::Phone,
        ProfileField::Location,
        ProfileField::Bio,
        ProfileField::Interests,
        ProfileField::ServiceHours,
        ProfileField::Accomplishments,
        ProfileField::JoinDate,
    ];

    /// Column name as stored in the profiles table.
    pub fn name(&self) -> &'static str {
        match self {
            ProfileField::Email => "email",
            ProfileField::Phone => "phone",
            ProfileField::Location => "location",
            ProfileField::Bio => "bio",
            ProfileField::Interests => "interests",
            ProfileField::ServiceHours => "serviceHours",
            ProfileField::Accomplishments => "accomplishments",
            ProfileField::JoinDate => "joinDate",
        }
    }

    pub fn from_name(name: &str) -> Result<ProfileField, AccessError> {
        ProfileField::ALL
            .iter()
            .copied()
            .find(|field| field.name() == name)
            .ok_or_else(|| AccessError::UnknownField(name.to_string()))
    }

    /// Visibility used when the owner has not set one for this field.
    pub fn default_visibility(&self) -> VisibilityLevel {
        match self {
            ProfileField::Email => VisibilityLevel::Members,
            ProfileField::Phone => VisibilityLevel::Private,
            ProfileField::Location => VisibilityLevel::Members,
            ProfileField::Bio => VisibilityLevel::Public,
            ProfileField::Interests => VisibilityLevel::Public,
            ProfileField::ServiceHours => VisibilityLevel::Members,
            ProfileField::Accomplishments => VisibilityLevel::Public,
            ProfileField::JoinDate => VisibilityLevel::Members,
        }
    }
}

/// The subject of a disclosure decision: a member profile's owner id,
/// explicit visibility settings, and invisibility flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub visibility: BTreeMap<ProfileField, VisibilityLevel>,
    pub invisible: bool,
}

impl Profile {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            visibility: BTreeMap::new(),
            invisible: false,
        }
    }

    /// Read the access-relevant parts out of a profiles-table row.
    ///
    /// The `visibility` column, when present, must be an object of
    /// recognized field names to level strings; anything else is
    /// rejected so a typo cannot silently fall back to a default.
    pub fn from_record(record: &Record) -> Result<Self, AccessError> {
        let mut visibility = BTreeMap::new();
        match record.get("visibility") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    let field = ProfileField::from_name(name)?;
                    let level = value
                        .as_str()
                        .ok_or_else(|| {
                            AccessError::Malformed(format!(
                                "visibility for '{}' is not a string",
                                name
                            ))
                        })?
                        .parse::<VisibilityLevel>()?;
                    visibility.insert(field, level);
                }
            }
            Some(_) => {
                return Err(AccessError::Malformed(
                    "visibility column is not an object".into(),
                ))
            }
        }

        let invisible = record
            .get("invisible")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Profile {
            id: record.id.clone(),
            visibility,
            invisible,
        })
    }

    /// Effective level for a field: the owner's setting, else the
    /// field's default.
    pub fn resolved_level(&self, field: ProfileField) -> VisibilityLevel {
        self.visibility
            .get(&field)
            .copied()
            .unwrap_or_else(|| field.default_visibility())
    }
}

/// A viewer with a known role. Anonymous viewers are represented as
/// `None` at the call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
    pub role: Role,
}

impl Viewer {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// May `viewer` see `field` of this profile? Pure read, no side
/// effects.
///
/// Owners always see their own data. Otherwise the resolved level
/// decides: `public` is open to everyone, `private` to no one, and
/// `members` to any authenticated viewer — except that an invisible
/// subject hides members-level fields from ordinary members while
/// staying fully visible to elevated viewers.
pub fn can_view(profile: &Profile, field: ProfileField, viewer: Option<&Viewer>) -> bool {
    let Some(viewer) = viewer else {
        return profile.resolved_level(field) == VisibilityLevel::Public;
    };
    if viewer.id == profile.id {
        return true;
    }
    match profile.resolved_level(field) {
        VisibilityLevel::Public => true,
        VisibilityLevel::Private => false,
        VisibilityLevel::Members => !profile.invisible || viewer.role.is_elevated(),
    }
}

/// Should this profile appear in a directory listing at all?
///
/// Invisible profiles are omitted wholesale — not field-masked — for
/// everyone except the owner and elevated viewers.
pub fn directory_visible(profile: &Profile, viewer: Option<&Viewer>) -> bool {
    if !profile.invisible {
        return true;
    }
    matches!(viewer, Some(v) if v.id == profile.id || v.role.is_elevated())
}

fn visibility_patch(visibility: &BTreeMap<ProfileField, VisibilityLevel>) -> Value {
    Value::Object(
        visibility
            .iter()
            .map(|(field, level)| {
                (
                    field.name().to_string(),
                    Value::String(level.as_str().to_string()),
                )
            })
            .collect(),
    )
}

/// Persist a visibility change for one field. Owner-only.
///
/// The patch carries the full merged visibility map so settings for
/// other fields are never clobbered by a partial write.
pub fn set_visibility(
    backend: &dyn Backend,
    table: &str,
    profile: &Profile,
    actor: &str,
    field: ProfileField,
    level: VisibilityLevel,
) -> Result<Record, AccessError> {
    if actor != profile.id {
        return Err(AccessError::NotOwner);
    }
    let mut merged = profile.visibility.clone();
    merged.insert(field, level);

    let mut patch = BTreeMap::new();
    patch.insert("visibility".to_string(), visibility_patch(&merged));
    Ok(backend.update_record(table, &profile.id, patch)?)
}

/// Persist the invisibility flag. Owner-only.
pub fn set_invisible(
    backend: &dyn Backend,
    table: &str,
    profile: &Profile,
    actor: &str,
    invisible: bool,
) -> Result<Record, AccessError> {
    if actor != profile.id {
        return Err(AccessError::NotOwner);
    }
    let mut patch = BTreeMap::new();
    patch.insert("invisible".to_string(), Value::Bool(invisible));
    Ok(backend.update_record(table, &profile.id, patch)?)
}
