use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Caller roles, ordered from most to least privileged.
///
/// The wire representation is the exact uppercase token carried in access
/// tokens; anything else must be rejected at the boundary before a
/// `CallerIdentity` is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Super,
    Service,
    Admin,
    LegacyAdmin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Super => "SUPER",
            Self::Service => "SERVICE",
            Self::Admin => "ADMIN",
            Self::LegacyAdmin => "LEGACY_ADMIN",
            Self::User => "USER",
        }
    }

    /// Sort rank for "order by role ascending" listings.
    ///
    /// Pinned explicitly so the in-memory and Postgres backends agree on the
    /// ordering regardless of how role values are stored.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Super => 0,
            Self::Service => 1,
            Self::Admin => 2,
            Self::LegacyAdmin => 3,
            Self::User => 4,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER" => Ok(Self::Super),
            "SERVICE" => Ok(Self::Service),
            "ADMIN" => Ok(Self::Admin),
            "LEGACY_ADMIN" => Ok(Self::LegacyAdmin),
            "USER" => Ok(Self::User),
            other => Err(crate::error::CoreError::invalid_scope(format!(
                "unrecognized role: {other}"
            ))),
        }
    }
}

/// Ward flavor. LEGACY wards are mirrored to the legacy temperature-log
/// bridge instead of the device fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WardKind {
    #[default]
    Standard,
    Legacy,
}

impl WardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Legacy => "LEGACY",
        }
    }
}

impl std::fmt::Display for WardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WardKind {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(Self::Standard),
            "LEGACY" => Ok(Self::Legacy),
            other => Err(crate::error::CoreError::invalid_scope(format!(
                "unrecognized ward kind: {other}"
            ))),
        }
    }
}

/// The three record families the registry manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Hospital,
    Ward,
    User,
}

impl ResourceKind {
    /// Base cache-key prefix for the resource family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::Ward => "ward",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticated caller identity handed in by the boundary layer.
///
/// Wire field names (`hosId`, `wardId`) follow the token payload and are
/// part of the contract with the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: String,
    pub role: Role,
    #[serde(rename = "hosId")]
    pub hospital_id: String,
    #[serde(rename = "wardId")]
    pub ward_id: String,
}

/// Hospital record. Top of the hospital / ward / user hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub id: String,
    pub name: String,
    pub sequence: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Ward record, owned by exactly one hospital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ward {
    pub id: String,
    pub name: String,
    pub sequence: i32,
    #[serde(default)]
    pub kind: WardKind,
    pub hospital_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// User record, owned by exactly one ward.
///
/// Deliberately not serializable: the password hash never leaves the
/// process. Callers see [`UserRecord`] or [`UserCredentials`] views instead.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub active: bool,
    pub role: Role,
    pub display_name: Option<String>,
    pub picture: Option<String>,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub ward_id: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Hospital with its wards embedded, wards ordered by sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalRecord {
    #[serde(flatten)]
    pub hospital: Hospital,
    pub wards: Vec<Ward>,
}

/// Ward with its owning hospital embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardRecord {
    #[serde(flatten)]
    pub ward: Ward,
    pub hospital: Hospital,
}

/// Trimmed hospital view embedded in user records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Trimmed ward view embedded in user records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardSummary {
    pub id: String,
    pub name: String,
    pub hospital: HospitalSummary,
}

/// Sanitized user view with ward and hospital context, no credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub active: bool,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub ward: WardSummary,
}

impl UserRecord {
    /// Assemble the joined view from the three underlying records.
    pub fn assemble(user: User, ward: Ward, hospital: Hospital) -> Self {
        Self {
            id: user.id,
            username: user.username,
            active: user.active,
            role: user.role,
            display_name: user.display_name,
            picture: user.picture,
            ward: WardSummary {
                id: ward.id,
                name: ward.name,
                hospital: HospitalSummary {
                    id: hospital.id,
                    name: hospital.name,
                    picture: hospital.picture,
                },
            },
        }
    }
}

/// Credential view for the authentication boundary. Never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct UserCredentials {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub active: bool,
    pub role: Role,
    pub ward_id: String,
    pub hospital_id: String,
}

/// Validated payload for creating a hospital.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHospital {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Partial hospital update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Validated payload for creating a ward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<WardKind>,
    pub hospital_id: String,
}

/// Partial ward update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<WardKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_id: Option<String>,
}

/// Validated payload for creating a user. The boundary hashes the
/// credential before it reaches the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ward_id: String,
    pub username: String,
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Partial user update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use time::OffsetDateTime;

    fn hospital(id: &str) -> Hospital {
        let now = OffsetDateTime::now_utc();
        Hospital {
            id: id.to_string(),
            name: format!("Hospital {id}"),
            sequence: 1,
            address: None,
            phone: None,
            contact_name: None,
            contact_phone: None,
            latitude: None,
            longitude: None,
            picture: Some("https://assets.example/media/image/hospitals/h.png".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn ward(id: &str, hospital_id: &str) -> Ward {
        let now = OffsetDateTime::now_utc();
        Ward {
            id: id.to_string(),
            name: format!("Ward {id}"),
            sequence: 1,
            kind: WardKind::Standard,
            hospital_id: hospital_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_wire_tokens() {
        for (role, token) in [
            (Role::Super, "\"SUPER\""),
            (Role::Service, "\"SERVICE\""),
            (Role::Admin, "\"ADMIN\""),
            (Role::LegacyAdmin, "\"LEGACY_ADMIN\""),
            (Role::User, "\"USER\""),
        ] {
            assert_eq!(serde_json::to_string(&role).unwrap(), token);
            let parsed: Role = serde_json::from_str(token).unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn test_role_parse_rejects_unknown_token() {
        let err = Role::from_str("ROOT").unwrap_err();
        assert!(err.to_string().contains("unrecognized role"));
        assert!(serde_json::from_str::<Role>("\"root\"").is_err());
    }

    #[test]
    fn test_role_rank_is_ascending_privilege_order() {
        let mut roles = vec![
            Role::User,
            Role::Admin,
            Role::Super,
            Role::LegacyAdmin,
            Role::Service,
        ];
        roles.sort_by_key(Role::rank);
        assert_eq!(
            roles,
            vec![
                Role::Super,
                Role::Service,
                Role::Admin,
                Role::LegacyAdmin,
                Role::User,
            ]
        );
    }

    #[test]
    fn test_ward_kind_default_and_tokens() {
        assert_eq!(WardKind::default(), WardKind::Standard);
        assert_eq!(serde_json::to_string(&WardKind::Legacy).unwrap(), "\"LEGACY\"");
        assert_eq!(WardKind::from_str("STANDARD").unwrap(), WardKind::Standard);
        assert!(WardKind::from_str("legacy").is_err());
    }

    #[test]
    fn test_caller_identity_wire_field_names() {
        let caller = CallerIdentity {
            id: "U-1".to_string(),
            role: Role::Admin,
            hospital_id: "H-1".to_string(),
            ward_id: "W-1".to_string(),
        };
        let json = serde_json::to_value(&caller).unwrap();
        assert_eq!(json["hosId"], "H-1");
        assert_eq!(json["wardId"], "W-1");
        assert_eq!(json["role"], "ADMIN");

        let parsed: CallerIdentity = serde_json::from_value(serde_json::json!({
            "id": "U-2",
            "role": "SERVICE",
            "hosId": "H-9",
            "wardId": "",
        }))
        .unwrap();
        assert_eq!(parsed.role, Role::Service);
        assert_eq!(parsed.hospital_id, "H-9");
    }

    #[test]
    fn test_hospital_record_flattens_entity_fields() {
        let record = HospitalRecord {
            hospital: hospital("H-1"),
            wards: vec![ward("W-1", "H-1")],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "H-1");
        assert_eq!(json["name"], "Hospital H-1");
        assert_eq!(json["wards"][0]["hospitalId"], "H-1");
        assert_eq!(json["wards"][0]["kind"], "STANDARD");

        let back: HospitalRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_user_record_assembly_drops_the_hash() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: "U-1".to_string(),
            username: "nurse1".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            active: true,
            role: Role::User,
            display_name: Some("Nurse One".to_string()),
            picture: None,
            note: None,
            created_by: None,
            ward_id: "W-1".to_string(),
            created_at: now,
            updated_at: now,
        };
        let record = UserRecord::assemble(user, ward("W-1", "H-1"), hospital("H-1"));
        assert_eq!(record.ward.id, "W-1");
        assert_eq!(record.ward.hospital.id, "H-1");

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("passwordHash"));
        assert!(json.contains("\"displayName\":\"Nurse One\""));
    }

    #[test]
    fn test_new_ward_accepts_minimal_payload() {
        let new: NewWard = serde_json::from_value(serde_json::json!({
            "name": "ICU",
            "hospitalId": "H-1",
        }))
        .unwrap();
        assert_eq!(new.id, None);
        assert_eq!(new.kind, None);
        assert_eq!(new.hospital_id, "H-1");
    }

    #[test]
    fn test_update_payloads_default_to_no_change() {
        let patch = HospitalUpdate::default();
        assert!(patch.name.is_none());
        let parsed: UserUpdate = serde_json::from_str("{}").unwrap();
        assert!(parsed.username.is_none());
        assert!(parsed.ward_id.is_none());
    }
}
