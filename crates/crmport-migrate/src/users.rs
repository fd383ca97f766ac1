//! Users phase: legacy user records to target `users` documents.

use crmport_store::{Document, Filter, USERS};
use serde::Serialize;

use crate::error::RecordError;
use crate::legacy::{self, LegacyRecord};
use crate::migrator::{EntityMigration, PreparedWrite};
use crate::target::InsertPath;

/// Role given to users whose legacy record has none.
pub const DEFAULT_ROLE: &str = "agent";

/// Role that grants administration rights.
pub const ADMIN_ROLE: &str = "admin";

/// A legacy user after validation and defaulting.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyUser {
    /// Legacy identifier, if the record had one.
    pub legacy_id: Option<String>,
    /// Normalized email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Lower-cased role.
    pub role: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Account enabled.
    pub is_active: bool,
    /// Email verified.
    pub is_verified: bool,
    /// Last login, epoch milliseconds.
    pub last_login: Option<i64>,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Last update, epoch milliseconds.
    pub updated_at: i64,
    /// Already-hashed legacy credential.
    pub password: Option<String>,
}

impl LegacyUser {
    /// Build from a raw legacy record, using `now` for missing timestamps.
    pub fn from_raw(raw: &LegacyRecord, now: i64) -> Result<Self, RecordError> {
        let email = legacy::email(raw)
            .ok_or_else(|| RecordError::Transform("missing or invalid email".to_string()))?;

        // Fall back to the mailbox part so the name stays non-empty.
        let name = legacy::text(raw, &["name", "fullName"])
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let created_at = legacy::timestamp(raw, "createdAt").unwrap_or(now);

        Ok(Self {
            legacy_id: legacy::legacy_id(raw),
            name,
            role: legacy::text(raw, &["role"])
                .map(|r| r.to_lowercase())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            phone: legacy::text(raw, &["phone"]),
            is_active: legacy::flag(raw, "isActive").unwrap_or(true),
            is_verified: legacy::flag(raw, "isVerified").unwrap_or(false),
            last_login: legacy::timestamp(raw, "lastLogin"),
            created_at,
            updated_at: legacy::timestamp(raw, "updatedAt").unwrap_or(created_at),
            // Not trimmed: the hash is carried byte for byte.
            password: raw
                .get("password")
                .and_then(|v| v.as_str())
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            email,
        })
    }
}

/// Target shape of a migrated user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MigratedUser {
    email: String,
    name: String,
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    is_active: bool,
    is_verified: bool,
    last_login: Option<i64>,
    created_at: i64,
    updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    must_reset_password: bool,
    legacy_id: Option<String>,
}

impl From<LegacyUser> for MigratedUser {
    fn from(user: LegacyUser) -> Self {
        Self {
            must_reset_password: user.password.is_none(),
            email: user.email,
            name: user.name,
            role: user.role,
            phone: user.phone,
            is_active: user.is_active,
            is_verified: user.is_verified,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
            password: user.password,
            legacy_id: user.legacy_id,
        }
    }
}

/// Serialize a target shape into a store document.
pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Document, RecordError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(RecordError::Transform(
            "target record is not an object".to_string(),
        )),
        Err(e) => Err(RecordError::Transform(e.to_string())),
    }
}

/// Migration rules for users.
pub struct UserMigration {
    now: i64,
}

impl UserMigration {
    /// Create the users migration; `now` defaults missing timestamps.
    pub fn new(now: i64) -> Self {
        Self { now }
    }
}

impl EntityMigration for UserMigration {
    type Record = LegacyUser;

    fn collection(&self) -> &'static str {
        USERS
    }

    fn prepare(&self, raw: &LegacyRecord) -> Result<LegacyUser, RecordError> {
        LegacyUser::from_raw(raw, self.now)
    }

    fn natural_key(&self, user: &LegacyUser) -> String {
        user.email.clone()
    }

    fn dedup_filter(&self, user: &LegacyUser) -> Filter {
        Filter::eq("email", user.email.as_str())
    }

    /// Users carrying a legacy hash are imported verbatim. Users without one
    /// go through validated create and must set a password after migration.
    fn into_write(&self, user: LegacyUser) -> Result<PreparedWrite, RecordError> {
        let path = if user.password.is_some() {
            InsertPath::Trusted
        } else {
            InsertPath::Validated
        };
        Ok(PreparedWrite {
            path,
            doc: to_document(&MigratedUser::from(user))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const NOW: i64 = 1_700_000_000_000;

    fn raw(value: Value) -> LegacyRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults() {
        let user = LegacyUser::from_raw(&raw(json!({"email": "A@X.com"})), NOW).unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.name, "a");
        assert_eq!(user.role, DEFAULT_ROLE);
        assert!(user.is_active);
        assert!(!user.is_verified);
        assert_eq!(user.last_login, None);
        assert_eq!(user.created_at, NOW);
        assert_eq!(user.updated_at, NOW);
        assert_eq!(user.password, None);
    }

    #[test]
    fn test_explicit_fields() {
        let user = LegacyUser::from_raw(
            &raw(json!({
                "id": "u1",
                "email": "jane@x.com",
                "name": "Jane Doe",
                "role": "Admin",
                "isVerified": true,
                "isActive": false,
                "lastLogin": "2024-03-01T10:00:00Z",
                "createdAt": "2023-01-01T00:00:00Z",
                "password": "$2a$10$abc "
            })),
            NOW,
        )
        .unwrap();
        assert_eq!(user.legacy_id.as_deref(), Some("u1"));
        assert_eq!(user.role, ADMIN_ROLE);
        assert!(user.is_verified);
        assert!(!user.is_active);
        assert_eq!(user.last_login, Some(1_709_287_200_000));
        assert_eq!(user.created_at, 1_672_531_200_000);
        assert_eq!(user.password.as_deref(), Some("$2a$10$abc "));
    }

    #[test]
    fn test_missing_email_is_error() {
        let err = LegacyUser::from_raw(&raw(json!({"name": "Nobody"})), NOW).unwrap_err();
        assert!(matches!(err, RecordError::Transform(_)));
    }

    #[test]
    fn test_hashed_password_uses_trusted_path() {
        let migration = UserMigration::new(NOW);
        let user = migration
            .prepare(&raw(json!({"email": "a@x.com", "password": "h1"})))
            .unwrap();
        let write = migration.into_write(user).unwrap();
        assert_eq!(write.path, InsertPath::Trusted);
        assert_eq!(write.doc["password"], "h1");
        assert_eq!(write.doc["mustResetPassword"], false);
        assert_eq!(write.doc["createdAt"], NOW);
    }

    #[test]
    fn test_no_password_uses_validated_path() {
        let migration = UserMigration::new(NOW);
        let user = migration
            .prepare(&raw(json!({"email": "a@x.com", "password": ""})))
            .unwrap();
        let write = migration.into_write(user).unwrap();
        assert_eq!(write.path, InsertPath::Validated);
        assert!(write.doc.get("password").is_none());
        assert_eq!(write.doc["mustResetPassword"], true);
    }

    #[test]
    fn test_dedup_by_email() {
        let migration = UserMigration::new(NOW);
        let user = migration.prepare(&raw(json!({"email": "a@x.com"}))).unwrap();
        assert_eq!(
            migration.dedup_filter(&user),
            Filter::eq("email", "a@x.com")
        );
    }
}
