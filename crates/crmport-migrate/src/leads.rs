//! Leads phase: legacy leads to target `leads` documents.
//!
//! Assignment is remapped from the legacy display name to the identifier of
//! the migrated user with that name. The name itself is always kept.

use crmport_store::{Filter, CREATED_AT_FIELD, LEADS};
use serde::Serialize;
use serde_json::Value;

use crate::error::RecordError;
use crate::identity::IdentityResolver;
use crate::legacy::{self, LegacyRecord};
use crate::migrator::{EntityMigration, PreparedWrite};
use crate::target::InsertPath;
use crate::users::to_document;

/// Half-width of the createdAt dedup window in milliseconds.
pub const DEDUP_WINDOW_MS: i64 = 1000;

/// Status given to leads whose legacy record has none.
pub const DEFAULT_STATUS: &str = "new";

/// Source given to leads whose legacy record has none.
pub const DEFAULT_SOURCE: &str = "website";

/// CRM synchronisation metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmSync {
    /// Whether the lead was pushed to the external CRM.
    pub synced: bool,
    /// External CRM identifier.
    pub crm_id: Option<String>,
    /// Last successful sync, epoch milliseconds.
    pub last_synced_at: Option<i64>,
}

/// A legacy lead after validation and defaulting.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLead {
    pub legacy_id: Option<String>,
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub source: String,
    pub budget: Option<f64>,
    pub property_interest: Option<String>,
    pub assigned_to_name: Option<String>,
    pub crm_sync: CrmSync,
    pub activities: Vec<Value>,
    pub viewings: Vec<Value>,
    pub interests: Vec<Value>,
    pub created_at: i64,
    /// False when `created_at` was defaulted.
    pub has_created_at: bool,
    pub updated_at: i64,
}

impl LegacyLead {
    /// Build from a raw legacy record, using `now` for missing timestamps.
    pub fn from_raw(raw: &LegacyRecord, now: i64) -> Result<Self, RecordError> {
        let email = legacy::email(raw)
            .ok_or_else(|| RecordError::Transform("missing or invalid email".to_string()))?;

        let name = legacy::text(raw, &["name", "fullName"]).or_else(|| {
            let parts: Vec<String> = ["firstName", "lastName"]
                .iter()
                .filter_map(|key| legacy::text(raw, &[*key]))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });

        let legacy_created = legacy::timestamp(raw, CREATED_AT_FIELD);
        let created_at = legacy_created.unwrap_or(now);

        Ok(Self {
            legacy_id: legacy::legacy_id(raw),
            name,
            email,
            phone: legacy::text(raw, &["phone"]),
            message: legacy::text(raw, &["message", "notes"]),
            status: legacy::text(raw, &["status"])
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            source: legacy::text(raw, &["source"]).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            budget: legacy::number(raw, "budget"),
            property_interest: legacy::text(raw, &["propertyInterest", "property"]),
            assigned_to_name: legacy::text(raw, &["assignedToName", "assignedTo"]),
            crm_sync: crm_sync(raw),
            activities: legacy::sequence(raw, "activities"),
            viewings: legacy::sequence(raw, "viewings"),
            interests: legacy::sequence(raw, "interests"),
            created_at,
            has_created_at: legacy_created.is_some(),
            updated_at: legacy::timestamp(raw, "updatedAt").unwrap_or(created_at),
        })
    }
}

/// Read sync metadata from either a nested `crmSync` object or flat fields.
fn crm_sync(raw: &LegacyRecord) -> CrmSync {
    match legacy::object(raw, "crmSync") {
        Some(nested) => CrmSync {
            synced: legacy::flag(nested, "synced").unwrap_or(false),
            crm_id: legacy::text(nested, &["crmId", "id"]),
            last_synced_at: legacy::timestamp(nested, "lastSyncedAt"),
        },
        None => CrmSync {
            synced: legacy::flag(raw, "crmSynced").unwrap_or(false),
            crm_id: legacy::text(raw, &["crmId"]),
            last_synced_at: legacy::timestamp(raw, "crmSyncedAt"),
        },
    }
}

/// Target shape of a migrated lead.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MigratedLead {
    name: Option<String>,
    email: String,
    phone: Option<String>,
    message: Option<String>,
    status: String,
    source: String,
    budget: Option<f64>,
    property_interest: Option<String>,
    assigned_to: Option<String>,
    assigned_to_name: Option<String>,
    crm_sync: CrmSync,
    activities: Vec<Value>,
    viewings: Vec<Value>,
    interests: Vec<Value>,
    created_at: i64,
    updated_at: i64,
    legacy_id: Option<String>,
}

/// Migration rules for leads.
pub struct LeadMigration<'r> {
    users: &'r IdentityResolver,
    now: i64,
}

impl<'r> LeadMigration<'r> {
    /// Create the leads migration, resolving assignments through `users`.
    pub fn new(users: &'r IdentityResolver, now: i64) -> Self {
        Self { users, now }
    }
}

impl EntityMigration for LeadMigration<'_> {
    type Record = LegacyLead;

    fn collection(&self) -> &'static str {
        LEADS
    }

    fn prepare(&self, raw: &LegacyRecord) -> Result<LegacyLead, RecordError> {
        LegacyLead::from_raw(raw, self.now)
    }

    fn natural_key(&self, lead: &LegacyLead) -> String {
        lead.email.clone()
    }

    /// Email plus a createdAt window. A defaulted createdAt cannot match a
    /// previous run, so those leads fall back to email plus legacy id.
    fn dedup_filter(&self, lead: &LegacyLead) -> Filter {
        let by_email = Filter::eq("email", lead.email.as_str());
        if lead.has_created_at {
            by_email.and(Filter::between(
                CREATED_AT_FIELD,
                lead.created_at.saturating_sub(DEDUP_WINDOW_MS),
                lead.created_at.saturating_add(DEDUP_WINDOW_MS),
            ))
        } else {
            match &lead.legacy_id {
                Some(id) => by_email.and(Filter::eq("legacyId", id.as_str())),
                None => by_email,
            }
        }
    }

    fn into_write(&self, lead: LegacyLead) -> Result<PreparedWrite, RecordError> {
        let assigned_to = lead
            .assigned_to_name
            .as_deref()
            .and_then(|name| self.users.resolve(name))
            .map(str::to_string);

        let migrated = MigratedLead {
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            message: lead.message,
            status: lead.status,
            source: lead.source,
            budget: lead.budget,
            property_interest: lead.property_interest,
            assigned_to,
            assigned_to_name: lead.assigned_to_name,
            crm_sync: lead.crm_sync,
            activities: lead.activities,
            viewings: lead.viewings,
            interests: lead.interests,
            created_at: lead.created_at,
            updated_at: lead.updated_at,
            legacy_id: lead.legacy_id,
        };

        Ok(PreparedWrite {
            path: InsertPath::Validated,
            doc: to_document(&migrated)?,
        })
    }
}
